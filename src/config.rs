use std::fmt;

/// Runtime configuration. Timer intervals and batch sizes are compile-time
/// constants in their owning modules; only the two connection strings come
/// from the environment.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection string
    pub postgres_dsn: String,
    /// Elasticsearch base URL
    pub elastic_url: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("postgres_dsn", &"[REDACTED]")
            .field("elastic_url", &self.elastic_url)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let postgres_dsn = std::env::var("POSTGRES_DSN")
            .map_err(|_| "POSTGRES_DSN environment variable not set".to_string())?;
        let elastic_url = std::env::var("ELASTIC_URL")
            .map_err(|_| "ELASTIC_URL environment variable not set".to_string())?;

        Ok(Self {
            postgres_dsn,
            elastic_url,
        })
    }
}
