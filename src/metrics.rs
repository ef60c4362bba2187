use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, Opts, TextEncoder};

/// Events successfully enqueued to the bulk dispatcher.
pub static PROCESSED_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    register(IntCounter::with_opts(Opts::new(
        "sync_processed_total",
        "Total processed outbox events",
    )))
});

/// Events that failed the synchronous dispatch path.
pub static FAILED_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    register(IntCounter::with_opts(Opts::new(
        "sync_failed_total",
        "Total failed outbox events",
    )))
});

/// Dead-letter inserts.
pub static DLQ_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    register(IntCounter::with_opts(Opts::new(
        "sync_dlq_total",
        "Total events inserted into the dead-letter queue",
    )))
});

/// Touch every counter once at startup so all series are registered and
/// exposed before the first event flows.
pub fn register_all() {
    Lazy::force(&PROCESSED_EVENTS);
    Lazy::force(&FAILED_EVENTS);
    Lazy::force(&DLQ_EVENTS);
}

fn register(counter: Result<IntCounter, prometheus::Error>) -> IntCounter {
    let counter = counter.expect("valid counter opts");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("counter registered once at startup");
    counter
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
