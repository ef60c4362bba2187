pub mod outbox;
pub mod user_service;
