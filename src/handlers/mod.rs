pub mod health_handlers;
pub mod progress_handlers;
pub mod stream_handlers;
pub mod upload_handlers;
