pub mod object_store_client;
pub mod progress_cache;
pub mod progress_store;
pub mod progress_sync;
pub mod range_relay;
pub mod upload_tickets;
