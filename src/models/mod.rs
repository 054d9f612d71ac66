//! Core data models for the media relay.
//!
//! Object references and range descriptors for streaming, upload tickets for
//! direct-to-store uploads, and watch-progress records shared by the
//! ephemeral and durable tiers. They serialize as camelCase JSON via `serde`.

pub mod media;
pub mod progress;
pub mod upload;
