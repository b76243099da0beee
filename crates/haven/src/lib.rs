//! Haven backend library.
//!
//! Streaming chat relay, admission control and session intake for the Haven
//! companion app.

pub mod api;
pub mod completion;
pub mod conversation;
pub mod db;
pub mod limiter;
pub mod relay;
pub mod store;
