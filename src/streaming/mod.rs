//! Background chunk payload streaming

pub mod request;
pub mod engine;

pub use request::{PayloadKinds, StreamingRequest};
pub use engine::StreamingEngine;
