pub mod client;
pub mod engine;

// Re-export commonly used types
pub use client::ReqwestEngine;
pub use engine::{EngineResponse, HttpEngine, HttpError, PostPayload};
