pub mod error;
pub mod http;
pub mod logger;
pub mod macros;
pub mod parser;
pub mod runner;
pub mod variable;

// Re-export commonly used types
pub use error::{Result, RuloadError};
