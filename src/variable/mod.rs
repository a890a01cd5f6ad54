pub mod capture;
pub mod resolver;
pub mod types;

// Re-export commonly used types
pub use capture::CaptureError;
pub use resolver::{ExprError, ExpressionResolver};
pub use types::VariableStore;
