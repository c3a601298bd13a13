//! Assistant service client implementations.

pub mod code_helper;

// Re-export for convenience
pub use code_helper::CodeHelperClient;
