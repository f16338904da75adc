//! Utility functions and helpers.

pub mod dev_key;
pub mod sanitizer;

// Re-export commonly used types
pub use dev_key::DevKeyGenerator;
pub use sanitizer::Sanitizer;
