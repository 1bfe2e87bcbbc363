//! Utility modules
//!
//! This module contains utilities and helpers:
//! - Error, warning and output types
//! - Small LaTeX scanning helpers

pub mod error;
pub mod latex;

// Re-export commonly used items
pub use error::{AssetError, ConversionError, ConversionOutput, ConversionResult, ConversionWarning};
