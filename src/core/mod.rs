//! Core conversion stages
//!
//! - `assets`: image lookup and rasterization
//! - `preprocess`: LaTeX text rewriting ahead of pandoc
//! - `filter`: cross-reference resolution on pandoc's document model

pub mod assets;
pub mod filter;
pub mod preprocess;
