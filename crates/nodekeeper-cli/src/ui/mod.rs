//! Terminal output and prompts.

pub mod output;
pub mod prompts;

pub use output::{error, header, info, kv, spinner, success, warning};
