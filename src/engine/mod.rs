//! Apply engine for kstage
//!
//! The engine wraps the staging orchestrator for the terminal:
//! 1. Diffing - Preview staged values against their baselines
//! 2. Executing - Confirm, apply with progress, and summarize

pub mod differ;
pub mod executor;

pub use differ::display_diff;
pub use executor::{ExecuteOptions, execute};
