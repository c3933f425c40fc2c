//! Storyrun: an acceptance-test interpreter
//!
//! Executes tabular test specifications by resolving cell text into typed
//! values, invoking registered grammars, and comparing outputs against
//! expected values.

// Core interpreter - re-exported from storyrun-core
pub use storyrun_core::context;
pub use storyrun_core::dates;
pub use storyrun_core::duration;
pub use storyrun_core::error;
pub use storyrun_core::grammar;
pub use storyrun_core::hierarchy;
pub use storyrun_core::path;
pub use storyrun_core::resolver;
pub use storyrun_core::step;
pub use storyrun_core::value;
pub use storyrun_core::{resolvable_enum, resolvable_object};

// Run infrastructure
pub mod config;
pub mod logging;
pub mod output;
pub mod runner;

// Error bridges - converts root-crate errors to StoryError
mod error_bridges;
