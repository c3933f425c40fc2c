//! Core of the storyrun acceptance-test interpreter.
//!
//! This crate provides the execution core:
//! - Path addresses for suites and tests
//! - The runtime type model and typed bridge
//! - Value resolution from cell text (sentinels, finders, dates, durations)
//! - Steps, grammars and action bindings
//! - The suite/test hierarchy
//! - Error types and error classes

pub mod context;
pub mod dates;
pub mod duration;
pub mod error;
pub mod grammar;
pub mod hierarchy;
pub mod path;
pub mod resolver;
pub mod step;
pub mod value;
