//! Compile-only test to verify public API surface.
//!
//! This file serves as a compile-time contract for the public API.
//! If this file fails to compile, the public API has regressed.
//!
//! Run with: cargo test -- api_surface

// Allow unused imports - this test is about compile-time verification, not runtime usage
#![allow(unused_imports)]

// ============================================================================
// Core Interpreter Types
// ============================================================================

// path module - suite/test addresses
use storyrun::path::{PathAddress, PathError, DELIMITER};

// value module - runtime type model and typed bridge
use storyrun::value::{
    enum_member_from_value, object_from_value, EnumType, EnumValue, ObjectValue, Resolvable,
    TypeName, Value, ValueType,
};

// resolver module - cell text to typed values
use storyrun::resolver::{Finder, ResolveError, ValueResolver, BLANK, EMPTY, LIST_DELIMITER, NULL};

// dates and duration modules
use storyrun::dates::{
    format_date_time, get_date_time, next_weekday, parse_date_time, Clock, DateOrder, FixedClock,
    SystemClock, TODAY,
};
use storyrun::duration::{format_duration, parse_duration};

// step and grammar modules - execution
use storyrun::context::ExecutionContext;
use storyrun::grammar::{
    ActionBinding, ActionError, ActionOutput, ActionShape, Arguments, FnAction, FnActionBuilder,
    Grammar, GrammarError, GrammarRegistry, OutputSlot, Parameter,
};
use storyrun::step::{OutputCell, Step, StepError, StepState};

// hierarchy module - suites and tests
use storyrun::hierarchy::{
    AllTests, Hierarchy, HierarchyError, Node, Suite, Test, TestResults, TestState, TestsWithPaths,
};

// error module - error types and classes
use storyrun::error::{ErrorClass, StoryError};

// macros
use storyrun::{resolvable_enum, resolvable_object};

// ============================================================================
// Run Infrastructure
// ============================================================================

use storyrun::config::{
    ConfigError, ConfigSource, ConfigValue, Overrides, RunConfig, ENV_DATE_ORDER, ENV_LOG,
    ENV_STOP_ON_EXCEPTION, ENV_WORKERS,
};
use storyrun::logging::{env_filter, init_tracing, LogFormat, LogLevel};
use storyrun::output::{
    emit_summary, ErrorInfo, RunSummary, StepSummary, TestSummary, Totals, SCHEMA_VERSION,
};
use storyrun::runner::Runner;

// ============================================================================
// Test
// ============================================================================

#[test]
fn api_surface_compiles() {
    // This test exists only to verify imports compile.
    // If you're here because this test broke, you may have
    // accidentally removed a public re-export.
    let _ = std::any::type_name::<PathAddress>();
    let _ = std::any::type_name::<ValueResolver>();
    let _ = std::any::type_name::<GrammarRegistry>();
    let _ = std::any::type_name::<Hierarchy>();
    let _ = std::any::type_name::<StoryError>();
    let _ = std::any::type_name::<RunConfig>();
    let _ = std::any::type_name::<Runner>();
}

#[test]
fn schema_version_is_stable() {
    // The schema version is part of the public API contract
    assert_eq!(SCHEMA_VERSION, "1");
}

#[test]
fn error_codes_are_stable() {
    assert_eq!(ErrorClass::Configuration.code(), 2);
    assert_eq!(ErrorClass::UnparseableValue.code(), 3);
    assert_eq!(ErrorClass::UnsupportedType.code(), 4);
    assert_eq!(ErrorClass::ApplicationAction.code(), 5);
    assert_eq!(ErrorClass::Internal.code(), 10);
}

#[test]
fn sentinels_are_stable() {
    assert_eq!(NULL, "NULL");
    assert_eq!(BLANK, "BLANK");
    assert_eq!(EMPTY, "EMPTY");
    assert_eq!(LIST_DELIMITER, ',');
    assert_eq!(TODAY, "TODAY");
    assert_eq!(DELIMITER, '/');
}
