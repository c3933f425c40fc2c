//! Serializable run summaries.
//!
//! A [`RunSummary`] is built from a hierarchy after a run and is the stable
//! report format. It is deterministic: tests appear in depth-first insertion
//! order and steps in declaration order.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use storyrun_core::error::{ErrorClass, StoryError};
use storyrun_core::hierarchy::{Hierarchy, Test, TestResults, TestState};
use storyrun_core::path::PathAddress;
use storyrun_core::step::{Step, StepState};

/// Current schema version for run summaries.
pub const SCHEMA_VERSION: &str = "1";

// ============================================================================
// Report Types
// ============================================================================

/// A step error with its stable class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Numeric class code.
    pub code: u8,
    pub class: ErrorClass,
    pub message: String,
    /// Cell the error is attributed to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell: Option<String>,
}

impl ErrorInfo {
    pub fn from_error(err: &StoryError) -> Self {
        ErrorInfo {
            code: err.class().code(),
            class: err.class(),
            message: err.to_string(),
            cell: err.cell().map(str::to_string),
        }
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    pub grammar: String,
    pub state: StepState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl StepSummary {
    pub fn from_step(step: &Step) -> Self {
        StepSummary {
            grammar: step.grammar().to_string(),
            state: step.state(),
            expected: step.output().map(|cell| cell.expected.clone()),
            actual: step.actual().map(str::to_string),
            error: step
                .error()
                .map(|err| ErrorInfo::from_error(&StoryError::from(err.clone()))),
        }
    }
}

/// Outcome of one test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSummary {
    pub path: PathAddress,
    pub state: TestState,
    pub results: TestResults,
    pub steps: Vec<StepSummary>,
}

impl TestSummary {
    pub fn from_test(path: PathAddress, test: &Test) -> Self {
        TestSummary {
            path,
            state: test.state(),
            results: test.results().clone(),
            steps: test.steps().iter().map(StepSummary::from_step).collect(),
        }
    }
}

/// Test counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub not_run: usize,
}

impl Totals {
    fn add(&mut self, state: TestState) {
        self.tests += 1;
        match state {
            TestState::Passed => self.passed += 1,
            TestState::Failed => self.failed += 1,
            TestState::Errored => self.errored += 1,
            TestState::NotRun => self.not_run += 1,
        }
    }
}

/// Summary of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: String,
    pub totals: Totals,
    pub tests: Vec<TestSummary>,
}

impl RunSummary {
    pub fn new(tests: Vec<TestSummary>) -> Self {
        let mut totals = Totals::default();
        for test in &tests {
            totals.add(test.state);
        }
        RunSummary {
            schema_version: SCHEMA_VERSION.to_string(),
            totals,
            tests,
        }
    }

    /// Summarize every test in `hierarchy`.
    pub fn from_hierarchy(hierarchy: &Hierarchy) -> Self {
        RunSummary::new(
            hierarchy
                .tests_with_paths()
                .map(|(path, test)| TestSummary::from_test(path, test))
                .collect(),
        )
    }

    /// True when every test ran and passed.
    pub fn all_passed(&self) -> bool {
        self.totals.passed == self.totals.tests
    }
}

// ============================================================================
// Emission
// ============================================================================

/// Emit a summary as pretty-printed JSON.
pub fn emit_summary(summary: &RunSummary, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

// ============================================================================
// Tests
// ============================================================================
