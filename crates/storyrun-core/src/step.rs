//! Steps: one executable row of a test.
//!
//! A [`Step`] names a grammar and carries the raw cell text the author wrote:
//! named input cells and at most one output cell holding the expected value.
//! Execution records the actual value and moves the step through
//!
//! ```text
//! NotRun -> Executing -> { Passed | Failed | ExceptionThrown }
//! ```
//!
//! [`Step::reset`] restores the pre-run state.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grammar::ActionError;
use crate::resolver::ResolveError;

/// Execution state of a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    #[default]
    NotRun,
    Executing,
    Passed,
    Failed,
    ExceptionThrown,
}

impl StepState {
    /// True for `Passed`, `Failed` and `ExceptionThrown`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepState::Passed | StepState::Failed | StepState::ExceptionThrown
        )
    }
}

/// Why a step ended in [`StepState::ExceptionThrown`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    /// A cell's text could not be resolved to its declared type.
    #[error("cell '{cell}': {source}")]
    Resolve {
        cell: String,
        #[source]
        source: ResolveError,
    },

    /// The action returned a value of a different type than its output cell.
    #[error("output '{cell}': action result does not fit: {source}")]
    Output {
        cell: String,
        #[source]
        source: ResolveError,
    },

    /// The grammar declares an input the step does not supply.
    #[error("cell '{cell}' is missing")]
    MissingCell { cell: String },

    /// No grammar is registered under the step's key.
    #[error("unknown grammar '{key}'")]
    UnknownGrammar { key: String },

    /// The bound action failed.
    #[error("action failed: {0}")]
    Action(#[from] ActionError),

    /// The execution context was cancelled before the action ran.
    #[error("cancelled before execution")]
    Cancelled,
}

impl StepError {
    /// Name of the cell the error is attributed to, if any.
    pub fn cell(&self) -> Option<&str> {
        match self {
            StepError::Resolve { cell, .. }
            | StepError::Output { cell, .. }
            | StepError::MissingCell { cell } => Some(cell),
            _ => None,
        }
    }
}

/// The expected-value cell, plus the actual value after execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputCell {
    pub name: String,
    pub expected: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

/// One executable row of a test.
#[derive(Debug, Clone)]
pub struct Step {
    grammar: String,
    inputs: IndexMap<String, String>,
    output: Option<OutputCell>,
    state: StepState,
    error: Option<StepError>,
}

impl Step {
    /// Create a step for grammar `key` with no cells.
    pub fn new(key: impl Into<String>) -> Self {
        Step {
            grammar: key.into(),
            inputs: IndexMap::new(),
            output: None,
            state: StepState::NotRun,
            error: None,
        }
    }

    /// Add an input cell.
    pub fn with_input(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.inputs.insert(name.into(), text.into());
        self
    }

    /// Set the output cell and its expected text.
    pub fn with_output(mut self, name: impl Into<String>, expected: impl Into<String>) -> Self {
        self.output = Some(OutputCell {
            name: name.into(),
            expected: expected.into(),
            actual: None,
        });
        self
    }

    pub fn grammar(&self) -> &str {
        &self.grammar
    }

    /// Input cells in declaration order.
    pub fn inputs(&self) -> &IndexMap<String, String> {
        &self.inputs
    }

    /// Raw text of the input cell `name`.
    pub fn input(&self, name: &str) -> Option<&str> {
        self.inputs.get(name).map(String::as_str)
    }

    pub fn output(&self) -> Option<&OutputCell> {
        self.output.as_ref()
    }

    /// Actual value recorded by the last execution.
    pub fn actual(&self) -> Option<&str> {
        self.output.as_ref().and_then(|cell| cell.actual.as_deref())
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    /// Error attached by the last execution.
    pub fn error(&self) -> Option<&StepError> {
        self.error.as_ref()
    }

    /// Restore the pre-run state: `NotRun`, no actual value, no error.
    pub fn reset(&mut self) {
        self.state = StepState::NotRun;
        self.error = None;
        if let Some(cell) = self.output.as_mut() {
            cell.actual = None;
        }
    }

    // ------------------------------------------------------------------------
    // Transitions (driven by grammar execution)
    // ------------------------------------------------------------------------

    pub(crate) fn begin(&mut self) {
        self.reset();
        self.state = StepState::Executing;
    }

    pub(crate) fn record_actual(&mut self, text: String) {
        if let Some(cell) = self.output.as_mut() {
            cell.actual = Some(text);
        }
    }

    pub(crate) fn finish(&mut self, passed: bool) -> StepState {
        self.state = if passed {
            StepState::Passed
        } else {
            StepState::Failed
        };
        self.state
    }

    pub(crate) fn throw(&mut self, error: StepError) -> StepState {
        self.state = StepState::ExceptionThrown;
        self.error = Some(error);
        self.state
    }
}
