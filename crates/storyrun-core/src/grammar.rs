//! Grammars: binding a step's cells to an application action.
//!
//! A [`Grammar`] pairs a key with an [`ActionBinding`]. The binding declares
//! its parameter shape (ordered name/type pairs), an optional output slot,
//! and a description; it is invoked with resolved [`Arguments`] plus the
//! [`ExecutionContext`].
//!
//! Executing a step against a grammar:
//!
//! 1. Resolve every declared input cell with the [`ValueResolver`], failing
//!    fast on the first cell that does not resolve
//! 2. Invoke the action; an action error ends the step as `ExceptionThrown`
//! 3. Record the returned value as the step's actual text and compare it to
//!    the expected cell, resolved with the same type
//!
//! Errors never escape a step; they are attached to it.
//!
//! ## Explicit registration
//!
//! ```
//! use storyrun_core::grammar::{FnAction, Grammar, GrammarRegistry};
//! use storyrun_core::context::ExecutionContext;
//! use storyrun_core::resolver::ValueResolver;
//! use storyrun_core::step::{Step, StepState};
//!
//! let action = FnAction::builder("Add {a} and {b}")
//!     .param::<i64>("a")
//!     .param::<i64>("b")
//!     .returns::<i64>("sum")
//!     .build(|args, _ctx| Ok(args.get::<i64>("a")? + args.get::<i64>("b")?));
//!
//! let resolver = ValueResolver::new();
//! let mut registry = GrammarRegistry::new();
//! registry.register(Grammar::new("Add", action), &resolver).unwrap();
//!
//! let mut step = Step::new("Add").with_input("a", "2").with_input("b", "3").with_output("sum", "5");
//! let state = registry.execute(&mut step, &resolver, &ExecutionContext::new());
//! assert_eq!(state, StepState::Passed);
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::context::ExecutionContext;
use crate::resolver::{ResolveError, ValueResolver};
use crate::step::{Step, StepError, StepState};
use crate::value::{Resolvable, Value, ValueType};

// ============================================================================
// Error Types
// ============================================================================

/// Failure raised by a bound action.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    /// The application reported a failure.
    #[error("{message}")]
    Failed { message: String },

    /// The action asked for an argument that was not supplied.
    #[error("no argument named '{name}'")]
    MissingArgument { name: String },

    /// An argument could not be extracted as the requested type.
    #[error("argument '{name}': {source}")]
    Argument {
        name: String,
        #[source]
        source: ResolveError,
    },
}

impl ActionError {
    /// Create an application failure from any displayable error.
    pub fn failed(message: impl fmt::Display) -> Self {
        ActionError::Failed {
            message: message.to_string(),
        }
    }
}

/// A grammar whose declared types cannot be produced from cell text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("grammar '{grammar}': parameter '{parameter}' has unparseable type {type_name}")]
    UnsupportedParameter {
        grammar: String,
        parameter: String,
        type_name: String,
    },

    #[error("grammar '{grammar}': output '{cell}' has unparseable type {type_name}")]
    UnsupportedOutput {
        grammar: String,
        cell: String,
        type_name: String,
    },
}

// ============================================================================
// Shape
// ============================================================================

/// Converts a resolved value into the exact shape a Rust type accepts.
type Conform = fn(Value) -> Result<Value, ResolveError>;

fn conform_to<T: Resolvable>(value: Value) -> Result<Value, ResolveError> {
    T::from_value(value).map(Resolvable::into_value)
}

/// A declared input parameter.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub value_type: ValueType,
    conform: Option<Conform>,
}

impl Parameter {
    /// A parameter resolved from cell text into the Rust type `T`.
    pub fn of<T: Resolvable>(name: impl Into<String>) -> Self {
        Parameter {
            name: name.into(),
            value_type: T::value_type(),
            conform: Some(conform_to::<T>),
        }
    }

    /// A parameter supplied from the execution context.
    pub fn context(name: impl Into<String>) -> Self {
        Parameter {
            name: name.into(),
            value_type: ExecutionContext::value_type(),
            conform: None,
        }
    }

    /// True for parameters supplied from the execution context.
    pub fn is_context(&self) -> bool {
        self.value_type == ValueType::Context
    }

    /// Check that `value` can be extracted as the parameter's Rust type.
    pub fn conform(&self, value: Value) -> Result<Value, ResolveError> {
        match self.conform {
            Some(conform) => conform(value),
            None => Ok(value),
        }
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value_type == other.value_type
    }
}

impl Eq for Parameter {}

/// A declared output slot: the cell holding the expected value and its type.
#[derive(Debug, Clone)]
pub struct OutputSlot {
    pub cell: String,
    pub value_type: ValueType,
    conform: Conform,
}

impl OutputSlot {
    /// An output compared as the Rust type `T`.
    pub fn of<T: Resolvable>(cell: impl Into<String>) -> Self {
        OutputSlot {
            cell: cell.into(),
            value_type: T::value_type(),
            conform: conform_to::<T>,
        }
    }

    /// Check that an action result has the slot's Rust type.
    pub fn conform(&self, value: Value) -> Result<Value, ResolveError> {
        (self.conform)(value)
    }
}

impl PartialEq for OutputSlot {
    fn eq(&self, other: &Self) -> bool {
        self.cell == other.cell && self.value_type == other.value_type
    }
}

impl Eq for OutputSlot {}

/// Declared parameter and return shape of an action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionShape {
    pub parameters: Vec<Parameter>,
    pub output: Option<OutputSlot>,
}

impl ActionShape {
    /// Parameters resolved from cell text, in declaration order.
    pub fn cell_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| !p.is_context())
    }
}

// ============================================================================
// Arguments
// ============================================================================

/// Resolved argument values, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: IndexMap<String, Value>,
}

impl Arguments {
    pub fn new() -> Self {
        Arguments::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Borrow the raw value of argument `name`.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Extract argument `name` as `T`.
    pub fn get<T: Resolvable>(&self, name: &str) -> Result<T, ActionError> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| ActionError::MissingArgument {
                name: name.to_string(),
            })?;
        T::from_value(value.clone()).map_err(|source| ActionError::Argument {
            name: name.to_string(),
            source,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

// ============================================================================
// Action Binding
// ============================================================================

/// An executable application action with a declared shape.
///
/// Implementations must be shareable across threads; one binding serves
/// every test that uses its grammar.
pub trait ActionBinding: Send + Sync {
    /// Declared parameters and output slot.
    fn shape(&self) -> &ActionShape;

    /// Human-readable description for reports.
    fn description(&self) -> &str;

    /// Run the action. `Ok(None)` means the action produced no value.
    fn invoke(&self, args: &Arguments, ctx: &ExecutionContext)
        -> Result<Option<Value>, ActionError>;
}

/// Conversion from an action's return type to an optional value.
pub trait ActionOutput {
    fn into_output(self) -> Option<Value>;
}

impl ActionOutput for () {
    fn into_output(self) -> Option<Value> {
        None
    }
}

impl<T: Resolvable> ActionOutput for T {
    fn into_output(self) -> Option<Value> {
        Some(self.into_value())
    }
}

type ActionFn =
    dyn Fn(&Arguments, &ExecutionContext) -> Result<Option<Value>, ActionError> + Send + Sync;

/// An action bound by explicit registration of a closure.
#[derive(Clone)]
pub struct FnAction {
    shape: ActionShape,
    description: String,
    func: Arc<ActionFn>,
}

impl fmt::Debug for FnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction")
            .field("shape", &self.shape)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl FnAction {
    /// Start declaring an action with the given description.
    pub fn builder(description: impl Into<String>) -> FnActionBuilder {
        FnActionBuilder {
            shape: ActionShape::default(),
            description: description.into(),
        }
    }
}

impl ActionBinding for FnAction {
    fn shape(&self) -> &ActionShape {
        &self.shape
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn invoke(
        &self,
        args: &Arguments,
        ctx: &ExecutionContext,
    ) -> Result<Option<Value>, ActionError> {
        (self.func)(args, ctx)
    }
}

/// Builder for [`FnAction`].
#[derive(Debug, Clone)]
pub struct FnActionBuilder {
    shape: ActionShape,
    description: String,
}

impl FnActionBuilder {
    /// Declare an input parameter resolved from the cell `name`.
    pub fn param<T: Resolvable>(mut self, name: impl Into<String>) -> Self {
        self.shape.parameters.push(Parameter::of::<T>(name));
        self
    }

    /// Declare a parameter supplied by the execution context.
    pub fn context_param(mut self, name: impl Into<String>) -> Self {
        self.shape.parameters.push(Parameter::context(name));
        self
    }

    /// Declare the output cell and the type its expected value resolves to.
    pub fn returns<T: Resolvable>(mut self, cell: impl Into<String>) -> Self {
        self.shape.output = Some(OutputSlot::of::<T>(cell));
        self
    }

    /// Finish the binding with the action body.
    pub fn build<F, R>(self, func: F) -> FnAction
    where
        F: Fn(&Arguments, &ExecutionContext) -> Result<R, ActionError> + Send + Sync + 'static,
        R: ActionOutput,
    {
        FnAction {
            shape: self.shape,
            description: self.description,
            func: Arc::new(move |args, ctx| func(args, ctx).map(ActionOutput::into_output)),
        }
    }
}

// ============================================================================
// Grammar
// ============================================================================

/// A named binding between a step's cells and an action.
#[derive(Clone)]
pub struct Grammar {
    key: String,
    binding: Arc<dyn ActionBinding>,
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("key", &self.key)
            .field("description", &self.binding.description())
            .finish()
    }
}

impl Grammar {
    pub fn new(key: impl Into<String>, binding: impl ActionBinding + 'static) -> Self {
        Grammar {
            key: key.into(),
            binding: Arc::new(binding),
        }
    }

    /// Create a grammar around an already-shared binding.
    pub fn from_shared(key: impl Into<String>, binding: Arc<dyn ActionBinding>) -> Self {
        Grammar {
            key: key.into(),
            binding,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn description(&self) -> &str {
        self.binding.description()
    }

    pub fn shape(&self) -> &ActionShape {
        self.binding.shape()
    }

    /// Check that every declared cell type can be produced from text.
    pub fn validate(&self, resolver: &ValueResolver) -> Result<(), GrammarError> {
        let shape = self.shape();
        for parameter in shape.cell_parameters() {
            if !resolver.can_be_parsed(&parameter.value_type) {
                return Err(GrammarError::UnsupportedParameter {
                    grammar: self.key.clone(),
                    parameter: parameter.name.clone(),
                    type_name: parameter.value_type.to_string(),
                });
            }
        }
        if let Some(slot) = &shape.output {
            if !resolver.can_be_parsed(&slot.value_type) {
                return Err(GrammarError::UnsupportedOutput {
                    grammar: self.key.clone(),
                    cell: slot.cell.clone(),
                    type_name: slot.value_type.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Execute `step` and return its terminal state.
    pub fn execute(
        &self,
        step: &mut Step,
        resolver: &ValueResolver,
        ctx: &ExecutionContext,
    ) -> StepState {
        step.begin();

        if ctx.is_cancelled() {
            debug!(grammar = %self.key, "context cancelled, skipping action");
            return step.throw(StepError::Cancelled);
        }

        let args = match self.resolve_arguments(step, resolver) {
            Ok(args) => args,
            Err(err) => {
                warn!(grammar = %self.key, error = %err, "step input did not resolve");
                return step.throw(err);
            }
        };

        let result = match self.binding.invoke(&args, ctx) {
            Ok(result) => result,
            Err(err) => {
                warn!(grammar = %self.key, error = %err, "action failed");
                return step.throw(StepError::Action(err));
            }
        };

        let (Some(slot), Some(cell)) = (&self.shape().output, step.output().cloned()) else {
            return step.finish(true);
        };

        let actual = result.unwrap_or(Value::Null);
        step.record_actual(resolver.format(&actual));

        let actual = if actual.is_null() {
            actual
        } else {
            match slot.conform(actual) {
                Ok(actual) => actual,
                Err(source) => {
                    warn!(grammar = %self.key, error = %source, "action result does not match output type");
                    return step.throw(StepError::Output {
                        cell: cell.name,
                        source,
                    });
                }
            }
        };

        match resolver.resolve(&slot.value_type, &cell.expected) {
            Ok(expected) => {
                let passed = expected == actual;
                debug!(grammar = %self.key, passed, expected = %cell.expected, "compared output");
                step.finish(passed)
            }
            Err(source) => step.throw(StepError::Resolve {
                cell: cell.name,
                source,
            }),
        }
    }

    fn resolve_arguments(
        &self,
        step: &Step,
        resolver: &ValueResolver,
    ) -> Result<Arguments, StepError> {
        let mut args = Arguments::new();
        for parameter in self.shape().cell_parameters() {
            let text = step
                .input(&parameter.name)
                .ok_or_else(|| StepError::MissingCell {
                    cell: parameter.name.clone(),
                })?;
            let value = resolver
                .resolve(&parameter.value_type, text)
                .and_then(|value| parameter.conform(value))
                .map_err(|source| StepError::Resolve {
                    cell: parameter.name.clone(),
                    source,
                })?;
            args.insert(parameter.name.clone(), value);
        }
        Ok(args)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Grammars looked up by key at execution time.
#[derive(Debug, Clone, Default)]
pub struct GrammarRegistry {
    grammars: IndexMap<String, Grammar>,
}

impl GrammarRegistry {
    pub fn new() -> Self {
        GrammarRegistry::default()
    }

    /// Validate and register a grammar, replacing any grammar with the same key.
    pub fn register(
        &mut self,
        grammar: Grammar,
        resolver: &ValueResolver,
    ) -> Result<(), GrammarError> {
        grammar.validate(resolver)?;
        debug!(key = grammar.key(), description = grammar.description(), "registered grammar");
        self.grammars.insert(grammar.key.clone(), grammar);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Grammar> {
        self.grammars.get(key)
    }

    /// Registered keys in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.grammars.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }

    /// Execute `step` with the grammar named by its key.
    pub fn execute(
        &self,
        step: &mut Step,
        resolver: &ValueResolver,
        ctx: &ExecutionContext,
    ) -> StepState {
        match self.grammars.get(step.grammar()) {
            Some(grammar) => grammar.execute(step, resolver, ctx),
            None => {
                let key = step.grammar().to_string();
                warn!(grammar = %key, "no grammar registered");
                step.begin();
                step.throw(StepError::UnknownGrammar { key })
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
