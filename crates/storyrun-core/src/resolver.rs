//! Value resolution: converting cell text into typed values.
//!
//! A [`ValueResolver`] decides whether a target type can be produced from
//! text ([`ValueResolver::can_be_parsed`]) and performs the conversion
//! ([`ValueResolver::resolve`], [`ValueResolver::from_string`]). It is
//! stateless per call and stateful by registration: application code can
//! register a *finder* for any type, which then takes precedence over the
//! built-in rules for that exact type.
//!
//! ## Resolution order
//!
//! 1. Sentinel tokens (`NULL`, `BLANK`, `EMPTY`), matched exactly
//! 2. A registered finder for the exact target type
//! 3. Built-in rules, first match wins:
//!    - nullable: unwrap and resolve the inner type
//!    - primitive: text, bool, int, float, date/time, duration
//!    - enum: case-insensitive member name
//!    - list: comma-split, trim, resolve each element
//!
//! ## Example
//!
//! ```
//! use storyrun_core::resolver::ValueResolver;
//!
//! let mut resolver = ValueResolver::new();
//! assert_eq!(resolver.from_string::<Vec<i64>>("1, 2, 3").unwrap(), vec![1, 2, 3]);
//! assert_eq!(resolver.from_string::<Option<bool>>("NULL").unwrap(), None);
//!
//! resolver.register_finder::<i64, std::num::ParseIntError>(|text| text.trim().parse::<i64>().map(|n| n * 10));
//! assert_eq!(resolver.from_string::<i64>("4").unwrap(), 40);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::{debug, trace};

use crate::dates::{self, Clock, DateOrder, SystemClock};
use crate::duration;
use crate::value::{EnumValue, Resolvable, Value, ValueType};

// ============================================================================
// Sentinels
// ============================================================================

/// No value. Resolves to [`Value::Null`] for types that accept null.
pub const NULL: &str = "NULL";

/// The empty string, for text targets.
pub const BLANK: &str = "BLANK";

/// A zero-length list, for array and sequence targets.
pub const EMPTY: &str = "EMPTY";

/// Element delimiter for arrays and sequences.
pub const LIST_DELIMITER: char = ',';

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while resolving text into a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The text cannot be converted to the requested type.
    #[error("cannot parse '{text}' as {type_name}: {reason}")]
    Unparseable {
        type_name: String,
        text: String,
        reason: String,
    },

    /// No rule or finder can produce the requested type.
    #[error("type {type_name} cannot be parsed from text")]
    UnsupportedType { type_name: String },

    /// `NULL` was extracted into a type that cannot hold it.
    #[error("NULL cannot be assigned to {type_name}")]
    NullValue { type_name: String },

    /// A resolved value had a different shape than the extraction expected.
    #[error("expected {expected} value, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// A resolved number did not fit the extraction type.
    #[error("value {value} is out of range for {type_name}")]
    OutOfRange { type_name: String, value: String },
}

impl ResolveError {
    fn unparseable(ty: &ValueType, text: &str, reason: impl Into<String>) -> Self {
        ResolveError::Unparseable {
            type_name: ty.to_string(),
            text: text.to_string(),
            reason: reason.into(),
        }
    }

    fn unsupported(ty: &ValueType) -> Self {
        ResolveError::UnsupportedType {
            type_name: ty.to_string(),
        }
    }
}

// ============================================================================
// Finders
// ============================================================================

/// A registered text-to-value conversion for one type.
pub type Finder = Arc<dyn Fn(&str) -> Result<Value, String> + Send + Sync>;

// ============================================================================
// Built-in Rule Chain
// ============================================================================

/// One built-in conversion rule: a type predicate and a converter.
struct ConversionRule {
    name: &'static str,
    matches: fn(&ValueResolver, &ValueType) -> bool,
    convert: fn(&ValueResolver, &ValueType, &str) -> Result<Value, ResolveError>,
}

/// Built-in rules in priority order. Finders are consulted before any of these.
const BUILTIN_RULES: &[ConversionRule] = &[
    ConversionRule {
        name: "nullable",
        matches: nullable_matches,
        convert: nullable_convert,
    },
    ConversionRule {
        name: "primitive",
        matches: primitive_matches,
        convert: primitive_convert,
    },
    ConversionRule {
        name: "enum",
        matches: enum_matches,
        convert: enum_convert,
    },
    ConversionRule {
        name: "list",
        matches: list_matches,
        convert: list_convert,
    },
];

fn nullable_matches(resolver: &ValueResolver, ty: &ValueType) -> bool {
    match ty {
        ValueType::Nullable(inner) => resolver.can_be_parsed(inner),
        _ => false,
    }
}

fn nullable_convert(
    resolver: &ValueResolver,
    ty: &ValueType,
    text: &str,
) -> Result<Value, ResolveError> {
    match ty {
        ValueType::Nullable(inner) => resolver.resolve(inner, text),
        _ => Err(ResolveError::unsupported(ty)),
    }
}

fn primitive_matches(_resolver: &ValueResolver, ty: &ValueType) -> bool {
    ty.is_primitive()
}

fn primitive_convert(
    resolver: &ValueResolver,
    ty: &ValueType,
    text: &str,
) -> Result<Value, ResolveError> {
    match ty {
        ValueType::Text => Ok(Value::Text(text.to_string())),
        ValueType::Bool => {
            let token = text.trim();
            if token.eq_ignore_ascii_case("true") {
                Ok(Value::Bool(true))
            } else if token.eq_ignore_ascii_case("false") {
                Ok(Value::Bool(false))
            } else {
                Err(ResolveError::unparseable(ty, text, "expected true or false"))
            }
        }
        ValueType::Int => text
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| ResolveError::unparseable(ty, text, e.to_string())),
        ValueType::Int32 => text
            .trim()
            .parse::<i32>()
            .map(|n| Value::Int(i64::from(n)))
            .map_err(|e| ResolveError::unparseable(ty, text, e.to_string())),
        ValueType::Float => text
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| ResolveError::unparseable(ty, text, e.to_string())),
        ValueType::DateTime => resolver.date_time(text).map(Value::DateTime),
        ValueType::Duration => duration::parse_duration(text).map(Value::Duration),
        _ => Err(ResolveError::unsupported(ty)),
    }
}

fn enum_matches(_resolver: &ValueResolver, ty: &ValueType) -> bool {
    matches!(ty, ValueType::Enum(_))
}

fn enum_convert(
    _resolver: &ValueResolver,
    ty: &ValueType,
    text: &str,
) -> Result<Value, ResolveError> {
    let ValueType::Enum(enum_type) = ty else {
        return Err(ResolveError::unsupported(ty));
    };

    match enum_type.find_member(text.trim()) {
        Some(member) => Ok(Value::Enum(EnumValue {
            type_name: enum_type.name().clone(),
            member: member.to_string(),
        })),
        None => Err(ResolveError::unparseable(
            ty,
            text,
            format!("expected one of: {}", enum_type.members().join(", ")),
        )),
    }
}

fn list_matches(resolver: &ValueResolver, ty: &ValueType) -> bool {
    match ty.element() {
        Some(element) => resolver.can_parse_element(element),
        None => false,
    }
}

fn list_convert(
    resolver: &ValueResolver,
    ty: &ValueType,
    text: &str,
) -> Result<Value, ResolveError> {
    let element = ty.element().ok_or_else(|| ResolveError::unsupported(ty))?;

    let items = text
        .split(LIST_DELIMITER)
        .map(|piece| resolver.resolve(element, piece.trim()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(match ty {
        ValueType::Array(_) => Value::Array(items),
        _ => Value::Sequence(items),
    })
}

// ============================================================================
// Value Resolver
// ============================================================================

/// Converts cell text into typed values.
///
/// Registrations accumulate for the lifetime of the resolver. Register all
/// finders before sharing the resolver across threads; resolution itself
/// only reads resolver state.
#[derive(Clone)]
pub struct ValueResolver {
    finders: HashMap<ValueType, Finder>,
    clock: Arc<dyn Clock>,
    date_order: DateOrder,
}

impl Default for ValueResolver {
    fn default() -> Self {
        ValueResolver::new()
    }
}

impl fmt::Debug for ValueResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut finder_types: Vec<String> = self.finders.keys().map(ToString::to_string).collect();
        finder_types.sort();
        f.debug_struct("ValueResolver")
            .field("finders", &finder_types)
            .field("clock", &self.clock)
            .field("date_order", &self.date_order)
            .finish()
    }
}

impl ValueResolver {
    /// Create a resolver using the system clock and month-first slash dates.
    pub fn new() -> Self {
        ValueResolver {
            finders: HashMap::new(),
            clock: Arc::new(SystemClock),
            date_order: DateOrder::default(),
        }
    }

    /// Replace the clock used for relative dates.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the field order used for slash dates.
    pub fn with_date_order(mut self, order: DateOrder) -> Self {
        self.date_order = order;
        self
    }

    /// Field order used for slash dates.
    pub fn date_order(&self) -> DateOrder {
        self.date_order
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Register a finder for the Rust type `T`.
    ///
    /// Replaces any earlier finder for the same type and overrides the
    /// built-in rule for it, including when `T` is reached through a
    /// nullable wrapper or as a list element.
    pub fn register_finder<T, E>(
        &mut self,
        finder: impl Fn(&str) -> Result<T, E> + Send + Sync + 'static,
    ) where
        T: Resolvable,
        E: fmt::Display,
    {
        let finder: Finder = Arc::new(move |text: &str| {
            finder(text)
                .map(Resolvable::into_value)
                .map_err(|e| e.to_string())
        });
        self.register_finder_for(T::value_type(), finder);
    }

    /// Register a finder for a type descriptor.
    pub fn register_finder_for(&mut self, ty: ValueType, finder: Finder) {
        let replaced = self.finders.insert(ty.clone(), finder).is_some();
        debug!(target_type = %ty, replaced, "registered finder");
    }

    /// True when a finder is registered for exactly `ty`.
    pub fn has_finder(&self, ty: &ValueType) -> bool {
        self.finders.contains_key(ty)
    }

    // ------------------------------------------------------------------------
    // Classification
    // ------------------------------------------------------------------------

    /// True when a value of `ty` can be produced from text.
    pub fn can_be_parsed(&self, ty: &ValueType) -> bool {
        self.has_finder(ty) || BUILTIN_RULES.iter().any(|rule| (rule.matches)(self, ty))
    }

    /// Typed form of [`can_be_parsed`](Self::can_be_parsed).
    pub fn can_parse<T: Resolvable>(&self) -> bool {
        self.can_be_parsed(&T::value_type())
    }

    /// Elements may be anything parseable except another list.
    fn can_parse_element(&self, element: &ValueType) -> bool {
        if self.has_finder(element) {
            return true;
        }
        !element.without_nullable().is_list() && self.can_be_parsed(element)
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    /// Resolve `text` into a value of `ty`.
    pub fn resolve(&self, ty: &ValueType, text: &str) -> Result<Value, ResolveError> {
        if let Some(value) = self.sentinel(ty, text) {
            trace!(target_type = %ty, text, "resolved sentinel");
            return Ok(value);
        }

        if let Some(finder) = self.finders.get(ty) {
            return finder(text).map_err(|reason| ResolveError::unparseable(ty, text, reason));
        }

        match BUILTIN_RULES.iter().find(|rule| (rule.matches)(self, ty)) {
            Some(rule) => {
                trace!(target_type = %ty, rule = rule.name, "resolving with built-in rule");
                (rule.convert)(self, ty, text)
            }
            None => Err(ResolveError::unsupported(ty)),
        }
    }

    /// Resolve `text` into the Rust type `T`.
    pub fn from_string<T: Resolvable>(&self, text: &str) -> Result<T, ResolveError> {
        let value = self.resolve(&T::value_type(), text)?;
        T::from_value(value)
    }

    /// Sentinel handling, run before any finder or rule.
    fn sentinel(&self, ty: &ValueType, text: &str) -> Option<Value> {
        match text {
            NULL if ty.accepts_null() => Some(Value::Null),
            BLANK if *ty.without_nullable() == ValueType::Text => Some(Value::Text(String::new())),
            EMPTY => match ty.without_nullable() {
                ValueType::Array(_) => Some(Value::Array(Vec::new())),
                ValueType::Sequence(_) => Some(Value::Sequence(Vec::new())),
                _ => None,
            },
            _ => None,
        }
    }

    /// Parse date/time text against this resolver's clock and date order.
    pub fn date_time(&self, text: &str) -> Result<NaiveDateTime, ResolveError> {
        dates::parse_date_time(text, self.clock.today(), self.date_order)
    }

    // ------------------------------------------------------------------------
    // Formatting
    // ------------------------------------------------------------------------

    /// Render a value as cell text.
    ///
    /// The output uses the same conventions resolution accepts: sentinels
    /// for null, empty text and empty lists, comma-joined lists, and the
    /// canonical date/time and duration forms.
    pub fn format(&self, value: &Value) -> String {
        match value {
            Value::Null => NULL.to_string(),
            Value::Text(text) if text.is_empty() => BLANK.to_string(),
            Value::Text(text) => text.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(x) => x.to_string(),
            Value::DateTime(dt) => dates::format_date_time(dt),
            Value::Duration(d) => duration::format_duration(d),
            Value::Enum(e) => e.member.clone(),
            Value::Array(items) | Value::Sequence(items) if items.is_empty() => EMPTY.to_string(),
            Value::Array(items) | Value::Sequence(items) => items
                .iter()
                .map(|item| self.format(item))
                .collect::<Vec<_>>()
                .join(", "),
            Value::Object(object) => format!("{:?}", object),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
