//! Runtime type model for resolved values.
//!
//! Steps carry raw text; actions want typed arguments. This module describes
//! the types a cell can be resolved to ([`ValueType`]), the dynamically-typed
//! values the resolver produces ([`Value`]), and the [`Resolvable`] bridge
//! between those values and ordinary Rust types.
//!
//! ## Shapes
//!
//! | Rust type              | `ValueType`                 |
//! |------------------------|-----------------------------|
//! | `String`               | `Text`                      |
//! | `bool`                 | `Bool`                      |
//! | `i64`                  | `Int`                       |
//! | `i32`                  | `Int32`                     |
//! | `f64`                  | `Float`                     |
//! | `NaiveDateTime`        | `DateTime`                  |
//! | `TimeDelta`            | `Duration`                  |
//! | `chrono::Weekday`      | `Enum(DayOfWeek)`           |
//! | `Option<T>`            | `Nullable(T)`               |
//! | `Vec<T>`               | `Sequence(T)`               |
//! | `Box<[T]>`             | `Array(T)`                  |
//! | application enums      | `Enum(..)` via [`resolvable_enum!`](crate::resolvable_enum) |
//! | application objects    | `Object(..)` via [`resolvable_object!`](crate::resolvable_object) |

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta, Weekday};

use crate::resolver::ResolveError;

// ============================================================================
// Type Descriptors
// ============================================================================

/// Name of an application type, used as the identity of objects and enums.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName(String);

impl TypeName {
    /// Create a type name from a string.
    pub fn new(name: impl Into<String>) -> Self {
        TypeName(name.into())
    }

    /// Type name of a Rust type, as reported by [`std::any::type_name`].
    pub fn of<T: ?Sized>() -> Self {
        TypeName(std::any::type_name::<T>().to_string())
    }

    /// The name as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form: drop the module path
        let short = self.0.rsplit("::").next().unwrap_or(&self.0);
        f.write_str(short)
    }
}

/// An enumeration type: a name plus its member names in declaration order.
///
/// Identity is the type name; members are carried for matching only.
#[derive(Debug, Clone)]
pub struct EnumType {
    name: TypeName,
    members: Arc<[String]>,
}

impl EnumType {
    /// Create an enumeration type.
    pub fn new<I, S>(name: TypeName, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EnumType {
            name,
            members: members.into_iter().map(Into::<String>::into).collect(),
        }
    }

    /// Type name.
    pub fn name(&self) -> &TypeName {
        &self.name
    }

    /// Member names in declaration order.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Find the member matching `token`, ignoring ASCII case.
    pub fn find_member(&self, token: &str) -> Option<&str> {
        self.members
            .iter()
            .find(|m| m.eq_ignore_ascii_case(token))
            .map(String::as_str)
    }

    /// The `DayOfWeek` enumeration backing `chrono::Weekday`.
    pub fn day_of_week() -> Self {
        EnumType::new(
            TypeName::new("DayOfWeek"),
            [
                "Monday",
                "Tuesday",
                "Wednesday",
                "Thursday",
                "Friday",
                "Saturday",
                "Sunday",
            ],
        )
    }
}

impl PartialEq for EnumType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EnumType {}

impl Hash for EnumType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Target type of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Free text.
    Text,
    /// `true` / `false`.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 32-bit signed integer.
    Int32,
    /// Floating point number.
    Float,
    /// Calendar date and time of day.
    DateTime,
    /// Length of time.
    Duration,
    /// Enumeration with named members.
    Enum(EnumType),
    /// Application object type; parseable only through a registered finder.
    Object(TypeName),
    /// The execution context. Supplied by the caller, never parsed.
    Context,
    /// Optional wrapper over an inner type.
    Nullable(Box<ValueType>),
    /// Fixed-size array of elements.
    Array(Box<ValueType>),
    /// Ordered sequence of elements.
    Sequence(Box<ValueType>),
}

impl ValueType {
    /// Nullable wrapper over `inner`.
    pub fn nullable(inner: ValueType) -> Self {
        ValueType::Nullable(Box::new(inner))
    }

    /// Array of `element`.
    pub fn array(element: ValueType) -> Self {
        ValueType::Array(Box::new(element))
    }

    /// Sequence of `element`.
    pub fn sequence(element: ValueType) -> Self {
        ValueType::Sequence(Box::new(element))
    }

    /// Object type named after the Rust type `T`.
    pub fn object<T: ?Sized>() -> Self {
        ValueType::Object(TypeName::of::<T>())
    }

    /// True for the built-in primitive scalar kinds.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            ValueType::Text
                | ValueType::Bool
                | ValueType::Int
                | ValueType::Int32
                | ValueType::Float
                | ValueType::DateTime
                | ValueType::Duration
        )
    }

    /// Element type for arrays and sequences.
    pub fn element(&self) -> Option<&ValueType> {
        match self {
            ValueType::Array(element) | ValueType::Sequence(element) => Some(element),
            _ => None,
        }
    }

    /// True for arrays and sequences.
    pub fn is_list(&self) -> bool {
        self.element().is_some()
    }

    /// The inner type of a nullable wrapper, or `self`.
    pub fn without_nullable(&self) -> &ValueType {
        match self {
            ValueType::Nullable(inner) => inner,
            other => other,
        }
    }

    /// True when `NULL` resolves to no-value for this type.
    ///
    /// Nullable wrappers and reference-like types (text, objects, lists)
    /// accept the sentinel; value scalars do not.
    pub fn accepts_null(&self) -> bool {
        matches!(
            self,
            ValueType::Nullable(_)
                | ValueType::Text
                | ValueType::Object(_)
                | ValueType::Array(_)
                | ValueType::Sequence(_)
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Text => f.write_str("text"),
            ValueType::Bool => f.write_str("bool"),
            ValueType::Int => f.write_str("int"),
            ValueType::Int32 => f.write_str("int32"),
            ValueType::Float => f.write_str("float"),
            ValueType::DateTime => f.write_str("datetime"),
            ValueType::Duration => f.write_str("duration"),
            ValueType::Enum(ty) => write!(f, "{}", ty.name()),
            ValueType::Object(name) => write!(f, "{}", name),
            ValueType::Context => f.write_str("context"),
            ValueType::Nullable(inner) => write!(f, "{}?", inner),
            ValueType::Array(element) => write!(f, "{}[]", element),
            ValueType::Sequence(element) => write!(f, "seq<{}>", element),
        }
    }
}

// ============================================================================
// Runtime Values
// ============================================================================

/// A member of an enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    /// Enumeration type name.
    pub type_name: TypeName,
    /// Member name, as declared.
    pub member: String,
}

/// An application object produced by a finder.
///
/// Equality and formatting are captured from the concrete type when the
/// object is created, so two objects compare equal when they have the same
/// type and the type's own `PartialEq` says so.
#[derive(Clone)]
pub struct ObjectValue {
    type_name: TypeName,
    inner: Arc<dyn Any + Send + Sync>,
    eq: fn(&dyn Any, &dyn Any) -> bool,
    fmt: fn(&dyn Any, &mut fmt::Formatter<'_>) -> fmt::Result,
}

impl ObjectValue {
    /// Wrap an application object.
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync + PartialEq + fmt::Debug,
    {
        fn eq_impl<T: Any + PartialEq>(a: &dyn Any, b: &dyn Any) -> bool {
            match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }

        fn fmt_impl<T: Any + fmt::Debug>(
            value: &dyn Any,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            match value.downcast_ref::<T>() {
                Some(value) => write!(f, "{:?}", value),
                None => f.write_str("<object>"),
            }
        }

        ObjectValue {
            type_name: TypeName::of::<T>(),
            inner: Arc::new(value),
            eq: eq_impl::<T>,
            fmt: fmt_impl::<T>,
        }
    }

    /// Name of the wrapped type.
    pub fn type_name(&self) -> &TypeName {
        &self.type_name
    }

    /// Borrow the wrapped object as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl PartialEq for ObjectValue {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && (self.eq)(&*self.inner, &*other.inner)
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self.fmt)(&*self.inner, f)
    }
}

/// A resolved runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of a value.
    Null,
    Text(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    DateTime(NaiveDateTime),
    Duration(TimeDelta),
    Enum(EnumValue),
    /// Fixed-size array.
    Array(Vec<Value>),
    /// Ordered sequence.
    Sequence(Vec<Value>),
    Object(ObjectValue),
}

impl Value {
    /// Wrap an application object.
    pub fn object<T>(value: T) -> Self
    where
        T: Any + Send + Sync + PartialEq + fmt::Debug,
    {
        Value::Object(ObjectValue::new(value))
    }

    /// True for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short description of the value's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::DateTime(_) => "datetime",
            Value::Duration(_) => "duration",
            Value::Enum(_) => "enum",
            Value::Array(_) => "array",
            Value::Sequence(_) => "sequence",
            Value::Object(_) => "object",
        }
    }

    /// Elements of an array or sequence.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) | Value::Sequence(items) => Some(items),
            _ => None,
        }
    }
}

// ============================================================================
// Rust Type Bridge
// ============================================================================

/// Conversion between a Rust type and the runtime value model.
pub trait Resolvable: Sized {
    /// The target type descriptor for `Self`.
    fn value_type() -> ValueType;

    /// Extract `Self` from a resolved value.
    fn from_value(value: Value) -> Result<Self, ResolveError>;

    /// Convert `Self` into a runtime value.
    fn into_value(self) -> Value;
}

fn mismatch(expected: ValueType, found: &Value) -> ResolveError {
    ResolveError::TypeMismatch {
        expected: expected.to_string(),
        found: found.kind().to_string(),
    }
}

fn null_into(expected: ValueType) -> ResolveError {
    ResolveError::NullValue {
        type_name: expected.to_string(),
    }
}

impl Resolvable for String {
    fn value_type() -> ValueType {
        ValueType::Text
    }

    fn from_value(value: Value) -> Result<Self, ResolveError> {
        match value {
            Value::Text(text) => Ok(text),
            Value::Null => Err(null_into(Self::value_type())),
            other => Err(mismatch(Self::value_type(), &other)),
        }
    }

    fn into_value(self) -> Value {
        Value::Text(self)
    }
}

impl Resolvable for bool {
    fn value_type() -> ValueType {
        ValueType::Bool
    }

    fn from_value(value: Value) -> Result<Self, ResolveError> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Null => Err(null_into(Self::value_type())),
            other => Err(mismatch(Self::value_type(), &other)),
        }
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl Resolvable for i64 {
    fn value_type() -> ValueType {
        ValueType::Int
    }

    fn from_value(value: Value) -> Result<Self, ResolveError> {
        match value {
            Value::Int(n) => Ok(n),
            Value::Null => Err(null_into(Self::value_type())),
            other => Err(mismatch(Self::value_type(), &other)),
        }
    }

    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl Resolvable for i32 {
    fn value_type() -> ValueType {
        ValueType::Int32
    }

    fn from_value(value: Value) -> Result<Self, ResolveError> {
        let n = i64::from_value(value)?;
        i32::try_from(n).map_err(|_| ResolveError::OutOfRange {
            type_name: "i32".to_string(),
            value: n.to_string(),
        })
    }

    fn into_value(self) -> Value {
        Value::Int(i64::from(self))
    }
}

impl Resolvable for f64 {
    fn value_type() -> ValueType {
        ValueType::Float
    }

    fn from_value(value: Value) -> Result<Self, ResolveError> {
        match value {
            Value::Float(x) => Ok(x),
            // Finders for Float may hand back integers
            Value::Int(n) => Ok(n as f64),
            Value::Null => Err(null_into(Self::value_type())),
            other => Err(mismatch(Self::value_type(), &other)),
        }
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl Resolvable for NaiveDateTime {
    fn value_type() -> ValueType {
        ValueType::DateTime
    }

    fn from_value(value: Value) -> Result<Self, ResolveError> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            Value::Null => Err(null_into(Self::value_type())),
            other => Err(mismatch(Self::value_type(), &other)),
        }
    }

    fn into_value(self) -> Value {
        Value::DateTime(self)
    }
}

impl Resolvable for TimeDelta {
    fn value_type() -> ValueType {
        ValueType::Duration
    }

    fn from_value(value: Value) -> Result<Self, ResolveError> {
        match value {
            Value::Duration(d) => Ok(d),
            Value::Null => Err(null_into(Self::value_type())),
            other => Err(mismatch(Self::value_type(), &other)),
        }
    }

    fn into_value(self) -> Value {
        Value::Duration(self)
    }
}

impl Resolvable for Weekday {
    fn value_type() -> ValueType {
        ValueType::Enum(EnumType::day_of_week())
    }

    fn from_value(value: Value) -> Result<Self, ResolveError> {
        match value {
            Value::Enum(EnumValue { member, .. }) => {
                member
                    .parse::<Weekday>()
                    .map_err(|_| ResolveError::Unparseable {
                        type_name: "DayOfWeek".to_string(),
                        text: member.clone(),
                        reason: "not a day of the week".to_string(),
                    })
            }
            Value::Null => Err(null_into(Self::value_type())),
            other => Err(mismatch(Self::value_type(), &other)),
        }
    }

    fn into_value(self) -> Value {
        let member = match self {
            Weekday::Mon => "Monday",
            Weekday::Tue => "Tuesday",
            Weekday::Wed => "Wednesday",
            Weekday::Thu => "Thursday",
            Weekday::Fri => "Friday",
            Weekday::Sat => "Saturday",
            Weekday::Sun => "Sunday",
        };
        Value::Enum(EnumValue {
            type_name: TypeName::new("DayOfWeek"),
            member: member.to_string(),
        })
    }
}

impl<T: Resolvable> Resolvable for Option<T> {
    fn value_type() -> ValueType {
        ValueType::nullable(T::value_type())
    }

    fn from_value(value: Value) -> Result<Self, ResolveError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Some(value) => value.into_value(),
            None => Value::Null,
        }
    }
}

impl<T: Resolvable> Resolvable for Vec<T> {
    fn value_type() -> ValueType {
        ValueType::sequence(T::value_type())
    }

    fn from_value(value: Value) -> Result<Self, ResolveError> {
        match value {
            Value::Sequence(items) | Value::Array(items) => {
                items.into_iter().map(T::from_value).collect()
            }
            Value::Null => Err(null_into(Self::value_type())),
            other => Err(mismatch(Self::value_type(), &other)),
        }
    }

    fn into_value(self) -> Value {
        Value::Sequence(self.into_iter().map(Resolvable::into_value).collect())
    }
}

impl<T: Resolvable> Resolvable for Box<[T]> {
    fn value_type() -> ValueType {
        ValueType::array(T::value_type())
    }

    fn from_value(value: Value) -> Result<Self, ResolveError> {
        match value {
            Value::Array(items) | Value::Sequence(items) => items
                .into_iter()
                .map(T::from_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Vec::into_boxed_slice),
            Value::Null => Err(null_into(Self::value_type())),
            other => Err(mismatch(Self::value_type(), &other)),
        }
    }

    fn into_value(self) -> Value {
        Value::Array(
            self.into_vec()
                .into_iter()
                .map(Resolvable::into_value)
                .collect(),
        )
    }
}

/// Extract an application object of type `T` from a value.
///
/// Used by [`resolvable_object!`](crate::resolvable_object).
pub fn object_from_value<T>(value: Value) -> Result<T, ResolveError>
where
    T: Any + Clone,
{
    let expected = ValueType::object::<T>();
    match value {
        Value::Object(object) => object
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ResolveError::TypeMismatch {
                expected: expected.to_string(),
                found: object.type_name().to_string(),
            }),
        Value::Null => Err(null_into(expected)),
        other => Err(mismatch(expected, &other)),
    }
}

/// Extract an enum member name of enumeration `ty` from a value.
///
/// Used by [`resolvable_enum!`](crate::resolvable_enum).
pub fn enum_member_from_value(ty: &EnumType, value: Value) -> Result<String, ResolveError> {
    match value {
        Value::Enum(EnumValue { type_name, member }) if &type_name == ty.name() => Ok(member),
        Value::Null => Err(null_into(ValueType::Enum(ty.clone()))),
        other => Err(mismatch(ValueType::Enum(ty.clone()), &other)),
    }
}

/// Implement [`Resolvable`] for a fieldless application enum.
///
/// Members are matched case-insensitively by their Rust variant name. The
/// enumeration's identity is its full type path.
///
/// ```
/// use storyrun_core::resolvable_enum;
/// use storyrun_core::resolver::ValueResolver;
///
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// enum Tier { Bronze, Silver, Gold }
/// resolvable_enum!(Tier { Bronze, Silver, Gold });
///
/// let resolver = ValueResolver::new();
/// assert_eq!(resolver.from_string::<Tier>("gold").unwrap(), Tier::Gold);
/// ```
#[macro_export]
macro_rules! resolvable_enum {
    ($ty:ident { $($member:ident),+ $(,)? }) => {
        impl $crate::value::Resolvable for $ty {
            fn value_type() -> $crate::value::ValueType {
                $crate::value::ValueType::Enum($crate::value::EnumType::new(
                    $crate::value::TypeName::of::<$ty>(),
                    [$(stringify!($member)),+],
                ))
            }

            fn from_value(
                value: $crate::value::Value,
            ) -> ::std::result::Result<Self, $crate::resolver::ResolveError> {
                let ty = $crate::value::EnumType::new(
                    $crate::value::TypeName::of::<$ty>(),
                    [$(stringify!($member)),+],
                );
                let member = $crate::value::enum_member_from_value(&ty, value)?;
                match member.as_str() {
                    $(stringify!($member) => Ok($ty::$member),)+
                    _ => Err($crate::resolver::ResolveError::Unparseable {
                        type_name: stringify!($ty).to_string(),
                        text: member.clone(),
                        reason: "no such member".to_string(),
                    }),
                }
            }

            fn into_value(self) -> $crate::value::Value {
                let member = match self {
                    $($ty::$member => stringify!($member),)+
                };
                $crate::value::Value::Enum($crate::value::EnumValue {
                    type_name: $crate::value::TypeName::of::<$ty>(),
                    member: member.to_string(),
                })
            }
        }
    };
}

/// Implement [`Resolvable`] for an application object type.
///
/// The type must be `Clone + PartialEq + Debug + Send + Sync + 'static`.
/// Objects are only parseable once a finder is registered for them.
#[macro_export]
macro_rules! resolvable_object {
    ($ty:ty) => {
        impl $crate::value::Resolvable for $ty {
            fn value_type() -> $crate::value::ValueType {
                $crate::value::ValueType::object::<$ty>()
            }

            fn from_value(
                value: $crate::value::Value,
            ) -> ::std::result::Result<Self, $crate::resolver::ResolveError> {
                $crate::value::object_from_value::<$ty>(value)
            }

            fn into_value(self) -> $crate::value::Value {
                $crate::value::Value::object(self)
            }
        }
    };
}

// ============================================================================
// Tests
// ============================================================================
