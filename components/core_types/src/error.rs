//! JavaScript error types.
//!
//! A [`JsError`] is what a callback returns in its `Err` arm, i.e. a throw.
//! Since JavaScript can throw any value, the `Thrown` kind carries the
//! original value so it can be recovered unchanged as a rejection reason.

use crate::Value;
use std::fmt;

/// The kind of JavaScript error.
///
/// These correspond to JavaScript's built-in error constructors, plus
/// [`ErrorKind::Thrown`] for non-error values passed to `throw`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Generic `Error`
    Error,
    /// Type error (e.g., chaining a promise to itself)
    TypeError,
    /// Value out of allowed range
    RangeError,
    /// Reference to an undefined variable
    ReferenceError,
    /// Every input of `Promise.any` rejected
    AggregateError,
    /// A timer-backed deadline elapsed
    TimeoutError,
    /// Internal engine error
    InternalError,
    /// A non-error value was thrown
    Thrown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::AggregateError => "AggregateError",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::InternalError => "InternalError",
            ErrorKind::Thrown => "Uncaught",
        };
        f.write_str(name)
    }
}

/// A JavaScript exception.
///
/// # Examples
///
/// ```
/// use core_types::{ErrorKind, JsError, Value};
///
/// let error = JsError::new(ErrorKind::TypeError, "undefined is not a function");
/// assert_eq!(error.to_string(), "TypeError: undefined is not a function");
///
/// // Arbitrary thrown values survive a throw/catch round trip.
/// let thrown = JsError::from_value(Value::from("boom"));
/// assert_eq!(thrown.into_value(), Value::from("boom"));
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct JsError {
    /// The type of error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Aggregated reasons (only populated for `AggregateError`)
    pub errors: Vec<Value>,
    /// The original value for [`ErrorKind::Thrown`]
    pub thrown: Option<Box<Value>>,
}

impl JsError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            errors: Vec::new(),
            thrown: None,
        }
    }

    /// Creates a `TypeError`.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    /// Creates an `AggregateError` carrying every reason in order.
    pub fn aggregate(message: impl Into<String>, errors: Vec<Value>) -> Self {
        Self {
            errors,
            ..Self::new(ErrorKind::AggregateError, message)
        }
    }

    /// Wraps an arbitrary thrown value.
    ///
    /// Error values are unwrapped so that rethrowing a caught error yields
    /// the same error rather than a nested one.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Error(error) => *error,
            other => Self {
                message: other.to_string(),
                thrown: Some(Box::new(other)),
                ..Self::new(ErrorKind::Thrown, String::new())
            },
        }
    }

    /// Converts the error back into the value observed by a rejection handler.
    pub fn into_value(self) -> Value {
        match self.thrown {
            Some(value) if self.kind == ErrorKind::Thrown => *value,
            _ => Value::Error(Box::new(self)),
        }
    }
}

impl From<JsError> for Value {
    fn from(error: JsError) -> Self {
        error.into_value()
    }
}
