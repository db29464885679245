//! Error types shared by the engine, the transforms and the CLI.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fmt;

use crate::HoleId;

#[derive(Debug, Error)]
pub enum JattackError {
    /// A node was asked to evaluate or step while it has no choice at all.
    #[error("no choice available: {0}")]
    NoChoice(String),

    /// `next()` on an iterator that has no next position.
    #[error("no next!")]
    Exhausted,

    /// A hole was reached outside of a driver invocation.
    #[error("hole {hole} evaluated from outside the driver")]
    NotDriven { hole: HoleId },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("compilation of {class} failed: {}", diagnostics.join("; "))]
    Compilation {
        class: String,
        diagnostics: Vec<String>,
    },

    #[error("redefinition of {class} failed: {reason}")]
    Redefinition { class: String, reason: String },

    /// A target-level exception in flight.
    #[error("uncaught {0}")]
    Thrown(Throwable),

    #[error("template error: {0}")]
    Template(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type JattackResult<T> = Result<T, JattackError>;

impl JattackError {
    /// Target exceptions are expected outcomes; everything else aborts the session.
    pub fn is_target_exception(&self) -> bool {
        matches!(self, Self::Thrown(_))
    }
}

pub const ARITHMETIC_EXCEPTION: &str = "java.lang.ArithmeticException";
pub const ARRAY_INDEX_EXCEPTION: &str = "java.lang.ArrayIndexOutOfBoundsException";
pub const NULL_POINTER_EXCEPTION: &str = "java.lang.NullPointerException";
pub const NEGATIVE_ARRAY_SIZE_EXCEPTION: &str = "java.lang.NegativeArraySizeException";
pub const CLASS_CAST_EXCEPTION: &str = "java.lang.ClassCastException";
pub const RUNTIME_EXCEPTION: &str = "java.lang.RuntimeException";

/// An exception raised by target code or by a node evaluated on its behalf.
///
/// `template` is set when the engine's own node evaluator raised it (for example a
/// division by zero inside a resolved hole) so the driver can tell generation noise
/// apart from exceptions thrown by the template's own code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Throwable {
    pub class: String,
    pub message: String,
    #[serde(default)]
    pub template: bool,
}

impl Throwable {
    pub fn new(class: &str, message: impl Into<String>) -> Self {
        Self {
            class: class.to_string(),
            message: message.into(),
            template: false,
        }
    }

    pub fn arithmetic() -> Self {
        Self::new(ARITHMETIC_EXCEPTION, "/ by zero")
    }

    pub fn array_index(index: i64, len: usize) -> Self {
        Self::new(
            ARRAY_INDEX_EXCEPTION,
            format!("Index {index} out of bounds for length {len}"),
        )
    }

    pub fn null_pointer() -> Self {
        Self::new(NULL_POINTER_EXCEPTION, "")
    }

    pub fn negative_array_size(len: i64) -> Self {
        Self::new(NEGATIVE_ARRAY_SIZE_EXCEPTION, len.to_string())
    }

    pub fn class_cast(from: &str, to: &str) -> Self {
        Self::new(CLASS_CAST_EXCEPTION, format!("{from} cannot be cast to {to}"))
    }

    pub fn from_template(mut self) -> Self {
        self.template = true;
        self
    }
}

impl fmt::Display for Throwable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.class)
        } else {
            write!(f, "{}: {}", self.class, self.message)
        }
    }
}

impl From<Throwable> for JattackError {
    fn from(t: Throwable) -> Self {
        Self::Thrown(t)
    }
}
