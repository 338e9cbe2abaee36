//! Execution engine: the interpreter seam, raw values and the wire protocol.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod python;

pub use python::PythonLauncher;

/// Value produced by evaluating a script, before any classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// The script produced no value (Python `None`).
    Undefined,
    Null,
    Str(String),
    /// Any other value, carried as its string form.
    Object { repr: String },
}

impl RawValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RawValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// String form used as a last-resort text result.
    pub fn display_text(&self) -> Option<&str> {
        match self {
            RawValue::Undefined | RawValue::Null => None,
            RawValue::Str(s) => Some(s),
            RawValue::Object { repr } => Some(repr),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpreterError {
    /// The evaluated code raised; the interpreter itself is fine.
    #[error("{0}")]
    Raised(String),
    /// The interpreter could not be reached or answered garbage.
    #[error("{0}")]
    Transport(String),
}

/// Operations the host needs from an embedded interpreter.
#[async_trait]
pub trait Interpreter: Send {
    /// Load a capability package by name.
    async fn load_capability(&mut self, name: &str) -> Result<(), InterpreterError>;
    /// Execute statements in the shared global namespace.
    async fn run(&mut self, code: &str) -> Result<(), InterpreterError>;
    /// Evaluate a script and return the value of its trailing expression.
    async fn eval(&mut self, code: &str) -> Result<RawValue, InterpreterError>;
    /// Stop the interpreter. Used for cancellation and teardown.
    async fn shutdown(&mut self);
}

/// Creates interpreter handles. One launch per successful session initialization.
#[async_trait]
pub trait Launcher: Send + Sync {
    type Handle: Interpreter;

    async fn launch(&self) -> Result<Self::Handle, InterpreterError>;
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub(crate) enum Request<'a> {
    Load { id: u64, name: &'a str },
    Run { id: u64, code: &'a str },
    Eval { id: u64, code: &'a str },
}

impl Request<'_> {
    pub(crate) fn id(&self) -> u64 {
        match self {
            Request::Load { id, .. } | Request::Run { id, .. } | Request::Eval { id, .. } => *id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Response {
    pub id: Option<u64>,
    pub ok: bool,
    #[serde(default)]
    pub value: Option<WireValue>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireValue {
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

impl From<WireValue> for RawValue {
    fn from(v: WireValue) -> Self {
        match v.kind.as_str() {
            "none" => RawValue::Undefined,
            "null" => RawValue::Null,
            "str" => RawValue::Str(v.text),
            _ => RawValue::Object { repr: v.text },
        }
    }
}

impl Response {
    pub(crate) fn into_value(self) -> Result<RawValue, InterpreterError> {
        if self.ok {
            Ok(self.value.map(RawValue::from).unwrap_or(RawValue::Undefined))
        } else {
            Err(InterpreterError::Raised(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}
