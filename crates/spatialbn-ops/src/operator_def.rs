//! Operator definitions and named-argument access.
//!
//! An [`OperatorDef`] names the operator type, its positional input and
//! output blobs, and a list of typed [`Argument`]s. The JSON form mirrors
//! the usual protobuf text layout:
//!
//! ```json
//! {
//!   "type": "SpatialBN",
//!   "input": ["X", "scale", "bias", "mean", "var"],
//!   "output": ["Y"],
//!   "arg": [{ "name": "is_test", "i": 1 }, { "name": "order", "s": "NHWC" }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use spatialbn_common::{ConfigError, Result};

/// Value carried by a named argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArgumentValue {
    #[serde(rename = "i")]
    Int(i64),
    #[serde(rename = "f")]
    Float(f32),
    #[serde(rename = "s")]
    String(String),
    #[serde(rename = "ints")]
    Ints(Vec<i64>),
    #[serde(rename = "floats")]
    Floats(Vec<f32>),
    #[serde(rename = "strings")]
    Strings(Vec<String>),
}

impl From<i64> for ArgumentValue {
    fn from(v: i64) -> Self {
        ArgumentValue::Int(v)
    }
}

impl From<i32> for ArgumentValue {
    fn from(v: i32) -> Self {
        ArgumentValue::Int(v as i64)
    }
}

impl From<bool> for ArgumentValue {
    fn from(v: bool) -> Self {
        ArgumentValue::Int(v as i64)
    }
}

impl From<f32> for ArgumentValue {
    fn from(v: f32) -> Self {
        ArgumentValue::Float(v)
    }
}

impl From<&str> for ArgumentValue {
    fn from(v: &str) -> Self {
        ArgumentValue::String(v.to_string())
    }
}

impl From<String> for ArgumentValue {
    fn from(v: String) -> Self {
        ArgumentValue::String(v)
    }
}

/// A named argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    #[serde(flatten)]
    pub value: ArgumentValue,
}

/// Types that can be read out of a single argument value.
pub trait FromArgument: Sized {
    /// Shown in type-mismatch errors.
    const EXPECTED: &'static str;

    fn from_argument(value: &ArgumentValue) -> Option<Self>;
}

impl FromArgument for i64 {
    const EXPECTED: &'static str = "int";

    fn from_argument(value: &ArgumentValue) -> Option<Self> {
        match value {
            ArgumentValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

/// Booleans travel as ints; any non-zero value is true.
impl FromArgument for bool {
    const EXPECTED: &'static str = "int";

    fn from_argument(value: &ArgumentValue) -> Option<Self> {
        i64::from_argument(value).map(|v| v != 0)
    }
}

impl FromArgument for f32 {
    const EXPECTED: &'static str = "float";

    fn from_argument(value: &ArgumentValue) -> Option<Self> {
        match value {
            ArgumentValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromArgument for String {
    const EXPECTED: &'static str = "string";

    fn from_argument(value: &ArgumentValue) -> Option<Self> {
        match value {
            ArgumentValue::String(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// Definition of one operator instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OperatorDef {
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, rename = "input")]
    pub inputs: Vec<String>,
    #[serde(default, rename = "output")]
    pub outputs: Vec<String>,
    #[serde(default, rename = "arg", skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Argument>,
}

impl OperatorDef {
    pub fn new(op_type: impl Into<String>) -> Self {
        Self { op_type: op_type.into(), ..Self::default() }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse { reason: e.to_string() }.into())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse { reason: e.to_string() }.into())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn input(mut self, blob: impl Into<String>) -> Self {
        self.inputs.push(blob.into());
        self
    }

    pub fn inputs<I, S>(mut self, blobs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.extend(blobs.into_iter().map(Into::into));
        self
    }

    pub fn output(mut self, blob: impl Into<String>) -> Self {
        self.outputs.push(blob.into());
        self
    }

    pub fn outputs<I, S>(mut self, blobs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs.extend(blobs.into_iter().map(Into::into));
        self
    }

    /// Set argument `name`, replacing any earlier value.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<ArgumentValue>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.args.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.args.push(Argument { name, value }),
        }
        self
    }

    pub fn argument(&self, name: &str) -> Option<&ArgumentValue> {
        self.args.iter().find(|a| a.name == name).map(|a| &a.value)
    }

    pub fn has_argument(&self, name: &str) -> bool {
        self.argument(name).is_some()
    }

    /// Read a single-valued argument, falling back to `default` when absent.
    ///
    /// A present argument of the wrong type is an error, not a fallback.
    pub fn get_single_argument<T: FromArgument>(&self, name: &str, default: T) -> Result<T> {
        match self.argument(name) {
            None => Ok(default),
            Some(value) => T::from_argument(value).ok_or_else(|| {
                ConfigError::ArgumentType { name: name.to_string(), expected: T::EXPECTED }.into()
            }),
        }
    }
}
