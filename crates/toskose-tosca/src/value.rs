//! Free-form data of a topology node as a small sum type.
//!
//! Properties, artifacts, interfaces, and outputs are kept as [`ValueTree`]s
//! until declarative functions are resolved. A function call is recognised
//! as a single-entry map whose key is `get_input`, `get_property`, or
//! `get_artifact`.

use std::fmt;

use toskose_common::error::{Result, ToskoseError};

use crate::model::FileArtifact;

/// A scalar leaf of a [`ValueTree`].
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// `~` or an absent value.
    Null,
    /// A boolean.
    Bool(bool),
    /// An integer.
    Integer(i64),
    /// A floating point number.
    Float(f64),
    /// A string.
    Text(String),
}

impl Scalar {
    /// Returns the textual form used for environment values and map keys.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Integer(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

/// The declarative functions understood by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// `get_input: name`
    GetInput,
    /// `get_property: [SELF|node, property, ...path]`
    GetProperty,
    /// `get_artifact: [SELF|node, artifact]`
    GetArtifact,
}

impl FunctionKind {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "get_input" => Some(Self::GetInput),
            "get_property" => Some(Self::GetProperty),
            "get_artifact" => Some(Self::GetArtifact),
            _ => None,
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetInput => write!(f, "get_input"),
            Self::GetProperty => write!(f, "get_property"),
            Self::GetArtifact => write!(f, "get_artifact"),
        }
    }
}

/// An unresolved function call token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionCall {
    /// Which function is called.
    pub kind: FunctionKind,
    /// Positional arguments, as strings.
    pub args: Vec<String>,
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: [{}]", self.kind, self.args.join(", "))
    }
}

/// Free-form data of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueTree {
    /// An ordered map.
    Map(Vec<(String, ValueTree)>),
    /// A sequence.
    Sequence(Vec<ValueTree>),
    /// A scalar leaf.
    Scalar(Scalar),
    /// A function call waiting for resolution.
    Function(FunctionCall),
    /// A resolved `get_artifact` result.
    File(FileArtifact),
}

/// Rewrites function calls met during a [`ValueTree::accept`] walk.
pub trait TreeVisitor {
    /// Returns the replacement of a function call.
    ///
    /// # Errors
    ///
    /// Returns an error if the call cannot be resolved.
    fn visit_function(&mut self, call: &FunctionCall) -> Result<ValueTree>;
}

impl ValueTree {
    /// An empty map.
    #[must_use]
    pub const fn empty_map() -> Self {
        Self::Map(Vec::new())
    }

    /// Converts a YAML value, recognising function-call tokens.
    ///
    /// # Errors
    ///
    /// Returns a parsing error for malformed function arguments or
    /// unsupported YAML constructs (tagged values).
    pub fn from_yaml(value: &serde_yaml::Value) -> Result<Self> {
        use serde_yaml::Value;

        match value {
            Value::Null => Ok(Self::Scalar(Scalar::Null)),
            Value::Bool(b) => Ok(Self::Scalar(Scalar::Bool(*b))),
            Value::Number(n) => Ok(Self::Scalar(n.as_i64().map_or_else(
                || Scalar::Float(n.as_f64().unwrap_or_default()),
                Scalar::Integer,
            ))),
            Value::String(s) => Ok(Self::Scalar(Scalar::Text(s.clone()))),
            Value::Sequence(items) => items
                .iter()
                .map(Self::from_yaml)
                .collect::<Result<Vec<_>>>()
                .map(Self::Sequence),
            Value::Mapping(map) => {
                if map.len() == 1 {
                    if let Some((Value::String(key), args)) = map.iter().next() {
                        if let Some(kind) = FunctionKind::from_key(key) {
                            return Ok(Self::Function(FunctionCall {
                                kind,
                                args: function_args(kind, args)?,
                            }));
                        }
                    }
                }
                let mut entries = Vec::with_capacity(map.len());
                for (k, v) in map {
                    entries.push((yaml_key(k)?, Self::from_yaml(v)?));
                }
                Ok(Self::Map(entries))
            }
            Value::Tagged(tagged) => Err(ToskoseError::parsing(format!(
                "unsupported tagged value {}",
                tagged.tag
            ))),
        }
    }

    /// Walks the tree, replacing every function call with the visitor's result.
    ///
    /// Returns the number of substitutions performed.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by the visitor.
    pub fn accept<V: TreeVisitor + ?Sized>(&mut self, visitor: &mut V) -> Result<usize> {
        match self {
            Self::Map(entries) => {
                let mut count = 0;
                for (_, v) in entries.iter_mut() {
                    count += v.accept(visitor)?;
                }
                Ok(count)
            }
            Self::Sequence(items) => {
                let mut count = 0;
                for v in items.iter_mut() {
                    count += v.accept(visitor)?;
                }
                Ok(count)
            }
            Self::Function(call) => {
                let replacement = visitor.visit_function(call)?;
                *self = replacement;
                Ok(1)
            }
            Self::Scalar(_) | Self::File(_) => Ok(0),
        }
    }

    /// Returns `true` if the tree still holds at least one function call.
    #[must_use]
    pub fn has_functions(&self) -> bool {
        match self {
            Self::Map(entries) => entries.iter().any(|(_, v)| v.has_functions()),
            Self::Sequence(items) => items.iter().any(Self::has_functions),
            Self::Function(_) => true,
            Self::Scalar(_) | Self::File(_) => false,
        }
    }

    /// Looks up a direct child of a map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Follows a path of map keys (or sequence indexes).
    #[must_use]
    pub fn path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Self> {
        path.iter().try_fold(self, |node, key| match node {
            Self::Map(_) => node.get(key.as_ref()),
            Self::Sequence(items) => key.as_ref().parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Returns the entries of a map, or `None` for other variants.
    #[must_use]
    pub fn as_map(&self) -> Option<&[(String, Self)]> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Returns the text of a scalar leaf, or `None` for other variants.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Scalar(Scalar::Null) => None,
            Self::Scalar(s) => Some(s.to_text()),
            _ => None,
        }
    }

    /// Returns `true` for `null` leaves.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(Scalar::Null))
    }
}

fn yaml_key(key: &serde_yaml::Value) -> Result<String> {
    use serde_yaml::Value;

    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(ToskoseError::parsing(format!(
            "unsupported map key {other:?}"
        ))),
    }
}

fn function_args(kind: FunctionKind, args: &serde_yaml::Value) -> Result<Vec<String>> {
    use serde_yaml::Value;

    let args = match args {
        Value::String(s) => vec![s.clone()],
        Value::Sequence(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(ToskoseError::parsing(format!(
                    "invalid argument {other:?} for {kind}"
                ))),
            })
            .collect::<Result<Vec<_>>>()?,
        other => {
            return Err(ToskoseError::parsing(format!(
                "invalid arguments {other:?} for {kind}"
            )));
        }
    };

    let min = match kind {
        FunctionKind::GetInput => 1,
        FunctionKind::GetProperty | FunctionKind::GetArtifact => 2,
    };
    if args.len() < min {
        return Err(ToskoseError::parsing(format!(
            "{kind} needs at least {min} argument(s), got {}",
            args.len()
        )));
    }
    Ok(args)
}
