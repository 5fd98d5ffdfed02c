use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The closed set of types a query-string parameter can be converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    String,
    Bool,
    Integer,
    Float,
}

impl ParamType {
    pub fn name(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Bool => "bool",
            ParamType::Integer => "int",
            ParamType::Float => "float",
        }
    }

    pub fn zero_value(self) -> ArgValue {
        match self {
            ParamType::String => ArgValue::String(String::new()),
            ParamType::Bool => ArgValue::Bool(false),
            ParamType::Integer => ArgValue::Integer(0),
            ParamType::Float => ArgValue::Float(0.0),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParamType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(ParamType::String),
            "bool" | "boolean" => Ok(ParamType::Bool),
            "int" | "int32" | "int64" | "integer" | "long" | "i32" | "i64" => {
                Ok(ParamType::Integer)
            }
            "float" | "double" | "single" | "f32" | "f64" | "number" => Ok(ParamType::Float),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    String(String),
    Bool(bool),
    Integer(i64),
    Float(f64),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::String(v) => f.write_str(v),
            ArgValue::Bool(v) => write!(f, "{v}"),
            ArgValue::Integer(v) => write!(f, "{v}"),
            ArgValue::Float(v) => write!(f, "{v}"),
        }
    }
}

pub type AutocompleteFn = dyn Fn() -> Vec<String> + Send + Sync;

#[derive(Clone)]
pub enum Autocomplete {
    Options(Vec<String>),
    Provider(Arc<AutocompleteFn>),
}

impl Autocomplete {
    pub fn options(&self) -> Vec<String> {
        match self {
            Autocomplete::Options(options) => options.clone(),
            Autocomplete::Provider(provider) => provider(),
        }
    }
}

/// A parameter as declared by the contributing module. The type is kept as
/// text until registration so unsupported names are rejected there.
#[derive(Clone)]
pub struct ParamSpec {
    pub name: String,
    pub type_name: String,
    pub default: Option<String>,
    pub autocomplete: Option<Autocomplete>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            default: None,
            autocomplete: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::String.name())
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Bool.name())
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Integer.name())
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Float.name())
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.autocomplete = Some(Autocomplete::Options(
            options.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn with_autocomplete<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Vec<String> + Send + Sync + 'static,
    {
        self.autocomplete = Some(Autocomplete::Provider(Arc::new(provider)));
        self
    }
}

/// A validated parameter stored on an operation descriptor.
#[derive(Clone)]
pub struct ParamDescriptor {
    pub name: String,
    pub ty: ParamType,
    pub default: Option<ArgValue>,
    pub autocomplete: Option<Autocomplete>,
}

/// Coerced arguments handed to an operation, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: Vec<(String, ArgValue)>,
    supplied: HashMap<String, bool>,
}

impl Args {
    pub(crate) fn push(&mut self, name: &str, value: ArgValue, supplied: bool) {
        self.supplied.insert(name.to_string(), supplied);
        self.values.push((name.to_string(), value));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, name: &str) -> Option<&ArgValue> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// True when the caller provided the parameter in the query string.
    pub fn is_supplied(&self, name: &str) -> bool {
        self.supplied.get(name).copied().unwrap_or(false)
    }

    pub fn str(&self, name: &str) -> &str {
        match self.value(name) {
            Some(ArgValue::String(v)) => v,
            _ => "",
        }
    }

    pub fn bool(&self, name: &str) -> bool {
        matches!(self.value(name), Some(ArgValue::Bool(true)))
    }

    pub fn int(&self, name: &str) -> i64 {
        match self.value(name) {
            Some(ArgValue::Integer(v)) => *v,
            _ => 0,
        }
    }

    pub fn float(&self, name: &str) -> f64 {
        match self.value(name) {
            Some(ArgValue::Float(v)) => *v,
            _ => 0.0,
        }
    }
}
