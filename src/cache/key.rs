//! Key Construction Module
//!
//! Function identity, call arguments, argument normalisation and the
//! cache-key / entity-index-key formats.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backend::escape_glob;
use crate::error::{CacheError, Result};
use crate::extract::EntityId;

// == Public Constants ==
/// Hash segment used when a call has no arguments at all.
pub const NO_ARGS: &str = "noargs";

/// Leading segment of every cache-entry key.
pub const CACHE_KEY_NAMESPACE: &str = "cache";

/// Leading segment of every entity-index key.
pub const ENTITY_KEY_NAMESPACE: &str = "entity";

/// Bytes of the digest kept in a key (hex-encoded to twice as many chars).
const DIGEST_BYTES: usize = 16;

// == Scope ==
/// Whether a cache namespace belongs to one function or is shared by every
/// function returning the same entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Function,
    Entity,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Function => f.write_str("function"),
            Scope::Entity => f.write_str("entity"),
        }
    }
}

// == Function Id ==
/// Identity of a wrapped function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionId {
    module: String,
    name: String,
    params: Vec<String>,
}

impl FunctionId {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Declares the parameter names, in order. A leading `self` receiver is
    /// dropped.
    pub fn with_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut params: Vec<String> = params.into_iter().map(Into::into).collect();
        if params.first().is_some_and(|p| p == "self") {
            params.remove(0);
        }
        self.params = params;
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// `{module}.{name}`, or just the name when no module is set.
    pub fn qualified_name(&self) -> String {
        if self.module.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.module, self.name)
        }
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

/// Builds a [`FunctionId`] for a function in the current module.
///
/// ```
/// use cacheref::function_id;
/// let id = function_id!(get_user, user_id);
/// assert!(id.qualified_name().ends_with(".get_user"));
/// assert_eq!(id.params(), ["user_id"]);
/// ```
#[macro_export]
macro_rules! function_id {
    ($name:ident $(, $param:ident)* $(,)?) => {{
        let params: &[&str] = &[$(stringify!($param)),*];
        $crate::FunctionId::new(module_path!(), stringify!($name)).with_params(params.iter().copied())
    }};
}

// == Call Args ==
/// Arguments of one call, as JSON values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    #[serde(default)]
    pub positional: Vec<Value>,
    #[serde(default)]
    pub named: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    /// Serialises `args`: a tuple or sequence becomes positional arguments,
    /// a struct or map becomes named arguments, `()` becomes no arguments
    /// and any other value a single positional argument.
    pub fn from_serialize<A: Serialize + ?Sized>(args: &A) -> Result<Self> {
        let value = serde_json::to_value(args).map_err(|e| {
            CacheError::Serialization(format!("call arguments are not serialisable: {}", e))
        })?;
        Ok(Self::from_value(value))
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Self::default(),
            Value::Array(items) => Self {
                positional: items,
                named: BTreeMap::new(),
            },
            Value::Object(map) => Self {
                positional: Vec::new(),
                named: map.into_iter().collect(),
            },
            other => Self {
                positional: vec![other],
                named: BTreeMap::new(),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    // == Normalize ==
    /// Moves positional arguments onto their declared parameter names and
    /// canonicalises every value, so argument order and collection order
    /// do not change the key. Positional arguments beyond the declared
    /// list, or whose name is already passed by keyword, stay positional.
    pub fn normalized(&self, params: &[String]) -> Self {
        let mut named: BTreeMap<String, Value> = self
            .named
            .iter()
            .map(|(k, v)| (k.clone(), normalize_value(v)))
            .collect();
        let mut positional = Vec::new();

        for (i, value) in self.positional.iter().enumerate() {
            match params.get(i) {
                Some(param) if !named.contains_key(param) => {
                    named.insert(param.clone(), normalize_value(value));
                }
                _ => positional.push(normalize_value(value)),
            }
        }

        Self { positional, named }
    }

    // == Digest ==
    /// Hex digest of the arguments, or [`NO_ARGS`] when there are none.
    pub fn digest(&self) -> String {
        if self.is_empty() {
            return NO_ARGS.to_string();
        }

        let positional = Value::Array(self.positional.clone()).to_string();
        let named = Value::Array(
            self.named
                .iter()
                .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                .collect(),
        )
        .to_string();

        let mut hasher = blake3::Hasher::new();
        hasher.update(positional.as_bytes());
        hasher.update(b"|");
        hasher.update(named.as_bytes());
        let hex = hasher.finalize().to_hex();
        hex.as_str()[..DIGEST_BYTES * 2].to_string()
    }
}

/// Canonical form of a value: object keys sorted, and arrays of one scalar
/// type sorted. Arrays mixing types keep their order.
pub fn normalize_value(value: &Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(normalize_value).collect();
            if let Some(cmp) = scalar_order(&items) {
                items.sort_by(cmp);
            }
            Value::Array(items)
        }
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, normalize_value(v))).collect();
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), v))
                    .collect::<Map<String, Value>>(),
            )
        }
        scalar => scalar.clone(),
    }
}

type ValueOrder = fn(&Value, &Value) -> Ordering;

/// Ordering for an array whose items are all numbers, all strings or all
/// booleans; `None` otherwise.
fn scalar_order(items: &[Value]) -> Option<ValueOrder> {
    let first = items.first()?;
    let order: ValueOrder = match first {
        Value::Number(_) if items.iter().all(Value::is_number) => cmp_numbers,
        Value::String(_) if items.iter().all(Value::is_string) => cmp_strings,
        Value::Bool(_) if items.iter().all(Value::is_boolean) => cmp_bools,
        _ => return None,
    };
    Some(order)
}

fn cmp_numbers(a: &Value, b: &Value) -> Ordering {
    let a = a.as_f64().unwrap_or_default();
    let b = b.as_f64().unwrap_or_default();
    a.total_cmp(&b)
}

fn cmp_strings(a: &Value, b: &Value) -> Ordering {
    a.as_str().cmp(&b.as_str())
}

fn cmp_bools(a: &Value, b: &Value) -> Ordering {
    a.as_bool().cmp(&b.as_bool())
}

// == Key Formats ==
/// Namespace segment of a function's keys.
///
/// An explicit cache name wins, then `entity:{type}` for entity-scoped
/// functions, then the function's qualified name.
pub fn effective_prefix(
    function: &FunctionId,
    cache_name: Option<&str>,
    entity: Option<&str>,
    scope: Scope,
) -> String {
    if let Some(name) = cache_name {
        return name.to_string();
    }
    match (scope, entity) {
        (Scope::Entity, Some(entity)) => format!("{}:{}", ENTITY_KEY_NAMESPACE, entity),
        _ => function.qualified_name(),
    }
}

/// `cache:{prefix}:{digest}`.
pub fn cache_key(prefix: &str, args: &CallArgs) -> String {
    format!("{}:{}:{}", CACHE_KEY_NAMESPACE, prefix, args.digest())
}

/// Glob matching every cache entry under `prefix`. Glob metacharacters in
/// the prefix are escaped.
pub fn cache_key_pattern(prefix: &str) -> String {
    format!("{}:{}:*", CACHE_KEY_NAMESPACE, escape_glob(prefix))
}

/// `entity:{type}:{id}`; composite ids are hyphen-joined.
pub fn entity_index_key(entity: &str, id: &EntityId) -> String {
    format!("{}:{}:{}", ENTITY_KEY_NAMESPACE, entity, id)
}
