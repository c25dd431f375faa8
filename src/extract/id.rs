//! Entity Identifier Module
//!
//! Scalar id parts, composite entity ids and the kind classification used
//! to enforce the supported-id allow-list.

use std::fmt;

use serde_json::Value;
use uuid::Uuid;

// == Id Kind ==
/// Runtime kind of a JSON value, as seen by the id allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdKind {
    Null,
    Boolean,
    Integer,
    Float,
    String,
    Array,
    Object,
}

impl IdKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => IdKind::Null,
            Value::Bool(_) => IdKind::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => IdKind::Integer,
            Value::Number(_) => IdKind::Float,
            Value::String(_) => IdKind::String,
            Value::Array(_) => IdKind::Array,
            Value::Object(_) => IdKind::Object,
        }
    }

    /// Kinds that can form part of an entity-index key.
    pub fn is_key_kind(&self) -> bool {
        matches!(self, IdKind::Boolean | IdKind::Integer | IdKind::String)
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdKind::Null => "null",
            IdKind::Boolean => "boolean",
            IdKind::Integer => "integer",
            IdKind::Float => "float",
            IdKind::String => "string",
            IdKind::Array => "array",
            IdKind::Object => "object",
        };
        f.write_str(name)
    }
}

/// Id kinds accepted unless configured otherwise.
pub const DEFAULT_SUPPORTED_KINDS: [IdKind; 2] = [IdKind::String, IdKind::Integer];

// == Id Part ==
/// One scalar component of an entity id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdPart {
    Int(i128),
    Str(String),
    Bool(bool),
}

impl IdPart {
    /// Converts a scalar JSON value; `None` for anything that is not a
    /// string, integer or boolean.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(IdPart::Str(s.clone())),
            Value::Bool(b) => Some(IdPart::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(i128::from)
                .or_else(|| n.as_u64().map(i128::from))
                .map(IdPart::Int),
            _ => None,
        }
    }

    pub fn kind(&self) -> IdKind {
        match self {
            IdPart::Int(_) => IdKind::Integer,
            IdPart::Str(_) => IdKind::String,
            IdPart::Bool(_) => IdKind::Boolean,
        }
    }
}

impl fmt::Display for IdPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdPart::Int(n) => write!(f, "{}", n),
            IdPart::Str(s) => f.write_str(s),
            IdPart::Bool(b) => write!(f, "{}", b),
        }
    }
}

macro_rules! int_part {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for IdPart {
                fn from(value: $ty) -> Self {
                    IdPart::Int(i128::from(value))
                }
            }

            impl From<$ty> for EntityId {
                fn from(value: $ty) -> Self {
                    EntityId::single(value)
                }
            }
        )*
    };
}

int_part!(i8, i16, i32, i64, u8, u16, u32, u64, i128);

impl From<usize> for IdPart {
    fn from(value: usize) -> Self {
        IdPart::Int(value as i128)
    }
}

impl From<&str> for IdPart {
    fn from(value: &str) -> Self {
        IdPart::Str(value.to_string())
    }
}

impl From<String> for IdPart {
    fn from(value: String) -> Self {
        IdPart::Str(value)
    }
}

impl From<bool> for IdPart {
    fn from(value: bool) -> Self {
        IdPart::Bool(value)
    }
}

impl From<Uuid> for IdPart {
    fn from(value: Uuid) -> Self {
        IdPart::Str(value.to_string())
    }
}

// == Entity Id ==
/// An ordered sequence of id parts. A single-part id is a plain scalar id;
/// longer ids are composite keys. The string form hyphen-joins the parts,
/// so `(7, "sku-9")` and the string `"7-sku-9"` address the same index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(Vec<IdPart>);

impl EntityId {
    pub fn new(parts: Vec<IdPart>) -> Self {
        Self(parts)
    }

    pub fn single(part: impl Into<IdPart>) -> Self {
        Self(vec![part.into()])
    }

    /// Parses an id received as text: a canonical integer literal becomes
    /// an integer part, anything else (`007`, `+5`, `abc`) is kept verbatim
    /// as one string part. Either way the id renders back to `raw`.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<i128>() {
            Ok(n) if n.to_string() == raw => Self::single(n),
            _ => Self::single(raw),
        }
    }

    pub fn parts(&self) -> &[IdPart] {
        &self.0
    }

    pub fn is_composite(&self) -> bool {
        self.0.len() > 1
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Kinds of the parts, in order. Used to spot mixed id shapes.
    pub fn shape(&self) -> Vec<IdKind> {
        self.0.iter().map(IdPart::kind).collect()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("-")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

impl From<IdPart> for EntityId {
    fn from(part: IdPart) -> Self {
        Self(vec![part])
    }
}

impl From<Vec<IdPart>> for EntityId {
    fn from(parts: Vec<IdPart>) -> Self {
        Self(parts)
    }
}

impl From<usize> for EntityId {
    fn from(value: usize) -> Self {
        EntityId::single(value)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId::single(value)
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        EntityId::single(value)
    }
}

impl From<&String> for EntityId {
    fn from(value: &String) -> Self {
        EntityId::single(value.as_str())
    }
}

impl From<bool> for EntityId {
    fn from(value: bool) -> Self {
        EntityId::single(value)
    }
}

impl From<Uuid> for EntityId {
    fn from(value: Uuid) -> Self {
        EntityId::single(value)
    }
}

impl<A, B> From<(A, B)> for EntityId
where
    A: Into<IdPart>,
    B: Into<IdPart>,
{
    fn from((a, b): (A, B)) -> Self {
        Self(vec![a.into(), b.into()])
    }
}

impl<A, B, C> From<(A, B, C)> for EntityId
where
    A: Into<IdPart>,
    B: Into<IdPart>,
    C: Into<IdPart>,
{
    fn from((a, b, c): (A, B, C)) -> Self {
        Self(vec![a.into(), b.into(), c.into()])
    }
}
