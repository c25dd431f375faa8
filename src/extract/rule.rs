//! Id Rule Module
//!
//! How an entity id is located inside one result item.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Signature of a function rule. `Ok(None)` reports a missing id.
pub type IdFn = dyn Fn(&Value) -> anyhow::Result<Option<Value>> + Send + Sync;

// == Id Rule ==
/// Resolved once when a function is wrapped and never mutated afterwards.
#[derive(Clone)]
pub enum IdRule {
    /// Look up a field of an object item; a non-object item is its own id.
    Field(String),
    /// Call a function with the item. The label names it in errors.
    Function { label: String, f: Arc<IdFn> },
    /// Apply every rule in order and join the results into one composite
    /// id. Rules that yield nothing are skipped when missing ids are
    /// tolerated.
    Composite(Vec<IdRule>),
}

impl IdRule {
    pub fn field(name: impl Into<String>) -> Self {
        IdRule::Field(name.into())
    }

    pub fn function<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    {
        IdRule::Function {
            label: label.into(),
            f: Arc::new(f),
        }
    }

    pub fn composite<I>(rules: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<IdRule>,
    {
        IdRule::Composite(rules.into_iter().map(Into::into).collect())
    }

    /// Composite over plain field names, e.g. `["order_id", "product_id"]`.
    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        IdRule::Composite(names.into_iter().map(|n| IdRule::Field(n.into())).collect())
    }
}

impl Default for IdRule {
    fn default() -> Self {
        IdRule::Field("id".to_string())
    }
}

impl From<&str> for IdRule {
    fn from(name: &str) -> Self {
        IdRule::Field(name.to_string())
    }
}

impl From<String> for IdRule {
    fn from(name: String) -> Self {
        IdRule::Field(name)
    }
}

impl fmt::Display for IdRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdRule::Field(name) => write!(f, "field '{}'", name),
            IdRule::Function { label, .. } => write!(f, "function '{}'", label),
            IdRule::Composite(rules) => {
                f.write_str("composite [")?;
                for (i, rule) in rules.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", rule)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl fmt::Debug for IdRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdRule({})", self)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rule_is_id_field() {
        assert!(matches!(IdRule::default(), IdRule::Field(ref name) if name == "id"));
    }

    #[test]
    fn test_display_names_every_rule() {
        let rule = IdRule::composite(vec![
            IdRule::field("order_id"),
            IdRule::function("sku", |item| Ok(item.get("sku").cloned())),
        ]);
        assert_eq!(
            rule.to_string(),
            "composite [field 'order_id', function 'sku']"
        );
    }

    #[test]
    fn test_fields_builds_composite() {
        match IdRule::fields(["a", "b"]) {
            IdRule::Composite(rules) => assert_eq!(rules.len(), 2),
            other => panic!("unexpected rule {:?}", other),
        }
    }
}
