//! Entity Resolver Module
//!
//! Maps a model description to the entity type name and id rule a wrapped
//! function caches under, through an ordered registry of resolvers.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{CacheError, Result};
use crate::extract::IdRule;

// == Model Descriptor ==
/// Static description of a persisted model.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelDescriptor {
    /// Rust type name, possibly path-qualified
    pub type_name: String,
    /// Backing table, when the model is table-mapped
    pub table: Option<String>,
    /// Primary-key columns, in key order
    pub primary_key: Vec<String>,
}

impl ModelDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Type name without its module path.
    pub fn short_type_name(&self) -> &str {
        self.type_name
            .rsplit("::")
            .next()
            .unwrap_or(self.type_name.as_str())
    }
}

/// Implemented by domain types that can be named as an entity.
pub trait Model {
    fn descriptor() -> ModelDescriptor;
}

// == Resolved Entity ==
#[derive(Debug, Clone)]
pub struct ResolvedEntity {
    pub entity: String,
    pub id_rule: IdRule,
}

// == Resolver Trait ==
pub trait EntityResolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, model: &ModelDescriptor) -> bool;

    fn resolve(&self, model: &ModelDescriptor) -> Result<ResolvedEntity>;
}

// == Built-in Resolvers ==
/// Table-mapped models: the table names the entity and the primary-key
/// columns form the id (composite when there are several).
#[derive(Debug, Clone, Copy, Default)]
pub struct TableResolver;

impl EntityResolver for TableResolver {
    fn name(&self) -> &'static str {
        "table"
    }

    fn supports(&self, model: &ModelDescriptor) -> bool {
        model.table.is_some()
    }

    fn resolve(&self, model: &ModelDescriptor) -> Result<ResolvedEntity> {
        let table = model.table.clone().ok_or_else(|| {
            CacheError::Configuration(format!("model {} has no table", model.type_name))
        })?;

        let id_rule = match model.primary_key.as_slice() {
            [] => {
                return Err(CacheError::Configuration(format!(
                    "model {} has no primary key",
                    model.type_name
                )))
            }
            [column] => IdRule::field(column.clone()),
            columns => IdRule::fields(columns.iter().cloned()),
        };

        Ok(ResolvedEntity {
            entity: table,
            id_rule,
        })
    }
}

/// Fallback: lower-cased type name, keyed by its `id` field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeNameResolver;

impl EntityResolver for TypeNameResolver {
    fn name(&self) -> &'static str {
        "type_name"
    }

    fn supports(&self, model: &ModelDescriptor) -> bool {
        !model.short_type_name().is_empty()
    }

    fn resolve(&self, model: &ModelDescriptor) -> Result<ResolvedEntity> {
        Ok(ResolvedEntity {
            entity: model.short_type_name().to_lowercase(),
            id_rule: IdRule::default(),
        })
    }
}

// == Resolver Registry ==
/// Ordered list of resolvers; the first that supports a model wins.
///
/// Resolvers added with [`ResolverRegistry::register`] are tried before
/// the built-ins, in registration order.
#[derive(Clone)]
pub struct ResolverRegistry {
    custom: Vec<Arc<dyn EntityResolver>>,
    builtin: Vec<Arc<dyn EntityResolver>>,
}

impl ResolverRegistry {
    /// A registry with no resolvers at all.
    pub fn empty() -> Self {
        Self {
            custom: Vec::new(),
            builtin: Vec::new(),
        }
    }

    pub fn register(&mut self, resolver: impl EntityResolver + 'static) -> &mut Self {
        self.custom.push(Arc::new(resolver));
        self
    }

    pub fn resolve(&self, model: &ModelDescriptor) -> Result<ResolvedEntity> {
        let resolver = self
            .custom
            .iter()
            .chain(self.builtin.iter())
            .find(|r| r.supports(model))
            .ok_or_else(|| {
                CacheError::Configuration(format!(
                    "no entity resolver supports model {}",
                    model.type_name
                ))
            })?;

        let resolved = resolver.resolve(model)?;
        debug!(
            model = %model.type_name,
            resolver = resolver.name(),
            entity = %resolved.entity,
            "Resolved model entity"
        );
        Ok(resolved)
    }

    pub fn resolve_model<M: Model>(&self) -> Result<ResolvedEntity> {
        self.resolve(&M::descriptor())
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self {
            custom: Vec::new(),
            builtin: vec![Arc::new(TableResolver), Arc::new(TypeNameResolver)],
        }
    }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .custom
            .iter()
            .chain(self.builtin.iter())
            .map(|r| r.name())
            .collect();
        f.debug_struct("ResolverRegistry")
            .field("resolvers", &names)
            .finish()
    }
}
