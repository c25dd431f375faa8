//! Id Extractor Module
//!
//! Produces the set of entity ids a cached result refers to.

use std::collections::{BTreeSet, HashSet};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::IdExtractionError;
use crate::extract::{EntityId, IdKind, IdPart, IdRule};

/// Longest item rendering carried into an error message.
const MAX_ITEM_RENDER: usize = 200;

// == Extraction Settings ==
/// Strictness settings for one extraction.
#[derive(Debug, Clone, Copy)]
pub struct ExtractSettings<'a> {
    /// Id kinds allowed into the reverse index
    pub supported: &'a [IdKind],
    /// Whether a missing or null id is an error rather than skipped
    pub fail_on_missing: bool,
}

// == Extract Ids ==
/// Extracts entity ids from `result`.
///
/// An array result is treated item by item and the ids are unioned, in
/// first-seen order; any other value is a single item.
///
/// # Arguments
/// * `source_label` - Name of the producing function, for diagnostics
/// * `result` - The result, viewed as JSON
/// * `rule` - How to locate the id within an item
/// * `settings` - Allowed id kinds and missing-id strictness
pub fn extract_ids(
    source_label: &str,
    result: &Value,
    rule: &IdRule,
    settings: ExtractSettings<'_>,
) -> Result<Vec<EntityId>, IdExtractionError> {
    let items: Vec<&Value> = match result {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };

    let extractor = Extractor {
        source_label,
        settings,
    };

    let mut seen = HashSet::new();
    let mut shapes = BTreeSet::new();
    let mut ids = Vec::new();

    for item in items {
        if let Some(id) = extractor.item_id(item, rule)? {
            shapes.insert(id.shape());
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
    }

    if shapes.len() > 1 {
        warn!(
            source = %source_label,
            rule = %rule,
            shapes = ?shapes,
            "Extracted ids of more than one type"
        );
    }

    debug!(source = %source_label, count = ids.len(), "Extracted entity ids");
    Ok(ids)
}

struct Extractor<'a> {
    source_label: &'a str,
    settings: ExtractSettings<'a>,
}

impl Extractor<'_> {
    /// Id of one item; `None` when every rule was skipped.
    fn item_id(&self, item: &Value, rule: &IdRule) -> Result<Option<EntityId>, IdExtractionError> {
        let mut parts = Vec::new();
        self.collect_parts(item, rule, &mut parts)?;
        Ok(if parts.is_empty() {
            None
        } else {
            Some(EntityId::new(parts))
        })
    }

    fn collect_parts(
        &self,
        item: &Value,
        rule: &IdRule,
        parts: &mut Vec<IdPart>,
    ) -> Result<(), IdExtractionError> {
        if let IdRule::Composite(rules) = rule {
            for inner in rules {
                self.collect_parts(item, inner, parts)?;
            }
            return Ok(());
        }

        let produced = match self.apply(item, rule)? {
            Some(value) if !value.is_null() => value,
            _ => {
                if self.settings.fail_on_missing {
                    return Err(self.error(item, rule, "id is missing or null"));
                }
                debug!(source = %self.source_label, rule = %rule, "Skipping missing id");
                return Ok(());
            }
        };

        let kind = IdKind::of(&produced);
        if !self.settings.supported.contains(&kind) {
            return Err(self.error(
                item,
                rule,
                format!(
                    "unsupported id type {} (supported: {})",
                    kind,
                    render_kinds(self.settings.supported)
                ),
            ));
        }

        match IdPart::from_value(&produced) {
            Some(part) => {
                parts.push(part);
                Ok(())
            }
            None => Err(self.error(item, rule, format!("id of type {} cannot key an index", kind))),
        }
    }

    fn apply(&self, item: &Value, rule: &IdRule) -> Result<Option<Value>, IdExtractionError> {
        match rule {
            IdRule::Field(name) => Ok(match item {
                Value::Object(map) => map.get(name).cloned(),
                scalar => Some(scalar.clone()),
            }),
            IdRule::Function { f, .. } => {
                f(item).map_err(|e| self.error(item, rule, format!("id function failed: {:#}", e)))
            }
            IdRule::Composite(_) => Ok(None),
        }
    }

    fn error(&self, item: &Value, rule: &IdRule, message: impl Into<String>) -> IdExtractionError {
        IdExtractionError::new(self.source_label, render_item(item), rule.to_string(), message)
    }
}

fn render_item(item: &Value) -> String {
    let mut text = item.to_string();
    if text.len() > MAX_ITEM_RENDER {
        let mut cut = MAX_ITEM_RENDER;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    text
}

fn render_kinds(kinds: &[IdKind]) -> String {
    kinds
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
