//! Tag store: current value per tag, seeded from the catalog.

use crate::EngineError;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;
use trainer_core::{
    format_value, validate_tag_catalog, SignalPatch, TagCatalog, TagDef, TagId, TagPolicy, TagValue,
};

/// One display row: a catalog tag with its current value rendered in its unit.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TagReading {
    pub tag: TagId,
    pub name: String,
    pub value: Option<TagValue>,
    /// Formatted value, or "--" when the tag has no value.
    pub display: String,
}

/// Current tag values keyed by tag id.
#[derive(Clone, Debug, Default)]
pub struct TagStore {
    defs: Vec<TagDef>,
    values: BTreeMap<TagId, TagValue>,
    policy: TagPolicy,
}

impl TagStore {
    /// Build a store from the catalog's seed values.
    pub fn seed(catalog: &TagCatalog, policy: TagPolicy) -> Result<Self, EngineError> {
        validate_tag_catalog(catalog).map_err(EngineError::Config)?;
        let values = catalog
            .tags
            .iter()
            .map(|d| (d.tag.clone(), d.initial_value()))
            .collect();
        Ok(Self {
            defs: catalog.tags.clone(),
            values,
            policy,
        })
    }

    /// Write every entry of `patch`, overwriting prior values.
    ///
    /// Under [`TagPolicy::Strict`] the patch is checked first and nothing is
    /// written if any tag is missing from the catalog. Returns the number of
    /// entries written.
    pub fn apply_patch(&mut self, patch: &SignalPatch) -> Result<usize, EngineError> {
        if self.policy == TagPolicy::Strict {
            if let Some((unknown, _)) = patch.iter().find(|(t, _)| !self.is_known(t.as_str())) {
                return Err(EngineError::UnknownTag(unknown.to_string()));
            }
        }
        for (tag, value) in patch.iter() {
            self.values.insert(tag.clone(), *value);
        }
        if !patch.is_empty() {
            debug!(entries = patch.len(), "applied signal patch");
        }
        Ok(patch.len())
    }

    pub fn get(&self, tag: &str) -> Option<TagValue> {
        self.values.get(tag).copied()
    }

    /// Whether the tag appears in the catalog (as opposed to a stored unknown).
    pub fn is_known(&self, tag: &str) -> bool {
        self.defs.iter().any(|d| d.tag.as_str() == tag)
    }

    pub fn defs(&self) -> &[TagDef] {
        &self.defs
    }

    pub fn values(&self) -> &BTreeMap<TagId, TagValue> {
        &self.values
    }

    /// Display rows in catalog order.
    pub fn readings(&self) -> Vec<TagReading> {
        self.defs
            .iter()
            .map(|d| {
                let value = self.get(d.tag.as_str());
                TagReading {
                    tag: d.tag.clone(),
                    name: d.name.clone(),
                    value,
                    display: value
                        .map(|v| format_value(&v, &d.unit))
                        .unwrap_or_else(|| "--".to_string()),
                }
            })
            .collect()
    }
}
