//! Save planning
//!
//! A save is computed as a minimal diff between the newly encoded attribute
//! map and the raw shadow the record was decoded from, then applied as a
//! fixed sequence of directory calls. Application is best effort: the first
//! failing step aborts and is surfaced, steps already applied stay applied.
//!
//! Attributes configured as sub-fields live in child entries directly under
//! the contact entry; their identity is path-relative, so a rename of the
//! parent deletes and recreates them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use dirbook_core::client::DirectoryClient;
use dirbook_core::entry::{parent_dn, AttrMap};
use dirbook_core::error::{StoreError, StoreResult};

use crate::config::DirectoryConfig;
use crate::record::LogicalRecord;

/// Escape a value for use inside a DN component (RFC 4514).
pub fn escape_dn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        let escape = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';')
            || (i == 0 && (c == '#' || c == ' '));
        if escape {
            out.push('\\');
        }
        out.push(c);
    }
    if out.ends_with(' ') {
        out.insert(out.len() - 1, '\\');
    }
    out
}

/// A child entry to (re)create under the contact entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubEntryPlan {
    /// Attribute forming the child RDN.
    pub attr: String,
    /// The attribute value.
    pub value: String,
    /// Object class of the child entry.
    pub object_class: String,
}

/// A planned rename of the contact entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePlan {
    /// The new RDN, DN-escaped.
    pub new_rdn: String,
}

/// The directory calls a save decomposes into.
#[derive(Debug, Clone, Default)]
pub struct MutationPlan {
    /// Attributes to add (absent before, non-empty now).
    pub additions: AttrMap,
    /// Attributes to replace (present before, changed now).
    pub replacements: AttrMap,
    /// Attributes to remove entirely (present before, empty now).
    pub deletions: AttrMap,
    /// Child entries to create, resolved against the final contact DN.
    pub sub_additions: Vec<SubEntryPlan>,
    /// Child entry DNs to delete.
    pub sub_deletions: Vec<String>,
    /// Rename of the contact entry, when the naming attribute changed.
    pub rename: Option<RenamePlan>,
}

impl MutationPlan {
    /// Whether applying the plan would issue no directory call at all.
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty()
            && self.replacements.is_empty()
            && self.deletions.is_empty()
            && self.sub_additions.is_empty()
            && self.sub_deletions.is_empty()
            && self.rename.is_none()
    }
}

/// Plans and applies contact saves.
pub struct MutationPlanner {
    name_attr: String,
    sub_fields: BTreeMap<String, String>,
}

impl MutationPlanner {
    pub fn new(config: &DirectoryConfig) -> Self {
        Self {
            name_attr: config.name_attr.to_lowercase(),
            sub_fields: config
                .sub_fields
                .iter()
                .map(|(attr, class)| (attr.to_lowercase(), class.clone()))
                .collect(),
        }
    }

    /// Diff the newly encoded attributes against the record's raw shadow.
    pub fn plan(&self, record: &LogicalRecord, new_attrs: &AttrMap) -> MutationPlan {
        let mut plan = MutationPlan::default();
        let old_attrs = &record.raw;

        let mut attrs: BTreeSet<&String> = old_attrs.keys().collect();
        attrs.extend(new_attrs.keys());

        for attr in attrs {
            // Object classes are fixed at creation time.
            if attr == "objectclass" {
                continue;
            }

            let old = normalized(old_attrs.get(attr));
            let new = normalized(new_attrs.get(attr));
            if old == new {
                continue;
            }

            if let Some(object_class) = self.sub_fields.get(attr) {
                for value in &old {
                    plan.sub_deletions.push(child_dn(attr, value, &record.dn));
                }
                for value in &new {
                    plan.sub_additions.push(SubEntryPlan {
                        attr: attr.clone(),
                        value: value.clone(),
                        object_class: object_class.clone(),
                    });
                }
                continue;
            }

            if attr == &self.name_attr {
                // The rename itself rewrites the naming attribute.
                if let Some(value) = new.first() {
                    plan.rename = Some(RenamePlan {
                        new_rdn: format!("{attr}={}", escape_dn_value(value)),
                    });
                }
                continue;
            }

            if old.is_empty() {
                plan.additions.insert(attr.clone(), new);
            } else if new.is_empty() {
                plan.deletions.insert(attr.clone(), Vec::new());
            } else {
                plan.replacements.insert(attr.clone(), new);
            }
        }

        // A rename moves every child entry: their identity is path-relative.
        if plan.rename.is_some() {
            for (attr, object_class) in &self.sub_fields {
                let kept = normalized(new_attrs.get(attr));
                if kept.is_empty() {
                    continue;
                }
                let already = plan
                    .sub_additions
                    .iter()
                    .any(|sub| &sub.attr == attr);
                if already {
                    continue;
                }
                for value in normalized(old_attrs.get(attr)) {
                    plan.sub_deletions.push(child_dn(attr, &value, &record.dn));
                }
                for value in kept {
                    plan.sub_additions.push(SubEntryPlan {
                        attr: attr.clone(),
                        value,
                        object_class: object_class.clone(),
                    });
                }
            }
        }

        plan
    }

    /// Apply a plan against the entry at `dn`. Returns the final DN, which
    /// differs from `dn` when the plan renames the entry.
    ///
    /// Steps run in a fixed order; the first failure aborts the rest and
    /// nothing is rolled back.
    pub async fn apply(
        &self,
        client: &Arc<dyn DirectoryClient>,
        dn: &str,
        plan: &MutationPlan,
    ) -> StoreResult<String> {
        if !plan.deletions.is_empty() {
            client
                .mod_delete(dn, &plan.deletions)
                .await
                .map_err(|err| step_failed("attribute removal", err))?;
        }

        if !plan.replacements.is_empty() {
            client
                .mod_replace(dn, &plan.replacements)
                .await
                .map_err(|err| step_failed("attribute replace", err))?;
        }

        for sub_dn in &plan.sub_deletions {
            client
                .delete(sub_dn)
                .await
                .map_err(|err| step_failed("sub-entry removal", err))?;
        }

        if !plan.additions.is_empty() {
            client
                .mod_add(dn, &plan.additions)
                .await
                .map_err(|err| step_failed("attribute add", err))?;
        }

        let mut final_dn = dn.to_string();
        if let Some(rename) = &plan.rename {
            client
                .rename(dn, &rename.new_rdn, None, true)
                .await
                .map_err(|err| step_failed("rename", err))?;
            final_dn = match parent_dn(dn) {
                Some(parent) => format!("{},{parent}", rename.new_rdn),
                None => rename.new_rdn.clone(),
            };
            debug!(old = %dn, new = %final_dn, "entry renamed");
        }

        for sub in &plan.sub_additions {
            let sub_dn = child_dn(&sub.attr, &sub.value, &final_dn);
            let mut attrs = AttrMap::new();
            attrs.insert("objectclass".to_string(), vec![sub.object_class.clone()]);
            attrs.insert(sub.attr.clone(), vec![sub.value.clone()]);
            client
                .add(&sub_dn, &attrs)
                .await
                .map_err(|err| step_failed("sub-entry creation", err))?;
        }

        Ok(final_dn)
    }
}

fn step_failed(step: &'static str, err: StoreError) -> StoreError {
    StoreError::save_with_source(step, err.to_string(), err)
}

fn child_dn(attr: &str, value: &str, parent: &str) -> String {
    format!("{attr}={},{parent}", escape_dn_value(value))
}

/// Attribute values with empties dropped, so a scalar and its
/// single-element list form compare equal and an all-empty set counts as
/// absent.
fn normalized(values: Option<&Vec<String>>) -> Vec<String> {
    values
        .map(|list| list.iter().filter(|v| !v.is_empty()).cloned().collect())
        .unwrap_or_default()
}
