//! Search filter builder
//!
//! Compiles logical search requests into directory filter expressions:
//! wildcard modes gated by the fuzzy-search flag, OR-expansion over target
//! fields and their attributes, AND-wrapped required-presence checks, and
//! the deployment base filter. Untrusted values are escaped per RFC 4515;
//! a `*` supplied by the caller stays a wildcard, but repeats collapse.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use dirbook_core::error::{StoreError, StoreResult};

use crate::config::DirectoryConfig;
use crate::schema::{normalize_attr, FieldCatalog};

/// How a search value is matched against attribute values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Substring match (leading and trailing wildcard).
    #[default]
    Partial,
    /// Exact match, no wildcard.
    Strict,
    /// Prefix match (trailing wildcard only).
    Prefix,
}

/// A logical search request, constructed per call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchSpec {
    /// Target logical fields; `*` means the configured full-text set.
    pub fields: Vec<String>,

    /// Search values. One value applies to every field; one value per
    /// field when the lengths match (parallel arrays).
    pub values: Vec<String>,

    /// Match mode for all values.
    pub mode: MatchMode,

    /// Logical fields that must be non-empty on every hit.
    pub required: Vec<String>,
}

impl SearchSpec {
    /// Search one field for one value.
    pub fn field(field: impl Into<String>, value: impl Into<String>, mode: MatchMode) -> Self {
        Self {
            fields: vec![field.into()],
            values: vec![value.into()],
            mode,
            required: Vec::new(),
        }
    }

    /// Full-text search across the configured attribute set.
    pub fn fulltext(value: impl Into<String>, mode: MatchMode) -> Self {
        Self::field("*", value, mode)
    }

    /// Require fields to be non-empty (builder style).
    pub fn with_required(mut self, fields: &[&str]) -> Self {
        self.required
            .extend(fields.iter().map(|f| (*f).to_string()));
        self
    }
}

/// Escape special characters in filter values (RFC 4515). A caller-supplied
/// `*` is left alone so explicit wildcards keep working.
pub fn escape_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// AND-combine filter expressions, skipping empties.
pub fn and_join(parts: &[&str]) -> String {
    join('&', parts)
}

/// OR-combine filter expressions, skipping empties.
pub fn or_join(parts: &[&str]) -> String {
    join('|', parts)
}

fn join(op: char, parts: &[&str]) -> String {
    let parts: Vec<&str> = parts.iter().copied().filter(|p| !p.is_empty()).collect();
    match parts.len() {
        0 => String::new(),
        1 => parts[0].to_string(),
        _ => format!("({op}{})", parts.concat()),
    }
}

/// Collapse repeated wildcards so a value already containing `*` never
/// produces `**` after wrapping.
fn collapse_wildcards(filter: &str) -> String {
    let mut out = String::with_capacity(filter.len());
    let mut last_star = false;
    for c in filter.chars() {
        if c == '*' && last_star {
            continue;
        }
        last_star = c == '*';
        out.push(c);
    }
    out
}

/// Compiles [`SearchSpec`]s for one directory source.
#[derive(Debug, Clone)]
pub struct FilterBuilder {
    catalog: Arc<FieldCatalog>,
    fuzzy_search: bool,
    search_fields: Vec<String>,
    base_filter: Option<String>,
}

impl FilterBuilder {
    /// Create a builder over the catalog of the given source.
    pub fn new(catalog: Arc<FieldCatalog>, config: &DirectoryConfig) -> Self {
        Self {
            catalog,
            fuzzy_search: config.fuzzy_search,
            search_fields: config.search_fields.iter().map(|a| normalize_attr(a)).collect(),
            base_filter: config.filter.clone(),
        }
    }

    /// Build the directory filter for a search request.
    ///
    /// Fails with a search error, before any directory call, when a
    /// full-text search is requested without a configured attribute set.
    pub fn build(&self, spec: &SearchSpec) -> StoreResult<String> {
        let mut field_filters: Vec<String> = Vec::new();
        let parallel = spec.values.len() == spec.fields.len() && spec.fields.len() > 1;

        for (i, field) in spec.fields.iter().enumerate() {
            let value = if parallel {
                spec.values.get(i)
            } else {
                spec.values.first()
            };
            let Some(value) = value else { continue };
            let pattern = self.wrap(value, spec.mode);

            let attrs = self.attrs_for(field)?;
            let parts: Vec<String> = attrs
                .iter()
                .map(|attr| format!("({attr}={pattern})"))
                .collect();
            let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
            let combined = or_join(&refs);
            if !combined.is_empty() {
                field_filters.push(combined);
            }
        }

        let refs: Vec<&str> = field_filters.iter().map(String::as_str).collect();
        let mut filter = or_join(&refs);

        if !spec.required.is_empty() {
            let mut presence: Vec<String> = Vec::new();
            for field in &spec.required {
                for attr in self.attrs_for(field)? {
                    presence.push(format!("({attr}=*)"));
                }
            }
            presence.push(filter);
            let refs: Vec<&str> = presence.iter().map(String::as_str).collect();
            filter = and_join(&refs);
        }

        if let Some(base) = &self.base_filter {
            filter = and_join(&[base, &filter]);
        }

        Ok(collapse_wildcards(&filter))
    }

    /// The attributes a search over `field` targets.
    fn attrs_for(&self, field: &str) -> StoreResult<Vec<String>> {
        if field == "*" {
            if self.search_fields.is_empty() {
                return Err(StoreError::search(
                    "full-text search unsupported: no search attributes configured",
                ));
            }
            return Ok(self.search_fields.clone());
        }

        let (base, subtype) = match field.split_once(':') {
            Some((base, subtype)) => (base, Some(subtype)),
            None => (field, None),
        };
        match self.catalog.get(base) {
            Some(spec) => match subtype {
                Some(subtype) => Ok(spec
                    .attr_for_subtype(subtype)
                    .map(|a| vec![a.to_string()])
                    .unwrap_or_default()),
                None => Ok(spec.attributes.clone()),
            },
            // Unmapped fields fall through as raw attribute names, so
            // deployment-specific attributes stay searchable.
            None => Ok(vec![normalize_attr(field)]),
        }
    }

    fn wrap(&self, value: &str, mode: MatchMode) -> String {
        let escaped = escape_value(value);
        if !self.fuzzy_search {
            return escaped;
        }
        match mode {
            MatchMode::Partial => format!("*{escaped}*"),
            MatchMode::Prefix => format!("{escaped}*"),
            MatchMode::Strict => escaped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectoryConfig;

    fn builder(config: &DirectoryConfig) -> FilterBuilder {
        FilterBuilder::new(Arc::new(FieldCatalog::build(config)), config)
    }

    fn config() -> DirectoryConfig {
        DirectoryConfig::new("ldap.example.com", "dc=example,dc=com")
            .with_field("name", "cn")
            .with_field("surname", "sn")
            .with_field("email:home", "mail")
            .with_field("email:work", "mailWork")
    }

    #[test]
    fn test_match_modes() {
        let b = builder(&config());
        assert_eq!(
            b.build(&SearchSpec::field("name", "an", MatchMode::Partial)).unwrap(),
            "(cn=*an*)"
        );
        assert_eq!(
            b.build(&SearchSpec::field("name", "an", MatchMode::Prefix)).unwrap(),
            "(cn=an*)"
        );
        assert_eq!(
            b.build(&SearchSpec::field("name", "an", MatchMode::Strict)).unwrap(),
            "(cn=an)"
        );
    }

    #[test]
    fn test_fuzzy_flag_gates_wildcards() {
        let mut cfg = config();
        cfg.fuzzy_search = false;
        let b = builder(&cfg);
        assert_eq!(
            b.build(&SearchSpec::field("name", "an", MatchMode::Partial)).unwrap(),
            "(cn=an)"
        );
    }

    #[test]
    fn test_wildcard_collapse() {
        let b = builder(&config());
        let filter = b
            .build(&SearchSpec::field("name", "an*", MatchMode::Partial))
            .unwrap();
        assert_eq!(filter, "(cn=*an*)");
        assert!(!filter.contains("**"));
    }

    #[test]
    fn test_untrusted_input_is_escaped() {
        let b = builder(&config());
        let filter = b
            .build(&SearchSpec::field("name", "a)(cn=x", MatchMode::Strict))
            .unwrap();
        assert_eq!(filter, "(cn=a\\29\\28cn=x)");
    }

    #[test]
    fn test_multi_attribute_field_or_expansion() {
        let b = builder(&config());
        let filter = b
            .build(&SearchSpec::field("email", "jane", MatchMode::Prefix))
            .unwrap();
        assert_eq!(filter, "(|(mail=jane*)(mailwork=jane*))");
    }

    #[test]
    fn test_parallel_fields_and_values() {
        let b = builder(&config());
        let spec = SearchSpec {
            fields: vec!["name".to_string(), "surname".to_string()],
            values: vec!["jane".to_string(), "doe".to_string()],
            mode: MatchMode::Strict,
            required: Vec::new(),
        };
        assert_eq!(b.build(&spec).unwrap(), "(|(cn=jane)(sn=doe))");
    }

    #[test]
    fn test_required_fields_wrap_with_presence_checks() {
        let b = builder(&config());
        let spec =
            SearchSpec::field("name", "jane", MatchMode::Strict).with_required(&["surname"]);
        assert_eq!(b.build(&spec).unwrap(), "(&(sn=*)(cn=jane))");
    }

    #[test]
    fn test_base_filter_is_anded() {
        let mut cfg = config();
        cfg.filter = Some("(objectClass=inetOrgPerson)".to_string());
        let b = builder(&cfg);
        assert_eq!(
            b.build(&SearchSpec::field("name", "jane", MatchMode::Strict)).unwrap(),
            "(&(objectClass=inetOrgPerson)(cn=jane))"
        );
    }

    #[test]
    fn test_fulltext_without_search_fields_fails_early() {
        let b = builder(&config());
        let err = b
            .build(&SearchSpec::fulltext("jane", MatchMode::Partial))
            .unwrap_err();
        assert_eq!(err.error_code(), "SEARCH_ERROR");
    }

    #[test]
    fn test_fulltext_expands_configured_attributes() {
        let mut cfg = config();
        cfg.search_fields = vec!["cn".to_string(), "mail".to_string()];
        let b = builder(&cfg);
        assert_eq!(
            b.build(&SearchSpec::fulltext("jane", MatchMode::Partial)).unwrap(),
            "(|(cn=*jane*)(mail=*jane*))"
        );
    }

    #[test]
    fn test_subtyped_field_targets_its_attribute() {
        let b = builder(&config());
        assert_eq!(
            b.build(&SearchSpec::field("email:work", "jane", MatchMode::Strict)).unwrap(),
            "(mailwork=jane)"
        );
    }
}
