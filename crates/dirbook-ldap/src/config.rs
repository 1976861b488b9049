//! Contact source configuration
//!
//! Deployment-defined mapping of the logical contact schema onto directory
//! attributes, plus connection, search and group settings. One
//! `DirectoryConfig` describes one directory source; the store context is
//! built from it once and discarded on reconfiguration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use dirbook_core::entry::Scope;
use dirbook_core::error::{StoreError, StoreResult};

/// Configuration for one directory-backed contact source.
#[derive(Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Directory hosts, tried in order until one connects and binds.
    pub hosts: Vec<String>,

    /// Directory port (389 for plain, 636 for LDAPS).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Use SSL/TLS (LDAPS).
    #[serde(default)]
    pub use_ssl: bool,

    /// Use STARTTLS upgrade on a plain connection.
    #[serde(default)]
    pub use_starttls: bool,

    /// Base DN for all contact operations.
    pub base_dn: String,

    /// Bind DN; may contain `{username}` / `{dn}` placeholders substituted
    /// for user-specific binds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_dn: Option<String>,

    /// Bind password; may contain the same placeholders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Use SASL bind instead of a simple bind.
    #[serde(default)]
    pub use_sasl: bool,

    /// SASL authorization id, when distinct from the bind identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sasl_authz_id: Option<String>,

    /// Logical field name (optionally `field:subtype`) to attribute
    /// assignment (optionally `attr:limit`, `*` = unbounded).
    #[serde(default)]
    pub fieldmap: BTreeMap<String, String>,

    /// Deprecated per-field key convention (`<field>_field` keys). Merged
    /// into `fieldmap` where the field is not already assigned.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub legacy_fields: BTreeMap<String, String>,

    /// Logical fields that must be non-empty on save.
    #[serde(default)]
    pub required_fields: Vec<String>,

    /// Attributes searched by a full-text (`*` field) search.
    #[serde(default)]
    pub search_fields: Vec<String>,

    /// Allow wildcard (fuzzy) matching in searches.
    #[serde(default = "default_true")]
    pub fuzzy_search: bool,

    /// Domain appended to bare email values missing an `@`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mail_domain: Option<String>,

    /// Bound on accumulated group-member resolution (0 = unbounded).
    #[serde(default = "default_size_limit")]
    pub size_limit: usize,

    /// Attribute forming the RDN of contact entries.
    #[serde(default = "default_name_attr")]
    pub name_attr: String,

    /// Object classes assigned to newly created contact entries.
    #[serde(default = "default_object_classes")]
    pub object_classes: Vec<String>,

    /// Search scope below the base DN.
    #[serde(default)]
    pub scope: Scope,

    /// Deployment-wide base filter ANDed onto every search.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Attributes stored as child entries under the contact entry, keyed by
    /// attribute name with the child's object class as value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sub_fields: BTreeMap<String, String>,

    /// Attribute value templates applied at creation time when the
    /// attribute is missing (restricted `{placeholder}` language).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub autovalues: BTreeMap<String, String>,

    /// Delimiter for legacy single-string serialized address storage.
    #[serde(default = "default_address_delimiter")]
    pub address_delimiter: String,

    /// The server supports virtual-list-view result windowing.
    #[serde(default)]
    pub vlv: bool,

    /// Sort attribute for contact listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_attr: Option<String>,

    /// Group resolution and listing settings.
    #[serde(default)]
    pub groups: GroupConfig,
}

/// Group settings of a directory source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Base DN for group listings; falls back to the source base DN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dn: Option<String>,

    /// Live group-listing filter. When unset, groups are synthesized from
    /// `static_filters`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Object classes assigned to newly created groups.
    #[serde(default = "default_group_object_classes")]
    pub object_classes: Vec<String>,

    /// Member-attribute override; when unset the attribute is detected from
    /// the group's object class.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_attr: Option<String>,

    /// Group display-name attribute.
    #[serde(default = "default_name_attr")]
    pub name_attr: String,

    /// Group email attribute, when groups carry addresses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_attr: Option<String>,

    /// Sort attribute for group listings.
    #[serde(default = "default_name_attr")]
    pub sort_attr: String,

    /// Search scope for group listings.
    #[serde(default)]
    pub scope: Scope,

    /// Page through the group listing with server-side windowing.
    #[serde(default)]
    pub vlv: bool,

    /// Rows per page when the listing is windowed.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Per-deployment object-class to member-attribute overrides
    /// (lower-cased class names).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub class_member_attrs: BTreeMap<String, String>,

    /// Static per-deployment group definitions used when no live group
    /// query is configured.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_filters: Vec<StaticGroupFilter>,

    /// Lifetime of the cached group listing, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

/// One static group definition: a name and the member filter it stands for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticGroupFilter {
    /// Display name of the synthesized group.
    pub name: String,
    /// Filter selecting the group's members.
    pub filter: String,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            base_dn: None,
            filter: None,
            object_classes: default_group_object_classes(),
            member_attr: None,
            name_attr: default_name_attr(),
            email_attr: None,
            sort_attr: default_name_attr(),
            scope: Scope::default(),
            vlv: false,
            page_size: default_page_size(),
            class_member_attrs: BTreeMap::new(),
            static_filters: Vec::new(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_port() -> u16 {
    389
}

fn default_true() -> bool {
    true
}

fn default_size_limit() -> usize {
    1000
}

fn default_name_attr() -> String {
    "cn".to_string()
}

fn default_address_delimiter() -> String {
    "$".to_string()
}

fn default_object_classes() -> Vec<String> {
    vec!["top".to_string(), "inetOrgPerson".to_string()]
}

fn default_group_object_classes() -> Vec<String> {
    vec!["top".to_string(), "groupOfNames".to_string()]
}

fn default_page_size() -> usize {
    500
}

fn default_cache_ttl_secs() -> u64 {
    600
}

impl std::fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("hosts", &self.hosts)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("use_sasl", &self.use_sasl)
            .field("fieldmap", &self.fieldmap)
            .field("required_fields", &self.required_fields)
            .field("fuzzy_search", &self.fuzzy_search)
            .field("size_limit", &self.size_limit)
            .field("name_attr", &self.name_attr)
            .field("scope", &self.scope)
            .field("filter", &self.filter)
            .field("vlv", &self.vlv)
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

impl DirectoryConfig {
    /// Create a config with required connection fields.
    pub fn new(host: impl Into<String>, base_dn: impl Into<String>) -> Self {
        Self {
            hosts: vec![host.into()],
            port: default_port(),
            use_ssl: false,
            use_starttls: false,
            base_dn: base_dn.into(),
            bind_dn: None,
            bind_password: None,
            use_sasl: false,
            sasl_authz_id: None,
            fieldmap: BTreeMap::new(),
            legacy_fields: BTreeMap::new(),
            required_fields: Vec::new(),
            search_fields: Vec::new(),
            fuzzy_search: true,
            mail_domain: None,
            size_limit: default_size_limit(),
            name_attr: default_name_attr(),
            object_classes: default_object_classes(),
            scope: Scope::default(),
            filter: None,
            sub_fields: BTreeMap::new(),
            autovalues: BTreeMap::new(),
            address_delimiter: default_address_delimiter(),
            vlv: false,
            sort_attr: None,
            groups: GroupConfig::default(),
        }
    }

    /// Add a fallback host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.hosts.push(host.into());
        self
    }

    /// Set bind credentials.
    pub fn with_bind(mut self, dn: impl Into<String>, password: impl Into<String>) -> Self {
        self.bind_dn = Some(dn.into());
        self.bind_password = Some(password.into());
        self
    }

    /// Assign a logical field to an attribute spec.
    pub fn with_field(mut self, field: impl Into<String>, attr: impl Into<String>) -> Self {
        self.fieldmap.insert(field.into(), attr.into());
        self
    }

    /// Mark logical fields as required.
    pub fn with_required(mut self, fields: &[&str]) -> Self {
        self.required_fields
            .extend(fields.iter().map(|f| (*f).to_string()));
        self
    }

    /// The field map with deprecated `<field>_field` keys folded in.
    /// An explicit `fieldmap` assignment wins over a legacy key.
    pub fn effective_fieldmap(&self) -> BTreeMap<String, String> {
        let mut map = self.fieldmap.clone();
        for (key, attr) in &self.legacy_fields {
            if let Some(field) = key.strip_suffix("_field") {
                map.entry(field.to_string()).or_insert_with(|| attr.clone());
            }
        }
        map
    }

    /// Bind identity and password for a user-specific session, with
    /// `{username}` and `{dn}` placeholders substituted.
    pub fn bind_for_user(&self, username: &str, user_dn: &str) -> (Option<String>, String) {
        let substitute = |template: &str| {
            template
                .replace("{username}", username)
                .replace("{dn}", user_dn)
        };
        let dn = self.bind_dn.as_deref().map(substitute);
        let password = self.bind_password.as_deref().map(substitute).unwrap_or_default();
        (dn, password)
    }

    /// The base DN used for group listings.
    pub fn group_base_dn(&self) -> &str {
        self.groups.base_dn.as_deref().unwrap_or(&self.base_dn)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> StoreResult<()> {
        if self.hosts.is_empty() || self.hosts.iter().all(String::is_empty) {
            return Err(StoreError::InvalidConfiguration {
                message: "at least one host is required".to_string(),
            });
        }

        if self.base_dn.is_empty() {
            return Err(StoreError::InvalidConfiguration {
                message: "base_dn is required".to_string(),
            });
        }

        if self.use_ssl && self.use_starttls {
            return Err(StoreError::InvalidConfiguration {
                message: "cannot use both SSL and STARTTLS".to_string(),
            });
        }

        if self.groups.page_size == 0 {
            return Err(StoreError::InvalidConfiguration {
                message: "group page_size must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Copy with credentials masked, safe for logs.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.bind_password.is_some() {
            config.bind_password = Some("***REDACTED***".to_string());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = DirectoryConfig::new("ldap.example.com", "dc=example,dc=com")
            .with_host("ldap2.example.com")
            .with_bind("cn=admin,dc=example,dc=com", "secret")
            .with_field("name", "cn")
            .with_required(&["name", "surname"]);

        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.fieldmap.get("name"), Some(&"cn".to_string()));
        assert_eq!(config.required_fields, vec!["name", "surname"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = DirectoryConfig::new("", "dc=example,dc=com");
        assert!(config.validate().is_err());

        config = DirectoryConfig::new("ldap.example.com", "");
        assert!(config.validate().is_err());

        config = DirectoryConfig::new("ldap.example.com", "dc=example,dc=com");
        config.use_ssl = true;
        config.use_starttls = true;
        assert!(config.validate().is_err());

        config = DirectoryConfig::new("ldap.example.com", "dc=example,dc=com");
        config.groups.page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_legacy_field_keys_merge_without_overriding() {
        let mut config = DirectoryConfig::new("ldap.example.com", "dc=example,dc=com")
            .with_field("name", "displayName");
        config
            .legacy_fields
            .insert("name_field".to_string(), "cn".to_string());
        config
            .legacy_fields
            .insert("email_field".to_string(), "mail".to_string());

        let map = config.effective_fieldmap();
        assert_eq!(map.get("name"), Some(&"displayName".to_string()));
        assert_eq!(map.get("email"), Some(&"mail".to_string()));
    }

    #[test]
    fn test_bind_placeholder_substitution() {
        let config = DirectoryConfig::new("ldap.example.com", "dc=example,dc=com")
            .with_bind("uid={username},ou=people,dc=example,dc=com", "secret");

        let (dn, password) =
            config.bind_for_user("jdoe", "uid=jdoe,ou=people,dc=example,dc=com");
        assert_eq!(dn.as_deref(), Some("uid=jdoe,ou=people,dc=example,dc=com"));
        assert_eq!(password, "secret");
    }

    #[test]
    fn test_redacted_hides_password() {
        let config = DirectoryConfig::new("ldap.example.com", "dc=example,dc=com")
            .with_bind("cn=admin,dc=example,dc=com", "super-secret");
        let redacted = config.redacted();
        assert_eq!(redacted.bind_password, Some("***REDACTED***".to_string()));
        assert!(!format!("{config:?}").contains("super-secret"));
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = DirectoryConfig::new("ldap.example.com", "dc=example,dc=com")
            .with_field("email:work", "mailWork");
        let json = serde_json::to_string(&config).unwrap();
        let parsed: DirectoryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(
            parsed.fieldmap.get("email:work"),
            Some(&"mailWork".to_string())
        );
        assert_eq!(parsed.groups.sort_attr, "cn");
    }
}
