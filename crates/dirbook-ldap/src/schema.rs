//! Field catalog
//!
//! Turns the declarative field-to-attribute configuration into the runtime
//! catalog consumed by the codec, filter builder and mutation planner. Built
//! once per source configuration, immutable afterwards.
//!
//! Malformed configuration entries degrade to inert catalog entries instead
//! of failing; configuration validation is not this module's job.

use std::collections::BTreeMap;

use crate::config::DirectoryConfig;

/// Attribute aliases: short configuration spellings resolve to the
/// canonical long form before anything else sees them.
const ATTR_ALIASES: &[(&str, &str)] = &[("gn", "givenname"), ("rfc822mailbox", "mail")];

/// Child fields of the composite address, in serialized storage order.
/// Region has no slot in the legacy serialized form.
pub const ADDRESS_PARTS: &[&str] = &["street", "locality", "zipcode", "country"];

/// All child fields a structured address composite may own.
pub const ADDRESS_CHILDREN: &[&str] = &["street", "locality", "zipcode", "region", "country"];

/// Normalize an attribute name: lower-case and resolve aliases.
pub fn normalize_attr(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    for (alias, canonical) in ATTR_ALIASES {
        if lower == *alias {
            return (*canonical).to_string();
        }
    }
    lower
}

/// One logical field's mapping onto directory attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSpec {
    /// Mapped attribute names, parallel to `subtypes` when subtyped.
    pub attributes: Vec<String>,

    /// Subtype per attribute; an empty string marks the untyped slot.
    pub subtypes: Vec<String>,

    /// Total value-count limit across subtypes; `None` = unbounded.
    pub limit: Option<usize>,

    /// Composite child field to attribute, for structured composites.
    pub children: BTreeMap<String, String>,

    /// Join/split delimiter for legacy single-string composite storage.
    pub serialized: Option<String>,
}

impl FieldSpec {
    /// Whether this field is a composite (structured or serialized).
    pub fn is_composite(&self) -> bool {
        !self.children.is_empty() || self.serialized.is_some()
    }

    /// The attribute mapped for a given subtype, falling back to the
    /// untyped slot, then to the first attribute.
    pub fn attr_for_subtype(&self, subtype: &str) -> Option<&str> {
        self.subtypes
            .iter()
            .position(|s| s == subtype)
            .or_else(|| self.subtypes.iter().position(String::is_empty))
            .or(if self.attributes.is_empty() { None } else { Some(0) })
            .and_then(|i| self.attributes.get(i))
            .map(String::as_str)
    }
}

/// The runtime field catalog.
#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    fields: BTreeMap<String, FieldSpec>,
    required: Vec<String>,
    name_attr: String,
}

impl FieldCatalog {
    /// Build the catalog from a source configuration.
    pub fn build(config: &DirectoryConfig) -> Self {
        let mut fields: BTreeMap<String, FieldSpec> = BTreeMap::new();

        for (key, value) in config.effective_fieldmap() {
            let (field, subtype) = split_field_key(&key);
            let (attr, limit) = split_attr_spec(&value);
            if field.is_empty() {
                continue;
            }

            let spec = fields.entry(field).or_default();
            if !attr.is_empty() {
                spec.attributes.push(attr);
                spec.subtypes.push(subtype);
            }
            spec.limit = match (spec.attributes.len() <= 1, spec.limit, limit) {
                // First attribute takes the parsed limit as-is.
                (true, _, parsed) => parsed,
                (false, None, _) | (false, _, None) => None,
                (false, Some(total), Some(add)) => Some(total + add),
            };
        }

        fold_address(&mut fields, &config.address_delimiter);

        let mut required: Vec<String> = config
            .required_fields
            .iter()
            .map(|f| normalize_attr(f))
            .collect();

        // The naming attribute must be present on save; exempt when an
        // autovalue rule derives it.
        let name_attr = normalize_attr(&config.name_attr);
        let autovalued = config
            .autovalues
            .keys()
            .any(|attr| normalize_attr(attr) == name_attr);
        if !autovalued {
            let name_field = fields
                .iter()
                .find(|(_, spec)| spec.attributes.iter().any(|a| *a == name_attr))
                .map(|(field, _)| field.clone())
                .unwrap_or_else(|| name_attr.clone());
            if !required.contains(&name_field) {
                required.push(name_field);
            }
        }

        Self {
            fields,
            required,
            name_attr,
        }
    }

    /// Look up a field by logical name (already without subtype).
    pub fn get(&self, field: &str) -> Option<&FieldSpec> {
        self.fields.get(field)
    }

    /// Iterate over all fields.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldSpec)> {
        self.fields.iter()
    }

    /// Logical fields required to be non-empty on save.
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// The RDN attribute of contact entries.
    pub fn name_attr(&self) -> &str {
        &self.name_attr
    }

    /// Every directory attribute the catalog covers, deduplicated; this is
    /// the attribute list requested from searches.
    pub fn attributes(&self) -> Vec<String> {
        let mut attrs: Vec<String> = Vec::new();
        for spec in self.fields.values() {
            for attr in spec.attributes.iter().chain(spec.children.values()) {
                if !attrs.contains(attr) {
                    attrs.push(attr.clone());
                }
            }
        }
        if !attrs.contains(&"objectclass".to_string()) {
            attrs.push("objectclass".to_string());
        }
        attrs
    }

    /// Resolve an attribute back to its (field, subtype) slot.
    pub fn field_for_attr(&self, attr: &str) -> Option<(&str, &str)> {
        let attr = normalize_attr(attr);
        for (field, spec) in &self.fields {
            if let Some(i) = spec.attributes.iter().position(|a| *a == attr) {
                return Some((field.as_str(), spec.subtypes[i].as_str()));
            }
        }
        None
    }
}

/// Split `field:subtype` into its parts; the subtype defaults to empty.
fn split_field_key(key: &str) -> (String, String) {
    match key.split_once(':') {
        Some((field, subtype)) => (
            field.trim().to_lowercase(),
            subtype.trim().to_lowercase(),
        ),
        None => (key.trim().to_lowercase(), String::new()),
    }
}

/// Split `attr:limit` into the normalized attribute and its value limit.
/// `*` means unbounded; anything unparseable degrades to the default of 1.
fn split_attr_spec(value: &str) -> (String, Option<usize>) {
    match value.split_once(':') {
        Some((attr, "*")) => (normalize_attr(attr), None),
        Some((attr, limit)) => {
            let limit = limit.trim().parse::<usize>().ok().filter(|n| *n >= 1);
            (normalize_attr(attr), Some(limit.unwrap_or(1)))
        }
        None => (normalize_attr(value), Some(1)),
    }
}

/// Fold address configuration into one composite field.
///
/// Independent street+locality fields become a structured composite owning
/// the child fields; a directly mapped address becomes a serialized
/// composite splitting on the configured delimiter.
fn fold_address(fields: &mut BTreeMap<String, FieldSpec>, delimiter: &str) {
    if fields.contains_key("street") && fields.contains_key("locality") {
        let mut children = BTreeMap::new();
        for child in ADDRESS_CHILDREN {
            if let Some(spec) = fields.remove(*child) {
                if let Some(attr) = spec.attributes.first() {
                    children.insert((*child).to_string(), attr.clone());
                }
            }
        }
        let address = fields.entry("address".to_string()).or_default();
        address.children = children;
        address.limit = None;
    } else if let Some(address) = fields.get_mut("address") {
        if !address.attributes.is_empty() {
            address.serialized = Some(delimiter.to_string());
        }
    }
}
