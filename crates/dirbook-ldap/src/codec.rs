//! Record codec
//!
//! Converts raw directory entries to logical records and back, driven by the
//! field catalog. Decoding keeps a raw-attribute shadow on the record so a
//! later save can be diffed; encoding is the inverse and is lossy only for
//! attributes the catalog does not map.

use std::collections::BTreeMap;
use std::sync::Arc;

use dirbook_core::entry::{AttrMap, DirectoryEntry};
use dirbook_core::ids::encode_id;

use crate::config::DirectoryConfig;
use crate::record::{FieldValue, LogicalRecord, RecordKind};
use crate::schema::{FieldCatalog, FieldSpec, ADDRESS_PARTS};

/// Object classes that mark an entry as a group.
pub const GROUP_CLASSES: &[&str] = &[
    "group",
    "groupofnames",
    "kolabgroupofnames",
    "groupofuniquenames",
    "kolabgroupofuniquenames",
    "univentiongroup",
    "groupofurls",
];

/// Fields the UI expects to be scalar even when the catalog allows repeats.
const SCALAR_NAME_FIELDS: &[&str] = &["name", "surname", "firstname", "middlename", "nickname"];

/// Whether an entry's object classes mark it as a group.
pub fn is_group_entry(entry: &DirectoryEntry) -> bool {
    entry
        .object_classes()
        .iter()
        .any(|oc| GROUP_CLASSES.contains(&oc.to_lowercase().as_str()))
}

/// Entry/record converter for one directory source.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    catalog: Arc<FieldCatalog>,
    mail_domain: Option<String>,
    group_name_attr: String,
}

impl RecordCodec {
    /// Create a codec over the catalog of the given source.
    pub fn new(catalog: Arc<FieldCatalog>, config: &DirectoryConfig) -> Self {
        Self {
            catalog,
            mail_domain: config.mail_domain.clone(),
            group_name_attr: config.groups.name_attr.to_lowercase(),
        }
    }

    /// Decode a directory entry into a logical record.
    pub fn decode(&self, entry: &DirectoryEntry) -> LogicalRecord {
        let is_group = is_group_entry(entry);
        let mut record = LogicalRecord {
            id: encode_id(&entry.dn),
            dn: entry.dn.clone(),
            kind: if is_group {
                RecordKind::Group
            } else {
                RecordKind::Person
            },
            read_only: is_group,
            fields: BTreeMap::new(),
            raw: entry.attrs.clone(),
        };

        if is_group {
            if let Some(name) = entry.first(&self.group_name_attr) {
                record.set("name", name);
            }
        }

        for (field, spec) in self.catalog.fields() {
            if is_group && field == "name" {
                continue;
            }
            if let Some(delimiter) = &spec.serialized {
                self.decode_serialized(entry, &mut record, field, spec, delimiter);
            } else if !spec.children.is_empty() {
                self.decode_structured(entry, &mut record, field, spec);
            } else {
                self.decode_plain(entry, &mut record, field, spec);
            }
        }

        record
    }

    fn decode_plain(
        &self,
        entry: &DirectoryEntry,
        record: &mut LogicalRecord,
        field: &str,
        spec: &FieldSpec,
    ) {
        let force_scalar = SCALAR_NAME_FIELDS.contains(&field);
        let mut remaining = spec.limit;

        for (i, attr) in spec.attributes.iter().enumerate() {
            let subtype = &spec.subtypes[i];
            let mut values: Vec<String> = entry.values(attr).to_vec();

            if field == "email" {
                if let Some(domain) = &self.mail_domain {
                    for value in &mut values {
                        if !value.is_empty() && !value.contains('@') {
                            *value = format!("{value}@{domain}");
                        }
                    }
                }
            }

            if force_scalar {
                values.truncate(1);
            }
            if let Some(cap) = remaining {
                values.truncate(cap);
                remaining = Some(cap - values.len());
            }
            if values.is_empty() {
                continue;
            }

            let key = field_key(field, subtype);
            if force_scalar && record.get(&key).is_some() {
                continue;
            }
            let value = if values.len() == 1 || force_scalar {
                FieldValue::One(values.remove(0))
            } else {
                FieldValue::Many(values)
            };
            record.set(key, value);
        }
    }

    fn decode_structured(
        &self,
        entry: &DirectoryEntry,
        record: &mut LogicalRecord,
        field: &str,
        spec: &FieldSpec,
    ) {
        let mut rows: Vec<BTreeMap<String, String>> = Vec::new();
        for (child, attr) in &spec.children {
            for (idx, value) in entry.values(attr).iter().enumerate() {
                while rows.len() <= idx {
                    rows.push(BTreeMap::new());
                }
                if !value.is_empty() {
                    rows[idx].insert(child.clone(), value.clone());
                }
            }
        }
        if !rows.is_empty() {
            record.set(field, FieldValue::Composites(rows));
        }
    }

    fn decode_serialized(
        &self,
        entry: &DirectoryEntry,
        record: &mut LogicalRecord,
        field: &str,
        spec: &FieldSpec,
        delimiter: &str,
    ) {
        let Some(attr) = spec.attributes.first() else {
            return;
        };
        let rows: Vec<BTreeMap<String, String>> = entry
            .values(attr)
            .iter()
            .map(|joined| {
                let mut row = BTreeMap::new();
                for (part, value) in ADDRESS_PARTS.iter().zip(joined.split(delimiter)) {
                    if !value.is_empty() {
                        row.insert((*part).to_string(), value.to_string());
                    }
                }
                row
            })
            .collect();
        if !rows.is_empty() {
            record.set(field, FieldValue::Composites(rows));
        }
    }

    /// Encode a logical record into the attribute map covered by the
    /// catalog. Empty values are dropped; base-field values are promoted
    /// into the first subtype slot that has no value of its own.
    pub fn encode(&self, record: &LogicalRecord) -> AttrMap {
        let mut out = AttrMap::new();

        for (field, spec) in self.catalog.fields() {
            if let Some(delimiter) = &spec.serialized {
                self.encode_serialized(record, &mut out, field, spec, delimiter);
            } else if !spec.children.is_empty() {
                self.encode_structured(record, &mut out, field, spec);
            } else {
                self.encode_plain(record, &mut out, field, spec);
            }
        }

        out
    }

    fn encode_plain(
        &self,
        record: &LogicalRecord,
        out: &mut AttrMap,
        field: &str,
        spec: &FieldSpec,
    ) {
        let mut base_consumed = false;
        let mut remaining = spec.limit;

        for (i, attr) in spec.attributes.iter().enumerate() {
            let subtype = &spec.subtypes[i];
            let key = field_key(field, subtype);
            if subtype.is_empty() {
                base_consumed = true;
            }

            let mut values: Vec<String> = record
                .get(&key)
                .map(|v| v.values().into_iter().map(str::to_string).collect())
                .unwrap_or_default();

            if values.is_empty() && !base_consumed {
                if let Some(base) = record.get(field) {
                    values = base.values().into_iter().map(str::to_string).collect();
                    base_consumed = true;
                }
            }

            values.retain(|v| !v.is_empty());
            if let Some(cap) = remaining {
                values.truncate(cap);
                remaining = Some(cap - values.len());
            }
            if !values.is_empty() {
                out.insert(attr.clone(), values);
            }
        }
    }

    fn encode_structured(
        &self,
        record: &LogicalRecord,
        out: &mut AttrMap,
        field: &str,
        spec: &FieldSpec,
    ) {
        let rows = composite_rows(record, field);
        if rows.is_empty() {
            return;
        }
        for (child, attr) in &spec.children {
            let values: Vec<String> = rows
                .iter()
                .filter_map(|row| row.get(child))
                .filter(|v| !v.is_empty())
                .cloned()
                .collect();
            if !values.is_empty() {
                out.insert(attr.clone(), values);
            }
        }
    }

    fn encode_serialized(
        &self,
        record: &LogicalRecord,
        out: &mut AttrMap,
        field: &str,
        spec: &FieldSpec,
        delimiter: &str,
    ) {
        let Some(attr) = spec.attributes.first() else {
            return;
        };
        let rows = composite_rows(record, field);
        let values: Vec<String> = rows
            .iter()
            .map(|row| {
                let mut joined = ADDRESS_PARTS
                    .iter()
                    .map(|part| row.get(*part).map(String::as_str).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(delimiter);
                while joined.ends_with(delimiter) {
                    joined.truncate(joined.len() - delimiter.len());
                }
                joined
            })
            .filter(|v| !v.is_empty())
            .collect();
        if !values.is_empty() {
            out.insert(attr.clone(), values);
        }
    }
}

fn field_key(field: &str, subtype: &str) -> String {
    if subtype.is_empty() {
        field.to_string()
    } else {
        format!("{field}:{subtype}")
    }
}

/// Collect the composite rows stored under a field, merging its subtyped
/// keys in key order.
fn composite_rows(record: &LogicalRecord, field: &str) -> Vec<BTreeMap<String, String>> {
    let prefix = format!("{field}:");
    record
        .fields
        .iter()
        .filter(|(key, _)| *key == field || key.starts_with(&prefix))
        .flat_map(|(_, value)| match value {
            FieldValue::Composites(rows) => rows.clone(),
            _ => Vec::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectoryConfig;

    fn codec(config: &DirectoryConfig) -> RecordCodec {
        RecordCodec::new(Arc::new(FieldCatalog::build(config)), config)
    }

    fn person_config() -> DirectoryConfig {
        DirectoryConfig::new("ldap.example.com", "dc=example,dc=com")
            .with_field("name", "cn")
            .with_field("surname", "sn")
            .with_field("firstname", "givenName")
            .with_field("email:home", "mail:*")
            .with_field("email:work", "mailWork:*")
            .with_field("phone", "telephoneNumber:2")
    }

    fn person_entry() -> DirectoryEntry {
        DirectoryEntry::new("cn=Jane Doe,ou=people,dc=example,dc=com")
            .with("objectClass", "inetOrgPerson")
            .with("cn", "Jane Doe")
            .with("sn", "Doe")
            .with("givenName", "Jane")
            .with("mail", "jane@example.com")
            .with("mail", "jane.doe@example.com")
            .with("mailWork", "jane@corp.example.com")
            .with("telephoneNumber", "+1 555 0100")
    }

    #[test]
    fn test_decode_basic_fields() {
        let config = person_config();
        let record = codec(&config).decode(&person_entry());

        assert_eq!(record.kind, RecordKind::Person);
        assert!(!record.read_only);
        assert_eq!(record.scalar("name"), Some("Jane Doe"));
        assert_eq!(record.scalar("surname"), Some("Doe"));
        assert_eq!(
            record.get("email:home"),
            Some(&FieldValue::Many(vec![
                "jane@example.com".to_string(),
                "jane.doe@example.com".to_string()
            ]))
        );
        assert_eq!(record.scalar("email:work"), Some("jane@corp.example.com"));
        assert_eq!(record.scalar("phone"), Some("+1 555 0100"));
        assert_eq!(record.raw, person_entry().attrs);
    }

    #[test]
    fn test_round_trip_preserves_catalog_attributes() {
        let config = person_config();
        let codec = codec(&config);
        let entry = person_entry();
        let encoded = codec.encode(&codec.decode(&entry));

        for attr in ["cn", "sn", "givenname", "mail", "mailwork", "telephonenumber"] {
            assert_eq!(
                encoded.get(attr),
                entry.attrs.get(attr),
                "attribute {attr} not preserved"
            );
        }
        // Attributes outside the catalog are not carried over.
        assert!(!encoded.contains_key("objectclass"));
    }

    #[test]
    fn test_mail_domain_suffix() {
        let mut config = person_config();
        config.mail_domain = Some("example.com".to_string());
        let entry = DirectoryEntry::new("cn=bare,dc=example,dc=com").with("mail", "jane");
        let record = codec(&config).decode(&entry);
        assert_eq!(record.scalar("email:home"), Some("jane@example.com"));
    }

    #[test]
    fn test_name_fields_forced_scalar() {
        let config = DirectoryConfig::new("ldap.example.com", "dc=example,dc=com")
            .with_field("surname", "sn:*");
        let entry = DirectoryEntry::new("cn=x,dc=example,dc=com")
            .with("sn", "Doe")
            .with("sn", "Smith");
        let record = codec(&config).decode(&entry);
        assert_eq!(record.get("surname"), Some(&FieldValue::One("Doe".to_string())));
    }

    #[test]
    fn test_group_entry_decodes_read_only_with_remapped_name() {
        let mut config = person_config();
        config.groups.name_attr = "description".to_string();
        let entry = DirectoryEntry::new("cn=devs,ou=groups,dc=example,dc=com")
            .with("objectClass", "groupOfNames")
            .with("cn", "devs")
            .with("description", "Developers");
        let record = codec(&config).decode(&entry);

        assert_eq!(record.kind, RecordKind::Group);
        assert!(record.read_only);
        assert_eq!(record.scalar("name"), Some("Developers"));
    }

    #[test]
    fn test_structured_address_round_trip() {
        let config = DirectoryConfig::new("ldap.example.com", "dc=example,dc=com")
            .with_field("street", "street")
            .with_field("locality", "l")
            .with_field("zipcode", "postalCode");
        let codec = codec(&config);
        let entry = DirectoryEntry::new("cn=x,dc=example,dc=com")
            .with("street", "123 Main St")
            .with("l", "Springfield")
            .with("postalCode", "12345");

        let record = codec.decode(&entry);
        let rows = match record.get("address") {
            Some(FieldValue::Composites(rows)) => rows,
            other => panic!("expected composite address, got {other:?}"),
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("street").map(String::as_str), Some("123 Main St"));
        assert_eq!(rows[0].get("locality").map(String::as_str), Some("Springfield"));

        let encoded = codec.encode(&record);
        assert_eq!(encoded.get("street"), entry.attrs.get("street"));
        assert_eq!(encoded.get("l"), entry.attrs.get("l"));
        assert_eq!(encoded.get("postalcode"), entry.attrs.get("postalcode"));
    }

    #[test]
    fn test_serialized_address_byte_identical_when_complete() {
        let config = DirectoryConfig::new("ldap.example.com", "dc=example,dc=com")
            .with_field("address", "postalAddress");
        let codec = codec(&config);
        let joined = "123 Main St$Springfield$12345$US";
        let entry =
            DirectoryEntry::new("cn=x,dc=example,dc=com").with("postalAddress", joined);

        let record = codec.decode(&entry);
        let encoded = codec.encode(&record);
        assert_eq!(
            encoded.get("postaladdress"),
            Some(&vec![joined.to_string()])
        );
    }

    #[test]
    fn test_encode_promotes_base_value_into_subtype_slot() {
        let config = person_config();
        let record = LogicalRecord::default().with("email", "jane@example.com");
        let encoded = codec(&config).encode(&record);
        assert_eq!(encoded.get("mail"), Some(&vec!["jane@example.com".to_string()]));
        assert!(!encoded.contains_key("mailwork"));
    }

    #[test]
    fn test_encode_drops_empty_values_and_honors_limit() {
        let config = person_config();
        let record = LogicalRecord::default()
            .with("name", "")
            .with(
                "phone",
                vec![
                    "+1".to_string(),
                    "+2".to_string(),
                    "+3".to_string(),
                ],
            );
        let encoded = codec(&config).encode(&record);
        assert!(!encoded.contains_key("cn"));
        assert_eq!(
            encoded.get("telephonenumber"),
            Some(&vec!["+1".to_string(), "+2".to_string()])
        );
    }
}
