//! Attribute value templates
//!
//! Deployments can derive attribute values from record fields at creation
//! time, e.g. `uid` from `{firstname|lower}.{surname|lower}`. Templates are
//! a restricted mini-language: `{field}` placeholders with an optional pipe
//! chain of whitelisted transforms. Nothing here evaluates code.

use std::collections::BTreeMap;

use tracing::debug;

use dirbook_core::entry::AttrMap;

use crate::record::LogicalRecord;
use crate::schema::normalize_attr;

/// Render a template against a record. Unknown placeholders render empty;
/// unknown pipe functions are ignored.
pub fn render(template: &str, record: &LogicalRecord) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        let mut expr = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            expr.push(c);
        }
        if !closed {
            // Unterminated placeholder, keep the literal text.
            out.push('{');
            out.push_str(&expr);
            break;
        }
        out.push_str(&evaluate(&expr, record));
    }
    out
}

fn evaluate(expr: &str, record: &LogicalRecord) -> String {
    let mut parts = expr.split('|');
    let field = match parts.next() {
        Some(field) => field.trim(),
        None => return String::new(),
    };
    let mut value = record
        .scalar(field)
        .or_else(|| record.field_values(field).first().copied())
        .unwrap_or_default()
        .to_string();

    for func in parts {
        match func.trim() {
            "lower" => value = value.to_lowercase(),
            "upper" => value = value.to_uppercase(),
            "trim" => value = value.trim().to_string(),
            "first" => {
                value = value
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_string()
            }
            "initial" => {
                value = value
                    .chars()
                    .next()
                    .map(|c| c.to_string())
                    .unwrap_or_default()
            }
            other => {
                debug!(function = other, "ignoring unknown template function");
            }
        }
    }
    value
}

/// Fill in configured autovalue attributes that the encoded map does not
/// already carry a non-empty value for.
pub fn apply(
    templates: &BTreeMap<String, String>,
    record: &LogicalRecord,
    attrs: &mut AttrMap,
) {
    for (attr, template) in templates {
        let attr = normalize_attr(attr);
        let present = attrs
            .get(&attr)
            .is_some_and(|values| values.iter().any(|v| !v.is_empty()));
        if present {
            continue;
        }
        let value = render(template, record);
        if !value.is_empty() {
            attrs.insert(attr, vec![value]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> LogicalRecord {
        LogicalRecord::default()
            .with("firstname", "Jane")
            .with("surname", "Doe")
            .with("name", "Jane Doe")
    }

    #[test]
    fn test_placeholder_substitution() {
        assert_eq!(render("{firstname}.{surname}", &record()), "Jane.Doe");
    }

    #[test]
    fn test_pipe_functions() {
        let r = record();
        assert_eq!(render("{firstname|lower}", &r), "jane");
        assert_eq!(render("{surname|upper}", &r), "DOE");
        assert_eq!(render("{name|first}", &r), "Jane");
        assert_eq!(render("{firstname|initial|lower}{surname|lower}", &r), "jdoe");
    }

    #[test]
    fn test_unknown_placeholder_renders_empty() {
        assert_eq!(render("x{nothere}y", &record()), "xy");
    }

    #[test]
    fn test_unknown_function_is_ignored() {
        assert_eq!(render("{firstname|reverse}", &record()), "Jane");
    }

    #[test]
    fn test_unterminated_placeholder_kept_literal() {
        assert_eq!(render("{firstname", &record()), "{firstname");
    }

    #[test]
    fn test_apply_skips_present_attributes() {
        let mut templates = BTreeMap::new();
        templates.insert("uid".to_string(), "{firstname|lower}".to_string());
        templates.insert("displayName".to_string(), "{name}".to_string());

        let mut attrs = AttrMap::new();
        attrs.insert("uid".to_string(), vec!["existing".to_string()]);

        apply(&templates, &record(), &mut attrs);
        assert_eq!(attrs["uid"], vec!["existing".to_string()]);
        assert_eq!(attrs["displayname"], vec!["Jane Doe".to_string()]);
    }
}
