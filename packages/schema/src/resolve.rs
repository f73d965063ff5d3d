//! Settings and form resolution.
//!
//! Resolution never mutates stored settings: the effective value of a key is
//! the stored override when present, the declared default otherwise.

use crate::context::ContextProvider;
use crate::field::{Constraints, FieldType, SelectOption, SettingField};
use crate::schema::Schema;
use railspress_common::Settings;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Effective value of one declared field
pub fn resolve_value(field: &SettingField, stored: &Settings) -> Option<Value> {
    stored
        .get(&field.key)
        .cloned()
        .or_else(|| field.default.clone())
}

/// Effective settings bag: declared defaults overlaid with stored overrides.
///
/// Undeclared stored keys are not part of the resolved view.
pub fn resolve_settings(schema: &Schema, stored: &Settings) -> Settings {
    schema
        .settings
        .iter()
        .filter_map(|field| resolve_value(field, stored).map(|v| (field.key.clone(), v)))
        .collect()
}

/// One renderable form field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedField {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub value: Option<Value>,
    pub default: Option<Value>,
    pub options: Vec<SelectOption>,
    pub constraints: Constraints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

/// Build the form description for `schema` against current settings.
///
/// Options come from the static list when declared, otherwise from the
/// context provider; an unknown source yields an empty list.
pub fn resolve_form(
    schema: &Schema,
    current: &Settings,
    context: &dyn ContextProvider,
) -> Vec<ResolvedField> {
    schema
        .settings
        .iter()
        .map(|field| {
            let options = match (&field.options, &field.options_source) {
                (Some(options), _) => options.clone(),
                (None, Some(source)) => {
                    let resolved = context.options(source.key());
                    if resolved.is_none() {
                        tracing::debug!(
                            schema = %schema.display_name(),
                            key = %field.key,
                            source = %source,
                            "Context data has no entry for options source"
                        );
                    }
                    resolved.unwrap_or_default()
                }
                (None, None) => Vec::new(),
            };

            ResolvedField {
                key: field.key.clone(),
                label: field.display_label().to_string(),
                field_type: field.field_type,
                value: resolve_value(field, current),
                default: field.default.clone(),
                options,
                constraints: field.constraints.clone(),
                info: field.info.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextData, NoContext};
    use crate::field::OptionsSource;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new("blog_posts")
            .with_field(
                SettingField::new("heading", FieldType::Text)
                    .label("Heading")
                    .default_value(json!("Latest posts")),
            )
            .with_field(SettingField::new("items_per_page", FieldType::Number).default_value(json!(10)))
            .with_field(SettingField::new("subheading", FieldType::Text))
            .with_field(
                SettingField::new("category", FieldType::Select)
                    .options_source(OptionsSource::parse("@categories").unwrap()),
            )
            .with_field(
                SettingField::new("layout", FieldType::Radio)
                    .options(vec![SelectOption::new("grid", "Grid"), SelectOption::new("list", "List")]),
            )
    }

    #[test]
    fn test_default_when_no_override() {
        let resolved = resolve_settings(&schema(), &Settings::new());

        assert_eq!(resolved["heading"], json!("Latest posts"));
        assert_eq!(resolved["items_per_page"], json!(10));
        assert!(!resolved.contains_key("subheading"));
    }

    #[test]
    fn test_stored_value_wins() {
        let stored = Settings::from([
            ("items_per_page".to_string(), json!(3)),
            ("legacy".to_string(), json!("dropped")),
        ]);
        let resolved = resolve_settings(&schema(), &stored);

        assert_eq!(resolved["items_per_page"], json!(3));
        assert_eq!(resolved["heading"], json!("Latest posts"));
        assert!(!resolved.contains_key("legacy"));
    }

    #[test]
    fn test_form_resolves_dynamic_options() {
        let ctx = ContextData::new().with(
            "categories",
            vec![SelectOption::new("1", "News"), SelectOption::new("2", "Events")],
        );
        let form = resolve_form(&schema(), &Settings::new(), &ctx);

        let category = form.iter().find(|f| f.key == "category").unwrap();
        assert_eq!(category.options.len(), 2);

        let layout = form.iter().find(|f| f.key == "layout").unwrap();
        assert_eq!(layout.options[0].value, "grid");

        let heading = form.iter().find(|f| f.key == "heading").unwrap();
        assert_eq!(heading.label, "Heading");
        assert_eq!(heading.value, Some(json!("Latest posts")));
    }

    #[test]
    fn test_missing_source_is_empty_not_error() {
        let form = resolve_form(&schema(), &Settings::new(), &NoContext);

        let category = form.iter().find(|f| f.key == "category").unwrap();
        assert!(category.options.is_empty());
        assert_eq!(category.label, "category");
    }

    #[test]
    fn test_form_preserves_declaration_order() {
        let form = resolve_form(&schema(), &Settings::new(), &NoContext);
        let keys: Vec<_> = form.iter().map(|f| f.key.as_str()).collect();

        assert_eq!(keys, vec!["heading", "items_per_page", "subheading", "category", "layout"]);
    }
}
