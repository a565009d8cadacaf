//! Global type bindings.
//!
//! A binding maps a schema type to an existing target type, so the generator
//! emits no definition for it. Binding an object, interface or union type
//! also fixes the selection every use of it must make, because the target
//! type decodes exactly those fields.

use apollo_compiler::executable::{ExecutableDocument, FieldSet, Selection, SelectionSet};
use apollo_compiler::schema::Schema;
use apollo_compiler::validation::Valid;
use indexmap::IndexMap;
use qlgen_core::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;

/// One entry of the `[bindings]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeBinding {
    /// Path of the target type, e.g. `chrono::DateTime<chrono::Utc>`.
    #[serde(rename = "type")]
    pub target: String,
    /// The exact selection, as GraphQL, that uses of a composite type must
    /// make: `"id name"`.
    #[serde(default)]
    pub expect_exact_fields: Option<String>,
}

impl TypeBinding {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            expect_exact_fields: None,
        }
    }

    #[must_use]
    pub fn expect_exact_fields(mut self, fields: impl Into<String>) -> Self {
        self.expect_exact_fields = Some(fields.into());
        self
    }
}

/// Bindings keyed by schema type name.
pub type Bindings = IndexMap<String, TypeBinding>;

/// Response keys of a selection, fragments expanded, with the field each
/// key selects and that field's own shape.
#[derive(Debug, Default, PartialEq, Eq)]
struct Shape(BTreeMap<String, (String, Shape)>);

impl Shape {
    fn of(selection_set: &SelectionSet, document: &ExecutableDocument) -> Self {
        let mut shape = Self::default();
        shape.add(selection_set, document);
        shape
    }

    fn add(&mut self, selection_set: &SelectionSet, document: &ExecutableDocument) {
        for selection in &selection_set.selections {
            match selection {
                // Added by the generator, not written by the user.
                Selection::Field(field) if field.location().is_none() => {}
                Selection::Field(field) => {
                    let (_, shape) = self
                        .0
                        .entry(field.response_key().to_string())
                        .or_insert_with(|| (field.name.to_string(), Shape::default()));
                    shape.add(&field.selection_set, document);
                }
                Selection::InlineFragment(inline) => self.add(&inline.selection_set, document),
                Selection::FragmentSpread(spread) => {
                    if let Some(fragment) = document.fragments.get(&spread.fragment_name) {
                        self.add(&fragment.selection_set, document);
                    }
                }
            }
        }
    }
}

/// Checks a selection on a bound composite type against the binding's
/// `expect_exact_fields`.
pub(crate) fn validate_selection(
    schema: &Valid<Schema>,
    document: &ExecutableDocument,
    type_name: &str,
    binding: &TypeBinding,
    selection: &SelectionSet,
) -> Result<()> {
    let Some(expected) = &binding.expect_exact_fields else {
        return Err(Error::binding(
            format!(
                "`{type_name}` is bound to `{}` but its binding has no expect_exact_fields; \
                 set it to the selection `{}` decodes",
                binding.target, binding.target
            ),
            None,
        ));
    };

    let field_set = FieldSet::parse_and_validate(
        schema,
        selection.ty.clone(),
        expected.as_str(),
        "expect_exact_fields.graphql",
    )
    .map_err(|errors| {
        let messages = errors
            .errors
            .iter()
            .map(|diagnostic| diagnostic.to_json().message)
            .collect::<Vec<_>>()
            .join("; ");
        Error::binding(
            format!("invalid expect_exact_fields for `{type_name}`: {messages}"),
            None,
        )
    })?;

    if Shape::of(&field_set.selection_set, document) != Shape::of(selection, document) {
        return Err(Error::binding(
            format!(
                "selection on `{type_name}` does not match its binding to `{}`: expected exactly `{expected}`",
                binding.target
            ),
            None,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_binding() {
        let binding: TypeBinding = serde_json::from_str(
            r#"{"type": "crate::User", "expect_exact_fields": "id name"}"#,
        )
        .unwrap();
        assert_eq!(
            binding,
            TypeBinding::new("crate::User").expect_exact_fields("id name")
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = serde_json::from_str::<TypeBinding>(r#"{"type": "u64", "marshaler": "x"}"#);
        assert!(result.is_err());
    }
}
