//! Document rewriting before conversion.

use apollo_compiler::executable::{ExecutableDocument, Selection, SelectionSet};
use apollo_compiler::name;
use apollo_compiler::schema::{ExtendedType, Schema};
use qlgen_core::{Error, Result};

/// Adds `__typename` to every selection on an interface or union type that
/// does not already select it, in operations and fragments alike.
///
/// The added fields carry no source location, which is how later stages tell
/// them apart from fields the user wrote.
pub(crate) fn add_typenames(schema: &Schema, document: &mut ExecutableDocument) -> Result<()> {
    if let Some(operation) = document.operations.anonymous.as_mut() {
        add_to_selection_set(schema, &mut operation.make_mut().selection_set)?;
    }
    for operation in document.operations.named.values_mut() {
        add_to_selection_set(schema, &mut operation.make_mut().selection_set)?;
    }
    for fragment in document.fragments.values_mut() {
        add_to_selection_set(schema, &mut fragment.make_mut().selection_set)?;
    }
    Ok(())
}

fn add_to_selection_set(schema: &Schema, selection_set: &mut SelectionSet) -> Result<()> {
    for selection in &mut selection_set.selections {
        match selection {
            Selection::Field(field) => {
                add_to_selection_set(schema, &mut field.make_mut().selection_set)?;
            }
            Selection::InlineFragment(inline) => {
                add_to_selection_set(schema, &mut inline.make_mut().selection_set)?;
            }
            Selection::FragmentSpread(_) => {}
        }
    }

    let is_abstract = matches!(
        schema.types.get(&selection_set.ty),
        Some(ExtendedType::Interface(_) | ExtendedType::Union(_))
    );
    let selects_typename = selection_set.selections.iter().any(|selection| {
        matches!(selection, Selection::Field(field)
            if field.alias.is_none() && field.name.as_str() == "__typename")
    });
    if is_abstract && !selects_typename {
        let typename = selection_set
            .new_field(schema, name!("__typename"))
            .map_err(|_| {
                Error::unsupported(
                    format!("cannot select __typename on `{}`", selection_set.ty),
                    None,
                )
            })?;
        selection_set.push(typename);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
        type Query { pet: Pet, pets: [Pet!]! }
        interface Pet { name: String }
        type Dog implements Pet { name: String, barks: Boolean }
    "#;

    #[test]
    fn test_adds_typename_once() {
        let schema = Schema::parse_and_validate(SCHEMA, "schema.graphql").unwrap();
        let mut document = ExecutableDocument::parse_and_validate(
            &schema,
            "query Q { pet { name } pets { __typename name } }",
            "q.graphql",
        )
        .unwrap()
        .into_inner();

        add_typenames(&schema, &mut document).unwrap();
        let operation = &document.operations.named["Q"];
        let fields = |index: usize| -> Vec<(String, bool)> {
            let Selection::Field(field) = &operation.selection_set.selections[index] else {
                panic!("expected a field");
            };
            field
                .selection_set
                .selections
                .iter()
                .filter_map(|selection| match selection {
                    Selection::Field(field) => {
                        Some((field.name.to_string(), field.location().is_some()))
                    }
                    _ => None,
                })
                .collect()
        };
        assert_eq!(
            fields(0),
            vec![("name".to_string(), true), ("__typename".to_string(), false)]
        );
        assert_eq!(
            fields(1),
            vec![("__typename".to_string(), true), ("name".to_string(), true)]
        );
    }
}
