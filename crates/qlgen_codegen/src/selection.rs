//! Selection resolution.
//!
//! A selection set becomes the field list of one struct: fields become
//! keyed fields, inline fragments that apply to the containing type are
//! expanded in place, and named fragment spreads become embedded fields
//! holding the fragment's own type.

use crate::annotations::{self, Options, Target};
use crate::convert::Converter;
use crate::names::PrefixChain;
use crate::types::{FieldDef, TypeDef, TypeNode};
use apollo_compiler::executable::{Field, Selection, SelectionSet};
use apollo_compiler::parser::SourceSpan;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::Node;
use qlgen_core::{Error, Result};
use rustc_hash::FxHashMap;

#[derive(Default)]
struct Collected {
    fields: Vec<FieldDef>,
    seen: FxHashMap<String, Node<Field>>,
    /// Fields selected by fragment spreads that apply, by response key.
    provided: FxHashMap<String, Node<Field>>,
}

impl Converter<'_> {
    /// Resolves `selection_set` into fields for a struct of type
    /// `containing`.
    ///
    /// `containing` is the selection's own type, or, when resolving one
    /// variant of an interface or union, the concrete object type.
    pub(crate) fn resolve_selection_set(
        &mut self,
        chain: &PrefixChain,
        selection_set: &SelectionSet,
        containing: &str,
        query_options: &Options,
    ) -> Result<Vec<FieldDef>> {
        let mut collected = Collected::default();
        self.spread_fields(containing, selection_set, false, &mut collected.provided);
        self.collect(chain, selection_set, containing, query_options, &mut collected)?;
        Ok(self.drop_provided_leaves(collected.fields))
    }

    fn collect(
        &mut self,
        chain: &PrefixChain,
        selection_set: &SelectionSet,
        containing: &str,
        query_options: &Options,
        collected: &mut Collected,
    ) -> Result<()> {
        let document = self.document;
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    let key = field.response_key().as_str();
                    if let Some(previous) = collected.seen.get(key) {
                        let identical = previous.name == field.name
                            && previous.selection_set == field.selection_set;
                        let leaves = previous.selection_set.selections.is_empty()
                            && field.selection_set.selections.is_empty();
                        if identical || leaves {
                            continue;
                        }
                        return Err(Error::duplicate_field(
                            format!(
                                "`{key}` is selected more than once with different sub-selections; \
                                 combine them into a single selection"
                            ),
                            self.position(field.location()),
                        ));
                    }
                    collected.seen.insert(key.to_string(), field.clone());
                    if self.provided_by_spread(field, collected)? {
                        continue;
                    }
                    let converted = self.convert_field(chain, field, query_options)?;
                    collected.fields.push(converted);
                }
                Selection::InlineFragment(inline) => {
                    self.reject_options(inline.location(), Target::InlineFragment)?;
                    let condition = inline
                        .type_condition
                        .as_ref()
                        .unwrap_or(&inline.selection_set.ty);
                    if self.fragment_applies(containing, condition) {
                        self.collect(
                            chain,
                            &inline.selection_set,
                            containing,
                            query_options,
                            collected,
                        )?;
                    }
                }
                Selection::FragmentSpread(spread) => {
                    self.reject_options(spread.location(), Target::FragmentSpread)?;
                    let position = self.position(spread.location());
                    let Some(fragment) = document.fragments.get(&spread.fragment_name) else {
                        return Err(Error::unsupported(
                            format!("unknown fragment `{}`", spread.fragment_name),
                            position,
                        ));
                    };
                    if !self.fragment_applies(containing, fragment.type_condition()) {
                        continue;
                    }
                    let node = self.convert_fragment(fragment)?;
                    let node = self.narrow(node, containing);
                    let embedded = collected
                        .fields
                        .iter()
                        .any(|field| field.is_embedded() && field.ty == node);
                    if !embedded {
                        collected.fields.push(FieldDef::embedded(node, position));
                    }
                }
            }
        }
        Ok(())
    }

    fn convert_field(
        &mut self,
        chain: &PrefixChain,
        field: &Node<Field>,
        query_options: &Options,
    ) -> Result<FieldDef> {
        let position = self.position(field.location());
        let annotation = self.annotation(field.location())?;
        annotations::validate(
            &annotation.options,
            Target::Field {
                field,
                schema: self.schema,
                document: self.document,
            },
            annotation.position.as_ref(),
        )?;
        let options = annotation.options.inherit(query_options);

        let key = field.response_key().as_str();
        let ty = self.convert_type(
            &chain.push(key),
            field.ty(),
            Some(&field.selection_set),
            &options,
            query_options,
            position.as_ref(),
            true,
        )?;

        let bound = matches!(&ty, TypeNode::Opaque(opaque) if !opaque.builtin);
        Ok(FieldDef {
            key: Some(key.to_string()),
            null_as_default: !field.ty().is_non_null() && !ty.is_optional() && !bound,
            ty,
            description: annotation
                .description
                .or_else(|| field.definition.description.as_deref().map(str::to_string)),
            omit_empty: false,
            position,
        })
    }

    fn reject_options(&self, location: Option<SourceSpan>, target: Target<'_>) -> Result<()> {
        let annotation = self.annotation(location)?;
        annotations::validate(&annotation.options, target, annotation.position.as_ref())
    }

    /// Returns true if a fragment on `condition` applies to `containing`:
    /// the types are equal, `containing` implements the interface
    /// `condition`, or `containing` is a member of the union `condition`.
    pub(crate) fn fragment_applies(&self, containing: &str, condition: &str) -> bool {
        if containing == condition || annotations::implements(self.schema, containing, condition) {
            return true;
        }
        matches!(
            self.schema.types.get(condition),
            Some(ExtendedType::Union(union))
                if union.members.iter().any(|member| member.name.as_str() == containing)
        )
    }

    /// Returns true if a composite field repeats one a spread fragment
    /// already selects under the same response key with the same
    /// sub-selection, so the embedded fragment carries it.
    fn provided_by_spread(&self, field: &Node<Field>, collected: &Collected) -> Result<bool> {
        if field.selection_set.selections.is_empty() {
            return Ok(false);
        }
        let Some(spread) = collected.provided.get(field.response_key().as_str()) else {
            return Ok(false);
        };
        if spread.name != field.name {
            return Ok(false);
        }
        if spread.selection_set != field.selection_set {
            return Err(Error::duplicate_field(
                format!(
                    "`{}` is also selected by a fragment with a different sub-selection; \
                     combine them into a single selection",
                    field.response_key()
                ),
                self.position(field.location()),
            ));
        }
        Ok(true)
    }

    /// Collects the fields that fragment spreads in `selection_set` select
    /// on `containing`. Fields written directly count only once inside a
    /// spread.
    fn spread_fields(
        &self,
        containing: &str,
        selection_set: &SelectionSet,
        in_spread: bool,
        provided: &mut FxHashMap<String, Node<Field>>,
    ) {
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    if in_spread {
                        provided
                            .entry(field.response_key().to_string())
                            .or_insert_with(|| field.clone());
                    }
                }
                Selection::InlineFragment(inline) => {
                    let condition = inline
                        .type_condition
                        .as_ref()
                        .unwrap_or(&inline.selection_set.ty);
                    if self.fragment_applies(containing, condition) {
                        self.spread_fields(containing, &inline.selection_set, in_spread, provided);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let Some(fragment) = self.document.fragments.get(&spread.fragment_name) else {
                        continue;
                    };
                    if self.fragment_applies(containing, fragment.type_condition()) {
                        self.spread_fields(containing, &fragment.selection_set, true, provided);
                    }
                }
            }
        }
    }

    /// Drops keyed leaf fields that an embedded fragment already provides
    /// with the same type.
    fn drop_provided_leaves(&self, mut fields: Vec<FieldDef>) -> Vec<FieldDef> {
        let mut provided = Vec::new();
        for field in fields.iter().filter(|field| field.is_embedded()) {
            self.provided_fields(&field.ty, &mut provided);
        }
        if provided.is_empty() {
            return fields;
        }
        fields.retain(|field| match &field.key {
            Some(key) if self.registry.is_leaf(&field.ty) => !provided
                .iter()
                .any(|(provided_key, ty)| provided_key == key && *ty == field.ty),
            _ => true,
        });
        fields
    }

    fn provided_fields(&self, ty: &TypeNode, provided: &mut Vec<(String, TypeNode)>) {
        let Some(name) = ty.named() else {
            return;
        };
        let fields = match self.registry.get(name) {
            Some(TypeDef::Struct(def)) => &def.fields,
            Some(TypeDef::Polymorphic(def)) => &def.shared_fields,
            _ => return,
        };
        for field in fields {
            match &field.key {
                Some(key) => provided.push((key.clone(), field.ty.clone())),
                None => self.provided_fields(&field.ty, provided),
            }
        }
    }
}
