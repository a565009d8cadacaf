//! Decode plans for structs whose fields cannot be decoded field by field.
//!
//! A struct needs a plan when it has a field holding a polymorphic type, or
//! a field embedding a fragment. Polymorphic values are dispatched on their
//! `__typename`; embedded fragments decode from the same JSON object as the
//! struct that embeds them, so the object is buffered once and every field
//! reads from the buffer.

use crate::registry::TypeRegistry;
use crate::types::{FieldDef, Implementation, StructDef, TypeDef};
use indexmap::IndexMap;

/// A field whose value is dispatched on `__typename`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolymorphicField {
    /// The JSON key, or `None` for an embedded polymorphic fragment.
    pub key: Option<String>,
    /// The embedded struct the field belongs to, when it is reached through
    /// an embedded fragment rather than declared on the struct itself.
    pub via: Option<String>,
    /// Registry name of the polymorphic type.
    pub type_name: String,
    pub variants: Vec<Implementation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodePlan {
    pub struct_name: String,
    pub polymorphic_fields: Vec<PolymorphicField>,
    /// Registry names of the types embedded by fragment spreads.
    pub embedded: Vec<String>,
}

impl DecodePlan {
    pub fn is_empty(&self) -> bool {
        self.polymorphic_fields.is_empty() && self.embedded.is_empty()
    }
}

/// Builds the plan for one struct, or `None` if derived decoding suffices.
pub fn decode_plan(registry: &TypeRegistry, def: &StructDef) -> Option<DecodePlan> {
    if def.is_input {
        return None;
    }

    let mut plan = DecodePlan {
        struct_name: def.name.clone(),
        polymorphic_fields: Vec::new(),
        embedded: Vec::new(),
    };
    for field in &def.fields {
        add_field(registry, field, None, &mut plan);
        if !field.is_embedded() {
            continue;
        }
        let Some(name) = field.ty.named() else {
            continue;
        };
        plan.embedded.push(name.to_string());
        // One level through an embedded fragment.
        if let Some(embedded) = registry.get_struct(name) {
            for inner in &embedded.fields {
                add_field(registry, inner, Some(name), &mut plan);
            }
        }
    }

    (!plan.is_empty()).then_some(plan)
}

fn add_field(registry: &TypeRegistry, field: &FieldDef, via: Option<&str>, plan: &mut DecodePlan) {
    let Some(polymorphic) = field.ty.named().and_then(|name| registry.get_polymorphic(name)) else {
        return;
    };
    plan.polymorphic_fields.push(PolymorphicField {
        key: field.key.clone(),
        via: via.map(str::to_string),
        type_name: polymorphic.name.clone(),
        variants: polymorphic.implementations.clone(),
    });
}

/// Plans for every output struct that needs one, keyed by struct name.
pub fn decode_plans(registry: &TypeRegistry) -> IndexMap<String, DecodePlan> {
    registry
        .iter()
        .filter_map(|def| match def {
            TypeDef::Struct(def) => decode_plan(registry, def),
            _ => None,
        })
        .map(|plan| (plan.struct_name.clone(), plan))
        .collect()
}
