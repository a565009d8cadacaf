//! The type registry.
//!
//! Every named definition produced during a run is registered here exactly
//! once. Registering a name a second time is accepted when the two
//! definitions generate the same code, and is a naming collision otherwise.

use crate::types::{PolymorphicDef, StructDef, TypeDef, TypeNode};
use indexmap::IndexMap;
use qlgen_core::{Error, Result};

/// Named definitions in registration order.
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    types: IndexMap<String, TypeDef>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition.
    ///
    /// The first registration of a name is kept; a later one must have the
    /// same shape.
    pub fn register(&mut self, def: TypeDef) -> Result<()> {
        match self.types.get(def.name()) {
            None => {
                tracing::trace!(name = def.name(), "registered type");
                self.types.insert(def.name().to_string(), def);
                Ok(())
            }
            Some(existing) if existing.same_shape(&def) => Ok(()),
            Some(existing) => Err(Error::NamingCollision {
                name: def.name().to_string(),
                position: def.position().cloned(),
                previous: existing.position().cloned(),
            }),
        }
    }

    /// Looks up a definition by name.
    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// Returns true if a definition with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Gets a struct definition by name.
    pub fn get_struct(&self, name: &str) -> Option<&StructDef> {
        match self.types.get(name) {
            Some(TypeDef::Struct(def)) => Some(def),
            _ => None,
        }
    }

    /// Gets a polymorphic definition by name.
    pub fn get_polymorphic(&self, name: &str) -> Option<&PolymorphicDef> {
        match self.types.get(name) {
            Some(TypeDef::Polymorphic(def)) => Some(def),
            _ => None,
        }
    }

    pub(crate) fn describe(&mut self, name: &str, description: String) {
        if let Some(def) = self.types.get_mut(name) {
            def.set_description(description);
        }
    }

    /// Returns true if the type has no selectable fields: an opaque type or
    /// an enum, possibly wrapped.
    pub fn is_leaf(&self, ty: &TypeNode) -> bool {
        match ty.innermost() {
            TypeNode::Opaque(_) => true,
            TypeNode::Named(name) => matches!(self.types.get(name), Some(TypeDef::Enum(_))),
            TypeNode::List(_) | TypeNode::Optional(_) => false,
        }
    }

    /// Iterates definitions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EnumDef, EnumValue, FieldDef, OpaqueType};
    use qlgen_core::Position;

    fn single_field(name: &str, key: &str, line: usize) -> TypeDef {
        TypeDef::Struct(StructDef {
            name: name.to_string(),
            description: None,
            fields: vec![FieldDef {
                key: Some(key.to_string()),
                ty: TypeNode::Opaque(OpaqueType::builtin("String", "String")),
                description: None,
                omit_empty: false,
                null_as_default: false,
                position: None,
            }],
            is_input: false,
            position: Some(Position::new("q.graphql", line, 1)),
        })
    }

    #[test]
    fn test_register_same_shape_twice() {
        let mut registry = TypeRegistry::new();
        registry.register(single_field("GetUser", "id", 1)).unwrap();
        registry.register(single_field("GetUser", "id", 9)).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("GetUser").and_then(TypeDef::position),
            Some(&Position::new("q.graphql", 1, 1))
        );
    }

    #[test]
    fn test_register_collision_reports_both_positions() {
        let mut registry = TypeRegistry::new();
        registry.register(single_field("GetUser", "id", 1)).unwrap();
        let error = registry.register(single_field("GetUser", "name", 5)).unwrap_err();
        match error {
            Error::NamingCollision {
                name,
                position,
                previous,
            } => {
                assert_eq!(name, "GetUser");
                assert_eq!(position, Some(Position::new("q.graphql", 5, 1)));
                assert_eq!(previous, Some(Position::new("q.graphql", 1, 1)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_is_leaf() {
        let mut registry = TypeRegistry::new();
        registry
            .register(TypeDef::Enum(EnumDef {
                name: "Role".into(),
                description: None,
                values: vec![EnumValue {
                    name: "ADMIN".into(),
                    description: None,
                }],
                position: None,
            }))
            .unwrap();
        registry.register(single_field("User", "id", 1)).unwrap();

        let role = TypeNode::List(Box::new(TypeNode::Named("Role".into())));
        assert!(registry.is_leaf(&role));
        assert!(!registry.is_leaf(&TypeNode::Named("User".into())));
        assert!(registry.is_leaf(&TypeNode::Opaque(OpaqueType::builtin("i32", "Int"))));
    }
}
