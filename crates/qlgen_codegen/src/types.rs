//! The resolved type graph.
//!
//! Named definitions live in the [`TypeRegistry`](crate::registry::TypeRegistry);
//! everything else refers to them by name through [`TypeNode::Named`].

use qlgen_core::Position;

/// A reference to a target type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeNode {
    /// A struct, polymorphic type or enum held in the registry.
    Named(String),
    List(Box<TypeNode>),
    Optional(Box<TypeNode>),
    /// A type the generator emits no definition for.
    Opaque(OpaqueType),
}

impl TypeNode {
    /// Returns the type with list and optional wrappers removed.
    #[must_use]
    pub fn innermost(&self) -> &TypeNode {
        match self {
            Self::List(inner) | Self::Optional(inner) => inner.innermost(),
            other => other,
        }
    }

    /// Returns the registry name of the innermost type, if it is named.
    #[must_use]
    pub fn named(&self) -> Option<&str> {
        match self.innermost() {
            Self::Named(name) => Some(name),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_optional(&self) -> bool {
        matches!(self, Self::Optional(_))
    }
}

/// A builtin scalar, or a user-bound target type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpaqueType {
    /// Path of the target type, e.g. `String` or `chrono::DateTime<chrono::Utc>`.
    pub reference: String,
    /// The GraphQL type this stands for.
    pub graphql_name: String,
    pub builtin: bool,
}

impl OpaqueType {
    #[must_use]
    pub fn builtin(reference: &str, graphql_name: &str) -> Self {
        Self {
            reference: reference.to_string(),
            graphql_name: graphql_name.to_string(),
            builtin: true,
        }
    }

    #[must_use]
    pub fn bound(reference: &str, graphql_name: &str) -> Self {
        Self {
            reference: reference.to_string(),
            graphql_name: graphql_name.to_string(),
            builtin: false,
        }
    }
}

/// A field of a generated struct.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// The JSON key: the selection's alias, or its name. `None` for a field
    /// embedding a fragment.
    pub key: Option<String>,
    pub ty: TypeNode,
    pub description: Option<String>,
    /// Skip the field when encoding if it holds its empty value.
    pub omit_empty: bool,
    /// The GraphQL type is nullable but the target type is not optional;
    /// null decodes to the type's default.
    pub null_as_default: bool,
    pub position: Option<Position>,
}

impl FieldDef {
    /// A field embedding the type of a fragment spread.
    #[must_use]
    pub fn embedded(ty: TypeNode, position: Option<Position>) -> Self {
        Self {
            key: None,
            ty,
            description: None,
            omit_empty: false,
            null_as_default: false,
            position,
        }
    }

    #[must_use]
    pub const fn is_embedded(&self) -> bool {
        self.key.is_none()
    }

    /// Compares everything that affects the generated code.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        self.key == other.key
            && self.ty == other.ty
            && self.omit_empty == other.omit_empty
            && self.null_as_default == other.null_as_default
    }
}

fn same_fields(a: &[FieldDef], b: &[FieldDef]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.same_shape(b))
}

#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<FieldDef>,
    /// Encoded as a request variable rather than decoded from a response.
    pub is_input: bool,
    pub position: Option<Position>,
}

/// One concrete variant of a polymorphic type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Implementation {
    /// Registry name of the variant's struct.
    pub struct_name: String,
    /// The schema type name reported in `__typename` for this variant.
    pub discriminator: String,
}

/// An interface or union selection: one struct per possible object type.
#[derive(Debug, Clone)]
pub struct PolymorphicDef {
    pub name: String,
    pub description: Option<String>,
    /// Fields selected on the abstract type itself.
    pub shared_fields: Vec<FieldDef>,
    pub implementations: Vec<Implementation>,
    pub position: Option<Position>,
}

impl PolymorphicDef {
    /// Returns the variant struct for a concrete schema type.
    #[must_use]
    pub fn implementation(&self, discriminator: &str) -> Option<&Implementation> {
        self.implementations
            .iter()
            .find(|implementation| implementation.discriminator == discriminator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<EnumValue>,
    pub position: Option<Position>,
}

/// A named definition in the registry.
#[derive(Debug, Clone)]
pub enum TypeDef {
    Struct(StructDef),
    Polymorphic(PolymorphicDef),
    Enum(EnumDef),
}

impl TypeDef {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Struct(def) => &def.name,
            Self::Polymorphic(def) => &def.name,
            Self::Enum(def) => &def.name,
        }
    }

    #[must_use]
    pub fn position(&self) -> Option<&Position> {
        match self {
            Self::Struct(def) => def.position.as_ref(),
            Self::Polymorphic(def) => def.position.as_ref(),
            Self::Enum(def) => def.position.as_ref(),
        }
    }

    pub(crate) fn set_description(&mut self, description: String) {
        match self {
            Self::Struct(def) => def.description = Some(description),
            Self::Polymorphic(def) => def.description = Some(description),
            Self::Enum(def) => def.description = Some(description),
        }
    }

    /// Returns true if both definitions generate the same code, ignoring
    /// documentation and positions.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Struct(a), Self::Struct(b)) => {
                a.is_input == b.is_input && same_fields(&a.fields, &b.fields)
            }
            (Self::Polymorphic(a), Self::Polymorphic(b)) => {
                a.implementations == b.implementations
                    && same_fields(&a.shared_fields, &b.shared_fields)
            }
            (Self::Enum(a), Self::Enum(b)) => a
                .values
                .iter()
                .map(|value| &value.name)
                .eq(b.values.iter().map(|value| &value.name)),
            _ => false,
        }
    }
}
