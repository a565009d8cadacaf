//! Conversion of schema types into the type graph.
//!
//! [`Converter`] walks each operation top-down. Schema types become
//! [`TypeNode`]s; object, interface and union selections become registered
//! structs and polymorphic types named after the path that reached them.
//! Selection sets themselves are resolved in [`crate::selection`].

use crate::annotations::{self, Annotation, Bind, Options, Target};
use crate::bindings;
use crate::names::{self, PrefixChain};
use crate::registry::TypeRegistry;
use crate::types::{
    EnumDef, EnumValue, FieldDef, Implementation, OpaqueType, PolymorphicDef, StructDef, TypeDef,
    TypeNode,
};
use crate::{CodegenOptions, OptionalPolicy};
use apollo_compiler::ast::{self, OperationType};
use apollo_compiler::executable::{ExecutableDocument, Fragment, Operation, Selection, SelectionSet};
use apollo_compiler::parser::SourceSpan;
use apollo_compiler::schema::{EnumType, ExtendedType, InputObjectType, Schema};
use apollo_compiler::validation::Valid;
use apollo_compiler::{Name, Node};
use qlgen_core::{Error, Position, Result, SourceMap};
use rustc_hash::{FxHashMap, FxHashSet};

/// How an operation is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

/// A converted operation.
#[derive(Debug, Clone)]
pub struct OperationDef {
    pub name: String,
    pub kind: OperationKind,
    pub description: Option<String>,
    /// Registry name of the response struct.
    pub response: String,
    /// Registry name of the variables struct, if the operation declares any.
    pub variables: Option<String>,
    /// The document sent to the server: the operation and every fragment it
    /// uses, after generated `__typename` selections were added.
    pub text: String,
    pub position: Option<Position>,
}

/// State for one generation run.
pub(crate) struct Converter<'a> {
    pub(crate) schema: &'a Valid<Schema>,
    pub(crate) document: &'a ExecutableDocument,
    pub(crate) sources: &'a SourceMap,
    pub(crate) options: &'a CodegenOptions,
    pub(crate) registry: TypeRegistry,
    fragments: FxHashMap<Name, TypeNode>,
    inputs_in_progress: FxHashSet<String>,
}

impl<'a> Converter<'a> {
    pub(crate) fn new(
        schema: &'a Valid<Schema>,
        document: &'a ExecutableDocument,
        sources: &'a SourceMap,
        options: &'a CodegenOptions,
    ) -> Self {
        Self {
            schema,
            document,
            sources,
            options,
            registry: TypeRegistry::new(),
            fragments: FxHashMap::default(),
            inputs_in_progress: FxHashSet::default(),
        }
    }

    pub(crate) fn into_registry(self) -> TypeRegistry {
        self.registry
    }

    pub(crate) fn position(&self, location: Option<SourceSpan>) -> Option<Position> {
        location.and_then(|span| self.sources.position(span.offset()))
    }

    pub(crate) fn annotation(&self, location: Option<SourceSpan>) -> Result<Annotation> {
        match location {
            Some(span) => annotations::parse_preceding(self.sources, span.offset()),
            None => Ok(Annotation::default()),
        }
    }

    pub(crate) fn convert_operation(&mut self, operation: &Node<Operation>) -> Result<OperationDef> {
        let position = self.position(operation.location());
        let Some(name) = &operation.name else {
            return Err(Error::unsupported("operations must be named", position));
        };
        let kind = match operation.operation_type {
            OperationType::Query => OperationKind::Query,
            OperationType::Mutation => OperationKind::Mutation,
            OperationType::Subscription if self.options.allow_experimental => {
                OperationKind::Subscription
            }
            OperationType::Subscription => {
                return Err(Error::unsupported(
                    format!(
                        "subscription `{name}` is experimental; set allow_experimental = true in qlgen.toml to generate it"
                    ),
                    position,
                ))
            }
        };
        tracing::debug!(operation = %name, kind = kind.as_str(), "converting operation");

        let annotation = self.annotation(operation.location())?;
        annotations::validate(
            &annotation.options,
            Target::Operation,
            annotation.position.as_ref(),
        )?;
        let options = annotation.options;

        let variables = self.convert_variables(name, &operation.variables, &options, position.as_ref())?;

        let response = format!("{}Response", names::upper_first(name));
        let chain = PrefixChain::root(name);
        self.convert_definition(
            &chain,
            &operation.selection_set.ty,
            Some(&operation.selection_set),
            &Options::default(),
            &options,
            Some(response.clone()),
            position.as_ref(),
        )?;
        if let Some(description) = &annotation.description {
            self.registry.describe(&response, description.clone());
        }

        Ok(OperationDef {
            name: name.to_string(),
            kind,
            description: annotation.description,
            response,
            variables,
            text: operation_text(self.document, operation),
            position,
        })
    }

    fn convert_variables(
        &mut self,
        operation: &str,
        variables: &[Node<ast::VariableDefinition>],
        operation_options: &Options,
        position: Option<&Position>,
    ) -> Result<Option<String>> {
        if variables.is_empty() {
            return Ok(None);
        }

        let mut fields = Vec::with_capacity(variables.len());
        for variable in variables {
            let variable_position = self.position(variable.location());
            let annotation = self.annotation(variable.location())?;
            let nullable = !variable.ty.is_non_null();
            annotations::validate(
                &annotation.options,
                Target::Variable { nullable },
                annotation.position.as_ref(),
            )?;
            let options = annotation.options.inherit(operation_options);
            let ty = self
                .convert_input_type(&variable.ty, &options, variable_position.as_ref())
                .map_err(|error| {
                    error.context(format!("variable `${}`", variable.name), None)
                })?;
            fields.push(FieldDef {
                key: Some(variable.name.to_string()),
                ty,
                description: annotation.description,
                omit_empty: nullable && options.omitempty == Some(true),
                null_as_default: false,
                position: variable_position,
            });
        }

        let name = format!("{}Variables", names::upper_first(operation));
        self.registry.register(TypeDef::Struct(StructDef {
            name: name.clone(),
            description: Some(format!("Variables for `{operation}`.")),
            fields,
            is_input: true,
            position: position.cloned(),
        }))?;
        Ok(Some(name))
    }

    /// Converts the type of a variable. Input types take no prefix, so the
    /// result does not depend on where the variable is declared.
    pub(crate) fn convert_input_type(
        &mut self,
        ty: &ast::Type,
        options: &Options,
        position: Option<&Position>,
    ) -> Result<TypeNode> {
        self.convert_type(
            &PrefixChain::default(),
            ty,
            None,
            options,
            &Options::default(),
            position,
            true,
        )
    }

    /// Converts a schema type reference.
    ///
    /// `outermost` is false inside list wrappers; under
    /// [`OptionalPolicy::Value`] nullable list items still become optional,
    /// since a list has no default to decode a null item to. A `pointer`
    /// option decides the outermost wrapper only, list or not.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn convert_type(
        &mut self,
        chain: &PrefixChain,
        ty: &ast::Type,
        selection: Option<&SelectionSet>,
        options: &Options,
        query_options: &Options,
        position: Option<&Position>,
        outermost: bool,
    ) -> Result<TypeNode> {
        if let Some(Bind::Type(target)) = &options.bind {
            return Ok(TypeNode::Opaque(OpaqueType::bound(
                target,
                ty.inner_named_type(),
            )));
        }

        let nullable = !ty.is_non_null();
        let by_policy =
            nullable && (self.options.optional == OptionalPolicy::Option || !outermost);
        let optional = match options.pointer {
            Some(pointer) if outermost => pointer,
            _ => by_policy,
        };
        let node = match ty {
            ast::Type::List(item) | ast::Type::NonNullList(item) => {
                let item = self.convert_type(
                    chain,
                    item,
                    selection,
                    options,
                    query_options,
                    position,
                    false,
                )?;
                TypeNode::List(Box::new(item))
            }
            ast::Type::Named(name) | ast::Type::NonNullNamed(name) => {
                self.convert_definition(
                    chain,
                    name,
                    selection,
                    options,
                    query_options,
                    None,
                    position,
                )?
            }
        };

        Ok(if optional {
            TypeNode::Optional(Box::new(node))
        } else {
            node
        })
    }

    /// Converts a named schema type.
    ///
    /// `name_override` names the result when it is a struct, polymorphic type
    /// or enum; a `typename` option takes precedence over it.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn convert_definition(
        &mut self,
        chain: &PrefixChain,
        type_name: &Name,
        selection: Option<&SelectionSet>,
        options: &Options,
        query_options: &Options,
        name_override: Option<String>,
        position: Option<&Position>,
    ) -> Result<TypeNode> {
        let schema = self.schema;
        let Some(definition) = schema.types.get(type_name) else {
            return Err(Error::unsupported(
                format!("unknown type `{type_name}`"),
                position.cloned(),
            ));
        };

        if !matches!(options.bind, Some(Bind::Skip)) {
            if let Some(binding) = self.options.bindings.get(type_name.as_str()) {
                if let Some(selection) = selection.filter(|set| !set.selections.is_empty()) {
                    bindings::validate_selection(
                        self.schema,
                        self.document,
                        type_name,
                        binding,
                        selection,
                    )
                    .map_err(|error| error.at(position.cloned()))?;
                }
                return Ok(TypeNode::Opaque(OpaqueType::bound(
                    &binding.target,
                    type_name,
                )));
            }
        }

        let explicit = options.typename.clone().or(name_override);
        match definition {
            ExtendedType::Scalar(_) => {
                if options.typename.is_some() {
                    return Err(Error::directive(
                        format!("typename is not applicable to scalar type `{type_name}`"),
                        position.cloned(),
                    ));
                }
                builtin(type_name)
                    .map(TypeNode::Opaque)
                    .ok_or_else(|| Error::UnknownScalar {
                        scalar: type_name.to_string(),
                        position: position.cloned(),
                    })
            }
            ExtendedType::Enum(enum_type) => self.convert_enum(enum_type, explicit, position),
            ExtendedType::InputObject(input) => {
                self.convert_input_object(input, explicit, position)
            }
            ExtendedType::Object(object) => {
                let selection = expect_selection(selection, type_name, position)?;
                if let Some(node) = self.flattened(options, selection, type_name)? {
                    return Ok(node);
                }
                let name = explicit.unwrap_or_else(|| names::type_name(chain, type_name));
                let fields = self.resolve_selection_set(chain, selection, type_name, query_options)?;
                self.registry.register(TypeDef::Struct(StructDef {
                    name: name.clone(),
                    description: object.description.as_deref().map(str::to_string),
                    fields,
                    is_input: false,
                    position: position.cloned(),
                }))?;
                Ok(TypeNode::Named(name))
            }
            ExtendedType::Interface(_) | ExtendedType::Union(_) => {
                let selection = expect_selection(selection, type_name, position)?;
                if let Some(node) = self.flattened(options, selection, type_name)? {
                    return Ok(node);
                }
                self.convert_abstract(
                    chain,
                    type_name,
                    definition,
                    selection,
                    options,
                    query_options,
                    explicit,
                    position,
                )
            }
        }
    }

    fn convert_enum(
        &mut self,
        enum_type: &EnumType,
        explicit: Option<String>,
        position: Option<&Position>,
    ) -> Result<TypeNode> {
        let name = explicit.unwrap_or_else(|| names::schema_type_name(&enum_type.name));
        let values = enum_type
            .values
            .values()
            .map(|value| EnumValue {
                name: value.value.to_string(),
                description: value.description.as_deref().map(str::to_string),
            })
            .collect();
        self.registry.register(TypeDef::Enum(EnumDef {
            name: name.clone(),
            description: enum_type.description.as_deref().map(str::to_string),
            values,
            position: position.cloned(),
        }))?;
        Ok(TypeNode::Named(name))
    }

    fn convert_input_object(
        &mut self,
        input: &InputObjectType,
        explicit: Option<String>,
        position: Option<&Position>,
    ) -> Result<TypeNode> {
        let name = explicit.unwrap_or_else(|| names::schema_type_name(&input.name));
        let converted = matches!(
            self.registry.get(&name),
            Some(TypeDef::Struct(existing)) if existing.is_input
        );
        // An input object reachable from its own fields refers to itself by
        // name while it is being converted.
        if converted || !self.inputs_in_progress.insert(name.clone()) {
            return Ok(TypeNode::Named(name));
        }

        let fields = self.input_fields(input, position);
        self.inputs_in_progress.remove(&name);
        self.registry.register(TypeDef::Struct(StructDef {
            name: name.clone(),
            description: input.description.as_deref().map(str::to_string),
            fields: fields?,
            is_input: true,
            position: position.cloned(),
        }))?;
        Ok(TypeNode::Named(name))
    }

    fn input_fields(
        &mut self,
        input: &InputObjectType,
        position: Option<&Position>,
    ) -> Result<Vec<FieldDef>> {
        let mut fields = Vec::with_capacity(input.fields.len());
        for (field_name, field) in &input.fields {
            let ty = self.convert_type(
                &PrefixChain::default(),
                &field.ty,
                None,
                &Options::default(),
                &Options::default(),
                position,
                true,
            )?;
            fields.push(FieldDef {
                key: Some(field_name.to_string()),
                ty,
                description: field.description.as_deref().map(str::to_string),
                omit_empty: false,
                null_as_default: false,
                position: position.cloned(),
            });
        }
        Ok(fields)
    }

    #[allow(clippy::too_many_arguments)]
    fn convert_abstract(
        &mut self,
        chain: &PrefixChain,
        type_name: &Name,
        definition: &ExtendedType,
        selection: &SelectionSet,
        options: &Options,
        query_options: &Options,
        explicit: Option<String>,
        position: Option<&Position>,
    ) -> Result<TypeNode> {
        let name = explicit
            .clone()
            .unwrap_or_else(|| names::type_name(chain, type_name));
        let description = describe(definition);

        let has_fragments = selection
            .selections
            .iter()
            .any(|selection| !matches!(selection, Selection::Field(_)));
        if options.structure == Some(true) && !has_fragments {
            let fields = self.resolve_selection_set(chain, selection, type_name, query_options)?;
            self.registry.register(TypeDef::Struct(StructDef {
                name: name.clone(),
                description,
                fields,
                is_input: false,
                position: position.cloned(),
            }))?;
            return Ok(TypeNode::Named(name));
        }

        let shared_fields = self.resolve_selection_set(chain, selection, type_name, query_options)?;
        let mut implementations = Vec::new();
        for object in self.possible_types(definition) {
            let struct_name = match &explicit {
                Some(explicit) => format!("{explicit}{}", names::upper_first(&object)),
                None => names::type_name(chain, &object),
            };
            let fields = self.resolve_selection_set(chain, selection, &object, query_options)?;
            let object_description = self.schema.types.get(&object).and_then(describe);
            self.registry.register(TypeDef::Struct(StructDef {
                name: struct_name.clone(),
                description: object_description,
                fields,
                is_input: false,
                position: position.cloned(),
            }))?;
            implementations.push(Implementation {
                struct_name,
                discriminator: object.to_string(),
            });
        }

        self.registry.register(TypeDef::Polymorphic(PolymorphicDef {
            name: name.clone(),
            description,
            shared_fields,
            implementations,
            position: position.cloned(),
        }))?;
        Ok(TypeNode::Named(name))
    }

    /// Object types an interface or union can resolve to, in schema order.
    fn possible_types(&self, definition: &ExtendedType) -> Vec<Name> {
        let types = &self.schema.types;
        match definition {
            ExtendedType::Interface(interface) => types
                .iter()
                .filter(|(_, ty)| {
                    matches!(ty, ExtendedType::Object(object)
                        if object.implements_interfaces.iter().any(|implemented| implemented.name == interface.name))
                })
                .map(|(name, _)| name.clone())
                .collect(),
            ExtendedType::Union(union) => union
                .members
                .iter()
                .map(|member| member.name.clone())
                .filter(|member| matches!(types.get(member), Some(ExtendedType::Object(_))))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Collapses a `flatten` field onto the type of its single fragment spread.
    fn flattened(
        &mut self,
        options: &Options,
        selection: &SelectionSet,
        containing: &str,
    ) -> Result<Option<TypeNode>> {
        if options.flatten != Some(true) {
            return Ok(None);
        }
        let document = self.document;
        let Some(fragment) = annotations::flatten_target(selection)
            .and_then(|fragment_name| document.fragments.get(fragment_name))
        else {
            return Ok(None);
        };
        let condition = fragment.type_condition().as_str();
        if condition != containing && !annotations::implements(self.schema, containing, condition) {
            return Ok(None);
        }
        let node = self.convert_fragment(fragment)?;
        Ok(Some(self.narrow(node, containing)))
    }

    /// Converts a fragment definition once; later spreads reuse the result.
    pub(crate) fn convert_fragment(&mut self, fragment: &Node<Fragment>) -> Result<TypeNode> {
        if let Some(node) = self.fragments.get(&fragment.name) {
            return Ok(node.clone());
        }
        tracing::trace!(fragment = %fragment.name, "converting fragment");

        let position = self.position(fragment.location());
        let annotation = self.annotation(fragment.location())?;
        annotations::validate(&annotation.options, Target::Fragment, annotation.position.as_ref())?;
        let name = annotation
            .options
            .typename
            .clone()
            .unwrap_or_else(|| names::upper_first(&fragment.name));
        let query_options = annotation.options.inherit(&Options::default());

        let node = self.convert_definition(
            &PrefixChain::root(&fragment.name),
            fragment.type_condition(),
            Some(&fragment.selection_set),
            &Options::default(),
            &query_options,
            Some(name),
            position.as_ref(),
        )?;
        if let (Some(description), TypeNode::Named(name)) = (annotation.description, &node) {
            self.registry.describe(name, description);
        }
        self.fragments.insert(fragment.name.clone(), node.clone());
        Ok(node)
    }

    /// Resolves a polymorphic fragment type to its variant for `containing`,
    /// when `containing` is one of its concrete types.
    pub(crate) fn narrow(&self, node: TypeNode, containing: &str) -> TypeNode {
        if let TypeNode::Named(name) = &node {
            if let Some(implementation) = self
                .registry
                .get_polymorphic(name)
                .and_then(|polymorphic| polymorphic.implementation(containing))
            {
                return TypeNode::Named(implementation.struct_name.clone());
            }
        }
        node
    }
}

fn builtin(name: &str) -> Option<OpaqueType> {
    let reference = match name {
        "Int" => "i32",
        "Float" => "f64",
        "String" | "ID" => "String",
        "Boolean" => "bool",
        _ => return None,
    };
    Some(OpaqueType::builtin(reference, name))
}

fn describe(definition: &ExtendedType) -> Option<String> {
    let description = match definition {
        ExtendedType::Object(object) => object.description.as_deref(),
        ExtendedType::Interface(interface) => interface.description.as_deref(),
        ExtendedType::Union(union) => union.description.as_deref(),
        _ => None,
    };
    description.map(str::to_string)
}

fn expect_selection<'s>(
    selection: Option<&'s SelectionSet>,
    type_name: &str,
    position: Option<&Position>,
) -> Result<&'s SelectionSet> {
    selection.ok_or_else(|| {
        Error::unsupported(
            format!("`{type_name}` is an output type and cannot be used here"),
            position.cloned(),
        )
    })
}

/// The operation followed by every fragment it uses, in document order.
fn operation_text(document: &ExecutableDocument, operation: &Operation) -> String {
    let mut used = FxHashSet::default();
    collect_spreads(document, &operation.selection_set, &mut used);

    let mut text = operation.serialize().to_string().trim_end().to_string();
    for (name, fragment) in &document.fragments {
        if used.contains(name) {
            text.push_str("\n\n");
            text.push_str(fragment.serialize().to_string().trim_end());
        }
    }
    text
}

fn collect_spreads<'d>(
    document: &'d ExecutableDocument,
    selection_set: &'d SelectionSet,
    used: &mut FxHashSet<&'d Name>,
) {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => collect_spreads(document, &field.selection_set, used),
            Selection::InlineFragment(inline) => {
                collect_spreads(document, &inline.selection_set, used);
            }
            Selection::FragmentSpread(spread) => {
                if let Some((name, fragment)) = document.fragments.get_key_value(&spread.fragment_name) {
                    if used.insert(name) {
                        collect_spreads(document, &fragment.selection_set, used);
                    }
                }
            }
        }
    }
}
