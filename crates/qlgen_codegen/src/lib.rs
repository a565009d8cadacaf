//! Typed client generation for GraphQL operations.
//!
//! This crate turns a schema and a set of operations into a type graph:
//! one Rust type per selection, named after the path that reached it,
//! plus an operation descriptor per query, mutation or subscription.
//!
//! # Example
//!
//! ```ignore
//! use qlgen_codegen::{CodeGenerator, CodegenOptions};
//! use qlgen_core::SourceFile;
//!
//! let generator = CodeGenerator::with_options(CodegenOptions::default());
//! let generated = generator.generate(&schema_files, &operation_files)?;
//! std::fs::write("src/generated.rs", generated.render())?;
//! ```

pub mod annotations;
pub mod bindings;
mod convert;
pub mod export;
pub mod names;
pub mod polymorphism;
mod preprocess;
pub mod registry;
mod render;
mod selection;
pub mod types;

pub use bindings::{Bindings, TypeBinding};
pub use convert::{OperationDef, OperationKind};
pub use export::{export_operations, ExportedOperation, ExportedOperations};
pub use polymorphism::DecodePlan;
pub use registry::TypeRegistry;
pub use render::RustRenderer;

use apollo_compiler::ast;
use apollo_compiler::executable::ExecutableDocument;
use apollo_compiler::schema::Schema;
use apollo_compiler::validation::{DiagnosticList, Valid};
use convert::Converter;
use indexmap::IndexMap;
use qlgen_core::{Error, LocatedMessage, Result, SourceFile, SourceMap};
use serde::Deserialize;

/// How nullable GraphQL types are represented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionalPolicy {
    /// Nullable types become `Option<T>`.
    #[default]
    Option,
    /// Nullable types become `T`, with null decoding to `T::default()`;
    /// `pointer: true` opts a field back into `Option<T>`.
    Value,
}

/// Code generation options.
#[derive(Debug, Clone)]
pub struct CodegenOptions {
    /// Package/module name.
    pub package_name: String,
    /// Path of the runtime client crate in generated code.
    pub client_crate: String,
    pub optional: OptionalPolicy,
    /// Generate subscriptions.
    pub allow_experimental: bool,
    pub bindings: Bindings,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            package_name: "generated".to_string(),
            client_crate: "qlgen_client".to_string(),
            optional: OptionalPolicy::default(),
            allow_experimental: false,
            bindings: Bindings::default(),
        }
    }
}

/// Main code generator.
#[derive(Debug, Default)]
pub struct CodeGenerator {
    options: CodegenOptions,
}

impl CodeGenerator {
    /// Creates a new code generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new code generator with options.
    pub fn with_options(options: CodegenOptions) -> Self {
        Self { options }
    }

    /// Sets code generation options.
    #[must_use]
    pub fn options(mut self, options: CodegenOptions) -> Self {
        self.options = options;
        self
    }

    /// Parses, validates and converts `operations` against `schema`.
    ///
    /// Each slice is concatenated, in order, into one document; positions in
    /// errors and results refer back to the original files.
    pub fn generate(&self, schema: &[SourceFile], operations: &[SourceFile]) -> Result<Generated> {
        let schema_sources = SourceMap::from_files(schema.iter().cloned());
        if schema_sources.is_empty() {
            return Err(Error::config("no schema files given", None));
        }
        let schema = parse_schema(&schema_sources)?;

        let operation_sources = SourceMap::from_files(operations.iter().cloned());
        if operation_sources.text().trim().is_empty() {
            tracing::warn!("no operations found");
            return Ok(Generated::empty(self.options.clone()));
        }
        let mut document = parse_operations(&schema, &operation_sources)?;
        preprocess::add_typenames(&schema, &mut document)?;

        let mut operations: Vec<_> = document
            .operations
            .anonymous
            .iter()
            .chain(document.operations.named.values())
            .collect();
        operations.sort_by_key(|operation| operation.location().map(|span| span.offset()));

        let mut converter = Converter::new(&schema, &document, &operation_sources, &self.options);
        let mut converted = Vec::with_capacity(operations.len());
        for operation in operations {
            converted.push(converter.convert_operation(operation)?);
        }
        let types = converter.into_registry();

        for operation in &converted {
            let marker = names::upper_first(&operation.name);
            if let Some(existing) = types.get(&marker) {
                return Err(Error::NamingCollision {
                    name: marker,
                    position: operation.position.clone(),
                    previous: existing.position().cloned(),
                });
            }
        }

        let decode_plans = polymorphism::decode_plans(&types);
        tracing::info!(
            operations = converted.len(),
            types = types.len(),
            "converted operations"
        );
        Ok(Generated {
            types,
            operations: converted,
            decode_plans,
            options: self.options.clone(),
        })
    }
}

/// The result of a generation run.
#[derive(Debug, Clone)]
pub struct Generated {
    /// Every named type, in registration order.
    pub types: TypeRegistry,
    /// Operations in source order.
    pub operations: Vec<OperationDef>,
    /// Decode plans for structs that need one, keyed by struct name.
    pub decode_plans: IndexMap<String, DecodePlan>,
    options: CodegenOptions,
}

impl Generated {
    fn empty(options: CodegenOptions) -> Self {
        Self {
            types: TypeRegistry::new(),
            operations: Vec::new(),
            decode_plans: IndexMap::new(),
            options,
        }
    }

    /// Looks up an operation by name.
    pub fn operation(&self, name: &str) -> Option<&OperationDef> {
        self.operations
            .iter()
            .find(|operation| operation.name == name)
    }

    /// Renders the generated Rust module.
    pub fn render(&self) -> String {
        RustRenderer::new(
            &self.types,
            &self.operations,
            &self.decode_plans,
            &self.options,
        )
        .render()
    }

    /// The exact documents each operation sends.
    pub fn export_operations(&self) -> ExportedOperations {
        export::export_operations(&self.operations)
    }
}

fn located(errors: &DiagnosticList, sources: &SourceMap) -> Vec<LocatedMessage> {
    errors
        .iter()
        .map(|diagnostic| {
            let error = diagnostic.to_json();
            let position = error
                .locations
                .first()
                .and_then(|location| sources.position_at_line(location.line, location.column));
            LocatedMessage::new(error.message, position)
        })
        .collect()
}

fn parse_schema(sources: &SourceMap) -> Result<Valid<Schema>> {
    let schema = Schema::parse(sources.text(), "schema.graphql").map_err(|errors| Error::Syntax {
        errors: located(&errors.errors, sources),
    })?;
    schema.validate().map_err(|errors| Error::Validation {
        errors: located(&errors.errors, sources),
    })
}

fn parse_operations(schema: &Valid<Schema>, sources: &SourceMap) -> Result<ExecutableDocument> {
    let document = ast::Document::parse(sources.text(), "operations.graphql").map_err(|errors| {
        Error::Syntax {
            errors: located(&errors.errors, sources),
        }
    })?;
    // Building against the schema reports unknown fields and types too.
    let document = document
        .to_executable_validate(schema)
        .map_err(|errors| Error::Validation {
            errors: located(&errors.errors, sources),
        })?;
    Ok(document.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codegen_options_default() {
        let options = CodegenOptions::default();
        assert_eq!(options.client_crate, "qlgen_client");
        assert_eq!(options.optional, OptionalPolicy::Option);
        assert!(!options.allow_experimental);
        assert!(options.bindings.is_empty());
    }

    #[test]
    fn test_optional_policy_names() {
        let policy: OptionalPolicy = serde_json::from_str("\"value\"").unwrap();
        assert_eq!(policy, OptionalPolicy::Value);
    }
}
