//! Rust source emission.
//!
//! The generated module depends only on the client crate: serde is reached
//! through its re-export, and decoding helpers live in its `decode` module.

use crate::convert::{OperationDef, OperationKind};
use crate::names;
use crate::polymorphism::DecodePlan;
use crate::registry::TypeRegistry;
use crate::types::{EnumDef, FieldDef, PolymorphicDef, StructDef, TypeDef, TypeNode};
use crate::CodegenOptions;
use heck::{ToSnakeCase, ToUpperCamelCase};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;

const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate",
    "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl",
    "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "self", "Self", "static", "struct", "super", "trait", "true", "try", "type",
    "typeof", "union", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

/// Renders a converted type graph as a Rust module.
pub struct RustRenderer<'a> {
    registry: &'a TypeRegistry,
    operations: &'a [OperationDef],
    plans: &'a IndexMap<String, DecodePlan>,
    options: &'a CodegenOptions,
    variables: FxHashSet<&'a str>,
}

impl<'a> RustRenderer<'a> {
    pub fn new(
        registry: &'a TypeRegistry,
        operations: &'a [OperationDef],
        plans: &'a IndexMap<String, DecodePlan>,
        options: &'a CodegenOptions,
    ) -> Self {
        let variables = operations
            .iter()
            .filter_map(|operation| operation.variables.as_deref())
            .collect();
        Self {
            registry,
            operations,
            plans,
            options,
            variables,
        }
    }

    fn client(&self) -> &str {
        &self.options.client_crate
    }

    /// Renders the whole module.
    pub fn render(&self) -> String {
        let mut output = String::new();
        output.push_str("// Code generated by qlgen. DO NOT EDIT.\n\n");
        output.push_str(&format!(
            "//! GraphQL operations and types for `{}`.\n\n",
            self.options.package_name
        ));
        output.push_str(
            "#![allow(clippy::all, clippy::pedantic, dead_code, non_camel_case_types, unused_imports)]\n\n",
        );
        output.push_str(&format!(
            "use {}::serde::{{Deserialize, Serialize}};\n\n",
            self.client()
        ));

        for operation in self.operations {
            self.render_operation(&mut output, operation);
        }
        for def in self.registry.iter() {
            match def {
                TypeDef::Struct(def) if def.is_input => self.render_input(&mut output, def),
                TypeDef::Struct(def) => self.render_struct(&mut output, def),
                TypeDef::Polymorphic(def) => self.render_polymorphic(&mut output, def),
                TypeDef::Enum(def) => self.render_enum(&mut output, def),
            }
        }

        while output.ends_with("\n\n") {
            output.pop();
        }
        output
    }

    fn render_operation(&self, output: &mut String, operation: &OperationDef) {
        let client = self.client();
        let marker = names::upper_first(&operation.name);
        let variables = operation.variables.as_deref().unwrap_or("()");
        let kind = match operation.kind {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
            OperationKind::Subscription => "Subscription",
        };

        match &operation.description {
            Some(description) => push_doc(output, "", description),
            None => output.push_str(&format!(
                "/// The `{}` {}.\n",
                operation.name,
                operation.kind.as_str()
            )),
        }
        output.push_str(&format!("pub struct {marker};\n\n"));
        output.push_str(&format!("impl {client}::GraphqlOperation for {marker} {{\n"));
        output.push_str(&format!("    type Variables = {variables};\n"));
        output.push_str(&format!("    type ResponseData = {};\n", operation.response));
        output.push_str(&format!(
            "    const NAME: &'static str = \"{}\";\n",
            operation.name
        ));
        output.push_str(&format!(
            "    const KIND: {client}::OperationKind = {client}::OperationKind::{kind};\n"
        ));
        output.push_str(&format!(
            "    const DOCUMENT: &'static str = {};\n",
            raw_string(&operation.text)
        ));
        output.push_str("}\n\n");

        if operation.kind == OperationKind::Subscription {
            return;
        }
        let function = ident(&operation.name.to_snake_case());
        output.push_str(&format!("/// Executes `{}`.\n", operation.name));
        match &operation.variables {
            Some(variables) => output.push_str(&format!(
                "pub async fn {function}<C>(\n    client: &C,\n    variables: {variables},\n) -> Result<{client}::Response<{}>, {client}::ClientError>\n",
                operation.response
            )),
            None => output.push_str(&format!(
                "pub async fn {function}<C>(\n    client: &C,\n) -> Result<{client}::Response<{}>, {client}::ClientError>\n",
                operation.response
            )),
        }
        output.push_str(&format!("where\n    C: {client}::Client + ?Sized,\n{{\n"));
        let arguments = if operation.variables.is_some() {
            "variables"
        } else {
            "()"
        };
        output.push_str(&format!(
            "    {client}::execute::<{marker}, C>(client, {arguments}).await\n}}\n\n"
        ));
    }

    fn render_enum(&self, output: &mut String, def: &EnumDef) {
        if let Some(description) = &def.description {
            push_doc(output, "", description);
        }
        output.push_str(
            "#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]\n",
        );
        output.push_str(&self.serde_crate());
        output.push_str(&format!("pub enum {} {{\n", def.name));
        let mut used = FxHashSet::default();
        for value in &def.values {
            if let Some(description) = &value.description {
                push_doc(output, "    ", description);
            }
            let variant = unique(&mut used, variant_ident(&value.name));
            output.push_str(&format!("    #[serde(rename = \"{}\")]\n", value.name));
            output.push_str(&format!("    {variant},\n"));
        }
        output.push_str("}\n\n");
    }

    fn render_input(&self, output: &mut String, def: &StructDef) {
        let boxed = !self.variables.contains(def.name.as_str());
        if let Some(description) = &def.description {
            push_doc(output, "", description);
        }
        output.push_str("#[derive(Debug, Clone, Serialize)]\n");
        output.push_str(&self.serde_crate());
        output.push_str(&format!("pub struct {} {{\n", def.name));
        let mut used = FxHashSet::default();
        for field in &def.fields {
            let Some(key) = &field.key else {
                continue;
            };
            if let Some(description) = &field.description {
                push_doc(output, "    ", description);
            }
            let skip = if !field.omit_empty {
                String::new()
            } else if field.ty.is_optional() {
                ", skip_serializing_if = \"Option::is_none\"".to_string()
            } else {
                format!(", skip_serializing_if = \"{}::decode::is_default\"", self.client())
            };
            output.push_str(&format!("    #[serde(rename = \"{key}\"{skip})]\n"));
            output.push_str(&format!(
                "    pub {}: {},\n",
                unique(&mut used, field_ident(key)),
                self.rust_type(&field.ty, boxed)
            ));
        }
        output.push_str("}\n\n");
    }

    fn render_struct(&self, output: &mut String, def: &StructDef) {
        if let Some(description) = &def.description {
            push_doc(output, "", description);
        }
        let plan = self.plans.get(&def.name);
        if plan.is_some() {
            output.push_str("#[derive(Debug, Clone)]\n");
        } else {
            output.push_str("#[derive(Debug, Clone, Deserialize)]\n");
            output.push_str(&self.serde_crate());
        }
        output.push_str(&format!("pub struct {} {{\n", def.name));

        let idents = struct_idents(def);
        for (field, ident) in def.fields.iter().zip(&idents) {
            if let Some(description) = &field.description {
                push_doc(output, "    ", description);
            }
            match &field.key {
                Some(key) if plan.is_none() => {
                    let default = if field.null_as_default {
                        format!(
                            ", default, deserialize_with = \"{}::decode::null_as_default\"",
                            self.client()
                        )
                    } else {
                        String::new()
                    };
                    output.push_str(&format!("    #[serde(rename = \"{key}\"{default})]\n"));
                }
                Some(_) => {}
                None => output.push_str("    /// Fields of the embedded fragment.\n"),
            }
            output.push_str(&format!(
                "    pub {ident}: {},\n",
                self.rust_type(&field.ty, false)
            ));
        }
        output.push_str("}\n\n");

        if plan.is_some() {
            self.render_buffered_deserialize(output, def, &idents);
        }
    }

    /// `Deserialize` for a struct with a decode plan: the JSON object is
    /// buffered so embedded fragments can decode from it too.
    fn render_buffered_deserialize(&self, output: &mut String, def: &StructDef, idents: &[String]) {
        let client = self.client();
        self.deserialize_header(output, &def.name);
        output.push_str("        Ok(Self {\n");
        for (field, ident) in def.fields.iter().zip(idents) {
            let decode = match &field.key {
                None => format!("{client}::decode::embedded::<_, D::Error>(&value)?"),
                Some(key) if field.null_as_default => {
                    format!("{client}::decode::field_or_default::<_, D::Error>(&value, \"{key}\")?")
                }
                Some(key) => format!("{client}::decode::field::<_, D::Error>(&value, \"{key}\")?"),
            };
            output.push_str(&format!("            {ident}: {decode},\n"));
        }
        output.push_str("        })\n    }\n}\n\n");
    }

    fn render_polymorphic(&self, output: &mut String, def: &PolymorphicDef) {
        let client = self.client();
        if let Some(description) = &def.description {
            push_doc(output, "", description);
        }
        output.push_str("#[derive(Debug, Clone)]\n");
        output.push_str(&format!("pub enum {} {{\n", def.name));
        let mut used = FxHashSet::default();
        let variants: Vec<String> = def
            .implementations
            .iter()
            .map(|implementation| unique(&mut used, variant_ident(&implementation.discriminator)))
            .collect();
        for (implementation, variant) in def.implementations.iter().zip(&variants) {
            output.push_str(&format!("    {variant}({}),\n", implementation.struct_name));
        }
        output.push_str("}\n\n");

        output.push_str(&format!("impl {} {{\n", def.name));
        output.push_str("    /// The `__typename` of the value.\n");
        output.push_str("    pub fn typename(&self) -> &'static str {\n");
        if variants.is_empty() {
            output.push_str("        match *self {}\n");
        } else {
            output.push_str("        match self {\n");
            for (implementation, variant) in def.implementations.iter().zip(&variants) {
                output.push_str(&format!(
                    "            Self::{variant}(_) => \"{}\",\n",
                    implementation.discriminator
                ));
            }
            output.push_str("        }\n");
        }
        output.push_str("    }\n");
        for (getter, field) in self.shared_getters(def) {
            output.push('\n');
            if let Some(description) = &field.description {
                push_doc(output, "    ", description);
            }
            output.push_str(&format!(
                "    pub fn {getter}(&self) -> &{} {{\n        match self {{\n",
                self.rust_type(&field.ty, false)
            ));
            for variant in &variants {
                output.push_str(&format!(
                    "            Self::{variant}(value) => &value.{getter},\n"
                ));
            }
            output.push_str("        }\n    }\n");
        }
        output.push_str("}\n\n");

        self.deserialize_header(output, &def.name);
        output.push_str(&format!(
            "        match {client}::decode::typename::<D::Error>(&value)? {{\n"
        ));
        for (implementation, variant) in def.implementations.iter().zip(&variants) {
            output.push_str(&format!(
                "            \"{}\" => {client}::decode::embedded::<_, D::Error>(&value).map(Self::{variant}),\n",
                implementation.discriminator
            ));
        }
        output.push_str(&format!(
            "            other => Err(<D::Error as {client}::serde::de::Error>::custom(format!(\n                \"unexpected __typename `{{other}}` for {}\"\n            ))),\n",
            def.name
        ));
        output.push_str("        }\n    }\n}\n\n");
    }

    /// Shared fields present with the same type in every variant, as
    /// `(accessor name, field)`.
    fn shared_getters<'d>(&self, def: &'d PolymorphicDef) -> Vec<(String, &'d FieldDef)> {
        if def.implementations.is_empty() {
            return Vec::new();
        }
        let mut getters = Vec::new();
        for field in &def.shared_fields {
            let Some(key) = &field.key else {
                continue;
            };
            if key == "__typename" {
                continue;
            }
            let mut getter = None;
            for implementation in &def.implementations {
                let Some(variant) = self.registry.get_struct(&implementation.struct_name) else {
                    getter = None;
                    break;
                };
                let idents = struct_idents(variant);
                let found = variant
                    .fields
                    .iter()
                    .zip(idents)
                    .find(|(candidate, _)| candidate.key.as_ref() == Some(key));
                match found {
                    Some((candidate, ident)) if candidate.ty == field.ty => {
                        if getter.as_ref().is_some_and(|existing| *existing != ident) {
                            getter = None;
                            break;
                        }
                        getter = Some(ident);
                    }
                    _ => {
                        getter = None;
                        break;
                    }
                }
            }
            if let Some(getter) = getter {
                if getter != "typename" {
                    getters.push((getter, field));
                }
            }
        }
        getters
    }

    fn deserialize_header(&self, output: &mut String, name: &str) {
        let client = self.client();
        output.push_str(&format!(
            "impl<'de> {client}::serde::Deserialize<'de> for {name} {{\n"
        ));
        output.push_str(
            "    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>\n    where\n",
        );
        output.push_str(&format!(
            "        D: {client}::serde::Deserializer<'de>,\n    {{\n"
        ));
        output.push_str(&format!(
            "        let value = <{client}::decode::Value as {client}::serde::Deserialize>::deserialize(deserializer)?;\n"
        ));
    }

    fn serde_crate(&self) -> String {
        format!("#[serde(crate = \"{}::serde\")]\n", self.client())
    }

    fn rust_type(&self, ty: &TypeNode, boxed: bool) -> String {
        match ty {
            TypeNode::Named(name) => name.clone(),
            TypeNode::Opaque(opaque) => opaque.reference.clone(),
            TypeNode::List(item) => format!("Vec<{}>", self.rust_type(item, boxed)),
            TypeNode::Optional(inner) => match inner.as_ref() {
                TypeNode::Named(name) if boxed && self.is_input(name) => {
                    format!("Option<Box<{name}>>")
                }
                inner => format!("Option<{}>", self.rust_type(inner, boxed)),
            },
        }
    }

    fn is_input(&self, name: &str) -> bool {
        self.registry
            .get_struct(name)
            .is_some_and(|def| def.is_input)
    }
}

/// Field identifiers of a struct, in field order, made unique.
fn struct_idents(def: &StructDef) -> Vec<String> {
    let mut used = FxHashSet::default();
    def.fields
        .iter()
        .map(|field| {
            let base = match (&field.key, field.ty.named()) {
                (Some(key), _) => field_ident(key),
                (None, Some(name)) => field_ident(name),
                (None, None) => "embedded".to_string(),
            };
            unique(&mut used, base)
        })
        .collect()
}

fn field_ident(name: &str) -> String {
    let snake = name.to_snake_case();
    if snake.is_empty() {
        "field".to_string()
    } else {
        ident(&snake)
    }
}

fn variant_ident(name: &str) -> String {
    let camel = name.to_upper_camel_case();
    if camel.is_empty() {
        "Value".to_string()
    } else {
        ident(&camel)
    }
}

fn ident(name: &str) -> String {
    if KEYWORDS.contains(&name) {
        format!("{name}_")
    } else if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{name}")
    } else {
        name.to_string()
    }
}

fn unique(used: &mut FxHashSet<String>, base: String) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let mut index = 2;
    loop {
        let candidate = format!("{base}_{index}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        index += 1;
    }
}

fn push_doc(output: &mut String, indent: &str, text: &str) {
    for line in text.lines() {
        if line.trim().is_empty() {
            output.push_str(&format!("{indent}///\n"));
        } else {
            output.push_str(&format!("{indent}/// {}\n", line.trim_end()));
        }
    }
}

/// Quotes `text` as a raw string literal that cannot be terminated early.
fn raw_string(text: &str) -> String {
    let mut longest = 0;
    let mut current = None;
    for c in text.chars() {
        current = match (c, current) {
            ('"', _) => Some(0),
            ('#', Some(count)) => Some(count + 1),
            _ => None,
        };
        if let Some(count) = current {
            longest = longest.max(count);
        }
    }
    let hashes = "#".repeat(longest + 1);
    format!("r{hashes}\"{text}\"{hashes}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_string_hashes() {
        assert_eq!(raw_string("query Q { a }"), "r#\"query Q { a }\"#");
        assert_eq!(raw_string("a(s: \"#x\")"), "r##\"a(s: \"#x\")\"##");
    }

    #[test]
    fn test_idents() {
        assert_eq!(field_ident("__typename"), "typename");
        assert_eq!(field_ident("createdAt"), "created_at");
        assert_eq!(field_ident("type"), "type_");
        assert_eq!(variant_ident("IN_PROGRESS"), "InProgress");
        assert_eq!(variant_ident("Self"), "Self_");
    }

    #[test]
    fn test_unique() {
        let mut used = FxHashSet::default();
        assert_eq!(unique(&mut used, "a".into()), "a");
        assert_eq!(unique(&mut used, "a".into()), "a_2");
        assert_eq!(unique(&mut used, "a".into()), "a_3");
    }

    #[test]
    fn test_doc_lines() {
        let mut output = String::new();
        push_doc(&mut output, "    ", "First line.\n\nSecond.");
        assert_eq!(output, "    /// First line.\n    ///\n    /// Second.\n");
    }
}
