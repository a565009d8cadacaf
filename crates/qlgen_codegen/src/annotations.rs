//! `# @qlgen(...)` comment directives.
//!
//! A node owns the run of `#` comment lines directly above it, provided the
//! node starts its own line. Lines of the form `# @qlgen(...)` carry
//! options; the remaining lines form the node's description.
//!
//! ```graphql
//! # The user, if one exists.
//! # @qlgen(pointer: true)
//! user(id: $id) { name }
//! ```

use apollo_compiler::ast;
use apollo_compiler::executable::{ExecutableDocument, Field, Selection, SelectionSet};
use apollo_compiler::schema::{ExtendedType, Schema};
use apollo_compiler::Name;
use qlgen_core::{Error, Position, Result, SourceMap};

const DIRECTIVE: &str = "qlgen";

/// A `bind` option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bind {
    /// Use this target type in place of the generated one.
    Type(String),
    /// `bind: "-"`: ignore any global binding for the type.
    Skip,
}

/// Options set by `@qlgen` directives.
///
/// `None` means unset, so options from an enclosing operation or fragment
/// can fill the gap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pub omitempty: Option<bool>,
    pub pointer: Option<bool>,
    pub structure: Option<bool>,
    pub flatten: Option<bool>,
    pub bind: Option<Bind>,
    pub typename: Option<String>,
}

impl Options {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fills unset options from `parent`. The type name is never inherited.
    #[must_use]
    pub fn inherit(&self, parent: &Options) -> Options {
        Options {
            omitempty: self.omitempty.or(parent.omitempty),
            pointer: self.pointer.or(parent.pointer),
            structure: self.structure.or(parent.structure),
            flatten: self.flatten.or(parent.flatten),
            bind: self.bind.clone().or_else(|| parent.bind.clone()),
            typename: self.typename.clone(),
        }
    }

    /// Combines two directives on the same node.
    fn merge(&mut self, other: Options, position: Option<&Position>) -> Result<()> {
        fn take<T: PartialEq>(
            slot: &mut Option<T>,
            value: Option<T>,
            name: &str,
            position: Option<&Position>,
        ) -> Result<()> {
            match (slot.as_ref(), value) {
                (Some(current), Some(value)) if *current != value => Err(Error::directive(
                    format!("conflicting values for `{name}`"),
                    position.cloned(),
                )),
                (None, Some(value)) => {
                    *slot = Some(value);
                    Ok(())
                }
                _ => Ok(()),
            }
        }

        take(&mut self.omitempty, other.omitempty, "omitempty", position)?;
        take(&mut self.pointer, other.pointer, "pointer", position)?;
        take(&mut self.structure, other.structure, "struct", position)?;
        take(&mut self.flatten, other.flatten, "flatten", position)?;
        take(&mut self.bind, other.bind, "bind", position)?;
        take(&mut self.typename, other.typename, "typename", position)
    }
}

/// Documentation and options attached to a node.
#[derive(Debug, Clone, Default)]
pub struct Annotation {
    pub description: Option<String>,
    pub options: Options,
    /// Position of the directive nearest the node.
    pub position: Option<Position>,
}

/// Reads the comment block preceding the node at `offset`.
pub fn parse_preceding(sources: &SourceMap, offset: usize) -> Result<Annotation> {
    let text = sources.text();
    let start = sources.segment_start(offset);
    let Some(before) = text.get(start..offset) else {
        return Ok(Annotation::default());
    };

    let Some(newline) = before.rfind('\n') else {
        return Ok(Annotation::default());
    };
    if !before[newline + 1..].trim().is_empty() {
        // The node shares its line with something else.
        return Ok(Annotation::default());
    }

    let mut annotation = Annotation::default();
    let mut comments = Vec::new();
    let mut remaining = &before[..newline];
    loop {
        let line_start = remaining.rfind('\n').map_or(0, |index| index + 1);
        let line = remaining[line_start..].trim();
        let Some(comment) = line.strip_prefix('#') else {
            break;
        };
        let comment = comment.trim();
        if is_directive(comment) {
            let position = sources.position(start + line_start);
            let options = parse_directive(comment, position.as_ref())?;
            annotation.options.merge(options, position.as_ref())?;
            if annotation.position.is_none() {
                annotation.position = position;
            }
        } else {
            comments.push(comment);
        }
        if line_start == 0 {
            break;
        }
        remaining = &remaining[..line_start - 1];
    }

    if !comments.is_empty() {
        comments.reverse();
        annotation.description = Some(comments.join("\n"));
    }
    Ok(annotation)
}

fn is_directive(comment: &str) -> bool {
    comment
        .strip_prefix('@')
        .and_then(|rest| rest.strip_prefix(DIRECTIVE))
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(['(', ' ', '\t']))
}

/// Parses one `@qlgen(...)` directive.
fn parse_directive(text: &str, position: Option<&Position>) -> Result<Options> {
    let source = format!("query {text} {{ __typename }}");
    let document = ast::Document::parse(source, "directive.graphql").map_err(|errors| {
        let messages = errors
            .errors
            .iter()
            .map(|diagnostic| diagnostic.to_json().message)
            .collect::<Vec<_>>()
            .join("; ");
        Error::directive(format!("invalid @qlgen directive: {messages}"), position.cloned())
    })?;

    let mut options = Options::default();
    for definition in &document.definitions {
        let ast::Definition::OperationDefinition(operation) = definition else {
            continue;
        };
        for directive in operation.directives.iter() {
            if directive.name.as_str() != DIRECTIVE {
                return Err(Error::directive(
                    format!("unknown directive `@{}`", directive.name),
                    position.cloned(),
                ));
            }
            for argument in &directive.arguments {
                set_argument(&mut options, argument.name.as_str(), &argument.value)
                    .map_err(|error| error.context("invalid @qlgen directive", position.cloned()))?;
            }
        }
    }
    Ok(options)
}

fn set_argument(options: &mut Options, name: &str, value: &ast::Value) -> Result<()> {
    let boolean = || match value {
        ast::Value::Boolean(value) => Ok(*value),
        _ => Err(Error::directive(format!("`{name}` expects a boolean"), None)),
    };
    let string = || match value {
        ast::Value::String(value) => Ok(value.to_string()),
        _ => Err(Error::directive(format!("`{name}` expects a string"), None)),
    };

    match name {
        "omitempty" => options.omitempty = Some(boolean()?),
        "pointer" => options.pointer = Some(boolean()?),
        "struct" => options.structure = Some(boolean()?),
        "flatten" => options.flatten = Some(boolean()?),
        "bind" => {
            let target = string()?;
            options.bind = Some(match target.as_str() {
                "-" => Bind::Skip,
                "" => return Err(Error::directive("`bind` expects a type", None)),
                _ => Bind::Type(target),
            });
        }
        "typename" => {
            let typename = string()?;
            if typename.is_empty() {
                return Err(Error::directive("`typename` expects a name", None));
            }
            options.typename = Some(typename);
        }
        other => {
            return Err(Error::directive(
                format!("unknown argument `{other}`"),
                None,
            ))
        }
    }
    Ok(())
}

/// The kind of node a directive is attached to.
#[derive(Clone, Copy)]
pub enum Target<'a> {
    Operation,
    Fragment,
    Variable { nullable: bool },
    Field {
        field: &'a Field,
        schema: &'a Schema,
        document: &'a ExecutableDocument,
    },
    InlineFragment,
    FragmentSpread,
}

/// Checks that node-level options make sense where they are written.
pub fn validate(options: &Options, target: Target<'_>, position: Option<&Position>) -> Result<()> {
    let fail = |message: &str| Err(Error::directive(message, position.cloned()));

    match target {
        Target::Operation => {
            if options.bind.is_some() {
                return fail("bind may not be applied to an entire operation");
            }
            if options.typename.is_some() {
                return fail("typename may not be applied to an entire operation");
            }
        }
        Target::Fragment => {
            if options.bind.is_some() {
                return fail("bind is not supported on fragment definitions");
            }
            if options.structure.is_some() {
                return fail("struct is only applicable to fields, not fragment definitions");
            }
            if options.pointer.is_some() {
                return fail("pointer is not applicable to fragment definitions");
            }
        }
        Target::Variable { nullable } => {
            if options.omitempty == Some(true) && !nullable {
                return fail("omitempty may only be used on nullable variables");
            }
            if options.structure.is_some() {
                return fail("struct is only applicable to fields, not variable definitions");
            }
            if options.flatten.is_some() {
                return fail("flatten is only applicable to fields, not variable definitions");
            }
        }
        Target::Field {
            field,
            schema,
            document,
        } => {
            if options.omitempty.is_some() {
                return fail("omitempty is not applicable to fields");
            }
            if options.structure == Some(true) {
                validate_struct(field, schema).map_err(|error| error.at(position.cloned()))?;
            }
            if options.flatten == Some(true) {
                validate_flatten(field, schema, document)
                    .map_err(|error| error.at(position.cloned()))?;
            }
        }
        Target::InlineFragment => {
            if !options.is_empty() {
                return fail("@qlgen directives are not applicable to inline fragments");
            }
        }
        Target::FragmentSpread => {
            if !options.is_empty() {
                return fail("@qlgen directives are not applicable to fragment spreads");
            }
        }
    }
    Ok(())
}

fn validate_struct(field: &Field, schema: &Schema) -> Result<()> {
    let abstract_type = matches!(
        schema.types.get(field.ty().inner_named_type()),
        Some(ExtendedType::Interface(_) | ExtendedType::Union(_))
    );
    if !abstract_type {
        return Err(Error::directive(
            "struct is only applicable to interface- or union-typed fields",
            None,
        ));
    }
    let has_fragments = field
        .selection_set
        .selections
        .iter()
        .any(|selection| !matches!(selection, Selection::Field(_)));
    if has_fragments {
        return Err(Error::directive(
            "struct is not allowed for fields with fragment selections",
            None,
        ));
    }
    Ok(())
}

fn validate_flatten(field: &Field, schema: &Schema, document: &ExecutableDocument) -> Result<()> {
    let fail = |message: &str| Err(Error::directive(message, None));

    if field.selection_set.selections.is_empty() {
        return fail("flatten is not allowed for leaf fields");
    }
    let mut spreads = Vec::new();
    for selection in &field.selection_set.selections {
        match selection {
            // __typename added by the generator has no location.
            Selection::Field(inner) if inner.location().is_none() => {}
            Selection::Field(_) => {
                return fail("flatten is only supported for fragment spreads, not fields");
            }
            Selection::InlineFragment(_) => {
                return fail("flatten is not allowed for selections with inline fragments");
            }
            Selection::FragmentSpread(spread) => spreads.push(spread),
        }
    }
    let [spread] = spreads.as_slice() else {
        return fail("flatten requires exactly one fragment spread");
    };

    let Some(fragment) = document.fragments.get(&spread.fragment_name) else {
        return fail("flatten refers to an unknown fragment");
    };
    let field_type = field.ty().inner_named_type();
    let condition = fragment.type_condition();
    if field_type == condition || implements(schema, field_type.as_str(), condition.as_str()) {
        Ok(())
    } else {
        Err(Error::directive(
            format!(
                "flatten requires fragment `{}` on `{condition}` to match the field's type `{field_type}` or an interface it implements",
                spread.fragment_name
            ),
            None,
        ))
    }
}

/// Returns true if the object or interface `ty` implements `interface`.
pub(crate) fn implements(schema: &Schema, ty: &str, interface: &str) -> bool {
    match schema.types.get(ty) {
        Some(ExtendedType::Object(object)) => object
            .implements_interfaces
            .iter()
            .any(|implemented| implemented.name.as_str() == interface),
        Some(ExtendedType::Interface(object)) => object
            .implements_interfaces
            .iter()
            .any(|implemented| implemented.name.as_str() == interface),
        _ => false,
    }
}

/// Returns the fragment a flattened field collapses to: its only fragment
/// spread, ignoring generated `__typename` selections.
pub(crate) fn flatten_target(selection_set: &SelectionSet) -> Option<&Name> {
    let mut target = None;
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) if field.location().is_none() => {}
            Selection::FragmentSpread(spread) if target.is_none() => {
                target = Some(&spread.fragment_name);
            }
            _ => return None,
        }
    }
    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use qlgen_core::SourceFile;

    fn annotate(text: &str, node: &str) -> Result<Annotation> {
        let sources = SourceMap::from_files([SourceFile::new("q.graphql", text)]);
        let offset = text.find(node).expect("node present");
        parse_preceding(&sources, offset)
    }

    #[test]
    fn test_description_and_options() {
        let text = "query Q {\n  # The current user.\n  # @qlgen(pointer: true, typename: \"Me\")\n  user { id }\n}\n";
        let annotation = annotate(text, "user {").unwrap();
        assert_eq!(annotation.description.as_deref(), Some("The current user."));
        assert_eq!(annotation.options.pointer, Some(true));
        assert_eq!(annotation.options.typename.as_deref(), Some("Me"));
        assert_eq!(annotation.position, Some(Position::new("q.graphql", 3, 1)));
    }

    #[test]
    fn test_blank_line_ends_block() {
        let text = "# @qlgen(pointer: true)\n\nquery Q { a }\n";
        let annotation = annotate(text, "query").unwrap();
        assert!(annotation.options.is_empty());
    }

    #[test]
    fn test_node_not_starting_line_has_no_annotation() {
        let text = "# @qlgen(omitempty: true)\nquery Q($id: ID) { a }\n";
        let annotation = annotate(text, "$id").unwrap();
        assert!(annotation.options.is_empty());
        let annotation = annotate(text, "query").unwrap();
        assert_eq!(annotation.options.omitempty, Some(true));
    }

    #[test]
    fn test_bind_skip() {
        let text = "query Q {\n  # @qlgen(bind: \"-\")\n  when\n}\n";
        let annotation = annotate(text, "when").unwrap();
        assert_eq!(annotation.options.bind, Some(Bind::Skip));
    }

    #[test]
    fn test_conflicting_values() {
        let text = "query Q {\n  # @qlgen(pointer: true)\n  # @qlgen(pointer: false)\n  a\n}\n";
        let error = annotate(text, "a\n").unwrap_err();
        assert!(matches!(error, Error::Directive { .. }));
        assert!(error.message().contains("pointer"));
    }

    #[test]
    fn test_repeated_equal_values_are_accepted() {
        let text = "query Q {\n  # @qlgen(pointer: true)\n  # @qlgen(pointer: true, omitempty: false)\n  a\n}\n";
        let annotation = annotate(text, "a\n").unwrap();
        assert_eq!(annotation.options.pointer, Some(true));
        assert_eq!(annotation.options.omitempty, Some(false));
    }

    #[test]
    fn test_unknown_argument() {
        let text = "# @qlgen(frobnicate: true)\nquery Q { a }\n";
        let error = annotate(text, "query").unwrap_err();
        assert_eq!(
            error.to_string(),
            "q.graphql:1: invalid @qlgen directive: unknown argument `frobnicate`"
        );
    }

    #[test]
    fn test_wrong_argument_type() {
        let text = "# @qlgen(pointer: \"yes\")\nquery Q { a }\n";
        let error = annotate(text, "query").unwrap_err();
        assert!(error.message().contains("`pointer` expects a boolean"));
    }

    #[test]
    fn test_other_comment_starting_with_at() {
        let text = "# @qlgenerate is not ours\nquery Q { a }\n";
        let annotation = annotate(text, "query").unwrap();
        assert!(annotation.options.is_empty());
        assert_eq!(annotation.description.as_deref(), Some("@qlgenerate is not ours"));
    }

    #[test]
    fn test_inherit() {
        let parent = Options {
            pointer: Some(true),
            typename: Some("Parent".into()),
            ..Options::default()
        };
        let node = Options {
            pointer: Some(false),
            ..Options::default()
        };
        let merged = node.inherit(&parent);
        assert_eq!(merged.pointer, Some(false));
        assert_eq!(merged.typename, None);

        let merged = Options::default().inherit(&parent);
        assert_eq!(merged.pointer, Some(true));
    }

    #[test]
    fn test_operation_rejects_bind() {
        let options = Options {
            bind: Some(Bind::Type("String".into())),
            ..Options::default()
        };
        let position = Position::new("q.graphql", 1, 1);
        let error = validate(&options, Target::Operation, Some(&position)).unwrap_err();
        assert_eq!(error.position(), Some(&position));
    }

    #[test]
    fn test_variable_omitempty_requires_nullable() {
        let options = Options {
            omitempty: Some(true),
            ..Options::default()
        };
        assert!(validate(&options, Target::Variable { nullable: true }, None).is_ok());
        assert!(validate(&options, Target::Variable { nullable: false }, None).is_err());
    }
}
