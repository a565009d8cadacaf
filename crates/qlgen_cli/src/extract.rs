//! Operations embedded in Rust source.
//!
//! A string literal holds an operation if its text, after leading
//! whitespace, starts with `# @qlgen`. Literals inside macro invocations
//! are found as well.

use proc_macro2::{TokenStream, TokenTree};
use qlgen_core::{Error, LocatedMessage, Position, Result, SourceFile};
use syn::visit::Visit;
use syn::LitStr;

/// Prefix marking a string literal as an operation.
pub const MARKER: &str = "# @qlgen";

/// Extracts the marked literals of a Rust file, in source order.
///
/// Each result keeps the line the literal starts on, so positions reported
/// against it point into `path`.
pub fn extract(path: &str, text: &str) -> Result<Vec<SourceFile>> {
    let file = syn::parse_file(text).map_err(|error| {
        let start = error.span().start();
        Error::Syntax {
            errors: vec![LocatedMessage::new(
                error.to_string(),
                Some(Position::new(path, start.line, start.column + 1)),
            )],
        }
    })?;

    let mut collector = Collector {
        path,
        found: Vec::new(),
    };
    collector.visit_file(&file);
    tracing::debug!(path, operations = collector.found.len(), "scanned rust source");
    Ok(collector.found)
}

struct Collector<'a> {
    path: &'a str,
    found: Vec<SourceFile>,
}

impl Collector<'_> {
    fn literal(&mut self, literal: &LitStr) {
        let value = literal.value();
        if !value.trim_start().starts_with(MARKER) {
            return;
        }
        let line = literal.span().start().line;
        self.found
            .push(SourceFile::new(self.path, value).with_line_offset(line.saturating_sub(1)));
    }

    fn tokens(&mut self, tokens: TokenStream) {
        for token in tokens {
            match token {
                TokenTree::Group(group) => self.tokens(group.stream()),
                TokenTree::Literal(literal) => {
                    if let Ok(literal) = syn::parse2::<LitStr>(TokenTree::Literal(literal).into()) {
                        self.literal(&literal);
                    }
                }
                TokenTree::Ident(_) | TokenTree::Punct(_) => {}
            }
        }
    }
}

impl<'ast> Visit<'ast> for Collector<'_> {
    // Doc comments are attributes too.
    fn visit_attribute(&mut self, _: &'ast syn::Attribute) {}

    fn visit_lit_str(&mut self, literal: &'ast LitStr) {
        self.literal(literal);
    }

    fn visit_macro(&mut self, mac: &'ast syn::Macro) {
        self.tokens(mac.tokens.clone());
    }
}
