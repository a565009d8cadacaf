//! Error taxonomy for qlgen.
//!
//! Every error is fatal for the run. Errors carry an optional [`Position`];
//! syntax and validation failures carry the full list of located messages.

use crate::position::Position;
use miette::Diagnostic;
use std::fmt;
use thiserror::Error;

/// Result type used throughout qlgen.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A message with an optional location, as reported by the GraphQL parser
/// or validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedMessage {
    pub message: String,
    pub position: Option<Position>,
}

impl LocatedMessage {
    pub fn new(message: impl Into<String>, position: Option<Position>) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl fmt::Display for LocatedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.position {
            Some(position) => write!(f, "{position}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("syntax error{}", list(.errors))]
    #[diagnostic(code(qlgen::syntax))]
    Syntax { errors: Vec<LocatedMessage> },

    #[error("validation failed{}", list(.errors))]
    #[diagnostic(code(qlgen::validation))]
    Validation { errors: Vec<LocatedMessage> },

    #[error(
        "{}unknown scalar `{scalar}`: add a binding for it under [bindings] in qlgen.toml",
        prefix(.position)
    )]
    #[diagnostic(code(qlgen::unknown_scalar))]
    UnknownScalar {
        scalar: String,
        position: Option<Position>,
    },

    #[error("{}{message}", prefix(.position))]
    #[diagnostic(code(qlgen::unsupported))]
    UnsupportedFeature {
        message: String,
        position: Option<Position>,
    },

    #[error("{}{message}", prefix(.position))]
    #[diagnostic(code(qlgen::directive))]
    Directive {
        message: String,
        position: Option<Position>,
    },

    #[error("{}conflicting definitions for type `{name}`{}", prefix(.position), previously(.previous))]
    #[diagnostic(
        code(qlgen::naming_collision),
        help("use `# @qlgen(typename: \"...\")` on one of the fields to pick a distinct name")
    )]
    NamingCollision {
        name: String,
        position: Option<Position>,
        previous: Option<Position>,
    },

    #[error("{}{message}", prefix(.position))]
    #[diagnostic(code(qlgen::duplicate_field))]
    DuplicateField {
        message: String,
        position: Option<Position>,
    },

    #[error("{}{message}", prefix(.position))]
    #[diagnostic(code(qlgen::binding))]
    BindingValidation {
        message: String,
        position: Option<Position>,
    },

    #[error("{}{message}", prefix(.position))]
    #[diagnostic(code(qlgen::config))]
    Config {
        message: String,
        position: Option<Position>,
    },

    #[error("{path}: {source}")]
    #[diagnostic(code(qlgen::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn prefix(position: &Option<Position>) -> String {
    position
        .as_ref()
        .map(|position| format!("{position}: "))
        .unwrap_or_default()
}

fn previously(previous: &Option<Position>) -> String {
    previous
        .as_ref()
        .map(|position| format!(" (previous definition at {position})"))
        .unwrap_or_default()
}

fn list(errors: &[LocatedMessage]) -> String {
    match errors {
        [single] => format!(": {single}"),
        errors => errors.iter().map(|error| format!("\n  {error}")).collect(),
    }
}

impl Error {
    pub fn unsupported(message: impl Into<String>, position: Option<Position>) -> Self {
        Self::UnsupportedFeature {
            message: message.into(),
            position,
        }
    }

    pub fn directive(message: impl Into<String>, position: Option<Position>) -> Self {
        Self::Directive {
            message: message.into(),
            position,
        }
    }

    pub fn duplicate_field(message: impl Into<String>, position: Option<Position>) -> Self {
        Self::DuplicateField {
            message: message.into(),
            position,
        }
    }

    pub fn binding(message: impl Into<String>, position: Option<Position>) -> Self {
        Self::BindingValidation {
            message: message.into(),
            position,
        }
    }

    pub fn config(message: impl Into<String>, position: Option<Position>) -> Self {
        Self::Config {
            message: message.into(),
            position,
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the position of this error, if it has a single one.
    #[must_use]
    pub fn position(&self) -> Option<&Position> {
        match self {
            Self::UnknownScalar { position, .. }
            | Self::UnsupportedFeature { position, .. }
            | Self::Directive { position, .. }
            | Self::NamingCollision { position, .. }
            | Self::DuplicateField { position, .. }
            | Self::BindingValidation { position, .. }
            | Self::Config { position, .. } => position.as_ref(),
            Self::Syntax { .. } | Self::Validation { .. } | Self::Io { .. } => None,
        }
    }

    fn position_slot(&mut self) -> Option<&mut Option<Position>> {
        match self {
            Self::UnknownScalar { position, .. }
            | Self::UnsupportedFeature { position, .. }
            | Self::Directive { position, .. }
            | Self::NamingCollision { position, .. }
            | Self::DuplicateField { position, .. }
            | Self::BindingValidation { position, .. }
            | Self::Config { position, .. } => Some(position),
            Self::Syntax { .. } | Self::Validation { .. } | Self::Io { .. } => None,
        }
    }

    /// Attaches a position.
    ///
    /// The innermost position wins; an outer position only replaces a missing
    /// one, or one that names a file but no line.
    #[must_use]
    pub fn at(mut self, position: Option<Position>) -> Self {
        if let (Some(slot), Some(position)) = (self.position_slot(), position) {
            let replace = match slot {
                None => true,
                Some(current) => !current.has_line() && position.has_line(),
            };
            if replace {
                *slot = Some(position);
            }
        }
        self
    }

    /// Returns the message of this error without its position.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::UnsupportedFeature { message, .. }
            | Self::Directive { message, .. }
            | Self::DuplicateField { message, .. }
            | Self::BindingValidation { message, .. }
            | Self::Config { message, .. } => message.clone(),
            Self::UnknownScalar { scalar, .. } => format!("unknown scalar `{scalar}`"),
            Self::NamingCollision { name, .. } => {
                format!("conflicting definitions for type `{name}`")
            }
            Self::Syntax { errors } | Self::Validation { errors } => errors
                .iter()
                .map(|error| error.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
            Self::Io { source, .. } => source.to_string(),
        }
    }

    /// Prefixes the message with `context`, then attaches `position` under
    /// the rules of [`Error::at`].
    #[must_use]
    pub fn context(self, context: impl fmt::Display, position: Option<Position>) -> Self {
        let error = match self {
            Self::UnsupportedFeature { message, position } => Self::UnsupportedFeature {
                message: format!("{context}: {message}"),
                position,
            },
            Self::Directive { message, position } => Self::Directive {
                message: format!("{context}: {message}"),
                position,
            },
            Self::DuplicateField { message, position } => Self::DuplicateField {
                message: format!("{context}: {message}"),
                position,
            },
            Self::BindingValidation { message, position } => Self::BindingValidation {
                message: format!("{context}: {message}"),
                position,
            },
            Self::Config { message, position } => Self::Config {
                message: format!("{context}: {message}"),
                position,
            },
            other => other,
        };
        error.at(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_position() {
        let error = Error::directive("bad option", Some(Position::new("q.graphql", 4, 3)));
        assert_eq!(error.to_string(), "q.graphql:4: bad option");

        let error = Error::directive("bad option", Some(Position::file("q.graphql")));
        assert_eq!(error.to_string(), "q.graphql: bad option");
    }

    #[test]
    fn test_innermost_position_wins() {
        let inner = Position::new("q.graphql", 4, 3);
        let outer = Position::new("q.graphql", 1, 1);
        let error = Error::directive("bad", Some(inner.clone())).at(Some(outer));
        assert_eq!(error.position(), Some(&inner));
    }

    #[test]
    fn test_more_specific_position_replaces_file_only() {
        let outer = Position::new("q.graphql", 7, 1);
        let error = Error::binding("bad", Some(Position::file("q.graphql"))).at(Some(outer.clone()));
        assert_eq!(error.position(), Some(&outer));
    }

    #[test]
    fn test_context_unwraps_message() {
        let inner = Error::directive("unknown argument `foo`", None);
        let wrapped = inner.context("invalid @qlgen directive", Some(Position::new("a", 2, 1)));
        assert_eq!(
            wrapped.to_string(),
            "a:2: invalid @qlgen directive: unknown argument `foo`"
        );
        assert_eq!(wrapped.message(), "invalid @qlgen directive: unknown argument `foo`");
    }

    #[test]
    fn test_list_display() {
        let error = Error::Validation {
            errors: vec![
                LocatedMessage::new("first", Some(Position::new("a", 1, 1))),
                LocatedMessage::new("second", None),
            ],
        };
        assert_eq!(error.to_string(), "validation failed\n  a:1: first\n  second");

        let error = Error::Syntax {
            errors: vec![LocatedMessage::new("unexpected `}`", None)],
        };
        assert_eq!(error.to_string(), "syntax error: unexpected `}`");
    }
}
