//! `qlgen.toml` loading.

use qlgen_codegen::{Bindings, CodegenOptions, OptionalPolicy};
use qlgen_core::{Error, Position, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const CONFIG_FILE: &str = "qlgen.toml";

/// Project configuration.
///
/// Relative paths and patterns are resolved against the directory that
/// holds the configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Schema file patterns.
    #[serde(deserialize_with = "one_or_many")]
    pub schema: Vec<String>,
    /// Operation file patterns; `.rs` files are scanned for string literals.
    #[serde(default, deserialize_with = "one_or_many")]
    pub operations: Vec<String>,
    /// Output path of the generated module.
    #[serde(default = "default_generated")]
    pub generated: PathBuf,
    #[serde(default = "default_package")]
    pub package: String,
    #[serde(default = "default_client_crate")]
    pub client_crate: String,
    #[serde(default)]
    pub optional: OptionalPolicy,
    #[serde(default)]
    pub allow_experimental: bool,
    /// Where to write the operation export, if anywhere.
    #[serde(default)]
    pub export_operations: Option<PathBuf>,
    #[serde(default)]
    pub bindings: Bindings,

    #[serde(skip)]
    root: PathBuf,
}

fn default_generated() -> PathBuf {
    PathBuf::from("generated.rs")
}

fn default_package() -> String {
    "generated".to_string()
}

fn default_client_crate() -> String {
    "qlgen_client".to_string()
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(pattern) => vec![pattern],
        OneOrMany::Many(patterns) => patterns,
    })
}

impl Config {
    /// Reads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).map_err(|error| Error::io(path.display().to_string(), error))?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::parse(&text, &path.display().to_string(), root)
    }

    /// Parses configuration text; `file` names it in errors.
    pub fn parse(text: &str, file: &str, root: PathBuf) -> Result<Self> {
        let mut config: Self = toml::from_str(text).map_err(|error| {
            let position = match error.span() {
                Some(span) => line_at(text, span.start, file),
                None => Position::file(file),
            };
            Error::config(error.message().to_string(), Some(position))
        })?;
        config.root = root;
        config.validate(file)?;
        Ok(config)
    }

    fn validate(&self, file: &str) -> Result<()> {
        if self.schema.is_empty() {
            return Err(Error::config(
                "`schema` must name at least one file or pattern",
                Some(Position::file(file)),
            ));
        }
        if self.client_crate.trim().is_empty() {
            return Err(Error::config(
                "`client_crate` must not be empty",
                Some(Position::file(file)),
            ));
        }
        for (name, binding) in &self.bindings {
            if binding.target.trim().is_empty() {
                return Err(Error::config(
                    format!("binding for `{name}` has an empty `type`"),
                    Some(Position::file(file)),
                ));
            }
        }
        Ok(())
    }

    /// Directory relative paths are resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a configured path against the configuration directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn generated_path(&self) -> PathBuf {
        self.resolve(&self.generated)
    }

    pub fn export_path(&self) -> Option<PathBuf> {
        self.export_operations.as_deref().map(|path| self.resolve(path))
    }

    /// Options for the generator.
    pub fn codegen_options(&self) -> CodegenOptions {
        CodegenOptions {
            package_name: self.package.clone(),
            client_crate: self.client_crate.clone(),
            optional: self.optional,
            allow_experimental: self.allow_experimental,
            bindings: self.bindings.clone(),
        }
    }
}

fn line_at(text: &str, offset: usize, file: &str) -> Position {
    let before = &text[..offset.min(text.len())];
    let line = before.matches('\n').count() + 1;
    let column = before.len() - before.rfind('\n').map_or(0, |index| index + 1) + 1;
    Position::new(file, line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Config> {
        Config::parse(text, "qlgen.toml", PathBuf::from("project"))
    }

    #[test]
    fn test_minimal_config() {
        let config = parse(r#"schema = "schema.graphql""#).unwrap();
        assert_eq!(config.schema, ["schema.graphql"]);
        assert!(config.operations.is_empty());
        assert_eq!(config.generated_path(), Path::new("project/generated.rs"));
        assert_eq!(config.client_crate, "qlgen_client");
        assert_eq!(config.optional, OptionalPolicy::Option);
        assert!(config.export_path().is_none());
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
schema = ["schema/*.graphql"]
operations = ["queries/**/*.graphql", "src/**/*.rs"]
generated = "src/api.rs"
package = "api"
client_crate = "crate::runtime"
optional = "value"
allow_experimental = true
export_operations = "operations.json"

[bindings]
DateTime = { type = "chrono::DateTime<chrono::Utc>" }

[bindings.User]
type = "crate::model::User"
expect_exact_fields = "id name"
"#,
        )
        .unwrap();

        assert_eq!(config.operations.len(), 2);
        assert_eq!(config.export_path(), Some(PathBuf::from("project/operations.json")));

        let options = config.codegen_options();
        assert_eq!(options.package_name, "api");
        assert_eq!(options.client_crate, "crate::runtime");
        assert_eq!(options.optional, OptionalPolicy::Value);
        assert!(options.allow_experimental);
        assert_eq!(
            options.bindings.keys().collect::<Vec<_>>(),
            ["DateTime", "User"]
        );
        assert_eq!(
            options.bindings["User"].expect_exact_fields.as_deref(),
            Some("id name")
        );
    }

    #[test]
    fn test_unknown_key_reports_line() {
        let error = parse("schema = \"s.graphql\"\nschemas = []\n").unwrap_err();
        assert!(matches!(error, Error::Config { .. }));
        assert_eq!(error.position().and_then(|p| p.line), Some(2));
    }

    #[test]
    fn test_missing_schema() {
        assert!(parse("operations = [\"q.graphql\"]").is_err());
        assert!(parse("schema = []").is_err());
    }

    #[test]
    fn test_invalid_optional_policy() {
        let error = parse("schema = \"s.graphql\"\noptional = \"pointer\"\n").unwrap_err();
        assert_eq!(error.position().and_then(|p| p.line), Some(2));
    }

    #[test]
    fn test_line_at() {
        let position = line_at("a\nbc\nd", 3, "f");
        assert_eq!(position.line, Some(2));
        assert_eq!(position.column, Some(2));
    }
}
