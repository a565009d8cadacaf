//! Input discovery and loading.

use crate::extract;
use qlgen_core::{Error, Result, SourceFile};
use std::path::{Path, PathBuf};

/// Expands `patterns` relative to `root`.
///
/// Matches of each pattern are sorted; a file matched by several patterns
/// appears once, at its first match. A pattern that matches nothing is an
/// error.
pub fn expand(patterns: &[String], root: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let full = if Path::new(pattern).is_absolute() {
            pattern.clone()
        } else {
            root.join(pattern).to_string_lossy().into_owned()
        };
        let entries = glob::glob(&full)
            .map_err(|error| Error::config(format!("invalid pattern `{pattern}`: {error}"), None))?;

        let mut matched = Vec::new();
        for entry in entries {
            let path = entry.map_err(|error| {
                Error::io(error.path().display().to_string(), error.into_error())
            })?;
            if path.is_file() {
                matched.push(path);
            }
        }
        if matched.is_empty() {
            return Err(Error::config(format!("`{pattern}` matches no files"), None));
        }
        matched.sort();
        for path in matched {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    Ok(paths)
}

/// Name of `path` in positions: relative to `root` when it is inside it.
pub fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|error| Error::io(path.display().to_string(), error))
}

/// Reads schema files.
pub fn load_schema(paths: &[PathBuf], root: &Path) -> Result<Vec<SourceFile>> {
    paths
        .iter()
        .map(|path| Ok(SourceFile::new(display_path(path, root), read(path)?)))
        .collect()
}

/// Reads operation files; `.rs` files contribute their marked literals.
pub fn load_operations(paths: &[PathBuf], root: &Path) -> Result<Vec<SourceFile>> {
    let mut sources = Vec::new();
    for path in paths {
        let name = display_path(path, root);
        let text = read(path)?;
        if path.extension().is_some_and(|extension| extension == "rs") {
            sources.extend(extract::extract(&name, &text)?);
        } else {
            sources.push(SourceFile::new(name, text));
        }
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_expand_sorts_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("ops")).unwrap();
        fs::write(dir.path().join("ops/b.graphql"), "").unwrap();
        fs::write(dir.path().join("ops/a.graphql"), "").unwrap();

        let paths = expand(
            &["ops/*.graphql".to_string(), "ops/a.graphql".to_string()],
            dir.path(),
        )
        .unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|path| display_path(path, dir.path()))
            .collect();
        assert_eq!(names, ["ops/a.graphql", "ops/b.graphql"]);
    }

    #[test]
    fn test_pattern_without_matches() {
        let dir = tempfile::tempdir().unwrap();
        let error = expand(&["missing/*.graphql".to_string()], dir.path()).unwrap_err();
        assert!(error.to_string().contains("matches no files"));
    }

    #[test]
    fn test_load_operations_from_rust_and_graphql() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.graphql"), "query A { a }").unwrap();
        fs::write(
            dir.path().join("b.rs"),
            "const B: &str = \"# @qlgen\\nquery B { b }\";\n",
        )
        .unwrap();

        let paths = [dir.path().join("a.graphql"), dir.path().join("b.rs")];
        let sources = load_operations(&paths, dir.path()).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].path, "a.graphql");
        assert_eq!(sources[1].path, "b.rs");
        assert_eq!(sources[1].text, "# @qlgen\nquery B { b }");
    }
}
