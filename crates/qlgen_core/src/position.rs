//! Source positions, and the map from a combined document back to its files.

use memchr::memchr_iter;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A location in an input file.
///
/// Lines and columns are 1-based. A position without a line refers to the
/// whole file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Position {
    pub file: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl Position {
    /// Creates a position pointing at a line of a file.
    #[must_use]
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line: Some(line),
            column: Some(column),
        }
    }

    /// Creates a position referring to a whole file.
    #[must_use]
    pub fn file(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: None,
            column: None,
        }
    }

    /// Returns true if this position points at a line.
    #[must_use]
    pub const fn has_line(&self) -> bool {
        self.line.is_some()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.file, line),
            None => f.write_str(&self.file),
        }
    }
}

/// One input text, with the number of lines that precede it in its file.
///
/// `line_offset` is zero for whole files, and non-zero for operations
/// extracted from string literals in host-language sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub text: String,
    pub line_offset: usize,
}

impl SourceFile {
    #[must_use]
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
            line_offset: 0,
        }
    }

    /// Sets the number of lines preceding this text in its file.
    #[must_use]
    pub fn with_line_offset(mut self, line_offset: usize) -> Self {
        self.line_offset = line_offset;
        self
    }
}

#[derive(Debug, Clone)]
struct Segment {
    start: usize,
    first_line: usize,
    path: String,
    line_offset: usize,
}

/// Several source files concatenated into one document.
///
/// The GraphQL parser sees a single text; offsets and line numbers it reports
/// are mapped back to the originating file and line here.
#[derive(Debug, Clone)]
pub struct SourceMap {
    text: String,
    segments: Vec<Segment>,
    line_starts: Vec<usize>,
}

impl Default for SourceMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceMap {
    /// Creates an empty source map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            text: String::new(),
            segments: Vec::new(),
            line_starts: vec![0],
        }
    }

    /// Builds a source map from files, in order.
    pub fn from_files(files: impl IntoIterator<Item = SourceFile>) -> Self {
        let mut map = Self::new();
        for file in files {
            map.push(file);
        }
        map
    }

    /// Appends a file. Each file starts on a fresh line.
    pub fn push(&mut self, file: SourceFile) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.append("\n");
        }
        self.segments.push(Segment {
            start: self.text.len(),
            first_line: self.line_starts.len() - 1,
            path: file.path,
            line_offset: file.line_offset,
        });
        self.append(&file.text);
    }

    fn append(&mut self, text: &str) {
        let base = self.text.len();
        self.line_starts
            .extend(memchr_iter(b'\n', text.as_bytes()).map(|index| base + index + 1));
        self.text.push_str(text);
    }

    /// Returns the combined text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns true if no file has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the paths of all files, in order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(|segment| segment.path.as_str())
    }

    fn segment_at(&self, offset: usize) -> Option<&Segment> {
        let index = self
            .segments
            .partition_point(|segment| segment.start <= offset);
        index.checked_sub(1).map(|index| &self.segments[index])
    }

    fn segment_at_line(&self, line_index: usize) -> Option<&Segment> {
        let index = self
            .segments
            .partition_point(|segment| segment.first_line <= line_index);
        index.checked_sub(1).map(|index| &self.segments[index])
    }

    /// Returns the byte offset at which the file containing `offset` starts.
    #[must_use]
    pub fn segment_start(&self, offset: usize) -> usize {
        self.segment_at(offset).map_or(0, |segment| segment.start)
    }

    /// Maps a byte offset in the combined text to a file position.
    #[must_use]
    pub fn position(&self, offset: usize) -> Option<Position> {
        let segment = self.segment_at(offset)?;
        let line_index = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let column = offset - self.line_starts[line_index] + 1;
        Some(Position::new(
            segment.path.clone(),
            line_index - segment.first_line + 1 + segment.line_offset,
            column,
        ))
    }

    /// Maps a 1-based line and column of the combined text to a file position.
    #[must_use]
    pub fn position_at_line(&self, line: usize, column: usize) -> Option<Position> {
        let line_index = line.checked_sub(1)?;
        let segment = self.segment_at_line(line_index)?;
        Some(Position::new(
            segment.path.clone(),
            line_index - segment.first_line + 1 + segment.line_offset,
            column,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_display() {
        assert_eq!(Position::new("a.graphql", 3, 1).to_string(), "a.graphql:3");
        assert_eq!(Position::file("a.graphql").to_string(), "a.graphql");
    }

    #[test]
    fn test_offsets_map_to_their_file() {
        let map = SourceMap::from_files([
            SourceFile::new("a.graphql", "query A {\n  a\n}"),
            SourceFile::new("b.graphql", "query B {\n  b\n}\n"),
        ]);

        let b = map.text().find("query B").unwrap();
        assert_eq!(map.position(b), Some(Position::new("b.graphql", 1, 1)));

        let field = map.text().find("  b").unwrap() + 2;
        assert_eq!(map.position(field), Some(Position::new("b.graphql", 2, 3)));
        assert_eq!(map.segment_start(field), b);
    }

    #[test]
    fn test_line_offset_is_applied() {
        let map = SourceMap::from_files([
            SourceFile::new("main.rs", "\n# @qlgen\nquery Q { q }\n").with_line_offset(41),
        ]);
        let query = map.text().find("query").unwrap();
        assert_eq!(map.position(query).unwrap().line, Some(44));
        assert_eq!(map.position_at_line(3, 5), Some(Position::new("main.rs", 44, 5)));
    }

    #[test]
    fn test_lines_across_files() {
        let map = SourceMap::from_files([
            SourceFile::new("a.graphql", "one\ntwo"),
            SourceFile::new("b.graphql", "three"),
        ]);
        assert_eq!(map.position_at_line(2, 1).unwrap().file, "a.graphql");
        assert_eq!(map.position_at_line(3, 1), Some(Position::new("b.graphql", 1, 1)));
        assert_eq!(map.position_at_line(0, 1), None);
    }
}
