use sha2::{Digest, Sha256};
use std::fmt;

/// Immutable template text together with the path it was read from.
#[derive(Clone, Debug)]
pub struct SourceDocument {
    path: String,
    content: String,
    checksum: [u8; 32],
    line_starts: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    pub file_path: String,
    pub absolute_index: usize,
    /// 1-based.
    pub line: usize,
    /// 1-based, counted in characters.
    pub column: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({},{})", self.file_path, self.line, self.column)
    }
}

impl SourceDocument {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let mut checksum = [0u8; 32];
        checksum.copy_from_slice(&Sha256::digest(content.as_bytes()));
        let mut line_starts = vec![0];
        line_starts.extend(
            content
                .char_indices()
                .filter(|(_, ch)| *ch == '\n')
                .map(|(idx, _)| idx + 1),
        );
        Self {
            path: path.into(),
            content,
            checksum,
            line_starts,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn checksum(&self) -> &[u8; 32] {
        &self.checksum
    }

    pub fn checksum_hex(&self) -> String {
        self.checksum.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn reader(&self) -> SourceReader<'_> {
        SourceReader::new(&self.content)
    }

    /// File name without directories or extension.
    pub fn file_stem(&self) -> &str {
        let name = self
            .path
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or(&self.path);
        match name.rfind('.') {
            Some(0) | None => name,
            Some(idx) => &name[..idx],
        }
    }

    pub fn location(&self, offset: usize) -> SourceLocation {
        let offset = offset.min(self.content.len());
        let line_index = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let line_start = self.line_starts[line_index];
        let column = self
            .content
            .get(line_start..offset)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(0);
        SourceLocation {
            file_path: self.path.clone(),
            absolute_index: offset,
            line: line_index + 1,
            column: column + 1,
        }
    }

    /// Byte offset of a 1-based line/column pair, clamped to the line.
    pub fn offset_of(&self, line: usize, column: usize) -> Option<usize> {
        let start = *self.line_starts.get(line.checked_sub(1)?)?;
        let end = self
            .line_starts
            .get(line)
            .copied()
            .unwrap_or(self.content.len());
        let text = &self.content[start..end];
        let offset = text
            .char_indices()
            .nth(column.saturating_sub(1))
            .map(|(idx, _)| idx)
            .unwrap_or(text.len());
        Some(start + offset)
    }
}

/// Character cursor over a document, tracking byte offsets.
#[derive(Clone, Debug)]
pub struct SourceReader<'a> {
    text: &'a str,
    offset: usize,
}

impl<'a> SourceReader<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_eof(&self) -> bool {
        self.offset >= self.text.len()
    }

    pub fn rest(&self) -> &'a str {
        &self.text[self.offset..]
    }

    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.text[start..end]
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    /// Character immediately before the cursor.
    pub fn previous(&self) -> Option<char> {
        self.text[..self.offset].chars().next_back()
    }

    pub fn starts_with(&self, pattern: &str) -> bool {
        self.rest().starts_with(pattern)
    }

    pub fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.offset += ch.len_utf8();
        Some(ch)
    }

    pub fn advance_by(&mut self, bytes: usize) {
        self.offset = (self.offset + bytes).min(self.text.len());
    }

    pub fn eat_while(&mut self, mut predicate: impl FnMut(char) -> bool) -> &'a str {
        let start = self.offset;
        while let Some(ch) = self.peek() {
            if !predicate(ch) {
                break;
            }
            self.bump();
        }
        &self.text[start..self.offset]
    }

    pub fn seek(&mut self, offset: usize) {
        self.offset = offset.min(self.text.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_reports_one_based_line_and_column() {
        let doc = SourceDocument::new("/Pages/Index.razor", "ab\ncd\n\nxyz");
        let loc = doc.location(4);
        assert_eq!((loc.line, loc.column), (2, 2));
        let loc = doc.location(7);
        assert_eq!((loc.line, loc.column), (4, 1));
        assert_eq!(doc.line_count(), 4);
    }

    #[test]
    fn offset_of_inverts_location() {
        let doc = SourceDocument::new("x.razor", "first\nsecond line\n");
        let offset = doc.offset_of(2, 3).expect("offset");
        assert_eq!(&doc.content()[offset..offset + 1], "c");
        assert_eq!(doc.location(offset).column, 3);
    }

    #[test]
    fn checksum_changes_with_content() {
        let a = SourceDocument::new("a", "hello");
        let b = SourceDocument::new("a", "hello!");
        assert_ne!(a.checksum_hex(), b.checksum_hex());
        assert_eq!(a.checksum_hex().len(), 64);
    }

    #[test]
    fn file_stem_strips_directories_and_extension() {
        let doc = SourceDocument::new("/Pages/Widgets/Edit.razor", "");
        assert_eq!(doc.file_stem(), "Edit");
    }
}
