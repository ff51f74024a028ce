use crate::template::source::SourceLocation;

const INDENT: &str = "    ";

/// Ties one generated line back to the authored text it was copied from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineMapping {
    /// 1-based.
    pub generated_line: usize,
    /// 1-based column where the authored text starts on the generated line.
    pub generated_column: usize,
    pub original: SourceLocation,
}

impl LineMapping {
    /// Translates a generated column on this line into the authored location.
    pub fn map_column(&self, column: usize) -> SourceLocation {
        let delta = column.saturating_sub(self.generated_column);
        SourceLocation {
            file_path: self.original.file_path.clone(),
            absolute_index: self.original.absolute_index + delta,
            line: self.original.line,
            column: self.original.column + delta,
        }
    }
}

#[derive(Debug, Default)]
pub struct SourceWriter {
    buffer: String,
    /// 1-based line the next write lands on.
    line: usize,
    /// Characters already written on the current line.
    column: usize,
    indent: usize,
    mappings: Vec<LineMapping>,
}

impl SourceWriter {
    pub fn new() -> Self {
        Self {
            line: 1,
            ..Self::default()
        }
    }

    pub fn indent(&mut self) -> &mut Self {
        self.indent += 1;
        self
    }

    pub fn dedent(&mut self) -> &mut Self {
        self.indent = self.indent.saturating_sub(1);
        self
    }

    fn write_indent_if_needed(&mut self) {
        if self.column == 0 {
            for _ in 0..self.indent {
                self.buffer.push_str(INDENT);
            }
            self.column = self.indent * INDENT.len();
        }
    }

    /// Writes single-line text at the current indentation.
    pub fn write(&mut self, text: &str) -> &mut Self {
        if text.is_empty() {
            return self;
        }
        self.write_indent_if_needed();
        self.buffer.push_str(text);
        self.column += text.chars().count();
        self
    }

    pub fn write_line(&mut self, text: &str) -> &mut Self {
        self.write(text);
        self.new_line()
    }

    pub fn new_line(&mut self) -> &mut Self {
        self.buffer.push('\n');
        self.line += 1;
        self.column = 0;
        self
    }

    /// Writes authored text, recording a mapping for every line it spans.
    /// The first line continues the current line; later lines start at
    /// column 1 without indentation, as in the authored document.
    pub fn write_mapped(&mut self, text: &str, origin: &SourceLocation) -> &mut Self {
        self.write_indent_if_needed();
        let mut offset = 0;
        for (index, segment) in text.split('\n').enumerate() {
            if index > 0 {
                self.buffer.push('\n');
                self.line += 1;
                self.column = 0;
            }
            let original = if index == 0 {
                origin.clone()
            } else {
                SourceLocation {
                    file_path: origin.file_path.clone(),
                    absolute_index: origin.absolute_index + offset,
                    line: origin.line + index,
                    column: 1,
                }
            };
            self.mappings.push(LineMapping {
                generated_line: self.line,
                generated_column: self.column + 1,
                original,
            });
            self.buffer.push_str(segment);
            self.column += segment.chars().count();
            offset += segment.len() + 1;
        }
        self
    }

    /// Writes authored lines starting at column 1 and ends the line.
    pub fn write_mapped_block(&mut self, text: &str, origin: &SourceLocation) -> &mut Self {
        if self.column != 0 {
            self.new_line();
        }
        let indent = std::mem::take(&mut self.indent);
        self.write_mapped(text, origin).new_line();
        self.indent = indent;
        self
    }

    pub fn finish(self) -> (String, Vec<LineMapping>) {
        (self.buffer, self.mappings)
    }
}

/// Quotes `text` as a page script string literal.
pub fn string_literal(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        match ch {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}
