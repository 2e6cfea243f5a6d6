//! Indenting text writer with position tracking

/// Output buffer that knows its current line and column
#[derive(Debug)]
pub struct SourceWriter {
    output: String,
    indent_unit: String,
    level: usize,
    minify: bool,
    at_line_start: bool,
    line: u32,
    column: u32,
}

impl SourceWriter {
    pub fn new(indent: usize, minify: bool) -> Self {
        Self {
            output: String::new(),
            indent_unit: " ".repeat(indent),
            level: 0,
            minify,
            at_line_start: true,
            line: 0,
            column: 0,
        }
    }

    pub fn is_minified(&self) -> bool {
        self.minify
    }

    /// Zero-based line and column of the next character
    pub fn position(&self) -> (u32, u32) {
        (self.line, self.column)
    }

    pub fn append(&mut self, text: &str) -> &mut Self {
        if text.is_empty() {
            return self;
        }
        if self.at_line_start {
            self.at_line_start = false;
            if !self.minify {
                for _ in 0..self.level {
                    self.output.push_str(&self.indent_unit);
                    self.column += self.indent_unit.len() as u32;
                }
            }
        }
        for c in text.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        self.output.push_str(text);
        self
    }

    /// A space that minified output drops
    pub fn ws(&mut self) -> &mut Self {
        if !self.minify {
            self.append(" ");
        }
        self
    }

    /// A line break that minified output drops
    pub fn soft_newline(&mut self) -> &mut Self {
        if !self.minify {
            self.newline();
        }
        self
    }

    pub fn newline(&mut self) -> &mut Self {
        self.output.push('\n');
        self.line += 1;
        self.column = 0;
        self.at_line_start = true;
        self
    }

    pub fn indent(&mut self) -> &mut Self {
        self.level += 1;
        self
    }

    pub fn outdent(&mut self) -> &mut Self {
        self.level = self.level.saturating_sub(1);
        self
    }

    pub fn finish(self) -> String {
        self.output
    }
}
