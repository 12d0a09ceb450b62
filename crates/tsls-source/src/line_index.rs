/// A zero-based line and UTF-16 column, as editors report cursor positions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[must_use]
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A half-open range between two [`Position`]s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[must_use]
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// Line start table for converting between [`Position`]s and byte offsets.
#[derive(Clone, Debug)]
pub struct LineIndex {
    line_starts: Vec<u32>,
    length: u32,
}

impl LineIndex {
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        let mut pos_utf8 = 0;

        for c in text.chars() {
            pos_utf8 += u32::try_from(c.len_utf8()).unwrap_or(0);
            if c == '\n' {
                line_starts.push(pos_utf8);
            }
        }

        Self {
            line_starts,
            length: pos_utf8,
        }
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    #[must_use]
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Byte offset of the start of `line`.
    #[must_use]
    pub fn line_start(&self, line: u32) -> Option<u32> {
        self.line_starts.get(line as usize).copied()
    }

    /// Convert a UTF-16 position to a UTF-8 byte offset into `text`.
    ///
    /// Columns past the end of the line clamp to the line's end.
    #[must_use]
    pub fn offset(&self, position: Position, text: &str) -> Option<u32> {
        let line_start = self.line_start(position.line)?;

        if position.character == 0 {
            return Some(line_start);
        }

        let next_line_start = self
            .line_start(position.line + 1)
            .unwrap_or(self.length);
        let line_text = text.get(line_start as usize..next_line_start as usize)?;

        let mut utf16_pos = 0;
        let mut utf8_pos = 0;

        for c in line_text.chars() {
            if utf16_pos >= position.character || c == '\n' {
                break;
            }
            utf16_pos += u32::try_from(c.len_utf16()).unwrap_or(0);
            utf8_pos += u32::try_from(c.len_utf8()).unwrap_or(0);
        }

        Some(line_start + utf8_pos)
    }

    /// Convert a UTF-8 byte offset into `text` to a UTF-16 position.
    ///
    /// Returns `None` when the offset is past the end of the text or not on a
    /// character boundary.
    #[must_use]
    pub fn position(&self, offset: u32, text: &str) -> Option<Position> {
        if offset > self.length {
            return None;
        }

        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line - 1,
        };
        let line_start = self.line_starts[line];
        let prefix = text.get(line_start as usize..offset as usize)?;
        let character = prefix.chars().map(char::len_utf16).sum::<usize>();

        Some(Position::new(
            u32::try_from(line).unwrap_or(u32::MAX),
            u32::try_from(character).unwrap_or(u32::MAX),
        ))
    }
}
