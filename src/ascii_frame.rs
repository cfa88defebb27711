/// One rasterized video frame: its 1-based source number plus a fixed-size
/// block of glyph rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsciiFrame {
    number: usize,
    lines: Vec<String>,
}

impl AsciiFrame {
    pub fn blank(number: usize, width: usize, height: usize) -> Self {
        let line = " ".repeat(width);
        Self {
            number,
            lines: vec![line; height],
        }
    }

    /// Split on line breaks (`\n` or `\r\n`), then pad or clip to size.
    pub fn from_text(number: usize, text: &str, width: usize, height: usize) -> Self {
        Self::from_lines(number, text.lines(), width, height)
    }

    pub fn from_lines<I>(number: usize, lines: I, width: usize, height: usize) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let normalized = normalize_lines(lines, width, height);
        Self {
            number,
            lines: normalized,
        }
    }

    /// Source frame number (1-based, as named on disk).
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Rows joined with `\n`, no trailing newline.
    pub fn to_text(&self) -> String {
        self.lines.join("\n")
    }
}

fn normalize_lines<I>(lines: I, width: usize, height: usize) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut normalized = lines
        .into_iter()
        .take(height)
        .map(|line| normalize_line(line.as_ref(), width))
        .collect::<Vec<_>>();

    if normalized.len() < height {
        normalized.extend(std::iter::repeat(" ".repeat(width)).take(height - normalized.len()));
    }

    normalized
}

// Widths are counted in chars: block glyphs are multi-byte in UTF-8.
fn normalize_line(line: &str, width: usize) -> String {
    let mut output = line.chars().take(width).collect::<String>();
    let count = output.chars().count();
    if count < width {
        output.extend(std::iter::repeat(' ').take(width - count));
    }
    output
}
