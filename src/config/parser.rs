//! Line based config files: every non-empty line that does not start with `;` is a key followed
//! by whitespace separated parameters. Double quotes group a parameter containing spaces.

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigToken {
    String(String),
    Float(f32),
    Number(i32),
}

impl ConfigToken {
    /// Quoted words are always strings, even if they look like numbers.
    fn classify(word: String, quoted: bool) -> Self {
        if quoted {
            return Self::String(word);
        }
        if let Ok(number) = word.parse::<i32>() {
            Self::Number(number)
        } else if let Ok(float) = word.parse::<f32>() {
            Self::Float(float)
        } else {
            Self::String(word)
        }
    }
}

/// Conversion from a parameter. `None` if the token has the wrong type.
pub trait FromConfigToken: Sized {
    fn from_token(token: &ConfigToken) -> Option<Self>;
}

impl FromConfigToken for String {
    fn from_token(token: &ConfigToken) -> Option<Self> {
        Some(match token {
            ConfigToken::String(s) => s.clone(),
            ConfigToken::Float(value) => value.to_string(),
            ConfigToken::Number(value) => value.to_string(),
        })
    }
}

impl FromConfigToken for i32 {
    fn from_token(token: &ConfigToken) -> Option<Self> {
        match *token {
            ConfigToken::Number(value) => Some(value),
            _ => None,
        }
    }
}

impl FromConfigToken for u32 {
    fn from_token(token: &ConfigToken) -> Option<Self> {
        match *token {
            ConfigToken::Number(value) => u32::try_from(value).ok(),
            _ => None,
        }
    }
}

impl FromConfigToken for f32 {
    fn from_token(token: &ConfigToken) -> Option<Self> {
        match *token {
            ConfigToken::Float(value) => Some(value),
            ConfigToken::Number(value) => Some(value as f32),
            ConfigToken::String(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLine {
    /// 1-based line number in the source text.
    pub line: usize,
    pub key: String,
    pub params: Vec<ConfigToken>,
}

impl ConfigLine {
    pub fn maybe_param<T: FromConfigToken>(&self, index: usize) -> Option<T> {
        self.params.get(index).and_then(T::from_token)
    }

    /// Parameter at `index` as a string, empty if there is none.
    pub fn string(&self, index: usize) -> String {
        self.maybe_param(index).unwrap_or_default()
    }
}

/// Next word of `rest` and whether it was quoted. Advances `rest` past the word.
fn next_word(rest: &mut &str) -> Option<(String, bool)> {
    let text = rest.trim_start();
    if text.is_empty() {
        *rest = text;
        return None;
    }

    if let Some(quoted) = text.strip_prefix('"') {
        // An unterminated quote runs to the end of the line.
        let (word, remainder) = quoted.split_once('"').unwrap_or((quoted, ""));
        *rest = remainder;
        return Some((word.to_string(), true));
    }

    let end = text.find(char::is_whitespace).unwrap_or(text.len());
    let (word, remainder) = text.split_at(end);
    *rest = remainder;
    Some((word.to_string(), false))
}

pub fn parse_line(line_number: usize, line: &str) -> Option<ConfigLine> {
    let mut rest = line.trim();
    if rest.is_empty() || rest.starts_with(';') {
        return None;
    }

    let (key, _) = next_word(&mut rest)?;

    let mut params = Vec::new();
    while let Some((word, quoted)) = next_word(&mut rest) {
        params.push(ConfigToken::classify(word, quoted));
    }

    Some(ConfigLine {
        line: line_number,
        key,
        params,
    })
}

pub struct ConfigLines {
    lines: Vec<ConfigLine>,
}

impl ConfigLines {
    pub fn parse(s: &str) -> Self {
        Self {
            lines: s
                .lines()
                .enumerate()
                .filter_map(|(i, line)| parse_line(i + 1, line))
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigLine> {
        self.lines.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_and_blank_lines() {
        let lines = ConfigLines::parse("; comment\n\n   \nSET cx 128\n");
        let lines: Vec<_> = lines.iter().collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].line, 4);
        assert_eq!(lines[0].key, "SET");
        assert_eq!(lines[0].string(0), "cx");
        assert_eq!(lines[0].maybe_param::<u32>(1), Some(128));
    }

    #[test]
    fn quoted_strings_keep_spaces() {
        let line = parse_line(1, "SET heightmap \"my maps/height 01.raw\" next").unwrap();
        assert_eq!(line.string(1), "my maps/height 01.raw");
        assert_eq!(line.string(2), "next");

        let line = parse_line(1, "SET name \"42\"").unwrap();
        assert_eq!(line.params[1], ConfigToken::String("42".to_string()));
    }

    #[test]
    fn numbers_convert_to_floats() {
        let line = parse_line(1, "SET min_y -10").unwrap();
        assert_eq!(line.maybe_param::<f32>(1), Some(-10.0));
        let line = parse_line(1, "SET vertex_distance 2.5").unwrap();
        assert_eq!(line.maybe_param::<f32>(1), Some(2.5));
        assert_eq!(line.maybe_param::<f32>(2), None);
    }

    #[test]
    fn wrong_types_are_rejected() {
        let line = parse_line(1, "SET cx -4 wide").unwrap();
        assert_eq!(line.maybe_param::<u32>(1), None);
        assert_eq!(line.maybe_param::<i32>(1), Some(-4));
        assert_eq!(line.maybe_param::<f32>(2), None);
    }
}
