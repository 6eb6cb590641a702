//! Token stream for brace structured text files such as the terrain form descriptor.

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Identifier(String),
    /// Unsigned integer, decimal or `0x` hexadecimal.
    Integer(u64),
    Float(f32),
    String(String),
    Symbol(char),
    Eof,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Identifier(s) => write!(f, "identifier \"{s}\""),
            Token::Integer(v) => write!(f, "integer {v}"),
            Token::Float(v) => write!(f, "number {v}"),
            Token::String(s) => write!(f, "string \"{s}\""),
            Token::Symbol(c) => write!(f, "'{c}'"),
            Token::Eof => write!(f, "end of file"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct TokenError {
    pub line: usize,
    pub message: String,
}

pub struct Tokenizer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    current: Token,
    current_line: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(text: &'a str) -> Result<Self, TokenError> {
        let mut tokenizer = Self {
            chars: text.chars().peekable(),
            line: 1,
            current: Token::Eof,
            current_line: 1,
        };
        tokenizer.next()?;
        Ok(tokenizer)
    }

    #[inline]
    pub fn current(&self) -> &Token {
        &self.current
    }

    /// Line of the current token.
    #[inline]
    pub fn line(&self) -> usize {
        self.current_line
    }

    pub fn is_eof(&self) -> bool {
        self.current == Token::Eof
    }

    pub fn is_symbol(&self, symbol: char) -> bool {
        self.current == Token::Symbol(symbol)
    }

    pub fn error(&self, message: impl Into<String>) -> TokenError {
        TokenError {
            line: self.current_line,
            message: message.into(),
        }
    }

    fn unexpected(&self, expected: &str) -> TokenError {
        self.error(format!("expected {expected}, found {}", self.current))
    }

    /// Advance to the next token.
    pub fn next(&mut self) -> Result<(), TokenError> {
        self.skip_whitespace_and_comments();
        self.current_line = self.line;

        let Some(&ch) = self.chars.peek() else {
            self.current = Token::Eof;
            return Ok(());
        };

        self.current = match ch {
            '"' => {
                self.chars.next();
                let mut s = String::new();
                loop {
                    match self.chars.next() {
                        Some('"') => break,
                        Some('\n') | None => {
                            return Err(self.error("unterminated string"));
                        }
                        Some(c) => s.push(c),
                    }
                }
                Token::String(s)
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number()?,
            c if c.is_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&c) = self.chars.peek() {
                    if !(c.is_alphanumeric() || c == '_') {
                        break;
                    }
                    s.push(c);
                    self.chars.next();
                }
                Token::Identifier(s)
            }
            c => {
                self.chars.next();
                Token::Symbol(c)
            }
        };

        Ok(())
    }

    fn number(&mut self) -> Result<Token, TokenError> {
        let mut s = String::new();
        while let Some(&c) = self.chars.peek() {
            if !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+')) {
                break;
            }
            // A sign is only part of the number at the start or after an exponent.
            if matches!(c, '-' | '+')
                && !(s.is_empty() || s.ends_with('e') || s.ends_with('E'))
                || matches!(c, '-' | '+') && s.starts_with("0x")
            {
                break;
            }
            s.push(c);
            self.chars.next();
        }

        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u64::from_str_radix(hex, 16)
                .map(Token::Integer)
                .map_err(|_| self.error(format!("invalid hexadecimal number \"{s}\"")));
        }
        if let Ok(value) = s.parse::<u64>() {
            return Ok(Token::Integer(value));
        }
        s.parse::<f32>()
            .map(Token::Float)
            .map_err(|_| self.error(format!("invalid number \"{s}\"")))
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.chars.peek() {
                Some('\n') => {
                    self.line += 1;
                    self.chars.next();
                }
                Some(c) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some(';') => self.skip_line(),
                Some('/') => {
                    let mut lookahead = self.chars.clone();
                    lookahead.next();
                    if lookahead.peek() == Some(&'/') {
                        self.skip_line();
                    } else {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                return;
            }
            self.chars.next();
        }
    }

    pub fn expect_identifier(&mut self, name: &str) -> Result<(), TokenError> {
        match &self.current {
            Token::Identifier(s) if s == name => self.next(),
            _ => Err(self.unexpected(&format!("\"{name}\""))),
        }
    }

    pub fn expect_symbol(&mut self, symbol: char) -> Result<(), TokenError> {
        if self.is_symbol(symbol) {
            self.next()
        } else {
            Err(self.unexpected(&format!("'{symbol}'")))
        }
    }

    pub fn take_identifier(&mut self) -> Result<String, TokenError> {
        match &self.current {
            Token::Identifier(s) => {
                let s = s.clone();
                self.next()?;
                Ok(s)
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    pub fn take_string(&mut self) -> Result<String, TokenError> {
        match &self.current {
            Token::String(s) => {
                let s = s.clone();
                self.next()?;
                Ok(s)
            }
            _ => Err(self.unexpected("a quoted string")),
        }
    }

    pub fn take_u32(&mut self) -> Result<u32, TokenError> {
        match self.current {
            Token::Integer(v) => {
                let v = u32::try_from(v)
                    .map_err(|_| self.error(format!("{v} does not fit in 32 bits")))?;
                self.next()?;
                Ok(v)
            }
            _ => Err(self.unexpected("an unsigned integer")),
        }
    }

    pub fn take_u8(&mut self) -> Result<u8, TokenError> {
        match self.current {
            Token::Integer(v) => {
                let v = u8::try_from(v).map_err(|_| self.error(format!("{v} is not in 0..=255")))?;
                self.next()?;
                Ok(v)
            }
            _ => Err(self.unexpected("a value in 0..=255")),
        }
    }

    pub fn take_f32(&mut self) -> Result<f32, TokenError> {
        let value = match self.current {
            Token::Float(v) => v,
            Token::Integer(v) => v as f32,
            _ => return Err(self.unexpected("a number")),
        };
        self.next()?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<Token> {
        let mut tokenizer = Tokenizer::new(text).unwrap();
        let mut result = vec![];
        while !tokenizer.is_eof() {
            result.push(tokenizer.current().clone());
            tokenizer.next().unwrap();
        }
        result
    }

    #[test]
    fn basic() {
        assert_eq!(
            tokens("TerrainForms 1\n0xFF00FF00 simple { \"grass.jpg\" TexScale=-2.5 }"),
            vec![
                Token::Identifier("TerrainForms".into()),
                Token::Integer(1),
                Token::Integer(0xFF00FF00),
                Token::Identifier("simple".into()),
                Token::Symbol('{'),
                Token::String("grass.jpg".into()),
                Token::Identifier("TexScale".into()),
                Token::Symbol('='),
                Token::Float(-2.5),
                Token::Symbol('}'),
            ]
        );
    }

    #[test]
    fn comments_and_line_numbers() {
        let mut tokenizer = Tokenizer::new("; header\n// second\n\n  value").unwrap();
        assert_eq!(tokenizer.current(), &Token::Identifier("value".into()));
        assert_eq!(tokenizer.line(), 4);
        tokenizer.next().unwrap();
        assert!(tokenizer.is_eof());
    }

    #[test]
    fn unterminated_string() {
        let err = Tokenizer::new("\n\"abc\n").err().unwrap();
        assert_eq!(err.line, 2);
    }
}
