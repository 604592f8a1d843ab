use super::SyntaxError;
use ystb_core::expr::unquote_literal;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Int(i128),
    Float(f64),
    Str(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: u32,
}

// Longest first.
const PUNCT: [&str; 29] = [
    "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "==", "!=", "<=", ">=", "(", ")", "[", "]", ",",
    ".", "=", "+", "-", "*", "/", "%", "&", "|", "^", "<", ">",
];

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn err(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            line: self.line,
            message: message.into(),
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('-') if self.rest().starts_with("--") => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return,
            }
        }
    }

    fn number(&mut self) -> Result<Tok, SyntaxError> {
        let start = self.pos;
        if self.rest().starts_with("0x") || self.rest().starts_with("0X") {
            self.pos += 2;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits = &self.src[start + 2..self.pos];
            return i128::from_str_radix(digits, 16)
                .map(Tok::Int)
                .map_err(|_| self.err(format!("bad hex literal `{}`", &self.src[start..self.pos])));
        }
        let mut float = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let bytes = self.src.as_bytes();
        if bytes.get(self.pos) == Some(&b'.') && bytes.get(self.pos + 1).is_some_and(u8::is_ascii_digit) {
            float = true;
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(bytes.get(self.pos), Some(b'e' | b'E')) {
            let mut p = self.pos + 1;
            if matches!(bytes.get(p), Some(b'+' | b'-')) {
                p += 1;
            }
            if bytes.get(p).is_some_and(u8::is_ascii_digit) {
                float = true;
                self.pos = p;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        let text = &self.src[start..self.pos];
        if float {
            text.parse::<f64>()
                .map(Tok::Float)
                .map_err(|_| self.err(format!("bad float literal `{text}`")))
        } else {
            text.parse::<i128>()
                .map(Tok::Int)
                .map_err(|_| self.err(format!("integer literal out of range `{text}`")))
        }
    }

    fn string(&mut self) -> Result<Tok, SyntaxError> {
        let start = self.pos;
        let line = self.line;
        self.bump();
        loop {
            match self.bump() {
                None => {
                    return Err(SyntaxError {
                        line,
                        message: "unterminated string literal".into(),
                    })
                }
                Some('\\') => {
                    match self.bump() {
                        Some('\\' | 'n' | 't' | '"') => {}
                        other => return Err(self.err(format!("unknown escape `\\{}`", other.unwrap_or(' ')))),
                    }
                }
                Some('"') => break,
                Some(_) => {}
            }
        }
        unquote_literal(&self.src[start..self.pos])
            .map(Tok::Str)
            .ok_or_else(|| self.err("bad string literal"))
    }

    fn next_token(&mut self) -> Result<Token, SyntaxError> {
        self.skip_trivia();
        let line = self.line;
        let tok = match self.peek() {
            None => Tok::Eof,
            Some(c) if c.is_ascii_digit() => self.number()?,
            Some('"') => self.string()?,
            Some(c) if c.is_alphabetic() || c == '_' => {
                let start = self.pos;
                while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                    self.bump();
                }
                Tok::Ident(self.src[start..self.pos].to_string())
            }
            Some(c) => {
                let p = PUNCT
                    .iter()
                    .find(|p| self.rest().starts_with(**p))
                    .ok_or_else(|| self.err(format!("unexpected character `{c}`")))?;
                self.pos += p.len();
                Tok::Punct(p)
            }
        };
        Ok(Token { tok, line })
    }
}

/// Split source text into tokens, ending with [`Tok::Eof`].
pub fn tokenize(src: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut lx = Lexer { src, pos: 0, line: 1 };
    let mut out = Vec::new();
    loop {
        let t = lx.next_token()?;
        let eof = t.tok == Tok::Eof;
        out.push(t);
        if eof {
            return Ok(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn numbers() {
        assert_eq!(
            toks("1 2.5 1e20 3e-7 0x1F 9223372036854775808"),
            vec![
                Tok::Int(1),
                Tok::Float(2.5),
                Tok::Float(1e20),
                Tok::Float(3e-7),
                Tok::Int(31),
                Tok::Int(9223372036854775808),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn member_access_is_not_a_float() {
        assert_eq!(
            toks("a.N(1).x"),
            vec![
                Tok::Ident("a".into()),
                Tok::Punct("."),
                Tok::Ident("N".into()),
                Tok::Punct("("),
                Tok::Int(1),
                Tok::Punct(")"),
                Tok::Punct("."),
                Tok::Ident("x".into()),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn comments_and_lines() {
        let t = tokenize("x -- note\n-- whole line\n  y -= 2").unwrap();
        let lines: Vec<u32> = t.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 3, 3, 3, 3]);
        assert_eq!(t[2].tok, Tok::Punct("-="));
    }

    #[test]
    fn strings_unescape() {
        assert_eq!(
            toks(r#""a\"b\\c\n""#),
            vec![Tok::Str("a\"b\\c\n".into()), Tok::Eof]
        );
        assert!(tokenize(r#""\q""#).is_err());
        assert_eq!(tokenize("\n\"open").unwrap_err().line, 2);
    }

    #[test]
    fn unicode_identifiers() {
        assert_eq!(toks("変数"), vec![Tok::Ident("変数".into()), Tok::Eof]);
    }
}
