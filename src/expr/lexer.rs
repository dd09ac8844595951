//! Expression lexer.
//!
//! Tokenizes the closed attribute-expression subset: identifiers (including
//! the `$`-prefixed ambient names), number/string/boolean literals, member
//! access, arithmetic, comparison, logical operators, ternary, assignment,
//! increment/decrement, and the filter pipe.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    // Punctuation / operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    AndAnd,
    OrOr,
    Not,
    Question,
    Colon,
    Dot,
    Comma,
    Assign,
    Pipe,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "{name}"),
            Token::Number(n) => write!(f, "{n}"),
            Token::Str(s) => write!(f, "'{s}'"),
            other => {
                let s = match other {
                    Token::Plus => "+",
                    Token::Minus => "-",
                    Token::Star => "*",
                    Token::Slash => "/",
                    Token::Percent => "%",
                    Token::PlusPlus => "++",
                    Token::MinusMinus => "--",
                    Token::EqEq => "==",
                    Token::NotEq => "!=",
                    Token::Lt => "<",
                    Token::Gt => ">",
                    Token::Le => "<=",
                    Token::Ge => ">=",
                    Token::AndAnd => "&&",
                    Token::OrOr => "||",
                    Token::Not => "!",
                    Token::Question => "?",
                    Token::Colon => ":",
                    Token::Dot => ".",
                    Token::Comma => ",",
                    Token::Assign => "=",
                    Token::Pipe => "|",
                    Token::LParen => "(",
                    Token::RParen => ")",
                    Token::LBracket => "[",
                    Token::RBracket => "]",
                    Token::LBrace => "{",
                    Token::RBrace => "}",
                    _ => unreachable!(),
                };
                write!(f, "{s}")
            }
        }
    }
}

/// Tokenize expression text. Errors are plain messages; the caller wraps
/// them into `EngineError::Expression` with the offending text attached.
pub fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let b = bytes[pos];
        match b {
            b' ' | b'\t' | b'\n' | b'\r' => pos += 1,
            b'0'..=b'9' => {
                let start = pos;
                while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                    pos += 1;
                }
                // A dot only extends the number when a digit follows, so
                // numeric path segments (`items.2.done`) keep their dots.
                if bytes.get(pos) == Some(&b'.')
                    && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)
                {
                    pos += 1;
                    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                        pos += 1;
                    }
                }
                let text = &input[start..pos];
                let number = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number `{text}`"))?;
                tokens.push(Token::Number(number));
            }
            b'\'' | b'"' => {
                let quote = b;
                pos += 1;
                let start = pos;
                while pos < bytes.len() && bytes[pos] != quote {
                    pos += 1;
                }
                if pos >= bytes.len() {
                    return Err("unterminated string literal".to_string());
                }
                tokens.push(Token::Str(input[start..pos].to_string()));
                pos += 1;
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'$' => {
                let start = pos;
                while pos < bytes.len()
                    && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_' || bytes[pos] == b'$')
                {
                    pos += 1;
                }
                tokens.push(Token::Ident(input[start..pos].to_string()));
            }
            b'+' => {
                if bytes.get(pos + 1) == Some(&b'+') {
                    tokens.push(Token::PlusPlus);
                    pos += 2;
                } else {
                    tokens.push(Token::Plus);
                    pos += 1;
                }
            }
            b'-' => {
                if bytes.get(pos + 1) == Some(&b'-') {
                    tokens.push(Token::MinusMinus);
                    pos += 2;
                } else {
                    tokens.push(Token::Minus);
                    pos += 1;
                }
            }
            b'*' => {
                tokens.push(Token::Star);
                pos += 1;
            }
            b'/' => {
                tokens.push(Token::Slash);
                pos += 1;
            }
            b'%' => {
                tokens.push(Token::Percent);
                pos += 1;
            }
            b'=' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(Token::EqEq);
                    pos += 2;
                } else {
                    tokens.push(Token::Assign);
                    pos += 1;
                }
            }
            b'!' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(Token::NotEq);
                    pos += 2;
                } else {
                    tokens.push(Token::Not);
                    pos += 1;
                }
            }
            b'<' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(Token::Le);
                    pos += 2;
                } else {
                    tokens.push(Token::Lt);
                    pos += 1;
                }
            }
            b'>' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(Token::Ge);
                    pos += 2;
                } else {
                    tokens.push(Token::Gt);
                    pos += 1;
                }
            }
            b'&' => {
                if bytes.get(pos + 1) == Some(&b'&') {
                    tokens.push(Token::AndAnd);
                    pos += 2;
                } else {
                    return Err("single `&` is not an operator".to_string());
                }
            }
            b'|' => {
                if bytes.get(pos + 1) == Some(&b'|') {
                    tokens.push(Token::OrOr);
                    pos += 2;
                } else {
                    tokens.push(Token::Pipe);
                    pos += 1;
                }
            }
            b'?' => {
                tokens.push(Token::Question);
                pos += 1;
            }
            b':' => {
                tokens.push(Token::Colon);
                pos += 1;
            }
            b'.' => {
                tokens.push(Token::Dot);
                pos += 1;
            }
            b',' => {
                tokens.push(Token::Comma);
                pos += 1;
            }
            b'(' => {
                tokens.push(Token::LParen);
                pos += 1;
            }
            b')' => {
                tokens.push(Token::RParen);
                pos += 1;
            }
            b'[' => {
                tokens.push(Token::LBracket);
                pos += 1;
            }
            b']' => {
                tokens.push(Token::RBracket);
                pos += 1;
            }
            b'{' => {
                tokens.push(Token::LBrace);
                pos += 1;
            }
            b'}' => {
                tokens.push(Token::RBrace);
                pos += 1;
            }
            other => {
                return Err(format!("unexpected character `{}`", other as char));
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_basic() {
        let tokens = tokenize("a + b * 2").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".into()),
                Token::Plus,
                Token::Ident("b".into()),
                Token::Star,
                Token::Number(2.0),
            ]
        );
    }

    #[test]
    fn test_tokenize_pipe_vs_or() {
        assert_eq!(
            tokenize("a | b").unwrap(),
            vec![Token::Ident("a".into()), Token::Pipe, Token::Ident("b".into())]
        );
        assert_eq!(
            tokenize("a || b").unwrap(),
            vec![Token::Ident("a".into()), Token::OrOr, Token::Ident("b".into())]
        );
    }

    #[test]
    fn test_tokenize_increment_and_ambient() {
        let tokens = tokenize("$index++").unwrap();
        assert_eq!(
            tokens,
            vec![Token::Ident("$index".into()), Token::PlusPlus]
        );
    }

    #[test]
    fn test_tokenize_rejects_garbage() {
        assert!(tokenize("a @ b").is_err());
        assert!(tokenize("'open").is_err());
    }
}
