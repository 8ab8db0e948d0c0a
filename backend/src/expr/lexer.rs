//! Tokenizer for the expression language.
//!
//! Anything outside the token set below is rejected here with
//! [`EvalError::UnsupportedToken`], before parsing starts.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{EvalError, EvalResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(Decimal),
    Str(String),
    /// Bare identifier: field name, keyword-free.
    Ident(String),
    /// Backtick-quoted field name.
    Field(String),
    True,
    False,
    And,
    Or,
    Not,
    In,
    Plus,
    Minus,
    Star,
    Slash,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl Token {
    /// Source-like rendering for error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Str(s) => format!("'{}'", s),
            Token::Ident(s) => s.clone(),
            Token::Field(s) => format!("`{}`", s),
            Token::True => "true".into(),
            Token::False => "false".into(),
            Token::And => "and".into(),
            Token::Or => "or".into(),
            Token::Not => "not".into(),
            Token::In => "in".into(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Star => "*".into(),
            Token::Slash => "/".into(),
            Token::EqEq => "==".into(),
            Token::NotEq => "!=".into(),
            Token::Lt => "<".into(),
            Token::Le => "<=".into(),
            Token::Gt => ">".into(),
            Token::Ge => ">=".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::LBracket => "[".into(),
            Token::RBracket => "]".into(),
            Token::Comma => ",".into(),
        }
    }
}

/// A token and its character offset in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

fn unsupported(token: impl Into<String>, position: usize) -> EvalError {
    EvalError::UnsupportedToken {
        token: token.into(),
        position,
    }
}

/// Statement and binding words of general-purpose scripting languages.
/// A field with one of these names must be written in backticks.
const RESERVED: [&str; 24] = [
    "as", "assert", "class", "def", "del", "elif", "else", "eval", "except", "exec", "for", "from", "global",
    "if", "import", "is", "lambda", "None", "nonlocal", "raise", "return", "try", "while", "yield",
];

fn keyword(word: &str) -> Option<Token> {
    match word {
        "and" => Some(Token::And),
        "or" => Some(Token::Or),
        "not" => Some(Token::Not),
        "in" => Some(Token::In),
        "true" | "True" => Some(Token::True),
        "false" | "False" => Some(Token::False),
        _ => None,
    }
}

/// Split `source` into tokens.
pub fn tokenize(source: &str) -> EvalResult<Vec<Spanned>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let token = match c {
            '0'..='9' => {
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let number = Decimal::from_str(&text).map_err(|_| EvalError::Overflow)?;
                tokens.push(Spanned {
                    token: Token::Number(number),
                    position: start,
                });
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if RESERVED.contains(&word.as_str()) {
                    return Err(unsupported(word, start));
                }
                let token = keyword(&word).unwrap_or(Token::Ident(word));
                tokens.push(Spanned { token, position: start });
                continue;
            }
            '\'' | '"' => {
                let (text, next) = read_quoted(&chars, start)?;
                i = next;
                tokens.push(Spanned {
                    token: Token::Str(text),
                    position: start,
                });
                continue;
            }
            '`' => {
                let end = chars[start + 1..]
                    .iter()
                    .position(|&ch| ch == '`')
                    .map(|offset| start + 1 + offset)
                    .ok_or_else(|| EvalError::Syntax(format!("unterminated field name at position {}", start)))?;
                let name: String = chars[start + 1..end].iter().collect();
                if name.trim().is_empty() {
                    return Err(EvalError::Syntax(format!("empty field name at position {}", start)));
                }
                i = end + 1;
                tokens.push(Spanned {
                    token: Token::Field(name),
                    position: start,
                });
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    return Err(unsupported("**", start));
                }
                Token::Star
            }
            '/' => {
                if chars.get(i + 1) == Some(&'/') {
                    return Err(unsupported("//", start));
                }
                Token::Slash
            }
            '=' => {
                if chars.get(i + 1) != Some(&'=') {
                    return Err(unsupported("=", start));
                }
                i += 1;
                Token::EqEq
            }
            '!' => {
                if chars.get(i + 1) != Some(&'=') {
                    return Err(unsupported("!", start));
                }
                i += 1;
                Token::NotEq
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 1;
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 1;
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            other => return Err(unsupported(other.to_string(), start)),
        };

        i += 1;
        tokens.push(Spanned { token, position: start });
    }

    Ok(tokens)
}

/// Read a single- or double-quoted literal starting at `start`.
/// Returns the unescaped text and the index after the closing quote.
fn read_quoted(chars: &[char], start: usize) -> EvalResult<(String, usize)> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| EvalError::Syntax(format!("unterminated string at position {}", start)))?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => *other,
                });
                i += 2;
            }
            c if c == quote => return Ok((text, i + 1)),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    Err(EvalError::Syntax(format!("unterminated string at position {}", start)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_arithmetic_tokens() {
        assert_eq!(
            kinds("Quantity * 1.5 - 2"),
            vec![
                Token::Ident("Quantity".into()),
                Token::Star,
                Token::Number(Decimal::new(15, 1)),
                Token::Minus,
                Token::Number(Decimal::from(2)),
            ]
        );
    }

    #[test]
    fn test_strings_and_keywords() {
        assert_eq!(
            kinds(r#"Type == 'BUY' or not Side != "it\"s""#),
            vec![
                Token::Ident("Type".into()),
                Token::EqEq,
                Token::Str("BUY".into()),
                Token::Or,
                Token::Not,
                Token::Ident("Side".into()),
                Token::NotEq,
                Token::Str("it\"s".into()),
            ]
        );
    }

    #[test]
    fn test_backtick_field() {
        assert_eq!(
            kinds("`Price per share` >= 10"),
            vec![Token::Field("Price per share".into()), Token::Ge, Token::Number(Decimal::from(10))]
        );
    }

    #[test]
    fn test_rejects_foreign_tokens() {
        for (source, token) in [
            ("a.b", "."),
            ("2 ** 8", "**"),
            ("a = 1", "="),
            ("!a", "!"),
            ("a; b", ";"),
            ("a % 2", "%"),
            ("x // 2", "//"),
            ("{}", "{"),
            ("import os", "import"),
            ("1 if x else 2", "if"),
            ("lambda: 1", "lambda"),
            ("x is None", "is"),
        ] {
            match tokenize(source) {
                Err(EvalError::UnsupportedToken { token: found, .. }) => assert_eq!(found, token, "{}", source),
                other => panic!("{} should be rejected, got {:?}", source, other),
            }
        }
    }

    #[test]
    fn test_reserved_word_in_backticks_is_a_field() {
        assert_eq!(kinds("`from` == 'x'")[0], Token::Field("from".into()));
        assert_eq!(kinds("From")[0], Token::Ident("From".into()));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(tokenize("'abc"), Err(EvalError::Syntax(_))));
        assert!(matches!(tokenize("`abc"), Err(EvalError::Syntax(_))));
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("a  + b").unwrap();
        let positions: Vec<usize> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0, 3, 5]);
    }
}
