//! Tokenizer for expression text.

use crate::{error::CompileError, value::Value};

use super::CompareOp;

#[derive(Debug, Clone)]
pub(super) struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum TokenKind {
    Name(String),
    Number(Value),
    Str(String),
    Compare(CompareOp),
    And,
    Or,
    Bang,
    Dot,
    Comma,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Name(name) => format!("name `{name}`"),
            TokenKind::Number(value) => format!("number `{value}`"),
            TokenKind::Str(s) => format!("string \"{s}\""),
            TokenKind::Compare(op) => format!("`{}`", op.symbol()),
            TokenKind::And => "`and`".to_string(),
            TokenKind::Or => "`or`".to_string(),
            TokenKind::Bang => "`!`".to_string(),
            TokenKind::Dot => "`.`".to_string(),
            TokenKind::Comma => "`,`".to_string(),
            TokenKind::LParen => "`(`".to_string(),
            TokenKind::RParen => "`)`".to_string(),
            TokenKind::Plus => "`+`".to_string(),
            TokenKind::Minus => "`-`".to_string(),
            TokenKind::Star => "`*`".to_string(),
            TokenKind::Slash => "`/`".to_string(),
        }
    }
}

pub(super) fn tokenize(input: &str) -> Result<Vec<Token>, CompileError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        let kind = match ch {
            '(' => single(&mut chars, TokenKind::LParen),
            ')' => single(&mut chars, TokenKind::RParen),
            '.' => single(&mut chars, TokenKind::Dot),
            ',' => single(&mut chars, TokenKind::Comma),
            '+' => single(&mut chars, TokenKind::Plus),
            '-' => single(&mut chars, TokenKind::Minus),
            '*' => single(&mut chars, TokenKind::Star),
            '/' => single(&mut chars, TokenKind::Slash),
            '!' => {
                chars.next();
                if next_is(&mut chars, '=') {
                    TokenKind::Compare(CompareOp::Ne)
                } else {
                    TokenKind::Bang
                }
            }
            '=' => {
                chars.next();
                if !next_is(&mut chars, '=') {
                    return Err(CompileError::new(
                        input,
                        position,
                        "expected `==`",
                    ));
                }
                TokenKind::Compare(CompareOp::Eq)
            }
            '<' => {
                chars.next();
                if next_is(&mut chars, '=') {
                    TokenKind::Compare(CompareOp::Le)
                } else {
                    TokenKind::Compare(CompareOp::Lt)
                }
            }
            '>' => {
                chars.next();
                if next_is(&mut chars, '=') {
                    TokenKind::Compare(CompareOp::Ge)
                } else {
                    TokenKind::Compare(CompareOp::Gt)
                }
            }
            '"' => {
                chars.next();
                TokenKind::Str(read_string(input, position, &mut chars)?)
            }
            c if c.is_ascii_digit() => {
                read_number(input, position, &mut chars)?
            }
            c if is_name_char(c) => {
                let word = read_word(&mut chars);
                // `not` only exists as the first half of `not in`.
                if let Some(kind) = keyword_or_name(word, &mut tokens) {
                    tokens.push(Token { kind, position });
                }
                continue;
            }
            other => {
                return Err(CompileError::new(
                    input,
                    position,
                    format!("unexpected character `{other}`"),
                ));
            }
        };

        tokens.push(Token { kind, position });
    }

    Ok(tokens)
}

type Chars<'a> = std::iter::Peekable<std::str::CharIndices<'a>>;

fn single(chars: &mut Chars<'_>, kind: TokenKind) -> TokenKind {
    chars.next();
    kind
}

fn next_is(chars: &mut Chars<'_>, expected: char) -> bool {
    if chars.peek().is_some_and(|&(_, c)| c == expected) {
        chars.next();
        true
    } else {
        false
    }
}

fn is_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

fn read_word(chars: &mut Chars<'_>) -> String {
    let mut word = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if !is_name_char(c) {
            break;
        }
        word.push(c);
        chars.next();
    }
    word
}

/// Map reserved words; `in` directly after a `not` name merges into
/// `not in`.
fn keyword_or_name(word: String, tokens: &mut [Token]) -> Option<TokenKind> {
    match word.as_str() {
        "and" => Some(TokenKind::And),
        "or" => Some(TokenKind::Or),
        "in" => {
            if let Some(last) = tokens.last_mut()
                && last.kind == TokenKind::Name("not".to_string())
            {
                last.kind = TokenKind::Compare(CompareOp::NotIn);
                return None;
            }
            Some(TokenKind::Compare(CompareOp::In))
        }
        _ => Some(TokenKind::Name(word)),
    }
}

fn read_string(
    input: &str,
    start: usize,
    chars: &mut Chars<'_>,
) -> Result<String, CompileError> {
    let mut out = String::new();
    while let Some((_, c)) = chars.next() {
        match c {
            '"' => return Ok(out),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, '\'')) => out.push('\''),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => break,
            },
            other => out.push(other),
        }
    }
    Err(CompileError::new(input, start, "unterminated string literal"))
}

fn read_number(
    input: &str,
    start: usize,
    chars: &mut Chars<'_>,
) -> Result<TokenKind, CompileError> {
    let mut end = start;
    let mut seen_dot = false;
    while let Some(&(idx, c)) = chars.peek() {
        if c.is_ascii_digit() {
            end = idx + 1;
            chars.next();
        } else if c == '.' && !seen_dot && digit_follows(input, idx) {
            seen_dot = true;
            end = idx + 1;
            chars.next();
        } else {
            break;
        }
    }

    let text = &input[start..end];
    // Integers beyond i64 degrade to floats rather than failing.
    let value = match text.parse::<i64>() {
        Ok(int) if !seen_dot => Some(Value::Int(int)),
        _ => text.parse::<f64>().map(Value::Float).ok(),
    };
    value.map(TokenKind::Number).ok_or_else(|| {
        CompileError::new(input, start, format!("invalid number `{text}`"))
    })
}

fn digit_follows(input: &str, dot: usize) -> bool {
    input[dot + 1..]
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn attribute_path_and_comparison() {
        assert_eq!(
            kinds("file.ext == \"md\""),
            vec![
                TokenKind::Name("file".into()),
                TokenKind::Dot,
                TokenKind::Name("ext".into()),
                TokenKind::Compare(CompareOp::Eq),
                TokenKind::Str("md".into()),
            ]
        );
    }

    #[test]
    fn oversized_integer_becomes_float() {
        assert_eq!(
            kinds("99999999999999999999"),
            vec![TokenKind::Number(Value::Float(1e20))]
        );
        assert_eq!(
            kinds("9223372036854775807"),
            vec![TokenKind::Number(Value::Int(i64::MAX))]
        );
    }

    #[test]
    fn not_in_is_one_operator() {
        assert_eq!(
            kinds("\"odd\" not in file.tags")[1],
            TokenKind::Compare(CompareOp::NotIn)
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(kinds("2.5"), vec![TokenKind::Number(Value::Float(2.5))]);
        assert_eq!(kinds("42"), vec![TokenKind::Number(Value::Int(42))]);
    }

    #[test]
    fn bang_and_not_equal() {
        assert_eq!(
            kinds("!a != b"),
            vec![
                TokenKind::Bang,
                TokenKind::Name("a".into()),
                TokenKind::Compare(CompareOp::Ne),
                TokenKind::Name("b".into()),
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(kinds(r#""a\nb""#), vec![TokenKind::Str("a\nb".into())]);
    }

    #[test]
    fn unterminated_string_fails() {
        let err = tokenize("\"abc").unwrap_err();
        assert_eq!(err.position, 0);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn single_equals_fails() {
        let err = tokenize("a = b").unwrap_err();
        assert_eq!(err.position, 2);
    }

    #[test]
    fn unknown_character_fails() {
        assert!(tokenize("a ? b").is_err());
    }
}
