use std::fmt;

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, satisfy},
    combinator::{map, map_res, recognize, value},
    error::{ErrorKind, ParseError, VerboseError},
    multi::many0,
    sequence::{pair, preceded, tuple},
};
use strum_macros::{AsRefStr, Display, EnumString};

use super::{LangError, LangResult};

pub type ParserResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Integer(i64),
    Float(f64),
    Str(String),
    Identifier(String),
    Keyword(Keyword),
    Operator(Operator),
    Delimiter(Delimiter),
    Newline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
pub enum Keyword {
    #[strum(serialize = "if")]
    If,
    #[strum(serialize = "elif")]
    Elif,
    #[strum(serialize = "else")]
    Else,
    #[strum(serialize = "while")]
    While,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "true", serialize = "True")]
    True,
    #[strum(serialize = "false", serialize = "False")]
    False,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
pub enum Operator {
    #[strum(serialize = "==")]
    EqualEqual,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = "<=")]
    LessEqual,
    #[strum(serialize = ">=")]
    GreaterEqual,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = "+=")]
    PlusAssign,
    #[strum(serialize = "-=")]
    MinusAssign,
    #[strum(serialize = "*=")]
    MultiplyAssign,
    #[strum(serialize = "/=")]
    DivideAssign,
    #[strum(serialize = "//")]
    FloorDivide,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulo,
    #[strum(serialize = "=")]
    Assign,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
    #[strum(serialize = "!")]
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    Comma,
    Semicolon,
}

impl Delimiter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Delimiter::OpenParen => "(",
            Delimiter::CloseParen => ")",
            Delimiter::OpenBrace => "{",
            Delimiter::CloseBrace => "}",
            Delimiter::Comma => ",",
            Delimiter::Semicolon => ";",
        }
    }
}

// strum の Display は波括弧をフォーマット文字列として扱うため手書き
impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenSpan {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    current_line: usize,
    current_column: usize,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            current_line: 1,   // 1-based
            current_column: 1, // 1-based
        }
    }

    #[tracing::instrument(level = "trace", skip(input))]
    pub fn tokenize(&mut self, input: &str) -> LangResult<Vec<TokenSpan>> {
        let mut tokens = Vec::new();
        let mut remaining = input;

        while !remaining.is_empty() {
            // 空白とコメントはトークンにしない
            if let Ok((rest, skipped)) = parse_trivia(remaining) {
                if !skipped.is_empty() {
                    self.update_position(skipped);
                    remaining = rest;
                    continue;
                }
            }

            let line = self.current_line;
            let column = self.current_column;

            let result = alt((
                parse_newline,
                parse_string,
                parse_number,
                parse_operator,
                parse_delimiter,
                parse_word,
            ))(remaining);

            match result {
                Ok((rest, token)) => {
                    let consumed = &remaining[..remaining.len() - rest.len()];
                    self.update_position(consumed);
                    tokens.push(TokenSpan {
                        token,
                        line,
                        column,
                    });
                    remaining = rest;
                }
                Err(_) => {
                    let message = match remaining.chars().next() {
                        Some('"') | Some('\'') => "unterminated string literal".to_string(),
                        Some(c) if c.is_ascii_digit() => "invalid number literal".to_string(),
                        Some(c) => format!("unexpected character {:?}", c),
                        None => "unexpected end of input".to_string(),
                    };
                    return Err(LangError::Tokenize {
                        message,
                        line,
                        column,
                    });
                }
            }
        }

        Ok(tokens)
    }

    fn update_position(&mut self, text: &str) {
        for c in text.chars() {
            if c == '\n' {
                self.current_line += 1;
                self.current_column = 1;
            } else {
                self.current_column += 1;
            }
        }
    }
}

fn parse_trivia(input: &str) -> ParserResult<&str> {
    recognize(many0(alt((
        take_while1(|c: char| c == ' ' || c == '\t' || c == '\r'),
        recognize(preceded(char('#'), take_while(|c: char| c != '\n'))),
    ))))(input)
}

fn parse_newline(input: &str) -> ParserResult<Token> {
    value(Token::Newline, char('\n'))(input)
}

fn parse_string(input: &str) -> ParserResult<Token> {
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, c)) if c == '"' || c == '\'' => c,
        _ => {
            return Err(nom::Err::Error(VerboseError::from_error_kind(
                input,
                ErrorKind::Char,
            )));
        }
    };

    let mut content = String::new();
    let mut escaped = false;
    for (i, c) in chars {
        if escaped {
            content.push(match c {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                other => other,
            });
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok((&input[i + c.len_utf8()..], Token::Str(content)));
        } else if c == '\n' {
            break;
        } else {
            content.push(c);
        }
    }

    Err(nom::Err::Failure(VerboseError::from_error_kind(
        input,
        ErrorKind::Escaped,
    )))
}

fn parse_number(input: &str) -> ParserResult<Token> {
    alt((
        map_res(recognize(tuple((digit1, char('.'), digit1))), |s: &str| {
            s.parse::<f64>().map(Token::Float)
        }),
        map_res(digit1, |s: &str| s.parse::<i64>().map(Token::Integer)),
    ))(input)
}

fn parse_operator(input: &str) -> ParserResult<Token> {
    map(
        alt((
            alt((
                value(Operator::EqualEqual, tag("==")),
                value(Operator::NotEqual, tag("!=")),
                value(Operator::LessEqual, tag("<=")),
                value(Operator::GreaterEqual, tag(">=")),
                value(Operator::PlusAssign, tag("+=")),
                value(Operator::MinusAssign, tag("-=")),
                value(Operator::MultiplyAssign, tag("*=")),
                value(Operator::DivideAssign, tag("/=")),
                value(Operator::FloorDivide, tag("//")),
                value(Operator::And, tag("&&")),
                value(Operator::Or, tag("||")),
            )),
            alt((
                value(Operator::Less, tag("<")),
                value(Operator::Greater, tag(">")),
                value(Operator::Plus, tag("+")),
                value(Operator::Minus, tag("-")),
                value(Operator::Multiply, tag("*")),
                value(Operator::Divide, tag("/")),
                value(Operator::Modulo, tag("%")),
                value(Operator::Assign, tag("=")),
                value(Operator::Not, tag("!")),
            )),
        )),
        Token::Operator,
    )(input)
}

fn parse_delimiter(input: &str) -> ParserResult<Token> {
    map(
        alt((
            value(Delimiter::OpenParen, char('(')),
            value(Delimiter::CloseParen, char(')')),
            value(Delimiter::OpenBrace, char('{')),
            value(Delimiter::CloseBrace, char('}')),
            value(Delimiter::Comma, char(',')),
            value(Delimiter::Semicolon, char(';')),
        )),
        Token::Delimiter,
    )(input)
}

fn parse_name_segment(input: &str) -> ParserResult<&str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

/// Identifiers, including dotted module-style names such as
/// `random.randint`, and keywords.
fn parse_word(input: &str) -> ParserResult<Token> {
    map(
        recognize(pair(
            parse_name_segment,
            many0(preceded(char('.'), parse_name_segment)),
        )),
        |word: &str| match word.parse::<Keyword>() {
            Ok(keyword) => Token::Keyword(keyword),
            Err(_) => Token::Identifier(word.to_string()),
        },
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(input: &str) -> Vec<Token> {
        Tokenizer::new()
            .tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_tokenize_assignment() {
        assert_eq!(
            tokens("count += 1 # bump\n"),
            vec![
                Token::Identifier("count".to_string()),
                Token::Operator(Operator::PlusAssign),
                Token::Integer(1),
                Token::Newline,
            ]
        );
    }

    #[test]
    fn test_tokenize_literals_and_keywords() {
        assert_eq!(
            tokens("3.5 'a\\nb' \"x\" True and not"),
            vec![
                Token::Float(3.5),
                Token::Str("a\nb".to_string()),
                Token::Str("x".to_string()),
                Token::Keyword(Keyword::True),
                Token::Keyword(Keyword::And),
                Token::Keyword(Keyword::Not),
            ]
        );
    }

    #[test]
    fn test_tokenize_dotted_call() {
        assert_eq!(
            tokens("random.randint(1,6)"),
            vec![
                Token::Identifier("random.randint".to_string()),
                Token::Delimiter(Delimiter::OpenParen),
                Token::Integer(1),
                Token::Delimiter(Delimiter::Comma),
                Token::Integer(6),
                Token::Delimiter(Delimiter::CloseParen),
            ]
        );
    }

    #[test]
    fn test_delimiter_display() {
        assert_eq!(Delimiter::OpenBrace.to_string(), "{");
        assert_eq!(Delimiter::CloseBrace.to_string(), "}");
        assert_eq!(format!("`{}`", Delimiter::CloseParen), "`)`");
    }

    #[test]
    fn test_longest_operator_match() {
        assert_eq!(
            tokens("a // b <= c == d"),
            vec![
                Token::Identifier("a".to_string()),
                Token::Operator(Operator::FloorDivide),
                Token::Identifier("b".to_string()),
                Token::Operator(Operator::LessEqual),
                Token::Identifier("c".to_string()),
                Token::Operator(Operator::EqualEqual),
                Token::Identifier("d".to_string()),
            ]
        );
    }

    #[test]
    fn test_positions() {
        let spans = Tokenizer::new().tokenize("a = 1\n  b = 2").unwrap();
        let b = spans
            .iter()
            .find(|s| s.token == Token::Identifier("b".to_string()))
            .unwrap();
        assert_eq!((b.line, b.column), (2, 3));
    }

    #[test]
    fn test_tokenize_errors() {
        let err = Tokenizer::new().tokenize("x = 'open").unwrap_err();
        assert_eq!(
            err,
            LangError::Tokenize {
                message: "unterminated string literal".to_string(),
                line: 1,
                column: 5,
            }
        );
        let err = Tokenizer::new().tokenize("x = @").unwrap_err();
        assert!(matches!(err, LangError::Tokenize { column: 5, .. }));
        let err = Tokenizer::new().tokenize("99999999999999999999").unwrap_err();
        assert!(matches!(err, LangError::Tokenize { ref message, .. } if message == "invalid number literal"));
    }
}
