//! Tokenizer for textual IR.

use crate::ast::Span;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_till},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace1, one_of},
    combinator::{eof, map, opt, peek, recognize, value},
    multi::many0,
    sequence::{pair, preceded, terminated, tuple},
};

/// Token with source location information
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedToken {
    pub token: Token,
    pub span: Span,
}

impl LocatedToken {
    pub fn new(token: Token, span: Span) -> Self {
        LocatedToken { token, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Struct,
    Subroutine,
    Uniform,
    In,
    Out,
    Shared,
    Global,
    Local,
    Fn,
    Copy,
    Call,
    Indirect,
    If,
    Else,
    Return,
    SubroutineIndex,
    True,
    False,

    // Identifiers and literals
    Identifier(String),
    IntLiteral(i64),
    UIntLiteral(u64),
    FloatLiteral(f32),

    // Operators
    Arrow,
    EqEq,
    NotEq,
    Dot,
    Star,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Colon,
    Comma,

    // Comments (to be skipped)
    Comment,
}

fn parse_comment(input: &str) -> IResult<&str, Token> {
    value(Token::Comment, preceded(tag("//"), take_till(|c| c == '\n')))(input)
}

fn parse_keyword(input: &str) -> IResult<&str, Token> {
    // Helper function to match a keyword with word boundaries
    let keyword = |kw: &'static str, token: Token| {
        map(
            terminated(
                tag(kw),
                peek(alt((eof, recognize(one_of(" \t\n\r()[]{}=!:,.*/"))))),
            ),
            move |_| token.clone(),
        )
    };

    alt((
        alt((
            keyword("struct", Token::Struct),
            keyword("subroutine_index", Token::SubroutineIndex),
            keyword("subroutine", Token::Subroutine),
            keyword("uniform", Token::Uniform),
            keyword("in", Token::In),
            keyword("out", Token::Out),
            keyword("shared", Token::Shared),
            keyword("global", Token::Global),
            keyword("local", Token::Local),
        )),
        alt((
            keyword("fn", Token::Fn),
            keyword("copy", Token::Copy),
            keyword("call", Token::Call),
            keyword("indirect", Token::Indirect),
            keyword("if", Token::If),
            keyword("else", Token::Else),
            keyword("return", Token::Return),
            keyword("true", Token::True),
            keyword("false", Token::False),
        )),
    ))(input)
}

fn parse_identifier(input: &str) -> IResult<&str, Token> {
    map(
        recognize(pair(alt((alpha1, tag("_"))), many0(alt((alphanumeric1, tag("_")))))),
        |s: &str| Token::Identifier(s.to_string()),
    )(input)
}

fn exponent(input: &str) -> IResult<&str, &str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(input)
}

// Either a fraction or an exponent is required, so `3` stays an integer.
fn parse_float_literal(input: &str) -> IResult<&str, Token> {
    map(
        recognize(tuple((
            opt(char('-')),
            digit1,
            alt((recognize(pair(pair(char('.'), digit1), opt(exponent))), exponent)),
        ))),
        |s: &str| Token::FloatLiteral(s.parse().unwrap_or(f32::NAN)),
    )(input)
}

fn parse_int_literal(input: &str) -> IResult<&str, Token> {
    alt((
        map(terminated(digit1, char('u')), |s: &str| {
            Token::UIntLiteral(s.parse().unwrap_or(u64::MAX))
        }),
        map(recognize(pair(opt(char('-')), digit1)), |s: &str| {
            Token::IntLiteral(s.parse().unwrap_or(i64::MAX))
        }),
    ))(input)
}

fn parse_operator(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::Arrow, tag("->")),
        value(Token::EqEq, tag("==")),
        value(Token::NotEq, tag("!=")),
        value(Token::Dot, char('.')),
        value(Token::Star, char('*')),
    ))(input)
}

fn parse_delimiter(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::LeftParen, char('(')),
        value(Token::RightParen, char(')')),
        value(Token::LeftBracket, char('[')),
        value(Token::RightBracket, char(']')),
        value(Token::LeftBrace, char('{')),
        value(Token::RightBrace, char('}')),
        value(Token::Colon, char(':')),
        value(Token::Comma, char(',')),
    ))(input)
}

fn parse_token(input: &str) -> IResult<&str, Token> {
    alt((
        parse_comment,
        parse_keyword,
        parse_float_literal,
        parse_identifier,
        parse_int_literal,
        parse_delimiter,
        parse_operator,
    ))(input)
}

/// After `.` only a member name or a member index may follow, so `s.0.1`
/// must not read `0.1` as a float.
fn parse_member_token(input: &str) -> IResult<&str, Token> {
    alt((parse_identifier, parse_int_literal))(input)
}

pub fn tokenize(input: &str) -> Result<Vec<LocatedToken>, (String, Span)> {
    let mut remaining = input;
    let mut tokens: Vec<LocatedToken> = Vec::new();

    let line_offsets = LineOffsets::new(input);

    while !remaining.is_empty() {
        if let Ok((rest, _)) = multispace1::<&str, nom::error::Error<&str>>(remaining) {
            remaining = rest;
            continue;
        }

        let after_dot = matches!(tokens.last(), Some(LocatedToken { token: Token::Dot, .. }));
        let parsed = if after_dot { parse_member_token(remaining) } else { parse_token(remaining) };
        match parsed {
            Ok((rest, token)) => {
                if token != Token::Comment {
                    let span = calculate_span(input, &line_offsets, remaining, rest);
                    tokens.push(LocatedToken::new(token, span));
                }
                remaining = rest;
            }
            Err(_) => {
                let found = remaining.chars().next().unwrap_or(' ');
                let span = calculate_span(input, &line_offsets, remaining, &remaining[found.len_utf8()..]);
                return Err((format!("Unexpected character '{}'", found), span));
            }
        }
    }

    Ok(tokens)
}

/// Byte offsets where each line starts, for offset-to-line-column conversion.
struct LineOffsets {
    line_starts: Vec<usize>,
}

impl LineOffsets {
    fn new(input: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, ch) in input.char_indices() {
            if ch == '\n' {
                line_starts.push(i + 1);
            }
        }
        LineOffsets { line_starts }
    }

    /// Convert byte offset to (line, column), both 1-indexed.
    fn offset_to_line_col(&self, offset: usize) -> (usize, usize) {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        (line_idx + 1, offset - self.line_starts[line_idx] + 1)
    }
}

fn calculate_span(original: &str, line_offsets: &LineOffsets, before: &str, after: &str) -> Span {
    let start_offset = original.len() - before.len();
    let end_offset = original.len() - after.len();

    let (start_line, start_col) = line_offsets.offset_to_line_col(start_offset);
    let (end_line, end_col) = line_offsets.offset_to_line_col(end_offset);

    Span::new(start_line, start_col, end_line, end_col)
}
