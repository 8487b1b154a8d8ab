use winnow::combinator::{alt, preceded};
use winnow::error::ModalResult;
use winnow::prelude::*;
use winnow::token::{any, take_while};

/// Lexical tokens of the prompt syntax. The tokenizer folds these into tags;
/// the lexer itself never fails on non-empty input (any unclassified
/// character becomes text).
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum RawToken<'i> {
    Open,
    Close,
    Separator,
    /// The raw character run after a `:`, digits/dots/spaces. The fold
    /// decides whether it is a weight or malformed.
    Weight(&'i str),
    Text(&'i str),
}

fn escaped<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    ('\\', any).take().parse_next(input)
}

fn weight_run<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    preceded(
        ':',
        take_while(1.., |c: char| {
            c.is_ascii_digit() || c == '.' || c == ' ' || c == '\t'
        }),
    )
    .parse_next(input)
}

fn text_run<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(1.., |c: char| {
        !matches!(c, '(' | ')' | ',' | '\n' | ':' | '\\')
    })
    .parse_next(input)
}

pub(crate) fn token<'i>(input: &mut &'i str) -> ModalResult<RawToken<'i>> {
    alt((
        escaped.map(RawToken::Text),
        '('.value(RawToken::Open),
        ')'.value(RawToken::Close),
        alt((',', '\n')).value(RawToken::Separator),
        weight_run.map(RawToken::Weight),
        text_run.map(RawToken::Text),
        // Lone ':' (no numeric run) or a trailing '\' stay literal.
        any.take().map(RawToken::Text),
    ))
    .parse_next(input)
}
