use winnow::Parser;

use super::error::PromptError;
use super::grammar::{self, RawToken};
use crate::types::TagSequence;

/// Weight multiplier contributed by each level of emphasis parentheses.
pub(crate) const EMPHASIS: f64 = 1.1;

/// One emphasis level. `default` is the weight restored when a separator or
/// explicit weight starts a sibling level; `weight` is the current value,
/// possibly replaced by an explicit `:number`.
struct Group {
    default: f64,
    weight: f64,
    parent: Option<usize>,
}

fn weight_of(groups: &[Group], mut index: usize) -> f64 {
    let mut product = groups[index].weight;
    while let Some(parent) = groups[index].parent {
        index = parent;
        product *= groups[index].weight;
    }
    product
}

fn push_sibling(groups: &mut Vec<Group>, current: usize) -> usize {
    let default = groups[current].default;
    let parent = groups[current].parent;
    groups.push(Group {
        default,
        weight: default,
        parent,
    });
    groups.len() - 1
}

/// Parse a raw prompt string into a [`TagSequence`].
///
/// Tags are comma/newline separated; each `(` level multiplies the enclosed
/// weight by [`EMPHASIS`]; `:number` replaces the innermost level's weight
/// while enclosing levels still multiply it. A tag spanning several levels
/// takes the strongest span weight. Duplicate names merge immediately
/// (strongest weight, first position) and blank tags are dropped.
pub(crate) fn tokenize(input: &str) -> Result<TagSequence, PromptError> {
    let mut groups = vec![Group {
        default: 1.0,
        weight: 1.0,
        parent: None,
    }];
    let mut current = 0;
    let mut opens: Vec<usize> = Vec::new();
    let mut pieces: Vec<(String, usize)> = vec![(String::new(), current)];
    let mut sequence = TagSequence::new();

    let mut rest = input;
    while !rest.is_empty() {
        let offset = input.len() - rest.len();
        let Ok(token) = grammar::token.parse_next(&mut rest) else {
            break;
        };
        match token {
            RawToken::Open => {
                groups.push(Group {
                    default: EMPHASIS,
                    weight: EMPHASIS,
                    parent: Some(current),
                });
                current = groups.len() - 1;
                opens.push(offset);
                pieces.push((String::new(), current));
            }
            RawToken::Close => match groups[current].parent {
                Some(parent) => {
                    opens.pop();
                    current = parent;
                    pieces.push((String::new(), current));
                }
                None => return Err(PromptError::UnbalancedParens { offset }),
            },
            RawToken::Separator => {
                finish_tag(&mut sequence, std::mem::take(&mut pieces), &groups);
                current = push_sibling(&mut groups, current);
                pieces.push((String::new(), current));
            }
            RawToken::Weight(run) => {
                let trimmed = run.trim();
                if trimmed.is_empty() {
                    // ':' followed by nothing numeric stays literal.
                    if let Some((piece, _)) = pieces.last_mut() {
                        piece.push(':');
                        piece.push_str(run);
                    }
                } else {
                    let value: f64 =
                        trimmed.parse().map_err(|_| PromptError::MalformedWeight {
                            token: trimmed.to_owned(),
                            offset,
                        })?;
                    groups[current].weight = value;
                    current = push_sibling(&mut groups, current);
                    // Whitespace after the number is tag text, not part of
                    // the weight: `(a:1.3 b)` names the tag `a b`.
                    let tail = &run[run.trim_end().len()..];
                    pieces.push((tail.to_owned(), current));
                }
            }
            RawToken::Text(text) => {
                if let Some((piece, _)) = pieces.last_mut() {
                    piece.push_str(text);
                }
            }
        }
    }

    if let Some(offset) = opens.first().copied() {
        return Err(PromptError::UnbalancedParens { offset });
    }
    finish_tag(&mut sequence, pieces, &groups);
    Ok(sequence)
}

/// Clean accumulated pieces into one tag and merge it into the sequence.
/// Blank tags vanish; whitespace around level boundaries collapses to a
/// single space.
fn finish_tag(sequence: &mut TagSequence, mut pieces: Vec<(String, usize)>, groups: &[Group]) {
    while let Some((text, _)) = pieces.first() {
        if text.trim().is_empty() {
            pieces.remove(0);
        } else {
            break;
        }
    }
    if pieces.is_empty() {
        return;
    }

    let mut index = 1;
    while index < pieces.len() {
        if pieces[index].0.is_empty() {
            pieces.remove(index);
        } else if pieces[index].0.trim().is_empty() {
            let merged = format!("{} ", pieces[index - 1].0.trim_end());
            pieces[index - 1].0 = merged;
            pieces.remove(index);
        } else if pieces[index].0.starts_with(char::is_whitespace) {
            let merged = format!("{} ", pieces[index - 1].0.trim_end());
            pieces[index - 1].0 = merged;
            pieces[index].0 = pieces[index].0.trim_start().to_owned();
            index += 1;
        } else {
            index += 1;
        }
    }

    pieces[0].0 = pieces[0].0.trim_start().to_owned();
    let last = pieces.len() - 1;
    pieces[last].0 = pieces[last].0.trim_end().to_owned();

    let name: String = pieces.iter().map(|(text, _)| text.as_str()).collect();
    let weight = pieces
        .iter()
        .map(|(_, group)| weight_of(groups, *group))
        .fold(f64::NEG_INFINITY, f64::max);
    sequence.merge(name, weight);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(input: &str) -> String {
        tokenize(input).unwrap().to_string()
    }

    #[test]
    fn plain_tags() {
        assert_eq!(render("celica, smile"), "celica, smile");
    }

    #[test]
    fn emphasis_multiplies() {
        assert_eq!(render("(celica)"), "celica:1.1");
        assert_eq!(render("((celica))"), "celica:1.21");
    }

    #[test]
    fn explicit_weight_is_absolute_for_its_level() {
        assert_eq!(render("celica:1.2"), "celica:1.2");
        assert_eq!(render("(celica:1.2)"), "celica:1.2");
    }

    #[test]
    fn enclosing_parens_multiply_explicit_weight() {
        assert_eq!(render("((celica:1.2))"), "celica:1.32");
    }

    #[test]
    fn separator_resets_group_weight() {
        assert_eq!(render("(a:1.5, b)"), "a:1.5, b:1.1");
        assert_eq!(render("a:2, b"), "a:2, b");
    }

    #[test]
    fn weight_applies_to_text_before_the_colon() {
        assert_eq!(render("black hair:1.3"), "black hair:1.3");
        assert_eq!(render("(a:1.3 b)"), "a b:1.3");
    }

    #[test]
    fn text_after_a_weight_keeps_its_separating_space() {
        assert_eq!(render("black:1.2 hair"), "black hair:1.2");
        assert_eq!(render("a: 1.5 b"), "a b:1.5");
        assert_eq!(render("a:1.5 , b"), "a:1.5, b");
    }

    #[test]
    fn partial_emphasis_takes_strongest_span() {
        assert_eq!(render("black (hair)"), "black hair:1.1");
        assert_eq!(render("(black) hair"), "black hair:1.1");
    }

    #[test]
    fn duplicates_merge_strongest_weight_first_position() {
        assert_eq!(render("a, b, (a)"), "a:1.1, b");
        assert_eq!(render("(a), a"), "a:1.1");
    }

    #[test]
    fn blank_tags_are_dropped() {
        assert_eq!(render("a,, ,b"), "a, b");
        assert_eq!(render(""), "");
        assert_eq!(render(" , "), "");
    }

    #[test]
    fn newline_separates_tags() {
        assert_eq!(render("a\nb"), "a, b");
    }

    #[test]
    fn colon_without_number_stays_literal() {
        assert_eq!(render("art:style"), "art:style");
    }

    #[test]
    fn escaped_parens_stay_literal() {
        assert_eq!(render(r"smile \(happy\)"), r"smile \(happy\)");
    }

    #[test]
    fn unbalanced_open_is_an_error() {
        assert_eq!(
            tokenize("a, (b"),
            Err(PromptError::UnbalancedParens { offset: 3 })
        );
    }

    #[test]
    fn unbalanced_close_is_an_error() {
        assert_eq!(
            tokenize("a)"),
            Err(PromptError::UnbalancedParens { offset: 1 })
        );
    }

    #[test]
    fn malformed_weight_is_an_error() {
        assert_eq!(
            tokenize("a:1.2.3"),
            Err(PromptError::MalformedWeight {
                token: "1.2.3".into(),
                offset: 1,
            })
        );
    }

    #[test]
    fn serialization_round_trips() {
        for input in ["celica:1.2, blue eyes:1.32", "a, b:1.1, c:0.85"] {
            let once = render(input);
            assert_eq!(render(&once), once);
        }
    }
}
