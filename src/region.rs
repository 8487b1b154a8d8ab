use crate::evaluate::{self, Scope};
use crate::parse::{self, PromptError};
use crate::types::{RegionTrace, RuleFile, TagSequence, Trace, Transformation};

/// The positive and negative sequences of one region, mutated in place over
/// a full rule-tree evaluation.
#[derive(Debug, Clone, Default)]
pub struct PromptState {
    pub positive: TagSequence,
    pub negative: TagSequence,
}

/// Region break marker. Only a standalone word counts; `BREAKFAST` or
/// `daybreak` never split a prompt.
pub(crate) const REGION_BREAK: &str = "BREAK";

/// Split a raw prompt into region segments on standalone `BREAK` words.
pub(crate) fn split_regions(prompt: &str) -> Vec<&str> {
    let mut regions = Vec::new();
    let mut start = 0;
    let mut search = 0;
    while let Some(found) = prompt[search..].find(REGION_BREAK) {
        let at = search + found;
        let end = at + REGION_BREAK.len();
        if is_word_boundary(prompt, at, end) {
            regions.push(&prompt[start..at]);
            start = end;
        }
        search = end;
    }
    regions.push(&prompt[start..]);
    regions
}

fn is_word_boundary(prompt: &str, at: usize, end: usize) -> bool {
    let before = prompt[..at].chars().next_back();
    let after = prompt[end..].chars().next();
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    !before.is_some_and(is_word) && !after.is_some_and(is_word)
}

/// Evaluate a prompt pair against a rule file list, region by region.
///
/// The first region is the parent; later regions evaluate with read-only
/// fallback to its sequences. When the positive and negative prompts have a
/// different number of regions, the shorter side's missing regions are empty.
pub(crate) fn transform(
    files: &[RuleFile],
    positive: &str,
    negative: &str,
) -> Result<Transformation, PromptError> {
    let positives = split_regions(positive);
    let negatives = split_regions(negative);
    let count = positives.len().max(negatives.len());

    let mut states = Vec::with_capacity(count);
    for index in 0..count {
        states.push(PromptState {
            positive: parse::tokenize(positives.get(index).copied().unwrap_or_default())?,
            negative: parse::tokenize(negatives.get(index).copied().unwrap_or_default())?,
        });
    }

    let mut regions = Vec::with_capacity(count);
    let (head, tail) = states.split_at_mut(1);
    regions.push(RegionTrace {
        region: 0,
        rules: evaluate::run_files(files, &mut Scope {
            state: &mut head[0],
            parent: None,
        }),
    });
    for (offset, state) in tail.iter_mut().enumerate() {
        regions.push(RegionTrace {
            region: offset + 1,
            rules: evaluate::run_files(files, &mut Scope {
                state,
                parent: Some(&head[0]),
            }),
        });
    }

    let join = |pick: fn(&PromptState) -> &TagSequence| {
        states
            .iter()
            .map(|s| pick(s).to_string())
            .collect::<Vec<_>>()
            .join("\nBREAK\n")
    };
    Ok(Transformation {
        positive: join(|s| &s.positive),
        negative: join(|s| &s.negative),
        trace: Trace { regions },
    })
}
