use std::fmt;

use serde::Serialize;

/// One tag to add, with an optional explicit weight.
///
/// `weight` is `None` when the rule author wrote a bare name; the mutation
/// engine treats that as 1.0 before anchor-weight propagation.
#[derive(Debug, Clone, PartialEq)]
pub struct TagSpec {
    pub name: String,
    pub weight: Option<f64>,
}

/// Conditions gating a rule. Empty lists are vacuously true; a rule fires
/// only if every present kind passes. Evaluated strictly against the
/// positive prompt's tag names; removed tags still count as present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    pub any_of: Vec<String>,
    pub all_of: Vec<String>,
    pub none_of: Vec<String>,
}

impl Conditions {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.any_of.is_empty() && self.all_of.is_empty() && self.none_of.is_empty()
    }
}

/// Anchor candidate lists for the positive and negative sequences.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Anchors {
    pub anchor: Vec<String>,
    pub anchor_negative: Vec<String>,
}

/// Mutations carried by a tag rule. Removals apply before additions, so a
/// rule can replace a tag by its own name in one step.
#[derive(Debug, Clone, Default)]
pub struct TagActions {
    pub add: Vec<TagSpec>,
    pub add_negative: Vec<TagSpec>,
    pub remove: Vec<String>,
    pub remove_negative: Vec<String>,
}

/// One rule node: shared base fields plus a variant payload.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: Option<String>,
    pub conditions: Conditions,
    pub anchors: Anchors,
    pub kind: RuleKind,
}

/// The closed set of rule variants.
#[derive(Debug, Clone)]
pub enum RuleKind {
    /// Leaf rule applying add/remove mutations.
    Tag(TagActions),
    /// Structural rule running every child whose conditions match.
    Group { children: Vec<Rule> },
    /// Structural rule running the first child whose conditions match, or the
    /// default child when none do.
    Switch {
        children: Vec<Rule>,
        default: Option<usize>,
    },
}

impl RuleKind {
    #[must_use]
    pub fn variant(&self) -> RuleVariant {
        match self {
            RuleKind::Tag(_) => RuleVariant::Tag,
            RuleKind::Group { .. } => RuleVariant::Group,
            RuleKind::Switch { .. } => RuleVariant::Switch,
        }
    }
}

/// Variant discriminant, used in traces and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleVariant {
    Tag,
    Group,
    Switch,
}

impl fmt::Display for RuleVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleVariant::Tag => f.write_str("tag"),
            RuleVariant::Group => f.write_str("group"),
            RuleVariant::Switch => f.write_str("switch"),
        }
    }
}

/// A validated rule file: its sort key (file name) and top-level rules.
///
/// Global evaluation order is files sorted by name, then rules top to bottom,
/// then children depth-first.
#[derive(Debug, Clone)]
pub struct RuleFile {
    pub name: String,
    pub rules: Vec<Rule>,
    pub(crate) digest: Option<[u8; 32]>,
}
