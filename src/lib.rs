mod error;
mod evaluate;
mod parse;
mod region;
mod types;
mod validate;

pub use error::TagweaveError;
pub use parse::{tokenize, PromptError};
pub use region::PromptState;
pub use types::{
    AnchorCheck, Anchors, AppliedTag, ConditionCheck, ConditionKind, Conditions, Mutation,
    Outcome, Pipeline, RegionTrace, RemovedTag, Rule, RuleFile, RuleKind, RuleTrace, RuleVariant,
    SchemaError, Snapshot, Tag, TagActions, TagSequence, TagSpec, Target, Trace, Transformation,
};
