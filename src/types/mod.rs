mod error;
mod rule;
mod snapshot;
mod tag;
mod trace;

pub use error::SchemaError;
pub use rule::{Anchors, Conditions, Rule, RuleFile, RuleKind, RuleVariant, TagActions, TagSpec};
pub use snapshot::{Pipeline, Snapshot, Transformation};
pub use tag::{Tag, TagSequence};
pub use trace::{
    AnchorCheck, AppliedTag, ConditionCheck, ConditionKind, Mutation, Outcome, RegionTrace,
    RemovedTag, RuleTrace, Target, Trace,
};
