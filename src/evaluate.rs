use crate::region::PromptState;
use crate::types::{
    AnchorCheck, Anchors, ConditionCheck, ConditionKind, Conditions, Mutation, Outcome, Rule,
    RuleFile, RuleKind, RuleTrace, TagActions, Target,
};

/// Evaluation context for one region.
///
/// `parent` is set for child regions only; their condition and anchor lookups
/// fall back to it read-only when the region's own sequences lack a match.
pub(crate) struct Scope<'a> {
    pub state: &'a mut PromptState,
    pub parent: Option<&'a PromptState>,
}

/// Anchor tag names in effect for the current rule, passed by value down the
/// recursion so a child's override never leaks into siblings.
#[derive(Debug, Clone, Default)]
struct AnchorPair {
    positive: Option<String>,
    negative: Option<String>,
}

/// Run every rule of every file against one region, in file order.
pub(crate) fn run_files(files: &[RuleFile], scope: &mut Scope<'_>) -> Vec<RuleTrace> {
    let mut traces = Vec::new();
    for file in files {
        for (index, rule) in file.rules.iter().enumerate() {
            let (trace, _) = run_rule(
                scope,
                &AnchorPair::default(),
                rule,
                format!("{}[{index}]", file.name),
            );
            traces.push(trace);
        }
    }
    traces
}

/// Evaluate one rule node. The bool is whether its conditions passed, which
/// is what a parent switch keys its first-match selection on.
fn run_rule(
    scope: &mut Scope<'_>,
    inherited: &AnchorPair,
    rule: &Rule,
    path: String,
) -> (RuleTrace, bool) {
    let mut trace = RuleTrace {
        path,
        kind: rule.kind.variant(),
        name: rule.name.clone(),
        conditions: Vec::new(),
        anchors: Vec::new(),
        mutations: Vec::new(),
        children: Vec::new(),
        outcome: Outcome::Applied,
    };

    if !check_conditions(scope, &rule.conditions, &mut trace.conditions) {
        trace.outcome = Outcome::Skipped;
        return (trace, false);
    }
    let anchors = resolve_anchors(scope, inherited, &rule.anchors, &mut trace.anchors);

    match &rule.kind {
        RuleKind::Tag(actions) => apply_actions(scope, &anchors, actions, &mut trace.mutations),
        RuleKind::Group { children } => {
            for (index, child) in children.iter().enumerate() {
                let (child_trace, _) = run_rule(scope, &anchors, child, format!("children[{index}]"));
                trace.children.push(child_trace);
            }
        }
        RuleKind::Switch { children, default } => {
            let mut matched = false;
            for (index, child) in children.iter().enumerate() {
                if *default == Some(index) {
                    continue;
                }
                let (child_trace, fired) =
                    run_rule(scope, &anchors, child, format!("children[{index}]"));
                trace.children.push(child_trace);
                if fired {
                    matched = true;
                    break;
                }
            }
            if !matched {
                match default {
                    Some(index) => {
                        let (child_trace, _) =
                            run_rule(scope, &anchors, &children[*index], "default".to_owned());
                        trace.children.push(child_trace);
                    }
                    None => trace.outcome = Outcome::NoMatch,
                }
            }
        }
    }
    (trace, true)
}

/// Whether a name counts as present for conditions. Removed tags still
/// count; a removal followed by a condition on the same name passes. Child
/// regions fall back to the parent region's positive sequence.
fn condition_present(scope: &Scope<'_>, name: &str) -> bool {
    scope.state.positive.get(name).is_some()
        || scope
            .parent
            .is_some_and(|parent| parent.positive.get(name).is_some())
}

fn check_conditions(
    scope: &Scope<'_>,
    conditions: &Conditions,
    checks: &mut Vec<ConditionCheck>,
) -> bool {
    let kinds = [
        (ConditionKind::AnyOf, &conditions.any_of),
        (ConditionKind::AllOf, &conditions.all_of),
        (ConditionKind::NoneOf, &conditions.none_of),
    ];
    for (kind, tags) in kinds {
        if tags.is_empty() {
            continue;
        }
        let passed = match kind {
            ConditionKind::AnyOf => tags.iter().any(|t| condition_present(scope, t)),
            ConditionKind::AllOf => tags.iter().all(|t| condition_present(scope, t)),
            ConditionKind::NoneOf => !tags.iter().any(|t| condition_present(scope, t)),
        };
        checks.push(ConditionCheck {
            kind,
            tags: tags.clone(),
            passed,
        });
        if !passed {
            return false;
        }
    }
    true
}

/// Resolve this rule's anchor candidates against the inherited pair.
///
/// A miss keeps the inherited anchor; the recorded check shows the anchor
/// left in effect, not just this rule's own match.
fn resolve_anchors(
    scope: &mut Scope<'_>,
    inherited: &AnchorPair,
    anchors: &Anchors,
    checks: &mut Vec<AnchorCheck>,
) -> AnchorPair {
    let mut effective = inherited.clone();
    if !anchors.anchor.is_empty() {
        if let Some(found) = find_anchor(scope, Target::Positive, &anchors.anchor) {
            effective.positive = Some(found);
        }
        checks.push(AnchorCheck {
            target: Target::Positive,
            candidates: anchors.anchor.clone(),
            resolved: effective.positive.clone(),
        });
    }
    if !anchors.anchor_negative.is_empty() {
        if let Some(found) = find_anchor(scope, Target::Negative, &anchors.anchor_negative) {
            effective.negative = Some(found);
        }
        checks.push(AnchorCheck {
            target: Target::Negative,
            candidates: anchors.anchor_negative.clone(),
            resolved: effective.negative.clone(),
        });
    }
    effective
}

/// First candidate present as a non-removed tag. A candidate found only in
/// the parent region is copied into this region's sequence so the region
/// owns the tag it anchors on.
fn find_anchor(scope: &mut Scope<'_>, target: Target, candidates: &[String]) -> Option<String> {
    let parent = scope.parent;
    for name in candidates {
        let local = match target {
            Target::Positive => &scope.state.positive,
            Target::Negative => &scope.state.negative,
        };
        if local.contains(name) {
            return Some(name.clone());
        }
        let inherited = parent.and_then(|p| {
            match target {
                Target::Positive => &p.positive,
                Target::Negative => &p.negative,
            }
            .get_active(name)
        });
        if let Some(tag) = inherited {
            let weight = tag.weight;
            let local = match target {
                Target::Positive => &mut scope.state.positive,
                Target::Negative => &mut scope.state.negative,
            };
            local.merge(name.clone(), weight);
            return Some(name.clone());
        }
    }
    None
}

/// Apply a tag rule's mutations. Removals run before additions, so a rule
/// listing the same name in both replaces the tag in one step.
fn apply_actions(
    scope: &mut Scope<'_>,
    anchors: &AnchorPair,
    actions: &TagActions,
    mutations: &mut Vec<Mutation>,
) {
    if !actions.remove.is_empty() {
        mutations.push(Mutation::Remove {
            target: Target::Positive,
            tags: scope.state.positive.remove(&actions.remove),
        });
    }
    if !actions.remove_negative.is_empty() {
        mutations.push(Mutation::Remove {
            target: Target::Negative,
            tags: scope.state.negative.remove(&actions.remove_negative),
        });
    }
    if !actions.add.is_empty() {
        mutations.push(Mutation::Add {
            target: Target::Positive,
            tags: scope
                .state
                .positive
                .add(anchors.positive.as_deref(), &actions.add),
        });
    }
    if !actions.add_negative.is_empty() {
        mutations.push(Mutation::Add {
            target: Target::Negative,
            tags: scope
                .state
                .negative
                .add(anchors.negative.as_deref(), &actions.add_negative),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::tokenize;
    use crate::types::Snapshot;

    fn state(positive: &str, negative: &str) -> PromptState {
        PromptState {
            positive: tokenize(positive).unwrap(),
            negative: tokenize(negative).unwrap(),
        }
    }

    fn run(yaml: &str, positive: &str, negative: &str) -> (PromptState, Vec<RuleTrace>) {
        let snapshot = Snapshot::from_sources(vec![("rules.yaml".to_owned(), yaml)]).unwrap();
        let mut state = state(positive, negative);
        let traces = run_files(snapshot.files(), &mut Scope {
            state: &mut state,
            parent: None,
        });
        (state, traces)
    }

    #[test]
    fn skipped_rule_leaves_state_untouched() {
        let (state, traces) = run("- any_of: missing\n  add: x\n", "celica", "");
        assert_eq!(state.positive.to_string(), "celica");
        assert_eq!(traces[0].outcome, Outcome::Skipped);
        assert!(!traces[0].conditions[0].passed);
    }

    #[test]
    fn all_condition_kinds_must_pass() {
        let yaml = "- any_of: celica\n  all_of: celica, smile\n  none_of: frown\n  add: x\n";
        let (state, _) = run(yaml, "celica, smile", "");
        assert!(state.positive.contains("x"));

        let (state, _) = run(yaml, "celica, smile, frown", "");
        assert!(!state.positive.contains("x"));
    }

    #[test]
    fn removed_tags_still_satisfy_conditions() {
        let yaml = "- remove: celica\n- any_of: celica\n  add: x\n";
        let (state, _) = run(yaml, "celica", "");
        assert_eq!(state.positive.to_string(), "x");
    }

    #[test]
    fn conditions_never_see_the_negative_prompt() {
        let (state, _) = run("- any_of: blurry\n  add: x\n", "celica", "blurry");
        assert!(!state.positive.contains("x"));
    }

    #[test]
    fn switch_runs_first_matching_child_only() {
        let yaml = concat!(
            "- type: switch\n",
            "  children:\n",
            "  - any_of: celica\n    add: first\n",
            "  - any_of: celica\n    add: second\n",
        );
        let (state, traces) = run(yaml, "celica", "");
        assert!(state.positive.contains("first"));
        assert!(!state.positive.contains("second"));
        assert_eq!(traces[0].children.len(), 1);
    }

    #[test]
    fn switch_falls_back_to_default() {
        let yaml = concat!(
            "- type: switch\n",
            "  children:\n",
            "  - any_of: jacket\n    add: black leather jacket\n",
            "  - default: true\n    add: black camisole\n",
        );
        let (state, traces) = run(yaml, "celica", "");
        assert!(state.positive.contains("black camisole"));
        assert!(!state.positive.contains("black leather jacket"));
        let default_trace = traces[0].children.last().unwrap();
        assert_eq!(default_trace.path, "default");
    }

    #[test]
    fn switch_without_match_or_default_records_no_match() {
        let yaml = concat!(
            "- type: switch\n",
            "  children:\n",
            "  - any_of: jacket\n    add: x\n",
        );
        let (state, traces) = run(yaml, "celica", "");
        assert_eq!(state.positive.to_string(), "celica");
        assert_eq!(traces[0].outcome, Outcome::NoMatch);
    }

    #[test]
    fn children_inherit_and_override_group_anchors() {
        let yaml = concat!(
            "- type: group\n",
            "  anchor: celica\n",
            "  children:\n",
            "  - add: inherited\n",
            "  - anchor: smile\n    add: overridden\n",
            "  - add: tail\n",
        );
        let (state, _) = run(yaml, "celica, smile", "");
        // The second child's override is scoped to itself; the third child
        // still inserts after celica's chain.
        assert_eq!(
            state.positive.to_string(),
            "celica, inherited, tail, smile, overridden"
        );
    }

    #[test]
    fn anchor_miss_keeps_previous_anchor() {
        let yaml = concat!(
            "- type: group\n",
            "  anchor: celica\n",
            "  children:\n",
            "  - anchor: missing\n    add: x\n",
        );
        let (state, traces) = run(yaml, "celica, smile", "");
        assert_eq!(state.positive.to_string(), "celica, x, smile");
        let check = &traces[0].children[0].anchors[0];
        assert_eq!(check.resolved.as_deref(), Some("celica"));
    }

    #[test]
    fn anchor_weight_propagates_into_adds() {
        let yaml = "- anchor: celica\n  add: blue eyes:1.1\n";
        let (state, _) = run(yaml, "celica:1.2", "");
        assert_eq!(state.positive.to_string(), "celica:1.2, blue eyes:1.32");
    }

    #[test]
    fn removals_apply_before_additions() {
        let yaml = "- any_of: celica\n  remove: celica\n  add: celica alt\n";
        let (state, traces) = run(yaml, "celica, smile", "");
        assert_eq!(state.positive.to_string(), "smile, celica alt");
        assert!(matches!(traces[0].mutations[0], Mutation::Remove { .. }));
        assert!(matches!(traces[0].mutations[1], Mutation::Add { .. }));
    }

    #[test]
    fn negative_mutations_use_negative_anchors() {
        let yaml = concat!(
            "- anchor_negative: blurry\n",
            "  add_negative: jpeg artifacts\n",
        );
        let (state, _) = run(yaml, "celica", "blurry, lowres");
        assert_eq!(state.negative.to_string(), "blurry, jpeg artifacts, lowres");
    }

    #[test]
    fn child_region_reads_parent_for_conditions_and_anchors() {
        let parent = state("celica:1.2, smile", "");
        let mut child = state("blue dress", "");
        let snapshot = Snapshot::from_sources(vec![(
            "rules.yaml".to_owned(),
            "- any_of: celica\n  anchor: celica\n  add: blue eyes:1.1\n",
        )])
        .unwrap();
        run_files(snapshot.files(), &mut Scope {
            state: &mut child,
            parent: Some(&parent),
        });
        // The anchor is copied locally with its parent weight.
        assert_eq!(
            child.positive.to_string(),
            "blue dress, celica:1.2, blue eyes:1.32"
        );
        assert_eq!(parent.positive.to_string(), "celica:1.2, smile");
    }
}
