use std::fmt;

use serde::Serialize;

use super::rule::RuleVariant;
use super::tag::format_weight;

/// Which prompt sequence a trace entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Positive,
    Negative,
}

/// Condition kinds, in the order they are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    AnyOf,
    AllOf,
    NoneOf,
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionKind::AnyOf => f.write_str("any_of"),
            ConditionKind::AllOf => f.write_str("all_of"),
            ConditionKind::NoneOf => f.write_str("none_of"),
        }
    }
}

/// Outcome of one condition kind on one rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionCheck {
    pub kind: ConditionKind,
    pub tags: Vec<String>,
    pub passed: bool,
}

/// Outcome of one anchor resolution. `resolved` is the anchor in effect
/// afterwards, which on a miss is the previously effective anchor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorCheck {
    pub target: Target,
    pub candidates: Vec<String>,
    pub resolved: Option<String>,
}

/// One tag written by an add mutation, with its final propagated weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedTag {
    pub name: String,
    pub weight: f64,
    /// True when the name already existed and was merged in place.
    pub merged: bool,
}

/// One name targeted by a remove mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovedTag {
    pub name: String,
    pub found: bool,
}

/// A single mutation applied by a tag rule, in application order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mutation {
    Add { target: Target, tags: Vec<AppliedTag> },
    Remove { target: Target, tags: Vec<RemovedTag> },
}

/// How a visited rule concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Conditions passed and the rule's body ran.
    Applied,
    /// Conditions failed; the rule and its descendants were skipped.
    Skipped,
    /// A switch where no child matched and no default exists.
    NoMatch,
}

/// Trace record for one visited rule node.
#[derive(Debug, Clone, Serialize)]
pub struct RuleTrace {
    /// `file.yaml[i]` for top-level rules, `children[i]` or `default` below.
    pub path: String,
    pub kind: RuleVariant,
    pub name: Option<String>,
    pub conditions: Vec<ConditionCheck>,
    pub anchors: Vec<AnchorCheck>,
    pub mutations: Vec<Mutation>,
    pub children: Vec<RuleTrace>,
    pub outcome: Outcome,
}

/// Trace for one region's full evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct RegionTrace {
    pub region: usize,
    pub rules: Vec<RuleTrace>,
}

/// Tree-shaped record of a whole transformation, in visitation order.
///
/// The `Display` rendering is an indented console form; the structure itself
/// serializes for any other presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub regions: Vec<RegionTrace>,
}

impl Trace {
    /// Total number of visited rule nodes across all regions.
    #[must_use]
    pub fn visited(&self) -> usize {
        fn count(nodes: &[RuleTrace]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.children)).sum()
        }
        self.regions.iter().map(|r| count(&r.rules)).sum()
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let multi = self.regions.len() > 1;
        for region in &self.regions {
            if multi {
                writeln!(f, "[region #{}]", region.region)?;
            }
            for node in &region.rules {
                write_node(f, node, 0)?;
            }
        }
        Ok(())
    }
}

fn write_node(f: &mut fmt::Formatter<'_>, node: &RuleTrace, depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth);
    let prefix = match node.kind {
        RuleVariant::Group | RuleVariant::Switch => '>',
        RuleVariant::Tag => '$',
    };
    write!(f, "{indent}{prefix} {} {{{}}}", node.path, node.kind)?;
    match &node.name {
        Some(name) => writeln!(f, " ({name})")?,
        None => writeln!(f)?,
    }

    let indent = "  ".repeat(depth + 1);
    for check in &node.conditions {
        writeln!(
            f,
            "{indent}? {}({}) = {}",
            check.kind,
            check.tags.join(", "),
            check.passed
        )?;
    }
    match node.outcome {
        Outcome::Skipped => return writeln!(f, "{indent}x skipped (conditions not met)"),
        Outcome::NoMatch => writeln!(f, "{indent}x no match")?,
        Outcome::Applied => {}
    }
    for check in &node.anchors {
        let key = match check.target {
            Target::Positive => "anchor",
            Target::Negative => "anchor_negative",
        };
        let resolved = check.resolved.as_deref().unwrap_or("none");
        writeln!(f, "{indent}@ {key}({}) = {resolved}", check.candidates.join(", "))?;
    }
    for mutation in &node.mutations {
        write_mutation(f, &indent, mutation)?;
    }
    for child in &node.children {
        write_node(f, child, depth + 1)?;
    }
    Ok(())
}

fn write_mutation(f: &mut fmt::Formatter<'_>, indent: &str, mutation: &Mutation) -> fmt::Result {
    match mutation {
        Mutation::Add { target, tags } => {
            let key = match target {
                Target::Positive => "add",
                Target::Negative => "add_negative",
            };
            let rendered: Vec<String> = tags
                .iter()
                .map(|t| match format_weight(t.weight) {
                    Some(w) => format!("{}:{w}", t.name),
                    None => t.name.clone(),
                })
                .collect();
            writeln!(f, "{indent}+ {key}: {}", rendered.join(", "))
        }
        Mutation::Remove { target, tags } => {
            let key = match target {
                Target::Positive => "remove",
                Target::Negative => "remove_negative",
            };
            let rendered: Vec<String> = tags
                .iter()
                .map(|t| {
                    if t.found {
                        t.name.clone()
                    } else {
                        format!("{} (missing)", t.name)
                    }
                })
                .collect();
            writeln!(f, "{indent}- {key}: {}", rendered.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(path: &str, outcome: Outcome) -> RuleTrace {
        RuleTrace {
            path: path.to_owned(),
            kind: RuleVariant::Tag,
            name: None,
            conditions: vec![],
            anchors: vec![],
            mutations: vec![],
            children: vec![],
            outcome,
        }
    }

    #[test]
    fn display_renders_tree() {
        let mut group = leaf("rules.yaml[0]", Outcome::Applied);
        group.kind = RuleVariant::Group;
        group.name = Some("celica".into());
        group.conditions.push(ConditionCheck {
            kind: ConditionKind::AnyOf,
            tags: vec!["celica".into()],
            passed: true,
        });

        let mut child = leaf("children[0]", Outcome::Applied);
        child.mutations.push(Mutation::Add {
            target: Target::Positive,
            tags: vec![AppliedTag {
                name: "black hair".into(),
                weight: 1.32,
                merged: false,
            }],
        });
        group.children.push(child);

        let trace = Trace {
            regions: vec![RegionTrace {
                region: 0,
                rules: vec![group],
            }],
        };
        let text = trace.to_string();
        assert!(text.contains("> rules.yaml[0] {group} (celica)"));
        assert!(text.contains("? any_of(celica) = true"));
        assert!(text.contains("+ add: black hair:1.32"));
        assert!(!text.contains("[region"));
        assert_eq!(trace.visited(), 2);
    }

    #[test]
    fn display_marks_skips_and_regions() {
        let trace = Trace {
            regions: vec![
                RegionTrace {
                    region: 0,
                    rules: vec![leaf("rules.yaml[0]", Outcome::Skipped)],
                },
                RegionTrace {
                    region: 1,
                    rules: vec![leaf("rules.yaml[0]", Outcome::NoMatch)],
                },
            ],
        };
        let text = trace.to_string();
        assert!(text.contains("[region #0]"));
        assert!(text.contains("[region #1]"));
        assert!(text.contains("x skipped (conditions not met)"));
        assert!(text.contains("x no match"));
    }

    #[test]
    fn trace_serializes() {
        let trace = Trace {
            regions: vec![RegionTrace {
                region: 0,
                rules: vec![leaf("rules.yaml[0]", Outcome::Applied)],
            }],
        };
        let json = serde_yaml::to_string(&trace).unwrap();
        assert!(json.contains("rules.yaml[0]"));
    }
}
