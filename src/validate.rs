use serde_yaml::Value;

use crate::parse;
use crate::types::{Anchors, Conditions, Rule, RuleKind, SchemaError, TagActions, TagSpec};

/// Validate one parsed rule file into a typed rule list.
///
/// The first schema violation found is returned as a located [`SchemaError`];
/// nothing is auto-corrected. A null document (empty file) is an empty list.
pub(crate) fn validate_file(file: &str, node: &Value) -> Result<Vec<Rule>, SchemaError> {
    let mut cursor = Cursor::new(file);
    match node {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => validate_rules(&mut cursor, items),
        _ => Err(SchemaError::NotAList {
            path: cursor.path(),
        }),
    }
}

/// Tracks the `file[i](name).prop` location of the node being validated.
struct Cursor {
    segments: Vec<String>,
}

impl Cursor {
    fn new(file: &str) -> Self {
        Self {
            segments: vec![file.to_owned()],
        }
    }

    fn path(&self) -> String {
        self.segments.concat()
    }

    fn prop(&self, name: &str) -> String {
        format!("{}.{name}", self.path())
    }

    fn push(&mut self, segment: String) {
        self.segments.push(segment);
    }

    fn pop(&mut self) {
        self.segments.pop();
    }
}

fn node_segment(index: usize, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("[{index}]({name})"),
        None => format!("[{index}]"),
    }
}

fn invalid(cursor: &Cursor, key: &str, message: String) -> SchemaError {
    SchemaError::InvalidProperty {
        path: cursor.prop(key),
        message,
    }
}

fn validate_rules(cursor: &mut Cursor, items: &[Value]) -> Result<Vec<Rule>, SchemaError> {
    let mut rules = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        rules.push(validate_child(cursor, index, item, false)?);
    }
    Ok(rules)
}

fn validate_child(
    cursor: &mut Cursor,
    index: usize,
    item: &Value,
    allow_default: bool,
) -> Result<Rule, SchemaError> {
    if !item.is_mapping() {
        return Err(SchemaError::NotAMapping {
            path: format!("{}[{index}]", cursor.path()),
        });
    }
    let name = rule_name(cursor, index, item)?;
    cursor.push(node_segment(index, name.as_deref()));
    let rule = validate_rule(cursor, item, name, allow_default)?;
    cursor.pop();
    Ok(rule)
}

fn rule_name(cursor: &Cursor, index: usize, node: &Value) -> Result<Option<String>, SchemaError> {
    let Some(value) = node.get("name") else {
        return Ok(None);
    };
    let path = format!("{}[{index}].name", cursor.path());
    let Some(text) = value.as_str() else {
        return Err(SchemaError::InvalidProperty {
            path,
            message: "name must be a string".into(),
        });
    };
    let clean = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if clean.is_empty() {
        return Err(SchemaError::InvalidProperty {
            path,
            message: "name cannot be empty".into(),
        });
    }
    if !clean
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | ' '))
    {
        return Err(SchemaError::InvalidProperty {
            path,
            message: "name contains invalid characters".into(),
        });
    }
    Ok(Some(clean))
}

fn validate_rule(
    cursor: &mut Cursor,
    node: &Value,
    name: Option<String>,
    allow_default: bool,
) -> Result<Rule, SchemaError> {
    let variant = match node.get("type") {
        None => None,
        Some(value) => match value.as_str() {
            Some(text) => Some(text.to_owned()),
            None => {
                return Err(SchemaError::InvalidProperty {
                    path: cursor.prop("type"),
                    message: "type must be a string".into(),
                })
            }
        },
    };
    match variant.as_deref() {
        None => validate_tag_rule(cursor, node, name, allow_default),
        Some("group") => validate_tree_rule(cursor, node, name, allow_default, false),
        Some("switch") => validate_tree_rule(cursor, node, name, allow_default, true),
        Some(other) => Err(SchemaError::UnknownType {
            path: cursor.prop("type"),
            type_name: other.to_owned(),
        }),
    }
}

fn key_name<'a>(cursor: &Cursor, key: &'a Value) -> Result<&'a str, SchemaError> {
    key.as_str().ok_or_else(|| SchemaError::InvalidProperty {
        path: cursor.path(),
        message: "property names must be strings".into(),
    })
}

fn validate_tag_rule(
    cursor: &mut Cursor,
    node: &Value,
    name: Option<String>,
    allow_default: bool,
) -> Result<Rule, SchemaError> {
    let Some(mapping) = node.as_mapping() else {
        return Err(SchemaError::NotAMapping {
            path: cursor.path(),
        });
    };
    let mut conditions = Conditions::default();
    let mut anchors = Anchors::default();
    let mut actions = TagActions::default();

    for (key, value) in mapping {
        let key = key_name(cursor, key)?;
        match key {
            "name" | "type" => {}
            "default" if allow_default => {}
            "any_of" => conditions.any_of = plain_tags(cursor, key, value)?,
            "all_of" => conditions.all_of = plain_tags(cursor, key, value)?,
            "none_of" => conditions.none_of = plain_tags(cursor, key, value)?,
            "anchor" => anchors.anchor = plain_tags(cursor, key, value)?,
            "anchor_negative" => anchors.anchor_negative = plain_tags(cursor, key, value)?,
            "add" => actions.add = weighted_tags(cursor, key, value)?,
            "add_negative" => actions.add_negative = weighted_tags(cursor, key, value)?,
            "remove" => actions.remove = plain_tags(cursor, key, value)?,
            "remove_negative" => actions.remove_negative = plain_tags(cursor, key, value)?,
            other => {
                return Err(SchemaError::UnsupportedProperty {
                    path: cursor.prop(other),
                    property: other.to_owned(),
                })
            }
        }
    }

    if actions.add.is_empty()
        && actions.add_negative.is_empty()
        && actions.remove.is_empty()
        && actions.remove_negative.is_empty()
    {
        return Err(SchemaError::MissingTagAction {
            path: cursor.path(),
        });
    }
    Ok(Rule {
        name,
        conditions,
        anchors,
        kind: RuleKind::Tag(actions),
    })
}

fn validate_tree_rule(
    cursor: &mut Cursor,
    node: &Value,
    name: Option<String>,
    allow_default: bool,
    switch: bool,
) -> Result<Rule, SchemaError> {
    let Some(mapping) = node.as_mapping() else {
        return Err(SchemaError::NotAMapping {
            path: cursor.path(),
        });
    };
    let mut conditions = Conditions::default();
    let mut anchors = Anchors::default();
    let mut children_value = None;

    for (key, value) in mapping {
        let key = key_name(cursor, key)?;
        match key {
            "name" | "type" => {}
            "default" if allow_default => {}
            "any_of" => conditions.any_of = plain_tags(cursor, key, value)?,
            "all_of" => conditions.all_of = plain_tags(cursor, key, value)?,
            "none_of" => conditions.none_of = plain_tags(cursor, key, value)?,
            "anchor" => anchors.anchor = plain_tags(cursor, key, value)?,
            "anchor_negative" => anchors.anchor_negative = plain_tags(cursor, key, value)?,
            "children" => children_value = Some(value),
            other => {
                return Err(SchemaError::UnsupportedProperty {
                    path: cursor.prop(other),
                    property: other.to_owned(),
                })
            }
        }
    }

    let Some(children_value) = children_value else {
        return Err(SchemaError::MissingChildren {
            path: cursor.path(),
        });
    };
    let Some(items) = children_value.as_sequence() else {
        return Err(invalid(cursor, "children", "children must be a list".into()));
    };
    if items.is_empty() {
        return Err(invalid(cursor, "children", "children cannot be empty".into()));
    }

    cursor.push(".children".to_owned());
    let kind = if switch {
        let (children, default) = validate_switch_children(cursor, items)?;
        RuleKind::Switch { children, default }
    } else {
        RuleKind::Group {
            children: validate_rules(cursor, items)?,
        }
    };
    cursor.pop();
    Ok(Rule {
        name,
        conditions,
        anchors,
        kind,
    })
}

fn validate_switch_children(
    cursor: &mut Cursor,
    items: &[Value],
) -> Result<(Vec<Rule>, Option<usize>), SchemaError> {
    let mut children = Vec::with_capacity(items.len());
    let mut default = None;
    for (index, item) in items.iter().enumerate() {
        let is_default = match item.get("default") {
            None => false,
            Some(Value::Bool(true)) => true,
            Some(Value::Bool(false)) => {
                return Err(SchemaError::InvalidProperty {
                    path: format!("{}[{index}].default", cursor.path()),
                    message: "default must be true".into(),
                })
            }
            Some(_) => {
                return Err(SchemaError::InvalidProperty {
                    path: format!("{}[{index}].default", cursor.path()),
                    message: "default must be a bool".into(),
                })
            }
        };
        let rule = validate_child(cursor, index, item, is_default)?;
        let node_path = || format!("{}{}", cursor.path(), node_segment(index, rule.name.as_deref()));
        if is_default {
            if default.is_some() {
                return Err(SchemaError::DuplicateDefault { path: node_path() });
            }
            if !rule.conditions.is_empty() {
                return Err(SchemaError::DefaultWithConditions { path: node_path() });
            }
            default = Some(index);
        } else if rule.conditions.is_empty() {
            return Err(SchemaError::MissingConditions { path: node_path() });
        }
        children.push(rule);
    }
    Ok((children, default))
}

/// Parse a tag-list property value (string or list of scalars) through the
/// prompt tokenizer, so `black hair, pixie cut:1.2` syntax works everywhere.
fn tag_values(cursor: &Cursor, key: &str, value: &Value) -> Result<Vec<TagSpec>, SchemaError> {
    let mut specs = Vec::new();
    match value {
        Value::String(text) => extend_specs(cursor, key, text, &mut specs)?,
        Value::Sequence(items) => {
            for item in items {
                let text = match item {
                    Value::String(text) => text.clone(),
                    Value::Number(number) => number.to_string(),
                    Value::Bool(flag) => flag.to_string(),
                    _ => {
                        return Err(invalid(cursor, key, format!("{key} must contain strings")))
                    }
                };
                extend_specs(cursor, key, &text, &mut specs)?;
            }
        }
        _ => return Err(invalid(cursor, key, format!("{key} must be a list or string"))),
    }
    if specs.is_empty() {
        return Err(invalid(cursor, key, format!("{key} cannot be empty")));
    }
    Ok(specs)
}

fn extend_specs(
    cursor: &Cursor,
    key: &str,
    text: &str,
    specs: &mut Vec<TagSpec>,
) -> Result<(), SchemaError> {
    let parsed = parse::tokenize(text).map_err(|e| invalid(cursor, key, e.to_string()))?;
    for tag in parsed.iter() {
        specs.push(TagSpec {
            name: tag.name.clone(),
            weight: (tag.weight != 1.0).then_some(tag.weight),
        });
    }
    Ok(())
}

fn weighted_tags(cursor: &Cursor, key: &str, value: &Value) -> Result<Vec<TagSpec>, SchemaError> {
    tag_values(cursor, key, value)
}

fn plain_tags(cursor: &Cursor, key: &str, value: &Value) -> Result<Vec<String>, SchemaError> {
    let specs = tag_values(cursor, key, value)?;
    if specs.iter().any(|spec| spec.weight.is_some()) {
        return Err(invalid(cursor, key, format!("{key} cannot contain weights")));
    }
    Ok(specs.into_iter().map(|spec| spec.name).collect())
}
