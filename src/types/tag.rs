use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use super::rule::TagSpec;
use super::trace::{AppliedTag, RemovedTag};

/// A named, weighted unit of prompt text.
///
/// Identity is `name` (case-sensitive exact match); a [`TagSequence`] holds at
/// most one `Tag` per distinct name. Removed tags stay in the sequence so that
/// later condition checks still see them, but the serializer skips them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub name: String,
    pub weight: f64,
    pub removed: bool,
}

/// Ordered tag list representing one positive or negative prompt.
///
/// A tag's position is its index in the sequence. Anchor-relative insertion
/// places new tags immediately after the anchor; a forward-pointer map keeps
/// successive inserts after the same anchor in their listed order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TagSequence {
    tags: Vec<Tag>,
    #[serde(skip)]
    bind: HashMap<String, String>,
}

impl TagSequence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a non-removed tag with this exact name is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name == name && !t.removed)
    }

    /// Look up a tag by name, including removed entries.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.name == name)
    }

    pub(crate) fn get_active(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.name == name && !t.removed)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Position of a tag by name, including removed entries.
    #[must_use]
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.tags.iter().position(|t| t.name == name)
    }

    /// Merge a parsed tag into the sequence: duplicates keep their original
    /// position and take the strongest weight, new names append.
    pub(crate) fn merge(&mut self, name: String, weight: f64) {
        if let Some(existing) = self.tags.iter_mut().find(|t| t.name == name) {
            existing.weight = existing.weight.max(weight);
            existing.removed = false;
        } else {
            self.tags.push(Tag {
                name,
                weight,
                removed: false,
            });
        }
    }

    /// Add tags relative to the resolved anchor.
    ///
    /// Each spec's own weight (explicit or 1.0) is multiplied by the anchor
    /// tag's current weight (1.0 when no anchor resolved). An existing name is
    /// revived in place with the strongest weight; a new name is inserted
    /// right after the anchor chain's tail, or appended without an anchor.
    pub fn add(&mut self, anchor: Option<&str>, specs: &[TagSpec]) -> Vec<AppliedTag> {
        let anchor_entry = anchor.and_then(|name| self.get(name));
        let anchor_key = anchor_entry.map(|t| t.name.clone());
        let anchor_weight = anchor_entry.map_or(1.0, |t| t.weight);

        // Chase forward pointers so repeated inserts keep their listed order.
        let mut cursor = anchor_key.clone();
        while let Some(next) = cursor.as_ref().and_then(|c| self.bind.get(c)) {
            cursor = Some(next.clone());
        }

        let mut applied = Vec::with_capacity(specs.len());
        for spec in specs {
            let weight = anchor_weight * spec.weight.unwrap_or(1.0);
            if let Some(existing) = self.tags.iter_mut().find(|t| t.name == spec.name) {
                existing.removed = false;
                existing.weight = existing.weight.max(weight);
                applied.push(AppliedTag {
                    name: spec.name.clone(),
                    weight: existing.weight,
                    merged: true,
                });
                continue;
            }

            let tag = Tag {
                name: spec.name.clone(),
                weight,
                removed: false,
            };
            match cursor.as_ref().and_then(|c| self.position_of(c)) {
                Some(position) => {
                    self.tags.insert(position + 1, tag);
                    if let Some(key) = &anchor_key {
                        self.bind.insert(key.clone(), spec.name.clone());
                    }
                    cursor = Some(spec.name.clone());
                }
                None => self.tags.push(tag),
            }
            applied.push(AppliedTag {
                name: spec.name.clone(),
                weight,
                merged: false,
            });
        }
        applied
    }

    /// Mark tags as removed. Missing names are no-ops, reported as not found.
    pub fn remove(&mut self, names: &[String]) -> Vec<RemovedTag> {
        names
            .iter()
            .map(|name| {
                let entry = self.tags.iter_mut().find(|t| t.name == *name);
                let found = entry.is_some();
                if let Some(tag) = entry {
                    tag.removed = true;
                }
                RemovedTag {
                    name: name.clone(),
                    found,
                }
            })
            .collect()
    }
}

/// Render a weight as a `:w` suffix value, or `None` when it rounds to 1.0.
///
/// Weights round to two decimals so that propagation products such as
/// `1.2 * 1.1` serialize as `1.32` and survive a tokenize round trip exactly.
pub(crate) fn format_weight(weight: f64) -> Option<String> {
    let rounded = (weight * 100.0).round() / 100.0;
    if rounded == 1.0 {
        return None;
    }
    let mut text = format!("{rounded:.2}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    Some(text)
}

impl fmt::Display for TagSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for tag in self.tags.iter().filter(|t| !t.removed) {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            f.write_str(&tag.name)?;
            if let Some(suffix) = format_weight(tag.weight) {
                write!(f, ":{suffix}")?;
            }
        }
        Ok(())
    }
}
