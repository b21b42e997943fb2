use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;

use crate::event::ResourceKind;

/// A field that accepts either a single string or a list of strings in the
/// rules document (`comment`, `reactions`, `labels`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn as_slice(&self) -> &[String] {
        match self {
            OneOrMany::One(value) => std::slice::from_ref(value),
            OneOrMany::Many(values) => values,
        }
    }

    /// Overlay `self` on top of `base`. Two lists merge index-wise: the
    /// override element wins per index and the base's tail is kept. Any
    /// shape mismatch (single string on either side) replaces wholesale.
    fn merged_over(self, base: OneOrMany) -> OneOrMany {
        match (self, base) {
            (OneOrMany::Many(overrides), OneOrMany::Many(base)) => {
                let mut merged = overrides;
                if base.len() > merged.len() {
                    merged.extend(base[merged.len()..].iter().cloned());
                }
                OneOrMany::Many(merged)
            }
            (overrides, _) => overrides,
        }
    }
}

fn merge_values(
    overrides: Option<OneOrMany>,
    base: Option<OneOrMany>,
) -> Option<OneOrMany> {
    match (overrides, base) {
        (Some(overrides), Some(base)) => Some(overrides.merged_over(base)),
        (overrides, base) => overrides.or(base),
    }
}

/// The normalized action record resolved for one (resource-kind, label) pair.
///
/// Every field is an independent toggle; no field implies another. Absent
/// fields mean "do nothing". Execution order across enabled toggles is fixed
/// by [`crate::action::dispatch`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSet {
    pub close: Option<bool>,
    pub open: Option<bool>,
    pub lock: Option<bool>,
    pub unlock: Option<bool>,
    pub lock_reason: Option<String>,
    pub comment: Option<OneOrMany>,
    pub reactions: Option<OneOrMany>,
    pub labels: Option<OneOrMany>,
    pub pin: Option<bool>,
    pub unpin: Option<bool>,
}

impl ActionSet {
    /// Overlay `self` on top of `base`, field by field. A scalar field
    /// present in `self` wins; absent fields fall through to `base`;
    /// list-valued fields merge index-wise (see [`OneOrMany::merged_over`]).
    fn merged_over(self, base: ActionSet) -> ActionSet {
        ActionSet {
            close: self.close.or(base.close),
            open: self.open.or(base.open),
            lock: self.lock.or(base.lock),
            unlock: self.unlock.or(base.unlock),
            lock_reason: self.lock_reason.or(base.lock_reason),
            comment: merge_values(self.comment, base.comment),
            reactions: merge_values(self.reactions, base.reactions),
            labels: merge_values(self.labels, base.labels),
            pin: self.pin.or(base.pin),
            unpin: self.unpin.or(base.unpin),
        }
    }
}

/// The three-section rules document: `common` applies to issues and pull
/// requests alike, `issues`/`pulls` to one kind only. Keys are exact label
/// names, with a `-` prefix for unlabeled events (`"heated"` and `"-heated"`
/// are distinct keys).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub common: HashMap<String, ActionSet>,
    #[serde(default)]
    pub issues: HashMap<String, ActionSet>,
    #[serde(default)]
    pub pulls: HashMap<String, ActionSet>,
}

impl RuleSet {
    /// The built-in rules used when no override document exists.
    pub fn defaults() -> RuleSet {
        let mut common = HashMap::new();
        common.insert(
            "heated".to_string(),
            ActionSet {
                comment: Some(OneOrMany::One(
                    "The thread has been temporarily locked.\nPlease follow our community guidelines."
                        .to_string(),
                )),
                reactions: Some(OneOrMany::Many(vec![
                    "eyes".to_string(),
                    "heart".to_string(),
                ])),
                lock: Some(true),
                lock_reason: Some("too heated".to_string()),
                ..Default::default()
            },
        );
        common.insert(
            "-heated".to_string(),
            ActionSet {
                unlock: Some(true),
                ..Default::default()
            },
        );

        let mut issues = HashMap::new();
        issues.insert(
            "feature".to_string(),
            ActionSet {
                close: Some(true),
                comment: Some(OneOrMany::One(
                    ":wave: ${ author }, please use our idea board to request new features."
                        .to_string(),
                )),
                ..Default::default()
            },
        );
        issues.insert(
            "-wontfix".to_string(),
            ActionSet {
                open: Some(true),
                ..Default::default()
            },
        );
        issues.insert(
            "needs-more-info".to_string(),
            ActionSet {
                comment: Some(OneOrMany::One(
                    "Hello ${author} \nIn order to communicate effectively, we have a certain format requirement for the issue, your issue is automatically closed because there is no recurring step or reproducible warehouse, and will be REOPEN after the offer."
                        .to_string(),
                )),
                close: Some(true),
                ..Default::default()
            },
        );
        issues.insert(
            "-needs-more-info".to_string(),
            ActionSet {
                open: Some(true),
                ..Default::default()
            },
        );

        RuleSet {
            common,
            issues,
            pulls: HashMap::new(),
        }
    }

    /// Build the effective rule set from an optional raw override document.
    ///
    /// `None` (no config path given, or the remote file was absent) returns
    /// the defaults unmodified. A present document is parsed as YAML and
    /// deep-merged over the defaults; a parse failure is fatal.
    pub fn from_overrides(raw: Option<&str>) -> Result<RuleSet> {
        let defaults = RuleSet::defaults();
        match raw {
            None => Ok(defaults),
            Some(raw) => {
                let overrides: RuleSet =
                    serde_yaml::from_str(raw).context("Failed to parse rules document")?;
                Ok(overrides.merged_over(defaults))
            }
        }
    }

    /// Deep-merge `self` over `base`: per section, union of label keys; for
    /// overlapping labels, field-by-field overlay with `self` winning.
    fn merged_over(self, base: RuleSet) -> RuleSet {
        RuleSet {
            common: merge_section(self.common, base.common),
            issues: merge_section(self.issues, base.issues),
            pulls: merge_section(self.pulls, base.pulls),
        }
    }

    fn section(&self, kind: ResourceKind) -> &HashMap<String, ActionSet> {
        match kind {
            ResourceKind::Issue => &self.issues,
            ResourceKind::PullRequest => &self.pulls,
        }
    }

    /// Resolve the action set for a label: the kind-specific section wins,
    /// then `common`, then an empty (no-op) record.
    pub fn resolve(&self, kind: ResourceKind, label: &str) -> ActionSet {
        if let Some(actions) = self.section(kind).get(label) {
            return actions.clone();
        }
        self.common.get(label).cloned().unwrap_or_default()
    }
}

fn merge_section(
    overrides: HashMap<String, ActionSet>,
    mut base: HashMap<String, ActionSet>,
) -> HashMap<String, ActionSet> {
    for (label, actions) in overrides {
        let merged = match base.remove(&label) {
            Some(existing) => actions.merged_over(existing),
            None => actions,
        };
        base.insert(label, merged);
    }
    base
}
