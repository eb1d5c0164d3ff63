//! Rule document loading.
//!
//! The document is validated structurally first; any parse error, unknown
//! enum value, missing key or empty `conditions`/`actions` list rejects the
//! whole document. Rules that pass structural checks are then built one by
//! one and a rule that cannot be built is logged and skipped.

use std::path::PathBuf;

use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use crate::actions::{
    ActionContext, ActionDescriptor, MARK_AS_READ, MARK_AS_UNREAD, MOVE_MESSAGE,
};
use crate::error::RuleError;
use crate::rules::condition::{Condition, ConditionEntry, non_null};
use crate::rules::rule::{Predicate, Rule};

#[derive(Debug, Deserialize)]
struct RuleDocument {
    rules: Vec<RuleEntry>,
}

#[derive(Debug, Deserialize)]
struct RuleEntry {
    #[serde(default, deserialize_with = "non_null")]
    description: Option<String>,
    predicate: Predicate,
    conditions: Vec<ConditionEntry>,
    actions: Vec<ActionEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ActionKind {
    MarkAsRead,
    MarkAsUnread,
    MoveMessage,
}

impl ActionKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::MarkAsRead => MARK_AS_READ,
            Self::MarkAsUnread => MARK_AS_UNREAD,
            Self::MoveMessage => MOVE_MESSAGE,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ActionEntry {
    action: ActionKind,
    #[serde(default, deserialize_with = "non_null")]
    destination: Option<String>,
}

/// Parse and build rules without touching the provider.
pub fn parse_rules(json: &str) -> Result<Vec<Rule>, RuleError> {
    let document: RuleDocument = serde_json::from_str(json)
        .map_err(|e| RuleError::Validation(format!("invalid rule document: {e}")))?;

    for (idx, entry) in document.rules.iter().enumerate() {
        if entry.conditions.is_empty() {
            return Err(RuleError::Validation(format!(
                "rule {}: conditions must contain at least one entry",
                idx + 1
            )));
        }
        if entry.actions.is_empty() {
            return Err(RuleError::Validation(format!(
                "rule {}: actions must contain at least one entry",
                idx + 1
            )));
        }
    }

    let mut rules = Vec::with_capacity(document.rules.len());
    for (idx, entry) in document.rules.into_iter().enumerate() {
        match build_rule(entry) {
            Ok(rule) => rules.push(rule),
            Err(e) => error!(rule = idx + 1, error = %e, "Failed to build rule, skipping"),
        }
    }
    Ok(rules)
}

fn build_rule(entry: RuleEntry) -> Result<Rule, RuleError> {
    let mut conditions = Vec::with_capacity(entry.conditions.len());
    for cond in &entry.conditions {
        match Condition::from_entry(cond) {
            Ok(c) => conditions.push(c),
            Err(e) => warn!(error = %e, "Skipping invalid condition"),
        }
    }
    if conditions.is_empty() {
        return Err(RuleError::Invalid(
            "rule must have at least one valid condition".into(),
        ));
    }

    let mut actions = Vec::with_capacity(entry.actions.len());
    for action in entry.actions {
        if action.action == ActionKind::MoveMessage && action.destination.is_none() {
            return Err(RuleError::Invalid(
                "move_message action requires 'destination'".into(),
            ));
        }
        actions.push(ActionDescriptor {
            action: action.action.as_str().to_string(),
            destination: action.destination,
        });
    }

    Ok(Rule {
        predicate: entry.predicate,
        conditions,
        actions,
        description: entry.description.unwrap_or_default(),
    })
}

enum RuleSource {
    File(PathBuf),
    Json(String),
}

/// Loads the rule set once and keeps it for the rest of a processing run.
/// Create a new loader per run so document edits are picked up.
pub struct RuleLoader {
    source: RuleSource,
    rules: OnceCell<Vec<Rule>>,
}

impl RuleLoader {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: RuleSource::File(path.into()),
            rules: OnceCell::new(),
        }
    }

    pub fn from_json(json: impl Into<String>) -> Self {
        Self {
            source: RuleSource::Json(json.into()),
            rules: OnceCell::new(),
        }
    }

    /// Load, validate and build the rules, creating any `move_message`
    /// destination labels that do not exist yet. Subsequent calls return the
    /// cached set.
    pub async fn load(&self, ctx: &ActionContext<'_>) -> Result<&[Rule], RuleError> {
        let rules = self
            .rules
            .get_or_try_init(|| async {
                let json = self.read_source().await?;
                let rules = parse_rules(&json)?;
                ensure_destination_labels(ctx, &rules).await;
                info!(count = rules.len(), "Loaded rules");
                Ok::<_, RuleError>(rules)
            })
            .await?;
        Ok(rules.as_slice())
    }

    async fn read_source(&self) -> Result<String, RuleError> {
        match &self.source {
            RuleSource::Json(json) => Ok(json.clone()),
            RuleSource::File(path) => {
                info!(path = %path.display(), "Loading rules");
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| RuleError::Io {
                        path: path.display().to_string(),
                        source,
                    })
            }
        }
    }
}

async fn ensure_destination_labels(ctx: &ActionContext<'_>, rules: &[Rule]) {
    let destinations = rules
        .iter()
        .flat_map(|r| r.actions.iter())
        .filter(|a| a.action == MOVE_MESSAGE)
        .filter_map(|a| a.destination.as_deref());

    for destination in destinations {
        if let Err(e) = ctx.labels.get_or_create(ctx.provider, destination).await {
            warn!(label = destination, error = %e, "Could not resolve destination label");
        }
    }
}
