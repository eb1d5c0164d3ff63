use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::actions::ActionDescriptor;
use crate::rules::condition::Condition;
use crate::store::Message;

/// How a rule combines its conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Predicate {
    All,
    Any,
}

/// A loaded rule. Built fresh for each processing run and never persisted.
#[derive(Debug, Clone)]
pub struct Rule {
    pub predicate: Predicate,
    pub conditions: Vec<Condition>,
    pub actions: Vec<ActionDescriptor>,
    pub description: String,
}

impl Rule {
    pub fn matches(&self, message: &Message) -> bool {
        self.matches_at(message, Utc::now())
    }

    /// A rule without conditions matches nothing under either predicate.
    pub fn matches_at(&self, message: &Message, now: DateTime<Utc>) -> bool {
        if self.conditions.is_empty() {
            return false;
        }
        match self.predicate {
            Predicate::All => self.conditions.iter().all(|c| c.evaluate_at(message, now)),
            Predicate::Any => self.conditions.iter().any(|c| c.evaluate_at(message, now)),
        }
    }
}
