//! Single-field conditions.
//!
//! Text conditions compare a lowercased field against one or more lowercased
//! candidates. Date conditions compare the age of `received_at` against a
//! numeric threshold in days or calendar months.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::RuleError;
use crate::store::Message;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Sender,
    Subject,
    /// The message body.
    Message,
    ReceivedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Contains,
    DoesNotContain,
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Days,
    Months,
}

/// One entry of a rule's `conditions` array as written in the document.
#[derive(Debug, Clone, Deserialize)]
pub struct ConditionEntry {
    pub field: Field,
    pub predicate: Operator,
    pub value: Value,
    #[serde(default, deserialize_with = "non_null")]
    pub unit: Option<Unit>,
}

/// Optional document keys may be omitted but never set to `null`.
pub(crate) fn non_null<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextCondition {
    pub field: Field,
    pub operator: Operator,
    /// Lowercased candidates; a scalar value becomes a single candidate.
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateCondition {
    pub field: Field,
    pub operator: Operator,
    pub value: f64,
    pub unit: Unit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Text(TextCondition),
    Date(DateCondition),
}

impl Condition {
    /// Build a condition from its document form. A `unit` makes it a date
    /// condition; otherwise it is a text condition.
    pub fn from_entry(entry: &ConditionEntry) -> Result<Self, RuleError> {
        if entry.value.is_null() {
            return Err(RuleError::Invalid(format!(
                "condition on {:?} has a null value",
                entry.field
            )));
        }

        match entry.unit {
            Some(unit) => {
                let value = entry.value.as_f64().ok_or_else(|| {
                    RuleError::Invalid(format!(
                        "date condition value must be a number, got {}",
                        entry.value
                    ))
                })?;
                Ok(Self::Date(DateCondition {
                    field: entry.field,
                    operator: entry.predicate,
                    value,
                    unit,
                }))
            }
            None => Ok(Self::Text(TextCondition {
                field: entry.field,
                operator: entry.predicate,
                candidates: candidates(&entry.value),
            })),
        }
    }

    pub fn evaluate(&self, message: &Message) -> bool {
        self.evaluate_at(message, Utc::now())
    }

    /// Evaluate against a fixed clock.
    pub fn evaluate_at(&self, message: &Message, now: DateTime<Utc>) -> bool {
        match self {
            Self::Text(cond) => cond.evaluate(message),
            Self::Date(cond) => cond.evaluate_at(message, now),
        }
    }
}

fn candidates(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(scalar_text).collect(),
        other => vec![scalar_text(other)],
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_lowercase(),
        other => other.to_string().to_lowercase(),
    }
}

/// `2024-01-01 10:00:00+00:00`, with microseconds only when non-zero.
fn received_at_text(received_at: DateTime<Utc>) -> String {
    let format = if received_at.timestamp_subsec_micros() == 0 {
        "%Y-%m-%d %H:%M:%S%:z"
    } else {
        "%Y-%m-%d %H:%M:%S%.6f%:z"
    };
    received_at.format(format).to_string()
}

impl TextCondition {
    fn field_text(&self, message: &Message) -> String {
        match self.field {
            Field::Sender => message.sender.to_lowercase(),
            Field::Subject => message.subject.to_lowercase(),
            Field::Message => message.body.to_lowercase(),
            Field::ReceivedAt => received_at_text(message.received_at),
        }
    }

    pub fn evaluate(&self, message: &Message) -> bool {
        let field = self.field_text(message);
        let mut candidates = self.candidates.iter();

        match self.operator {
            Operator::Contains => candidates.any(|c| field.contains(c.as_str())),
            Operator::DoesNotContain => candidates.all(|c| !field.contains(c.as_str())),
            Operator::Equals => candidates.any(|c| *c == field),
            Operator::NotEquals => candidates.all(|c| *c != field),
            Operator::LessThan | Operator::GreaterThan => false,
        }
    }
}

impl DateCondition {
    pub fn evaluate_at(&self, message: &Message, now: DateTime<Utc>) -> bool {
        if self.field != Field::ReceivedAt {
            return false;
        }

        let received = message.received_at;
        let delta = match self.unit {
            Unit::Days => (now - received).num_seconds().div_euclid(SECONDS_PER_DAY),
            Unit::Months => {
                let years = i64::from(now.year() - received.year());
                let months = i64::from(now.month()) - i64::from(received.month());
                years * 12 + months
            }
        };

        let delta = delta as f64;
        match self.operator {
            Operator::LessThan => delta < self.value,
            Operator::GreaterThan => delta > self.value,
            _ => false,
        }
    }
}
