//! Rule model, condition evaluation and rule document loading.

pub mod condition;
pub mod loader;
pub mod rule;

pub use condition::{Condition, DateCondition, Field, Operator, TextCondition, Unit};
pub use loader::{RuleLoader, parse_rules};
pub use rule::{Predicate, Rule};
