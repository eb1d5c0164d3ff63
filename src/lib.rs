//! Mail triage: mirror a Gmail mailbox locally and apply JSON-defined rules.

pub mod actions;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod rules;
pub mod runner;
pub mod store;

#[cfg(test)]
mod testing;
