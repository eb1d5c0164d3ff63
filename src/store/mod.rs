//! Persistence layer: libSQL-backed mirror of provider messages.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{MailStore, Message};
