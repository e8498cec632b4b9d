//! Persistence layer — libSQL-backed storage for the reply ledger,
//! processed-post set, and audit log.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{AuditCounts, AuditEvent, AuditKind, Database, ReplyWindow};
