//! SQL source: schema description, guarded generation and execution.

pub mod database;
pub mod guard;
pub mod parser;

pub use database::{SqlDatabase, SqliteDatabase};
pub use guard::{SqlGuard, SqlOutcome, SqlRejection};
pub use parser::{parse_sql, probe_count, probe_statement, SQL_STOP};
