//! Schema migrations applied once at startup.
//!
//! Migration files live in one directory as `<version>_<name>.up.sql`
//! (optionally paired with `.down.sql`). Applied versions are recorded in
//! the target database, and the runner starts after the highest one.

pub mod runner;
pub mod source;
pub mod store;

pub use runner::{MigrationReport, Migrator};
pub use source::{Migration, MigrationSet};
pub use store::{MigrationStore, MySqlMigrationStore};
