//! Loading versioned migration files from a directory.

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::MigrationError;

/// `<version>_<name>.<up|down>.sql`
static FILE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)_(.+)\.(up|down)\.sql$").expect("valid migration file regex"));

/// A single up migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Version, ordering key.
    pub version: u64,
    /// Descriptive name from the file name.
    pub name: String,
    /// SQL to run. May hold several statements.
    pub sql: String,
}

impl Migration {
    /// Create a migration.
    pub fn new(version: u64, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            sql: sql.into(),
        }
    }
}

/// Direction encoded in a migration file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Split a migration file name into version, name and direction.
pub fn parse_file_name(file_name: &str) -> Option<(u64, String, Direction)> {
    let caps = FILE_NAME.captures(file_name)?;
    let version = caps[1].parse().ok()?;
    let direction = match &caps[3] {
        "up" => Direction::Up,
        _ => Direction::Down,
    };
    Some((version, caps[2].to_string(), direction))
}

/// Up migrations in strictly ascending version order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationSet {
    migrations: Vec<Migration>,
}

impl MigrationSet {
    /// Build a set, rejecting duplicate versions. Reports every duplicate.
    pub fn new(migrations: Vec<Migration>) -> Result<Self, Vec<MigrationError>> {
        let mut by_version: BTreeMap<u64, Migration> = BTreeMap::new();
        let mut errors = Vec::new();

        for migration in migrations {
            if let Some(existing) = by_version.get(&migration.version) {
                errors.push(MigrationError::DuplicateVersion {
                    version: migration.version,
                    first: existing.name.clone(),
                    second: migration.name,
                });
                continue;
            }
            by_version.insert(migration.version, migration);
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            migrations: by_version.into_values().collect(),
        })
    }

    /// Load every `*.up.sql` file in `dir`.
    ///
    /// Down files are skipped, as are files that do not end in `.sql`.
    /// All problems found are reported together.
    pub fn load(dir: &Path) -> Result<Self, Vec<MigrationError>> {
        let entries = std::fs::read_dir(dir).map_err(|source| {
            vec![MigrationError::ReadDir {
                path: dir.to_path_buf(),
                source,
            }]
        })?;

        let mut migrations = Vec::new();
        let mut errors = Vec::new();

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) => {
                    errors.push(MigrationError::ReadDir {
                        path: dir.to_path_buf(),
                        source,
                    });
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !file_name.ends_with(".sql") {
                debug!(file = %file_name, "Skipping non-SQL file");
                continue;
            }

            match parse_file_name(&file_name) {
                Some((version, name, Direction::Up)) => match std::fs::read_to_string(&path) {
                    Ok(sql) => migrations.push(Migration::new(version, name, sql)),
                    Err(source) => errors.push(MigrationError::ReadFile { path, source }),
                },
                Some((_, _, Direction::Down)) => {}
                None => errors.push(MigrationError::InvalidName(file_name)),
            }
        }

        match Self::new(migrations) {
            Ok(set) if errors.is_empty() => Ok(set),
            Ok(_) => Err(errors),
            Err(duplicates) => {
                errors.extend(duplicates);
                Err(errors)
            }
        }
    }

    /// Migrations newer than `current`, ascending.
    pub fn pending(&self, current: Option<u64>) -> impl Iterator<Item = &Migration> {
        self.migrations
            .iter()
            .filter(move |m| current.map_or(true, |v| m.version > v))
    }

    /// All migrations, ascending.
    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }

    /// Number of migrations.
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}
