//! Canonical SQL script layout.
//!
//! Two dumps of the same schema rarely list their statements in the same
//! order. The formatter rewrites a script so that equivalent schemas produce
//! identical text: DDL is grouped by kind and sorted inside each group, all
//! other statements keep their original order at the end.

use super::splitter::{collapse_whitespace, split_statements};
use crate::migrations::{MigrationError, MigrationResult};
use regex::{Regex, RegexBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Extension appended to formatted files
pub const FORMATTED_EXTENSION: &str = "formatted";

/// DDL groups in output order
const GROUPS: &[(&str, &str)] = &[
    ("schema", r"^CREATE\s+(SCHEMA|EXTENSION)\b"),
    ("type", r"^CREATE\s+(DOMAIN|TYPE)\b"),
    ("sequence", r"^CREATE\s+SEQUENCE\b"),
    ("table", r"^CREATE\s+((UNLOGGED|TEMP|TEMPORARY)\s+)?TABLE\b"),
    ("view", r"^CREATE\s+(OR\s+REPLACE\s+)?(MATERIALIZED\s+)?VIEW\b"),
    ("function", r"^CREATE\s+(OR\s+REPLACE\s+)?(FUNCTION|PROCEDURE|AGGREGATE)\b"),
    ("alter", r"^ALTER\s+(TABLE|SEQUENCE|DOMAIN)\b"),
    ("index", r"^CREATE\s+(UNIQUE\s+)?INDEX\b"),
    ("trigger", r"^CREATE\s+((CONSTRAINT\s+)?TRIGGER|(OR\s+REPLACE\s+)?RULE)\b"),
    ("grant", r"^(GRANT|REVOKE)\b"),
];

/// Rewrites SQL scripts into canonical statement order
#[derive(Debug, Clone)]
pub struct ScriptFormatter {
    groups: Vec<(&'static str, Regex)>,
}

impl ScriptFormatter {
    pub fn new() -> MigrationResult<Self> {
        let groups = GROUPS
            .iter()
            .map(|(name, pattern)| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|regex| (*name, regex))
                    .map_err(|e| MigrationError::internal(format!("bad statement pattern: {}", e)))
            })
            .collect::<MigrationResult<Vec<_>>>()?;
        Ok(Self { groups })
    }

    /// Name of the DDL group `statement` falls into, if any
    pub fn group_of(&self, statement: &str) -> Option<&'static str> {
        self.groups
            .iter()
            .find(|(_, regex)| regex.is_match(statement))
            .map(|(name, _)| *name)
    }

    /// Canonical form of `sql`
    pub fn format(&self, sql: &str) -> String {
        let mut grouped: Vec<Vec<String>> = vec![Vec::new(); self.groups.len()];
        let mut others = Vec::new();

        for statement in split_statements(sql) {
            let statement = collapse_whitespace(&statement);
            match self
                .groups
                .iter()
                .position(|(_, regex)| regex.is_match(&statement))
            {
                Some(index) => grouped[index].push(statement),
                None => others.push(statement),
            }
        }

        let mut sections: Vec<String> = Vec::new();
        for mut group in grouped.into_iter().filter(|g| !g.is_empty()) {
            group.sort();
            sections.push(render(&group));
        }
        if !others.is_empty() {
            sections.push(render(&others));
        }
        sections.join("\n")
    }

    /// Format the script at `path` into `<path>.formatted`
    pub fn format_file(&self, path: &Path) -> MigrationResult<PathBuf> {
        let sql = fs::read_to_string(path).map_err(|e| MigrationError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut target = path.as_os_str().to_owned();
        target.push(".");
        target.push(FORMATTED_EXTENSION);
        let target = PathBuf::from(target);

        fs::write(&target, self.format(&sql)).map_err(|e| MigrationError::FileWrite {
            path: target.clone(),
            source: e,
        })?;
        info!(source = %path.display(), target = %target.display(), "formatted script");
        Ok(target)
    }
}

fn render(statements: &[String]) -> String {
    statements
        .iter()
        .map(|s| format!("{};\n", s))
        .collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_groups() {
        let formatter = ScriptFormatter::new().unwrap();
        assert_eq!(formatter.group_of("create table t (id int)"), Some("table"));
        assert_eq!(formatter.group_of("CREATE UNIQUE INDEX i ON t(id)"), Some("index"));
        assert_eq!(
            formatter.group_of("CREATE OR REPLACE FUNCTION f() RETURNS int AS $$ SELECT 1 $$ LANGUAGE sql"),
            Some("function")
        );
        assert_eq!(formatter.group_of("ALTER TABLE t ADD CONSTRAINT pk PRIMARY KEY (id)"), Some("alter"));
        assert_eq!(formatter.group_of("INSERT INTO t VALUES (1)"), None);
        assert_eq!(formatter.group_of("CREATE TABLESPACE x"), None);
    }

    #[test]
    fn test_format_is_order_independent_for_ddl() {
        let formatter = ScriptFormatter::new().unwrap();
        let a = "CREATE TABLE b (id INT);\nCREATE INDEX i ON a(id);\nCREATE TABLE a (id INT);";
        let b = "-- other dump\nCREATE INDEX i ON a(id);\nCREATE TABLE a (id INT);\nCREATE   TABLE b\n  (id INT);";

        assert_eq!(formatter.format(a), formatter.format(b));
        assert_eq!(
            formatter.format(a),
            "CREATE TABLE a (id INT);\nCREATE TABLE b (id INT);\n\nCREATE INDEX i ON a(id);\n"
        );
    }

    #[test]
    fn test_format_keeps_data_order() {
        let formatter = ScriptFormatter::new().unwrap();
        let sql = "INSERT INTO t VALUES (2);\nCREATE TABLE t (id INT);\nINSERT INTO t VALUES (1);";
        assert_eq!(
            formatter.format(sql),
            "CREATE TABLE t (id INT);\n\nINSERT INTO t VALUES (2);\nINSERT INTO t VALUES (1);\n"
        );
    }

    #[test]
    fn test_format_file_writes_sibling() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schema-001.sql");
        fs::write(&path, "CREATE TABLE z (id INT);CREATE SEQUENCE s;").unwrap();

        let formatter = ScriptFormatter::new().unwrap();
        let target = formatter.format_file(&path).unwrap();

        assert_eq!(target, dir.path().join("schema-001.sql.formatted"));
        assert_eq!(
            fs::read_to_string(target).unwrap(),
            "CREATE SEQUENCE s;\n\nCREATE TABLE z (id INT);\n"
        );
    }
}
