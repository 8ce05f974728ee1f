//! Lockfile record parsing.
//!
//! Lockfiles describe packages as blocks of `Key: Value` lines, one
//! attribute per line, blocks separated by blank lines. Parsing is
//! best-effort: a bad line or an unknown key is logged and skipped, never
//! fatal. Graph-level validation happens later, in [`crate::graph`].

use crate::types::{PackageName, Version};

/// One package's parsed requirement block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    /// Package name, unique within a resolution run.
    pub package: PackageName,
    /// Pinned version.
    pub version: Version,
    /// Name of the origin repository.
    pub source: String,
    /// Opaque content identity.
    pub hash: String,
    /// Names of the packages this one requires, in written order.
    pub requires: Vec<PackageName>,
}

/// Collapse `newline + tab` continuations into the preceding line.
///
/// Lockfile writers wrap long `Requires` lists over indented continuation
/// lines; joining them first keeps the line parser free of lookahead.
pub fn collapse_indentation(input: &str) -> String {
    input.replace("\n\t", "")
}

/// Parse a stream of record blocks into package records.
///
/// Records without a `Package` key are dropped with a diagnostic. Everything
/// else is tolerated: unknown keys, lines with no colon, stray whitespace.
pub fn parse_records(input: &str) -> Vec<PackageRecord> {
    let input = collapse_indentation(input);
    let mut records = Vec::new();
    let mut current = RecordBuilder::default();

    for (lineno, raw) in input.lines().enumerate() {
        let line = raw.trim_end();
        if line.trim().is_empty() {
            current.flush_into(&mut records);
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            tracing::warn!(line = lineno + 1, content = line, "bad lockfile line, skipping");
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "Package" => {
                // A new Package key starts a new record even without a
                // separating blank line.
                if current.package.is_some() {
                    current.flush_into(&mut records);
                }
                current.package = Some(PackageName::new(value));
            }
            "Version" => current.version = Some(Version::new(value)),
            "Source" => current.source = Some(value.to_string()),
            "Hash" => current.hash = Some(value.to_string()),
            "Requires" => current.requires = split_requires(value),
            _ => {
                tracing::warn!(line = lineno + 1, key, value, "unrecognized lockfile field");
            }
        }
    }
    current.flush_into(&mut records);

    records
}

/// Split a `Requires` value on commas and/or whitespace.
fn split_requires(value: &str) -> Vec<PackageName> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(PackageName::new)
        .collect()
}

#[derive(Debug, Default)]
struct RecordBuilder {
    package: Option<PackageName>,
    version: Option<Version>,
    source: Option<String>,
    hash: Option<String>,
    requires: Vec<PackageName>,
}

impl RecordBuilder {
    /// Finish the record in progress, if any, and reset the builder.
    fn flush_into(&mut self, records: &mut Vec<PackageRecord>) {
        let builder = std::mem::take(self);
        let Some(package) = builder.package else {
            if builder.version.is_some() || builder.source.is_some() || builder.hash.is_some() {
                tracing::warn!("dropping record block with no Package field");
            }
            return;
        };
        records.push(PackageRecord {
            package,
            version: builder.version.unwrap_or_else(|| Version::new("")),
            source: builder.source.unwrap_or_default(),
            hash: builder.hash.unwrap_or_default(),
            requires: builder.requires,
        });
    }
}
