//! Literal find/replace rewriting of configuration files.
//!
//! Rules are applied in order, each one to the output of the previous one.
//! A replacement that contains a later rule's find text is therefore itself
//! rewritten by that later rule.

pub mod templates;

use crate::core::{Result, TestbedError};
use log::{debug, warn};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// One literal substitution: every occurrence of `find` becomes `replace`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionRule {
    pub find: String,
    pub replace: String,
}

impl SubstitutionRule {
    pub fn new(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self { find: find.into(), replace: replace.into() }
    }
}

/// Ordered rules for a single file.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionSet {
    rules: Vec<SubstitutionRule>,
}

/// What [`SubstitutionSet::apply`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub text: String,
    /// Occurrences replaced per rule, in rule order
    pub replacements: Vec<usize>,
}

impl RewriteOutcome {
    /// Rules whose find text was absent when their turn came.
    pub fn unmatched<'a>(&self, set: &'a SubstitutionSet) -> Vec<&'a SubstitutionRule> {
        set.rules
            .iter()
            .zip(&self.replacements)
            .filter(|(_, count)| **count == 0)
            .map(|(rule, _)| rule)
            .collect()
    }

    pub fn total(&self) -> usize {
        self.replacements.iter().sum()
    }
}

impl SubstitutionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, find: impl Into<String>, replace: impl Into<String>) -> Self {
        self.rules.push(SubstitutionRule::new(find, replace));
        self
    }

    pub fn rules(&self) -> &[SubstitutionRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule to `text`. Pure; touches no files.
    pub fn apply(&self, text: &str) -> RewriteOutcome {
        let mut current = text.to_string();
        let mut replacements = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            if rule.find.is_empty() {
                replacements.push(0);
                continue;
            }
            let count = current.matches(rule.find.as_str()).count();
            if count > 0 {
                current = current.replace(rule.find.as_str(), &rule.replace);
            }
            replacements.push(count);
        }

        RewriteOutcome { text: current, replacements }
    }
}

/// Rewrite `path` in place.
///
/// The new text goes to a temporary sibling which is then renamed over the
/// original. Unmatched rules are logged; with `strict` they fail the rewrite
/// before anything is written.
pub fn rewrite_file(path: &Path, set: &SubstitutionSet, strict: bool) -> Result<RewriteOutcome> {
    let rewrite_err = |reason: String| TestbedError::ConfigRewriteFailed {
        path: path.to_path_buf(),
        reason,
    };

    let original = fs::read_to_string(path).map_err(|e| rewrite_err(format!("read failed: {e}")))?;
    let outcome = set.apply(&original);

    let unmatched = outcome.unmatched(set);
    if !unmatched.is_empty() {
        if strict {
            let missing: Vec<&str> = unmatched.iter().map(|r| r.find.as_str()).collect();
            return Err(rewrite_err(format!("patterns not found: {missing:?}")));
        }
        for rule in unmatched {
            warn!("'{}' not found in {}, left unchanged", rule.find, path.display());
        }
    }

    let dir = path
        .parent()
        .ok_or_else(|| rewrite_err("path has no parent directory".to_string()))?;
    let mut temp = NamedTempFile::new_in(dir).map_err(|e| rewrite_err(format!("temp file: {e}")))?;
    temp.write_all(outcome.text.as_bytes())
        .map_err(|e| rewrite_err(format!("write failed: {e}")))?;
    temp.flush().map_err(|e| rewrite_err(format!("flush failed: {e}")))?;

    // Keep the file mode; cassandra-env.sh is sourced by the launcher.
    if let Err(e) = copy_mode(path, temp.path()) {
        warn!("Could not keep the mode of {}, it will be 0600: {}", path.display(), e);
    }

    temp.persist(path).map_err(|e| rewrite_err(format!("rename failed: {}", e.error)))?;

    debug!("Rewrote {} ({} replacements)", path.display(), outcome.total());
    Ok(outcome)
}

fn copy_mode(from: &Path, to: &Path) -> std::io::Result<()> {
    let permissions = fs::metadata(from)?.permissions();
    fs::set_permissions(to, permissions)
}
