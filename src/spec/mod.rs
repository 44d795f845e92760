//! Verification specs: structured expectations derived from task text.
//!
//! A [`VerificationSpec`] is a value object committed into the target
//! repository branch — the branch, not the application store, is the source
//! of truth for what was actually verified. The remote runner understands
//! only [`Rule`]s; expectation kind and title are presentation-only.

mod builder;
mod extract;

pub use builder::{build_spec, ProjectStack};
pub use extract::extract_expectations;

use serde::{Deserialize, Serialize};

/// Current spec schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Directory inside the target repository holding spec files.
pub const SPEC_DIR: &str = "verification/specs";

/// Path of a task's spec file inside the target repository.
pub fn spec_path(task_id: &str) -> String {
    format!("{}/{}.json", SPEC_DIR, task_id)
}

/// Inferred expectation category (presentation-only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectationKind {
    Http,
    Contract,
    Cli,
    Ui,
    File,
    Db,
    Security,
    Unknown,
}

/// An atomic, mechanically checkable condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    /// At least one tracked file matches the glob.
    Exists { glob: String },
    /// At least one file matching the glob differs from the base branch.
    Changed { glob: String },
    /// Among matched files, at least one contains the literal substring.
    Contains { glob: String, value: String },
    /// Among matched files, at least one matches the pattern.
    Regex { glob: String, pattern: String },
}

/// One structurally-verifiable claim derived from acceptance criteria.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expectation {
    /// `<slug>-<index>`, stable and unique within a spec.
    pub key: String,
    pub title: String,
    pub kind: ExpectationKind,
    pub rules: Vec<Rule>,
}

/// The versioned, branch-committed document listing a task's expectations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSpec {
    pub schema_version: u32,
    pub task_id: String,
    pub title: String,
    pub description: String,
    pub stack: ProjectStack,
    pub generated_at: String,
    pub expectations: Vec<Expectation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_path_is_keyed_by_task_id() {
        assert_eq!(spec_path("t-0a1b2c3d"), "verification/specs/t-0a1b2c3d.json");
    }

    #[test]
    fn rules_serialize_with_tagged_names() {
        let rule = Rule::Contains {
            glob: "src/**".to_string(),
            value: "orders".to_string(),
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["rule"], "contains");
        assert_eq!(json["glob"], "src/**");

        let regex = Rule::Regex {
            glob: "src/**".to_string(),
            pattern: "fn\\s+main".to_string(),
        };
        let json = serde_json::to_value(&regex).unwrap();
        assert_eq!(json["rule"], "regex");

        let back: Rule = serde_json::from_value(json).unwrap();
        assert_eq!(
            back,
            Rule::Regex {
                glob: "src/**".to_string(),
                pattern: "fn\\s+main".to_string(),
            }
        );
    }
}
