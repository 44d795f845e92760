//! Verification spec builder: composes extracted expectations with a
//! normalized project stack.

use serde::{Deserialize, Serialize};

use crate::model::{now_string, Task};

use super::{extract_expectations, VerificationSpec, SCHEMA_VERSION};

/// Declared or detected technology stack of a project.
///
/// Unknown fields stay empty and are filled by [`ProjectStack::normalized`];
/// verification must proceed even with incomplete stack metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStack {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub framework: String,
    #[serde(default)]
    pub test_runner: String,
    #[serde(default)]
    pub package_manager: String,
}

impl ProjectStack {
    /// Fill missing fields from the default profile (mainstream web stack),
    /// picking runner/package-manager defaults appropriate to the language.
    pub fn normalized(&self) -> Self {
        let pick = |value: &str, default: &str| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed.to_lowercase()
            }
        };
        let language = pick(&self.language, "javascript");
        let (framework, runner, pkg) = match language.as_str() {
            "python" => ("generic", "pytest", "pip"),
            "java" | "kotlin" => ("generic", "junit", "gradle"),
            "php" => ("generic", "phpunit", "composer"),
            "solidity" => ("hardhat", "hardhat", "npm"),
            "javascript" | "typescript" | "node" => ("express", "jest", "npm"),
            _ => ("generic", "jest", "npm"),
        };
        Self {
            framework: pick(&self.framework, framework),
            test_runner: pick(&self.test_runner, runner),
            package_manager: pick(&self.package_manager, pkg),
            language,
        }
    }
}

/// Build a task's verification spec. Pure apart from the timestamp.
pub fn build_spec(task: &Task, stack: Option<&ProjectStack>) -> VerificationSpec {
    let stack = stack.cloned().unwrap_or_default().normalized();
    VerificationSpec {
        schema_version: SCHEMA_VERSION,
        task_id: task.id.clone(),
        title: task.title.clone(),
        description: task.description.clone(),
        stack,
        generated_at: now_string(),
        expectations: extract_expectations(task),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_stack_falls_back_to_default_profile() {
        let task = Task::new("Checkout", "Build the checkout flow");
        let spec = build_spec(&task, None);
        assert_eq!(spec.stack.language, "javascript");
        assert_eq!(spec.stack.framework, "express");
        assert_eq!(spec.stack.test_runner, "jest");
        assert_eq!(spec.stack.package_manager, "npm");
        assert_eq!(spec.schema_version, SCHEMA_VERSION);
        assert_eq!(spec.task_id, task.id);
        assert!(!spec.expectations.is_empty());
    }

    #[test]
    fn partial_stack_keeps_declared_fields() {
        let declared = ProjectStack {
            language: "Python".to_string(),
            test_runner: "pytest".to_string(),
            ..ProjectStack::default()
        };
        let normalized = declared.normalized();
        assert_eq!(normalized.language, "python");
        assert_eq!(normalized.test_runner, "pytest");
        assert_eq!(normalized.framework, "generic");
        assert_eq!(normalized.package_manager, "pip");
    }

    #[test]
    fn jvm_stack_defaults_do_not_inherit_the_web_runner() {
        let declared = ProjectStack {
            language: "Java".to_string(),
            ..ProjectStack::default()
        };
        let normalized = declared.normalized();
        assert_eq!(normalized.test_runner, "junit");
        assert_eq!(normalized.package_manager, "gradle");
    }

    #[test]
    fn rebuilding_a_spec_yields_identical_keys() {
        let mut task = Task::new("Orders", "");
        task.acceptance_criteria = "- expose POST /orders\n- persist order in DB".to_string();
        let first = build_spec(&task, None);
        let second = build_spec(&task, None);
        let first_keys: Vec<&str> = first.expectations.iter().map(|e| e.key.as_str()).collect();
        let second_keys: Vec<&str> = second.expectations.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(first_keys, second_keys);
    }
}
