//! Expectation extraction from acceptance criteria and description text.
//!
//! The extractor never fails: it always returns at least one expectation,
//! and identical input always produces identical keys in identical order.

use crate::model::Task;

use super::{spec_path, Expectation, ExpectationKind, Rule};

/// Maximum candidates taken from a description when criteria have no bullets.
const MAX_SENTENCE_CANDIDATES: usize = 6;

/// Maximum slug length before the index suffix.
const MAX_SLUG_LEN: usize = 32;

/// Turn free text into a stable lowercase slug.
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "item".to_string()
    } else {
        slug
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// Classify a candidate line into an expectation kind by keyword matching.
fn classify(text: &str) -> ExpectationKind {
    let lower = text.to_lowercase();
    if contains_any(
        &lower,
        &["api", "endpoint", "route", "http", "rest", "post ", "get ", "put ", "delete ", "request"],
    ) {
        ExpectationKind::Http
    } else if contains_any(&lower, &["contract", "solidity", "token", "mint", "on-chain"]) {
        ExpectationKind::Contract
    } else if contains_any(&lower, &["cli", "command-line", "terminal command"]) {
        ExpectationKind::Cli
    } else if contains_any(&lower, &["ui", "page", "screen", "component", "button", "render", "form"]) {
        ExpectationKind::Ui
    } else if contains_any(&lower, &["db", "database", "persist", "migration", "schema", "store "]) {
        ExpectationKind::Db
    } else if contains_any(&lower, &["auth", "permission", "login", "security", "role", "session"]) {
        ExpectationKind::Security
    } else {
        ExpectationKind::File
    }
}

/// Map a candidate to the source-path glob its change should land in.
fn target_glob(text: &str, kind: ExpectationKind) -> String {
    let lower = text.to_lowercase();
    if contains_any(&lower, &["config", "configuration", "env"]) {
        return "**/*config*".to_string();
    }
    if contains_any(&lower, &["test", "spec "]) {
        return "**/*test*".to_string();
    }
    if contains_any(&lower, &["ci", "workflow", "pipeline"]) {
        return ".github/workflows/*".to_string();
    }
    match kind {
        ExpectationKind::Http => "src/**/*route*".to_string(),
        ExpectationKind::Contract => "contracts/**".to_string(),
        ExpectationKind::Cli => "src/**/*cli*".to_string(),
        ExpectationKind::Ui => "src/**/*component*".to_string(),
        ExpectationKind::Db => "src/**/*model*".to_string(),
        ExpectationKind::Security => "src/**/*auth*".to_string(),
        ExpectationKind::File | ExpectationKind::Unknown => "src/**".to_string(),
    }
}

/// Bullet-marked lines (`-` / `*`) from acceptance criteria.
fn bullet_candidates(criteria: &str) -> Vec<String> {
    criteria
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
                .map(|rest| rest.trim().to_string())
        })
        .filter(|c| !c.is_empty())
        .collect()
}

/// Sentence candidates from a description.
///
/// A single-sentence description is just the title restated and is not
/// decomposable, so it falls through to the title fallback.
fn sentence_candidates(description: &str) -> Vec<String> {
    let sentences: Vec<String> = description
        .split(['.', '!', '?'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .take(MAX_SENTENCE_CANDIDATES)
        .map(|s| s.to_string())
        .collect();
    if sentences.len() > 1 {
        sentences
    } else {
        Vec::new()
    }
}

fn build_expectation(task_id: &str, text: &str, index: usize) -> Expectation {
    let kind = classify(text);
    let key = format!("{}-{}", slugify(text), index + 1);
    let spec_file = spec_path(task_id);
    let rules = vec![
        Rule::Changed {
            glob: target_glob(text, kind),
        },
        Rule::Exists {
            glob: spec_file.clone(),
        },
        // Runner and spec stay mutually consistent: the committed spec
        // must mention the key the runner is checking.
        Rule::Contains {
            glob: spec_file,
            value: key.clone(),
        },
    ];
    Expectation {
        key,
        title: text.to_string(),
        kind,
        rules,
    }
}

/// Extract expectations from a task. Always returns at least one.
pub fn extract_expectations(task: &Task) -> Vec<Expectation> {
    let mut candidates = bullet_candidates(&task.acceptance_criteria);
    if candidates.is_empty() {
        candidates = sentence_candidates(&task.description);
    }
    if candidates.is_empty() {
        let title = if task.title.trim().is_empty() {
            "complete the task".to_string()
        } else {
            task.title.trim().to_string()
        };
        candidates.push(title);
    }
    candidates
        .iter()
        .enumerate()
        .map(|(index, text)| build_expectation(&task.id, text, index))
        .collect()
}
