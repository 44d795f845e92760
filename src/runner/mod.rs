//! Rule evaluation against a local working copy.
//!
//! This is the engine behind the `rulecheck` binary that CI executes inside
//! the target repository. It discovers committed spec files, evaluates each
//! expectation's rules against the checkout and its git history, and renders
//! the report whose `PASS <key>` / `FAIL <key>` lines the webhook consumes.

use std::path::{Path, PathBuf};
use std::process::Command;

use glob::Pattern;
use walkdir::WalkDir;

use crate::spec::{Rule, VerificationSpec, SPEC_DIR};

/// Base refs tried in order when detecting what to diff against.
const BASE_REF_CANDIDATES: [&str; 4] = ["origin/main", "origin/master", "main", "master"];

/// Outcome of one rule evaluation.
#[derive(Debug, Clone)]
pub struct RuleOutcome {
    pub description: String,
    pub passed: bool,
    pub detail: String,
}

/// Outcome of one expectation: passes only if every rule passed.
#[derive(Debug, Clone)]
pub struct ExpectationReport {
    pub key: String,
    pub title: String,
    pub passed: bool,
    pub rules: Vec<RuleOutcome>,
}

/// Outcome of one spec: passes only if every expectation passed.
#[derive(Debug, Clone)]
pub struct SpecReport {
    pub task_id: String,
    pub passed: bool,
    pub expectations: Vec<ExpectationReport>,
}

/// Whole-run outcome across all discovered specs.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub specs: Vec<SpecReport>,
    pub parse_errors: Vec<String>,
    pub all_pass: bool,
}

/// Snapshot of the working copy the rules are evaluated against.
pub struct Workspace {
    root: PathBuf,
    tracked: Vec<String>,
    changed: Vec<String>,
    base_ref: Option<String>,
}

fn git_lines(root: &Path, args: &[&str]) -> Option<Vec<String>> {
    let output = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect(),
    )
}

/// First base ref candidate that resolves in this checkout.
fn detect_base_ref(root: &Path) -> Option<String> {
    BASE_REF_CANDIDATES.iter().copied().find_map(|candidate| {
        git_lines(root, &["rev-parse", "--verify", "--quiet", candidate])
            .filter(|lines| !lines.is_empty())
            .map(|_| candidate.to_string())
    })
}

/// Walk the tree when the checkout is not a git repository.
fn walk_files(root: &Path) -> Vec<String> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        })
        .collect()
}

impl Workspace {
    /// Inspect the working copy once; rule evaluation is pure afterwards.
    pub fn discover(root: &Path) -> Self {
        let tracked = git_lines(root, &["ls-files"]).unwrap_or_else(|| walk_files(root));
        let base_ref = detect_base_ref(root);
        let changed = base_ref
            .as_deref()
            .and_then(|base| {
                git_lines(root, &["diff", "--name-only", &format!("{}...HEAD", base)])
            })
            .unwrap_or_default();
        Self {
            root: root.to_path_buf(),
            tracked,
            changed,
            base_ref,
        }
    }

    fn matching<'a>(&self, paths: &'a [String], glob: &str) -> Vec<&'a String> {
        match Pattern::new(glob) {
            Ok(pattern) => paths.iter().filter(|p| pattern.matches(p)).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn read(&self, rel: &str) -> Option<String> {
        std::fs::read_to_string(self.root.join(rel)).ok()
    }
}

fn describe(rule: &Rule) -> String {
    match rule {
        Rule::Exists { glob } => format!("exists {}", glob),
        Rule::Changed { glob } => format!("changed {}", glob),
        Rule::Contains { glob, value } => format!("contains {} \"{}\"", glob, value),
        Rule::Regex { glob, pattern } => format!("regex {} /{}/", glob, pattern),
    }
}

/// Evaluate one rule against the workspace.
pub fn evaluate_rule(rule: &Rule, ws: &Workspace) -> RuleOutcome {
    let description = describe(rule);
    let (passed, detail) = match rule {
        Rule::Exists { glob } => {
            let matches = ws.matching(&ws.tracked, glob);
            match matches.first() {
                Some(first) => (true, format!("matched {}", first)),
                None => (false, "no tracked file matches".to_string()),
            }
        }
        Rule::Changed { glob } => match &ws.base_ref {
            None => (false, "no base ref resolved".to_string()),
            Some(base) => {
                let matches = ws.matching(&ws.changed, glob);
                match matches.first() {
                    Some(first) => (true, format!("{} changed since {}", first, base)),
                    None => (false, format!("nothing matching changed since {}", base)),
                }
            }
        },
        Rule::Contains { glob, value } => {
            let hit = ws
                .matching(&ws.tracked, glob)
                .into_iter()
                .find(|p| ws.read(p).map(|c| c.contains(value)).unwrap_or(false));
            match hit {
                Some(path) => (true, format!("found in {}", path)),
                None => (false, "substring not found in any matching file".to_string()),
            }
        }
        Rule::Regex { glob, pattern } => match regex::Regex::new(pattern) {
            Err(e) => (false, format!("invalid pattern: {}", e)),
            Ok(re) => {
                let hit = ws
                    .matching(&ws.tracked, glob)
                    .into_iter()
                    .find(|p| ws.read(p).map(|c| re.is_match(&c)).unwrap_or(false));
                match hit {
                    Some(path) => (true, format!("matched in {}", path)),
                    None => (false, "pattern not matched in any matching file".to_string()),
                }
            }
        },
    };
    RuleOutcome {
        description,
        passed,
        detail,
    }
}

/// Evaluate a spec: an expectation passes only if all of its rules pass.
pub fn evaluate_spec(spec: &VerificationSpec, ws: &Workspace) -> SpecReport {
    let expectations: Vec<ExpectationReport> = spec
        .expectations
        .iter()
        .map(|exp| {
            let rules: Vec<RuleOutcome> =
                exp.rules.iter().map(|r| evaluate_rule(r, ws)).collect();
            let passed = !rules.is_empty() && rules.iter().all(|r| r.passed);
            ExpectationReport {
                key: exp.key.clone(),
                title: exp.title.clone(),
                passed,
                rules,
            }
        })
        .collect();
    let passed = !expectations.is_empty() && expectations.iter().all(|e| e.passed);
    SpecReport {
        task_id: spec.task_id.clone(),
        passed,
        expectations,
    }
}

/// Discover spec files under `verification/specs/`, optionally filtered to
/// one task id. Unparseable files are reported, not skipped silently.
pub fn load_specs(
    root: &Path,
    task_filter: Option<&str>,
) -> (Vec<VerificationSpec>, Vec<String>) {
    let dir = root.join(SPEC_DIR);
    let mut specs = Vec::new();
    let mut errors = Vec::new();
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => return (specs, errors),
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    paths.sort();
    for path in paths {
        match std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str::<VerificationSpec>(&raw).map_err(|e| e.to_string()))
        {
            Ok(spec) => {
                if task_filter.map(|t| t == spec.task_id).unwrap_or(true) {
                    specs.push(spec);
                }
            }
            Err(e) => errors.push(format!("{}: {}", path.display(), e)),
        }
    }
    (specs, errors)
}

/// Discover and evaluate every spec in the checkout.
pub fn run(root: &Path, task_filter: Option<&str>) -> RunReport {
    let (specs, parse_errors) = load_specs(root, task_filter);
    let ws = Workspace::discover(root);
    let reports: Vec<SpecReport> = specs.iter().map(|s| evaluate_spec(s, &ws)).collect();
    let all_pass =
        !reports.is_empty() && parse_errors.is_empty() && reports.iter().all(|r| r.passed);
    RunReport {
        specs: reports,
        parse_errors,
        all_pass,
    }
}

/// Render the human-readable report.
///
/// The `PASS <key>` / `FAIL <key>` lines are a stable contract: the webhook
/// receiver parses them to apply per-expectation checklist results.
pub fn render_report(report: &RunReport) -> String {
    let mut out = String::new();
    for spec in &report.specs {
        out.push_str(&format!(
            "== spec {} ({} expectations)\n",
            spec.task_id,
            spec.expectations.len()
        ));
        for exp in &spec.expectations {
            let marker = if exp.passed { "PASS" } else { "FAIL" };
            out.push_str(&format!("{} {} {}\n", marker, exp.key, exp.title));
            for rule in &exp.rules {
                let marker = if rule.passed { "ok  " } else { "fail" };
                out.push_str(&format!(
                    "    {} {}: {}\n",
                    marker, rule.description, rule.detail
                ));
            }
        }
    }
    for error in &report.parse_errors {
        out.push_str(&format!("unreadable spec: {}\n", error));
    }
    if report.specs.is_empty() && report.parse_errors.is_empty() {
        out.push_str("no specs found under verification/specs\n");
    }
    out.push_str(&format!(
        "RESULT: {}\n",
        if report.all_pass { "PASS" } else { "FAIL" }
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::spec_path;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sample_spec(task_id: &str, rules: Vec<Rule>) -> VerificationSpec {
        VerificationSpec {
            schema_version: 1,
            task_id: task_id.to_string(),
            title: "Orders".to_string(),
            description: String::new(),
            stack: crate::spec::ProjectStack::default().normalized(),
            generated_at: "2026-01-01T00:00:00Z".to_string(),
            expectations: vec![crate::spec::Expectation {
                key: "orders-1".to_string(),
                title: "orders".to_string(),
                kind: crate::spec::ExpectationKind::Http,
                rules,
            }],
        }
    }

    #[test]
    fn exists_rule_matches_tracked_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/routes/orders.js", "post('/orders')");
        let ws = Workspace::discover(dir.path());

        let pass = evaluate_rule(
            &Rule::Exists { glob: "src/**/*.js".to_string() },
            &ws,
        );
        assert!(pass.passed, "{}", pass.detail);

        let fail = evaluate_rule(
            &Rule::Exists { glob: "contracts/**".to_string() },
            &ws,
        );
        assert!(!fail.passed);
    }

    #[test]
    fn contains_and_regex_rules_inspect_file_content() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/app.js", "router.post('/orders', createOrder)");
        let ws = Workspace::discover(dir.path());

        assert!(
            evaluate_rule(
                &Rule::Contains {
                    glob: "src/*".to_string(),
                    value: "/orders".to_string(),
                },
                &ws,
            )
            .passed
        );
        assert!(
            !evaluate_rule(
                &Rule::Contains {
                    glob: "src/*".to_string(),
                    value: "/payments".to_string(),
                },
                &ws,
            )
            .passed
        );
        assert!(
            evaluate_rule(
                &Rule::Regex {
                    glob: "src/*".to_string(),
                    pattern: r"router\.(post|put)".to_string(),
                },
                &ws,
            )
            .passed
        );
        // Invalid patterns fail the rule instead of crashing the runner.
        assert!(
            !evaluate_rule(
                &Rule::Regex {
                    glob: "src/*".to_string(),
                    pattern: "(unclosed".to_string(),
                },
                &ws,
            )
            .passed
        );
    }

    #[test]
    fn changed_rule_fails_gracefully_outside_git() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/app.js", "code");
        let ws = Workspace::discover(dir.path());
        let outcome = evaluate_rule(
            &Rule::Changed { glob: "src/**".to_string() },
            &ws,
        );
        assert!(!outcome.passed);
        assert!(outcome.detail.contains("no base ref"));
    }

    #[test]
    fn expectation_passes_only_when_every_rule_passes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/app.js", "orders");
        let ws = Workspace::discover(dir.path());

        let all_pass = sample_spec(
            "t-0a1b2c3d",
            vec![
                Rule::Exists { glob: "src/*".to_string() },
                Rule::Contains { glob: "src/*".to_string(), value: "orders".to_string() },
            ],
        );
        assert!(evaluate_spec(&all_pass, &ws).passed);

        // One failing rule sinks the expectation and the spec.
        let one_fails = sample_spec(
            "t-0a1b2c3d",
            vec![
                Rule::Exists { glob: "src/*".to_string() },
                Rule::Contains { glob: "src/*".to_string(), value: "payments".to_string() },
            ],
        );
        let report = evaluate_spec(&one_fails, &ws);
        assert!(!report.passed);
        assert!(!report.expectations[0].passed);
        assert!(report.expectations[0].rules[0].passed);
        assert!(!report.expectations[0].rules[1].passed);
    }

    #[test]
    fn run_discovers_specs_and_honors_the_task_filter() {
        let dir = tempfile::tempdir().unwrap();
        let spec_a = sample_spec(
            "t-aaaaaaaa",
            vec![Rule::Exists { glob: "src/*".to_string() }],
        );
        let spec_b = sample_spec(
            "t-bbbbbbbb",
            vec![Rule::Exists { glob: "missing/*".to_string() }],
        );
        write(
            dir.path(),
            &spec_path("t-aaaaaaaa"),
            &serde_json::to_string_pretty(&spec_a).unwrap(),
        );
        write(
            dir.path(),
            &spec_path("t-bbbbbbbb"),
            &serde_json::to_string_pretty(&spec_b).unwrap(),
        );
        write(dir.path(), "src/app.js", "code");

        // Both specs: the failing one sinks the run.
        let report = run(dir.path(), None);
        assert_eq!(report.specs.len(), 2);
        assert!(!report.all_pass);

        // Filtered to the passing task.
        let report = run(dir.path(), Some("t-aaaaaaaa"));
        assert_eq!(report.specs.len(), 1);
        assert!(report.all_pass);
    }

    #[test]
    fn unparseable_spec_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), &spec_path("t-aaaaaaaa"), "{not json");
        let report = run(dir.path(), None);
        assert_eq!(report.parse_errors.len(), 1);
        assert!(!report.all_pass);
        assert!(render_report(&report).contains("unreadable spec"));
    }

    #[test]
    fn report_format_carries_stable_pass_fail_lines() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/app.js", "orders");
        let spec = sample_spec(
            "t-0a1b2c3d",
            vec![Rule::Exists { glob: "src/*".to_string() }],
        );
        write(
            dir.path(),
            &spec_path("t-0a1b2c3d"),
            &serde_json::to_string_pretty(&spec).unwrap(),
        );

        let report = run(dir.path(), None);
        let rendered = render_report(&report);
        assert!(rendered.contains("PASS orders-1"));
        assert!(rendered.contains("RESULT: PASS"));

        // The webhook-side parser understands exactly this format.
        let parsed = crate::lifecycle::parse_summary(&rendered).unwrap();
        assert_eq!(parsed.get("orders-1"), Some(&true));
    }

    #[test]
    fn empty_checkout_does_not_pass() {
        let dir = tempfile::tempdir().unwrap();
        let report = run(dir.path(), None);
        assert!(report.specs.is_empty());
        assert!(!report.all_pass);
        assert!(render_report(&report).contains("no specs found"));
    }
}
