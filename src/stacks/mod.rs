//! Stack adapters: generators for stack-idiomatic test scaffolding.
//!
//! Each adapter declares a `matches` predicate and a `generate` function.
//! Matching is registration order, first match wins; the catch-all fallback
//! always matches and emits a deliberately failing TODO test so unsupported
//! stacks are never silently skipped.

mod contract;
mod jvm;
mod node;
mod script;

pub use contract::HardhatAdapter;
pub use jvm::GradleAdapter;
pub use node::{JestAdapter, VitestAdapter};
pub use script::{PhpUnitAdapter, PytestAdapter};

use crate::spec::{ProjectStack, VerificationSpec};

/// A file emitted into the target repository branch.
#[derive(Debug, Clone)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

/// Generated test files plus the shell commands CI runs around them.
#[derive(Debug, Clone)]
pub struct Scaffold {
    pub files: Vec<GeneratedFile>,
    pub install_command: String,
    pub test_command: String,
}

/// A generator emitting test scaffolding idiomatic to one stack.
pub trait StackAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this adapter handles the (normalized) stack.
    fn matches(&self, stack: &ProjectStack) -> bool;

    /// Emit the scaffold for a spec.
    fn generate(&self, spec: &VerificationSpec) -> Scaffold;
}

/// Sanitize an expectation key into an identifier fragment.
fn ident(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Catch-all adapter for stacks without a generator.
///
/// Emits a failing shell test enumerating the spec's expectations as TODOs,
/// so an unsupported stack surfaces as a red run instead of a silent pass.
pub struct FallbackAdapter;

impl StackAdapter for FallbackAdapter {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn matches(&self, _stack: &ProjectStack) -> bool {
        true
    }

    fn generate(&self, spec: &VerificationSpec) -> Scaffold {
        let mut script = String::from("#!/bin/sh\n");
        script.push_str(&format!(
            "echo \"No test generator for stack '{}/{}'.\"\n",
            spec.stack.language, spec.stack.test_runner
        ));
        script.push_str("echo \"Outstanding expectations:\"\n");
        for exp in &spec.expectations {
            script.push_str(&format!("echo \"TODO {}: {}\"\n", exp.key, exp.title));
        }
        script.push_str("exit 1\n");
        Scaffold {
            files: vec![GeneratedFile {
                path: format!("verification/todo-{}.sh", spec.task_id),
                content: script,
            }],
            install_command: "true".to_string(),
            test_command: format!("sh verification/todo-{}.sh", spec.task_id),
        }
    }
}

/// Ordered adapter registry. First match wins.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn StackAdapter>>,
}

impl AdapterRegistry {
    /// The standard registry: contract, component-framework, generic JS,
    /// scripting, JVM, server-side scripting, then the fallback.
    pub fn standard() -> Self {
        Self {
            adapters: vec![
                Box::new(HardhatAdapter),
                Box::new(VitestAdapter),
                Box::new(JestAdapter),
                Box::new(PytestAdapter),
                Box::new(GradleAdapter),
                Box::new(PhpUnitAdapter),
                Box::new(FallbackAdapter),
            ],
        }
    }

    /// Select the adapter for a stack. The fallback guarantees a match.
    pub fn select(&self, stack: &ProjectStack) -> &dyn StackAdapter {
        static FALLBACK: FallbackAdapter = FallbackAdapter;
        self.adapters
            .iter()
            .find(|a| a.matches(stack))
            .map(|a| a.as_ref())
            .unwrap_or(&FALLBACK)
    }

    /// Generate the scaffold for a spec using its declared stack.
    pub fn generate(&self, spec: &VerificationSpec) -> Scaffold {
        let adapter = self.select(&spec.stack);
        tracing::debug!(adapter = adapter.name(), task = %spec.task_id, "generating scaffold");
        adapter.generate(spec)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::model::Task;
    use crate::spec::{build_spec, ProjectStack, VerificationSpec};

    /// A two-expectation spec for adapter tests.
    pub fn sample_spec(stack: ProjectStack) -> VerificationSpec {
        let mut task = Task::new("Orders", "Order handling");
        task.id = "t-0a1b2c3d".to_string();
        task.acceptance_criteria =
            "- expose POST /orders\n- persist order in DB".to_string();
        build_spec(&task, Some(&stack))
    }

    pub fn stack(language: &str, framework: &str, runner: &str) -> ProjectStack {
        ProjectStack {
            language: language.to_string(),
            framework: framework.to_string(),
            test_runner: runner.to_string(),
            package_manager: String::new(),
        }
        .normalized()
    }
}
