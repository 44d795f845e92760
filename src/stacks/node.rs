//! JavaScript-family adapters: Jest (generic) and Vitest (component frameworks).

use crate::spec::{spec_path, ProjectStack, VerificationSpec};

use super::{GeneratedFile, Scaffold, StackAdapter};

const JS_LANGUAGES: [&str; 3] = ["javascript", "typescript", "node"];
const COMPONENT_FRAMEWORKS: [&str; 6] = ["react", "vue", "svelte", "next", "nuxt", "angular"];

fn expectation_tests_js(spec: &VerificationSpec) -> String {
    spec.expectations
        .iter()
        .map(|exp| {
            format!(
                "  test('expectation {key} is present in the spec', () => {{\n    \
                 expect(spec.expectations.map((e) => e.key)).toContain('{key}');\n    \
                 // TODO: assert the behavior behind \"{title}\"\n  }});\n",
                key = exp.key,
                title = exp.title.replace('"', "'"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Generic JavaScript test scaffolding via Jest.
pub struct JestAdapter;

impl StackAdapter for JestAdapter {
    fn name(&self) -> &'static str {
        "jest"
    }

    fn matches(&self, stack: &ProjectStack) -> bool {
        stack.test_runner == "jest" || JS_LANGUAGES.contains(&stack.language.as_str())
    }

    fn generate(&self, spec: &VerificationSpec) -> Scaffold {
        let content = format!(
            "const fs = require('fs');\n\n\
             const spec = JSON.parse(fs.readFileSync('{path}', 'utf8'));\n\n\
             describe('verification spec {task_id}', () => {{\n  \
             test('spec parses and targets this task', () => {{\n    \
             expect(spec.task_id).toBe('{task_id}');\n    \
             expect(Array.isArray(spec.expectations)).toBe(true);\n  }});\n\n\
             {tests}}});\n",
            path = spec_path(&spec.task_id),
            task_id = spec.task_id,
            tests = expectation_tests_js(spec),
        );
        Scaffold {
            files: vec![GeneratedFile {
                path: format!("verification/{}.test.js", spec.task_id),
                content,
            }],
            install_command: "npm install".to_string(),
            test_command: "npx jest verification".to_string(),
        }
    }
}

/// Component-framework test scaffolding via Vitest.
pub struct VitestAdapter;

impl StackAdapter for VitestAdapter {
    fn name(&self) -> &'static str {
        "vitest"
    }

    fn matches(&self, stack: &ProjectStack) -> bool {
        stack.test_runner == "vitest"
            || COMPONENT_FRAMEWORKS.contains(&stack.framework.as_str())
    }

    fn generate(&self, spec: &VerificationSpec) -> Scaffold {
        let content = format!(
            "import {{ describe, expect, test }} from 'vitest';\n\
             import {{ readFileSync }} from 'node:fs';\n\n\
             const spec = JSON.parse(readFileSync('{path}', 'utf8'));\n\n\
             describe('verification spec {task_id}', () => {{\n  \
             test('spec parses and targets this task', () => {{\n    \
             expect(spec.task_id).toBe('{task_id}');\n    \
             expect(Array.isArray(spec.expectations)).toBe(true);\n  }});\n\n\
             {tests}}});\n",
            path = spec_path(&spec.task_id),
            task_id = spec.task_id,
            tests = expectation_tests_js(spec),
        );
        Scaffold {
            files: vec![GeneratedFile {
                path: format!("verification/{}.test.mjs", spec.task_id),
                content,
            }],
            install_command: "npm install".to_string(),
            test_command: "npx vitest run verification".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::test_support::{sample_spec, stack};

    #[test]
    fn jest_suite_asserts_parse_task_id_and_each_expectation() {
        let spec = sample_spec(stack("javascript", "", ""));
        let scaffold = JestAdapter.generate(&spec);
        let content = &scaffold.files[0].content;
        assert!(content.contains("JSON.parse"));
        assert!(content.contains("expect(spec.task_id).toBe('t-0a1b2c3d')"));
        assert_eq!(content.matches("is present in the spec").count(), 2);
        assert_eq!(scaffold.test_command, "npx jest verification");
    }

    #[test]
    fn vitest_suite_uses_esm_imports() {
        let spec = sample_spec(stack("typescript", "react", ""));
        let scaffold = VitestAdapter.generate(&spec);
        let content = &scaffold.files[0].content;
        assert!(content.contains("from 'vitest'"));
        assert!(content.contains("toContain('expose-post-orders-1')"));
        assert!(scaffold.files[0].path.ends_with(".test.mjs"));
    }
}
