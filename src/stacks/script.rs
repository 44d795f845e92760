//! Scripting-language adapters: pytest and PHPUnit scaffolding.

use crate::spec::{spec_path, ProjectStack, VerificationSpec};

use super::{ident, GeneratedFile, Scaffold, StackAdapter};

const PYTHON_FRAMEWORKS: [&str; 3] = ["django", "flask", "fastapi"];
const PHP_FRAMEWORKS: [&str; 2] = ["laravel", "symfony"];

/// Python scaffolding via pytest.
pub struct PytestAdapter;

impl StackAdapter for PytestAdapter {
    fn name(&self) -> &'static str {
        "pytest"
    }

    fn matches(&self, stack: &ProjectStack) -> bool {
        stack.language == "python"
            || stack.test_runner == "pytest"
            || PYTHON_FRAMEWORKS.contains(&stack.framework.as_str())
    }

    fn generate(&self, spec: &VerificationSpec) -> Scaffold {
        let tests: String = spec
            .expectations
            .iter()
            .map(|exp| {
                format!(
                    "def test_expectation_{ident}_present():\n    \
                     keys = [e[\"key\"] for e in load_spec()[\"expectations\"]]\n    \
                     assert \"{key}\" in keys\n    \
                     # TODO: assert the behavior behind \"{title}\"\n",
                    ident = ident(&exp.key),
                    key = exp.key,
                    title = exp.title.replace('"', "'"),
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        let content = format!(
            "import json\n\n\n\
             def load_spec():\n    \
             with open(\"{path}\") as fh:\n        \
             return json.load(fh)\n\n\n\
             def test_spec_parses_and_targets_this_task():\n    \
             spec = load_spec()\n    \
             assert spec[\"task_id\"] == \"{task_id}\"\n    \
             assert isinstance(spec[\"expectations\"], list)\n\n\n\
             {tests}",
            path = spec_path(&spec.task_id),
            task_id = spec.task_id,
            tests = tests,
        );
        Scaffold {
            files: vec![GeneratedFile {
                path: format!("verification/test_{}.py", ident(&spec.task_id)),
                content,
            }],
            install_command: "pip install pytest".to_string(),
            test_command: "pytest verification".to_string(),
        }
    }
}

/// PHP scaffolding via PHPUnit.
pub struct PhpUnitAdapter;

impl StackAdapter for PhpUnitAdapter {
    fn name(&self) -> &'static str {
        "phpunit"
    }

    fn matches(&self, stack: &ProjectStack) -> bool {
        stack.language == "php"
            || stack.test_runner == "phpunit"
            || PHP_FRAMEWORKS.contains(&stack.framework.as_str())
    }

    fn generate(&self, spec: &VerificationSpec) -> Scaffold {
        let tests: String = spec
            .expectations
            .iter()
            .map(|exp| {
                format!(
                    "    public function testExpectation{ident}Present(): void\n    {{\n        \
                     $keys = array_map(fn ($e) => $e['key'], $this->spec()['expectations']);\n        \
                     $this->assertContains('{key}', $keys);\n        \
                     // TODO: assert the behavior behind \"{title}\"\n    }}\n",
                    ident = ident(&exp.key),
                    key = exp.key,
                    title = exp.title.replace('"', "'"),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let content = format!(
            "<?php\n\n\
             use PHPUnit\\Framework\\TestCase;\n\n\
             final class VerificationSpecTest extends TestCase\n{{\n    \
             private function spec(): array\n    {{\n        \
             $raw = file_get_contents('{path}');\n        \
             $this->assertNotFalse($raw);\n        \
             return json_decode($raw, true);\n    }}\n\n    \
             public function testSpecParsesAndTargetsThisTask(): void\n    {{\n        \
             $this->assertSame('{task_id}', $this->spec()['task_id']);\n    }}\n\n\
             {tests}}}\n",
            path = spec_path(&spec.task_id),
            task_id = spec.task_id,
            tests = tests,
        );
        Scaffold {
            files: vec![GeneratedFile {
                path: "verification/VerificationSpecTest.php".to_string(),
                content,
            }],
            install_command: "composer install".to_string(),
            test_command: "./vendor/bin/phpunit verification".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::test_support::{sample_spec, stack};

    #[test]
    fn pytest_suite_sanitizes_keys_into_identifiers() {
        let spec = sample_spec(stack("python", "", ""));
        let scaffold = PytestAdapter.generate(&spec);
        let content = &scaffold.files[0].content;
        assert!(content.contains("def test_expectation_expose_post_orders_1_present"));
        assert!(content.contains("assert spec[\"task_id\"] == \"t-0a1b2c3d\""));
        assert!(scaffold.files[0].path.ends_with("test_t_0a1b2c3d.py"));
    }

    #[test]
    fn phpunit_suite_reads_the_spec_file() {
        let spec = sample_spec(stack("php", "", ""));
        let scaffold = PhpUnitAdapter.generate(&spec);
        let content = &scaffold.files[0].content;
        assert!(content.contains("extends TestCase"));
        assert!(content.contains("assertSame('t-0a1b2c3d'"));
        assert!(content.contains("assertContains('persist-order-in-db-2'"));
    }
}
