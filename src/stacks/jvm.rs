//! JVM-language adapter: Gradle + JUnit scaffolding.
//!
//! The generated suite avoids a JSON dependency: the spec file is pretty
//! printed by the orchestrator, so `"task_id": "<id>"` substring checks are
//! stable.

use crate::spec::{spec_path, ProjectStack, VerificationSpec};

use super::{ident, GeneratedFile, Scaffold, StackAdapter};

const JVM_LANGUAGES: [&str; 2] = ["java", "kotlin"];
const JVM_FRAMEWORKS: [&str; 2] = ["spring", "spring-boot"];

/// JVM scaffolding via Gradle and JUnit 5.
pub struct GradleAdapter;

impl StackAdapter for GradleAdapter {
    fn name(&self) -> &'static str {
        "gradle"
    }

    fn matches(&self, stack: &ProjectStack) -> bool {
        JVM_LANGUAGES.contains(&stack.language.as_str())
            || stack.test_runner == "junit"
            || JVM_FRAMEWORKS.contains(&stack.framework.as_str())
    }

    fn generate(&self, spec: &VerificationSpec) -> Scaffold {
        let tests: String = spec
            .expectations
            .iter()
            .map(|exp| {
                format!(
                    "    @Test\n    void expectation{ident}Present() throws Exception {{\n        \
                     assertTrue(spec().contains(\"\\\"{key}\\\"\"));\n        \
                     // TODO: assert the behavior behind \"{title}\"\n    }}\n",
                    ident = ident(&exp.key),
                    key = exp.key,
                    title = exp.title.replace('"', "'"),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let content = format!(
            "import org.junit.jupiter.api.Test;\n\n\
             import java.nio.file.Files;\n\
             import java.nio.file.Paths;\n\n\
             import static org.junit.jupiter.api.Assertions.assertTrue;\n\n\
             class VerificationSpecTest {{\n\n    \
             private String spec() throws Exception {{\n        \
             return new String(Files.readAllBytes(Paths.get(\"{path}\")));\n    }}\n\n    \
             @Test\n    void specParsesAndTargetsThisTask() throws Exception {{\n        \
             assertTrue(spec().contains(\"\\\"task_id\\\": \\\"{task_id}\\\"\"));\n    }}\n\n\
             {tests}}}\n",
            path = spec_path(&spec.task_id),
            task_id = spec.task_id,
            tests = tests,
        );
        Scaffold {
            files: vec![GeneratedFile {
                path: "src/test/java/VerificationSpecTest.java".to_string(),
                content,
            }],
            install_command: "./gradlew assemble".to_string(),
            test_command: "./gradlew test".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::test_support::{sample_spec, stack};

    #[test]
    fn junit_suite_checks_spec_by_substring() {
        let spec = sample_spec(stack("kotlin", "", ""));
        let scaffold = GradleAdapter.generate(&spec);
        let content = &scaffold.files[0].content;
        assert!(content.contains("org.junit.jupiter.api.Test"));
        assert!(content.contains("\\\"task_id\\\": \\\"t-0a1b2c3d\\\""));
        assert!(content.contains("expectationexpose_post_orders_1Present"));
        assert_eq!(scaffold.test_command, "./gradlew test");
    }
}
