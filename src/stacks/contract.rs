//! Contract-language adapter: Hardhat (Mocha/Chai) scaffolding.

use crate::spec::{spec_path, ProjectStack, VerificationSpec};

use super::{GeneratedFile, Scaffold, StackAdapter};

const CONTRACT_FRAMEWORKS: [&str; 3] = ["hardhat", "foundry", "truffle"];

/// Solidity / contract-framework scaffolding via Hardhat.
pub struct HardhatAdapter;

impl StackAdapter for HardhatAdapter {
    fn name(&self) -> &'static str {
        "hardhat"
    }

    fn matches(&self, stack: &ProjectStack) -> bool {
        stack.language == "solidity"
            || stack.test_runner == "hardhat"
            || CONTRACT_FRAMEWORKS.contains(&stack.framework.as_str())
    }

    fn generate(&self, spec: &VerificationSpec) -> Scaffold {
        let tests: String = spec
            .expectations
            .iter()
            .map(|exp| {
                format!(
                    "  it('expectation {key} is present in the spec', function () {{\n    \
                     expect(spec.expectations.map((e) => e.key)).to.include('{key}');\n    \
                     // TODO: assert the contract behavior behind \"{title}\"\n  }});\n",
                    key = exp.key,
                    title = exp.title.replace('"', "'"),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let content = format!(
            "const {{ expect }} = require('chai');\n\
             const fs = require('fs');\n\n\
             const spec = JSON.parse(fs.readFileSync('{path}', 'utf8'));\n\n\
             describe('verification spec {task_id}', function () {{\n  \
             it('spec parses and targets this task', function () {{\n    \
             expect(spec.task_id).to.equal('{task_id}');\n    \
             expect(spec.expectations).to.be.an('array');\n  }});\n\n\
             {tests}}});\n",
            path = spec_path(&spec.task_id),
            task_id = spec.task_id,
            tests = tests,
        );
        let test_file = format!("verification/{}.test.js", spec.task_id);
        Scaffold {
            files: vec![GeneratedFile {
                path: test_file.clone(),
                content,
            }],
            install_command: "npm install".to_string(),
            test_command: format!("npx hardhat test {}", test_file),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::test_support::{sample_spec, stack};

    #[test]
    fn hardhat_suite_uses_chai_and_targets_the_test_file() {
        let spec = sample_spec(stack("solidity", "", ""));
        let scaffold = HardhatAdapter.generate(&spec);
        let content = &scaffold.files[0].content;
        assert!(content.contains("require('chai')"));
        assert!(content.contains("to.equal('t-0a1b2c3d')"));
        assert!(content.contains("to.include('persist-order-in-db-2')"));
        assert_eq!(
            scaffold.test_command,
            "npx hardhat test verification/t-0a1b2c3d.test.js"
        );
    }
}
