//! Rule evaluation runner.
//!
//! Shipped into target repositories and executed by CI. Discovers committed
//! verification specs, evaluates every rule against the checkout, prints the
//! per-rule and per-expectation report, and exits 0 only when everything
//! passed (the exit code is CI's pass/fail signal).
//!
//! Usage: `rulecheck [--root <path>] [--task <task-id>]`

use std::path::PathBuf;
use std::process::ExitCode;

use taskproof::runner;

fn main() -> ExitCode {
    let mut root = PathBuf::from(".");
    let mut task: Option<String> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--root" => {
                root = match args.next() {
                    Some(value) => PathBuf::from(value),
                    None => {
                        eprintln!("--root requires a path");
                        return ExitCode::from(2);
                    }
                };
            }
            "--task" => {
                task = args.next();
                if task.is_none() {
                    eprintln!("--task requires a task id");
                    return ExitCode::from(2);
                }
            }
            "--help" | "-h" => {
                println!("Usage: rulecheck [--root <path>] [--task <task-id>]");
                return ExitCode::SUCCESS;
            }
            other => {
                eprintln!("unknown argument: {}", other);
                return ExitCode::from(2);
            }
        }
    }

    let report = runner::run(&root, task.as_deref());
    print!("{}", runner::render_report(&report));
    if report.all_pass {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
