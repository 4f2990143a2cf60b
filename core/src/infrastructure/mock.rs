//! Mock process runner for testing.
//!
//! Records every executed `CommandLine` and serves pre-configured responses
//! in order, making it easy to write deterministic tests for orchestration
//! code without spawning processes.

use std::cell::RefCell;

use crate::error::{RcmError, Result};

use super::{CommandLine, ProcessRunner};

/// Test-double runner that records commands and returns preset responses.
///
/// Responses are consumed one per call, across `run`, `capture` and `exec`
/// alike; when the queue is exhausted, calls succeed with empty output.
pub struct MockRunner {
    responses: RefCell<Vec<std::result::Result<String, String>>>,
    commands: RefCell<Vec<CommandLine>>,
}

impl MockRunner {
    pub fn new() -> Self {
        MockRunner {
            responses: RefCell::new(Vec::new()),
            commands: RefCell::new(Vec::new()),
        }
    }

    pub fn with_responses(responses: Vec<std::result::Result<String, String>>) -> Self {
        let mut reversed = responses;
        reversed.reverse();
        MockRunner {
            responses: RefCell::new(reversed),
            commands: RefCell::new(Vec::new()),
        }
    }

    /// All commands executed against this runner, in order.
    pub fn executed_commands(&self) -> Vec<CommandLine> {
        self.commands.borrow().clone()
    }

    fn next_response(&self, cmd: &CommandLine) -> Result<String> {
        self.commands.borrow_mut().push(cmd.clone());

        match self.responses.borrow_mut().pop() {
            Some(Ok(output)) => Ok(output),
            Some(Err(stderr)) => Err(RcmError::ExternalCommandFailed {
                program: cmd.program_name(),
                status: 1,
                stderr,
            }),
            None => Ok(String::new()),
        }
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner for MockRunner {
    fn run(&self, cmd: &CommandLine) -> Result<()> {
        self.next_response(cmd).map(|_| ())
    }

    fn capture(&self, cmd: &CommandLine) -> Result<String> {
        self.next_response(cmd)
    }

    fn exec(&self, cmd: &CommandLine) -> Result<()> {
        self.next_response(cmd).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(name: &str) -> CommandLine {
        CommandLine::new(name, vec![])
    }

    #[test]
    fn records_commands_in_order() {
        let runner = MockRunner::new();
        runner.run(&cmd("first")).unwrap();
        runner.capture(&cmd("second")).unwrap();

        let commands = runner.executed_commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].program_name(), "first");
        assert_eq!(commands[1].program_name(), "second");
    }

    #[test]
    fn serves_responses_in_order() {
        let runner = MockRunner::with_responses(vec![
            Ok("one".into()),
            Err("boom".into()),
            Ok("three".into()),
        ]);
        assert_eq!(runner.capture(&cmd("a")).unwrap(), "one");
        assert!(runner.run(&cmd("b")).is_err());
        assert_eq!(runner.capture(&cmd("c")).unwrap(), "three");
    }

    #[test]
    fn exhausted_queue_defaults_to_empty_ok() {
        let runner = MockRunner::new();
        assert_eq!(runner.capture(&cmd("anything")).unwrap(), "");
    }

    #[test]
    fn error_response_carries_stderr() {
        let runner = MockRunner::with_responses(vec![Err("no such node".into())]);
        match runner.run(&cmd("redis-cli")).unwrap_err() {
            RcmError::ExternalCommandFailed { stderr, .. } => {
                assert_eq!(stderr, "no such node");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
