//! Mock implementation of the command executor for testing purposes.
//!
//! Every invocation is recorded. Responses are scripted by argument prefix;
//! anything without a matching rule succeeds with empty output.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use microcloud_command::{CommandExecutor, CommandFailure, CommandLine, CommandOutput};
use parking_lot::Mutex;

/// Scripted result for a matching command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Response {
    /// Exit successfully with the given output.
    Success(CommandOutput),

    /// Exit with a non-zero code and the given stderr.
    Fail {
        /// Standard error text.
        diagnostic: String,

        /// Exit code.
        exit_code: i32,
    },

    /// Run past the timeout.
    Timeout,
}

impl Response {
    /// Successful exit with the given stdout.
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self::Success(CommandOutput::stdout(stdout))
    }

    /// Failed exit.
    pub fn fail(diagnostic: impl Into<String>, exit_code: i32) -> Self {
        Self::Fail {
            diagnostic: diagnostic.into(),
            exit_code,
        }
    }
}

#[derive(Debug)]
struct Rule {
    prefix: Vec<String>,
    remaining: Option<usize>,
    response: Response,
}

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<CommandLine>,
    rules: Vec<Rule>,
}

/// Recording command executor.
#[derive(Clone, Debug, Default)]
pub struct MockExecutor {
    inner: Arc<Mutex<Inner>>,
}

impl MockExecutor {
    /// Creates a new mock where every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every command starting with `prefix` with `response`.
    ///
    /// Later rules take precedence over earlier ones.
    pub fn respond(&self, prefix: &[&str], response: Response) {
        self.add_rule(prefix, response, None);
    }

    /// Answers only the next command starting with `prefix` with `response`.
    pub fn respond_once(&self, prefix: &[&str], response: Response) {
        self.add_rule(prefix, response, Some(1));
    }

    /// Drops all scripted responses.
    pub fn reset_responses(&self) {
        self.inner.lock().rules.clear();
    }

    /// All commands run so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<CommandLine> {
        self.inner.lock().calls.clone()
    }

    /// Number of commands run so far that start with `prefix`.
    #[must_use]
    pub fn count(&self, prefix: &[&str]) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    /// Forgets the recorded commands.
    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    fn add_rule(&self, prefix: &[&str], response: Response, remaining: Option<usize>) {
        self.inner.lock().rules.push(Rule {
            prefix: prefix.iter().map(ToString::to_string).collect(),
            remaining,
            response,
        });
    }

    fn next_response(&self, command: &CommandLine) -> Option<Response> {
        let mut inner = self.inner.lock();
        inner.calls.push(command.clone());

        let rule = inner.rules.iter_mut().rev().find(|rule| {
            rule.remaining != Some(0) && {
                let prefix: Vec<&str> = rule.prefix.iter().map(String::as_str).collect();
                command.starts_with(&prefix)
            }
        })?;

        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining -= 1;
        }

        Some(rule.response.clone())
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn run(
        &self,
        command: &CommandLine,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandFailure> {
        match self.next_response(command) {
            None => Ok(CommandOutput::default()),
            Some(Response::Success(output)) => Ok(output),
            Some(Response::Fail {
                diagnostic,
                exit_code,
            }) => Err(CommandFailure::Failed {
                command: command.clone(),
                diagnostic,
                exit_code: Some(exit_code),
            }),
            Some(Response::Timeout) => Err(CommandFailure::TimedOut {
                command: command.clone(),
                timeout,
            }),
        }
    }
}
