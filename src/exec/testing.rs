//! Scripted executor for unit tests.

#![allow(clippy::unwrap_used)]

use std::{collections::VecDeque, sync::Mutex};

use async_trait::async_trait;

use super::{CommandOutput, ExecRequest, ProcessExecutor};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Output(CommandOutput),
    SpawnError(String),
}

/// Successful reply with the given stdout.
pub(crate) fn ok(stdout: &str) -> Reply {
    Reply::Output(CommandOutput { stdout: stdout.to_string(), ..CommandOutput::default() })
}

/// Failed reply with the given exit code and stderr.
pub(crate) fn fail(exit_code: i32, stderr: &str) -> Reply {
    Reply::Output(CommandOutput {
        stderr: stderr.to_string(),
        exit_code,
        ..CommandOutput::default()
    })
}

/// Reply that simulates the command not being runnable at all.
pub(crate) fn spawn_error(msg: &str) -> Reply {
    Reply::SpawnError(msg.to_string())
}

struct Rule {
    prefix: String,
    replies: VecDeque<Reply>,
}

/// Executor that answers by command-line prefix.
///
/// Registering the same prefix several times queues replies in order; the
/// last reply repeats once the queue is drained. The longest matching prefix
/// wins. Unmatched commands succeed with empty output.
#[derive(Default)]
pub(crate) struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<ExecRequest>>,
}

impl ScriptedExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(self, prefix: &str, reply: Reply) -> Self {
        {
            let mut rules = self.rules.lock().unwrap();
            if let Some(rule) = rules.iter_mut().find(|r| r.prefix == prefix) {
                rule.replies.push_back(reply);
            } else {
                rules.push(Rule { prefix: prefix.to_string(), replies: VecDeque::from([reply]) });
            }
        }
        self
    }

    /// Command lines executed so far, in order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(ExecRequest::command_line).collect()
    }

    /// Full requests executed so far, in order.
    pub(crate) fn requests(&self) -> Vec<ExecRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[async_trait]
impl ProcessExecutor for ScriptedExecutor {
    async fn execute(&self, request: &ExecRequest) -> Result<CommandOutput> {
        let line = request.command_line();
        self.calls.lock().unwrap().push(request.clone());

        let reply = {
            let mut rules = self.rules.lock().unwrap();
            let rule = rules
                .iter_mut()
                .filter(|r| line.starts_with(&r.prefix))
                .max_by_key(|r| r.prefix.len());
            match rule {
                Some(rule) if rule.replies.len() > 1 => rule.replies.pop_front(),
                Some(rule) => rule.replies.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::SpawnError(msg)) => Err(Error::other(msg)),
            None => Ok(CommandOutput::default()),
        }
    }
}
