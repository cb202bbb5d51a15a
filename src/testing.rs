// file: src/testing.rs
// version: 1.2.0
// guid: 7d0f214a-9be6-4c31-8f5a-1d8e1c3b9a72

//! Test doubles for remote execution
//!
//! `FakeShell` answers commands from substring-matched canned responses and
//! records everything it is asked to run; `FakeConnector` hands out queued
//! shells per node IP. Both share their logs through `Arc` so tests keep a
//! handle after moving the fake into the code under test.

use crate::config::{ClusterSpec, NodeSpec};
use crate::error::InstallError;
use crate::network::{Connector, RemoteExecutor};
use crate::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum FakeOutcome {
    Ok(String),
    Fail { code: i32, output: String },
}

/// Scripted remote shell. Responses are matched by substring, first match
/// wins; later builder calls are consulted first so they can shadow
/// earlier ones. Commands without a match succeed with empty output.
#[derive(Clone)]
pub struct FakeShell {
    responses: Vec<(String, FakeOutcome)>,
    pub commands: Arc<Mutex<Vec<String>>>,
    pub uploads: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self {
            responses: vec![("uname -m".to_string(), FakeOutcome::Ok("x86_64".to_string()))],
            commands: Arc::new(Mutex::new(Vec::new())),
            uploads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn on(mut self, needle: &str, outcome: FakeOutcome) -> Self {
        self.responses.insert(0, (needle.to_string(), outcome));
        self
    }

    pub fn ok(self, needle: &str, output: &str) -> Self {
        self.on(needle, FakeOutcome::Ok(output.to_string()))
    }

    pub fn fail(self, needle: &str, output: &str) -> Self {
        self.on(
            needle,
            FakeOutcome::Fail {
                code: 1,
                output: output.to_string(),
            },
        )
    }

    pub fn commands_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.commands)
    }

    pub fn uploads_handle(&self) -> Arc<Mutex<Vec<(String, Vec<u8>)>>> {
        Arc::clone(&self.uploads)
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.contains(needle))
    }

    pub fn ran_count(&self, needle: &str) -> usize {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.contains(needle))
            .count()
    }
}

impl Default for FakeShell {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteExecutor for FakeShell {
    async fn run_command(&mut self, command: &str) -> Result<String> {
        self.commands.lock().unwrap().push(command.to_string());
        for (needle, outcome) in &self.responses {
            if command.contains(needle.as_str()) {
                return match outcome {
                    FakeOutcome::Ok(out) => Ok(out.clone()),
                    FakeOutcome::Fail { code, output } => Err(InstallError::Command {
                        command: command.to_string(),
                        code: *code,
                        output: output.clone(),
                    }),
                };
            }
        }
        Ok(String::new())
    }

    async fn write_file(&mut self, remote_path: &str, data: &[u8]) -> Result<()> {
        self.uploads
            .lock()
            .unwrap()
            .push((remote_path.to_string(), data.to_vec()));
        Ok(())
    }
}

/// Connector that pops a pre-queued `FakeShell` per `connect` call,
/// keyed by node IP. Connecting with nothing queued is a test bug and
/// surfaces as an SSH error.
pub struct FakeConnector {
    shells: Mutex<HashMap<String, VecDeque<FakeShell>>>,
    pub dialed: Arc<Mutex<Vec<String>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            shells: Mutex::new(HashMap::new()),
            dialed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn queue(&self, ip: &str, shell: FakeShell) {
        self.shells
            .lock()
            .unwrap()
            .entry(ip.to_string())
            .or_default()
            .push_back(shell);
    }

    pub fn dialed_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.dialed)
    }
}

impl Default for FakeConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _spec: &ClusterSpec, node: &NodeSpec) -> Result<Box<dyn RemoteExecutor>> {
        self.dialed.lock().unwrap().push(node.ip.clone());
        let shell = self
            .shells
            .lock()
            .unwrap()
            .get_mut(&node.ip)
            .and_then(|queue| queue.pop_front());
        match shell {
            Some(shell) => Ok(Box::new(shell)),
            None => Err(InstallError::ssh(format!(
                "no scripted shell queued for {}",
                node.ip
            ))),
        }
    }
}
