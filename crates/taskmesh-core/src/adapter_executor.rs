use std::process::Stdio;
use std::time::Duration;

use taskmesh_types::adapter::{AdapterConfig, SandboxKind};
use taskmesh_types::circuit::CircuitState;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::circuit_breaker::CircuitBreakers;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct AdapterOutput {
    pub adapter_id: String,
    pub stdout: String,
    pub attempts_before_success: u32,
}

/// Runs role prompts through CLI adapters in the configured fallback order.
/// The executor only *reads* circuit state — whether a failure opens or
/// narrows a circuit is the Supervisor's decision, made with visibility
/// across every task, not this single call.
#[derive(Clone)]
pub struct AdapterExecutor {
    circuits: CircuitBreakers,
}

impl AdapterExecutor {
    pub fn new(circuits: CircuitBreakers) -> Self {
        Self { circuits }
    }

    /// Tries each adapter in `order` in turn, skipping any whose circuit is
    /// `Open`, until one succeeds or the list is exhausted. `skip_adapter`
    /// additionally excludes one id outright, used
    /// for `RetryRole { skip_adapter }`.
    pub async fn execute(
        &self,
        order: &[AdapterConfig],
        prompt: &str,
        timeout_seconds: u64,
        skip_adapter: Option<&str>,
    ) -> CoreResult<AdapterOutput> {
        if order.is_empty() {
            return Err(CoreError::AdaptersExhausted {
                role: "unspecified".to_string(),
            });
        }

        let mut attempts = 0u32;
        let mut last_err: Option<CoreError> = None;

        for adapter in order {
            if Some(adapter.id.as_str()) == skip_adapter {
                continue;
            }

            let state = self.circuits.usable_state(&adapter.id).await;
            if state == CircuitState::Open {
                continue;
            }

            attempts += 1;
            match self.run_one(adapter, prompt, timeout_seconds).await {
                Ok(stdout) => {
                    return Ok(AdapterOutput {
                        adapter_id: adapter.id.clone(),
                        stdout,
                        attempts_before_success: attempts,
                    })
                }
                Err(err) => {
                    last_err = Some(err);
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or(CoreError::AdaptersExhausted {
            role: "unspecified".to_string(),
        }))
    }

    async fn run_one(&self, adapter: &AdapterConfig, prompt: &str, timeout_seconds: u64) -> CoreResult<String> {
        let mut command = self.build_command(adapter);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|source| CoreError::AdapterSpawn {
                adapter_id: adapter.id.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(prompt.as_bytes()).await;
        }

        let wait = timeout(Duration::from_secs(timeout_seconds), child.wait_with_output());

        let output = match wait.await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(CoreError::AdapterSpawn {
                    adapter_id: adapter.id.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(CoreError::AdapterTimeout {
                    adapter_id: adapter.id.clone(),
                    timeout_seconds,
                })
            }
        };

        if !output.status.success() {
            return Err(CoreError::AdapterNonZeroExit {
                adapter_id: adapter.id.clone(),
                status: output.status.code().unwrap_or(-1),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn build_command(&self, adapter: &AdapterConfig) -> Command {
        let mut command = match adapter.sandbox {
            SandboxKind::Host => {
                let mut c = Command::new(&adapter.command);
                c.args(&adapter.args);
                c
            }
            SandboxKind::Docker => {
                let mut c = Command::new("docker");
                c.args(["run", "--rm", "-i"]);
                c.arg(&adapter.command);
                c.args(&adapter.args);
                c
            }
            SandboxKind::AppleContainer => {
                let mut c = Command::new("container");
                c.args(["run", "--rm", "-i"]);
                c.arg(&adapter.command);
                c.args(&adapter.args);
                c
            }
        };

        for (key, value) in &adapter.env {
            command.env(key, value);
        }

        if let Some(dir) = &adapter.working_dir {
            command.current_dir(dir);
        }

        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn echo_adapter(id: &str) -> AdapterConfig {
        AdapterConfig {
            id: id.to_string(),
            command: "cat".to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            sandbox: SandboxKind::Host,
            reliability_prior: 0.7,
        }
    }

    #[tokio::test]
    async fn executes_against_first_available_adapter() {
        let executor = AdapterExecutor::new(CircuitBreakers::new(3, 60));
        let order = vec![echo_adapter("cat-1")];
        let result = executor.execute(&order, "hello", 5, None).await.unwrap();
        assert_eq!(result.adapter_id, "cat-1");
        assert_eq!(result.stdout, "hello");
        assert_eq!(result.attempts_before_success, 1);
    }

    #[tokio::test]
    async fn falls_back_to_second_adapter_when_first_fails() {
        let executor = AdapterExecutor::new(CircuitBreakers::new(3, 60));
        let mut broken = echo_adapter("broken");
        broken.command = "false".to_string();
        let order = vec![broken, echo_adapter("cat-1")];
        let result = executor.execute(&order, "hello", 5, None).await.unwrap();
        assert_eq!(result.adapter_id, "cat-1");
        assert_eq!(result.attempts_before_success, 2);
    }

    #[tokio::test]
    async fn skip_adapter_is_never_attempted() {
        let executor = AdapterExecutor::new(CircuitBreakers::new(3, 60));
        let order = vec![echo_adapter("cat-1"), echo_adapter("cat-2")];
        let result = executor
            .execute(&order, "hello", 5, Some("cat-1"))
            .await
            .unwrap();
        assert_eq!(result.adapter_id, "cat-2");
    }

    #[tokio::test]
    async fn open_circuit_is_skipped_without_attempting() {
        let circuits = CircuitBreakers::new(1, 600);
        circuits.record_failure("cat-1").await;
        let executor = AdapterExecutor::new(circuits);
        let order = vec![echo_adapter("cat-1"), echo_adapter("cat-2")];
        let result = executor.execute(&order, "hello", 5, None).await.unwrap();
        assert_eq!(result.adapter_id, "cat-2");
    }

    #[tokio::test]
    async fn empty_order_is_immediately_exhausted() {
        let executor = AdapterExecutor::new(CircuitBreakers::new(3, 60));
        let result = executor.execute(&[], "hello", 5, None).await;
        assert!(matches!(result, Err(CoreError::AdaptersExhausted { .. })));
    }
}
