//! Command-driven fleet control
//!
//! Runs the configured probe and converge shell commands. The probe
//! command must print a JSON object of `node -> liveness` on stdout
//! (the shape `salt --static --out=json '*' test.ping` produces).

use std::process::Output;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use super::{FleetControl, NodeId};
use crate::config::FleetConfig;
use crate::error::{Error, Result};

/// Fleet control backed by external commands
pub struct CommandFleet {
    probe_command: String,
    converge_command: String,
    command_timeout: Duration,
}

impl CommandFleet {
    /// Create a new command-driven fleet client
    pub fn new(config: &FleetConfig) -> Result<Self> {
        if config.probe_command.trim().is_empty() {
            return Err(Error::EmptyCommand("probe_command".into()));
        }
        if config.converge_command.trim().is_empty() {
            return Err(Error::EmptyCommand("converge_command".into()));
        }

        Ok(Self {
            probe_command: config.probe_command.clone(),
            converge_command: config.converge_command.clone(),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
        })
    }

    /// Run a shell command with the configured timeout
    async fn run(&self, command_line: &str) -> Result<Output> {
        let result = timeout(
            self.command_timeout,
            Command::new("sh").arg("-c").arg(command_line).output(),
        )
        .await;

        match result {
            Ok(output) => Ok(output?),
            Err(_) => Err(Error::CommandTimeout(self.command_timeout.as_secs())),
        }
    }
}

#[async_trait::async_trait]
impl FleetControl for CommandFleet {
    async fn probe(&self) -> Result<Vec<NodeId>> {
        tracing::debug!("Running probe command: {}", self.probe_command);

        let output = self.run(&self.probe_command).await?;

        // salt exits nonzero when any minion misses the deadline, but
        // respondents are still reported on stdout. Trust the output
        // when it parses; only an unparseable result is a probe failure.
        match parse_probe_output(&output.stdout) {
            Ok(nodes) => {
                if !output.status.success() {
                    tracing::debug!(
                        "Probe command exited with {} but produced usable output",
                        output.status
                    );
                }
                Ok(nodes)
            }
            Err(_) if !output.status.success() => Err(Error::Probe(format!(
                "probe command exited with {}: {}",
                output.status,
                stderr_snippet(&output.stderr)
            ))),
            Err(e) => Err(e),
        }
    }

    async fn converge(&self, node: &NodeId) -> Result<()> {
        let command_line = self.converge_command.replace("{node}", &shell_quote(node));
        tracing::debug!("Running converge command: {}", command_line);

        let output = self.run(&command_line).await?;

        if !output.status.success() {
            return Err(Error::Converge {
                node: node.clone(),
                reason: format!(
                    "command exited with {}: {}",
                    output.status,
                    stderr_snippet(&output.stderr)
                ),
            });
        }

        Ok(())
    }
}

/// Parse probe stdout: a JSON object of `node -> liveness`.
/// Nodes whose value is `false` or `null` answered but reported
/// themselves down; they are excluded from the roster.
fn parse_probe_output(stdout: &[u8]) -> Result<Vec<NodeId>> {
    let value: serde_json::Value = serde_json::from_slice(stdout)?;

    let map = value
        .as_object()
        .ok_or_else(|| Error::Probe("probe output is not a JSON object".into()))?;

    let nodes = map
        .iter()
        .filter(|(_, alive)| !matches!(alive, serde_json::Value::Bool(false) | serde_json::Value::Null))
        .map(|(node, _)| node.clone())
        .collect();

    Ok(nodes)
}

/// Single-quote a value for interpolation into an `sh -c` command line
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// First line of stderr, for error messages
fn stderr_snippet(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    text.lines().next().unwrap_or("(no stderr)").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FleetConfig;

    #[test]
    fn test_parse_probe_output() {
        let stdout = br#"{"web-1": true, "web-2": true, "db-1": true}"#;
        let nodes = parse_probe_output(stdout).unwrap();
        assert_eq!(nodes, vec!["db-1", "web-1", "web-2"]);
    }

    #[test]
    fn test_parse_probe_output_filters_down_nodes() {
        let stdout = br#"{"web-1": true, "web-2": false, "db-1": null}"#;
        let nodes = parse_probe_output(stdout).unwrap();
        assert_eq!(nodes, vec!["web-1"]);
    }

    #[test]
    fn test_parse_probe_output_empty_object() {
        let nodes = parse_probe_output(b"{}").unwrap();
        assert!(nodes.is_empty());
    }

    #[test]
    fn test_parse_probe_output_rejects_garbage() {
        assert!(parse_probe_output(b"no minions matched").is_err());
        assert!(parse_probe_output(b"[1, 2, 3]").is_err());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("web-1"), "'web-1'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[tokio::test]
    async fn test_probe_via_echo() {
        let config = FleetConfig {
            probe_command: r#"echo '{"node-a": true, "node-b": true}'"#.to_string(),
            converge_command: "true {node}".to_string(),
            command_timeout_secs: 5,
        };
        let fleet = CommandFleet::new(&config).unwrap();

        let nodes = fleet.probe().await.unwrap();
        assert_eq!(nodes, vec!["node-a", "node-b"]);
    }

    #[tokio::test]
    async fn test_probe_failure_is_an_error() {
        let config = FleetConfig {
            probe_command: "exit 2".to_string(),
            converge_command: "true {node}".to_string(),
            command_timeout_secs: 5,
        };
        let fleet = CommandFleet::new(&config).unwrap();

        let err = fleet.probe().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_converge_reports_failure() {
        let config = FleetConfig {
            probe_command: "echo '{}'".to_string(),
            converge_command: "false {node}".to_string(),
            command_timeout_secs: 5,
        };
        let fleet = CommandFleet::new(&config).unwrap();

        let err = fleet.converge(&"web-1".to_string()).await.unwrap_err();
        assert!(matches!(err, Error::Converge { .. }));
    }

    #[tokio::test]
    async fn test_converge_success() {
        let config = FleetConfig {
            probe_command: "echo '{}'".to_string(),
            converge_command: "true {node}".to_string(),
            command_timeout_secs: 5,
        };
        let fleet = CommandFleet::new(&config).unwrap();

        fleet.converge(&"web-1".to_string()).await.unwrap();
    }
}
