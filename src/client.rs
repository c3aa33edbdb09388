//! fail2ban control interface
//!
//! Runs `fail2ban-client` (behind a privilege elevation prefix) and hands
//! back exactly what it printed. Nothing here interprets the output: a
//! non-zero exit is a normal [`CommandOutput`], only failing to run the
//! tool at all is an error.

use crate::error::{Error, Result};
use crate::manifest::ClientConfig;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What a control command printed and how it exited
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Trimmed stderr, or trimmed stdout when stderr is empty
    pub fn message(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Read and mutate commands understood by the enforcement tool
///
/// Implementations block; callers on an async runtime must move calls
/// onto the blocking pool.
pub trait ControlInterface: Send + Sync + 'static {
    /// `status <jail>`
    fn read_status(&self, jail: &str) -> Result<CommandOutput>;

    /// `set <jail> unbanip <address>`
    fn unban(&self, jail: &str, address: &str) -> Result<CommandOutput>;
}

/// Runs the real `fail2ban-client`
#[derive(Debug, Clone)]
pub struct Fail2banClient {
    /// Control binary
    program: String,
    /// Privilege elevation prefix (e.g. `sudo`)
    elevate: Vec<String>,
    /// Per-invocation timeout
    timeout: Duration,
}

impl Fail2banClient {
    /// Create a client from configuration
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            program: config.program.clone(),
            elevate: config.elevate.clone(),
            timeout: Duration::from_secs(config.timeout),
        }
    }

    /// Full argv for a control command
    fn argv(&self, args: &[&str]) -> Vec<String> {
        self.elevate
            .iter()
            .cloned()
            .chain(std::iter::once(self.program.clone()))
            .chain(args.iter().map(|a| a.to_string()))
            .collect()
    }

    /// Run a control command with timeout enforcement
    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let argv = self.argv(args);
        let command = argv.join(" ");
        tracing::debug!(%command, "running control command");

        let (program, rest) = argv.split_first().ok_or_else(|| Error::Invocation {
            command: command.clone(),
            message: "Empty command".to_string(),
        })?;

        let mut child = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Invocation {
                command: command.clone(),
                message: e.to_string(),
            })?;

        // Drain both pipes concurrently so a large ban list cannot fill the
        // pipe buffer and stall the child
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let start = Instant::now();

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    // A background process that inherited the pipes keeps
                    // them open after the child exits; stay within the budget
                    while !(stdout.is_finished() && stderr.is_finished()) {
                        if start.elapsed() > self.timeout {
                            return Err(Error::CommandTimeout {
                                command,
                                secs: self.timeout.as_secs(),
                            });
                        }
                        thread::sleep(Duration::from_millis(20));
                    }
                    return Ok(CommandOutput {
                        stdout: stdout.join().unwrap_or_default(),
                        stderr: stderr.join().unwrap_or_default(),
                        code: status.code(),
                    });
                }
                Ok(None) => {
                    if start.elapsed() > self.timeout {
                        reap(&mut child);
                        return Err(Error::CommandTimeout {
                            command,
                            secs: self.timeout.as_secs(),
                        });
                    }
                    thread::sleep(Duration::from_millis(20));
                }
                Err(e) => {
                    reap(&mut child);
                    return Err(Error::Invocation {
                        command,
                        message: format!("Failed to wait for process: {}", e),
                    });
                }
            }
        }
    }
}

impl ControlInterface for Fail2banClient {
    fn read_status(&self, jail: &str) -> Result<CommandOutput> {
        self.run(&["status", jail])
    }

    fn unban(&self, jail: &str, address: &str) -> Result<CommandOutput> {
        self.run(&["set", jail, "unbanip", address])
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        pipe.map(|mut s| {
            let mut buf = Vec::new();
            s.read_to_end(&mut buf).ok();
            String::from_utf8_lossy(&buf).into_owned()
        })
        .unwrap_or_default()
    })
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(program: &str, elevate: &[&str], timeout: u64) -> Fail2banClient {
        Fail2banClient::new(&ClientConfig {
            program: program.to_string(),
            elevate: elevate.iter().map(|s| s.to_string()).collect(),
            timeout,
        })
    }

    #[test]
    fn test_argv() {
        let c = client("fail2ban-client", &["sudo"], 10);
        assert_eq!(
            c.argv(&["set", "sshd", "unbanip", "192.0.2.1"]),
            vec!["sudo", "fail2ban-client", "set", "sshd", "unbanip", "192.0.2.1"]
        );

        let c = client("fail2ban-client", &[], 10);
        assert_eq!(c.argv(&["status", "sshd"]), vec!["fail2ban-client", "status", "sshd"]);
    }

    #[test]
    fn test_captures_stdout() {
        let c = client("echo", &[], 10);
        let out = c.read_status("sshd").unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "status sshd");
    }

    #[test]
    fn test_non_zero_exit_is_not_an_error() {
        let c = client("false", &[], 10);
        let out = c.unban("sshd", "192.0.2.1").unwrap();
        assert!(!out.success());
        assert_eq!(out.code, Some(1));
    }

    #[test]
    fn test_missing_binary_is_invocation_failure() {
        let c = client("/nonexistent/banwatch/fail2ban-client", &[], 10);
        let err = c.read_status("sshd").unwrap_err();
        assert!(matches!(err, Error::Invocation { .. }));
        assert!(err.is_invocation());
    }

    #[test]
    fn test_timeout_kills_child() {
        let c = client("fail2ban-client", &["sh", "-c", "sleep 5", "banwatch"], 1);
        let start = Instant::now();
        let err = c.read_status("sshd").unwrap_err();
        assert!(matches!(err, Error::CommandTimeout { secs: 1, .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_inherited_pipes_respect_timeout() {
        // The shell exits at once but its background sleep holds stdout open
        let c = client("fail2ban-client", &["sh", "-c", "sleep 5 & echo started", "banwatch"], 1);
        let start = Instant::now();
        let err = c.read_status("sshd").unwrap_err();
        assert!(matches!(err, Error::CommandTimeout { secs: 1, .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_message_prefers_stderr() {
        let out = CommandOutput {
            stdout: " 0\n".into(),
            stderr: "  ERROR  NOK: ('192.0.2.1', 'not banned')\n".into(),
            code: Some(255),
        };
        assert_eq!(out.message(), "ERROR  NOK: ('192.0.2.1', 'not banned')");

        let out = CommandOutput {
            stdout: " not banned \n".into(),
            stderr: "   ".into(),
            code: Some(1),
        };
        assert_eq!(out.message(), "not banned");
    }
}
