//! Console rendering of jail snapshots
//!
//! Provides:
//! - The plain-text report printed by `status`, `unban` and `watch`
//! - The help text and feedback lines for interactive `watch` commands

use std::io::BufRead;
use std::thread;

use chrono::{DateTime, Local};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::jail::JailSnapshot;
use crate::unban::Unbanned;

/// Timestamp format used in reports
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn timestamp(at: Option<DateTime<Local>>) -> String {
    at.map(|t| t.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Render a snapshot as a multi-line report
pub fn render(snapshot: &JailSnapshot) -> String {
    let status = &snapshot.status;
    let rows = [
        ("Failed attempts (current window):", status.currently_failed.to_string()),
        ("Failed attempts (total observed):", status.total_failed.to_string()),
        ("Currently banned IPs:", status.currently_banned.to_string()),
        ("Total banned attackers:", status.total_banned.to_string()),
        ("Banned IP list:", status.banned_list()),
    ];

    let mut out = String::new();
    out.push_str("=== Intrusion Detection Monitor (fail2ban) ===\n");
    out.push_str(&format!("Status: {}\n", snapshot.message));
    for (label, value) in rows {
        out.push_str(&format!("{:<35} {}\n", label, value));
    }
    let mut updated = timestamp(snapshot.last_updated);
    if snapshot.is_stale() {
        updated.push_str(" (stale)");
    }
    out.push_str(&format!("{:<35} {}\n", "Last update:", updated));

    if let Some(error) = &snapshot.last_error {
        out.push_str(&format!(
            "{:<35} {} ({})\n",
            "Last error:",
            error,
            timestamp(snapshot.last_error_at)
        ));
    }

    out
}

/// One-line feedback for an unban attempt
pub fn unban_feedback(result: &Result<Unbanned>) -> String {
    match result {
        Ok(unbanned) => format!("Unbanned: {}", unbanned.address),
        Err(Error::MissingAddress) => "Please enter an IP address.".to_string(),
        Err(Error::NotIpv4(_)) => "That doesn't look like an IPv4 address.".to_string(),
        Err(Error::UnbanFailed { message, .. }) => format!("Failed: {}", message),
        Err(e) => format!("Failed: {}", e),
    }
}

/// Help for the interactive prompt
pub fn help() -> &'static str {
    "Commands:
  r, refresh        poll fail2ban now
  u, unban <ip>     lift the ban on <ip>
  h, help           show this help
  q, quit           stop watching
"
}

/// A parsed line of interactive input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Refresh,
    Unban(String),
    Help,
    Quit,
    Unknown(String),
}

/// Parse one line typed at the `watch` prompt
pub fn parse_action(line: &str) -> Option<Action> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    Some(match word {
        "r" | "refresh" => Action::Refresh,
        "u" | "unban" => Action::Unban(rest.to_string()),
        "h" | "help" | "?" => Action::Help,
        "q" | "quit" | "exit" => Action::Quit,
        _ => Action::Unknown(word.to_string()),
    })
}

/// Read lines on a dedicated thread and hand them to the runtime
///
/// The thread is detached: a read blocked on an idle terminal never holds
/// up runtime shutdown. The receiver yields `None` once the input ends.
pub fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    thread::spawn(move || {
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::debug!("stopped reading input: {}", e);
                    break;
                }
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jail::status::parse;
    use chrono::TimeZone;

    #[test]
    fn test_render_initial() {
        let out = render(&JailSnapshot::new("sshd"));
        assert!(out.contains("Status: starting..."));
        assert!(out.contains("Banned IP list:"));
        assert!(out.lines().any(|l| l.starts_with("Banned IP list:") && l.ends_with(" None")));
        assert!(out.lines().any(|l| l.starts_with("Last update:") && l.ends_with(" -")));
        assert!(!out.contains("Last error:"));
    }

    #[test]
    fn test_render_counters_and_error() {
        let at = Local.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap();
        let mut snap = JailSnapshot::new("sshd");
        snap.status = parse("Currently banned: 5\nTotal banned: 12\nBanned IP list: 10.0.0.1 10.0.0.2\n");
        snap.last_updated = Some(at);
        snap.last_error = Some("Unexpected output from fail2ban-client".into());
        snap.last_error_at = Some(at);

        let out = render(&snap);
        assert!(out.lines().any(|l| l.starts_with("Currently banned IPs:") && l.ends_with(" 5")));
        assert!(out.lines().any(|l| l.starts_with("Total banned attackers:") && l.ends_with(" 12")));
        assert!(out.contains("10.0.0.1 10.0.0.2"));
        assert!(out.contains("2026-03-01 12:30:05"));
        assert!(out.contains("Last error:"));
        assert!(out
            .lines()
            .any(|l| l.starts_with("Last update:") && l.ends_with(" (stale)")));
    }

    #[test]
    fn test_unban_feedback() {
        let ok = Ok(Unbanned {
            address: "192.0.2.7".into(),
            snapshot: JailSnapshot::new("sshd"),
        });
        assert_eq!(unban_feedback(&ok), "Unbanned: 192.0.2.7");
        assert_eq!(
            unban_feedback(&Err(Error::MissingAddress)),
            "Please enter an IP address."
        );
        assert_eq!(
            unban_feedback(&Err(Error::NotIpv4("x".into()))),
            "That doesn't look like an IPv4 address."
        );
        assert_eq!(
            unban_feedback(&Err(Error::UnbanFailed {
                address: "192.0.2.7".into(),
                message: "NOK".into(),
            })),
            "Failed: NOK"
        );
        assert_eq!(
            unban_feedback(&Err(Error::PollLoopClosed)),
            "Failed: Poll loop is not running"
        );
    }

    #[test]
    fn test_parse_action() {
        assert_eq!(parse_action(""), None);
        assert_eq!(parse_action("  \n"), None);
        assert_eq!(parse_action("r"), Some(Action::Refresh));
        assert_eq!(parse_action("refresh\n"), Some(Action::Refresh));
        assert_eq!(
            parse_action("u 192.0.2.1"),
            Some(Action::Unban("192.0.2.1".into()))
        );
        assert_eq!(
            parse_action("unban   10.0.0.1  "),
            Some(Action::Unban("10.0.0.1".into()))
        );
        assert_eq!(parse_action("unban"), Some(Action::Unban(String::new())));
        assert_eq!(parse_action("q"), Some(Action::Quit));
        assert_eq!(parse_action("?"), Some(Action::Help));
        assert_eq!(parse_action("ban 1.2.3.4"), Some(Action::Unknown("ban".into())));
    }

    #[tokio::test]
    async fn test_line_reader_forwards_until_eof() {
        let input = std::io::Cursor::new("r\nu 192.0.2.1\n");
        let mut rx = spawn_line_reader(input);
        assert_eq!(rx.recv().await.as_deref(), Some("r"));
        assert_eq!(rx.recv().await.as_deref(), Some("u 192.0.2.1"));
        assert_eq!(rx.recv().await, None);
    }

    /// Input that never produces a byte until the test lets it go
    struct Idle(std::sync::mpsc::Receiver<()>);

    impl std::io::Read for Idle {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[test]
    fn test_idle_input_does_not_block_runtime_shutdown() {
        let (release, idle) = std::sync::mpsc::channel();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let start = std::time::Instant::now();

        rt.block_on(async {
            let mut rx = spawn_line_reader(std::io::BufReader::new(Idle(idle)));
            let waited =
                tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await;
            assert!(waited.is_err());
        });
        drop(rt);

        assert!(start.elapsed() < std::time::Duration::from_secs(2));
        release.send(()).ok();
    }
}
