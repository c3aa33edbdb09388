//! Jail status report parsing
//!
//! `fail2ban-client status <jail>` prints a small tree:
//!
//! ```text
//! Status for the jail: sshd
//! |- Filter
//! |  |- Currently failed: 2
//! |  |- Total failed:     17
//! |  `- File list:        /var/log/auth.log
//! `- Actions
//!    |- Currently banned: 1
//!    |- Total banned:     4
//!    `- Banned IP list:   192.0.2.7
//! ```
//!
//! The layout is not a stable interface, so every field is looked up
//! independently and a missing or garbled field falls back to zero.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Marker line that every genuine status report starts with
pub const STATUS_MARKER: &str = "Status for the jail";

/// Rendered in place of an empty ban list
pub const EMPTY_LIST_MARKER: &str = "None";

macro_rules! counter_re {
    ($label:literal) => {{
        static RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(concat!($label, r"\s*([0-9]+)")).unwrap());
        &RE
    }};
}

static BANNED_LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Banned IP list:[ \t]*([^\r\n]*)").unwrap());

/// Counters and ban list reported for a single jail
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JailStatus {
    /// Failed attempts inside the current find window
    pub currently_failed: u64,
    /// Failed attempts seen since the jail started
    pub total_failed: u64,
    /// Addresses banned right now
    pub currently_banned: u64,
    /// Addresses banned since the jail started
    pub total_banned: u64,
    /// Addresses banned right now, in the order fail2ban lists them
    pub banned_addresses: Vec<String>,
}

impl JailStatus {
    /// Ban list as a single line, `None` when nothing is banned
    pub fn banned_list(&self) -> String {
        if self.banned_addresses.is_empty() {
            EMPTY_LIST_MARKER.to_string()
        } else {
            self.banned_addresses.join(" ")
        }
    }
}

impl fmt::Display for JailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed {}/{} banned {}/{} [{}]",
            self.currently_failed,
            self.total_failed,
            self.currently_banned,
            self.total_banned,
            self.banned_list()
        )
    }
}

/// Parse the output of `fail2ban-client status <jail>`
///
/// Never fails: absent or unparsable counters become `0` and a missing
/// ban list becomes an empty one.
pub fn parse(raw: &str) -> JailStatus {
    JailStatus {
        currently_failed: counter(counter_re!("Currently failed:"), raw),
        total_failed: counter(counter_re!("Total failed:"), raw),
        currently_banned: counter(counter_re!("Currently banned:"), raw),
        total_banned: counter(counter_re!("Total banned:"), raw),
        banned_addresses: banned_addresses(raw),
    }
}

/// Whether `raw` looks like a status report at all
pub fn is_status_report(raw: &str) -> bool {
    raw.contains(STATUS_MARKER)
}

fn counter(re: &Regex, raw: &str) -> u64 {
    re.captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

fn banned_addresses(raw: &str) -> Vec<String> {
    BANNED_LIST_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "Status for the jail: sshd
|- Filter
|  |- Currently failed:\t2
|  |- Total failed:\t17
|  `- File list:\t/var/log/auth.log
`- Actions
   |- Currently banned:\t2
   |- Total banned:\t4
   `- Banned IP list:\t192.0.2.7 198.51.100.23
";

    #[test]
    fn test_parse_full_report() {
        let status = parse(REPORT);
        assert_eq!(status.currently_failed, 2);
        assert_eq!(status.total_failed, 17);
        assert_eq!(status.currently_banned, 2);
        assert_eq!(status.total_banned, 4);
        assert_eq!(
            status.banned_addresses,
            vec!["192.0.2.7".to_string(), "198.51.100.23".to_string()]
        );
        assert!(is_status_report(REPORT));
    }

    #[test]
    fn test_parse_banned_fields() {
        let raw = "Currently banned: 5\nTotal banned: 12\nBanned IP list: 10.0.0.1 10.0.0.2\n";
        let status = parse(raw);
        assert_eq!(status.currently_banned, 5);
        assert_eq!(status.total_banned, 12);
        assert_eq!(status.banned_list(), "10.0.0.1 10.0.0.2");
    }

    #[test]
    fn test_missing_counters_default_to_zero() {
        let status = parse("Status for the jail: sshd\n|- Total failed: 9\n");
        assert_eq!(status.currently_failed, 0);
        assert_eq!(status.total_failed, 9);
        assert_eq!(status.currently_banned, 0);
        assert_eq!(status.total_banned, 0);
        assert!(status.banned_addresses.is_empty());

        assert_eq!(parse(""), JailStatus::default());
        assert_eq!(parse("garbage\n\u{0}\u{ffff}"), JailStatus::default());
    }

    #[test]
    fn test_unparsable_counter_defaults_to_zero() {
        let status = parse("Currently failed: lots\nTotal failed: 99999999999999999999999\n");
        assert_eq!(status.currently_failed, 0);
        assert_eq!(status.total_failed, 0);
    }

    #[test]
    fn test_empty_ban_list_renders_marker() {
        let status = parse("Currently banned: 0\nBanned IP list:\n");
        assert!(status.banned_addresses.is_empty());
        assert_eq!(status.banned_list(), EMPTY_LIST_MARKER);

        let status = parse("Banned IP list:   \t  ");
        assert_eq!(status.banned_list(), "None");
    }

    #[test]
    fn test_ban_list_stays_on_its_line() {
        let status = parse("Banned IP list:\nTotal banned: 3\n");
        assert!(status.banned_addresses.is_empty());
        assert_eq!(status.total_banned, 3);
    }

    #[test]
    fn test_labels_are_case_sensitive() {
        let status = parse("currently banned: 4\nTOTAL BANNED: 8\n");
        assert_eq!(status.currently_banned, 0);
        assert_eq!(status.total_banned, 0);
    }

    #[test]
    fn test_reordered_fields() {
        let raw = "Banned IP list: 203.0.113.9\nTotal banned: 1\nCurrently banned: 1\n";
        let status = parse(raw);
        assert_eq!(status.currently_banned, 1);
        assert_eq!(status.total_banned, 1);
        assert_eq!(status.banned_addresses, vec!["203.0.113.9".to_string()]);
        assert!(!is_status_report(raw));
    }

    #[test]
    fn test_parse_is_pure() {
        assert_eq!(parse(REPORT), parse(REPORT));
    }

    #[test]
    fn test_display() {
        let status = parse(REPORT);
        assert_eq!(
            status.to_string(),
            "failed 2/17 banned 2/4 [192.0.2.7 198.51.100.23]"
        );
    }
}
