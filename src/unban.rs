//! Operator-initiated unban
//!
//! Checks the address the operator typed, asks fail2ban to lift the ban
//! and, once fail2ban confirms, forces a poll so the display catches up.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::client::ControlInterface;
use crate::error::{Error, Result};
use crate::jail::JailSnapshot;
use crate::poller::PollHandle;

/// Four dot-separated groups of 1-3 ASCII digits
///
/// Octets are not range checked: `999.999.999.999` passes and is left for
/// fail2ban to reject.
static IPV4_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[0-9]{1,3}\.){3}[0-9]{1,3}$").unwrap());

/// Check operator input and return the trimmed address
pub fn validate_address(raw: &str) -> Result<&str> {
    let address = raw.trim();
    if address.is_empty() {
        return Err(Error::MissingAddress);
    }
    if !IPV4_SHAPE.is_match(address) {
        return Err(Error::NotIpv4(address.to_string()));
    }
    Ok(address)
}

/// Result of a successful unban
#[derive(Debug, Clone)]
pub struct Unbanned {
    /// Address that was unbanned
    pub address: String,
    /// Snapshot taken by the poll that followed the unban
    pub snapshot: JailSnapshot,
}

/// Validates and dispatches unban requests for one jail
pub struct UnbanHandler<C: ControlInterface> {
    client: Arc<C>,
    jail_name: String,
    poller: PollHandle,
}

impl<C: ControlInterface> UnbanHandler<C> {
    pub fn new(client: Arc<C>, jail_name: impl Into<String>, poller: PollHandle) -> Self {
        Self {
            client,
            jail_name: jail_name.into(),
            poller,
        }
    }

    /// Lift the ban on `raw_address`
    ///
    /// Nothing runs when validation fails. A rejected unban is reported
    /// once, without retry or refresh. A successful one returns after the
    /// follow-up poll has completed.
    pub async fn unban(&self, raw_address: &str) -> Result<Unbanned> {
        let address = validate_address(raw_address)?.to_string();

        let client = Arc::clone(&self.client);
        let jail = self.jail_name.clone();
        let target = address.clone();
        let output = tokio::task::spawn_blocking(move || client.unban(&jail, &target))
            .await
            .map_err(|e| Error::Invocation {
                command: format!("set {} unbanip {}", self.jail_name, address),
                message: e.to_string(),
            })??;

        if !output.success() {
            let message = output.message();
            tracing::warn!(jail = %self.jail_name, %address, %message, "unban rejected");
            return Err(Error::UnbanFailed { address, message });
        }

        tracing::info!(jail = %self.jail_name, %address, "unbanned");

        // Sent only now, so the poll observes the post-unban state
        let snapshot = self.poller.refresh_and_wait().await?;
        Ok(Unbanned { address, snapshot })
    }
}
