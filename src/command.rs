//! Command routing.
//!
//! A command that fits one packet is written directly. Anything longer is
//! staged: uploaded to a temporary file, loaded with `require`, and deleted
//! again whatever the outcome.
//!
//! The acknowledged variants add a print of a marker to the command and
//! compare the reply against it, `"+"` inline and `"done"` after a staged
//! load.

use std::time::Duration;

use rand::Rng;

use crate::codec::LuaCodec;
use crate::config::ClientConfig;
use crate::error::{CommandError, Result};
use crate::files;
use crate::session::Session;

/// Appended to inline commands that expect an acknowledgment.
pub const ACK_SUFFIX: &str = ";print(\"+\")";

const ACK_MARKER: &str = "+";
const STAGED_ACK_MARKER: &str = "done";
const TRANSIENT_NAME_LEN: usize = 4;

/// What the caller waits for after sending a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Return as soon as the command is written.
    FireAndForget,
    /// Wait for the next text reply and return it.
    AwaitReply,
    /// Wait for the acknowledgment marker.
    AwaitAck,
}

/// How a command reaches the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// One packet.
    Inline,
    /// Temporary file plus `require`.
    Staged,
}

/// Decide how to deliver a command of `len` bytes.
///
/// The acknowledgment suffix counts against the packet size.
pub fn plan_delivery(len: usize, completion: Completion, max_text_payload: usize) -> Delivery {
    let total = match completion {
        Completion::AwaitAck => len + ACK_SUFFIX.len(),
        _ => len,
    };
    if total <= max_text_payload {
        Delivery::Inline
    } else {
        Delivery::Staged
    }
}

/// Random name for a staged command file.
fn transient_name() -> String {
    let mut rng = rand::thread_rng();
    (0..TRANSIENT_NAME_LEN)
        .map(|_| char::from(b'a' + rng.gen_range(0..26u8)))
        .collect()
}

/// Run one command. Returns the reply for [`Completion::AwaitReply`].
pub(crate) async fn run_command(
    session: &Session,
    config: &ClientConfig,
    command: &str,
    completion: Completion,
    timeout: Duration,
) -> Result<Option<String>> {
    let command = if config.rewrite_print {
        LuaCodec::rewrite_print(command)
    } else {
        command.to_string()
    };

    match plan_delivery(command.len(), completion, session.max_text_payload()) {
        Delivery::Inline => run_inline(session, &command, completion, timeout).await,
        Delivery::Staged => run_staged(session, config, &command, completion, timeout).await,
    }
}

async fn run_inline(
    session: &Session,
    command: &str,
    completion: Completion,
    timeout: Duration,
) -> Result<Option<String>> {
    match completion {
        Completion::FireAndForget => {
            session.send_command(command).await?;
            Ok(None)
        }
        Completion::AwaitReply => Ok(Some(session.query(command, timeout).await?)),
        Completion::AwaitAck => {
            let reply = session
                .query(&format!("{command}{ACK_SUFFIX}"), timeout)
                .await?;
            if reply != ACK_MARKER {
                return Err(CommandError::Failed(reply).into());
            }
            Ok(None)
        }
    }
}

async fn run_staged(
    session: &Session,
    config: &ClientConfig,
    command: &str,
    completion: Completion,
    timeout: Duration,
) -> Result<Option<String>> {
    let name = transient_name();
    let path = format!("/{name}.lua");

    tracing::debug!(
        "Command of {} bytes exceeds one packet, staging as {}",
        command.len(),
        path
    );

    let outcome = async {
        files::write_file(session, config, &path, command.as_bytes(), config.checked_uploads)
            .await?;
        load(session, &name, completion, timeout).await
    }
    .await;

    match files::delete_file(session, &path, config.default_timeout()).await {
        Ok(true) => {}
        Ok(false) => tracing::warn!("Device could not delete staged command {}", path),
        Err(e) => tracing::warn!("Failed to delete staged command {}: {}", path, e),
    }

    outcome
}

async fn load(
    session: &Session,
    name: &str,
    completion: Completion,
    timeout: Duration,
) -> Result<Option<String>> {
    let require = format!("require(\"{name}\")");
    match completion {
        Completion::FireAndForget => {
            session.send_command(&require).await?;
            Ok(None)
        }
        Completion::AwaitReply => Ok(Some(session.query(&require, timeout).await?)),
        Completion::AwaitAck => {
            let reply = session
                .query(&format!("{require};print(\"{STAGED_ACK_MARKER}\")"), timeout)
                .await?;
            if reply != STAGED_ACK_MARKER {
                return Err(CommandError::LoadFailed(reply).into());
            }
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_boundary() {
        assert_eq!(plan_delivery(20, Completion::AwaitReply, 20), Delivery::Inline);
        assert_eq!(plan_delivery(21, Completion::AwaitReply, 20), Delivery::Staged);
        assert_eq!(plan_delivery(20, Completion::FireAndForget, 20), Delivery::Inline);
    }

    #[test]
    fn test_ack_suffix_counts() {
        let max = 40;
        let fits = max - ACK_SUFFIX.len();
        assert_eq!(plan_delivery(fits, Completion::AwaitAck, max), Delivery::Inline);
        assert_eq!(plan_delivery(fits + 1, Completion::AwaitAck, max), Delivery::Staged);
    }

    #[test]
    fn test_transient_name() {
        let name = transient_name();
        assert_eq!(name.len(), TRANSIENT_NAME_LEN);
        assert!(name.chars().all(|c| c.is_ascii_lowercase()));
    }
}
