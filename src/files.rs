//! Remote file operations.
//!
//! Uploads stream raw bytes into the device's receive callback:
//! 1. open the file for writing,
//! 2. point the receive callback at it,
//! 3. send the content as paced data packets,
//! 4. close the file and clear the callback.
//!
//! With checked uploads every control step appends a print of a one-letter
//! marker and fails if the device answers with anything else.

use std::time::Duration;

use crate::codec::LuaCodec;
use crate::command::{self, Completion};
use crate::config::ClientConfig;
use crate::error::{CommandError, Result};
use crate::session::Session;

const OPENED: &str = "o";
const STEP_DONE: &str = "c";
const DELETED: &str = "d";

/// Progress of one upload.
#[derive(Debug)]
pub struct PendingUpload<'a> {
    path: &'a str,
    data: &'a [u8],
    cursor: usize,
    checked: bool,
}

impl<'a> PendingUpload<'a> {
    /// Start an upload of `data` to `path`.
    pub fn new(path: &'a str, data: &'a [u8], checked: bool) -> Self {
        Self {
            path,
            data,
            cursor: 0,
            checked,
        }
    }

    /// Remote path.
    pub fn path(&self) -> &str {
        self.path
    }

    /// Whether control steps are acknowledged.
    pub fn is_checked(&self) -> bool {
        self.checked
    }

    /// Bytes sent so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Everything has been handed out.
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.data.len()
    }

    /// Next piece of at most `max` bytes.
    pub fn next_chunk(&mut self, max: usize) -> Option<&'a [u8]> {
        if self.is_complete() || max == 0 {
            return None;
        }
        let end = (self.cursor + max).min(self.data.len());
        let chunk = &self.data[self.cursor..end];
        self.cursor = end;
        Some(chunk)
    }
}

/// Run one control step, optionally acknowledged by `marker`.
///
/// Returns the device's answer when it differs from the marker.
async fn step(
    session: &Session,
    command: &str,
    marker: &str,
    checked: bool,
    timeout: Duration,
) -> Result<Option<String>> {
    if !checked {
        session.send_command(command).await?;
        return Ok(None);
    }

    let reply = session
        .query(&format!("{command};print(\"{marker}\")"), timeout)
        .await?;
    Ok((reply != marker).then_some(reply))
}

/// Write `data` to the remote file at `path`, replacing it.
pub(crate) async fn write_file(
    session: &Session,
    config: &ClientConfig,
    path: &str,
    data: &[u8],
    checked: bool,
) -> Result<()> {
    let quoted = LuaCodec::quote(path);
    let timeout = config.default_timeout();
    let mut upload = PendingUpload::new(path, data, checked);

    tracing::debug!("Uploading {} bytes to {}", data.len(), path);

    let open = format!("w=frame.file.open({quoted},\"write\")");
    if let Some(response) = step(session, &open, OPENED, checked, timeout).await? {
        return Err(CommandError::FileOpenFailed {
            path: path.to_string(),
            response,
        }
        .into());
    }

    let attach = "frame.bluetooth.receive_callback((function(d)w:write(d)end))";
    if let Some(response) = step(session, attach, STEP_DONE, checked, timeout).await? {
        return Err(CommandError::FileWriteFailed {
            path: path.to_string(),
            response,
        }
        .into());
    }

    let max = session.max_data_payload();
    while let Some(chunk) = upload.next_chunk(max) {
        session.send_data(chunk).await?;
        tracing::trace!("Uploaded {}/{} bytes", upload.cursor(), data.len());
        if !upload.is_complete() {
            tokio::time::sleep(config.chunk_delay()).await;
        }
    }

    if let Some(response) = step(session, "w:close()", STEP_DONE, checked, timeout).await? {
        return Err(CommandError::FileCloseFailed {
            path: path.to_string(),
            response,
        }
        .into());
    }

    let detach = "frame.bluetooth.receive_callback(nil)";
    if let Some(response) = step(session, detach, STEP_DONE, checked, timeout).await? {
        return Err(CommandError::FileWriteFailed {
            path: path.to_string(),
            response,
        }
        .into());
    }

    Ok(())
}

/// Whether the remote file can be opened for reading.
pub(crate) async fn file_exists(session: &Session, path: &str, timeout: Duration) -> Result<bool> {
    let command = format!(
        "r=frame.file.open({},\"read\");print(\"{OPENED}\");r:close()",
        LuaCodec::quote(path)
    );
    let reply = session.query(&command, timeout).await?;
    Ok(reply == OPENED)
}

/// Remove the remote file. Returns `false` if the device reported a failure.
pub(crate) async fn delete_file(session: &Session, path: &str, timeout: Duration) -> Result<bool> {
    let command = format!(
        "frame.file.remove({});print(\"{DELETED}\")",
        LuaCodec::quote(path)
    );
    let reply = session.query(&command, timeout).await?;
    Ok(reply == DELETED)
}

/// Read a whole remote file through the helper library.
///
/// The command goes through the router, so a path too long for one packet
/// is staged. The data waiter stays armed across the staged load.
pub(crate) async fn read_file(
    session: &Session,
    config: &ClientConfig,
    path: &str,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let pending = session.arm_data()?;
    let command = format!("printCompleteFile({})", LuaCodec::quote(path));
    command::run_command(session, config, &command, Completion::FireAndForget, timeout).await?;
    let content = pending.wait(timeout).await?;
    Ok(content.trim_ascii_end().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_chunks() {
        let data = b"abcdefg";
        let mut upload = PendingUpload::new("/a.lua", data, true);

        assert_eq!(upload.next_chunk(3), Some(&b"abc"[..]));
        assert_eq!(upload.next_chunk(3), Some(&b"def"[..]));
        assert!(!upload.is_complete());
        assert_eq!(upload.next_chunk(3), Some(&b"g"[..]));
        assert!(upload.is_complete());
        assert_eq!(upload.next_chunk(3), None);
        assert_eq!(upload.cursor(), 7);
    }

    #[test]
    fn test_empty_upload() {
        let mut upload = PendingUpload::new("/empty", b"", false);
        assert!(upload.is_complete());
        assert_eq!(upload.next_chunk(10), None);
        assert!(!upload.is_checked());
        assert_eq!(upload.path(), "/empty");
    }

    #[test]
    fn test_chunk_count_for_large_upload() {
        let data = vec![b'x'; 5000];
        let mut upload = PendingUpload::new("/big", &data, true);
        let mut count = 0;
        while upload.next_chunk(180).is_some() {
            count += 1;
        }
        assert_eq!(count, 28);
    }
}
