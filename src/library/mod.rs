//! On-device helper library.
//!
//! The SDK relies on a few Lua functions that must exist on the device:
//! `prntLng` (chunked long print), `sendPartial` and `printCompleteFile`.
//! They are uploaded under `lib-<version>/`, where the version is a short
//! content hash of the bundled source, so two SDK builds with different
//! helpers never load each other's files.
//!
//! Injection is idempotent:
//! 1. if the function is already defined, nothing happens,
//! 2. else if the versioned file exists, it is loaded,
//! 3. else the source is uploaded and loaded.

use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::codec::PRINT_LONG;
use crate::config::ClientConfig;
use crate::error::{CommandError, Result};
use crate::files;
use crate::session::Session;

/// Bundled helper source.
pub const HELPERS_SOURCE: &str = include_str!("helpers.lua");

/// Hex digits of the content hash kept as the version.
pub const VERSION_LEN: usize = 6;

const LOADED: &str = "l";
const CREATED: &str = "c";

/// Version identifier of `source`: the first six hex digits of its SHA-256.
pub fn version_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    hash[..VERSION_LEN].to_string()
}

/// Remote directory for a library version.
pub fn library_dir(version: &str) -> String {
    format!("lib-{version}")
}

/// Make sure `name` is defined on the device, uploading `source` if needed.
pub(crate) async fn ensure_library_present(
    session: &Session,
    config: &ClientConfig,
    name: &str,
    source: &str,
    version: &str,
) -> Result<()> {
    let timeout = config.default_timeout();

    let defined = session
        .query(&format!("print({name} ~= nil)"), timeout)
        .await?;
    if defined == "true" {
        tracing::debug!("Function {} already defined", name);
        return Ok(());
    }

    let module = format!("{}/{}", library_dir(version), name);
    let path = format!("/{module}.lua");

    if files::file_exists(session, &path, timeout).await? {
        tracing::debug!("Loading existing {}", path);
        if require(session, &module, timeout).await? == LOADED {
            return Ok(());
        }
    }

    tracing::debug!("Writing library file {}", path);
    files::write_file(session, config, &path, source.as_bytes(), true).await?;

    let response = require(session, &module, timeout).await?;
    if response != LOADED {
        return Err(CommandError::InjectionFailed {
            name: name.to_string(),
            response,
        }
        .into());
    }
    Ok(())
}

async fn require(session: &Session, module: &str, timeout: Duration) -> Result<String> {
    session
        .query(&format!("require(\"{module}\");print(\"{LOADED}\")"), timeout)
        .await
}

/// Inject the bundled helpers.
pub(crate) async fn inject_library(session: &Session, config: &ClientConfig) -> Result<()> {
    let version = version_hash(HELPERS_SOURCE);
    let dir = library_dir(&version);

    let response = session
        .query(
            &format!("frame.file.mkdir(\"{dir}\");print(\"{CREATED}\")"),
            config.default_timeout(),
        )
        .await?;
    if response == CREATED {
        tracing::debug!("Created library directory {}", dir);
    } else {
        tracing::debug!("Did not create library directory {}: {}", dir, response);
    }

    ensure_library_present(session, config, PRINT_LONG, HELPERS_SOURCE, &version).await
}
