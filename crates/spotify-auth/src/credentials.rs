//! The single process-wide credential set and its optional file persistence
//!
//! There is exactly one authenticated identity at a time. The store keeps it
//! in memory behind an `RwLock` and replaces the whole value on every install,
//! so readers see either the old set or the new one, never a mix. When a path
//! is configured, each install is also written to disk with an atomic
//! temp-file + rename.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Current unix time in milliseconds.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// One issued credential set.
///
/// `expires_at` is an absolute unix timestamp in milliseconds, computed once
/// at issuance as `issued_at + expires_in`. Integer milliseconds keep the
/// persisted form exact.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    /// May be absent when the provider never issued one
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: u64,
}

impl Credential {
    /// Build a credential issued at `issued_at` (unix ms) that lives for
    /// `expires_in` seconds.
    pub fn issue(
        access_token: String,
        refresh_token: Option<String>,
        issued_at: u64,
        expires_in: u64,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: issued_at.saturating_add(expires_in.saturating_mul(1000)),
        }
    }

    /// `Valid` iff `now < expires_at`.
    pub fn state_at(&self, now_millis: u64) -> AuthState {
        if now_millis < self.expires_at {
            AuthState::Valid
        } else {
            AuthState::Expired
        }
    }

    pub fn is_expired_at(&self, now_millis: u64) -> bool {
        self.state_at(now_millis) == AuthState::Expired
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Authentication state, derived from the stored credential and the clock.
///
/// Transitions:
/// - Unauthenticated → Valid (authorization-code exchange)
/// - Valid → Expired (clock passes `expires_at`)
/// - Expired → Valid (refresh exchange)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Valid,
    Expired,
}

impl AuthState {
    /// Label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::Valid => "valid",
            AuthState::Expired => "expired",
        }
    }
}

/// Holder of the current credential set.
///
/// The `RwLock` guards the in-memory value and is held only long enough to
/// clone or swap it. The `Mutex` serializes disk writes so the file always
/// ends up matching the last install.
pub struct CredentialStore {
    path: Option<PathBuf>,
    current: RwLock<Option<Credential>>,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    /// Store with no persistence; starts `Unauthenticated`.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: RwLock::new(None),
            write_lock: Mutex::new(()),
        }
    }

    /// Load the persisted credential from `path`.
    ///
    /// A missing, unreadable or corrupt file leaves the store empty
    /// (`Unauthenticated`); it is never fatal. The file is rewritten on the
    /// next successful exchange.
    pub async fn load(path: PathBuf) -> Self {
        let current = match read_record(&path).await {
            Ok(Some(credential)) => {
                info!(path = %path.display(), "loaded persisted credential");
                Some(credential)
            }
            Ok(None) => {
                info!(path = %path.display(), "no persisted credential, starting unauthenticated");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable credential file");
                None
            }
        };

        Self {
            path: Some(path),
            current: RwLock::new(current),
            write_lock: Mutex::new(()),
        }
    }

    /// Copy of the current credential set.
    pub async fn snapshot(&self) -> Option<Credential> {
        self.current.read().await.clone()
    }

    /// Derived authentication state at `now_millis`.
    pub async fn state_at(&self, now_millis: u64) -> AuthState {
        match self.current.read().await.as_ref() {
            Some(credential) => credential.state_at(now_millis),
            None => AuthState::Unauthenticated,
        }
    }

    /// Replace the current credential set and persist it.
    ///
    /// The in-memory swap always happens. An `Err` means only the disk write
    /// failed; the new credential is already visible to readers.
    pub async fn install(&self, credential: Credential) -> Result<()> {
        let _write = self.write_lock.lock().await;
        *self.current.write().await = Some(credential.clone());
        debug!(expires_at = credential.expires_at, "installed credential");

        match &self.path {
            Some(path) => write_atomic(path, &credential).await,
            None => Ok(()),
        }
    }

    /// Path of the persisted record, if persistence is enabled.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Read the persisted record. `Ok(None)` when the file doesn't exist.
async fn read_record(path: &Path) -> Result<Option<Credential>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(format!("reading credential file: {e}"))),
    };
    let credential: Credential = serde_json::from_str(&contents)
        .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
    Ok(Some(credential))
}

/// Write the credential to `path` atomically.
///
/// Writes a temp file in the same directory and renames it over the target,
/// so a crash mid-write never leaves a truncated record. Permissions are 0600
/// on unix since the file holds bearer tokens.
async fn write_atomic(path: &Path, credential: &Credential) -> Result<()> {
    let json = serde_json::to_string_pretty(credential)
        .map_err(|e| Error::CredentialParse(format!("serializing credential: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::Io(format!("creating credential directory: {e}")))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "credential".to_string());
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credential");
    Ok(())
}
