//! Identity keystore: persists the long-term Noise static keypair and the
//! Nostr identity keypair across restarts.
//!
//! Keys are created on first use and destroyed only on an explicit wipe.
//! Load/save are async (`tokio::fs`) per the suspension points the design
//! calls out — everything else in this crate is synchronous and pure.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::bech32::{self, Bech32Error};

#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("failed to read keystore at {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to write keystore at {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to parse keystore contents: {0}")]
    ParseFailed(#[from] serde_json::Error),
    #[error(transparent)]
    Bech32(#[from] Bech32Error),
    #[error("secret key slot {0} is empty")]
    MissingKey(&'static str),
}

/// One persisted key slot: a 32-byte secret scalar plus creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeySlot {
    /// Lowercase hex of the 32-byte secret scalar.
    secret_hex: String,
    created_at: i64,
}

/// On-disk keystore layout: `noise_static` (X25519) and `nostr_identity`
/// (secp256k1), each an independent optional slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct KeystoreFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    noise_static: Option<KeySlot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nostr_identity: Option<KeySlot>,
}

/// Export format for a single identity: `{version, nsec, createdAt, exportedAt}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NsecExport {
    pub version: u8,
    pub nsec: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "exportedAt")]
    pub exported_at: i64,
}

/// A loaded secret plus the time it was originally created.
pub struct LoadedKey {
    pub secret: Zeroizing<[u8; 32]>,
    pub created_at: i64,
}

/// Wraps a keystore file on disk. Each method is independently
/// load-mutate-save; callers needing atomicity across multiple slots
/// should hold an external lock (the facade is not internally locked —
/// see §5's one-task-at-a-time ownership model).
pub struct Keystore {
    path: PathBuf,
}

impl Keystore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_file(&self) -> Result<KeystoreFile, KeystoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(KeystoreFile::default()),
            Err(e) => Err(KeystoreError::ReadFailed(self.path.clone(), e)),
        }
    }

    async fn write_file(&self, file: &KeystoreFile) -> Result<(), KeystoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| KeystoreError::WriteFailed(self.path.clone(), e))?;
        }
        let json = serde_json::to_vec_pretty(file)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| KeystoreError::WriteFailed(self.path.clone(), e))?;
        self.restrict_permissions().await?;
        tracing::info!(path = %self.path.display(), "keystore saved");
        Ok(())
    }

    /// Best-effort `0600` on unix — the one hardening step within this
    /// library's control; full OS-keyring integration is a consumer concern.
    #[cfg(unix)]
    async fn restrict_permissions(&self) -> Result<(), KeystoreError> {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&self.path, perms)
            .await
            .map_err(|e| KeystoreError::WriteFailed(self.path.clone(), e))
    }

    #[cfg(not(unix))]
    async fn restrict_permissions(&self) -> Result<(), KeystoreError> {
        Ok(())
    }

    /// Load the Noise static key, generating and persisting one on first use.
    pub async fn noise_static(&self, now: i64) -> Result<LoadedKey, KeystoreError> {
        self.load_or_create("noise_static", now).await
    }

    /// Load the Nostr identity key, generating and persisting one on first use.
    pub async fn nostr_identity(&self, now: i64) -> Result<LoadedKey, KeystoreError> {
        self.load_or_create("nostr_identity", now).await
    }

    async fn load_or_create(
        &self,
        slot: &'static str,
        now: i64,
    ) -> Result<LoadedKey, KeystoreError> {
        let mut file = self.read_file().await?;
        let existing = match slot {
            "noise_static" => file.noise_static.clone(),
            "nostr_identity" => file.nostr_identity.clone(),
            _ => unreachable!(),
        };

        if let Some(slot_data) = existing {
            let secret = decode_secret_hex(&slot_data.secret_hex)?;
            return Ok(LoadedKey {
                secret: Zeroizing::new(secret),
                created_at: slot_data.created_at,
            });
        }

        let mut secret = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut secret);
        let new_slot = KeySlot {
            secret_hex: hex::encode(secret),
            created_at: now,
        };
        match slot {
            "noise_static" => file.noise_static = Some(new_slot),
            "nostr_identity" => file.nostr_identity = Some(new_slot),
            _ => unreachable!(),
        }
        self.write_file(&file).await?;
        tracing::info!(slot, "generated new keystore identity");

        Ok(LoadedKey {
            secret: Zeroizing::new(secret),
            created_at: now,
        })
    }

    /// Wipe all persisted key material. Idempotent.
    pub async fn wipe(&self) -> Result<(), KeystoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "keystore wiped");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KeystoreError::WriteFailed(self.path.clone(), e)),
        }
    }

    /// Export the Nostr identity as the `{version, nsec, createdAt, exportedAt}`
    /// JSON document.
    pub async fn export_nostr_identity(&self, now: i64) -> Result<NsecExport, KeystoreError> {
        let file = self.read_file().await?;
        let slot_data = file
            .nostr_identity
            .ok_or(KeystoreError::MissingKey("nostr_identity"))?;
        let secret = decode_secret_hex(&slot_data.secret_hex)?;
        let nsec = bech32::encode_nsec(&secret)?;
        Ok(NsecExport {
            version: 1,
            nsec,
            created_at: slot_data.created_at,
            exported_at: now,
        })
    }

    /// Import a Nostr identity from its `nsec1...` bech32 encoding,
    /// overwriting any existing `nostr_identity` slot.
    pub async fn import_nostr_identity(&self, nsec: &str, now: i64) -> Result<(), KeystoreError> {
        let secret = bech32::decode_nsec(nsec)?;
        let mut file = self.read_file().await?;
        file.nostr_identity = Some(KeySlot {
            secret_hex: hex::encode(secret),
            created_at: now,
        });
        self.write_file(&file).await
    }
}

fn decode_secret_hex(hex_str: &str) -> Result<[u8; 32], KeystoreError> {
    let bytes = hex::decode(hex_str).map_err(|_| KeystoreError::MissingKey("nostr_identity"))?;
    bytes
        .try_into()
        .map_err(|_| KeystoreError::MissingKey("nostr_identity"))
}

/// `true` if a keystore file already exists at `path`.
pub async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}
