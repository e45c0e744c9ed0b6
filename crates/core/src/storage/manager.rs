use std::path::Path;

use super::encryption::{self, KdfParams};
use super::format;
use crate::errors::CoreError;
use crate::models::profile::Profile;

/// High-level storage operations: save/load the profile to/from encrypted
/// bytes or files.
///
/// The profile holds API keys, so it is never written unencrypted.
pub struct StorageManager;

impl StorageManager {
    /// Flow: Profile → bincode → AES-256-GCM(Argon2id(password)) → T2DB bytes
    pub fn save_to_bytes(profile: &Profile, password: &str) -> Result<Vec<u8>, CoreError> {
        Self::save_with_params(profile, password, KdfParams::default())
    }

    /// Same as [`save_to_bytes`](Self::save_to_bytes) with explicit KDF cost.
    pub fn save_with_params(
        profile: &Profile,
        password: &str,
        params: KdfParams,
    ) -> Result<Vec<u8>, CoreError> {
        if password.is_empty() {
            return Err(CoreError::ValidationError("Password must not be empty".into()));
        }
        let plaintext = bincode::serialize(profile)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize profile: {e}")))?;
        let sealed = encryption::seal(&plaintext, password, params)?;
        Ok(format::encode(&sealed))
    }

    /// Flow: T2DB bytes → header → Argon2id(password, salt) → AES-256-GCM → bincode → Profile
    pub fn load_from_bytes(data: &[u8], password: &str) -> Result<Profile, CoreError> {
        let sealed = format::decode(data)?;
        let plaintext = encryption::open(&sealed, password)?;
        bincode::deserialize(&plaintext)
            .map_err(|e| CoreError::Deserialization(format!("Failed to deserialize profile: {e}")))
    }

    /// Write to a temporary sibling first, then rename over the target, so
    /// a crash mid-write never leaves a half-written profile behind.
    pub fn save_to_file(
        profile: &Profile,
        path: impl AsRef<Path>,
        password: &str,
        params: KdfParams,
    ) -> Result<(), CoreError> {
        let path = path.as_ref();
        let bytes = Self::save_with_params(profile, password, params)?;
        let tmp = path.with_extension("t2db.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>, password: &str) -> Result<Profile, CoreError> {
        let bytes = std::fs::read(path)?;
        Self::load_from_bytes(&bytes, password)
    }
}
