use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::session::Credential;

/// Cache file name in the cache directory
const CACHE_FILE: &str = "session.json";

/// Access tokens issued by the auth backend live for 15 minutes.
/// Anything older is not worth seeding the session with.
const TOKEN_LIFETIME_MINUTES: i64 = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedCredential {
    token: String,
    cached_at: DateTime<Utc>,
}

impl CachedCredential {
    fn is_expired(&self) -> bool {
        Utc::now() > self.cached_at + Duration::minutes(TOKEN_LIFETIME_MINUTES)
    }
}

/// Best-effort on-disk copy of the last access token.
///
/// Never a source of truth: the session always refreshes at start-up.
#[derive(Debug, Clone)]
pub struct CredentialCache {
    cache_dir: PathBuf,
}

impl CredentialCache {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Load the cached token if present and still within its lifetime.
    pub(crate) fn load(&self) -> Result<Option<Credential>> {
        let path = self.cache_path();
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path).context("Failed to read credential cache")?;
        let cached: CachedCredential =
            serde_json::from_str(&contents).context("Failed to parse credential cache")?;

        if cached.is_expired() {
            return Ok(None);
        }
        Ok(Credential::parse(cached.token))
    }

    pub(crate) fn save(&self, credential: &Credential) -> Result<()> {
        let path = self.cache_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let cached = CachedCredential {
            token: credential.expose().to_string(),
            cached_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&cached)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub(crate) fn clear(&self) -> Result<()> {
        let path = self.cache_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.cache_path().exists()
    }

    fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(CACHE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_clear() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = CredentialCache::new(dir.path().join("nested"));
        assert!(cache.load().expect("load").is_none());

        let credential = Credential::parse("T1").expect("credential");
        cache.save(&credential).expect("save");
        assert!(cache.exists());
        assert_eq!(cache.load().expect("load"), Some(credential));

        cache.clear().expect("clear");
        assert!(!cache.exists());
        assert!(cache.load().expect("load").is_none());
    }

    #[test]
    fn test_expired_entry_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = CredentialCache::new(dir.path().to_path_buf());
        let stale = CachedCredential {
            token: "old".to_string(),
            cached_at: Utc::now() - Duration::minutes(TOKEN_LIFETIME_MINUTES + 1),
        };
        std::fs::write(
            dir.path().join(CACHE_FILE),
            serde_json::to_string(&stale).expect("json"),
        )
        .expect("write");

        assert!(cache.load().expect("load").is_none());
    }

    #[test]
    fn test_corrupt_entry_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = CredentialCache::new(dir.path().to_path_buf());
        std::fs::write(dir.path().join(CACHE_FILE), "{not json").expect("write");
        assert!(cache.load().is_err());
    }
}
