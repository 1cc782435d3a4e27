use anyhow::{Context, Result};
use keyring::Entry;
use tracing::debug;

const SERVICE_NAME: &str = "folio";

/// Keeps the long-lived refresh cookie in the OS keychain between runs.
pub struct RefreshProofStore;

impl RefreshProofStore {
    /// Store the refresh proof for an account
    pub fn store(account: &str, proof: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, account)
            .context("Failed to create keyring entry")?;
        entry
            .set_password(proof)
            .context("Failed to store refresh proof in keychain")?;
        Ok(())
    }

    /// Load the refresh proof for an account, `None` if nothing is stored
    pub fn load(account: &str) -> Result<Option<String>> {
        let entry = Entry::new(SERVICE_NAME, account)
            .context("Failed to create keyring entry")?;
        match entry.get_password() {
            Ok(proof) => Ok(Some(proof)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read refresh proof from keychain"),
        }
    }

    /// Delete the stored refresh proof. Missing entries are not an error.
    pub fn delete(account: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, account)
            .context("Failed to create keyring entry")?;
        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => {
                debug!(account = account, "No refresh proof to delete");
                Ok(())
            }
            Err(e) => Err(e).context("Failed to delete refresh proof from keychain"),
        }
    }
}
