// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the data directory layout.

use std::path::{Path, PathBuf};

/// Default data directory.
pub const DATA_ROOT: &str = "/data";

/// Storage path utilities for the data directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all persistent data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Custodial Account Paths ==========

    /// Directory containing all custodial accounts.
    pub fn accounts_dir(&self) -> PathBuf {
        self.root.join("accounts")
    }

    /// Directory for a specific account.
    pub fn account_dir(&self, account_id: &str) -> PathBuf {
        self.accounts_dir().join(account_id)
    }

    /// Path to account metadata file.
    pub fn account_meta(&self, account_id: &str) -> PathBuf {
        self.account_dir(account_id).join("meta.json")
    }

    /// Path to the custodial private key file.
    pub fn account_key(&self, account_id: &str) -> PathBuf {
        self.account_dir(account_id).join("key.pem")
    }

    // ========== Treasury Paths ==========

    /// Directory for the operator treasury.
    pub fn treasury_dir(&self) -> PathBuf {
        self.root.join("treasury")
    }

    /// Path to treasury metadata file.
    pub fn treasury_meta(&self) -> PathBuf {
        self.treasury_dir().join("meta.json")
    }

    /// Path to treasury private key file.
    pub fn treasury_key(&self) -> PathBuf {
        self.treasury_dir().join("key.pem")
    }

    // ========== Ledger ==========

    /// Path to the redb ledger database.
    pub fn ledger_db(&self) -> PathBuf {
        self.root.join("ledger.redb")
    }
}

/// Reject IDs that could escape their directory.
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted() {
        let paths = StoragePaths::new("/tmp/cashier");
        assert_eq!(
            paths.account_meta("abc"),
            PathBuf::from("/tmp/cashier/accounts/abc/meta.json")
        );
        assert_eq!(
            paths.account_key("abc"),
            PathBuf::from("/tmp/cashier/accounts/abc/key.pem")
        );
        assert_eq!(paths.treasury_key(), PathBuf::from("/tmp/cashier/treasury/key.pem"));
        assert_eq!(paths.ledger_db(), PathBuf::from("/tmp/cashier/ledger.redb"));
    }

    #[test]
    fn default_root_is_data() {
        assert_eq!(StoragePaths::default().root(), Path::new(DATA_ROOT));
    }

    #[test]
    fn unsafe_ids_are_rejected() {
        assert!(is_safe_id("3f2c8a9e-1b7d-4c55-9a0e-2f1d7a3b9c01"));
        assert!(!is_safe_id(""));
        assert!(!is_safe_id("../treasury"));
        assert!(!is_safe_id("a/b"));
    }
}
