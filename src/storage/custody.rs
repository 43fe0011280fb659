// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custody directory: which address and key belong to which account.
//!
//! ```text
//! {data}/accounts/{account_id}/meta.json   # AccountRecord
//! {data}/accounts/{account_id}/key.pem     # PKCS#8 private key (never exposed)
//! {data}/treasury/meta.json
//! {data}/treasury/key.pem
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::files::{FileStorage, StorageError};
use super::paths::{is_safe_id, StoragePaths};
use crate::blockchain::{SigningCredential, SigningError};

/// Identifier recorded for the operator treasury.
pub const TREASURY_ID: &str = "treasury";

#[derive(Debug, thiserror::Error)]
pub enum CustodyError {
    #[error("Account not found: {0}")]
    NotFound(String),

    #[error("Invalid account id: {0}")]
    InvalidId(String),

    #[error("Treasury is not configured")]
    TreasuryMissing,

    #[error("Treasury already holds a different key ({0})")]
    TreasuryMismatch(String),

    #[error("Key error: {0}")]
    Key(#[from] SigningError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Public metadata of a custodial address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AccountRecord {
    pub account_id: String,
    /// EVM address controlled by the stored key.
    pub address: String,
    pub created_at: DateTime<Utc>,
}

/// An address together with the credential that can move its funds.
#[derive(Debug)]
pub struct CustodialAccount {
    pub account_id: String,
    pub address: String,
    pub credential: SigningCredential,
}

/// Lookup of custodial addresses and their signing credentials.
pub trait CustodyDirectory: Send + Sync {
    /// Address and credential of a user account.
    fn resolve(&self, account_id: &str) -> Result<CustodialAccount, CustodyError>;

    /// Address and credential of the operator treasury.
    fn treasury(&self) -> Result<CustodialAccount, CustodyError>;

    /// Public metadata of a user account.
    fn record(&self, account_id: &str) -> Result<AccountRecord, CustodyError>;

    /// Generate a new account with a fresh custodial key.
    fn provision(&self) -> Result<AccountRecord, CustodyError>;
}

/// Custody directory persisted as JSON + PEM files under the data directory.
pub struct FileCustodyDirectory {
    storage: FileStorage,
}

impl FileCustodyDirectory {
    /// Open (and lay out) the directory rooted at `paths`.
    pub fn open(paths: StoragePaths) -> Result<Self, CustodyError> {
        let mut storage = FileStorage::new(paths);
        storage.initialize()?;
        Ok(Self { storage })
    }

    /// Underlying file storage.
    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    /// Whether a treasury key is present.
    pub fn has_treasury(&self) -> bool {
        self.storage.exists(self.storage.paths().treasury_meta())
    }

    /// Treasury metadata.
    pub fn treasury_record(&self) -> Result<AccountRecord, CustodyError> {
        let path = self.storage.paths().treasury_meta();
        if !self.storage.exists(&path) {
            return Err(CustodyError::TreasuryMissing);
        }
        Ok(self.storage.read_json(path)?)
    }

    /// Create the treasury key if missing, otherwise return the existing record.
    pub fn bootstrap_treasury(&self) -> Result<AccountRecord, CustodyError> {
        if self.has_treasury() {
            return self.treasury_record();
        }
        let (credential, address) = SigningCredential::generate()?;
        self.write_treasury(credential, address)
    }

    /// Install an operator-supplied treasury key.
    ///
    /// Idempotent for the same key; refuses to replace a different one.
    pub fn import_treasury(&self, credential: SigningCredential) -> Result<AccountRecord, CustodyError> {
        let address = format!("{:?}", credential.address()?).to_lowercase();
        if self.has_treasury() {
            let existing = self.treasury_record()?;
            if existing.address.eq_ignore_ascii_case(&address) {
                return Ok(existing);
            }
            return Err(CustodyError::TreasuryMismatch(existing.address));
        }
        self.write_treasury(credential, address)
    }

    fn write_treasury(
        &self,
        credential: SigningCredential,
        address: String,
    ) -> Result<AccountRecord, CustodyError> {
        let paths = self.storage.paths();
        let record = AccountRecord {
            account_id: TREASURY_ID.to_string(),
            address,
            created_at: Utc::now(),
        };

        self.storage.create_dir(paths.treasury_dir())?;
        // Metadata last: it marks the treasury as present.
        self.storage.write_raw(paths.treasury_key(), credential.pem())?;
        self.storage.write_json(paths.treasury_meta(), &record)?;

        tracing::info!(address = %record.address, "Treasury key installed");
        Ok(record)
    }

    fn read_credential(&self, path: std::path::PathBuf) -> Result<SigningCredential, CustodyError> {
        Ok(SigningCredential::from_pem(self.storage.read_raw(path)?))
    }

    fn check_id(account_id: &str) -> Result<(), CustodyError> {
        if is_safe_id(account_id) && account_id != TREASURY_ID {
            Ok(())
        } else {
            Err(CustodyError::InvalidId(account_id.to_string()))
        }
    }
}

impl CustodyDirectory for FileCustodyDirectory {
    fn resolve(&self, account_id: &str) -> Result<CustodialAccount, CustodyError> {
        let record = self.record(account_id)?;
        let credential = self
            .read_credential(self.storage.paths().account_key(account_id))
            .map_err(|e| match e {
                CustodyError::Storage(StorageError::NotFound(_)) => {
                    CustodyError::NotFound(account_id.to_string())
                }
                other => other,
            })?;
        Ok(CustodialAccount {
            account_id: record.account_id,
            address: record.address,
            credential,
        })
    }

    fn treasury(&self) -> Result<CustodialAccount, CustodyError> {
        if !self.has_treasury() {
            return Err(CustodyError::TreasuryMissing);
        }
        let record = self.treasury_record()?;
        let credential = self.read_credential(self.storage.paths().treasury_key())?;
        Ok(CustodialAccount {
            account_id: record.account_id,
            address: record.address,
            credential,
        })
    }

    fn record(&self, account_id: &str) -> Result<AccountRecord, CustodyError> {
        Self::check_id(account_id).map_err(|_| CustodyError::NotFound(account_id.to_string()))?;
        let path = self.storage.paths().account_meta(account_id);
        if !self.storage.exists(&path) {
            return Err(CustodyError::NotFound(account_id.to_string()));
        }
        Ok(self.storage.read_json(path)?)
    }

    fn provision(&self) -> Result<AccountRecord, CustodyError> {
        let account_id = uuid::Uuid::new_v4().to_string();
        let (credential, address) = SigningCredential::generate()?;
        let paths = self.storage.paths();

        let record = AccountRecord {
            account_id: account_id.clone(),
            address,
            created_at: Utc::now(),
        };

        self.storage.create_dir(paths.account_dir(&account_id))?;
        self.storage
            .write_raw(paths.account_key(&account_id), credential.pem())?;
        self.storage
            .write_json(paths.account_meta(&account_id), &record)?;

        tracing::info!(account_id = %record.account_id, address = %record.address, "Provisioned custodial account");
        Ok(record)
    }
}
