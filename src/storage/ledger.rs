// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `accounts`: account_id → balance (decimal string, quote currency)
//! - `operations`: operation_id → serialized SettlementOperation
//! - `idempotency_keys`: client idempotency key → operation_id
//!
//! ## Atomicity
//!
//! Every public method runs in exactly one redb write (or read) transaction.
//! redb admits a single writer at a time, so the read-validate-write of a
//! credit or debit can never interleave with another one on the same
//! account. Operation checkpoints that move money (the withdrawal debit, a
//! pending sweep credit, a compensation) are written in the same transaction
//! as the balance change, which makes each of them apply at most once.

use std::path::Path;
use std::str::FromStr;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use rust_decimal::Decimal;

use super::operation::{OperationStage, SettlementOperation};

// =============================================================================
// Table Definitions
// =============================================================================

/// Balances: account_id → decimal string.
const ACCOUNTS: TableDefinition<&str, &str> = TableDefinition::new("accounts");

/// Settlement operations: operation_id → JSON bytes.
const OPERATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("operations");

/// Idempotency index: client key → operation_id.
const IDEMPOTENCY_KEYS: TableDefinition<&str, &str> = TableDefinition::new("idempotency_keys");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("account already exists: {0}")]
    AccountExists(String),

    #[error("amount must be non-negative, got {0}")]
    InvalidAmount(Decimal),

    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },

    #[error("balance overflow for account {0}")]
    Overflow(String),

    #[error("corrupt balance for account {account_id}: {value}")]
    CorruptBalance { account_id: String, value: String },

    #[error("idempotency key already bound to operation {0}")]
    DuplicateOperation(String),

    #[error("operation not found: {0}")]
    OperationNotFound(String),

    #[error("operation {operation_id} is {actual:?}, expected one of {expected:?}")]
    StageConflict {
        operation_id: String,
        actual: OperationStage,
        expected: Vec<OperationStage>,
    },
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Transaction-scoped helpers
// =============================================================================

fn check_amount(amount: Decimal) -> LedgerResult<()> {
    if amount < Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(())
}

fn load_balance(txn: &WriteTransaction, account_id: &str) -> LedgerResult<Decimal> {
    let table = txn.open_table(ACCOUNTS)?;
    let raw = table
        .get(account_id)?
        .map(|v| v.value().to_string())
        .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;
    Decimal::from_str(&raw).map_err(|_| LedgerError::CorruptBalance {
        account_id: account_id.to_string(),
        value: raw,
    })
}

fn store_balance(txn: &WriteTransaction, account_id: &str, balance: Decimal) -> LedgerResult<()> {
    let mut table = txn.open_table(ACCOUNTS)?;
    table.insert(account_id, balance.normalize().to_string().as_str())?;
    Ok(())
}

fn apply_credit(txn: &WriteTransaction, account_id: &str, amount: Decimal) -> LedgerResult<Decimal> {
    check_amount(amount)?;
    let current = load_balance(txn, account_id)?;
    let next = current
        .checked_add(amount)
        .ok_or_else(|| LedgerError::Overflow(account_id.to_string()))?;
    store_balance(txn, account_id, next)?;
    Ok(next)
}

fn apply_debit(txn: &WriteTransaction, account_id: &str, amount: Decimal) -> LedgerResult<Decimal> {
    check_amount(amount)?;
    let current = load_balance(txn, account_id)?;
    if current < amount {
        return Err(LedgerError::InsufficientFunds {
            balance: current,
            requested: amount,
        });
    }
    let next = current - amount;
    store_balance(txn, account_id, next)?;
    Ok(next)
}

fn store_operation(txn: &WriteTransaction, op: &SettlementOperation) -> LedgerResult<()> {
    let json = serde_json::to_vec(op)?;
    let mut table = txn.open_table(OPERATIONS)?;
    table.insert(op.operation_id.as_str(), json.as_slice())?;
    Ok(())
}

fn reserve_idempotency_key(txn: &WriteTransaction, op: &SettlementOperation) -> LedgerResult<()> {
    let Some(key) = op.idempotency_key.as_deref() else {
        return Ok(());
    };
    let mut table = txn.open_table(IDEMPOTENCY_KEYS)?;
    let existing = table.get(key)?.map(|v| v.value().to_string());
    if let Some(existing) = existing {
        return Err(LedgerError::DuplicateOperation(existing));
    }
    table.insert(key, op.operation_id.as_str())?;
    Ok(())
}

/// Compare-and-set guard: the stored stage must be one of `expected`.
fn check_stage(
    txn: &WriteTransaction,
    operation_id: &str,
    expected: &[OperationStage],
) -> LedgerResult<()> {
    let table = txn.open_table(OPERATIONS)?;
    let bytes = table
        .get(operation_id)?
        .map(|v| v.value().to_vec())
        .ok_or_else(|| LedgerError::OperationNotFound(operation_id.to_string()))?;
    let stored: SettlementOperation = serde_json::from_slice(&bytes)?;
    if !expected.contains(&stored.stage) {
        return Err(LedgerError::StageConflict {
            operation_id: operation_id.to_string(),
            actual: stored.stage,
            expected: expected.to_vec(),
        });
    }
    Ok(())
}

// =============================================================================
// LedgerDb
// =============================================================================

/// Durable balance store and settlement operation log.
pub struct LedgerDb {
    db: Database,
}

impl LedgerDb {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ACCOUNTS)?;
            let _ = write_txn.open_table(OPERATIONS)?;
            let _ = write_txn.open_table(IDEMPOTENCY_KEYS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Run `f` in one write transaction; commit on `Ok`, abort on `Err`.
    fn write<T>(&self, f: impl FnOnce(&WriteTransaction) -> LedgerResult<T>) -> LedgerResult<T> {
        let txn = self.db.begin_write()?;
        match f(&txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                txn.abort()?;
                Err(e)
            }
        }
    }

    /// Open a read transaction against the accounts table.
    pub fn health_check(&self) -> LedgerResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(ACCOUNTS)?;
        Ok(())
    }

    // =========================================================================
    // Balances
    // =========================================================================

    /// Create an account with a zero balance.
    pub fn create_account(&self, account_id: &str) -> LedgerResult<()> {
        self.write(|txn| {
            let mut table = txn.open_table(ACCOUNTS)?;
            if table.get(account_id)?.is_some() {
                return Err(LedgerError::AccountExists(account_id.to_string()));
            }
            table.insert(account_id, Decimal::ZERO.to_string().as_str())?;
            Ok(())
        })
    }

    /// Current balance of an account.
    pub fn balance(&self, account_id: &str) -> LedgerResult<Decimal> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCOUNTS)?;
        let raw = table
            .get(account_id)?
            .map(|v| v.value().to_string())
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;
        Decimal::from_str(&raw).map_err(|_| LedgerError::CorruptBalance {
            account_id: account_id.to_string(),
            value: raw,
        })
    }

    /// Add `amount` to the balance. Returns the new balance.
    pub fn credit(&self, account_id: &str, amount: Decimal) -> LedgerResult<Decimal> {
        self.write(|txn| apply_credit(txn, account_id, amount))
    }

    /// Subtract `amount` if the balance covers it. Returns the new balance.
    pub fn debit(&self, account_id: &str, amount: Decimal) -> LedgerResult<Decimal> {
        self.write(|txn| apply_debit(txn, account_id, amount))
    }

    // =========================================================================
    // Settlement operations
    // =========================================================================

    /// Persist a new operation and reserve its idempotency key.
    pub fn begin_operation(&self, op: &SettlementOperation) -> LedgerResult<()> {
        self.write(|txn| {
            reserve_idempotency_key(txn, op)?;
            store_operation(txn, op)
        })
    }

    /// Debit `amount` and persist the withdrawal record in one transaction.
    ///
    /// Nothing is written if the debit is rejected.
    pub fn begin_withdrawal(&self, op: &SettlementOperation, amount: Decimal) -> LedgerResult<Decimal> {
        self.write(|txn| {
            let balance = apply_debit(txn, &op.account_id, amount)?;
            reserve_idempotency_key(txn, op)?;
            store_operation(txn, op)?;
            Ok(balance)
        })
    }

    /// Persist `op` if its stored stage is still one of `expected`.
    pub fn advance_operation(
        &self,
        op: &SettlementOperation,
        expected: &[OperationStage],
    ) -> LedgerResult<()> {
        self.write(|txn| {
            check_stage(txn, &op.operation_id, expected)?;
            store_operation(txn, op)
        })
    }

    /// Credit `amount` to the operation's account and persist `op` together.
    ///
    /// Used for pending sweep credits and withdrawal compensation. The stage
    /// guard makes a second attempt fail with `StageConflict` instead of
    /// crediting twice. `op.resulting_balance` is set to the new balance.
    pub fn credit_operation(
        &self,
        op: &mut SettlementOperation,
        amount: Decimal,
        expected: &[OperationStage],
    ) -> LedgerResult<Decimal> {
        self.write(|txn| {
            check_stage(txn, &op.operation_id, expected)?;
            let balance = apply_credit(txn, &op.account_id, amount)?;
            op.resulting_balance = Some(balance);
            store_operation(txn, op)?;
            Ok(balance)
        })
    }

    /// Look up an operation by ID.
    pub fn get_operation(&self, operation_id: &str) -> LedgerResult<Option<SettlementOperation>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OPERATIONS)?;
        match table.get(operation_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Look up the operation bound to a client idempotency key.
    pub fn find_by_idempotency_key(&self, key: &str) -> LedgerResult<Option<SettlementOperation>> {
        let operation_id = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(IDEMPOTENCY_KEYS)?;
            let value = table.get(key)?;
            value.map(|v| v.value().to_string())
        };
        match operation_id {
            Some(id) => self.get_operation(&id),
            None => Ok(None),
        }
    }

    /// All operations currently in one of `stages`, oldest first.
    pub fn list_operations(&self, stages: &[OperationStage]) -> LedgerResult<Vec<SettlementOperation>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OPERATIONS)?;

        let mut results = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let op: SettlementOperation = serde_json::from_slice(value.value())?;
            if stages.contains(&op.stage) {
                results.push(op);
            }
        }
        results.sort_by_key(|op| op.created_at);
        Ok(results)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn temp_db() -> (LedgerDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = LedgerDb::open(&dir.path().join("ledger.redb")).unwrap();
        (db, dir)
    }

    fn funded(db: &LedgerDb, account_id: &str, amount: Decimal) {
        db.create_account(account_id).unwrap();
        db.credit(account_id, amount).unwrap();
    }

    #[test]
    fn new_account_starts_at_zero() {
        let (db, _dir) = temp_db();
        db.create_account("a").unwrap();
        assert_eq!(db.balance("a").unwrap(), Decimal::ZERO);
        assert!(matches!(
            db.create_account("a"),
            Err(LedgerError::AccountExists(_))
        ));
    }

    #[test]
    fn unknown_account_is_reported() {
        let (db, _dir) = temp_db();
        assert!(matches!(db.balance("nope"), Err(LedgerError::AccountNotFound(_))));
        assert!(matches!(db.credit("nope", dec!(1)), Err(LedgerError::AccountNotFound(_))));
        assert!(matches!(db.debit("nope", dec!(1)), Err(LedgerError::AccountNotFound(_))));
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let (db, _dir) = temp_db();
        funded(&db, "a", dec!(10));
        assert!(matches!(db.credit("a", dec!(-1)), Err(LedgerError::InvalidAmount(_))));
        assert!(matches!(db.debit("a", dec!(-0.01)), Err(LedgerError::InvalidAmount(_))));
        assert_eq!(db.balance("a").unwrap(), dec!(10));
        // zero is a valid no-op
        assert_eq!(db.credit("a", Decimal::ZERO).unwrap(), dec!(10));
    }

    #[test]
    fn overdraft_leaves_balance_unchanged() {
        let (db, _dir) = temp_db();
        funded(&db, "a", dec!(5));
        let err = db.debit("a", dec!(5.01)).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds { balance, requested }
                if balance == dec!(5) && requested == dec!(5.01)
        ));
        assert_eq!(db.balance("a").unwrap(), dec!(5));
        assert_eq!(db.debit("a", dec!(5)).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn debit_then_credit_restores_exact_balance() {
        let (db, _dir) = temp_db();
        let start = dec!(2997.12345678);
        funded(&db, "a", start);
        for _ in 0..100 {
            db.debit("a", start).unwrap();
            db.credit("a", start).unwrap();
            db.debit("a", dec!(0.1)).unwrap();
            db.credit("a", dec!(0.1)).unwrap();
        }
        assert_eq!(db.balance("a").unwrap(), start);
    }

    #[test]
    fn concurrent_debits_never_overdraw() {
        let (db, _dir) = temp_db();
        let db = Arc::new(db);
        funded(&db, "a", dec!(150));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || db.debit("a", dec!(100)).is_ok())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(db.balance("a").unwrap(), dec!(50));
    }

    #[test]
    fn balances_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.redb");
        {
            let db = LedgerDb::open(&path).unwrap();
            funded(&db, "a", dec!(42.5));
        }
        let db = LedgerDb::open(&path).unwrap();
        assert_eq!(db.balance("a").unwrap(), dec!(42.5));
    }

    #[test]
    fn rejected_withdrawal_records_nothing() {
        let (db, _dir) = temp_db();
        funded(&db, "a", dec!(10));
        let op = SettlementOperation::new_withdrawal("a", dec!(11), "0xabc")
            .with_idempotency_key(Some("k1".into()));

        assert!(matches!(
            db.begin_withdrawal(&op, dec!(11)),
            Err(LedgerError::InsufficientFunds { .. })
        ));
        assert!(db.get_operation(&op.operation_id).unwrap().is_none());
        assert!(db.find_by_idempotency_key("k1").unwrap().is_none());
        assert_eq!(db.balance("a").unwrap(), dec!(10));
    }

    #[test]
    fn withdrawal_debits_and_records_together() {
        let (db, _dir) = temp_db();
        funded(&db, "a", dec!(10));
        let op = SettlementOperation::new_withdrawal("a", dec!(4), "0xabc")
            .with_idempotency_key(Some("k1".into()));

        assert_eq!(db.begin_withdrawal(&op, dec!(4)).unwrap(), dec!(6));
        let stored = db.find_by_idempotency_key("k1").unwrap().unwrap();
        assert_eq!(stored.operation_id, op.operation_id);
        assert_eq!(stored.stage, OperationStage::Debited);
    }

    #[test]
    fn duplicate_idempotency_key_is_rejected() {
        let (db, _dir) = temp_db();
        db.create_account("a").unwrap();
        let first = SettlementOperation::new_sweep("a").with_idempotency_key(Some("k".into()));
        let second = SettlementOperation::new_sweep("a").with_idempotency_key(Some("k".into()));

        db.begin_operation(&first).unwrap();
        match db.begin_operation(&second) {
            Err(LedgerError::DuplicateOperation(id)) => assert_eq!(id, first.operation_id),
            other => panic!("expected DuplicateOperation, got {other:?}"),
        }
        assert!(db.get_operation(&second.operation_id).unwrap().is_none());
    }

    #[test]
    fn operation_credit_applies_once() {
        let (db, _dir) = temp_db();
        db.create_account("a").unwrap();
        let mut op = SettlementOperation::new_sweep("a");
        op.advance(OperationStage::PendingCredit);
        db.begin_operation(&op).unwrap();

        let mut first = op.clone();
        first.advance(OperationStage::Completed);
        let balance = db
            .credit_operation(&mut first, dec!(2997), &[OperationStage::PendingCredit])
            .unwrap();
        assert_eq!(balance, dec!(2997));
        assert_eq!(first.resulting_balance, Some(dec!(2997)));

        let mut second = op.clone();
        second.advance(OperationStage::Completed);
        assert!(matches!(
            db.credit_operation(&mut second, dec!(2997), &[OperationStage::PendingCredit]),
            Err(LedgerError::StageConflict { actual: OperationStage::Completed, .. })
        ));
        assert_eq!(db.balance("a").unwrap(), dec!(2997));
    }

    #[test]
    fn advance_checks_stored_stage() {
        let (db, _dir) = temp_db();
        db.create_account("a").unwrap();
        let mut op = SettlementOperation::new_sweep("a");
        db.begin_operation(&op).unwrap();

        op.advance(OperationStage::SweepSubmitting);
        db.advance_operation(&op, &[OperationStage::Started]).unwrap();

        op.advance(OperationStage::Failed);
        assert!(matches!(
            db.advance_operation(&op, &[OperationStage::Started]),
            Err(LedgerError::StageConflict { .. })
        ));
        let stored = db.get_operation(&op.operation_id).unwrap().unwrap();
        assert_eq!(stored.stage, OperationStage::SweepSubmitting);
    }

    #[test]
    fn list_operations_filters_by_stage() {
        let (db, _dir) = temp_db();
        db.create_account("a").unwrap();
        let started = SettlementOperation::new_sweep("a");
        let mut pending = SettlementOperation::new_sweep("a");
        pending.advance(OperationStage::PendingCredit);
        db.begin_operation(&started).unwrap();
        db.begin_operation(&pending).unwrap();

        let found = db.list_operations(&[OperationStage::PendingCredit]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].operation_id, pending.operation_id);
        assert_eq!(
            db.list_operations(&[OperationStage::Started, OperationStage::PendingCredit])
                .unwrap()
                .len(),
            2
        );
    }
}
