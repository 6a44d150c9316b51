use std::collections::HashMap;

use chrono::Utc;
use folio_primitives::PoolId;
use smallvec::SmallVec;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::accounting::{
    Account, AccountId, AccountSide, AccountingError, JournalBatch, JournalEntry,
};
use crate::auth::{Caller, WardSet};

/// The open interval between `unlock(pool)` and the matching `lock()`.
/// Entries staged here touch no account state until the window locks.
#[derive(Debug)]
struct Window {
    pool: PoolId,
    total_debit: u128,
    total_credit: u128,
    entries: SmallVec<JournalEntry, 4>,
}

/// Double-entry ledger partitioned by pool.
///
/// Mutation follows an explicit unlock/stage/lock protocol: at most one pool
/// has an open window at a time, entries accumulate in the window, and
/// [`Ledger::lock`] applies them to account running totals only when staged
/// debits equal staged credits. A failed lock leaves the window (and its
/// entries) open for corrective entries, so a window either applies in full
/// or not at all.
#[derive(Debug)]
pub struct Ledger {
    accounts: HashMap<(PoolId, AccountId), Account>,
    window: Option<Window>,
    sequences: HashMap<PoolId, u64>,
    journal: Vec<JournalBatch>,
    wards: WardSet,
}

impl Ledger {
    pub fn new(admin: Caller) -> Self {
        Self {
            accounts: HashMap::new(),
            window: None,
            sequences: HashMap::new(),
            journal: Vec::new(),
            wards: WardSet::new(admin),
        }
    }

    pub fn create_account(
        &mut self,
        caller: Caller,
        pool: PoolId,
        id: AccountId,
        normal: AccountSide,
    ) -> Result<(), AccountingError> {
        self.wards.ensure(caller)?;
        if self.accounts.contains_key(&(pool, id)) {
            return Err(AccountingError::AccountExists(pool, id));
        }
        self.accounts.insert((pool, id), Account::new(pool, id, normal));
        Ok(())
    }

    /// Opens the transaction window for `pool`. Fails while any window is
    /// open, including for the same pool.
    #[instrument(skip_all, fields(pool = %pool))]
    pub fn unlock(&mut self, caller: Caller, pool: PoolId) -> Result<(), AccountingError> {
        self.wards.ensure(caller)?;
        if self.window.is_some() {
            return Err(AccountingError::AlreadyUnlocked(pool));
        }
        self.window = Some(Window {
            pool,
            total_debit: 0,
            total_credit: 0,
            entries: SmallVec::new(),
        });
        Ok(())
    }

    pub fn add_debit(
        &mut self,
        caller: Caller,
        account: AccountId,
        amount: u128,
    ) -> Result<(), AccountingError> {
        self.post(caller, account, AccountSide::Debit, amount)
    }

    pub fn add_credit(
        &mut self,
        caller: Caller,
        account: AccountId,
        amount: u128,
    ) -> Result<(), AccountingError> {
        self.post(caller, account, AccountSide::Credit, amount)
    }

    /// One credit plus one debit of the same amount. Both sides are validated
    /// before either is staged, so the pair can never leave the window
    /// half-applied or unbalance it on its own.
    pub fn update_entry(
        &mut self,
        caller: Caller,
        credit_account: AccountId,
        debit_account: AccountId,
        amount: u128,
    ) -> Result<(), AccountingError> {
        self.wards.ensure(caller)?;
        let new_credit_total = self.validate_entry(credit_account, AccountSide::Credit, amount)?;
        let new_debit_total = self.validate_entry(debit_account, AccountSide::Debit, amount)?;
        self.commit_entry(credit_account, AccountSide::Credit, amount, new_credit_total);
        self.commit_entry(debit_account, AccountSide::Debit, amount, new_debit_total);
        Ok(())
    }

    /// Closes the window, applying every staged entry to its account.
    ///
    /// Returns the batch's pool-scoped sequence number. Fails with
    /// [`AccountingError::Unbalanced`] when staged debits and credits differ;
    /// the window then stays open awaiting corrective entries. The apply step
    /// itself cannot fail: every entry was validated against the account map
    /// and the overflow ceiling when it was staged.
    #[instrument(skip_all)]
    pub fn lock(&mut self, caller: Caller) -> Result<u64, AccountingError> {
        self.wards.ensure(caller)?;
        {
            let window = self.window.as_ref().ok_or(AccountingError::Locked)?;
            if window.total_debit != window.total_credit {
                return Err(AccountingError::Unbalanced {
                    debit: window.total_debit,
                    credit: window.total_credit,
                });
            }
        }
        let Some(window) = self.window.take() else {
            return Err(AccountingError::Locked);
        };

        // An empty window locks trivially and leaves no journal trace.
        if window.entries.is_empty() {
            return Ok(self.sequences.get(&window.pool).copied().unwrap_or(0));
        }

        let now = Utc::now();
        for entry in &window.entries {
            // Staging validated existence and headroom; the None arm is
            // structurally unreachable.
            let Some(account) = self.accounts.get_mut(&(window.pool, entry.account)) else {
                continue;
            };
            match entry.side {
                AccountSide::Debit => account.total_debit += entry.amount,
                AccountSide::Credit => account.total_credit += entry.amount,
            }
            account.updated_at = now;
        }

        let sequence = self.sequences.entry(window.pool).or_insert(0);
        *sequence += 1;
        let sequence = *sequence;

        for entry in &window.entries {
            debug!(
                pool = %window.pool,
                account = %entry.account,
                side = ?entry.side,
                amount = entry.amount,
                sequence,
                "posted ledger entry"
            );
        }

        self.journal.push(JournalBatch {
            id: Uuid::new_v4(),
            pool: window.pool,
            sequence,
            posted_at: now,
            entries: window.entries.into_iter().collect(),
        });
        Ok(sequence)
    }

    /// Discards the open window without applying any staged entry: the
    /// in-process equivalent of the host transaction aborting.
    pub fn abandon(&mut self, caller: Caller) -> Result<(), AccountingError> {
        self.wards.ensure(caller)?;
        let window = self.window.take().ok_or(AccountingError::Locked)?;
        debug!(pool = %window.pool, dropped = window.entries.len(), "window abandoned");
        Ok(())
    }

    /// Signed balance of an account. Reads committed state only; staged
    /// window entries are invisible here until their window locks.
    pub fn account_value(&self, pool: PoolId, id: AccountId) -> Result<i128, AccountingError> {
        self.accounts
            .get(&(pool, id))
            .ok_or(AccountingError::AccountNotFound(pool, id))?
            .balance()
    }

    /// Attaches opaque descriptive bytes to an account. No effect on
    /// balances and no open window required.
    pub fn set_metadata(
        &mut self,
        caller: Caller,
        pool: PoolId,
        id: AccountId,
        metadata: Vec<u8>,
    ) -> Result<(), AccountingError> {
        self.wards.ensure(caller)?;
        let account = self
            .accounts
            .get_mut(&(pool, id))
            .ok_or(AccountingError::AccountNotFound(pool, id))?;
        account.metadata = Some(metadata);
        account.updated_at = Utc::now();
        Ok(())
    }

    pub fn account(&self, pool: PoolId, id: AccountId) -> Option<&Account> {
        self.accounts.get(&(pool, id))
    }

    pub fn unlocked_pool(&self) -> Option<PoolId> {
        self.window.as_ref().map(|w| w.pool)
    }

    /// All locked batches, in posting order.
    pub fn journal(&self) -> &[JournalBatch] {
        &self.journal
    }

    /// Sum of all committed debit and credit totals for a pool. Equal after
    /// every successful lock. Saturates at the `u128` ceiling; this is an
    /// audit read, not an arithmetic surface.
    pub fn trial_balance(&self, pool: PoolId) -> (u128, u128) {
        let mut debit: u128 = 0;
        let mut credit: u128 = 0;
        for account in self.accounts.values().filter(|a| a.pool == pool) {
            debit = debit.saturating_add(account.total_debit);
            credit = credit.saturating_add(account.total_credit);
        }
        (debit, credit)
    }

    pub fn authorize(&mut self, caller: Caller, new: Caller) -> Result<(), AccountingError> {
        Ok(self.wards.authorize(caller, new)?)
    }

    pub fn revoke(&mut self, caller: Caller, old: Caller) -> Result<(), AccountingError> {
        Ok(self.wards.revoke(caller, old)?)
    }

    fn post(
        &mut self,
        caller: Caller,
        account: AccountId,
        side: AccountSide,
        amount: u128,
    ) -> Result<(), AccountingError> {
        self.wards.ensure(caller)?;
        let new_window_total = self.validate_entry(account, side, amount)?;
        self.commit_entry(account, side, amount, new_window_total);
        Ok(())
    }

    /// Checks that staging `amount` against `account` is sound: a window is
    /// open, the account exists under the window's pool, and neither the
    /// account's prospective running total nor the window's side total can
    /// overflow. Returns the window's new side total.
    fn validate_entry(
        &self,
        account: AccountId,
        side: AccountSide,
        amount: u128,
    ) -> Result<u128, AccountingError> {
        let window = self.window.as_ref().ok_or(AccountingError::Locked)?;
        let pool = window.pool;
        let acct = self
            .accounts
            .get(&(pool, account))
            .ok_or(AccountingError::AccountNotFound(pool, account))?;

        let base = match side {
            AccountSide::Debit => acct.total_debit,
            AccountSide::Credit => acct.total_credit,
        };
        let mut prospective = base;
        for staged in window
            .entries
            .iter()
            .filter(|e| e.account == account && e.side == side)
        {
            prospective = prospective
                .checked_add(staged.amount)
                .ok_or(AccountingError::AmountOverflow)?;
        }
        prospective
            .checked_add(amount)
            .ok_or(AccountingError::AmountOverflow)?;

        let window_total = match side {
            AccountSide::Debit => window.total_debit,
            AccountSide::Credit => window.total_credit,
        };
        window_total
            .checked_add(amount)
            .ok_or(AccountingError::AmountOverflow)
    }

    fn commit_entry(
        &mut self,
        account: AccountId,
        side: AccountSide,
        amount: u128,
        new_window_total: u128,
    ) {
        // validate_entry ran under the same &mut self call; the window is
        // still there.
        let Some(window) = self.window.as_mut() else {
            return;
        };
        match side {
            AccountSide::Debit => window.total_debit = new_window_total,
            AccountSide::Credit => window.total_credit = new_window_total,
        }
        debug!(pool = %window.pool, account = %account, side = ?side, amount, "entry staged");
        window.entries.push(JournalEntry {
            account,
            side,
            amount,
        });
    }
}
