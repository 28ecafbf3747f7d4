use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use tokio::sync::Mutex;

use crate::app_log_event;
use crate::hard_limit::MAX_TRANSFER_LEGS_PER_SIDE;
use crate::logging::{AppLogContext, AppLogLevel};

use super::{
    AbstractLedgerEngine, AccountBalance, AccountSpec, AppLedgerError, LedgerErrorReason,
    LedgerFnLabel, TransferLeg, TransferQuery, TransferRecord, TransferSpec, TransferState,
};

struct AccountEntry {
    debit_capped: bool,
    balance: AccountBalance,
}

struct InMemLedgerRepr {
    accounts: HashMap<u128, AccountEntry>,
    transfers: HashMap<u128, TransferRecord>,
    by_ref: HashMap<String, u128>,
    id_seq: u128,
}

/// reference implementation of the ledger-store contract, state is process
/// local, production deployments point the trait at an external store
pub struct AppInMemLedgerEngine {
    _logctx: Arc<AppLogContext>,
    _repr: Mutex<InMemLedgerRepr>,
}

impl AppInMemLedgerEngine {
    pub fn new(logctx: Arc<AppLogContext>) -> Self {
        let repr = InMemLedgerRepr {
            accounts: HashMap::new(),
            transfers: HashMap::new(),
            by_ref: HashMap::new(),
            id_seq: 0,
        };
        Self {
            _logctx: logctx,
            _repr: Mutex::new(repr),
        }
    }

    fn validate_legs(
        spec: &TransferSpec,
        repr: &InMemLedgerRepr,
    ) -> Result<(), LedgerErrorReason> {
        if spec.debits.is_empty() || spec.credits.is_empty() {
            return Err(LedgerErrorReason::EmptyLegs);
        }
        let num_legs = spec.debits.len().max(spec.credits.len());
        if num_legs > MAX_TRANSFER_LEGS_PER_SIDE {
            return Err(LedgerErrorReason::TooManyLegs(num_legs));
        }
        let mut sum_dr = 0u64;
        let mut sum_cr = 0u64;
        for leg in spec.debits.iter().chain(spec.credits.iter()) {
            if leg.amount == 0 {
                return Err(LedgerErrorReason::ZeroAmountLeg(leg.account));
            }
            if !repr.accounts.contains_key(&leg.account) {
                return Err(LedgerErrorReason::AccountNotFound(leg.account));
            }
        }
        for leg in spec.debits.iter() {
            sum_dr = sum_dr
                .checked_add(leg.amount)
                .ok_or(LedgerErrorReason::Overflow)?;
        }
        for leg in spec.credits.iter() {
            sum_cr = sum_cr
                .checked_add(leg.amount)
                .ok_or(LedgerErrorReason::Overflow)?;
        }
        if sum_dr != sum_cr {
            return Err(LedgerErrorReason::ImbalancedLegs(sum_dr, sum_cr));
        }
        Ok(())
    } // end of fn validate_legs

    /// a flagged account must never owe more than it has been credited, the
    /// reservation made by pending debits counts against the cap as well
    fn check_debit_caps(
        debits: &[TransferLeg],
        repr: &InMemLedgerRepr,
    ) -> Result<(), LedgerErrorReason> {
        let mut incoming = HashMap::<u128, u64>::new();
        for leg in debits.iter() {
            let slot = incoming.entry(leg.account).or_insert(0);
            *slot = slot
                .checked_add(leg.amount)
                .ok_or(LedgerErrorReason::Overflow)?;
        }
        for (account, amount) in incoming.iter() {
            let entry = repr
                .accounts
                .get(account)
                .ok_or(LedgerErrorReason::AccountNotFound(*account))?;
            if !entry.debit_capped {
                continue;
            }
            let b = &entry.balance;
            let occupied = (b.debits_posted as u128) + (b.debits_pending as u128);
            if occupied + (*amount as u128) > (b.credits_posted as u128) {
                return Err(LedgerErrorReason::InsufficientFunds(*account));
            }
        }
        Ok(())
    } // end of fn check_debit_caps

    fn apply_legs(spec_pending: bool, record: &TransferRecord, repr: &mut InMemLedgerRepr) {
        for leg in record.debits.iter() {
            if let Some(e) = repr.accounts.get_mut(&leg.account) {
                if spec_pending {
                    e.balance.debits_pending += leg.amount;
                } else {
                    e.balance.debits_posted += leg.amount;
                }
            }
        }
        for leg in record.credits.iter() {
            if let Some(e) = repr.accounts.get_mut(&leg.account) {
                if spec_pending {
                    e.balance.credits_pending += leg.amount;
                } else {
                    e.balance.credits_posted += leg.amount;
                }
            }
        }
    }

    /// test hook, force a balance snapshot onto one account
    pub async fn ut_overwrite_balance(&self, account: u128, value: AccountBalance) {
        let mut guard = self._repr.lock().await;
        if let Some(e) = guard.accounts.get_mut(&account) {
            e.balance = value;
        }
    }
} // end of impl AppInMemLedgerEngine

#[async_trait]
impl AbstractLedgerEngine for AppInMemLedgerEngine {
    async fn create_accounts(&self, specs: Vec<AccountSpec>) -> Result<(), AppLedgerError> {
        let mut guard = self._repr.lock().await;
        for spec in specs {
            // re-provisioning an existing account keeps its balance, only
            // the cap flag follows the new spec
            let entry = guard.accounts.entry(spec.id).or_insert(AccountEntry {
                debit_capped: spec.debits_must_not_exceed_credits,
                balance: AccountBalance::default(),
            });
            entry.debit_capped = spec.debits_must_not_exceed_credits;
        }
        Ok(())
    }

    async fn transfer(&self, spec: TransferSpec) -> Result<u128, AppLedgerError> {
        let logctx = &self._logctx;
        let mut guard = self._repr.lock().await;
        Self::validate_legs(&spec, &guard).map_err(|reason| AppLedgerError {
            fn_label: LedgerFnLabel::Transfer,
            reason,
        })?;
        if let Some(ref_key) = spec.external_ref.as_ref() {
            if let Some(prior_id) = guard.by_ref.get(ref_key).copied() {
                if let Some(prior) = guard.transfers.get(&prior_id) {
                    if !matches!(prior.state, TransferState::Voided) {
                        let same_legs =
                            prior.debits == spec.debits && prior.credits == spec.credits;
                        if same_legs {
                            app_log_event!(
                                logctx,
                                AppLogLevel::DEBUG,
                                "idempotent-replay, ref:{ref_key}, id:{prior_id}"
                            );
                            return Ok(prior_id);
                        }
                        return Err(AppLedgerError {
                            fn_label: LedgerFnLabel::Transfer,
                            reason: LedgerErrorReason::DuplicateTransfer(ref_key.clone()),
                        });
                    }
                }
            }
        }
        Self::check_debit_caps(&spec.debits, &guard).map_err(|reason| AppLedgerError {
            fn_label: LedgerFnLabel::Transfer,
            reason,
        })?;
        guard.id_seq += 1;
        let tid = guard.id_seq;
        let record = TransferRecord {
            id: tid,
            debits: spec.debits,
            credits: spec.credits,
            code: spec.code,
            state: if spec.pending {
                TransferState::Pending
            } else {
                TransferState::Posted
            },
            timestamp: Local::now().to_utc(),
            external_ref: spec.external_ref.clone(),
            reversal_of: None,
        };
        Self::apply_legs(spec.pending, &record, &mut guard);
        if let Some(ref_key) = spec.external_ref {
            guard.by_ref.insert(ref_key, tid);
        }
        guard.transfers.insert(tid, record);
        Ok(tid)
    } // end of fn transfer

    async fn post(&self, tid: u128) -> Result<(), AppLedgerError> {
        let mut guard = self._repr.lock().await;
        let record = guard
            .transfers
            .get(&tid)
            .cloned()
            .ok_or(AppLedgerError {
                fn_label: LedgerFnLabel::Post,
                reason: LedgerErrorReason::TransferNotFound(tid),
            })?;
        if !matches!(record.state, TransferState::Pending) {
            return Err(AppLedgerError {
                fn_label: LedgerFnLabel::Post,
                reason: LedgerErrorReason::NotPending(tid),
            });
        }
        for leg in record.debits.iter() {
            if let Some(e) = guard.accounts.get_mut(&leg.account) {
                e.balance.debits_pending -= leg.amount;
                e.balance.debits_posted += leg.amount;
            }
        }
        for leg in record.credits.iter() {
            if let Some(e) = guard.accounts.get_mut(&leg.account) {
                e.balance.credits_pending -= leg.amount;
                e.balance.credits_posted += leg.amount;
            }
        }
        if let Some(r) = guard.transfers.get_mut(&tid) {
            r.state = TransferState::Posted;
        }
        Ok(())
    } // end of fn post

    async fn void(&self, tid: u128) -> Result<(), AppLedgerError> {
        let mut guard = self._repr.lock().await;
        let record = guard
            .transfers
            .get(&tid)
            .cloned()
            .ok_or(AppLedgerError {
                fn_label: LedgerFnLabel::Void,
                reason: LedgerErrorReason::TransferNotFound(tid),
            })?;
        if !matches!(record.state, TransferState::Pending) {
            return Err(AppLedgerError {
                fn_label: LedgerFnLabel::Void,
                reason: LedgerErrorReason::NotPending(tid),
            });
        }
        for leg in record.debits.iter() {
            if let Some(e) = guard.accounts.get_mut(&leg.account) {
                e.balance.debits_pending -= leg.amount;
            }
        }
        for leg in record.credits.iter() {
            if let Some(e) = guard.accounts.get_mut(&leg.account) {
                e.balance.credits_pending -= leg.amount;
            }
        }
        if let Some(r) = guard.transfers.get_mut(&tid) {
            r.state = TransferState::Voided;
        }
        Ok(())
    } // end of fn void

    async fn reverse(&self, tid: u128) -> Result<u128, AppLedgerError> {
        let mut guard = self._repr.lock().await;
        let target = guard
            .transfers
            .get(&tid)
            .cloned()
            .ok_or(AppLedgerError {
                fn_label: LedgerFnLabel::Reverse,
                reason: LedgerErrorReason::TransferNotFound(tid),
            })?;
        if !matches!(target.state, TransferState::Posted) {
            return Err(AppLedgerError {
                fn_label: LedgerFnLabel::Reverse,
                reason: LedgerErrorReason::NotPosted(tid),
            });
        }
        // legs swapped, the original row stays untouched
        let new_debits = target.credits.clone();
        Self::check_debit_caps(&new_debits, &guard).map_err(|reason| AppLedgerError {
            fn_label: LedgerFnLabel::Reverse,
            reason,
        })?;
        guard.id_seq += 1;
        let new_id = guard.id_seq;
        let record = TransferRecord {
            id: new_id,
            debits: new_debits,
            credits: target.debits.clone(),
            code: super::LedgerOpCode::Reversal,
            state: TransferState::Posted,
            timestamp: Local::now().to_utc(),
            external_ref: None,
            reversal_of: Some(tid),
        };
        Self::apply_legs(false, &record, &mut guard);
        guard.transfers.insert(new_id, record);
        Ok(new_id)
    } // end of fn reverse

    async fn get_balance(&self, account: u128) -> Result<AccountBalance, AppLedgerError> {
        let guard = self._repr.lock().await;
        guard
            .accounts
            .get(&account)
            .map(|e| e.balance)
            .ok_or(AppLedgerError {
                fn_label: LedgerFnLabel::GetBalance,
                reason: LedgerErrorReason::AccountNotFound(account),
            })
    }

    async fn get_balances(
        &self,
        accounts: &[u128],
    ) -> Result<Vec<(u128, AccountBalance)>, AppLedgerError> {
        let guard = self._repr.lock().await;
        accounts
            .iter()
            .map(|aid| {
                guard
                    .accounts
                    .get(aid)
                    .map(|e| (*aid, e.balance))
                    .ok_or(AppLedgerError {
                        fn_label: LedgerFnLabel::GetBalance,
                        reason: LedgerErrorReason::AccountNotFound(*aid),
                    })
            })
            .collect()
    }

    async fn query_transfers(
        &self,
        q: TransferQuery,
    ) -> Result<Vec<TransferRecord>, AppLedgerError> {
        let guard = self._repr.lock().await;
        let mut rows = guard
            .transfers
            .values()
            .filter(|r| {
                r.debits.iter().chain(r.credits.iter()).any(|leg| leg.account == q.account)
            })
            .filter(|r| q.code.map_or(true, |c| r.code == c))
            .filter(|r| {
                q.time_range
                    .map_or(true, |(t0, t1)| r.timestamp >= t0 && r.timestamp <= t1)
            })
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by_key(|r| (r.timestamp.timestamp_micros(), r.id));
        if q.reversed {
            rows.reverse();
        }
        rows.truncate(q.limit);
        Ok(rows)
    } // end of fn query_transfers
} // end of impl AppInMemLedgerEngine
