mod in_mem;

use std::boxed::Box;
use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::AppLedgerCfg;
use crate::logging::AppLogContext;

pub use in_mem::AppInMemLedgerEngine;

/// operation-type tag stamped on every transfer for audit queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOpCode {
    PayinCapture,
    PayoutHold,
    SettleMerchant,
    SettleProvider,
    SettleLegalEntity,
    Reversal,
    Manual,
}

impl LedgerOpCode {
    pub fn code(&self) -> u16 {
        match self {
            Self::PayinCapture => 0x0001,
            Self::PayoutHold => 0x0002,
            Self::SettleMerchant => 0x0010,
            Self::SettleProvider => 0x0011,
            Self::SettleLegalEntity => 0x0012,
            Self::Reversal => 0x0020,
            Self::Manual => 0x00ff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLeg {
    pub account: u128,
    pub amount: u64,
}

pub struct TransferSpec {
    pub debits: Vec<TransferLeg>,
    pub credits: Vec<TransferLeg>,
    pub code: LedgerOpCode,
    /// `true` reserves balance without touching posted totals until `post`
    pub pending: bool,
    pub external_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Pending,
    Posted,
    Voided,
}

#[derive(Clone)]
pub struct TransferRecord {
    pub id: u128,
    pub debits: Vec<TransferLeg>,
    pub credits: Vec<TransferLeg>,
    pub code: LedgerOpCode,
    pub state: TransferState,
    pub timestamp: DateTime<Utc>,
    pub external_ref: Option<String>,
    pub reversal_of: Option<u128>,
}

pub struct AccountSpec {
    pub id: u128,
    pub debits_must_not_exceed_credits: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountBalance {
    pub debits_pending: u64,
    pub debits_posted: u64,
    pub credits_pending: u64,
    pub credits_posted: u64,
}

impl AccountBalance {
    /// normalized balance, positive when the account holds funds in the
    /// liability / revenue orientation this system uses throughout
    pub fn net(&self) -> i128 {
        (self.credits_posted as i128) - (self.debits_posted as i128)
    }
}

pub struct TransferQuery {
    pub account: u128,
    pub limit: usize,
    pub code: Option<LedgerOpCode>,
    /// `false` walks the journal oldest-first, `true` newest-first
    pub reversed: bool,
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerFnLabel {
    CreateAccounts,
    Transfer,
    Post,
    Void,
    Reverse,
    GetBalance,
    QueryTransfers,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LedgerErrorReason {
    EmptyLegs,
    TooManyLegs(usize),
    ZeroAmountLeg(u128),
    ImbalancedLegs(u64, u64),
    AccountNotFound(u128),
    DuplicateTransfer(String),
    TransferNotFound(u128),
    NotPending(u128),
    NotPosted(u128),
    InsufficientFunds(u128),
    Overflow,
}

#[derive(Debug)]
pub struct AppLedgerError {
    pub fn_label: LedgerFnLabel,
    pub reason: LedgerErrorReason,
}

/// the single source of truth for balances, no component caches a balance
/// across a mutation
///
/// `transfer` is idempotent on `external_ref` : a repeated spec whose legs
/// match the prior non-voided transfer yields the original id, a mismatching
/// spec under the same ref is a duplicate error
#[async_trait]
pub trait AbstractLedgerEngine: Send + Sync {
    async fn create_accounts(&self, specs: Vec<AccountSpec>) -> Result<(), AppLedgerError>;
    async fn transfer(&self, spec: TransferSpec) -> Result<u128, AppLedgerError>;
    async fn post(&self, tid: u128) -> Result<(), AppLedgerError>;
    async fn void(&self, tid: u128) -> Result<(), AppLedgerError>;
    async fn reverse(&self, tid: u128) -> Result<u128, AppLedgerError>;
    async fn get_balance(&self, account: u128) -> Result<AccountBalance, AppLedgerError>;
    async fn get_balances(
        &self,
        accounts: &[u128],
    ) -> Result<Vec<(u128, AccountBalance)>, AppLedgerError>;
    async fn query_transfers(&self, q: TransferQuery) -> Result<Vec<TransferRecord>, AppLedgerError>;
}

pub(crate) fn build_context(
    cfg: &AppLedgerCfg,
    logctx: Arc<AppLogContext>,
) -> Result<Box<dyn AbstractLedgerEngine>, AppLedgerError> {
    match cfg {
        AppLedgerCfg::InMemory => Ok(Box::new(AppInMemLedgerEngine::new(logctx))),
    }
}
