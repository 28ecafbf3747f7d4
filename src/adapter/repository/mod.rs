mod mariadb;

use std::boxed::Box;
use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AppErrorCode;
use crate::model::{
    LedgerAccountModel, LedgerDiscrepancyModel, LedgerOwnerType, MerchantPaymentProfileModel,
    ProviderChannelModel, TxMetaModel, TxStatus,
};

use self::mariadb::{MariadbLedgerAccountRepo, MariadbMerchantRepo, MariadbTransactionRepo};
use super::datastore::{AppDStoreError, AppDataStoreContext};

#[derive(Debug, Clone, Copy)]
pub enum AppRepoErrorFnLabel {
    InitRepo,
    CreateTransaction,
    FetchTransaction,
    FetchByOrderId,
    FetchByProviderRef,
    UpdateStatus,
    UpdateProgress,
    FetchMerchantProfile,
    FetchChannels,
    CreateAccounts,
    DeleteOwnerAccounts,
    FetchOwnerAccounts,
    FetchAllActiveAccounts,
    CreateDiscrepancy,
}

#[derive(Debug)]
pub enum AppRepoErrorDetail {
    DataStore(AppDStoreError),
    DatabaseTxStart(String),
    DatabaseExec(String),
    DatabaseQuery(String),
    DatabaseTxCommit(String),
    ConstraintViolation(String),
    Serialization(String),
    DataRowParse(String),
    Unknown,
}

#[derive(Debug)]
pub struct AppRepoError {
    pub fn_label: AppRepoErrorFnLabel,
    pub code: AppErrorCode,
    pub detail: AppRepoErrorDetail,
}

impl AppRepoError {
    /// the unique key `(merchant_id, order_id)` is the request-level
    /// idempotency boundary, callers map this to a duplicate-order rejection
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self.detail, AppRepoErrorDetail::ConstraintViolation(_))
    }
}

#[async_trait]
pub trait AbstractTransactionRepo: Send + Sync {
    async fn create(&self, tx: &TxMetaModel) -> Result<(), AppRepoError>;
    async fn fetch(&self, id_: &str) -> Result<Option<TxMetaModel>, AppRepoError>;
    async fn fetch_by_order_id(
        &self,
        merchant_id: u64,
        order_id: &str,
    ) -> Result<Option<TxMetaModel>, AppRepoError>;
    async fn fetch_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<TxMetaModel>, AppRepoError>;
    /// single-winner gate for terminal transitions, the row is rewritten
    /// only when its stored status is still one of `expect` , exactly one
    /// concurrent caller observes `true`
    async fn update_status_guarded(
        &self,
        tx: &TxMetaModel,
        expect: &[TxStatus],
    ) -> Result<bool, AppRepoError>;
    /// rewrite mutable non-status columns, provider refs, routing snapshot,
    /// fees, ledger correlation keys, failure detail, and append new events
    async fn update_progress(&self, tx: &TxMetaModel) -> Result<(), AppRepoError>;
}

#[async_trait]
pub trait AbstractMerchantRepo: Send + Sync {
    async fn fetch_profile(
        &self,
        merchant_id: u64,
    ) -> Result<Option<MerchantPaymentProfileModel>, AppRepoError>;
    async fn fetch_channels(
        &self,
        merchant_id: u64,
    ) -> Result<Vec<ProviderChannelModel>, AppRepoError>;
}

#[async_trait]
pub trait AbstractLedgerAccountRepo: Send + Sync {
    async fn create(&self, accounts: &[LedgerAccountModel]) -> Result<(), AppRepoError>;
    async fn delete_owner(
        &self,
        owner_type: LedgerOwnerType,
        owner_id: u64,
    ) -> Result<(), AppRepoError>;
    async fn fetch_owner(
        &self,
        owner_type: LedgerOwnerType,
        owner_id: u64,
    ) -> Result<Vec<LedgerAccountModel>, AppRepoError>;
    async fn fetch_all_active(&self) -> Result<Vec<LedgerAccountModel>, AppRepoError>;
    async fn create_discrepancy(&self, d: &LedgerDiscrepancyModel) -> Result<(), AppRepoError>;
}

pub async fn app_repo_transaction(
    dstore: Arc<AppDataStoreContext>,
) -> Result<Box<dyn AbstractTransactionRepo>, AppRepoError> {
    let repo = MariadbTransactionRepo::new(dstore).await?;
    Ok(Box::new(repo))
}

pub async fn app_repo_merchant(
    dstore: Arc<AppDataStoreContext>,
) -> Result<Box<dyn AbstractMerchantRepo>, AppRepoError> {
    let repo = MariadbMerchantRepo::new(dstore).await?;
    Ok(Box::new(repo))
}

pub async fn app_repo_ledger_account(
    dstore: Arc<AppDataStoreContext>,
) -> Result<Box<dyn AbstractLedgerAccountRepo>, AppRepoError> {
    let repo = MariadbLedgerAccountRepo::new(dstore).await?;
    Ok(Box::new(repo))
}
