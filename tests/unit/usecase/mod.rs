mod payin;
mod payout;
mod recon;

use std::boxed::Box;
use std::collections::{HashMap, VecDeque};
use std::result::Result;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use payment_gateway::adapter::cache::{app_cache_marker, app_cache_throttle};
use payment_gateway::adapter::callback::app_callback_context;
use payment_gateway::adapter::ledger::{
    AbstractLedgerEngine, AccountBalance, AccountSpec, AppInMemLedgerEngine, AppLedgerError,
    TransferQuery, TransferRecord, TransferSpec,
};
use payment_gateway::adapter::processor::{
    AbstractPaymentProcessor, AppProcessorError, AppProcessorPayInResult, AppProcessorPayOutResult,
    AppProcessorStatusRequest, AppProcessorStatusResult, AppProcessorWebhookEvent,
};
use payment_gateway::adapter::queue::{AbstractJobQueue, AppInMemJobQueue};
use payment_gateway::adapter::repository::{
    AbstractLedgerAccountRepo, AbstractMerchantRepo, AbstractTransactionRepo, AppRepoError,
    AppRepoErrorDetail, AppRepoErrorFnLabel,
};
use payment_gateway::api::web::dto::{
    BeneficiaryPartyDto, CustomerPartyDto, PaymentCurrencyDto, PayinCreateReqDto,
    PayoutCreateReqDto,
};
use payment_gateway::auth::AppAuthedMerchant;
use payment_gateway::config::{AppCallbackCfg, AppMonitorCfg, AppThroughputCfg};
use payment_gateway::error::AppErrorCode;
use payment_gateway::model::{
    LedgerAccountModel, LedgerDiscrepancyModel, LedgerOwnerType, MerchantPaymentProfileModel,
    ProviderChannelModel, RoutingSnapshotModel, TxMetaModel, TxStatus,
};
use payment_gateway::usecase::{PaymentFlowContext, ProvisionAccountsUseCase};

use super::{ut_default_tiers, ut_logctx};

pub(super) const UT_MERCHANT_ID: u64 = 5566;
pub(super) const UT_CHANNEL_A: u64 = 31;
pub(super) const UT_CHANNEL_B: u64 = 32;
pub(super) const UT_LEGAL_ENTITY: u64 = 9;

// ---- transaction repository, in-memory fake with the same uniqueness and
// ---- guarded-update semantics as the MariaDB implementation

pub(super) struct MockTransactionRepo {
    pub rows: Arc<Mutex<HashMap<String, TxMetaModel>>>,
}

impl MockTransactionRepo {
    pub(super) fn new() -> Self {
        Self {
            rows: Arc::new(Mutex::new(HashMap::new())),
        }
    }
    fn dup_key_error() -> AppRepoError {
        AppRepoError {
            fn_label: AppRepoErrorFnLabel::CreateTransaction,
            code: AppErrorCode::InvalidInput,
            detail: AppRepoErrorDetail::ConstraintViolation("uq_merchant_order".to_string()),
        }
    }
}

#[async_trait]
impl AbstractTransactionRepo for MockTransactionRepo {
    async fn create(&self, tx: &TxMetaModel) -> Result<(), AppRepoError> {
        let mut g = self.rows.lock().unwrap();
        let clash = g
            .values()
            .any(|r| r.merchant_id() == tx.merchant_id() && r.order_id() == tx.order_id());
        if clash {
            return Err(Self::dup_key_error());
        }
        g.insert(tx.id().to_string(), tx.clone());
        Ok(())
    }
    async fn fetch(&self, id_: &str) -> Result<Option<TxMetaModel>, AppRepoError> {
        let g = self.rows.lock().unwrap();
        Ok(g.get(id_).cloned())
    }
    async fn fetch_by_order_id(
        &self,
        merchant_id: u64,
        order_id: &str,
    ) -> Result<Option<TxMetaModel>, AppRepoError> {
        let g = self.rows.lock().unwrap();
        let out = g
            .values()
            .find(|r| r.merchant_id() == merchant_id && r.order_id() == order_id)
            .cloned();
        Ok(out)
    }
    async fn fetch_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<TxMetaModel>, AppRepoError> {
        let g = self.rows.lock().unwrap();
        let out = g
            .values()
            .find(|r| r.provider_ref() == Some(provider_ref))
            .cloned();
        Ok(out)
    }
    async fn update_status_guarded(
        &self,
        tx: &TxMetaModel,
        expect: &[TxStatus],
    ) -> Result<bool, AppRepoError> {
        let mut g = self.rows.lock().unwrap();
        let stored = g.get(tx.id()).ok_or(Self::dup_key_error())?;
        if !expect.contains(&stored.status()) {
            return Ok(false);
        }
        g.insert(tx.id().to_string(), tx.clone());
        Ok(true)
    }
    async fn update_progress(&self, tx: &TxMetaModel) -> Result<(), AppRepoError> {
        let mut g = self.rows.lock().unwrap();
        g.insert(tx.id().to_string(), tx.clone());
        Ok(())
    }
} // end of impl MockTransactionRepo

// ---- merchant repository

pub(super) struct MockMerchantRepo {
    pub profile: Mutex<Option<MerchantPaymentProfileModel>>,
    pub channels: Mutex<Vec<ProviderChannelModel>>,
}

#[async_trait]
impl AbstractMerchantRepo for MockMerchantRepo {
    async fn fetch_profile(
        &self,
        merchant_id: u64,
    ) -> Result<Option<MerchantPaymentProfileModel>, AppRepoError> {
        let g = self.profile.lock().unwrap();
        Ok(g.clone().filter(|p| p.merchant_id == merchant_id))
    }
    async fn fetch_channels(
        &self,
        _merchant_id: u64,
    ) -> Result<Vec<ProviderChannelModel>, AppRepoError> {
        let g = self.channels.lock().unwrap();
        Ok(g.clone())
    }
}

// ---- ledger-account repository

pub(super) struct MockLedgerAccountRepo {
    pub accounts: Arc<Mutex<Vec<LedgerAccountModel>>>,
    pub discrepancies: Arc<Mutex<Vec<LedgerDiscrepancyModel>>>,
}

impl MockLedgerAccountRepo {
    pub(super) fn new() -> Self {
        Self {
            accounts: Arc::new(Mutex::new(Vec::new())),
            discrepancies: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl AbstractLedgerAccountRepo for MockLedgerAccountRepo {
    async fn create(&self, accounts: &[LedgerAccountModel]) -> Result<(), AppRepoError> {
        let mut g = self.accounts.lock().unwrap();
        g.extend_from_slice(accounts);
        Ok(())
    }
    async fn delete_owner(
        &self,
        owner_type: LedgerOwnerType,
        owner_id: u64,
    ) -> Result<(), AppRepoError> {
        let mut g = self.accounts.lock().unwrap();
        g.retain(|a| !(a.owner_type == owner_type && a.owner_id == owner_id));
        Ok(())
    }
    async fn fetch_owner(
        &self,
        owner_type: LedgerOwnerType,
        owner_id: u64,
    ) -> Result<Vec<LedgerAccountModel>, AppRepoError> {
        let g = self.accounts.lock().unwrap();
        let out = g
            .iter()
            .filter(|a| a.owner_type == owner_type && a.owner_id == owner_id)
            .cloned()
            .collect();
        Ok(out)
    }
    async fn fetch_all_active(&self) -> Result<Vec<LedgerAccountModel>, AppRepoError> {
        let g = self.accounts.lock().unwrap();
        Ok(g.iter().filter(|a| a.is_active).cloned().collect())
    }
    async fn create_discrepancy(&self, d: &LedgerDiscrepancyModel) -> Result<(), AppRepoError> {
        let mut g = self.discrepancies.lock().unwrap();
        g.push(d.clone());
        Ok(())
    }
} // end of impl MockLedgerAccountRepo

// ---- payment processor, scripted per call

#[derive(Default)]
pub(super) struct ProcScript {
    pub payin: Mutex<VecDeque<Result<AppProcessorPayInResult, AppProcessorError>>>,
    pub payout: Mutex<VecDeque<Result<AppProcessorPayOutResult, AppProcessorError>>>,
    pub status: Mutex<VecDeque<Result<AppProcessorStatusResult, AppProcessorError>>>,
    pub webhook: Mutex<VecDeque<Result<AppProcessorWebhookEvent, AppProcessorError>>>,
    pub num_payin_calls: Mutex<u32>,
    pub num_payout_calls: Mutex<u32>,
}

pub(super) struct MockPaymentProcessor {
    pub script: Arc<ProcScript>,
}

#[async_trait]
impl AbstractPaymentProcessor for MockPaymentProcessor {
    async fn initiate_payin(
        &self,
        _channel: &RoutingSnapshotModel,
        _req: &payment_gateway::adapter::processor::AppProcessorPayRequest,
    ) -> Result<AppProcessorPayInResult, AppProcessorError> {
        *self.script.num_payin_calls.lock().unwrap() += 1;
        let mut g = self.script.payin.lock().unwrap();
        g.pop_front().unwrap()
    }
    async fn initiate_payout(
        &self,
        _channel: &RoutingSnapshotModel,
        _req: &payment_gateway::adapter::processor::AppProcessorPayRequest,
    ) -> Result<AppProcessorPayOutResult, AppProcessorError> {
        *self.script.num_payout_calls.lock().unwrap() += 1;
        let mut g = self.script.payout.lock().unwrap();
        g.pop_front().unwrap()
    }
    async fn check_status(
        &self,
        _channel: &RoutingSnapshotModel,
        _req: &AppProcessorStatusRequest,
    ) -> Result<AppProcessorStatusResult, AppProcessorError> {
        let mut g = self.script.status.lock().unwrap();
        g.pop_front().unwrap()
    }
    async fn parse_webhook(
        &self,
        _provider_label: &str,
        _raw_body: &[u8],
        _direction: payment_gateway::model::TxType,
    ) -> Result<AppProcessorWebhookEvent, AppProcessorError> {
        let mut g = self.script.webhook.lock().unwrap();
        g.pop_front().unwrap()
    }
} // end of impl MockPaymentProcessor

// ---- ledger engine shared between the flow context and test assertions

pub(super) struct SharedLedger(pub Arc<AppInMemLedgerEngine>);

#[async_trait]
impl AbstractLedgerEngine for SharedLedger {
    async fn create_accounts(&self, specs: Vec<AccountSpec>) -> Result<(), AppLedgerError> {
        self.0.create_accounts(specs).await
    }
    async fn transfer(&self, spec: TransferSpec) -> Result<u128, AppLedgerError> {
        self.0.transfer(spec).await
    }
    async fn post(&self, tid: u128) -> Result<(), AppLedgerError> {
        self.0.post(tid).await
    }
    async fn void(&self, tid: u128) -> Result<(), AppLedgerError> {
        self.0.void(tid).await
    }
    async fn reverse(&self, tid: u128) -> Result<u128, AppLedgerError> {
        self.0.reverse(tid).await
    }
    async fn get_balance(&self, account: u128) -> Result<AccountBalance, AppLedgerError> {
        self.0.get_balance(account).await
    }
    async fn get_balances(
        &self,
        accounts: &[u128],
    ) -> Result<Vec<(u128, AccountBalance)>, AppLedgerError> {
        self.0.get_balances(accounts).await
    }
    async fn query_transfers(
        &self,
        q: TransferQuery,
    ) -> Result<Vec<TransferRecord>, AppLedgerError> {
        self.0.query_transfers(q).await
    }
} // end of impl SharedLedger

// ---- fixtures

pub(super) fn ut_profile() -> MerchantPaymentProfileModel {
    MerchantPaymentProfileModel {
        merchant_id: UT_MERCHANT_ID,
        is_active: true,
        payin_enabled: true,
        payout_enabled: true,
        fee_tiers_payin: ut_default_tiers(),
        fee_tiers_payout: ut_default_tiers(),
        webhook_url: Some("https://shop.example.com/pay-events".to_string()),
        signing_secret: "0123456789abcdef".to_string(),
        rps_limit: 500,
    }
}

pub(super) fn ut_channel(channel_id: u64, priority: u16) -> ProviderChannelModel {
    ProviderChannelModel {
        channel_id,
        provider_id: 100 + channel_id,
        legal_entity_id: UT_LEGAL_ENTITY,
        provider_label: "mockpay".to_string(),
        priority,
        is_active: true,
        payin_enabled: true,
        payout_enabled: true,
        fee_tiers_payin: ut_default_tiers(),
        fee_tiers_payout: ut_default_tiers(),
        rps_limit: 500,
    }
}

pub(super) struct UtFlowPack {
    pub ctx: PaymentFlowContext,
    pub tx_rows: Arc<Mutex<HashMap<String, TxMetaModel>>>,
    pub ledger: Arc<AppInMemLedgerEngine>,
    pub script: Arc<ProcScript>,
    pub discrepancies: Arc<Mutex<Vec<LedgerDiscrepancyModel>>>,
}

pub(super) async fn ut_flow_pack(channels: Vec<ProviderChannelModel>) -> UtFlowPack {
    let logctx = ut_logctx();
    let tx_repo = MockTransactionRepo::new();
    let tx_rows = tx_repo.rows.clone();
    let merchant_repo = MockMerchantRepo {
        profile: Mutex::new(Some(ut_profile())),
        channels: Mutex::new(channels.clone()),
    };
    let account_repo = MockLedgerAccountRepo::new();
    let discrepancies = account_repo.discrepancies.clone();
    let ledger = Arc::new(AppInMemLedgerEngine::new(logctx.clone()));
    let script = Arc::new(ProcScript::default());
    let queue: Box<dyn AbstractJobQueue> = Box::new(AppInMemJobQueue::build(logctx.clone()));
    let ctx = PaymentFlowContext {
        tx_repo: Arc::new(Box::new(tx_repo)),
        merchant_repo: Arc::new(Box::new(merchant_repo)),
        account_repo: Arc::new(Box::new(account_repo)),
        ledger: Arc::new(Box::new(SharedLedger(ledger.clone()))),
        processors: Arc::new(Box::new(MockPaymentProcessor {
            script: script.clone(),
        })),
        queue: Arc::new(queue),
        throttle: Arc::new(app_cache_throttle()),
        markers: Arc::new(app_cache_marker()),
        callback: Arc::new(app_callback_context(&AppCallbackCfg::Discard, logctx.clone())),
        logctx,
        limits: AppThroughputCfg {
            system_rps: 1000,
            default_merchant_rps: 200,
            default_channel_rps: 200,
        },
        monitor: AppMonitorCfg {
            payin_expiry_secs: 1,
            payout_poll_interval_secs: 1,
            payout_poll_max_attempts: 3,
        },
    };
    // full role-account sets for every owner the flows touch
    let uc = ProvisionAccountsUseCase { ctx: ctx.clone() };
    uc.execute(LedgerOwnerType::Merchant, UT_MERCHANT_ID, "INR")
        .await
        .unwrap();
    for c in channels.iter() {
        uc.execute(LedgerOwnerType::ProviderChannel, c.channel_id, "INR")
            .await
            .unwrap();
    }
    uc.execute(LedgerOwnerType::LegalEntity, UT_LEGAL_ENTITY, "INR")
        .await
        .unwrap();
    uc.execute(LedgerOwnerType::SuperAdmin, 0, "INR").await.unwrap();
    uc.execute(LedgerOwnerType::World, 0, "INR").await.unwrap();
    UtFlowPack {
        ctx,
        tx_rows,
        ledger,
        script,
        discrepancies,
    }
} // end of fn ut_flow_pack

pub(super) fn ut_authed() -> AppAuthedMerchant {
    AppAuthedMerchant {
        merchant_id: UT_MERCHANT_ID,
    }
}

pub(super) fn ut_payin_req(order_id: &str, amount: &str) -> PayinCreateReqDto {
    PayinCreateReqDto {
        order_id: order_id.to_string(),
        amount: amount.to_string(),
        currency: PaymentCurrencyDto::INR,
        customer: CustomerPartyDto {
            name: "Asha K".to_string(),
            email: Some("asha@example.com".to_string()),
            phone: None,
        },
    }
}

pub(super) fn ut_payout_req(order_id: &str, amount: &str) -> PayoutCreateReqDto {
    PayoutCreateReqDto {
        order_id: order_id.to_string(),
        amount: amount.to_string(),
        currency: PaymentCurrencyDto::INR,
        beneficiary: BeneficiaryPartyDto {
            name: "Ravi T".to_string(),
            account_number: "004501563888".to_string(),
            ifsc: "HDFC0000045".to_string(),
            bank_name: Some("HDFC".to_string()),
        },
    }
}
