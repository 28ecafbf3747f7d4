use std::boxed::Box;
use std::result::Result;
use std::sync::Arc;

use chrono::Utc;

use crate::adapter::cache::{AbstractMarkerCache, AbstractThrottleCache};
use crate::adapter::callback::AbstractMerchantCallback;
use crate::adapter::ledger::{
    AbstractLedgerEngine, AppLedgerError, LedgerErrorReason, LedgerOpCode, TransferLeg,
    TransferSpec,
};
use crate::adapter::processor::{AbstractPaymentProcessor, AppProcessorError};
use crate::adapter::queue::{AbstractJobQueue, AppJobTask, AppJobType, AppQueueError, AppQueueLabel};
use crate::adapter::repository::{
    AbstractLedgerAccountRepo, AbstractMerchantRepo, AbstractTransactionRepo, AppRepoError,
};
use crate::app_log_event;
use crate::config::{AppMonitorCfg, AppThroughputCfg};
use crate::logging::{AppLogContext, AppLogLevel};
use crate::model::{
    derive_account_id, to_minor_units, AccountModelError, AmountModelError, FeeModelError,
    LedgerAccountRole, LedgerOwnerType, MerchantModelError, RoutingModelError, TxFailureClass,
    TxFailureDetail, TxMetaModel, TxModelError, TxStatus, TxType,
};

/// owner id of the single platform-income account
pub const SYSTEM_OWNER_ID: u64 = 0;

const THROTTLE_WINDOW_SECS: u32 = 1;

/// every collaborator a payment workflow touches, injected explicitly, no
/// ambient lookups mid-step
#[derive(Clone)]
pub struct PaymentFlowContext {
    pub tx_repo: Arc<Box<dyn AbstractTransactionRepo>>,
    pub merchant_repo: Arc<Box<dyn AbstractMerchantRepo>>,
    pub account_repo: Arc<Box<dyn AbstractLedgerAccountRepo>>,
    pub ledger: Arc<Box<dyn AbstractLedgerEngine>>,
    pub processors: Arc<Box<dyn AbstractPaymentProcessor>>,
    pub queue: Arc<Box<dyn AbstractJobQueue>>,
    pub throttle: Arc<Box<dyn AbstractThrottleCache>>,
    pub markers: Arc<Box<dyn AbstractMarkerCache>>,
    pub callback: Arc<Box<dyn AbstractMerchantCallback>>,
    pub logctx: Arc<AppLogContext>,
    pub limits: AppThroughputCfg,
    pub monitor: AppMonitorCfg,
}

#[derive(Debug)]
pub enum PaymentFlowError {
    ProfileNotFound(u64),
    TransactionNotFound(String),
    DuplicateOrder { merchant_id: u64, order_id: String },
    Throttled(String),
    Merchant(MerchantModelError),
    Routing(RoutingModelError),
    Amount(AmountModelError),
    Fee(FeeModelError),
    Account(AccountModelError),
    Model(TxModelError),
    Ledger(AppLedgerError),
    Processor(AppProcessorError),
    Repository(AppRepoError),
    Queue(AppQueueError),
}

impl From<MerchantModelError> for PaymentFlowError {
    fn from(value: MerchantModelError) -> Self {
        Self::Merchant(value)
    }
}
impl From<RoutingModelError> for PaymentFlowError {
    fn from(value: RoutingModelError) -> Self {
        Self::Routing(value)
    }
}
impl From<AmountModelError> for PaymentFlowError {
    fn from(value: AmountModelError) -> Self {
        Self::Amount(value)
    }
}
impl From<FeeModelError> for PaymentFlowError {
    fn from(value: FeeModelError) -> Self {
        Self::Fee(value)
    }
}
impl From<AccountModelError> for PaymentFlowError {
    fn from(value: AccountModelError) -> Self {
        Self::Account(value)
    }
}
impl From<TxModelError> for PaymentFlowError {
    fn from(value: TxModelError) -> Self {
        Self::Model(value)
    }
}
impl From<AppLedgerError> for PaymentFlowError {
    fn from(value: AppLedgerError) -> Self {
        Self::Ledger(value)
    }
}
impl From<AppProcessorError> for PaymentFlowError {
    fn from(value: AppProcessorError) -> Self {
        Self::Processor(value)
    }
}
impl From<AppRepoError> for PaymentFlowError {
    fn from(value: AppRepoError) -> Self {
        Self::Repository(value)
    }
}
impl From<AppQueueError> for PaymentFlowError {
    fn from(value: AppQueueError) -> Self {
        Self::Queue(value)
    }
}

impl PaymentFlowError {
    /// classification feeding both the stable error code and the
    /// merchant-safe masking in `TxFailureDetail::merchant_message`
    pub fn failure_detail(&self) -> TxFailureDetail {
        let (class, code, detail) = match self {
            Self::ProfileNotFound(mid) => (
                TxFailureClass::Configuration,
                "merchant-profile-missing",
                format!("merchant:{mid}"),
            ),
            Self::TransactionNotFound(id_) => (
                TxFailureClass::Internal,
                "transaction-missing",
                id_.clone(),
            ),
            Self::DuplicateOrder {
                merchant_id,
                order_id,
            } => (
                TxFailureClass::Validation,
                "duplicate-order",
                format!("merchant:{merchant_id}, order:{order_id}"),
            ),
            Self::Throttled(key) => (
                TxFailureClass::Validation,
                "rate-limited",
                format!("limit:{key}"),
            ),
            Self::Merchant(e) => (
                TxFailureClass::Validation,
                "merchant-service-disabled",
                format!("{e:?}"),
            ),
            Self::Routing(e) => (
                TxFailureClass::Configuration,
                "no-eligible-channel",
                format!("{e:?}"),
            ),
            Self::Amount(e) => (
                TxFailureClass::Validation,
                "invalid-amount",
                format!("{e:?}"),
            ),
            Self::Fee(e) => (
                TxFailureClass::Configuration,
                "fee-tier-gap",
                format!("{e:?}"),
            ),
            Self::Account(e) => (
                TxFailureClass::Configuration,
                "account-derivation",
                format!("{e:?}"),
            ),
            Self::Model(e) => (TxFailureClass::Internal, "model-state", format!("{e:?}")),
            Self::Ledger(e) => match &e.reason {
                LedgerErrorReason::InsufficientFunds(acct) => (
                    TxFailureClass::Validation,
                    "insufficient-funds",
                    format!("account:{acct:#x}"),
                ),
                _others => (TxFailureClass::Ledger, "ledger-failure", format!("{e:?}")),
            },
            Self::Processor(e) => (
                TxFailureClass::Provider,
                "provider-failure",
                format!("{e:?}"),
            ),
            Self::Repository(e) => (
                TxFailureClass::Persistence,
                "persistence-failure",
                format!("{e:?}"),
            ),
            Self::Queue(e) => (
                TxFailureClass::Internal,
                "queue-failure",
                format!("{e:?}"),
            ),
        };
        TxFailureDetail {
            class,
            code: code.to_string(),
            detail,
        }
    } // end of fn failure_detail
} // end of impl PaymentFlowError

pub(super) async fn throttle_gate(
    ctx: &PaymentFlowContext,
    merchant_id: u64,
    merchant_rps: u32,
) -> Result<(), PaymentFlowError> {
    let pairs = [
        ("rps:sys".to_string(), ctx.limits.system_rps),
        (format!("rps:m:{merchant_id}"), merchant_rps),
    ];
    for (key, limit) in pairs {
        let limit = if limit == 0 {
            ctx.limits.default_merchant_rps
        } else {
            limit
        };
        let passed = ctx
            .throttle
            .incr_within(key.as_str(), limit, THROTTLE_WINDOW_SECS)
            .await;
        if !passed {
            return Err(PaymentFlowError::Throttled(key));
        }
    }
    Ok(())
}

pub(super) async fn throttle_gate_channel(
    ctx: &PaymentFlowContext,
    channel_id: u64,
    channel_rps: u32,
) -> Result<(), PaymentFlowError> {
    let key = format!("rps:c:{channel_id}");
    let limit = if channel_rps == 0 {
        ctx.limits.default_channel_rps
    } else {
        channel_rps
    };
    let passed = ctx
        .throttle
        .incr_within(key.as_str(), limit, THROTTLE_WINDOW_SECS)
        .await;
    if passed {
        Ok(())
    } else {
        Err(PaymentFlowError::Throttled(key))
    }
}

pub(super) fn poll_marker_key(tx_id: &str) -> String {
    format!("poll:{tx_id}")
}
pub(super) fn webhook_marker_key(webhook_id: &str) -> String {
    format!("wh:{webhook_id}")
}
pub(super) fn hold_external_ref(tx_id: &str, channel_id: u64) -> String {
    format!("hold:{tx_id}:{channel_id}")
}
pub(super) fn capture_external_ref(tx_id: &str) -> String {
    format!("cap:{tx_id}")
}

/// pending reservation created before the provider is ever called :
/// merchant payout account funds both the disbursed amount and the fee cut
pub(super) fn payout_hold_spec(
    tx: &TxMetaModel,
    channel_id: u64,
) -> Result<TransferSpec, PaymentFlowError> {
    let merchant_acct = derive_account_id(
        LedgerOwnerType::Merchant,
        LedgerAccountRole::MerchantPayout,
        tx.merchant_id(),
    )?;
    let channel_acct = derive_account_id(
        LedgerOwnerType::ProviderChannel,
        LedgerAccountRole::ChannelPayout,
        channel_id,
    )?;
    let income_acct = derive_account_id(
        LedgerOwnerType::SuperAdmin,
        LedgerAccountRole::PlatformIncome,
        SYSTEM_OWNER_ID,
    )?;
    let net_m = to_minor_units(tx.net_amount())?;
    let amt_m = to_minor_units(tx.amount())?;
    // fee leg derived by subtraction so the legs balance to the paisa even
    // if a display figure was re-rounded somewhere upstream
    let fee_m = net_m - amt_m;
    let mut credits = vec![TransferLeg {
        account: channel_acct,
        amount: amt_m,
    }];
    if fee_m > 0 {
        credits.push(TransferLeg {
            account: income_acct,
            amount: fee_m,
        });
    }
    Ok(TransferSpec {
        debits: vec![TransferLeg {
            account: merchant_acct,
            amount: net_m,
        }],
        credits,
        code: LedgerOpCode::PayoutHold,
        pending: true,
        external_ref: Some(hold_external_ref(tx.id(), channel_id)),
    })
} // end of fn payout_hold_spec

/// posted in one shot when the provider confirms collection : the outside
/// world funds the merchant's net plus the platform's fee cut
pub(super) fn payin_capture_spec(tx: &TxMetaModel) -> Result<TransferSpec, PaymentFlowError> {
    let world_acct = derive_account_id(
        LedgerOwnerType::World,
        LedgerAccountRole::World,
        SYSTEM_OWNER_ID,
    )?;
    let merchant_acct = derive_account_id(
        LedgerOwnerType::Merchant,
        LedgerAccountRole::MerchantPayin,
        tx.merchant_id(),
    )?;
    let income_acct = derive_account_id(
        LedgerOwnerType::SuperAdmin,
        LedgerAccountRole::PlatformIncome,
        SYSTEM_OWNER_ID,
    )?;
    let amt_m = to_minor_units(tx.amount())?;
    let net_m = to_minor_units(tx.net_amount())?;
    let fee_m = amt_m - net_m;
    let mut credits = vec![TransferLeg {
        account: merchant_acct,
        amount: net_m,
    }];
    if fee_m > 0 {
        credits.push(TransferLeg {
            account: income_acct,
            amount: fee_m,
        });
    }
    Ok(TransferSpec {
        debits: vec![TransferLeg {
            account: world_acct,
            amount: amt_m,
        }],
        credits,
        code: LedgerOpCode::PayinCapture,
        pending: false,
        external_ref: Some(capture_external_ref(tx.id())),
    })
} // end of fn payin_capture_spec

pub(super) async fn enqueue_merchant_callback(
    ctx: &PaymentFlowContext,
    tx: &TxMetaModel,
) -> Result<(), PaymentFlowError> {
    let dto = crate::api::web::dto::MerchantCallbackDto::from(tx);
    let payload = serde_json::json!({
        "merchant_id": tx.merchant_id(),
        "notification": serde_json::to_value(&dto)
            .unwrap_or(serde_json::Value::Null),
    });
    let task = AppJobTask::new(
        format!("cb-{}-{}", tx.id(), tx.status().label()),
        AppJobType::MerchantCallback,
        payload,
    );
    ctx.queue.enqueue(AppQueueLabel::Jobs, task).await?;
    Ok(())
}

/// single failure hook for every workflow step, legal to call twice on the
/// same transaction without double-voiding or double-failing
pub(super) async fn handle_failure(
    ctx: &PaymentFlowContext,
    tx: &mut TxMetaModel,
    detail: TxFailureDetail,
) -> Result<(), PaymentFlowError> {
    let now = Utc::now();
    tx.set_failure(detail, now);
    if !tx.status().is_terminal() {
        tx.transit_status(TxStatus::Failed, now)?;
        let won = ctx
            .tx_repo
            .update_status_guarded(tx, &[TxStatus::Pending, TxStatus::Processing])
            .await?;
        if !won {
            let logctx_p = &ctx.logctx;
            app_log_event!(
                logctx_p,
                AppLogLevel::INFO,
                "already-finalized, txn:{}",
                tx.id()
            );
            return Ok(());
        }
    }
    let hold_pending = tx.ledger().hold_transfer_id.is_some()
        && !tx.ledger().ledger_voided
        && tx.ledger().posted_transfer_id.is_none();
    if hold_pending {
        let tid = match tx.ledger().hold_transfer_id {
            Some(v) => v,
            None => return Ok(()),
        };
        match ctx.ledger.void(tid).await {
            Ok(()) => {
                tx.mark_ledger_voided(now);
            }
            Err(AppLedgerError {
                reason: LedgerErrorReason::NotPending(_),
                ..
            }) => {
                let logctx_p = &ctx.logctx;
                app_log_event!(
                    logctx_p,
                    AppLogLevel::WARNING,
                    "hold-not-pending, txn:{}, transfer:{tid:#x}",
                    tx.id()
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
    ctx.tx_repo.update_progress(tx).await?;
    enqueue_merchant_callback(ctx, tx).await?;
    Ok(())
} // end of fn handle_failure

/// the one place a terminal event (webhook or poll result) moves money :
/// wins the guarded status update first, then posts / voids / captures,
/// losers and late events degrade to logged no-ops
pub(super) async fn finalize_terminal(
    ctx: &PaymentFlowContext,
    tx: &mut TxMetaModel,
    next: TxStatus,
    utr: Option<String>,
) -> Result<bool, PaymentFlowError> {
    let logctx_p = &ctx.logctx;
    if tx.status().is_terminal() {
        app_log_event!(
            logctx_p,
            AppLogLevel::INFO,
            "late-terminal-event, txn:{}, kept:{}",
            tx.id(),
            tx.status().label()
        );
        return Ok(false);
    }
    let now = Utc::now();
    if utr.is_some() {
        tx.set_provider_result(None, utr, now);
    }
    tx.transit_status(next, now)?;
    let won = ctx
        .tx_repo
        .update_status_guarded(tx, &[TxStatus::Pending, TxStatus::Processing])
        .await?;
    if !won {
        app_log_event!(
            logctx_p,
            AppLogLevel::INFO,
            "terminal-race-lost, txn:{}",
            tx.id()
        );
        return Ok(false);
    }
    match tx.tx_type() {
        TxType::Payin => {
            if matches!(next, TxStatus::Success) {
                let spec = payin_capture_spec(tx)?;
                let tid = ctx.ledger.transfer(spec).await?;
                tx.set_posted_transfer(tid, now)?;
            }
            // failed / expired payins never touched the ledger
        }
        TxType::Payout => {
            let maybe_hold = tx.ledger().hold_transfer_id;
            if let Some(tid) = maybe_hold {
                if matches!(next, TxStatus::Success) {
                    match ctx.ledger.post(tid).await {
                        Ok(()) => tx.set_posted_transfer(tid, now)?,
                        Err(AppLedgerError {
                            reason: LedgerErrorReason::NotPending(_),
                            ..
                        }) => {
                            app_log_event!(
                                logctx_p,
                                AppLogLevel::WARNING,
                                "hold-already-settled, txn:{}, transfer:{tid:#x}",
                                tx.id()
                            );
                        }
                        Err(e) => return Err(e.into()),
                    }
                } else if !tx.ledger().ledger_voided {
                    match ctx.ledger.void(tid).await {
                        Ok(()) => {
                            tx.mark_ledger_voided(now);
                        }
                        Err(AppLedgerError {
                            reason: LedgerErrorReason::NotPending(_),
                            ..
                        }) => {
                            app_log_event!(
                                logctx_p,
                                AppLogLevel::WARNING,
                                "hold-already-settled, txn:{}, transfer:{tid:#x}",
                                tx.id()
                            );
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    } // end of match tx-type
    ctx.tx_repo.update_progress(tx).await?;
    ctx.markers.delete(poll_marker_key(tx.id()).as_str()).await;
    enqueue_merchant_callback(ctx, tx).await?;
    Ok(true)
} // end of fn finalize_terminal
