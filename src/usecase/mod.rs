mod create_payin;
mod create_payout;
mod flow;
mod monitor;
mod provision;
mod reconcile;
mod settlement;
mod webhook;

use std::result::Result;

use crate::adapter::processor::AppProcessorPayRequest;
use crate::adapter::repository::{
    app_repo_ledger_account, app_repo_merchant, app_repo_transaction, AppRepoError,
};
use crate::model::TxMetaModel;
use crate::AppSharedState;

pub use create_payin::CreatePayinUseCase;
pub use create_payout::CreatePayoutUseCase;
pub use flow::{PaymentFlowContext, PaymentFlowError};
pub use monitor::{parse_expiry_payload, parse_poll_payload, PayinExpiryUseCase, PayoutPollUseCase};
pub use provision::ProvisionAccountsUseCase;
pub use reconcile::{ReconcileSummary, ReconcileUseCase};
pub use settlement::{parse_settlement_payload, FloatDirection, SettlementUseCase};
pub use webhook::HandleWebhookUseCase;

/// single-currency deployment, every ledger account and every provider
/// call carries this code, multi-currency needs a per-merchant column
pub const DEFAULT_CURRENCY: &str = "INR";

pub(crate) fn processor_pay_request(tx: &TxMetaModel) -> AppProcessorPayRequest {
    AppProcessorPayRequest {
        tx_id: tx.id().to_string(),
        amount: tx.amount(),
        currency: DEFAULT_CURRENCY.to_string(),
        merchant_id: tx.merchant_id(),
        party: tx.party().clone(),
    }
}

/// wire a workflow context off the shared state, repositories are built
/// per call site, everything else is the process-wide singleton
pub async fn app_flow_context(shr_state: &AppSharedState) -> Result<PaymentFlowContext, AppRepoError> {
    let dstore = shr_state.datastore();
    let tx_repo = app_repo_transaction(dstore.clone()).await?;
    let merchant_repo = app_repo_merchant(dstore.clone()).await?;
    let account_repo = app_repo_ledger_account(dstore).await?;
    let cfg = shr_state.config();
    Ok(PaymentFlowContext {
        tx_repo: std::sync::Arc::new(tx_repo),
        merchant_repo: std::sync::Arc::new(merchant_repo),
        account_repo: std::sync::Arc::new(account_repo),
        ledger: shr_state.ledger_context(),
        processors: shr_state.processor_context(),
        queue: shr_state.queue_context(),
        throttle: shr_state.throttle_cache(),
        markers: shr_state.marker_cache(),
        callback: shr_state.callback_context(),
        logctx: shr_state.log_context(),
        limits: cfg.gateway.limits,
        monitor: cfg.gateway.monitor,
    })
} // end of fn app_flow_context
