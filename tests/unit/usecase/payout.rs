use payment_gateway::adapter::ledger::AbstractLedgerEngine;
use payment_gateway::adapter::processor::{
    AppProcessorError, AppProcessorErrorReason, AppProcessorFnLabel, AppProcessorPayOutResult,
    AppProcessorStatusResult, AppProcessorWebhookEvent, GatewayPayStatus,
};
use payment_gateway::api::web::dto::{ProviderWebhookIngestDto, TxStatusDto};
use payment_gateway::model::{
    derive_account_id, LedgerAccountRole, LedgerOwnerType, TxStatus,
};
use payment_gateway::usecase::{
    CreatePayoutUseCase, FloatDirection, HandleWebhookUseCase, PaymentFlowError,
    PayoutPollUseCase, SettlementUseCase,
};

use super::{
    ut_authed, ut_channel, ut_flow_pack, ut_payout_req, UtFlowPack, UT_CHANNEL_A, UT_CHANNEL_B,
    UT_LEGAL_ENTITY, UT_MERCHANT_ID,
};

const UT_SEED_MINOR: u64 = 500_000; // 5000.00 disbursable

fn ut_payout_accepted(provider_ref: &str) -> AppProcessorPayOutResult {
    AppProcessorPayOutResult {
        success: true,
        status: GatewayPayStatus::PENDING,
        provider_txn_id: Some(provider_ref.to_string()),
        utr: None,
    }
}

fn ut_proc_error(reason: AppProcessorErrorReason) -> AppProcessorError {
    AppProcessorError {
        reason,
        fn_label: AppProcessorFnLabel::InitiatePayout,
    }
}

fn acct_merchant_payout() -> u128 {
    derive_account_id(
        LedgerOwnerType::Merchant,
        LedgerAccountRole::MerchantPayout,
        UT_MERCHANT_ID,
    )
    .unwrap()
}
fn acct_channel_payout(channel_id: u64) -> u128 {
    derive_account_id(
        LedgerOwnerType::ProviderChannel,
        LedgerAccountRole::ChannelPayout,
        channel_id,
    )
    .unwrap()
}
fn acct_income() -> u128 {
    derive_account_id(
        LedgerOwnerType::SuperAdmin,
        LedgerAccountRole::PlatformIncome,
        0,
    )
    .unwrap()
}

async fn ut_seed_payout_balance(pack: &UtFlowPack) {
    let uc = SettlementUseCase {
        ctx: pack.ctx.clone(),
    };
    uc.settle_merchant(UT_MERCHANT_ID, UT_SEED_MINOR).await.unwrap();
}

#[tokio::test]
async fn success_reserves_then_posts_on_poll() {
    let pack = ut_flow_pack(vec![ut_channel(UT_CHANNEL_A, 1)]).await;
    ut_seed_payout_balance(&pack).await;
    pack.script
        .payout
        .lock()
        .unwrap()
        .push_back(Ok(ut_payout_accepted("po-prov-1")));
    let uc = CreatePayoutUseCase {
        ctx: pack.ctx.clone(),
    };
    let resp = uc
        .execute(ut_authed(), ut_payout_req("po-2001", "1499"))
        .await
        .unwrap();
    assert_eq!(resp.status, TxStatusDto::PROCESSING);
    // payout fee is charged on top of the disbursed amount
    assert_eq!(resp.net_amount.as_str(), "1531.44");
    // 1531.44 reserved, nothing posted until the provider confirms
    let m = pack.ledger.get_balance(acct_merchant_payout()).await.unwrap();
    assert_eq!(m.debits_pending, 153144);
    assert_eq!(m.net(), UT_SEED_MINOR as i128);
    let c = pack
        .ledger
        .get_balance(acct_channel_payout(UT_CHANNEL_A))
        .await
        .unwrap();
    assert_eq!(c.credits_pending, 149900);
    assert_eq!(c.net(), 0i128);
    // provider confirms on the first poll round
    pack.script.status.lock().unwrap().push_back(Ok(AppProcessorStatusResult {
        status: GatewayPayStatus::SUCCESS,
        utr: Some("UTRPO9001".to_string()),
        message: None,
    }));
    let uc_poll = PayoutPollUseCase {
        ctx: pack.ctx.clone(),
    };
    uc_poll
        .execute(resp.transaction_id.as_str(), 1, false)
        .await
        .unwrap();
    let stored = pack
        .tx_rows
        .lock()
        .unwrap()
        .get(&resp.transaction_id)
        .cloned()
        .unwrap();
    assert_eq!(stored.status(), TxStatus::Success);
    assert_eq!(stored.utr(), Some("UTRPO9001"));
    let m = pack.ledger.get_balance(acct_merchant_payout()).await.unwrap();
    assert_eq!(m.debits_pending, 0);
    assert_eq!(m.net(), (UT_SEED_MINOR - 153144) as i128);
    let c = pack
        .ledger
        .get_balance(acct_channel_payout(UT_CHANNEL_A))
        .await
        .unwrap();
    assert_eq!(c.net(), 149900i128);
    assert_eq!(pack.ledger.get_balance(acct_income()).await.unwrap().net(), 3244i128);
} // end of fn success_reserves_then_posts_on_poll

#[tokio::test]
async fn retryable_failure_falls_back_to_next_channel() {
    let pack = ut_flow_pack(vec![ut_channel(UT_CHANNEL_A, 1), ut_channel(UT_CHANNEL_B, 2)]).await;
    ut_seed_payout_balance(&pack).await;
    {
        let mut g = pack.script.payout.lock().unwrap();
        g.push_back(Err(ut_proc_error(AppProcessorErrorReason::Timeout)));
        g.push_back(Ok(ut_payout_accepted("po-prov-2")));
    }
    let uc = CreatePayoutUseCase {
        ctx: pack.ctx.clone(),
    };
    let resp = uc
        .execute(ut_authed(), ut_payout_req("po-2002", "1499"))
        .await
        .unwrap();
    assert_eq!(*pack.script.num_payout_calls.lock().unwrap(), 2);
    let stored = pack
        .tx_rows
        .lock()
        .unwrap()
        .get(&resp.transaction_id)
        .cloned()
        .unwrap();
    assert_eq!(stored.routing().channel_id, UT_CHANNEL_B);
    // the abandoned channel's reservation was released, the fallback holds
    let a = pack
        .ledger
        .get_balance(acct_channel_payout(UT_CHANNEL_A))
        .await
        .unwrap();
    assert_eq!(a.credits_pending, 0);
    let b = pack
        .ledger
        .get_balance(acct_channel_payout(UT_CHANNEL_B))
        .await
        .unwrap();
    assert_eq!(b.credits_pending, 149900);
    let m = pack.ledger.get_balance(acct_merchant_payout()).await.unwrap();
    assert_eq!(m.debits_pending, 153144);
}

#[tokio::test]
async fn non_retryable_refusal_aborts_and_voids_hold() {
    let pack = ut_flow_pack(vec![ut_channel(UT_CHANNEL_A, 1), ut_channel(UT_CHANNEL_B, 2)]).await;
    ut_seed_payout_balance(&pack).await;
    pack.script.payout.lock().unwrap().push_back(Err(ut_proc_error(
        AppProcessorErrorReason::Rejected("beneficiary account frozen".to_string()),
    )));
    let uc = CreatePayoutUseCase {
        ctx: pack.ctx.clone(),
    };
    let result = uc.execute(ut_authed(), ut_payout_req("po-2003", "1499")).await;
    assert!(matches!(result.unwrap_err(), PaymentFlowError::Processor(_)));
    // the second channel was never tried
    assert_eq!(*pack.script.num_payout_calls.lock().unwrap(), 1);
    let stored = pack
        .tx_rows
        .lock()
        .unwrap()
        .values()
        .next()
        .cloned()
        .unwrap();
    assert_eq!(stored.status(), TxStatus::Failed);
    assert_eq!(stored.failure().unwrap().code.as_str(), "provider-failure");
    let m = pack.ledger.get_balance(acct_merchant_payout()).await.unwrap();
    assert_eq!(m.debits_pending, 0);
    assert_eq!(m.net(), UT_SEED_MINOR as i128);
}

#[tokio::test]
async fn insufficient_balance_fails_before_provider_call() {
    let pack = ut_flow_pack(vec![ut_channel(UT_CHANNEL_A, 1)]).await;
    // no settled balance at all
    let uc = CreatePayoutUseCase {
        ctx: pack.ctx.clone(),
    };
    let result = uc.execute(ut_authed(), ut_payout_req("po-2004", "1499")).await;
    assert!(matches!(result.unwrap_err(), PaymentFlowError::Ledger(_)));
    assert_eq!(*pack.script.num_payout_calls.lock().unwrap(), 0);
    let stored = pack
        .tx_rows
        .lock()
        .unwrap()
        .values()
        .next()
        .cloned()
        .unwrap();
    assert_eq!(stored.status(), TxStatus::Failed);
    assert_eq!(stored.failure().unwrap().code.as_str(), "insufficient-funds");
    let m = pack.ledger.get_balance(acct_merchant_payout()).await.unwrap();
    assert_eq!(m.debits_pending, 0);
}

#[tokio::test]
async fn duplicate_payout_order_rejected() {
    let pack = ut_flow_pack(vec![ut_channel(UT_CHANNEL_A, 1)]).await;
    ut_seed_payout_balance(&pack).await;
    pack.script
        .payout
        .lock()
        .unwrap()
        .push_back(Ok(ut_payout_accepted("po-prov-3")));
    let uc = CreatePayoutUseCase {
        ctx: pack.ctx.clone(),
    };
    uc.execute(ut_authed(), ut_payout_req("po-2005", "1499"))
        .await
        .unwrap();
    let result = uc.execute(ut_authed(), ut_payout_req("po-2005", "1499")).await;
    assert!(matches!(
        result.unwrap_err(),
        PaymentFlowError::DuplicateOrder { .. }
    ));
    assert_eq!(*pack.script.num_payout_calls.lock().unwrap(), 1);
    // exactly one reservation against the merchant
    let m = pack.ledger.get_balance(acct_merchant_payout()).await.unwrap();
    assert_eq!(m.debits_pending, 153144);
}

#[tokio::test]
async fn repeated_terminal_failures_void_the_hold_once() {
    let pack = ut_flow_pack(vec![ut_channel(UT_CHANNEL_A, 1)]).await;
    ut_seed_payout_balance(&pack).await;
    pack.script
        .payout
        .lock()
        .unwrap()
        .push_back(Ok(ut_payout_accepted("po-prov-6")));
    let uc = CreatePayoutUseCase {
        ctx: pack.ctx.clone(),
    };
    let resp = uc
        .execute(ut_authed(), ut_payout_req("po-2006", "1499"))
        .await
        .unwrap();
    let ut_failed_webhook = |webhook_id: &str| ProviderWebhookIngestDto {
        webhook_id: webhook_id.to_string(),
        provider_label: "mockpay".to_string(),
        direction: "PAYOUT".to_string(),
        raw_body: "{}".to_string(),
    };
    pack.script.webhook.lock().unwrap().push_back(Ok(AppProcessorWebhookEvent {
        provider_ref: "po-prov-6".to_string(),
        status: GatewayPayStatus::FAILED,
        amount: None,
        utr: None,
    }));
    let uc_wh = HandleWebhookUseCase {
        ctx: pack.ctx.clone(),
    };
    uc_wh.execute(ut_failed_webhook("wh-po-1")).await.unwrap();
    let stored = pack
        .tx_rows
        .lock()
        .unwrap()
        .get(&resp.transaction_id)
        .cloned()
        .unwrap();
    assert_eq!(stored.status(), TxStatus::Failed);
    let m = pack.ledger.get_balance(acct_merchant_payout()).await.unwrap();
    assert_eq!(m.debits_pending, 0);
    assert_eq!(m.net(), UT_SEED_MINOR as i128);
    // a straggler poll round reporting the same failure is dropped silently
    pack.script.status.lock().unwrap().push_back(Ok(AppProcessorStatusResult {
        status: GatewayPayStatus::FAILED,
        utr: None,
        message: None,
    }));
    let uc_poll = PayoutPollUseCase {
        ctx: pack.ctx.clone(),
    };
    uc_poll
        .execute(resp.transaction_id.as_str(), 2, false)
        .await
        .unwrap();
    // so is a second webhook delivery carrying a fresh id
    pack.script.webhook.lock().unwrap().push_back(Ok(AppProcessorWebhookEvent {
        provider_ref: "po-prov-6".to_string(),
        status: GatewayPayStatus::FAILED,
        amount: None,
        utr: None,
    }));
    uc_wh.execute(ut_failed_webhook("wh-po-2")).await.unwrap();
    let stored = pack
        .tx_rows
        .lock()
        .unwrap()
        .get(&resp.transaction_id)
        .cloned()
        .unwrap();
    assert_eq!(stored.status(), TxStatus::Failed);
    // the reservation released exactly once, nothing re-voided or re-held
    let m = pack.ledger.get_balance(acct_merchant_payout()).await.unwrap();
    assert_eq!(m.debits_pending, 0);
    assert_eq!(m.net(), UT_SEED_MINOR as i128);
    let c = pack
        .ledger
        .get_balance(acct_channel_payout(UT_CHANNEL_A))
        .await
        .unwrap();
    assert_eq!(c.credits_pending, 0);
    assert_eq!(c.net(), 0i128);
} // end of fn repeated_terminal_failures_void_the_hold_once

#[tokio::test]
async fn settlement_rerun_same_day_moves_once() {
    let pack = ut_flow_pack(vec![ut_channel(UT_CHANNEL_A, 1)]).await;
    let uc = SettlementUseCase {
        ctx: pack.ctx.clone(),
    };
    let first = uc.settle_merchant(UT_MERCHANT_ID, UT_SEED_MINOR).await.unwrap();
    let second = uc.settle_merchant(UT_MERCHANT_ID, UT_SEED_MINOR).await.unwrap();
    assert_eq!(first, second);
    let m = pack.ledger.get_balance(acct_merchant_payout()).await.unwrap();
    assert_eq!(m.net(), UT_SEED_MINOR as i128);
}

#[tokio::test]
async fn legal_entity_float_one_batch_per_path_per_day() {
    let pack = ut_flow_pack(vec![ut_channel(UT_CHANNEL_A, 1)]).await;
    let uc = SettlementUseCase {
        ctx: pack.ctx.clone(),
    };
    uc.settle_legal_entity(UT_LEGAL_ENTITY, UT_CHANNEL_A, 70_000, FloatDirection::ToChannel)
        .await
        .unwrap();
    let c = pack
        .ledger
        .get_balance(acct_channel_payout(UT_CHANNEL_A))
        .await
        .unwrap();
    assert_eq!(c.net(), 70_000i128);
    // a differing same-day run on the same path is rejected, not applied
    let result = uc
        .settle_legal_entity(
            UT_LEGAL_ENTITY,
            UT_CHANNEL_A,
            20_000,
            FloatDirection::ToLegalEntity,
        )
        .await;
    assert!(matches!(result.unwrap_err(), PaymentFlowError::Ledger(_)));
    let c = pack
        .ledger
        .get_balance(acct_channel_payout(UT_CHANNEL_A))
        .await
        .unwrap();
    assert_eq!(c.net(), 70_000i128);
}
