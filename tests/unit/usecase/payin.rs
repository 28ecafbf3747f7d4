use payment_gateway::adapter::ledger::AbstractLedgerEngine;
use payment_gateway::adapter::processor::{
    AppProcessorPayInResult, AppProcessorWebhookEvent, GatewayPayStatus,
};
use payment_gateway::adapter::queue::{AbstractJobQueue, AppJobType, AppQueueLabel};
use payment_gateway::api::web::dto::{ProviderWebhookIngestDto, TxStatusDto};
use payment_gateway::model::{
    derive_account_id, LedgerAccountRole, LedgerOwnerType, TxStatus,
};
use payment_gateway::usecase::{
    CreatePayinUseCase, HandleWebhookUseCase, PayinExpiryUseCase, PaymentFlowError,
};

use super::{ut_authed, ut_channel, ut_flow_pack, ut_payin_req, UtFlowPack, UT_CHANNEL_A, UT_MERCHANT_ID};

fn ut_payin_accepted(provider_ref: &str) -> AppProcessorPayInResult {
    AppProcessorPayInResult {
        success: true,
        status: GatewayPayStatus::PENDING,
        provider_txn_id: Some(provider_ref.to_string()),
        payment_intent: Some("upi://pay?pa=mockpay@ybl".to_string()),
    }
}

fn ut_webhook_ingest(webhook_id: &str, body: &str) -> ProviderWebhookIngestDto {
    ProviderWebhookIngestDto {
        webhook_id: webhook_id.to_string(),
        provider_label: "mockpay".to_string(),
        direction: "PAYIN".to_string(),
        raw_body: body.to_string(),
    }
}

async fn ut_accepted_payin(pack: &UtFlowPack, order_id: &str, provider_ref: &str) -> String {
    pack.script
        .payin
        .lock()
        .unwrap()
        .push_back(Ok(ut_payin_accepted(provider_ref)));
    let uc = CreatePayinUseCase {
        ctx: pack.ctx.clone(),
    };
    let resp = uc
        .execute(ut_authed(), ut_payin_req(order_id, "1499"))
        .await
        .unwrap();
    resp.transaction_id
}

#[tokio::test]
async fn create_ok_with_fee_breakdown() {
    let pack = ut_flow_pack(vec![ut_channel(UT_CHANNEL_A, 1)]).await;
    pack.script
        .payin
        .lock()
        .unwrap()
        .push_back(Ok(ut_payin_accepted("prov-001")));
    let uc = CreatePayinUseCase {
        ctx: pack.ctx.clone(),
    };
    let resp = uc
        .execute(ut_authed(), ut_payin_req("ord-1001", "1499"))
        .await
        .unwrap();
    assert_eq!(resp.status, TxStatusDto::PENDING);
    assert_eq!(resp.amount.as_str(), "1499");
    assert_eq!(resp.net_amount.as_str(), "1466.56");
    assert_eq!(resp.fee.total.as_str(), "32.44");
    assert_eq!(resp.fee.tax.as_str(), "4.95");
    assert_eq!(resp.payment_intent.as_deref(), Some("upi://pay?pa=mockpay@ybl"));
    // acceptance schedules the auto-expiry watchdog
    let claimed = pack
        .ctx
        .queue
        .claim(AppQueueLabel::Jobs, 3)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.task.jtype, AppJobType::PayinExpiry);
    // no money moved at creation, collection settles on the webhook
    let world = derive_account_id(LedgerOwnerType::World, LedgerAccountRole::World, 0).unwrap();
    let bal = pack.ledger.get_balance(world).await.unwrap();
    assert_eq!(bal.debits_posted, 0);
}

#[tokio::test]
async fn duplicate_order_rejected_without_side_effects() {
    let pack = ut_flow_pack(vec![ut_channel(UT_CHANNEL_A, 1)]).await;
    let _tx_id = ut_accepted_payin(&pack, "ord-1002", "prov-002").await;
    let uc = CreatePayinUseCase {
        ctx: pack.ctx.clone(),
    };
    let result = uc.execute(ut_authed(), ut_payin_req("ord-1002", "750")).await;
    assert!(matches!(
        result.unwrap_err(),
        PaymentFlowError::DuplicateOrder { .. }
    ));
    // the provider was never contacted for the duplicate
    assert_eq!(*pack.script.num_payin_calls.lock().unwrap(), 1);
    assert_eq!(pack.tx_rows.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn synchronous_refusal_keeps_order_id_free() {
    let pack = ut_flow_pack(vec![ut_channel(UT_CHANNEL_A, 1)]).await;
    pack.script.payin.lock().unwrap().push_back(Ok(AppProcessorPayInResult {
        success: false,
        status: GatewayPayStatus::FAILED,
        provider_txn_id: None,
        payment_intent: None,
    }));
    let uc = CreatePayinUseCase {
        ctx: pack.ctx.clone(),
    };
    let result = uc.execute(ut_authed(), ut_payin_req("ord-1003", "1499")).await;
    assert!(matches!(result.unwrap_err(), PaymentFlowError::Processor(_)));
    assert!(pack.tx_rows.lock().unwrap().is_empty());
    // same order id goes through once the provider accepts
    let _tx_id = ut_accepted_payin(&pack, "ord-1003", "prov-003").await;
    assert_eq!(pack.tx_rows.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn success_webhook_captures_in_one_posted_transfer() {
    let pack = ut_flow_pack(vec![ut_channel(UT_CHANNEL_A, 1)]).await;
    let tx_id = ut_accepted_payin(&pack, "ord-1004", "prov-004").await;
    pack.script.webhook.lock().unwrap().push_back(Ok(AppProcessorWebhookEvent {
        provider_ref: "prov-004".to_string(),
        status: GatewayPayStatus::SUCCESS,
        amount: None,
        utr: Some("UTR9001".to_string()),
    }));
    let uc = HandleWebhookUseCase {
        ctx: pack.ctx.clone(),
    };
    uc.execute(ut_webhook_ingest("wh-100", "{}")).await.unwrap();
    let stored = pack.tx_rows.lock().unwrap().get(&tx_id).cloned().unwrap();
    assert_eq!(stored.status(), TxStatus::Success);
    assert_eq!(stored.utr(), Some("UTR9001"));
    assert!(stored.ledger().posted_transfer_id.is_some());
    // 1499.00 gross split into 1466.56 net + 32.44 platform cut
    let world = derive_account_id(LedgerOwnerType::World, LedgerAccountRole::World, 0).unwrap();
    let payin = derive_account_id(
        LedgerOwnerType::Merchant,
        LedgerAccountRole::MerchantPayin,
        UT_MERCHANT_ID,
    )
    .unwrap();
    let income = derive_account_id(
        LedgerOwnerType::SuperAdmin,
        LedgerAccountRole::PlatformIncome,
        0,
    )
    .unwrap();
    assert_eq!(pack.ledger.get_balance(world).await.unwrap().net(), -149900i128);
    assert_eq!(pack.ledger.get_balance(payin).await.unwrap().net(), 146656i128);
    assert_eq!(pack.ledger.get_balance(income).await.unwrap().net(), 3244i128);
    // replaying the same webhook id changes nothing
    uc.execute(ut_webhook_ingest("wh-100", "{}")).await.unwrap();
    assert_eq!(pack.ledger.get_balance(payin).await.unwrap().net(), 146656i128);
}

#[tokio::test]
async fn expiry_fires_once_and_late_webhook_cannot_reopen() {
    let pack = ut_flow_pack(vec![ut_channel(UT_CHANNEL_A, 1)]).await;
    let tx_id = ut_accepted_payin(&pack, "ord-1005", "prov-005").await;
    let uc_exp = PayinExpiryUseCase {
        ctx: pack.ctx.clone(),
    };
    uc_exp.execute(tx_id.as_str()).await.unwrap();
    let stored = pack.tx_rows.lock().unwrap().get(&tx_id).cloned().unwrap();
    assert_eq!(stored.status(), TxStatus::Expired);
    let num_events = stored.events().len();
    // watchdog re-delivery is a no-op
    uc_exp.execute(tx_id.as_str()).await.unwrap();
    let stored = pack.tx_rows.lock().unwrap().get(&tx_id).cloned().unwrap();
    assert_eq!(stored.status(), TxStatus::Expired);
    assert_eq!(stored.events().len(), num_events);
    // the provider confirming afterwards must not resurrect the payment
    pack.script.webhook.lock().unwrap().push_back(Ok(AppProcessorWebhookEvent {
        provider_ref: "prov-005".to_string(),
        status: GatewayPayStatus::SUCCESS,
        amount: None,
        utr: Some("UTR9002".to_string()),
    }));
    let uc_wh = HandleWebhookUseCase {
        ctx: pack.ctx.clone(),
    };
    uc_wh.execute(ut_webhook_ingest("wh-200", "{}")).await.unwrap();
    let stored = pack.tx_rows.lock().unwrap().get(&tx_id).cloned().unwrap();
    assert_eq!(stored.status(), TxStatus::Expired);
    assert!(stored.ledger().posted_transfer_id.is_none());
    let payin = derive_account_id(
        LedgerOwnerType::Merchant,
        LedgerAccountRole::MerchantPayin,
        UT_MERCHANT_ID,
    )
    .unwrap();
    assert_eq!(pack.ledger.get_balance(payin).await.unwrap().net(), 0i128);
}

#[tokio::test]
async fn missing_profile_rejected() {
    let pack = ut_flow_pack(vec![ut_channel(UT_CHANNEL_A, 1)]).await;
    let uc = CreatePayinUseCase {
        ctx: pack.ctx.clone(),
    };
    let authed = payment_gateway::auth::AppAuthedMerchant { merchant_id: 404 };
    let result = uc.execute(authed, ut_payin_req("ord-1006", "10")).await;
    assert!(matches!(
        result.unwrap_err(),
        PaymentFlowError::ProfileNotFound(404)
    ));
}
