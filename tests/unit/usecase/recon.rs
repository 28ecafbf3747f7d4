use payment_gateway::adapter::ledger::{AbstractLedgerEngine, AccountBalance};
use payment_gateway::adapter::processor::{
    AppProcessorPayInResult, AppProcessorWebhookEvent, GatewayPayStatus,
};
use payment_gateway::api::web::dto::ProviderWebhookIngestDto;
use payment_gateway::model::{
    derive_account_id, LedgerAccountRole, LedgerDiscrepancyKind, LedgerOwnerType,
};
use payment_gateway::usecase::{CreatePayinUseCase, HandleWebhookUseCase, ReconcileUseCase};

use super::{ut_authed, ut_channel, ut_flow_pack, ut_payin_req, UtFlowPack, UT_CHANNEL_A, UT_MERCHANT_ID};

/// a fully captured payin, so the journal holds real posted entries
async fn ut_captured_payin(pack: &UtFlowPack) {
    pack.script.payin.lock().unwrap().push_back(Ok(AppProcessorPayInResult {
        success: true,
        status: GatewayPayStatus::PENDING,
        provider_txn_id: Some("prov-rc-1".to_string()),
        payment_intent: None,
    }));
    let uc = CreatePayinUseCase {
        ctx: pack.ctx.clone(),
    };
    uc.execute(ut_authed(), ut_payin_req("ord-rc-1", "1499"))
        .await
        .unwrap();
    pack.script.webhook.lock().unwrap().push_back(Ok(AppProcessorWebhookEvent {
        provider_ref: "prov-rc-1".to_string(),
        status: GatewayPayStatus::SUCCESS,
        amount: None,
        utr: Some("UTRRC1".to_string()),
    }));
    let uc = HandleWebhookUseCase {
        ctx: pack.ctx.clone(),
    };
    let ingest = ProviderWebhookIngestDto {
        webhook_id: "wh-rc-1".to_string(),
        provider_label: "mockpay".to_string(),
        direction: "PAYIN".to_string(),
        raw_body: "{}".to_string(),
    };
    uc.execute(ingest).await.unwrap();
}

#[tokio::test]
async fn clean_books_report_no_discrepancy() {
    let pack = ut_flow_pack(vec![ut_channel(UT_CHANNEL_A, 1)]).await;
    ut_captured_payin(&pack).await;
    let uc = ReconcileUseCase {
        ctx: pack.ctx.clone(),
    };
    let summary = uc.execute().await.unwrap();
    // one role-account set per provisioned owner
    assert!(summary.num_accounts >= 9);
    assert_eq!(summary.num_mismatched, 0);
    assert!(summary.globally_balanced);
    assert!(pack.discrepancies.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tampered_balance_is_recorded_never_corrected() {
    let pack = ut_flow_pack(vec![ut_channel(UT_CHANNEL_A, 1)]).await;
    ut_captured_payin(&pack).await;
    let payin_acct = derive_account_id(
        LedgerOwnerType::Merchant,
        LedgerAccountRole::MerchantPayin,
        UT_MERCHANT_ID,
    )
    .unwrap();
    let tampered = AccountBalance {
        debits_pending: 0,
        debits_posted: 0,
        credits_pending: 0,
        credits_posted: 146657, // one paisa off
    };
    pack.ledger.ut_overwrite_balance(payin_acct, tampered).await;
    let uc = ReconcileUseCase {
        ctx: pack.ctx.clone(),
    };
    let summary = uc.execute().await.unwrap();
    assert_eq!(summary.num_mismatched, 1);
    assert!(!summary.globally_balanced);
    let rows = pack.discrepancies.lock().unwrap();
    assert_eq!(rows.len(), 2);
    let mismatch = rows
        .iter()
        .find(|r| r.kind == LedgerDiscrepancyKind::BalanceMismatch)
        .unwrap();
    assert_eq!(mismatch.account_id, Some(payin_acct));
    assert_eq!(mismatch.expected, 146656i128);
    assert_eq!(mismatch.actual, 146657i128);
    let global = rows
        .iter()
        .find(|r| r.kind == LedgerDiscrepancyKind::GlobalImbalance)
        .unwrap();
    assert_eq!(global.account_id, None);
    drop(rows);
    // the stored figure stays wrong, correction is an operator decision
    let bal = pack.ledger.get_balance(payin_acct).await.unwrap();
    assert_eq!(bal.net(), 146657i128);
}
