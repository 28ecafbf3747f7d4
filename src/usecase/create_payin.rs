use std::result::Result;

use chrono::Utc;

use crate::adapter::processor::{AppProcessorError, AppProcessorErrorReason, AppProcessorFnLabel};
use crate::adapter::queue::{AppJobTask, AppJobType, AppQueueLabel};
use crate::api::web::dto::{PayinCreateReqDto, PaymentCreateRespDto};
use crate::app_log_event;
use crate::auth::AppAuthedMerchant;
use crate::logging::AppLogLevel;
use crate::model::{
    calculate_fee, parse_amount, RoutingChainModel, RoutingSnapshotModel, TxFeeModel, TxMetaModel,
    TxType,
};

use super::flow::{throttle_gate, throttle_gate_channel, PaymentFlowContext, PaymentFlowError};

/// provider-first ordering : no transaction row and no ledger trace exist
/// until the provider confirms an intent was created, a failed provider
/// call leaves nothing behind
pub struct CreatePayinUseCase {
    pub ctx: PaymentFlowContext,
}

impl CreatePayinUseCase {
    pub async fn execute(
        &self,
        authed: AppAuthedMerchant,
        req: PayinCreateReqDto,
    ) -> Result<PaymentCreateRespDto, PaymentFlowError> {
        let ctx = &self.ctx;
        let merchant_id = authed.merchant_id;
        // -- prepare --
        let amount = parse_amount(req.amount.as_str())?;
        let profile = ctx
            .merchant_repo
            .fetch_profile(merchant_id)
            .await?
            .ok_or(PaymentFlowError::ProfileNotFound(merchant_id))?;
        let maybe_dup = ctx
            .tx_repo
            .fetch_by_order_id(merchant_id, req.order_id.as_str())
            .await?;
        if maybe_dup.is_some() {
            return Err(PaymentFlowError::DuplicateOrder {
                merchant_id,
                order_id: req.order_id,
            });
        }
        // -- validate --
        profile.ensure_service(TxType::Payin)?;
        throttle_gate(ctx, merchant_id, profile.rps_limit).await?;
        let channels = ctx.merchant_repo.fetch_channels(merchant_id).await?;
        let chain = RoutingChainModel::try_from((channels, TxType::Payin))?;
        let head = chain.head();
        throttle_gate_channel(ctx, head.channel_id, head.rps_limit).await?;
        let merchant_fee = calculate_fee(amount, profile.fee_tiers(TxType::Payin))?;
        let provider_fee = calculate_fee(amount, head.fee_tiers(TxType::Payin))?;
        let net_amount = TxType::Payin.net_amount(amount, merchant_fee.total)?;
        let snapshot = RoutingSnapshotModel::from(head);
        let now = Utc::now();
        #[rustfmt::skip]
        let mut tx = TxMetaModel::from((
            merchant_id, req.order_id, TxType::Payin, amount, net_amount,
            TxFeeModel { merchant: merchant_fee, provider: provider_fee },
            snapshot.clone(), req.customer.into(), now,
        ));
        // -- gateway call, before anything is persisted --
        let pay_req = super::processor_pay_request(&tx);
        let result = ctx.processors.initiate_payin(&snapshot, &pay_req).await?;
        if !result.success {
            // synchronous refusal, the order id stays free for a retry
            return Err(PaymentFlowError::Processor(AppProcessorError {
                reason: AppProcessorErrorReason::Rejected(result.status.label().to_string()),
                fn_label: AppProcessorFnLabel::InitiatePayin,
            }));
        }
        tx.set_provider_result(result.provider_txn_id, None, Utc::now());
        // -- persist --
        let create_res = ctx.tx_repo.create(&tx).await;
        if let Err(e) = create_res {
            if e.is_duplicate_key() {
                // lost the race against a concurrent request on the same order
                return Err(PaymentFlowError::DuplicateOrder {
                    merchant_id,
                    order_id: tx.order_id().to_string(),
                });
            }
            return Err(e.into());
        }
        // -- post-execute --
        let expiry_task = AppJobTask::new(
            format!("exp-{}", tx.id()),
            AppJobType::PayinExpiry,
            serde_json::json!({"tx_id": tx.id()}),
        );
        ctx.queue
            .enqueue_delayed(
                AppQueueLabel::Jobs,
                expiry_task,
                ctx.monitor.payin_expiry_secs,
            )
            .await?;
        let logctx_p = &ctx.logctx;
        app_log_event!(
            logctx_p,
            AppLogLevel::INFO,
            "payin-accepted, txn:{}, merchant:{merchant_id}",
            tx.id()
        );
        Ok(PaymentCreateRespDto {
            transaction_id: tx.id().to_string(),
            order_id: tx.order_id().to_string(),
            direction: TxType::Payin.label().to_string(),
            status: tx.status().into(),
            amount: tx.amount().to_string(),
            net_amount: tx.net_amount().to_string(),
            fee: (&tx.fees().merchant).into(),
            payment_intent: result.payment_intent,
            create_time: *tx.create_time(),
        })
    } // end of fn execute
} // end of impl CreatePayinUseCase
