use std::result::Result;

use chrono::Utc;

use crate::adapter::queue::{AppJobTask, AppJobType, AppQueueLabel};
use crate::api::web::dto::{PaymentCreateRespDto, PayoutCreateReqDto};
use crate::app_log_event;
use crate::auth::AppAuthedMerchant;
use crate::logging::AppLogLevel;
use crate::model::{
    calculate_fee, parse_amount, ProviderChannelModel, RoutingChainModel, RoutingSnapshotModel,
    TxFeeModel, TxMetaModel, TxStatus, TxType,
};

use super::flow::{
    handle_failure, payout_hold_spec, poll_marker_key, throttle_gate, throttle_gate_channel,
    PaymentFlowContext, PaymentFlowError,
};

/// ledger-first ordering : the transaction row and the pending hold exist
/// before the provider is called, a crash mid-call leaves funds provably
/// reserved for the operator to reconcile
pub struct CreatePayoutUseCase {
    pub ctx: PaymentFlowContext,
}

impl CreatePayoutUseCase {
    pub async fn execute(
        &self,
        authed: AppAuthedMerchant,
        req: PayoutCreateReqDto,
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
        profile.ensure_service(TxType::Payout)?;
        throttle_gate(ctx, merchant_id, profile.rps_limit).await?;
        let channels = ctx.merchant_repo.fetch_channels(merchant_id).await?;
        let chain = RoutingChainModel::try_from((channels, TxType::Payout))?;
        let head = chain.head();
        let merchant_fee = calculate_fee(amount, profile.fee_tiers(TxType::Payout))?;
        let provider_fee = calculate_fee(amount, head.fee_tiers(TxType::Payout))?;
        let net_amount = TxType::Payout.net_amount(amount, merchant_fee.total)?;
        let now = Utc::now();
        #[rustfmt::skip]
        let mut tx = TxMetaModel::from((
            merchant_id, req.order_id, TxType::Payout, amount, net_amount,
            TxFeeModel { merchant: merchant_fee, provider: provider_fee },
            RoutingSnapshotModel::from(head), req.beneficiary.into(), now,
        ));
        // -- persist --
        let create_res = ctx.tx_repo.create(&tx).await;
        if let Err(e) = create_res {
            if e.is_duplicate_key() {
                return Err(PaymentFlowError::DuplicateOrder {
                    merchant_id,
                    order_id: tx.order_id().to_string(),
                });
            }
            return Err(e.into());
        }
        // -- pre-execute, reserve funds before touching the provider --
        if let Err(e) = self.reserve_hold(&mut tx, head.channel_id).await {
            let detail = e.failure_detail();
            handle_failure(ctx, &mut tx, detail).await?;
            return Err(e);
        }
        // -- gateway call over the fallback chain --
        if let Err(e) = self.walk_chain(&mut tx, &chain).await {
            let detail = e.failure_detail();
            handle_failure(ctx, &mut tx, detail).await?;
            return Err(e);
        }
        // -- post-execute --
        ctx.markers.set_marker(poll_marker_key(tx.id()).as_str()).await;
        let poll_task = AppJobTask::new(
            format!("poll-{}", tx.id()),
            AppJobType::PayoutPoll,
            serde_json::json!({"tx_id": tx.id(), "poll_round": 1u16, "eod": false}),
        );
        ctx.queue
            .enqueue_delayed(
                AppQueueLabel::Jobs,
                poll_task,
                ctx.monitor.payout_poll_interval_secs,
            )
            .await?;
        let logctx_p = &ctx.logctx;
        app_log_event!(
            logctx_p,
            AppLogLevel::INFO,
            "payout-accepted, txn:{}, merchant:{merchant_id}, channel:{}",
            tx.id(),
            tx.routing().channel_id
        );
        Ok(PaymentCreateRespDto {
            transaction_id: tx.id().to_string(),
            order_id: tx.order_id().to_string(),
            direction: TxType::Payout.label().to_string(),
            status: tx.status().into(),
            amount: tx.amount().to_string(),
            net_amount: tx.net_amount().to_string(),
            fee: (&tx.fees().merchant).into(),
            payment_intent: None,
            create_time: *tx.create_time(),
        })
    } // end of fn execute

    async fn reserve_hold(
        &self,
        tx: &mut TxMetaModel,
        channel_id: u64,
    ) -> Result<(), PaymentFlowError> {
        let ctx = &self.ctx;
        let spec = payout_hold_spec(tx, channel_id)?;
        let tid = ctx.ledger.transfer(spec).await?;
        if tx.ledger().hold_transfer_id.is_none() {
            tx.set_hold_transfer(tid, Utc::now())?;
        } else {
            tx.replace_hold_transfer(tid, Utc::now())?;
        }
        ctx.tx_repo.update_progress(tx).await?;
        Ok(())
    }

    /// a non-retryable refusal aborts, a retryable one re-reserves against
    /// the next channel and tries again
    async fn walk_chain(
        &self,
        tx: &mut TxMetaModel,
        chain: &RoutingChainModel,
    ) -> Result<(), PaymentFlowError> {
        let ctx = &self.ctx;
        let num = chain.num_channels();
        let mut last_err: Option<PaymentFlowError> = None;
        for (idx, channel) in chain.iter().enumerate() {
            if idx > 0 {
                self.fall_back_to(tx, channel).await?;
            }
            throttle_gate_channel(ctx, channel.channel_id, channel.rps_limit).await?;
            let pay_req = super::processor_pay_request(tx);
            let snapshot = tx.routing().clone();
            match ctx.processors.initiate_payout(&snapshot, &pay_req).await {
                Ok(result) => {
                    tx.set_provider_result(result.provider_txn_id, result.utr, Utc::now());
                    tx.transit_status(TxStatus::Processing, Utc::now())?;
                    let _won = ctx
                        .tx_repo
                        .update_status_guarded(tx, &[TxStatus::Pending])
                        .await?;
                    return Ok(());
                }
                Err(e) => {
                    let logctx_p = &ctx.logctx;
                    app_log_event!(
                        logctx_p,
                        AppLogLevel::WARNING,
                        "payout-attempt, txn:{}, channel:{}, attempt:{}/{num}, {:?}",
                        tx.id(),
                        channel.channel_id,
                        idx + 1,
                        e
                    );
                    let retryable = e.reason.retryable();
                    last_err = Some(e.into());
                    if !retryable {
                        break;
                    }
                }
            }
        } // end of loop
        Err(last_err.unwrap_or(PaymentFlowError::TransactionNotFound(tx.id().to_string())))
    } // end of fn walk_chain

    async fn fall_back_to(
        &self,
        tx: &mut TxMetaModel,
        channel: &ProviderChannelModel,
    ) -> Result<(), PaymentFlowError> {
        let ctx = &self.ctx;
        let now = Utc::now();
        // release the reservation against the channel being abandoned
        if let Some(tid) = tx.ledger().hold_transfer_id {
            if !tx.ledger().ledger_voided {
                ctx.ledger.void(tid).await?;
                tx.mark_ledger_voided(now);
            }
        }
        let provider_fee = calculate_fee(tx.amount(), channel.fee_tiers(TxType::Payout))?;
        tx.re_route(RoutingSnapshotModel::from(channel), provider_fee, now);
        self.reserve_hold(tx, channel.channel_id).await?;
        Ok(())
    }
} // end of impl CreatePayoutUseCase
