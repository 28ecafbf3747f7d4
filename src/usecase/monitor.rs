use std::result::Result;

use chrono::{Local, Timelike};

use crate::adapter::processor::AppProcessorStatusRequest;
use crate::adapter::queue::{AppJobTask, AppJobType, AppQueueLabel};
use crate::app_log_event;
use crate::logging::AppLogLevel;
use crate::model::{TxStatus, TxType};

use super::flow::{finalize_terminal, poll_marker_key, PaymentFlowContext, PaymentFlowError};

/// a payin nobody confirmed within the expiry window dies exactly once,
/// no ledger action, nothing was ever posted for it
pub struct PayinExpiryUseCase {
    pub ctx: PaymentFlowContext,
}

impl PayinExpiryUseCase {
    pub async fn execute(&self, tx_id: &str) -> Result<(), PaymentFlowError> {
        let ctx = &self.ctx;
        let logctx_p = &ctx.logctx;
        let maybe_tx = ctx.tx_repo.fetch(tx_id).await?;
        let mut tx = match maybe_tx {
            Some(v) => v,
            None => {
                app_log_event!(logctx_p, AppLogLevel::WARNING, "expiry-no-txn, {tx_id}");
                return Ok(());
            }
        };
        if tx.status().is_terminal() {
            return Ok(());
        }
        let won = finalize_terminal(ctx, &mut tx, TxStatus::Expired, None).await?;
        if won {
            app_log_event!(logctx_p, AppLogLevel::INFO, "payin-expired, txn:{tx_id}");
        }
        Ok(())
    }
} // end of impl PayinExpiryUseCase

pub struct PayoutPollUseCase {
    pub ctx: PaymentFlowContext,
}

impl PayoutPollUseCase {
    /// absent liveness marker means a webhook settled the payout first and
    /// cancelled the poll, the round is silently dropped
    pub async fn execute(
        &self,
        tx_id: &str,
        poll_round: u16,
        eod: bool,
    ) -> Result<(), PaymentFlowError> {
        let ctx = &self.ctx;
        let logctx_p = &ctx.logctx;
        if !ctx.markers.exists(poll_marker_key(tx_id).as_str()).await {
            app_log_event!(logctx_p, AppLogLevel::DEBUG, "poll-cancelled, txn:{tx_id}");
            return Ok(());
        }
        let maybe_tx = ctx.tx_repo.fetch(tx_id).await?;
        let mut tx = match maybe_tx {
            Some(v) => v,
            None => {
                app_log_event!(logctx_p, AppLogLevel::WARNING, "poll-no-txn, {tx_id}");
                return Ok(());
            }
        };
        if tx.status().is_terminal() {
            ctx.markers.delete(poll_marker_key(tx_id).as_str()).await;
            return Ok(());
        }
        let provider_ref = match tx.provider_ref() {
            Some(v) => v.to_string(),
            None => {
                app_log_event!(logctx_p, AppLogLevel::WARNING, "poll-no-ref, txn:{tx_id}");
                return Ok(());
            }
        };
        let status_req = AppProcessorStatusRequest {
            tx_id: tx_id.to_string(),
            provider_ref,
            direction: TxType::Payout,
        };
        let result = ctx
            .processors
            .check_status(tx.routing(), &status_req)
            .await?;
        match result.status.as_terminal_tx_status() {
            Some(next) => {
                let _won = finalize_terminal(ctx, &mut tx, next, result.utr).await?;
                Ok(())
            }
            None => self.schedule_next_round(tx_id, poll_round, eod).await,
        }
    } // end of fn execute

    async fn schedule_next_round(
        &self,
        tx_id: &str,
        poll_round: u16,
        eod: bool,
    ) -> Result<(), PaymentFlowError> {
        let ctx = &self.ctx;
        let logctx_p = &ctx.logctx;
        if eod {
            // the catch-up round also came back pending, stop here and
            // leave the held funds for operator review
            app_log_event!(logctx_p, AppLogLevel::WARNING, "poll-exhausted, txn:{tx_id}");
            return Ok(());
        }
        let (next_round, next_eod, delay_secs) = if poll_round < ctx.monitor.payout_poll_max_attempts
        {
            (
                poll_round + 1,
                false,
                ctx.monitor.payout_poll_interval_secs,
            )
        } else {
            (poll_round, true, Self::secs_until_local_midnight())
        };
        let task = AppJobTask::new(
            format!("poll-{tx_id}-{next_round}-{next_eod}"),
            AppJobType::PayoutPoll,
            serde_json::json!({"tx_id": tx_id, "poll_round": next_round, "eod": next_eod}),
        );
        ctx.queue
            .enqueue_delayed(AppQueueLabel::Jobs, task, delay_secs)
            .await?;
        Ok(())
    } // end of fn schedule_next_round

    fn secs_until_local_midnight() -> u32 {
        let now = Local::now();
        let elapsed_today =
            now.num_seconds_from_midnight() as i64;
        let remain = (24 * 3600) - elapsed_today;
        remain.max(60) as u32
    }
} // end of impl PayoutPollUseCase

/// payload parsing shared by the worker's job dispatch
pub fn parse_poll_payload(payload: &serde_json::Value) -> Option<(String, u16, bool)> {
    let tx_id = payload.get("tx_id")?.as_str()?.to_string();
    let poll_round = payload.get("poll_round")?.as_u64()? as u16;
    let eod = payload.get("eod")?.as_bool()?;
    Some((tx_id, poll_round, eod))
}

pub fn parse_expiry_payload(payload: &serde_json::Value) -> Option<String> {
    Some(payload.get("tx_id")?.as_str()?.to_string())
}
