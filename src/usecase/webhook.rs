use std::result::Result;

use crate::api::web::dto::ProviderWebhookIngestDto;
use crate::app_log_event;
use crate::logging::AppLogLevel;
use crate::model::TxType;

use super::flow::{finalize_terminal, webhook_marker_key, PaymentFlowContext, PaymentFlowError};

/// terminal-event ingestion from provider webhooks, idempotent on the
/// webhook id and on the transaction's own terminal state
pub struct HandleWebhookUseCase {
    pub ctx: PaymentFlowContext,
}

impl HandleWebhookUseCase {
    pub async fn execute(&self, ingest: ProviderWebhookIngestDto) -> Result<(), PaymentFlowError> {
        let ctx = &self.ctx;
        let logctx_p = &ctx.logctx;
        let marker_key = webhook_marker_key(ingest.webhook_id.as_str());
        // the marker is written only after the event fully applied, so a
        // queue-level retry of a failed run is not mistaken for a replay,
        // racing duplicates are caught by the guarded status update anyway
        if ctx.markers.exists(marker_key.as_str()).await {
            app_log_event!(
                logctx_p,
                AppLogLevel::INFO,
                "webhook-replayed, id:{}",
                ingest.webhook_id.as_str()
            );
            return Ok(());
        }
        let direction = TxType::from_label(ingest.direction.as_str()).ok_or_else(|| {
            PaymentFlowError::TransactionNotFound(format!(
                "webhook:{}, direction:{}",
                ingest.webhook_id, ingest.direction
            ))
        })?;
        let event = ctx
            .processors
            .parse_webhook(
                ingest.provider_label.as_str(),
                ingest.raw_body.as_bytes(),
                direction,
            )
            .await?;
        let mut tx = ctx
            .tx_repo
            .fetch_by_provider_ref(event.provider_ref.as_str())
            .await?
            .ok_or_else(|| PaymentFlowError::TransactionNotFound(event.provider_ref.clone()))?;
        let maybe_terminal = event.status.as_terminal_tx_status();
        let next = match maybe_terminal {
            Some(v) => v,
            None => {
                // an in-flight progress ping carries nothing actionable
                app_log_event!(
                    logctx_p,
                    AppLogLevel::DEBUG,
                    "webhook-nonterminal, txn:{}",
                    tx.id()
                );
                return Ok(());
            }
        };
        let _won = finalize_terminal(ctx, &mut tx, next, event.utr).await?;
        ctx.markers.set_marker(marker_key.as_str()).await;
        Ok(())
    } // end of fn execute
} // end of impl HandleWebhookUseCase
