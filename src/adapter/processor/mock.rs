use std::result::Result;

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::{parse_amount, TxType};

use super::{
    AbstractChannelProcessor, AppProcessorErrorReason, AppProcessorPayInResult,
    AppProcessorPayOutResult, AppProcessorPayRequest, AppProcessorStatusRequest,
    AppProcessorStatusResult, AppProcessorWebhookEvent, GatewayPayStatus,
};

#[derive(Deserialize)]
struct MockWebhookWire {
    provider_ref: String,
    status: String,
    amount: Option<String>,
    utr: Option<String>,
}

/// stand-in channel for config test mode, every initiation is accepted as
/// pending, every status check reports success
pub(super) struct MockChannelProcessor;

#[async_trait]
impl AbstractChannelProcessor for MockChannelProcessor {
    async fn initiate_payin(
        &self,
        req: &AppProcessorPayRequest,
    ) -> Result<AppProcessorPayInResult, AppProcessorErrorReason> {
        Ok(AppProcessorPayInResult {
            success: true,
            status: GatewayPayStatus::PENDING,
            provider_txn_id: Some(format!("mockpi-{}", req.tx_id)),
            payment_intent: Some(format!("intent-{}", req.tx_id)),
        })
    }

    async fn initiate_payout(
        &self,
        req: &AppProcessorPayRequest,
    ) -> Result<AppProcessorPayOutResult, AppProcessorErrorReason> {
        Ok(AppProcessorPayOutResult {
            success: true,
            status: GatewayPayStatus::PENDING,
            provider_txn_id: Some(format!("mockpo-{}", req.tx_id)),
            utr: None,
        })
    }

    async fn check_status(
        &self,
        req: &AppProcessorStatusRequest,
    ) -> Result<AppProcessorStatusResult, AppProcessorErrorReason> {
        Ok(AppProcessorStatusResult {
            status: GatewayPayStatus::SUCCESS,
            utr: Some(format!("UTR-{}", req.tx_id)),
            message: None,
        })
    }

    async fn parse_webhook(
        &self,
        raw_body: &[u8],
        _direction: TxType,
    ) -> Result<AppProcessorWebhookEvent, AppProcessorErrorReason> {
        let wire = serde_json::from_slice::<MockWebhookWire>(raw_body)
            .map_err(|e| AppProcessorErrorReason::InvalidPayload(e.to_string()))?;
        let status = GatewayPayStatus::from_label(wire.status.as_str())
            .ok_or(AppProcessorErrorReason::CorruptedResponse(wire.status))?;
        let amount = wire
            .amount
            .as_deref()
            .map(parse_amount)
            .transpose()
            .map_err(|e| AppProcessorErrorReason::InvalidPayload(format!("{e:?}")))?;
        Ok(AppProcessorWebhookEvent {
            provider_ref: wire.provider_ref,
            status,
            amount,
            utr: wire.utr,
        })
    }
} // end of impl MockChannelProcessor
