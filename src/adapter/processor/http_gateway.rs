use std::boxed::Box;
use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;
use hyper::header::{HeaderValue, AUTHORIZATION};
use hyper::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::confidentiality::AbstractConfidentiality;
use crate::hard_limit::PROVIDER_CALL_TIMEOUT_SECS;
use crate::logging::AppLogContext;
use crate::model::{parse_amount, TxType};

use super::base_client::BaseClient;
use super::{
    AbstractChannelProcessor, AppProcessorError, AppProcessorErrorReason, AppProcessorFnLabel,
    AppProcessorPayInResult, AppProcessorPayOutResult, AppProcessorPayRequest,
    AppProcessorStatusRequest, AppProcessorStatusResult, AppProcessorWebhookEvent,
    GatewayPayStatus,
};

#[allow(non_snake_case)]
#[derive(Deserialize)]
struct GatewaySecret {
    API_KEY: String,
}

#[derive(Serialize)]
struct PayReqWire<'a> {
    reference: &'a str,
    amount: String,
    currency: &'a str,
    merchant: u64,
    party: serde_json::Value,
}

#[derive(Serialize)]
struct StatusReqWire<'a> {
    reference: &'a str,
    provider_ref: &'a str,
    direction: &'a str,
}

#[derive(Deserialize)]
struct PayRespWire {
    status: String,
    provider_txn_id: Option<String>,
    payment_intent: Option<String>,
    utr: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct WebhookWire {
    provider_ref: String,
    status: String,
    amount: Option<String>,
    utr: Option<String>,
}

/// REST adapter for providers speaking the canonical gateway protocol,
/// provider-specific quirks stay behind their own channel implementations
pub(super) struct AppProcessorHttpCtx {
    _client: BaseClient,
    _api_key: String,
}

impl AppProcessorHttpCtx {
    pub(super) fn try_build(
        host: &str,
        port: u16,
        confidentiality_path: &str,
        cfdntl: Arc<Box<dyn AbstractConfidentiality>>,
        logctx: Arc<AppLogContext>,
    ) -> Result<Self, AppProcessorError> {
        let _map_e = |reason| AppProcessorError {
            reason,
            fn_label: AppProcessorFnLabel::TryBuild,
        };
        let serial = cfdntl
            .try_get_payload(confidentiality_path)
            .map_err(|_e| _map_e(AppProcessorErrorReason::MissingCredential))?;
        let secret = serde_json::from_str::<GatewaySecret>(serial.as_str())
            .map_err(|_e| _map_e(AppProcessorErrorReason::CredentialCorrupted))?;
        let _client = BaseClient::try_build(
            logctx,
            host.to_string(),
            port,
            PROVIDER_CALL_TIMEOUT_SECS,
        )
        .map_err(|e| _map_e(e.into()))?;
        Ok(Self {
            _client,
            _api_key: secret.API_KEY,
        })
    } // end of fn try_build

    fn auth_headers(&self) -> Vec<(hyper::header::HeaderName, HeaderValue)> {
        let bearer = format!("Bearer {}", self._api_key);
        HeaderValue::from_str(bearer.as_str())
            .map(|hv| vec![(AUTHORIZATION, hv)])
            .unwrap_or_default()
    }

    async fn round_trip(
        &self,
        path: &str,
        body: Vec<u8>,
    ) -> Result<PayRespWire, AppProcessorErrorReason> {
        let (raw, code) = self
            ._client
            .execute_json(path, Method::POST, body, self.auth_headers())
            .await
            .map_err(AppProcessorErrorReason::from)?;
        classify_status(code, &raw)?;
        serde_json::from_slice::<PayRespWire>(&raw)
            .map_err(|e| AppProcessorErrorReason::CorruptedResponse(e.to_string()))
    }
} // end of impl AppProcessorHttpCtx

fn classify_status(code: StatusCode, raw: &[u8]) -> Result<(), AppProcessorErrorReason> {
    if code.is_success() {
        return Ok(());
    }
    let detail = String::from_utf8_lossy(raw).to_string();
    if code == StatusCode::REQUEST_TIMEOUT {
        Err(AppProcessorErrorReason::Timeout)
    } else if code == StatusCode::TOO_MANY_REQUESTS || code.is_server_error() {
        Err(AppProcessorErrorReason::Unavailable(code.as_u16()))
    } else {
        Err(AppProcessorErrorReason::Rejected(detail))
    }
}

fn parse_status_label(raw: &str) -> Result<GatewayPayStatus, AppProcessorErrorReason> {
    GatewayPayStatus::from_label(raw)
        .ok_or_else(|| AppProcessorErrorReason::CorruptedResponse(format!("status:{raw}")))
}

fn pay_req_body(req: &AppProcessorPayRequest) -> Result<Vec<u8>, AppProcessorErrorReason> {
    let party = serde_json::to_value(&req.party)
        .map_err(|e| AppProcessorErrorReason::InvalidPayload(e.to_string()))?;
    let wire = PayReqWire {
        reference: req.tx_id.as_str(),
        amount: req.amount.to_string(),
        currency: req.currency.as_str(),
        merchant: req.merchant_id,
        party,
    };
    serde_json::to_vec(&wire).map_err(|e| AppProcessorErrorReason::InvalidPayload(e.to_string()))
}

#[async_trait]
impl AbstractChannelProcessor for AppProcessorHttpCtx {
    async fn initiate_payin(
        &self,
        req: &AppProcessorPayRequest,
    ) -> Result<AppProcessorPayInResult, AppProcessorErrorReason> {
        let body = pay_req_body(req)?;
        let resp = self.round_trip("/v1/payin", body).await?;
        let status = parse_status_label(resp.status.as_str())?;
        Ok(AppProcessorPayInResult {
            success: !matches!(status, GatewayPayStatus::FAILED),
            status,
            provider_txn_id: resp.provider_txn_id,
            payment_intent: resp.payment_intent,
        })
    }

    async fn initiate_payout(
        &self,
        req: &AppProcessorPayRequest,
    ) -> Result<AppProcessorPayOutResult, AppProcessorErrorReason> {
        let body = pay_req_body(req)?;
        let resp = self.round_trip("/v1/payout", body).await?;
        let status = parse_status_label(resp.status.as_str())?;
        Ok(AppProcessorPayOutResult {
            success: !matches!(status, GatewayPayStatus::FAILED),
            status,
            provider_txn_id: resp.provider_txn_id,
            utr: resp.utr,
        })
    }

    async fn check_status(
        &self,
        req: &AppProcessorStatusRequest,
    ) -> Result<AppProcessorStatusResult, AppProcessorErrorReason> {
        let wire = StatusReqWire {
            reference: req.tx_id.as_str(),
            provider_ref: req.provider_ref.as_str(),
            direction: req.direction.label(),
        };
        let body = serde_json::to_vec(&wire)
            .map_err(|e| AppProcessorErrorReason::InvalidPayload(e.to_string()))?;
        let resp = self.round_trip("/v1/status", body).await?;
        let status = parse_status_label(resp.status.as_str())?;
        Ok(AppProcessorStatusResult {
            status,
            utr: resp.utr,
            message: resp.message,
        })
    }

    async fn parse_webhook(
        &self,
        raw_body: &[u8],
        _direction: TxType,
    ) -> Result<AppProcessorWebhookEvent, AppProcessorErrorReason> {
        let wire = serde_json::from_slice::<WebhookWire>(raw_body)
            .map_err(|e| AppProcessorErrorReason::InvalidPayload(e.to_string()))?;
        let status = parse_status_label(wire.status.as_str())?;
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
} // end of impl AppProcessorHttpCtx
