mod base_client;
mod http_gateway;
mod mock;

use std::boxed::Box;
use std::collections::HashMap;
use std::marker::{Send, Sync};
use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::config::App3rdPartyCfg;
use crate::confidentiality::AbstractConfidentiality;
use crate::logging::AppLogContext;
use crate::model::{RoutingSnapshotModel, TxPartyModel, TxStatus, TxType};

pub use self::base_client::{BaseClientError, BaseClientErrorReason};
pub(crate) use self::base_client::BaseClient;
use self::http_gateway::AppProcessorHttpCtx;
use self::mock::MockChannelProcessor;

/// provider-native vocabularies collapse to exactly these four values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum GatewayPayStatus {
    SUCCESS,
    PENDING,
    FAILED,
    EXPIRED,
}

impl GatewayPayStatus {
    pub fn from_label(value: &str) -> Option<Self> {
        match value.to_uppercase().as_str() {
            "SUCCESS" => Some(Self::SUCCESS),
            "PENDING" => Some(Self::PENDING),
            "FAILED" => Some(Self::FAILED),
            "EXPIRED" => Some(Self::EXPIRED),
            _others => None,
        }
    }
    pub fn label(&self) -> &'static str {
        match self {
            Self::SUCCESS => "SUCCESS",
            Self::PENDING => "PENDING",
            Self::FAILED => "FAILED",
            Self::EXPIRED => "EXPIRED",
        }
    }
    /// `None` means the attempt is still in flight
    pub fn as_terminal_tx_status(&self) -> Option<TxStatus> {
        match self {
            Self::SUCCESS => Some(TxStatus::Success),
            Self::FAILED => Some(TxStatus::Failed),
            Self::EXPIRED => Some(TxStatus::Expired),
            Self::PENDING => None,
        }
    }
} // end of impl GatewayPayStatus

#[derive(Debug)]
pub enum AppProcessorErrorReason {
    InvalidConfig,
    MissingCredential,
    CredentialCorrupted,
    UnknownChannel(String),
    Timeout,
    Unavailable(u16),
    Rejected(String),
    LowLvlNet(BaseClientError),
    InvalidPayload(String),
    CorruptedResponse(String),
}

impl AppProcessorErrorReason {
    /// retryable failures advance the payout fallback chain, the rest abort
    pub fn retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Unavailable(_) => true,
            Self::LowLvlNet(e) => e.retryable(),
            _others => false,
        }
    }
}

#[derive(Debug)]
pub enum AppProcessorFnLabel {
    TryBuild,
    InitiatePayin,
    InitiatePayout,
    CheckStatus,
    ParseWebhook,
}

#[derive(Debug)]
pub struct AppProcessorError {
    pub reason: AppProcessorErrorReason,
    pub fn_label: AppProcessorFnLabel,
}

impl From<BaseClientError> for AppProcessorErrorReason {
    fn from(value: BaseClientError) -> Self {
        Self::LowLvlNet(value)
    }
}

pub struct AppProcessorPayRequest {
    pub tx_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub merchant_id: u64,
    pub party: TxPartyModel,
}

pub struct AppProcessorStatusRequest {
    pub tx_id: String,
    pub provider_ref: String,
    pub direction: TxType,
}

pub struct AppProcessorPayInResult {
    pub success: bool,
    pub status: GatewayPayStatus,
    pub provider_txn_id: Option<String>,
    pub payment_intent: Option<String>,
}

pub struct AppProcessorPayOutResult {
    pub success: bool,
    pub status: GatewayPayStatus,
    pub provider_txn_id: Option<String>,
    pub utr: Option<String>,
}

pub struct AppProcessorStatusResult {
    pub status: GatewayPayStatus,
    pub utr: Option<String>,
    pub message: Option<String>,
}

pub struct AppProcessorWebhookEvent {
    pub provider_ref: String,
    pub status: GatewayPayStatus,
    pub amount: Option<Decimal>,
    pub utr: Option<String>,
}

#[async_trait]
pub trait AbstractPaymentProcessor: Send + Sync {
    async fn initiate_payin(
        &self,
        channel: &RoutingSnapshotModel,
        req: &AppProcessorPayRequest,
    ) -> Result<AppProcessorPayInResult, AppProcessorError>;

    async fn initiate_payout(
        &self,
        channel: &RoutingSnapshotModel,
        req: &AppProcessorPayRequest,
    ) -> Result<AppProcessorPayOutResult, AppProcessorError>;

    async fn check_status(
        &self,
        channel: &RoutingSnapshotModel,
        req: &AppProcessorStatusRequest,
    ) -> Result<AppProcessorStatusResult, AppProcessorError>;

    async fn parse_webhook(
        &self,
        provider_label: &str,
        raw_body: &[u8],
        direction: TxType,
    ) -> Result<AppProcessorWebhookEvent, AppProcessorError>;
}

/// every provider behind one capability interface, each channel keyed by
/// its adapter registry label
#[async_trait]
pub(super) trait AbstractChannelProcessor: Send + Sync {
    async fn initiate_payin(
        &self,
        req: &AppProcessorPayRequest,
    ) -> Result<AppProcessorPayInResult, AppProcessorErrorReason>;
    async fn initiate_payout(
        &self,
        req: &AppProcessorPayRequest,
    ) -> Result<AppProcessorPayOutResult, AppProcessorErrorReason>;
    async fn check_status(
        &self,
        req: &AppProcessorStatusRequest,
    ) -> Result<AppProcessorStatusResult, AppProcessorErrorReason>;
    async fn parse_webhook(
        &self,
        raw_body: &[u8],
        direction: TxType,
    ) -> Result<AppProcessorWebhookEvent, AppProcessorErrorReason>;
}

struct AppProcessorContext {
    _channels: HashMap<String, Box<dyn AbstractChannelProcessor>>,
    _logctx: Arc<AppLogContext>,
}

impl AppProcessorContext {
    fn new(
        cfgs3pt: &[Arc<App3rdPartyCfg>],
        cfdntl: Arc<Box<dyn AbstractConfidentiality>>,
        _logctx: Arc<AppLogContext>,
    ) -> Result<Self, AppProcessorError> {
        let mut _channels: HashMap<String, Box<dyn AbstractChannelProcessor>> = HashMap::new();
        for c in cfgs3pt {
            match c.as_ref() {
                App3rdPartyCfg::dev {
                    name,
                    host,
                    port,
                    confidentiality_path,
                } => {
                    let ctx = AppProcessorHttpCtx::try_build(
                        host.as_str(),
                        *port,
                        confidentiality_path.as_str(),
                        cfdntl.clone(),
                        _logctx.clone(),
                    )?;
                    _channels.insert(name.to_lowercase(), Box::new(ctx));
                }
                App3rdPartyCfg::test { name } => {
                    _channels.insert(name.to_lowercase(), Box::new(MockChannelProcessor));
                }
            }
        }
        if _channels.is_empty() {
            return Err(AppProcessorError {
                reason: AppProcessorErrorReason::InvalidConfig,
                fn_label: AppProcessorFnLabel::TryBuild,
            });
        }
        Ok(Self { _channels, _logctx })
    } // end of fn new

    fn resolve(
        &self,
        label: &str,
    ) -> Result<&dyn AbstractChannelProcessor, AppProcessorErrorReason> {
        self._channels
            .get(label.to_lowercase().as_str())
            .map(|b| b.as_ref())
            .ok_or_else(|| AppProcessorErrorReason::UnknownChannel(label.to_string()))
    }
} // end of impl AppProcessorContext

#[async_trait]
impl AbstractPaymentProcessor for AppProcessorContext {
    async fn initiate_payin(
        &self,
        channel: &RoutingSnapshotModel,
        req: &AppProcessorPayRequest,
    ) -> Result<AppProcessorPayInResult, AppProcessorError> {
        let fut = async {
            let chn = self.resolve(channel.provider_label.as_str())?;
            chn.initiate_payin(req).await
        };
        fut.await.map_err(|reason| AppProcessorError {
            reason,
            fn_label: AppProcessorFnLabel::InitiatePayin,
        })
    }

    async fn initiate_payout(
        &self,
        channel: &RoutingSnapshotModel,
        req: &AppProcessorPayRequest,
    ) -> Result<AppProcessorPayOutResult, AppProcessorError> {
        let fut = async {
            let chn = self.resolve(channel.provider_label.as_str())?;
            chn.initiate_payout(req).await
        };
        fut.await.map_err(|reason| AppProcessorError {
            reason,
            fn_label: AppProcessorFnLabel::InitiatePayout,
        })
    }

    async fn check_status(
        &self,
        channel: &RoutingSnapshotModel,
        req: &AppProcessorStatusRequest,
    ) -> Result<AppProcessorStatusResult, AppProcessorError> {
        let fut = async {
            let chn = self.resolve(channel.provider_label.as_str())?;
            chn.check_status(req).await
        };
        fut.await.map_err(|reason| AppProcessorError {
            reason,
            fn_label: AppProcessorFnLabel::CheckStatus,
        })
    }

    async fn parse_webhook(
        &self,
        provider_label: &str,
        raw_body: &[u8],
        direction: TxType,
    ) -> Result<AppProcessorWebhookEvent, AppProcessorError> {
        let fut = async {
            let chn = self.resolve(provider_label)?;
            chn.parse_webhook(raw_body, direction).await
        };
        fut.await.map_err(|reason| AppProcessorError {
            reason,
            fn_label: AppProcessorFnLabel::ParseWebhook,
        })
    }
} // end of impl AppProcessorContext

pub(crate) fn app_processor_context(
    cfg_3pt: &[Arc<App3rdPartyCfg>],
    cfdntl: Arc<Box<dyn AbstractConfidentiality>>,
    logctx: Arc<AppLogContext>,
) -> Result<Box<dyn AbstractPaymentProcessor>, AppProcessorError> {
    let proc = AppProcessorContext::new(cfg_3pt, cfdntl, logctx)?;
    Ok(Box::new(proc))
}
