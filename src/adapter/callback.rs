use std::boxed::Box;
use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;
use hyper::Method;

use crate::app_log_event;
use crate::config::AppCallbackCfg;
use crate::hard_limit::PROVIDER_CALL_TIMEOUT_SECS;
use crate::logging::{AppLogContext, AppLogLevel};

use super::processor::{BaseClient, BaseClientError};

#[derive(Debug)]
pub enum AppCallbackErrorReason {
    UnsupportedUrl(String),
    LowLvlNet(BaseClientError),
    HttpStatus(u16),
    InvalidPayload(String),
}

#[derive(Debug)]
pub struct AppCallbackError {
    pub reason: AppCallbackErrorReason,
}

impl AppCallbackError {
    pub fn retryable(&self) -> bool {
        match &self.reason {
            AppCallbackErrorReason::LowLvlNet(e) => e.retryable(),
            AppCallbackErrorReason::HttpStatus(code) => *code == 429 || *code >= 500,
            _others => false,
        }
    }
}

/// delivery of transaction outcomes to the merchant's webhook endpoint,
/// retry scheduling lives with the job queue not here
#[async_trait]
pub trait AbstractMerchantCallback: Send + Sync {
    async fn notify(
        &self,
        url: &str,
        payload: serde_json::Value,
    ) -> Result<(), AppCallbackError>;
}

/// merchant endpoints are HTTPS only, `host[:port]/path` after the scheme
fn split_https_url(url: &str) -> Result<(String, u16, String), AppCallbackError> {
    let _map_e = || AppCallbackError {
        reason: AppCallbackErrorReason::UnsupportedUrl(url.to_string()),
    };
    let remain = url.strip_prefix("https://").ok_or_else(_map_e)?;
    let (authority, path) = match remain.find('/') {
        Some(pos) => (&remain[..pos], remain[pos..].to_string()),
        None => (remain, "/".to_string()),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) => {
            let p = p.parse::<u16>().map_err(|_e| _map_e())?;
            (h, p)
        }
        None => (authority, 443u16),
    };
    if host.is_empty() {
        return Err(_map_e());
    }
    Ok((host.to_string(), port, path))
}

struct HttpMerchantCallback {
    _logctx: Arc<AppLogContext>,
}

#[async_trait]
impl AbstractMerchantCallback for HttpMerchantCallback {
    async fn notify(
        &self,
        url: &str,
        payload: serde_json::Value,
    ) -> Result<(), AppCallbackError> {
        let (host, port, path) = split_https_url(url)?;
        let body = serde_json::to_vec(&payload).map_err(|e| AppCallbackError {
            reason: AppCallbackErrorReason::InvalidPayload(e.to_string()),
        })?;
        let client = BaseClient::try_build(
            self._logctx.clone(),
            host,
            port,
            PROVIDER_CALL_TIMEOUT_SECS,
        )
        .map_err(|e| AppCallbackError {
            reason: AppCallbackErrorReason::LowLvlNet(e),
        })?;
        let (_raw, code) = client
            .execute_json(path.as_str(), Method::POST, body, Vec::new())
            .await
            .map_err(|e| AppCallbackError {
                reason: AppCallbackErrorReason::LowLvlNet(e),
            })?;
        if code.is_success() {
            Ok(())
        } else {
            let logctx_p = &self._logctx;
            app_log_event!(
                logctx_p,
                AppLogLevel::WARNING,
                "merchant-notify, url:{url}, status:{code}"
            );
            Err(AppCallbackError {
                reason: AppCallbackErrorReason::HttpStatus(code.as_u16()),
            })
        }
    }
} // end of impl HttpMerchantCallback

struct DiscardMerchantCallback {
    _logctx: Arc<AppLogContext>,
}

#[async_trait]
impl AbstractMerchantCallback for DiscardMerchantCallback {
    async fn notify(
        &self,
        url: &str,
        _payload: serde_json::Value,
    ) -> Result<(), AppCallbackError> {
        let logctx_p = &self._logctx;
        app_log_event!(logctx_p, AppLogLevel::DEBUG, "discarded, url:{url}");
        Ok(())
    }
}

pub fn app_callback_context(
    cfg: &AppCallbackCfg,
    logctx: Arc<AppLogContext>,
) -> Box<dyn AbstractMerchantCallback> {
    match cfg {
        AppCallbackCfg::HttpClient => Box::new(HttpMerchantCallback { _logctx: logctx }),
        AppCallbackCfg::Discard => Box::new(DiscardMerchantCallback { _logctx: logctx }),
    }
}

// end of mod tests
