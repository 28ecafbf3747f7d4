pub mod adapter;
pub mod api;
pub mod auth;
pub mod config;
pub mod confidentiality;
pub mod error;
pub mod logging;
pub mod model;
pub mod usecase;

use std::result::Result;
use std::sync::Arc;

use crate::adapter::cache::{
    app_cache_marker, app_cache_throttle, AbstractMarkerCache, AbstractThrottleCache,
};
use crate::adapter::callback::{app_callback_context, AbstractMerchantCallback};
use crate::adapter::datastore::{AppDStoreError, AppDataStoreContext};
use crate::adapter::ledger::{AbstractLedgerEngine, AppLedgerError};
use crate::adapter::processor::{
    app_processor_context, AbstractPaymentProcessor, AppProcessorError,
};
use crate::adapter::queue::{AbstractJobQueue, AppQueueCtxError};
use crate::config::AppConfig;
use crate::confidentiality::AbstractConfidentiality;
use crate::error::AppConfidentialityError;
use crate::logging::AppLogContext;

pub mod hard_limit {
    pub const MAX_DB_CONNECTIONS: u32 = 1800u32;
    pub const MAX_SECONDS_DB_IDLE: u16 = 360u16;
    /// claimed jobs not acknowledged within this window become claimable again
    pub const VISIBILITY_TIMEOUT_SECS: u32 = 180u32;
    pub const SIGNATURE_WINDOW_SECS: i64 = 60i64;
    pub const DEFAULT_JOB_MAX_ATTEMPTS: u16 = 5u16;
    pub const RETRY_BACKOFF_BASE_SECS: u32 = 2u32;
    pub const RETRY_BACKOFF_CAP_SECS: u32 = 300u32;
    pub const MAX_TRANSFER_LEGS_PER_SIDE: usize = 16;
    pub const PROVIDER_CALL_TIMEOUT_SECS: u64 = 20u64;
}

pub struct AppSharedState {
    _config: Arc<AppConfig>,
    _log_ctx: Arc<AppLogContext>,
    _dstore: Arc<AppDataStoreContext>,
    _ledger: Arc<Box<dyn AbstractLedgerEngine>>,
    _processors: Arc<Box<dyn AbstractPaymentProcessor>>,
    _queue: Arc<Box<dyn AbstractJobQueue>>,
    _throttle: Arc<Box<dyn AbstractThrottleCache>>,
    _markers: Arc<Box<dyn AbstractMarkerCache>>,
    _callback: Arc<Box<dyn AbstractMerchantCallback>>,
}

#[derive(Debug)]
pub enum ShrStateInitProgress {
    Confidentiality,
    DataStore,
    JobQueue,
    LedgerEngine,
    ExternalProcessor,
}

#[derive(Debug)]
pub struct ShrStateInitError {
    pub progress: ShrStateInitProgress,
}
impl From<AppConfidentialityError> for ShrStateInitError {
    fn from(_value: AppConfidentialityError) -> Self {
        Self {
            progress: ShrStateInitProgress::Confidentiality,
        }
    }
}
impl From<AppDStoreError> for ShrStateInitError {
    fn from(_value: AppDStoreError) -> Self {
        Self {
            progress: ShrStateInitProgress::DataStore,
        }
    }
}
impl From<AppQueueCtxError> for ShrStateInitError {
    fn from(_value: AppQueueCtxError) -> Self {
        Self {
            progress: ShrStateInitProgress::JobQueue,
        }
    }
}
impl From<AppLedgerError> for ShrStateInitError {
    fn from(_value: AppLedgerError) -> Self {
        Self {
            progress: ShrStateInitProgress::LedgerEngine,
        }
    }
}
impl From<AppProcessorError> for ShrStateInitError {
    fn from(_value: AppProcessorError) -> Self {
        Self {
            progress: ShrStateInitProgress::ExternalProcessor,
        }
    }
}

impl AppSharedState {
    pub fn new(cfg: AppConfig) -> Result<Self, ShrStateInitError> {
        let logctx = {
            let lc = AppLogContext::new(&cfg.basepath, &cfg.gateway.logging);
            Arc::new(lc)
        };
        let cfdntl: Arc<Box<dyn AbstractConfidentiality>> = {
            let c = confidentiality::build_context(&cfg)?;
            Arc::new(c)
        };
        let _dstore = {
            let d = AppDataStoreContext::new(
                &cfg.gateway.data_store,
                cfdntl.clone(),
                logctx.clone(),
            )?;
            Arc::new(d)
        };
        let _queue = {
            let q = adapter::queue::build_context(&cfg.gateway.queue, cfdntl.clone(), logctx.clone())?;
            Arc::new(q)
        };
        let _ledger = {
            let l = adapter::ledger::build_context(&cfg.gateway.ledger, logctx.clone())?;
            Arc::new(l)
        };
        let _processors = {
            let proc = app_processor_context(
                cfg.gateway.providers.as_slice(),
                cfdntl.clone(),
                logctx.clone(),
            )?;
            Arc::new(proc)
        };
        let _throttle = Arc::new(app_cache_throttle());
        let _markers = Arc::new(app_cache_marker());
        let _callback = {
            let cb = app_callback_context(&cfg.gateway.callback, logctx.clone());
            Arc::new(cb)
        };
        Ok(Self {
            _config: Arc::new(cfg),
            _log_ctx: logctx,
            _dstore,
            _ledger,
            _processors,
            _queue,
            _throttle,
            _markers,
            _callback,
        })
    } // end of fn new

    pub fn datastore(&self) -> Arc<AppDataStoreContext> {
        self._dstore.clone()
    }
    pub fn ledger_context(&self) -> Arc<Box<dyn AbstractLedgerEngine>> {
        self._ledger.clone()
    }
    pub fn processor_context(&self) -> Arc<Box<dyn AbstractPaymentProcessor>> {
        self._processors.clone()
    }
    pub fn queue_context(&self) -> Arc<Box<dyn AbstractJobQueue>> {
        self._queue.clone()
    }
    pub fn throttle_cache(&self) -> Arc<Box<dyn AbstractThrottleCache>> {
        self._throttle.clone()
    }
    pub fn marker_cache(&self) -> Arc<Box<dyn AbstractMarkerCache>> {
        self._markers.clone()
    }
    pub fn callback_context(&self) -> Arc<Box<dyn AbstractMerchantCallback>> {
        self._callback.clone()
    }
    pub fn log_context(&self) -> Arc<AppLogContext> {
        self._log_ctx.clone()
    }
    pub fn config(&self) -> Arc<AppConfig> {
        self._config.clone()
    }
} // end of impl AppSharedState

impl Clone for AppSharedState {
    fn clone(&self) -> Self {
        Self {
            _config: self._config.clone(),
            _log_ctx: self._log_ctx.clone(),
            _dstore: self._dstore.clone(),
            _ledger: self._ledger.clone(),
            _processors: self._processors.clone(),
            _queue: self._queue.clone(),
            _throttle: self._throttle.clone(),
            _markers: self._markers.clone(),
            _callback: self._callback.clone(),
        }
    }
}
