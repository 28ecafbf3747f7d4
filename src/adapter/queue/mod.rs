mod amqp;
mod in_mem;

use std::boxed::Box;
use std::marker::{Send, Sync};
use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AppQueueCfg;
use crate::confidentiality::AbstractConfidentiality;
use crate::hard_limit;
use crate::logging::AppLogContext;

use self::amqp::AppAmqpJobQueue;
pub use self::in_mem::AppInMemJobQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppJobType {
    PayinExpiry,
    PayoutPoll,
    Settlement,
    Reconciliation,
    WebhookIngest,
    MerchantCallback,
}

impl AppJobType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PayinExpiry => "payin-expiry",
            Self::PayoutPoll => "payout-poll",
            Self::Settlement => "settlement",
            Self::Reconciliation => "reconciliation",
            Self::WebhookIngest => "webhook-ingest",
            Self::MerchantCallback => "merchant-callback",
        }
    }
}

/// the two durable streams of the gateway, deferred internal jobs and raw
/// inbound provider webhooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppQueueLabel {
    Jobs,
    Webhooks,
}

impl AppQueueLabel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Jobs => "pg.jobs",
            Self::Webhooks => "pg.webhooks",
        }
    }
    pub fn dead_letter_name(&self) -> &'static str {
        match self {
            Self::Jobs => "pg.jobs.dead",
            Self::Webhooks => "pg.webhooks.dead",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppJobTask {
    pub id: String,
    pub jtype: AppJobType,
    pub payload: serde_json::Value,
    pub attempt: u16,
    pub max_attempts: u16,
    pub last_error: Option<String>,
}

impl AppJobTask {
    pub fn new(id: String, jtype: AppJobType, payload: serde_json::Value) -> Self {
        Self {
            id,
            jtype,
            payload,
            attempt: 0,
            max_attempts: hard_limit::DEFAULT_JOB_MAX_ATTEMPTS,
            last_error: None,
        }
    }
}

/// a task handed to one consumer, the receipt routes the follow-up ack or
/// retry back to the exact delivery
pub struct ClaimedJobTask {
    pub task: AppJobTask,
    receipt: u64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RetryOutcome {
    Rescheduled { delay_secs: u32 },
    DeadLettered,
}

#[derive(Debug)]
pub enum AppQueueErrorReason {
    Backend(String),
    CorruptedPayload(String),
    PublishUnconfirmed(String),
    UnknownReceipt(u64),
}

#[derive(Debug, Clone, Copy)]
pub enum AppQueueFnLabel {
    Enqueue,
    Claim,
    Ack,
    Retry,
    DeadLetters,
}

#[derive(Debug)]
pub struct AppQueueError {
    pub fn_label: AppQueueFnLabel,
    pub reason: AppQueueErrorReason,
}

#[derive(Debug)]
pub enum AppQueueCtxError {
    MissingCredential,
    CorruptedCredential,
    PoolSetup(String),
}

/// delay grows exponentially per failed attempt, still strictly increasing
/// once the cap kicks in so two retries never collide on schedule
pub fn retry_backoff_secs(num_failures: u16) -> u32 {
    let shift = num_failures.saturating_sub(1).min(31) as u32;
    let exp = hard_limit::RETRY_BACKOFF_BASE_SECS
        .checked_shl(shift)
        .unwrap_or(u32::MAX);
    if exp < hard_limit::RETRY_BACKOFF_CAP_SECS {
        exp
    } else {
        hard_limit::RETRY_BACKOFF_CAP_SECS + num_failures as u32
    }
}

#[async_trait]
pub trait AbstractJobQueue: Send + Sync {
    async fn enqueue(
        &self,
        label: AppQueueLabel,
        task: AppJobTask,
    ) -> Result<(), AppQueueError>;

    async fn enqueue_delayed(
        &self,
        label: AppQueueLabel,
        task: AppJobTask,
        delay_secs: u32,
    ) -> Result<(), AppQueueError>;

    /// wait up to `wait_secs` for the next due task, `None` on a quiet queue
    async fn claim(
        &self,
        label: AppQueueLabel,
        wait_secs: u32,
    ) -> Result<Option<ClaimedJobTask>, AppQueueError>;

    async fn ack(
        &self,
        label: AppQueueLabel,
        claimed: ClaimedJobTask,
    ) -> Result<(), AppQueueError>;

    /// reschedule with backoff, or park in the dead-letter stream once the
    /// attempt budget is spent
    async fn retry(
        &self,
        label: AppQueueLabel,
        claimed: ClaimedJobTask,
        err_detail: String,
    ) -> Result<RetryOutcome, AppQueueError>;

    /// non-consuming view of the parked tasks, an operator decides what
    /// leaves the dead-letter stream
    async fn dead_letters(
        &self,
        label: AppQueueLabel,
        limit: usize,
    ) -> Result<Vec<AppJobTask>, AppQueueError>;
}

pub(crate) fn build_context(
    cfg: &AppQueueCfg,
    cfdntl: Arc<Box<dyn AbstractConfidentiality>>,
    logctx: Arc<AppLogContext>,
) -> Result<Box<dyn AbstractJobQueue>, AppQueueCtxError> {
    let out: Box<dyn AbstractJobQueue> = match cfg {
        AppQueueCfg::AMQP(c) => {
            let q = AppAmqpJobQueue::try_build(c, cfdntl, logctx)?;
            Box::new(q)
        }
        AppQueueCfg::InMemory => Box::new(AppInMemJobQueue::build(logctx)),
    };
    Ok(out)
}
