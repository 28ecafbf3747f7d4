use std::boxed::Box;
use std::collections::HashMap;
use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;
use deadpool_lapin::{Config as DeadpConfig, Pool, PoolConfig, Runtime, Timeouts as DeadpTimeouts};
use futures_util::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicGetOptions, BasicNackOptions, BasicPublishOptions,
    BasicQosOptions, ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::protocol::basic::AMQPProperties;
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, ConnectionProperties, Consumer, Error as LapinError};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};

use crate::app_log_event;
use crate::config::AppQueueAmqpCfg;
use crate::confidentiality::AbstractConfidentiality;
use crate::logging::{AppLogContext, AppLogLevel};

use super::{
    retry_backoff_secs, AbstractJobQueue, AppJobTask, AppQueueCtxError, AppQueueError,
    AppQueueErrorReason, AppQueueFnLabel, AppQueueLabel, ClaimedJobTask, RetryOutcome,
};

#[allow(clippy::upper_case_acronyms)]
#[derive(Deserialize)]
struct SECRET {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl From<LapinError> for AppQueueErrorReason {
    fn from(value: LapinError) -> Self {
        match value {
            LapinError::ParsingError(e) => Self::CorruptedPayload(e.to_string()),
            LapinError::SerialisationError(e) => Self::CorruptedPayload(e.to_string()),
            _others => Self::Backend(format!("{:?}", _others)),
        }
    }
}

fn generate_consumer_tag(label: &str) -> String {
    let thread_id = std::thread::current().id();
    let now = chrono::Local::now().fixed_offset();
    format!(
        "{}-{:?}-{}-{}",
        label,
        thread_id,
        now.to_rfc3339(),
        now.timestamp_subsec_nanos()
    )
}

fn delay_queue_name(label: AppQueueLabel) -> String {
    format!("{}.delay", label.name())
}

struct ConsumeSlot {
    consumer: Mutex<Option<Consumer>>,
    ackers: Mutex<HashMap<u64, Acker>>,
}

impl ConsumeSlot {
    fn new() -> Self {
        Self {
            consumer: Mutex::new(None),
            ackers: Mutex::new(HashMap::new()),
        }
    }
}

pub(super) struct AppAmqpJobQueue {
    _logctx: Arc<AppLogContext>,
    _pool: Pool,
    _jobs: ConsumeSlot,
    _webhooks: ConsumeSlot,
}

impl AppAmqpJobQueue {
    pub(super) fn try_build(
        app_cfg: &AppQueueAmqpCfg,
        cfdntl: Arc<Box<dyn AbstractConfidentiality>>,
        _logctx: Arc<AppLogContext>,
    ) -> Result<Self, AppQueueCtxError> {
        let uri = Self::_setup_broker_uri(app_cfg, cfdntl)?;
        let cfg = Self::_setup_lapin_config(app_cfg, uri);
        let _pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| AppQueueCtxError::PoolSetup(e.to_string()))?;
        Ok(Self {
            _logctx,
            _pool,
            _jobs: ConsumeSlot::new(),
            _webhooks: ConsumeSlot::new(),
        })
    }

    /// `deadpool-lapin` takes the broker endpoint only as a formatted URI
    fn _setup_broker_uri(
        app_cfg: &AppQueueAmqpCfg,
        cfdntl: Arc<Box<dyn AbstractConfidentiality>>,
    ) -> Result<String, AppQueueCtxError> {
        let serial = cfdntl
            .try_get_payload(app_cfg.confidential_id.as_str())
            .map_err(|_e| AppQueueCtxError::MissingCredential)?;
        let secret = serde_json::from_str::<SECRET>(serial.as_str())
            .map_err(|_e| AppQueueCtxError::CorruptedCredential)?;
        let out = format!(
            "amqp://{}:{}@{}:{}/{}?channel_max={}&heartbeat={}",
            secret.username,
            secret.password,
            secret.host,
            secret.port,
            app_cfg.attributes.vhost.as_str(),
            app_cfg.attributes.max_channels,
            app_cfg.attributes.timeout_secs,
        );
        Ok(out)
    }

    fn _setup_lapin_config(app_cfg: &AppQueueAmqpCfg, uri: String) -> DeadpConfig {
        let timeout_secs = (app_cfg.attributes.timeout_secs as u64) << 2;
        let timeouts = DeadpTimeouts {
            wait: Some(std::time::Duration::new(timeout_secs, 0)),
            create: Some(std::time::Duration::new(timeout_secs, 0)),
            recycle: None,
        };
        let mut poolcfg = PoolConfig::new(app_cfg.max_connections as usize);
        poolcfg.timeouts = timeouts;
        DeadpConfig {
            connection_properties: ConnectionProperties::default(),
            url: Some(uri),
            pool: Some(poolcfg),
        }
    }

    fn slot(&self, label: AppQueueLabel) -> &ConsumeSlot {
        match label {
            AppQueueLabel::Jobs => &self._jobs,
            AppQueueLabel::Webhooks => &self._webhooks,
        }
    }

    async fn open_channel(
        &self,
        label: AppQueueLabel,
        fn_label: AppQueueFnLabel,
    ) -> Result<Channel, AppQueueError> {
        let _map_e = |reason: AppQueueErrorReason| AppQueueError { fn_label, reason };
        let pooled = self
            ._pool
            .get()
            .await
            .map_err(|e| _map_e(AppQueueErrorReason::Backend(e.to_string())))?;
        let chn = pooled
            .create_channel()
            .await
            .map_err(|e| _map_e(e.into()))?;
        chn.confirm_select(ConfirmSelectOptions { nowait: false })
            .await
            .map_err(|e| _map_e(e.into()))?;
        let declared = pooled
            .topology()
            .queues
            .iter()
            .any(|q| q.name.as_str() == label.name());
        if !declared {
            Self::declare_topology(&chn, label).await?;
        }
        Ok(chn)
    } // end of fn open_channel

    /// main queue, its dead-letter parking queue, and a delay queue whose
    /// expired messages route back to the main one
    async fn declare_topology(
        chn: &Channel,
        label: AppQueueLabel,
    ) -> Result<(), AppQueueError> {
        let _map_e = |e: LapinError| AppQueueError {
            fn_label: AppQueueFnLabel::Enqueue,
            reason: e.into(),
        };
        let options = QueueDeclareOptions {
            passive: false,
            durable: true,
            exclusive: false,
            auto_delete: false,
            nowait: false,
        };
        let _q = chn
            .queue_declare(label.name(), options, FieldTable::default())
            .await
            .map_err(_map_e)?;
        let _q = chn
            .queue_declare(label.dead_letter_name(), options, FieldTable::default())
            .await
            .map_err(_map_e)?;
        let mut args = FieldTable::default();
        args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString("".into()),
        );
        args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(label.name().into()),
        );
        let _q = chn
            .queue_declare(delay_queue_name(label).as_str(), options, args)
            .await
            .map_err(_map_e)?;
        Ok(())
    } // end of fn declare_topology

    async fn publish(
        &self,
        label: AppQueueLabel,
        queue_name: &str,
        task: &AppJobTask,
        expire_millis: Option<u64>,
        fn_label: AppQueueFnLabel,
    ) -> Result<(), AppQueueError> {
        let raw = serde_json::to_vec(task).map_err(|e| AppQueueError {
            fn_label: AppQueueFnLabel::Enqueue,
            reason: AppQueueErrorReason::CorruptedPayload(e.to_string()),
        })?;
        let chn = self.open_channel(label, fn_label).await?;
        let mut properties = AMQPProperties::default()
            .with_content_encoding("utf-8".into())
            .with_content_type("application/json".into())
            .with_delivery_mode(2);
        if let Some(ms) = expire_millis {
            properties = properties.with_expiration(ms.to_string().into());
        }
        let confirm = chn
            .basic_publish(
                "",
                queue_name,
                BasicPublishOptions {
                    mandatory: true,
                    immediate: false,
                },
                &raw,
                properties,
            )
            .await
            .map_err(|e| AppQueueError {
                fn_label: AppQueueFnLabel::Enqueue,
                reason: e.into(),
            })?
            .await
            .map_err(|e| AppQueueError {
                fn_label: AppQueueFnLabel::Enqueue,
                reason: e.into(),
            })?;
        Self::convert_confirm_to_error(confirm)
    } // end of fn publish

    fn convert_confirm_to_error(value: Confirmation) -> Result<(), AppQueueError> {
        let detail = match value {
            Confirmation::NotRequested => Some("amqp-confirm-failure".to_string()),
            Confirmation::Nack(_msg) => Some("amqp-unexpected-nack".to_string()),
            Confirmation::Ack(msg) => msg.map(|r| {
                format!(
                    "acker: {:?}, reply-code: {:?}, reply-detail: {:?}",
                    r.acker, r.reply_code, r.reply_text
                )
            }),
        };
        detail.map_or_else(
            || Ok(()),
            |d| {
                Err(AppQueueError {
                    fn_label: AppQueueFnLabel::Enqueue,
                    reason: AppQueueErrorReason::PublishUnconfirmed(d),
                })
            },
        )
    }

    async fn ensure_consumer(&self, label: AppQueueLabel) -> Result<(), AppQueueError> {
        let slot = self.slot(label);
        let mut guard = slot.consumer.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let chn = self.open_channel(label, AppQueueFnLabel::Claim).await?;
        let _map_e = |e: LapinError| AppQueueError {
            fn_label: AppQueueFnLabel::Claim,
            reason: e.into(),
        };
        chn.basic_qos(1u16, BasicQosOptions::default())
            .await
            .map_err(_map_e)?;
        let options = BasicConsumeOptions {
            no_local: false,
            no_ack: false,
            exclusive: false,
            nowait: false,
        };
        let consumer = chn
            .basic_consume(
                label.name(),
                generate_consumer_tag(label.name()).as_str(),
                options,
                FieldTable::default(),
            )
            .await
            .map_err(_map_e)?;
        *guard = Some(consumer);
        Ok(())
    } // end of fn ensure_consumer
} // end of impl AppAmqpJobQueue

#[async_trait]
impl AbstractJobQueue for AppAmqpJobQueue {
    async fn enqueue(
        &self,
        label: AppQueueLabel,
        task: AppJobTask,
    ) -> Result<(), AppQueueError> {
        self.publish(label, label.name(), &task, None, AppQueueFnLabel::Enqueue)
            .await
    }

    async fn enqueue_delayed(
        &self,
        label: AppQueueLabel,
        task: AppJobTask,
        delay_secs: u32,
    ) -> Result<(), AppQueueError> {
        let qname = delay_queue_name(label);
        let expire = (delay_secs as u64) * 1000;
        self.publish(
            label,
            qname.as_str(),
            &task,
            Some(expire),
            AppQueueFnLabel::Enqueue,
        )
        .await
    }

    async fn claim(
        &self,
        label: AppQueueLabel,
        wait_secs: u32,
    ) -> Result<Option<ClaimedJobTask>, AppQueueError> {
        self.ensure_consumer(label).await?;
        let slot = self.slot(label);
        let mut guard = slot.consumer.lock().await;
        let consumer = guard.as_mut().ok_or(AppQueueError {
            fn_label: AppQueueFnLabel::Claim,
            reason: AppQueueErrorReason::Backend("consumer-lost".to_string()),
        })?;
        let max_wait = Duration::from_secs(wait_secs as u64);
        let nxt = match timeout(max_wait, consumer.next()).await {
            Ok(v) => v,
            Err(_elapsed) => return Ok(None),
        };
        let delivered = match nxt {
            Some(Ok(d)) => d,
            Some(Err(e)) => {
                // broken stream, force re-subscribe on the next claim
                *guard = None;
                let logctx_p = &self._logctx;
                app_log_event!(
                    logctx_p,
                    AppLogLevel::WARNING,
                    "consume, queue:{}, {:?}",
                    label.name(),
                    e
                );
                return Err(AppQueueError {
                    fn_label: AppQueueFnLabel::Claim,
                    reason: e.into(),
                });
            }
            None => {
                *guard = None;
                return Ok(None);
            }
        };
        let task = serde_json::from_slice::<AppJobTask>(&delivered.data).map_err(|e| {
            AppQueueError {
                fn_label: AppQueueFnLabel::Claim,
                reason: AppQueueErrorReason::CorruptedPayload(e.to_string()),
            }
        })?;
        let receipt = delivered.delivery_tag;
        let mut ackers = slot.ackers.lock().await;
        ackers.insert(receipt, delivered.acker);
        Ok(Some(ClaimedJobTask { task, receipt }))
    } // end of fn claim

    async fn ack(
        &self,
        label: AppQueueLabel,
        claimed: ClaimedJobTask,
    ) -> Result<(), AppQueueError> {
        let slot = self.slot(label);
        let acker = {
            let mut guard = slot.ackers.lock().await;
            guard.remove(&claimed.receipt).ok_or(AppQueueError {
                fn_label: AppQueueFnLabel::Ack,
                reason: AppQueueErrorReason::UnknownReceipt(claimed.receipt),
            })?
        };
        acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| AppQueueError {
                fn_label: AppQueueFnLabel::Ack,
                reason: e.into(),
            })
    }

    async fn retry(
        &self,
        label: AppQueueLabel,
        claimed: ClaimedJobTask,
        err_detail: String,
    ) -> Result<RetryOutcome, AppQueueError> {
        let ClaimedJobTask { mut task, receipt } = claimed;
        let slot = self.slot(label);
        let acker = {
            let mut guard = slot.ackers.lock().await;
            guard.remove(&receipt).ok_or(AppQueueError {
                fn_label: AppQueueFnLabel::Retry,
                reason: AppQueueErrorReason::UnknownReceipt(receipt),
            })?
        };
        task.attempt += 1;
        task.last_error = Some(err_detail);
        let outcome = if task.attempt >= task.max_attempts {
            self.publish(
                label,
                label.dead_letter_name(),
                &task,
                None,
                AppQueueFnLabel::Retry,
            )
            .await?;
            RetryOutcome::DeadLettered
        } else {
            let delay_secs = retry_backoff_secs(task.attempt);
            let qname = delay_queue_name(label);
            self.publish(
                label,
                qname.as_str(),
                &task,
                Some((delay_secs as u64) * 1000),
                AppQueueFnLabel::Retry,
            )
            .await?;
            RetryOutcome::Rescheduled { delay_secs }
        };
        // the original delivery leaves the main queue only after its
        // replacement is safely persisted
        acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| AppQueueError {
                fn_label: AppQueueFnLabel::Retry,
                reason: e.into(),
            })?;
        Ok(outcome)
    } // end of fn retry

    async fn dead_letters(
        &self,
        label: AppQueueLabel,
        limit: usize,
    ) -> Result<Vec<AppJobTask>, AppQueueError> {
        let _map_e = |reason: AppQueueErrorReason| AppQueueError {
            fn_label: AppQueueFnLabel::DeadLetters,
            reason,
        };
        let chn = self.open_channel(label, AppQueueFnLabel::DeadLetters).await?;
        let mut out = Vec::new();
        let mut fetched_msgs = Vec::new();
        for _ in 0..limit {
            let fetched = chn
                .basic_get(label.dead_letter_name(), BasicGetOptions { no_ack: false })
                .await
                .map_err(|e| _map_e(e.into()))?;
            let msg = match fetched {
                Some(m) => m,
                None => break,
            };
            let task = serde_json::from_slice::<AppJobTask>(&msg.delivery.data)
                .map_err(|e| _map_e(AppQueueErrorReason::CorruptedPayload(e.to_string())))?;
            out.push(task);
            fetched_msgs.push(msg);
        } // end of loop
        // inspection only, every fetched message goes back on the parking
        // queue once the whole batch was read
        for msg in fetched_msgs {
            msg.delivery
                .acker
                .nack(BasicNackOptions {
                    multiple: false,
                    requeue: true,
                })
                .await
                .map_err(|e| _map_e(e.into()))?;
        }
        Ok(out)
    } // end of fn dead_letters
} // end of impl AppAmqpJobQueue
