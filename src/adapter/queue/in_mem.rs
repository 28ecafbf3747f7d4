use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Local};
use tokio::sync::{Mutex, Notify};
use tokio::time::{sleep, Duration, Instant};

use crate::app_log_event;
use crate::hard_limit;
use crate::logging::{AppLogContext, AppLogLevel};

use super::{
    retry_backoff_secs, AbstractJobQueue, AppJobTask, AppQueueError, AppQueueErrorReason,
    AppQueueFnLabel, AppQueueLabel, ClaimedJobTask, RetryOutcome,
};

struct ScheduledTask {
    run_at: DateTime<Local>,
    seq: u64,
    task: AppJobTask,
}

// earliest-due-first on top of the max-heap
impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .run_at
            .cmp(&self.run_at)
            .then(other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.run_at == other.run_at && self.seq == other.seq
    }
}
impl Eq for ScheduledTask {}

struct QueueRepr {
    ready: BinaryHeap<ScheduledTask>,
    inflight: HashMap<u64, (DateTime<Local>, AppJobTask)>,
    dead: Vec<AppJobTask>,
    seq: u64,
}

impl QueueRepr {
    fn new() -> Self {
        Self {
            ready: BinaryHeap::new(),
            inflight: HashMap::new(),
            dead: Vec::new(),
            seq: 0,
        }
    }

    fn push(&mut self, task: AppJobTask, run_at: DateTime<Local>) {
        self.seq += 1;
        let seq = self.seq;
        self.ready.push(ScheduledTask { run_at, seq, task });
    }

    /// consumers which crashed mid-task give their deliveries back here
    fn reclaim_expired(&mut self, t_now: DateTime<Local>) {
        let window = ChronoDuration::seconds(hard_limit::VISIBILITY_TIMEOUT_SECS as i64);
        let expired = self
            .inflight
            .iter()
            .filter(|(_r, (t_claim, _task))| (*t_claim + window) < t_now)
            .map(|(r, _v)| *r)
            .collect::<Vec<_>>();
        for receipt in expired {
            if let Some((_t, task)) = self.inflight.remove(&receipt) {
                self.push(task, t_now);
            }
        }
    }

    fn next_due(&mut self, t_now: DateTime<Local>) -> Option<ClaimedJobTask> {
        let due = self.ready.peek().map(|s| s.run_at <= t_now).unwrap_or(false);
        if !due {
            return None;
        }
        self.ready.pop().map(|s| {
            self.seq += 1;
            let receipt = self.seq;
            self.inflight.insert(receipt, (t_now, s.task.clone()));
            ClaimedJobTask {
                task: s.task,
                receipt,
            }
        })
    }

    fn wakeup_gap(&self, t_now: DateTime<Local>) -> Option<Duration> {
        self.ready.peek().map(|s| {
            let gap_ms = (s.run_at - t_now).num_milliseconds().max(0) as u64;
            Duration::from_millis(gap_ms)
        })
    }
} // end of impl QueueRepr

struct SingleQueue {
    repr: Mutex<QueueRepr>,
    notify: Notify,
}

impl SingleQueue {
    fn new() -> Self {
        Self {
            repr: Mutex::new(QueueRepr::new()),
            notify: Notify::new(),
        }
    }
}

pub struct AppInMemJobQueue {
    _logctx: Arc<AppLogContext>,
    _jobs: SingleQueue,
    _webhooks: SingleQueue,
}

impl AppInMemJobQueue {
    pub fn build(_logctx: Arc<AppLogContext>) -> Self {
        Self {
            _logctx,
            _jobs: SingleQueue::new(),
            _webhooks: SingleQueue::new(),
        }
    }

    fn slot(&self, label: AppQueueLabel) -> &SingleQueue {
        match label {
            AppQueueLabel::Jobs => &self._jobs,
            AppQueueLabel::Webhooks => &self._webhooks,
        }
    }

    async fn _enqueue(&self, label: AppQueueLabel, task: AppJobTask, delay_secs: u32) {
        let run_at = Local::now() + ChronoDuration::seconds(delay_secs as i64);
        let q = self.slot(label);
        let mut guard = q.repr.lock().await;
        guard.push(task, run_at);
        drop(guard);
        q.notify.notify_waiters();
    }
} // end of impl AppInMemJobQueue

#[async_trait]
impl AbstractJobQueue for AppInMemJobQueue {
    async fn enqueue(
        &self,
        label: AppQueueLabel,
        task: AppJobTask,
    ) -> Result<(), AppQueueError> {
        self._enqueue(label, task, 0).await;
        Ok(())
    }

    async fn enqueue_delayed(
        &self,
        label: AppQueueLabel,
        task: AppJobTask,
        delay_secs: u32,
    ) -> Result<(), AppQueueError> {
        self._enqueue(label, task, delay_secs).await;
        Ok(())
    }

    async fn claim(
        &self,
        label: AppQueueLabel,
        wait_secs: u32,
    ) -> Result<Option<ClaimedJobTask>, AppQueueError> {
        let q = self.slot(label);
        let deadline = Instant::now() + Duration::from_secs(wait_secs as u64);
        loop {
            let gap = {
                let t_now = Local::now();
                let mut guard = q.repr.lock().await;
                guard.reclaim_expired(t_now);
                if let Some(claimed) = guard.next_due(t_now) {
                    return Ok(Some(claimed));
                }
                guard.wakeup_gap(t_now)
            };
            let t_now = Instant::now();
            if t_now >= deadline {
                return Ok(None);
            }
            let remain = deadline - t_now;
            let nap = gap.map(|g| g.min(remain)).unwrap_or(remain);
            tokio::select! {
                _ = q.notify.notified() => {}
                _ = sleep(nap) => {}
            }
        } // end of loop
    } // end of fn claim

    async fn ack(
        &self,
        label: AppQueueLabel,
        claimed: ClaimedJobTask,
    ) -> Result<(), AppQueueError> {
        let q = self.slot(label);
        let mut guard = q.repr.lock().await;
        guard
            .inflight
            .remove(&claimed.receipt)
            .map(|_v| ())
            .ok_or(AppQueueError {
                fn_label: AppQueueFnLabel::Ack,
                reason: AppQueueErrorReason::UnknownReceipt(claimed.receipt),
            })
    }

    async fn retry(
        &self,
        label: AppQueueLabel,
        claimed: ClaimedJobTask,
        err_detail: String,
    ) -> Result<RetryOutcome, AppQueueError> {
        let ClaimedJobTask { mut task, receipt } = claimed;
        let q = self.slot(label);
        let mut guard = q.repr.lock().await;
        guard
            .inflight
            .remove(&receipt)
            .ok_or(AppQueueError {
                fn_label: AppQueueFnLabel::Retry,
                reason: AppQueueErrorReason::UnknownReceipt(receipt),
            })?;
        task.attempt += 1;
        task.last_error = Some(err_detail);
        if task.attempt >= task.max_attempts {
            let logctx_p = &self._logctx;
            app_log_event!(
                logctx_p,
                AppLogLevel::WARNING,
                "dead-letter, queue:{}, job:{}, attempts:{}",
                label.name(),
                task.id.as_str(),
                task.attempt
            );
            guard.dead.push(task);
            Ok(RetryOutcome::DeadLettered)
        } else {
            let delay_secs = retry_backoff_secs(task.attempt);
            let run_at = Local::now() + ChronoDuration::seconds(delay_secs as i64);
            guard.push(task, run_at);
            drop(guard);
            q.notify.notify_waiters();
            Ok(RetryOutcome::Rescheduled { delay_secs })
        }
    } // end of fn retry

    async fn dead_letters(
        &self,
        label: AppQueueLabel,
        limit: usize,
    ) -> Result<Vec<AppJobTask>, AppQueueError> {
        let q = self.slot(label);
        let guard = q.repr.lock().await;
        Ok(guard.dead.iter().take(limit).cloned().collect())
    }
} // end of impl AppInMemJobQueue
