use payment_gateway::adapter::queue::{
    retry_backoff_secs, AbstractJobQueue, AppInMemJobQueue, AppJobTask, AppJobType, AppQueueLabel,
    RetryOutcome,
};

use super::ut_logctx;

fn ut_task(id_suffix: u32, attempt: u16) -> AppJobTask {
    let mut t = AppJobTask::new(
        format!("job-{id_suffix}"),
        AppJobType::PayoutPoll,
        serde_json::json!({"tx_id": "PO-1-abc", "poll_round": 1, "eod": false}),
    );
    t.attempt = attempt;
    t
}

#[test]
fn backoff_strictly_increasing() {
    let mut prev = 0u32;
    for num_failures in 1u16..=12 {
        let delay = retry_backoff_secs(num_failures);
        assert!(delay > prev, "failures:{num_failures}, delay:{delay}");
        prev = delay;
    }
    assert_eq!(retry_backoff_secs(1), 2);
    assert_eq!(retry_backoff_secs(2), 4);
    assert_eq!(retry_backoff_secs(3), 8);
    assert_eq!(retry_backoff_secs(4), 16);
    // once past the cap the delay plateaus but keeps a unique schedule
    assert_eq!(retry_backoff_secs(9), 309);
    assert_eq!(retry_backoff_secs(10), 310);
}

#[tokio::test]
async fn claim_ack_consumes_exactly_once() {
    let q = AppInMemJobQueue::build(ut_logctx());
    q.enqueue(AppQueueLabel::Jobs, ut_task(1, 0)).await.unwrap();
    let claimed = q.claim(AppQueueLabel::Jobs, 2).await.unwrap().unwrap();
    assert_eq!(claimed.task.id.as_str(), "job-1");
    q.ack(AppQueueLabel::Jobs, claimed).await.unwrap();
    let nothing = q.claim(AppQueueLabel::Jobs, 1).await.unwrap();
    assert!(nothing.is_none());
}

#[tokio::test]
async fn queues_are_independent() {
    let q = AppInMemJobQueue::build(ut_logctx());
    q.enqueue(AppQueueLabel::Webhooks, ut_task(7, 0))
        .await
        .unwrap();
    let nothing = q.claim(AppQueueLabel::Jobs, 1).await.unwrap();
    assert!(nothing.is_none());
    let claimed = q.claim(AppQueueLabel::Webhooks, 1).await.unwrap().unwrap();
    q.ack(AppQueueLabel::Webhooks, claimed).await.unwrap();
}

#[tokio::test]
async fn retry_walks_backoff_then_dead_letters() {
    let q = AppInMemJobQueue::build(ut_logctx());
    let expect_delays = [2u32, 4, 8, 16];
    // completed failures 0..=3 reschedule, the 5th failure exhausts the
    // default budget of 5 attempts
    for (prior_failures, expect_delay) in expect_delays.iter().enumerate() {
        q.enqueue(AppQueueLabel::Jobs, ut_task(20, prior_failures as u16))
            .await
            .unwrap();
        let claimed = q.claim(AppQueueLabel::Jobs, 2).await.unwrap().unwrap();
        let outcome = q
            .retry(AppQueueLabel::Jobs, claimed, "provider timeout".to_string())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RetryOutcome::Rescheduled {
                delay_secs: *expect_delay
            }
        );
    }
    q.enqueue(AppQueueLabel::Jobs, ut_task(21, 4)).await.unwrap();
    let claimed = q.claim(AppQueueLabel::Jobs, 2).await.unwrap().unwrap();
    let outcome = q
        .retry(AppQueueLabel::Jobs, claimed, "provider timeout".to_string())
        .await
        .unwrap();
    assert_eq!(outcome, RetryOutcome::DeadLettered);
    let dead = q.dead_letters(AppQueueLabel::Jobs, 10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id.as_str(), "job-21");
    assert_eq!(dead[0].attempt, 5);
    assert_eq!(dead[0].last_error.as_deref(), Some("provider timeout"));
    // inspection does not consume, the task stays parked
    let dead = q.dead_letters(AppQueueLabel::Jobs, 10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id.as_str(), "job-21");
}

#[tokio::test]
async fn delayed_task_not_claimable_early() {
    let q = AppInMemJobQueue::build(ut_logctx());
    q.enqueue_delayed(AppQueueLabel::Jobs, ut_task(30, 0), 30)
        .await
        .unwrap();
    let nothing = q.claim(AppQueueLabel::Jobs, 1).await.unwrap();
    assert!(nothing.is_none());
}
