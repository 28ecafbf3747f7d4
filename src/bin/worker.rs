use std::collections::HashMap;
use std::env;
use std::result::Result;

use tokio::runtime::Builder;
use tokio::task::JoinSet;

use payment_gateway::adapter::queue::{AppJobTask, AppJobType, AppQueueLabel, RetryOutcome};
use payment_gateway::api::web::dto::ProviderWebhookIngestDto;
use payment_gateway::config::{env_vars, AppCfgInitArgs, AppConfig};
use payment_gateway::logging::{app_log_event, AppLogLevel};
use payment_gateway::usecase::{
    app_flow_context, parse_expiry_payload, parse_poll_payload, parse_settlement_payload,
    HandleWebhookUseCase, PayinExpiryUseCase, PaymentFlowContext, PayoutPollUseCase,
    ReconcileUseCase, SettlementUseCase,
};
use payment_gateway::AppSharedState;

const CLAIM_WAIT_SECS: u32 = 25;
const NUM_CONSUMERS_PER_QUEUE: usize = 2;

fn init_config() -> Result<AppConfig, ()> {
    let iter = env::vars().filter(|(k, _v)| env_vars::EXPECTED_LABELS.contains(&k.as_str()));
    let env_var_map = HashMap::from_iter(iter);
    let args = AppCfgInitArgs { env_var_map };
    AppConfig::new(args).map_err(|e| {
        println!(
            "[ERROR] config failure, code:{:?}, detail:{:?}",
            e.code, e.detail
        );
    })
}

async fn dispatch(ctx: &PaymentFlowContext, task: &AppJobTask) -> Result<(), String> {
    match task.jtype {
        AppJobType::PayinExpiry => {
            let tx_id = parse_expiry_payload(&task.payload)
                .ok_or_else(|| format!("malformed-expiry-payload, job:{}", task.id))?;
            let uc = PayinExpiryUseCase { ctx: ctx.clone() };
            uc.execute(tx_id.as_str()).await.map_err(|e| format!("{e:?}"))
        }
        AppJobType::PayoutPoll => {
            let (tx_id, poll_round, eod) = parse_poll_payload(&task.payload)
                .ok_or_else(|| format!("malformed-poll-payload, job:{}", task.id))?;
            let uc = PayoutPollUseCase { ctx: ctx.clone() };
            uc.execute(tx_id.as_str(), poll_round, eod)
                .await
                .map_err(|e| format!("{e:?}"))
        }
        AppJobType::Settlement => {
            let (path, owner_a, owner_b, amount_minor, direction) =
                parse_settlement_payload(&task.payload)
                    .ok_or_else(|| format!("malformed-settlement-payload, job:{}", task.id))?;
            let uc = SettlementUseCase { ctx: ctx.clone() };
            let result = match path.as_str() {
                "merchant" => uc.settle_merchant(owner_a, amount_minor).await,
                "provider" => uc.settle_provider(owner_a, amount_minor).await,
                "legal_entity" => {
                    uc.settle_legal_entity(owner_a, owner_b, amount_minor, direction)
                        .await
                }
                _others => return Err(format!("unknown-settlement-path, {path}")),
            };
            result.map(|_tid| ()).map_err(|e| format!("{e:?}"))
        }
        AppJobType::Reconciliation => {
            let uc = ReconcileUseCase { ctx: ctx.clone() };
            uc.execute().await.map(|_summary| ()).map_err(|e| format!("{e:?}"))
        }
        AppJobType::WebhookIngest => {
            let ingest = serde_json::from_value::<ProviderWebhookIngestDto>(task.payload.clone())
                .map_err(|e| format!("malformed-webhook-payload, job:{}, {e}", task.id))?;
            let uc = HandleWebhookUseCase { ctx: ctx.clone() };
            uc.execute(ingest).await.map_err(|e| format!("{e:?}"))
        }
        AppJobType::MerchantCallback => run_merchant_callback(ctx, task).await,
    }
} // end of fn dispatch

async fn run_merchant_callback(
    ctx: &PaymentFlowContext,
    task: &AppJobTask,
) -> Result<(), String> {
    let merchant_id = task
        .payload
        .get("merchant_id")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| format!("malformed-callback-payload, job:{}", task.id))?;
    let notification = task
        .payload
        .get("notification")
        .cloned()
        .ok_or_else(|| format!("malformed-callback-payload, job:{}", task.id))?;
    let maybe_profile = ctx
        .merchant_repo
        .fetch_profile(merchant_id)
        .await
        .map_err(|e| format!("{e:?}"))?;
    let profile = maybe_profile.ok_or(format!("profile-missing, merchant:{merchant_id}"))?;
    let url = match profile.webhook_url.as_deref() {
        Some(v) => v,
        None => {
            // merchants without a callback endpoint simply poll the status API
            let logctx_p = &ctx.logctx;
            app_log_event!(
                logctx_p,
                AppLogLevel::DEBUG,
                "callback-skipped, merchant:{merchant_id}"
            );
            return Ok(());
        }
    };
    ctx.callback
        .notify(url, notification)
        .await
        .map_err(|e| format!("{e:?}"))
} // end of fn run_merchant_callback

async fn consume_loop(shr_state: AppSharedState, label: AppQueueLabel, slot: usize) {
    let logctx = shr_state.log_context();
    let ctx = match app_flow_context(&shr_state).await {
        Ok(v) => v,
        Err(e) => {
            app_log_event!(logctx, AppLogLevel::ERROR, "consumer-init, {:?}", e);
            return;
        }
    };
    let queue = shr_state.queue_context();
    app_log_event!(
        logctx,
        AppLogLevel::INFO,
        "consumer-started, queue:{}, slot:{slot}",
        label.name()
    );
    loop {
        let claimed = match queue.claim(label, CLAIM_WAIT_SECS).await {
            Ok(Some(v)) => v,
            Ok(None) => continue,
            Err(e) => {
                app_log_event!(logctx, AppLogLevel::ERROR, "claim, {:?}", e);
                tokio::time::sleep(std::time::Duration::from_secs(3)).await;
                continue;
            }
        };
        let job_id = claimed.task.id.clone();
        let outcome = dispatch(&ctx, &claimed.task).await;
        let follow_up = match outcome {
            Ok(()) => queue.ack(label, claimed).await.map(|_c| None),
            Err(detail) => {
                app_log_event!(
                    logctx,
                    AppLogLevel::WARNING,
                    "job-failed, id:{job_id}, {detail}"
                );
                queue.retry(label, claimed, detail).await.map(Some)
            }
        };
        match follow_up {
            Ok(Some(RetryOutcome::DeadLettered)) => {
                app_log_event!(logctx, AppLogLevel::ERROR, "job-dead-lettered, id:{job_id}");
            }
            Ok(_others) => {}
            Err(e) => {
                app_log_event!(logctx, AppLogLevel::ERROR, "settle-delivery, {:?}", e);
            }
        }
    } // end of loop
} // end of fn consume_loop

async fn start_worker(shr_state: AppSharedState) {
    let mut consumers = JoinSet::new();
    for label in [AppQueueLabel::Jobs, AppQueueLabel::Webhooks] {
        for slot in 0..NUM_CONSUMERS_PER_QUEUE {
            consumers.spawn(consume_loop(shr_state.clone(), label, slot));
        }
    }
    // the loops never return in normal operation, a joined consumer means
    // its initialization failed, keep the rest running
    while consumers.join_next().await.is_some() {}
}

fn main() -> Result<(), ()> {
    let cfg = init_config()?;
    let shr_state = AppSharedState::new(cfg).map_err(|e| {
        println!("[ERROR] shared state init failure, {:?}", e);
    })?;
    let cfg = shr_state.config();
    let logctx = shr_state.log_context();
    let stack_nbytes = (cfg.gateway.stack_sz_kb as usize) << 10;
    let runtime = Builder::new_multi_thread()
        .worker_threads(NUM_CONSUMERS_PER_QUEUE * 2)
        .thread_stack_size(stack_nbytes)
        .thread_name("pay-gateway-worker")
        .enable_time()
        .enable_io()
        .build()
        .map_err(|e| {
            app_log_event!(logctx, AppLogLevel::ERROR, "{:?}", e);
        })?;
    runtime.block_on(async move { start_worker(shr_state).await });
    Ok(())
} // end of fn main
