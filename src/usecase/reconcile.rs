use std::result::Result;

use chrono::Utc;

use crate::adapter::ledger::{TransferQuery, TransferState};
use crate::app_log_event;
use crate::logging::AppLogLevel;
use crate::model::{LedgerDiscrepancyKind, LedgerDiscrepancyModel};

use super::flow::{PaymentFlowContext, PaymentFlowError};

const RECON_QUERY_LIMIT: usize = 100_000;

pub struct ReconcileSummary {
    pub num_accounts: usize,
    pub num_mismatched: usize,
    pub globally_balanced: bool,
}

/// independent audit pass : recompute every balance from posted journal
/// entries, cross-check the system-wide debit / credit totals, record
/// mismatches for operators, never correct anything
pub struct ReconcileUseCase {
    pub ctx: PaymentFlowContext,
}

impl ReconcileUseCase {
    pub async fn execute(&self) -> Result<ReconcileSummary, PaymentFlowError> {
        let ctx = &self.ctx;
        let logctx_p = &ctx.logctx;
        let accounts = ctx.account_repo.fetch_all_active().await?;
        let ids = accounts.iter().map(|a| a.account_id).collect::<Vec<_>>();
        let balances = ctx.ledger.get_balances(ids.as_slice()).await?;
        let now = Utc::now();
        let mut num_mismatched = 0usize;
        let (mut global_debits, mut global_credits) = (0i128, 0i128);
        for (account_id, stored) in balances.iter() {
            global_debits += stored.debits_posted as i128;
            global_credits += stored.credits_posted as i128;
            let recomputed = self.recompute_posted(*account_id).await?;
            if recomputed != stored.net() {
                num_mismatched += 1;
                let row = LedgerDiscrepancyModel {
                    account_id: Some(*account_id),
                    kind: LedgerDiscrepancyKind::BalanceMismatch,
                    expected: recomputed,
                    actual: stored.net(),
                    detect_time: now,
                };
                ctx.account_repo.create_discrepancy(&row).await?;
                app_log_event!(
                    logctx_p,
                    AppLogLevel::ERROR,
                    "balance-mismatch, account:{account_id:#x}, recomputed:{recomputed}, stored:{}",
                    stored.net()
                );
            }
        } // end of loop
        let globally_balanced = global_debits == global_credits;
        if !globally_balanced {
            let row = LedgerDiscrepancyModel {
                account_id: None,
                kind: LedgerDiscrepancyKind::GlobalImbalance,
                expected: global_credits,
                actual: global_debits,
                detect_time: now,
            };
            ctx.account_repo.create_discrepancy(&row).await?;
            app_log_event!(
                logctx_p,
                AppLogLevel::ERROR,
                "global-imbalance, debits:{global_debits}, credits:{global_credits}"
            );
        }
        Ok(ReconcileSummary {
            num_accounts: accounts.len(),
            num_mismatched,
            globally_balanced,
        })
    } // end of fn execute

    /// posted journal entries only, pending reservations are not balance
    async fn recompute_posted(&self, account_id: u128) -> Result<i128, PaymentFlowError> {
        let records = self
            .ctx
            .ledger
            .query_transfers(TransferQuery {
                account: account_id,
                limit: RECON_QUERY_LIMIT,
                code: None,
                reversed: false,
                time_range: None,
            })
            .await?;
        let mut net = 0i128;
        for r in records.iter().filter(|r| r.state == TransferState::Posted) {
            for leg in r.credits.iter().filter(|l| l.account == account_id) {
                net += leg.amount as i128;
            }
            for leg in r.debits.iter().filter(|l| l.account == account_id) {
                net -= leg.amount as i128;
            }
        }
        Ok(net)
    }
} // end of impl ReconcileUseCase
