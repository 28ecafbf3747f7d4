use std::result::Result;

use chrono::Utc;

use crate::adapter::ledger::AccountSpec;
use crate::app_log_event;
use crate::logging::AppLogLevel;
use crate::model::{LedgerAccountModel, LedgerOwnerType};

use super::flow::{PaymentFlowContext, PaymentFlowError};

/// creates the full role-account set for a new owner, idempotent : a
/// partial set from an earlier crashed run is torn down and recreated
pub struct ProvisionAccountsUseCase {
    pub ctx: PaymentFlowContext,
}

impl ProvisionAccountsUseCase {
    pub async fn execute(
        &self,
        owner_type: LedgerOwnerType,
        owner_id: u64,
        currency: &str,
    ) -> Result<usize, PaymentFlowError> {
        let ctx = &self.ctx;
        ctx.account_repo.delete_owner(owner_type, owner_id).await?;
        let now = Utc::now();
        let accounts = LedgerAccountModel::provision_set(owner_type, owner_id, currency, now)?;
        let specs = accounts
            .iter()
            .map(|a| AccountSpec {
                id: a.account_id,
                debits_must_not_exceed_credits: a.role.debit_capped(),
            })
            .collect::<Vec<_>>();
        ctx.ledger.create_accounts(specs).await?;
        ctx.account_repo.create(accounts.as_slice()).await?;
        let logctx_p = &ctx.logctx;
        app_log_event!(
            logctx_p,
            AppLogLevel::INFO,
            "provisioned, owner:{owner_id}, type:{:?}, num-accounts:{}",
            owner_type,
            accounts.len()
        );
        Ok(accounts.len())
    } // end of fn execute
} // end of impl ProvisionAccountsUseCase
