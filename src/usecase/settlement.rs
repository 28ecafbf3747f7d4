use std::result::Result;

use chrono::{DateTime, Utc};

use crate::adapter::ledger::{LedgerOpCode, TransferLeg, TransferSpec};
use crate::app_log_event;
use crate::logging::AppLogLevel;
use crate::model::{derive_account_id, LedgerAccountRole, LedgerOwnerType};

use super::flow::{PaymentFlowContext, PaymentFlowError, SYSTEM_OWNER_ID};

/// which way the legal-entity float moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatDirection {
    ToChannel,
    ToLegalEntity,
}

/// balance-moving batches along fixed role-account paths, one posted
/// transfer per run per path, date-stamped refs keep a re-run harmless
pub struct SettlementUseCase {
    pub ctx: PaymentFlowContext,
}

impl SettlementUseCase {
    fn batch_ref(code: LedgerOpCode, owner_a: u64, owner_b: u64, day: DateTime<Utc>) -> String {
        format!(
            "settle:{:04x}:{owner_a:x}:{owner_b:x}:{}",
            code.code(),
            day.format("%Y%m%d")
        )
    }

    /// collected payin funds become disbursable payout balance
    pub async fn settle_merchant(
        &self,
        merchant_id: u64,
        amount_minor: u64,
    ) -> Result<u128, PaymentFlowError> {
        let payin_acct = derive_account_id(
            LedgerOwnerType::Merchant,
            LedgerAccountRole::MerchantPayin,
            merchant_id,
        )?;
        let payout_acct = derive_account_id(
            LedgerOwnerType::Merchant,
            LedgerAccountRole::MerchantPayout,
            merchant_id,
        )?;
        self.run_path(
            LedgerOpCode::SettleMerchant,
            payin_acct,
            payout_acct,
            amount_minor,
            merchant_id,
            merchant_id,
        )
        .await
    }

    /// accumulated provider-side expense recognized into platform income
    pub async fn settle_provider(
        &self,
        channel_id: u64,
        amount_minor: u64,
    ) -> Result<u128, PaymentFlowError> {
        let expense_acct = derive_account_id(
            LedgerOwnerType::ProviderChannel,
            LedgerAccountRole::ChannelExpense,
            channel_id,
        )?;
        let income_acct = derive_account_id(
            LedgerOwnerType::SuperAdmin,
            LedgerAccountRole::PlatformIncome,
            SYSTEM_OWNER_ID,
        )?;
        self.run_path(
            LedgerOpCode::SettleProvider,
            expense_acct,
            income_acct,
            amount_minor,
            channel_id,
            SYSTEM_OWNER_ID,
        )
        .await
    }

    /// float between a legal entity's main account and one of its channels
    pub async fn settle_legal_entity(
        &self,
        legal_entity_id: u64,
        channel_id: u64,
        amount_minor: u64,
        direction: FloatDirection,
    ) -> Result<u128, PaymentFlowError> {
        let main_acct = derive_account_id(
            LedgerOwnerType::LegalEntity,
            LedgerAccountRole::LegalEntityMain,
            legal_entity_id,
        )?;
        let channel_acct = derive_account_id(
            LedgerOwnerType::ProviderChannel,
            LedgerAccountRole::ChannelPayout,
            channel_id,
        )?;
        let (debit_acct, credit_acct) = match direction {
            FloatDirection::ToChannel => (main_acct, channel_acct),
            FloatDirection::ToLegalEntity => (channel_acct, main_acct),
        };
        self.run_path(
            LedgerOpCode::SettleLegalEntity,
            debit_acct,
            credit_acct,
            amount_minor,
            legal_entity_id,
            channel_id,
        )
        .await
    }

    async fn run_path(
        &self,
        code: LedgerOpCode,
        debit_acct: u128,
        credit_acct: u128,
        amount_minor: u64,
        owner_a: u64,
        owner_b: u64,
    ) -> Result<u128, PaymentFlowError> {
        let ctx = &self.ctx;
        let now = Utc::now();
        let spec = TransferSpec {
            debits: vec![TransferLeg {
                account: debit_acct,
                amount: amount_minor,
            }],
            credits: vec![TransferLeg {
                account: credit_acct,
                amount: amount_minor,
            }],
            code,
            pending: false,
            external_ref: Some(Self::batch_ref(code, owner_a, owner_b, now)),
        };
        let tid = ctx.ledger.transfer(spec).await?;
        let logctx_p = &ctx.logctx;
        app_log_event!(
            logctx_p,
            AppLogLevel::INFO,
            "settled, code:{:04x}, transfer:{tid:#x}, amount:{amount_minor}",
            code.code()
        );
        Ok(tid)
    } // end of fn run_path
} // end of impl SettlementUseCase

/// job payload shape: `{path, owner ids, amount_minor, direction?}`
pub fn parse_settlement_payload(
    payload: &serde_json::Value,
) -> Option<(String, u64, u64, u64, FloatDirection)> {
    let path = payload.get("path")?.as_str()?.to_string();
    let owner_a = payload.get("owner_a")?.as_u64()?;
    let owner_b = payload.get("owner_b").and_then(|v| v.as_u64()).unwrap_or(0);
    let amount_minor = payload.get("amount_minor")?.as_u64()?;
    let direction = match payload.get("direction").and_then(|v| v.as_str()) {
        Some("to_legal_entity") => FloatDirection::ToLegalEntity,
        _others => FloatDirection::ToChannel,
    };
    Some((path, owner_a, owner_b, amount_minor, direction))
}
