use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{FeeBreakdownModel, TxMetaModel, TxPartyModel, TxStatus};

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum PaymentCurrencyDto {
    INR,
    USD,
}

impl PaymentCurrencyDto {
    pub fn label(&self) -> &'static str {
        match self {
            Self::INR => "INR",
            Self::USD => "USD",
        }
    }
}

#[derive(Deserialize)]
pub struct CustomerPartyDto {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Deserialize)]
pub struct BeneficiaryPartyDto {
    pub name: String,
    pub account_number: String,
    pub ifsc: String,
    pub bank_name: Option<String>,
}

impl From<CustomerPartyDto> for TxPartyModel {
    fn from(value: CustomerPartyDto) -> Self {
        Self::Customer {
            name: value.name,
            email: value.email,
            phone: value.phone,
        }
    }
}

impl From<BeneficiaryPartyDto> for TxPartyModel {
    fn from(value: BeneficiaryPartyDto) -> Self {
        Self::Beneficiary {
            name: value.name,
            account_number: value.account_number,
            ifsc: value.ifsc,
            bank_name: value.bank_name,
        }
    }
}

/// display amounts travel as strings on the wire, floats never carry money
#[derive(Deserialize)]
pub struct PayinCreateReqDto {
    pub order_id: String,
    pub amount: String,
    pub currency: PaymentCurrencyDto,
    pub customer: CustomerPartyDto,
}

#[derive(Deserialize)]
pub struct PayoutCreateReqDto {
    pub order_id: String,
    pub amount: String,
    pub currency: PaymentCurrencyDto,
    pub beneficiary: BeneficiaryPartyDto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatusDto {
    PENDING,
    PROCESSING,
    SUCCESS,
    FAILED,
    EXPIRED,
    REVERSED,
}

impl From<TxStatus> for TxStatusDto {
    fn from(value: TxStatus) -> Self {
        match value {
            TxStatus::Pending => Self::PENDING,
            TxStatus::Processing => Self::PROCESSING,
            TxStatus::Success => Self::SUCCESS,
            TxStatus::Failed => Self::FAILED,
            TxStatus::Expired => Self::EXPIRED,
            TxStatus::Reversed => Self::REVERSED,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeeBreakdownDto {
    pub flat: String,
    pub percentage: String,
    pub tax: String,
    pub total: String,
}

impl From<&FeeBreakdownModel> for FeeBreakdownDto {
    fn from(value: &FeeBreakdownModel) -> Self {
        Self {
            flat: value.flat.to_string(),
            percentage: value.percentage.to_string(),
            tax: value.tax.to_string(),
            total: value.total.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentCreateRespDto {
    pub transaction_id: String,
    pub order_id: String,
    pub direction: String,
    pub status: TxStatusDto,
    pub amount: String,
    pub net_amount: String,
    pub fee: FeeBreakdownDto,
    pub payment_intent: Option<String>,
    pub create_time: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct PaymentStatusRespDto {
    pub transaction_id: String,
    pub order_id: String,
    pub direction: String,
    pub status: TxStatusDto,
    pub amount: String,
    pub net_amount: String,
    pub utr: Option<String>,
    pub failure_reason: Option<String>,
    pub update_time: DateTime<Utc>,
}

impl From<&TxMetaModel> for PaymentStatusRespDto {
    fn from(value: &TxMetaModel) -> Self {
        Self {
            transaction_id: value.id().to_string(),
            order_id: value.order_id().to_string(),
            direction: value.tx_type().label().to_string(),
            status: value.status().into(),
            amount: value.amount().to_string(),
            net_amount: value.net_amount().to_string(),
            utr: value.utr().map(|u| u.to_string()),
            failure_reason: value.failure().map(|f| f.merchant_message()),
            update_time: *value.update_time(),
        }
    }
}

#[derive(Serialize)]
pub struct PaymentErrorRespDto {
    pub code: String,
    pub message: String,
}

/// body pushed to the merchant's webhook endpoint on each terminal transition
#[derive(Serialize, Deserialize)]
pub struct MerchantCallbackDto {
    pub transaction_id: String,
    pub order_id: String,
    pub direction: String,
    pub status: TxStatusDto,
    pub amount: String,
    pub net_amount: String,
    pub utr: Option<String>,
    pub failure_reason: Option<String>,
    pub event_time: DateTime<Utc>,
}

impl From<&TxMetaModel> for MerchantCallbackDto {
    fn from(value: &TxMetaModel) -> Self {
        Self {
            transaction_id: value.id().to_string(),
            order_id: value.order_id().to_string(),
            direction: value.tx_type().label().to_string(),
            status: value.status().into(),
            amount: value.amount().to_string(),
            net_amount: value.net_amount().to_string(),
            utr: value.utr().map(|u| u.to_string()),
            failure_reason: value.failure().map(|f| f.merchant_message()),
            event_time: *value.update_time(),
        }
    }
}

/// raw provider webhook as captured at the edge, verification and parsing
/// happen later in the worker
#[derive(Serialize, Deserialize)]
pub struct ProviderWebhookIngestDto {
    pub webhook_id: String,
    pub provider_label: String,
    pub direction: String,
    pub raw_body: String,
}
