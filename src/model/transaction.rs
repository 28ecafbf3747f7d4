use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::fee::{FeeBreakdownModel, TxFeeModel};
use super::routing::RoutingSnapshotModel;

#[derive(Debug)]
pub enum TxModelError {
    InvalidStatusTransition(TxStatus, TxStatus),
    HoldAlreadySet(String),
    HoldNotVoided(String),
    PostedAlreadySet(String),
    AmountOverflow(Decimal, Decimal),
    NetAmountUnderflow(Decimal, Decimal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxType {
    Payin,
    Payout,
}

impl TxType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Payin => "PAYIN",
            Self::Payout => "PAYOUT",
        }
    }
    fn id_prefix(&self) -> &'static str {
        match self {
            Self::Payin => "PI",
            Self::Payout => "PO",
        }
    }
    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "PAYIN" => Some(Self::Payin),
            "PAYOUT" => Some(Self::Payout),
            _others => None,
        }
    }

    /// payin withholds the fee from the collected amount, payout charges it
    /// on top of the disbursed amount, the asymmetry is intended business
    /// behaviour, both figures are what the merchant account actually moves
    pub fn net_amount(&self, amount: Decimal, fee_total: Decimal) -> Result<Decimal, TxModelError> {
        match self {
            Self::Payin => {
                let out = amount
                    .checked_sub(fee_total)
                    .ok_or(TxModelError::AmountOverflow(amount, fee_total))?;
                if out <= Decimal::ZERO {
                    Err(TxModelError::NetAmountUnderflow(amount, fee_total))
                } else {
                    Ok(out)
                }
            }
            Self::Payout => amount
                .checked_add(fee_total)
                .ok_or(TxModelError::AmountOverflow(amount, fee_total)),
        }
    }
} // end of impl TxType

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Expired,
    Reversed,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Expired | Self::Reversed)
    }
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
            Self::Reversed => "REVERSED",
        }
    }
    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "PROCESSING" => Some(Self::Processing),
            "SUCCESS" => Some(Self::Success),
            "FAILED" => Some(Self::Failed),
            "EXPIRED" => Some(Self::Expired),
            "REVERSED" => Some(Self::Reversed),
            _others => None,
        }
    }
    /// monotonic toward a terminal state, the single exception is the
    /// administrative reversal of a successful transaction
    fn can_transit_to(&self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(
                next,
                Self::Processing | Self::Success | Self::Failed | Self::Expired
            ),
            Self::Processing => matches!(next, Self::Success | Self::Failed | Self::Expired),
            Self::Success => matches!(next, Self::Reversed),
            Self::Failed | Self::Expired | Self::Reversed => false,
        }
    }
} // end of impl TxStatus

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxEventKind {
    Created,
    StatusChange,
    ProviderAttempt,
    Rerouted,
    LedgerHold,
    LedgerPosted,
    LedgerVoided,
    WebhookReceived,
    PollResult,
    Failure,
    AdminOverride,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct TxEventModel {
    pub kind: TxEventKind,
    pub time: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// fixed set of ledger correlation keys on one transaction, valid states
/// are enumerable instead of a free-form key bag
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct TxLedgerMetaModel {
    pub hold_transfer_id: Option<u128>,
    pub posted_transfer_id: Option<u128>,
    pub manual_transfer_ids: Vec<u128>,
    pub ledger_voided: bool,
    pub ledger_executed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxFailureClass {
    Validation,
    Configuration,
    Provider,
    Ledger,
    Persistence,
    Internal,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TxFailureDetail {
    pub class: TxFailureClass,
    pub code: String,
    pub detail: String,
}

impl TxFailureDetail {
    /// full detail stays in the event log for operators, merchants only see
    /// internals-free wording
    pub fn merchant_message(&self) -> String {
        match self.class {
            TxFailureClass::Validation | TxFailureClass::Configuration | TxFailureClass::Provider => {
                self.detail.clone()
            }
            TxFailureClass::Ledger | TxFailureClass::Persistence | TxFailureClass::Internal => {
                "unable to process".to_string()
            }
        }
    }
}

#[derive(Serialize, Deserialize, Clone)]
pub enum TxPartyModel {
    Customer {
        name: String,
        email: Option<String>,
        phone: Option<String>,
    },
    Beneficiary {
        name: String,
        account_number: String,
        ifsc: String,
        bank_name: Option<String>,
    },
}

#[derive(Clone)]
pub struct TxMetaModel {
    _id: String,
    _merchant_id: u64,
    _order_id: String,
    _tx_type: TxType,
    _status: TxStatus,
    _amount: Decimal,
    _net_amount: Decimal,
    _fees: TxFeeModel,
    _routing: RoutingSnapshotModel,
    _party: TxPartyModel,
    _provider_ref: Option<String>,
    _utr: Option<String>,
    _ledger: TxLedgerMetaModel,
    _failure: Option<TxFailureDetail>,
    _events: Vec<TxEventModel>,
    _create_time: DateTime<Utc>,
    _update_time: DateTime<Utc>,
}

#[rustfmt::skip]
type TxMetaCvtArgs = (
    u64, String, TxType, Decimal, Decimal, TxFeeModel,
    RoutingSnapshotModel, TxPartyModel, DateTime<Utc>,
);

impl From<TxMetaCvtArgs> for TxMetaModel {
    #[rustfmt::skip]
    fn from(value: TxMetaCvtArgs) -> Self {
        let (
            merchant_id, order_id, tx_type, amount, net_amount,
            fees, routing, party, now,
        ) = value;
        let id_ = format!(
            "{}-{:x}-{:x}",
            tx_type.id_prefix(), merchant_id, now.timestamp_micros(),
        );
        let ev0 = TxEventModel {
            kind: TxEventKind::Created,
            time: now,
            payload: serde_json::json!({"order_id": order_id.as_str()}),
        };
        Self {
            _id: id_, _merchant_id: merchant_id, _order_id: order_id,
            _tx_type: tx_type, _status: TxStatus::Pending,
            _amount: amount, _net_amount: net_amount, _fees: fees,
            _routing: routing, _party: party,
            _provider_ref: None, _utr: None,
            _ledger: TxLedgerMetaModel::default(),
            _failure: None, _events: vec![ev0],
            _create_time: now, _update_time: now,
        }
    }
} // end of impl TxMetaModel

#[rustfmt::skip]
pub(crate) type TxMetaDecomposedArgs = (
    String, u64, String, TxType, TxStatus, Decimal, Decimal,
    TxFeeModel, RoutingSnapshotModel, TxPartyModel,
    Option<String>, Option<String>, TxLedgerMetaModel,
    Option<TxFailureDetail>, Vec<TxEventModel>,
    DateTime<Utc>, DateTime<Utc>,
);

impl TxMetaModel {
    pub fn id(&self) -> &str {
        self._id.as_str()
    }
    pub fn merchant_id(&self) -> u64 {
        self._merchant_id
    }
    pub fn order_id(&self) -> &str {
        self._order_id.as_str()
    }
    pub fn tx_type(&self) -> TxType {
        self._tx_type
    }
    pub fn status(&self) -> TxStatus {
        self._status
    }
    pub fn amount(&self) -> Decimal {
        self._amount
    }
    pub fn net_amount(&self) -> Decimal {
        self._net_amount
    }
    pub fn fees(&self) -> &TxFeeModel {
        &self._fees
    }
    pub fn routing(&self) -> &RoutingSnapshotModel {
        &self._routing
    }
    pub fn party(&self) -> &TxPartyModel {
        &self._party
    }
    pub fn provider_ref(&self) -> Option<&str> {
        self._provider_ref.as_deref()
    }
    pub fn utr(&self) -> Option<&str> {
        self._utr.as_deref()
    }
    pub fn ledger(&self) -> &TxLedgerMetaModel {
        &self._ledger
    }
    pub fn failure(&self) -> Option<&TxFailureDetail> {
        self._failure.as_ref()
    }
    pub fn events(&self) -> &[TxEventModel] {
        self._events.as_slice()
    }
    pub fn create_time(&self) -> &DateTime<Utc> {
        &self._create_time
    }
    pub fn update_time(&self) -> &DateTime<Utc> {
        &self._update_time
    }

    pub fn record_event(&mut self, kind: TxEventKind, payload: serde_json::Value, now: DateTime<Utc>) {
        self._events.push(TxEventModel {
            kind,
            time: now,
            payload,
        });
        self._update_time = now;
    }

    pub fn transit_status(&mut self, next: TxStatus, now: DateTime<Utc>) -> Result<(), TxModelError> {
        if !self._status.can_transit_to(next) {
            return Err(TxModelError::InvalidStatusTransition(self._status, next));
        }
        let payload = serde_json::json!({
            "from": self._status.label(), "to": next.label(),
        });
        self._status = next;
        self.record_event(TxEventKind::StatusChange, payload, now);
        Ok(())
    }

    pub fn set_provider_result(
        &mut self,
        provider_ref: Option<String>,
        utr: Option<String>,
        now: DateTime<Utc>,
    ) {
        let payload = serde_json::json!({
            "provider_ref": provider_ref.as_deref(), "utr": utr.as_deref(),
        });
        if provider_ref.is_some() {
            self._provider_ref = provider_ref;
        }
        if utr.is_some() {
            self._utr = utr;
        }
        self.record_event(TxEventKind::ProviderAttempt, payload, now);
    }

    /// set at most once per natural lifecycle, later corrections go through
    /// `add_manual_transfer` , history is never rewritten
    pub fn set_hold_transfer(&mut self, tid: u128, now: DateTime<Utc>) -> Result<(), TxModelError> {
        if self._ledger.hold_transfer_id.is_some() {
            return Err(TxModelError::HoldAlreadySet(self._id.clone()));
        }
        self._ledger.hold_transfer_id = Some(tid);
        self.record_event(
            TxEventKind::LedgerHold,
            serde_json::json!({"transfer_id": tid.to_string()}),
            now,
        );
        Ok(())
    }

    /// a payout falling back to another channel first voids its current hold,
    /// then reserves again against the next channel
    pub fn replace_hold_transfer(&mut self, tid: u128, now: DateTime<Utc>) -> Result<(), TxModelError> {
        if self._ledger.hold_transfer_id.is_some() && !self._ledger.ledger_voided {
            return Err(TxModelError::HoldNotVoided(self._id.clone()));
        }
        self._ledger.hold_transfer_id = Some(tid);
        self._ledger.ledger_voided = false;
        self.record_event(
            TxEventKind::LedgerHold,
            serde_json::json!({"transfer_id": tid.to_string(), "replaced": true}),
            now,
        );
        Ok(())
    }

    pub fn set_posted_transfer(&mut self, tid: u128, now: DateTime<Utc>) -> Result<(), TxModelError> {
        if self._ledger.posted_transfer_id.is_some() {
            return Err(TxModelError::PostedAlreadySet(self._id.clone()));
        }
        self._ledger.posted_transfer_id = Some(tid);
        self._ledger.ledger_executed = true;
        self.record_event(
            TxEventKind::LedgerPosted,
            serde_json::json!({"transfer_id": tid.to_string()}),
            now,
        );
        Ok(())
    }

    /// returns false when the hold was voided before, callers treat that as
    /// a no-op instead of a second void
    pub fn mark_ledger_voided(&mut self, now: DateTime<Utc>) -> bool {
        if self._ledger.ledger_voided {
            return false;
        }
        self._ledger.ledger_voided = true;
        self.record_event(TxEventKind::LedgerVoided, serde_json::Value::Null, now);
        true
    }

    pub fn add_manual_transfer(&mut self, tid: u128, now: DateTime<Utc>) {
        self._ledger.manual_transfer_ids.push(tid);
        self.record_event(
            TxEventKind::AdminOverride,
            serde_json::json!({"transfer_id": tid.to_string()}),
            now,
        );
    }

    /// keeps the first failure, the handler may legally run more than once
    pub fn set_failure(&mut self, detail: TxFailureDetail, now: DateTime<Utc>) {
        if self._failure.is_some() {
            return;
        }
        let payload = serde_json::json!({
            "class": format!("{:?}", detail.class),
            "code": detail.code.as_str(),
            "detail": detail.detail.as_str(),
        });
        self._failure = Some(detail);
        self.record_event(TxEventKind::Failure, payload, now);
    }

    pub fn re_route(
        &mut self,
        snapshot: RoutingSnapshotModel,
        provider_fee: FeeBreakdownModel,
        now: DateTime<Utc>,
    ) {
        let payload = serde_json::json!({
            "from_channel": self._routing.channel_id,
            "to_channel": snapshot.channel_id,
        });
        self._routing = snapshot;
        self._fees.provider = provider_fee;
        self.record_event(TxEventKind::Rerouted, payload, now);
    }

    #[rustfmt::skip]
    pub(crate) fn into_parts(self) -> TxMetaDecomposedArgs {
        let Self {
            _id, _merchant_id, _order_id, _tx_type, _status, _amount,
            _net_amount, _fees, _routing, _party, _provider_ref, _utr,
            _ledger, _failure, _events, _create_time, _update_time,
        } = self;
        (_id, _merchant_id, _order_id, _tx_type, _status, _amount,
         _net_amount, _fees, _routing, _party, _provider_ref, _utr,
         _ledger, _failure, _events, _create_time, _update_time)
    }

    #[rustfmt::skip]
    pub(crate) fn from_parts(value: TxMetaDecomposedArgs) -> Self {
        let (
            _id, _merchant_id, _order_id, _tx_type, _status, _amount,
            _net_amount, _fees, _routing, _party, _provider_ref, _utr,
            _ledger, _failure, _events, _create_time, _update_time,
        ) = value;
        Self {
            _id, _merchant_id, _order_id, _tx_type, _status, _amount,
            _net_amount, _fees, _routing, _party, _provider_ref, _utr,
            _ledger, _failure, _events, _create_time, _update_time,
        }
    }
} // end of impl TxMetaModel
