mod account;
mod amount;
mod fee;
mod merchant;
mod routing;
mod transaction;

pub use account::{
    derive_account_id, AccountModelError, LedgerAccountModel, LedgerAccountRole,
    LedgerDiscrepancyKind, LedgerDiscrepancyModel, LedgerOwnerType, ACCOUNT_ID_VERSION,
};
pub use amount::{
    from_minor_units, parse_amount, round_money, to_minor_units, AmountModelError, AMOUNT_SCALE,
};
pub use fee::{calculate_fee, FeeBreakdownModel, FeeModelError, FeeTierModel, TxFeeModel};
pub use merchant::{MerchantModelError, MerchantPaymentProfileModel};
pub use routing::{ProviderChannelModel, RoutingChainModel, RoutingModelError, RoutingSnapshotModel};
pub use transaction::{
    TxEventKind, TxEventModel, TxFailureClass, TxFailureDetail, TxLedgerMetaModel, TxMetaModel,
    TxModelError, TxPartyModel, TxStatus, TxType,
};
