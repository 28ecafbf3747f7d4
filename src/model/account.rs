use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// embedded in every persisted account id, bump only on layout change
pub const ACCOUNT_ID_VERSION: u8 = 1;

#[derive(Debug)]
pub enum AccountModelError {
    RoleOwnerMismatch(LedgerOwnerType, LedgerAccountRole),
    UnknownOwnerCode(u8),
    UnknownRoleCode(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerOwnerType {
    Merchant,
    LegalEntity,
    ProviderChannel,
    SuperAdmin,
    World,
}

impl LedgerOwnerType {
    pub(crate) fn code(&self) -> u8 {
        match self {
            Self::Merchant => 0x01,
            Self::LegalEntity => 0x02,
            Self::ProviderChannel => 0x03,
            Self::SuperAdmin => 0x04,
            Self::World => 0x05,
        }
    }
    pub fn from_code(value: u8) -> Result<Self, AccountModelError> {
        match value {
            0x01 => Ok(Self::Merchant),
            0x02 => Ok(Self::LegalEntity),
            0x03 => Ok(Self::ProviderChannel),
            0x04 => Ok(Self::SuperAdmin),
            0x05 => Ok(Self::World),
            _others => Err(AccountModelError::UnknownOwnerCode(value)),
        }
    }
} // end of impl LedgerOwnerType

/// role codes are PERMANENT once assigned, they are baked into persisted
/// account ids, add new codes at the end, never renumber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerAccountRole {
    MerchantPayin,
    MerchantPayout,
    MerchantHold,
    ChannelPayin,
    ChannelPayout,
    ChannelExpense,
    LegalEntityMain,
    PlatformIncome,
    World,
}

impl LedgerAccountRole {
    pub(crate) fn code(&self) -> u16 {
        match self {
            Self::MerchantPayin => 0x0101,
            Self::MerchantPayout => 0x0102,
            Self::MerchantHold => 0x0103,
            Self::ChannelPayin => 0x0201,
            Self::ChannelPayout => 0x0202,
            Self::ChannelExpense => 0x0203,
            Self::LegalEntityMain => 0x0301,
            Self::PlatformIncome => 0x0401,
            Self::World => 0x0501,
        }
    }
    pub fn from_code(value: u16) -> Result<Self, AccountModelError> {
        match value {
            0x0101 => Ok(Self::MerchantPayin),
            0x0102 => Ok(Self::MerchantPayout),
            0x0103 => Ok(Self::MerchantHold),
            0x0201 => Ok(Self::ChannelPayin),
            0x0202 => Ok(Self::ChannelPayout),
            0x0203 => Ok(Self::ChannelExpense),
            0x0301 => Ok(Self::LegalEntityMain),
            0x0401 => Ok(Self::PlatformIncome),
            0x0501 => Ok(Self::World),
            _others => Err(AccountModelError::UnknownRoleCode(value)),
        }
    }
    pub fn slug(&self) -> &'static str {
        match self {
            Self::MerchantPayin => "MERCHANT:PAYIN",
            Self::MerchantPayout => "MERCHANT:PAYOUT",
            Self::MerchantHold => "MERCHANT:HOLD",
            Self::ChannelPayin => "CHANNEL:PAYIN",
            Self::ChannelPayout => "CHANNEL:PAYOUT",
            Self::ChannelExpense => "CHANNEL:EXPENSE",
            Self::LegalEntityMain => "LEGAL_ENTITY:MAIN",
            Self::PlatformIncome => "PLATFORM:INCOME",
            Self::World => "WORLD",
        }
    }
    fn owner(&self) -> LedgerOwnerType {
        match self {
            Self::MerchantPayin | Self::MerchantPayout | Self::MerchantHold => {
                LedgerOwnerType::Merchant
            }
            Self::ChannelPayin | Self::ChannelPayout | Self::ChannelExpense => {
                LedgerOwnerType::ProviderChannel
            }
            Self::LegalEntityMain => LedgerOwnerType::LegalEntity,
            Self::PlatformIncome => LedgerOwnerType::SuperAdmin,
            Self::World => LedgerOwnerType::World,
        }
    }
    /// the external ledger store rejects any transfer that would drive a
    /// flagged account below zero, surfaced to callers as insufficient funds
    pub fn debit_capped(&self) -> bool {
        matches!(self, Self::MerchantPayout | Self::MerchantHold)
    }
    pub fn all_for_owner(owner_type: LedgerOwnerType) -> &'static [LedgerAccountRole] {
        match owner_type {
            LedgerOwnerType::Merchant => &[
                Self::MerchantPayin,
                Self::MerchantPayout,
                Self::MerchantHold,
            ],
            LedgerOwnerType::ProviderChannel => &[
                Self::ChannelPayin,
                Self::ChannelPayout,
                Self::ChannelExpense,
            ],
            LedgerOwnerType::LegalEntity => &[Self::LegalEntityMain],
            LedgerOwnerType::SuperAdmin => &[Self::PlatformIncome],
            LedgerOwnerType::World => &[Self::World],
        }
    }
} // end of impl LedgerAccountRole

/// pure bit packing, no datastore round trip, the metadata row in
/// `ledger_account` stays authoritative for activation state only
///
/// layout (big endian) : version 8 bits, owner-type 8 bits, role 16 bits,
/// owner id 64 bits, reserved 32 bits
pub fn derive_account_id(
    owner_type: LedgerOwnerType,
    role: LedgerAccountRole,
    owner_id: u64,
) -> Result<u128, AccountModelError> {
    if role.owner() != owner_type {
        return Err(AccountModelError::RoleOwnerMismatch(owner_type, role));
    }
    let out = ((ACCOUNT_ID_VERSION as u128) << 120)
        | ((owner_type.code() as u128) << 112)
        | ((role.code() as u128) << 96)
        | ((owner_id as u128) << 32);
    Ok(out)
}

/// reconciliation output, recorded for operator review, never auto-corrected
#[derive(Clone)]
pub struct LedgerDiscrepancyModel {
    pub account_id: Option<u128>,
    pub kind: LedgerDiscrepancyKind,
    pub expected: i128,
    pub actual: i128,
    pub detect_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerDiscrepancyKind {
    BalanceMismatch,
    GlobalImbalance,
}

impl LedgerDiscrepancyKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::BalanceMismatch => "BALANCE_MISMATCH",
            Self::GlobalImbalance => "GLOBAL_IMBALANCE",
        }
    }
}

#[derive(Clone)]
pub struct LedgerAccountModel {
    pub account_id: u128,
    pub owner_id: u64,
    pub owner_type: LedgerOwnerType,
    pub role: LedgerAccountRole,
    pub currency: String,
    pub is_active: bool,
    pub create_time: DateTime<Utc>,
}

impl LedgerAccountModel {
    pub fn provision_set(
        owner_type: LedgerOwnerType,
        owner_id: u64,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Self>, AccountModelError> {
        LedgerAccountRole::all_for_owner(owner_type)
            .iter()
            .map(|role| {
                let account_id = derive_account_id(owner_type, *role, owner_id)?;
                Ok(Self {
                    account_id,
                    owner_id,
                    owner_type,
                    role: *role,
                    currency: currency.to_string(),
                    is_active: true,
                    create_time: now,
                })
            })
            .collect()
    }
} // end of impl LedgerAccountModel
