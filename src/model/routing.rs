use serde::{Deserialize, Serialize};

use super::fee::FeeTierModel;
use super::transaction::TxType;

#[derive(Debug)]
pub enum RoutingModelError {
    EmptyChain(TxType),
}

/// one (provider, legal entity) pairing with its own accounts, fee tiers
/// and activation state
#[derive(Clone)]
pub struct ProviderChannelModel {
    pub channel_id: u64,
    pub provider_id: u64,
    pub legal_entity_id: u64,
    /// key into the provider adapter registry, e.g. `mockpay`
    pub provider_label: String,
    pub priority: u16,
    pub is_active: bool,
    pub payin_enabled: bool,
    pub payout_enabled: bool,
    pub fee_tiers_payin: Vec<FeeTierModel>,
    pub fee_tiers_payout: Vec<FeeTierModel>,
    pub rps_limit: u32,
}

impl ProviderChannelModel {
    fn eligible(&self, direction: TxType) -> bool {
        self.is_active
            && match direction {
                TxType::Payin => self.payin_enabled,
                TxType::Payout => self.payout_enabled,
            }
    }
    pub fn fee_tiers(&self, direction: TxType) -> &[FeeTierModel] {
        match direction {
            TxType::Payin => self.fee_tiers_payin.as_slice(),
            TxType::Payout => self.fee_tiers_payout.as_slice(),
        }
    }
}

/// what one transaction remembers of the channel it was (last) routed to,
/// re-snapshotted when a payout falls back to the next channel
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RoutingSnapshotModel {
    pub provider_id: u64,
    pub legal_entity_id: u64,
    pub channel_id: u64,
    pub provider_label: String,
}

impl<'a> From<&'a ProviderChannelModel> for RoutingSnapshotModel {
    fn from(value: &'a ProviderChannelModel) -> Self {
        Self {
            provider_id: value.provider_id,
            legal_entity_id: value.legal_entity_id,
            channel_id: value.channel_id,
            provider_label: value.provider_label.clone(),
        }
    }
}

/// ordered fallback chain, payin consumes only the head, payout walks the
/// whole chain on retryable provider failures
pub struct RoutingChainModel {
    channels: Vec<ProviderChannelModel>,
}

type RoutingChainCvtArgs = (Vec<ProviderChannelModel>, TxType);

impl TryFrom<RoutingChainCvtArgs> for RoutingChainModel {
    type Error = RoutingModelError;
    fn try_from(value: RoutingChainCvtArgs) -> Result<Self, Self::Error> {
        let (all_channels, direction) = value;
        let mut channels = all_channels
            .into_iter()
            .filter(|c| c.eligible(direction))
            .collect::<Vec<_>>();
        if channels.is_empty() {
            return Err(RoutingModelError::EmptyChain(direction));
        }
        channels.sort_by_key(|c| c.priority);
        Ok(Self { channels })
    }
}

impl RoutingChainModel {
    pub fn head(&self) -> &ProviderChannelModel {
        &self.channels[0]
    }
    pub fn iter(&self) -> impl Iterator<Item = &ProviderChannelModel> {
        self.channels.iter()
    }
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }
} // end of impl RoutingChainModel
