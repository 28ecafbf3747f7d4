use super::fee::FeeTierModel;
use super::transaction::TxType;

#[derive(Debug)]
pub enum MerchantModelError {
    Inactive(u64),
    DirectionDisabled(u64, TxType),
}

/// the slice of merchant configuration the payment core needs, profile CRUD
/// itself lives in the back-office service
#[derive(Clone)]
pub struct MerchantPaymentProfileModel {
    pub merchant_id: u64,
    pub is_active: bool,
    pub payin_enabled: bool,
    pub payout_enabled: bool,
    pub fee_tiers_payin: Vec<FeeTierModel>,
    pub fee_tiers_payout: Vec<FeeTierModel>,
    pub webhook_url: Option<String>,
    pub signing_secret: String,
    pub rps_limit: u32,
}

impl MerchantPaymentProfileModel {
    pub fn ensure_service(&self, direction: TxType) -> Result<(), MerchantModelError> {
        if !self.is_active {
            return Err(MerchantModelError::Inactive(self.merchant_id));
        }
        let enabled = match direction {
            TxType::Payin => self.payin_enabled,
            TxType::Payout => self.payout_enabled,
        };
        if !enabled {
            return Err(MerchantModelError::DirectionDisabled(
                self.merchant_id,
                direction,
            ));
        }
        Ok(())
    }

    /// merchant-side tiers stay fixed for the whole life of one transaction,
    /// a payout falling back to another channel keeps the fee it already cut
    pub fn fee_tiers(&self, direction: TxType) -> &[FeeTierModel] {
        match direction {
            TxType::Payin => self.fee_tiers_payin.as_slice(),
            TxType::Payout => self.fee_tiers_payout.as_slice(),
        }
    }
} // end of impl MerchantPaymentProfileModel
