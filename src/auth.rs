use std::result::Result;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::hard_limit;
use crate::model::MerchantPaymentProfileModel;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, PartialEq, Eq)]
pub enum AppAuthError {
    KeyInit,
    BadTimestamp(String),
    StaleTimestamp { skew_secs: i64 },
    MalformedSignature,
    SignatureMismatch,
}

/// the merchant identity a request proved ownership of, downstream code
/// never re-checks the signature
#[derive(Debug, Clone, Copy)]
pub struct AppAuthedMerchant {
    pub merchant_id: u64,
}

/// `hex( HMAC-SHA256( raw-body | "|" | unix-timestamp ) )` keyed with the
/// per-merchant signing secret
pub fn compute_signature(
    secret: &str,
    raw_body: &[u8],
    timestamp: i64,
) -> Result<String, AppAuthError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_e| AppAuthError::KeyInit)?;
    mac.update(raw_body);
    mac.update(b"|");
    mac.update(timestamp.to_string().as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_signature(
    profile: &MerchantPaymentProfileModel,
    raw_body: &[u8],
    timestamp_hdr: &str,
    signature_hdr: &str,
    t_now_epoch: i64,
) -> Result<AppAuthedMerchant, AppAuthError> {
    let timestamp = timestamp_hdr
        .parse::<i64>()
        .map_err(|_e| AppAuthError::BadTimestamp(timestamp_hdr.to_string()))?;
    let skew_secs = t_now_epoch - timestamp;
    if skew_secs.abs() > hard_limit::SIGNATURE_WINDOW_SECS {
        return Err(AppAuthError::StaleTimestamp { skew_secs });
    }
    let given = hex::decode(signature_hdr).map_err(|_e| AppAuthError::MalformedSignature)?;
    let mut mac = HmacSha256::new_from_slice(profile.signing_secret.as_bytes())
        .map_err(|_e| AppAuthError::KeyInit)?;
    mac.update(raw_body);
    mac.update(b"|");
    mac.update(timestamp.to_string().as_bytes());
    // constant-time comparison inside `verify_slice`
    mac.verify_slice(given.as_slice())
        .map_err(|_e| AppAuthError::SignatureMismatch)?;
    Ok(AppAuthedMerchant {
        merchant_id: profile.merchant_id,
    })
} // end of fn verify_signature

// end of mod tests
