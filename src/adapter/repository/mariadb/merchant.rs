use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;
use mysql_async::prelude::{Query, WithParams};
use mysql_async::Params;

use crate::adapter::datastore::{AppDStoreMariaDB, AppDataStoreContext};
use crate::app_log_event;
use crate::error::AppErrorCode;
use crate::logging::AppLogLevel;
use crate::model::{FeeTierModel, MerchantPaymentProfileModel, ProviderChannelModel};

use super::super::{
    AbstractMerchantRepo, AppRepoError, AppRepoErrorDetail, AppRepoErrorFnLabel,
};
use super::raw_column_to_json;

#[rustfmt::skip]
type ProfileRowType = (
    u64, bool, bool, bool, String, String, Option<String>, String, u32,
);

#[rustfmt::skip]
type ChannelRowType = (
    u64, u64, u64, String, u16, bool, bool, bool, String, String, u32,
);

type RowParseError = (AppErrorCode, AppRepoErrorDetail);

#[rustfmt::skip]
fn parse_profile_row(row: ProfileRowType) -> Result<MerchantPaymentProfileModel, RowParseError> {
    let (
        merchant_id, is_active, payin_enabled, payout_enabled,
        tiers_pi_raw, tiers_po_raw, webhook_url, signing_secret, rps_limit,
    ) = row;
    let fee_tiers_payin = raw_column_to_json::<Vec<FeeTierModel>>(tiers_pi_raw)?;
    let fee_tiers_payout = raw_column_to_json::<Vec<FeeTierModel>>(tiers_po_raw)?;
    Ok(MerchantPaymentProfileModel {
        merchant_id, is_active, payin_enabled, payout_enabled,
        fee_tiers_payin, fee_tiers_payout, webhook_url, signing_secret,
        rps_limit,
    })
}

#[rustfmt::skip]
fn parse_channel_row(row: ChannelRowType) -> Result<ProviderChannelModel, RowParseError> {
    let (
        channel_id, provider_id, legal_entity_id, provider_label, priority,
        is_active, payin_enabled, payout_enabled, tiers_pi_raw, tiers_po_raw,
        rps_limit,
    ) = row;
    let fee_tiers_payin = raw_column_to_json::<Vec<FeeTierModel>>(tiers_pi_raw)?;
    let fee_tiers_payout = raw_column_to_json::<Vec<FeeTierModel>>(tiers_po_raw)?;
    Ok(ProviderChannelModel {
        channel_id, provider_id, legal_entity_id, provider_label, priority,
        is_active, payin_enabled, payout_enabled, fee_tiers_payin,
        fee_tiers_payout, rps_limit,
    })
}

pub(crate) struct MariadbMerchantRepo {
    _dstore: Arc<AppDStoreMariaDB>,
}

impl MariadbMerchantRepo {
    pub(crate) async fn new(ds: Arc<AppDataStoreContext>) -> Result<Self, AppRepoError> {
        ds.mariadb(None)
            .map(|found| Self { _dstore: found })
            .ok_or(AppRepoError {
                fn_label: AppRepoErrorFnLabel::InitRepo,
                code: AppErrorCode::MissingDataStore,
                detail: AppRepoErrorDetail::Unknown,
            })
    }

    fn _map_err(
        &self,
        fn_label: AppRepoErrorFnLabel,
        code: AppErrorCode,
        detail: AppRepoErrorDetail,
    ) -> AppRepoError {
        let e = AppRepoError {
            fn_label,
            code,
            detail,
        };
        let logctx = self._dstore.log_context();
        app_log_event!(logctx, AppLogLevel::ERROR, "{:?}", e);
        e
    }
} // end of impl MariadbMerchantRepo

#[async_trait]
impl AbstractMerchantRepo for MariadbMerchantRepo {
    async fn fetch_profile(
        &self,
        merchant_id: u64,
    ) -> Result<Option<MerchantPaymentProfileModel>, AppRepoError> {
        let label = AppRepoErrorFnLabel::FetchMerchantProfile;
        let mut conn = self._dstore.acquire().await.map_err(|e| {
            self._map_err(
                label,
                AppErrorCode::DatabaseServerBusy,
                AppRepoErrorDetail::DataStore(e),
            )
        })?;
        let stmt = "SELECT `merchant_id`,`is_active`,`payin_enabled`,`payout_enabled`,\
                    `fee_tiers_payin`,`fee_tiers_payout`,`webhook_url`,`signing_secret`,\
                    `rps_limit` FROM `merchant_payment_profile` WHERE `merchant_id`=?";
        let maybe_row = stmt
            .with(Params::Positional(vec![merchant_id.into()]))
            .first::<ProfileRowType, _>(&mut conn)
            .await
            .map_err(|e| {
                self._map_err(
                    label,
                    AppErrorCode::RemoteDbServerFailure,
                    AppRepoErrorDetail::DatabaseQuery(e.to_string()),
                )
            })?;
        maybe_row
            .map(parse_profile_row)
            .transpose()
            .map_err(|(code, detail)| self._map_err(label, code, detail))
    } // end of fn fetch_profile

    async fn fetch_channels(
        &self,
        merchant_id: u64,
    ) -> Result<Vec<ProviderChannelModel>, AppRepoError> {
        let label = AppRepoErrorFnLabel::FetchChannels;
        let mut conn = self._dstore.acquire().await.map_err(|e| {
            self._map_err(
                label,
                AppErrorCode::DatabaseServerBusy,
                AppRepoErrorDetail::DataStore(e),
            )
        })?;
        // per-merchant priority lives on the routing row, the channel row
        // keeps everything owned by the channel itself
        let stmt = "SELECT c.`channel_id`,c.`provider_id`,c.`legal_entity_id`,\
                    c.`provider_label`,r.`priority`,c.`is_active`,c.`payin_enabled`,\
                    c.`payout_enabled`,c.`fee_tiers_payin`,c.`fee_tiers_payout`,\
                    c.`rps_limit` FROM `merchant_routing` r INNER JOIN \
                    `provider_channel` c ON c.`channel_id`=r.`channel_id` \
                    WHERE r.`merchant_id`=?";
        let rows = stmt
            .with(Params::Positional(vec![merchant_id.into()]))
            .fetch::<ChannelRowType, _>(&mut conn)
            .await
            .map_err(|e| {
                self._map_err(
                    label,
                    AppErrorCode::RemoteDbServerFailure,
                    AppRepoErrorDetail::DatabaseQuery(e.to_string()),
                )
            })?;
        rows.into_iter()
            .map(parse_channel_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|(code, detail)| self._map_err(label, code, detail))
    } // end of fn fetch_channels
} // end of impl MariadbMerchantRepo
