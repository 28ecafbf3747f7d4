use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;
use mysql_async::prelude::{Query, Queryable, WithParams};
use mysql_async::{IsolationLevel, Params, TxOpts};

use crate::adapter::datastore::{AppDStoreMariaDB, AppDataStoreContext};
use crate::app_log_event;
use crate::error::AppErrorCode;
use crate::logging::AppLogLevel;
use crate::model::{
    LedgerAccountModel, LedgerAccountRole, LedgerDiscrepancyModel, LedgerOwnerType,
};

use super::super::{
    AbstractLedgerAccountRepo, AppRepoError, AppRepoErrorDetail, AppRepoErrorFnLabel,
};
use super::{
    classify_exec_err, raw_column_to_datetime, raw_column_to_u128, u128_to_column,
    DATETIME_FMT_P3F,
};

#[rustfmt::skip]
type AccountRowType = (Vec<u8>, u64, u8, u16, String, bool, mysql_async::Value);

type RowParseError = (AppErrorCode, AppRepoErrorDetail);

const ACCOUNT_INSERT_STMT: &str = "INSERT INTO `ledger_account`(`account_id`,`owner_id`,\
`owner_type`,`role_code`,`currency`,`is_active`,`create_time`) VALUES (?,?,?,?,?,?,?)";

#[rustfmt::skip]
fn parse_account_row(row: AccountRowType) -> Result<LedgerAccountModel, RowParseError> {
    let (id_raw, owner_id, otype_raw, role_raw, currency, is_active, ctime_raw) = row;
    let account_id = raw_column_to_u128(id_raw)?;
    let owner_type = LedgerOwnerType::from_code(otype_raw).map_err(|e| (
        AppErrorCode::DataCorruption,
        AppRepoErrorDetail::DataRowParse(format!("{e:?}")),
    ))?;
    let role = LedgerAccountRole::from_code(role_raw).map_err(|e| (
        AppErrorCode::DataCorruption,
        AppRepoErrorDetail::DataRowParse(format!("{e:?}")),
    ))?;
    let create_time = raw_column_to_datetime(ctime_raw, 3)?;
    Ok(LedgerAccountModel {
        account_id, owner_id, owner_type, role, currency, is_active, create_time,
    })
}

fn account_params(m: &LedgerAccountModel) -> Params {
    let arg = vec![
        u128_to_column(m.account_id).into(),
        m.owner_id.into(),
        m.owner_type.code().into(),
        m.role.code().into(),
        m.currency.as_str().into(),
        m.is_active.into(),
        m.create_time.format(DATETIME_FMT_P3F).to_string().into(),
    ];
    Params::Positional(arg)
}

pub(crate) struct MariadbLedgerAccountRepo {
    _dstore: Arc<AppDStoreMariaDB>,
}

impl MariadbLedgerAccountRepo {
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

    async fn fetch_where(
        &self,
        cond: &str,
        params: Params,
        fn_label: AppRepoErrorFnLabel,
    ) -> Result<Vec<LedgerAccountModel>, AppRepoError> {
        let mut conn = self._dstore.acquire().await.map_err(|e| {
            self._map_err(
                fn_label,
                AppErrorCode::DatabaseServerBusy,
                AppRepoErrorDetail::DataStore(e),
            )
        })?;
        let stmt = format!(
            "SELECT `account_id`,`owner_id`,`owner_type`,`role_code`,`currency`,\
             `is_active`,`create_time` FROM `ledger_account` WHERE {cond}"
        );
        let rows = stmt
            .with(params)
            .fetch::<AccountRowType, _>(&mut conn)
            .await
            .map_err(|e| {
                self._map_err(
                    fn_label,
                    AppErrorCode::RemoteDbServerFailure,
                    AppRepoErrorDetail::DatabaseQuery(e.to_string()),
                )
            })?;
        rows.into_iter()
            .map(parse_account_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|(code, detail)| self._map_err(fn_label, code, detail))
    } // end of fn fetch_where
} // end of impl MariadbLedgerAccountRepo

#[async_trait]
impl AbstractLedgerAccountRepo for MariadbLedgerAccountRepo {
    async fn create(&self, accounts: &[LedgerAccountModel]) -> Result<(), AppRepoError> {
        let label = AppRepoErrorFnLabel::CreateAccounts;
        let params_iter = accounts.iter().map(account_params).collect::<Vec<_>>();
        let mut conn = self._dstore.acquire().await.map_err(|e| {
            self._map_err(
                label,
                AppErrorCode::DatabaseServerBusy,
                AppRepoErrorDetail::DataStore(e),
            )
        })?;
        let mut options = TxOpts::default();
        options.with_isolation_level(IsolationLevel::RepeatableRead);
        let mut db_tx = conn.start_transaction(options).await.map_err(|e| {
            self._map_err(
                label,
                AppErrorCode::RemoteDbServerFailure,
                AppRepoErrorDetail::DatabaseTxStart(e.to_string()),
            )
        })?;
        db_tx
            .exec_batch(ACCOUNT_INSERT_STMT, params_iter)
            .await
            .map_err(|e| {
                self._map_err(label, AppErrorCode::RemoteDbServerFailure, classify_exec_err(e))
            })?;
        db_tx.commit().await.map_err(|e| {
            self._map_err(
                label,
                AppErrorCode::RemoteDbServerFailure,
                AppRepoErrorDetail::DatabaseTxCommit(e.to_string()),
            )
        })
    } // end of fn create

    async fn delete_owner(
        &self,
        owner_type: LedgerOwnerType,
        owner_id: u64,
    ) -> Result<(), AppRepoError> {
        let label = AppRepoErrorFnLabel::DeleteOwnerAccounts;
        let mut conn = self._dstore.acquire().await.map_err(|e| {
            self._map_err(
                label,
                AppErrorCode::DatabaseServerBusy,
                AppRepoErrorDetail::DataStore(e),
            )
        })?;
        let stmt = "DELETE FROM `ledger_account` WHERE `owner_type`=? AND `owner_id`=?";
        let params = Params::Positional(vec![owner_type.code().into(), owner_id.into()]);
        conn.exec_drop(stmt, params).await.map_err(|e| {
            self._map_err(label, AppErrorCode::RemoteDbServerFailure, classify_exec_err(e))
        })
    }

    async fn fetch_owner(
        &self,
        owner_type: LedgerOwnerType,
        owner_id: u64,
    ) -> Result<Vec<LedgerAccountModel>, AppRepoError> {
        let params = Params::Positional(vec![owner_type.code().into(), owner_id.into()]);
        self.fetch_where(
            "`owner_type`=? AND `owner_id`=?",
            params,
            AppRepoErrorFnLabel::FetchOwnerAccounts,
        )
        .await
    }

    async fn fetch_all_active(&self) -> Result<Vec<LedgerAccountModel>, AppRepoError> {
        self.fetch_where(
            "`is_active`=1",
            Params::Empty,
            AppRepoErrorFnLabel::FetchAllActiveAccounts,
        )
        .await
    }

    async fn create_discrepancy(&self, d: &LedgerDiscrepancyModel) -> Result<(), AppRepoError> {
        let label = AppRepoErrorFnLabel::CreateDiscrepancy;
        let mut conn = self._dstore.acquire().await.map_err(|e| {
            self._map_err(
                label,
                AppErrorCode::DatabaseServerBusy,
                AppRepoErrorDetail::DataStore(e),
            )
        })?;
        let stmt = "INSERT INTO `ledger_discrepancy`(`account_id`,`kind`,`expected`,\
                    `actual`,`detect_time`) VALUES (?,?,?,?,?)";
        // i128 totals exceed every native column type, keep them as strings
        let params = Params::Positional(vec![
            d.account_id.map(u128_to_column).into(),
            d.kind.label().into(),
            d.expected.to_string().into(),
            d.actual.to_string().into(),
            d.detect_time.format(DATETIME_FMT_P3F).to_string().into(),
        ]);
        conn.exec_drop(stmt, params).await.map_err(|e| {
            self._map_err(label, AppErrorCode::RemoteDbServerFailure, classify_exec_err(e))
        })
    } // end of fn create_discrepancy
} // end of impl MariadbLedgerAccountRepo
