use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;
use mysql_async::prelude::{FromValue, Query, Queryable, WithParams};
use mysql_async::{IsolationLevel, Params, Row, TxOpts};
use rust_decimal::Decimal;

use crate::adapter::datastore::{AppDStoreMariaDB, AppDataStoreContext};
use crate::app_log_event;
use crate::error::AppErrorCode;
use crate::logging::AppLogLevel;
use crate::model::{
    RoutingSnapshotModel, TxEventModel, TxFailureDetail, TxFeeModel, TxLedgerMetaModel,
    TxMetaModel, TxPartyModel, TxStatus, TxType,
};

use super::super::{
    AbstractTransactionRepo, AppRepoError, AppRepoErrorDetail, AppRepoErrorFnLabel,
};
use super::{
    classify_exec_err, raw_column_to_datetime, raw_column_to_json, to_json_column,
    DATETIME_FMT_P3F,
};

const TX_SELECT_COLS: &str = "`id`,`merchant_id`,`order_id`,`tx_type`,`status`,`amount`,\
`net_amount`,`fees`,`routing`,`party`,`provider_ref`,`utr`,`ledger_meta`,`failure`,\
`create_time`,`update_time`";

const TX_INSERT_STMT: &str = "INSERT INTO `payment_transaction`(`id`,`merchant_id`,\
`order_id`,`tx_type`,`status`,`amount`,`net_amount`,`fees`,`routing`,`party`,\
`provider_ref`,`utr`,`ledger_meta`,`failure`,`create_time`,`update_time`) VALUES \
(?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)";

// replaying already-stored events is a no-op, the audit trail is append-only
const EVENT_INSERT_STMT: &str = "INSERT INTO `payment_transaction_event`(`tx_id`,`seq`,\
`detail`) VALUES (?,?,?) ON DUPLICATE KEY UPDATE `tx_id`=`tx_id`";

type TxEventRowType = (u32, String);

type RowParseError = (AppErrorCode, AppRepoErrorDetail);

fn event_params(tx_id: &str, events: &[TxEventModel]) -> Result<Vec<Params>, RowParseError> {
    events
        .iter()
        .enumerate()
        .map(|(seq, ev)| {
            let detail = to_json_column(ev)?;
            let arg = vec![tx_id.into(), (seq as u32).into(), detail.into()];
            Ok(Params::Positional(arg))
        })
        .collect()
}

/// columns rewritten by both progress and status updates, the order must
/// match the SET clauses below
fn mutable_col_values(tx: &TxMetaModel) -> Result<Vec<mysql_async::Value>, RowParseError> {
    let fees = to_json_column(tx.fees())?;
    let routing = to_json_column(tx.routing())?;
    let ledger = to_json_column(tx.ledger())?;
    let failure = tx.failure().map(to_json_column).transpose()?;
    Ok(vec![
        tx.provider_ref().into(),
        tx.utr().into(),
        fees.into(),
        routing.into(),
        ledger.into(),
        failure.into(),
        tx.update_time().format(DATETIME_FMT_P3F).to_string().into(),
    ])
}

struct InsertTxArgs(Vec<(String, Vec<Params>)>);

impl<'a> TryFrom<&'a TxMetaModel> for InsertTxArgs {
    type Error = RowParseError;
    fn try_from(value: &'a TxMetaModel) -> Result<Self, Self::Error> {
        let fees = to_json_column(value.fees())?;
        let routing = to_json_column(value.routing())?;
        let party = to_json_column(value.party())?;
        let ledger = to_json_column(value.ledger())?;
        let failure = value.failure().map(to_json_column).transpose()?;
        let top = vec![
            value.id().into(),
            value.merchant_id().into(),
            value.order_id().into(),
            value.tx_type().label().into(),
            value.status().label().into(),
            value.amount().into(),
            value.net_amount().into(),
            fees.into(),
            routing.into(),
            party.into(),
            value.provider_ref().into(),
            value.utr().into(),
            ledger.into(),
            failure.into(),
            value.create_time().format(DATETIME_FMT_P3F).to_string().into(),
            value.update_time().format(DATETIME_FMT_P3F).to_string().into(),
        ];
        let evs = event_params(value.id(), value.events())?;
        Ok(Self(vec![
            (TX_INSERT_STMT.to_string(), vec![Params::Positional(top)]),
            (EVENT_INSERT_STMT.to_string(), evs),
        ]))
    } // end of fn try_from
} // end of impl InsertTxArgs

// the transaction row is wider than the tuple conversions `mysql_async`
// provides, columns are taken one by one in `TX_SELECT_COLS` order
fn take_col<T: FromValue>(row: &mut Row, idx: usize) -> Result<T, RowParseError> {
    row.take::<T, usize>(idx).ok_or((
        AppErrorCode::DataCorruption,
        AppRepoErrorDetail::DataRowParse(format!("column:{idx}")),
    ))
}

fn parse_tx_row(mut row: Row, raw_events: Vec<TxEventRowType>) -> Result<TxMetaModel, RowParseError> {
    let id_ = take_col::<String>(&mut row, 0)?;
    let merchant_id = take_col::<u64>(&mut row, 1)?;
    let order_id = take_col::<String>(&mut row, 2)?;
    let typ_raw = take_col::<String>(&mut row, 3)?;
    let status_raw = take_col::<String>(&mut row, 4)?;
    let amount = take_col::<Decimal>(&mut row, 5)?;
    let net_amount = take_col::<Decimal>(&mut row, 6)?;
    let fees_raw = take_col::<String>(&mut row, 7)?;
    let routing_raw = take_col::<String>(&mut row, 8)?;
    let party_raw = take_col::<String>(&mut row, 9)?;
    let provider_ref = take_col::<Option<String>>(&mut row, 10)?;
    let utr = take_col::<Option<String>>(&mut row, 11)?;
    let ledger_raw = take_col::<String>(&mut row, 12)?;
    let failure_raw = take_col::<Option<String>>(&mut row, 13)?;
    let ctime_raw = take_col::<mysql_async::Value>(&mut row, 14)?;
    let utime_raw = take_col::<mysql_async::Value>(&mut row, 15)?;
    let tx_type = TxType::from_label(typ_raw.as_str()).ok_or((
        AppErrorCode::DataCorruption,
        AppRepoErrorDetail::DataRowParse(typ_raw),
    ))?;
    let status = TxStatus::from_label(status_raw.as_str()).ok_or((
        AppErrorCode::DataCorruption,
        AppRepoErrorDetail::DataRowParse(status_raw),
    ))?;
    let fees = raw_column_to_json::<TxFeeModel>(fees_raw)?;
    let routing = raw_column_to_json::<RoutingSnapshotModel>(routing_raw)?;
    let party = raw_column_to_json::<TxPartyModel>(party_raw)?;
    let ledger = raw_column_to_json::<TxLedgerMetaModel>(ledger_raw)?;
    let failure = failure_raw
        .map(raw_column_to_json::<TxFailureDetail>)
        .transpose()?;
    let events = raw_events
        .into_iter()
        .map(|(_seq, detail)| raw_column_to_json::<TxEventModel>(detail))
        .collect::<Result<Vec<_>, _>>()?;
    let ctime = raw_column_to_datetime(ctime_raw, 3)?;
    let utime = raw_column_to_datetime(utime_raw, 3)?;
    Ok(TxMetaModel::from_parts((
        id_, merchant_id, order_id, tx_type, status, amount, net_amount,
        fees, routing, party, provider_ref, utr, ledger, failure, events,
        ctime, utime,
    )))
} // end of fn parse_tx_row

pub(crate) struct MariadbTransactionRepo {
    _dstore: Arc<AppDStoreMariaDB>,
}

impl MariadbTransactionRepo {
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

    async fn fetch_one_where(
        &self,
        cond: &str,
        params: Params,
        fn_label: AppRepoErrorFnLabel,
    ) -> Result<Option<TxMetaModel>, AppRepoError> {
        let mut conn = self._dstore.acquire().await.map_err(|e| {
            self._map_err(
                fn_label,
                AppErrorCode::DatabaseServerBusy,
                AppRepoErrorDetail::DataStore(e),
            )
        })?;
        let stmt = format!(
            "SELECT {TX_SELECT_COLS} FROM `payment_transaction` WHERE {cond}"
        );
        let maybe_row = stmt
            .with(params)
            .first::<Row, _>(&mut conn)
            .await
            .map_err(|e| {
                self._map_err(
                    fn_label,
                    AppErrorCode::RemoteDbServerFailure,
                    AppRepoErrorDetail::DatabaseQuery(e.to_string()),
                )
            })?;
        let row = match maybe_row {
            Some(v) => v,
            None => return Ok(None),
        };
        let tx_id = row.get::<String, usize>(0).ok_or_else(|| {
            self._map_err(
                fn_label,
                AppErrorCode::DataCorruption,
                AppRepoErrorDetail::DataRowParse("column:0".to_string()),
            )
        })?;
        let ev_stmt = "SELECT `seq`,`detail` FROM `payment_transaction_event` \
                       WHERE `tx_id`=? ORDER BY `seq`";
        let raw_events = ev_stmt
            .with(Params::Positional(vec![tx_id.into()]))
            .fetch::<TxEventRowType, _>(&mut conn)
            .await
            .map_err(|e| {
                self._map_err(
                    fn_label,
                    AppErrorCode::RemoteDbServerFailure,
                    AppRepoErrorDetail::DatabaseQuery(e.to_string()),
                )
            })?;
        parse_tx_row(row, raw_events)
            .map(Some)
            .map_err(|(code, detail)| self._map_err(fn_label, code, detail))
    } // end of fn fetch_one_where
} // end of impl MariadbTransactionRepo

#[async_trait]
impl AbstractTransactionRepo for MariadbTransactionRepo {
    async fn create(&self, tx: &TxMetaModel) -> Result<(), AppRepoError> {
        let label = AppRepoErrorFnLabel::CreateTransaction;
        let args = InsertTxArgs::try_from(tx)
            .map_err(|(code, detail)| self._map_err(label, code, detail))?;
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
        for (stmt, params_iter) in args.0 {
            db_tx.exec_batch(stmt, params_iter).await.map_err(|e| {
                self._map_err(label, AppErrorCode::RemoteDbServerFailure, classify_exec_err(e))
            })?;
        }
        db_tx.commit().await.map_err(|e| {
            self._map_err(
                label,
                AppErrorCode::RemoteDbServerFailure,
                AppRepoErrorDetail::DatabaseTxCommit(e.to_string()),
            )
        })
    } // end of fn create

    async fn fetch(&self, id_: &str) -> Result<Option<TxMetaModel>, AppRepoError> {
        let params = Params::Positional(vec![id_.into()]);
        self.fetch_one_where("`id`=?", params, AppRepoErrorFnLabel::FetchTransaction)
            .await
    }

    async fn fetch_by_order_id(
        &self,
        merchant_id: u64,
        order_id: &str,
    ) -> Result<Option<TxMetaModel>, AppRepoError> {
        let params = Params::Positional(vec![merchant_id.into(), order_id.into()]);
        self.fetch_one_where(
            "`merchant_id`=? AND `order_id`=?",
            params,
            AppRepoErrorFnLabel::FetchByOrderId,
        )
        .await
    }

    async fn fetch_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<TxMetaModel>, AppRepoError> {
        let params = Params::Positional(vec![provider_ref.into()]);
        self.fetch_one_where(
            "`provider_ref`=?",
            params,
            AppRepoErrorFnLabel::FetchByProviderRef,
        )
        .await
    }

    async fn update_status_guarded(
        &self,
        tx: &TxMetaModel,
        expect: &[TxStatus],
    ) -> Result<bool, AppRepoError> {
        let label = AppRepoErrorFnLabel::UpdateStatus;
        let mut params = vec![mysql_async::Value::from(tx.status().label())];
        params.extend(mutable_col_values(tx).map_err(|(c, d)| self._map_err(label, c, d))?);
        params.push(tx.id().into());
        let placeholders = expect.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        params.extend(expect.iter().map(|s| mysql_async::Value::from(s.label())));
        let stmt = format!(
            "UPDATE `payment_transaction` SET `status`=?,`provider_ref`=?,`utr`=?,\
             `fees`=?,`routing`=?,`ledger_meta`=?,`failure`=?,`update_time`=? \
             WHERE `id`=? AND `status` IN ({placeholders})"
        );
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
            .exec_drop(stmt, Params::Positional(params))
            .await
            .map_err(|e| {
                self._map_err(label, AppErrorCode::RemoteDbServerFailure, classify_exec_err(e))
            })?;
        let won = db_tx.affected_rows() == 1;
        if won {
            let evs = event_params(tx.id(), tx.events())
                .map_err(|(c, d)| self._map_err(label, c, d))?;
            db_tx.exec_batch(EVENT_INSERT_STMT, evs).await.map_err(|e| {
                self._map_err(label, AppErrorCode::RemoteDbServerFailure, classify_exec_err(e))
            })?;
        }
        db_tx.commit().await.map_err(|e| {
            self._map_err(
                label,
                AppErrorCode::RemoteDbServerFailure,
                AppRepoErrorDetail::DatabaseTxCommit(e.to_string()),
            )
        })?;
        Ok(won)
    } // end of fn update_status_guarded

    async fn update_progress(&self, tx: &TxMetaModel) -> Result<(), AppRepoError> {
        let label = AppRepoErrorFnLabel::UpdateProgress;
        let mut params = mutable_col_values(tx).map_err(|(c, d)| self._map_err(label, c, d))?;
        params.push(tx.id().into());
        let stmt = "UPDATE `payment_transaction` SET `provider_ref`=?,`utr`=?,`fees`=?,\
                    `routing`=?,`ledger_meta`=?,`failure`=?,`update_time`=? WHERE `id`=?";
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
            .exec_drop(stmt, Params::Positional(params))
            .await
            .map_err(|e| {
                self._map_err(label, AppErrorCode::RemoteDbServerFailure, classify_exec_err(e))
            })?;
        let evs = event_params(tx.id(), tx.events())
            .map_err(|(c, d)| self._map_err(label, c, d))?;
        db_tx.exec_batch(EVENT_INSERT_STMT, evs).await.map_err(|e| {
            self._map_err(label, AppErrorCode::RemoteDbServerFailure, classify_exec_err(e))
        })?;
        db_tx.commit().await.map_err(|e| {
            self._map_err(
                label,
                AppErrorCode::RemoteDbServerFailure,
                AppRepoErrorDetail::DatabaseTxCommit(e.to_string()),
            )
        })
    } // end of fn update_progress
} // end of impl MariadbTransactionRepo
