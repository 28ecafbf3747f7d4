pub(super) mod ledger_account;
pub(super) mod merchant;
pub(super) mod transaction;

use std::result::Result;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;

use crate::error::AppErrorCode;

use super::AppRepoErrorDetail;

pub(super) use ledger_account::MariadbLedgerAccountRepo;
pub(super) use merchant::MariadbMerchantRepo;
pub(super) use transaction::MariadbTransactionRepo;

const DATETIME_FMT_P3F: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[allow(non_snake_case)]
fn raw_column_to_datetime(
    val: mysql_async::Value,
    subsec_precision: u16,
) -> Result<DateTime<Utc>, (AppErrorCode, AppRepoErrorDetail)> {
    let result = if let mysql_async::Value::Date(Y, M, D, h, m, s, us) = val {
        let res_d = NaiveDate::from_ymd_opt(Y as i32, M as u32, D as u32).ok_or("date-parse-fail");
        let res_t = NaiveTime::from_hms_micro_opt(h as u32, m as u32, s as u32, us)
            .ok_or("time-parse-fail");
        match (res_d, res_t) {
            (Ok(d), Ok(t)) => Ok(NaiveDateTime::new(d, t)
                .and_utc()
                .trunc_subsecs(subsec_precision)),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    } else {
        Err("datetime-unknown-value-type")
    };
    result.map_err(|msg| {
        (
            AppErrorCode::DataCorruption,
            AppRepoErrorDetail::DataRowParse(msg.to_string()),
        )
    })
}

// 128-bit account / transfer ids are persisted as BINARY(16) columns
fn u128_to_column(value: u128) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

fn raw_column_to_u128(raw: Vec<u8>) -> Result<u128, (AppErrorCode, AppRepoErrorDetail)> {
    let arr: [u8; 16] = raw.try_into().map_err(|_e| {
        (
            AppErrorCode::DataCorruption,
            AppRepoErrorDetail::DataRowParse("id-not-16-bytes".to_string()),
        )
    })?;
    Ok(u128::from_be_bytes(arr))
}

fn raw_column_to_json<T: DeserializeOwned>(
    raw: String,
) -> Result<T, (AppErrorCode, AppRepoErrorDetail)> {
    serde_json::from_str::<T>(raw.as_str()).map_err(|e| {
        (
            AppErrorCode::DataCorruption,
            AppRepoErrorDetail::DataRowParse(e.to_string()),
        )
    })
}

fn to_json_column<T: serde::Serialize>(
    value: &T,
) -> Result<String, (AppErrorCode, AppRepoErrorDetail)> {
    serde_json::to_string(value).map_err(|e| {
        (
            AppErrorCode::DataCorruption,
            AppRepoErrorDetail::Serialization(e.to_string()),
        )
    })
}

/// duplicate-key violations carry their own detail variant so callers can
/// distinguish an idempotency replay from an infrastructure fault
fn classify_exec_err(e: mysql_async::Error) -> AppRepoErrorDetail {
    if let mysql_async::Error::Server(se) = &e {
        if se.code == 1062 {
            return AppRepoErrorDetail::ConstraintViolation(se.to_string());
        }
    }
    AppRepoErrorDetail::DatabaseExec(e.to_string())
}
