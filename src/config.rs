use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::result::Result;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{AppCfgError, AppErrorCode};
use crate::logging::{AppLogAlias, AppLogDestination, AppLogLevel};

pub mod env_vars {
    pub const SYS_BASEPATH: &str = "SYS_BASE_PATH";
    pub const CFG_FILEPATH: &str = "CONFIG_FILE_PATH";
    pub const EXPECTED_LABELS: [&str; 2] = [SYS_BASEPATH, CFG_FILEPATH];
}

#[derive(Deserialize)]
pub struct AppLogHandlerCfg {
    pub min_level: AppLogLevel,
    pub destination: AppLogDestination,
    pub alias: AppLogAlias,
    pub path: Option<String>,
}

#[derive(Deserialize)]
pub struct AppLoggerCfg {
    pub alias: AppLogAlias,
    pub handlers: Vec<AppLogAlias>,
    pub level: Option<AppLogLevel>,
}

#[derive(Deserialize)]
pub struct AppLoggingCfg {
    pub handlers: Vec<AppLogHandlerCfg>,
    pub loggers: Vec<AppLoggerCfg>,
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Deserialize, PartialEq, Eq)]
pub enum AppDbServerType {
    MariaDB,
    PostgreSQL,
}

#[derive(Deserialize)]
pub struct AppDbServerCfg {
    pub alias: String,
    pub srv_type: AppDbServerType,
    pub db_name: String,
    pub confidentiality_path: String,
    pub max_conns: u32,
    pub idle_timeout_secs: u16,
}

#[derive(Deserialize)]
pub enum AppDataStoreCfg {
    DbServer(AppDbServerCfg),
}

#[derive(Deserialize)]
pub struct AppAmqpAttriCfg {
    pub vhost: String,
    pub max_channels: u16,
    pub timeout_secs: u16,
}

#[derive(Deserialize)]
pub struct AppQueueAmqpCfg {
    pub attributes: AppAmqpAttriCfg,
    pub max_connections: u16,
    pub confidential_id: String,
}

/// backing store of the durable job / webhook queues, the in-memory variant
/// exists for unit tests and single-process dev setups only, it does not
/// survive a crash
#[allow(clippy::upper_case_acronyms)]
#[derive(Deserialize)]
pub enum AppQueueCfg {
    AMQP(AppQueueAmqpCfg),
    InMemory,
}

#[derive(Deserialize)]
pub enum AppLedgerCfg {
    InMemory,
}

#[allow(non_camel_case_types)]
#[derive(Deserialize)]
pub enum App3rdPartyCfg {
    dev {
        name: String,
        host: String,
        port: u16,
        confidentiality_path: String,
    },
    test {
        name: String,
    },
}

#[derive(Deserialize)]
pub enum AppCallbackCfg {
    HttpClient,
    Discard, // test mode, merchant notification silently dropped
}

#[derive(Deserialize)]
pub enum AppConfidentialCfg {
    UserSpace { sys_path: String },
}

#[derive(Deserialize, Clone, Copy)]
pub struct AppThroughputCfg {
    pub system_rps: u32,
    pub default_merchant_rps: u32,
    pub default_channel_rps: u32,
}

#[derive(Deserialize, Clone, Copy)]
pub struct AppMonitorCfg {
    pub payin_expiry_secs: u32,
    pub payout_poll_interval_secs: u32,
    pub payout_poll_max_attempts: u16,
}

#[derive(Deserialize)]
pub struct AppGatewayCfg {
    pub logging: AppLoggingCfg,
    pub data_store: Vec<AppDataStoreCfg>,
    pub queue: AppQueueCfg,
    pub ledger: AppLedgerCfg,
    pub providers: Vec<Arc<App3rdPartyCfg>>,
    pub callback: AppCallbackCfg,
    pub confidentiality: AppConfidentialCfg,
    pub limits: AppThroughputCfg,
    pub monitor: AppMonitorCfg,
    pub stack_sz_kb: u16,
}

pub struct AppBasepathCfg {
    pub system: String,
}

pub struct AppConfig {
    pub basepath: AppBasepathCfg,
    pub gateway: AppGatewayCfg,
}

pub struct AppCfgInitArgs {
    pub env_var_map: HashMap<String, String>,
}

impl AppConfig {
    pub fn new(args: AppCfgInitArgs) -> Result<Self, AppCfgError> {
        let AppCfgInitArgs { env_var_map } = args;
        let sys_basepath = env_var_map
            .get(env_vars::SYS_BASEPATH)
            .ok_or(AppCfgError {
                code: AppErrorCode::MissingSysBasePath,
                detail: None,
            })?
            .clone();
        let cfg_relpath = env_var_map
            .get(env_vars::CFG_FILEPATH)
            .ok_or(AppCfgError {
                code: AppErrorCode::MissingConfigPath,
                detail: None,
            })?;
        let fullpath = {
            let mut p = sys_basepath.clone();
            if !p.ends_with('/') && !cfg_relpath.starts_with('/') {
                p += "/";
            }
            p + cfg_relpath.as_str()
        };
        let gateway = Self::parse_from_file(fullpath.as_str())?;
        Ok(Self {
            basepath: AppBasepathCfg {
                system: sys_basepath,
            },
            gateway,
        })
    } // end of fn new

    fn parse_from_file(fullpath: &str) -> Result<AppGatewayCfg, AppCfgError> {
        let f = File::open(fullpath).map_err(|e| AppCfgError {
            code: AppErrorCode::IOerror(e.kind()),
            detail: Some(format!("file: {fullpath}")),
        })?;
        let rdr = BufReader::new(f);
        let out = serde_json::from_reader::<_, AppGatewayCfg>(rdr).map_err(|e| AppCfgError {
            code: AppErrorCode::InvalidJsonFormat,
            detail: Some(e.to_string()),
        })?;
        if out.data_store.is_empty() {
            return Err(AppCfgError {
                code: AppErrorCode::MissingDataStore,
                detail: None,
            });
        }
        Ok(out)
    }
} // end of impl AppConfig
