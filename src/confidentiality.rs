use std::boxed::Box;
use std::fs::File;
use std::io::BufReader;
use std::marker::{Send, Sync};
use std::result::Result;

use crate::config::{AppConfidentialCfg, AppConfig};
use crate::error::{AppConfidentialityError, AppErrorCode};

pub trait AbstractConfidentiality: Send + Sync {
    // read-only interface to fetch user-defined private data
    fn try_get_payload(&self, id_: &str) -> Result<String, AppConfidentialityError>;
}

pub fn build_context(
    cfg: &AppConfig,
) -> Result<Box<dyn AbstractConfidentiality>, AppConfidentialityError> {
    match &cfg.gateway.confidentiality {
        AppConfidentialCfg::UserSpace { sys_path } => {
            let fullpath = cfg.basepath.system.clone() + sys_path;
            let obj = UserSpaceConfidentiality::build(fullpath);
            Ok(Box::new(obj))
        }
    }
}

/// single local JSON file, each secret addressed by a `/`-separated path of
/// object keys, for dev / test environments
pub struct UserSpaceConfidentiality {
    _src_fullpath: String,
}

impl UserSpaceConfidentiality {
    pub fn build(src_fullpath: String) -> Self {
        Self {
            _src_fullpath: src_fullpath,
        }
    }

    fn load_whole(&self) -> Result<serde_json::Value, AppConfidentialityError> {
        let f = File::open(self._src_fullpath.as_str()).map_err(|e| AppConfidentialityError {
            code: AppErrorCode::IOerror(e.kind()),
            detail: format!("file: {}", self._src_fullpath),
        })?;
        let rdr = BufReader::new(f);
        serde_json::from_reader::<_, serde_json::Value>(rdr).map_err(|e| {
            AppConfidentialityError {
                code: AppErrorCode::InvalidJsonFormat,
                detail: e.to_string(),
            }
        })
    }
} // end of impl UserSpaceConfidentiality

impl AbstractConfidentiality for UserSpaceConfidentiality {
    fn try_get_payload(&self, id_: &str) -> Result<String, AppConfidentialityError> {
        let whole = self.load_whole()?;
        let mut node = &whole;
        for key in id_.split('/').filter(|t| !t.is_empty()) {
            node = node.get(key).ok_or(AppConfidentialityError {
                code: AppErrorCode::MissingSecretPath,
                detail: format!("key: {key}, path: {id_}"),
            })?;
        }
        let out = match node {
            serde_json::Value::String(s) => s.clone(),
            _others => node.to_string(),
        };
        Ok(out)
    }
}
