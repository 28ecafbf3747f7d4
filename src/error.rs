use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppErrorCode {
    Unknown,
    NotImplemented,
    MissingSysBasePath,
    MissingConfigPath,
    MissingSecretPath,
    MissingDataStore,
    InvalidJsonFormat,
    EmptyInputData, // for internal server error, do NOT dump detail to merchant response
    InvalidInput,   // for frontend client error
    CryptoFailure,
    RemoteDbServerFailure,
    DatabaseServerBusy,
    DataTableNotExist,
    DataCorruption,
    ExceedingMaxLimit,
    AcquireLockFailure,
    ProviderUnavailable,
    LedgerInconsistency,
    IOerror(std::io::ErrorKind),
} // end of AppErrorCode

#[derive(Debug)]
pub struct AppCfgError {
    pub code: AppErrorCode,
    pub detail: Option<String>,
}

#[derive(Debug)]
pub struct AppConfidentialityError {
    pub code: AppErrorCode,
    pub detail: String,
}
