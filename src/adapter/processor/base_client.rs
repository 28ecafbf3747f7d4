use std::io::{Error as IoError, ErrorKind};
use std::result::Result;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::client::conn::http1::handshake;
use hyper::header::{HeaderValue, CONTENT_TYPE, HOST};
use hyper::{Error as HyperError, Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio_native_tls::{native_tls, TlsConnector};

use crate::app_log_event;
use crate::logging::{AppLogContext, AppLogLevel};

#[derive(Debug)]
pub enum BaseClientErrorReason {
    TcpNet(ErrorKind, String),
    SysIo(ErrorKind, String),
    Http {
        sender_closed: bool,
        parse_error: bool,
        req_cancelled: bool,
        message_corrupted: bool,
        timeout: bool,
        detail: String,
    },
    HttpRequest(String),
    Tls(String),
    Timeout(u64),
    DeserialiseFailure(String, u16),
}

impl From<IoError> for BaseClientErrorReason {
    fn from(value: IoError) -> Self {
        let ekind = value.kind();
        match &ekind {
            ErrorKind::TimedOut
            | ErrorKind::AddrInUse
            | ErrorKind::NotConnected
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionAborted => Self::TcpNet(ekind, value.to_string()),
            _others => Self::SysIo(ekind, value.to_string()),
        }
    }
}
impl From<HyperError> for BaseClientErrorReason {
    fn from(value: HyperError) -> Self {
        Self::Http {
            sender_closed: value.is_closed(),
            parse_error: value.is_parse_status() | value.is_parse(),
            timeout: value.is_timeout(),
            message_corrupted: value.is_incomplete_message() | value.is_body_write_aborted(),
            req_cancelled: value.is_canceled(),
            detail: value.to_string(),
        }
    }
}
impl From<native_tls::Error> for BaseClientErrorReason {
    fn from(value: native_tls::Error) -> Self {
        Self::Tls(value.to_string())
    }
}

#[derive(Debug)]
pub struct BaseClientError {
    pub reason: BaseClientErrorReason,
}

impl BaseClientError {
    /// timed-out or unreachable peers are worth another channel in the
    /// fallback chain, everything else is not
    pub fn retryable(&self) -> bool {
        match &self.reason {
            BaseClientErrorReason::TcpNet(..) | BaseClientErrorReason::Timeout(_) => true,
            BaseClientErrorReason::Http { timeout, .. } => *timeout,
            _others => false,
        }
    }
}

/// one short-lived HTTP/1 connection per provider round trip, payment
/// gateways sit behind CDNs that close idle upstreams aggressively anyway
pub(crate) struct BaseClient {
    logctx: Arc<AppLogContext>,
    secure_connector: TlsConnector,
    host: String,
    port: u16,
    timeout_secs: u64,
}

impl BaseClient {
    pub(crate) fn try_build(
        logctx: Arc<AppLogContext>,
        host: String,
        port: u16,
        timeout_secs: u64,
    ) -> Result<Self, BaseClientError> {
        let inner = native_tls::TlsConnector::new()
            .map_err(|e| BaseClientError { reason: e.into() })?;
        Ok(Self {
            logctx,
            secure_connector: TlsConnector::from(inner),
            host,
            port,
            timeout_secs,
        })
    }

    pub(crate) async fn execute_json(
        &self,
        path: &str,
        method: Method,
        body: Vec<u8>,
        extra_headers: Vec<(hyper::header::HeaderName, HeaderValue)>,
    ) -> Result<(Vec<u8>, StatusCode), BaseClientError> {
        let fut = self._execute_json(path, method, body, extra_headers);
        tokio::time::timeout(Duration::from_secs(self.timeout_secs), fut)
            .await
            .map_err(|_elapsed| BaseClientError {
                reason: BaseClientErrorReason::Timeout(self.timeout_secs),
            })?
    }

    async fn _execute_json(
        &self,
        path: &str,
        method: Method,
        body: Vec<u8>,
        extra_headers: Vec<(hyper::header::HeaderName, HeaderValue)>,
    ) -> Result<(Vec<u8>, StatusCode), BaseClientError> {
        let logctx_p = &self.logctx;
        let (host, port) = (self.host.as_str(), self.port);
        let tcp_stream = TcpStream::connect((host, port)).await.map_err(|e| {
            app_log_event!(
                logctx_p,
                AppLogLevel::WARNING,
                "tcp-conn-err, {host}:{port}, {:?}",
                &e
            );
            BaseClientError { reason: e.into() }
        })?;
        let tls_stream = self
            .secure_connector
            .connect(host, tcp_stream)
            .await
            .map_err(|e| BaseClientError { reason: e.into() })?;
        let io_adapter = TokioIo::new(tls_stream);
        let (mut req_sender, connector) = handshake(io_adapter)
            .await
            .map_err(|e| BaseClientError { reason: e.into() })?;
        let logctx_cpy = logctx_p.clone();
        tokio::spawn(async move {
            if let Err(e) = connector.await {
                app_log_event!(logctx_cpy, AppLogLevel::WARNING, "conn-driver, {:?}", e);
            }
        });
        let mut req = Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| BaseClientError {
                reason: BaseClientErrorReason::HttpRequest(e.to_string()),
            })?;
        {
            let hdrs = req.headers_mut();
            hdrs.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            for (k, v) in extra_headers {
                hdrs.insert(k, v);
            }
            if let Ok(hv) = HeaderValue::from_str(host) {
                hdrs.insert(HOST, hv);
            }
        }
        let mut resp = req_sender
            .send_request(req)
            .await
            .map_err(|e| BaseClientError { reason: e.into() })?;
        let mut raw_collected = Vec::<u8>::new();
        while let Some(nxt) = resp.frame().await {
            let frm = nxt.map_err(|e| BaseClientError { reason: e.into() })?;
            if let Ok(newchunk) = frm.into_data() {
                raw_collected.extend(newchunk.to_vec());
            }
        }
        let status_code = resp.status();
        if status_code.is_server_error() {
            app_log_event!(
                logctx_p,
                AppLogLevel::WARNING,
                "server:{host}:{port}, path:{path}, status:{status_code}"
            );
        }
        Ok((raw_collected, status_code))
    } // end of fn _execute_json
} // end of impl BaseClient
