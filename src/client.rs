// Reporting client: one operation per remote capability, each following the
// same shape: ensure token, build request, transport, parse. Retry and
// backoff policy belongs to the caller; nothing here retries.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::response::{self, RemoteResult, ServiceError};
use crate::session::{Credentials, Session, SessionManager};
use crate::soap::{self, SoapRequest};
use crate::tables::{ReferenceTable, ReferenceTableRow};

// Applied to every transport call unless the configuration overrides it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub credentials: Credentials,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// Counters over the lifetime of one client.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientStats {
    pub requests_sent: usize,
    pub requests_succeeded: usize,
    pub requests_failed: usize,
    pub tokens_issued: usize,
}

// An HTTP POST handed to the transport.
#[derive(Debug, Clone)]
pub struct HttpPost {
    pub url: String,
    pub body: String,
    pub content_type: &'static str,
    pub soap_action: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("client initialization failed: {0}")]
    Init(String),
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn post(&self, request: HttpPost) -> Result<HttpReply, TransportError>;
}

// reqwest-backed transport. Certificate validation stays at the library
// defaults; the per-request timeout comes from the caller.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Init(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: HttpPost) -> Result<HttpReply, TransportError> {
        let HttpPost {
            url,
            body,
            content_type,
            soap_action,
            timeout,
        } = request;

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("SOAPAction", soap_action)
            .timeout(timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(timeout)
                } else {
                    TransportError::Connection(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(HttpReply { status, body })
    }
}

// The single entry point for the four remote operations. Stateless apart
// from the session owned by its `SessionManager` and the stats counters;
// wrap it in an `Arc` to share between callers.
pub struct ReportingClient<T: Transport> {
    config: ClientConfig,
    transport: T,
    session: SessionManager,
    stats: Mutex<ClientStats>,
}

impl<T: Transport> ReportingClient<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            session: SessionManager::new(),
            stats: Mutex::new(ClientStats::default()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn stats(&self) -> ClientStats {
        self.stats.lock().clone()
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.session.current().await
    }

    // Clears the held session; callers invoke this after the remote side
    // rejects the token or credentials, so the next operation re-issues.
    pub async fn invalidate_session(&self) {
        self.session.invalidate().await;
    }

    // Issues a fresh token unconditionally and stores it as the current
    // session. Remote error code, description and detail pass through
    // unchanged.
    pub async fn issue_token(&self) -> RemoteResult<Session> {
        let session = self.request_token().await?;
        self.session.replace(session.clone()).await;
        Ok(session)
    }

    // Lightweight probe that the current token is accepted remotely.
    pub async fn check_authentication(&self) -> RemoteResult<()> {
        let session = self.ensure_session().await?;
        let request = soap::authentication_test(&self.config.credentials.account, &session.token)
            .map_err(build_error)?;
        let body = self.dispatch(request).await?;
        response::parse_authentication_test(&body)
    }

    // Downloads one catalog; rows stay in server order, un-deduplicated.
    pub async fn download_reference_table(
        &self,
        table: ReferenceTable,
    ) -> RemoteResult<Vec<ReferenceTableRow>> {
        let session = self.ensure_session().await?;
        let request = soap::tabella(
            &self.config.credentials.account,
            &session.token,
            table.id(),
        )
        .map_err(build_error)?;
        let body = self.dispatch(request).await?;
        let rows = response::parse_table(&body)?;

        rows.iter()
            .enumerate()
            .map(|(index, raw)| {
                ReferenceTableRow::parse(raw).ok_or_else(|| {
                    ServiceError::Malformed(format!(
                        "table row {index} has fewer than 3 fields: {raw:?}"
                    ))
                })
            })
            .collect()
    }

    // Submits a batch of already-encoded 168-byte lines in one call. The
    // remote side evaluates the whole batch; per-line error strings come
    // back verbatim on the failure value.
    pub async fn submit_records(&self, records: &[String]) -> RemoteResult<()> {
        let session = self.ensure_session().await?;
        let request = soap::send(&self.config.credentials.account, &session.token, records)
            .map_err(build_error)?;
        tracing::info!(records = records.len(), "submitting batch");
        let body = self.dispatch(request).await?;
        response::parse_send(&body)
    }

    // Configuration diagnostic: token, then probe, then the places catalog,
    // stopping at the first failure.
    pub async fn test_connectivity(&self) -> RemoteResult<()> {
        self.issue_token().await?;
        self.check_authentication().await?;
        self.download_reference_table(ReferenceTable::Places).await?;
        Ok(())
    }

    async fn ensure_session(&self) -> RemoteResult<Session> {
        self.session
            .ensure_valid_token(|| self.request_token())
            .await
    }

    async fn request_token(&self) -> RemoteResult<Session> {
        let request = soap::generate_token(&self.config.credentials).map_err(build_error)?;
        let body = self.dispatch(request).await?;
        let grant = response::parse_generate_token(&body)?;

        let session = Session {
            token: grant.token,
            expires_at: grant.expires,
            account: self.config.credentials.account.clone(),
        };
        self.stats.lock().tokens_issued += 1;
        tracing::info!(
            account = %session.account,
            token = %session.redacted_token(),
            expires_at = %session.expires_at,
            "token issued"
        );
        Ok(session)
    }

    async fn dispatch(&self, request: SoapRequest) -> RemoteResult<String> {
        let SoapRequest { action, body } = request;
        let post = HttpPost {
            url: self.config.endpoint.clone(),
            body,
            content_type: soap::CONTENT_TYPE,
            soap_action: action.to_string(),
            timeout: self.config.timeout,
        };

        self.stats.lock().requests_sent += 1;
        tracing::debug!(action, "dispatching request");

        let reply = match self.transport.post(post).await {
            Ok(reply) => reply,
            Err(e) => {
                self.stats.lock().requests_failed += 1;
                return Err(ServiceError::Transport(e.to_string()));
            }
        };

        if !(200..300).contains(&reply.status) {
            self.stats.lock().requests_failed += 1;
            return Err(ServiceError::Transport(format!(
                "unexpected HTTP status {}",
                reply.status
            )));
        }

        self.stats.lock().requests_succeeded += 1;
        Ok(reply.body)
    }
}

fn build_error(e: soap::BuildError) -> ServiceError {
    ServiceError::Request(e.to_string())
}
