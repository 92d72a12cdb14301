//! Collector transports.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hyper::body::HttpBody as _;
use hyper::client::HttpConnector;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Body, Client, Request, Uri};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use telemetry_config::TelemetryConfig;
use telemetry_primitives::{TelemetryEnvelope, TelemetryEvent};
use tracing::debug;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::error::{DeliveryError, DeliveryResult, PublisherError, PublisherResult};

const MAX_ERROR_BODY: usize = 256;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

type CollectorClient = Client<HttpsConnector<HttpConnector>, Body>;

/// A batch ready for delivery: the envelope plus its encoded JSON body.
///
/// The body is encoded once and reused for the retry.
#[derive(Clone, Debug)]
pub struct OutboundBatch {
    envelope: TelemetryEnvelope,
    body: Bytes,
}

impl OutboundBatch {
    /// Wraps drained events in an envelope and encodes it.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Encode`] when serialisation fails.
    pub fn encode(source: &str, events: Vec<TelemetryEvent>) -> DeliveryResult<Self> {
        let envelope = TelemetryEnvelope::new(source, events);
        let body = Bytes::from(serde_json::to_vec(&envelope)?);
        Ok(Self { envelope, body })
    }

    /// Returns the envelope.
    #[must_use]
    pub fn envelope(&self) -> &TelemetryEnvelope {
        &self.envelope
    }

    /// Returns the encoded JSON body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Number of events in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.envelope.len()
    }

    /// Returns `true` for an empty batch.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.envelope.is_empty()
    }
}

/// Destination for encoded batches.
///
/// Implementations make exactly one attempt per call; retry and timeout
/// policy belong to the publisher.
#[async_trait]
pub trait CollectorTransport: Send + Sync {
    /// Delivers one batch.
    async fn deliver(&self, batch: &OutboundBatch) -> DeliveryResult<()>;
}

/// Ships batches to the collector with one HTTP POST each.
pub struct HttpCollector {
    client: CollectorClient,
    endpoint: Uri,
    auth_token: Option<String>,
}

impl fmt::Debug for HttpCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpCollector")
            .field("endpoint", &self.endpoint)
            .field("authenticated", &self.auth_token.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpCollector {
    /// Builds a collector client from the configured URL, path, and token.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherError::Transport`] when no URL is configured or the
    /// endpoint does not parse.
    pub fn new(config: &TelemetryConfig) -> PublisherResult<Self> {
        let endpoint = config
            .endpoint()
            .ok_or_else(|| PublisherError::transport("collector URL is not configured"))?
            .parse::<Uri>()
            .map_err(|err| PublisherError::transport(format!("invalid collector endpoint: {err}")))?;

        Ok(Self {
            client: collector_client(config.delivery_timeout()),
            endpoint,
            auth_token: config.auth_token().map(str::to_owned),
        })
    }

    /// Returns the batch endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    fn build_request(&self, batch: &OutboundBatch) -> DeliveryResult<Request<Body>> {
        let mut builder =
            Request::post(self.endpoint.clone()).header(CONTENT_TYPE, "application/json");
        if let Some(token) = &self.auth_token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
            .body(Body::from(batch.body().clone()))
            .map_err(|err| DeliveryError::transport(format!("failed to build request: {err}")))
    }
}

/// One pooled client per collector; both `http://` and `https://` endpoints
/// are accepted, TLS trusting the webpki roots.
fn collector_client(connect_timeout: Duration) -> CollectorClient {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));
    let tls = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut tcp = HttpConnector::new();
    tcp.enforce_http(false);
    tcp.set_nodelay(true);
    tcp.set_connect_timeout(Some(connect_timeout));

    Client::builder()
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(2)
        .build(HttpsConnector::from((tcp, Arc::new(tls))))
}

#[async_trait]
impl CollectorTransport for HttpCollector {
    async fn deliver(&self, batch: &OutboundBatch) -> DeliveryResult<()> {
        let request = self.build_request(batch)?;
        let response = self
            .client
            .request(request)
            .await
            .map_err(|err| DeliveryError::transport(format!("collector request failed: {err}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(DeliveryError::Status {
            status: status.as_u16(),
            reason: error_reason(response.into_body()).await,
        })
    }
}

/// Reads at most [`MAX_ERROR_BODY`] bytes of an error response; the rest of
/// the body is never pulled off the connection.
async fn error_reason(mut body: Body) -> String {
    let mut head = Vec::with_capacity(MAX_ERROR_BODY);
    while head.len() < MAX_ERROR_BODY {
        match body.data().await {
            Some(Ok(chunk)) => {
                let take = chunk.len().min(MAX_ERROR_BODY - head.len());
                head.extend_from_slice(&chunk[..take]);
            }
            Some(Err(err)) => {
                debug!(%err, "error response body unreadable");
                break;
            }
            None => break,
        }
    }

    let mut reason = String::from_utf8_lossy(&head).into_owned();
    if reason.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !reason.is_char_boundary(cut) {
            cut -= 1;
        }
        reason.truncate(cut);
    }
    reason
}
