//!
//! Library for deploying workloads to an Eru core.
//!
//! ## Client
//! The first interaction is to connect to the core
//! ```no_run
//! #[tokio::main]
//! async fn main() -> Result<(), eru_client::Error> {
//!     use eru_client::ClientBuilder;
//!
//!     // Core CA certificate loaded
//!     let ca_cert = std::fs::read("ca.pem")?;
//!
//!     let client = ClientBuilder::new()
//!         .add_root_certificate(&ca_cert)?
//!         .bearer_token("secret token")
//!         .connect("https://core.example.net:5001")?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Deploy
//! ### Build a request from a spec document and drain the results
//! ```no_run
//! #[tokio::main]
//! async fn main() -> Result<(), eru_client::Error> {
//!     use eru_client::deploy::{self, consumer::TracingReporter, DeployRequest, Overrides};
//!     use eru_client::source::SpecSource;
//!
//!     let client = eru_client::Client::builder().connect("https://core.example.net:5001")?;
//!
//!     let document = SpecSource::parse("app.yaml")?.fetch().await?;
//!     let specs = document.parse()?;
//!
//!     let overrides = Overrides {
//!         pod: "prod".into(),
//!         entrypoint: "web".into(),
//!         image: "repo/app:1.0".into(),
//!         network: "mynet".into(),
//!         count: 2,
//!         ..Default::default()
//!     };
//!     let request = DeployRequest::build(&specs, &overrides)?;
//!
//!     let summary = deploy::deploy(
//!         &client,
//!         &request,
//!         &mut TracingReporter,
//!         std::future::pending::<()>(),
//!     )
//!     .await?;
//!
//!     println!("{} succeeded, {} failed", summary.succeeded, summary.failed);
//!     Ok(())
//! }
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod deploy;
pub mod network;
pub mod source;
pub mod specs;

type WebSocketStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Error returned by client functions
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The spec document could not be decoded
    #[error("Malformed spec: {0}")]
    MalformedSpec(String),

    /// The requested entrypoint is not declared in the spec
    #[error("Entrypoint '{0}' not found in spec")]
    EntrypointNotFound(String),

    /// A required deploy parameter was empty
    #[error("Missing required field '{0}'")]
    MissingRequiredField(&'static str),

    /// A published or health check port could not be decoded
    #[error("Invalid port spec '{0}'")]
    InvalidPortSpec(String),

    /// Failed returned by the HTTP server
    #[error("HTTP failed {0}, {1}")]
    WebServer(u16, String),

    /// Websocket error
    #[error("Websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("Serde JSON error: {0}")]
    Serde(#[from] serde_json::Error),

    /// URL parsing error
    #[error("URL: {0}")]
    URL(#[from] url::ParseError),

    /// HTTP client error
    #[error("Reqwest: {0}")]
    HTTPClient(#[from] reqwest::Error),

    /// The core refused the request or sent something we can't understand
    #[error("RPC error {0:?}")]
    Rpc(Option<String>),

    /// The caller cancelled the operation
    #[error("Cancelled")]
    Cancelled,

    /// TLS Errors
    #[error("TLS error {0}")]
    TLS(String),

    /// IO Errors
    #[error("IO error {0}")]
    IO(#[from] std::io::Error),

    /// General Error
    #[error("Error {0}")]
    General(String),
}

impl Error {
    /// Returns true for errors raised while talking to the core, cancellation included.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::WebSocket(_)
                | Self::HTTPClient(_)
                | Self::WebServer(..)
                | Self::Rpc(_)
                | Self::Cancelled
                | Self::Serde(_)
        )
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Builder for an Eru [`Client`]
#[derive(Clone, Default)]
pub struct ClientBuilder {
    root_certificates: Vec<Vec<u8>>,
    bearer_token: Option<String>,
}

impl ClientBuilder {
    /// Create a new builder instance
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root_certificates: Vec::new(),
            bearer_token: None,
        }
    }

    /// Add one or more PEM encoded root certificates for core certificate verification
    pub fn add_root_certificate(mut self, cert: &[u8]) -> Result<Self> {
        let mut reader = cert;
        let certs = rustls_pemfile::certs(&mut reader)?;
        if certs.is_empty() {
            return Err(Error::TLS("no PEM certificate found".to_string()));
        }
        self.root_certificates.extend(certs);
        Ok(self)
    }

    /// Send a bearer token when opening calls
    #[must_use]
    pub fn bearer_token(self, token: &str) -> Self {
        Self {
            bearer_token: Some(token.to_string()),
            ..self
        }
    }

    /// Create a client for the core at `host`, e.g. `https://core:5001`.
    /// No connection is opened until a call is made.
    pub fn connect(&self, host: &str) -> Result<Client> {
        let base_url = url::Url::parse(host)?;
        let ws_scheme = match base_url.scheme() {
            "https" => "wss",
            "http" => "ws",
            scheme => return Err(Error::General(format!("Unsupported scheme '{scheme}'"))),
        };
        let websocket_url =
            url::Url::parse(&format!("{ws_scheme}://{}/v1/ws/", base_url.host_port()?))?;

        let tls_config = if self.root_certificates.is_empty() {
            None
        } else {
            let mut roots = tokio_rustls::rustls::RootCertStore::empty();
            let (added, ignored) = roots.add_parsable_certificates(&self.root_certificates[..]);
            tracing::debug!("root certificates added: {}, ignored: {}", added, ignored);
            if added == 0 {
                return Err(Error::TLS("no usable root certificate".to_string()));
            }
            let config = tokio_rustls::rustls::ClientConfig::builder()
                .with_safe_defaults()
                .with_root_certificates(roots)
                .with_no_client_auth();
            Some(std::sync::Arc::new(config))
        };

        Ok(Client {
            base_url,
            websocket_url,
            bearer_token: self.bearer_token.clone(),
            tls_config,
        })
    }
}

/// The `Client` is used for all interaction with an Eru core.
/// Use [`ClientBuilder::connect`] to create an instance.
#[derive(Clone)]
pub struct Client {
    base_url: url::Url,
    websocket_url: url::Url,
    bearer_token: Option<String>,
    tls_config: Option<std::sync::Arc<tokio_rustls::rustls::ClientConfig>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("websocket_url", &self.websocket_url)
            .field("custom_roots", &self.tls_config.is_some())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a Client builder
    #[must_use]
    pub const fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The core address this client talks to
    #[must_use]
    pub const fn base_url(&self) -> &url::Url {
        &self.base_url
    }

    /// Opens a websocket to `path` below the core websocket root
    pub(crate) async fn open_websocket(&self, path: &str) -> Result<WebSocketStream> {
        use tokio_tungstenite::tungstenite::client::IntoClientRequest;

        let ws_url = self.websocket_url.join(path)?;
        tracing::debug!("Opening websocket {}", ws_url);
        let mut request = ws_url.into_client_request()?;
        if let Some(token) = &self.bearer_token {
            request.headers_mut().insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&format!("Bearer {token}")).map_err(
                    |_e| Error::General("Failed to set Authorization header".to_string()),
                )?,
            );
        }

        let connector = self
            .tls_config
            .clone()
            .map(tokio_tungstenite::Connector::Rustls);
        let (ws, _) =
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector)
                .await?;
        Ok(ws)
    }

    /// Submit a deploy request and return the stream of per-instance outcomes
    pub async fn create_workload(
        &self,
        request: &deploy::DeployRequest,
    ) -> Result<deploy::stream::WorkloadStream> {
        deploy::stream::WorkloadStream::open(self, request).await
    }
}

pub(crate) trait URLExt {
    fn host_port(&self) -> std::result::Result<String, url::ParseError>;
}

impl URLExt for url::Url {
    fn host_port(&self) -> std::result::Result<String, url::ParseError> {
        let host = self.host_str().ok_or(url::ParseError::EmptyHost)?;
        Ok(match (host, self.port()) {
            (host, Some(port)) => format!("{host}:{port}"),
            (host, _) => host.to_string(),
        })
    }
}
