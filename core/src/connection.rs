//! The transport seam: the `Connection` trait and its default implementation.
//!
//! # Design
//! The client never touches the network itself. It builds a
//! `RequestDescriptor` and hands it to a `Connection`, which performs the
//! round-trip and returns a `Response` or a `TransportError`. Non-2xx
//! statuses are data, not transport failures; the client interprets them.
//!
//! `UreqConnection` is the blocking transport used by default. Tests swap in
//! their own `Connection` to inspect descriptors without any I/O.

use ureq::tls::TlsConfig;
use ureq::{Agent, RequestBuilder};

use crate::config::Configuration;
use crate::error::{FleetError, FleetResult, TransportError};
use crate::http::{Headers, RequestDescriptor, Response, Verb};

const USER_AGENT: &str = concat!("fleet-core/", env!("CARGO_PKG_VERSION"));

/// Capability that executes a request descriptor.
pub trait Connection: Sized {
    /// Build a connection from a client's resolved configuration.
    fn open(config: &Configuration) -> FleetResult<Self>;

    /// Headers the transport sends unless the caller overrides them.
    fn default_headers(&self) -> Headers {
        Headers::new()
    }

    /// Execute `request` synchronously.
    fn send(&self, request: RequestDescriptor) -> Result<Response, TransportError>;
}

/// Blocking HTTP transport backed by a `ureq` agent.
///
/// The agent pools connections internally, so one `UreqConnection` is meant
/// to live as long as the client that opened it.
#[derive(Debug, Clone)]
pub struct UreqConnection {
    agent: Agent,
    base_url: String,
}

impl UreqConnection {
    /// Absolute URL for `path`. Paths that already carry a scheme are used
    /// as given.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl Connection for UreqConnection {
    fn open(config: &Configuration) -> FleetResult<Self> {
        let tls = TlsConfig::builder()
            .disable_verification(!config.ssl_options.verify)
            .build();
        let mut builder = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(Some(config.open_timeout_duration()))
            .timeout_recv_response(Some(config.read_timeout_duration()))
            .timeout_recv_body(Some(config.read_timeout_duration()))
            .tls_config(tls);
        if let Some(proxy) = &config.proxy {
            let proxy = ureq::Proxy::new(proxy).map_err(|_| FleetError::InvalidValue {
                option: "proxy",
                expected: "a proxy URL",
            })?;
            builder = builder.proxy(Some(proxy));
        }

        tracing::debug!(
            base_url = %config.fleet_api_url,
            open_timeout = config.open_timeout,
            read_timeout = config.read_timeout,
            verify_tls = config.ssl_options.verify,
            "opening fleet connection"
        );

        Ok(Self {
            agent: builder.build().new_agent(),
            base_url: config.fleet_api_url.trim_end_matches('/').to_string(),
        })
    }

    fn default_headers(&self) -> Headers {
        Headers::from([
            ("user-agent".to_string(), USER_AGENT.to_string()),
            ("accept".to_string(), "application/json".to_string()),
        ])
    }

    fn send(&self, request: RequestDescriptor) -> Result<Response, TransportError> {
        let url = self.url_for(request.path());
        let body = request
            .encoded_body()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        let result = match request.verb() {
            Verb::Get => prepare(self.agent.get(&url), &request).call(),
            Verb::Delete => prepare(self.agent.delete(&url), &request).call(),
            Verb::Head => prepare(self.agent.head(&url), &request).call(),
            Verb::Put => send_with_body(prepare(self.agent.put(&url), &request), &request, body),
            Verb::Post => send_with_body(prepare(self.agent.post(&url), &request), &request, body),
        };

        let mut response = result.map_err(transport_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(transport_error)?;

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

/// Apply the descriptor's headers and query parameters.
fn prepare<B>(mut builder: RequestBuilder<B>, request: &RequestDescriptor) -> RequestBuilder<B> {
    for (name, value) in request.headers() {
        builder = builder.header(name.as_str(), value.as_str());
    }
    for (name, value) in request.query_pairs() {
        builder = builder.query(name, value);
    }
    builder
}

fn send_with_body(
    builder: RequestBuilder<ureq::typestate::WithBody>,
    request: &RequestDescriptor,
    body: Option<Vec<u8>>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(bytes) if request.header("content-type").is_none() => builder
            .header("content-type", "application/json")
            .send(&bytes[..]),
        Some(bytes) => builder.send(&bytes[..]),
        None => builder.send_empty(),
    }
}

fn transport_error(err: ureq::Error) -> TransportError {
    let message = err.to_string();
    match err {
        ureq::Error::Timeout(_) => TransportError::Timeout(message),
        ureq::Error::Io(_) | ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            TransportError::ConnectionFailed(message)
        }
        _ => TransportError::Other(message),
    }
}
