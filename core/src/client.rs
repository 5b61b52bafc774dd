//! Synchronous request builder for the fleet API.
//!
//! # Design
//! A `Client` owns a snapshot of the configuration taken when it was built
//! and a connection opened lazily from that snapshot on first use. Each verb
//! call builds a fresh `RequestDescriptor`, hands it to the connection, and
//! normalizes the outcome: transport failures become
//! `FleetError::Connection`, non-2xx statuses become the matching status
//! variant, and a 2xx response yields its raw body.
//!
//! Options go to the query string for GET/DELETE/HEAD and to the body for
//! PUT/POST. A PUT/POST whose options hold both `querystring` and `body`
//! splits them instead, and every other key is dropped. Empty options set
//! nothing on the descriptor.

use std::sync::OnceLock;

use serde_json::Value;

use crate::config::{self, Configuration, SslOptions};
use crate::connection::{Connection, UreqConnection};
use crate::error::{error_message, FleetError, FleetResult};
use crate::http::{Headers, Options, RequestDescriptor, Response, Verb};

/// Reserved option key holding query parameters for PUT/POST.
pub const QUERYSTRING_KEY: &str = "querystring";

/// Reserved option key holding the body for PUT/POST.
pub const BODY_KEY: &str = "body";

/// Client for a single fleet API endpoint.
#[derive(Debug)]
pub struct Client<C: Connection = UreqConnection> {
    config: Configuration,
    connection: OnceLock<C>,
}

impl Client<UreqConnection> {
    /// Client configured from the current process-wide settings.
    pub fn new() -> Self {
        Self::from_config(config::current())
    }

    /// Client configured from the current process-wide settings with the
    /// recognized keys of `options` overridden.
    pub fn with_options(options: &Options) -> FleetResult<Self> {
        Ok(Self::from_config(config::current().merged(options)?))
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }
}

impl Default for Client<UreqConnection> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connection> Client<C> {
    /// Client with an explicit configuration; the connection opens on first use.
    pub fn from_config(config: Configuration) -> Self {
        Self {
            config,
            connection: OnceLock::new(),
        }
    }

    /// Client with an already-open connection.
    pub fn with_connection(config: Configuration, connection: C) -> Self {
        Self {
            config,
            connection: OnceLock::from(connection),
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Read one of this client's options by name.
    pub fn option(&self, name: &str) -> FleetResult<Value> {
        self.config.get(name)
    }

    pub fn get(&self, path: &str, options: Options, headers: Headers) -> FleetResult<String> {
        self.request(Verb::Get, path, options, headers)
    }

    pub fn delete(&self, path: &str, options: Options, headers: Headers) -> FleetResult<String> {
        self.request(Verb::Delete, path, options, headers)
    }

    pub fn head(&self, path: &str, options: Options, headers: Headers) -> FleetResult<String> {
        self.request(Verb::Head, path, options, headers)
    }

    pub fn put(&self, path: &str, options: Options, headers: Headers) -> FleetResult<String> {
        self.request(Verb::Put, path, options, headers)
    }

    pub fn post(&self, path: &str, options: Options, headers: Headers) -> FleetResult<String> {
        self.request(Verb::Post, path, options, headers)
    }

    /// Build, dispatch and normalize a single request.
    pub fn request(
        &self,
        verb: Verb,
        path: &str,
        options: Options,
        headers: Headers,
    ) -> FleetResult<String> {
        let connection = self.connection()?;

        let mut request = RequestDescriptor::new(verb);
        request.set_path(path);
        request.merge_headers(connection.default_headers());
        request.merge_headers(headers);
        apply_options(&mut request, options)?;

        tracing::debug!(verb = %verb, path, "dispatching fleet request");
        let response = connection.send(request).map_err(|err| {
            tracing::warn!(verb = %verb, path, kind = err.kind(), error = %err, "fleet request failed");
            FleetError::Connection(err.to_string())
        })?;

        check_status(response)
    }

    fn connection(&self) -> FleetResult<&C> {
        if let Some(connection) = self.connection.get() {
            return Ok(connection);
        }
        let connection = C::open(&self.config)?;
        Ok(self.connection.get_or_init(|| connection))
    }
}

/// Populate query parameters and body from `options` according to the verb.
fn apply_options(request: &mut RequestDescriptor, mut options: Options) -> FleetResult<()> {
    if !request.verb().carries_body() {
        if !options.is_empty() {
            request.set_params(options);
        }
        return Ok(());
    }

    if options.contains_key(QUERYSTRING_KEY) && options.contains_key(BODY_KEY) {
        let params = match options.remove(QUERYSTRING_KEY) {
            Some(Value::Object(params)) => params,
            _ => {
                return Err(FleetError::InvalidOptions(format!(
                    "`{QUERYSTRING_KEY}` must be an object"
                )))
            }
        };
        request.set_params(params);
        if let Some(body) = options.remove(BODY_KEY) {
            request.set_body(body);
        }
        return Ok(());
    }

    if !options.is_empty() {
        request.set_body(Value::Object(options));
    }
    Ok(())
}

/// Map non-success status codes to the appropriate `FleetError` variant.
fn check_status(response: Response) -> FleetResult<String> {
    if response.is_success() {
        return Ok(response.body);
    }
    let message = error_message(&response.body);
    Err(match response.status {
        400 => FleetError::BadRequest(message),
        404 => FleetError::NotFound(message),
        409 => FleetError::Conflict(message),
        status @ 500..=599 => FleetError::ServerError { status, message },
        status => FleetError::UnexpectedStatus { status, message },
    })
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Typed construction of a `Client`, starting from the process-wide settings.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    config: Configuration,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            config: config::current(),
        }
    }
}

impl ClientBuilder {
    pub fn fleet_api_url(mut self, url: impl Into<String>) -> Self {
        self.config.fleet_api_url = url.into();
        self
    }

    pub fn open_timeout(mut self, secs: u64) -> Self {
        self.config.open_timeout = secs;
        self
    }

    pub fn read_timeout(mut self, secs: u64) -> Self {
        self.config.read_timeout = secs;
        self
    }

    pub fn ssl_options(mut self, ssl_options: SslOptions) -> Self {
        self.config.ssl_options = ssl_options;
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy.into());
        self
    }

    /// Apply loosely-typed overrides; unrecognized keys are ignored.
    pub fn options(mut self, options: &Options) -> FleetResult<Self> {
        self.config = self.config.merged(options)?;
        Ok(self)
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn build(self) -> Client {
        Client::from_config(self.config)
    }

    /// Build a client around a connection the caller already has.
    pub fn build_with<C: Connection>(self, connection: C) -> Client<C> {
        Client::with_connection(self.config, connection)
    }
}
