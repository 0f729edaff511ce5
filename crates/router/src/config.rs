//! Declarative router configuration.
//!
//! [`RouterConfig`] is the validated, immutable description of a router
//! instance. It is rendered to a versioned [`RouterDocument`] which is what the
//! router process reads from disk; the router validates the document again on
//! load before binding anything.

use std::net::Ipv6Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Serializers the router knows how to negotiate.
pub const SUPPORTED_SERIALIZERS: &[&str] = &["cbor", "json", "msgpack", "ubjson"];

/// Version of the configuration document format.
pub const DOCUMENT_VERSION: u32 = 2;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 61000;
const DEFAULT_REALM: &str = "keel";
const DEFAULT_SERIALIZER: &str = "msgpack";
const DEFAULT_TITLE: &str = "Keel";

/// Actions a role may perform on matching URIs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allow {
    /// Call procedures.
    pub call: bool,

    /// Register procedures.
    pub register: bool,

    /// Publish events.
    pub publish: bool,

    /// Subscribe to topics.
    pub subscribe: bool,
}

impl Allow {
    /// Allows every action.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            call: true,
            register: true,
            publish: true,
            subscribe: true,
        }
    }
}

/// A permission granted to a role for a URI pattern.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// URI pattern, `*` matches everything.
    pub uri: String,

    /// Allowed actions.
    pub allow: Allow,
}

/// A named role within a realm.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role name.
    pub name: String,

    /// Permissions of the role.
    pub permissions: Vec<Permission>,
}

impl Role {
    /// The anonymous role with wildcard access, used when nothing else is configured.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            name: "anonymous".to_string(),
            permissions: vec![Permission {
                uri: "*".to_string(),
                allow: Allow::all(),
            }],
        }
    }
}

/// Validated configuration for a single router instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouterConfig {
    allowed_origins: Vec<String>,
    enable_status: bool,
    host: String,
    port: u16,
    realm: String,
    roles: Vec<Role>,
    serializers: Vec<String>,
    title: String,
}

impl RouterConfig {
    /// Starts building a configuration for the given listen address and realm.
    #[must_use]
    pub fn builder(host: impl Into<String>, port: u16, realm: impl Into<String>) -> RouterConfigBuilder {
        RouterConfigBuilder::new(host, port, realm)
    }

    /// Builds a configuration in one call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if any input is invalid.
    pub fn build<S, O>(
        host: impl Into<String>,
        port: u16,
        realm: impl Into<String>,
        serializers: S,
        allowed_origins: O,
        enable_status: bool,
    ) -> Result<Self>
    where
        S: IntoIterator,
        S::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self::builder(host, port, realm)
            .serializers(serializers)
            .allowed_origins(allowed_origins)
            .enable_status(enable_status)
            .build()
    }

    /// Origins allowed to open websocket sessions; `*` allows any.
    #[must_use]
    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }

    /// Whether the plain-HTTP status document is served.
    #[must_use]
    pub const fn enable_status(&self) -> bool {
        self.enable_status
    }

    /// Listen host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Listen port. Port 0 lets the router pick a free port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Realm name.
    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Roles of the realm.
    #[must_use]
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Serializers offered to clients, in order of preference.
    #[must_use]
    pub fn serializers(&self) -> &[String] {
        &self.serializers
    }

    /// Router title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Websocket URL clients connect to.
    #[must_use]
    pub fn url(&self) -> String {
        ws_url(&self.host, self.port)
    }

    /// Whether a websocket origin is allowed.
    #[must_use]
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == "*" || allowed.eq_ignore_ascii_case(origin))
    }

    /// Renders the declarative document read by the router process.
    #[must_use]
    pub fn to_document(&self) -> RouterDocument {
        RouterDocument {
            version: DOCUMENT_VERSION,
            workers: vec![Worker::Router(RouterWorker {
                options: WorkerOptions {
                    title: self.title.clone(),
                },
                transports: vec![Transport::Websocket(WebsocketTransport {
                    serializers: self.serializers.clone(),
                    endpoint: Endpoint::Tcp {
                        interface: self.host.clone(),
                        port: self.port,
                    },
                    url: self.url(),
                    options: TransportOptions {
                        allowed_origins: self.allowed_origins.clone(),
                        enable_webstatus: self.enable_status,
                    },
                })],
                components: Vec::new(),
                realms: vec![Realm {
                    name: self.realm.clone(),
                    roles: self.roles.clone(),
                }],
            })],
        }
    }

    /// Renders the document as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized.
    pub fn document_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.to_document())?)
    }

    /// Writes the rendered document to `path` as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn write_document(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.document_bytes()?).map_err(|e| Error::Io("failed to write router config", e))
    }

    /// Reads and validates a document written by [`write_document`](Self::write_document).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not a valid document,
    /// or describes an invalid configuration.
    pub fn read_document(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).map_err(|e| Error::Io("failed to read router config", e))?;
        let document: RouterDocument = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Configuration(format!("malformed document: {e}")))?;

        Self::try_from(document)
    }
}

impl TryFrom<RouterDocument> for RouterConfig {
    type Error = Error;

    fn try_from(document: RouterDocument) -> Result<Self> {
        if document.version != DOCUMENT_VERSION {
            return Err(Error::Configuration(format!(
                "unsupported document version {}",
                document.version
            )));
        }

        let [Worker::Router(worker)] = <[Worker; 1]>::try_from(document.workers)
            .map_err(|_| Error::Configuration("expected exactly one router worker".into()))?;

        let [Transport::Websocket(transport)] = <[Transport; 1]>::try_from(worker.transports)
            .map_err(|_| Error::Configuration("expected exactly one transport".into()))?;

        let [realm] = <[Realm; 1]>::try_from(worker.realms)
            .map_err(|_| Error::Configuration("expected exactly one realm".into()))?;

        let Endpoint::Tcp { interface, port } = transport.endpoint;

        let config = RouterConfigBuilder::new(interface, port, realm.name)
            .serializers(transport.serializers)
            .allowed_origins(transport.options.allowed_origins)
            .enable_status(transport.options.enable_webstatus)
            .title(worker.options.title)
            .roles(realm.roles)
            .build()?;

        if transport.url != config.url() {
            return Err(Error::Configuration(format!(
                "transport url {} does not match endpoint {}",
                transport.url,
                config.url()
            )));
        }

        Ok(config)
    }
}

/// Builder for [`RouterConfig`].
#[derive(Clone, Debug)]
pub struct RouterConfigBuilder {
    allowed_origins: Vec<String>,
    enable_status: bool,
    host: String,
    port: u16,
    realm: String,
    roles: Vec<Role>,
    serializers: Vec<String>,
    title: String,
}

impl Default for RouterConfigBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT, DEFAULT_REALM)
    }
}

impl RouterConfigBuilder {
    /// Creates a builder with default serializers, origins and permissions.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, realm: impl Into<String>) -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            enable_status: false,
            host: host.into(),
            port,
            realm: realm.into(),
            roles: vec![Role::anonymous()],
            serializers: vec![DEFAULT_SERIALIZER.to_string()],
            title: DEFAULT_TITLE.to_string(),
        }
    }

    /// Sets the allowed websocket origins.
    #[must_use]
    pub fn allowed_origins<I>(mut self, origins: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.allowed_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Enables or disables the status document.
    #[must_use]
    pub const fn enable_status(mut self, enable_status: bool) -> Self {
        self.enable_status = enable_status;
        self
    }

    /// Replaces the realm's roles.
    #[must_use]
    pub fn roles(mut self, roles: Vec<Role>) -> Self {
        self.roles = roles;
        self
    }

    /// Sets the serializers, in order of preference.
    #[must_use]
    pub fn serializers<I>(mut self, serializers: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.serializers = serializers.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the router title.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Validates the inputs and produces the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the host or realm is empty, the realm
    /// contains characters outside `[A-Za-z0-9_.-]`, the serializer list is
    /// empty or names an unsupported serializer, or no origin is allowed.
    pub fn build(self) -> Result<RouterConfig> {
        if self.host.trim().is_empty() {
            return Err(Error::Configuration("host must not be empty".into()));
        }

        validate_realm(&self.realm)?;

        if self.serializers.is_empty() {
            return Err(Error::Configuration(
                "at least one serializer is required".into(),
            ));
        }

        if let Some(unknown) = self
            .serializers
            .iter()
            .find(|s| !SUPPORTED_SERIALIZERS.contains(&s.as_str()))
        {
            return Err(Error::Configuration(format!(
                "unsupported serializer '{unknown}'"
            )));
        }

        if self.allowed_origins.is_empty() {
            return Err(Error::Configuration(
                "at least one allowed origin is required".into(),
            ));
        }

        Ok(RouterConfig {
            allowed_origins: self.allowed_origins,
            enable_status: self.enable_status,
            host: self.host,
            port: self.port,
            realm: self.realm,
            roles: self.roles,
            serializers: self.serializers,
            title: self.title,
        })
    }
}

fn validate_realm(realm: &str) -> Result<()> {
    if realm.is_empty() {
        return Err(Error::Configuration("realm must not be empty".into()));
    }

    if let Some(c) = realm
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(Error::Configuration(format!(
            "realm '{realm}' contains invalid character {c:?}"
        )));
    }

    if realm.starts_with('.') || realm.ends_with('.') || realm.contains("..") {
        return Err(Error::Configuration(format!(
            "realm '{realm}' has an empty component"
        )));
    }

    Ok(())
}

/// On-disk configuration document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterDocument {
    /// Document format version.
    pub version: u32,

    /// Workers to run.
    pub workers: Vec<Worker>,
}

/// A worker entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Worker {
    /// A routing worker.
    Router(RouterWorker),
}

/// Router worker settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterWorker {
    /// Worker options.
    pub options: WorkerOptions,

    /// Listening transports.
    pub transports: Vec<Transport>,

    /// Embedded components. Always empty.
    pub components: Vec<serde_json::Value>,

    /// Realms served by the worker.
    pub realms: Vec<Realm>,
}

/// Worker options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerOptions {
    /// Title shown in status output.
    pub title: String,
}

/// A listening transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transport {
    /// Websocket transport.
    Websocket(WebsocketTransport),
}

/// Websocket transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsocketTransport {
    /// Offered serializers.
    pub serializers: Vec<String>,

    /// Listening endpoint.
    pub endpoint: Endpoint,

    /// Public URL of the transport.
    pub url: String,

    /// Transport options.
    pub options: TransportOptions,
}

/// Listening endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Endpoint {
    /// TCP listener.
    Tcp {
        /// Interface to bind.
        interface: String,

        /// Port to bind.
        port: u16,
    },
}

/// Websocket transport options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportOptions {
    /// Allowed origins.
    pub allowed_origins: Vec<String>,

    /// Whether to serve the status document.
    pub enable_webstatus: bool,
}

/// A realm and its roles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Realm {
    /// Realm name.
    pub name: String,

    /// Roles.
    pub roles: Vec<Role>,
}

/// Websocket URL for `host:port`, bracketing IPv6 literals.
pub(crate) fn ws_url(host: &str, port: u16) -> String {
    if host.parse::<Ipv6Addr>().is_ok() {
        format!("ws://[{host}]:{port}")
    } else {
        format!("ws://{host}:{port}")
    }
}
