use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

use super::params;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("missing '://' separator in {0:?}")]
    MissingScheme(String),
    #[error("empty protocol in {0:?}")]
    EmptyProtocol(String),
    #[error("empty host in {0:?}")]
    EmptyHost(String),
    #[error("invalid port {port:?} in {text:?}")]
    InvalidPort { text: String, port: String },
}

/// One advertised endpoint plus its parameter map.
///
/// Immutable by convention: the registry clones a descriptor at every boundary and
/// never mutates a caller's copy. Equality and hashing only look at
/// protocol/host/port/path, so a re-registration with new parameters replaces the
/// stale copy in any set keyed by descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceDescriptor {
    protocol: String,
    host: String,
    port: Option<u16>,
    path: String,
    parameters: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    pub fn new(protocol: &str, host: &str, port: u16, path: &str) -> Self {
        Self {
            protocol: protocol.to_string(),
            host: host.to_string(),
            port: Some(port),
            path: path.trim_start_matches('/').to_string(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<String>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The serviceId.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn service_id(&self) -> &str {
        &self.path
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// Non-blank parameter value.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .map(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }

    pub fn parameter_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.parameter(key).unwrap_or(default)
    }

    /// Parameter value, falling back to the declared default for matching attributes.
    pub fn attribute(&self, key: &str) -> &str {
        self.parameter_or(key, params::default_value(key))
    }

    pub fn bool_parameter(&self, key: &str, default: bool) -> bool {
        match self.parameter(key) {
            Some(value) => value.trim().eq_ignore_ascii_case("true"),
            None => default,
        }
    }

    pub fn set_parameter(&mut self, key: &str, value: impl Into<String>) {
        self.parameters.insert(key.to_string(), value.into());
    }

    /// Inserts only when the key is absent or blank.
    pub fn set_parameter_if_absent(&mut self, key: &str, value: impl Into<String>) {
        if self.parameter(key).is_none() {
            self.parameters.insert(key.to_string(), value.into());
        }
    }

    pub fn remove_parameter(&mut self, key: &str) -> Option<String> {
        self.parameters.remove(key)
    }

    /// `protocol://host:port/path` without parameters. Keys the stability map and the
    /// cross-node `stability-changed` hint.
    pub fn identity(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}/{}", self.protocol, self.host, port, self.path),
            None => format!("{}://{}/{}", self.protocol, self.host, self.path),
        }
    }

    /// Full text form including parameters.
    pub fn to_full_string(&self) -> String {
        let mut out = self.identity();
        if !self.parameters.is_empty() {
            out.push('?');
            for (key, value) in &self.parameters {
                out.push_str(key);
                out.push('=');
                out.push_str(value);
                out.push('&');
            }
            out.pop();
        }
        out
    }

    /// Descriptors with a blank protocol, host or path are treated like a missing argument.
    pub fn is_well_formed(&self) -> bool {
        !self.protocol.is_empty() && !self.host.is_empty() && !self.path.is_empty()
    }
}

impl PartialEq for ServiceDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.protocol == other.protocol
            && self.host == other.host
            && self.port == other.port
            && self.path == other.path
    }
}

impl Eq for ServiceDescriptor {}

impl Hash for ServiceDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.protocol.hash(state);
        self.host.hash(state);
        self.port.hash(state);
        self.path.hash(state);
    }
}

impl fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_full_string())
    }
}

impl FromStr for ServiceDescriptor {
    type Err = DescriptorError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        let (protocol, rest) = text
            .split_once("://")
            .ok_or_else(|| DescriptorError::MissingScheme(text.to_string()))?;
        if protocol.is_empty() {
            return Err(DescriptorError::EmptyProtocol(text.to_string()));
        }

        let (rest, query) = match rest.split_once('?') {
            Some((rest, query)) => (rest, Some(query)),
            None => (rest, None),
        };
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));

        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| DescriptorError::InvalidPort {
                    text: text.to_string(),
                    port: port.to_string(),
                })?;
                (host, Some(port))
            }
            None => {
                let port = params::default_port(protocol);
                if port.is_none() {
                    tracing::error!(
                        "Unknown protocol {:?} without explicit port in {:?}",
                        protocol,
                        text
                    );
                }
                (authority, port)
            }
        };
        if host.is_empty() {
            return Err(DescriptorError::EmptyHost(text.to_string()));
        }

        let mut parameters = BTreeMap::new();
        for pair in query.unwrap_or_default().split('&') {
            if pair.is_empty() {
                continue;
            }
            match pair.split_once('=') {
                Some((key, value)) => parameters.insert(key.to_string(), value.to_string()),
                None => parameters.insert(pair.to_string(), String::new()),
            };
        }

        Ok(Self {
            protocol: protocol.to_string(),
            host: host.to_string(),
            port,
            path: path.to_string(),
            parameters,
        })
    }
}

impl TryFrom<String> for ServiceDescriptor {
    type Error = DescriptorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServiceDescriptor> for String {
    fn from(value: ServiceDescriptor) -> Self {
        value.to_full_string()
    }
}
