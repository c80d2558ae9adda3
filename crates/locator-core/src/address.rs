//! Endpoint addresses.
//!
//! An [`Address`] is how a client reaches an adapter or an object: a set of
//! [`Endpoint`]s, optionally bound to the adapter that owns them and to the
//! identity of a single object. The protocol never looks inside endpoints; it
//! only re-scopes addresses to an identity and merges the endpoint sets of
//! several replicas into one address.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{AdapterName, Error, Identity};

/// A single transport endpoint, written `protocol://host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(protocol: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
            port,
        }
    }

    /// Shorthand for a `tcp` endpoint.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new("tcp", host, port)
    }

    /// Parses `protocol://host:port`.
    ///
    /// IPv6 hosts keep their brackets, e.g. `udp://[::1]:4061`.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let (protocol, rest) = s
            .split_once("://")
            .ok_or_else(|| Error::InvalidEndpoint(format!("missing protocol in '{}'", s)))?;
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidEndpoint(format!("missing port in '{}'", s)))?;

        if protocol.is_empty() || host.is_empty() {
            return Err(Error::InvalidEndpoint(format!(
                "protocol and host are required in '{}'",
                s
            )));
        }

        let port = port
            .parse::<u16>()
            .map_err(|e| Error::InvalidEndpoint(format!("invalid port in '{}': {}", s, e)))?;

        Ok(Self::new(protocol, host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// How to reach an adapter or an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    identity: Option<Identity>,
    adapter: Option<AdapterName>,
    endpoints: Vec<Endpoint>,
}

impl Address {
    /// Creates an address for the given endpoints, not bound to any adapter or object.
    ///
    /// Duplicate endpoints are dropped, keeping first-seen order.
    pub fn new(endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        let mut address = Self {
            identity: None,
            adapter: None,
            endpoints: Vec::new(),
        };
        address.extend_endpoints(endpoints);
        address
    }

    /// Creates the address of an adapter.
    pub fn for_adapter(adapter: AdapterName, endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        Self::new(endpoints).with_adapter(adapter)
    }

    /// Returns a copy of this address scoped to a single object.
    pub fn with_identity(&self, identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            ..self.clone()
        }
    }

    /// Binds this address to an adapter.
    pub fn with_adapter(mut self, adapter: AdapterName) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn adapter(&self) -> Option<&AdapterName> {
        self.adapter.as_ref()
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Merges the endpoint sets of several addresses of the same adapter.
    ///
    /// The first address supplies the identity and adapter binding of the
    /// result; the endpoint set is the union of all inputs in first-seen
    /// order. Returns `None` for an empty input.
    pub fn merge<'a>(addresses: impl IntoIterator<Item = &'a Address>) -> Option<Address> {
        let mut iter = addresses.into_iter();
        let mut merged = iter.next()?.clone();
        for address in iter {
            merged.extend_endpoints(address.endpoints.iter().cloned());
        }
        Some(merged)
    }

    fn extend_endpoints(&mut self, endpoints: impl IntoIterator<Item = Endpoint>) {
        for endpoint in endpoints {
            if !self.endpoints.contains(&endpoint) {
                self.endpoints.push(endpoint);
            }
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.identity, &self.adapter) {
            (Some(identity), Some(adapter)) => write!(f, "{} @ {}", identity, adapter)?,
            (Some(identity), None) => write!(f, "{}", identity)?,
            (None, Some(adapter)) => write!(f, "@ {}", adapter)?,
            (None, None) => {}
        }
        for endpoint in &self.endpoints {
            write!(f, " {}", endpoint)?;
        }
        Ok(())
    }
}
