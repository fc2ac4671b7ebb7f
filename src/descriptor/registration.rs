use std::collections::BTreeMap;

use super::params::{APPLICATION_NODE_TYPE, NODE_TYPE, SERVICE_VERSION};
use super::types::ServiceDescriptor;

/// High-level registration request, turned into a descriptor for the advertised host.
#[derive(Debug, Clone)]
pub struct ServiceRegistration {
    pub node_type: String,
    pub service_id: String,
    pub service_version: String,
    pub protocol: String,
    pub port: u16,
    pub parameters: BTreeMap<String, String>,
}

impl ServiceRegistration {
    pub fn new(
        node_type: &str,
        service_id: &str,
        service_version: &str,
        protocol: &str,
        port: u16,
    ) -> Self {
        Self {
            node_type: node_type.to_string(),
            service_id: service_id.to_string(),
            service_version: service_version.to_string(),
            protocol: protocol.to_string(),
            port,
            parameters: BTreeMap::new(),
        }
    }

    /// Application-scoped registration: the node type is fixed to `application`.
    pub fn application(service_id: &str, service_version: &str, protocol: &str, port: u16) -> Self {
        Self::new(APPLICATION_NODE_TYPE, service_id, service_version, protocol, port)
    }

    pub fn parameter(mut self, key: &str, value: impl Into<String>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    /// The caller's node type and service version always win over same-named parameters.
    pub fn into_descriptor(self, host: &str) -> ServiceDescriptor {
        let mut descriptor = ServiceDescriptor::new(&self.protocol, host, self.port, &self.service_id);
        for (key, value) in self.parameters {
            descriptor.set_parameter(&key, value);
        }
        descriptor.set_parameter(NODE_TYPE, self.node_type);
        descriptor.set_parameter(SERVICE_VERSION, self.service_version);
        descriptor
    }
}
