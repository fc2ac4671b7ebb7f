//! Recognized descriptor parameter keys and protocol constants.

pub const NODE_TYPE: &str = "nodeType";
pub const GROUP: &str = "group";
pub const PROJECT: &str = "project";
pub const PROJECT_VERSION: &str = "projectVersion";
pub const SERVICE_VERSION: &str = "serviceVersion";
pub const ENVIRONMENT: &str = "environment";
pub const NODE_ID: &str = "nodeId";
pub const NODE_CONSISTENT_ID: &str = "nodeConsistentId";
pub const SERIALIZE: &str = "serialize";

pub const HEALTH_CHECK: &str = "healthCheck";
pub const HEALTH_CHECK_PATH: &str = "healthCheckPath";
pub const CRUCIAL_CHECK_PATH: &str = "crucialCheckPath";
pub const CRUCIAL_CHECK: &str = "crucialCheck";

pub const DEFAULT_GROUP: &str = "default";
pub const DEFAULT_HEALTH_CHECK_PATH: &str = "health";

/// Node type stamped by the application-scoped registration call.
pub const APPLICATION_NODE_TYPE: &str = "application";

pub const HTTP_PROTOCOL: &str = "http";
pub const HTTPS_PROTOCOL: &str = "https";
/// The registry's own endpoint protocol. Descriptors using it carry port 0 by default.
pub const INTERNAL_PROTOCOL: &str = "cluster";
/// A query using this protocol accepts descriptors of every protocol.
pub const ANY_PROTOCOL: &str = "*";

/// Declared default for a matching attribute when a descriptor leaves it blank.
pub fn default_value(key: &str) -> &'static str {
    match key {
        GROUP => DEFAULT_GROUP,
        _ => "",
    }
}

/// Port implied by a protocol when the descriptor text omits it.
pub fn default_port(protocol: &str) -> Option<u16> {
    match protocol {
        HTTP_PROTOCOL => Some(80),
        HTTPS_PROTOCOL => Some(443),
        INTERNAL_PROTOCOL => Some(0),
        _ => None,
    }
}
