use serde::{Deserialize, Serialize};

pub const ENDPOINT_REGISTER: &str = "/registry/register";
pub const ENDPOINT_UNREGISTER: &str = "/registry/unregister";
pub const ENDPOINT_AVAILABLE: &str = "/registry/available";
pub const ENDPOINT_UNAVAILABLE: &str = "/registry/unavailable";
pub const ENDPOINT_UNAVAILABLE_BY_NODE: &str = "/registry/unavailable-by-node";
pub const ENDPOINT_DISCOVER: &str = "/registry/discover";
pub const ENDPOINT_STABILITY: &str = "/registry/stability";
pub const ENDPOINT_HEALTH: &str = "/health";

#[derive(Debug, Serialize, Deserialize)]
pub struct DescriptorRequest {
    pub url: String,
}

/// `url` omitted means every descriptor registered through the receiving node.
#[derive(Debug, Serialize, Deserialize)]
pub struct AvailabilityRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeRequest {
    pub node_consistent_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OperationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DiscoverQuery {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DiscoverResponse {
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StabilityQuery {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StabilityResponse {
    pub url: String,
    pub level: Option<i32>,
}
