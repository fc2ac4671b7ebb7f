use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;

use super::protocol::*;
use super::service::ClusterRegistry;
use crate::descriptor::ServiceDescriptor;
use crate::heartbeat::EXPECTED_HEALTH_BODY;

type OperationReply = (StatusCode, Json<OperationResponse>);

fn parse_url(text: &str) -> Result<ServiceDescriptor, OperationReply> {
    text.parse::<ServiceDescriptor>().map_err(|e| {
        tracing::error!("Failed to parse descriptor {:?}: {}", text, e);
        (StatusCode::BAD_REQUEST, Json(OperationResponse::failed(e)))
    })
}

fn reply(result: Result<(), super::RegistryError>, operation: &str) -> OperationReply {
    match result {
        Ok(()) => (StatusCode::OK, Json(OperationResponse::ok())),
        Err(e) => {
            tracing::error!("Failed to {}: {}", operation, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(OperationResponse::failed(e)),
            )
        }
    }
}

pub async fn handle_register(
    Extension(registry): Extension<Arc<ClusterRegistry>>,
    Json(req): Json<DescriptorRequest>,
) -> OperationReply {
    let url = match parse_url(&req.url) {
        Ok(url) => url,
        Err(reply) => return reply,
    };
    reply(registry.register(&url).await, "register")
}

pub async fn handle_unregister(
    Extension(registry): Extension<Arc<ClusterRegistry>>,
    Json(req): Json<DescriptorRequest>,
) -> OperationReply {
    let url = match parse_url(&req.url) {
        Ok(url) => url,
        Err(reply) => return reply,
    };
    reply(registry.unregister(&url).await, "unregister")
}

pub async fn handle_available(
    Extension(registry): Extension<Arc<ClusterRegistry>>,
    Json(req): Json<AvailabilityRequest>,
) -> OperationReply {
    let url = match req.url.as_deref().map(parse_url).transpose() {
        Ok(url) => url,
        Err(reply) => return reply,
    };
    reply(registry.available(url.as_ref()).await, "mark available")
}

pub async fn handle_unavailable(
    Extension(registry): Extension<Arc<ClusterRegistry>>,
    Json(req): Json<AvailabilityRequest>,
) -> OperationReply {
    let url = match req.url.as_deref().map(parse_url).transpose() {
        Ok(url) => url,
        Err(reply) => return reply,
    };
    reply(registry.unavailable(url.as_ref()).await, "mark unavailable")
}

pub async fn handle_unavailable_by_node(
    Extension(registry): Extension<Arc<ClusterRegistry>>,
    Json(req): Json<NodeRequest>,
) -> OperationReply {
    if req.node_consistent_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(OperationResponse::failed("node_consistent_id is empty")),
        );
    }
    reply(
        registry.unavailable_by_node(&req.node_consistent_id).await,
        "sweep node",
    )
}

pub async fn handle_discover(
    Extension(registry): Extension<Arc<ClusterRegistry>>,
    Query(params): Query<DiscoverQuery>,
) -> (StatusCode, Json<DiscoverResponse>) {
    let query = match params.query.parse::<ServiceDescriptor>() {
        Ok(query) => query,
        Err(e) => {
            tracing::error!("Failed to parse query {:?}: {}", params.query, e);
            return (
                StatusCode::BAD_REQUEST,
                Json(DiscoverResponse { urls: Vec::new() }),
            );
        }
    };

    let urls = registry
        .discover(&query)
        .await
        .iter()
        .map(ServiceDescriptor::to_full_string)
        .collect();
    (StatusCode::OK, Json(DiscoverResponse { urls }))
}

pub async fn handle_stability(
    Extension(registry): Extension<Arc<ClusterRegistry>>,
    Query(params): Query<StabilityQuery>,
) -> (StatusCode, Json<StabilityResponse>) {
    match params.url.parse::<ServiceDescriptor>() {
        Ok(url) => {
            let level = registry.stability_of(&url);
            (
                StatusCode::OK,
                Json(StabilityResponse {
                    url: url.identity(),
                    level,
                }),
            )
        }
        Err(e) => {
            tracing::error!("Failed to parse descriptor {:?}: {}", params.url, e);
            (
                StatusCode::BAD_REQUEST,
                Json(StabilityResponse {
                    url: params.url,
                    level: None,
                }),
            )
        }
    }
}

/// Answers the probe contract once this node is ready.
pub async fn handle_health(
    Extension(registry): Extension<Arc<ClusterRegistry>>,
) -> (StatusCode, &'static str) {
    if registry.readiness().is_on() {
        (StatusCode::OK, EXPECTED_HEALTH_BODY)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "DOWN")
    }
}

pub fn router(registry: Arc<ClusterRegistry>) -> Router {
    Router::new()
        .route(ENDPOINT_REGISTER, post(handle_register))
        .route(ENDPOINT_UNREGISTER, post(handle_unregister))
        .route(ENDPOINT_AVAILABLE, post(handle_available))
        .route(ENDPOINT_UNAVAILABLE, post(handle_unavailable))
        .route(ENDPOINT_UNAVAILABLE_BY_NODE, post(handle_unavailable_by_node))
        .route(ENDPOINT_DISCOVER, get(handle_discover))
        .route(ENDPOINT_STABILITY, get(handle_stability))
        .route(ENDPOINT_HEALTH, get(handle_health))
        .layer(Extension(registry))
}
