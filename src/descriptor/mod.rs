//! Service Descriptor Module
//!
//! A `ServiceDescriptor` identifies one advertised network endpoint:
//! `<protocol>://<host>[:<port>]/<path>[?k=v&...]`, where `path` doubles as the serviceId.
//!
//! ## Core Concepts
//! - **Identity**: Equality and hashing cover protocol, host, port and path only. Parameters
//!   travel with the descriptor but never change which endpoint it names.
//! - **Matching**: `can_serve` (strict compatibility) and `accepts` (discovery query with
//!   blank-means-any wildcards) decide which descriptors answer a query.
//! - **Registration**: `ServiceRegistration` builds a descriptor from the high-level
//!   `register(nodeType, serviceId, serviceVersion, protocol, port, params)` call.

pub mod matching;
pub mod params;
pub mod registration;
pub mod types;

pub use registration::ServiceRegistration;
pub use types::{DescriptorError, ServiceDescriptor};

#[cfg(test)]
mod tests;
