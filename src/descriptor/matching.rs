//! Matching predicates between a querying descriptor and registered descriptors.

use super::params::{self, *};
use super::types::ServiceDescriptor;

/// Attributes that must agree exactly for one descriptor to serve another.
const SERVE_ATTRIBUTES: [&str; 5] = [PROJECT, NODE_TYPE, PROJECT_VERSION, SERVICE_VERSION, SERIALIZE];

/// Query attributes where a blank value on the querying side accepts anything.
const WILDCARD_ATTRIBUTES: [&str; 8] = [
    PROJECT,
    PROJECT_VERSION,
    SERVICE_VERSION,
    NODE_TYPE,
    ENVIRONMENT,
    NODE_ID,
    NODE_CONSISTENT_ID,
    SERIALIZE,
];

impl ServiceDescriptor {
    /// True iff `other` can be served by `self`: same path and protocol, and the
    /// project/nodeType/versions/serialize attributes agree after applying defaults.
    pub fn can_serve(&self, other: &ServiceDescriptor) -> bool {
        self.path() == other.path()
            && self.protocol() == other.protocol()
            && SERVE_ATTRIBUTES
                .iter()
                .all(|key| self.attribute(key) == other.attribute(key))
    }

    /// Discovery filter: does this query accept `candidate`?
    ///
    /// The serviceId must match and the group must match exactly (both sides default to
    /// `default`). The protocol matches when equal or when the query uses `*`. Every
    /// other matching attribute matches when equal or left blank by the query.
    pub fn accepts(&self, candidate: &ServiceDescriptor) -> bool {
        if self.path() != candidate.path() {
            return false;
        }
        if self.protocol() != params::ANY_PROTOCOL && self.protocol() != candidate.protocol() {
            return false;
        }
        if self.attribute(GROUP) != candidate.attribute(GROUP) {
            return false;
        }
        WILDCARD_ATTRIBUTES.iter().all(|key| match self.parameter(key) {
            Some(wanted) => wanted == candidate.attribute(key),
            None => true,
        })
    }
}
