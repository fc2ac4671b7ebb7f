//! Descriptor Module Tests
//!
//! ## Test Scopes
//! - **Parsing**: default ports, parameter splitting, malformed input.
//! - **Identity**: equality and hashing ignore parameters.
//! - **Matching**: `can_serve` and the discovery `accepts` filter.

#[cfg(test)]
mod tests {
    use crate::descriptor::params::*;
    use crate::descriptor::{DescriptorError, ServiceDescriptor, ServiceRegistration};
    use std::collections::HashSet;

    fn orders(host: &str) -> ServiceDescriptor {
        ServiceDescriptor::new("http", host, 8080, "orders")
    }

    // ============================================================
    // PARSING
    // ============================================================

    #[test]
    fn test_parse_full_descriptor() {
        let d: ServiceDescriptor = "http://10.0.0.1:8080/orders?group=default&nodeType=app"
            .parse()
            .unwrap();

        assert_eq!(d.protocol(), "http");
        assert_eq!(d.host(), "10.0.0.1");
        assert_eq!(d.port(), Some(8080));
        assert_eq!(d.path(), "orders");
        assert_eq!(d.parameter(GROUP), Some("default"));
        assert_eq!(d.parameter(NODE_TYPE), Some("app"));
    }

    #[test]
    fn test_parse_default_ports() {
        let http: ServiceDescriptor = "http://h/a".parse().unwrap();
        let https: ServiceDescriptor = "https://h/a".parse().unwrap();
        let internal: ServiceDescriptor = "cluster://h/a".parse().unwrap();
        let unknown: ServiceDescriptor = "gopher://h/a".parse().unwrap();

        assert_eq!(http.port(), Some(80));
        assert_eq!(https.port(), Some(443));
        assert_eq!(internal.port(), Some(0));
        assert_eq!(unknown.port(), None);
    }

    #[test]
    fn test_parse_rejects_malformed_text() {
        assert!(matches!(
            "10.0.0.1:8080/orders".parse::<ServiceDescriptor>(),
            Err(DescriptorError::MissingScheme(_))
        ));
        assert!(matches!(
            "http://:8080/orders".parse::<ServiceDescriptor>(),
            Err(DescriptorError::EmptyHost(_))
        ));
        assert!(matches!(
            "http://h:99999/orders".parse::<ServiceDescriptor>(),
            Err(DescriptorError::InvalidPort { .. })
        ));
    }

    #[test]
    fn test_parse_keeps_valueless_and_skips_empty_pairs() {
        let d: ServiceDescriptor = "http://h:1/a?flag&&k=v&".parse().unwrap();

        assert_eq!(d.parameters().len(), 2);
        assert_eq!(d.parameters().get("flag").map(String::as_str), Some(""));
        assert_eq!(d.parameter("flag"), None, "blank values read as absent");
        assert_eq!(d.parameter("k"), Some("v"));
    }

    #[test]
    fn test_round_trip_preserves_fields_and_parameters() {
        let d = ServiceDescriptor::new("http", "10.0.0.1", 8080, "orders")
            .with_parameter(GROUP, "default");

        let text = d.to_full_string();
        assert_eq!(text, "http://10.0.0.1:8080/orders?group=default");

        let parsed: ServiceDescriptor = text.parse().unwrap();
        assert_eq!(parsed, d);
        assert_eq!(parsed.parameters(), d.parameters());
    }

    #[test]
    fn test_full_string_has_no_trailing_separator() {
        let d = orders("h").with_parameter("a", "1").with_parameter("b", "2");
        let text = d.to_full_string();

        assert!(!text.ends_with('&'));
        assert!(text.ends_with("?a=1&b=2"));
        assert_eq!(orders("h").to_full_string(), "http://h:8080/orders");
    }

    #[test]
    fn test_serde_uses_text_form() {
        let d = orders("h").with_parameter(GROUP, "blue");
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, "\"http://h:8080/orders?group=blue\"");

        let back: ServiceDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back.parameter(GROUP), Some("blue"));
    }

    // ============================================================
    // IDENTITY
    // ============================================================

    #[test]
    fn test_equality_ignores_parameters() {
        let a = orders("h").with_parameter(GROUP, "a");
        let b = orders("h").with_parameter(GROUP, "b");

        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b), "same endpoint hashes identically");
        assert_ne!(orders("h"), orders("other"));
    }

    #[test]
    fn test_clone_is_independent() {
        let original = orders("h").with_parameter(GROUP, "a");
        let mut copy = original.clone();
        copy.set_parameter(GROUP, "b");

        assert_eq!(original.parameter(GROUP), Some("a"));
    }

    #[test]
    fn test_bool_parameter_defaults() {
        let d = orders("h").with_parameter(HEALTH_CHECK, "TRUE");

        assert!(d.bool_parameter(HEALTH_CHECK, false));
        assert!(d.bool_parameter(CRUCIAL_CHECK, true));
        assert!(!orders("h").with_parameter(CRUCIAL_CHECK, "false").bool_parameter(CRUCIAL_CHECK, true));
    }

    // ============================================================
    // MATCHING
    // ============================================================

    #[test]
    fn test_can_serve_requires_exact_attributes() {
        let provider = orders("h").with_parameter(PROJECT, "shop").with_parameter(NODE_TYPE, "app");
        let same = orders("x").with_parameter(PROJECT, "shop").with_parameter(NODE_TYPE, "app");
        let other_project = orders("x").with_parameter(PROJECT, "bank").with_parameter(NODE_TYPE, "app");
        let blank_node_type = orders("x").with_parameter(PROJECT, "shop");

        assert!(provider.can_serve(&same));
        assert!(!provider.can_serve(&other_project));
        assert!(!provider.can_serve(&blank_node_type));
    }

    #[test]
    fn test_accepts_group_must_match_with_default() {
        let query = orders("q");
        let default_group = orders("a");
        let explicit_default = orders("b").with_parameter(GROUP, DEFAULT_GROUP);
        let blue = orders("c").with_parameter(GROUP, "blue");

        assert!(query.accepts(&default_group));
        assert!(query.accepts(&explicit_default));
        assert!(!query.accepts(&blue));
        assert!(query.with_parameter(GROUP, "blue").accepts(&blue));
    }

    #[test]
    fn test_accepts_blank_node_type_matches_any() {
        let query = orders("q");
        let app = orders("a").with_parameter(NODE_TYPE, "app");
        let worker = orders("b").with_parameter(NODE_TYPE, "worker");

        assert!(query.accepts(&app));
        assert!(query.accepts(&worker));

        let app_query = orders("q").with_parameter(NODE_TYPE, "app");
        assert!(app_query.accepts(&app));
        assert!(!app_query.accepts(&worker));
    }

    #[test]
    fn test_accepts_protocol_wildcard() {
        let https = ServiceDescriptor::new("https", "a", 443, "orders");

        assert!(!orders("q").accepts(&https));
        assert!(ServiceDescriptor::new(ANY_PROTOCOL, "q", 0, "orders").accepts(&https));
        assert!(!orders("q").accepts(&ServiceDescriptor::new("http", "a", 1, "billing")));
    }

    // ============================================================
    // REGISTRATION
    // ============================================================

    #[test]
    fn test_registration_overwrites_node_type_and_version() {
        let descriptor = ServiceRegistration::new("app", "orders", "2.0", "http", 8080)
            .parameter(NODE_TYPE, "spoofed")
            .parameter(SERVICE_VERSION, "0.1")
            .parameter(GROUP, "blue")
            .into_descriptor("10.0.0.1");

        assert_eq!(descriptor.identity(), "http://10.0.0.1:8080/orders");
        assert_eq!(descriptor.parameter(NODE_TYPE), Some("app"));
        assert_eq!(descriptor.parameter(SERVICE_VERSION), Some("2.0"));
        assert_eq!(descriptor.parameter(GROUP), Some("blue"));
    }

    #[test]
    fn test_application_registration_node_type() {
        let descriptor =
            ServiceRegistration::application("orders", "1.0", "http", 80).into_descriptor("h");
        assert_eq!(descriptor.parameter(NODE_TYPE), Some(APPLICATION_NODE_TYPE));
    }
}
