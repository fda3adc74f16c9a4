//! MQTT topic builders and parsers for a device's local broker session.
//!
//! Each `Device` owns one MQTT session to `localhost:<device.port>`, so the
//! topic tree carries no fleet/device prefix — it is always relative to "me":
//!
//! ```text
//! v1/devices/me/attributes
//! v1/devices/me/attributes/request/<id>
//! v1/devices/me/attributes/response/<id>
//! v1/devices/me/rpc/request/<id>
//! v1/devices/me/rpc/response/<id>
//! v1/devices/me/telemetry
//! ```

const PREFIX: &str = "v1/devices/me";

pub fn attributes() -> String {
    format!("{PREFIX}/attributes")
}

pub fn attributes_request_prefix() -> String {
    format!("{PREFIX}/attributes/request")
}

pub fn attributes_request(id: &str) -> String {
    format!("{PREFIX}/attributes/request/{id}")
}

pub fn attributes_response(id: &str) -> String {
    format!("{PREFIX}/attributes/response/{id}")
}

pub fn attributes_response_prefix() -> String {
    format!("{PREFIX}/attributes/response")
}

pub fn rpc_request_prefix() -> String {
    format!("{PREFIX}/rpc/request")
}

pub fn rpc_request(id: &str) -> String {
    format!("{PREFIX}/rpc/request/{id}")
}

pub fn rpc_response(id: &str) -> String {
    format!("{PREFIX}/rpc/response/{id}")
}

pub fn rpc_response_prefix() -> String {
    format!("{PREFIX}/rpc/response")
}

pub fn telemetry() -> String {
    format!("{PREFIX}/telemetry")
}

/// Subscription pattern matching every topic under a device's session.
pub fn subscribe_all() -> String {
    format!("{PREFIX}/#")
}

/// Extract the trailing `<id>` segment of a `.../response/<id>` topic, used
/// by the correlator to match an incoming publish against a pending
/// `Request`. Returns `None` if `topic` doesn't end with a single non-empty
/// segment under `prefix`.
pub fn response_id(prefix: &str, topic: &str) -> Option<String> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    if rest.is_empty() || rest.contains('/') {
        return None;
    }
    Some(rest.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_topics() {
        assert_eq!(attributes(), "v1/devices/me/attributes");
        assert_eq!(
            attributes_request("abc123"),
            "v1/devices/me/attributes/request/abc123"
        );
        assert_eq!(
            attributes_response("abc123"),
            "v1/devices/me/attributes/response/abc123"
        );
    }

    #[test]
    fn rpc_topics() {
        assert_eq!(rpc_request("xyz"), "v1/devices/me/rpc/request/xyz");
        assert_eq!(rpc_response("xyz"), "v1/devices/me/rpc/response/xyz");
    }

    #[test]
    fn telemetry_topic() {
        assert_eq!(telemetry(), "v1/devices/me/telemetry");
    }

    #[test]
    fn subscribe_all_is_wildcard() {
        assert_eq!(subscribe_all(), "v1/devices/me/#");
    }

    #[test]
    fn response_id_extracts_trailing_segment() {
        let prefix = attributes_response_prefix();
        assert_eq!(
            response_id(&prefix, "v1/devices/me/attributes/response/abc123"),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn response_id_rejects_mismatched_topic() {
        let prefix = rpc_response_prefix();
        assert_eq!(
            response_id(&prefix, "v1/devices/me/attributes/response/abc123"),
            None
        );
        assert_eq!(response_id(&prefix, "v1/devices/me/rpc/response/"), None);
        assert_eq!(response_id(&prefix, "v1/devices/me/rpc/response/a/b"), None);
    }
}
