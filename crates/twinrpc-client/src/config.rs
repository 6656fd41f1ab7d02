use twinrpc_protocol::Version;

/// Client-side configuration, threaded explicitly through every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Generation to encode outbound calls with.
    pub version: Version,
    /// Request path handed to the transport.
    pub path: String,
    /// Content type announced with each request body.
    pub content_type: String,
    /// User agent announced with each request.
    pub user_agent: String,
}

impl ClientConfig {
    pub fn v1() -> Self {
        Self {
            version: Version::V1,
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: Version::V2,
            path: "/".to_string(),
            content_type: "application/json-rpc".to_string(),
            user_agent: concat!("twinrpc/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
