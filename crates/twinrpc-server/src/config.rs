use twinrpc_protocol::Version;

/// Server-side protocol configuration, threaded explicitly through dispatch.
///
/// The version is the generation the engine answers with by default; a 1.0
/// request served by a 2.0 engine still gets a 1.0 response (per-call
/// downgrade, see [`crate::ProtocolHandler`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub version: Version,
}

impl ServerConfig {
    pub fn new(version: Version) -> Self {
        Self { version }
    }

    pub fn v1() -> Self {
        Self::new(Version::V1)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(Version::V2)
    }
}
