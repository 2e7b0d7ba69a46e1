//! Endpoint addresses understood by the bundled transports.

use crate::error::{RpcError, RpcResult};

/// A parsed server address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `tcp://host:port` or bare `host:port`: length-prefixed JSON-RPC frames.
    Tcp { addr: String },
    /// `ws://host[:port]/path`: one JSON-RPC message per websocket message.
    WebSocket { url: String },
}

impl Endpoint {
    /// Parse `endpoint`, rejecting schemes no bundled dialer can reach.
    ///
    /// The error is [`RpcError::InvalidEndpoint`], which the retry loop never retries.
    pub fn parse(endpoint: &str) -> RpcResult<Self> {
        let invalid = |reason: &str| Err(RpcError::invalid_endpoint(endpoint, reason));

        let (scheme, rest) = match endpoint.split_once("://") {
            Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
            None => (String::from("tcp"), endpoint),
        };

        match scheme.as_str() {
            "tcp" => {
                let addr = rest.trim_end_matches('/');
                if addr.is_empty() || addr.contains('/') {
                    return invalid("expected tcp://host:port");
                }
                if !addr.contains(':') {
                    return invalid("missing port");
                }
                Ok(Self::Tcp {
                    addr: addr.to_string(),
                })
            }
            "ws" => {
                if rest.is_empty() || rest.starts_with('/') {
                    return invalid("missing host");
                }
                Ok(Self::WebSocket {
                    url: endpoint.to_string(),
                })
            }
            "wss" => invalid("wss:// is not supported; terminate TLS in front of a ws:// endpoint"),
            _ => invalid("unsupported scheme (expected tcp:// or ws://)"),
        }
    }

    pub fn is_websocket(&self) -> bool {
        matches!(self, Endpoint::WebSocket { .. })
    }
}
