//! WebSocket endpoint derivation from the page origin

use crate::types::{LinkError, LinkResult};

/// Build the socket URL from an origin such as `https://host:8443`.
///
/// `http` becomes `ws` and `https` becomes `wss`; any path on the origin is
/// dropped in favour of `path`.
pub fn websocket_url(origin: &str, path: &str) -> LinkResult<String> {
    let (scheme, rest) = origin
        .trim()
        .split_once("://")
        .ok_or_else(|| LinkError::InvalidOrigin(origin.to_string()))?;

    let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(LinkError::InvalidOrigin(origin.to_string())),
    };

    let authority = rest.split_once('/').map_or(rest, |(host, _)| host);
    if authority.is_empty() {
        return Err(LinkError::InvalidOrigin(origin.to_string()));
    }

    let path = path.trim_start_matches('/');
    Ok(format!("{}://{}/{}", ws_scheme, authority, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_upgrade() {
        assert_eq!(
            websocket_url("http://localhost:8080", "/ws").unwrap(),
            "ws://localhost:8080/ws"
        );
        assert_eq!(
            websocket_url("https://example.com", "ws").unwrap(),
            "wss://example.com/ws"
        );
        assert_eq!(
            websocket_url("HTTPS://example.com/app/index.html", "/api/ws").unwrap(),
            "wss://example.com/api/ws"
        );
    }

    #[test]
    fn test_rejects_bad_origins() {
        assert!(websocket_url("localhost:8080", "/ws").is_err());
        assert!(websocket_url("ftp://host", "/ws").is_err());
        assert!(websocket_url("http://", "/ws").is_err());
    }
}
