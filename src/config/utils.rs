use url::Url;

/// Parse a whole number of seconds, rejecting zero.
pub fn parse_seconds(s: &str) -> Option<u64> {
    match s.trim().parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(v) => Some(v),
    }
}

/// Derive the WebSocket endpoint for `path` from an HTTP(S) base URL.
///
/// `https` maps to `wss` and `http` to `ws`; `ws`/`wss` are kept as-is.
pub fn websocket_url(base_url: &str, path: &str) -> Result<Url, String> {
    let mut url = Url::parse(base_url).map_err(|e| format!("Invalid base URL '{base_url}': {e}"))?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(format!("Unsupported URL scheme '{other}'")),
    };
    url.set_scheme(scheme)
        .map_err(|_| format!("Cannot use scheme '{scheme}' for '{base_url}'"))?;

    let joined = format!("{}{}", url.path().trim_end_matches('/'), path);
    url.set_path(&joined);
    Ok(url)
}
