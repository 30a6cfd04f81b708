/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/5/25
******************************************************************************/
use crate::utils::LightstreamerError;
use cookie::{Cookie, CookieJar};
use url::Url;

/// WebSocket endpoint of a server address: `http` becomes `ws`, `https` becomes `wss` and
/// `lightstreamer` is appended to the path.
pub(crate) fn websocket_url(server_address: &str) -> Result<Url, LightstreamerError> {
    let mut url = Url::parse(server_address)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(LightstreamerError::illegal_argument(format!(
                "unsupported scheme '{}' in server address",
                other
            )));
        }
    };
    url.set_scheme(scheme).map_err(|_| {
        LightstreamerError::illegal_argument(format!("cannot use {} for '{}'", scheme, server_address))
    })?;
    url.path_segments_mut()
        .map_err(|_| {
            LightstreamerError::illegal_argument(format!(
                "server address '{}' cannot have a path",
                server_address
            ))
        })?
        .pop_if_empty()
        .push("lightstreamer");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Host a cookie jar is kept for.
pub(crate) fn cookie_host(uri: &str) -> Result<String, LightstreamerError> {
    let url = Url::parse(uri)?;
    url.host_str()
        .map(str::to_lowercase)
        .ok_or_else(|| LightstreamerError::illegal_argument(format!("'{}' has no host", uri)))
}

/// Value of the `Cookie` header carrying every cookie of `jar`.
pub(crate) fn cookie_header(jar: &CookieJar) -> Option<String> {
    let pairs: Vec<String> = jar
        .iter()
        .map(|cookie| format!("{}={}", cookie.name(), cookie.value()))
        .collect();
    (!pairs.is_empty()).then(|| pairs.join("; "))
}

/// Parses a `Set-Cookie` header value. Attributes other than the name and value are kept as
/// received.
pub(crate) fn parse_set_cookie(value: &str) -> Option<Cookie<'static>> {
    Cookie::parse(value.to_string()).ok()
}
