//! Gateway endpoint URLs.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Path prefix of every gateway endpoint.
pub const GATEWAY_PATH: &str = "sse-gateway";

/// URI-component encoding: everything but `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Strip trailing slashes. Returns `None` when nothing is left.
pub fn normalize_server_url(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/');
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// `{server}/sse-gateway/connect?clientId={id}`
pub fn connect_url(server_url: &str, tab_client_id: &str) -> String {
    format!(
        "{server_url}/{GATEWAY_PATH}/connect?clientId={}",
        utf8_percent_encode(tab_client_id, COMPONENT)
    )
}

/// `{server}/sse-gateway/listen/{id}`, with `;jsessionid=` when given.
pub fn listen_url(server_url: &str, tab_client_id: &str, jsessionid: Option<&str>) -> String {
    let mut url = format!(
        "{server_url}/{GATEWAY_PATH}/listen/{}",
        utf8_percent_encode(tab_client_id, COMPONENT)
    );
    if let Some(session) = jsessionid {
        url.push_str(";jsessionid=");
        url.push_str(session);
    }
    url
}

/// `{server}/sse-gateway/configure?batchId={n}`
pub fn configure_url(server_url: &str, batch_id: u64) -> String {
    format!("{server_url}/{GATEWAY_PATH}/configure?batchId={batch_id}")
}
