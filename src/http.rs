use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::KiraError;

/// Headers sent by every remote client. `on_error` picks the error variant of
/// the client being built.
pub(crate) fn default_headers(
    on_error: fn(String) -> KiraError,
) -> Result<HeaderMap, KiraError> {
    user_agent_headers(&format!("kira-pm/{}", env!("CARGO_PKG_VERSION")), on_error)
}

fn user_agent_headers(
    user_agent: &str,
    on_error: fn(String) -> KiraError,
) -> Result<HeaderMap, KiraError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent).map_err(|err| on_error(err.to_string()))?,
    );
    Ok(headers)
}
