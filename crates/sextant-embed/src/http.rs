use std::time::Duration;

use crate::error::Result;

/// HTTP client shared by the remote embedding models.
///
/// 30s connect timeout, 60s request timeout, `sextant/{version}` user agent,
/// at most 10 redirects.
pub(crate) fn default_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(60))
        .user_agent(concat!("sextant/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()?)
}
