// src/http.rs
// The process-wide HTTP client: Apify API, Algolia docs index, telemetry.

use std::time::Duration;

/// Window a `waitForFinish` run poll is held open server-side (API maximum).
pub const WAIT_FOR_FINISH_SECS: u32 = 60;

/// Per-request ceiling: one full held-open run poll plus slack for large
/// dataset item pages.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2 * WAIT_FOR_FINISH_SECS as u64);

/// Ceiling for short calls: run status polls, docs search, telemetry posts.
pub const FAST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the shared client. `ServerState::new` calls this once; every
/// component gets a clone, and all clones share one connection pool.
pub fn shared_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("actors-mcp-server/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_timeout_covers_a_full_run_poll() {
        // wait_for_finish loops on requests the API holds open for the whole
        // waitForFinish window; the client must outlive each of them
        assert!(REQUEST_TIMEOUT > Duration::from_secs(WAIT_FOR_FINISH_SECS as u64));
        assert!(FAST_TIMEOUT < REQUEST_TIMEOUT);
    }
}
