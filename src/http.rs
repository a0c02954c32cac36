//! Shared HTTP clients for the source adapters.

use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::Client;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Browser User-Agent used for HTML scrapes; API adapters identify honestly.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Default client for JSON API adapters: strict TLS, 15 s timeout.
pub fn api_client() -> &'static Client {
    static CLIENT: Lazy<Client> = Lazy::new(|| {
        Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("goodrec-ingest/0.1")
            .build()
            .expect("reqwest client")
    });
    &CLIENT
}

/// Client for HTML scrapes. Keep-alive pool, browser UA, and permissive TLS
/// verification; some scraped endpoints present broken certificate chains.
pub fn scrape_client() -> &'static Client {
    static CLIENT: Lazy<Client> = Lazy::new(|| {
        Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(BROWSER_USER_AGENT)
            .danger_accept_invalid_certs(true)
            .build()
            .expect("reqwest client")
    });
    &CLIENT
}
