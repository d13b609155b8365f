//! Single-page fetcher for user-supplied websites.
//!
//! One bounded GET per call, no retries. Every failure (transport, status,
//! oversize body, blocked target) degrades to empty content so the caller
//! can carry on with whatever else it has.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::redirect::{Attempt, Policy};
use tracing::{debug, instrument, warn};
use url::Url;

use sitebot_shared::{FetchConfig, Result, SiteBotError};

/// User-Agent string for page requests.
const USER_AGENT: &str = concat!("SiteBot/", env!("CARGO_PKG_VERSION"));

/// Maximum redirects followed for a single fetch.
const MAX_REDIRECTS: usize = 5;

// ---------------------------------------------------------------------------
// PageFetcher
// ---------------------------------------------------------------------------

/// Fetches raw HTML for a single page.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    max_body_bytes: u64,
    /// Allow localhost/private IPs (tests against mock servers, intranet deployments).
    allow_private_hosts: bool,
}

impl PageFetcher {
    /// Create a fetcher from the `[fetch]` config section.
    ///
    /// Unless `allow_private_hosts` is set, every redirect hop and every
    /// resolved address is checked against the private ranges too.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let allow_private = config.allow_private_hosts;
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(Policy::custom(move |attempt| guard_redirect(attempt, allow_private)))
            .timeout(Duration::from_secs(config.timeout_secs));
        if !allow_private {
            builder = builder.dns_resolver(Arc::new(PublicOnlyResolver));
        }
        let client = builder
            .build()
            .map_err(|e| SiteBotError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
            allow_private_hosts: allow_private,
        })
    }

    /// Fetch `url` and return its body, or an empty string on any failure.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(&self, url: &Url) -> String {
        match self.try_fetch(url).await {
            Ok(body) => {
                debug!(len = body.len(), "page fetched");
                body
            }
            Err(e) => {
                warn!(error = %e, "fetch failed, continuing with empty content");
                String::new()
            }
        }
    }

    async fn try_fetch(&self, url: &Url) -> Result<String> {
        if !self.allow_private_hosts && is_ssrf_target(url) {
            return Err(SiteBotError::validation(format!(
                "{url}: refusing to fetch private or non-HTTP target"
            )));
        }

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| SiteBotError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SiteBotError::Network(format!("{url}: HTTP {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_body_bytes {
                return Err(SiteBotError::Network(format!(
                    "{url}: body of {len} bytes exceeds limit of {}",
                    self.max_body_bytes
                )));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| SiteBotError::Network(format!("{url}: body read failed: {e}")))?;

        // chunked responses carry no Content-Length
        if body.len() as u64 > self.max_body_bytes {
            return Err(SiteBotError::Network(format!(
                "{url}: body of {} bytes exceeds limit of {}",
                body.len(),
                self.max_body_bytes
            )));
        }

        Ok(body)
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Follow a redirect only within the hop limit and, unless private hosts are
/// allowed, only to targets that pass [`is_ssrf_target`].
fn guard_redirect(attempt: Attempt<'_>, allow_private: bool) -> reqwest::redirect::Action {
    match redirect_refusal(attempt.url(), attempt.previous().len(), allow_private) {
        Some(reason) => attempt.error(reason),
        None => attempt.follow(),
    }
}

fn redirect_refusal(next: &Url, hops: usize, allow_private: bool) -> Option<String> {
    if hops > MAX_REDIRECTS {
        return Some(format!("too many redirects (limit {MAX_REDIRECTS})"));
    }
    if !allow_private && is_ssrf_target(next) {
        return Some(format!("{next}: refusing redirect to private or non-HTTP target"));
    }
    None
}

/// DNS resolver that refuses names resolving to private addresses.
///
/// Literal-IP hosts never reach a resolver; those are covered by
/// [`is_ssrf_target`] on the request URL and on every redirect hop.
#[derive(Debug)]
struct PublicOnlyResolver;

impl Resolve for PublicOnlyResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let host = name.as_str().to_string();
        Box::pin(async move {
            let addrs = resolve_public(&host)
                .await
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

/// Resolve `host`, failing if any of its addresses is private.
async fn resolve_public(host: &str) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| SiteBotError::Network(format!("{host}: lookup failed: {e}")))?
        .collect();

    if addrs.is_empty() {
        return Err(SiteBotError::Network(format!("{host}: no addresses")));
    }
    if let Some(addr) = addrs.iter().find(|a| is_private_ip(&a.ip())) {
        return Err(SiteBotError::validation(format!(
            "{host}: resolves to private address {}",
            addr.ip()
        )));
    }
    Ok(addrs)
}

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            let host = host.trim_end_matches('.');
            host == "localhost"
                || host.ends_with(".localhost")
                || host.ends_with(".local")
                || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 0.0.0.0/8
                || v4.octets()[0] == 0
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 (unique local)
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 (link-local)
                || (v6.segments()[0] & 0xffc0) == 0xfe80
                || v6.to_ipv4_mapped().is_some_and(|v4| is_private_ip(&IpAddr::V4(v4)))
        }
    }
}
