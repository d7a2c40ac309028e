//! SSRF-guarded HTTP fetcher for remote sources and thumbnails.
//!
//! Every outbound fetch is checked against a scheme whitelist, a private/
//! loopback/link-local denylist and the configured host allowlist. The
//! denylist always wins, even for allowlisted hosts: hostnames are resolved
//! up front, every resolved address is vetted, and the connection is pinned
//! to the vetted address. Redirects are followed manually (one hop) so the
//! target is re-guarded and re-resolved.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use tokio::fs;
use tracing::{debug, info};
use url::Url;

use vidpress_models::{MAX_IMAGE_FETCH_BYTES, MIN_IMAGE_FETCH_BYTES, MIN_VIDEO_FETCH_BYTES};

use crate::error::{MediaError, MediaResult};

/// What is being fetched; fixes timeout and size bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Video,
    Image,
}

impl FetchKind {
    pub fn timeout(&self) -> Duration {
        match self {
            FetchKind::Video => Duration::from_secs(300),
            FetchKind::Image => Duration::from_secs(60),
        }
    }

    fn min_bytes(&self) -> u64 {
        match self {
            FetchKind::Video => MIN_VIDEO_FETCH_BYTES,
            FetchKind::Image => MIN_IMAGE_FETCH_BYTES,
        }
    }

    fn max_bytes(&self) -> Option<u64> {
        match self {
            FetchKind::Video => None,
            FetchKind::Image => Some(MAX_IMAGE_FETCH_BYTES),
        }
    }
}

/// Host allowlist and TLS policy for outbound fetches.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Allowed hosts: `*` (any), `*.suffix` (suffix or subdomain), or exact
    pub allowed_hosts: Vec<String>,
    /// Verify TLS certificates
    pub verify_ssl: bool,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            allowed_hosts: Vec::new(),
            verify_ssl: true,
        }
    }
}

impl FetchPolicy {
    /// Parse a comma-separated allowlist (`ALLOWED_DOWNLOAD_DOMAINS` format).
    pub fn from_allowlist(raw: &str, verify_ssl: bool) -> Self {
        Self {
            allowed_hosts: raw
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            verify_ssl,
        }
    }

    /// Check a URL against scheme, denylist and allowlist.
    pub fn guard(&self, url: &Url) -> MediaResult<()> {
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(MediaError::download_rejected(format!(
                    "scheme '{}' not allowed",
                    other
                )))
            }
        }

        let host = url
            .host_str()
            .ok_or_else(|| MediaError::download_rejected("URL has no host"))?
            .to_ascii_lowercase();

        // The denylist wins over any allowlist entry.
        if host_is_denied(&host) {
            return Err(MediaError::download_rejected(format!(
                "host '{}' is in a blocked range",
                host
            )));
        }

        if !self.host_is_allowed(&host) {
            return Err(MediaError::download_rejected(format!(
                "host '{}' is not in the allowlist",
                host
            )));
        }

        Ok(())
    }

    fn host_is_allowed(&self, host: &str) -> bool {
        self.allowed_hosts.iter().any(|entry| {
            if entry == "*" {
                true
            } else if let Some(suffix) = entry.strip_prefix("*.") {
                host == suffix || host.ends_with(&format!(".{}", suffix))
            } else {
                host == entry
            }
        })
    }
}

/// Hosts that must never produce a connection, allowlisted or not.
pub fn host_is_denied(host: &str) -> bool {
    if host == "localhost" || host == "0.0.0.0" {
        return true;
    }
    if host.ends_with(".internal") || host.ends_with(".local") {
        return true;
    }

    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return ip_is_denied(ip);
    }

    false
}

fn ip_is_denied(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()        // 127.0.0.0/8
                || v4.is_private()  // 10/8, 172.16/12, 192.168/16
                || v4.is_link_local() // 169.254/16
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00) == 0xfc00 // unique local fc00::/7
                || (v6.segments()[0] & 0xffc0) == 0xfe80 // link local fe80::/10
        }
    }
}

/// Resolve a hostname and vet every address against the denylist.
///
/// Any resolved address in a blocked range rejects the whole fetch; the
/// first vetted address is returned so the connection can be pinned to it.
async fn resolve_guarded(host: &str, port: u16) -> MediaResult<SocketAddr> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| {
            MediaError::download_failed(format!("DNS lookup for '{}' failed: {}", host, e))
        })?
        .collect();

    if addrs.is_empty() {
        return Err(MediaError::download_failed(format!(
            "'{}' resolved to no addresses",
            host
        )));
    }
    if let Some(denied) = addrs.iter().find(|a| ip_is_denied(a.ip())) {
        return Err(MediaError::download_rejected(format!(
            "host '{}' resolves to blocked address {}",
            host,
            denied.ip()
        )));
    }

    Ok(addrs[0])
}

/// Guarded downloader.
pub struct Fetcher {
    policy: FetchPolicy,
}

impl Fetcher {
    pub fn new(policy: FetchPolicy) -> Self {
        Self { policy }
    }

    /// Guard one hop's URL, resolve its host, and build a client pinned to
    /// the vetted address so DNS cannot swap in a blocked one between the
    /// check and the connect.
    async fn client_for(&self, url: &Url, timeout: Duration) -> MediaResult<reqwest::Client> {
        self.policy.guard(url)?;

        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(!self.policy.verify_ssl);

        let host = url
            .host_str()
            .ok_or_else(|| MediaError::download_rejected("URL has no host"))?;

        // Literal addresses were already vetted by the guard; hostnames go
        // through resolution here.
        if host.parse::<IpAddr>().is_err() && !host.starts_with('[') {
            let port = url.port_or_known_default().unwrap_or(443);
            let addr = resolve_guarded(host, port).await?;
            builder = builder.resolve(host, addr);
        }

        builder
            .build()
            .map_err(|e| MediaError::download_failed(e.to_string()))
    }

    /// Fetch `url` to `dest`, following at most one 301/302 hop.
    pub async fn fetch(&self, url: &str, kind: FetchKind, dest: impl AsRef<Path>) -> MediaResult<u64> {
        let dest = dest.as_ref();
        let url = Url::parse(url)
            .map_err(|e| MediaError::download_rejected(format!("invalid URL: {}", e)))?;

        let client = self.client_for(&url, kind.timeout()).await?;
        let mut response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| MediaError::download_failed(e.to_string()))?;

        // Follow a single redirect, re-guarding and re-resolving the target.
        if matches!(response.status().as_u16(), 301 | 302) {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| MediaError::download_failed("redirect without Location"))?;
            let next = url
                .join(location)
                .map_err(|e| MediaError::download_rejected(format!("bad redirect: {}", e)))?;
            debug!(from = %url, to = %next, "Following redirect");

            let client = self.client_for(&next, kind.timeout()).await?;
            response = client
                .get(next)
                .send()
                .await
                .map_err(|e| MediaError::download_failed(e.to_string()))?;
            if matches!(response.status().as_u16(), 301 | 302) {
                return Err(MediaError::download_failed("too many redirects"));
            }
        }

        if !response.status().is_success() {
            return Err(MediaError::download_failed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        if let (Some(max), Some(len)) = (kind.max_bytes(), response.content_length()) {
            if len > max {
                return Err(MediaError::download_failed(format!(
                    "size {} exceeds {} byte limit",
                    len, max
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MediaError::download_failed(e.to_string()))?;
        let size = bytes.len() as u64;

        if size < kind.min_bytes() {
            return Err(MediaError::download_failed(format!(
                "size {} below {} byte floor",
                size,
                kind.min_bytes()
            )));
        }
        if let Some(max) = kind.max_bytes() {
            if size > max {
                return Err(MediaError::download_failed(format!(
                    "size {} exceeds {} byte limit",
                    size, max
                )));
            }
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(dest, &bytes).await?;

        info!(url = %url, bytes = size, dest = %dest.display(), "Fetched");
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(allow: &str) -> FetchPolicy {
        FetchPolicy::from_allowlist(allow, true)
    }

    #[test]
    fn denies_loopback_and_private_ranges() {
        assert!(host_is_denied("localhost"));
        assert!(host_is_denied("0.0.0.0"));
        assert!(host_is_denied("127.0.0.1"));
        assert!(host_is_denied("127.8.3.4"));
        assert!(host_is_denied("10.1.2.3"));
        assert!(host_is_denied("172.16.0.1"));
        assert!(host_is_denied("172.31.255.255"));
        assert!(host_is_denied("192.168.1.1"));
        assert!(host_is_denied("169.254.169.254"));
        assert!(host_is_denied("::1"));
        assert!(host_is_denied("metadata.internal"));
        assert!(host_is_denied("printer.local"));
    }

    #[test]
    fn allows_public_hosts() {
        assert!(!host_is_denied("example.com"));
        assert!(!host_is_denied("8.8.8.8"));
        assert!(!host_is_denied("172.32.0.1"));
    }

    #[test]
    fn denylist_wins_over_allowlist() {
        let p = policy("*");
        let url = Url::parse("http://169.254.169.254/latest/meta-data/").unwrap();
        let err = p.guard(&url).unwrap_err();
        assert!(matches!(err, MediaError::DownloadRejected(_)));
    }

    #[test]
    fn scheme_must_be_http_or_https() {
        let p = policy("*");
        let url = Url::parse("ftp://example.com/file").unwrap();
        assert!(p.guard(&url).is_err());
        let url = Url::parse("file:///etc/passwd").unwrap();
        assert!(p.guard(&url).is_err());
    }

    #[test]
    fn wildcard_suffix_matches_host_and_subdomains() {
        let p = policy("*.example.com");
        assert!(p.host_is_allowed("example.com"));
        assert!(p.host_is_allowed("cdn.example.com"));
        assert!(p.host_is_allowed("a.b.example.com"));
        assert!(!p.host_is_allowed("notexample.com"));
        assert!(!p.host_is_allowed("example.org"));
    }

    #[test]
    fn exact_entries_match_exactly() {
        let p = policy("media.example.com, other.net");
        assert!(p.host_is_allowed("media.example.com"));
        assert!(p.host_is_allowed("other.net"));
        assert!(!p.host_is_allowed("sub.other.net"));
    }

    #[test]
    fn star_allows_any_public_host() {
        let p = policy("*");
        let url = Url::parse("https://anything.example.net/v.mp4").unwrap();
        assert!(p.guard(&url).is_ok());
    }

    #[test]
    fn empty_allowlist_rejects_everything() {
        let p = policy("");
        let url = Url::parse("https://example.com/v.mp4").unwrap();
        assert!(p.guard(&url).is_err());
    }

    #[tokio::test]
    async fn resolution_rejects_hosts_pointing_at_blocked_ranges() {
        // "localhost" is normally caught by name; feeding it straight to the
        // resolver exercises the address vetting a rebinding hostname would
        // hit, without depending on external DNS.
        let err = resolve_guarded("localhost", 80).await.unwrap_err();
        assert!(matches!(err, MediaError::DownloadRejected(_)));
    }

    #[tokio::test]
    async fn fetch_refuses_hostnames_resolving_to_loopback() {
        // An allowlisted hostname whose addresses are loopback must never
        // produce a connection.
        let fetcher = Fetcher::new(FetchPolicy::from_allowlist("*", true));
        let url = Url::parse("http://localtest.me/clip.mp4").unwrap();
        let err = fetcher
            .client_for(&url, Duration::from_secs(1))
            .await
            .map(|_| ())
            .unwrap_err();
        // Either rejected outright (resolved to 127.0.0.1) or the lookup
        // failed in an offline sandbox; it must not build a usable client.
        assert!(matches!(
            err,
            MediaError::DownloadRejected(_) | MediaError::DownloadFailed(_)
        ));
    }

    #[test]
    fn kind_bounds() {
        assert_eq!(FetchKind::Video.timeout(), Duration::from_secs(300));
        assert_eq!(FetchKind::Image.timeout(), Duration::from_secs(60));
        assert_eq!(FetchKind::Video.min_bytes(), 1024);
        assert_eq!(FetchKind::Image.min_bytes(), 100);
        assert_eq!(FetchKind::Image.max_bytes(), Some(50 * 1024 * 1024));
    }
}
