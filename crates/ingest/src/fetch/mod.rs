//! SSRF-safe HTTP fetcher with size, time, and redirect caps
//!
//! The fetcher is the only component that opens sockets. Every hop —
//! including each redirect — passes the network guard, and with an
//! enforcing allowlist policy every dispatch first resolves the host
//! through the allowlist engine (unknown hosts are handed to the
//! verifier/enroller when an organization context is present).

pub mod guard;
pub mod url;

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, LOCATION, USER_AGENT};
use sqlx::PgPool;
use teammeet_core::types::{OrgId, UserId};
use teammeet_core::{IngestError, IngestResult};
use tracing::{debug, warn};
use self::url::normalize_url;
use ::url::Url;

use crate::allowlist::{self, DecisionSource, HostStatus, OverrideRules};
use crate::verify::{self, VerifyRequest};

const SCHEDULE_USER_AGENT: &str = "TeamMeet-ScheduleSync/1.0";
const SCHEDULE_ACCEPT: &str = "text/html,application/json,text/calendar,text/plain";

const VERIFY_TIMEOUT: Duration = Duration::from_secs(8);
const VERIFY_MAX_BYTES: u64 = 256 * 1024;
const FULL_TIMEOUT: Duration = Duration::from_secs(12);
const FULL_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// How much of a response a fetch is willing to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Small sample for detection and verification: 8 s / 256 KiB
    Verify,
    /// Full page or feed: 12 s / 5 MiB
    Full,
}

/// Whether this fetch consults the allowlist engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowlistMode {
    Enforce,
    Skip,
}

/// Per-request options
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub mode: FetchMode,
    pub timeout: Option<Duration>,
    pub max_bytes: Option<u64>,
    pub headers: Vec<(String, String)>,
    pub org_id: Option<OrgId>,
    pub user_id: Option<UserId>,
    pub vendor: Option<String>,
    pub allowlist: AllowlistMode,
}

impl FetchOptions {
    pub fn verify() -> Self {
        Self {
            mode: FetchMode::Verify,
            timeout: None,
            max_bytes: None,
            headers: Vec::new(),
            org_id: None,
            user_id: None,
            vendor: None,
            allowlist: AllowlistMode::Enforce,
        }
    }

    pub fn full() -> Self {
        Self {
            mode: FetchMode::Full,
            ..Self::verify()
        }
    }

    pub fn with_org(mut self, org_id: OrgId) -> Self {
        self.org_id = Some(org_id);
        self
    }

    pub fn with_user(mut self, user_id: Option<UserId>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_vendor(mut self, vendor: &str) -> Self {
        self.vendor = Some(vendor.to_string());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn skip_allowlist(mut self) -> Self {
        self.allowlist = AllowlistMode::Skip;
        self
    }

    fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(match self.mode {
            FetchMode::Verify => VERIFY_TIMEOUT,
            FetchMode::Full => FULL_TIMEOUT,
        })
    }

    fn max_bytes(&self) -> u64 {
        self.max_bytes.unwrap_or(match self.mode {
            FetchMode::Verify => VERIFY_MAX_BYTES,
            FetchMode::Full => FULL_MAX_BYTES,
        })
    }
}

/// A fetched response after redirects
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    pub text: String,
}

impl FetchedPage {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }
}

/// Network policy: allowed ports and private-network blocking
///
/// Production constructors use the default policy. The permissive policy
/// exists for tests that stand up loopback servers on ephemeral ports.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Explicit ports accepted in URLs; empty means any
    pub allowed_ports: Vec<u16>,
    pub block_private_networks: bool,
    pub max_redirects: u32,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            allowed_ports: vec![80, 443],
            block_private_networks: true,
            max_redirects: 2,
        }
    }
}

impl FetchPolicy {
    pub fn permissive() -> Self {
        Self {
            allowed_ports: Vec::new(),
            block_private_networks: false,
            max_redirects: 2,
        }
    }

    pub fn port_allowed(&self, port: u16) -> bool {
        self.allowed_ports.is_empty() || self.allowed_ports.contains(&port)
    }
}

/// Allowlist behavior fixed at construction
///
/// Production builds construct `Enforce`; there is no way to override
/// decisions on an enforcing fetcher. `Override` exists for tests and
/// local tooling.
pub enum AllowlistPolicy {
    Enforce { pool: PgPool },
    Skip,
    Override(OverrideRules),
}

/// SSRF-safe fetcher shared by connectors, the detector, and the verifier
pub struct SafeFetcher {
    client: reqwest::Client,
    policy: FetchPolicy,
    allowlist: AllowlistPolicy,
}

impl SafeFetcher {
    pub fn new(allowlist: AllowlistPolicy) -> IngestResult<Self> {
        Self::with_policy(allowlist, FetchPolicy::default())
    }

    pub fn with_policy(allowlist: AllowlistPolicy, policy: FetchPolicy) -> IngestResult<Self> {
        // Redirects are followed manually so each hop can be re-vetted
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| IngestError::FetchFailed(format!("client init: {e}")))?;

        Ok(Self {
            client,
            policy,
            allowlist,
        })
    }

    /// Fetch a URL, enforcing the allowlist unless the request or the
    /// fetcher's policy says otherwise
    pub async fn fetch(&self, raw_url: &str, opts: &FetchOptions) -> IngestResult<FetchedPage> {
        let url = normalize_url(raw_url, &self.policy)?;

        if opts.allowlist == AllowlistMode::Enforce {
            self.enforce_allowlist(&url, opts).await?;
        }

        self.transport(url, opts).await
    }

    /// Fetch without consulting the allowlist. The SSRF guard still runs.
    ///
    /// This is the verifier's entry point; everything else goes through
    /// [`SafeFetcher::fetch`].
    pub(crate) async fn fetch_unchecked(
        &self,
        raw_url: &str,
        opts: &FetchOptions,
    ) -> IngestResult<FetchedPage> {
        let url = normalize_url(raw_url, &self.policy)?;
        self.transport(url, opts).await
    }

    async fn enforce_allowlist(&self, url: &Url, opts: &FetchOptions) -> IngestResult<()> {
        let host = url
            .host_str()
            .ok_or_else(|| IngestError::InvalidUrl(format!("{url}: missing host")))?;
        let host = allowlist::normalize_hostname(host);

        let pool = match &self.allowlist {
            AllowlistPolicy::Skip => return Ok(()),
            AllowlistPolicy::Override(rules) => {
                return match rules.decide(&host) {
                    HostStatus::Active => Ok(()),
                    _ => Err(IngestError::AllowlistDenied(host)),
                };
            }
            AllowlistPolicy::Enforce { pool } => pool,
        };

        let decision =
            allowlist::check_host_status(pool, &host, opts.vendor.as_deref(), None).await?;

        match decision.status {
            HostStatus::Active => {
                if decision.source == DecisionSource::Domain {
                    if let Err(e) = allowlist::touch_allowed_domain(pool, &host).await {
                        warn!(host = %host, error = %e, "Failed to bump domain last_seen_at");
                    }
                }
                Ok(())
            }
            HostStatus::Blocked => Err(IngestError::AllowlistBlocked(host)),
            HostStatus::Pending => Err(IngestError::AllowlistPending(host)),
            HostStatus::Denied => {
                let Some(org_id) = opts.org_id else {
                    return Err(IngestError::AllowlistDenied(host));
                };

                debug!(host = %host, %org_id, "Unknown host, attempting verification");
                let outcome = verify::verify_and_enroll(
                    self,
                    pool,
                    &VerifyRequest {
                        url: url.as_str(),
                        org_id,
                        user_id: opts.user_id,
                        vendor_hint: opts.vendor.as_deref(),
                    },
                )
                .await?;

                match outcome.allow_status {
                    HostStatus::Active => Ok(()),
                    HostStatus::Blocked => Err(IngestError::AllowlistBlocked(host)),
                    HostStatus::Pending => Err(IngestError::AllowlistPending(host)),
                    HostStatus::Denied => Err(IngestError::AllowlistDenied(host)),
                }
            }
        }
    }

    /// Transport loop: guard, dispatch, follow at most `max_redirects`
    /// hops, stream the body against the byte cap. The whole loop runs
    /// under one absolute timeout.
    async fn transport(&self, url: Url, opts: &FetchOptions) -> IngestResult<FetchedPage> {
        let timeout = opts.timeout();
        tokio::time::timeout(timeout, self.transport_inner(url, opts))
            .await
            .map_err(|_| IngestError::FetchFailed(format!("timed out after {timeout:?}")))?
    }

    async fn transport_inner(&self, mut url: Url, opts: &FetchOptions) -> IngestResult<FetchedPage> {
        let max_bytes = opts.max_bytes();
        let mut redirects = 0u32;

        loop {
            guard::guard_resolved(&url, &self.policy).await?;

            let mut headers = HeaderMap::new();
            headers.insert(USER_AGENT, HeaderValue::from_static(SCHEDULE_USER_AGENT));
            headers.insert(ACCEPT, HeaderValue::from_static(SCHEDULE_ACCEPT));
            for (name, value) in &opts.headers {
                match (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    // insert, not append: per-request headers replace the defaults
                    (Ok(name), Ok(value)) => {
                        headers.insert(name, value);
                    }
                    _ => warn!(header = %name, "Skipping invalid request header"),
                }
            }

            let response = self
                .client
                .get(url.clone())
                .headers(headers)
                .send()
                .await
                .map_err(|e| IngestError::FetchFailed(format!("{url}: {e}")))?;

            if response.status().is_redirection() {
                redirects += 1;
                if redirects > self.policy.max_redirects {
                    return Err(IngestError::TooManyRedirects(self.policy.max_redirects));
                }
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        IngestError::FetchFailed(format!("{url}: redirect without Location"))
                    })?;
                url = self::url::resolve_redirect(&url, location, &self.policy)?;
                continue;
            }

            let status = response.status();
            if status.as_u16() >= 400 {
                return Err(IngestError::FetchFailed(format!("HTTP {status} from {url}")));
            }

            if let Some(declared) = response.content_length() {
                if declared > max_bytes {
                    return Err(IngestError::ResponseTooLarge(max_bytes));
                }
            }

            let headers = response.headers().clone();
            let mut body: Vec<u8> = Vec::new();
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk =
                    chunk.map_err(|e| IngestError::FetchFailed(format!("{url}: {e}")))?;
                if body.len() as u64 + chunk.len() as u64 > max_bytes {
                    return Err(IngestError::ResponseTooLarge(max_bytes));
                }
                body.extend_from_slice(&chunk);
            }

            return Ok(FetchedPage {
                final_url: url,
                status: status.as_u16(),
                headers,
                text: String::from_utf8_lossy(&body).into_owned(),
            });
        }
    }
}
