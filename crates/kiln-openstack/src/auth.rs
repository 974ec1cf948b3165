use std::sync::{Mutex, PoisonError};

use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::config::OpenStackConfig;
use crate::errors::OpenStackError;

/// Tokens this close to expiry are renewed before use.
const EXPIRY_MARGIN: Duration = Duration::seconds(60);

/// An authenticated Keystone token and the endpoints it unlocks.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub token: String,
    pub compute: Url,
    pub image: Option<Url>,
    pub volume: Option<Url>,
    pub expires_at: Option<OffsetDateTime>,
}

impl Session {
    fn is_fresh(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_none_or(|at| at - now > EXPIRY_MARGIN)
    }

    pub fn image(&self) -> Result<&Url, OpenStackError> {
        self.image
            .as_ref()
            .ok_or_else(|| OpenStackError::MissingEndpoint("image".into()))
    }

    pub fn volume(&self) -> Result<&Url, OpenStackError> {
        self.volume
            .as_ref()
            .ok_or_else(|| OpenStackError::MissingEndpoint("volumev3".into()))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Token,
}

#[derive(Deserialize)]
struct Token {
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Deserialize)]
struct Endpoint {
    interface: String,
    #[serde(default)]
    region_id: Option<String>,
    #[serde(default)]
    region: Option<String>,
    url: String,
}

/// Keystone v3 password authentication with a cached token.
pub(crate) struct Authenticator {
    http: reqwest::Client,
    tokens_url: Url,
    config: OpenStackConfig,
    cached: Mutex<Option<Session>>,
}

impl Authenticator {
    pub fn new(http: reqwest::Client, config: OpenStackConfig) -> Result<Self, OpenStackError> {
        let base = Url::parse(&config.auth_url)
            .map_err(|e| OpenStackError::InvalidUrl(format!("{}: {e}", config.auth_url)))?;
        let tokens_url = join(&base, &["auth", "tokens"])?;
        Ok(Self {
            http,
            tokens_url,
            config,
            cached: Mutex::new(None),
        })
    }

    /// A valid session, authenticating when the cached token is missing or about to expire.
    pub async fn session(&self) -> Result<Session, OpenStackError> {
        let now = OffsetDateTime::now_utc();
        let cached = self
            .cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|s| s.is_fresh(now));
        if let Some(session) = cached {
            return Ok(session);
        }

        let session = self.authenticate().await?;
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(session)
    }

    /// Drop the cached token, e.g. after the API rejected it.
    pub fn invalidate(&self) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    async fn authenticate(&self) -> Result<Session, OpenStackError> {
        let cfg = &self.config;
        debug!(url = %self.tokens_url, user = %cfg.username, "openstack: authenticating");
        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": cfg.username,
                            "domain": {"name": cfg.user_domain_name},
                            "password": cfg.password,
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": cfg.project_name,
                        "domain": {"name": cfg.project_domain_name},
                    }
                }
            }
        });

        let response = self
            .http
            .post(self.tokens_url.clone())
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OpenStackError::Auth(format!("{status}: {text}")));
        }
        let token = response
            .headers()
            .get("x-subject-token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| OpenStackError::Auth("response carries no X-Subject-Token".into()))?;
        let parsed: TokenResponse = response.json().await?;

        let region = cfg.region.as_deref();
        let interface = cfg.interface.as_str();
        let find = |kind: &str| endpoint(&parsed.token.catalog, kind, interface, region);

        let compute = find("compute").ok_or_else(|| OpenStackError::MissingEndpoint("compute".into()))?;
        let expires_at = parsed
            .token
            .expires_at
            .as_deref()
            .and_then(|at| OffsetDateTime::parse(at, &Rfc3339).ok());

        Ok(Session {
            token,
            compute,
            image: find("image"),
            volume: find("volumev3").or_else(|| find("block-storage")),
            expires_at,
        })
    }
}

fn endpoint(catalog: &[CatalogEntry], kind: &str, interface: &str, region: Option<&str>) -> Option<Url> {
    catalog
        .iter()
        .filter(|entry| entry.kind == kind)
        .flat_map(|entry| entry.endpoints.iter())
        .filter(|ep| ep.interface == interface)
        .find(|ep| match region {
            Some(region) => {
                ep.region_id.as_deref() == Some(region) || ep.region.as_deref() == Some(region)
            }
            None => true,
        })
        .and_then(|ep| Url::parse(&ep.url).ok())
}

/// Append path segments to a base URL.
pub(crate) fn join(base: &Url, segments: &[&str]) -> Result<Url, OpenStackError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| OpenStackError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
