//! Registry backends.
//!
//! A [`RegistryBackend`] performs the raw reads for one repository. The
//! [`RepositoryClient`](crate::RepositoryClient) layers caching, rate limiting
//! and manifest interpretation on top.

use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, LINK, WWW_AUTHENTICATE};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::{RegistryAuth, RegistryConfig, RepositoryRef};
use crate::error::{RegistryError, Result};
use crate::oci::{ImageConfig, ManifestResponse, MediaType, TagList};

/// Header carrying the canonical manifest digest.
const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

/// Raw read access to one image repository.
#[async_trait]
pub trait RegistryBackend: Send + Sync + fmt::Debug {
    /// Lists every tag in the repository.
    async fn list_tags(&self) -> Result<Vec<String>>;

    /// Fetches the manifest or index for a tag or digest.
    ///
    /// Returns `Ok(None)` when the registry reports the reference as not
    /// found.
    async fn fetch_manifest(&self, reference: &str) -> Result<Option<ManifestResponse>>;

    /// Fetches and decodes an image config blob.
    async fn fetch_config(&self, digest: &str) -> Result<ImageConfig>;
}

/// Backend speaking the OCI Distribution HTTP API.
pub struct OciBackend {
    repo: RepositoryRef,
    config: RegistryConfig,
    http: reqwest::Client,
    token: Mutex<Option<String>>,
}

impl fmt::Debug for OciBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OciBackend")
            .field("repo", &self.repo)
            .field("auth", &self.config.auth)
            .finish_non_exhaustive()
    }
}

impl OciBackend {
    /// Creates a backend for the given repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use yardmaster_registry::{OciBackend, RegistryConfig, RepositoryRef};
    ///
    /// let repo = RepositoryRef::parse("ghcr.io/acme/api")?;
    /// let backend = OciBackend::new(repo, RegistryConfig::new())?;
    /// # Ok::<(), yardmaster_registry::RegistryError>(())
    /// ```
    pub fn new(repo: RepositoryRef, config: RegistryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(config.insecure_skip_tls_verify)
            .build()
            .map_err(|e| RegistryError::ConnectionFailed {
                url: repo.api_base(),
                source: e,
            })?;
        Ok(Self {
            repo,
            config,
            http,
            token: Mutex::new(None),
        })
    }

    /// Returns the repository this backend reads.
    #[must_use]
    pub const fn repository(&self) -> &RepositoryRef {
        &self.repo
    }

    /// Issues a GET, answering one bearer-token challenge if the registry
    /// asks for it.
    async fn get(&self, url: &str, accept: Option<&str>) -> Result<Response> {
        let response = self.send(url, accept).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(challenge) = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(BearerChallenge::parse)
        else {
            return Ok(response);
        };
        if matches!(self.config.auth, RegistryAuth::Bearer { .. }) {
            return Ok(response);
        }

        let token = self.fetch_token(&challenge).await?;
        *self.token.lock() = Some(token);
        self.send(url, accept).await
    }

    async fn send(&self, url: &str, accept: Option<&str>) -> Result<Response> {
        let mut request = self.http.get(url).headers(self.auth_headers()?);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        Ok(request.send().await?)
    }

    /// Exchanges credentials (or nothing) for a registry token.
    async fn fetch_token(&self, challenge: &BearerChallenge) -> Result<String> {
        #[derive(Deserialize)]
        struct TokenResponse {
            token: Option<String>,
            access_token: Option<String>,
        }

        let mut url = url::Url::parse(&challenge.realm).map_err(|_| {
            RegistryError::AuthenticationFailed {
                message: format!("invalid token realm '{}'", challenge.realm),
            }
        })?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = &challenge.service {
                query.append_pair("service", service);
            }
            let scope = challenge
                .scope
                .clone()
                .unwrap_or_else(|| format!("repository:{}:pull", self.repo.path));
            query.append_pair("scope", &scope);
        }

        let mut request = self.http.get(url.as_str());
        if let RegistryAuth::Basic { username, password } = &self.config.auth {
            request = request.basic_auth(username, Some(password));
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(RegistryError::AuthenticationFailed {
                message: format!("token endpoint returned {}", response.status()),
            });
        }

        let body: TokenResponse = response.json().await?;
        tracing::debug!(registry = %self.repo.host, "Obtained registry token");
        body.token
            .or(body.access_token)
            .ok_or_else(|| RegistryError::AuthenticationFailed {
                message: "token endpoint returned no token".to_string(),
            })
    }

    /// Creates authentication headers based on configuration.
    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        let value = match (&self.config.auth, self.token.lock().as_deref()) {
            (RegistryAuth::Bearer { token }, _) => Some(format!("Bearer {token}")),
            (_, Some(token)) => Some(format!("Bearer {token}")),
            (RegistryAuth::Basic { username, password }, None) => {
                let credentials = base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    format!("{username}:{password}"),
                );
                Some(format!("Basic {credentials}"))
            }
            (RegistryAuth::None, None) => None,
        };

        if let Some(value) = value {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&value).map_err(|_| {
                    RegistryError::AuthenticationFailed {
                        message: "Invalid credentials".to_string(),
                    }
                })?,
            );
        }
        Ok(headers)
    }

    fn base(&self) -> String {
        format!("{}/{}", self.repo.api_base(), self.repo.path)
    }

    fn origin(&self) -> String {
        format!("{}://{}", self.repo.scheme, self.repo.host)
    }

    async fn error_for(response: Response) -> RegistryError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        if status == 401 || status == 403 {
            RegistryError::AuthenticationFailed {
                message: format!("{status}: {message}"),
            }
        } else {
            RegistryError::HttpError { status, message }
        }
    }
}

#[async_trait]
impl RegistryBackend for OciBackend {
    async fn list_tags(&self) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        let mut next = Some(format!("{}/tags/list", self.base()));

        while let Some(url) = next.take() {
            let response = self.get(&url, None).await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(Vec::new());
            }
            if !response.status().is_success() {
                return Err(Self::error_for(response).await);
            }

            next = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_link)
                .map(|link| {
                    if link.starts_with('/') {
                        format!("{}{link}", self.origin())
                    } else {
                        link
                    }
                });

            let page: TagList = response.json().await?;
            tags.extend(page.tags.unwrap_or_default());
        }

        tracing::debug!(repository = %self.repo, count = tags.len(), "Listed tags");
        Ok(tags)
    }

    async fn fetch_manifest(&self, reference: &str) -> Result<Option<ManifestResponse>> {
        let url = format!("{}/manifests/{reference}", self.base());
        let response = self.get(&url, Some(&MediaType::ACCEPT_ALL.join(", "))).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let header_digest = response
            .headers()
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body = response.bytes().await?;

        let digest = header_digest
            .or_else(|| reference.starts_with("sha256:").then(|| reference.to_string()))
            .unwrap_or_else(|| compute_digest(&body));
        ManifestResponse::decode(reference, content_type.as_deref(), digest, &body).map(Some)
    }

    async fn fetch_config(&self, digest: &str) -> Result<ImageConfig> {
        let url = format!("{}/blobs/{digest}", self.base());
        let response = self.get(&url, None).await?;
        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }
        Ok(response.json().await?)
    }
}

/// Computes the SHA-256 digest of a manifest body.
fn compute_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Extracts the `rel="next"` target from a `Link` header.
fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        params
            .split(';')
            .any(|p| p.trim().replace(' ', "") == "rel=\"next\"")
            .then(|| {
                target
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string()
            })
    })
}

/// A parsed `WWW-Authenticate: Bearer ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BearerChallenge {
    realm: String,
    service: Option<String>,
    scope: Option<String>,
}

impl BearerChallenge {
    fn parse(header: &str) -> Option<Self> {
        let params = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))?;

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for (key, value) in split_params(params) {
            match key.as_str() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }
        Some(Self {
            realm: realm?,
            service,
            scope,
        })
    }
}

/// Splits `k="v",k2="v,2"` honoring quotes.
fn split_params(params: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut rest = params.trim();
    while !rest.is_empty() {
        let Some((key, after)) = rest.split_once('=') else {
            break;
        };
        let key = key.trim().trim_start_matches(',').trim().to_ascii_lowercase();
        let (value, remainder) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            match after.find(',') {
                Some(end) => (&after[..end], &after[end..]),
                None => (after, ""),
            }
        };
        out.push((key, value.to_string()));
        rest = remainder.trim_start_matches(',').trim();
    }
    out
}
