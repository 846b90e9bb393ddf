//! GitHub-backed hosting client: GraphQL for repository metadata, REST for license and
//! README.

mod graphql;

use std::time::Duration;

use common::{error::AppError, utils::config::AppConfig};
use reqwest::{
    header::{ACCEPT, ETAG},
    Method, RequestBuilder, Response, StatusCode,
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::debug;

use self::graphql::{GraphQlRequest, GraphQlResponse, RepositoryVariables, METADATA_QUERY};
use crate::types::{FetchedLicense, FetchedMetadata, FetchedReadme};

const USER_AGENT: &str = "registry-ingest";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const HTML_MEDIA_TYPE: &str = "application/vnd.github.html";
const RETRY_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LicenseResponse {
    html_url: Option<String>,
    license: Option<LicenseInfo>,
}

#[derive(Debug, Deserialize)]
struct LicenseInfo {
    spdx_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadmeResponse {
    html_url: String,
}

impl GithubClient {
    pub fn new(
        api_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        let api_url = api_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            http,
            api_url,
            token,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            config.github_api_url.clone(),
            config.github_token.clone(),
            Duration::from_secs(config.http_timeout_secs),
        )
    }

    pub async fn fetch_metadata(&self, url: &str) -> Result<FetchedMetadata, AppError> {
        let (owner, name) = parse_repository_url(url)?;
        let body = GraphQlRequest {
            query: METADATA_QUERY,
            variables: RepositoryVariables {
                owner: &owner,
                name: &name,
            },
        };

        let response = self
            .execute(|| self.request(Method::POST, "/graphql").json(&body))
            .await?
            .error_for_status()?;
        let payload: GraphQlResponse = response.json().await?;

        payload.into_metadata().map_err(AppError::HostingApi)
    }

    /// `Ok(None)` when the repository has no detectable license.
    pub async fn fetch_license(&self, url: &str) -> Result<Option<FetchedLicense>, AppError> {
        let (owner, name) = parse_repository_url(url)?;
        let path = format!("/repos/{owner}/{name}/license");

        let response = self
            .execute(|| self.request(Method::GET, &path).header(ACCEPT, JSON_MEDIA_TYPE))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(%url, "repository has no license");
            return Ok(None);
        }

        let payload: LicenseResponse = response.error_for_status()?.json().await?;
        Ok(Some(FetchedLicense {
            spdx_id: payload.license.and_then(|license| license.spdx_id),
            html_url: payload.html_url,
        }))
    }

    /// `Ok(None)` when the repository has no README.
    pub async fn fetch_readme(&self, url: &str) -> Result<Option<FetchedReadme>, AppError> {
        let (owner, name) = parse_repository_url(url)?;
        let path = format!("/repos/{owner}/{name}/readme");

        let response = self
            .execute(|| self.request(Method::GET, &path).header(ACCEPT, JSON_MEDIA_TYPE))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(%url, "repository has no readme");
            return Ok(None);
        }
        let ReadmeResponse { html_url } = response.error_for_status()?.json().await?;

        let response = self
            .execute(|| self.request(Method::GET, &path).header(ACCEPT, HTML_MEDIA_TYPE))
            .await?
            .error_for_status()?;
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let html = response.text().await?;
        let etag = etag.unwrap_or_else(|| content_etag(&html));

        Ok(Some(FetchedReadme {
            html,
            html_url,
            etag,
        }))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{path}", self.api_url));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends the request built by `build`, retrying connection failures, timeouts and
    /// server errors with jittered exponential backoff. Other statuses are returned as-is.
    async fn execute<F>(&self, build: F) -> Result<Response, reqwest::Error>
    where
        F: Fn() -> RequestBuilder,
    {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(100)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(RETRY_ATTEMPTS);
        let build = &build;

        RetryIf::spawn(
            strategy,
            move || async move {
                let response = build().send().await?;
                if response.status().is_server_error() {
                    return response.error_for_status();
                }
                Ok(response)
            },
            is_transient,
        )
        .await
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout()
        || error.is_connect()
        || error.status().is_some_and(|status| status.is_server_error())
}

/// Fingerprint used when the host omits an ETag header.
fn content_etag(html: &str) -> String {
    let digest = Sha256::digest(html.as_bytes());
    format!("\"{digest:x}\"")
}

/// Splits `https://github.com/<owner>/<name>[.git]` into owner and name.
pub fn parse_repository_url(url: &str) -> Result<(String, String), AppError> {
    let invalid = || AppError::Validation(format!("not a GitHub repository url: {url}"));

    let parsed = url::Url::parse(url).map_err(|_| invalid())?;
    if !matches!(parsed.host_str(), Some("github.com" | "www.github.com")) {
        return Err(invalid());
    }

    let mut segments = parsed
        .path_segments()
        .ok_or_else(invalid)?
        .filter(|segment| !segment.is_empty());
    let owner = segments.next().ok_or_else(invalid)?;
    let name = segments.next().ok_or_else(invalid)?;
    if segments.next().is_some() {
        return Err(invalid());
    }

    let name = name.strip_suffix(".git").unwrap_or(name);
    if name.is_empty() {
        return Err(invalid());
    }

    Ok((owner.to_string(), name.to_string()))
}
