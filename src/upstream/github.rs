//! GitHub REST API client
//!
//! This module implements [`UpstreamClient`] against the GitHub REST API:
//! - Building the HTTP client with user agent, token and API headers
//! - Repository search by language with bounded pagination
//! - Per-repository language shares and open issue listing
//! - Single repository and issue lookups
//! - Classifying error responses, in particular primary and secondary rate limits

use crate::config::GitHubConfig;
use crate::model::Language;
use crate::upstream::{
    IssueHandle, LanguageShares, RepoHandle, UpstreamClient, UpstreamError, UpstreamResult,
};
use crate::{ConfigError, HarvestError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Builds an HTTP client configured for the GitHub API
///
/// # Arguments
///
/// * `config` - The GitHub client configuration
/// * `token` - Optional bearer token
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(HarvestError)` - The token is not a valid header value or the client failed to build
pub fn build_http_client(
    config: &GitHubConfig,
    token: Option<&str>,
) -> Result<Client, HarvestError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/vnd.github+json"),
    );
    headers.insert(
        "x-github-api-version",
        HeaderValue::from_static("2022-11-28"),
    );

    if let Some(token) = token {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            ConfigError::Validation("github token contains invalid characters".to_string())
        })?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    let client = Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<RepoHandle>,
}

/// [`UpstreamClient`] backed by the GitHub REST API
pub struct GitHubClient {
    client: Client,
    api_url: String,
    per_page: u32,
    max_search_pages: u32,
    max_issues_per_repo: u32,
    search_qualifiers: String,
}

impl GitHubClient {
    /// Creates a client from configuration, resolving the token from the
    /// environment when the config has none
    pub fn new(config: &GitHubConfig) -> Result<Self, HarvestError> {
        let token = config.resolve_token();
        if token.is_none() {
            tracing::warn!("No GitHub token configured; unauthenticated rate limits apply");
        }

        let client = build_http_client(config, token.as_deref())?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            per_page: config.per_page,
            max_search_pages: config.max_search_pages,
            max_issues_per_repo: config.max_issues_per_repo,
            search_qualifiers: config.search_qualifiers.trim().to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    fn search_query(&self, language: &Language) -> String {
        let mut query = format!("language:\"{}\"", language.name);
        if !self.search_qualifiers.is_empty() {
            query.push(' ');
            query.push_str(&self.search_qualifiers);
        }
        query
    }

    /// Sends a GET request and decodes the JSON body, classifying failures
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        context: &str,
    ) -> UpstreamResult<T> {
        let url = self.endpoint(path);
        tracing::trace!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| UpstreamError::TransientFailure(format!("{}: {}", context, e)))?;

        if response.status().is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| UpstreamError::DataUnavailable(format!("{}: {}", context, e)));
        }

        Err(failure_from_response(response, context).await)
    }
}

#[async_trait]
impl UpstreamClient for GitHubClient {
    async fn list_repositories_by_language(
        &self,
        language: &Language,
    ) -> UpstreamResult<Vec<RepoHandle>> {
        let context = format!("repository search for {}", language.name);
        let query = self.search_query(language);
        let mut repos = Vec::new();

        for page in 1..=self.max_search_pages {
            let response: SearchResponse = self
                .get_json(
                    "search/repositories",
                    &[
                        ("q", query.clone()),
                        ("sort", "updated".to_string()),
                        ("order", "desc".to_string()),
                        ("per_page", self.per_page.to_string()),
                        ("page", page.to_string()),
                    ],
                    &context,
                )
                .await?;

            let received = response.items.len();
            repos.extend(response.items);

            if received < self.per_page as usize {
                break;
            }
        }

        tracing::debug!("Search for {} returned {} repositories", language.name, repos.len());
        Ok(repos)
    }

    async fn get_language_shares(&self, repo: &RepoHandle) -> UpstreamResult<LanguageShares> {
        let context = format!("languages of {}", repo.full_name);
        self.get_json(&format!("repos/{}/languages", repo.full_name), &[], &context)
            .await
            .map_err(|e| match e {
                // Any failure other than a rate limit means the shares are unavailable for now
                UpstreamError::RateLimited { .. } => e,
                other => UpstreamError::TransientFailure(other.to_string()),
            })
    }

    async fn list_issues(&self, repo: &RepoHandle) -> UpstreamResult<Vec<IssueHandle>> {
        let context = format!("issues of {}", repo.full_name);
        self.get_json(
            &format!("repos/{}/issues", repo.full_name),
            &[
                ("state", "open".to_string()),
                ("per_page", self.max_issues_per_repo.to_string()),
            ],
            &context,
        )
        .await
    }

    async fn get_repository_by_id(&self, repo_id: i64) -> UpstreamResult<RepoHandle> {
        let context = format!("repository {}", repo_id);
        self.get_json(&format!("repositories/{}", repo_id), &[], &context)
            .await
    }

    async fn get_issue_by_number(
        &self,
        repo: &RepoHandle,
        number: i64,
    ) -> UpstreamResult<Option<IssueHandle>> {
        let context = format!("issue #{} of {}", number, repo.full_name);
        match self
            .get_json(
                &format!("repos/{}/issues/{}", repo.full_name, number),
                &[],
                &context,
            )
            .await
        {
            Ok(issue) => Ok(Some(issue)),
            Err(UpstreamError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Turns a non-success response into an [`UpstreamError`]
async fn failure_from_response(response: Response, context: &str) -> UpstreamError {
    let status = response.status();
    let remaining = header_str(&response, RATE_LIMIT_REMAINING);
    let reset_at = header_str(&response, RATE_LIMIT_RESET)
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
    let body = response.text().await.unwrap_or_default();

    classify_failure(status, remaining.as_deref(), reset_at, &body, context)
}

fn header_str(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Classifies an error status
///
/// | Condition | Result |
/// |-----------|--------|
/// | HTTP 429 | RateLimited |
/// | HTTP 403 with no remaining quota or a rate-limit message | RateLimited |
/// | HTTP 404 | NotFound |
/// | HTTP 410 | Gone |
/// | anything else | TransientFailure |
pub(crate) fn classify_failure(
    status: StatusCode,
    remaining: Option<&str>,
    reset_at: Option<DateTime<Utc>>,
    body: &str,
    context: &str,
) -> UpstreamError {
    let quota_exhausted = remaining.map(|r| r.trim() == "0").unwrap_or(false);
    let mentions_rate_limit = body.to_lowercase().contains("rate limit");

    match status {
        StatusCode::TOO_MANY_REQUESTS => UpstreamError::RateLimited { reset_at },
        StatusCode::FORBIDDEN if quota_exhausted || mentions_rate_limit => {
            UpstreamError::RateLimited { reset_at }
        }
        StatusCode::NOT_FOUND => UpstreamError::NotFound(context.to_string()),
        StatusCode::GONE => UpstreamError::Gone(context.to_string()),
        other => UpstreamError::TransientFailure(format!("{} returned HTTP {}", context, other)),
    }
}
