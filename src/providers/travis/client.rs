use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::error::{BuildTrendsError, Result};
use crate::models::BuildRecord;

pub const DEFAULT_API_URL: &str = "https://api.travis-ci.org/";

const ACCEPT_V2: &str = "application/vnd.travis-ci.2+json";

pub struct TravisClient {
    client: Client,
    api_url: Url,
}

#[derive(Debug, Deserialize)]
struct BuildsPageDto {
    builds: Vec<BuildRecord>,
}

impl TravisClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("buildtrends/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                BuildTrendsError::ConfigError(format!("Failed to create HTTP client: {e}"))
            })?;

        let api_url = Url::parse(base_url)
            .map_err(|e| BuildTrendsError::ConfigError(format!("Invalid base URL: {e}")))?;

        Ok(Self { client, api_url })
    }

    /// Construct the builds listing URL for a repository.
    ///
    /// `repo` is either a GitHub `owner/name` slug or a numeric repository id.
    pub fn builds_url(&self, repo: &str) -> Result<Url> {
        let base = if self.api_url.path().ends_with('/') {
            self.api_url.clone()
        } else {
            let mut base = self.api_url.clone();
            base.set_path(&format!("{}/", self.api_url.path()));
            base
        };

        base.join(&format!("repos/{repo}/builds"))
            .map_err(|e| BuildTrendsError::ConfigError(format!("Invalid builds URL: {e}")))
    }

    /// Fetch one page of builds, newest first.
    ///
    /// With `before` set, only builds numbered lower than it are returned.
    pub async fn fetch_builds_page(
        &self,
        repo: &str,
        before: Option<u64>,
    ) -> Result<Vec<BuildRecord>> {
        let url = self.builds_url(repo)?;

        let mut request = self.client.get(url).header("Accept", ACCEPT_V2);
        if let Some(before) = before {
            request = request.query(&[("after_number", before)]);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BuildTrendsError::ApiError { status, body });
        }

        let page = response.json::<BuildsPageDto>().await?;
        Ok(page.builds)
    }
}
