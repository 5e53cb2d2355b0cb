use collection_discovery::{ProviderError, Token};
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

pub(crate) const USER_AGENT: &str = "collection-discovery";

/// Page size requested from list endpoints. A shorter page is the last one.
pub(crate) const PER_PAGE: usize = 100;

const MAX_PAGES: u32 = 1000;

/// How the token is presented to the API.
#[derive(Debug, Clone, Copy)]
pub(crate) enum AuthScheme {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// `PRIVATE-TOKEN: <token>`
    PrivateToken,
}

/// Thin GET-only wrapper shared by the provider clients.
pub(crate) struct ApiClient {
    client: reqwest::Client,
    base: Url,
    token: Option<Token>,
    auth: AuthScheme,
}

impl ApiClient {
    pub(crate) fn new(
        api_base: &str,
        token: Option<Token>,
        auth: AuthScheme,
    ) -> Result<Self, ProviderError> {
        let base = Url::parse(api_base).map_err(|e| {
            ProviderError::Unavailable(format!("invalid API base URL '{api_base}': {e}"))
        })?;
        if base.cannot_be_a_base() {
            return Err(ProviderError::Unavailable(format!(
                "API base URL '{api_base}' cannot carry a path"
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base,
            token,
            auth,
        })
    }

    /// The API base with `segments` appended. Each segment is
    /// percent-encoded on its own, so a `/` inside one stays escaped.
    pub(crate) fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, url: Url) -> reqwest::RequestBuilder {
        let mut req = self.client.get(url).header("User-Agent", USER_AGENT);

        if let Some(token) = &self.token {
            req = match self.auth {
                AuthScheme::Bearer => {
                    req.header("Authorization", format!("Bearer {}", token.expose()))
                }
                AuthScheme::PrivateToken => req.header("PRIVATE-TOKEN", token.expose()),
            };
        }

        req
    }

    async fn send(&self, url: Url) -> Result<reqwest::Response, ProviderError> {
        debug!(url = %url, "GET");
        let response = self
            .request(url.clone())
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("GET {} failed: {e}", url.path())))?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(error_for_status(status, response.headers(), &url))
        }
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ProviderError> {
        let path = url.path().to_owned();
        self.send(url)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("unexpected response from {path}: {e}")))
    }

    pub(crate) async fn get_text(&self, url: Url) -> Result<String, ProviderError> {
        let path = url.path().to_owned();
        self.send(url)
            .await?
            .text()
            .await
            .map_err(|e| ProviderError::Parse(format!("unreadable body from {path}: {e}")))
    }

    /// Follow `page`/`per_page` pagination until a short page.
    pub(crate) async fn get_paged<T: DeserializeOwned>(
        &self,
        url: Url,
    ) -> Result<Vec<T>, ProviderError> {
        let mut items = Vec::new();

        for page in 1..=MAX_PAGES {
            let mut page_url = url.clone();
            page_url
                .query_pairs_mut()
                .append_pair("per_page", &PER_PAGE.to_string())
                .append_pair("page", &page.to_string());

            let batch: Vec<T> = self.get_json(page_url).await?;
            let last = batch.len() < PER_PAGE;
            items.extend(batch);
            if last {
                return Ok(items);
            }
        }

        debug!(url = %url, pages = MAX_PAGES, "stopped paginating at page limit");
        Ok(items)
    }
}

fn rate_limit_exhausted(headers: &HeaderMap) -> bool {
    ["x-ratelimit-remaining", "ratelimit-remaining"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .any(|value| value.to_str().map(|v| v.trim() == "0").unwrap_or(false))
}

pub(crate) fn error_for_status(status: StatusCode, headers: &HeaderMap, url: &Url) -> ProviderError {
    let what = format!("HTTP {status} from {}", url.path());
    match status {
        StatusCode::UNAUTHORIZED => ProviderError::Auth(what),
        StatusCode::FORBIDDEN if rate_limit_exhausted(headers) => {
            ProviderError::Unavailable(format!("rate limit exhausted: {what}"))
        }
        StatusCode::FORBIDDEN => ProviderError::Auth(what),
        StatusCode::NOT_FOUND => ProviderError::NotFound(what),
        _ => ProviderError::Unavailable(what),
    }
}
