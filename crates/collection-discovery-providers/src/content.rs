use serde::Deserialize;

/// Entry of `GET /orgs/{org}/repos` or `GET /users/{user}/repos`.
#[derive(Debug, Deserialize)]
pub struct RepoResponse {
    pub name: String,
    pub full_name: String,
    pub default_branch: Option<String>,
    pub html_url: Option<String>,
    pub description: Option<String>,
}

/// Entry of `GET /repos/{owner}/{repo}/branches` or `.../tags`.
#[derive(Debug, Deserialize)]
pub struct NamedRef {
    pub name: String,
}

/// Entry of a directory listing from the Contents API.
/// `GET /repos/{owner}/{repo}/contents/{path}?ref={ref}`
#[derive(Debug, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
}

/// A single file from the Contents API.
#[derive(Debug, Deserialize)]
pub struct ContentResponse {
    pub path: String,
    pub content: Option<String>,
    pub encoding: Option<String>,
}
