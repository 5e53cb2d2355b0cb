use serde::Deserialize;

/// Entry of `GET /groups/{group}/projects`.
#[derive(Debug, Deserialize)]
pub struct ProjectResponse {
    pub name: String,
    pub path_with_namespace: String,
    pub default_branch: Option<String>,
    pub web_url: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

/// Entry of `GET /projects/{id}/repository/branches` or `.../tags`.
#[derive(Debug, Deserialize)]
pub struct RefResponse {
    pub name: String,
}

/// Entry of `GET /projects/{id}/repository/tree`.
#[derive(Debug, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
}
