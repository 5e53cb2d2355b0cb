use collection_discovery::{
    EntryKind, ProviderClient, ProviderError, ProviderKind, RepositoryInfo, SourceConfig, Token,
};
use collection_discovery_providers::GitLabClient;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source_for(server: &MockServer) -> SourceConfig {
    let mut source =
        SourceConfig::new("test", ProviderKind::Gitlab, "gitlab.example.com", "platform");
    source.host = Some(format!("{}/api/v4", server.uri()));
    source
}

fn client_for(server: &MockServer) -> GitLabClient {
    GitLabClient::new(&source_for(server)).unwrap()
}

fn project() -> RepositoryInfo {
    RepositoryInfo::new("collections", "platform/infra/collections", "main")
}

#[tokio::test]
async fn list_repositories_includes_subgroups_and_skips_unusable_projects() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/groups/platform/projects"))
        .and(query_param("include_subgroups", "true"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "name": "collections",
                "path_with_namespace": "platform/infra/collections",
                "default_branch": "main",
                "web_url": "https://gitlab.example.com/platform/infra/collections",
                "description": "Shared collections"
            },
            {
                "name": "empty",
                "path_with_namespace": "platform/empty",
                "default_branch": null,
                "web_url": "https://gitlab.example.com/platform/empty",
                "description": null
            },
            {
                "name": "old",
                "path_with_namespace": "platform/old",
                "default_branch": "master",
                "web_url": "https://gitlab.example.com/platform/old",
                "description": null,
                "archived": true
            }
        ])))
        .mount(&server)
        .await;

    let repos = client_for(&server).list_repositories().await.unwrap();

    assert_eq!(repos.len(), 1);
    assert_eq!(repos[0].full_path, "platform/infra/collections");
    assert_eq!(repos[0].description.as_deref(), Some("Shared collections"));
}

#[tokio::test]
async fn private_token_header_is_used() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/groups/platform/projects"))
        .and(header("PRIVATE-TOKEN", "glpat-xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let mut source = source_for(&server);
    source.token = Some(Token::new("glpat-xyz"));
    let client = GitLabClient::new(&source).unwrap();

    assert!(client.list_repositories().await.unwrap().is_empty());
}

#[tokio::test]
async fn tree_listing_uses_encoded_project_id() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/projects/platform%2Finfra%2Fcollections/repository/tree"))
        .and(query_param("ref", "v2.0.0"))
        .and(query_param("path", "ansible_collections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "galaxy.yml", "path": "ansible_collections/galaxy.yml", "type": "blob"},
            {"name": "roles", "path": "ansible_collections/roles", "type": "tree"},
            {"name": "sub", "path": "ansible_collections/sub", "type": "commit"}
        ])))
        .mount(&server)
        .await;

    let entries = client_for(&server)
        .list_directory(&project(), "v2.0.0", "ansible_collections")
        .await
        .unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, EntryKind::File);
    assert_eq!(entries[1].kind, EntryKind::Dir);
    assert_eq!(entries[1].path, "ansible_collections/roles");
}

#[tokio::test]
async fn read_file_returns_raw_text() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(
            "/api/v4/projects/platform%2Finfra%2Fcollections/repository/files/sub%2Fgalaxy.yml/raw",
        ))
        .and(query_param("ref", "main"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("namespace: platform\nname: infra\n"),
        )
        .mount(&server)
        .await;

    let content = client_for(&server)
        .read_file(&project(), "main", "sub/galaxy.yml")
        .await
        .unwrap();

    assert_eq!(content, "namespace: platform\nname: infra\n");
}

#[tokio::test]
async fn branches_and_tags_are_listed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/projects/platform%2Finfra%2Fcollections/repository/branches"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"name": "main"}, {"name": "stable"}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/platform%2Finfra%2Fcollections/repository/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "v1.0.0"}])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(
        client.list_branches(&project()).await.unwrap(),
        vec!["main", "stable"]
    );
    assert_eq!(client.list_tags(&project()).await.unwrap(), vec!["v1.0.0"]);
}

#[tokio::test]
async fn server_errors_are_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/groups/platform/projects"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let result = client_for(&server).list_repositories().await;
    assert!(matches!(result, Err(ProviderError::Unavailable(_))));
}

#[test]
fn source_location_uses_dash_tree() {
    let source = SourceConfig::new("dev", ProviderKind::Gitlab, "gitlab.example.com", "platform");
    let client = GitLabClient::new(&source).unwrap();

    assert_eq!(
        client.build_source_location(&project(), "main", "galaxy.yml"),
        "url:https://gitlab.example.com/platform/infra/collections/-/tree/main/galaxy.yml"
    );
}
