//! HTTP surface of the service, served on a local port

use clap::Parser;
use flate2::Compression;
use flate2::write::GzEncoder;
use reqwest::StatusCode;
use reqwest::header;
use serde_json::{Value, json};

use kotslint_server::{AppState, Config, router};

/// Serve a fresh router on an ephemeral port and return its base URL
async fn spawn_server() -> String {
    let config = Config::parse_from(["kots-lint", "--debug"]);
    let app = router(AppState::new(&config).unwrap());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn read(response: reqwest::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.bytes().await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn post_json(uri: &str, body: Value) -> (StatusCode, Value) {
    let base = spawn_server().await;
    let response = reqwest::Client::new()
        .post(format!("{base}{uri}"))
        .json(&body)
        .send()
        .await
        .unwrap();
    read(response).await
}

async fn post_bytes(uri: &str, content_type: &str, body: Vec<u8>) -> (StatusCode, Value) {
    let base = spawn_server().await;
    let response = reqwest::Client::new()
        .post(format!("{base}{uri}"))
        .header(header::CONTENT_TYPE, content_type)
        .body(body)
        .send()
        .await
        .unwrap();
    read(response).await
}

fn files(files: &[(&str, &str)]) -> String {
    let files: Vec<Value> = files
        .iter()
        .map(|(path, content)| json!({ "name": path, "path": path, "content": content }))
        .collect();
    serde_json::to_string(&files).unwrap()
}

fn tgz(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

#[tokio::test]
async fn test_livez() {
    let base = spawn_server().await;
    let response = reqwest::get(format!("{base}/livez")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_lint_invalid_yaml() {
    let spec = files(&[(
        "config-map.yaml",
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: env\ndata:\n  ENV_VAR_1: fake\n  ENV_VAR_2: kind: test\n",
    )]);
    let (status, body) = post_json("/v1/lint", json!({ "spec": spec })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isLintingComplete"], json!(false));
    assert_eq!(
        body["lintExpressions"],
        json!([{
            "rule": "invalid-yaml",
            "type": "error",
            "message": body["lintExpressions"][0]["message"],
            "path": "config-map.yaml",
            "patch": null,
            "positions": [{ "start": { "line": 7 } }]
        }])
    );
}

#[tokio::test]
async fn test_lint_complete_release() {
    let spec = files(&[(
        "cm.yaml",
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: env\ndata:\n  key: value\n",
    )]);
    let (status, body) = post_json("/v1/lint", json!({ "spec": spec })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isLintingComplete"], json!(true));
    let rules: Vec<&str> = body["lintExpressions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["rule"].as_str().unwrap())
        .collect();
    assert!(rules.contains(&"config-spec"));
    assert!(rules.contains(&"application-spec"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lint_concurrent_requests() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let spec = files(&[(
        "cm.yaml",
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: env\ndata:\n  key: 'repl{{ ConfigOption \"missing\" }}'\n",
    )]);

    let mut requests = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let request = client
            .post(format!("{base}/v1/lint"))
            .json(&json!({ "spec": spec }));
        requests.spawn(async move { read(request.send().await.unwrap()).await });
    }

    let mut answered = 0;
    while let Some(joined) = requests.join_next().await {
        let (status, body) = joined.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isLintingComplete"], json!(true));
        answered += 1;
    }
    assert_eq!(answered, 8);
}

#[tokio::test]
async fn test_lint_malformed_spec() {
    let (status, body) = post_json("/v1/lint", json!({ "spec": "not json" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("invalid spec"));
}

#[tokio::test]
async fn test_lint_missing_spec_field() {
    let (status, body) = post_json("/v1/lint", json!({ "files": [] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_troubleshoot_lint() {
    let spec = "apiVersion: troubleshoot.sh/v1beta2\nkind: SupportBundle\nmetadata:\n  name: x\nspec:\n  collectors:\n    - clusterInfo: {}\n    - notACollector: {}\n";
    let (status, body) = post_json("/v1/troubleshoot-lint", json!({ "spec": spec })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isLintingComplete"], json!(true));
    assert_eq!(
        body["lintExpressions"][0]["rule"],
        json!("additional_property_not_allowed")
    );
    assert_eq!(body["lintExpressions"][0]["path"], json!("spec.yaml"));
    assert_eq!(
        body["lintExpressions"][0]["positions"][0]["start"]["line"],
        json!(8)
    );
}

#[tokio::test]
async fn test_enterprise_lint_invalid_policy() {
    let policies = serde_json::to_string(&json!([{ "name": "broken", "policy": "{% for %}" }]))
        .unwrap();
    let (status, body) = post_json(
        "/v1/enterprise-lint",
        json!({ "spec": "[]", "policies": policies }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("broken"));
}

#[tokio::test]
async fn test_enterprise_lint() {
    let spec = files(&[(
        "cm.yaml",
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: env\n",
    )]);
    let policy = r#"{% for file in files %}{% if file.value and file.value.kind == "ConfigMap" %}
{{ lint("no-config-maps", "warn", "ConfigMaps are discouraged", path=file.path, docIndex=file.docIndex, field="metadata.name") }}
{% endif %}{% endfor %}"#;
    let policies =
        serde_json::to_string(&json!([{ "name": "no-config-maps", "policy": policy }])).unwrap();

    let (status, body) = post_json(
        "/v1/enterprise-lint",
        json!({ "spec": spec, "policies": policies }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["lintExpressions"],
        json!([{
            "rule": "no-config-maps",
            "type": "warn",
            "message": "ConfigMaps are discouraged",
            "path": "cm.yaml",
            "patch": null,
            "positions": [{ "start": { "line": 4 } }]
        }])
    );
}

#[tokio::test]
async fn test_builders_lint_gzip() {
    let archive = tgz(&[
        ("chart/Chart.yaml", "apiVersion: v2\nname: chart\nversion: 0.1.0\n"),
        (
            "chart/templates/deployment.yaml",
            "apiVersion: apps/v1\nkind: Deployment\nspec:\n  template:\n    spec:\n      containers:\n        - name: web\n          image: nginx:latest\n",
        ),
    ]);
    let (status, body) = post_bytes("/v1/builders-lint", "application/gzip", archive).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isLintingComplete"], json!(true));
    let latest = body["lintExpressions"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["rule"] == "container-image-latest-tag")
        .unwrap();
    assert_eq!(latest["path"], json!("chart.tgz/chart/templates/deployment.yaml"));
    assert_eq!(latest["positions"][0]["start"]["line"], json!(8));
}

#[tokio::test]
async fn test_builders_lint_unsupported_content_type() {
    let (status, body) =
        post_bytes("/v1/builders-lint", "application/json", b"{}".to_vec()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("application/json"));
}

#[tokio::test]
async fn test_builders_lint_invalid_archive() {
    let (status, _) = post_bytes(
        "/v1/builders-lint",
        "application/gzip",
        b"not an archive".to_vec(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cors_preflight() {
    let base = spawn_server().await;
    let response = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("{base}/v1/lint"))
        .header(header::ORIGIN, "https://vendor.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}
