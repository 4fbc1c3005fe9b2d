//! End-to-end scenarios through the lint pipeline

use std::sync::Arc;

use kotslint_core::position::line_for_yaml_path;
use kotslint_core::{File, LintExpression, LintType, split};
use kotslint_kube::SchemaStore;
use kotslint_lint::stages;
use kotslint_lint::{
    CancellationToken, LintError, Linter, PolicyFinding, PolicyModule,
    findings_to_lint_expressions,
};
use kotslint_repo::{ReleaseIndex, VersionCache};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONFIG: &str = r#"apiVersion: kots.io/v1beta1
kind: Config
metadata:
  name: config
spec:
  groups:
    - name: example
      title: Example
      items:
        - name: a_templated_text
          title: A templated text
          type: text
          default: a templated value
        - name: a_templated_value
          title: A templated value
          type: text
          default: asd
"#;

const SERVICE: &str = r#"apiVersion: v1
kind: Service
metadata:
  name: example
spec:
  type: ClusterIP
  selector:
    app: example
    component: repl{{ConfigOption "a_templated_text"}}
  ports:
    - port: 80
"#;

const DEPLOYMENT: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: example
spec:
  selector:
    matchLabels:
      app: example
  replicas: repl{{ConfigOption "a_templated_value"}}
  template:
    metadata:
      labels:
        app: example
    spec:
      containers:
        - name: example
          image: nginx
"#;

fn linter() -> (TempDir, Linter) {
    let dir = tempfile::tempdir().unwrap();
    let store = SchemaStore::unpack(dir.path()).unwrap();
    (dir, Linter::new(store))
}

fn errors(expressions: &[LintExpression]) -> Vec<&LintExpression> {
    expressions.iter().filter(|e| e.is_error()).collect()
}

#[test]
fn test_render_substitutes_config_option() {
    let files = vec![
        File::new("config.yaml", CONFIG),
        File::new("service.yaml", SERVICE),
    ];
    let views: Vec<_> = files.iter().flat_map(|f| split(f).unwrap()).collect();

    let outcome = stages::render(&files, &views, &CancellationToken::new()).unwrap();
    let service = outcome
        .views
        .iter()
        .find(|v| v.path == "service.yaml")
        .unwrap();
    let value: serde_yaml::Value = serde_yaml::from_str(&service.content).unwrap();

    assert_eq!(
        value["spec"]["selector"]["component"].as_str(),
        Some("a templated value")
    );
}

#[tokio::test]
async fn test_unterminated_quote_is_unable_to_render() {
    let content = r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: example-config
data:
  ENV_VAR_1: fake
  ENV_VAR_2: other
  ENV_VAR_3: third
  key: '{{repl print "whatever }}'
"#;
    let (_dir, linter) = linter();
    let result = linter
        .lint_release(&[File::new("config-map.yaml", content)], &CancellationToken::new())
        .await
        .unwrap();

    let errors = errors(&result.lint_expressions);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].rule, "unable-to-render");
    assert_eq!(errors[0].path, "config-map.yaml");
    assert!(errors[0].message.contains("unterminated quoted string"));
    assert_eq!(errors[0].line(), Some(9));
    assert!(!result.is_linting_complete);
}

#[tokio::test]
async fn test_invalid_yaml_stops_the_pipeline() {
    let content = r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: example-config
data:
  ENV_VAR_1: fake
  ENV_VAR_2: kind: test
"#;
    let (_dir, linter) = linter();
    let result = linter
        .lint_release(&[File::new("config-map.yaml", content)], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.lint_expressions.len(), 1);
    assert_eq!(result.lint_expressions[0].rule, "invalid-yaml");
    assert_eq!(result.lint_expressions[0].lint_type, LintType::Error);
    assert_eq!(result.lint_expressions[0].line(), Some(7));
    assert!(!result.is_linting_complete);
}

#[tokio::test]
async fn test_rendered_replicas_fail_schema_on_original_line() {
    let (_dir, linter) = linter();
    let files = vec![
        File::new("config.yaml", CONFIG),
        File::new("deployment.yaml", DEPLOYMENT),
    ];
    let result = linter
        .lint_release(&files, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.is_linting_complete);
    assert!(errors(&result.lint_expressions).is_empty());

    let invalid_type = result
        .lint_expressions
        .iter()
        .find(|e| e.rule == "invalid_type")
        .unwrap();
    assert_eq!(invalid_type.lint_type, LintType::Warn);
    assert_eq!(
        invalid_type.message,
        "Invalid type. Expected: [integer,null], given: string"
    );
    assert_eq!(invalid_type.path, "deployment.yaml");
    assert_eq!(invalid_type.line(), Some(9));
}

#[test]
fn test_second_document_positions() {
    let content = r#"apiVersion: v1
kind: Pod
metadata:
  name: first
spec:
  containers:
    - name: a
      image: nginx
    - name: b
      image: nginx
      envFrom:
        - configMapRef:
            name: first
---
apiVersion: v1
kind: Pod
metadata:
  name: second
spec:
  containers:
    - name: a
      image: nginx
    - name: b
      image: nginx
      envFrom:
        - configMapRef:
            name: second
"#;
    let files = vec![File::new("pods.yaml", content)];
    let mut finding = PolicyFinding::new("missing-config-map", LintType::Error, "not found")
        .at_field("spec.containers.1.envFrom.0.configMapRef");
    finding.path = "pods.yaml".to_string();
    finding.doc_index = 1;

    let expressions = findings_to_lint_expressions(vec![finding], &files);
    assert_eq!(expressions[0].line(), Some(26));
    assert_eq!(
        line_for_yaml_path(content, 0, "spec.containers.1.envFrom.0.configMapRef"),
        Some(12)
    );
}

const PHASED_DEPLOYMENT: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: example
  annotations:
    kots.io/creation-phase: "10000"
spec:
  selector:
    matchLabels:
      app: example
  template:
    metadata:
      labels:
        app: example
    spec:
      containers:
        - name: example
          image: nginx
"#;

#[tokio::test]
async fn test_phase_annotation_out_of_range() {
    let (_dir, linter) = linter();
    let result = linter
        .lint_release(
            &[File::new("deployment.yaml", PHASED_DEPLOYMENT)],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!result.is_linting_complete);
    let errors = errors(&result.lint_expressions);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].rule, "deployment-phase-annotation");
    assert!(errors[0].message.contains("should be between -9999 and 9999"));

    // Later stages do not run once a gate closes
    assert!(result
        .lint_expressions
        .iter()
        .all(|e| !e.rule.starts_with("container-")));

    let json = serde_json::to_string_pretty(&errors).unwrap();
    insta::assert_snapshot!(json, @r###"
[
  {
    "rule": "deployment-phase-annotation",
    "type": "error",
    "message": "Invalid value \"10000\" for annotation \"kots.io/creation-phase\", should be between -9999 and 9999",
    "path": "deployment.yaml",
    "patch": null,
    "positions": [
      {
        "start": {
          "line": 6
        }
      }
    ]
  }
]
"###);
}

#[tokio::test]
async fn test_bundle_level_findings_come_first() {
    let (_dir, linter) = linter();
    let result = linter
        .lint_release(
            &[File::new("deployment.yaml", PHASED_DEPLOYMENT)],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let leading: Vec<_> = result
        .lint_expressions
        .iter()
        .take_while(|e| e.path.is_empty())
        .map(|e| e.rule.as_str())
        .collect();
    assert_eq!(
        leading,
        vec![
            "application-spec",
            "config-spec",
            "preflight-spec",
            "troubleshoot-spec",
        ]
    );

    let pathless: Vec<_> = result
        .lint_expressions
        .iter()
        .filter(|e| e.path.is_empty())
        .collect();
    assert_eq!(pathless.len(), leading.len());
    assert!(pathless.iter().all(|e| e.positions.is_empty()));
}

const APPLICATION: &str = r#"apiVersion: kots.io/v1beta1
kind: Application
metadata:
  name: app
spec:
  title: App
  targetKotsVersion: 1.0.0
"#;

fn release_index(server: &MockServer) -> ReleaseIndex {
    ReleaseIndex::with_cache(&server.uri(), None, Arc::new(VersionCache::new())).unwrap()
}

#[tokio::test]
async fn test_unreleased_kots_version() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/replicatedhq/kots/releases/tags/v1.0.0"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (_dir, linter) = linter();
    let linter = linter.with_release_index(release_index(&server));
    let result = linter
        .lint_release(&[File::new("kots-app.yaml", APPLICATION)], &CancellationToken::new())
        .await
        .unwrap();

    let errors = errors(&result.lint_expressions);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].rule, "non-existent-target-kots-version");
    assert_eq!(errors[0].line(), Some(7));
    assert!(!result.is_linting_complete);
}

#[tokio::test]
async fn test_release_index_failure_is_not_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (_dir, linter) = linter();
    let linter = linter.with_release_index(release_index(&server));
    let result = linter
        .lint_release(&[File::new("kots-app.yaml", APPLICATION)], &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.is_linting_complete);
    assert!(errors(&result.lint_expressions).is_empty());
    assert!(result
        .lint_expressions
        .iter()
        .any(|e| e.rule == "application-icon"));
}

#[tokio::test]
async fn test_cancelled_request() {
    let (_dir, linter) = linter();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = linter
        .lint_release(&[File::new("deployment.yaml", DEPLOYMENT)], &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, LintError::Cancelled));
}

#[tokio::test]
async fn test_corrupt_chart_archive_is_a_finding() {
    let (_dir, linter) = linter();
    let result = linter
        .lint_release(
            &[
                File::new("config.yaml", CONFIG),
                File::new("broken-0.1.0.tgz", "bm90IGEgZ3ppcCBzdHJlYW0="),
            ],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let errors = errors(&result.lint_expressions);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].rule, "helm-archive-invalid");
    assert_eq!(errors[0].path, "broken-0.1.0.tgz");
    assert!(!result.is_linting_complete);
}

#[test]
fn test_troubleshoot_spec() {
    let (_dir, linter) = linter();
    let spec = "apiVersion: troubleshoot.sh/v1beta2\nkind: SupportBundle\nmetadata:\n  name: x\nspec:\n  collectors:\n    - clusterInfo: {}\n    - notACollector: {}\n";
    let result = linter
        .lint_troubleshoot(spec, &CancellationToken::new())
        .unwrap();

    assert!(result.is_linting_complete);
    assert_eq!(result.lint_expressions.len(), 1);
    assert_eq!(
        result.lint_expressions[0].rule,
        "additional_property_not_allowed"
    );
    assert_eq!(result.lint_expressions[0].line(), Some(8));
}

#[test]
fn test_enterprise_policies() {
    let (_dir, linter) = linter();
    let policy = PolicyModule {
        name: "no-deployments".to_string(),
        policy: r#"{% for file in files %}{% if file.value and file.value.kind == "Deployment" %}
{{ lint("no-deployments", "error", "Deployments are not allowed", path=file.path, docIndex=file.docIndex, field="kind") }}
{% endif %}{% endfor %}"#
            .to_string(),
    };
    let files = vec![
        File::new("config.yaml", CONFIG),
        File::new("deployment.yaml", DEPLOYMENT),
    ];

    let result = linter
        .lint_enterprise(&files, &[policy], &CancellationToken::new())
        .unwrap();

    assert!(result.is_linting_complete);
    assert_eq!(result.lint_expressions.len(), 1);
    assert_eq!(result.lint_expressions[0].rule, "no-deployments");
    assert_eq!(result.lint_expressions[0].path, "deployment.yaml");
    assert_eq!(result.lint_expressions[0].line(), Some(2));
}

#[test]
fn test_enterprise_invalid_policy() {
    let (_dir, linter) = linter();
    let policy = PolicyModule {
        name: "broken".to_string(),
        policy: "{% for %}".to_string(),
    };
    let err = linter
        .lint_enterprise(&[], &[policy], &CancellationToken::new())
        .unwrap_err();
    assert!(err.is_client_error());
}

#[test]
fn test_builders_chart_files() {
    let (_dir, linter) = linter();
    let files = vec![
        File::new(
            "chart/templates/deployment.yaml",
            "apiVersion: apps/v1\nkind: Deployment\nspec:\n  template:\n    spec:\n      containers:\n        - name: web\n          image: nginx:latest\n",
        ),
        File::new("chart/templates/cm.yaml", "apiVersion: v1\ndata:\n  a: b\n"),
        File::new("chart/README.md", "# chart\n"),
    ];

    let result = linter
        .lint_builders(&files, &CancellationToken::new())
        .unwrap();

    let rules: Vec<_> = result
        .lint_expressions
        .iter()
        .map(|e| (e.path.as_str(), e.rule.as_str(), e.line()))
        .collect();
    assert!(rules.contains(&("chart/templates/cm.yaml", "missing-kind-field", Some(1))));
    assert!(rules.contains(&(
        "chart/templates/deployment.yaml",
        "container-image-latest-tag",
        Some(8)
    )));
    assert!(result.is_linting_complete);
}
