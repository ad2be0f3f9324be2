use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

use aegis_api::app::{build_app, services::AppServices};
use aegis_api::config::AegisConfig;
use aegis_auth::{AuthClaims, Authenticator};
use aegis_core::TenantId;
use aegis_infra::StaticTokenAuthenticator;

const TENANT_HEADER: &str = "X-Filial-ID";

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    tokens: Option<Arc<StaticTokenAuthenticator>>,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Static bearer tokens; `token_for` issues them.
    async fn spawn() -> Self {
        let services = Arc::new(AppServices::build(test_config()).expect("failed to build services"));
        let tokens = services.static_authenticator();
        Self::serve(services, tokens.clone(), Some(tokens)).await
    }

    async fn spawn_jwt(secret: &str) -> Self {
        let mut config = test_config();
        config.jwt_secret = Some(secret.to_string());
        let services = Arc::new(AppServices::build(config).expect("failed to build services"));
        let jwt = services.jwt_authenticator().expect("jwt secret configured");
        Self::serve(services, jwt, None).await
    }

    async fn serve(
        services: Arc<AppServices>,
        authenticator: Arc<dyn Authenticator>,
        tokens: Option<Arc<StaticTokenAuthenticator>>,
    ) -> Self {
        // Same router as prod, bound to an ephemeral port.
        let app = build_app(services.clone(), authenticator);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            tokens,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn token_for(&self, username: &str) -> String {
        let token = format!("token-{username}");
        self.tokens
            .as_ref()
            .expect("static tokens")
            .issue_for(token.clone(), username, ChronoDuration::minutes(10));
        token
    }

    fn admin_token(&self) -> String {
        self.services.seed_admin("root").unwrap();
        self.token_for("root")
    }

    fn get(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
    }

    fn post(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
    }

    fn put(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .put(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
    }

    fn delete(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .delete(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
    }

    /// Register `username` as an employee of `tenants` through the admin API.
    async fn onboard(&self, admin: &str, username: &str, employee_id: i64, tenants: &[i64]) {
        let res = self
            .put(&format!("/admin/users/{username}"), admin)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);

        let res = self
            .put(&format!("/admin/users/{username}/employee"), admin)
            .json(&json!({ "employee_id": employee_id, "tenants": tenants }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    async fn create_permission(&self, admin: &str, resource: &str, action: &str, scoped: bool) -> i64 {
        let body = if scoped {
            json!({ "resource": resource, "action": action, "context_key": "filial" })
        } else {
            json!({ "resource": resource, "action": action })
        };
        let res = self
            .post("/admin/rbac/permissions", admin)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let created: Value = res.json().await.unwrap();
        created["id"].as_i64().unwrap()
    }

    async fn create_role(&self, admin: &str, name: &str, permission_ids: &[i64]) -> i64 {
        let res = self
            .post("/admin/rbac/roles", admin)
            .json(&json!({ "name": name, "permission_ids": permission_ids }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let created: Value = res.json().await.unwrap();
        created["id"].as_i64().unwrap()
    }

    async fn assign_roles(&self, admin: &str, username: &str, role_ids: &[i64]) {
        let res = self
            .put(&format!("/admin/users/{username}/roles"), admin)
            .json(&json!({ "ids": role_ids }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn test_config() -> AegisConfig {
    AegisConfig {
        audit_workers: 1,
        ..AegisConfig::default()
    }
}

fn mint_jwt(secret: &str, username: &str, ttl: ChronoDuration) -> String {
    let now = Utc::now();
    let claims = AuthClaims {
        sub: username.to_string(),
        issued_at: now - ChronoDuration::seconds(1),
        expires_at: now + ttl,
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv.get("/whoami", "never-issued").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_and_metrics_are_public() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token();
    let res = srv.get("/whoami", &admin).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = srv
        .get("/authz/explain?resource=ATIVO&action=READ", &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv
        .client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv
        .client
        .get(format!("{}/metrics", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let text = res.text().await.unwrap();
    assert!(text.contains("# TYPE aegis_authz_total counter"));
    assert!(text.contains(
        "aegis_authz_total{action=\"READ\",outcome=\"allow\",resource=\"ATIVO\"} 1"
    ));
    assert!(text.contains("# TYPE aegis_authz_eval_timer histogram"));
}

#[tokio::test]
async fn whoami_reports_authorities_and_request_tenant() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token();
    srv.onboard(&admin, "ana", 11, &[1, 2]).await;
    let ana = srv.token_for("ana");

    let res = srv
        .get("/whoami", &ana)
        .header(TENANT_HEADER, "2")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["username"], "ana");
    assert_eq!(body["tenant_id"], 2);
    assert_eq!(body["tenants"], json!([1, 2]));
    assert_eq!(body["authorities"], json!([]));

    let res = srv.get("/whoami", &admin).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert!(body["authorities"]
        .as_array()
        .unwrap()
        .iter()
        .any(|a| a == "ROLE_ADMIN"));
    assert!(body["tenant_id"].is_null());
}

#[tokio::test]
async fn malformed_tenant_header_is_ignored() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token();

    let res = srv
        .get("/whoami", &admin)
        .header(TENANT_HEADER, "not-a-number")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert!(body["tenant_id"].is_null());
}

#[tokio::test]
async fn tenant_guard_rejects_non_members_before_handlers_run() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token();
    srv.onboard(&admin, "bia", 21, &[1]).await;
    let bia = srv.token_for("bia");

    let res = srv
        .get("/whoami", &bia)
        .header(TENANT_HEADER, "2")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "tenant_access_denied");

    // Administrators need an employee link too unless the bypass is configured.
    let res = srv
        .get("/whoami", &admin)
        .header(TENANT_HEADER, "1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn scoped_permission_follows_request_tenant_and_assignment() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token();
    srv.onboard(&admin, "bia", 21, &[1]).await;
    let bia = srv.token_for("bia");

    let rbac_read = srv.create_permission(&admin, "RBAC", "READ", true).await;
    let auditor = srv.create_role(&admin, "ROLE_RBAC_AUDITOR", &[rbac_read]).await;

    let res = srv
        .get("/admin/rbac/roles", &bia)
        .header(TENANT_HEADER, "1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    srv.assign_roles(&admin, "bia", &[auditor]).await;

    let res = srv
        .get("/admin/rbac/roles", &bia)
        .header(TENANT_HEADER, "1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Scoped permission with no tenant on the request.
    let res = srv.get("/admin/rbac/roles", &bia).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Reading does not grant managing.
    let res = srv
        .post("/admin/rbac/roles", &bia)
        .header(TENANT_HEADER, "1")
        .json(&json!({ "name": "ROLE_SNEAKY" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn rbac_crud_refuses_deleting_permissions_in_use() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token();

    let view = srv.create_permission(&admin, "ASSET", "VIEW", true).await;
    let viewer = srv.create_role(&admin, "ROLE_VIEWER", &[view]).await;

    let res = srv
        .post("/admin/rbac/permissions", &admin)
        .json(&json!({ "resource": "asset", "action": "view" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = srv
        .post("/admin/rbac/roles", &admin)
        .json(&json!({ "name": "ROLE_VIEWER" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "duplicate_name");

    let res = srv
        .delete(&format!("/admin/rbac/permissions/{view}"), &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "permission_in_use");

    let res = srv
        .put(&format!("/admin/rbac/roles/{viewer}"), &admin)
        .json(&json!({ "name": "ROLE_VIEWER", "description": "nothing yet", "permission_ids": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["permissions"], json!([]));

    let res = srv
        .delete(&format!("/admin/rbac/permissions/{view}"), &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = srv
        .get(&format!("/admin/rbac/permissions/{view}"), &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = srv
        .post("/admin/rbac/groups", &admin)
        .json(&json!({ "name": "Field team", "permission_ids": [999] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .put("/admin/users/nobody/roles", &admin)
        .json(&json!({ "ids": [viewer] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn explain_and_target_checks_report_decisions() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token();
    srv.onboard(&admin, "bia", 21, &[1]).await;
    let bia = srv.token_for("bia");

    let view = srv.create_permission(&admin, "ASSET", "VIEW", true).await;
    let viewer = srv.create_role(&admin, "ROLE_VIEWER", &[view]).await;
    srv.assign_roles(&admin, "bia", &[viewer]).await;

    let res = srv
        .get("/authz/explain?resource=ASSET&action=VIEW", &bia)
        .header(TENANT_HEADER, "1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["decision"]["allowed"], true);
    assert_eq!(body["decision"]["basis"], "granted");
    assert_eq!(body["context"], "1");

    let res = srv
        .get("/authz/explain?resource=ASSET&action=VIEW&context=2", &bia)
        .header(TENANT_HEADER, "1")
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["decision"]["allowed"], false);
    assert_eq!(body["decision"]["basis"], "context_mismatch");

    let res = srv
        .get("/authz/explain?resource=ASSET&action=DELETE", &admin)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["decision"]["basis"], "admin_bypass");

    srv.services.ownership.assign("asset-9", TenantId::new(1));
    srv.services.ownership.assign("asset-10", TenantId::new(2));

    for (target, expected) in [("asset-9", true), ("asset-10", false), ("asset-404", false)] {
        let res = srv
            .get(&format!("/authz/targets/{target}?resource=ASSET&action=VIEW"), &bia)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["allowed"], expected, "target {target}");
    }
}

#[tokio::test]
async fn audit_trail_pages_newest_first() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token();
    srv.onboard(&admin, "bia", 21, &[1]).await;
    let bia = srv.token_for("bia");

    for action in ["VIEW", "EDIT", "DELETE"] {
        let res = srv
            .get(&format!("/authz/explain?resource=ASSET&action={action}"), &bia)
            .header(TENANT_HEADER, "1")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = srv
        .get("/admin/audit", &bia)
        .header(TENANT_HEADER, "1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Persistence runs on the audit workers; poll until the writes land.
    let mut bia_entries: Vec<Value> = Vec::new();
    for _ in 0..50 {
        let res = srv.get("/admin/audit?page=0&size=500", &admin).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let all: Value = res.json().await.unwrap();
        assert_eq!(all["size"], 200);
        bia_entries = all["entries"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|e| e["username"] == "bia" && e["resource"] == "ASSET")
            .cloned()
            .collect();
        if bia_entries.len() == 3 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let actions: Vec<&str> = bia_entries
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, vec!["DELETE", "EDIT", "VIEW"]);
    assert!(bia_entries.iter().all(|e| e["outcome"] == "DENY"));
    assert!(bia_entries.iter().all(|e| e["context"] == "1"));

    let res = srv.get("/admin/audit?page=0&size=2", &admin).send().await.unwrap();
    let page: Value = res.json().await.unwrap();
    assert_eq!(page["page"], 0);
    assert_eq!(page["size"], 2);
    assert_eq!(page["entries"].as_array().unwrap().len(), 2);
    assert!(page["total"].as_u64().unwrap() > 3);
}

#[tokio::test]
async fn jwt_tokens_resolve_directory_principals() {
    let secret = "test-secret";
    let srv = TestServer::spawn_jwt(secret).await;
    srv.services.directory.register("carla").unwrap();

    let token = mint_jwt(secret, "carla", ChronoDuration::minutes(10));
    let res = srv.get("/whoami", &token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["username"], "carla");

    let forged = mint_jwt("other-secret", "carla", ChronoDuration::minutes(10));
    let res = srv.get("/whoami", &forged).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let expired = mint_jwt(secret, "carla", ChronoDuration::minutes(-5));
    let res = srv.get("/whoami", &expired).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let stranger = mint_jwt(secret, "mallory", ChronoDuration::minutes(10));
    let res = srv.get("/whoami", &stranger).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tenant_scoped_managers_cannot_escalate_through_assignments() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token();
    srv.onboard(&admin, "eve", 31, &[1]).await;
    let eve = srv.token_for("eve");

    let manage = srv.create_permission(&admin, "RBAC", "MANAGE", true).await;
    let read = srv.create_permission(&admin, "RBAC", "READ", true).await;
    let manager = srv.create_role(&admin, "ROLE_BRANCH_MANAGER", &[manage, read]).await;
    srv.assign_roles(&admin, "eve", &[manager]).await;

    let res = srv
        .get("/admin/rbac/roles", &eve)
        .header(TENANT_HEADER, "1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let roles: Value = res.json().await.unwrap();
    let admin_role = roles
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "ROLE_ADMIN")
        .and_then(|r| r["id"].as_i64())
        .unwrap();

    let attempts = [
        srv.put("/admin/users/eve/roles", &eve)
            .json(&json!({ "ids": [admin_role, manager] })),
        srv.put("/admin/users/eve/employee", &eve)
            .json(&json!({ "employee_id": 31, "tenants": [1, 999] })),
        srv.put(&format!("/admin/rbac/roles/{manager}"), &eve)
            .json(&json!({ "name": "ROLE_BRANCH_MANAGER", "permission_ids": [] })),
        srv.post("/admin/rbac/permissions", &eve)
            .json(&json!({ "resource": "ATIVO", "action": "DELETE" })),
    ];
    for attempt in attempts {
        let res = attempt.header(TENANT_HEADER, "1").send().await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    let res = srv
        .get("/authz/explain?resource=ATIVO&action=DELETE&context=999", &eve)
        .header(TENANT_HEADER, "1")
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["decision"]["allowed"], false);

    let res = srv.get("/whoami", &eve).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["authorities"], json!(["ROLE_BRANCH_MANAGER"]));
    assert_eq!(body["tenants"], json!([1]));
}
