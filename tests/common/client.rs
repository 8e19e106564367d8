//! Thin reqwest wrapper with a cookie store, mirroring how the guest and
//! admin UIs talk to the service.

use serde_json::Value;

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin";

pub struct TestClient {
    pub http: reqwest::Client,
    base_url: String,
}

impl TestClient {
    pub fn new(base_url: &str) -> Self {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .expect("Failed to build test client");
        Self {
            http,
            base_url: base_url.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.http
            .get(self.url(path))
            .send()
            .await
            .expect("GET failed")
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("POST failed")
    }

    pub async fn admin_get(&self, path: &str) -> reqwest::Response {
        self.http
            .get(self.url(path))
            .basic_auth(ADMIN_USER, Some(ADMIN_PASSWORD))
            .send()
            .await
            .expect("admin GET failed")
    }

    pub async fn admin_post(&self, path: &str, body: &Value) -> reqwest::Response {
        self.http
            .post(self.url(path))
            .basic_auth(ADMIN_USER, Some(ADMIN_PASSWORD))
            .json(body)
            .send()
            .await
            .expect("admin POST failed")
    }

    pub async fn admin_put(&self, path: &str, body: &Value) -> reqwest::Response {
        self.http
            .put(self.url(path))
            .basic_auth(ADMIN_USER, Some(ADMIN_PASSWORD))
            .json(body)
            .send()
            .await
            .expect("admin PUT failed")
    }

    pub async fn admin_delete(&self, path: &str) -> reqwest::Response {
        self.http
            .delete(self.url(path))
            .basic_auth(ADMIN_USER, Some(ADMIN_PASSWORD))
            .send()
            .await
            .expect("admin DELETE failed")
    }

    /// Registers a fingerprint (setting the cookie on this client) and
    /// returns its id.
    pub async fn register_fingerprint(&self) -> String {
        let response = self
            .post_json("/api/fingerprint/generate", &serde_json::json!({}))
            .await;
        assert_eq!(response.status(), 200, "fingerprint generate failed");
        let body: Value = response.json().await.expect("unreadable body");
        body["fingerprint_id"]
            .as_str()
            .expect("missing fingerprint_id")
            .to_string()
    }
}
