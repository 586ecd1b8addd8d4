//! REST client for the hosted backend
//!
//! One reqwest client (connection pooling) per process. Every call is a
//! single request with the client-level timeout; there is no retry.

use crate::io::backend::{Backend, BackendError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Authenticated user identity returned by sign-in
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    #[serde(rename = "userId")]
    user_id: String,
    email: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct AddDocResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    id: String,
    doc: Value,
}

pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    /// Bearer token for the signed-in user; document and tree operations
    /// fail with Unauthenticated until sign-in succeeds
    token: Mutex<Option<String>>,
}

impl RestBackend {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout_ms: u64) -> Self {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .http1_only()
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "http_client_build_failed: using default client without timeout");
                reqwest::Client::default()
            }
        };
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
            token: Mutex::new(None),
        }
    }

    /// Exchange credentials for a session token
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, BackendError> {
        let url = self.with_key(format!("{}/auth/login", self.base_url));
        let response = self
            .client
            .post(&url)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(BackendError::Unauthenticated);
        }
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Rejected {
                path: "auth/login".to_string(),
                code: status.as_u16(),
            });
        }
        let body: SignInResponse = response.json().await?;
        *self.token.lock() = Some(body.token);
        info!(user_id = %body.user_id, "backend_signed_in");
        Ok(AuthUser { user_id: body.user_id, email: body.email })
    }

    /// Install an externally obtained token (simulation, tests)
    pub fn set_token(&self, token: &str) {
        *self.token.lock() = Some(token.to_string());
    }

    fn bearer(&self) -> Result<String, BackendError> {
        self.token.lock().clone().ok_or(BackendError::Unauthenticated)
    }

    fn with_key(&self, url: String) -> String {
        match &self.api_key {
            Some(key) => format!("{url}?key={key}"),
            None => url,
        }
    }

    fn doc_url(&self, path: &str) -> String {
        self.with_key(format!("{}/documents/{}", self.base_url, path))
    }

    fn tree_url(&self, path: &str) -> String {
        self.with_key(format!("{}/tree/{}.json", self.base_url, path))
    }

    async fn expect_ok(
        response: reqwest::Response,
        path: &str,
    ) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(BackendError::Unauthenticated);
        }
        if !status.is_success() {
            return Err(BackendError::Rejected { path: path.to_string(), code: status.as_u16() });
        }
        Ok(response)
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn get_doc(&self, path: &str) -> Result<Option<Value>, BackendError> {
        let token = self.bearer()?;
        let response =
            self.client.get(self.doc_url(path)).bearer_auth(token).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::expect_ok(response, path).await?;
        Ok(Some(response.json().await?))
    }

    async fn set_doc(&self, path: &str, value: Value) -> Result<(), BackendError> {
        let token = self.bearer()?;
        let response =
            self.client.put(self.doc_url(path)).bearer_auth(token).json(&value).send().await?;
        Self::expect_ok(response, path).await?;
        debug!(path = %path, "doc_set");
        Ok(())
    }

    async fn update_doc(&self, path: &str, fields: Value) -> Result<(), BackendError> {
        let token = self.bearer()?;
        let response =
            self.client.patch(self.doc_url(path)).bearer_auth(token).json(&fields).send().await?;
        Self::expect_ok(response, path).await?;
        debug!(path = %path, "doc_updated");
        Ok(())
    }

    async fn delete_doc(&self, path: &str) -> Result<(), BackendError> {
        let token = self.bearer()?;
        let response =
            self.client.delete(self.doc_url(path)).bearer_auth(token).send().await?;
        Self::expect_ok(response, path).await?;
        debug!(path = %path, "doc_deleted");
        Ok(())
    }

    async fn add_doc(&self, collection: &str, value: Value) -> Result<String, BackendError> {
        let token = self.bearer()?;
        let response = self
            .client
            .post(self.doc_url(collection))
            .bearer_auth(token)
            .json(&value)
            .send()
            .await?;
        let response = Self::expect_ok(response, collection).await?;
        let body: AddDocResponse = response.json().await?;
        Ok(body.id)
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<(String, Value)>, BackendError> {
        let token = self.bearer()?;
        let response = self
            .client
            .get(self.doc_url(collection))
            .bearer_auth(token)
            .query(&[("field", field), ("eq", &value.to_string())])
            .send()
            .await?;
        let response = Self::expect_ok(response, collection).await?;
        let rows: Vec<QueryRow> = response.json().await?;
        Ok(rows.into_iter().map(|row| (row.id, row.doc)).collect())
    }

    async fn tree_get(&self, path: &str) -> Result<Option<Value>, BackendError> {
        let token = self.bearer()?;
        let response =
            self.client.get(self.tree_url(path)).bearer_auth(token).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::expect_ok(response, path).await?;
        let body: Value = response.json().await?;
        // The tree encodes absence as JSON null
        Ok(if body.is_null() { None } else { Some(body) })
    }

    async fn tree_set(&self, path: &str, value: Option<Value>) -> Result<(), BackendError> {
        let token = self.bearer()?;
        let body = value.unwrap_or(Value::Null);
        let response =
            self.client.put(self.tree_url(path)).bearer_auth(token).json(&body).send().await?;
        Self::expect_ok(response, path).await?;
        Ok(())
    }
}
