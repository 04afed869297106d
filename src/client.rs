//! Wire client for the user store HTTP surface: URL shaping, base64 payload
//! encoding, and JSON decoding on behalf of callers that only deal in
//! account/key strings and bytes.

use crate::hash::hash_key;
use anyhow::{bail, Result};
use base64::Engine;
use serde::Serialize;
use serde_json::Value;

pub struct StoreClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct PutBody {
    data: String,
    parent: String,
    iscollection: bool,
}

impl StoreClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, addr: &str, key: &str) -> String {
        if key.is_empty() {
            format!("{}/store/{addr}", self.base_url)
        } else {
            let keyhash = match hash_key(key) {
                crate::hash::KeyHash::Hash(b) => hex::encode(b),
                crate::hash::KeyHash::Root => "root".to_string(),
            };
            format!("{}/store/{addr}/{keyhash}", self.base_url)
        }
    }

    /// Store `value` under `key`, as a child of `parent` (empty for a
    /// direct child of the root). An empty `value` creates a collection.
    pub async fn put(&self, addr: &str, key: &str, parent: &str, value: &[u8]) -> Result<()> {
        let is_collection = value.is_empty();
        let data = if is_collection {
            String::new()
        } else {
            base64::engine::general_purpose::STANDARD.encode(value)
        };

        let body = PutBody {
            data,
            parent: parent.to_string(),
            iscollection: is_collection,
        };

        let response = self.client.put(self.url(addr, key)).json(&body).send().await?;
        if !response.status().is_success() {
            let message = error_message(response).await;
            bail!("failed to store key: {message}");
        }
        Ok(())
    }

    /// Delete a key (or the whole account store, if `key` is empty).
    pub async fn delete(&self, addr: &str, key: &str) -> Result<()> {
        let response = self.client.delete(self.url(addr, key)).send().await?;
        if !response.status().is_success() {
            let message = error_message(response).await;
            bail!("failed to delete key: {message}");
        }
        Ok(())
    }

    /// Retrieve a single key, or a subtree/whole-store dump when `key` is
    /// empty or names a collection. `dump` requests a full (non-index)
    /// dump; `since` is a unix-seconds lower bound.
    pub async fn get(
        &self,
        addr: &str,
        key: &str,
        dump: bool,
        since: Option<i64>,
    ) -> Result<Value> {
        let mut url = self.url(addr, key);
        let mut params = Vec::new();
        if dump {
            params.push("dump=true".to_string());
        }
        if let Some(since) = since {
            params.push(format!("since={since}"));
        }
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }

        let response = self.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            bail!("key not found: {addr}/{key}");
        }
        if !response.status().is_success() {
            let message = error_message(response).await;
            bail!("failed to retrieve key: {message}");
        }

        Ok(response.json().await?)
    }
}

async fn error_message(response: reqwest::Response) -> String {
    match response.json::<Value>().await {
        Ok(body) => body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string(),
        Err(_) => "unknown error".to_string(),
    }
}
