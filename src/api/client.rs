use async_trait::async_trait;
use log::debug;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use url::Url;

use crate::api::models::{Contact, IntercomMessage, MessageStatus, OutgoingCall, Ring};
use crate::error::{Error, Result};

/// The remote intercom backend. Every call is authenticated with the private
/// key and answers with a JSON array, even for single objects.
#[async_trait]
pub trait Intercom: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// Raw items so that one malformed message does not poison the batch.
    async fn list_messages(&self, since: i64) -> Result<Vec<Value>>;

    async fn get_message(&self, id: &str) -> Result<Option<IntercomMessage>>;

    async fn set_status(&self, id: &str, status: &MessageStatus) -> Result<()>;

    async fn delete_message(&self, id: &str) -> Result<()>;

    /// Delete and let the callee know about the missed call.
    async fn delete_with_notification(&self, id: &str) -> Result<()>;

    async fn initiate_call(&self, contact_id: &str) -> Result<OutgoingCall>;

    async fn ring_call(&self, id: &str) -> Result<Ring>;

    async fn contacts(&self) -> Result<Vec<Contact>>;

    async fn send_text(&self, contact_id: &str, message: &str) -> Result<Value>;
}

pub struct ApiClient {
    pub http: HttpClient,
    base_url: String,
    private_key: String,
}

impl ApiClient {
    pub fn new(base_url: &str, private_key: &str) -> Result<Self> {
        if private_key.is_empty() {
            return Err(Error::Missing("private key"));
        }
        Url::parse(base_url).map_err(|e| Error::Config(format!("base url {base_url}: {e}")))?;
        let http = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            private_key: private_key.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST the payload with the key attached and decode the JSON answer.
    async fn post_by_key(&self, path: &str, mut payload: Value) -> Result<Value> {
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("key_value".into(), Value::String(self.private_key.clone()));
        }
        let resp = self
            .http
            .post(self.endpoint(path))
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Status(resp.status().as_u16()));
        }
        let json: Value = resp.json().await?;
        debug!("{path} answered");
        Ok(json)
    }

    async fn list(&self, path: &str, payload: Value) -> Result<Vec<Value>> {
        match self.post_by_key(path, payload).await? {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            _ => Err(Error::Missing("array in response")),
        }
    }

    async fn first<T: DeserializeOwned>(&self, path: &str, payload: Value) -> Result<Option<T>> {
        let items = self.list(path, payload).await?;
        match items.into_iter().next() {
            Some(item) => Ok(Some(serde_json::from_value(item)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Intercom for ApiClient {
    async fn ping(&self) -> Result<()> {
        self.post_by_key("/api/pub/identity/ping/bykey", json!({})).await?;
        Ok(())
    }

    async fn list_messages(&self, since: i64) -> Result<Vec<Value>> {
        self.list("/api/pub/intercom/list/bykey", json!({ "value": since })).await
    }

    async fn get_message(&self, id: &str) -> Result<Option<IntercomMessage>> {
        self.first("/api/pub/intercom/get/bykey", json!({ "id": id })).await
    }

    async fn set_status(&self, id: &str, status: &MessageStatus) -> Result<()> {
        let path = format!("/api/pub/intercom/set/{status}/bykey");
        self.post_by_key(&path, json!({ "id": id })).await?;
        Ok(())
    }

    async fn delete_message(&self, id: &str) -> Result<()> {
        self.post_by_key("/api/pub/intercom/del/bykey", json!({ "id": id })).await?;
        Ok(())
    }

    async fn delete_with_notification(&self, id: &str) -> Result<()> {
        self.post_by_key("/api/pub/intercom/del-with-notification/bykey", json!({ "id": id }))
            .await?;
        Ok(())
    }

    async fn initiate_call(&self, contact_id: &str) -> Result<OutgoingCall> {
        let path = "/api/pub/contact/call/bykey";
        let mut call: Value = self
            .first(path, json!({ "contact_id": contact_id }))
            .await?
            .ok_or_else(|| Error::EmptyResponse(path.into()))?;
        // The call object does not carry the contact, the caller knows it.
        if let Some(obj) = call.as_object_mut() {
            obj.insert("contact_id".into(), Value::String(contact_id.to_string()));
        }
        Ok(serde_json::from_value(call)?)
    }

    async fn ring_call(&self, id: &str) -> Result<Ring> {
        let path = "/api/pub/intercom/call/ring/bykey";
        self.first(path, json!({ "id": id }))
            .await?
            .ok_or_else(|| Error::EmptyResponse(path.into()))
    }

    async fn contacts(&self) -> Result<Vec<Contact>> {
        let items = self.list("/api/pub/contact/list/bykey", json!({})).await?;
        // Skip entries without an id rather than failing the whole list.
        Ok(items
            .into_iter()
            .filter_map(|c| serde_json::from_value(c).ok())
            .collect())
    }

    async fn send_text(&self, contact_id: &str, message: &str) -> Result<Value> {
        let path = "/api/pub/contact/text/bykey";
        self.first(path, json!({ "contact_id": contact_id, "message": message }))
            .await?
            .ok_or_else(|| Error::EmptyResponse(path.into()))
    }
}
