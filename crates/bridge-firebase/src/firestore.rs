use std::{sync::Arc, time::Duration};

use bridge_core::{BridgeError, Document, MessageRecord, RetryPolicy, Snapshot, SnapshotStream};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    auth::FirebaseAuth,
    config::{FirebaseConfig, FirebaseEndpoints, ListenerConfig, endpoint},
    error_map::{map_firestore_rest_error, map_firestore_transport_error},
};

const SNAPSHOT_BUFFER: usize = 8;
const PAGE_SIZE: &str = "300";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<RestDocument>,
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
    #[serde(default)]
    update_time: Option<String>,
}

/// Identity of a result set, used to skip unchanged polls.
type Fingerprint = Vec<(String, Option<String>)>;

struct Listing {
    snapshot: Snapshot,
    fingerprint: Fingerprint,
}

/// Firestore REST client for `users/{uid}/messages`.
#[derive(Clone)]
pub struct FirestoreClient {
    http: reqwest::Client,
    auth: Arc<FirebaseAuth>,
    documents_root: Url,
    listener: ListenerConfig,
    retry: RetryPolicy,
}

impl FirestoreClient {
    pub fn new(
        http: reqwest::Client,
        auth: Arc<FirebaseAuth>,
        config: &FirebaseConfig,
        endpoints: &FirebaseEndpoints,
        listener: ListenerConfig,
    ) -> Self {
        let documents_root = endpoint(
            &endpoints.firestore,
            &[
                "projects",
                &config.project_id,
                "databases",
                "(default)",
                "documents",
            ],
        );
        Self {
            http,
            auth,
            documents_root,
            listener,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn messages_url(&self, uid: &str) -> Url {
        endpoint(&self.documents_root, &["users", uid, "messages"])
    }

    async fn authorized(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, BridgeError> {
        Ok(match self.auth.current_token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    /// Insert a document with an auto-generated id.
    pub async fn create_document(&self, uid: &str, record: &MessageRecord) -> Result<(), BridgeError> {
        let body = json!({
            "fields": { "content": { "stringValue": record.content } }
        });
        let request = self.authorized(self.http.post(self.messages_url(uid))).await?;
        let response = request
            .json(&body)
            .send()
            .await
            .map_err(map_firestore_transport_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        debug!(uid, "message document created");
        Ok(())
    }

    /// Read the whole collection, following page tokens.
    async fn list_documents(&self, uid: &str) -> Result<Listing, BridgeError> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(self.messages_url(uid))
                .query(&[("pageSize", PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let response = self
                .authorized(request)
                .await?
                .send()
                .await
                .map_err(map_firestore_transport_error)?;

            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }
            let page: ListDocumentsResponse = response
                .json()
                .await
                .map_err(map_firestore_transport_error)?;
            documents.extend(page.documents);

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(listing_from_documents(documents))
    }

    /// Start a polling live query. The listener stops once the receiver is
    /// dropped.
    pub fn watch(&self, uid: &str) -> SnapshotStream {
        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let client = self.clone();
        let uid = uid.to_owned();
        tokio::spawn(async move {
            client.poll_loop(uid, tx).await;
        });
        rx
    }

    async fn poll_loop(self, uid: String, tx: mpsc::Sender<Result<Snapshot, BridgeError>>) {
        info!(%uid, interval_ms = self.listener.poll_interval.as_millis() as u64, "live query started");
        let mut last: Option<Fingerprint> = None;
        let mut failures: u32 = 0;

        loop {
            let delay = match self.list_documents(&uid).await {
                Ok(listing) => {
                    failures = 0;
                    if last.as_ref() != Some(&listing.fingerprint) {
                        last = Some(listing.fingerprint);
                        if tx.send(Ok(listing.snapshot)).await.is_err() {
                            break;
                        }
                    }
                    self.listener.poll_interval
                }
                Err(err) => {
                    let delay = self.retry.delay_for_attempt(failures, err.retry_after_ms);
                    failures = failures.saturating_add(1);
                    if err.is_transient() {
                        warn!(%uid, code = %err.code, delay_ms = delay.as_millis() as u64, "live query poll failed, backing off");
                    } else if tx.send(Err(err)).await.is_err() {
                        break;
                    }
                    delay.max(self.listener.poll_interval)
                }
            };

            tokio::select! {
                _ = tx.closed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!(%uid, "live query stopped");
    }
}

/// Map a failed response, keeping any `Retry-After` seconds as a backoff hint.
async fn error_from_response(response: reqwest::Response) -> BridgeError {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();

    let err = map_firestore_rest_error(status, &body);
    match retry_after {
        Some(delay) => err.with_retry_after(delay),
        None => err,
    }
}

fn listing_from_documents(documents: Vec<RestDocument>) -> Listing {
    let fingerprint = documents
        .iter()
        .map(|doc| (doc.name.clone(), doc.update_time.clone()))
        .collect();
    let snapshot = Snapshot {
        documents: documents.into_iter().map(decode_document).collect(),
    };
    Listing {
        snapshot,
        fingerprint,
    }
}

fn decode_document(doc: RestDocument) -> Document {
    let id = doc
        .name
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_owned();
    let fields = doc
        .fields
        .into_iter()
        .map(|(key, value)| (key, decode_value(&value)))
        .collect();
    Document { id, fields }
}

/// Convert a Firestore typed value (`{"stringValue": "hi"}`) into plain JSON.
fn decode_value(value: &Value) -> Value {
    let Some(object) = value.as_object() else {
        return Value::Null;
    };
    let Some((kind, inner)) = object.iter().next() else {
        return Value::Null;
    };

    match kind.as_str() {
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" | "booleanValue" => {
            inner.clone()
        }
        // int64 travels as a decimal string.
        "integerValue" => inner
            .as_str()
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| inner.clone()),
        "doubleValue" => inner.clone(),
        "nullValue" => Value::Null,
        "geoPointValue" => inner.clone(),
        "mapValue" => {
            let fields = inner
                .get("fields")
                .and_then(Value::as_object)
                .map(|fields| {
                    fields
                        .iter()
                        .map(|(key, value)| (key.clone(), decode_value(value)))
                        .collect::<Map<_, _>>()
                })
                .unwrap_or_default();
            Value::Object(fields)
        }
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        other => {
            debug!(kind = other, "unsupported Firestore value type");
            Value::Null
        }
    }
}

#[cfg(test)]
fn parse_listing(body: &str) -> serde_json::Result<(Listing, Option<String>)> {
    let page: ListDocumentsResponse = serde_json::from_str(body)?;
    Ok((listing_from_documents(page.documents), page.next_page_token))
}
