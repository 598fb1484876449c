//! Bucket access for the indexer.
//!
//! `ObjectStore` is the seam between the workflow and the bucket: production
//! runs use `S3ObjectStore`, tests use `MemoryObjectStore`. Keys are plain
//! strings, bodies are raw bytes; interpretation of either happens above this
//! layer.

use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_smithy_types::retry::RetryConfig;
use bytes::Bytes;
use thiserror::Error;

/// Errors from bucket operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The service answered with a non-success status.
    #[error("{op} `{key}` failed (HTTP {status}): {message}")]
    Api {
        op: &'static str,
        key: String,
        status: u16,
        message: String,
    },

    /// The request never produced a service response.
    #[error("{op} `{key}` failed: {message}")]
    Transport {
        op: &'static str,
        key: String,
        message: String,
    },

    /// No region resolved from the environment or the settings.
    #[error("no S3 region configured: set VERSION_INDEXER_S3_REGION or the AWS environment")]
    MissingRegion,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Operations the indexer needs from the bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Whether an object exists at `key`.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Fetch the object at `key`, `None` if there is none.
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>>;

    /// Store `body` at `key`, replacing any existing object.
    async fn put(&self, key: &str, body: Bytes) -> StoreResult<()>;

    /// Remove the object at `key`. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// All keys under `prefix`, in lexicographic order, across every page.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

/// Bucket client backed by the AWS SDK.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Connects to the bucket using the ambient AWS environment, with
    /// optional region and endpoint overrides from the settings. Retries are
    /// disabled so every operation is attempted exactly once.
    pub async fn connect(
        bucket: impl Into<String>,
        region: Option<String>,
        endpoint: Option<String>,
    ) -> StoreResult<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_sdk_s3::config::Region::new(region));
        }
        let sdk_config = loader.load().await;

        if sdk_config.region().is_none() {
            return Err(StoreError::MissingRegion);
        }

        let mut builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).retry_config(RetryConfig::disabled());
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.into(),
        })
    }

    /// Wrap a pre-built client, for tests against a local endpoint.
    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) if status_of(&err) == Some(404) => Ok(false),
            Err(err) => Err(map_sdk_error(err, "head", key)),
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(err) if status_of(&err) == Some(404) => return Ok(None),
            Err(err) => return Err(map_sdk_error(err, "get", key)),
        };

        let body = response
            .body
            .collect()
            .await
            .map_err(|err| StoreError::Transport {
                op: "get",
                key: key.to_string(),
                message: format!("reading body: {}", err),
            })?
            .into_bytes();

        Ok(Some(body))
    }

    async fn put(&self, key: &str, body: Bytes) -> StoreResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| map_sdk_error(err, "put", key))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        // S3 reports success for deletes of absent keys.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, "delete", key))?;

        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|err| map_sdk_error(err, "list", prefix))?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            match response.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }
}

/// HTTP status of a service response, `None` for transport failures.
fn status_of<E>(err: &SdkError<E>) -> Option<u16> {
    match err {
        SdkError::ServiceError(service_err) => Some(service_err.raw().status().as_u16()),
        _ => None,
    }
}

fn map_sdk_error<E: std::fmt::Debug>(err: SdkError<E>, op: &'static str, key: &str) -> StoreError {
    match status_of(&err) {
        Some(status) => StoreError::Api {
            op,
            key: key.to_string(),
            status,
            message: format!("{:?}", err),
        },
        None => StoreError::Transport {
            op,
            key: key.to_string(),
            message: format!("{:?}", err),
        },
    }
}

#[cfg(test)]
use std::collections::BTreeMap;
#[cfg(test)]
use std::sync::{Arc, RwLock};

/// In-memory store for tests. The `BTreeMap` gives the same lexicographic
/// listing order as the bucket.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<BTreeMap<String, Bytes>>>,
}

#[cfg(test)]
impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without going through the trait.
    pub fn insert(&self, key: impl Into<String>, body: impl Into<Bytes>) {
        self.objects
            .write()
            .expect("RwLock poisoned")
            .insert(key.into(), body.into());
    }

    /// Seed a JSON document.
    pub fn insert_json<T: serde::Serialize>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> serde_json::Result<()> {
        let body = serde_json::to_vec(value)?;
        self.insert(key, body);
        Ok(())
    }

    /// Every stored key, in order.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .read()
            .expect("RwLock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self
            .objects
            .read()
            .expect("RwLock poisoned")
            .contains_key(key))
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        Ok(self
            .objects
            .read()
            .expect("RwLock poisoned")
            .get(key)
            .cloned())
    }

    async fn put(&self, key: &str, body: Bytes) -> StoreResult<()> {
        self.objects
            .write()
            .expect("RwLock poisoned")
            .insert(key.to_string(), body);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.objects.write().expect("RwLock poisoned").remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .objects
            .read()
            .expect("RwLock poisoned")
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
