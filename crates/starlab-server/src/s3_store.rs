// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! S3-compatible (MinIO) object store for scope images.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use starlab_core::object_store::ObjectStore;
use starlab_core::{CoreError, Result};
use tracing::{debug, error};

fn s3_error(err: impl std::fmt::Display) -> CoreError {
    CoreError::Dependency {
        service: "object store",
        details: err.to_string(),
    }
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    public_url: String,
}

impl S3ObjectStore {
    /// Build a client from the ambient AWS configuration, pointed at `endpoint`
    /// with path-style addressing.
    pub async fn new(endpoint: &str, bucket: &str, public_url: &str) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(endpoint)
            .load()
            .await;
        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();

        Self::from_client(Client::from_conf(config), bucket, public_url)
    }

    pub fn from_client(client: Client, bucket: &str, public_url: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| {
                error!(bucket = %self.bucket, key, error = ?e, "S3 PUT failed");
                s3_error(e)
            })?;

        debug!(bucket = %self.bucket, key, size, "Object stored");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                error!(bucket = %self.bucket, key, error = ?e, "S3 DELETE failed");
                s3_error(e)
            })?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, key)
    }
}
