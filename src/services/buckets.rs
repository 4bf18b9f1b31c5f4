//! Bucket lifecycle flows.

use crate::backends::s3::{S3Client, S3Object};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Result of [`BucketService::purge_bucket`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    /// Objects deleted before the bucket.
    pub objects_deleted: usize,
}

/// One step of a bucket purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PurgeStep<'a> {
    DeleteObject(&'a str),
    DeleteBucket,
}

/// Every object goes before the bucket, in listing order.
fn purge_plan(objects: &[S3Object]) -> Vec<PurgeStep<'_>> {
    objects
        .iter()
        .map(|o| PurgeStep::DeleteObject(o.key.as_str()))
        .chain(std::iter::once(PurgeStep::DeleteBucket))
        .collect()
}

/// Bucket administration over one S3 endpoint.
pub struct BucketService {
    s3: Arc<S3Client>,
}

impl BucketService {
    /// Creates a service for `s3`.
    #[must_use]
    pub const fn new(s3: Arc<S3Client>) -> Self {
        Self { s3 }
    }

    /// Creates `bucket` unless it exists; true if it was created.
    ///
    /// # Errors
    ///
    /// Returns an error if the existence check or the create fails.
    #[instrument(skip(self), fields(instance = %self.s3.name()))]
    pub async fn ensure_bucket(&self, bucket: &str) -> Result<bool> {
        if self.s3.bucket_exists(bucket).await? {
            return Ok(false);
        }
        self.s3.create_bucket(bucket).await?;
        Ok(true)
    }

    /// Deletes every object in `bucket`, then the bucket itself.
    ///
    /// Each delete is confirmed before the next one starts.
    ///
    /// # Errors
    ///
    /// Stops at the first failed delete.
    #[instrument(skip(self), fields(instance = %self.s3.name()))]
    pub async fn purge_bucket(&self, bucket: &str) -> Result<PurgeSummary> {
        let objects = self.s3.list_objects(bucket, None).await?;
        let mut summary = PurgeSummary::default();
        for step in purge_plan(&objects) {
            match step {
                PurgeStep::DeleteObject(key) => {
                    self.s3.delete_object(bucket, key).await?;
                    summary.objects_deleted += 1;
                },
                PurgeStep::DeleteBucket => self.s3.delete_bucket(bucket).await?,
            }
        }

        tracing::info!(bucket = %bucket, objects = summary.objects_deleted, "Purged bucket");
        metrics::counter!("bucket_purge_total").increment(1);
        Ok(summary)
    }

    /// Presigns a download of an existing object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the object does not exist.
    pub async fn share_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        expires_in: Duration,
    ) -> Result<String> {
        if !self.s3.object_exists(bucket, key).await? {
            return Err(Error::InvalidInput(format!("no object '{key}' in bucket '{bucket}'")));
        }
        self.s3
            .presign_get(bucket, key, content_type, expires_in)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::S3Config;
    use secrecy::SecretString;

    fn object(key: &str) -> S3Object {
        S3Object {
            key: key.to_string(),
            size: 1,
            last_modified: None,
            etag: None,
            storage_class: None,
        }
    }

    fn unreachable_service() -> BucketService {
        let config = S3Config {
            endpoint: "127.0.0.1:1".to_string(),
            disable_ssl: true,
            access_key: "AK".to_string(),
            secret_key: SecretString::from("SK".to_string()),
            timeout: 2,
            wait_interval_ms: 1,
            wait_max_attempts: 2,
            ..Default::default()
        };
        BucketService::new(Arc::new(S3Client::new("archive", &config)))
    }

    #[test]
    fn test_purge_plan_deletes_objects_before_bucket() {
        let objects = vec![object("a.log"), object("b/c.log")];
        assert_eq!(
            purge_plan(&objects),
            vec![
                PurgeStep::DeleteObject("a.log"),
                PurgeStep::DeleteObject("b/c.log"),
                PurgeStep::DeleteBucket,
            ]
        );
    }

    #[test]
    fn test_purge_plan_for_empty_bucket() {
        assert_eq!(purge_plan(&[]), vec![PurgeStep::DeleteBucket]);
    }

    #[tokio::test]
    async fn test_ensure_bucket_rejects_blank_name() {
        let err = unreachable_service().ensure_bucket(" ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_ensure_bucket_unreachable_is_transport() {
        let err = unreachable_service().ensure_bucket("logs").await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_share_object_checks_existence_before_signing() {
        let buckets = unreachable_service();
        let err = buckets
            .share_object("logs", "a.log", None, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport { .. }), "unexpected error: {err}");

        let err = buckets
            .share_object("logs", "", None, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_purge_stops_when_listing_fails() {
        let err = unreachable_service().purge_bucket("logs").await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }), "unexpected error: {err}");
    }
}
