//! S3-compatible object storage client.
//!
//! Talks to any endpoint that speaks the S3 API (Ceph RGW, `MinIO`, AWS) with
//! static credentials and path-style addressing. `AssumeRole` goes to the
//! same endpoint through STS.
//!
//! Deletes are confirmed: [`S3Client::delete_bucket`] and
//! [`S3Client::delete_object`] return only once an existence check reports
//! the resource gone, polling every `wait_interval_ms` up to
//! `wait_max_attempts` times.

mod types;
mod wait;

pub use types::{S3Bucket, S3Object, TemporaryCredentials};

use crate::config::S3Config;
use crate::{Error, Result};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use types::{object_from_sdk, to_chrono};
use wait::{Deletable, WaitPolicy, confirmed_delete, wait_until};

/// Region that rejects an explicit location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Client for one S3-compatible endpoint.
pub struct S3Client {
    name: String,
    s3: aws_sdk_s3::Client,
    sts: aws_sdk_sts::Client,
    region: String,
    wait: WaitPolicy,
}

/// Maps an SDK error onto the crate taxonomy.
///
/// Service errors carry an S3 error code and become rejections; dispatch,
/// timeout and response errors are transport.
fn sdk_error<E, R>(operation: &str, err: &SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err {
        SdkError::ServiceError(service) => {
            let inner = service.err();
            Error::BackendRejected {
                operation: operation.to_string(),
                code: inner.code().map(String::from),
                message: inner
                    .message()
                    .map_or_else(|| DisplayErrorContext(err).to_string(), String::from),
            }
        },
        _ => Error::transport(operation, DisplayErrorContext(err)),
    }
}

fn local_io(operation: &str, path: &Path, e: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: format!("{}: {e}", path.display()),
    }
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{what} must not be empty")));
    }
    Ok(())
}

struct BucketTarget<'a> {
    client: &'a S3Client,
    bucket: &'a str,
}

impl Deletable for BucketTarget<'_> {
    fn target(&self) -> String {
        format!("bucket '{}'", self.bucket)
    }

    async fn issue_delete(&self) -> Result<()> {
        self.client
            .s3
            .delete_bucket()
            .bucket(self.bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| sdk_error("s3_delete_bucket", &e))
    }

    async fn exists(&self) -> Result<bool> {
        self.client.bucket_exists(self.bucket).await
    }
}

struct ObjectTarget<'a> {
    client: &'a S3Client,
    bucket: &'a str,
    key: &'a str,
}

impl Deletable for ObjectTarget<'_> {
    fn target(&self) -> String {
        format!("object '{}/{}'", self.bucket, self.key)
    }

    async fn issue_delete(&self) -> Result<()> {
        self.client
            .s3
            .delete_object()
            .bucket(self.bucket)
            .key(self.key)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| sdk_error("s3_delete_object", &e))
    }

    async fn exists(&self) -> Result<bool> {
        self.client.object_exists(self.bucket, self.key).await
    }
}

impl S3Client {
    /// Builds a client from configuration without contacting the endpoint.
    #[must_use]
    pub fn new(name: &str, config: &S3Config) -> Self {
        let endpoint = config.endpoint_url();
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.expose_secret().to_string(),
            None,
            None,
            "static",
        );
        let timeouts = TimeoutConfig::builder()
            .operation_timeout(config.timeout())
            .build();

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(&endpoint)
            .credentials_provider(credentials.clone())
            .force_path_style(true)
            .timeout_config(timeouts.clone())
            .build();

        let sts_config = aws_sdk_sts::Config::builder()
            .behavior_version(aws_sdk_sts::config::BehaviorVersion::latest())
            .region(aws_sdk_sts::config::Region::new(config.region.clone()))
            .endpoint_url(&endpoint)
            .credentials_provider(credentials)
            .timeout_config(timeouts)
            .build();

        tracing::debug!(instance = %name, endpoint = %endpoint, "Configured S3 client");

        Self {
            name: name.to_string(),
            s3: aws_sdk_s3::Client::from_conf(s3_config),
            sts: aws_sdk_sts::Client::from_conf(sts_config),
            region: config.region.clone(),
            wait: WaitPolicy {
                interval: config.wait_interval(),
                max_attempts: config.wait_max_attempts,
            },
        }
    }

    /// Returns the instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates `bucket` and waits until it is visible.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendRejected`] if the bucket already exists or the
    /// name is refused, and [`Error::Transport`] if it never becomes visible.
    pub async fn create_bucket(&self, bucket: &str) -> Result<()> {
        require(bucket, "bucket name")?;
        let mut request = self.s3.create_bucket().bucket(bucket);
        if !self.region.is_empty() && self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        request
            .send()
            .await
            .map_err(|e| sdk_error("s3_create_bucket", &e))?;

        let target = format!("bucket '{bucket}'");
        wait_until("s3_create_bucket", &target, self.wait, true, || {
            self.bucket_exists(bucket)
        })
        .await?;
        tracing::info!(instance = %self.name, bucket = %bucket, "Created bucket");
        Ok(())
    }

    /// Lists buckets owned by the credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the endpoint is unreachable.
    pub async fn list_buckets(&self) -> Result<Vec<S3Bucket>> {
        let output = self
            .s3
            .list_buckets()
            .send()
            .await
            .map_err(|e| sdk_error("s3_list_buckets", &e))?;
        Ok(output
            .buckets()
            .iter()
            .map(|b| S3Bucket {
                name: b.name().unwrap_or_default().to_string(),
                creation_date: b.creation_date().and_then(to_chrono),
            })
            .collect())
    }

    /// Returns true if `bucket` exists and is reachable with these
    /// credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty name. A not-found reply
    /// is `Ok(false)`; other failures propagate.
    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        require(bucket, "bucket name")?;
        match self.s3.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) || e.as_service_error().is_some_and(|s| s.is_not_found()) => {
                Ok(false)
            },
            Err(e) => Err(sdk_error("s3_head_bucket", &e)),
        }
    }

    /// Deletes an empty `bucket` and waits until it is gone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendRejected`] if the bucket is not empty and
    /// [`Error::Transport`] if it is still present after every check.
    pub async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        require(bucket, "bucket name")?;
        let target = BucketTarget { client: self, bucket };
        confirmed_delete("s3_delete_bucket", &target, self.wait).await?;
        tracing::info!(instance = %self.name, bucket = %bucket, "Deleted bucket");
        Ok(())
    }

    /// Lists every object under `prefix`, following continuation tokens.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendRejected`] if the bucket does not exist.
    pub async fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<S3Object>> {
        require(bucket, "bucket name")?;
        let mut objects = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let output = self
                .s3
                .list_objects_v2()
                .bucket(bucket)
                .set_prefix(prefix.map(String::from))
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| sdk_error("s3_list_objects", &e))?;

            objects.extend(output.contents().iter().map(object_from_sdk));

            match output.next_continuation_token() {
                Some(next) if output.is_truncated().unwrap_or(false) => {
                    token = Some(next.to_string());
                },
                _ => break,
            }
        }

        tracing::debug!(instance = %self.name, bucket = %bucket, count = objects.len(), "Listed objects");
        Ok(objects)
    }

    /// Uploads a local file to `bucket/key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the file cannot be read.
    pub async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: Option<&str>,
    ) -> Result<()> {
        require(bucket, "bucket name")?;
        require(key, "object key")?;
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| local_io("s3_upload_file", path, e))?;

        self.s3
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .set_content_type(content_type.map(String::from))
            .send()
            .await
            .map_err(|e| sdk_error("s3_upload_file", &e))?;
        tracing::info!(instance = %self.name, bucket = %bucket, key = %key, "Uploaded object");
        Ok(())
    }

    /// Downloads `bucket/key` into a local file, returning the byte count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the file cannot be written.
    pub async fn download_file(&self, bucket: &str, key: &str, path: &Path) -> Result<u64> {
        require(bucket, "bucket name")?;
        require(key, "object key")?;
        let mut output = self
            .s3
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error("s3_download_file", &e))?;

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| local_io("s3_download_file", path, e))?;
        let mut written: u64 = 0;
        while let Some(chunk) = output
            .body
            .try_next()
            .await
            .map_err(|e| Error::transport("s3_download_file", e))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| local_io("s3_download_file", path, e))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| local_io("s3_download_file", path, e))?;

        tracing::info!(instance = %self.name, bucket = %bucket, key = %key, bytes = written, "Downloaded object");
        Ok(written)
    }

    /// Returns true if `bucket/key` exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty name. A not-found reply
    /// is `Ok(false)`; other failures propagate.
    pub async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        require(bucket, "bucket name")?;
        require(key, "object key")?;
        match self.s3.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) || e.as_service_error().is_some_and(|s| s.is_not_found()) => {
                Ok(false)
            },
            Err(e) => Err(sdk_error("s3_head_object", &e)),
        }
    }

    /// Deletes `bucket/key` and waits until it is gone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the object is still present after
    /// every check.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        require(bucket, "bucket name")?;
        require(key, "object key")?;
        let target = ObjectTarget { client: self, bucket, key };
        confirmed_delete("s3_delete_object", &target, self.wait).await?;
        tracing::info!(instance = %self.name, bucket = %bucket, key = %key, "Deleted object");
        Ok(())
    }

    /// Presigns a `GET` for `bucket/key`.
    ///
    /// When `content_type` is set, the download is served with that
    /// `Content-Type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `expires_in` is out of range.
    pub async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        expires_in: Duration,
    ) -> Result<String> {
        require(bucket, "bucket name")?;
        require(key, "object key")?;
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| Error::InvalidInput(format!("presign expiry: {e}")))?;

        let request = self
            .s3
            .get_object()
            .bucket(bucket)
            .key(key)
            .set_response_content_type(content_type.map(String::from))
            .presigned(presigning)
            .await
            .map_err(|e| sdk_error("s3_presign_get", &e))?;
        Ok(request.uri().to_string())
    }

    /// Requests temporary credentials for `role_arn`.
    ///
    /// `policy` further restricts the session when given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendRejected`] if the role cannot be assumed and
    /// [`Error::Parse`] if the reply carries no credentials.
    pub async fn assume_role(
        &self,
        session_name: &str,
        role_arn: &str,
        policy: Option<&str>,
        duration: Duration,
    ) -> Result<TemporaryCredentials> {
        require(session_name, "session name")?;
        require(role_arn, "role ARN")?;
        let seconds = i32::try_from(duration.as_secs())
            .map_err(|_| Error::InvalidInput("session duration is too long".to_string()))?;

        let output = self
            .sts
            .assume_role()
            .role_session_name(session_name)
            .role_arn(role_arn)
            .set_policy(policy.map(String::from))
            .duration_seconds(seconds)
            .send()
            .await
            .map_err(|e| sdk_error("sts_assume_role", &e))?;

        let credentials = output
            .credentials()
            .ok_or_else(|| Error::parse("AssumeRole reply", "missing credentials"))?;
        tracing::info!(instance = %self.name, role_arn = %role_arn, session = %session_name, "Assumed role");

        Ok(TemporaryCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: SecretString::from(credentials.secret_access_key().to_string()),
            session_token: SecretString::from(credentials.session_token().to_string()),
            expiration: to_chrono(credentials.expiration()),
        })
    }
}

/// HEAD replies carry no body, so a 404 may arrive without a modeled code.
fn is_not_found<E>(err: &SdkError<E, HttpResponse>) -> bool {
    err.raw_response()
        .is_some_and(|response| response.status().as_u16() == 404)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn unreachable_config() -> S3Config {
        S3Config {
            endpoint: "127.0.0.1:1".to_string(),
            disable_ssl: true,
            access_key: "AK".to_string(),
            secret_key: SecretString::from("SK".to_string()),
            timeout: 2,
            wait_interval_ms: 1,
            wait_max_attempts: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_new_does_not_connect() {
        let client = S3Client::new("archive", &unreachable_config());
        assert_eq!(client.name(), "archive");
        assert_eq!(client.wait.max_attempts, 2);
    }

    #[tokio::test]
    async fn test_presign_is_local() {
        let client = S3Client::new("archive", &unreachable_config());
        let url = client
            .presign_get("reports", "2024/q1.csv", Some("text/csv"), Duration::from_secs(300))
            .await
            .unwrap();

        assert!(url.starts_with("http://127.0.0.1:1/reports/2024/q1.csv?"));
        assert!(url.contains("X-Amz-Expires=300"));
        assert!(url.contains("response-content-type=text%2Fcsv"));
    }

    #[tokio::test]
    async fn test_presign_rejects_long_expiry() {
        let client = S3Client::new("archive", &unreachable_config());
        let err = client
            .presign_get("reports", "a", None, Duration::from_secs(8 * 24 * 3600))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let client = S3Client::new("archive", &unreachable_config());
        let err = client.list_buckets().await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_empty_names_fail_locally() {
        let client = S3Client::new("archive", &unreachable_config());
        assert!(matches!(client.create_bucket(" ").await, Err(Error::InvalidInput(_))));
        assert!(matches!(
            client.delete_object("b", "").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(client.bucket_exists("").await, Err(Error::InvalidInput(_))));
        assert!(matches!(
            client.object_exists("b", " ").await,
            Err(Error::InvalidInput(_))
        ));
    }
}
