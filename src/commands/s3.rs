//! S3 commands.

use super::print_json;
use anyhow::Context;
use clap::Subcommand;
use myadmin::Registry;
use myadmin::services::BucketService;
use secrecy::ExposeSecret;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

/// S3 subcommands.
#[derive(Subcommand)]
pub enum S3Action {
    /// List buckets.
    Buckets,
    /// Create a bucket unless it exists.
    CreateBucket {
        /// Bucket name.
        bucket: String,
    },
    /// Delete a bucket.
    DeleteBucket {
        /// Bucket name.
        bucket: String,
        /// Delete every object first.
        #[arg(long)]
        purge: bool,
    },
    /// List objects.
    Objects {
        /// Bucket name.
        bucket: String,
        /// Key prefix.
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Upload a local file.
    Upload {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Local file.
        path: PathBuf,
        /// Content type.
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Download an object to a local file.
    Download {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Local file.
        path: PathBuf,
    },
    /// Check whether a bucket or object exists.
    Exists {
        /// Bucket name.
        bucket: String,
        /// Object key; checks the bucket when omitted.
        key: Option<String>,
    },
    /// Delete an object.
    DeleteObject {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
    },
    /// Presign a download URL for an existing object.
    Presign {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Content type served with the download.
        #[arg(long)]
        content_type: Option<String>,
        /// URL lifetime in seconds.
        #[arg(long, default_value = "3600")]
        expires_secs: u64,
    },
    /// Request temporary credentials through STS.
    AssumeRole {
        /// Role ARN.
        role_arn: String,
        /// Session name.
        #[arg(long, default_value = "myadmin")]
        session_name: String,
        /// File holding a session policy document.
        #[arg(long)]
        policy_file: Option<PathBuf>,
        /// Session lifetime in seconds.
        #[arg(long, default_value = "3600")]
        duration_secs: u64,
    },
}

/// Runs an S3 subcommand against `instance`.
pub async fn cmd_s3(
    registry: &Registry,
    instance: Option<&str>,
    action: S3Action,
) -> anyhow::Result<()> {
    let s3 = registry.s3(instance).await?;

    match action {
        S3Action::Buckets => print_json(&s3.list_buckets().await?),
        S3Action::CreateBucket { bucket } => {
            let created = BucketService::new(s3).ensure_bucket(&bucket).await?;
            print_json(&json!({ "bucket": bucket, "created": created }))
        },
        S3Action::DeleteBucket { bucket, purge } => {
            if purge {
                let summary = BucketService::new(s3).purge_bucket(&bucket).await?;
                print_json(&json!({ "bucket": bucket, "deleted": true, "objects_deleted": summary.objects_deleted }))
            } else {
                s3.delete_bucket(&bucket).await?;
                print_json(&json!({ "bucket": bucket, "deleted": true }))
            }
        },
        S3Action::Objects { bucket, prefix } => {
            print_json(&s3.list_objects(&bucket, prefix.as_deref()).await?)
        },
        S3Action::Upload {
            bucket,
            key,
            path,
            content_type,
        } => {
            s3.upload_file(&bucket, &key, &path, content_type.as_deref())
                .await?;
            print_json(&json!({ "bucket": bucket, "key": key, "uploaded": true }))
        },
        S3Action::Download { bucket, key, path } => {
            let bytes = s3.download_file(&bucket, &key, &path).await?;
            print_json(&json!({ "bucket": bucket, "key": key, "bytes": bytes, "path": path }))
        },
        S3Action::Exists { bucket, key } => {
            let exists = match &key {
                Some(key) => s3.object_exists(&bucket, key).await?,
                None => s3.bucket_exists(&bucket).await?,
            };
            print_json(&json!({ "bucket": bucket, "key": key, "exists": exists }))
        },
        S3Action::DeleteObject { bucket, key } => {
            s3.delete_object(&bucket, &key).await?;
            print_json(&json!({ "bucket": bucket, "key": key, "deleted": true }))
        },
        S3Action::Presign {
            bucket,
            key,
            content_type,
            expires_secs,
        } => {
            let url = BucketService::new(s3)
                .share_object(
                    &bucket,
                    &key,
                    content_type.as_deref(),
                    Duration::from_secs(expires_secs),
                )
                .await?;
            print_json(&json!({ "url": url, "expires_in": expires_secs }))
        },
        S3Action::AssumeRole {
            role_arn,
            session_name,
            policy_file,
            duration_secs,
        } => {
            let policy = match &policy_file {
                Some(path) => Some(
                    std::fs::read_to_string(path)
                        .with_context(|| format!("reading policy {}", path.display()))?,
                ),
                None => None,
            };
            let credentials = s3
                .assume_role(
                    &session_name,
                    &role_arn,
                    policy.as_deref(),
                    Duration::from_secs(duration_secs),
                )
                .await?;
            print_json(&json!({
                "access_key_id": credentials.access_key_id,
                "secret_access_key": credentials.secret_access_key.expose_secret(),
                "session_token": credentials.session_token.expose_secret(),
                "expiration": credentials.expiration,
            }))
        },
    }
}
