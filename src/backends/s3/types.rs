//! Bucket, object and credential facts returned by the S3 client.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;

/// One bucket from `ListBuckets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct S3Bucket {
    /// Bucket name.
    pub name: String,
    /// Creation time, when reported.
    pub creation_date: Option<DateTime<Utc>>,
}

/// One object from `ListObjectsV2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct S3Object {
    /// Object key.
    pub key: String,
    /// Size in bytes.
    pub size: i64,
    /// Last modification time.
    pub last_modified: Option<DateTime<Utc>>,
    /// Entity tag, quotes included as sent.
    pub etag: Option<String>,
    /// Storage class, e.g. `STANDARD` or `GLACIER`.
    pub storage_class: Option<String>,
}

/// Credentials issued by `AssumeRole`.
#[derive(Debug, Clone)]
pub struct TemporaryCredentials {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: SecretString,
    /// Session token to send with every request.
    pub session_token: SecretString,
    /// Expiry time.
    pub expiration: Option<DateTime<Utc>>,
}

/// Converts an SDK timestamp.
pub(crate) fn to_chrono(value: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}

/// Converts one `ListObjectsV2` entry.
pub(crate) fn object_from_sdk(object: &aws_sdk_s3::types::Object) -> S3Object {
    S3Object {
        key: object.key().unwrap_or_default().to_string(),
        size: object.size().unwrap_or_default(),
        last_modified: object.last_modified().and_then(to_chrono),
        etag: object.e_tag().map(String::from),
        storage_class: object.storage_class().map(|c| c.as_str().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::types::{Object, ObjectStorageClass};

    #[test]
    fn test_object_from_sdk_keeps_storage_class() {
        let object = Object::builder()
            .key("logs/2024-03-09.gz")
            .size(3)
            .e_tag("\"abc\"")
            .storage_class(ObjectStorageClass::Glacier)
            .last_modified(aws_sdk_s3::primitives::DateTime::from_secs(1_700_000_000))
            .build();

        let converted = object_from_sdk(&object);
        assert_eq!(converted.key, "logs/2024-03-09.gz");
        assert_eq!(converted.size, 3);
        assert_eq!(converted.etag.as_deref(), Some("\"abc\""));
        assert_eq!(converted.storage_class.as_deref(), Some("GLACIER"));
        assert_eq!(
            converted.last_modified.map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn test_object_from_sdk_without_optional_fields() {
        let converted = object_from_sdk(&Object::builder().build());
        assert_eq!(converted.key, "");
        assert_eq!(converted.size, 0);
        assert_eq!(converted.storage_class, None);
        assert_eq!(converted.last_modified, None);
    }
}
