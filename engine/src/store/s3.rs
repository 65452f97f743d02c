use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_types::region::Region;
use stepseg_common::config::S3Config;
use stepseg_common::step::{Step, StepRecord};
use tracing::{debug, info};

use super::keys::{manifest_key, step_key};
use super::{manifest_bytes, StepRef, StepStore, StoreError};

/// S3-compatible object storage for step screenshots.
pub struct S3StepStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

impl S3StepStore {
    pub async fn new(config: &S3Config) -> Self {
        let creds = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "static",
        );

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .endpoint_url(&config.endpoint)
            .credentials_provider(creds)
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        let client = aws_sdk_s3::Client::from_conf(s3_config);

        Self {
            client,
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
        }
    }

    /// Create the bucket unless it already exists.
    pub async fn ensure_bucket(&self) -> Result<(), StoreError> {
        if self.client.head_bucket().bucket(&self.bucket).send().await.is_ok() {
            debug!(bucket = self.bucket, "bucket exists");
        } else {
            self.client
                .create_bucket()
                .bucket(&self.bucket)
                .send()
                .await
                .map_err(|e| StoreError::CreateBucket(e.to_string()))?;
        }
        info!(bucket = self.bucket, prefix = self.prefix, "step bucket ready");
        Ok(())
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StoreError::PutObject(e.to_string()))?;
        debug!(bucket = self.bucket, key, size, "stored object");
        Ok(())
    }

    fn reference(&self, key: &str) -> StepRef {
        object_ref(&self.bucket, key)
    }
}

/// `s3://bucket/key` reference for a stored object.
fn object_ref(bucket: &str, key: &str) -> StepRef {
    StepRef::new(format!("s3://{bucket}/{key}"))
}

impl StepStore for S3StepStore {
    async fn persist(&self, index: usize, step: &Step) -> Result<StepRef, StoreError> {
        let png = step.frame().encode_png()?;
        let key = step_key(&self.prefix, index, step.timestamp());
        self.put(&key, png, "image/png").await?;
        Ok(self.reference(&key))
    }

    async fn put_manifest(&self, records: &[StepRecord]) -> Result<StepRef, StoreError> {
        let data = manifest_bytes(records)?;
        let key = manifest_key(&self.prefix);
        self.put(&key, data, "application/json").await?;
        Ok(self.reference(&key))
    }

    fn name(&self) -> &str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s3_config(prefix: &str) -> S3Config {
        S3Config {
            endpoint: "http://127.0.0.1:9000".into(),
            access_key: "key".into(),
            secret_key: "secret".into(),
            bucket: "steps".into(),
            prefix: prefix.into(),
            region: "us-east-1".into(),
        }
    }

    #[test]
    fn object_refs_name_bucket_and_key() {
        assert_eq!(
            object_ref("steps", &step_key("run-1/", 3, 2.5)).as_str(),
            "s3://steps/run-1/step_003_19700101T000002500Z.png"
        );
        assert_eq!(
            object_ref("steps", &manifest_key("")).as_str(),
            "s3://steps/steps.json"
        );
    }

    #[tokio::test]
    async fn references_use_configured_bucket_and_prefix() {
        let store = S3StepStore::new(&s3_config("steps/")).await;
        assert_eq!(store.name(), "s3");

        let key = step_key(&store.prefix, 0, 0.0);
        assert_eq!(
            store.reference(&key).as_str(),
            "s3://steps/steps/step_000_19700101T000000000Z.png"
        );
        assert_eq!(
            store.reference(&manifest_key(&store.prefix)).as_str(),
            "s3://steps/steps/steps.json"
        );
    }
}
