use std::path::Path;

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use snafu::{OptionExt, ResultExt};
use tracing::{debug, info};

use crate::error::{
    BucketSnafu, GetObjectSnafu, ListObjectsSnafu, MissingCredentialsSnafu, MissingEnvSnafu,
    PartialCredentialsSnafu, PutObjectSnafu, Result, UnexpectedStatusSnafu, WriteFileSnafu,
};
use crate::utils::helpers::env_var;

pub const ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY";
pub const SECRET_KEY_ENV: &str = "AWS_SECRET_KEY";
pub const BUCKET_ENV: &str = "S3_BUCKET";
pub const REGION_ENV: &str = "AWS_REGION";
pub const ENDPOINT_ENV: &str = "S3_ENDPOINT";

const DEFAULT_REGION: &str = "us-east-1";

/// S3 storage configuration
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// AWS region, also used to derive the default endpoint
    pub region: String,
    /// S3 endpoint (e.g., "http://localhost:9000" for MinIO)
    pub endpoint: Option<String>,
    /// AWS access key ID
    pub access_key: Option<String>,
    /// AWS secret access key
    pub secret_key: Option<String>,
}

impl S3Config {
    /// Configuration for `bucket`, with region, endpoint and keys taken
    /// from the environment when set.
    pub fn new(bucket: impl Into<String>) -> Self {
        S3Config {
            bucket: bucket.into(),
            region: env_var(REGION_ENV).unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint: env_var(ENDPOINT_ENV),
            access_key: env_var(ACCESS_KEY_ENV),
            secret_key: env_var(SECRET_KEY_ENV),
        }
    }

    /// Configuration whose bucket name comes from `S3_BUCKET`.
    /// Fails before any network activity when the variable is unset.
    pub fn from_env() -> Result<Self> {
        let bucket = env_var(BUCKET_ENV).context(MissingEnvSnafu { name: BUCKET_ENV })?;
        Ok(S3Config::new(bucket))
    }

    /// Replace any environment-provided keys with explicit ones.
    pub fn with_keys(mut self, access_key: Option<String>, secret_key: Option<String>) -> Self {
        self.access_key = access_key.filter(|k| !k.is_empty());
        self.secret_key = secret_key.filter(|k| !k.is_empty());
        self
    }
}

/// Resolve credentials: both keys give static credentials, exactly one
/// is an error, neither falls back to the ambient AWS credential chain.
pub fn resolve_credentials(access_key: Option<&str>, secret_key: Option<&str>) -> Result<Credentials> {
    match (access_key, secret_key) {
        (Some(access_key), Some(secret_key)) => {
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .context(MissingCredentialsSnafu)
        }
        (Some(_), None) => PartialCredentialsSnafu { missing: SECRET_KEY_ENV }.fail(),
        (None, Some(_)) => PartialCredentialsSnafu { missing: ACCESS_KEY_ENV }.fail(),
        (None, None) => {
            debug!("No explicit AWS keys, resolving credentials from the environment");
            Credentials::new(None, None, None, None, None).context(MissingCredentialsSnafu)
        }
    }
}

/// Build an S3 bucket instance from configuration
pub fn build_s3_bucket(config: &S3Config) -> Result<Box<Bucket>> {
    let credentials = resolve_credentials(config.access_key.as_deref(), config.secret_key.as_deref())?;
    let (region, path_style) = match &config.endpoint {
        Some(endpoint) => (
            Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            true,
        ),
        None => (
            Region::Custom {
                region: config.region.clone(),
                endpoint: format!("https://s3.{}.amazonaws.com", config.region),
            },
            false,
        ),
    };

    let bucket = Bucket::new(&config.bucket, region, credentials).context(BucketSnafu {
        bucket: config.bucket.clone(),
    })?;
    if path_style {
        Ok(bucket.with_path_style())
    } else {
        Ok(bucket)
    }
}

/// One page of a bucket listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Token for the next page; `None` on the last page.
    pub next_continuation: Option<String>,
}

/// The object-storage operations the pipelines rely on.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name shown in log lines.
    fn name(&self) -> &str;

    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> Result<ListPage>;

    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;

    async fn put_object(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Every key under `prefix`, following continuation tokens to the end.
    async fn list_all(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation = None;
        loop {
            let page = self.list_page(prefix, continuation).await?;
            keys.extend(page.keys);
            match page.next_continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }
        Ok(keys)
    }

    /// Download `key` into the local file `path`, returning its size.
    async fn download_to(&self, key: &str, path: &Path) -> Result<u64> {
        let data = self.get_object(key).await?;
        tokio::fs::write(path, &data)
            .await
            .context(WriteFileSnafu { path })?;
        Ok(data.len() as u64)
    }
}

/// [`ObjectStore`] backed by an S3 (or S3-compatible) bucket.
pub struct S3Store {
    name: String,
    bucket: Box<Bucket>,
}

impl S3Store {
    pub fn new(bucket: Box<Bucket>) -> Self {
        S3Store {
            name: bucket.name(),
            bucket,
        }
    }

    pub fn connect(config: &S3Config) -> Result<Self> {
        build_s3_bucket(config).map(S3Store::new)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> Result<ListPage> {
        let (result, code) = self
            .bucket
            .list_page(prefix.to_string(), None, continuation, None, None)
            .await
            .context(ListObjectsSnafu { prefix })?;
        if code != 200 {
            return UnexpectedStatusSnafu { key: prefix, code }.fail();
        }

        let keys = result.contents.into_iter().map(|obj| obj.key).collect();
        let next_continuation = if result.is_truncated {
            result.next_continuation_token
        } else {
            None
        };
        Ok(ListPage {
            keys,
            next_continuation,
        })
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .bucket
            .get_object(key)
            .await
            .context(GetObjectSnafu { key })?;
        let code = response.status_code();
        if code == 200 {
            let bytes = response.bytes().to_vec();
            info!("Downloaded S3 object '{}': {} bytes", key, bytes.len());
            Ok(bytes)
        } else {
            UnexpectedStatusSnafu { key, code }.fail()
        }
    }

    async fn put_object(&self, key: &str, data: &[u8]) -> Result<()> {
        let response = self
            .bucket
            .put_object(key, data)
            .await
            .context(PutObjectSnafu { key })?;
        let code = response.status_code();
        if code == 200 || code == 201 {
            Ok(())
        } else {
            UnexpectedStatusSnafu { key, code }.fail()
        }
    }
}
