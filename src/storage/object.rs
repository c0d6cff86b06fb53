//! # Object Stores
//!
//! Remote homes for backup archives. The content type recorded on upload is
//! handed back on download so the caller can refuse formats it can't read.
//!
//! - [`S3ObjectStore`]: the real bucket, through the AWS SDK
//! - [`FsObjectStore`]: `<root>/<bucket>/<key>` on the local filesystem

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;

use super::errors::{StorageError, StorageResult};
use crate::location::ObjectRef;

/// Bucket/key addressed archive storage
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    /// Upload the file at `source`
    fn put(&self, object: &ObjectRef, source: &Path, content_type: &str) -> StorageResult<()>;

    /// Download to `destination`, returning the recorded content type
    fn get(&self, object: &ObjectRef, destination: &Path) -> StorageResult<Option<String>>;
}

/// Client settings for [`S3ObjectStore`]; unset fields fall back to the
/// standard AWS environment and profile chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Settings {
    pub region: Option<String>,
    /// S3-compatible endpoint; switches to path-style addressing
    pub endpoint_url: Option<String>,
}

impl S3Settings {
    async fn load_client(&self) -> Client {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint_url) = &self.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        let shared = loader.load().await;

        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(self.endpoint_url.is_some())
            .build();
        Client::from_conf(config)
    }
}

/// Object store backed by the AWS SDK.
///
/// Calls block on a private current-thread runtime. The client is built on
/// first use, so constructing the store never touches the network.
#[derive(Debug)]
pub struct S3ObjectStore {
    runtime: Runtime,
    settings: S3Settings,
    client: OnceLock<Client>,
}

impl S3ObjectStore {
    pub fn new(settings: S3Settings) -> StorageResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        Ok(Self {
            runtime,
            settings,
            client: OnceLock::new(),
        })
    }

    fn client(&self) -> &Client {
        self.client
            .get_or_init(|| self.runtime.block_on(self.settings.load_client()))
    }

    async fn put_async(
        &self,
        client: &Client,
        object: &ObjectRef,
        source: &Path,
        content_type: &str,
    ) -> StorageResult<()> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| StorageError::IoError(format!("{}: {}", source.display(), e)))?;

        client
            .put_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::TransferFailed(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    async fn get_async(
        &self,
        client: &Client,
        object: &ObjectRef,
        destination: &Path,
    ) -> StorageResult<Option<String>> {
        let output = client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .map_err(|e| get_error(object, e))?;

        let content_type = output.content_type().map(str::to_string);

        let mut body = output.body.into_async_read();
        let mut file = tokio::fs::File::create(destination).await?;
        tokio::io::copy(&mut body, &mut file).await?;
        file.sync_all().await?;

        Ok(content_type)
    }
}

fn get_error(object: &ObjectRef, err: SdkError<GetObjectError>) -> StorageError {
    if err
        .as_service_error()
        .map_or(false, GetObjectError::is_no_such_key)
    {
        return StorageError::ObjectNotFound(object.to_string());
    }
    StorageError::TransferFailed(DisplayErrorContext(&err).to_string())
}

impl ObjectStore for S3ObjectStore {
    fn put(&self, object: &ObjectRef, source: &Path, content_type: &str) -> StorageResult<()> {
        let client = self.client();
        self.runtime
            .block_on(self.put_async(client, object, source, content_type))
    }

    fn get(&self, object: &ObjectRef, destination: &Path) -> StorageResult<Option<String>> {
        let client = self.client();
        self.runtime
            .block_on(self.get_async(client, object, destination))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectMeta {
    content_type: String,
}

/// Object store on the local filesystem: `<root>/<bucket>/<key>`, with the
/// content type in a `<key>.meta.json` sidecar
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn object_path(&self, object: &ObjectRef) -> StorageResult<PathBuf> {
        let key = Path::new(&object.key);
        if !key.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(StorageError::InvalidPath(object.key.clone()));
        }
        Ok(self.root.join(&object.bucket).join(key))
    }

    fn meta_path(path: &Path) -> PathBuf {
        let mut meta = path.as_os_str().to_owned();
        meta.push(".meta.json");
        PathBuf::from(meta)
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, object: &ObjectRef, source: &Path, content_type: &str) -> StorageResult<()> {
        let path = self.object_path(object)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::copy(source, &path)?;

        let meta = serde_json::to_string(&ObjectMeta {
            content_type: content_type.to_string(),
        })
        .map_err(|e| StorageError::IoError(e.to_string()))?;
        fs::write(Self::meta_path(&path), meta)?;

        Ok(())
    }

    fn get(&self, object: &ObjectRef, destination: &Path) -> StorageResult<Option<String>> {
        let path = self.object_path(object)?;

        fs::copy(&path, destination).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::ObjectNotFound(object.to_string())
            } else {
                StorageError::IoError(e.to_string())
            }
        })?;

        match fs::read_to_string(Self::meta_path(&path)) {
            Ok(contents) => {
                let meta: ObjectMeta = serde_json::from_str(&contents)
                    .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;
                Ok(Some(meta.content_type))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
