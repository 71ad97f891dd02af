//! Azure Blob Storage overflow store over the Blob service REST API.

use super::azure::{resource_url, AzureError, AzureRestClient, RequestBody, StorageConnectionString};
use crate::client::OverflowStore;
use crate::error::StorageError;
use crate::message::{ContainerName, OverflowId};
use crate::provider::AzureStorageConfig;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use std::fmt;
use url::Url;

#[cfg(test)]
#[path = "azure_blob_tests.rs"]
mod tests;

/// [`OverflowStore`] backed by a blob container; one block blob per overflow object
#[derive(Clone)]
pub struct AzureBlobOverflowStore {
    client: AzureRestClient,
    container_url: Url,
    container_name: ContainerName,
}

impl AzureBlobOverflowStore {
    /// Create a store for `container_name` in the account named by the configuration
    pub fn new(
        config: &AzureStorageConfig,
        container_name: ContainerName,
    ) -> Result<Self, StorageError> {
        let connection = StorageConnectionString::parse(&config.connection_string)
            .map_err(AzureError::to_storage_error)?;
        Self::from_connection(
            &connection,
            container_name,
            std::time::Duration::from_secs(config.request_timeout_seconds),
        )
    }

    pub(crate) fn from_connection(
        connection: &StorageConnectionString,
        container_name: ContainerName,
        timeout: std::time::Duration,
    ) -> Result<Self, StorageError> {
        let client =
            AzureRestClient::new(connection, timeout).map_err(AzureError::to_storage_error)?;
        let container_url = resource_url(&connection.blob_endpoint, &[container_name.as_str()])
            .map_err(AzureError::to_storage_error)?;

        Ok(Self {
            client,
            container_url,
            container_name,
        })
    }

    fn blob_url(&self, id: &OverflowId) -> Result<Url, StorageError> {
        let blob_name = id.to_string();
        resource_url(&self.container_url, &[blob_name.as_str()])
            .map_err(AzureError::to_storage_error)
    }

    fn blob_key(&self, id: &OverflowId) -> String {
        format!("{}/{}", self.container_name, id)
    }
}

impl fmt::Debug for AzureBlobOverflowStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureBlobOverflowStore")
            .field("container_url", &self.container_url.as_str())
            .finish()
    }
}

#[async_trait]
impl OverflowStore for AzureBlobOverflowStore {
    async fn create_if_not_exists(&self) -> Result<bool, StorageError> {
        let mut url = self.container_url.clone();
        url.query_pairs_mut().append_pair("restype", "container");

        match self.client.execute(Method::PUT, url, None, &[]).await {
            Ok(_) => Ok(true),
            Err(e) if e.error_code() == Some("ContainerAlreadyExists") => Ok(false),
            Err(e) => Err(e.to_storage_error()),
        }
    }

    async fn upload(
        &self,
        id: &OverflowId,
        content: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let url = self.blob_url(id)?;
        self.client
            .execute(
                Method::PUT,
                url,
                Some(RequestBody {
                    content_type,
                    content,
                }),
                &[("x-ms-blob-type", "BlockBlob")],
            )
            .await
            .map_err(AzureError::to_storage_error)?;
        Ok(())
    }

    async fn open_read(&self, id: &OverflowId) -> Result<Bytes, StorageError> {
        let url = self.blob_url(id)?;
        match self.client.execute(Method::GET, url, None, &[]).await {
            Ok(response) => Ok(response.body),
            Err(e) if e.status() == Some(404) => Err(StorageError::NotFound {
                key: self.blob_key(id),
            }),
            Err(e) => Err(e.to_storage_error()),
        }
    }

    async fn delete_if_exists(&self, id: &OverflowId) -> Result<bool, StorageError> {
        let url = self.blob_url(id)?;
        match self.client.execute(Method::DELETE, url, None, &[]).await {
            Ok(_) => Ok(true),
            Err(e) if e.status() == Some(404) => Ok(false),
            Err(e) => Err(e.to_storage_error()),
        }
    }

    fn container_name(&self) -> &ContainerName {
        &self.container_name
    }
}
