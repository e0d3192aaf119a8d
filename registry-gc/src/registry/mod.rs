use crate::error::RegistryError;
use oci_spec::image::Digest;
use tokio_util::sync::CancellationToken;

pub mod client;

pub use client::HttpRegistry;

/// The slice of the distribution API the retention run needs.
///
/// Every call races the supplied token and returns [`RegistryError::Cancelled`]
/// once it fires.
#[async_trait::async_trait]
pub trait Registry: Send + Sync {
    /// All repository names known to the registry, in catalog order.
    async fn list_repositories(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, RegistryError>;

    /// Tag names of `repo`. A repository without tags yields an empty list.
    async fn list_tags(
        &self,
        repo: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, RegistryError>;

    /// Resolves `repo:tag` to its manifest digest, or
    /// [`RegistryError::NotFound`] if the tag is gone.
    async fn resolve_digest(
        &self,
        repo: &str,
        tag: &str,
        cancel: &CancellationToken,
    ) -> Result<Digest, RegistryError>;

    /// Deletes the manifest. Deleting an unknown digest succeeds.
    async fn delete_manifest(
        &self,
        repo: &str,
        digest: &Digest,
        cancel: &CancellationToken,
    ) -> Result<(), RegistryError>;
}
