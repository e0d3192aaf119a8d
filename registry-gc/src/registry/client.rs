use crate::config::Credentials;
use crate::error::RegistryError;
use crate::registry::Registry;
use oci_spec::image::Digest;
use reqwest::header::{ACCEPT, HeaderMap, LINK};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Media types offered when resolving a tag, so the registry reports the
/// digest of the manifest as stored instead of converting it.
const MANIFEST_MEDIA_TYPES: &str = concat!(
    "application/vnd.docker.distribution.manifest.v2+json, ",
    "application/vnd.docker.distribution.manifest.list.v2+json, ",
    "application/vnd.oci.image.manifest.v1+json, ",
    "application/vnd.oci.image.index.v1+json",
);

const CONTENT_DIGEST: &str = "Docker-Content-Digest";

#[derive(Deserialize)]
struct CatalogPage {
    #[serde(default)]
    repositories: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct TagPage {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// [`Registry`] backed by the distribution HTTP API.
pub struct HttpRegistry {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
    page_size: usize,
}

impl HttpRegistry {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Option<Credentials>,
        timeout: Duration,
        page_size: usize,
    ) -> Result<Self, RegistryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            page_size: page_size.max(1),
        })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.credentials {
            Some(credentials) => {
                builder.basic_auth(&credentials.username, Some(&credentials.password))
            }
            None => builder,
        }
    }

    async fn fetch_page<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<(T, Option<String>), RegistryError> {
        let res = self.request(Method::GET, url).send().await?;
        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(unexpected_status(status, url));
        }

        let next = next_link(res.headers())
            .map(|link| resolve_link(url, &link))
            .transpose()?;
        let body = res.bytes().await?;
        let page = serde_json::from_slice(&body)
            .map_err(|e| RegistryError::Protocol(format!("malformed body from {url}: {e}")))?;
        Ok((page, next))
    }

    /// Follows `Link: <...>; rel="next"` headers starting at `first`.
    async fn collect_pages<T, F>(
        &self,
        first: String,
        mut extract: F,
    ) -> Result<Vec<String>, RegistryError>
    where
        T: DeserializeOwned,
        F: FnMut(T) -> Vec<String>,
    {
        let mut items = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(first);
        while let Some(url) = next.take() {
            if !visited.insert(url.clone()) {
                return Err(RegistryError::Protocol(format!(
                    "pagination loops back to {url}"
                )));
            }
            let (page, link) = self.fetch_page::<T>(&url).await?;
            items.extend(extract(page));
            next = link;
        }
        Ok(items)
    }
}

#[async_trait::async_trait]
impl Registry for HttpRegistry {
    async fn list_repositories(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, RegistryError> {
        let url = format!("{}/v2/_catalog?n={}", self.base_url, self.page_size);
        cancellable(cancel, async {
            self.collect_pages(url, |page: CatalogPage| {
                page.repositories.unwrap_or_default()
            })
            .await
            .map_err(|e| match e {
                RegistryError::NotFound(url) => {
                    RegistryError::Protocol(format!("catalog endpoint {url} is not available"))
                }
                other => other,
            })
        })
        .await
    }

    async fn list_tags(
        &self,
        repo: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, RegistryError> {
        let url = format!("{}/v2/{repo}/tags/list", self.base_url);
        cancellable(cancel, async {
            self.collect_pages(url, |page: TagPage| page.tags.unwrap_or_default())
                .await
                .map_err(|e| match e {
                    RegistryError::NotFound(_) => {
                        RegistryError::NotFound(format!("repository `{repo}`"))
                    }
                    other => other,
                })
        })
        .await
    }

    async fn resolve_digest(
        &self,
        repo: &str,
        tag: &str,
        cancel: &CancellationToken,
    ) -> Result<Digest, RegistryError> {
        let url = format!("{}/v2/{repo}/manifests/{tag}", self.base_url);
        cancellable(cancel, async {
            let res = self
                .request(Method::HEAD, &url)
                .header(ACCEPT, MANIFEST_MEDIA_TYPES)
                .send()
                .await?;
            let status = res.status();
            if status == StatusCode::NOT_FOUND {
                return Err(RegistryError::NotFound(format!("{repo}:{tag}")));
            }
            if !status.is_success() {
                return Err(unexpected_status(status, &url));
            }

            let header = res
                .headers()
                .get(CONTENT_DIGEST)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| {
                    RegistryError::Protocol(format!("{url} returned no {CONTENT_DIGEST} header"))
                })?;
            Digest::from_str(header.trim()).map_err(|e| {
                RegistryError::Protocol(format!("{url} returned invalid digest `{header}`: {e}"))
            })
        })
        .await
    }

    async fn delete_manifest(
        &self,
        repo: &str,
        digest: &Digest,
        cancel: &CancellationToken,
    ) -> Result<(), RegistryError> {
        let url = format!("{}/v2/{repo}/manifests/{digest}", self.base_url);
        cancellable(cancel, async {
            let res = self.request(Method::DELETE, &url).send().await?;
            let status = res.status();
            if status == StatusCode::NOT_FOUND {
                tracing::debug!(repo, %digest, "manifest already deleted");
                return Ok(());
            }
            if !status.is_success() {
                return Err(unexpected_status(status, &url));
            }
            Ok(())
        })
        .await
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, RegistryError>>,
) -> Result<T, RegistryError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RegistryError::Cancelled),
        res = fut => res,
    }
}

fn unexpected_status(status: StatusCode, url: &str) -> RegistryError {
    RegistryError::Protocol(format!("status {} from {url}", status.as_u16()))
}

/// Resolves a `Link` target against the page it came from (RFC 3986), so
/// relative links work behind a path prefix.
fn resolve_link(current: &str, link: &str) -> Result<String, RegistryError> {
    Url::parse(current)
        .and_then(|base| base.join(link))
        .map(String::from)
        .map_err(|e| RegistryError::Protocol(format!("invalid next link `{link}`: {e}")))
}

/// Extracts the `rel="next"` target from RFC 5988 `Link` headers.
fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|entry| {
            let (target, params) = entry.split_once(';')?;
            let is_next = params.split(';').any(|param| {
                let param = param.trim();
                param == r#"rel="next""# || param == "rel=next"
            });
            if !is_next {
                return None;
            }
            target
                .trim()
                .strip_prefix('<')?
                .strip_suffix('>')
                .map(str::to_string)
        })
}
