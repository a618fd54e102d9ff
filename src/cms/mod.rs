use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, warn};

use crate::cms::model::{
    CategoryRef, CreatedItem, ItemEnvelope, ListEnvelope, MirrorFields, MirrorModule, TagRef,
};
use crate::config::Config;

pub mod model;

/// Mirror collection identifiers, resolved once from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionIds {
    pub modules: String,
    pub categories: String,
    pub tags: String,
}

impl CollectionIds {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            modules: cfg.cms.collections.modules.clone(),
            categories: cfg.cms.collections.categories.clone(),
            tags: cfg.cms.collections.tags.clone(),
        }
    }
}

/// Narrow seam over the mirror store's item API. The orchestrator and syncers
/// only touch the mirror through this trait, so tests substitute a recording
/// fake. Transport failures are `Err`; a missing item is `Ok(None)`. The two
/// must never be conflated.
#[async_trait]
pub trait CmsService: Send + Sync {
    async fn fetch_module(&self, item_id: &str) -> Result<Option<MirrorModule>>;
    async fn find_module_by_slug(&self, slug: &str) -> Result<Option<MirrorModule>>;
    async fn list_modules(&self) -> Result<Vec<MirrorModule>>;
    async fn create_module(&self, fields: &MirrorFields) -> Result<String>;
    /// Returns `Ok(false)` when the item id is stale (already deleted
    /// mirror-side); the caller re-creates in that case.
    async fn update_module(&self, item_id: &str, fields: &MirrorFields) -> Result<bool>;
    async fn delete_module(&self, item_id: &str) -> Result<()>;
    async fn list_categories(&self) -> Result<Vec<CategoryRef>>;
    async fn list_tags(&self) -> Result<Vec<TagRef>>;
    /// Credential probe run once before a batch; a failure here is fatal for
    /// the whole run rather than per-module.
    async fn check_auth(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct CmsClient {
    http: Client,
    base_url: Url,
    token: String,
    collections: CollectionIds,
}

impl fmt::Debug for CmsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmsClient")
            .field("base_url", &self.base_url)
            .field("collections", &self.collections)
            .finish_non_exhaustive()
    }
}

impl CmsClient {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = Url::parse(&cfg.cms.base_url).context("invalid cms.base_url")?;
        Ok(Self::with_base_url(
            cfg.cms.token.clone(),
            CollectionIds::from_config(cfg),
            base_url,
        ))
    }

    pub fn with_base_url(token: String, collections: CollectionIds, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("catalog-mirror/0.1")
            // Timeouts apply per call, not per batch.
            .timeout(std::time::Duration::from_secs(30))
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            token,
            collections,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("invalid CMS base URL")
    }

    pub fn build_request(&self, method: Method, endpoint: Url, body: Option<&Value>) -> Result<reqwest::Request> {
        let mut builder = self
            .http
            .request(method, endpoint)
            .header("Authorization", format!("Bearer {}", self.token));
        if let Some(body) = body {
            builder = builder.header("Content-Type", "application/json").json(body);
        }
        builder.build().context("failed to build CMS request")
    }

    async fn execute(&self, method: Method, endpoint: Url, body: Option<&Value>) -> Result<reqwest::Response> {
        let request = self.build_request(method, endpoint, body)?;
        debug!(url=%request.url(), method=%request.method(), "sending CMS request");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach CMS")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("rate limited by CMS: {}", body);
            return Err(anyhow!("received 429 from CMS: {}", body));
        }
        Ok(res)
    }

    /// Execute and fail on any non-2xx status.
    async fn execute_ok(&self, method: Method, endpoint: Url, body: Option<&Value>) -> Result<reqwest::Response> {
        let res = self.execute(method, endpoint, body).await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("cms error {}: {}", status, body));
        }
        Ok(res)
    }

    fn modules_path(&self) -> String {
        format!("v1/collections/{}/items", self.collections.modules)
    }
}

#[async_trait]
impl CmsService for CmsClient {
    async fn fetch_module(&self, item_id: &str) -> Result<Option<MirrorModule>> {
        let endpoint = self.endpoint(&format!("v1/items/{}", item_id))?;
        let res = self.execute(Method::GET, endpoint, None).await?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("cms error {}: {}", status, body));
        }
        let envelope: ItemEnvelope<MirrorModule> =
            res.json().await.context("invalid CMS item response")?;
        Ok(Some(envelope.item))
    }

    async fn find_module_by_slug(&self, slug: &str) -> Result<Option<MirrorModule>> {
        // Slugs travel as a query value, so they must be percent-encoded.
        let mut endpoint = self.endpoint(&self.modules_path())?;
        endpoint.query_pairs_mut().append_pair("slug", slug);
        let res = self.execute_ok(Method::GET, endpoint, None).await?;
        let envelope: ListEnvelope<MirrorModule> =
            res.json().await.context("invalid CMS list response")?;
        Ok(envelope.items.into_iter().next())
    }

    async fn list_modules(&self) -> Result<Vec<MirrorModule>> {
        let endpoint = self.endpoint(&self.modules_path())?;
        let res = self.execute_ok(Method::GET, endpoint, None).await?;
        let envelope: ListEnvelope<MirrorModule> =
            res.json().await.context("invalid CMS list response")?;
        Ok(envelope.items)
    }

    async fn create_module(&self, fields: &MirrorFields) -> Result<String> {
        let body = build_module_item_body(fields);
        let endpoint = self.endpoint(&self.modules_path())?;
        let res = self.execute_ok(Method::POST, endpoint, Some(&body)).await?;
        let created: CreatedItem = res.json().await.context("invalid CMS create response")?;
        Ok(created.id)
    }

    async fn update_module(&self, item_id: &str, fields: &MirrorFields) -> Result<bool> {
        let body = build_module_item_body(fields);
        let endpoint = self.endpoint(&format!("v1/items/{}", item_id))?;
        let res = self.execute(Method::PATCH, endpoint, Some(&body)).await?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("cms error {}: {}", status, body));
        }
        Ok(true)
    }

    async fn delete_module(&self, item_id: &str) -> Result<()> {
        let endpoint = self.endpoint(&format!("v1/items/{}", item_id))?;
        let res = self.execute(Method::DELETE, endpoint, None).await?;
        // Deleting an already-gone item is fine.
        if res.status() == StatusCode::NOT_FOUND || res.status().is_success() {
            return Ok(());
        }
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        Err(anyhow!("cms error {}: {}", status, body))
    }

    async fn list_categories(&self) -> Result<Vec<CategoryRef>> {
        let endpoint = self.endpoint(&format!("v1/collections/{}/items", self.collections.categories))?;
        let res = self.execute_ok(Method::GET, endpoint, None).await?;
        let envelope: ListEnvelope<CategoryRef> =
            res.json().await.context("invalid CMS list response")?;
        Ok(envelope.items)
    }

    async fn list_tags(&self) -> Result<Vec<TagRef>> {
        let endpoint = self.endpoint(&format!("v1/collections/{}/items", self.collections.tags))?;
        let res = self.execute_ok(Method::GET, endpoint, None).await?;
        let envelope: ListEnvelope<TagRef> =
            res.json().await.context("invalid CMS list response")?;
        Ok(envelope.items)
    }

    async fn check_auth(&self) -> Result<()> {
        let endpoint = self.endpoint("v1/me")?;
        self.execute_ok(Method::GET, endpoint, None)
            .await
            .context("CMS credential check failed")?;
        Ok(())
    }
}

/// Build the request body for a module item create/update.
pub fn build_module_item_body(fields: &MirrorFields) -> Value {
    json!({
        "fields": {
            "slug": fields.slug,
            "title": fields.title,
            "summary": fields.summary,
            "body": fields.body,
            "category": fields.category,
            "tags": fields.tags,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_collections() -> CollectionIds {
        CollectionIds {
            modules: "coll-modules".into(),
            categories: "coll-categories".into(),
            tags: "coll-tags".into(),
        }
    }

    fn sample_fields() -> MirrorFields {
        MirrorFields {
            slug: "intro".into(),
            title: "Intro".into(),
            summary: Some("short".into()),
            body: "# Intro".into(),
            category: Some("cat-1".into()),
            tags: vec!["tag-1".into(), "tag-2".into()],
        }
    }

    #[test]
    fn build_module_item_body_maps_all_fields() {
        let body = build_module_item_body(&sample_fields());
        assert_eq!(body["fields"]["slug"], "intro");
        assert_eq!(body["fields"]["title"], "Intro");
        assert_eq!(body["fields"]["summary"], "short");
        assert_eq!(body["fields"]["category"], "cat-1");
        assert_eq!(body["fields"]["tags"][1], "tag-2");
    }

    #[test]
    fn build_module_item_body_keeps_null_category() {
        let mut fields = sample_fields();
        fields.category = None;
        fields.summary = None;
        let body = build_module_item_body(&fields);
        assert!(body["fields"]["category"].is_null());
        assert!(body["fields"]["summary"].is_null());
    }

    #[test]
    fn build_request_sets_headers() {
        let client = CmsClient::with_base_url(
            "token".into(),
            sample_collections(),
            Url::parse("https://cms.example.com/").unwrap(),
        );
        let body = json!({ "sample": true });
        let endpoint = client.endpoint("v1/collections/coll-modules/items").unwrap();
        let request = client
            .build_request(Method::POST, endpoint, Some(&body))
            .unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/v1/collections/coll-modules/items");
        let headers = request.headers();
        assert_eq!(
            headers
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer token"
        );
        assert_eq!(
            headers
                .get("Content-Type")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "application/json"
        );
    }

    #[test]
    fn get_request_has_no_content_type() {
        let client = CmsClient::with_base_url(
            "token".into(),
            sample_collections(),
            Url::parse("https://cms.example.com/").unwrap(),
        );
        let endpoint = client.endpoint("v1/me").unwrap();
        let request = client.build_request(Method::GET, endpoint, None).unwrap();
        assert!(request.headers().get("Content-Type").is_none());
    }

    #[test]
    fn slug_query_is_percent_encoded() {
        let client = CmsClient::with_base_url(
            "token".into(),
            sample_collections(),
            Url::parse("https://cms.example.com/").unwrap(),
        );
        let mut endpoint = client.endpoint("v1/collections/coll-modules/items").unwrap();
        endpoint.query_pairs_mut().append_pair("slug", "a&b #c");
        let request = client.build_request(Method::GET, endpoint, None).unwrap();
        assert_eq!(request.url().query(), Some("slug=a%26b+%23c"));
        assert_eq!(request.url().path(), "/v1/collections/coll-modules/items");
    }
}
