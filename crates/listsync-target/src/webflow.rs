//! Webflow Data API v2 collection client.

use async_trait::async_trait;
use reqwest::{header, Client, Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};

use listsync_feed::{FieldValue, Listing};

use crate::client::{slugify, TargetClient, TargetItem, TargetItemId};
use crate::config::WebflowConfig;
use crate::error::{TargetError, TargetResult};
use crate::rate_limit::{parse_retry_after, RateLimiter};

/// Field carrying the item's URL slug.
const SLUG_FIELD: &str = "slug";

/// Client for one Webflow CMS collection.
///
/// Every request passes through the rate limiter, and throttled or
/// temporarily unavailable responses are retried with backoff before an
/// error is surfaced.
#[derive(Debug)]
pub struct WebflowClient {
    config: WebflowConfig,
    http: Client,
    rate_limiter: RateLimiter,
}

#[derive(Debug, Deserialize)]
struct CreatedItem {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ItemPage {
    #[serde(default)]
    items: Vec<PageItem>,
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct PageItem {
    id: String,
    #[serde(rename = "fieldData", default)]
    field_data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    total: u64,
}

impl WebflowClient {
    /// Create a client from validated configuration.
    pub fn new(config: WebflowConfig) -> TargetResult<Self> {
        config.validate()?;

        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| TargetError::configuration(format!("failed to build HTTP client: {e}")))?;
        let rate_limiter = RateLimiter::new(config.rate_limit.clone());

        Ok(Self {
            config,
            http,
            rate_limiter,
        })
    }

    #[must_use]
    pub fn config(&self) -> &WebflowConfig {
        &self.config
    }

    fn items_url(&self) -> String {
        format!(
            "{}/collections/{}/items",
            self.config.api_base, self.config.collection_id
        )
    }

    fn live_item_url(&self, id: &TargetItemId) -> String {
        format!("{}/{}/live", self.items_url(), id)
    }

    /// Build the `fieldData` object for a listing.
    ///
    /// With `clear_missing`, mapped attributes the listing lacks are sent as
    /// `null` so an update removes values that left the feed.
    pub fn field_data(&self, listing: &Listing, clear_missing: bool) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert(
            SLUG_FIELD.to_string(),
            Value::String(slugify(listing.source_id())),
        );

        for (attribute, field) in self.config.field_mapping.iter() {
            let value = match listing.get(attribute) {
                Some(FieldValue::Text(text)) => Value::String(text.clone()),
                Some(FieldValue::Image(url)) => json!({ "fileId": null, "url": url }),
                Some(FieldValue::Flag(flag)) => Value::Bool(*flag),
                None if clear_missing => Value::Null,
                None => continue,
            };
            data.insert(field.to_string(), value);
        }

        data
    }

    /// Send a request, retrying throttled and unavailable responses.
    async fn send_with_retry(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> TargetResult<Response> {
        let retry_config = &self.config.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let guard = self.rate_limiter.acquire().await.map_err(|e| {
                TargetError::connection_with_source("rate limiter unavailable", e)
            })?;

            let mut request = self
                .http
                .request(method.clone(), url)
                .bearer_auth(&self.config.token)
                .header(header::ACCEPT, "application/json");
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(json_body) = body {
                request = request.json(json_body);
            }

            debug!(url = %url, method = %method, attempt = attempt, "Sending Webflow request");

            let result = request.send().await;
            drop(guard);

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    debug!(url = %url, status = %status, attempt = attempt, "Received Webflow response");

                    if !retry_config.is_retryable(status.as_u16()) {
                        return Ok(resp);
                    }

                    let retry_after = resp
                        .headers()
                        .get(header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_retry_after);

                    if attempt > retry_config.max_retries {
                        if status == StatusCode::TOO_MANY_REQUESTS {
                            return Err(TargetError::RateLimited {
                                retry_after_secs: retry_after.map(|d| d.as_secs()),
                            });
                        }
                        return Ok(resp);
                    }

                    let wait = retry_config.wait_for(attempt, retry_after);
                    warn!(
                        url = %url,
                        status = %status,
                        attempt = attempt,
                        wait_ms = wait.as_millis(),
                        "Retryable response from Webflow, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect() || e.is_request();
                    if retryable && attempt <= retry_config.max_retries {
                        let wait = retry_config.delay_for(attempt);
                        warn!(
                            url = %url,
                            attempt = attempt,
                            wait_ms = wait.as_millis(),
                            error = %e,
                            "Webflow request failed, waiting before retry"
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    if e.is_timeout() {
                        return Err(TargetError::timeout(format!(
                            "{method} {url} exceeded {}s",
                            self.config.timeout_secs
                        )));
                    }
                    return Err(TargetError::connection_with_source(
                        format!("{method} {url}"),
                        e,
                    ));
                }
            }
        }
    }

    /// Turn a non-success response into an error.
    async fn check_status(resp: Response, item: Option<&TargetItemId>) -> TargetResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::NOT_FOUND {
            let id = item.map_or_else(|| resp.url().path().to_string(), ToString::to_string);
            return Err(TargetError::not_found(id));
        }

        let message = resp
            .text()
            .await
            .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
        Err(TargetError::api(status.as_u16(), message))
    }

    fn item_body(&self, listing: &Listing, clear_missing: bool) -> Value {
        json!({
            "isArchived": false,
            "isDraft": false,
            "fieldData": self.field_data(listing, clear_missing),
        })
    }
}

#[async_trait]
impl TargetClient for WebflowClient {
    #[instrument(skip(self, listing), fields(source_id = %listing.source_id()))]
    async fn create(&self, listing: &Listing) -> TargetResult<TargetItemId> {
        let url = format!("{}/live", self.items_url());
        let body = self.item_body(listing, false);

        let resp = self.send_with_retry(Method::POST, &url, &[], Some(&body)).await?;
        let resp = Self::check_status(resp, None).await?;

        let created: CreatedItem = resp
            .json()
            .await
            .map_err(|e| TargetError::invalid_response(format!("create response: {e}")))?;

        info!(item_id = %created.id, "Created Webflow item");
        Ok(TargetItemId::new(created.id))
    }

    #[instrument(skip(self, listing), fields(source_id = %listing.source_id(), item_id = %id))]
    async fn update(&self, id: &TargetItemId, listing: &Listing) -> TargetResult<()> {
        let url = self.live_item_url(id);
        let body = self.item_body(listing, true);

        let resp = self.send_with_retry(Method::PATCH, &url, &[], Some(&body)).await?;
        Self::check_status(resp, Some(id)).await?;

        info!("Updated Webflow item");
        Ok(())
    }

    #[instrument(skip(self), fields(item_id = %id))]
    async fn delete(&self, id: &TargetItemId) -> TargetResult<()> {
        let url = self.live_item_url(id);

        let resp = self.send_with_retry(Method::DELETE, &url, &[], None).await?;
        Self::check_status(resp, Some(id)).await?;

        info!("Deleted Webflow item");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_existing(&self) -> TargetResult<Vec<TargetItem>> {
        let url = self.items_url();
        let page_size = u64::from(self.config.page_size);
        let mut items = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let query = [
                ("limit", page_size.to_string()),
                ("offset", offset.to_string()),
            ];
            let resp = self.send_with_retry(Method::GET, &url, &query, None).await?;
            let resp = Self::check_status(resp, None).await?;

            let page: ItemPage = resp
                .json()
                .await
                .map_err(|e| TargetError::invalid_response(format!("list response: {e}")))?;

            let fetched = page.items.len() as u64;
            items.extend(page.items.into_iter().map(|item| TargetItem {
                slug: item
                    .field_data
                    .get(SLUG_FIELD)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                id: TargetItemId::new(item.id),
            }));
            offset += fetched;

            let total = page.pagination.map(|p| p.total);
            debug!(fetched, offset, total, "Fetched Webflow item page");

            if fetched < page_size || total.is_some_and(|total| offset >= total) {
                break;
            }
        }

        Ok(items)
    }
}
