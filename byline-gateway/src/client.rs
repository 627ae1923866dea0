//! `reqwest`-backed implementation of [`ContentGateway`].

use async_trait::async_trait;
use byline_core::{
    BookmarkOutcome, Category, EntityId, FieldViolation, GatewayError, GenerationStats,
    LikeOutcome, Post, PostDraft, PostFilter, SearchResponse, Tag,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::ContentGateway;

/// HTTP client for the Byline backend. Cheap to clone; clones share the
/// underlying connection pool.
#[derive(Clone)]
pub struct RestGateway {
    client: reqwest::Client,
    base_url: String,
    auth_header: HeaderMap,
}

impl RestGateway {
    /// Build the client once from config. Fails only when the TLS stack
    /// cannot be initialized.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Network {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_header: build_auth_headers(config.auth_token.as_deref()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T, Q>(&self, path: &str, query: Option<&Q>) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let mut request = self
            .client
            .get(self.url(path))
            .headers(self.auth_header.clone());
        if let Some(query) = query {
            request = request.query(query);
        }
        let response = request.send().await.map_err(into_network)?;
        parse_response(path, response).await
    }

    async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .client
            .post(self.url(path))
            .headers(self.auth_header.clone())
            .json(body)
            .send()
            .await
            .map_err(into_network)?;
        parse_response(path, response).await
    }

    async fn put_json<T, B>(&self, path: &str, body: &B) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .client
            .put(self.url(path))
            .headers(self.auth_header.clone())
            .json(body)
            .send()
            .await
            .map_err(into_network)?;
        parse_response(path, response).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let response = self
            .client
            .post(self.url(path))
            .headers(self.auth_header.clone())
            .send()
            .await
            .map_err(into_network)?;
        parse_response(path, response).await
    }

    async fn delete(&self, path: &str) -> Result<(), GatewayError> {
        let response = self
            .client
            .delete(self.url(path))
            .headers(self.auth_header.clone())
            .send()
            .await
            .map_err(into_network)?;
        let status = response.status();
        debug!(path, status = status.as_u16(), "response received");
        if status.is_success() {
            // Deletes answer 204 No Content.
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(classify_failure(path, status.as_u16(), &body))
        }
    }
}

#[async_trait]
impl ContentGateway for RestGateway {
    async fn list_posts(&self, filter: &PostFilter) -> Result<Vec<Post>, GatewayError> {
        let pairs = filter.query_pairs();
        if pairs.is_empty() {
            self.get_json::<Vec<Post>, ()>("/api/blogs/", None).await
        } else {
            self.get_json("/api/blogs/", Some(&pairs)).await
        }
    }

    async fn get_post(&self, slug: &str) -> Result<Post, GatewayError> {
        let path = format!("/api/blogs/{slug}/");
        self.get_json::<Post, ()>(&path, None).await
    }

    async fn create_post(&self, draft: &PostDraft) -> Result<Post, GatewayError> {
        self.post_json("/api/blogs/", draft).await
    }

    async fn update_post(&self, slug: &str, draft: &PostDraft) -> Result<Post, GatewayError> {
        let path = format!("/api/blogs/{slug}/");
        self.put_json(&path, draft).await
    }

    async fn delete_post(&self, slug: &str) -> Result<(), GatewayError> {
        let path = format!("/api/blogs/{slug}/");
        self.delete(&path).await
    }

    async fn list_my_posts(&self) -> Result<Vec<Post>, GatewayError> {
        self.get_json::<Vec<Post>, ()>("/api/blogs/my-blogs/", None)
            .await
    }

    async fn list_bookmarked_posts(&self) -> Result<Vec<Post>, GatewayError> {
        self.get_json::<Vec<Post>, ()>("/api/blogs/bookmarked/", None)
            .await
    }

    async fn toggle_like(&self, post_id: EntityId) -> Result<LikeOutcome, GatewayError> {
        let path = format!("/api/blogs/{post_id}/like/");
        self.post_empty(&path).await
    }

    async fn toggle_bookmark(&self, post_id: EntityId) -> Result<BookmarkOutcome, GatewayError> {
        let path = format!("/api/blogs/{post_id}/bookmark/");
        self.post_empty(&path).await
    }

    async fn list_categories(&self) -> Result<Vec<Category>, GatewayError> {
        self.get_json::<Vec<Category>, ()>("/api/blogs/categories/", None)
            .await
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, GatewayError> {
        self.get_json::<Vec<Tag>, ()>("/api/blogs/tags/", None).await
    }

    async fn generation_stats(&self) -> Result<GenerationStats, GatewayError> {
        self.get_json::<GenerationStats, ()>("/api/ai/stats/", None)
            .await
    }

    async fn search_knowledge_base(
        &self,
        query: &str,
        k: u32,
    ) -> Result<SearchResponse, GatewayError> {
        let body = SearchBody { query, k };
        let envelope: SearchEnvelope = self.post_json("/search", &body).await?;
        if !envelope.success {
            return Err(GatewayError::Decode {
                message: "search response flagged unsuccessful".to_string(),
            });
        }
        Ok(envelope.data)
    }
}

#[derive(Serialize)]
struct SearchBody<'a> {
    query: &'a str,
    k: u32,
}

/// The retrieval service wraps its payload in a status envelope; the
/// `timestamp` it also carries is ignored.
#[derive(Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    success: bool,
    data: SearchResponse,
}

fn build_auth_headers(token: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(token) = token {
        let value = format!("Bearer {token}");
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("")),
        );
    }
    headers
}

fn into_network(e: reqwest::Error) -> GatewayError {
    warn!(error = %e, "transport failure");
    GatewayError::Network {
        message: e.to_string(),
    }
}

async fn parse_response<T: DeserializeOwned>(
    path: &str,
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    let status = response.status().as_u16();
    let bytes = response.bytes().await.map_err(into_network)?;
    interpret_response(path, status, &bytes)
}

/// Turn a completed exchange into the caller's type: 2xx bodies are
/// decoded, anything else is classified into the error taxonomy.
fn interpret_response<T: DeserializeOwned>(
    path: &str,
    status: u16,
    body: &[u8],
) -> Result<T, GatewayError> {
    debug!(path, status, "response received");
    if (200..300).contains(&status) {
        serde_json::from_slice(body).map_err(|e| GatewayError::Decode {
            message: e.to_string(),
        })
    } else {
        Err(classify_failure(path, status, &String::from_utf8_lossy(body)))
    }
}

/// Map a failure status plus whatever the server put in the body onto
/// the error taxonomy.
///
/// Pure and total over arbitrary body bytes, so downstream tests can
/// simulate backend refusals without an HTTP round trip.
pub fn classify_failure(path: &str, status: u16, body: &str) -> GatewayError {
    match status {
        401 | 403 => GatewayError::Auth {
            status,
            message: failure_message(status, body),
        },
        404 => GatewayError::NotFound {
            resource: path.trim_matches('/').to_string(),
        },
        400 | 422 => {
            let (message, fields) = parse_validation_body(status, body);
            GatewayError::Validation { message, fields }
        }
        _ => GatewayError::Server {
            status,
            message: failure_message(status, body),
        },
    }
}

/// Best human-readable message in a failure body: a JSON `detail`
/// string, the raw body, or the status reason.
fn failure_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(detail) = value.get("detail").and_then(Value::as_str) {
            return detail.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("request failed")
            .to_string()
    } else {
        trimmed.to_string()
    }
}

/// Pull per-field violations out of a 400/422 body.
///
/// Two producer dialects are handled: maps of field name to message
/// list (`{"title": ["This field may not be blank."]}`) and `detail`
/// arrays of `{loc, msg}` objects. Anything else degrades to a plain
/// message with no field detail.
fn parse_validation_body(status: u16, body: &str) -> (String, Vec<FieldViolation>) {
    let Ok(Value::Object(map)) = serde_json::from_str(body) else {
        return (failure_message(status, body), Vec::new());
    };

    let mut fields = Vec::new();
    let mut general = Vec::new();
    for (name, value) in &map {
        match value {
            Value::String(message) => {
                push_violation(&mut fields, &mut general, name, message.clone());
            }
            Value::Array(items) => {
                for item in items {
                    if let Some(message) = item.as_str() {
                        push_violation(&mut fields, &mut general, name, message.to_string());
                    } else if let Some(violation) = violation_from_object(item) {
                        fields.push(violation);
                    }
                }
            }
            _ => {}
        }
    }

    let message = if general.is_empty() {
        "validation failed".to_string()
    } else {
        general.join("; ")
    };
    (message, fields)
}

fn push_violation(
    fields: &mut Vec<FieldViolation>,
    general: &mut Vec<String>,
    name: &str,
    message: String,
) {
    if name == "detail" || name == "non_field_errors" {
        general.push(message);
    } else {
        fields.push(FieldViolation {
            field: name.to_string(),
            message,
        });
    }
}

/// `{"loc": ["body", "k"], "msg": "..."}` items inside a `detail` array.
fn violation_from_object(item: &Value) -> Option<FieldViolation> {
    let message = item.get("msg")?.as_str()?.to_string();
    let field = item
        .get("loc")
        .and_then(Value::as_array)
        .and_then(|loc| loc.last())
        .and_then(Value::as_str)
        .unwrap_or("body")
        .to_string();
    Some(FieldViolation { field, message })
}
