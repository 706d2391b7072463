//! Request sanitization, error rendering, CORS and panic handling

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{
        header::{self, HeaderValue},
        uri::PathAndQuery,
        Method, StatusCode, Uri,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use catalog_common::sanitize::{escape_html, sanitize_value, OPERATOR_PREFIX};
use std::any::Any;
use std::borrow::Cow;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any as AnyOrigin, CorsLayer};
use tracing::{debug, error, warn};

use crate::handlers::{ApiError, ErrorDetail, SharedState};

/// Ceiling for JSON bodies buffered by the sanitizer
pub const MAX_JSON_BODY: usize = 1024 * 1024;

fn is_operator_query_key(key: &str) -> bool {
    key.starts_with(OPERATOR_PREFIX) || key.contains("[$")
}

fn decode_component(raw: &str) -> Option<Cow<'_, str>> {
    if raw.contains('+') {
        urlencoding::decode(&raw.replace('+', " "))
            .ok()
            .map(|s| Cow::Owned(s.into_owned()))
    } else {
        urlencoding::decode(raw).ok()
    }
}

/// Drop operator keys and escape values. `None` when nothing changed.
pub fn sanitize_query(query: &str) -> Option<String> {
    let mut changed = false;
    let mut pairs = Vec::new();

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let (Some(key), Some(value)) = (decode_component(raw_key), decode_component(raw_value))
        else {
            pairs.push(pair.to_string());
            continue;
        };

        if is_operator_query_key(&key) {
            debug!("Dropping query parameter {}", key);
            changed = true;
            continue;
        }

        let escaped = escape_html(&value);
        if escaped == value {
            pairs.push(pair.to_string());
        } else {
            changed = true;
            pairs.push(format!(
                "{}={}",
                urlencoding::encode(&key),
                urlencoding::encode(&escaped)
            ));
        }
    }

    changed.then(|| pairs.join("&"))
}

/// Escape every path segment. `None` when nothing changed.
pub fn sanitize_path(path: &str) -> Option<String> {
    let mut changed = false;

    let segments: Vec<Cow<'_, str>> = path
        .split('/')
        .map(|segment| {
            let Ok(decoded) = urlencoding::decode(segment) else {
                return Cow::Borrowed(segment);
            };
            let escaped = escape_html(&decoded);
            if escaped == decoded {
                Cow::Borrowed(segment)
            } else {
                changed = true;
                Cow::Owned(urlencoding::encode(&escaped).into_owned())
            }
        })
        .collect();

    changed.then(|| segments.join("/"))
}

fn sanitized_uri(uri: &Uri) -> Option<Uri> {
    let path = sanitize_path(uri.path());
    let query = uri.query().map(sanitize_query);

    if path.is_none() && !matches!(query, Some(Some(_))) {
        return None;
    }

    let path = path.unwrap_or_else(|| uri.path().to_string());
    let path_and_query = match query {
        Some(Some(q)) if q.is_empty() => path,
        Some(Some(q)) => format!("{}?{}", path, q),
        Some(None) => format!("{}?{}", path, uri.query().unwrap_or_default()),
        None => path,
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).ok()?);
    Uri::from_parts(parts).ok()
}

fn is_json(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

/// Sanitize path, query and JSON body, then tag the response with the
/// browser hardening headers
pub async fn sanitize_request(mut request: Request, next: Next) -> Response {
    if let Some(uri) = sanitized_uri(request.uri()) {
        *request.uri_mut() = uri;
    }

    if is_json(&request) {
        let (mut parts, body) = request.into_parts();
        let bytes = match to_bytes(body, MAX_JSON_BODY).await {
            Ok(bytes) => bytes,
            Err(_) => {
                return with_security_headers(
                    ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
                        .into_response(),
                )
            }
        };

        let body = match serde_json::from_slice(&bytes)
            .map(sanitize_value)
            .and_then(|v| serde_json::to_vec(&v))
        {
            Ok(clean) => {
                parts.headers.remove(header::CONTENT_LENGTH);
                Body::from(clean)
            }
            // Malformed JSON is left for the handler to reject
            Err(_) => Body::from(bytes),
        };
        request = Request::from_parts(parts, body);
    }

    with_security_headers(next.run(request).await)
}

fn with_security_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::X_XSS_PROTECTION,
        HeaderValue::from_static("1; mode=block"),
    );
    response
}

/// Render diagnostics of failed requests when the deployment allows it
pub async fn render_error_details(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let response = next.run(request).await;

    if !state.expose_error_details {
        return response;
    }

    match response.extensions().get::<ErrorDetail>().cloned() {
        Some(detail) => (
            response.status(),
            Json(serde_json::json!({
                "error": detail.message,
                "detail": detail.detail,
                "path": path,
            })),
        )
            .into_response(),
        None => response,
    }
}

/// CORS policy from the configured origins; `*` allows any origin
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(AnyOrigin)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", o);
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Panic handler that logs and answers with a generic 500
pub fn panic_layer() -> CatchPanicLayer<fn(Box<dyn Any + Send + 'static>) -> Response> {
    CatchPanicLayer::custom(handle_panic)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };

    error!(panic_message = %message, "Handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "Internal server error" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_operator_keys_are_dropped() {
        let clean = sanitize_query("category=tea&%24where=1&filter%5B%24gt%5D=3").unwrap();
        assert_eq!(clean, "category=tea");

        assert_eq!(sanitize_query("sort=-title&limit=5"), None);
    }

    #[test]
    fn test_query_values_are_escaped() {
        let clean = sanitize_query("q=%3Cscript%3E").unwrap();
        assert_eq!(clean, "q=%26lt%3Bscript%26gt%3B");

        // Already escaped input is stable
        assert_eq!(sanitize_query(&clean), None);
    }

    #[test]
    fn test_path_segments_are_escaped() {
        assert_eq!(sanitize_path("/api/products/abc-123"), None);

        let clean = sanitize_path("/api/products/slug/%3Cb%3E").unwrap();
        assert_eq!(clean, "/api/products/slug/%26lt%3Bb%26gt%3B");
        assert_eq!(sanitize_path(&clean), None);
    }

    #[test]
    fn test_sanitized_uri_keeps_clean_parts() {
        let uri: Uri = "/api/products?%24ne=1".parse().unwrap();
        assert_eq!(sanitized_uri(&uri).unwrap(), "/api/products");

        let uri: Uri = "/api/products?page=2".parse().unwrap();
        assert!(sanitized_uri(&uri).is_none());
    }

    #[tokio::test]
    async fn test_panic_handler_hides_message() {
        let response = handle_panic(Box::new("secret state".to_string()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "Internal server error");
        assert!(!body.to_string().contains("secret state"));
    }
}
