use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer};

/// Any origin, the verbs the API routes use, and the two request headers
/// browsers need for JSON plus bearer auth.
pub fn api_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(Any)
}
