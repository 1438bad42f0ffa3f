//! Assembles the dev server's axum application: build gate, HTML
//! injection, static file serving, and the SSE reload endpoint.

pub mod gate;
pub mod inject;
pub mod sse;

use std::path::Path;
use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::devstate::DevState;

pub fn build_app(output_dir: &Path, dev_state: Arc<DevState>) -> Router {
    let no_cache = SetResponseHeaderLayer::overriding(
        axum::http::header::CACHE_CONTROL,
        axum::http::HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
    );

    let not_found = output_dir.join("404.html");

    let router = Router::new().route("/__reload__", get(sse::reload_stream));
    let router = if not_found.is_file() {
        router.fallback_service(ServeDir::new(output_dir).not_found_service(ServeFile::new(not_found)))
    } else {
        router.fallback_service(ServeDir::new(output_dir))
    };

    router
        .layer(no_cache)
        .layer(middleware::from_fn(inject::html_injection))
        .layer(middleware::from_fn_with_state(dev_state.clone(), gate::build_gate))
        .with_state(dev_state)
}
