//! Refuses to serve possibly-partial output while a build is running.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::devstate::DevState;

const ASSET_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "map", "png", "jpg", "jpeg", "gif", "svg", "ico", "woff", "woff2", "ttf",
    "eot", "webp", "avif", "json", "xml", "txt",
];

const REBUILDING_PAGE: &str = r#"<!doctype html>
<html><head><meta charset="utf-8"><title>Rebuilding&hellip;</title></head>
<body style="font-family: system-ui, sans-serif; padding: 3rem; color: #444;">
<h1>Rebuilding&hellip;</h1>
<p>The site is regenerating. This page will refresh automatically.</p>
<script>
  const source = new EventSource('/__reload__');
  source.addEventListener('reload', () => location.reload());
  source.addEventListener('css-only', () => location.reload());
</script>
</body></html>"#;

pub fn is_sse_path(path: &str) -> bool {
    path == "/__reload__"
}

fn is_asset_path(path: &str) -> bool {
    path.starts_with("/assets/")
        || path.starts_with("/static/")
        || std::path::Path::new(path)
            .extension()
            .is_some_and(|ext| ASSET_EXTENSIONS.contains(&ext.to_string_lossy().as_ref()))
}

pub async fn build_gate(State(dev_state): State<Arc<DevState>>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();

    if is_sse_path(&path) || is_asset_path(&path) {
        return next.run(req).await;
    }

    if req.method() == axum::http::Method::GET && dev_state.is_build_in_progress() {
        return (
            StatusCode::OK,
            [(header::CACHE_CONTROL, "no-store")],
            axum::response::Html(REBUILDING_PAGE),
        )
            .into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_paths_are_recognized_by_prefix_and_extension() {
        assert!(is_asset_path("/assets/app.js"));
        assert!(is_asset_path("/static/logo.png"));
        assert!(is_asset_path("/style.css"));
        assert!(!is_asset_path("/about/index.html"));
    }

    #[test]
    fn sse_path_is_exact() {
        assert!(is_sse_path("/__reload__"));
        assert!(!is_sse_path("/__reload__/x"));
    }
}
