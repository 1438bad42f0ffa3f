//! Injects the live-reload client script into every HTML response.

use axum::body::Body;
use axum::extract::Request;
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use futures_util::StreamExt as _;

use super::gate::is_sse_path;

pub const LIVE_RELOAD_SCRIPT: &str = r#"
<script>
(function () {
  var source = new EventSource('/__reload__');
  source.addEventListener('open', function () { console.log('[hotsite] live reload connected'); });
  source.addEventListener('error', function () { console.log('[hotsite] live reload connection lost, retrying'); });
  source.onmessage = function (event) {
    try {
      var payload = JSON.parse(event.data);
      if (payload.action === 'reload') {
        location.reload();
      } else if (payload.action === 'css-only') {
        document.querySelectorAll('link[rel="stylesheet"]').forEach(function (link) {
          var url = new URL(link.href);
          url.searchParams.set('_hotsite', Date.now().toString());
          link.href = url.toString();
        });
      }
    } catch (err) {
      console.log('[hotsite] ignoring malformed reload payload', err);
    }
  };
})();
</script>
"#;

pub async fn html_injection(req: Request, next: Next) -> Response {
    if is_sse_path(req.uri().path()) {
        return next.run(req).await;
    }

    let response = next.run(req).await;

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));

    if response.status() != axum::http::StatusCode::OK || !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();

    let Ok(bytes) = collect_body(body).await else {
        parts.status = axum::http::StatusCode::INTERNAL_SERVER_ERROR;
        return Response::from_parts(parts, Body::empty());
    };

    let injected = inject_script(&bytes, LIVE_RELOAD_SCRIPT);

    parts
        .headers
        .insert(header::CONTENT_LENGTH, injected.len().into());
    parts.headers.insert(
        header::CACHE_CONTROL,
        "no-store, no-cache, must-revalidate, max-age=0".parse().unwrap(),
    );

    Response::from_parts(parts, Body::from(injected))
}

async fn collect_body(body: Body) -> Result<Vec<u8>, axum::Error> {
    let mut stream = body.into_data_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf)
}

/// Inserts `script` immediately before the last case-insensitive
/// `</body>`, falling back to the last `</html>`, falling back to a
/// plain append if neither tag is present.
pub fn inject_script(html: &[u8], script: &str) -> Vec<u8> {
    if let Some(offset) = last_case_insensitive(html, b"</body>") {
        return splice(html, offset, script);
    }
    if let Some(offset) = last_case_insensitive(html, b"</html>") {
        return splice(html, offset, script);
    }
    let mut out = html.to_vec();
    out.extend_from_slice(script.as_bytes());
    out
}

fn splice(html: &[u8], offset: usize, script: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(html.len() + script.len());
    out.extend_from_slice(&html[..offset]);
    out.extend_from_slice(script.as_bytes());
    out.extend_from_slice(&html[offset..]);
    out
}

fn last_case_insensitive(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| haystack[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injects_before_last_closing_body() {
        let html = b"<html><body><p>hi</p></body></html>";
        let out = inject_script(html, "<!--x-->");
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "<html><body><p>hi</p><!--x--></body></html>");
    }

    #[test]
    fn falls_back_to_closing_html_tag() {
        let html = b"<html><p>hi</p></html>";
        let out = inject_script(html, "<!--x-->");
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "<html><p>hi</p><!--x--></html>");
    }

    #[test]
    fn falls_back_to_append_when_no_closing_tags() {
        let html = b"<p>fragment</p>";
        let out = inject_script(html, "<!--x-->");
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "<p>fragment</p><!--x-->");
    }

    #[test]
    fn matches_last_occurrence_case_insensitively() {
        let html = b"<BODY>one</body>two</BoDy>";
        let offset = last_case_insensitive(html, b"</body>").unwrap();
        assert_eq!(&html[offset..offset + 7].to_ascii_lowercase(), b"</body>");
        assert_eq!(offset, html.len() - 7);
    }
}
