//! Static file provider.
//!
//! # Responsibilities
//! - Serve files under a root directory for GET and HEAD
//! - Map directory requests to `index.html`
//! - Refuse paths that climb out of the root
//!
//! # Design Decisions
//! - Resolution is purely lexical; `..` segments never resolve
//! - Content type is picked from the file extension

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request};
use axum::response::Response;

use crate::http::request::RequestContext;
use crate::http::response;
use crate::routing::{Handler, HandlerFuture, HandlerProvider};

const INDEX_FILE: &str = "index.html";

/// Serves files from a directory.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: Arc<Path>,
}

impl StaticFiles {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: Arc::from(root.as_ref()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a request path onto the root, or `None` if it is not allowed.
    fn locate(&self, path: &str) -> Option<PathBuf> {
        let mut resolved = self.root.to_path_buf();
        for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if segment == ".." || segment.contains('\\') || segment.contains('\0') {
                return None;
            }
            resolved.push(segment);
        }
        Some(resolved)
    }
}

impl HandlerProvider for StaticFiles {
    fn resolve(&self, method: &Method, path: &str) -> Option<Arc<dyn Handler>> {
        if method != Method::GET && method != Method::HEAD {
            return None;
        }
        let file = self.locate(path)?;
        Some(Arc::new(StaticFile {
            path: file,
            head_only: method == Method::HEAD,
        }))
    }
}

/// One resolved file request.
struct StaticFile {
    path: PathBuf,
    head_only: bool,
}

impl Handler for StaticFile {
    fn call(&self, ctx: RequestContext, _request: Request<Body>) -> HandlerFuture {
        let mut path = self.path.clone();
        let head_only = self.head_only;

        Box::pin(async move {
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_dir() => path.push(INDEX_FILE),
                Ok(_) => {}
                Err(_) => {
                    tracing::debug!(request_id = %ctx.request_id, path = %path.display(), "Static file not found");
                    return Ok(response::not_found());
                }
            }

            let contents = match tokio::fs::read(&path).await {
                Ok(contents) => contents,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Ok(response::not_found());
                }
                Err(e) => return Err(e.into()),
            };

            let length = contents.len();
            let body = if head_only {
                Body::empty()
            } else {
                Body::from(contents)
            };

            let mut response = Response::new(body);
            let headers = response.headers_mut();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(content_type_for(&path)),
            );
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            Ok(response)
        })
    }
}

/// Content type for a file, by extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("wasm") => "application/wasm",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs").join("index.html"), "docs").unwrap();
        std::fs::write(dir.path().join("docs").join("notes.txt"), "plain notes").unwrap();
        dir
    }

    async fn fetch(files: &StaticFiles, method: Method, path: &str) -> Response {
        let handler = files.resolve(&method, path).expect("path should resolve");
        let request = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        handler.call(RequestContext::detached(), request).await.unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn serves_file_with_content_type() {
        let dir = site();
        let files = StaticFiles::new(dir.path());

        let response = fetch(&files, Method::GET, "/docs/notes.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_text(response).await, "plain notes");
    }

    #[tokio::test]
    async fn directories_serve_their_index() {
        let dir = site();
        let files = StaticFiles::new(dir.path());

        assert_eq!(body_text(fetch(&files, Method::GET, "/").await).await, "<h1>home</h1>");
        assert_eq!(body_text(fetch(&files, Method::GET, "/docs/").await).await, "docs");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = site();
        let files = StaticFiles::new(dir.path());

        let response = fetch(&files, Method::GET, "/nope.css").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn head_has_length_but_no_body() {
        let dir = site();
        let files = StaticFiles::new(dir.path());

        let response = fetch(&files, Method::HEAD, "/docs/notes.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "11");
        assert!(body_text(response).await.is_empty());
    }

    #[test]
    fn parent_segments_do_not_resolve() {
        let files = StaticFiles::new("/srv/site");
        assert!(files.resolve(&Method::GET, "/../etc/passwd").is_none());
        assert!(files.resolve(&Method::GET, "/docs/../../secret").is_none());
        assert!(files.resolve(&Method::GET, "/docs/./notes.txt").is_some());
    }

    #[test]
    fn only_get_and_head_resolve() {
        let files = StaticFiles::new("/srv/site");
        assert!(files.resolve(&Method::POST, "/index.html").is_none());
        assert!(files.resolve(&Method::DELETE, "/index.html").is_none());
    }

    #[test]
    fn unknown_extensions_are_octet_stream() {
        assert_eq!(content_type_for(Path::new("a.bin")), "application/octet-stream");
        assert_eq!(content_type_for(Path::new("A.HTML")), "text/html; charset=utf-8");
        assert_eq!(content_type_for(Path::new("Makefile")), "application/octet-stream");
    }
}
