//! Static file server for the browser front end.
//!
//! Pages that load the detection module as WebAssembly with shared memory
//! need cross-origin isolation, so every file is served with COOP/COEP
//! headers.

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8000;

const CROSS_ORIGIN_OPENER_POLICY: HeaderName = HeaderName::from_static("cross-origin-opener-policy");
const CROSS_ORIGIN_EMBEDDER_POLICY: HeaderName =
    HeaderName::from_static("cross-origin-embedder-policy");

struct ServerState {
    root: PathBuf,
}

/// Content type for a request path, by suffix
pub fn content_type_for(path: &str) -> Option<&'static str> {
    if path.ends_with(".html") {
        Some("text/html")
    } else if path.ends_with(".js") {
        Some("text/javascript")
    } else if path.ends_with(".wasm") {
        Some("application/wasm")
    } else {
        None
    }
}

/// Map a request path onto a file under `root`
///
/// `/` maps to `/index.html`. Returns `None` for paths that would leave
/// the root.
pub fn resolve_path(root: &Path, request_path: &str) -> Option<PathBuf> {
    let request_path = if request_path == "/" {
        "/index.html"
    } else {
        request_path
    };

    let mut resolved = root.to_path_buf();
    for component in Path::new(request_path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

pub fn router(root: PathBuf) -> Router {
    Router::new()
        .fallback(serve_file)
        .with_state(Arc::new(ServerState { root }))
}

async fn serve_file(State(state): State<Arc<ServerState>>, uri: Uri) -> Response {
    let request_path = uri.path();
    let Some(file_path) = resolve_path(&state.root, request_path) else {
        tracing::warn!("Rejected path outside root: {}", request_path);
        return StatusCode::FORBIDDEN.into_response();
    };

    tracing::debug!("target: {}", file_path.display());

    let contents = match tokio::fs::read(&file_path).await {
        Ok(contents) => contents,
        Err(e) => {
            tracing::error!("Failed to read {}: {}", file_path.display(), e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response = (StatusCode::OK, contents).into_response();
    let headers = response.headers_mut();
    match content_type_for(&file_path.to_string_lossy()) {
        Some(content_type) => {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        None => {
            headers.remove(header::CONTENT_TYPE);
        }
    }
    headers.insert(CROSS_ORIGIN_OPENER_POLICY, HeaderValue::from_static("same-origin"));
    headers.insert(CROSS_ORIGIN_EMBEDDER_POLICY, HeaderValue::from_static("require-corp"));
    response
}

/// Serve `root` until the process is stopped
pub async fn run(root: PathBuf, host: &str, port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;

    tracing::info!(
        "Server is running on http://{}:{} serving {}",
        host,
        port,
        root.display()
    );

    axum::serve(listener, router(root))
        .await
        .context("Server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn state_with_files(files: &[(&str, &str)]) -> (TempDir, Arc<ServerState>) {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            std::fs::write(dir.path().join(name), contents).unwrap();
        }
        let state = Arc::new(ServerState {
            root: dir.path().to_path_buf(),
        });
        (dir, state)
    }

    async fn get(state: &Arc<ServerState>, path: &str) -> Response {
        serve_file(State(Arc::clone(state)), path.parse().unwrap()).await
    }

    #[rstest]
    #[case("/index.html", Some("text/html"))]
    #[case("/main.js", Some("text/javascript"))]
    #[case("/wasm/simd/module.wasm", Some("application/wasm"))]
    #[case("/style.css", None)]
    fn test_content_type_table(#[case] path: &str, #[case] expected: Option<&str>) {
        assert_eq!(content_type_for(path), expected);
    }

    #[test]
    fn test_resolve_rejects_parent_components() {
        let root = Path::new("/srv/app");
        assert_eq!(resolve_path(root, "/../etc/passwd"), None);
        assert_eq!(
            resolve_path(root, "/wasm/./module.wasm"),
            Some(PathBuf::from("/srv/app/wasm/module.wasm"))
        );
        assert_eq!(
            resolve_path(root, "/"),
            Some(PathBuf::from("/srv/app/index.html"))
        );
    }

    #[tokio::test]
    async fn test_root_serves_index_with_isolation_headers() {
        let (_dir, state) = state_with_files(&[("index.html", "<html></html>")]);
        let response = get(&state, "/").await;

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/html");
        assert_eq!(headers["cross-origin-opener-policy"], "same-origin");
        assert_eq!(headers["cross-origin-embedder-policy"], "require-corp");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"<html></html>");
    }

    #[tokio::test]
    async fn test_unknown_suffix_has_no_content_type() {
        let (_dir, state) = state_with_files(&[("notes.txt", "hi")]);
        let response = get(&state, "/notes.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_server_error() {
        let (_dir, state) = state_with_files(&[]);
        let response = get(&state, "/missing.js").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_traversal_is_forbidden() {
        let (_dir, state) = state_with_files(&[]);
        let response = get(&state, "/../secret").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
