//! Local HTTP fixtures for download tests.

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral port and return its base URL.
pub(crate) async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A router serving `body` at `path`.
pub(crate) fn static_file(path: &str, body: Vec<u8>) -> Router {
    Router::new().route(path, get(move || async move { body }))
}

/// Write an executable shell script into `dir`.
#[cfg(unix)]
pub(crate) fn script(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
