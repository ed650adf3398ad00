//! End-to-end coverage of `DavHandler` dispatching real HTTP requests
//! against the reference `MemFs`, the way a host crate would exercise
//! it. Method-processor internals have their own unit tests closer to
//! the code; this file checks the wiring between them holds together.

use std::sync::Arc;

use bytes::Bytes;
use http::{Request, StatusCode};
use http_body_util::Full;

use dav_engine::memfs::MemFs;
use dav_engine::DavHandler;

fn handler(fs: MemFs) -> DavHandler {
    DavHandler::builder().service(Arc::new(fs)).build_handler()
}

fn req(method: &str, uri: &str, body: &'static [u8]) -> Request<Full<Bytes>> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::new(Bytes::from_static(body)))
        .unwrap()
}

#[tokio::test]
async fn put_then_get_roundtrips_body() {
    let dav = handler(MemFs::new());

    let resp = dav.handle(req("PUT", "/a.txt", b"hello world")).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = dav.handle(req("GET", "/a.txt", b"")).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn get_missing_resource_is_404() {
    let dav = handler(MemFs::new());
    let resp = dav.handle(req("GET", "/nope.txt", b"")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mkcol_then_propfind_lists_child() {
    let dav = handler(MemFs::new());

    let resp = dav.handle(req("MKCOL", "/dir/", b"")).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    dav.handle(req("PUT", "/dir/a.txt", b"x")).await;

    let resp = Request::builder()
        .method("PROPFIND")
        .uri("/dir/")
        .header("depth", "1")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let resp = dav.handle(resp).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
}

#[tokio::test]
async fn delete_removes_resource() {
    let dav = handler(MemFs::new());
    dav.handle(req("PUT", "/a.txt", b"x")).await;

    let resp = dav.handle(req("DELETE", "/a.txt", b"")).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = dav.handle(req("GET", "/a.txt", b"")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn copy_then_move_relocates_content() {
    let dav = handler(MemFs::new());
    dav.handle(req("PUT", "/a.txt", b"content")).await;

    let resp = Request::builder()
        .method("COPY")
        .uri("/a.txt")
        .header("destination", "/b.txt")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let resp = dav.handle(resp).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = Request::builder()
        .method("MOVE")
        .uri("/b.txt")
        .header("destination", "/c.txt")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let resp = dav.handle(resp).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // source of the MOVE is gone, both prior copies' final destination exists
    assert_eq!(dav.handle(req("GET", "/b.txt", b"")).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(dav.handle(req("GET", "/a.txt", b"")).await.status(), StatusCode::OK);
    assert_eq!(dav.handle(req("GET", "/c.txt", b"")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn copy_into_own_subtree_is_forbidden() {
    let dav = handler(MemFs::new());
    dav.handle(req("MKCOL", "/a/", b"")).await;

    let resp = Request::builder()
        .method("COPY")
        .uri("/a/")
        .header("destination", "/a/b/")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let resp = dav.handle(resp).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn lock_then_put_without_token_is_locked() {
    let dav = handler(MemFs::new());
    dav.handle(req("PUT", "/a.txt", b"x")).await;

    let lock_body = br#"<?xml version="1.0"?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:exclusive/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
  <D:owner><D:href>mailto:a@example.com</D:href></D:owner>
</D:lockinfo>"#;
    let resp = Request::builder().method("LOCK").uri("/a.txt").body(Full::new(Bytes::from_static(lock_body))).unwrap();
    let resp = dav.handle(resp).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = dav.handle(req("PUT", "/a.txt", b"y")).await;
    assert_eq!(resp.status(), StatusCode::LOCKED);
}

#[tokio::test]
async fn options_on_star_reports_allowed_methods() {
    let dav = handler(MemFs::new());
    let resp = dav.handle(req("OPTIONS", "*", b"")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get(http::header::ALLOW).is_some());
}
