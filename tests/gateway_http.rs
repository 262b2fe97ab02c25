use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, Bytes, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, Rgba};
use image_gateway::{
    handlers::gateway_handlers::AppState,
    models::object::{ObjectUpload, StoredObject},
    routes::routes,
    runtime::drain::DrainController,
    services::{
        gateway_service::{DEFAULT_CACHE_CONTROL, GatewayService},
        image_transformer::ImageTransformer,
        memory_store::MemoryStore,
        object_store::{ObjectStore, StoreResult},
    },
};
use std::{io::Cursor, sync::Arc};
use tokio::sync::Notify;
use tower::ServiceExt as _;

fn encode(image: DynamicImage, format: ImageFormat) -> Bytes {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).unwrap();
    Bytes::from(out.into_inner())
}

fn jpeg(width: u32, height: u32) -> Bytes {
    encode(
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([90u8, 60, 30]))),
        ImageFormat::Jpeg,
    )
}

fn png(width: u32, height: u32) -> Bytes {
    encode(
        DynamicImage::ImageRgba8(ImageBuffer::from_pixel(width, height, Rgba([0u8, 0, 255, 128]))),
        ImageFormat::Png,
    )
}

const LOGO_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="80"><circle cx="20" cy="40" r="18" fill="green"/></svg>"#;

fn app_with(store: Arc<dyn ObjectStore>, drain: DrainController) -> Router {
    let gateway = GatewayService::new(store, ImageTransformer::new(), DEFAULT_CACHE_CONTROL);
    routes::routes().with_state(AppState::new(gateway, drain))
}

fn app(store: &MemoryStore) -> Router {
    app_with(Arc::new(store.clone()), DrainController::new())
}

async fn seeded() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .insert("photos/a.jpg", jpeg(800, 400), Some("image/jpeg"), None)
        .await;
    store
        .insert("icons/logo.svg", LOGO_SVG, Some("image/svg+xml"), Some("public, max-age=60"))
        .await;
    store
        .insert("icons/dot.png", png(50, 100), Some("image/png"), None)
        .await;
    store
        .insert("docs/readme.txt", "hello", Some("text/plain"), None)
        .await;
    store
}

async fn get(app: &Router, uri: &str) -> Response {
    request(app, Method::GET, uri).await
}

async fn request(app: &Router, method: Method, uri: &str) -> Response {
    app.clone()
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body(response: Response) -> Bytes {
    to_bytes(response.into_body(), usize::MAX).await.unwrap()
}

fn header_str<'a>(response: &'a Response, name: header::HeaderName) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn serves_original_with_default_cache_control() {
    let store = seeded().await;
    let response = get(&app(&store), "/photos/a.jpg").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, header::CONTENT_TYPE), Some("image/jpeg"));
    assert_eq!(
        header_str(&response, header::CACHE_CONTROL),
        Some("public, max-age=86400")
    );
    assert!(header_str(&response, header::ETAG).is_some());
    let expected = store.bytes("photos/a.jpg").await.unwrap();
    assert_eq!(
        header_str(&response, header::CONTENT_LENGTH),
        Some(expected.len().to_string().as_str())
    );
    assert_eq!(body(response).await, expected);
}

#[tokio::test]
async fn generates_variant_and_persists_it() {
    let store = seeded().await;
    let app = app(&store);

    let response = get(&app, "/photos/a.jpg/width/200").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, header::CONTENT_TYPE), Some("image/jpeg"));
    assert_eq!(
        header_str(&response, header::CACHE_CONTROL),
        Some("public, max-age=86400")
    );
    assert!(header_str(&response, header::ETAG).is_none());
    let generated = body(response).await;

    let decoded = image::load_from_memory(&generated).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (200, 100));
    assert_eq!(store.bytes("photos/a.jpg/width/200").await.unwrap(), generated);

    let second = get(&app, "/photos/a.jpg/width/200").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert!(header_str(&second, header::ETAG).is_some());
    assert_eq!(body(second).await, generated);
    assert_eq!(store.writes(), 1);
}

#[tokio::test]
async fn svg_variants_are_png() {
    let store = seeded().await;
    let response = get(&app(&store), "/icons/logo.svg/height/160").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, header::CONTENT_TYPE), Some("image/png"));
    assert_eq!(header_str(&response, header::CACHE_CONTROL), Some("public, max-age=60"));
    let decoded = image::load_from_memory_with_format(&body(response).await, ImageFormat::Png)
        .unwrap();
    assert_eq!((decoded.width(), decoded.height()), (80, 160));
    assert_eq!(
        store.content_type("icons/logo.svg/height/160").await.as_deref(),
        Some("image/png")
    );
}

#[tokio::test]
async fn raster_variants_keep_their_content_type() {
    let store = seeded().await;
    let response = get(&app(&store), "/icons/dot.png/height/10").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, header::CONTENT_TYPE), Some("image/png"));
    let decoded = image::load_from_memory(&body(response).await).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (5, 10));
}

#[tokio::test]
async fn size_bounds_are_inclusive() {
    let store = seeded().await;
    let app = app(&store);

    assert_eq!(get(&app, "/icons/dot.png/width/1").await.status(), StatusCode::OK);
    assert_eq!(get(&app, "/icons/dot.png/width/0").await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(get(&app, "/icons/dot.png/width/7681").await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.writes(), 1);
}

#[tokio::test]
async fn largest_size_is_accepted() {
    let store = MemoryStore::new();
    store.insert("t.png", png(100, 1), Some("image/png"), None).await;
    let response = get(&app(&store), "/t.png/width/7680").await;

    assert_eq!(response.status(), StatusCode::OK);
    let decoded = image::load_from_memory(&body(response).await).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (7680, 77));
}

#[tokio::test]
async fn oversized_output_is_a_server_error() {
    let store = MemoryStore::new();
    store.insert("sliver.png", png(1, 400), Some("image/png"), None).await;
    let app = app(&store);

    let response = get(&app, "/sliver.png/width/7680").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body(response).await.is_empty());
    assert!(!store.contains("sliver.png/width/7680").await);

    // the worker keeps serving
    assert_eq!(get(&app, "/sliver.png/height/10").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn error_responses_have_no_body() {
    let store = seeded().await;
    let app = app(&store);

    let cases = [
        ("/", StatusCode::BAD_REQUEST),
        ("/photos/missing.jpg/height/100", StatusCode::NOT_FOUND),
        ("/photos/a.jpg/depth/100", StatusCode::NOT_FOUND),
        ("/photos/a.jpg/width/99999", StatusCode::BAD_REQUEST),
        ("/photos/a.jpg/width/abc", StatusCode::BAD_REQUEST),
        ("/nothing-here", StatusCode::NOT_FOUND),
        ("/docs/readme.txt/width/100", StatusCode::BAD_REQUEST),
    ];
    for (uri, status) in cases {
        let response = get(&app, uri).await;
        assert_eq!(response.status(), status, "{uri}");
        assert!(body(response).await.is_empty(), "{uri}");
    }
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn query_string_is_not_part_of_the_key() {
    let store = seeded().await;
    let response = get(&app(&store), "/photos/a.jpg?v=2").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn route_is_method_agnostic() {
    let store = seeded().await;
    let app = app(&store);

    let response = request(&app, Method::POST, "/docs/readme.txt").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(response).await, Bytes::from_static(b"hello"));

    let response = request(&app, Method::HEAD, "/docs/readme.txt").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn draining_worker_rejects_new_requests() {
    let store = seeded().await;
    let drain = DrainController::new();
    let app = app_with(Arc::new(store.clone()), drain.clone());

    drain.begin_drain();
    for uri in ["/photos/a.jpg", "/photos/a.jpg/width/10", "/"] {
        let response = get(&app, uri).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{uri}");
        assert_eq!(header_str(&response, header::RETRY_AFTER), Some("25"));
        assert!(body(response).await.is_empty());
    }
    assert_eq!(store.writes(), 0);
}

/// Holds every `get` until released, so a request can be caught in flight.
struct GatedStore {
    inner: MemoryStore,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl ObjectStore for GatedStore {
    async fn get(&self, key: &str) -> StoreResult<StoredObject> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.get(key).await
    }

    async fn put(&self, upload: ObjectUpload) -> StoreResult<()> {
        self.inner.put(upload).await
    }
}

#[tokio::test]
async fn in_flight_request_completes_after_drain_starts() {
    let store = Arc::new(GatedStore {
        inner: seeded().await,
        entered: Notify::new(),
        release: Notify::new(),
    });
    let drain = DrainController::new();
    let app = app_with(store.clone(), drain.clone());

    let in_flight = tokio::spawn({
        let app = app.clone();
        async move { get(&app, "/photos/a.jpg").await }
    });
    store.entered.notified().await;

    drain.begin_drain();
    let rejected = get(&app, "/photos/a.jpg").await;
    assert_eq!(rejected.status(), StatusCode::SERVICE_UNAVAILABLE);

    store.release.notify_one();
    let response = in_flight.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, header::CONTENT_TYPE), Some("image/jpeg"));
}
