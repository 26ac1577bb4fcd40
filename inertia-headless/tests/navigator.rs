use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::RawQuery;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use async_trait::async_trait;
use inertia_core::{
    form_map, CancelToken, Event, EventKind, FileData, FormMap, NavigationType, Page, Router,
    ScrollOffset, Verdict, VisitError, VisitOptions,
};
use inertia_headless::{
    Config, HeadlessBrowser, HttpTransport, NameResolver, Navigator, NavigatorError, RecordingView,
    View, ViewError, VisitOutcome,
};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use url::Url;

type TestNavigator = Navigator<NameResolver, RecordingView>;
type Log = Arc<StdMutex<Vec<String>>>;

fn inertia(component: &str, url: &str, props: Value) -> Response {
    (
        [("x-inertia", "true"), ("vary", "X-Inertia")],
        Json(json!({"component": component, "props": props, "url": url, "version": "1"})),
    )
        .into_response()
}

async fn home() -> Response {
    inertia("Home", "/", json!({"greeting": "hi"}))
}

async fn users(RawQuery(query): RawQuery) -> Response {
    let url = match &query {
        Some(q) => format!("/users?{q}"),
        None => "/users".to_string(),
    };
    inertia("Users/Index", &url, json!({"query": query.unwrap_or_default()}))
}

async fn create_user(Json(body): Json<Value>) -> Response {
    if body["name"].as_str().unwrap_or_default().is_empty() {
        inertia(
            "Users/Create",
            "/users/create",
            json!({"errors": {"name": "The name field is required."}}),
        )
    } else {
        inertia("Users/Show", "/users/1", json!({"user": body}))
    }
}

async fn slow() -> Response {
    tokio::time::sleep(Duration::from_millis(800)).await;
    inertia("Slow", "/slow", json!({}))
}

async fn external() -> Response {
    (StatusCode::CONFLICT, [("x-inertia-location", "/users")]).into_response()
}

async fn broken() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "<h1>Server Error</h1>").into_response()
}

async fn upload(headers: HeaderMap, body: Bytes) -> Response {
    let multipart = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));
    inertia(
        "Uploaded",
        "/upload",
        json!({"size": body.len(), "multipart": multipart}),
    )
}

async fn dashboard(headers: HeaderMap) -> Response {
    let props = match headers
        .get("x-inertia-partial-data")
        .and_then(|v| v.to_str().ok())
    {
        Some(keys) => Value::Object(keys.split(',').map(|k| (k.to_string(), json!(5))).collect()),
        None => json!({"a": 1, "b": 2}),
    };
    inertia("Dashboard", "/dashboard", props)
}

async fn serve() -> (Url, JoinHandle<()>) {
    let app = axum::Router::new()
        .route("/", get(home))
        .route("/users", get(users).post(create_user))
        .route("/slow", get(slow))
        .route("/external", get(external))
        .route("/broken", get(broken))
        .route("/upload", post(upload))
        .route("/dashboard", get(dashboard));
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
        .await
        .expect("bind listener");
    let addr: SocketAddr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    let base = Url::parse(&format!("http://{addr}/")).expect("base url");
    (base, server)
}

fn transport() -> HttpTransport {
    HttpTransport::new(&Config::default()).expect("http client")
}

fn navigator_in(browser: Arc<Mutex<HeadlessBrowser>>) -> TestNavigator {
    Navigator::new(
        Router::new(),
        browser,
        transport(),
        NameResolver::any(),
        RecordingView::new(),
    )
}

async fn booted_at(url: Url) -> TestNavigator {
    let nav = navigator_in(Arc::new(Mutex::new(HeadlessBrowser::new(url))));
    nav.boot(NavigationType::Navigate).await.expect("boot");
    nav
}

async fn record<V: View<String>>(nav: &Navigator<NameResolver, V>) -> Log {
    let log = Log::default();
    for kind in EventKind::ALL {
        let log = log.clone();
        nav.on(kind, move |e: &Event<'_>| {
            log.lock().unwrap().push(e.kind().to_string());
        })
        .await;
    }
    log
}

fn taken(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.lock().unwrap())
}

#[tokio::test]
async fn boot_visit_and_go_back() {
    let (base, server) = serve().await;
    let nav = booted_at(base).await;
    assert_eq!(nav.page().await.unwrap().component, "Home");
    let log = record(&nav).await;

    let outcome = nav
        .get("/users", form_map(json!({"page": 2})), VisitOptions::new())
        .await
        .expect("visit");
    match outcome {
        VisitOutcome::Completed(page) => {
            assert_eq!(page.component, "Users/Index");
            assert_eq!(page.props["query"], "page=2");
        }
        other => panic!("expected completed visit, got {other:?}"),
    }
    assert_eq!(
        taken(&log),
        ["before", "cancelToken", "start", "navigate", "success", "finish"]
    );
    {
        let browser = nav.browser();
        let browser = browser.lock().await;
        assert_eq!(browser.location().path(), "/users");
        assert_eq!(browser.location().query(), Some("page=2"));
        assert_eq!(browser.history_len(), 2);
    }

    assert!(nav.back().await.expect("back"));
    assert_eq!(nav.page().await.unwrap().component, "Home");
    assert_eq!(nav.view().lock().await.current().unwrap().component, "Home");
    assert_eq!(taken(&log), ["navigate"]);
    assert!(!nav.back().await.expect("back at start"));

    assert!(nav.forward().await.expect("forward"));
    assert_eq!(nav.page().await.unwrap().component, "Users/Index");

    server.abort();
    let _ = server.await;
}

#[tokio::test]
async fn post_with_validation_errors_preserves_state() {
    let (base, server) = serve().await;
    let nav = booted_at(base).await;
    let errors = Arc::new(StdMutex::new(None));
    let e = errors.clone();

    let outcome = nav
        .post(
            "/users",
            form_map(json!({"name": ""})),
            VisitOptions::new().on_error(move |errs| *e.lock().unwrap() = Some(errs.clone())),
        )
        .await
        .expect("post");
    assert!(matches!(outcome, VisitOutcome::Completed(ref page) if page.component == "Users/Create"));
    let errors = errors.lock().unwrap().clone().expect("error callback");
    assert_eq!(errors["name"], "The name field is required.");
    let view = nav.view().lock().await;
    assert!(view.current().unwrap().preserve_state);

    server.abort();
    let _ = server.await;
}

#[tokio::test]
async fn conflict_response_hard_navigates_and_next_document_continues() {
    let (base, server) = serve().await;
    let nav = booted_at(base).await;

    let outcome = nav
        .visit("/external", VisitOptions::new().preserve_scroll(true))
        .await
        .expect("visit");
    match &outcome {
        VisitOutcome::Location(url) => assert_eq!(url.path(), "/users"),
        other => panic!("expected location, got {other:?}"),
    }
    let browser = nav.browser();
    {
        let b = browser.lock().await;
        assert_eq!(b.hard_navigations().len(), 1);
        assert!(!b.hard_navigations()[0].reload);
        assert_eq!(b.location_visit().map(|m| m.preserve_scroll), Some(true));
    }
    assert_eq!(nav.page().await.unwrap().component, "Home");

    let next = navigator_in(browser.clone());
    let page = next.boot(NavigationType::Navigate).await.expect("boot next document");
    assert_eq!(page.component, "Users/Index");
    assert_eq!(browser.lock().await.location_visit(), None);

    server.abort();
    let _ = server.await;
}

#[tokio::test]
async fn non_protocol_response_opens_overlay() {
    let (base, server) = serve().await;
    let nav = booted_at(base).await;
    let log = record(&nav).await;

    let outcome = nav.visit("/broken", VisitOptions::new()).await.expect("visit");
    match outcome {
        VisitOutcome::Invalid(overlay) => {
            assert_eq!(overlay.status, 500);
            assert!(overlay.html.contains("Server Error"));
        }
        other => panic!("expected overlay, got {other:?}"),
    }
    assert!(nav.browser().lock().await.overlay().is_some());
    assert_eq!(nav.page().await.unwrap().component, "Home");
    assert_eq!(taken(&log), ["before", "cancelToken", "start", "invalid", "finish"]);

    server.abort();
    let _ = server.await;
}

#[tokio::test]
async fn new_visit_interrupts_slow_one() {
    let (base, server) = serve().await;
    let nav = Arc::new(booted_at(base).await);

    let slow = {
        let nav = nav.clone();
        tokio::spawn(async move { nav.visit("/slow", VisitOptions::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let outcome = nav.visit("/users", VisitOptions::new()).await.expect("visit");
    assert!(matches!(outcome, VisitOutcome::Completed(_)));
    let slow = slow.await.expect("join").expect("slow visit");
    assert_eq!(slow, VisitOutcome::Cancelled);
    assert_eq!(nav.page().await.unwrap().component, "Users/Index");

    server.abort();
    let _ = server.await;
}

#[tokio::test]
async fn cancel_token_stops_request() {
    let (base, server) = serve().await;
    let nav = Arc::new(booted_at(base).await);
    let log = record(&nav).await;
    let slot: Arc<StdMutex<Option<CancelToken>>> = Arc::default();
    let s = slot.clone();

    let task = {
        let nav = nav.clone();
        let options = VisitOptions::new().on_cancel_token(move |token| *s.lock().unwrap() = Some(token.clone()));
        tokio::spawn(async move { nav.visit("/slow", options).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    slot.lock().unwrap().take().expect("token").cancel();

    assert_eq!(task.await.expect("join").expect("visit"), VisitOutcome::Cancelled);
    assert_eq!(
        taken(&log),
        ["before", "cancelToken", "start", "cancel", "finish"]
    );
    assert_eq!(nav.page().await.unwrap().component, "Home");

    server.abort();
    let _ = server.await;
}

#[tokio::test]
async fn multipart_upload_reports_progress() {
    let (base, server) = serve().await;
    let nav = booted_at(base).await;
    let seen = Arc::new(StdMutex::new(Vec::new()));
    let s = seen.clone();
    let mut data = FormMap::new();
    data.insert(
        "avatar".into(),
        FileData::new("avatar.png", vec![7u8; 100 * 1024]).into(),
    );

    let outcome = nav
        .post(
            "/upload",
            data,
            VisitOptions::new().on_progress(move |p| s.lock().unwrap().push(p.percentage.unwrap_or(0))),
        )
        .await
        .expect("upload");
    match outcome {
        VisitOutcome::Completed(page) => {
            assert_eq!(page.props["multipart"], true);
            assert!(page.props["size"].as_u64().unwrap() > 100 * 1024);
        }
        other => panic!("expected completed upload, got {other:?}"),
    }
    let seen = seen.lock().unwrap().clone();
    assert!(seen.len() > 1);
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));

    server.abort();
    let _ = server.await;
}

#[tokio::test]
async fn transport_failure_propagates_unless_handled() {
    let (base, server) = serve().await;
    let nav = booted_at(base).await;
    let log = record(&nav).await;

    let result = nav.visit("http://127.0.0.1:1/nowhere", VisitOptions::new()).await;
    assert!(matches!(
        result,
        Err(NavigatorError::Visit(VisitError::Transport { .. }))
    ));
    let events = taken(&log);
    assert_eq!(&events[events.len() - 2..], ["exception", "finish"]);

    nav.on(EventKind::Exception, |_: &Event<'_>| false).await;
    let outcome = nav
        .visit("http://127.0.0.1:1/nowhere", VisitOptions::new())
        .await
        .expect("handled failure");
    assert_eq!(outcome, VisitOutcome::Abandoned);

    server.abort();
    let _ = server.await;
}

#[tokio::test]
async fn partial_reload_merges_props() {
    let (base, server) = serve().await;
    let nav = booted_at(base.join("/dashboard").unwrap()).await;

    let outcome = nav.reload(VisitOptions::new().only(["a"])).await.expect("reload");
    assert!(matches!(outcome, VisitOutcome::Completed(_)));
    let page = nav.page().await.unwrap();
    assert_eq!(Value::Object(page.props), json!({"a": 5, "b": 2}));
    assert_eq!(nav.browser().lock().await.history_len(), 1);

    server.abort();
    let _ = server.await;
}

#[tokio::test]
async fn scroll_positions_survive_back_navigation() {
    let (base, server) = serve().await;
    let nav = booted_at(base).await;
    nav.browser().lock().await.set_region_count(1);
    nav.scroll_region(0, ScrollOffset::new(40.0, 0.0)).await;

    nav.visit("/users", VisitOptions::new()).await.expect("visit");
    assert_eq!(nav.browser().lock().await.regions(), &[ScrollOffset::ORIGIN]);

    nav.back().await.expect("back");
    assert_eq!(
        nav.browser().lock().await.regions(),
        &[ScrollOffset::new(40.0, 0.0)]
    );

    server.abort();
    let _ = server.await;
}

#[tokio::test]
async fn remembered_state_follows_history_entries() {
    let (base, server) = serve().await;
    let nav = booted_at(base).await;
    nav.remember("search", json!({"q": "rust"})).await.expect("remember");

    nav.visit("/users", VisitOptions::new()).await.expect("visit");
    assert_eq!(nav.restore("search").await, None);

    nav.back().await.expect("back");
    assert_eq!(nav.restore("search").await, Some(json!({"q": "rust"})));

    server.abort();
    let _ = server.await;
}

#[tokio::test]
async fn following_an_anchor_scrolls_to_it() {
    let (base, server) = serve().await;
    let nav = booted_at(base).await;

    nav.follow_fragment("top").await.expect("fragment");
    let browser = nav.browser();
    let b = browser.lock().await;
    assert_eq!(b.location().fragment(), Some("top"));
    assert_eq!(b.focused_fragment(), Some("top"));
    drop(b);
    assert!(nav.page().await.unwrap().url.ends_with("#top"));

    server.abort();
    let _ = server.await;
}

/// Renders like [`RecordingView`] but fails on one component.
struct RejectingView {
    rejected: &'static str,
    inner: RecordingView,
}

#[async_trait]
impl View<String> for RejectingView {
    async fn swap(&mut self, component: String, page: &Page, preserve_state: bool) -> Result<(), ViewError> {
        if component == self.rejected {
            return Err(ViewError::Rejected(format!("{component} failed to render")));
        }
        self.inner.swap(component, page, preserve_state).await
    }
}

#[tokio::test]
async fn failed_swap_still_finishes_the_visit() {
    let (base, server) = serve().await;
    let nav = Navigator::new(
        Router::new(),
        Arc::new(Mutex::new(HeadlessBrowser::new(base))),
        transport(),
        NameResolver::any(),
        RejectingView {
            rejected: "Users/Index",
            inner: RecordingView::new(),
        },
    );
    nav.boot(NavigationType::Navigate).await.expect("boot");
    let log = record(&nav).await;

    let err = nav
        .visit("/users", VisitOptions::new())
        .await
        .expect_err("swap rejected");
    assert!(matches!(err, NavigatorError::Visit(VisitError::Transport { .. })));
    assert_eq!(
        taken(&log),
        ["before", "cancelToken", "start", "exception", "finish"]
    );
    assert!(nav.router().lock().await.active_visit().is_none());

    nav.on(EventKind::Exception, |_: &Event<'_>| Verdict::Veto).await;
    let outcome = nav
        .visit("/users", VisitOptions::new())
        .await
        .expect("handled failure");
    assert_eq!(outcome, VisitOutcome::Abandoned);
    taken(&log);

    let outcome = nav
        .visit("/dashboard", VisitOptions::new())
        .await
        .expect("visit");
    assert!(matches!(outcome, VisitOutcome::Completed(_)));
    assert_eq!(
        taken(&log),
        ["before", "cancelToken", "start", "navigate", "success", "finish"]
    );
    assert_eq!(
        nav.view().lock().await.inner.current().unwrap().component,
        "Dashboard"
    );

    server.abort();
    let _ = server.await;
}
