use super::*;
use crate::error::InvocationError;
use crate::registry::{Args, OperationMeta, ParamSpec, RegistryBuilder};
use axum::{body::Body, http::Request as HttpRequest};
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::util::ServiceExt;

fn ping(_: &mut World, response: &mut ResponseHandle, _: &Args) -> Result<(), InvocationError> {
    response.text("Pong!");
    Ok(())
}

fn test_config(timeout_ms: u64) -> ServerConfig {
    ServerConfig {
        listening_port: 0,
        resources_dir: std::env::temp_dir().join("tickwire-test-missing-resources"),
        index_url: "http://127.0.0.1:1/index.html".to_string(),
        favicon_url: "http://127.0.0.1:1/favicon.ico".to_string(),
        invocation_timeout_ms: timeout_ms,
        product_name: "Test Product".to_string(),
        ..ServerConfig::default()
    }
}

fn setup_edge(builder: RegistryBuilder, timeout_ms: u64) -> (Router, MainThreadExecutor, ServerLog) {
    setup_edge_with_log(builder, timeout_ms, ServerLog::new(0))
}

fn setup_edge_with_log(
    builder: RegistryBuilder,
    timeout_ms: u64,
    log: ServerLog,
) -> (Router, MainThreadExecutor, ServerLog) {
    let (queue, executor) = invocation_channel(log.clone());
    let state = EdgeState::new(
        &test_config(timeout_ms),
        SharedRegistry::ready(builder.build()),
        queue,
        log.clone(),
    );
    (build_router(state), executor, log)
}

fn get(uri: &str) -> HttpRequest<Body> {
    HttpRequest::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn body_string(res: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8")
}

/// Sends `req` on a background task and plays the main tick until the
/// operation has been queued and run.
async fn request_with_tick(
    app: Router,
    executor: &MainThreadExecutor,
    world: &mut World,
    req: HttpRequest<Body>,
) -> axum::response::Response {
    let call = tokio::spawn(app.oneshot(req));
    while executor.pending() == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(executor.drain_and_run_all(world), 1);
    call.await.expect("join").expect("response")
}

#[tokio::test]
async fn unknown_path_is_invalid_request() {
    let (app, _executor, _log) = setup_edge(RegistryBuilder::new(), 1_000);
    let res = app.oneshot(get("/unknown-path")).await.expect("response");
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.headers()["cache-control"], "no-cache, no-store, must-revalidate");
    assert_eq!(body_string(res).await, "Invalid request.");
}

#[tokio::test]
async fn commands_listing_with_no_operations_is_empty() {
    let (app, _executor, _log) = setup_edge(RegistryBuilder::new(), 1_000);
    let res = app.oneshot(get("/commands")).await.expect("response");
    assert_eq!(res.status(), StatusCode::OK);
    let value: serde_json::Value = serde_json::from_str(&body_string(res).await).expect("json");
    assert_eq!(value["productName"], "Test Product");
    assert_eq!(value["commands"], serde_json::json!([]));
}

#[tokio::test]
async fn commands_listing_describes_parameters() {
    let mut builder = RegistryBuilder::new();
    builder
        .register(
            OperationMeta::new("/spawnResource")
                .category("World")
                .description("Spawns a resource")
                .param(ParamSpec::string("resource").with_options(["Wood", "Stone"]))
                .param(ParamSpec::int("amount").with_default("5")),
            ping,
        )
        .expect("register");
    let (app, _executor, _log) = setup_edge(builder, 1_000);

    let res = app.oneshot(get("/commands")).await.expect("response");
    let value: serde_json::Value = serde_json::from_str(&body_string(res).await).expect("json");
    let command = &value["commands"][0];
    assert_eq!(command["path"], "/spawnResource");
    assert_eq!(command["category"], "World");
    assert_eq!(command["description"], "Spawns a resource");
    assert_eq!(command["parameters"][0]["name"], "resource");
    assert_eq!(command["parameters"][0]["type"], "string");
    assert_eq!(
        command["parameters"][0]["autoCompleteOptions"],
        serde_json::json!(["Wood", "Stone"])
    );
    assert_eq!(command["parameters"][1]["type"], "int");
    assert_eq!(command["parameters"][1]["defaultValue"], "5");
    assert!(command["parameters"][1]["autoCompleteOptions"].is_null());
}

#[tokio::test]
async fn heartbeat_reports_variables_and_drains_log() {
    let mut builder = RegistryBuilder::new();
    builder.register_variable("FrameCount", || "42".to_string());
    builder.register_variable("Broken", || panic!("accessor failed"));
    let (app, _executor, log) = setup_edge(builder, 1_000);
    log.log_message("hello", LogLevel::Normal);

    let res = app.clone().oneshot(get("/heartbeat")).await.expect("response");
    assert_eq!(res.status(), StatusCode::OK);
    let value: serde_json::Value = serde_json::from_str(&body_string(res).await).expect("json");
    assert_eq!(value["GameVariables"]["FrameCount"], "42");
    assert!(value["GameVariables"]["Broken"].is_null());
    let lines = value["LogResults"].as_array().expect("log results");
    assert!(lines.iter().any(|l| l.as_str().is_some_and(|s| s.ends_with("] hello"))));

    let res = app.oneshot(get("/heartbeat")).await.expect("response");
    let value: serde_json::Value = serde_json::from_str(&body_string(res).await).expect("json");
    let lines = value["LogResults"].as_array().expect("log results");
    assert!(!lines.iter().any(|l| l.as_str().is_some_and(|s| s.ends_with("] hello"))));
}

#[tokio::test]
async fn heartbeat_polls_are_not_reported_back_at_verbose_level() {
    let (app, _executor, _log) =
        setup_edge_with_log(RegistryBuilder::new(), 1_000, ServerLog::new(2));

    let res = app.clone().oneshot(get("/heartbeat")).await.expect("response");
    assert_eq!(res.status(), StatusCode::OK);
    let res = app.oneshot(get("/heartbeat")).await.expect("response");
    let value: serde_json::Value = serde_json::from_str(&body_string(res).await).expect("json");
    assert_eq!(value["LogResults"], serde_json::json!([]));
}

#[tokio::test]
async fn panicking_autocomplete_lists_null_options() {
    let mut builder = RegistryBuilder::new();
    builder
        .register(
            OperationMeta::new("/spawnResource").param(
                ParamSpec::string("resource").with_autocomplete(|| panic!("catalog not loaded")),
            ),
            ping,
        )
        .expect("register");
    let (app, _executor, log) = setup_edge(builder, 1_000);

    let res = app.oneshot(get("/commands")).await.expect("response");
    assert_eq!(res.status(), StatusCode::OK);
    let value: serde_json::Value = serde_json::from_str(&body_string(res).await).expect("json");
    let param = &value["commands"][0]["parameters"][0];
    assert_eq!(param["name"], "resource");
    assert!(param["autoCompleteOptions"].is_null());
    assert!(log
        .buffer()
        .drain()
        .iter()
        .any(|l| l.contains("Autocomplete for 'resource'") && l.contains("catalog not loaded")));
}

#[tokio::test]
async fn game_variables_without_variables_is_empty_object() {
    let (app, _executor, log) = setup_edge(RegistryBuilder::new(), 1_000);
    log.log_message("kept", LogLevel::Normal);
    let res = app.oneshot(get("/game-variables")).await.expect("response");
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_string(res).await, "{}");
    assert_eq!(log.buffer().len(), 1);
}

#[tokio::test]
async fn ping_round_trips_through_main_tick() {
    let mut builder = RegistryBuilder::new();
    builder.register(OperationMeta::new("/ping"), ping).expect("register");
    let (app, executor, _log) = setup_edge(builder, 5_000);
    let mut world = World::new();

    let res = request_with_tick(app, &executor, &mut world, get("/ping")).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "text/plain; charset=utf-8");
    assert_eq!(res.headers()["expires"], "0");
    assert_eq!(body_string(res).await, "Pong!");
}

#[tokio::test]
async fn omitted_parameter_uses_declared_default() {
    let mut builder = RegistryBuilder::new();
    builder
        .register(
            OperationMeta::new("/inputTest")
                .param(ParamSpec::string("name"))
                .param(ParamSpec::int("count").with_default("3"))
                .param(ParamSpec::bool("loud")),
            |_: &mut World, response: &mut ResponseHandle, args: &Args| {
                response.text(format!(
                    "{}|{}|{}|{}",
                    args.str("name"),
                    args.int("count"),
                    args.bool("loud"),
                    args.is_supplied("count")
                ));
                Ok(())
            },
        )
        .expect("register");
    let (app, executor, _log) = setup_edge(builder, 5_000);
    let mut world = World::new();

    let res = request_with_tick(
        app.clone(),
        &executor,
        &mut world,
        get("/inputTest?name=Ada&loud=TRUE"),
    )
    .await;
    assert_eq!(body_string(res).await, "Ada|3|true|false");

    let res = request_with_tick(app, &executor, &mut world, get("/inputTest?count=7&extra=1")).await;
    assert_eq!(body_string(res).await, "|7|false|true");
}

#[tokio::test]
async fn bad_argument_is_rejected_before_queueing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let mut builder = RegistryBuilder::new();
    builder
        .register(
            OperationMeta::new("/add").param(ParamSpec::int("n")),
            move |_: &mut World, _: &mut ResponseHandle, _: &Args| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .expect("register");
    let (app, executor, _log) = setup_edge(builder, 1_000);

    let res = app.oneshot(get("/add?n=abc")).await.expect("response");
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let value: serde_json::Value = serde_json::from_str(&body_string(res).await).expect("json");
    assert_eq!(value["ok"], false);
    assert!(value["error"].as_str().expect("error").contains("abc"));
    assert_eq!(executor.pending(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn operation_failure_becomes_server_error() {
    let mut builder = RegistryBuilder::new();
    builder
        .register(
            OperationMeta::new("/fail"),
            |_: &mut World, _: &mut ResponseHandle, _: &Args| Err("no map loaded".into()),
        )
        .expect("register");
    let (app, executor, _log) = setup_edge(builder, 5_000);
    let mut world = World::new();

    let res = request_with_tick(app, &executor, &mut world, get("/fail")).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_string(res).await.contains("Server error. no map loaded"));
}

#[tokio::test]
async fn stalled_main_tick_times_out() {
    let mut builder = RegistryBuilder::new();
    builder.register(OperationMeta::new("/ping"), ping).expect("register");
    let (app, executor, _log) = setup_edge(builder, 50);

    let res = app.oneshot(get("/ping")).await.expect("response");
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(executor.pending(), 1);
}

#[tokio::test]
async fn missing_executor_is_service_unavailable() {
    let mut builder = RegistryBuilder::new();
    builder.register(OperationMeta::new("/ping"), ping).expect("register");
    let (app, executor, _log) = setup_edge(builder, 5_000);
    drop(executor);

    let res = app.oneshot(get("/ping")).await.expect("response");
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn registry_not_yet_published_behaves_empty() {
    let log = ServerLog::new(0);
    let (queue, _executor) = invocation_channel(log.clone());
    let state = EdgeState::new(&test_config(1_000), SharedRegistry::default(), queue, log);
    let app = build_router(state);

    let res = app.clone().oneshot(get("/ping")).await.expect("response");
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let res = app.oneshot(get("/commands")).await.expect("response");
    assert_eq!(res.status(), StatusCode::OK);
}

#[derive(Resource, Default)]
struct Pings(u32);

fn blocking_get(url: String) -> (u16, String) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    rt.block_on(async move {
        let res = reqwest::get(url).await.expect("request");
        let status = res.status().as_u16();
        (status, res.text().await.expect("body"))
    })
}

#[test]
fn plugin_serves_operations_from_app_update() {
    let mut app = App::new();
    app.init_resource::<Pings>()
        .add_plugins(CommandServerPlugin::new(test_config(5_000)))
        .add_operation_source(crate::registry::SourceFn::new("test", |builder: &mut RegistryBuilder| {
            builder.register(
                OperationMeta::new("/ping"),
                |world: &mut World, response: &mut ResponseHandle, _: &Args| {
                    let mut pings = world
                        .get_resource_mut::<Pings>()
                        .ok_or("pings resource missing")?;
                    pings.0 += 1;
                    response.text("Pong!");
                    Ok(())
                },
            )?;
            Ok(())
        }));
    app.finish();
    app.cleanup();

    let (addr, registry) = {
        let server = app.world().resource::<CommandServer>();
        (server.local_addr().expect("listening"), server.registry().clone())
    };
    let started = std::time::Instant::now();
    while !registry.is_ready() {
        assert!(started.elapsed() < Duration::from_secs(5), "discovery stalled");
        std::thread::sleep(Duration::from_millis(5));
    }

    let client = std::thread::spawn(move || blocking_get(format!("http://{addr}/ping")));
    let started = std::time::Instant::now();
    while !client.is_finished() {
        assert!(started.elapsed() < Duration::from_secs(10), "request stalled");
        app.update();
        std::thread::sleep(Duration::from_millis(2));
    }
    let (status, body) = client.join().expect("client thread");
    assert_eq!(status, 200);
    assert_eq!(body, "Pong!");
    assert_eq!(app.world().resource::<Pings>().0, 1);

    app.world_mut().send_event(AppExit::Success);
    app.update();
    assert!(!app.world().resource::<CommandServer>().is_listening());
}

#[test]
fn drain_system_without_server_does_nothing() {
    let mut world = World::new();
    run_pending_invocations(&mut world);
    assert!(!world.contains_resource::<CommandServer>());
}

#[test]
fn occupied_port_is_logged_and_host_keeps_running() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = occupied.local_addr().expect("addr").port();
    let log = ServerLog::new(0);

    let mut app = App::new();
    app.insert_resource(log.clone())
        .init_resource::<Pings>()
        .add_plugins(CommandServerPlugin::new(ServerConfig {
            listening_port: i64::from(port),
            ..test_config(1_000)
        }));
    app.finish();
    app.cleanup();

    assert!(!app.world().resource::<CommandServer>().is_listening());
    assert!(log
        .buffer()
        .drain()
        .iter()
        .any(|l| l.contains("Command server not started")));

    app.update();
    app.update();
    assert!(app.world().get_resource::<Pings>().is_some());
    drop(occupied);
}
