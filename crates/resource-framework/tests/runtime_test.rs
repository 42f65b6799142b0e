use parking_lot::Mutex;
use resource_framework::mock::{MockConnection, Script};
use resource_framework::{
    kwargs, ready, Asset, Computation, Connection, FieldInfo, FrameworkError, Readiness, Registry, Resource,
    ResourceInfo, Runtime, RuntimeConfig, Value,
};
use std::sync::Arc;
use std::time::Duration;

// --- Helpers ---

fn local_asset() -> Asset {
    Asset::new("//assets/local", "local").with_platform_id("pid-local")
}

fn runtime(registry: Registry) -> Runtime {
    Runtime::new(
        Arc::new(registry),
        local_asset(),
        Arc::new(MockConnection::new("local")),
    )
}

type Received = Arc<Mutex<Vec<Result<Value, FrameworkError>>>>;

fn recorder() -> (Received, impl Fn(Result<Value, FrameworkError>) + Send + Sync + 'static) {
    let received: Received = Arc::default();
    let sink = received.clone();
    (received, move |value| sink.lock().push(value))
}

fn node_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .add_resource_info(
            ResourceInfo::new("node")
                .field(FieldInfo::new("key", "string"))
                .field(FieldInfo::new("x", "int"))
                .field(FieldInfo::new("y", "int"))
                .field(FieldInfo::new("z", "int")),
        )
        .unwrap();
    registry
}

// --- Instances ---

#[test]
fn create_with_id_returns_the_same_instance() {
    let mut registry = node_registry();
    Script::new("node").bind(&mut registry).unwrap();
    let rt = runtime(registry);

    let a = rt.create_resource_with_id("node", "n1", &[]).unwrap();
    let b = rt.create_resource_with_id("node", "n1", &[]).unwrap();
    let c = rt.create_resource_with_id("node", "n2", &[]).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(b.core().id(), "n1");
    assert!(Arc::ptr_eq(&rt.get_resource("node", "n1").unwrap(), &a));
}

#[test]
fn set_resource_keeps_the_resident_instance() {
    let mut registry = node_registry();
    Script::new("node").id_from("key").bind(&mut registry).unwrap();
    let rt = runtime(registry.clone());
    let other = runtime(registry);

    let resident = rt.create_resource("node", &kwargs!["key" => "k"]).unwrap();
    let foreign = other.create_resource("node", &kwargs!["key" => "k"]).unwrap();
    assert!(Arc::ptr_eq(&rt.set_resource(foreign), &resident));
    assert!(Arc::ptr_eq(
        &rt.create_resource("node", &kwargs!["key" => "k"]).unwrap(),
        &resident
    ));

    // a vacant identity takes the given instance
    let fresh = other.create_resource("node", &kwargs!["key" => "j"]).unwrap();
    assert!(Arc::ptr_eq(&rt.set_resource(fresh.clone()), &fresh));
    assert!(Arc::ptr_eq(&rt.get_resource("node", "j").unwrap(), &fresh));
    assert_eq!(rt.instance_count(), 2);
}

#[test]
fn factory_shells_resolve_to_cached_instances() {
    let mut registry = node_registry();
    Script::new("node").id_from("key").bind(&mut registry).unwrap();
    let rt = runtime(registry);

    let first = rt.create_resource("node", &kwargs!["key" => "k1"]).unwrap();
    let shell = rt.create_resource("node", &kwargs!["key" => "k1"]).unwrap();
    assert!(Arc::ptr_eq(&first, &shell));
    assert_eq!(rt.instance_count(), 1);
}

#[test]
fn failed_validation_caches_nothing() {
    let mut registry = Registry::new();
    registry
        .add_resource_info(ResourceInfo::new("user").field(FieldInfo::new("name", "string").mandatory()))
        .unwrap();
    Script::new("user").id_from("name").bind(&mut registry).unwrap();
    let rt = runtime(registry);

    let err = rt.create_resource("user", &[]).unwrap_err();
    assert!(matches!(err, FrameworkError::Validation { .. }));
    assert_eq!(rt.instance_count(), 0);

    let user = rt.create_resource("user", &kwargs!["name" => "root"]).unwrap();
    assert_eq!(user.core().id(), "root");
}

#[test]
fn keyword_arguments_must_pair_up() {
    let mut registry = node_registry();
    Script::new("node").bind(&mut registry).unwrap();
    let rt = runtime(registry);

    let err = rt.create_resource("node", &[Value::from("key")]).unwrap_err();
    assert!(matches!(err, FrameworkError::InvalidArguments(_)));
    assert!(matches!(
        rt.create_resource("nope", &[]),
        Err(FrameworkError::ResourceNotFound(_))
    ));
}

#[test]
fn classes_without_factory_become_mocks() {
    let mut registry = Registry::new();
    registry
        .add_resource_info(
            ResourceInfo::new("kernel")
                .field(FieldInfo::new("version", "string"))
                .field(FieldInfo::new("modules", "[]string")),
        )
        .unwrap();
    let rt = runtime(registry);

    let kernel = rt.create_resource("kernel", &[]).unwrap();
    let (received, callback) = recorder();
    rt.watch_and_update(&kernel, "version", "q1", callback).unwrap();
    assert_eq!(*received.lock(), vec![Ok(Value::from(""))]);

    let (modules, callback) = recorder();
    rt.watch_and_update(&kernel, "modules", "q1", callback).unwrap();
    assert_eq!(*modules.lock(), vec![Ok(Value::Array(vec![]))]);

    let err = rt.create_resource("kernel", &kwargs!["version" => "6.1"]).unwrap_err();
    assert_eq!(err, FrameworkError::MockArguments("kernel".into()));
}

// --- Reactive protocol ---

#[test]
fn not_ready_chain_resolves_after_trigger() {
    let upstream: Arc<Mutex<Option<i64>>> = Arc::default();
    let source = upstream.clone();

    let mut registry = node_registry();
    let script = Script::new("node")
        .compute("z", move |_, _| match *source.lock() {
            Some(v) => Computation::ready(v),
            None => Computation::NotReady,
        })
        .depends_on("y", &["z"])
        .compute("y", |res, _| {
            let z = ready!(res.field("z"));
            Computation::ready(z.as_int().unwrap_or_default() + 1)
        })
        .depends_on("x", &["y"])
        .compute("x", |res, _| {
            let y = ready!(res.field("y"));
            Computation::ready(y.as_int().unwrap_or_default() * 2)
        });
    script.bind(&mut registry).unwrap();
    let rt = runtime(registry);

    let node = rt.create_resource("node", &[]).unwrap();
    let (received, callback) = recorder();
    rt.watch_and_update(&node, "x", "query", callback).unwrap();

    // nothing is delivered while z is missing
    assert!(received.lock().is_empty());
    assert_eq!(node.field("x"), resource_framework::FieldState::Pending);
    assert_eq!(node.field("y"), resource_framework::FieldState::Pending);

    *upstream.lock() = Some(20);
    assert_eq!(rt.trigger(&node, "z").unwrap(), Readiness::Ready);

    assert_eq!(*received.lock(), vec![Ok(Value::Int(42))]);
    assert_eq!(node.field("y"), resource_framework::FieldState::Ready(Value::Int(21)));
    assert_eq!(script.computations("x"), 2);
    assert_eq!(script.computations("z"), 2);
}

#[test]
fn watching_twice_registers_once() {
    let mut registry = node_registry();
    let script = Script::new("node").constant("x", 1_i64);
    script.bind(&mut registry).unwrap();
    let rt = runtime(registry);
    let node = rt.create_resource("node", &[]).unwrap();

    let (received, callback) = recorder();
    let callback = Arc::new(callback);
    let (first, second) = (callback.clone(), callback.clone());
    rt.watch_and_update(&node, "x", "q1", move |v| first(v)).unwrap();
    rt.watch_and_update(&node, "x", "q1", move |v| second(v)).unwrap();

    assert_eq!(received.lock().len(), 1);
    assert_eq!(script.computations("x"), 1);
    assert_eq!(rt.observers().watcher_count(&node.core().field_uid("x")), 1);
    assert_eq!(rt.unregister("q1"), 1);
    assert_eq!(rt.unregister("q1"), 0);
}

#[test]
fn late_watchers_catch_up_from_the_cache() {
    let mut registry = node_registry();
    let script = Script::new("node").constant("x", 5_i64);
    script.bind(&mut registry).unwrap();
    let rt = runtime(registry);
    let node = rt.create_resource("node", &[]).unwrap();

    let (early, callback) = recorder();
    rt.watch_and_update(&node, "x", "q1", callback).unwrap();
    let (late, callback) = recorder();
    rt.watch_and_update(&node, "x", "q2", callback).unwrap();

    assert_eq!(*early.lock(), vec![Ok(Value::Int(5))]);
    assert_eq!(*late.lock(), vec![Ok(Value::Int(5))]);
    assert_eq!(script.computations("x"), 1);
}

#[test]
fn concurrent_watchers_compute_once() {
    let mut registry = node_registry();
    let script = Script::new("node").compute("x", |_, _| {
        std::thread::sleep(Duration::from_millis(30));
        Computation::ready(7_i64)
    });
    script.bind(&mut registry).unwrap();
    let rt = runtime(registry);
    let node = rt.create_resource("node", &[]).unwrap();

    let (received, callback) = recorder();
    let callback = Arc::new(callback);
    std::thread::scope(|s| {
        for i in 0..8 {
            let (rt, node, callback) = (rt.clone(), node.clone(), callback.clone());
            s.spawn(move || {
                rt.watch_and_update(&node, "x", &format!("w{i}"), move |v| callback(v))
                    .unwrap();
                let _ = rt.trigger(&node, "x");
            });
        }
    });

    assert_eq!(script.computations("x"), 1);
    let received = received.lock();
    assert_eq!(received.len(), 8);
    assert!(received.iter().all(|v| *v == Ok(Value::Int(7))));
}

#[test]
fn computation_errors_are_terminal_and_shared() {
    let conn = Arc::new(MockConnection::new("local"));
    conn.expect_file("/etc/shadow")
        .return_err(FrameworkError::Connection("permission denied".into()));

    let mut registry = Registry::new();
    registry
        .add_resource_info(ResourceInfo::new("file").field(FieldInfo::new("content", "string")))
        .unwrap();
    let script = Script::new("file").compute("content", |res, _| {
        res.core().connection().read_file("/etc/shadow").map(Value::from).into()
    });
    script.bind(&mut registry).unwrap();
    let rt = Runtime::new(Arc::new(registry), local_asset(), conn.clone());
    let file = rt.create_resource("file", &[]).unwrap();

    let (first, callback) = recorder();
    rt.watch_and_update(&file, "content", "q1", callback).unwrap();
    let (second, callback) = recorder();
    rt.watch_and_update(&file, "content", "q2", callback).unwrap();

    let expected = Err(FrameworkError::Connection("permission denied".into()));
    assert_eq!(*first.lock(), vec![expected.clone()]);
    assert_eq!(*second.lock(), vec![expected]);
    assert_eq!(rt.trigger(&file, "content").unwrap(), Readiness::Ready);
    assert_eq!(conn.call_count(), 1);
}

#[test]
fn injected_list_content_is_delivered_without_compute() {
    let mut registry = Registry::new();
    registry
        .add_resource_info(
            ResourceInfo::new("users")
                .list_type()
                .field(FieldInfo::new("list", "[]string")),
        )
        .unwrap();
    let script = Script::new("users").constant("list", Value::Array(vec![]));
    script.bind(&mut registry).unwrap();
    let rt = runtime(registry);

    let list = Value::Array(vec![Value::from("root"), Value::from("bob")]);
    let users = rt.create_resource("users", &kwargs!["list" => list.clone()]).unwrap();
    let (received, callback) = recorder();
    rt.watch_and_update(&users, "list", "q1", callback).unwrap();

    assert_eq!(*received.lock(), vec![Ok(list)]);
    assert_eq!(script.computations("list"), 0);
}

#[test]
fn trigger_requires_a_watcher_when_not_ready() {
    let mut registry = node_registry();
    Script::new("node")
        .compute("z", |_, _| Computation::NotReady)
        .bind(&mut registry)
        .unwrap();
    let rt = runtime(registry.clone());
    let node = rt.create_resource("node", &[]).unwrap();

    assert!(matches!(
        rt.trigger(&node, "z"),
        Err(FrameworkError::UnobservedTrigger { .. })
    ));
    assert_eq!(rt.trigger(&node, ""), Err(FrameworkError::EmptyField));

    let (_, callback) = recorder();
    rt.watch_and_update(&node, "z", "q1", callback).unwrap();
    assert_eq!(rt.trigger(&node, "z").unwrap(), Readiness::NotReady);

    let lenient = runtime(registry).with_config(RuntimeConfig {
        strict_trigger: false,
        ..RuntimeConfig::default()
    });
    let node = lenient.create_resource("node", &[]).unwrap();
    assert_eq!(lenient.trigger(&node, "z").unwrap(), Readiness::NotReady);
}

#[test]
fn published_values_reach_watchers_once() {
    let mut registry = node_registry();
    Script::new("node")
        .compute("z", |_, _| Computation::NotReady)
        .bind(&mut registry)
        .unwrap();
    let rt = runtime(registry);
    let node = rt.create_resource("node", &[]).unwrap();

    let (received, callback) = recorder();
    rt.watch_and_update(&node, "z", "stream", callback).unwrap();
    assert!(received.lock().is_empty());

    assert!(rt.publish(&node, "z", Ok(Value::Int(3))).unwrap());
    assert!(!rt.publish(&node, "z", Ok(Value::Int(4))).unwrap());
    assert_eq!(*received.lock(), vec![Ok(Value::Int(3))]);
    assert!(matches!(
        rt.publish(&node, "missing", Ok(Value::Nil)),
        Err(FrameworkError::FieldNotFound { .. })
    ));
}

#[test]
fn computes_that_publish_their_own_field_are_ready() {
    let mut registry = node_registry();
    Script::new("node")
        .compute("z", |this, rt| {
            let published = rt
                .get_resource(this.core().name(), this.core().id())
                .and_then(|me| rt.publish(&me, "z", Ok(Value::Int(1))));
            match published {
                Ok(_) => Computation::NotReady,
                Err(e) => Computation::Failed(e),
            }
        })
        .bind(&mut registry)
        .unwrap();
    let rt = runtime(registry);
    let node = rt.create_resource("node", &[]).unwrap();

    assert_eq!(rt.trigger(&node, "z").unwrap(), Readiness::Ready);

    let (received, callback) = recorder();
    rt.watch_and_update(&node, "z", "late", callback).unwrap();
    assert_eq!(*received.lock(), vec![Ok(Value::Int(1))]);
}

#[test]
fn unregistered_watchers_hear_nothing() {
    let mut registry = node_registry();
    Script::new("node")
        .compute("z", |_, _| Computation::NotReady)
        .bind(&mut registry)
        .unwrap();
    let rt = runtime(registry);
    let node = rt.create_resource("node", &[]).unwrap();

    let uid = node.core().field_uid("z");
    let released: Arc<Mutex<bool>> = Arc::default();
    let flag = released.clone();
    rt.observers().on_unwatch(&uid, Box::new(move || *flag.lock() = true));

    let (received, callback) = recorder();
    rt.watch_and_update(&node, "z", "q1", callback).unwrap();
    assert_eq!(rt.unregister("q1"), 1);
    assert!(*released.lock());

    rt.publish(&node, "z", Ok(Value::Int(1))).unwrap();
    assert!(received.lock().is_empty());
}

#[test]
fn deep_dependency_chains_propagate() {
    const DEPTH: usize = 64;

    let mut registry = Registry::new();
    registry
        .add_resource_info(
            ResourceInfo::new("link")
                .field(FieldInfo::new("key", "string"))
                .field(FieldInfo::new("value", "int")),
        )
        .unwrap();
    let script = Script::new("link")
        .id_from("key")
        .register("value", |deps| {
            let depth: usize = deps.resource().core().id().parse().unwrap_or(0);
            if depth == 0 {
                return Ok(());
            }
            let next = deps
                .runtime()
                .create_resource("link", &kwargs!["key" => (depth - 1).to_string()])?;
            deps.watch(&next, "value")
        })
        .compute("value", |res, rt| {
            let depth: usize = res.core().id().parse().unwrap_or(0);
            // the leaf is only ever published
            if depth == 0 {
                return Computation::NotReady;
            }
            let next = match rt.get_resource("link", &(depth - 1).to_string()) {
                Ok(next) => next,
                Err(e) => return Computation::Failed(e),
            };
            let value = ready!(next.field("value"));
            Computation::ready(value.as_int().unwrap_or_default() + 1)
        });
    script.bind(&mut registry).unwrap();
    let rt = runtime(registry);

    let top = rt
        .create_resource("link", &kwargs!["key" => DEPTH.to_string()])
        .unwrap();
    let (received, callback) = recorder();
    rt.watch_and_update(&top, "value", "q1", callback).unwrap();
    assert!(received.lock().is_empty());

    let leaf = rt.get_resource("link", "0").unwrap();
    rt.publish(&leaf, "value", Ok(Value::Int(0))).unwrap();
    assert_eq!(*received.lock(), vec![Ok(Value::Int(DEPTH as i64))]);
}

// --- Asset contexts ---

#[test]
fn asset_contexts_share_or_split_connection_handles() {
    let mut registry = node_registry();
    Script::new("node").id_from("key").bind(&mut registry).unwrap();
    let local: Arc<MockConnection> = Arc::new(MockConnection::new("local"));
    let remote: Arc<MockConnection> = Arc::new(MockConnection::new("remote"));
    let local_conn: Arc<dyn Connection> = local.clone();
    let remote_conn: Arc<dyn Connection> = remote.clone();
    let rt = Runtime::new(Arc::new(registry), local_asset(), local_conn.clone());

    let host = Asset::new("//assets/host", "host").with_platform_id("pid-host");
    let container = Asset::new("//assets/container", "container").with_platform_id("pid-host");
    let other = Asset::new("//assets/other", "other").with_platform_id("pid-other");

    let a = rt
        .create_resource_with_asset_context("node", &host, Some(remote_conn.clone()), &kwargs!["key" => "a"])
        .unwrap();
    let b = rt
        .create_resource_with_asset_context("node", &host, Some(remote_conn.clone()), &kwargs!["key" => "b"])
        .unwrap();
    assert!(Arc::ptr_eq(a.core().connection(), b.core().connection()));
    assert!(!Arc::ptr_eq(a.core().connection(), rt.connection()));

    // overlapping platform ids make it the same asset
    let c = rt
        .create_resource_with_asset_context("node", &container, Some(remote_conn.clone()), &kwargs!["key" => "c"])
        .unwrap();
    assert!(Arc::ptr_eq(a.core().connection(), c.core().connection()));

    let d = rt
        .create_resource_with_asset_context("node", &other, Some(remote_conn), &kwargs!["key" => "d"])
        .unwrap();
    assert!(!Arc::ptr_eq(a.core().connection(), d.core().connection()));

    // same connection and same asset as the runtime itself
    let e = rt
        .create_resource_with_asset_context("node", &local_asset(), None, &kwargs!["key" => "e"])
        .unwrap();
    assert!(Arc::ptr_eq(e.core().connection(), rt.connection()));

    // sibling handles over one connection: the connection outlives the first close
    assert_eq!(a.core().connection().open_count(), 2);
    d.core().connection().close();
    assert!(d.core().connection().is_closed());
    assert!(!a.core().connection().is_closed());
    assert_eq!(remote.close_count(), 0);
    assert_eq!(a.core().connection().open_count(), 1);

    assert_eq!(rt.close(), 2);
    assert_eq!(rt.close(), 0);
    assert_eq!(remote.close_count(), 1);
    assert_eq!(local.close_count(), 1);
    assert!(a.core().connection().read_file("/etc/hostname").is_err());
}
