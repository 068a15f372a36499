//! Integration tests for void_blueprint crate
//!
//! Expands small blueprint trees end to end and materializes them through a
//! recording host.

use std::collections::BTreeMap;
use void_blueprint::prelude::*;
use void_blueprint::{
    active, CallbackFailure, InstantiateError, ObjectRef, ObjectSpec, StagedHandle,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Host that records everything it is asked to do
#[derive(Default)]
struct RecordingHost {
    created: Vec<ObjectSpec>,
    attrs: BTreeMap<(ObjectId, String), AttrValue>,
    writes: Vec<(ObjectId, String, AttrValue)>,
    reject: bool,
}

impl Host for RecordingHost {
    fn create_configuration(&mut self, objects: &[ObjectSpec]) -> Result<Vec<ObjectId>, HostError> {
        if self.reject {
            return Err(HostError::new("configuration refused"));
        }
        let base = self.created.len() as u64;
        self.created.extend_from_slice(objects);
        Ok((0..objects.len() as u64).map(|i| ObjectId(base + i)).collect())
    }

    fn get_attribute(&self, object: ObjectId, attr: &str) -> Result<AttrValue, HostError> {
        self.attrs
            .get(&(object, attr.to_string()))
            .cloned()
            .ok_or_else(|| HostError::new(format!("{} has no attribute '{}'", object, attr)))
    }

    fn set_attribute(&mut self, object: ObjectId, attr: &str, value: AttrValue) -> Result<(), HostError> {
        self.attrs.insert((object, attr.to_string()), value.clone());
        self.writes.push((object, attr.to_string(), value));
        Ok(())
    }
}

fn base_registry() -> BlueprintRegistry {
    let mut registry = BlueprintRegistry::new();
    registry
        .register_state(StateType::config("Board").field("cores", 2).field("name", "board"))
        .unwrap();
    registry
        .register_state(StateType::state("Counter").field("value", 0))
        .unwrap();
    registry
        .register_state(StateType::state("Bus").list("devices").set("tags").dict("irqs"))
        .unwrap();
    registry
        .register_state(StateType::binding("Irq").field("line", 0))
        .unwrap();
    registry
        .register_state(StateType::state("Timing").field("skew", 0))
        .unwrap();
    registry
        .register_state(
            StateType::state("Clock")
                .field("freq", 100)
                .nested("timing", "Timing"),
        )
        .unwrap();
    registry
}

fn args<const N: usize>(entries: [(&str, Value); N]) -> Args {
    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn attr<'a>(graph: &'a ResolvedGraph, name: &str, attr: &str) -> Option<&'a Value> {
    graph.object(&Namespace::new(name))?.attrs.get(attr)
}

#[test]
fn test_board_with_two_cpus() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("board", |ctx, ns| {
        ctx.add_object(ns.clone(), "board", Args::new());
        for index in 0..2usize {
            ctx.add_subexpansion(ns.indexed("cpu", index), "cpu", args([("index", Value::from(index))]));
        }
        Ok(())
    }));
    registry.register(Blueprint::new("cpu", |ctx, ns| {
        let index = ctx.arg("index").cloned().unwrap_or_default();
        let board = ns.parent().unwrap_or_default();
        ctx.add_object(ns.clone(), "cpu", [("index", index), ("board", Value::reference(board))]);
        Ok(())
    }));

    let graph = Builder::new(Arc::new(registry))
        .expand(Namespace::new("machine"), "board", Vec::new())
        .unwrap();

    let names: Vec<&str> = graph.objects().keys().map(|n| n.as_str()).collect();
    assert_eq!(names, vec!["machine", "machine.cpu[0]", "machine.cpu[1]"]);
    assert_eq!(attr(&graph, "machine.cpu[1]", "index"), Some(&Value::Int(1)));

    let mut host = RecordingHost::default();
    let created = instantiate(&graph, &mut host, "").unwrap();

    assert_eq!(host.created.len(), 3);
    assert_eq!(host.created[0].name, "machine");
    assert_eq!(host.created[0].blueprint.as_deref(), Some("board"));
    assert_eq!(host.created[1].class, "cpu");
    assert_eq!(
        host.created[1].attrs.get("board"),
        Some(&AttrValue::Object(ObjectRef::Staged(StagedHandle(0))))
    );
    assert_eq!(created.get(&Namespace::new("machine.cpu[1]")), Some(ObjectId(2)));
}

#[test]
fn test_config_visible_to_child() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("board", |ctx, ns| {
        let board = ctx.expose_state(ns, "Board")?;
        ctx.set(&board, "cores", 5)?;
        ctx.add_subexpansion(ns.child("cpu"), "cpu", Args::new());
        Ok(())
    }));
    registry.register(Blueprint::new("cpu", |ctx, ns| {
        let board = ctx.read_state(ns, "Board", ReadFlags::default())?;
        let cores = ctx.get(&board, "cores")?;
        ctx.add_object(ns.clone(), "cpu", [("cores", cores)]);
        Ok(())
    }));

    let graph = Builder::new(Arc::new(registry))
        .expand(Namespace::new("board"), "board", Vec::new())
        .unwrap();

    assert_eq!(attr(&graph, "board.cpu", "cores"), Some(&Value::Int(5)));
    assert_eq!(graph.passes(), 2);
    assert!(!graph.has_errors());
}

#[test]
fn test_preset_beats_blueprint_default() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("board", |ctx, ns| {
        let board = ctx.expose_state(ns, "Board")?;
        ctx.set_with(&board, "cores", Assignment::default_value(1))?;
        Ok(())
    }));

    let root = Namespace::new("board");
    let preset = Preset::new(StateKey::new(root.clone(), "Board").field("cores"), 2);
    let graph = Builder::new(Arc::new(registry))
        .expand(root.clone(), "board", vec![preset])
        .unwrap();

    assert_eq!(graph.state_value(&root, "Board", "cores"), Some(Value::Int(2)));
    assert!(!graph.has_errors());
}

#[test]
fn test_override_write_beats_normal_write() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("board", |ctx, ns| {
        let board = ctx.expose_state(ns, "Board")?;
        ctx.set_with(&board, "cores", Assignment::overriding(8))?;
        ctx.set(&board, "cores", 4)?;
        Ok(())
    }));

    let root = Namespace::new("board");
    let graph = Builder::new(Arc::new(registry))
        .expand(root.clone(), "board", Vec::new())
        .unwrap();
    assert_eq!(graph.state_value(&root, "Board", "cores"), Some(Value::Int(8)));
}

#[test]
fn test_conflicting_writes_are_reported() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("board", |ctx, ns| {
        ctx.expose_state(ns, "Counter")?;
        ctx.add_subexpansion(ns.child("a"), "writer", args([("value", Value::from(1))]));
        ctx.add_subexpansion(ns.child("b"), "writer", args([("value", Value::from(2))]));
        Ok(())
    }));
    registry.register(Blueprint::new("writer", |ctx, ns| {
        let counter = ctx.read_state(ns, "Counter", ReadFlags::default())?;
        let value = ctx.arg("value").cloned().unwrap_or_default();
        ctx.set(&counter, "value", value)?;
        Ok(())
    }));

    let graph = expand(Arc::new(registry), Namespace::new("top"), "board", Vec::new(), 10, true).unwrap();
    assert_eq!(graph.errors().len(), 1);
    assert!(matches!(&graph.errors()[0], BuildError::Conflict(c) if c.contributors.len() == 2));
}

#[test]
fn test_duplicate_object_fails_strict_expansion() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("root", |ctx, _| {
        ctx.add_subexpansion("shared", "left", Args::new());
        ctx.add_subexpansion("shared", "right", Args::new());
        Ok(())
    }));
    for name in ["left", "right"] {
        registry.register(Blueprint::new(name, |ctx, ns| {
            ctx.add_object(ns.child("obj"), "device", Args::new());
            Ok(())
        }));
    }
    let registry = Arc::new(registry);

    match Builder::new(Arc::clone(&registry)).expand(Namespace::root(), "root", Vec::new()) {
        Err(ExpandError::Failed { errors }) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(
                errors[0],
                BuildError::DuplicateObject {
                    name: Namespace::new("shared.obj"),
                    first: "left".to_string(),
                    second: "right".to_string(),
                }
            );
        }
        other => panic!("expected strict failure, got {:?}", other.map(|g| g.passes())),
    }

    let graph = Builder::new(registry)
        .with_config(ExpandConfig::default().ignoring_errors())
        .expand(Namespace::root(), "root", Vec::new())
        .unwrap();
    assert_eq!(graph.errors().len(), 1);
    assert_eq!(graph.object(&Namespace::new("shared.obj")).map(|o| o.declared_by.as_str()), Some("left"));
}

#[test]
fn test_callback_failure_does_not_stop_batch() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("root", |ctx, ns| {
        let first = ns.child("n1");
        let second = ns.child("n2");
        ctx.add_object(first.clone(), "device", Args::new());
        ctx.add_object(second.clone(), "device", Args::new());
        ctx.register_post_instantiate(first, |_, _, _| Err(HostError::new("device n1 broke")), Args::new());
        ctx.register_post_instantiate(
            second,
            |cb, ns, _| {
                let id = cb.object(ns)?;
                cb.set_attribute(id, "ready", AttrValue::Bool(true))
            },
            Args::new(),
        );
        Ok(())
    }));

    let graph = Builder::new(Arc::new(registry))
        .expand(Namespace::new("sys"), "root", Vec::new())
        .unwrap();
    let mut host = RecordingHost::default();

    match instantiate(&graph, &mut host, "") {
        Err(InstantiateError::Callbacks { failures, realized }) => {
            assert_eq!(
                failures,
                vec![CallbackFailure {
                    namespace: Namespace::new("sys.n1"),
                    message: "device n1 broke".to_string(),
                }]
            );
            let n2 = realized.get(&Namespace::new("sys.n2")).unwrap();
            assert_eq!(host.writes, vec![(n2, "ready".to_string(), AttrValue::Bool(true))]);
        }
        other => panic!("expected callback failure, got {:?}", other.map(|r| r.len())),
    }
}

#[test]
fn test_panicking_callback_is_contained() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("root", |ctx, ns| {
        ctx.add_object(ns.clone(), "device", Args::new());
        ctx.register_post_instantiate(ns.clone(), |_, _, _| panic!("callback exploded"), Args::new());
        Ok(())
    }));

    let graph = Builder::new(Arc::new(registry))
        .expand(Namespace::new("dev"), "root", Vec::new())
        .unwrap();
    let mut host = RecordingHost::default();

    match instantiate(&graph, &mut host, "") {
        Err(InstantiateError::Callbacks { failures, .. }) => {
            assert_eq!(failures.len(), 1);
            assert!(failures[0].message.contains("callback exploded"));
        }
        other => panic!("expected callback failure, got {:?}", other.map(|r| r.len())),
    }
}

#[test]
fn test_host_rejection_skips_callbacks() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("root", |ctx, ns| {
        ctx.add_object(ns.clone(), "device", Args::new());
        ctx.register_post_instantiate(
            ns.clone(),
            |cb, ns, _| {
                let id = cb.object(ns)?;
                cb.set_attribute(id, "touched", AttrValue::Bool(true))
            },
            Args::new(),
        );
        Ok(())
    }));

    let graph = Builder::new(Arc::new(registry))
        .expand(Namespace::new("dev"), "root", Vec::new())
        .unwrap();
    let mut host = RecordingHost {
        reject: true,
        ..Default::default()
    };

    assert!(matches!(instantiate(&graph, &mut host, ""), Err(InstantiateError::Rejected(_))));
    assert!(host.writes.is_empty());
}

#[test]
fn test_late_producer_seen_by_earlier_consumer() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("root", |ctx, _| {
        ctx.add_subexpansion("cons", "consumer", Args::new());
        ctx.add_subexpansion("prod", "producer", Args::new());
        Ok(())
    }));
    registry.register(Blueprint::new("consumer", |ctx, ns| {
        let seen = match ctx.read_state(&Namespace::new("prod"), "Counter", ReadFlags::default()) {
            Ok(counter) => ctx.get(&counter, "value")?,
            Err(_) => Value::Null,
        };
        ctx.add_object(ns.clone(), "probe", [("seen", seen)]);
        Ok(())
    }));
    registry.register(Blueprint::new("producer", |ctx, ns| {
        let counter = ctx.expose_state(ns, "Counter")?;
        ctx.set(&counter, "value", 42)?;
        Ok(())
    }));

    let graph = Builder::new(Arc::new(registry))
        .expand(Namespace::root(), "root", Vec::new())
        .unwrap();

    assert_eq!(attr(&graph, "cons", "seen"), Some(&Value::Int(42)));
    // Pass 2 reproduces what pass 1 proposed, so no third pass runs
    assert_eq!(graph.passes(), 2);
}

#[test]
fn test_derived_state_settles_one_pass_per_stage() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("root", |ctx, _| {
        ctx.add_subexpansion("reader", "reader", Args::new());
        ctx.add_subexpansion("mid", "mid", Args::new());
        ctx.add_subexpansion("prod", "producer", Args::new());
        Ok(())
    }));
    registry.register(Blueprint::new("reader", |ctx, ns| {
        let seen = match ctx.read_state(&Namespace::new("mid"), "Counter", ReadFlags::default()) {
            Ok(counter) => ctx.get(&counter, "value")?,
            Err(_) => Value::Null,
        };
        ctx.add_object(ns.clone(), "probe", [("seen", seen)]);
        Ok(())
    }));
    registry.register(Blueprint::new("mid", |ctx, ns| {
        let own = ctx.expose_state(ns, "Counter")?;
        let upstream = match ctx.read_state(&Namespace::new("prod"), "Counter", ReadFlags::default()) {
            Ok(counter) => ctx.get(&counter, "value")?.as_int().unwrap_or(0),
            Err(_) => 0,
        };
        ctx.set(&own, "value", upstream + 1)?;
        Ok(())
    }));
    registry.register(Blueprint::new("producer", |ctx, ns| {
        let counter = ctx.expose_state(ns, "Counter")?;
        ctx.set(&counter, "value", 42)?;
        Ok(())
    }));

    let graph = Builder::new(Arc::new(registry))
        .expand(Namespace::root(), "root", Vec::new())
        .unwrap();

    assert_eq!(attr(&graph, "reader", "seen"), Some(&Value::Int(43)));
    assert_eq!(graph.state_value(&Namespace::new("mid"), "Counter", "value"), Some(Value::Int(43)));
    assert_eq!(graph.passes(), 3);
    assert!(!graph.has_errors());
}

#[test]
fn test_nan_write_converges() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("root", |ctx, ns| {
        let counter = ctx.expose_state(ns, "Counter")?;
        ctx.set(&counter, "value", f64::NAN)?;
        ctx.set(&counter, "value", f64::NAN)?;
        Ok(())
    }));

    let graph = Builder::new(Arc::new(registry))
        .expand(Namespace::new("n"), "root", Vec::new())
        .unwrap();

    assert_eq!(graph.passes(), 2);
    assert!(!graph.has_errors());
    let value = graph.state_value(&Namespace::new("n"), "Counter", "value");
    assert!(value.and_then(|v| v.as_float()).is_some_and(f64::is_nan));
}

#[test]
fn test_root_blueprint_tag_kept_without_prefix() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("top", |ctx, ns| {
        ctx.add_object(ns.child("dev"), "device", Args::new());
        Ok(())
    }));

    let graph = Builder::new(Arc::new(registry))
        .expand(Namespace::root(), "top", Vec::new())
        .unwrap();
    let mut host = RecordingHost::default();
    let created = instantiate(&graph, &mut host, "").unwrap();

    assert_eq!(host.created.len(), 1);
    assert_eq!(created.get(&Namespace::root()), None);
    assert_eq!(created.blueprint_at(&Namespace::root()), Some("top"));
}

#[test]
fn test_private_default_only_when_allowed() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("probe", |ctx, ns| {
        let private = ctx.read_state(ns, "Board", ReadFlags::private_default())?;
        let cores = ctx.get(&private, "cores")?;
        let strict = ctx.read_state(ns, "Board", ReadFlags::default());
        ctx.add_object(
            ns.clone(),
            "probe",
            [
                ("cores", cores),
                ("strict_missing", Value::from(matches!(strict, Err(BuildError::StateNotFound { .. })))),
            ],
        );
        Ok(())
    }));

    let graph = Builder::new(Arc::new(registry))
        .expand(Namespace::new("p"), "probe", Vec::new())
        .unwrap();

    assert_eq!(attr(&graph, "p", "cores"), Some(&Value::Int(2)));
    assert_eq!(attr(&graph, "p", "strict_missing"), Some(&Value::Bool(true)));
    let instance = graph
        .instances()
        .get(&StateKey::new(Namespace::new("p"), "Board"))
        .unwrap();
    assert!(instance.is_private());
}

#[test]
fn test_missing_state_is_recorded() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("probe", |ctx, ns| {
        ctx.read_state(ns, "Board", ReadFlags::default())?;
        Ok(())
    }));

    match Builder::new(Arc::new(registry)).expand(Namespace::new("p"), "probe", Vec::new()) {
        Err(ExpandError::Failed { errors }) => {
            assert!(matches!(errors.as_slice(), [BuildError::StateNotFound { .. }]));
        }
        other => panic!("expected failure, got {:?}", other.map(|g| g.passes())),
    }
}

#[test]
fn test_binding_read_twice_is_an_error() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("root", |ctx, ns| {
        let irq = ctx.expose_state(ns, "Irq")?;
        ctx.set(&irq, "line", 3)?;
        ctx.add_subexpansion(ns.child("a"), "reader", Args::new());
        ctx.add_subexpansion(ns.child("b"), "reader", Args::new());
        Ok(())
    }));
    registry.register(Blueprint::new("reader", |ctx, ns| {
        let irq = ctx.read_state(ns, "Irq", ReadFlags::default())?;
        let line = ctx.get(&irq, "line")?;
        ctx.add_object(ns.clone(), "irq_user", [("line", line)]);
        Ok(())
    }));

    let graph = expand(Arc::new(registry), Namespace::new("pic"), "root", Vec::new(), 10, true).unwrap();

    assert_eq!(attr(&graph, "pic.a", "line"), Some(&Value::Int(3)));
    assert!(graph.object(&Namespace::new("pic.b")).is_none());
    assert!(matches!(graph.errors(), [BuildError::BindingReread { .. }]));
}

#[test]
fn test_config_is_read_only_for_readers() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("board", |ctx, ns| {
        ctx.expose_state(ns, "Board")?;
        ctx.add_subexpansion(ns.child("cpu"), "cpu", Args::new());
        Ok(())
    }));
    registry.register(Blueprint::new("cpu", |ctx, ns| {
        let board = ctx.read_state(ns, "Board", ReadFlags::default())?;
        let denied = matches!(ctx.set(&board, "cores", 64), Err(BuildError::ReadOnly { .. }));
        ctx.add_object(ns.clone(), "cpu", [("denied", denied)]);
        Ok(())
    }));

    let root = Namespace::new("board");
    let graph = Builder::new(Arc::new(registry))
        .expand(root.clone(), "board", Vec::new())
        .unwrap();

    assert_eq!(attr(&graph, "board.cpu", "denied"), Some(&Value::Bool(true)));
    assert_eq!(graph.state_value(&root, "Board", "cores"), Some(Value::Int(2)));
}

#[test]
fn test_container_contributions_merge() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("bus", |ctx, ns| {
        ctx.expose_state(ns, "Bus")?;
        ctx.add_subexpansion(ns.child("uart"), "device", args([("irq", Value::from(4))]));
        ctx.add_subexpansion(ns.child("timer"), "device", args([("irq", Value::from(5))]));
        Ok(())
    }));
    registry.register(Blueprint::new("device", |ctx, ns| {
        let bus = ctx.read_state(ns, "Bus", ReadFlags::default())?;
        ctx.append(&bus, "devices", ns.name())?;
        ctx.add_to_set(&bus, "tags", "mmio")?;
        let irq = ctx.arg("irq").cloned().unwrap_or_default();
        ctx.insert(&bus, "irqs", ns.name(), irq)?;
        Ok(())
    }));

    let root = Namespace::new("bus");
    let graph = Builder::new(Arc::new(registry))
        .expand(root.clone(), "bus", Vec::new())
        .unwrap();

    assert_eq!(
        graph.state_value(&root, "Bus", "devices"),
        Some(Value::from(vec!["uart", "timer"]))
    );
    assert_eq!(graph.state_value(&root, "Bus", "tags"), Some(Value::from(vec!["mmio"])));
    assert_eq!(
        graph.state_value(&root, "Bus", "irqs"),
        Some([("timer", 5), ("uart", 4)].into_iter().collect())
    );
    assert!(!graph.has_errors());
}

#[test]
fn test_container_operation_on_scalar_field() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("root", |ctx, ns| {
        let counter = ctx.expose_state(ns, "Counter")?;
        ctx.append(&counter, "value", 1)?;
        Ok(())
    }));

    let graph = expand(Arc::new(registry), Namespace::new("c"), "root", Vec::new(), 10, true).unwrap();
    assert!(matches!(graph.errors(), [BuildError::Store(_)]));
}

#[test]
fn test_writes_outside_subtree_are_rejected() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("root", |ctx, _| {
        ctx.add_subexpansion("a", "intruder", Args::new());
        Ok(())
    }));
    registry.register(Blueprint::new("intruder", |ctx, _| {
        ctx.add_object("b.x", "device", Args::new());
        ctx.add_subexpansion("b", "intruder", Args::new());
        ctx.expose_state(&Namespace::new("b"), "Counter")?;
        Ok(())
    }));

    let graph = expand(Arc::new(registry), Namespace::root(), "root", Vec::new(), 10, true).unwrap();

    assert!(graph.objects().is_empty());
    assert_eq!(graph.errors().len(), 3);
    assert!(graph
        .errors()
        .iter()
        .all(|e| matches!(e, BuildError::OutsideSubtree { .. })));
}

#[test]
fn test_set_attributes_on_declared_object() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("root", |ctx, ns| {
        let dev = ns.child("dev");
        ctx.add_object(dev.clone(), "device", [("size", 1)]);
        ctx.set_attributes(&dev, [("size", 2), ("base", 4096)]);
        ctx.set_attributes(&ns.child("ghost"), [("size", 3)]);
        Ok(())
    }));

    let graph = expand(Arc::new(registry), Namespace::new("m"), "root", Vec::new(), 10, true).unwrap();

    assert_eq!(attr(&graph, "m.dev", "size"), Some(&Value::Int(2)));
    assert_eq!(attr(&graph, "m.dev", "base"), Some(&Value::Int(4096)));
    assert!(matches!(graph.errors(), [BuildError::UnknownObject(_)]));
}

#[test]
fn test_alias_state_redirects_fields() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("root", |ctx, ns| {
        let clock = ctx.expose_state(ns, "Clock")?;
        ctx.set(&clock, "freq", 300)?;
        let timing = ctx.nested(&clock, "timing")?;
        ctx.set(&timing, "skew", 7)?;
        ctx.alias_state(&ns.child("mirror"), &clock)?;
        Ok(())
    }));

    let graph = Builder::new(Arc::new(registry))
        .expand(Namespace::new("soc"), "root", Vec::new())
        .unwrap();

    let mirror = Namespace::new("soc.mirror");
    assert_eq!(graph.state_value(&mirror, "Clock", "freq"), Some(Value::Int(300)));
    let nested_skew = ValueKey::new(StateKey::new(mirror, "Clock"), vec!["timing".to_string()], "skew");
    assert_eq!(graph.value(&nested_skew), Some(Value::Int(7)));
}

#[test]
fn test_alias_cycle_is_reported() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("root", |ctx, ns| {
        let a = ctx.expose_state(&ns.child("a"), "Counter")?;
        let b = ctx.expose_state(&ns.child("b"), "Counter")?;
        ctx.alias_field(&a, "value", &b, "value")?;
        ctx.alias_field(&b, "value", &a, "value")?;
        Ok(())
    }));

    let graph = expand(Arc::new(registry), Namespace::new("x"), "root", Vec::new(), 10, true).unwrap();
    assert!(matches!(
        graph.errors(),
        [BuildError::Store(void_state::StoreError::AliasCycle { .. })]
    ));
}

#[test]
fn test_presets_added_during_expansion() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("board", |ctx, ns| {
        ctx.expose_state(ns, "Board")?;
        ctx.add_presets([Preset::new(StateKey::new(ns.clone(), "Board").field("cores"), 4)]);
        Ok(())
    }));

    let root = Namespace::new("b");
    let graph = Builder::new(Arc::new(registry))
        .expand(root.clone(), "board", Vec::new())
        .unwrap();

    assert_eq!(graph.state_value(&root, "Board", "cores"), Some(Value::Int(4)));
    assert_eq!(graph.passes(), 3);
}

#[test]
fn test_pass_cap_from_toml_config() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("board", |ctx, ns| {
        ctx.expose_state(ns, "Board")?;
        Ok(())
    }));

    let config = ExpandConfig::from_toml_str("[expansion]\nmax_iterations = 1\n").unwrap();
    let result = Builder::new(Arc::new(registry))
        .with_config(config)
        .expand(Namespace::new("b"), "board", Vec::new());
    assert!(matches!(result, Err(ExpandError::MaxIterationsExceeded { limit: 1 })));
}

#[test]
fn test_intermediate_namespaces_are_synthesized() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("rack", |ctx, ns| {
        ctx.add_object(ns.child("shelf").child("node"), "server", Args::new());
        Ok(())
    }));

    let graph = Builder::new(Arc::new(registry))
        .expand(Namespace::new("machine"), "rack", Vec::new())
        .unwrap();
    let mut host = RecordingHost::default();
    instantiate(&graph, &mut host, "sys").unwrap();

    let summary: Vec<(&str, &str, bool)> = host
        .created
        .iter()
        .map(|s| (s.name.as_str(), s.class.as_str(), s.synthesized))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("sys", "namespace", true),
            ("sys.machine", "namespace", true),
            ("sys.machine.shelf", "namespace", true),
            ("sys.machine.shelf.node", "server", false),
        ]
    );
    assert_eq!(host.created[1].blueprint.as_deref(), Some("rack"));
}

#[test]
fn test_port_reference_resolved_after_creation() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("root", |ctx, ns| {
        let cpu = ns.child("cpu");
        ctx.add_object(cpu.clone(), "cpu", Args::new());
        ctx.add_object(ns.child("uart"), "uart", [("irq", Value::reference(cpu.child("irq")))]);
        ctx.register_post_instantiate(
            ns.clone(),
            |cb, _, kwargs| {
                let target = kwargs
                    .get("line")
                    .and_then(AttrValue::as_object)
                    .cloned()
                    .ok_or_else(|| HostError::new("missing line"))?;
                let id = cb.realize(&target)?;
                cb.set_attribute(id, "wired", AttrValue::Bool(true))
            },
            args([("line", Value::reference(cpu.child("irq")))]),
        );
        Ok(())
    }));

    let graph = Builder::new(Arc::new(registry))
        .expand(Namespace::new("m"), "root", Vec::new())
        .unwrap();

    let mut host = RecordingHost::default();
    // m (synthesized), m.cpu, m.uart are created as #0, #1, #2
    host.attrs.insert(
        (ObjectId(1), "irq".to_string()),
        AttrValue::Object(ObjectRef::Realized(ObjectId(99))),
    );
    instantiate(&graph, &mut host, "").unwrap();

    assert_eq!(
        host.created[2].attrs.get("irq"),
        Some(&AttrValue::Object(ObjectRef::Port {
            base: Box::new(ObjectRef::Staged(StagedHandle(1))),
            path: vec!["irq".to_string()],
        }))
    );
    assert_eq!(host.writes, vec![(ObjectId(99), "wired".to_string(), AttrValue::Bool(true))]);
}

#[test]
fn test_unknown_reference_passes_through() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("root", |ctx, ns| {
        ctx.add_object(ns.clone(), "device", [("peer", Value::reference("elsewhere.dev"))]);
        Ok(())
    }));

    let graph = Builder::new(Arc::new(registry))
        .expand(Namespace::new("m"), "root", Vec::new())
        .unwrap();
    let mut host = RecordingHost::default();
    instantiate(&graph, &mut host, "").unwrap();

    assert_eq!(
        host.created[0].attrs.get("peer"),
        Some(&AttrValue::Object(ObjectRef::External("elsewhere.dev".to_string())))
    );
}

#[test]
fn test_active_expansion_visible_inside_blueprint() {
    init_logging();
    let mut registry = base_registry();
    registry.register(Blueprint::new("probe", |ctx, ns| {
        let current = active::current().ok_or("no active expansion")?;
        ctx.add_object(
            ns.clone(),
            "probe",
            [
                ("root", Value::from(current.root.as_str())),
                ("blueprint", Value::from(current.blueprint)),
                ("pass", Value::from(current.pass)),
            ],
        );
        Ok(())
    }));

    let graph = Builder::new(Arc::new(registry))
        .expand(Namespace::new("probe"), "probe", Vec::new())
        .unwrap();

    assert_eq!(attr(&graph, "probe", "root"), Some(&Value::from("probe")));
    assert_eq!(attr(&graph, "probe", "blueprint"), Some(&Value::from("probe")));
    assert_eq!(attr(&graph, "probe", "pass"), Some(&Value::Int(1)));
    assert_eq!(active::current(), None);
}

#[test]
fn test_parameters_drive_expansion() {
    init_logging();
    let mut registry = base_registry();
    registry.register(
        Blueprint::new("board", |ctx, ns| {
            let board = ctx.expose_state(ns, "Board")?;
            let cores = ctx.get(&board, "cores")?.as_int().unwrap_or(0);
            for index in 0..cores.max(0) as usize {
                ctx.add_object(ns.indexed("core", index), "core", Args::new());
            }
            Ok(())
        })
        .with_param(ParamDecl::leaf("cores", "Board", "cores")),
    );

    let root = Namespace::new("board");
    let values = Value::from_json(serde_json::json!({"cores": 3}));
    let presets = preset_from_nested_values(&registry, "board", &root, &values).unwrap();

    let graph = Builder::new(Arc::new(registry))
        .expand(root, "board", presets)
        .unwrap();
    assert_eq!(graph.objects().len(), 3);
    assert!(graph.object(&Namespace::new("board.core[2]")).is_some());
}
