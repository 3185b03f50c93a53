use patchbay_core::script::{Violation, audit};
use patchbay_core::{
    CableSpec, Link, NodeId, NodeSpec, PatchError, PlugId, PlugSpec, RecordingUnit, Route, Scene,
    SceneConfig, SceneEvent, SceneEventTag, SignalKind, UnitCall, UnitLog,
};

// ─── Helpers ──────────────────────────────────────────────────────────────────

struct Rig {
    scene: Scene,
    log: UnitLog,
}

impl Rig {
    fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    fn with_config(config: SceneConfig) -> Self {
        let mut scene = Scene::new(config);
        for spec in [
            NodeSpec::new("oscillator")
                .with_id("x")
                .output(PlugSpec::new("x.out", SignalKind::Audio)),
            NodeSpec::new("filter")
                .with_id("y")
                .input(PlugSpec::new("y.in", SignalKind::Audio))
                .output(PlugSpec::new("y.out", SignalKind::Audio)),
            NodeSpec::new("speaker")
                .with_id("z")
                .input(PlugSpec::new("z.in", SignalKind::Audio)),
        ] {
            scene.add_node(spec).unwrap();
        }
        Self {
            scene,
            log: UnitLog::new(),
        }
    }

    /// Mount and give a recording unit to each node.
    fn ready(&mut self, nodes: &[&str]) {
        for node in nodes {
            self.scene.mount(&id(node)).unwrap();
            self.init(node);
        }
    }

    fn init(&mut self, node: &str) {
        let unit = RecordingUnit::new(node, &self.log).shared();
        self.scene.set_unit(&id(node), unit).unwrap();
    }

    fn cable(&mut self, cable: &str, source: &str, dest: &str) {
        self.scene
            .connect(CableSpec::new(source, dest, SignalKind::Audio).with_id(cable))
            .unwrap();
    }

    /// Node m with two inputs, m.a and m.b.
    fn add_mixer(&mut self) {
        self.scene
            .add_node(
                NodeSpec::new("mixer")
                    .with_id("m")
                    .input(PlugSpec::new("m.a", SignalKind::Audio))
                    .input(PlugSpec::new("m.b", SignalKind::Audio)),
            )
            .unwrap();
    }

    /// Scenario A state: x.out -> y.in live, log cleared.
    fn live_pair() -> Self {
        let mut rig = Self::new();
        rig.ready(&["x", "y"]);
        rig.cable("c1", "x.out", "y.in");
        rig.scene.flush();
        assert_eq!(rig.log.connects(), 1);
        rig.log.take();
        rig
    }

    fn assert_consistent(&self) {
        assert_eq!(audit(&self.scene), Vec::<Violation>::new());
    }
}

fn id(node: &str) -> NodeId {
    NodeId::from(node)
}

/// Link from `source`'s first output to `dest`'s first input in the rig.
fn link(cable: &str, source: &str, dest: &str) -> Link {
    plug_link(cable, &format!("{source}.out"), &format!("{dest}.in"))
}

fn plug_link(cable: &str, source_plug: &str, dest_plug: &str) -> Link {
    let owner = |plug: &str| plug.split('.').next().unwrap_or(plug).to_string();
    Link {
        cable: cable.into(),
        source: owner(source_plug).into(),
        dest: owner(dest_plug).into(),
        source_plug: source_plug.into(),
        dest_plug: dest_plug.into(),
    }
}

fn route(output: u32, input: u32) -> Route {
    Route {
        output,
        input,
        kind: SignalKind::Audio,
    }
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[test]
fn scenario_a_connect_mounted_nodes() {
    let mut rig = Rig::new();
    rig.ready(&["x", "y"]);
    rig.cable("c1", "x.out", "y.in");
    assert!(rig.log.is_empty(), "nothing happens before the flush");

    let report = rig.scene.flush();
    assert_eq!(report.linked, vec![link("c1", "x", "y")]);
    assert_eq!(
        rig.log.snapshot(),
        vec![UnitCall::Connect {
            from: "x".into(),
            to: "y".into(),
            route: route(0, 0),
        }]
    );
    assert_eq!(rig.scene.live_connections(), vec![link("c1", "x", "y")]);
    rig.assert_consistent();
}

#[test]
fn scenario_b_destroy_destination() {
    let mut rig = Rig::live_pair();

    let report = rig.scene.destroy(&id("y")).unwrap();
    assert_eq!(report.removed_cables, vec!["c1".into()]);
    assert_eq!(report.unlinked, vec![link("c1", "x", "y")]);
    assert_eq!(report.failures, 0);
    assert_eq!(rig.log.disconnects(), 1);
    assert_eq!(rig.log.connects(), 0);

    let out = rig.scene.plug(&"x.out".into()).unwrap();
    assert!(out.cable_ids().is_empty());
    assert!(rig.scene.cable(&"c1".into()).is_none());

    rig.scene.flush();
    assert_eq!(rig.log.len(), 1, "flush after destroy makes no further calls");
    rig.assert_consistent();
}

#[test]
fn scenario_c_cable_before_destination_mounts() {
    let mut rig = Rig::new();
    rig.ready(&["x"]);
    rig.init("y");
    rig.cable("c1", "x.out", "y.in");

    rig.scene.flush();
    assert_eq!(rig.log.connects(), 0);
    assert_eq!(rig.scene.pending_cables(), vec!["c1".into()]);

    rig.scene.mount(&id("y")).unwrap();
    rig.scene.flush();
    assert_eq!(rig.log.connects(), 1);
    assert!(rig.scene.pending_cables().is_empty());
    rig.assert_consistent();
}

#[test]
fn scenario_d_connect_then_disconnect_in_one_tick() {
    let mut rig = Rig::new();
    rig.ready(&["x", "y"]);
    rig.scene.flush();
    let events = rig.scene.subscribe();

    rig.cable("c1", "x.out", "y.in");
    rig.scene.disconnect(&"c1".into()).unwrap();
    let report = rig.scene.flush();

    assert!(rig.log.is_empty());
    assert!(report.linked.is_empty() && report.unlinked.is_empty());

    // Both transitions are still reported, in order.
    let tags: Vec<SceneEventTag> = events.try_iter().map(|e| e.tag()).collect();
    assert_eq!(
        tags,
        vec![SceneEventTag::CableConnected, SceneEventTag::CableDisconnected]
    );
}

// ─── Reconciliation properties ───────────────────────────────────────────────

#[test]
fn reconciliation_is_idempotent() {
    let mut rig = Rig::live_pair();

    assert_eq!(rig.scene.flush().runs, 0);

    // Remounting re-registers every plug and re-runs the effect, but nothing
    // has changed, so no unit is called.
    rig.scene.mount(&id("x")).unwrap();
    rig.scene.mount(&id("y")).unwrap();
    let report = rig.scene.flush();
    assert!(report.runs > 0);
    assert!(rig.log.is_empty());
    assert_eq!(rig.scene.live_connections().len(), 1);
}

#[test]
fn remove_and_readd_same_cable_keeps_one_connection() {
    let mut rig = Rig::live_pair();

    rig.scene.disconnect(&"c1".into()).unwrap();
    rig.cable("c1", "x.out", "y.in");
    rig.scene.flush();

    assert!(rig.log.is_empty());
    assert_eq!(rig.scene.live_connections(), vec![link("c1", "x", "y")]);
    rig.assert_consistent();
}

#[test]
fn readd_same_cable_to_other_input_moves_connection() {
    let mut rig = Rig::new();
    rig.add_mixer();
    rig.ready(&["x", "m"]);
    rig.cable("c1", "x.out", "m.a");
    rig.scene.flush();
    rig.log.take();

    rig.scene.disconnect(&"c1".into()).unwrap();
    rig.cable("c1", "x.out", "m.b");
    let report = rig.scene.flush();

    assert_eq!(
        rig.log.take(),
        vec![
            UnitCall::Disconnect {
                from: "x".into(),
                to: "m".into(),
                route: route(0, 0),
            },
            UnitCall::Connect {
                from: "x".into(),
                to: "m".into(),
                route: route(0, 1),
            },
        ]
    );
    assert_eq!(report.unlinked, vec![plug_link("c1", "x.out", "m.a")]);
    assert_eq!(report.linked, vec![plug_link("c1", "x.out", "m.b")]);
    assert_eq!(
        rig.scene.live_connections(),
        vec![plug_link("c1", "x.out", "m.b")]
    );
    rig.assert_consistent();
}

#[test]
fn replaced_cable_disconnects_before_connecting() {
    let mut rig = Rig::live_pair();

    rig.scene.disconnect(&"c1".into()).unwrap();
    rig.cable("c2", "x.out", "y.in");
    rig.scene.flush();

    let calls = rig.log.take();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].is_disconnect());
    assert!(calls[1].is_connect());
    assert_eq!(rig.scene.live_connections(), vec![link("c2", "x", "y")]);
}

#[test]
fn reversed_drag_is_normalized() {
    let mut rig = Rig::new();
    rig.ready(&["x", "y"]);
    rig.cable("c1", "y.in", "x.out");

    let cable = rig.scene.cable(&"c1".into()).unwrap();
    assert_eq!(cable.source, PlugId::from("x.out"));
    assert_eq!(cable.dest, PlugId::from("y.in"));

    rig.scene.flush();
    assert_eq!(rig.scene.live_connections(), vec![link("c1", "x", "y")]);
}

#[test]
fn mismatched_cables_are_rejected() {
    let mut rig = Rig::new();

    assert!(matches!(
        rig.scene
            .connect(CableSpec::new("x.out", "y.in", SignalKind::Control)),
        Err(PatchError::KindMismatch { .. })
    ));
    assert!(matches!(
        rig.scene.connect(CableSpec::new("x.out", "y.out", SignalKind::Audio)),
        Err(PatchError::DirectionMismatch { .. })
    ));
    assert_eq!(rig.scene.cables().count(), 0);
}

#[test]
fn route_uses_plug_positions() {
    let mut rig = Rig::new();
    rig.add_mixer();
    rig.ready(&["x", "m"]);
    rig.cable("c1", "x.out", "m.b");
    rig.scene.flush();

    assert_eq!(
        rig.log.snapshot(),
        vec![UnitCall::Connect {
            from: "x".into(),
            to: "m".into(),
            route: route(0, 1),
        }]
    );
}

#[test]
fn destination_waits_for_its_unit() {
    let mut rig = Rig::new();
    rig.ready(&["x"]);
    rig.scene.mount(&id("y")).unwrap();
    rig.cable("c1", "x.out", "y.in");
    rig.scene.flush();
    assert_eq!(rig.log.connects(), 0);

    rig.init("y");
    rig.scene.flush();
    assert_eq!(rig.log.connects(), 1);
    rig.assert_consistent();
}

// ─── Mount and unit lifecycle ────────────────────────────────────────────────

#[test]
fn unmounting_destination_tears_down_and_remount_restores() {
    let mut rig = Rig::live_pair();

    rig.scene.unmount(&id("y")).unwrap();
    rig.scene.flush();
    assert_eq!(rig.log.disconnects(), 1);
    assert_eq!(rig.scene.pending_cables(), vec!["c1".into()]);

    rig.scene.mount(&id("y")).unwrap();
    rig.scene.flush();
    assert_eq!(rig.log.connects(), 1);
    rig.assert_consistent();
}

#[test]
fn unmounting_source_starts_new_generation() {
    let mut rig = Rig::live_pair();
    let out = PlugId::from("x.out");
    let before = rig.scene.effect_generation(&out).unwrap();

    rig.scene.unmount(&id("x")).unwrap();
    rig.scene.flush();
    assert_eq!(rig.log.disconnects(), 1);
    assert!(rig.scene.live_connections().is_empty());
    let unmounted = rig.scene.effect_generation(&out).unwrap();
    assert!(unmounted > before);

    rig.scene.mount(&id("x")).unwrap();
    rig.scene.flush();
    assert_eq!(rig.log.connects(), 1);
    assert!(rig.scene.effect_generation(&out).unwrap() > unmounted);
    rig.assert_consistent();
}

#[test]
fn replacing_destination_unit_moves_connection() {
    let mut rig = Rig::live_pair();

    let unit = RecordingUnit::new("y2", &rig.log).shared();
    rig.scene.set_unit(&id("y"), unit).unwrap();
    // The old connection goes before the old unit does.
    assert_eq!(
        rig.log.snapshot(),
        vec![UnitCall::Disconnect {
            from: "x".into(),
            to: "y".into(),
            route: route(0, 0),
        }]
    );

    rig.scene.flush();
    assert_eq!(
        rig.log.snapshot().last(),
        Some(&UnitCall::Connect {
            from: "x".into(),
            to: "y2".into(),
            route: route(0, 0),
        })
    );
    assert_eq!(rig.log.len(), 2);
    rig.assert_consistent();
}

#[test]
fn replacing_source_unit_moves_connection() {
    let mut rig = Rig::live_pair();

    let unit = RecordingUnit::new("x2", &rig.log).shared();
    rig.scene.set_unit(&id("x"), unit).unwrap();
    rig.scene.flush();

    let calls = rig.log.take();
    assert_eq!(calls.len(), 2);
    assert!(matches!(&calls[0], UnitCall::Disconnect { from, .. } if from == "x"));
    assert!(matches!(&calls[1], UnitCall::Connect { from, .. } if from == "x2"));
}

#[test]
fn failed_connect_leaves_cable_pending() {
    let mut rig = Rig::new();
    rig.scene.mount(&id("x")).unwrap();
    let unit = RecordingUnit::new("x", &rig.log).failing_connect().shared();
    rig.scene.set_unit(&id("x"), unit).unwrap();
    rig.ready(&["y"]);
    rig.cable("c1", "x.out", "y.in");

    let report = rig.scene.flush();
    assert_eq!(report.failures, 1);
    assert_eq!(rig.scene.pending_cables(), vec!["c1".into()]);
    assert_eq!(
        audit(&rig.scene),
        vec![Violation::Missing(link("c1", "x", "y"))]
    );

    rig.init("x");
    rig.scene.flush();
    assert_eq!(rig.log.connects(), 1);
    rig.assert_consistent();
}

#[test]
fn disconnect_plug_removes_every_cable() {
    let mut rig = Rig::new();
    rig.ready(&["x", "y", "z"]);
    rig.cable("c1", "x.out", "y.in");
    rig.cable("c2", "x.out", "z.in");
    rig.scene.flush();
    assert_eq!(rig.log.connects(), 2);

    let removed = rig.scene.disconnect_plug(&"x.out".into()).unwrap();
    assert_eq!(removed, vec!["c1".into(), "c2".into()]);
    rig.scene.flush();
    assert_eq!(rig.log.disconnects(), 2);
    assert!(rig.scene.live_connections().is_empty());

    assert_eq!(
        rig.scene.disconnect_plug(&"nope".into()),
        Err(PatchError::UnknownPlug("nope".into()))
    );
}

// ─── Destroy ─────────────────────────────────────────────────────────────────

#[test]
fn destroy_middle_node_tears_down_both_sides() {
    let mut rig = Rig::new();
    rig.ready(&["x", "y", "z"]);
    rig.cable("c1", "x.out", "y.in");
    rig.cable("c2", "y.out", "z.in");
    rig.scene.flush();
    rig.log.take();

    let report = rig.scene.destroy(&id("y")).unwrap();
    // Inputs are severed before outputs.
    assert_eq!(report.removed_cables, vec!["c1".into(), "c2".into()]);
    assert_eq!(rig.log.disconnects(), 2);

    assert!(rig.scene.node(&id("y")).is_none());
    assert!(rig.scene.plug(&"y.in".into()).is_none());
    assert!(rig.scene.resolve(&"y.out".into()).is_none());
    assert!(rig.scene.cables_of(&id("y")).is_empty());
    assert_eq!(rig.scene.links_involving(&id("y")), 0);
    assert_eq!(rig.scene.effect_generation(&"y.out".into()), None);
    rig.assert_consistent();
}

#[test]
fn destroy_source_node() {
    let mut rig = Rig::live_pair();

    rig.scene.destroy(&id("x")).unwrap();
    assert_eq!(rig.log.disconnects(), 1);
    assert!(rig.scene.plug(&"y.in".into()).unwrap().cable_ids().is_empty());
    assert!(rig.scene.is_idle(), "the destroyed output's effect is forgotten");
    rig.scene.flush();
    assert_eq!(rig.log.len(), 1);
}

#[test]
fn destroy_catches_connection_of_cable_removed_this_tick() {
    let mut rig = Rig::live_pair();

    rig.scene.disconnect(&"c1".into()).unwrap();
    let report = rig.scene.destroy(&id("y")).unwrap();
    assert!(report.removed_cables.is_empty());
    assert_eq!(report.unlinked, vec![link("c1", "x", "y")]);

    rig.scene.flush();
    assert_eq!(rig.log.disconnects(), 1);
}

#[test]
fn destroy_with_pending_cable_makes_no_calls() {
    let mut rig = Rig::new();
    rig.ready(&["x"]);
    rig.cable("c1", "x.out", "y.in");
    rig.scene.flush();

    let report = rig.scene.destroy(&id("y")).unwrap();
    assert_eq!(report.removed_cables, vec!["c1".into()]);
    assert!(rig.log.is_empty());
}

#[test]
fn failing_disconnect_does_not_block_destroy() {
    let mut rig = Rig::new();
    rig.scene.mount(&id("x")).unwrap();
    let unit = RecordingUnit::new("x", &rig.log)
        .failing_disconnect()
        .shared();
    rig.scene.set_unit(&id("x"), unit).unwrap();
    rig.ready(&["y", "z"]);
    rig.cable("c1", "x.out", "y.in");
    rig.cable("c2", "x.out", "z.in");
    rig.scene.flush();

    let report = rig.scene.destroy(&id("x")).unwrap();
    assert_eq!(report.failures, 2);
    assert_eq!(rig.log.disconnects(), 2, "every teardown is attempted");
    assert!(rig.scene.node(&id("x")).is_none());
    assert_eq!(rig.scene.cables().count(), 0);
    assert!(rig.scene.live_connections().is_empty());
}

#[test]
fn destroy_unknown_node() {
    let mut rig = Rig::new();
    assert_eq!(
        rig.scene.destroy(&id("ghost")),
        Err(PatchError::UnknownNode(id("ghost")))
    );
}

#[test]
fn node_destroyed_is_the_last_event() {
    let mut rig = Rig::live_pair();
    let events = rig.scene.subscribe();

    rig.scene.destroy(&id("y")).unwrap();
    let received: Vec<SceneEvent> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![
            SceneEvent::CableDisconnected { cable: "c1".into() },
            SceneEvent::Unlinked(link("c1", "x", "y")),
            SceneEvent::NodeDestroyed { node: id("y") },
        ]
    );
}

// ─── Scheduling ──────────────────────────────────────────────────────────────

#[test]
fn flush_limit_leaves_remaining_effects_queued() {
    let mut rig = Rig::with_config(SceneConfig {
        flush_limit: 1,
        ..SceneConfig::default()
    });
    rig.ready(&["x", "y", "z"]);
    rig.cable("c1", "x.out", "z.in");
    rig.cable("c2", "y.out", "z.in");

    assert_eq!(rig.scene.flush().runs, 1);
    assert!(!rig.scene.is_idle());
    assert_eq!(rig.scene.flush().runs, 1);
    assert!(rig.scene.is_idle());
    assert_eq!(rig.log.connects(), 2);
}

#[test]
fn zero_flush_limit_still_makes_progress() {
    let mut rig = Rig::with_config(SceneConfig {
        flush_limit: 0,
        ..SceneConfig::default()
    });
    rig.ready(&["x", "y"]);
    rig.cable("c1", "x.out", "y.in");

    let mut flushes = 0;
    while !rig.scene.is_idle() {
        assert_eq!(rig.scene.flush().runs, 1);
        flushes += 1;
        assert!(flushes <= 2, "one output plug per flush");
    }
    assert_eq!(rig.log.connects(), 1);
    rig.assert_consistent();
}

#[test]
fn linked_events_follow_flush() {
    let mut rig = Rig::new();
    rig.ready(&["x", "y"]);
    let events = rig.scene.subscribe();
    rig.cable("c1", "x.out", "y.in");
    rig.scene.flush();

    let tags: Vec<SceneEventTag> = events.try_iter().map(|e| e.tag()).collect();
    assert_eq!(
        tags,
        vec![SceneEventTag::CableConnected, SceneEventTag::Linked]
    );
}
