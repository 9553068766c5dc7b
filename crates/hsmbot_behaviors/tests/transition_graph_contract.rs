use hsmbot_behaviors::{drop_object, pick_up_cube, PickupConfig};
use hsmbot_core::error::ErrorKind;
use hsmbot_core::services::Services;
use hsmbot_core::{Dispatcher, EngineConfig, TransitionKind};

fn pickup_graph(config: &PickupConfig) -> hsmbot_core::TransitionGraph {
    let root = pick_up_cube("pickup", config).expect("pickup graph should build");
    Dispatcher::new(root, Services::inert(), EngineConfig::default())
        .expect("dispatcher should accept the pickup graph")
        .graph()
}

#[test]
fn every_edge_names_siblings_of_its_owner() {
    let graph = pickup_graph(&PickupConfig::default());

    for edge in &graph.transitions {
        let owner = graph.node(&edge.owner).expect("owner should exist");
        for name in edge.sources.iter().chain(&edge.destinations) {
            let sibling = graph
                .node(&format!("{}.{name}", edge.owner))
                .expect("edge endpoint should be a child of the owner");
            assert_eq!(sibling.parent, Some(owner.id));
        }
    }

    let root = graph.node("pickup").expect("root");
    assert_eq!(root.kind, "PickUpCube");
    assert!(graph.node("pickup.goto_cube").is_some_and(|n| n.initial));
    assert!(graph.node("pickup.goto_cube.droplift").is_some_and(|n| n.initial));
    assert_eq!(graph.node("pickup.goto_cube").map(|n| n.kind), Some("GoToCube"));
}

#[test]
fn pickup_graph_renders_in_arrow_notation() {
    let rendered = pickup_graph(&PickupConfig::default()).render();

    assert!(rendered.contains("[pickup]\n"));
    assert!(rendered.contains("[pickup.goto_cube]\n"));
    assert!(rendered.contains("  goto_cube =ESC=> forward_conflict\n"));
    assert!(rendered.contains("  raise_lift,raise_head2 =C=> verify\n"));
    assert!(rendered.contains("  verify3 =F=> frustrated\n"));
    assert!(rendered.contains("  retry1 =T(0.5)=> verify2\n"));
    assert!(rendered.contains("  droplift =F=> waitlift,looker\n"));
    assert!(rendered.contains("  check_start2 =F=> start_blocked\n"));
}

#[test]
fn verify_attempts_shape_the_retry_chain() {
    let config = PickupConfig {
        verify_attempts: 1,
        ..PickupConfig::default()
    };
    let graph = pickup_graph(&config);
    assert!(graph.node("pickup.verify").is_some());
    assert!(graph.node("pickup.verify2").is_none());
    assert!(graph.node("pickup.retry1").is_none());

    let into_frustrated: Vec<_> = graph
        .edges_of("pickup")
        .filter(|e| e.destinations == ["frustrated"])
        .collect();
    assert_eq!(into_frustrated.len(), 1);
    assert_eq!(into_frustrated[0].kind, TransitionKind::Failure);
    assert_eq!(into_frustrated[0].sources, ["verify"]);

    let none = PickupConfig {
        verify_attempts: 0,
        ..PickupConfig::default()
    };
    let e = pick_up_cube("pickup", &none).unwrap_err();
    assert_eq!(e.kind, ErrorKind::InvalidArgument);
}

#[test]
fn drop_object_joins_backup_and_lookdown() {
    let root = drop_object("drop").expect("drop graph should build");
    let graph = Dispatcher::new(root, Services::inert(), EngineConfig::default())
        .expect("dispatcher")
        .graph();
    let join: Vec<_> = graph
        .edges_of("drop")
        .filter(|e| e.sources.len() == 2)
        .collect();
    assert_eq!(join.len(), 1);
    assert_eq!(join[0].sources, ["backup", "lookdown"]);
    assert_eq!(join[0].destinations, ["done"]);
}
