#![allow(clippy::unwrap_used)]

use meshql::config::{
    BoundaryLayer, MeshAlgorithm2D, StructuralHint, TransfiniteDistribution,
};
use meshql::error::{ConfigError, EngineError, GenerationError, SelectionError};
use meshql::generate::{EngineCall, RecordingEngine};
use meshql::kernel::{BrepBuilder, BrepShape};
use meshql::math::{Axis, Point3};
use meshql::selection::Provenance;
use meshql::{EntityKind, MeshqlError, Predicate, Selection, Session, TopologyGraph};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn cut_box() -> BrepShape {
    BrepBuilder::new()
        .split_block(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 10.0, 10.0),
            Axis::X,
            5.0,
        )
        .build()
        .unwrap()
}

fn call_index(engine: &RecordingEngine, wanted: impl Fn(&EngineCall) -> bool) -> usize {
    engine.calls().iter().position(wanted).unwrap()
}

#[test]
fn wing_boundary_layer_and_group() {
    init_tracing();
    let shape = cut_box();
    let mut session = Session::load(&shape).unwrap();
    let interior = session
        .select(EntityKind::Face, &Predicate::interior())
        .unwrap();
    assert_eq!(interior.len(), 1);

    session
        .faces(&Predicate::interior())
        .unwrap()
        .add_boundary_layer(0.001, 1.5, 3)
        .unwrap()
        .add_physical_group("wing")
        .unwrap()
        .end()
        .unwrap();
    assert!(session.contexts().current().is_root());

    let mut engine = RecordingEngine::new();
    let mesh = session.generate(&mut engine, 2).unwrap();
    assert_eq!(mesh.dimension, 2);
    assert_eq!(engine.generate_count(), 1);

    let layers: Vec<_> = engine
        .calls()
        .iter()
        .filter_map(|c| match c {
            EngineCall::AddBoundaryLayer { entities, spec } => Some((entities, spec)),
            _ => None,
        })
        .collect();
    assert_eq!(layers.len(), 1);
    assert_eq!(layers[0].0.as_slice(), interior.entities());
    assert_eq!(layers[0].1, &BoundaryLayer::new(0.001, 1.5, 3));

    let groups: Vec<_> = engine
        .calls()
        .iter()
        .filter_map(|c| match c {
            EngineCall::AddPhysicalGroup(group) => Some(group),
            _ => None,
        })
        .collect();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "wing");
    assert_eq!(groups[0].kind, EntityKind::Face);
    assert_eq!(groups[0].members.as_slice(), interior.entities());

    // Layers are grown before groups are exported, and meshing comes last.
    let layer = call_index(&engine, |c| matches!(c, EngineCall::AddBoundaryLayer { .. }));
    let group = call_index(&engine, |c| matches!(c, EngineCall::AddPhysicalGroup(_)));
    let generate = call_index(&engine, |c| matches!(c, EngineCall::Generate(2)));
    assert!(layer < group && group < generate);
    assert_eq!(generate, engine.calls().len() - 1);

    // A layer grown from faces recombines them.
    assert!(engine.calls().iter().any(|c| matches!(
        c,
        EngineCall::SetStructuralHint {
            hint: StructuralHint::Recombine { .. },
            ..
        }
    )));
}

#[test]
fn entities_of_another_shape_never_reach_the_engine() {
    init_tracing();
    let row = BrepBuilder::new()
        .block(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0))
        .block(Point3::new(2.0, 0.0, 0.0), Point3::new(3.0, 1.0, 1.0))
        .block(Point3::new(4.0, 0.0, 0.0), Point3::new(5.0, 1.0, 1.0))
        .build()
        .unwrap();
    let other = Session::load(&row).unwrap();
    let far = other.select(EntityKind::Face, &Predicate::All).unwrap();
    assert_eq!(far.len(), 18);
    let last = Selection::new(
        EntityKind::Face,
        far.entities().last().copied(),
        Provenance::Explicit,
    );

    let shape = cut_box();
    let mut session = Session::load(&shape).unwrap();
    assert_eq!(session.graph().entities_of_type(EntityKind::Face).len(), 11);
    let err = session.push_selection(last).unwrap_err();
    assert!(matches!(
        err,
        MeshqlError::Selection(SelectionError::ForeignEntity(_))
    ));
    assert!(session.contexts().current().is_root());

    // Nothing was written on its behalf either.
    session.add_physical_group("everything").unwrap();
    let mut engine = RecordingEngine::new();
    session.generate(&mut engine, 3).unwrap();
    assert!(!engine.calls().iter().any(|c| matches!(
        c,
        EngineCall::SetSize { .. } | EngineCall::SetStructuralHint { .. }
    )));
    assert_eq!(engine.generate_count(), 1);
}

#[test]
fn flat_shape_cannot_be_meshed_in_3d() {
    init_tracing();
    let plate = BrepBuilder::new()
        .rect(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 1.0, 0.0))
        .build()
        .unwrap();
    let session = Session::load(&plate).unwrap();
    assert_eq!(session.graph().dimension(), 2);

    let mut engine = RecordingEngine::new();
    let err = session.generate(&mut engine, 3).unwrap_err();
    assert!(matches!(
        err,
        MeshqlError::Generation(GenerationError::InvalidDimension {
            requested: 3,
            shape: 2
        })
    ));
    assert!(engine.calls().is_empty());

    session.generate(&mut engine, 2).unwrap();
    assert_eq!(engine.generate_count(), 1);
}

#[test]
fn repeated_loads_agree_despite_fresh_handles() {
    let shape = cut_box();
    let a = TopologyGraph::load(&shape).unwrap();
    let b = TopologyGraph::load(&shape).unwrap();
    for kind in EntityKind::ALL {
        assert_eq!(a.entities_of_type(kind), b.entities_of_type(kind));
        assert_eq!(a.entities_of_type(kind), a.entities_of_type(kind));
    }
    let face = a.entities_of_type(EntityKind::Face)[0];
    assert_eq!(
        a.adjacent(face, EntityKind::Edge),
        b.adjacent(face, EntityKind::Edge)
    );
}

#[test]
fn push_pop_balance() {
    let shape = cut_box();
    let mut session = Session::load(&shape).unwrap();
    session
        .solids(&Predicate::All)
        .unwrap()
        .faces(&Predicate::exterior())
        .unwrap()
        .edges(&Predicate::All)
        .unwrap();
    assert_eq!(session.contexts().depth(), 3);

    assert!(session.end_many(4).is_err());
    assert_eq!(session.contexts().depth(), 3);
    session.end_many(3).unwrap();
    assert!(session.contexts().current().is_root());
    assert!(matches!(
        session.end(),
        Err(MeshqlError::Selection(SelectionError::EmptyContext))
    ));

    session.faces(&Predicate::All).unwrap().edges(&Predicate::All).unwrap();
    session.reset();
    assert_eq!(session.contexts().depth(), 0);
}

#[test]
fn invalid_parameter_is_reported_and_nothing_is_written() {
    let shape = cut_box();
    let mut session = Session::load(&shape).unwrap();
    session.faces(&Predicate::interior()).unwrap();
    let err = session.add_boundary_layer(0.01, 0.5, 3).unwrap_err();
    assert!(matches!(
        err,
        MeshqlError::Config(ConfigError::InvalidParameter {
            parameter: "ratio",
            ..
        })
    ));
    session.end().unwrap();

    let mut engine = RecordingEngine::new();
    session.generate(&mut engine, 3).unwrap();
    assert!(!engine
        .calls()
        .iter()
        .any(|c| matches!(c, EngineCall::AddBoundaryLayer { .. })));
}

#[test]
fn engine_failure_leaves_no_partial_state() {
    init_tracing();
    let shape = cut_box();
    let mut session = Session::load(&shape).unwrap();
    session
        .set_mesh_algorithm(MeshAlgorithm2D::FrontalDelaunay)
        .faces(&Predicate::exterior())
        .unwrap()
        .set_mesh_size(2.0)
        .unwrap()
        .set_transfinite_edge(8, TransfiniteDistribution::Bump, 0.5)
        .unwrap()
        .end()
        .unwrap();

    let mut engine =
        RecordingEngine::new().fail_on_generate(EngineError::new("meshing diverged"));
    let err = session.generate(&mut engine, 3).unwrap_err();
    assert!(matches!(
        err,
        MeshqlError::Generation(GenerationError::GenerationFailed { .. })
    ));
    assert!(engine.discarded());
    assert!(engine.calls().is_empty());

    // The session stays usable after the failure.
    let mut engine = RecordingEngine::new();
    session.generate(&mut engine, 3).unwrap();
    assert_eq!(engine.generate_count(), 1);
}
