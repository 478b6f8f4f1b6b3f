//! Graph compilation tests: ordering, culling and validation.

mod common;

use std::sync::Arc;

use rstest::rstest;

use common::{color_desc, TestContext};
use frame_graph::device::GpuTexture;
use frame_graph::scene::Camera;
use frame_graph::GraphError;

// ============================================================================
// Concrete scenario
// ============================================================================

/// Camera -> Geometry -> GBuffer -> Lighting -> HDROutput -> Present.
fn deferred_scenario(ctx: &mut TestContext) -> frame_graph::PassHandle {
    let camera = ctx
        .graph
        .declare_external("Camera", Arc::new(Camera::default()))
        .unwrap();
    let hdr = ctx
        .graph
        .declare_transient::<GpuTexture>("HDROutput", color_desc())
        .unwrap();

    let (_, gbuffer) = ctx
        .graph
        .add_callback_pass(
            "Geometry",
            |b| {
                b.read(camera)?;
                b.create::<GpuTexture>("GBuffer", color_desc())
            },
            |_, _| Ok(()),
        )
        .unwrap();
    ctx.graph
        .add_callback_pass(
            "Lighting",
            |b| {
                b.read(gbuffer)?;
                b.write(hdr)
            },
            |_, _| Ok(()),
        )
        .unwrap();
    let (present, _) = ctx
        .graph
        .add_callback_pass("Present", |b| b.read(hdr), |_, _| Ok(()))
        .unwrap();
    ctx.graph.set_cull_immune(present, true).unwrap();
    present
}

#[test]
fn test_concrete_scenario_order() {
    let mut ctx = TestContext::new(2);
    deferred_scenario(&mut ctx);
    assert_eq!(ctx.order(), vec!["Geometry", "Lighting", "Present"]);
}

#[test]
fn test_concrete_scenario_culls_everything_without_roots() {
    let mut ctx = TestContext::new(2);
    let present = deferred_scenario(&mut ctx);
    ctx.graph.compile().unwrap();

    ctx.graph.set_cull_immune(present, false).unwrap();
    let compiled = ctx.graph.compile().unwrap();
    assert!(compiled.is_empty());
    assert_eq!(compiled.culled().len(), 3);
}

// ============================================================================
// Ordering properties
// ============================================================================

#[test]
fn test_determinism() {
    let build = || {
        let mut ctx = TestContext::new(2);
        let (_, a) = ctx.creator("A", "a");
        let (_, b) = ctx.creator("B", "b");
        let (_, c) = ctx.transform("C", a, "c").unwrap();
        let (d, _) = ctx
            .graph
            .add_callback_pass(
                "D",
                |builder| {
                    builder.read(b)?;
                    builder.read(c)
                },
                |_, _| Ok(()),
            )
            .unwrap();
        ctx.graph.set_cull_immune(d, true).unwrap();
        ctx.order()
    };
    let first = build();
    assert_eq!(first, build());
    assert_eq!(first, vec!["A", "B", "C", "D"]);
}

#[test]
fn test_topological_validity() {
    let mut ctx = TestContext::new(2);
    // Declared so that declaration order and dependency order disagree.
    let late = ctx
        .graph
        .declare_transient::<GpuTexture>("Late", color_desc())
        .unwrap();
    let (_, first) = ctx.creator("First", "first");
    let (reader, _) = ctx.transform("Reader", first, "out").unwrap();
    ctx.graph
        .add_callback_pass(
            "Writer",
            |b| {
                b.read(first)?;
                b.write(late)
            },
            |_, _| Ok(()),
        )
        .unwrap();
    let (sink, _) = ctx
        .graph
        .add_callback_pass("Sink", |b| b.read(late), |_, _| Ok(()))
        .unwrap();
    ctx.graph.set_cull_immune(sink, true).unwrap();
    ctx.graph.set_cull_immune(reader, true).unwrap();

    let graph = &mut ctx.graph;
    let compiled = graph.compile().unwrap().clone();
    for &pass in compiled.pass_order() {
        let node = graph.pass(pass).unwrap();
        for resource in node.reads() {
            let producer = graph.resources().get(resource).and_then(|r| {
                r.producer()
                    .or_else(|| r.writers().iter().copied().find(|w| compiled.is_live(*w)))
            });
            if let Some(producer) = producer {
                assert!(
                    compiled.position(producer) < compiled.position(pass),
                    "{} must run before {}",
                    graph.pass(producer).unwrap().name(),
                    node.name()
                );
            }
        }
    }
}

#[rstest]
#[case::single_root(&["C"], &["A", "C"])]
#[case::two_roots(&["C", "D"], &["A", "B", "C", "D"])]
#[case::leaf_only(&["B"], &["B"])]
#[case::no_roots(&[], &[])]
fn test_cull_keeps_only_ancestors_of_roots(#[case] roots: &[&str], #[case] expected: &[&str]) {
    let mut ctx = TestContext::new(2);
    let (_, a) = ctx.creator("A", "a");
    let (_, b) = ctx.creator("B", "b");
    ctx.transform("C", a, "c").unwrap();
    ctx.transform("D", b, "d").unwrap();
    for root in roots {
        let pass = ctx.graph.find_pass(root).unwrap();
        ctx.graph.set_cull_immune(pass, true).unwrap();
    }
    assert_eq!(ctx.order(), expected);
}

#[test]
fn test_frame_output_roots_its_producer() {
    let mut ctx = TestContext::new(2);
    let (_, a) = ctx.creator("A", "a");
    let (_, b) = ctx.transform("B", a, "b").unwrap();
    ctx.creator("Unused", "unused");
    ctx.graph.mark_frame_output(b).unwrap();
    assert_eq!(ctx.order(), vec!["A", "B"]);

    ctx.graph.clear_frame_output(b).unwrap();
    assert!(ctx.order().is_empty());
}

#[test]
fn test_explicit_dependency_orders_and_keeps_alive() {
    let mut ctx = TestContext::new(2);
    let (upload, _) = ctx.creator("Upload", "staging");
    let (draw, _) = ctx.creator("Draw", "color");
    ctx.graph.set_cull_immune(draw, true).unwrap();
    ctx.graph.add_dependency(draw, upload).unwrap();
    // Adding the same edge twice is a no-op
    ctx.graph.add_dependency(draw, upload).unwrap();
    assert_eq!(ctx.graph.explicit_dependencies().len(), 1);
    assert_eq!(ctx.order(), vec!["Upload", "Draw"]);
}

// ============================================================================
// Validation errors
// ============================================================================

#[test]
fn test_cycle_is_reported_with_pass_names() {
    let mut ctx = TestContext::new(2);
    let (a, ra) = ctx.creator("A", "a");
    let (b, _) = ctx.transform("B", ra, "b").unwrap();
    ctx.graph.set_cull_immune(b, true).unwrap();
    ctx.graph.add_dependency(a, b).unwrap();

    assert_eq!(
        ctx.graph.compile().unwrap_err(),
        GraphError::CyclicDependency {
            passes: vec!["A".to_string(), "B".to_string()]
        }
    );
    assert_eq!(ctx.graph.compile_count(), 0);
}

#[test]
fn test_unresolved_read_names_resource_and_pass() {
    let mut ctx = TestContext::new(2);
    let shadow = ctx
        .graph
        .declare_transient::<GpuTexture>("ShadowMap", color_desc())
        .unwrap();
    let (pass, _) = ctx
        .graph
        .add_callback_pass("Lighting", |b| b.read(shadow), |_, _| Ok(()))
        .unwrap();
    ctx.graph.set_cull_immune(pass, true).unwrap();

    let err = ctx.graph.compile().unwrap_err();
    assert_eq!(
        err,
        GraphError::UnresolvedRead {
            resource: "ShadowMap".into(),
            pass: "Lighting".into()
        }
    );
    assert_eq!(err.category(), "compile");
}

#[test]
fn test_disabling_producer_unresolves_reader() {
    let mut ctx = TestContext::new(2);
    let (producer, a) = ctx.creator("Producer", "a");
    let (consumer, _) = ctx.transform("Consumer", a, "b").unwrap();
    ctx.graph.set_cull_immune(consumer, true).unwrap();
    assert_eq!(ctx.order(), vec!["Producer", "Consumer"]);

    ctx.graph.set_pass_enabled(producer, false).unwrap();
    assert!(matches!(
        ctx.graph.compile(),
        Err(GraphError::UnresolvedRead { .. })
    ));

    ctx.graph.set_pass_enabled(consumer, false).unwrap();
    assert!(ctx.graph.compile().unwrap().is_empty());
}

#[rstest]
#[case::duplicate_resource("A", "shared", GraphError::DuplicateResource("shared".into()))]
#[case::duplicate_pass("First", "other", GraphError::DuplicatePass("First".into()))]
fn test_construction_errors(#[case] pass: &str, #[case] resource: &str, #[case] expected: GraphError) {
    let mut ctx = TestContext::new(1);
    ctx.creator("First", "shared");
    let err = ctx
        .graph
        .add_callback_pass(pass, |b| b.create::<GpuTexture>(resource, color_desc()), |_, _| Ok(()))
        .unwrap_err();
    assert_eq!(err, expected);
    assert_eq!(err.category(), "construction");
}

#[test]
fn test_read_named_with_wrong_type() {
    let mut ctx = TestContext::new(1);
    ctx.graph.declare_external("Exposure", Arc::new(1.0f32)).unwrap();
    let err = ctx
        .graph
        .add_callback_pass("Tonemap", |b| b.read_named::<u32>("Exposure"), |_, _| Ok(()))
        .unwrap_err();
    assert!(matches!(err, GraphError::ResourceTypeMismatch { .. }));
}
