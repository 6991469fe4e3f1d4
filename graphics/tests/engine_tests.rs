//! Engine integration tests.
//!
//! These drive a [`RenderEngine`] on the Dummy backend and check what it
//! did through the backend's journal.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test engine_tests
//! ```

mod common;

use common::*;
use rstest::rstest;

use nova_graphics::backend::{DummyEvent, ResourceKind, WaitStage};
use nova_graphics::shader::{DescriptorType, ReflectedBinding, ShaderSource};
use nova_graphics::shaderpack::{PipelineData, RenderPassData, TextureResourceData};
use nova_graphics::types::{Extent2d, PixelFormat};
use nova_graphics::{
    ConfigError, FrameStatus, GraphicsError, MeshOptions, RenderSettings, ShaderpackData,
};

fn frame_submissions(events: &[DummyEvent]) -> Vec<(Vec<(u64, WaitStage)>, usize)> {
    events
        .iter()
        .filter_map(|event| match event {
            DummyEvent::FrameSubmitted {
                waits, pass_count, ..
            } => Some((waits.clone(), *pass_count)),
            _ => None,
        })
        .collect()
}

fn position_of(events: &[DummyEvent], pred: impl Fn(&DummyEvent) -> bool) -> Option<usize> {
    events.iter().position(pred)
}

fn last_position_of(events: &[DummyEvent], pred: impl Fn(&DummyEvent) -> bool) -> Option<usize> {
    events.iter().rposition(pred)
}

fn destroyed(kind: ResourceKind) -> impl Fn(&DummyEvent) -> bool {
    move |event| matches!(event, DummyEvent::Destroyed { kind: k, .. } if *k == kind)
}

// ============================================================================
// Construction
// ============================================================================

#[rstest]
#[case::part_not_vertex_multiple(MeshOptions { buffer_part_size: 100, new_buffer_size: 1000, max_total_allocation: 10_000 }, "buffer_part_size")]
#[case::buffer_not_part_multiple(MeshOptions { buffer_part_size: 272, new_buffer_size: 1000, max_total_allocation: 10_000 }, "new_buffer_size")]
#[case::ceiling_not_buffer_multiple(MeshOptions { buffer_part_size: 272, new_buffer_size: 1088, max_total_allocation: 1088 * 3 + 68 }, "max_total_allocation")]
#[case::zero_part(MeshOptions { buffer_part_size: 0, new_buffer_size: 1088, max_total_allocation: 1088 }, "buffer_part_size")]
fn invalid_mesh_options_abort_construction(
    #[case] mesh: MeshOptions,
    #[case] expected_field: &str,
) {
    let settings = RenderSettings::default().with_mesh(mesh);
    match TestEngine::try_with(settings, table_compiler()) {
        Err(GraphicsError::Configuration(ConfigError::MeshOptions { field, .. })) => {
            assert_eq!(field, expected_field);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("engine accepted inconsistent mesh options"),
    }
}

#[rstest]
#[case(0)]
#[case(5)]
fn frames_in_flight_out_of_range_abort_construction(#[case] frames: usize) {
    let settings = RenderSettings::default().with_max_frames_in_flight(frames);
    match TestEngine::try_with(settings, table_compiler()) {
        Err(GraphicsError::Configuration(ConfigError::FramesInFlight(n))) => assert_eq!(n, frames),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("engine accepted {frames} frames in flight"),
    }
}

// ============================================================================
// Frame Loop
// ============================================================================

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
fn frame_slot_wraps_after_frames_in_flight(#[case] frames: usize) {
    let mut t = TestEngine::with_settings(
        RenderSettings::default()
            .with_max_frames_in_flight(frames)
            .with_worker_threads(1),
    );

    for expected in 0..frames {
        assert_eq!(t.engine.current_frame_slot(), expected);
        assert_eq!(t.engine.render_frame().unwrap(), FrameStatus::Presented);
    }
    assert_eq!(t.engine.current_frame_slot(), 0);
    assert_eq!(t.engine.frame_count(), frames as u64);
}

#[test]
fn stale_acquire_skips_frame_without_advancing() {
    let mut t = TestEngine::new();
    t.engine.render_frame().unwrap();
    assert_eq!(t.engine.current_frame_slot(), 1);

    t.backend.journal().clear();
    t.swapchain.force_stale(1);
    assert_eq!(t.engine.render_frame().unwrap(), FrameStatus::Skipped);
    assert_eq!(t.engine.current_frame_slot(), 1);
    assert_eq!(
        t.backend
            .journal()
            .count(|e| matches!(e, DummyEvent::FrameSubmitted { .. })),
        0
    );

    // The next frame reuses the slot.
    assert_eq!(t.engine.render_frame().unwrap(), FrameStatus::Presented);
    assert_eq!(t.engine.current_frame_slot(), 0);
    assert_eq!(t.engine.frame_count(), 3);
}

#[test]
fn presents_each_acquired_image_once() {
    let mut t = TestEngine::new();
    for _ in 0..6 {
        t.engine.render_frame().unwrap();
    }

    let events = t.backend.journal().events();
    let acquired: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            DummyEvent::Acquired { image_index, .. } => Some(*image_index),
            _ => None,
        })
        .collect();
    let presented: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            DummyEvent::Presented { image_index, .. } => Some(*image_index),
            _ => None,
        })
        .collect();
    assert_eq!(acquired, vec![0, 1, 2, 0, 1, 2]);
    assert_eq!(presented, acquired);
}

#[test]
fn frame_waits_for_upload_only_when_one_ran() {
    let mut t = TestEngine::new();
    t.engine.add_mesh(triangle()).unwrap();
    t.engine.render_frame().unwrap();
    t.engine.render_frame().unwrap();

    let events = t.backend.journal().events();
    let upload_signal = events
        .iter()
        .find_map(|e| match e {
            DummyEvent::TransferSubmitted { signal, .. } => Some(*signal),
            _ => None,
        })
        .expect("mesh upload was not submitted");

    let frames = frame_submissions(&events);
    assert_eq!(frames.len(), 2);

    let (first, _) = &frames[0];
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].1, WaitStage::ColorAttachmentOutput);
    assert_eq!(first[1], (upload_signal, WaitStage::VertexInput));

    let (second, _) = &frames[1];
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].1, WaitStage::ColorAttachmentOutput);
}

fn submitted_fence(events: &[DummyEvent]) -> Option<u64> {
    events.iter().rev().find_map(|e| match e {
        DummyEvent::FrameSubmitted { fence, .. } => Some(*fence),
        _ => None,
    })
}

#[test]
fn upload_waits_for_previous_frame_after_resetting_own_fence() {
    let mut t = TestEngine::new();
    t.engine.render_frame().unwrap();
    let previous = submitted_fence(&t.backend.journal().events()).unwrap();

    t.backend.journal().clear();
    t.engine.add_mesh(triangle()).unwrap();
    t.engine.render_frame().unwrap();

    let events = t.backend.journal().events();
    let own = submitted_fence(&events).unwrap();
    assert_ne!(own, previous);

    let own_waited = position_of(&events, |e| *e == DummyEvent::FenceWaited { fence: own })
        .expect("slot fence was not waited");
    let own_reset = position_of(&events, |e| *e == DummyEvent::FenceReset { fence: own })
        .expect("slot fence was not reset");
    let previous_waited =
        position_of(&events, |e| *e == DummyEvent::FenceWaited { fence: previous })
            .expect("upload did not wait for the previous frame");
    let transfer = position_of(&events, |e| {
        matches!(e, DummyEvent::TransferSubmitted { .. })
    })
    .unwrap();
    let frame = position_of(&events, |e| matches!(e, DummyEvent::FrameSubmitted { .. })).unwrap();

    assert!(own_waited < own_reset);
    assert!(own_reset < transfer);
    assert!(previous_waited < transfer);
    assert!(transfer < frame);
    // The previous frame's fence is never reset by this frame.
    assert!(!events.contains(&DummyEvent::FenceReset { fence: previous }));
}

#[test]
fn uploads_are_batched_per_frame() {
    let mut t = TestEngine::new();
    for _ in 0..3 {
        t.engine.add_mesh(triangle()).unwrap();
    }
    t.engine.render_frame().unwrap();

    let transfers: Vec<usize> = t
        .backend
        .journal()
        .events()
        .iter()
        .filter_map(|e| match e {
            DummyEvent::TransferSubmitted { copies, .. } => Some(*copies),
            _ => None,
        })
        .collect();
    assert_eq!(transfers, vec![3]);
    assert_eq!(t.engine.meshes().pending_uploads(), 0);
}

#[test]
fn deleted_mesh_is_never_uploaded() {
    let mut t = TestEngine::new();
    let before = t.engine.meshes().with_allocator(|a| a.available_parts());

    let id = t.engine.add_mesh(mesh_with_vertices(2048)).unwrap();
    t.engine.delete_mesh(id).unwrap();
    t.engine.render_frame().unwrap();

    assert_eq!(t.engine.mesh_count(), 0);
    assert_eq!(
        t.engine.meshes().with_allocator(|a| a.available_parts()),
        before
    );
    assert_eq!(
        t.backend
            .journal()
            .count(|e| matches!(e, DummyEvent::TransferSubmitted { .. })),
        0
    );
    assert!(matches!(
        t.engine.delete_mesh(id),
        Err(GraphicsError::UnknownMesh(m)) if m == id
    ));
}

// ============================================================================
// Shaderpacks
// ============================================================================

#[test]
fn shaderpack_loads_in_dependency_order() {
    let mut t = TestEngine::new();
    t.engine.set_shaderpack(deferred_shaderpack()).unwrap();

    assert!(t.engine.has_shaderpack());
    assert_eq!(t.engine.pass_order(), ["gbuffer", "lighting", "tonemap"]);

    let gbuffer = t.engine.pipeline("gbuffer_opaque").unwrap();
    assert_eq!(gbuffer.pass(), "gbuffer");
    assert_eq!(gbuffer.descriptor_sets().len(), 2);
    assert_eq!(gbuffer.viewport().width, 640.0);

    assert_eq!(
        t.engine.material("stone").unwrap().passes[0].pipeline,
        "gbuffer_opaque"
    );
    assert_eq!(
        t.engine.dynamic_texture("lit").unwrap().extent(),
        Extent2d::new(320, 240)
    );
    assert_eq!(t.backend.journal().live(ResourceKind::ShaderModule), 0);
}

#[test]
fn frames_report_loaded_pass_count() {
    let mut t = TestEngine::new();
    t.engine.render_frame().unwrap();
    t.engine.set_shaderpack(deferred_shaderpack()).unwrap();
    t.engine.render_frame().unwrap();

    let counts: Vec<usize> = frame_submissions(&t.backend.journal().events())
        .into_iter()
        .map(|(_, count)| count)
        .collect();
    assert_eq!(counts, vec![0, 3]);
}

#[test]
fn reload_tears_down_pipelines_then_passes_then_textures() {
    let mut t = TestEngine::new();
    t.engine.set_shaderpack(deferred_shaderpack()).unwrap();
    t.backend.journal().clear();
    t.engine.set_shaderpack(deferred_shaderpack()).unwrap();

    let events = t.backend.journal().events();
    assert_eq!(events.first(), Some(&DummyEvent::WaitIdle));

    let last_pipeline = last_position_of(&events, destroyed(ResourceKind::Pipeline)).unwrap();
    let first_pass = position_of(&events, destroyed(ResourceKind::RenderPass)).unwrap();
    let last_pass = last_position_of(&events, destroyed(ResourceKind::RenderPass)).unwrap();
    let first_texture = position_of(&events, destroyed(ResourceKind::Texture)).unwrap();
    let first_created =
        position_of(&events, |e| matches!(e, DummyEvent::Created { .. })).unwrap();

    assert!(last_pipeline < first_pass);
    assert!(last_pass < first_texture);
    assert!(first_texture < first_created);

    // Only the new shaderpack's objects remain.
    assert_eq!(t.backend.journal().live(ResourceKind::Pipeline), 2);
    assert_eq!(t.backend.journal().live(ResourceKind::RenderPass), 3);
}

#[test]
fn failed_shaderpack_leaves_nothing_loaded() {
    let mut t = TestEngine::new();
    t.engine.set_shaderpack(deferred_shaderpack()).unwrap();

    let cyclic = ShaderpackData::new()
        .with_texture(TextureResourceData::absolute("x", PixelFormat::Rgba8, 64, 64))
        .with_texture(TextureResourceData::absolute("y", PixelFormat::Rgba8, 64, 64))
        .with_pass(RenderPassData::new("a").with_inputs(["x"]).with_outputs(["y"]))
        .with_pass(RenderPassData::new("b").with_inputs(["y"]).with_outputs(["x"]));

    match t.engine.set_shaderpack(cyclic) {
        Err(GraphicsError::Configuration(ConfigError::DependencyCycle { passes })) => {
            assert_eq!(passes, vec!["a".to_string(), "b".to_string()]);
        }
        other => panic!("expected a dependency cycle, got {other:?}"),
    }

    assert!(!t.engine.has_shaderpack());
    assert!(t.engine.pass_order().is_empty());
    assert!(t.engine.pipeline("gbuffer_opaque").is_none());
    for kind in [
        ResourceKind::Pipeline,
        ResourceKind::RenderPass,
        ResourceKind::Texture,
        ResourceKind::PipelineLayout,
        ResourceKind::DescriptorSetLayout,
    ] {
        assert_eq!(t.backend.journal().live(kind), 0, "{kind:?} leaked");
    }

    // Frames keep presenting without passes.
    assert_eq!(t.engine.render_frame().unwrap(), FrameStatus::Presented);
}

#[test]
fn conflicting_bindings_are_rejected() {
    let compiler = TableCompiler::default()
        .with("a.vert", vec![camera()])
        .with(
            "a.frag",
            vec![ReflectedBinding::new(
                "camera",
                0,
                1,
                DescriptorType::UniformBuffer,
            )],
        );
    let mut t = TestEngine::try_with(RenderSettings::default().with_worker_threads(1), compiler)
        .unwrap();

    let pack = ShaderpackData::new()
        .with_pass(RenderPassData::new("main"))
        .with_pipeline(
            PipelineData::new("conflicting", "main")
                .with_vertex(ShaderSource::new("a.vert", ""))
                .with_fragment(ShaderSource::new("a.frag", "")),
        );

    match t.engine.set_shaderpack(pack) {
        Err(GraphicsError::Configuration(ConfigError::BindingMismatch {
            pipeline, name, ..
        })) => {
            assert_eq!(pipeline, "conflicting");
            assert_eq!(name, "camera");
        }
        other => panic!("expected a binding mismatch, got {other:?}"),
    }
    assert!(!t.engine.has_shaderpack());
}

#[test]
fn descriptor_set_gap_is_rejected() {
    let compiler = TableCompiler::default().with(
        "gap.vert",
        vec![
            camera(),
            ReflectedBinding::new("lights", 2, 0, DescriptorType::StorageBuffer),
        ],
    );
    let mut t = TestEngine::try_with(RenderSettings::default().with_worker_threads(1), compiler)
        .unwrap();

    let pack = ShaderpackData::new()
        .with_pass(RenderPassData::new("main"))
        .with_pipeline(
            PipelineData::new("gap", "main").with_vertex(ShaderSource::new("gap.vert", "")),
        );

    assert!(matches!(
        t.engine.set_shaderpack(pack),
        Err(GraphicsError::Configuration(ConfigError::DescriptorSetGap { set: 1, .. }))
    ));
}

#[rstest]
#[case::unknown_pass(
    PipelineData::new("p", "missing").with_vertex(ShaderSource::new("gbuffer.vert", "")),
    ConfigError::UnknownPass { pipeline: "p".to_string(), pass: "missing".to_string() }
)]
#[case::missing_vertex(
    PipelineData::new("p", "gbuffer").with_fragment(ShaderSource::new("gbuffer.frag", "")),
    ConfigError::MissingVertexStage("p".to_string())
)]
fn malformed_pipelines_are_rejected(#[case] pipeline: PipelineData, #[case] expected: ConfigError) {
    let mut t = TestEngine::new();
    let pack = ShaderpackData::new()
        .with_pass(RenderPassData::new("gbuffer"))
        .with_pipeline(pipeline);

    match t.engine.set_shaderpack(pack) {
        Err(GraphicsError::Configuration(error)) => assert_eq!(error, expected),
        other => panic!("expected {expected}, got {other:?}"),
    }
}

#[test]
fn unknown_shader_file_fails_compilation() {
    let mut t = TestEngine::new();
    let pack = ShaderpackData::new()
        .with_pass(RenderPassData::new("main"))
        .with_pipeline(
            PipelineData::new("p", "main").with_vertex(ShaderSource::new("nowhere.vert", "")),
        );

    let err = t.engine.set_shaderpack(pack).unwrap_err();
    assert!(matches!(err, GraphicsError::ShaderCompilationFailed(ref msg) if msg.contains("nowhere.vert")));
    assert!(!t.engine.has_shaderpack());
}

// ============================================================================
// Teardown
// ============================================================================

#[test]
fn dropping_engine_releases_every_object() {
    let mut t = TestEngine::new();
    t.engine.set_shaderpack(deferred_shaderpack()).unwrap();
    t.engine.add_mesh(mesh_with_vertices(100)).unwrap();
    t.engine.render_frame().unwrap();

    let journal = std::sync::Arc::clone(t.backend.journal());
    drop(t);

    for kind in [
        ResourceKind::Buffer,
        ResourceKind::Texture,
        ResourceKind::Fence,
        ResourceKind::Semaphore,
        ResourceKind::RenderPass,
        ResourceKind::Pipeline,
        ResourceKind::CommandList,
    ] {
        assert_eq!(journal.live(kind), 0, "{kind:?} leaked");
    }
}
