//! Mesh streaming integration tests.
//!
//! Allocation and streaming tests run on every available backend; tests
//! that read megabuffer contents back run on the Dummy backend only.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test mesh_tests
//! ```

mod common;

use std::sync::Arc;

use common::*;
use nova_core::compute::TaskScheduler;
use rstest::rstest;

use nova_graphics::backend::{DummyBackend, GpuBackend};
use nova_graphics::mesh::{BlockAllocator, MeshStreamer};
use nova_graphics::settings::VERTEX_RECORD_SIZE;
use nova_graphics::{GraphicsError, MeshOptions};

/// Four vertices per part, two parts per megabuffer, at most `buffers`
/// megabuffers.
fn small_options(buffers: u64) -> MeshOptions {
    MeshOptions::from_counts(4, 2, buffers)
}

const PART_BYTES: u64 = VERTEX_RECORD_SIZE * 4;

// ============================================================================
// Block Allocator
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn allocate_then_free_restores_free_parts(#[case] backend: Backend) {
    let Some(gpu) = backend.create() else {
        eprintln!("Skipping test: {} backend not available", backend.name());
        return;
    };
    let mut allocator = BlockAllocator::new(MeshOptions::from_counts(16, 4, 2)).unwrap();

    let bytes = VERTEX_RECORD_SIZE * 16 * 3 - 10;
    let first = allocator.allocate(gpu.as_ref(), bytes).unwrap();
    assert_eq!(first.part_count(), 3);
    assert_eq!(allocator.buffer_count(), 1);
    assert_eq!(allocator.free_part_count(), 1);

    allocator.free(first);
    assert_eq!(allocator.free_part_count(), 4);

    // Reuses the megabuffer instead of growing.
    let second = allocator.allocate(gpu.as_ref(), bytes).unwrap();
    assert_eq!(allocator.buffer_count(), 1);
    assert_eq!(allocator.free_part_count(), 1);

    allocator.free(second);
    assert_eq!(allocator.free_part_count(), 4);
    assert_eq!(allocator.available_parts(), 8);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn allocation_over_ceiling_changes_nothing(#[case] backend: Backend) {
    let Some(gpu) = backend.create() else {
        eprintln!("Skipping test: {} backend not available", backend.name());
        return;
    };
    let mut allocator = BlockAllocator::new(small_options(2)).unwrap();

    let _held = allocator.allocate(gpu.as_ref(), PART_BYTES * 2).unwrap();
    assert_eq!(allocator.available_parts(), 2);

    match allocator.allocate(gpu.as_ref(), PART_BYTES * 3) {
        Err(GraphicsError::MeshMemoryExhausted {
            requested_parts,
            available_parts,
        }) => {
            assert_eq!(requested_parts, 3);
            assert_eq!(available_parts, 2);
        }
        other => panic!("expected exhaustion, got {:?}", other.map(|a| a.part_count())),
    }
    assert_eq!(allocator.buffer_count(), 1);
    assert_eq!(allocator.free_part_count(), 0);
    assert_eq!(allocator.available_parts(), 2);
}

#[test]
fn allocation_spans_megabuffers_with_distinct_parts() {
    let backend = DummyBackend::new();
    let mut allocator = BlockAllocator::new(small_options(3)).unwrap();

    let allocation = allocator.allocate(&backend, PART_BYTES * 5).unwrap();
    assert_eq!(allocator.buffer_count(), 3);

    let mut parts: Vec<(u32, u64)> = allocation
        .parts()
        .iter()
        .map(|p| (p.buffer_index, p.offset))
        .collect();
    parts.sort_unstable();
    parts.dedup();
    assert_eq!(parts.len(), 5);
    assert!(parts.iter().all(|&(_, offset)| offset % PART_BYTES == 0));
}

// ============================================================================
// Mesh Streamer
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn add_then_delete_before_upload(#[case] backend: Backend) {
    let Some(gpu) = backend.create() else {
        eprintln!("Skipping test: {} backend not available", backend.name());
        return;
    };
    let scheduler = TaskScheduler::new(2);
    let streamer = MeshStreamer::new(gpu, small_options(4)).unwrap();
    let available = streamer.with_allocator(|a| a.available_parts());

    let id = streamer.add_mesh(&scheduler, mesh_with_vertices(10)).unwrap();
    assert!(streamer.contains(id));
    assert_eq!(streamer.mesh_parts(id).map(|p| p.len()), Some(3));
    assert_eq!(streamer.pending_uploads(), 1);

    streamer.delete_mesh(id).unwrap();
    assert!(!streamer.contains(id));
    assert_eq!(streamer.mesh_count(), 0);
    assert_eq!(streamer.pending_uploads(), 0);
    assert_eq!(streamer.with_allocator(|a| a.available_parts()), available);

    let pool = streamer.staging_pool();
    assert_eq!(pool.free_count(), pool.created_count());
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn upload_submits_once_per_batch(#[case] backend: Backend) {
    let Some(gpu) = backend.create() else {
        eprintln!("Skipping test: {} backend not available", backend.name());
        return;
    };
    let scheduler = TaskScheduler::new(2);
    let streamer = MeshStreamer::new(Arc::clone(&gpu), small_options(4)).unwrap();
    let signal = gpu.create_semaphore().unwrap();

    assert!(!streamer.upload_pending(&scheduler, None, &signal).unwrap());

    streamer.add_mesh(&scheduler, triangle()).unwrap();
    streamer.add_mesh(&scheduler, mesh_with_vertices(6)).unwrap();
    assert!(streamer.upload_pending(&scheduler, None, &signal).unwrap());
    assert_eq!(streamer.pending_uploads(), 0);
    assert!(!streamer.upload_pending(&scheduler, None, &signal).unwrap());

    gpu.wait_idle().unwrap();
    // Dropping the scheduler drains the staging-release job.
    drop(scheduler);
    let pool = streamer.staging_pool();
    assert_eq!(pool.created_count(), 3);
    assert_eq!(pool.free_count(), 3);
}

#[test]
fn mesh_ids_are_never_reused() {
    let backend: Arc<dyn GpuBackend> = Arc::new(DummyBackend::new());
    let scheduler = TaskScheduler::new(1);
    let streamer = MeshStreamer::new(backend, small_options(2)).unwrap();

    let first = streamer.add_mesh(&scheduler, triangle()).unwrap();
    streamer.delete_mesh(first).unwrap();
    let second = streamer.add_mesh(&scheduler, triangle()).unwrap();

    assert_eq!(first.0, 1);
    assert!(second > first);
    assert!(matches!(
        streamer.delete_mesh(first),
        Err(GraphicsError::UnknownMesh(_))
    ));
}

#[test]
fn exhausted_add_leaves_streamer_unchanged() {
    let backend: Arc<dyn GpuBackend> = Arc::new(DummyBackend::new());
    let scheduler = TaskScheduler::new(1);
    let streamer = MeshStreamer::new(backend, small_options(2)).unwrap();

    // Four parts of four vertices fit; seventeen vertices need five.
    let result = streamer.add_mesh(&scheduler, mesh_with_vertices(17));
    assert!(matches!(
        result,
        Err(GraphicsError::MeshMemoryExhausted {
            requested_parts: 5,
            available_parts: 4
        })
    ));
    assert_eq!(streamer.mesh_count(), 0);
    assert_eq!(streamer.pending_uploads(), 0);
    assert_eq!(streamer.with_allocator(|a| a.buffer_count()), 0);
    assert_eq!(streamer.staging_pool().created_count(), 0);
}

#[test]
fn uploaded_vertices_land_in_their_parts() {
    let dummy = Arc::new(DummyBackend::new());
    let backend: Arc<dyn GpuBackend> = Arc::clone(&dummy) as Arc<dyn GpuBackend>;
    let scheduler = TaskScheduler::new(2);
    let streamer = MeshStreamer::new(Arc::clone(&backend), small_options(4)).unwrap();
    let signal = backend.create_semaphore().unwrap();

    let mesh = mesh_with_vertices(6);
    let id = streamer.add_mesh(&scheduler, mesh.clone()).unwrap();
    streamer.upload_pending(&scheduler, None, &signal).unwrap();

    let parts = streamer.mesh_parts(id).unwrap();
    assert_eq!(parts.len(), 2);

    let expected = mesh.as_bytes();
    for (index, part) in parts.iter().enumerate() {
        let contents = streamer.with_allocator(|a| {
            dummy.read_buffer(a.buffer(part.buffer_index).expect("megabuffer exists"))
        });
        let start = index * PART_BYTES as usize;
        let end = (start + PART_BYTES as usize).min(expected.len());
        let offset = part.offset as usize;
        assert_eq!(
            &contents[offset..offset + (end - start)],
            &expected[start..end],
            "part {index} holds the wrong bytes"
        );
    }
}
