//! Pools shared between threads behind one lock.

mod common;

use std::sync::Arc;
use std::thread;

use glam::Vec3;

use slotted_renderer::{DummyBackend, Material, MaterialId, Residency, ResidencyConfig};

#[test]
fn test_threads_share_one_material_table() {
    common::init_logging();
    let backend = Arc::new(DummyBackend::new());
    let config = ResidencyConfig::default()
        .with_material_capacity(4)
        .with_shadow_map_resolution(16)
        .with_texture_size(16);
    let residency = Residency::new(backend.as_ref(), &config).unwrap().into_shared();

    let ids: Vec<MaterialId> = {
        let mut guard = residency.lock();
        (0..8)
            .map(|i| guard.materials.create(Material::plastic(Vec3::splat(i as f32 / 8.0))))
            .collect()
    };

    let workers: Vec<_> = ids
        .chunks(2)
        .map(|chunk| {
            let residency = Arc::clone(&residency);
            let backend = Arc::clone(&backend);
            let chunk = chunk.to_vec();
            thread::spawn(move || {
                for _ in 0..50 {
                    for id in &chunk {
                        let mut guard = residency.lock();
                        // Four threads with two materials each can exceed four slots.
                        if guard.materials.use_material(backend.as_ref(), *id).is_ok() {
                            assert!(guard.materials.slots().slot(*id).unwrap().is_some());
                            guard.materials.release(backend.as_ref(), *id).unwrap();
                        }
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let guard = residency.lock();
    assert_eq!(guard.materials.usage(), 0);
    for id in &ids {
        assert_eq!(guard.materials.slots().usage_count(*id).unwrap(), 0);
    }
    let contents = backend.buffer_contents(guard.materials.slots().buffer()).unwrap();
    assert!(contents.iter().all(|b| *b == 0));
}

#[test]
fn test_usage_is_counted_across_threads() {
    common::init_logging();
    let backend = Arc::new(DummyBackend::new());
    let config = ResidencyConfig::default()
        .with_material_capacity(1)
        .with_shadow_map_resolution(16)
        .with_texture_size(16);
    let residency = Residency::new(backend.as_ref(), &config).unwrap().into_shared();
    let shared = residency.lock().materials.create(Material::gold());

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let residency = Arc::clone(&residency);
            let backend = Arc::clone(&backend);
            thread::spawn(move || {
                let slot = residency
                    .lock()
                    .materials
                    .use_material(backend.as_ref(), shared)
                    .unwrap();
                assert_eq!(slot, 0);
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let mut guard = residency.lock();
    assert_eq!(guard.materials.slots().usage_count(shared).unwrap(), 4);
    for _ in 0..4 {
        guard.materials.release(backend.as_ref(), shared).unwrap();
    }
    assert_eq!(guard.materials.slots().slot(shared).unwrap(), None);
}
