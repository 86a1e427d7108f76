//! Residency integration tests.
//!
//! Every test is parameterized over backends with `rstest`; the WebGPU case
//! returns early when no adapter is available.
//!
//! ```bash
//! cargo test --test residency_tests
//! ```

mod common;

use glam::{Vec3, Vec4};
use rstest::rstest;

use common::{Backend, TestContext};
use slotted_renderer::resources::{MaterialRecord, ShadowMapRecord};
use slotted_renderer::scene::{DirectionalLight, LightId, SpotLight};
use slotted_renderer::{
    Field, Material, MaterialDescriptor, MaterialManager, MaterialManagerConfig, Residency,
    ResidencyConfig, ResidencyState, ShadowMap, ShadowMapConfig, ShadowMapper, SlotError,
    TextureData, TextureLookup, WgpuBackend,
};

const MATERIAL_SIZE: u64 = 96;
const SHADOW_SIZE: u64 = 80;

fn materials(ctx: &TestContext, capacity: u32) -> MaterialManager {
    MaterialManager::new(ctx.device(), &MaterialManagerConfig { capacity })
        .expect("Failed to create materials")
}

fn shadows(ctx: &TestContext, capacity: u32) -> ShadowMapper {
    let config = ShadowMapConfig::default()
        .with_capacity(capacity)
        .with_resolution(64);
    ShadowMapper::new(ctx.device(), &config).expect("Failed to create shadow mapper")
}

fn material_bytes(material: &Material) -> Vec<u8> {
    bytemuck::bytes_of(&material.record()).to_vec()
}

// ============================================================================
// Slot Lifecycle Tests
// ============================================================================

/// Two slots, three materials: the third only fits once the first is released,
/// and it lands in the freed slot with its own record.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_capacity_two_reuses_freed_slot(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let device = ctx.device();
    let mut materials = materials(&ctx, 2);

    let a = materials.create(Material::plastic(Vec3::X));
    let b = materials.create(Material::rubber(Vec3::Y));
    let c = materials.create(Material::gold());

    assert_eq!(materials.use_material(device, a).unwrap(), 0);
    assert_eq!(materials.use_material(device, b).unwrap(), 1);
    assert_eq!(
        materials.use_material(device, c).unwrap_err(),
        SlotError::OutOfResources {
            kind: "material",
            capacity: 2
        }
    );

    materials.release(device, a).unwrap();
    assert_eq!(materials.usage(), 1);
    assert_eq!(materials.use_material(device, c).unwrap(), 0);

    let region = ctx.read(materials.slots().buffer(), 0, MATERIAL_SIZE);
    assert_eq!(region, material_bytes(materials.get(c).unwrap()));
    assert_ne!(region, material_bytes(materials.get(a).unwrap()));
}

/// Exhaustion never evicts, even resources that nobody is using.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_exhaustion_does_not_evict(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let device = ctx.device();
    let mut materials = materials(&ctx, 3);

    let ids: Vec<_> = (0..3)
        .map(|i| materials.create(Material::new(&format!("m{}", i))))
        .collect();
    for id in &ids {
        materials.slots_mut().activate(device, *id).unwrap();
    }
    let extra = materials.create(Material::new("extra"));

    let err = materials.use_material(device, extra).unwrap_err();
    assert!(err.is_out_of_resources());
    for (slot, id) in ids.iter().enumerate() {
        assert_eq!(
            materials.slots().state(*id).unwrap(),
            ResidencyState::Resident { slot: slot as u32 }
        );
    }
    assert_eq!(materials.slots().state(extra).unwrap(), ResidencyState::Inactive);
}

/// Releasing the last user frees the slot and zero-fills its region on the device.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_release_zero_fills_device_region(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let device = ctx.device();
    let mut materials = materials(&ctx, 2);
    let keep = materials.create(Material::silver());
    let drop = materials.create(Material::emissive(Vec3::ONE));

    materials.use_material(device, keep).unwrap();
    let slot = materials.use_material(device, drop).unwrap();
    materials.release(device, drop).unwrap();

    assert_eq!(materials.slots().slot(drop).unwrap(), None);
    let region = ctx.read(materials.slots().buffer(), slot as u64 * MATERIAL_SIZE, MATERIAL_SIZE);
    assert!(region.iter().all(|b| *b == 0));
    assert_eq!(
        ctx.read(materials.slots().buffer(), 0, MATERIAL_SIZE),
        material_bytes(materials.get(keep).unwrap())
    );

    assert!(materials.release(device, drop).unwrap_err().is_invalid_state());
}

/// `update` rewrites exactly one record and leaves the rest of the buffer alone.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_update_rewrites_one_region(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let device = ctx.device();
    let mut materials = materials(&ctx, 3);
    let ids: Vec<_> = [Material::gold(), Material::silver(), Material::plastic(Vec3::Z)]
        .into_iter()
        .map(|m| materials.create(m))
        .collect();
    for id in &ids {
        materials.use_material(device, *id).unwrap();
    }
    let before = ctx.read(materials.slots().buffer(), 0, 3 * MATERIAL_SIZE);

    materials.get_mut(ids[1]).unwrap().diffuse = Vec4::new(0.1, 0.2, 0.3, 1.0);
    materials.update(device, ids[1]).unwrap();

    let after = ctx.read(materials.slots().buffer(), 0, 3 * MATERIAL_SIZE);
    let record = 96..192;
    assert_eq!(&after[..record.start], &before[..record.start]);
    assert_eq!(&after[record.end..], &before[record.end..]);
    assert_eq!(&after[record], material_bytes(materials.get(ids[1]).unwrap()).as_slice());
}

/// `update_all` leaves the device buffer equal to the encoding of every resident resource.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_update_all_syncs_whole_buffer(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let device = ctx.device();
    let mut materials = materials(&ctx, 4);
    let ids: Vec<_> = (0..3)
        .map(|i| materials.create(Material::new(&format!("m{}", i))))
        .collect();
    for id in &ids {
        materials.use_material(device, *id).unwrap();
    }
    for (i, id) in ids.iter().enumerate() {
        materials.get_mut(*id).unwrap().shininess = 2.0 * i as f32;
    }

    materials.update_all(device).unwrap();

    let contents = ctx.read(materials.slots().buffer(), 0, 4 * MATERIAL_SIZE);
    for (slot, id) in materials.slots().resident() {
        let start = (slot as u64 * MATERIAL_SIZE) as usize;
        let stored: MaterialRecord = bytemuck::pod_read_unaligned(&contents[start..start + 96]);
        assert_eq!(stored, materials.get(id).unwrap().record());
    }
    assert!(contents[3 * 96..].iter().all(|b| *b == 0));
}

// ============================================================================
// Descriptor Tests
// ============================================================================

/// Texture names resolve through the bundled library; unknown names change nothing.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_descriptor_resolves_library_textures(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let device = ctx.device();
    let config = ResidencyConfig::default()
        .with_material_capacity(4)
        .with_shadow_map_capacity(1)
        .with_shadow_map_resolution(32)
        .with_texture_capacity(2)
        .with_texture_size(16);
    let mut residency = Residency::new(device, &config).unwrap();

    residency
        .textures
        .insert(device, &TextureData::white(16).with_name("plaster"))
        .unwrap();
    let bricks = residency
        .textures
        .insert(
            device,
            &TextureData::checkerboard(16, [200, 80, 60, 255], [90, 90, 90, 255])
                .with_name("bricks"),
        )
        .unwrap();
    assert_eq!(residency.textures.resolve_texture("bricks"), Some(bricks));

    let wall = residency
        .create_material(
            MaterialDescriptor::new()
                .name("wall")
                .diffuse(Vec4::new(0.8, 0.8, 0.8, 1.0))
                .colour_texture(Some("bricks")),
        )
        .unwrap();
    let slot = residency.materials.use_material(device, wall).unwrap();
    let record: MaterialRecord = residency.materials.slots().record(slot).unwrap();
    assert_eq!(record.textures, [bricks as i32, -1, -1, -1]);

    // Clearing diffuse leaves the colour texture alone.
    residency
        .apply_material_descriptor(
            device,
            wall,
            MaterialDescriptor {
                diffuse: Field::Clear,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(residency.materials.get(wall).unwrap().textures.colour, Some(bricks));

    let err = residency
        .apply_material_descriptor(
            device,
            wall,
            MaterialDescriptor::new().shininess(1.0).normal_texture(Some("moss")),
        )
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(residency.materials.get(wall).unwrap().shininess, 32.0);

    // Clearing the colour texture reaches the device record.
    residency
        .apply_material_descriptor(device, wall, MaterialDescriptor::new().colour_texture(None))
        .unwrap();
    let stored = ctx.read(
        residency.materials.slots().buffer(),
        slot as u64 * MATERIAL_SIZE,
        MATERIAL_SIZE,
    );
    let stored: MaterialRecord = bytemuck::pod_read_unaligned(&stored);
    assert_eq!(stored.textures, [-1; 4]);
}

// ============================================================================
// Shadow Map Tests
// ============================================================================

/// Shadow records carry their layer and live flag; freed slots read back dead.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_shadow_map_records_on_device(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let device = ctx.device();
    let mut shadows = shadows(&ctx, 2);

    let sun = shadows.create(
        ShadowMap::directional("sun", &DirectionalLight::default(), Vec3::ZERO, 25.0)
            .with_light(LightId(0)),
    );
    let torch =
        shadows.create(ShadowMap::spot("torch", &SpotLight::default()).with_light(LightId(1)));
    let lamp = shadows.create(ShadowMap::new("lamp"));

    assert_eq!(shadows.use_shadow_map(device, sun).unwrap(), 0);
    assert_eq!(shadows.use_by_name(device, "torch").unwrap(), 1);
    assert!(shadows.use_shadow_map(device, lamp).unwrap_err().is_out_of_resources());

    let bytes = ctx.read(shadows.slots().buffer(), SHADOW_SIZE, SHADOW_SIZE);
    let record: ShadowMapRecord = bytemuck::pod_read_unaligned(&bytes);
    assert!(record.is_live());
    assert_eq!(record.layer(), 1);
    assert_eq!(record.view_proj, shadows.get(torch).unwrap().view_proj());

    shadows.release_by_name(device, "sun").unwrap();
    let bytes = ctx.read(shadows.slots().buffer(), 0, SHADOW_SIZE);
    let record: ShadowMapRecord = bytemuck::pod_read_unaligned(&bytes);
    assert!(!record.is_live());

    assert_eq!(shadows.use_shadow_map(device, lamp).unwrap(), 0);
    let passes = shadows.passes().unwrap();
    assert_eq!(
        passes.iter().map(|p| (p.slot, p.id)).collect::<Vec<_>>(),
        vec![(0, lamp), (1, torch)]
    );
}

// ============================================================================
// Teardown Tests
// ============================================================================

/// `destroy` empties the wgpu tables the host binds from.
#[test]
fn test_destroy_releases_wgpu_objects() {
    common::init_logging();
    let Ok(device) = WgpuBackend::new_headless() else {
        eprintln!("Backend {:?} not available, skipping", Backend::WebGpu);
        return;
    };
    let config = ResidencyConfig::default()
        .with_material_capacity(4)
        .with_shadow_map_capacity(2)
        .with_shadow_map_resolution(64)
        .with_texture_capacity(2)
        .with_texture_size(16);
    let residency = Residency::new(&device, &config).expect("Failed to create residency");

    let buffer = residency.materials.slots().buffer();
    let bind_group = residency.shadows.bind_group();
    let view = residency.textures.view();
    assert_eq!(device.with_buffer(buffer, |b| b.size()), Some(4 * MATERIAL_SIZE));
    assert!(device.with_bind_group(bind_group, |_| ()).is_some());
    assert!(device.with_texture_view(view, |_| ()).is_some());

    residency.destroy(&device);
    assert!(device.with_buffer(buffer, |_| ()).is_none());
    assert!(device.with_bind_group(bind_group, |_| ()).is_none());
    assert!(device.with_texture_view(view, |_| ()).is_none());
}
