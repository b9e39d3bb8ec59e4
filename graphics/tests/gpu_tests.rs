//! Device integration tests for the graphics crate.
//!
//! Every test opens a real device on the in-process native layer of a
//! backend and goes through the public API only. Tests are parameterized
//! with `rstest` to run against each compiled backend.
//!
//! # Test Categories
//!
//! - **Transfer Tests**: buffer and texture updates read back through the device
//! - **Render Tests**: clears and indexed draws reaching the native layer
//! - **Lifecycle Tests**: command list states, swapchain resize, destruction
//! - **Backend-Specific Tests**: thread affinity and deferred replay rules
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test gpu_tests
//!
//! # A single backend
//! cargo test --test gpu_tests --no-default-features --features opengl-backend
//! ```

mod common;

use std::sync::Arc;

use rstest::rstest;

use common::{QUAD_INDICES, SWAPCHAIN_SIZE, TestContext, solid_pixels};
use lattice_graphics::{
    BackendType, BindingResource, BufferDescriptor, CommandListState, CubeFace, DeviceOptions,
    DrawCall, GraphicsDevice, GraphicsError, MAX_RESOURCE_SETS, PixelFormat, PrimitiveTopology,
    ResourceKind, ResourceLayoutDescriptor, ResourceLayoutElement, ResourceSetDescriptor,
    RgbaFloat, SamplerDescriptor, ScissorRect, ShaderStages, TextureDescriptor, TextureRegion,
    TextureUsage,
};

// ============================================================================
// Transfer Tests
// ============================================================================

/// A full update followed by a partial one lands in the buffer in order.
#[rstest]
#[case::vulkan(BackendType::Vulkan)]
#[case::opengl(BackendType::OpenGl)]
#[case::d3d11(BackendType::D3D11)]
fn test_buffer_update_roundtrip(#[case] backend: BackendType) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {backend} not available, skipping");
        return;
    };

    let buffer = ctx
        .factory
        .create_buffer(&BufferDescriptor::uniform(64))
        .unwrap();
    let pattern: Vec<u8> = (0..64).collect();

    let mut list = ctx.command_list();
    list.update_buffer(&buffer, 0, &pattern).unwrap();
    list.update_buffer(&buffer, 16, &[0xAB; 16]).unwrap();
    ctx.device.execute_commands(&mut list).unwrap();

    let mut expected = pattern;
    expected[16..32].fill(0xAB);
    assert_eq!(ctx.device.read_buffer(&buffer).unwrap(), expected);
}

#[rstest]
#[case::vulkan(BackendType::Vulkan)]
#[case::opengl(BackendType::OpenGl)]
#[case::d3d11(BackendType::D3D11)]
fn test_buffer_update_out_of_bounds(#[case] backend: BackendType) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let buffer = ctx
        .factory
        .create_buffer(&BufferDescriptor::vertex(32))
        .unwrap();
    let mut list = ctx.command_list();
    assert!(matches!(
        list.update_buffer(&buffer, 24, &[0; 16]),
        Err(GraphicsError::OutOfBounds(_))
    ));
    assert!(list.update_buffer(&buffer, 16, &[0; 16]).is_ok());
}

/// Updating one mip level leaves the others untouched.
#[rstest]
#[case::vulkan(BackendType::Vulkan)]
#[case::opengl(BackendType::OpenGl)]
#[case::d3d11(BackendType::D3D11)]
fn test_texture_mip_update_roundtrip(#[case] backend: BackendType) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let texture = ctx
        .factory
        .create_texture_2d(
            &TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8Unorm, TextureUsage::SAMPLED)
                .with_mip_levels(2),
        )
        .unwrap();
    let base = solid_pixels(4, 4, [10, 20, 30, 255]);
    let mip = solid_pixels(2, 2, [200, 100, 50, 255]);

    let mut list = ctx.command_list();
    list.update_texture(&texture, &TextureRegion::full(4, 4), &base)
        .unwrap();
    list.update_texture(&texture, &TextureRegion::full(2, 2).with_mip_level(1), &mip)
        .unwrap();
    ctx.device.execute_commands(&mut list).unwrap();

    let read_base = ctx
        .device
        .read_texture(&texture, &TextureRegion::full(4, 4))
        .unwrap();
    let read_mip = ctx
        .device
        .read_texture(&texture, &TextureRegion::full(2, 2).with_mip_level(1))
        .unwrap();
    assert_eq!(read_base, base);
    assert_eq!(read_mip, mip);

    assert!(matches!(
        ctx.device
            .read_texture(&texture, &TextureRegion::full(2, 2).with_mip_level(2)),
        Err(GraphicsError::OutOfBounds(_))
    ));
}

/// Each cube face is addressed as `cube * 6 + face` on every backend.
#[rstest]
#[case::vulkan(BackendType::Vulkan)]
#[case::opengl(BackendType::OpenGl)]
#[case::d3d11(BackendType::D3D11)]
fn test_cube_faces_keep_their_order(#[case] backend: BackendType) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let cube = ctx
        .factory
        .create_texture_cube(&TextureDescriptor::new_cube(
            2,
            PixelFormat::Rgba8Unorm,
            TextureUsage::SAMPLED,
        ))
        .unwrap();
    let face_color = |face: CubeFace| {
        let value = 40 * (face.index() as u8 + 1);
        [value, 255 - value, face.index() as u8, 255]
    };

    let mut list = ctx.command_list();
    for face in CubeFace::ALL {
        let region = TextureRegion::full(2, 2).with_cube_face(0, face);
        list.update_texture(&cube, &region, &solid_pixels(2, 2, face_color(face)))
            .unwrap();
    }
    ctx.device.execute_commands(&mut list).unwrap();

    for face in CubeFace::ALL {
        let region = TextureRegion::full(2, 2).with_cube_face(0, face);
        assert_eq!(
            ctx.device.read_texture(&cube, &region).unwrap(),
            solid_pixels(2, 2, face_color(face)),
            "face {face:?}"
        );
    }
}

// ============================================================================
// Render Tests
// ============================================================================

#[rstest]
#[case::vulkan(BackendType::Vulkan)]
#[case::opengl(BackendType::OpenGl)]
#[case::d3d11(BackendType::D3D11)]
fn test_clear_offscreen_framebuffer(#[case] backend: BackendType) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let (texture, framebuffer) = ctx.create_offscreen(4, 4);
    let mut list = ctx.command_list();
    list.set_framebuffer(&framebuffer).unwrap();
    list.clear_color_target(0, RgbaFloat::RED).unwrap();
    assert!(matches!(
        list.clear_color_target(1, RgbaFloat::RED),
        Err(GraphicsError::OutOfBounds(_))
    ));
    assert!(matches!(
        list.clear_depth_target(1.0, 0),
        Err(GraphicsError::InvalidState(_))
    ));
    ctx.device.execute_commands(&mut list).unwrap();

    let pixels = ctx
        .device
        .read_texture(&texture, &TextureRegion::full(4, 4))
        .unwrap();
    assert_eq!(pixels, solid_pixels(4, 4, [255, 0, 0, 255]));
}

/// An indexed quad reaches the native layer exactly as recorded.
#[rstest]
#[case::vulkan(BackendType::Vulkan)]
#[case::opengl(BackendType::OpenGl)]
#[case::d3d11(BackendType::D3D11)]
fn test_indexed_quad_draw(#[case] backend: BackendType) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let swapchain = ctx.device.swapchain_framebuffer();
    let pipeline = ctx.create_quad_pipeline(swapchain.outputs().clone(), Vec::new());

    let mut list = ctx.command_list();
    let (vertices, indices) = ctx.create_quad_buffers(&mut list);
    list.set_framebuffer(&swapchain).unwrap();
    list.clear_color_target(0, RgbaFloat::CORNFLOWER_BLUE).unwrap();
    list.clear_depth_target(1.0, 0).unwrap();
    ctx.record_quad(&mut list, &swapchain, &pipeline, &vertices, &indices);
    ctx.device.execute_commands(&mut list).unwrap();
    ctx.device.swap_buffers().unwrap();
    ctx.device.wait_for_idle().unwrap();

    let draws = ctx.device.take_draw_calls();
    assert_eq!(
        draws,
        vec![DrawCall {
            indexed: true,
            count: QUAD_INDICES.len() as u32,
            instance_count: 1,
            first: 0,
            vertex_offset: 0,
            first_instance: 0,
            topology: PrimitiveTopology::TriangleList,
        }]
    );
    assert!(ctx.device.take_draw_calls().is_empty());

    let stats = ctx.device.statistics();
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.clears, 2);
    assert_eq!(stats.submissions, 1);
    assert_eq!(stats.presents, 1);
}

#[rstest]
#[case::vulkan(BackendType::Vulkan)]
#[case::opengl(BackendType::OpenGl)]
#[case::d3d11(BackendType::D3D11)]
fn test_draw_requires_complete_state(#[case] backend: BackendType) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let swapchain = ctx.device.swapchain_framebuffer();
    let (_, offscreen) = ctx.create_offscreen(4, 4);
    let pipeline = ctx.create_quad_pipeline(swapchain.outputs().clone(), Vec::new());

    let mut list = ctx.command_list();
    let (vertices, _) = ctx.create_quad_buffers(&mut list);
    assert!(matches!(list.draw(3, 1, 0, 0), Err(GraphicsError::InvalidState(_))));

    list.set_framebuffer(&offscreen).unwrap();
    list.set_pipeline(&pipeline).unwrap();
    list.set_vertex_buffer(0, &vertices).unwrap();
    // Pipeline outputs differ from the offscreen framebuffer.
    assert!(matches!(list.draw(3, 1, 0, 0), Err(GraphicsError::InvalidState(_))));

    list.set_framebuffer(&swapchain).unwrap();
    assert!(matches!(
        list.draw_indexed(3, 1, 0, 0, 0),
        Err(GraphicsError::InvalidState(_))
    ));
    assert!(list.draw(3, 1, 0, 0).is_ok());
}

/// Resource sets must match their layout positionally, and a pipeline only
/// draws with sets whose layout is compatible with its own.
#[rstest]
#[case::vulkan(BackendType::Vulkan)]
#[case::opengl(BackendType::OpenGl)]
#[case::d3d11(BackendType::D3D11)]
fn test_resource_set_matching(#[case] backend: BackendType) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let uniforms = ctx
        .factory
        .create_resource_layout(&ResourceLayoutDescriptor::new(vec![
            ResourceLayoutElement::new("camera", ResourceKind::UniformBuffer, ShaderStages::VERTEX),
        ]))
        .unwrap();
    let textures = ctx
        .factory
        .create_resource_layout(&ResourceLayoutDescriptor::new(vec![
            ResourceLayoutElement::new("albedo", ResourceKind::Texture, ShaderStages::FRAGMENT),
            ResourceLayoutElement::new("albedo_sampler", ResourceKind::Sampler, ShaderStages::FRAGMENT),
        ]))
        .unwrap();

    let camera = ctx
        .factory
        .create_buffer(&BufferDescriptor::uniform(64))
        .unwrap();
    let albedo = ctx.create_color_texture(2, 2);
    let sampler = ctx
        .factory
        .create_sampler(&SamplerDescriptor::linear())
        .unwrap();

    assert!(matches!(
        ctx.factory.create_resource_set(&ResourceSetDescriptor::new(
            Arc::clone(&uniforms),
            vec![BindingResource::Texture(Arc::clone(&albedo))],
        )),
        Err(GraphicsError::ResourceSetMismatch {
            slot: 0,
            expected: ResourceKind::UniformBuffer,
            found: ResourceKind::Texture,
        })
    ));
    assert!(matches!(
        ctx.factory.create_resource_set(&ResourceSetDescriptor::new(
            Arc::clone(&textures),
            vec![BindingResource::Texture(Arc::clone(&albedo))],
        )),
        Err(GraphicsError::ResourceCountMismatch {
            expected: 2,
            found: 1
        })
    ));

    let camera_set = ctx
        .factory
        .create_resource_set(&ResourceSetDescriptor::new(
            Arc::clone(&uniforms),
            vec![Arc::clone(&camera).into()],
        ))
        .unwrap();
    let texture_set = ctx
        .factory
        .create_resource_set(&ResourceSetDescriptor::new(
            Arc::clone(&textures),
            vec![Arc::clone(&albedo).into(), Arc::clone(&sampler).into()],
        ))
        .unwrap();

    let swapchain = ctx.device.swapchain_framebuffer();
    let pipeline = ctx.create_quad_pipeline(swapchain.outputs().clone(), vec![uniforms]);
    let mut list = ctx.command_list();
    let (vertices, indices) = ctx.create_quad_buffers(&mut list);
    list.set_framebuffer(&swapchain).unwrap();
    list.set_pipeline(&pipeline).unwrap();
    list.set_vertex_buffer(0, &vertices).unwrap();
    list.set_index_buffer(&indices, lattice_graphics::IndexFormat::UInt16)
        .unwrap();

    list.set_resource_set(0, &texture_set).unwrap();
    assert!(matches!(
        list.draw_indexed(6, 1, 0, 0, 0),
        Err(GraphicsError::InvalidState(_))
    ));

    list.set_resource_set(0, &camera_set).unwrap();
    list.draw_indexed(6, 1, 0, 0, 0).unwrap();
    ctx.device.execute_commands(&mut list).unwrap();
    ctx.device.wait_for_idle().unwrap();
    assert_eq!(ctx.device.take_draw_calls().len(), 1);
}

/// Slots past the set limit are rejected before any backend maps them to
/// native binding points.
#[rstest]
#[case::vulkan(BackendType::Vulkan)]
#[case::opengl(BackendType::OpenGl)]
#[case::d3d11(BackendType::D3D11)]
fn test_resource_set_slot_out_of_range(#[case] backend: BackendType) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let layout = ctx
        .factory
        .create_resource_layout(&ResourceLayoutDescriptor::new(vec![
            ResourceLayoutElement::new("camera", ResourceKind::UniformBuffer, ShaderStages::VERTEX),
        ]))
        .unwrap();
    let camera = ctx
        .factory
        .create_buffer(&BufferDescriptor::uniform(64))
        .unwrap();
    let set = ctx
        .factory
        .create_resource_set(&ResourceSetDescriptor::new(layout, vec![camera.into()]))
        .unwrap();

    let mut list = ctx.command_list();
    for slot in [MAX_RESOURCE_SETS, u32::MAX / 8, u32::MAX] {
        assert!(
            matches!(
                list.set_resource_set(slot, &set),
                Err(GraphicsError::OutOfBounds(_))
            ),
            "slot {slot}"
        );
    }
    list.set_resource_set(MAX_RESOURCE_SETS - 1, &set).unwrap();
    list.set_resource_set(0, &set).unwrap();
    ctx.device.execute_commands(&mut list).unwrap();
}

/// Scissor origins far off the top-left edge are clamped, not overflowed.
#[rstest]
#[case::vulkan(BackendType::Vulkan)]
#[case::opengl(BackendType::OpenGl)]
#[case::d3d11(BackendType::D3D11)]
fn test_scissor_with_extreme_origin(#[case] backend: BackendType) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let mut list = ctx.command_list();
    list.set_framebuffer(&ctx.device.swapchain_framebuffer())
        .unwrap();
    list.set_scissor_rect(&ScissorRect::new(i32::MIN, i32::MIN, 4, 4))
        .unwrap();
    list.set_scissor_rect(&ScissorRect::new(i32::MIN, 0, u32::MAX, 4))
        .unwrap();
    list.clear_color_target(0, RgbaFloat::BLUE).unwrap();
    ctx.device.execute_commands(&mut list).unwrap();
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

/// An executed list must be restarted before it can record or execute again.
#[rstest]
#[case::vulkan(BackendType::Vulkan)]
#[case::opengl(BackendType::OpenGl)]
#[case::d3d11(BackendType::D3D11)]
fn test_command_list_rerecord(#[case] backend: BackendType) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let buffer = ctx
        .factory
        .create_buffer(&BufferDescriptor::vertex(8))
        .unwrap();
    let mut list = ctx.command_list();
    assert_eq!(list.state(), CommandListState::Recording);
    list.update_buffer(&buffer, 0, &[1; 8]).unwrap();
    list.end().unwrap();
    assert_eq!(list.state(), CommandListState::Executable);
    assert!(matches!(
        list.update_buffer(&buffer, 0, &[2; 8]),
        Err(GraphicsError::InvalidState(_))
    ));
    assert!(matches!(list.end(), Err(GraphicsError::InvalidState(_))));

    ctx.device.execute_commands(&mut list).unwrap();
    assert!(matches!(
        ctx.device.execute_commands(&mut list),
        Err(GraphicsError::InvalidState(_))
    ));
    assert_eq!(ctx.device.read_buffer(&buffer).unwrap(), vec![1; 8]);

    list.begin().unwrap();
    assert_eq!(list.state(), CommandListState::Recording);
    list.update_buffer(&buffer, 0, &[2; 8]).unwrap();
    ctx.device.execute_commands(&mut list).unwrap();
    assert_eq!(ctx.device.read_buffer(&buffer).unwrap(), vec![2; 8]);

    list.reset().unwrap();
    list.update_buffer(&buffer, 4, &[3; 4]).unwrap();
    ctx.device.execute_commands(&mut list).unwrap();
    assert_eq!(
        ctx.device.read_buffer(&buffer).unwrap(),
        vec![2, 2, 2, 2, 3, 3, 3, 3]
    );
}

#[rstest]
#[case::vulkan(BackendType::Vulkan)]
#[case::opengl(BackendType::OpenGl)]
#[case::d3d11(BackendType::D3D11)]
fn test_resize_then_present(#[case] backend: BackendType) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let old = ctx.device.swapchain_framebuffer();
    assert_eq!((old.width(), old.height()), (SWAPCHAIN_SIZE, SWAPCHAIN_SIZE));

    ctx.device.resize_swapchain(8, 6).unwrap();
    let new = ctx.device.swapchain_framebuffer();
    assert!(old.is_retired());
    assert_eq!((new.width(), new.height()), (8, 6));
    assert_eq!(new.outputs(), old.outputs());

    let mut list = ctx.command_list();
    assert!(matches!(
        list.set_framebuffer(&old),
        Err(GraphicsError::InvalidState(_))
    ));
    list.set_framebuffer(&new).unwrap();
    list.set_full_viewport().unwrap();
    list.clear_color_target(0, RgbaFloat::GREEN).unwrap();
    ctx.device.execute_commands(&mut list).unwrap();
    ctx.device.swap_buffers().unwrap();
    assert_eq!(ctx.device.statistics().presents, 1);

    assert!(matches!(
        ctx.device.resize_swapchain(0, 6),
        Err(GraphicsError::InvalidDescriptor(_))
    ));
}

/// A resize the backend refuses leaves a usable swapchain at the old size.
#[rstest]
#[case::opengl(BackendType::OpenGl)]
#[case::d3d11(BackendType::D3D11)]
fn test_resize_off_owner_thread_keeps_swapchain(#[case] backend: BackendType) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let before = ctx.device.swapchain_framebuffer();
    let resized = std::thread::scope(|scope| {
        scope
            .spawn(|| ctx.device.resize_swapchain(8, 8))
            .join()
            .unwrap()
    });
    assert!(matches!(resized, Err(GraphicsError::WrongThread(_))));

    let current = ctx.device.swapchain_framebuffer();
    assert!(!before.is_retired());
    assert!(Arc::ptr_eq(&before, &current));
    assert_eq!(
        (current.width(), current.height()),
        (SWAPCHAIN_SIZE, SWAPCHAIN_SIZE)
    );

    let mut list = ctx.command_list();
    list.set_framebuffer(&current).unwrap();
    list.clear_color_target(0, RgbaFloat::RED).unwrap();
    ctx.device.execute_commands(&mut list).unwrap();
    ctx.device.swap_buffers().unwrap();
    assert_eq!(ctx.device.statistics().presents, 1);
}

/// Dropping every handle destroys the native objects once the device is idle.
#[rstest]
#[case::vulkan(BackendType::Vulkan)]
#[case::opengl(BackendType::OpenGl)]
#[case::d3d11(BackendType::D3D11)]
fn test_dropped_resources_are_destroyed(#[case] backend: BackendType) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };
    ctx.device.wait_for_idle().unwrap();
    let baseline = ctx.device.statistics().objects_live;

    let buffer = ctx
        .factory
        .create_buffer(&BufferDescriptor::vertex(64))
        .unwrap();
    let (texture, framebuffer) = ctx.create_offscreen(4, 4);
    let mut list = ctx.command_list();
    list.update_buffer(&buffer, 0, &[7; 64]).unwrap();
    list.set_framebuffer(&framebuffer).unwrap();
    list.clear_color_target(0, RgbaFloat::WHITE).unwrap();
    ctx.device.execute_commands(&mut list).unwrap();

    drop(list);
    drop(framebuffer);
    drop(texture);
    drop(buffer);
    ctx.device.wait_for_idle().unwrap();

    let stats = ctx.device.statistics();
    assert_eq!(stats.objects_live, baseline);
    assert_eq!(stats.pending_destructions, 0);
}

// ============================================================================
// Backend-Specific Tests
// ============================================================================

#[cfg(all(feature = "vulkan-backend", feature = "d3d11-backend"))]
#[test]
fn test_handles_are_bound_to_their_backend() {
    let vulkan = TestContext::new(BackendType::Vulkan).unwrap();
    let d3d11 = TestContext::new(BackendType::D3D11).unwrap();

    let buffer = vulkan
        .factory
        .create_buffer(&BufferDescriptor::vertex(16))
        .unwrap();
    let mut list = d3d11.command_list();
    assert_eq!(
        list.set_vertex_buffer(0, &buffer),
        Err(GraphicsError::BackendMismatch {
            expected: BackendType::D3D11,
            found: BackendType::Vulkan,
        })
    );
    assert!(matches!(
        d3d11.device.read_buffer(&buffer),
        Err(GraphicsError::BackendMismatch { .. })
    ));

    let mut vulkan_list = vulkan.command_list();
    assert_eq!(
        d3d11.device.execute_commands(&mut vulkan_list),
        Err(GraphicsError::BackendMismatch {
            expected: BackendType::D3D11,
            found: BackendType::Vulkan,
        })
    );
    // The rejected list is still usable on its own device.
    vulkan.device.execute_commands(&mut vulkan_list).unwrap();
}

/// Vulkan and OpenGL lists can be recorded on any thread and executed on
/// the device's thread.
#[rstest]
#[case::vulkan(BackendType::Vulkan)]
#[case::opengl(BackendType::OpenGl)]
fn test_parallel_recording(#[case] backend: BackendType) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let workers: Vec<_> = (0u8..4)
        .map(|worker| {
            let factory = ctx.factory.clone();
            std::thread::spawn(move || {
                let buffer = factory
                    .create_buffer(&BufferDescriptor::vertex(32))
                    .unwrap();
                let mut list = factory.create_command_list().unwrap();
                list.update_buffer(&buffer, 0, &[worker; 32]).unwrap();
                list.end().unwrap();
                (worker, buffer, list)
            })
        })
        .collect();

    let mut recorded: Vec<_> = workers
        .into_iter()
        .map(|worker| worker.join().unwrap())
        .collect();
    for (_, _, list) in &mut recorded {
        ctx.device.execute_commands(list).unwrap();
    }
    for (worker, buffer, _) in &recorded {
        assert_eq!(ctx.device.read_buffer(buffer).unwrap(), vec![*worker; 32]);
    }
    assert_eq!(ctx.device.statistics().submissions, 4);
}

#[cfg(feature = "d3d11-backend")]
#[test]
fn test_d3d11_context_is_thread_bound() {
    let ctx = TestContext::new(BackendType::D3D11).unwrap();
    let swapchain = ctx.device.swapchain_framebuffer();

    std::thread::scope(|scope| {
        let remote = scope.spawn(|| {
            let mut list = ctx.command_list();
            (
                list.set_framebuffer(&swapchain),
                ctx.device.swap_buffers(),
            )
        });
        let (record, present) = remote.join().unwrap();
        assert!(matches!(record, Err(GraphicsError::WrongThread(_))));
        assert!(matches!(present, Err(GraphicsError::WrongThread(_))));
    });

    // Resource creation is free-threaded.
    let factory = ctx.factory.clone();
    let created = std::thread::spawn(move || factory.create_buffer(&BufferDescriptor::vertex(16)))
        .join()
        .unwrap();
    assert!(created.is_ok());
}

/// `ResizeBuffers` fails while a list still holds the back buffer views; the
/// device republishes a live swapchain at the previous size.
#[cfg(feature = "d3d11-backend")]
#[test]
fn test_d3d11_failed_resize_restores_swapchain() {
    let ctx = TestContext::new(BackendType::D3D11).unwrap();
    let before = ctx.device.swapchain_framebuffer();

    let mut list = ctx.command_list();
    list.set_framebuffer(&before).unwrap();
    assert!(matches!(
        ctx.device.resize_swapchain(32, 32),
        Err(GraphicsError::Native { .. })
    ));

    let restored = ctx.device.swapchain_framebuffer();
    assert!(before.is_retired());
    assert!(!restored.is_retired());
    assert_eq!(
        (restored.width(), restored.height()),
        (SWAPCHAIN_SIZE, SWAPCHAIN_SIZE)
    );

    list.reset().unwrap();
    list.set_framebuffer(&restored).unwrap();
    list.clear_color_target(0, RgbaFloat::GREEN).unwrap();
    ctx.device.execute_commands(&mut list).unwrap();

    ctx.device.resize_swapchain(32, 32).unwrap();
    let resized = ctx.device.swapchain_framebuffer();
    assert!(restored.is_retired());
    assert_eq!((resized.width(), resized.height()), (32, 32));
}

#[cfg(feature = "opengl-backend")]
#[test]
fn test_opengl_disposal_waits_for_context_thread() {
    let ctx = TestContext::new(BackendType::OpenGl).unwrap();
    let buffer = ctx
        .factory
        .create_buffer(&BufferDescriptor::vertex(16))
        .unwrap();
    let mut list = ctx.command_list();
    list.update_buffer(&buffer, 0, &[1; 16]).unwrap();
    ctx.device.execute_commands(&mut list).unwrap();
    drop(list);
    let destroyed = ctx.device.statistics().objects_destroyed;

    std::thread::spawn(move || drop(buffer)).join().unwrap();
    assert_eq!(ctx.device.statistics().pending_destructions, 1);
    assert_eq!(ctx.device.statistics().objects_destroyed, destroyed);

    ctx.device.swap_buffers().unwrap();
    let stats = ctx.device.statistics();
    assert_eq!(stats.pending_destructions, 0);
    assert_eq!(stats.objects_destroyed, destroyed + 1);
}

/// A list recorded against the default framebuffer fails to replay after a
/// resize.
#[cfg(feature = "opengl-backend")]
#[test]
fn test_opengl_stale_default_framebuffer() {
    let ctx = TestContext::new(BackendType::OpenGl).unwrap();
    let mut list = ctx.command_list();
    list.set_framebuffer(&ctx.device.swapchain_framebuffer())
        .unwrap();
    list.clear_color_target(0, RgbaFloat::BLACK).unwrap();

    ctx.device.resize_swapchain(8, 8).unwrap();
    assert!(matches!(
        ctx.device.execute_commands(&mut list),
        Err(GraphicsError::InvalidState(_))
    ));

    list.reset().unwrap();
    list.set_framebuffer(&ctx.device.swapchain_framebuffer())
        .unwrap();
    list.clear_color_target(0, RgbaFloat::BLACK).unwrap();
    ctx.device.execute_commands(&mut list).unwrap();
}

#[cfg(feature = "vulkan-backend")]
#[test]
fn test_vulkan_requires_swapchain_extension() {
    common::init_logging();
    let options = DeviceOptions::new(BackendType::Vulkan).with_masked_extension("VK_KHR_swapchain");
    assert!(matches!(
        GraphicsDevice::new(options),
        Err(GraphicsError::MissingExtension(name)) if name == "VK_KHR_swapchain"
    ));
}

#[rstest]
#[case::vulkan(BackendType::Vulkan)]
#[case::opengl(BackendType::OpenGl)]
#[case::d3d11(BackendType::D3D11)]
fn test_debug_output_is_reported(#[case] backend: BackendType) {
    let Some(ctx) = TestContext::with_options(DeviceOptions::new(backend).with_debug(true)) else {
        return;
    };
    assert!(ctx.device.features().debug_output);
    assert_eq!(ctx.device.backend_type(), backend);
    assert_eq!(ctx.factory.backend_type(), backend);
}
