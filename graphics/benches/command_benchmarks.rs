use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use lattice_graphics::{
    BackendType, BufferDescriptor, DeviceOptions, GraphicsDevice, PixelFormat, RgbaFloat,
    TextureDescriptor, TextureUsage,
};

fn device(backend: BackendType) -> Option<GraphicsDevice> {
    if !backend.is_compiled() {
        return None;
    }
    GraphicsDevice::new(DeviceOptions::new(backend).with_size(64, 64)).ok()
}

// ---------------------------------------------------------------------------
// Resource creation
// ---------------------------------------------------------------------------

fn bench_create_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_buffer_4k");
    for backend in BackendType::ALL {
        let Some(device) = device(backend) else {
            continue;
        };
        let factory = device.create_factory();
        group.bench_function(BenchmarkId::from_parameter(backend), |b| {
            b.iter(|| black_box(factory.create_buffer(&BufferDescriptor::vertex(4096)).unwrap()));
        });
    }
    group.finish();
}

fn bench_create_texture(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_texture_256");
    for backend in BackendType::ALL {
        let Some(device) = device(backend) else {
            continue;
        };
        let factory = device.create_factory();
        let descriptor =
            TextureDescriptor::new_2d(256, 256, PixelFormat::Rgba8Unorm, TextureUsage::SAMPLED)
                .with_full_mip_chain();
        group.bench_function(BenchmarkId::from_parameter(backend), |b| {
            b.iter(|| black_box(factory.create_texture_2d(&descriptor).unwrap()));
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Recording and execution
// ---------------------------------------------------------------------------

fn bench_record_and_execute_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_execute_64_updates");
    let data = [0x5Au8; 256];
    for backend in BackendType::ALL {
        let Some(device) = device(backend) else {
            continue;
        };
        let factory = device.create_factory();
        let buffer = factory
            .create_buffer(&BufferDescriptor::vertex(256 * 64))
            .unwrap();
        let mut list = factory.create_command_list().unwrap();
        group.bench_function(BenchmarkId::from_parameter(backend), |b| {
            b.iter(|| {
                list.reset().unwrap();
                for i in 0..64u64 {
                    list.update_buffer(&buffer, i * 256, &data).unwrap();
                }
                device.execute_commands(&mut list).unwrap();
            });
        });
        device.wait_for_idle().unwrap();
    }
    group.finish();
}

fn bench_clear_and_present(c: &mut Criterion) {
    let mut group = c.benchmark_group("clear_and_present");
    for backend in BackendType::ALL {
        let Some(device) = device(backend) else {
            continue;
        };
        let factory = device.create_factory();
        let mut list = factory.create_command_list().unwrap();
        group.bench_function(BenchmarkId::from_parameter(backend), |b| {
            b.iter(|| {
                list.reset().unwrap();
                list.set_framebuffer(&device.swapchain_framebuffer()).unwrap();
                list.clear_color_target(0, RgbaFloat::CORNFLOWER_BLUE).unwrap();
                list.clear_depth_target(1.0, 0).unwrap();
                device.execute_commands(&mut list).unwrap();
                device.swap_buffers().unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_create_buffer,
    bench_create_texture,
    bench_record_and_execute_updates,
    bench_clear_and_present,
);
criterion_main!(benches);
