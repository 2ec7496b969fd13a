use std::path::PathBuf;
use std::sync::Arc;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use dagal::headless::{HeadlessConfig, HeadlessDevice};
use dagal::prelude::*;
use rand::Rng;
use tracing::Level;

use crate::codec::TextureUpdateRange;
use crate::image::{self as decode, ColorFormat, DecodedImage, PLACEHOLDER_SIZE, TextureSource};
use crate::{
    BufferLoadDesc, ResourceLoader, StreamingConfig, StreamingError, TextureLoadDesc, TokenStatus,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(Level::TRACE)
        .try_init();
}

fn setup(config: StreamingConfig) -> (Arc<HeadlessDevice>, ResourceLoader<HeadlessDevice>) {
    init_tracing();
    let device = Arc::new(HeadlessDevice::new(HeadlessConfig::default()).unwrap());
    let loader = ResourceLoader::new(device.clone(), config).unwrap();
    (device, loader)
}

fn small_ring() -> StreamingConfig {
    StreamingConfig {
        staging_buffer_size: 256,
        staging_buffer_count: 2,
    }
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::rng().fill(&mut bytes[..]);
    bytes
}

fn device_buffer(size: u64) -> BufferDesc {
    BufferDesc::new(
        size,
        MemoryLocation::GpuOnly,
        BufferUsage::VERTEX | BufferUsage::TRANSFER_DST,
    )
}

/// Unique scratch directory per call
fn scratch_dir() -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let dir = std::env::temp_dir().join(format!(
        "dare_streaming_{}_{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_png(width: u32, height: u32, pixel: impl Fn(u32, u32) -> [u8; 4]) -> PathBuf {
    let path = scratch_dir().join("image.png");
    ::image::RgbaImage::from_fn(width, height, |x, y| ::image::Rgba(pixel(x, y)))
        .save(&path)
        .unwrap();
    path
}

#[test]
fn test_buffer_round_trip() {
    let (device, loader) = setup(StreamingConfig::default());
    let data = random_bytes(1024);
    let (buffer, token) = loader
        .add_buffer(BufferLoadDesc::new(device_buffer(1024)).with_data(&data))
        .unwrap();
    assert!(token > 0);
    loader.wait_for_token(token).unwrap();
    assert!(loader.is_token_completed(token));
    assert_eq!(device.read_buffer(&buffer), data);

    let patch = random_bytes(128);
    let mut update = loader.begin_update_buffer(&buffer, 256, 128).unwrap();
    assert_eq!(update.size(), 128);
    update.mapped().copy_from_slice(&patch);
    let token = loader.end_update_buffer(update).unwrap();
    loader.wait_for_token(token).unwrap();

    let mut expected = data.clone();
    expected[256..384].copy_from_slice(&patch);
    assert_eq!(device.read_buffer(&buffer), expected);
    assert_eq!(device.validation_errors(), 0);
}

#[test]
fn test_update_out_of_bounds_is_rejected() {
    let (_device, loader) = setup(StreamingConfig::default());
    let (buffer, _) = loader
        .add_buffer(BufferLoadDesc::new(device_buffer(64)))
        .unwrap();
    assert!(matches!(
        loader.begin_update_buffer(&buffer, 48, 32),
        Err(StreamingError::InvalidRequest(_))
    ));
    assert!(matches!(
        loader.begin_update_buffer(&buffer, 0, 0),
        Err(StreamingError::InvalidRequest(_))
    ));
    let data = random_bytes(65);
    assert!(matches!(
        loader.add_buffer(BufferLoadDesc::new(device_buffer(64)).with_data(&data)),
        Err(StreamingError::InvalidRequest(_))
    ));
}

#[test]
fn test_staging_capacity_boundary() {
    let (device, loader) = setup(small_ring());
    let exact = random_bytes(256);
    let (buffer, token) = loader
        .add_buffer(BufferLoadDesc::new(device_buffer(256)).with_data(&exact))
        .unwrap();
    loader.wait_for_token(token).unwrap();
    assert_eq!(device.read_buffer(&buffer), exact);
    let stats = loader.stats();
    assert_eq!(stats.ring_allocations, 1);
    assert_eq!(stats.temp_allocations, 0);
    drop(loader);

    let (device, loader) = setup(small_ring());
    let over = random_bytes(257);
    let (buffer, token) = loader
        .add_buffer(BufferLoadDesc::new(device_buffer(257)).with_data(&over))
        .unwrap();
    loader.wait_for_token(token).unwrap();
    assert_eq!(device.read_buffer(&buffer), over);
    assert_eq!(loader.stats().temp_allocations, 1);
}

#[test]
fn test_large_buffer_is_chunked() {
    let (device, loader) = setup(small_ring());
    let data = random_bytes(256 * 10 + 17);
    let (buffer, token) = loader
        .add_buffer(BufferLoadDesc::new(device_buffer(data.len() as u64)).with_data(&data))
        .unwrap();
    loader.wait_for_token(token).unwrap();
    assert_eq!(device.read_buffer(&buffer), data);
    assert_eq!(loader.stats().requests_executed, 11);
}

#[test]
fn test_force_reset_zeroes() {
    let (device, loader) = setup(small_ring());
    let (buffer, token) = loader
        .add_buffer(BufferLoadDesc::new(device_buffer(600)).zeroed())
        .unwrap();
    loader.wait_for_token(token).unwrap();
    assert_eq!(device.read_buffer(&buffer), vec![0u8; 600]);
}

#[test]
fn test_paused_device_blocks_wait() {
    let (device, loader) = setup(StreamingConfig::default());
    device.pause();
    let data = random_bytes(64);
    let (buffer, token) = loader
        .add_buffer(BufferLoadDesc::new(device_buffer(64)).with_data(&data))
        .unwrap();

    std::thread::scope(|scope| {
        let waiter = scope.spawn(|| loader.wait_for_token(token));
        std::thread::sleep(Duration::from_millis(100));
        assert!(!loader.is_token_completed(token));
        assert!(!waiter.is_finished());
        assert_eq!(loader.token_status(token).unwrap(), TokenStatus::Pending);

        device.resume();
        waiter.join().unwrap().unwrap();
    });
    assert!(loader.is_token_completed(token));
    assert_eq!(device.read_buffer(&buffer), data);
}

#[test]
fn test_concurrent_producers() {
    const PRODUCERS: usize = 4;
    const UPLOADS: usize = 25;
    let (device, loader) = setup(small_ring());

    let buffers = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let loader = &loader;
                scope.spawn(move || {
                    (0..UPLOADS)
                        .map(|upload| {
                            let fill = (producer * UPLOADS + upload) as u8;
                            let (buffer, token) = loader
                                .add_buffer(
                                    BufferLoadDesc::new(device_buffer(64)).with_data(&[fill; 64]),
                                )
                                .unwrap();
                            (buffer, token, fill)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>()
    });

    let total = (PRODUCERS * UPLOADS) as u64;
    assert_eq!(loader.last_token_issued(), total);
    let mut tokens: Vec<_> = buffers.iter().map(|(_, token, _)| *token).collect();
    tokens.sort_unstable();
    tokens.dedup();
    assert_eq!(tokens.len() as u64, total);

    loader.wait_for_all_resource_loads().unwrap();
    assert!(loader.all_resource_loads_completed());
    assert_eq!(loader.last_token_completed(), total);
    assert_eq!(loader.stats().requests_executed, total);
    for (buffer, _, fill) in &buffers {
        assert_eq!(device.read_buffer(buffer), vec![*fill; 64]);
    }
}

#[test]
fn test_png_mip_chain() {
    let (device, loader) = setup(StreamingConfig::default());
    // one flat colour per 128x128 quadrant
    let path = write_png(256, 256, |x, y| [(x / 128) as u8 * 200, (y / 128) as u8 * 200, 30, 255]);
    let (pending, token) = loader
        .load_texture(TextureLoadDesc::new(TextureSource::File(path)).with_mipmaps())
        .unwrap();
    loader.wait_for_token(token).unwrap();

    let loaded = pending.get().unwrap();
    assert!(!loaded.is_placeholder());
    let desc = loaded.texture.desc();
    assert_eq!(desc.format, ImageFormat::R8G8B8A8Unorm);
    assert_eq!(desc.mip_levels, 9);
    assert_eq!(
        device.read_texture(&loaded.texture, 7, 0).unwrap(),
        vec![
            0, 0, 30, 255, 200, 0, 30, 255, //
            0, 200, 30, 255, 200, 200, 30, 255,
        ]
    );
    assert_eq!(
        device.read_texture(&loaded.texture, 8, 0).unwrap(),
        vec![100, 100, 30, 255]
    );
    for mip in 0..9 {
        assert_eq!(
            device.texture_state(&loaded.texture, mip, 0),
            Some(ResourceState::SHADER_RESOURCE)
        );
    }
    assert_eq!(device.validation_errors(), 0);
}

#[test]
fn test_srgb_load() {
    let (_device, loader) = setup(StreamingConfig::default());
    let path = write_png(4, 4, |x, y| [x as u8, y as u8, 0, 255]);
    let (pending, token) = loader
        .load_texture(TextureLoadDesc::new(TextureSource::File(path)).with_srgb())
        .unwrap();
    loader.wait_for_token(token).unwrap();
    let texture = pending.texture().unwrap();
    assert_eq!(texture.desc().format, ImageFormat::R8G8B8A8Srgb);
    assert_eq!(texture.desc().mip_levels, 1);
}

#[test]
fn test_missing_file_uses_placeholder() {
    let (device, loader) = setup(StreamingConfig::default());
    let missing = scratch_dir().join("missing.png");
    let mut contents = Vec::new();
    for _ in 0..2 {
        let (pending, token) = loader
            .load_texture(TextureLoadDesc::new(TextureSource::File(missing.clone())))
            .unwrap();
        loader.wait_for_token(token).unwrap();
        // the placeholder still completes its token normally
        assert_eq!(loader.token_status(token).unwrap(), TokenStatus::Completed);
        let loaded = pending.get().unwrap();
        assert!(loaded.is_placeholder());
        assert_eq!(loaded.texture.desc().width, PLACEHOLDER_SIZE);
        contents.push(device.read_texture(&loaded.texture, 0, 0).unwrap());
    }
    assert_eq!(contents[0], contents[1]);
    assert_eq!(contents[0], decode::placeholder().pixels);
    assert_eq!(loader.stats().placeholder_substitutions, 2);
}

#[test]
fn test_cube_cross_load() {
    let (device, loader) = setup(StreamingConfig::default());
    // every cell of the 4x3 cross is filled with its column index
    let path = write_png(64, 48, |x, _| [(x / 16) as u8 * 50, 0, 0, 255]);
    let (pending, token) = loader
        .load_texture(TextureLoadDesc::new(TextureSource::CubeCross(path)))
        .unwrap();
    loader.wait_for_token(token).unwrap();

    let loaded = pending.get().unwrap();
    assert!(!loaded.is_placeholder());
    let desc = loaded.texture.desc();
    assert_eq!((desc.width, desc.height, desc.array_layers), (16, 16, 6));
    assert!(desc.flags.contains(TextureFlags::CUBE));
    // +X sits in column 2, -Z in column 3
    assert_eq!(device.read_texture(&loaded.texture, 0, 0).unwrap()[0], 100);
    assert_eq!(device.read_texture(&loaded.texture, 0, 5).unwrap()[0], 150);
    assert_eq!(device.validation_errors(), 0);
}

#[test]
fn test_cube_face_mismatch_uses_placeholder() {
    let (_device, loader) = setup(StreamingConfig::default());
    let small = write_png(8, 8, |_, _| [1, 2, 3, 255]);
    let large = write_png(16, 16, |_, _| [1, 2, 3, 255]);
    let faces = [
        small.clone(),
        small.clone(),
        small.clone(),
        small.clone(),
        small,
        large,
    ];
    let (pending, token) = loader
        .load_texture(TextureLoadDesc::new(TextureSource::CubeFaces(faces)))
        .unwrap();
    loader.wait_for_token(token).unwrap();
    let loaded = pending.get().unwrap();
    assert!(loaded.is_placeholder());
    assert_eq!(loaded.texture.desc().array_layers, 6);
}

#[test]
fn test_decoded_source_with_gray_pixels() {
    let (device, loader) = setup(StreamingConfig::default());
    let image = DecodedImage::new(2, 2, ColorFormat::Gray, ChannelType::U8, vec![1, 2, 3, 4]).unwrap();
    let (pending, token) = loader
        .load_texture(TextureLoadDesc::new(TextureSource::Decoded(image)))
        .unwrap();
    loader.wait_for_token(token).unwrap();
    let texture = pending.texture().unwrap();
    assert_eq!(texture.desc().format, ImageFormat::R8Unorm);
    assert_eq!(device.read_texture(texture, 0, 0).unwrap(), vec![1, 2, 3, 4]);
}

#[test]
fn test_gradient_mip_chain_is_box_filtered() {
    let (device, loader) = setup(StreamingConfig::default());
    let mut pixels = Vec::new();
    for y in 0..4u8 {
        for x in 0..4u8 {
            let red = 16 * x + 64 * y;
            pixels.extend_from_slice(&[red, 255 - red, 0, 255]);
        }
    }
    let image = DecodedImage::new(4, 4, ColorFormat::Rgba, ChannelType::U8, pixels).unwrap();
    let (pending, token) = loader
        .load_texture(TextureLoadDesc::new(TextureSource::Decoded(image)).with_mipmaps())
        .unwrap();
    loader.wait_for_token(token).unwrap();

    let texture = pending.texture().unwrap();
    assert_eq!(texture.desc().mip_levels, 3);
    // every level is the 2x2 average of the level above it
    assert_eq!(
        device.read_texture(texture, 1, 0).unwrap(),
        vec![
            40, 215, 0, 255, 72, 183, 0, 255, //
            168, 87, 0, 255, 200, 55, 0, 255,
        ]
    );
    assert_eq!(device.read_texture(texture, 2, 0).unwrap(), vec![120, 135, 0, 255]);
    assert_eq!(device.validation_errors(), 0);
}

#[test]
fn test_decoded_source_with_short_pixels_uses_placeholder() {
    let (device, loader) = setup(StreamingConfig::default());
    // built without `DecodedImage::new`, so the pixel count is never checked up front
    let image = DecodedImage {
        width: 4,
        height: 4,
        color: ColorFormat::Rgba,
        channel: ChannelType::U8,
        pixels: vec![7; 3],
    };
    let (pending, token) = loader
        .load_texture(TextureLoadDesc::new(TextureSource::Decoded(image)))
        .unwrap();
    loader.wait_for_token(token).unwrap();

    assert_eq!(loader.token_status(token).unwrap(), TokenStatus::Completed);
    let loaded = pending.get().unwrap();
    assert!(loaded.is_placeholder());
    assert_eq!(loaded.texture.desc().width, PLACEHOLDER_SIZE);
    assert_eq!(
        device.read_texture(&loaded.texture, 0, 0).unwrap(),
        decode::placeholder().pixels
    );
    assert_eq!(loader.stats().placeholder_substitutions, 1);
    assert_eq!(loader.stats().invalid_requests, 0);
}

#[test]
fn test_texture_update_round_trip() {
    let (device, loader) = setup(StreamingConfig::default());
    let (texture, token) = loader
        .add_texture(TextureDesc {
            format: ImageFormat::R8G8B8A8Unorm,
            width: 4,
            height: 4,
            array_layers: 2,
            mip_levels: 2,
            ..Default::default()
        })
        .unwrap();
    assert!(token > 0);

    let mut update = loader
        .begin_update_texture(
            &texture,
            TextureUpdateRange::full(texture.desc()),
            ResourceState::SHADER_RESOURCE,
        )
        .unwrap();
    assert_eq!(update.layouts().len(), 4);
    let mut expected = Vec::new();
    for layer in 0..2 {
        for mip in 0..2 {
            let side = 4 >> mip;
            let bytes = random_bytes(side * side * 4);
            update.write_subresource(mip, layer, &bytes).unwrap();
            expected.push((mip, layer, bytes));
        }
    }
    assert!(update.write_subresource(0, 0, &[0u8; 3]).is_err());
    let token = loader.end_update_texture(update).unwrap();
    loader.wait_for_token(token).unwrap();

    for (mip, layer, bytes) in expected {
        assert_eq!(device.read_texture(&texture, mip, layer).unwrap(), bytes);
        assert_eq!(
            device.texture_state(&texture, mip, layer),
            Some(ResourceState::SHADER_RESOURCE)
        );
    }
    assert_eq!(device.validation_errors(), 0);
}

#[test]
fn test_generated_mips_from_update() {
    let (device, loader) = setup(StreamingConfig::default());
    let (texture, _) = loader
        .add_texture(TextureDesc {
            format: ImageFormat::R8G8B8A8Unorm,
            width: 2,
            height: 2,
            mip_levels: 2,
            ..Default::default()
        })
        .unwrap();
    let mut update = loader
        .begin_update_texture(
            &texture,
            TextureUpdateRange::base_level(texture.desc()),
            ResourceState::SHADER_RESOURCE,
        )
        .unwrap();
    update.generate_mips = true;
    update
        .write_subresource(
            0,
            0,
            &[10, 0, 0, 255, 20, 0, 0, 255, 30, 0, 0, 255, 40, 0, 0, 255],
        )
        .unwrap();
    let token = loader.end_update_texture(update).unwrap();
    loader.wait_for_token(token).unwrap();
    assert_eq!(device.read_texture(&texture, 1, 0).unwrap(), vec![25, 0, 0, 255]);
    assert_eq!(device.validation_errors(), 0);
}

#[test]
fn test_invalid_request_completes_as_invalid() {
    let (device, loader) = setup(StreamingConfig::default());
    let (texture, _) = loader
        .add_texture(TextureDesc {
            format: ImageFormat::Bc1RgbaUnorm,
            width: 8,
            height: 8,
            mip_levels: 2,
            ..Default::default()
        })
        .unwrap();
    let mut update = loader
        .begin_update_texture(
            &texture,
            TextureUpdateRange::base_level(texture.desc()),
            ResourceState::SHADER_RESOURCE,
        )
        .unwrap();
    // compressed formats cannot be blitted
    update.generate_mips = true;
    let invalid = loader.end_update_texture(update).unwrap();

    let data = random_bytes(16);
    let (buffer, valid) = loader
        .add_buffer(BufferLoadDesc::new(device_buffer(16)).with_data(&data))
        .unwrap();
    loader.wait_for_all_resource_loads().unwrap();

    assert!(loader.is_token_completed(invalid));
    assert_eq!(loader.token_status(invalid).unwrap(), TokenStatus::Invalid);
    assert_eq!(loader.token_status(valid).unwrap(), TokenStatus::Completed);
    assert_eq!(loader.stats().invalid_requests, 1);
    assert_eq!(device.read_buffer(&buffer), data);
    assert_eq!(device.validation_errors(), 0);
}

#[test]
fn test_shutdown_drains_queue() {
    let (device, loader) = setup(small_ring());
    let uploads: Vec<_> = (0..32u8)
        .map(|fill| {
            let (buffer, _) = loader
                .add_buffer(BufferLoadDesc::new(device_buffer(100)).with_data(&[fill; 100]))
                .unwrap();
            (buffer, fill)
        })
        .collect();
    drop(loader);
    for (buffer, fill) in uploads {
        assert_eq!(device.read_buffer(&buffer), vec![fill; 100]);
    }
}

#[test]
fn test_device_loss_fails_waits() {
    let (device, loader) = setup(StreamingConfig::default());
    device.pause();
    let (_buffer, token) = loader
        .add_buffer(BufferLoadDesc::new(device_buffer(64)).with_data(&[7; 64]))
        .unwrap();
    device.lose_device();

    assert!(matches!(
        loader.wait_for_token(token),
        Err(StreamingError::DeviceLost(_))
    ));
    assert!(matches!(
        loader.wait_for_all_resource_loads(),
        Err(StreamingError::DeviceLost(_))
    ));
    assert!(loader.add_buffer(BufferLoadDesc::new(device_buffer(64))).is_err());
}

#[test]
fn test_start_state_barrier() {
    let (device, loader) = setup(StreamingConfig::default());
    let (buffer, token) = loader
        .add_buffer(BufferLoadDesc::new(device_buffer(64)))
        .unwrap();
    assert!(token > 0);
    loader.wait_for_token(token).unwrap();
    assert_eq!(
        device.buffer_state(&buffer),
        ResourceState::VERTEX_AND_CONSTANT_BUFFER
    );

    let (texture, token) = loader
        .add_texture(TextureDesc {
            format: ImageFormat::R32Sfloat,
            flags: TextureFlags::STORAGE,
            ..Default::default()
        })
        .unwrap();
    loader.wait_for_token(token).unwrap();
    assert_eq!(
        device.texture_state(&texture, 0, 0),
        Some(ResourceState::UNORDERED_ACCESS)
    );
}

#[test]
fn test_empty_data_takes_start_state_path() {
    let (device, loader) = setup(StreamingConfig::default());
    // an unrelated request holds the latest token
    let (_other, other) = loader
        .add_buffer(BufferLoadDesc::new(device_buffer(16)).with_data(&[1; 16]))
        .unwrap();
    let (buffer, token) = loader
        .add_buffer(BufferLoadDesc::new(device_buffer(64)).with_data(&[]))
        .unwrap();
    assert!(token > other);
    loader.wait_for_token(token).unwrap();
    assert_eq!(
        device.buffer_state(&buffer),
        ResourceState::VERTEX_AND_CONSTANT_BUFFER
    );
}

/// Collects formatted log lines written on the current thread
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_inferred_texture_start_state_is_reported() {
    let (device, loader) = setup(StreamingConfig::default());
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::WARN)
        .with_ansi(false)
        .with_writer({
            let logs = logs.clone();
            move || logs.clone()
        })
        .finish();
    let (texture, token) = tracing::subscriber::with_default(subscriber, || {
        loader
            .add_texture(TextureDesc {
                format: ImageFormat::R8G8B8A8Unorm,
                name: Some("albedo".to_string()),
                ..Default::default()
            })
            .unwrap()
    });
    loader.wait_for_token(token).unwrap();

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("WARN"));
    assert!(output.contains("albedo"));
    assert!(output.contains("SHADER_RESOURCE"));
    assert_eq!(
        device.texture_state(&texture, 0, 0),
        Some(ResourceState::SHADER_RESOURCE)
    );
}

#[test]
fn test_completed_watermark_never_decreases() {
    const PRODUCERS: usize = 6;
    const UPLOADS: usize = 40;
    for staging_buffer_count in [1, 3] {
        let (device, loader) = setup(StreamingConfig {
            staging_buffer_size: 256,
            staging_buffer_count,
        });
        let (buffer, _) = loader
            .add_buffer(BufferLoadDesc::new(device_buffer(PRODUCERS as u64 * 64)))
            .unwrap();
        let producing = AtomicBool::new(true);

        std::thread::scope(|scope| {
            let sampler = scope.spawn(|| {
                let mut last = 0;
                let mut samples = 0u64;
                while producing.load(Ordering::Acquire) || !loader.all_resource_loads_completed() {
                    let completed = loader.last_token_completed();
                    assert!(completed >= last, "watermark went from {last} to {completed}");
                    last = completed;
                    samples += 1;
                }
                samples
            });
            let producers: Vec<_> = (0..PRODUCERS)
                .map(|producer| {
                    let (loader, buffer) = (&loader, &buffer);
                    scope.spawn(move || {
                        for upload in 0..UPLOADS {
                            let mut update = loader
                                .begin_update_buffer(buffer, producer as u64 * 64, 64)
                                .unwrap();
                            update.mapped().fill(upload as u8);
                            loader.end_update_buffer(update).unwrap();
                        }
                    })
                })
                .collect();
            for producer in producers {
                producer.join().unwrap();
            }
            producing.store(false, Ordering::Release);
            assert!(sampler.join().unwrap() > 0);
        });

        loader.wait_for_all_resource_loads().unwrap();
        assert_eq!(loader.last_token_completed(), loader.last_token_issued());
        // each producer's last write wins its own range
        assert_eq!(
            device.read_buffer(&buffer),
            vec![(UPLOADS - 1) as u8; PRODUCERS * 64]
        );
    }
}

#[test]
fn test_host_visible_buffer_is_immediate() {
    let (device, loader) = setup(StreamingConfig::default());
    let data = random_bytes(48);
    let (buffer, token) = loader
        .add_buffer(
            BufferLoadDesc::new(BufferDesc::new(
                48,
                MemoryLocation::CpuToGpu,
                BufferUsage::UNIFORM,
            ))
            .with_data(&data),
        )
        .unwrap();
    assert_eq!(token, 0);
    assert!(loader.is_token_completed(token));
    assert_eq!(device.read_buffer(&buffer), data);

    let mut update = loader.begin_update_buffer(&buffer, 8, 8).unwrap();
    update.mapped().fill(0xAB);
    assert_eq!(loader.end_update_buffer(update).unwrap(), 0);
    assert_eq!(&device.read_buffer(&buffer)[8..16], &[0xAB; 8]);
}

#[tokio::test]
async fn test_async_wait() {
    let (device, loader) = setup(StreamingConfig::default());
    let data = random_bytes(32);
    let (buffer, token) = loader
        .add_buffer(BufferLoadDesc::new(device_buffer(32)).with_data(&data))
        .unwrap();
    loader.wait_for_token_async(token).await.unwrap();
    assert_eq!(device.read_buffer(&buffer), data);
}
