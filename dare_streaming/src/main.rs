use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use dagal::headless::{HeadlessConfig, HeadlessDevice};
use dagal::resource::{BufferDesc, BufferUsage, MemoryLocation};
use dare_streaming::prelude::*;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

const VERTEX_COUNT: usize = 64 * 1024;

/// Streams a vertex buffer and every image given on the command line through a headless device
fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = StreamingConfig::from_env();
    let device = Arc::new(HeadlessDevice::new(HeadlessConfig::default())?);
    let loader = ResourceLoader::new(device.clone(), config).context("starting resource loader")?;
    let start = Instant::now();

    let vertices: Vec<[f32; 4]> = (0..VERTEX_COUNT)
        .map(|i| [i as f32, (i * 2) as f32, (i * 3) as f32, 1.0])
        .collect();
    let (vertex_buffer, vertex_token) = loader.add_buffer(
        BufferLoadDesc::new(
            BufferDesc::new(
                std::mem::size_of_val(vertices.as_slice()) as u64,
                MemoryLocation::GpuOnly,
                BufferUsage::VERTEX | BufferUsage::TRANSFER_DST,
            )
            .with_name("Demo vertices"),
        )
        .with_data(bytemuck::cast_slice(&vertices)),
    )?;

    let mut update = loader.begin_update_buffer(&vertex_buffer, 0, 16)?;
    update
        .mapped()
        .copy_from_slice(bytemuck::cast_slice(&[-1.0f32, -1.0, -1.0, 1.0]));
    let update_token = loader.end_update_buffer(update)?;

    let textures = std::env::args()
        .skip(1)
        .map(|path| {
            let desc = TextureLoadDesc::new(TextureSource::File(PathBuf::from(&path)))
                .with_mipmaps()
                .with_name(path);
            loader.load_texture(desc)
        })
        .collect::<Result<Vec<_>, _>>()?;

    loader.wait_for_token(vertex_token.max(update_token))?;
    info!(
        "Vertex buffer ready after {:?}, first vertex {:?}",
        start.elapsed(),
        &device.read_buffer(&vertex_buffer)[..16]
    );

    loader.wait_for_all_resource_loads()?;
    for (pending, token) in &textures {
        match pending.get() {
            Some(loaded) if loaded.is_placeholder() => {
                warn!("Token {token} fell back to the placeholder texture")
            }
            Some(loaded) => info!("Token {token} loaded {:?}", loaded.texture),
            None => warn!("Token {token} completed without a texture"),
        }
    }
    info!(
        "Streaming finished in {:?}: {:?}",
        start.elapsed(),
        loader.stats()
    );
    Ok(())
}
