//! Headless scene demo
//!
//! Brings up a Vulkan device without a window and builds a cube mesh, a
//! texture bound through its own sampler set and an offscreen framebuffer.
//! It then spins the mesh for a few frames, logging its matrices and
//! clearing the framebuffer once per frame.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use vk_scene::foundation::logging;
use vk_scene::prelude::*;
use vk_scene::ash::vk;
use vk_scene::render::vulkan::DEPTH_FORMAT_CANDIDATES;

use crate::config::DemoConfig;

const DEFAULT_CONFIG: &str = "scene_demo/scene.toml";
const COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

#[derive(Debug, Error)]
enum DemoError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Vulkan(#[from] VulkanError),
}

/// Unit cube, eight corners shared by twelve triangles
const CUBE_VERTICES: [[f32; 3]; 8] = [
    [-0.5, -0.5, -0.5],
    [0.5, -0.5, -0.5],
    [0.5, 0.5, -0.5],
    [-0.5, 0.5, -0.5],
    [-0.5, -0.5, 0.5],
    [0.5, -0.5, 0.5],
    [0.5, 0.5, 0.5],
    [-0.5, 0.5, 0.5],
];

const CUBE_INDICES: [u32; 36] = [
    0, 2, 1, 0, 3, 2, // back
    4, 5, 6, 4, 6, 7, // front
    0, 1, 5, 0, 5, 4, // bottom
    3, 7, 6, 3, 6, 2, // top
    0, 4, 7, 0, 7, 3, // left
    1, 2, 6, 1, 6, 5, // right
];

fn main() {
    let path = std::env::args().nth(1).map_or_else(|| PathBuf::from(DEFAULT_CONFIG), PathBuf::from);

    let config = match load_config(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", path.display());
            std::process::exit(2);
        }
    };

    logging::init_with_level(&config.renderer.log_level);
    log::info!("Starting scene demo with {}", path.display());

    match run(&config) {
        Ok(()) => log::info!("Scene demo finished successfully"),
        Err(e) => {
            log::error!("Scene demo failed: {e}");
            std::process::exit(1);
        }
    }
}

fn load_config(path: &Path) -> Result<DemoConfig, ConfigError> {
    let config = if path.exists() {
        DemoConfig::load_from_file(path)?
    } else {
        DemoConfig::default()
    };
    config.validate()?;
    Ok(config)
}

fn run(config: &DemoConfig) -> Result<(), DemoError> {
    let instance = Arc::new(VulkanInstance::new(&config.renderer)?);
    let device = Arc::new(Device::new(instance, &config.renderer)?);
    log::info!(
        "Device ready: {} (uniform alignment {})",
        device.physical().name(),
        device.limits().min_uniform_buffer_offset_alignment
    );

    let layout = mesh_descriptor_layout(device.clone())?;
    let texture_layout = texture_descriptor_layout(device.clone())?;
    let pool = DescriptorPool::new(device.clone(), config.renderer.max_descriptor_sets)?;
    let commands = CommandPool::new(device.clone())?;

    let geometry = Arc::new(GeometryBuffer::new(device.clone(), &CUBE_VERTICES, Some(&CUBE_INDICES[..]))?);
    let texture = Arc::new(match &config.mesh.texture {
        Some(path) => TextureBuffer::from_file(device.clone(), &commands, path)?,
        None => TextureBuffer::solid_color(device.clone(), &commands, [255, 255, 255, 255])?,
    });

    let texture_set = pool.allocate(texture_layout.handle())?;
    pool.bind_texture(texture_set, TEXTURE_BINDING, &texture)?;

    let depth_format = device.find_supported_format(
        &DEPTH_FORMAT_CANDIDATES,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    )?;
    let render_pass = RenderPass::offscreen(device.clone(), COLOR_FORMAT, depth_format)?;
    let (width, height) = config.framebuffer;
    let framebuffer = FrameBuffer::new(device.clone(), &render_pass, vk::Extent2D { width, height })?;

    let mut mesh = Mesh::new(device.clone(), pool.handle(), layout.handle(), geometry)?.with_texture(texture);
    let setup = &config.mesh;
    mesh.set_position(setup.position, false);
    mesh.set_orientation(setup.orientation, false);
    mesh.set_scale(setup.scale, false);
    mesh.set_origin(setup.origin, false);
    mesh.update_transform();
    mesh.set_material_settings(setup.material)?;

    log::info!(
        "Mesh ready: set {:?}, texture set {:?} ({}), framebuffer {}",
        mesh.descriptor_set(),
        texture_set,
        mesh.texture().is_some_and(|t| t.is_ready()),
        framebuffer.is_ready()
    );

    for frame in 0..config.frames {
        let mut orientation = mesh.orientation();
        orientation.y = (orientation.y + config.degrees_per_frame) % 360.0;
        mesh.set_orientation(orientation, true);

        log::debug!("Frame {frame}: orientation {:?}", orientation.as_slice());
        log::debug!("Frame {frame}: model {:?}", mesh.model_matrix().as_slice());

        clear_frame(&device, &commands, &render_pass, &framebuffer, frame)?;
    }

    compare_strategies(&mut mesh, setup.compare_strategy);

    device.wait_idle()?;
    pool.free(texture_set)?;
    Ok(())
}

/// Run the offscreen pass once; with no pipeline bound it only clears
fn clear_frame(
    device: &Device,
    commands: &CommandPool,
    render_pass: &RenderPass,
    framebuffer: &FrameBuffer,
    frame: u32,
) -> VulkanResult<()> {
    let shade = (frame % 16) as f32 / 16.0;
    let clear_values = [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [shade, 0.1, 0.2, 1.0],
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
        },
    ];

    let begin_info = vk::RenderPassBeginInfo::builder()
        .render_pass(render_pass.handle())
        .framebuffer(framebuffer.handle())
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: framebuffer.extent(),
        })
        .clear_values(&clear_values);

    device.ensure_ready("frame submission")?;
    commands.submit_once(|raw, command_buffer| unsafe {
        raw.cmd_begin_render_pass(command_buffer, &begin_info, vk::SubpassContents::INLINE);
        raw.cmd_end_render_pass(command_buffer);
    })
}

/// Log how far another rotation strategy's model matrix lands from the
/// current one, then restore the original strategy
fn compare_strategies(mesh: &mut Mesh<Device>, other: RotationStrategy) {
    let original = mesh.element().rotation_strategy();
    let reference = *mesh.model_matrix();

    mesh.set_rotation_strategy(other, true);
    let difference = (mesh.model_matrix() - reference).abs().max();
    log::info!("{original:?} vs {other:?}: max element difference {difference:.6}");

    mesh.set_rotation_strategy(original, true);
}
