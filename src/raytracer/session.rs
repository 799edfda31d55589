use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use nalgebra_glm as glm;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use thiserror::Error;

use crate::raytracer::bvh::{self, BvhNode, FlatBvhNode};
use crate::raytracer::camera::Camera;
use crate::raytracer::gpu::GpuRenderer;
use crate::raytracer::kernel;
use crate::raytracer::pixel::PixelBuffer;
use crate::raytracer::profile::{Phase, ProfileCounters, ProfileSummary};
use crate::raytracer::tile::{generate_tiles, Tile, TileQueue};
use crate::raytracer::Scene;

/// Base seed used by `start`; worker streams derive from it per tile.
pub const DEFAULT_SEED: u64 = 12345;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("image dimensions cannot be zero: ({0}, {1})")]
    ImageSize(u32, u32),
    #[error("samples_per_pixel must be at least 1")]
    ZeroSamples,
    #[error("vfov must be inside (0, 180) degrees, got {0}")]
    VfovOutOfRange(f32),
    #[error("defocus_angle cannot be negative, got {0}")]
    DefocusAngle(f32),
    #[error("focus_dist must be greater than zero, got {0}")]
    FocusDist(f32),
    #[error("failed to spawn a render worker")]
    WorkerSpawn(#[from] std::io::Error),
}

/// Everything the workers read or touch while the render runs. Camera,
/// scene and the flat BVH are immutable after `start`; the queue counters
/// and the abort flag are the only cross-thread synchronization.
struct SharedState {
    camera: Camera,
    scene: Scene,
    nodes: Vec<FlatBvhNode>,
    queue: TileQueue,
    buffer: PixelBuffer,
    abort: AtomicBool,
    base_seed: u64,
}

enum Backend {
    Cpu {
        workers: Vec<JoinHandle<ProfileCounters>>,
    },
    Gpu {
        thread: Option<JoinHandle<Option<Vec<u8>>>>,
        current_sample: Arc<AtomicU32>,
        total_samples: u32,
    },
}

/// A non-blocking render. One lifecycle per session:
/// `start -> (progress | pixels)* -> finish -> drop`.
pub struct RenderSession {
    shared: Arc<SharedState>,
    backend: Backend,
    /// Pointer-tree form of the BVH, dropped at finish.
    tree: Option<BvhNode>,
    started: Instant,
    summary: Option<ProfileSummary>,
    gpu_image: Option<Vec<u8>>,
}

impl RenderSession {
    /// Spawns CPU workers and returns immediately.
    pub fn start(
        camera: Camera,
        scene: Scene,
        num_threads: usize,
    ) -> Result<Self, RenderError> {
        Self::start_with_seed(camera, scene, num_threads, DEFAULT_SEED)
    }

    pub fn start_with_seed(
        camera: Camera,
        scene: Scene,
        num_threads: usize,
        seed: u64,
    ) -> Result<Self, RenderError> {
        let (shared, tree) = prepare(camera, scene, seed)?;
        let backend = spawn_cpu_workers(&shared, num_threads)?;
        Ok(Self {
            shared,
            backend,
            tree,
            started: Instant::now(),
            summary: None,
            gpu_image: None,
        })
    }

    /// Tries the GPU backend first and silently falls back to the CPU path
    /// when no usable device exists. Externally both behave the same.
    pub fn start_auto(
        camera: Camera,
        scene: Scene,
        num_threads: usize,
        use_gpu: bool,
    ) -> Result<Self, RenderError> {
        if !use_gpu {
            return Self::start(camera, scene, num_threads);
        }

        let (shared, tree) = prepare(camera, scene, DEFAULT_SEED)?;
        let total_samples = shared.camera.samples_per_pixel;

        match GpuRenderer::init(&shared.camera, &shared.scene, &shared.nodes, total_samples) {
            Ok(renderer) => {
                let backend = spawn_gpu_driver(&shared, renderer)?;
                Ok(Self {
                    shared,
                    backend,
                    tree,
                    started: Instant::now(),
                    summary: None,
                    gpu_image: None,
                })
            }
            Err(err) => {
                log::warn!("GPU backend unavailable, falling back to CPU: {err}");
                let backend = spawn_cpu_workers(&shared, num_threads)?;
                Ok(Self {
                    shared,
                    backend,
                    tree,
                    started: Instant::now(),
                    summary: None,
                    gpu_image: None,
                })
            }
        }
    }

    /// Fraction of the work finished so far. Safe to call at any time from
    /// any thread holding the session.
    pub fn progress(&self) -> f32 {
        match &self.backend {
            Backend::Cpu { .. } => self.shared.queue.progress(),
            Backend::Gpu {
                current_sample,
                total_samples,
                ..
            } => {
                if *total_samples == 0 {
                    return 1.0;
                }
                current_sample.load(Ordering::Acquire) as f32 / *total_samples as f32
            }
        }
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self.backend, Backend::Gpu { .. })
    }

    /// `(accumulated, total)` samples per pixel on the GPU path.
    pub fn gpu_samples(&self) -> Option<(u32, u32)> {
        match &self.backend {
            Backend::Cpu { .. } => None,
            Backend::Gpu {
                current_sample,
                total_samples,
                ..
            } => Some((current_sample.load(Ordering::Acquire), *total_samples)),
        }
    }

    /// Requests a cooperative stop; workers exit at the next tile boundary
    /// (the GPU driver at the next dispatch boundary). `finish` still joins.
    pub fn abort(&self) {
        self.shared.abort.store(true, Ordering::Relaxed);
    }

    /// Blocks until every worker has exited, aggregates the per-worker
    /// profile counters and releases the BVH tree form. Calling it a second
    /// time is a no-op.
    pub fn finish(&mut self) {
        if self.summary.is_some() {
            return;
        }

        let backend = std::mem::replace(
            &mut self.backend,
            Backend::Cpu {
                workers: Vec::new(),
            },
        );

        let summary = match backend {
            Backend::Cpu { workers } => {
                let mut counters = Vec::with_capacity(workers.len());
                for handle in workers {
                    match handle.join() {
                        Ok(c) => counters.push(c),
                        Err(_) => log::error!("render worker panicked"),
                    }
                }
                ProfileSummary::aggregate(&counters, self.started.elapsed())
            }
            Backend::Gpu {
                thread,
                current_sample,
                total_samples,
            } => {
                if let Some(handle) = thread {
                    match handle.join() {
                        Ok(image) => self.gpu_image = image,
                        Err(_) => log::error!("GPU driver thread panicked"),
                    }
                }
                self.backend = Backend::Gpu {
                    thread: None,
                    current_sample,
                    total_samples,
                };
                ProfileSummary::aggregate(&[], self.started.elapsed())
            }
        };

        self.tree = None;
        self.summary = Some(summary);
    }

    /// Aggregated profile; `Some` once `finish` has run.
    pub fn profile(&self) -> Option<&ProfileSummary> {
        self.summary.as_ref()
    }

    /// Linear-light snapshot of the framebuffer. Mid-render this is a
    /// preview mixing finished and unwritten pixels.
    pub fn pixels(&self) -> Vec<[f32; 3]> {
        self.shared.buffer.snapshot()
    }

    pub fn width(&self) -> u32 {
        self.shared.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.shared.buffer.height()
    }

    /// Gamma-corrected 8-bit image. On a finished GPU session this is the
    /// backend's own readback; otherwise it is converted from the linear
    /// framebuffer.
    pub fn to_rgba(&self) -> image::RgbaImage {
        let (width, height) = (self.width(), self.height());
        if let Some(bytes) = &self.gpu_image {
            if let Some(image) = image::RgbaImage::from_raw(width, height, bytes.clone()) {
                return image;
            }
        }
        crate::raytracer::color::to_rgba_image(&self.shared.buffer.snapshot(), width, height)
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        // completion fence: never leave worker threads running past the
        // session that owns their shared state
        if self.summary.is_none() {
            self.abort();
            self.finish();
        }
    }
}

fn prepare(
    mut camera: Camera,
    scene: Scene,
    seed: u64,
) -> Result<(Arc<SharedState>, Option<BvhNode>), RenderError> {
    camera.validate()?;
    camera.init();

    let buffer = PixelBuffer::new(camera.image_width, camera.image_height);
    let tiles = generate_tiles(camera.image_width, camera.image_height);
    let tree = bvh::build(&scene.spheres);
    let nodes = tree.as_ref().map(bvh::flatten).unwrap_or_default();

    let shared = Arc::new(SharedState {
        camera,
        scene,
        nodes,
        queue: TileQueue::new(tiles),
        buffer,
        abort: AtomicBool::new(false),
        base_seed: seed,
    });
    Ok((shared, tree))
}

fn spawn_cpu_workers(
    shared: &Arc<SharedState>,
    num_threads: usize,
) -> Result<Backend, RenderError> {
    let num_threads = num_threads.max(1);
    let mut workers = Vec::with_capacity(num_threads);
    for i in 0..num_threads {
        let shared = Arc::clone(shared);
        let handle = std::thread::Builder::new()
            .name(format!("render-worker-{i}"))
            .spawn(move || worker_loop(&shared))?;
        workers.push(handle);
    }
    Ok(Backend::Cpu { workers })
}

/// Claims tiles until the queue drains or an abort is requested. The RNG is
/// owned by the worker and reseeded per tile from `base_seed + tile_index`,
/// which makes the image independent of the tile-to-worker assignment.
fn worker_loop(shared: &SharedState) -> ProfileCounters {
    let mut profile = ProfileCounters::default();

    while !shared.abort.load(Ordering::Relaxed) {
        let Some((index, tile)) = shared.queue.claim() else {
            break;
        };
        let mut rng =
            Xoshiro256PlusPlus::seed_from_u64(shared.base_seed.wrapping_add(index as u64));
        render_tile(shared, &tile, &mut rng, &mut profile);
        shared.queue.mark_completed();
    }
    profile
}

fn render_tile(
    shared: &SharedState,
    tile: &Tile,
    rng: &mut Xoshiro256PlusPlus,
    profile: &mut ProfileCounters,
) {
    let camera = &shared.camera;
    let scale = camera.pixel_samples_scale();

    for y in tile.start_y..tile.end_y {
        for x in tile.start_x..tile.end_x {
            let mut accumulated = glm::vec3(0.0_f32, 0.0, 0.0);
            for _ in 0..camera.samples_per_pixel {
                let ray = profile.timed(Phase::RayGen, || camera.get_ray(x, y, rng));
                accumulated += kernel::trace(
                    &ray,
                    camera.max_depth,
                    &shared.scene,
                    &shared.nodes,
                    rng,
                    profile,
                );
            }
            profile.timed(Phase::PixelSetup, || {
                shared.buffer.store(x, y, &(accumulated * scale))
            });
        }
    }
}

/// Drives the GPU backend: one sample per dispatch, publishing the running
/// average into the shared framebuffer after each one. Returns the final
/// gamma-corrected readback.
fn spawn_gpu_driver(
    shared: &Arc<SharedState>,
    mut renderer: GpuRenderer,
) -> Result<Backend, RenderError> {
    let current_sample = Arc::new(AtomicU32::new(0));
    let total_samples = shared.camera.samples_per_pixel;

    let shared = Arc::clone(shared);
    let progress = Arc::clone(&current_sample);
    let thread = std::thread::Builder::new()
        .name("render-gpu".to_string())
        .spawn(move || -> Option<Vec<u8>> {
            loop {
                let (current, total) = renderer.samples();
                if current >= total {
                    break;
                }
                if shared.abort.load(Ordering::Relaxed) {
                    return None;
                }

                renderer.dispatch();
                match renderer.readback_linear() {
                    Ok(linear) => shared.buffer.publish(&linear),
                    Err(err) => {
                        log::error!("GPU readback failed: {err}");
                        return None;
                    }
                }
                progress.store(renderer.samples().0, Ordering::Release);
            }

            match renderer.readback_rgba() {
                Ok(image) => Some(image),
                Err(err) => {
                    log::error!("final GPU readback failed: {err}");
                    None
                }
            }
        })?;

    Ok(Backend::Gpu {
        thread: Some(thread),
        current_sample,
        total_samples,
    })
}
