//! Progressive Monte Carlo path tracer for analytic spheres, with two
//! interchangeable backends behind one non-blocking session: multi-threaded
//! CPU tile rendering and a wgpu compute shader. Hosts poll `progress`,
//! read partial pixels at any time, and `finish` to join.
//!
//! ```no_run
//! use glimmer::raytracer::{Camera, Material, RenderSession, Scene, Sphere};
//! use nalgebra_glm as glm;
//!
//! let mut scene = Scene::new();
//! scene.push(Sphere::new(
//!     glm::vec3(0.0, 0.0, -1.0),
//!     0.5,
//!     Material::Lambertian {
//!         albedo: glm::vec3(0.5, 0.5, 0.5),
//!     },
//! ));
//!
//! let camera = Camera::new(320, 180, 16);
//! let mut session = RenderSession::start(camera, scene, 4).unwrap();
//! while session.progress() < 1.0 {
//!     std::thread::sleep(std::time::Duration::from_millis(50));
//! }
//! session.finish();
//! let image = session.to_rgba();
//! # let _ = image;
//! ```

pub mod raytracer;

pub use raytracer::{
    Camera, GpuError, GpuRenderer, Material, Ray, RenderError, RenderSession, Scene, Sphere, Vec3,
};
