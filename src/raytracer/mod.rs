pub use camera::Camera;
pub use gpu::{GpuError, GpuRenderer};
pub use kernel::{sky_color, trace};
pub use math::{Ray, Vec3};
pub use profile::{Phase, ProfileCounters, ProfileSummary};
pub use session::{RenderError, RenderSession, DEFAULT_SEED};
pub use tile::{generate_tiles, Tile, TILE_SIZE};

use nalgebra_glm as glm;
use rand::Rng;

pub mod aabb;
pub mod bvh;
pub mod camera;
pub mod color;
pub mod gpu;
pub mod interval;
pub mod kernel;
pub mod math;
pub mod pixel;
pub mod profile;
pub mod session;
pub mod tile;

use aabb::Aabb;
use interval::Interval;
use math::{random_unit_vector, reflect, refract, unit_vector};

/// The closed set of surface models. Dispatch is a plain match; adding a
/// material means one new variant, one scatter arm and one shader case.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Material {
    Lambertian { albedo: Vec3 },
    Metallic { albedo: Vec3, fuzz: f32 },
    Dielectric { refraction_index: f32 },
}

impl Material {
    /// Returns the attenuation and the scattered ray, or `None` when the
    /// ray is absorbed.
    pub fn scatter(
        &self,
        ray_in: &Ray,
        hit: &HitRecord,
        rng: &mut impl Rng,
    ) -> Option<(Vec3, Ray)> {
        match *self {
            Material::Lambertian { albedo } => {
                let mut direction = hit.normal + random_unit_vector(rng);
                if direction.norm_squared() < 1e-16 {
                    direction = hit.normal;
                }
                Some((albedo, Ray::new(hit.p, direction)))
            }
            Material::Metallic { albedo, fuzz } => {
                let reflected = reflect(&unit_vector(&ray_in.direction), &hit.normal)
                    + fuzz * random_unit_vector(rng);
                if glm::dot(&reflected, &hit.normal) <= 0.0 {
                    return None;
                }
                Some((albedo, Ray::new(hit.p, reflected)))
            }
            Material::Dielectric { refraction_index } => {
                let ri = if hit.front_face {
                    1.0 / refraction_index
                } else {
                    refraction_index
                };
                let uv = unit_vector(&ray_in.direction);
                let cos_theta = glm::dot(&-uv, &hit.normal).min(1.0);
                let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();

                let cannot_refract = ri * sin_theta > 1.0;
                let direction = if cannot_refract || reflectance(cos_theta, ri) > rng.gen::<f32>()
                {
                    reflect(&uv, &hit.normal)
                } else {
                    refract(&uv, &hit.normal, ri)
                };
                Some((glm::vec3(1.0, 1.0, 1.0), Ray::new(hit.p, direction)))
            }
        }
    }
}

/// Schlick's approximation for reflectance.
pub fn reflectance(
    cosine: f32,
    refraction_index: f32,
) -> f32 {
    let mut r0 = (1.0 - refraction_index) / (1.0 + refraction_index);
    r0 = r0 * r0;
    r0 + (1.0 - r0) * (1.0 - cosine).powi(5)
}

#[derive(Clone, Copy, Debug)]
pub struct HitRecord {
    pub p: Vec3,
    pub normal: Vec3,
    pub t: f32,
    pub front_face: bool,
    pub material: Material,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
    pub material: Material,
}

impl Sphere {
    pub fn new(
        center: Vec3,
        radius: f32,
        material: Material,
    ) -> Self {
        Self {
            center,
            radius,
            material,
        }
    }

    pub fn bounding_box(&self) -> Aabb {
        let rvec = glm::vec3(self.radius, self.radius, self.radius);
        Aabb::from_points(self.center - rvec, self.center + rvec)
    }

    pub fn hit(
        &self,
        ray: &Ray,
        ray_t: Interval,
    ) -> Option<HitRecord> {
        let oc = self.center - ray.origin;
        let a = glm::dot(&ray.direction, &ray.direction);
        let h = glm::dot(&ray.direction, &oc);
        let c = glm::dot(&oc, &oc) - self.radius * self.radius;

        let discriminant = h * h - a * c;
        if discriminant < 0.0 {
            return None;
        }
        let sqrtd = num::Float::sqrt(discriminant);

        // Find the nearest root that lies in the acceptable range.
        let mut root = (h - sqrtd) / a;
        if !ray_t.surrounds(root) {
            root = (h + sqrtd) / a;
            if !ray_t.surrounds(root) {
                return None;
            }
        }

        let p = ray.at(root);
        let outward_normal = (p - self.center) / self.radius;
        let front_face = glm::dot(&ray.direction, &outward_normal) < 0.0;

        Some(HitRecord {
            p,
            normal: if front_face {
                outward_normal
            } else {
                -outward_normal
            },
            t: root,
            front_face,
            material: self.material,
        })
    }
}

/// An ordered sequence of spheres. Read-only once a session has started.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub spheres: Vec<Sphere>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            spheres: Vec::new(),
        }
    }

    pub fn push(
        &mut self,
        sphere: Sphere,
    ) {
        self.spheres.push(sphere);
    }

    pub fn len(&self) -> usize {
        self.spheres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty()
    }
}
