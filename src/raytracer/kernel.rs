use nalgebra_glm as glm;
use rand::Rng;

use crate::raytracer::bvh::{self, FlatBvhNode};
use crate::raytracer::interval::Interval;
use crate::raytracer::math::{unit_vector, Ray, Vec3};
use crate::raytracer::profile::{Phase, ProfileCounters};
use crate::raytracer::Scene;

/// Lower bound of the admissible interval; guards against re-intersecting
/// the surface a ray just left.
pub const T_MIN: f32 = 0.001;

/// White-to-blue vertical gradient.
pub fn sky_color(direction: &Vec3) -> Vec3 {
    let unit = unit_vector(direction);
    let a = 0.5 * (unit.y + 1.0);
    (1.0 - a) * glm::vec3(1.0, 1.0, 1.0) + a * glm::vec3(0.5, 0.7, 1.0)
}

/// Iterative path trace: follows a ray for at most `max_depth` bounces,
/// multiplying per-bounce attenuations into the running throughput. Returns
/// linear-light radiance.
pub fn trace(
    primary: &Ray,
    max_depth: u32,
    scene: &Scene,
    nodes: &[FlatBvhNode],
    rng: &mut impl Rng,
    profile: &mut ProfileCounters,
) -> Vec3 {
    let mut ray = *primary;
    let mut throughput = glm::vec3(1.0_f32, 1.0, 1.0);

    for _ in 0..max_depth {
        profile.count_ray();

        let hit = profile.timed(Phase::Intersect, || {
            bvh::hit_scene(
                nodes,
                &scene.spheres,
                &ray,
                Interval::with_bounds(T_MIN, f32::INFINITY),
            )
        });

        let Some(hit) = hit else {
            let sky = profile.timed(Phase::Background, || sky_color(&ray.direction));
            return throughput.component_mul(&sky);
        };

        match profile.timed(Phase::Scatter, || hit.material.scatter(&ray, &hit, rng)) {
            Some((attenuation, scattered)) => {
                throughput = throughput.component_mul(&attenuation);
                ray = scattered;
            }
            // absorbed
            None => return glm::vec3(0.0, 0.0, 0.0),
        }
    }

    // bounce budget exhausted
    glm::vec3(0.0, 0.0, 0.0)
}
