use nalgebra_glm as glm;
use rand::Rng;

pub use glm::Vec3;

/// `P(t) = origin + t * direction`. The direction is not normalized here;
/// callers that need a unit vector normalize explicitly.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(
        origin: Vec3,
        direction: Vec3,
    ) -> Self {
        Self { origin, direction }
    }

    pub fn at(
        &self,
        t: f32,
    ) -> Vec3 {
        self.origin + t * self.direction
    }
}

pub fn unit_vector(v: &Vec3) -> Vec3 {
    glm::normalize(v)
}

pub fn reflect(
    v: &Vec3,
    n: &Vec3,
) -> Vec3 {
    v - 2.0 * glm::dot(v, n) * n
}

// `uv` and `n` must be unit vectors.
// https://raytracing.github.io/images/fig-1.17-refraction.jpg
pub fn refract(
    uv: &Vec3,
    n: &Vec3,
    etai_over_etat: f32,
) -> Vec3 {
    let cos_theta = glm::dot(&-uv, n).min(1.0);
    let r_out_perp = etai_over_etat * (uv + cos_theta * n);
    let r_out_parallel = -(1.0 - r_out_perp.norm_squared()).abs().sqrt() * n;
    r_out_perp + r_out_parallel
}

/// Rejection-samples the unit ball, keeping candidates with a squared length
/// in `(1e-7, 1]`, and scales the survivor by its squared length.
pub fn random_unit_vector(rng: &mut impl Rng) -> Vec3 {
    loop {
        let p = glm::vec3(
            rng.gen_range(-1.0_f32..1.0),
            rng.gen_range(-1.0_f32..1.0),
            rng.gen_range(-1.0_f32..1.0),
        );
        let lensq = p.norm_squared();
        if lensq > 1e-7 && lensq <= 1.0 {
            return p / lensq;
        }
    }
}

/// Uniform sample in the unit disk on the xy-plane.
pub fn random_in_unit_disk(rng: &mut impl Rng) -> Vec3 {
    loop {
        let p = glm::vec3(
            rng.gen_range(-1.0_f32..1.0),
            rng.gen_range(-1.0_f32..1.0),
            0.0,
        );
        if p.norm_squared() < 1.0 {
            return p;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn reflect_law_holds() {
        let d = glm::vec3(1.0_f32, -2.0, 0.5);
        let n = glm::vec3(0.0_f32, 1.0, 0.0);
        let r = reflect(&d, &n);
        let expected = d - 2.0 * glm::dot(&d, &n) * n;
        assert!((r - expected).norm() < 1e-6);
    }

    #[test]
    fn reflecting_a_unit_vector_preserves_length() {
        let d = unit_vector(&glm::vec3(0.3_f32, -0.8, 0.2));
        let n = unit_vector(&glm::vec3(0.1_f32, 1.0, -0.4));
        assert!((reflect(&d, &n).norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn refract_with_matching_indices_is_identity() {
        let uv = unit_vector(&glm::vec3(0.5_f32, -1.0, 0.0));
        let n = glm::vec3(0.0_f32, 1.0, 0.0);
        let r = refract(&uv, &n, 1.0);
        assert!((r - uv).norm() < 1e-5);
    }

    #[test]
    fn ray_evaluation() {
        let r = Ray::new(glm::vec3(1.0_f32, 0.0, 0.0), glm::vec3(0.0_f32, 2.0, 0.0));
        let p = r.at(1.5);
        assert!((p - glm::vec3(1.0, 3.0, 0.0)).norm() < 1e-6);
    }

    #[test]
    fn random_disk_samples_stay_on_the_plane() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        for _ in 0..100 {
            let p = random_in_unit_disk(&mut rng);
            assert_eq!(p.z, 0.0);
            assert!(p.norm_squared() < 1.0);
        }
    }

    #[test]
    fn random_unit_vectors_are_never_degenerate() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        for _ in 0..100 {
            let v = random_unit_vector(&mut rng);
            // scaled by 1/l**2, so length is 1/l >= 1
            assert!(v.norm() >= 1.0 - 1e-4);
        }
    }
}
