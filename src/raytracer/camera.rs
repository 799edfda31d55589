use nalgebra_glm as glm;
use rand::Rng;

use crate::raytracer::math::{random_in_unit_disk, unit_vector, Ray, Vec3};
use crate::raytracer::session::RenderError;

/// Pinhole camera with an optional thin-lens defocus disk. The public
/// fields are configuration; everything else is derived by `init` and is
/// deterministic for a given configuration.
///
/// https://raytracing.github.io/images/fig-1.03-cam-geom.jpg
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub image_width: u32,
    pub image_height: u32,
    pub samples_per_pixel: u32,
    pub max_depth: u32,
    /// Vertical field of view in degrees.
    pub vfov: f32,
    pub lookfrom: Vec3,
    pub lookat: Vec3,
    pub vup: Vec3,
    /// Variation angle of rays through each pixel, in degrees.
    pub defocus_angle: f32,
    /// Distance from `lookfrom` to the plane of perfect focus.
    pub focus_dist: f32,

    pixel_samples_scale: f32,
    center: Vec3,
    pixel00_loc: Vec3,
    pixel_delta_u: Vec3,
    pixel_delta_v: Vec3,
    u: Vec3,
    v: Vec3,
    w: Vec3,
    defocus_disk_u: Vec3,
    defocus_disk_v: Vec3,
}

impl Camera {
    pub fn new(
        image_width: u32,
        image_height: u32,
        samples_per_pixel: u32,
    ) -> Self {
        let mut camera = Camera {
            image_width,
            image_height,
            samples_per_pixel,
            max_depth: 20,
            vfov: 90.0,
            lookfrom: glm::vec3(0.0, 0.0, 0.0),
            lookat: glm::vec3(0.0, 0.0, -1.0),
            vup: glm::vec3(0.0, 1.0, 0.0),
            defocus_angle: 0.0,
            focus_dist: 10.0,
            pixel_samples_scale: 0.0,
            center: glm::vec3(0.0, 0.0, 0.0),
            pixel00_loc: glm::vec3(0.0, 0.0, 0.0),
            pixel_delta_u: glm::vec3(0.0, 0.0, 0.0),
            pixel_delta_v: glm::vec3(0.0, 0.0, 0.0),
            u: glm::vec3(0.0, 0.0, 0.0),
            v: glm::vec3(0.0, 0.0, 0.0),
            w: glm::vec3(0.0, 0.0, 0.0),
            defocus_disk_u: glm::vec3(0.0, 0.0, 0.0),
            defocus_disk_v: glm::vec3(0.0, 0.0, 0.0),
        };
        camera.init();
        camera
    }

    pub(crate) fn validate(&self) -> Result<(), RenderError> {
        if self.image_width == 0 || self.image_height == 0 {
            return Err(RenderError::ImageSize(self.image_width, self.image_height));
        }
        if self.samples_per_pixel == 0 {
            return Err(RenderError::ZeroSamples);
        }
        if !(self.vfov > 0.0 && self.vfov < 180.0) {
            return Err(RenderError::VfovOutOfRange(self.vfov));
        }
        if self.defocus_angle < 0.0 {
            return Err(RenderError::DefocusAngle(self.defocus_angle));
        }
        if self.focus_dist <= 0.0 {
            return Err(RenderError::FocusDist(self.focus_dist));
        }
        Ok(())
    }

    /// Recomputes the derived basis. Call after changing any configuration
    /// field; `RenderSession::start` does this once on its own copy.
    pub fn init(&mut self) {
        self.pixel_samples_scale = 1.0 / self.samples_per_pixel as f32;
        self.center = self.lookfrom;

        let theta = self.vfov.to_radians();
        let h = (theta / 2.0).tan();
        let viewport_height = 2.0 * h * self.focus_dist;
        let viewport_width =
            viewport_height * self.image_width as f32 / self.image_height as f32;

        self.w = unit_vector(&(self.lookfrom - self.lookat));
        self.u = unit_vector(&glm::cross(&self.vup, &self.w));
        self.v = glm::cross(&self.w, &self.u);

        let viewport_u = viewport_width * self.u;
        let viewport_v = -viewport_height * self.v;

        self.pixel_delta_u = viewport_u / self.image_width as f32;
        self.pixel_delta_v = viewport_v / self.image_height as f32;

        let viewport_upper_left =
            self.center - self.focus_dist * self.w - viewport_u / 2.0 - viewport_v / 2.0;
        self.pixel00_loc = viewport_upper_left + 0.5 * (self.pixel_delta_u + self.pixel_delta_v);

        let defocus_radius = self.focus_dist * (self.defocus_angle / 2.0).to_radians().tan();
        self.defocus_disk_u = defocus_radius * self.u;
        self.defocus_disk_v = defocus_radius * self.v;
    }

    /// A ray from the camera origin (or the defocus disk) through a
    /// jittered sample inside pixel `(x, y)`.
    pub fn get_ray(
        &self,
        x: u32,
        y: u32,
        rng: &mut impl Rng,
    ) -> Ray {
        let jitter_u = rng.gen_range(-0.5_f32..0.5);
        let jitter_v = rng.gen_range(-0.5_f32..0.5);

        let pixel_sample = self.pixel00_loc
            + (x as f32 + jitter_u) * self.pixel_delta_u
            + (y as f32 + jitter_v) * self.pixel_delta_v;

        let ray_origin = if self.defocus_angle <= 0.0 {
            self.center
        } else {
            self.defocus_disk_sample(rng)
        };

        Ray::new(ray_origin, pixel_sample - ray_origin)
    }

    fn defocus_disk_sample(
        &self,
        rng: &mut impl Rng,
    ) -> Vec3 {
        let p = random_in_unit_disk(rng);
        self.center + p.x * self.defocus_disk_u + p.y * self.defocus_disk_v
    }

    pub fn pixel_samples_scale(&self) -> f32 {
        self.pixel_samples_scale
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn pixel00_loc(&self) -> Vec3 {
        self.pixel00_loc
    }

    pub fn pixel_delta_u(&self) -> Vec3 {
        self.pixel_delta_u
    }

    pub fn pixel_delta_v(&self) -> Vec3 {
        self.pixel_delta_v
    }

    pub fn defocus_disk_u(&self) -> Vec3 {
        self.defocus_disk_u
    }

    pub fn defocus_disk_v(&self) -> Vec3 {
        self.defocus_disk_v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn basis_is_orthonormal() {
        let mut camera = Camera::new(100, 100, 1);
        camera.lookfrom = glm::vec3(13.0, 2.0, 3.0);
        camera.lookat = glm::vec3(0.0, 0.0, 0.0);
        camera.vfov = 20.0;
        camera.init();

        assert!((camera.u.norm() - 1.0).abs() < 1e-5);
        assert!((camera.v.norm() - 1.0).abs() < 1e-5);
        assert!((camera.w.norm() - 1.0).abs() < 1e-5);
        assert!(glm::dot(&camera.u, &camera.v).abs() < 1e-5);
        assert!(glm::dot(&camera.u, &camera.w).abs() < 1e-5);
        assert!(glm::dot(&camera.v, &camera.w).abs() < 1e-5);
    }

    #[test]
    fn pixel_grid_is_centered_on_the_view_axis() {
        // 1x1 image: the pixel center must sit exactly on the -w axis
        let mut camera = Camera::new(1, 1, 1);
        camera.focus_dist = 1.0;
        camera.init();

        let expected = camera.lookfrom - camera.w;
        assert!((camera.pixel00_loc() - expected).norm() < 1e-5);
    }

    #[test]
    fn vfov_90_spans_two_focus_heights() {
        let mut camera = Camera::new(2, 2, 1);
        camera.focus_dist = 1.0;
        camera.init();

        // viewport height = 2 * tan(45 deg) = 2, split over two pixel rows
        assert!((camera.pixel_delta_v().norm() - 1.0).abs() < 1e-5);
        assert!((camera.pixel_delta_u().norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn rays_originate_at_lookfrom_without_defocus() {
        let camera = Camera::new(4, 4, 1);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        for _ in 0..16 {
            let ray = camera.get_ray(1, 2, &mut rng);
            assert_eq!(ray.origin, camera.lookfrom);
        }
    }

    #[test]
    fn defocus_moves_the_ray_origin_onto_the_disk() {
        let mut camera = Camera::new(4, 4, 1);
        camera.defocus_angle = 2.0;
        camera.focus_dist = 5.0;
        camera.init();

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let defocus_radius = camera.focus_dist * (camera.defocus_angle / 2.0_f32).to_radians().tan();
        for _ in 0..16 {
            let ray = camera.get_ray(0, 0, &mut rng);
            let offset = (ray.origin - camera.lookfrom).norm();
            assert!(offset <= defocus_radius + 1e-5);
        }
    }

    #[test]
    fn validation_rejects_bad_configs() {
        let camera = Camera::new(0, 10, 1);
        assert!(matches!(
            camera.validate(),
            Err(RenderError::ImageSize(0, 10))
        ));

        let camera = Camera::new(10, 10, 0);
        assert!(matches!(camera.validate(), Err(RenderError::ZeroSamples)));

        let mut camera = Camera::new(10, 10, 1);
        camera.vfov = 180.0;
        assert!(matches!(
            camera.validate(),
            Err(RenderError::VfovOutOfRange(_))
        ));

        assert!(Camera::new(10, 10, 1).validate().is_ok());
    }
}
