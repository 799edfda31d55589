//! Host-side mirrors of the shader's binding layouts. Every struct here is
//! `#[repr(C)]` and byte-for-byte identical to its WGSL counterpart; the
//! size assertions at the bottom pin that down at compile time.

use crate::raytracer::bvh::FlatBvhNode;
use crate::raytracer::camera::Camera;
use crate::raytracer::{Material, Sphere};

pub const MATERIAL_LAMBERTIAN: i32 = 0;
pub const MATERIAL_METALLIC: i32 = 1;
pub const MATERIAL_DIELECTRIC: i32 = 2;

/// Binding 0, std140, 128 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]

pub struct GpuUniforms {
    pub camera_center: [f32; 3],
    pub _pad0: f32,
    pub pixel00: [f32; 3],
    pub _pad1: f32,
    pub pixel_delta_u: [f32; 3],
    pub _pad2: f32,
    pub pixel_delta_v: [f32; 3],
    pub _pad3: f32,
    pub defocus_disk_u: [f32; 3],
    pub defocus_angle: f32,
    pub defocus_disk_v: [f32; 3],
    pub _pad4: f32,
    pub width: i32,
    pub height: i32,
    pub max_depth: i32,
    pub total_samples: i32,
    pub current_sample: i32,
    pub _pad5: [i32; 3],
}

impl GpuUniforms {
    pub fn new(
        camera: &Camera,
        total_samples: u32,
    ) -> Self {
        Self {
            camera_center: camera.center().into(),
            _pad0: 0_f32,
            pixel00: camera.pixel00_loc().into(),
            _pad1: 0_f32,
            pixel_delta_u: camera.pixel_delta_u().into(),
            _pad2: 0_f32,
            pixel_delta_v: camera.pixel_delta_v().into(),
            _pad3: 0_f32,
            defocus_disk_u: camera.defocus_disk_u().into(),
            defocus_angle: camera.defocus_angle,
            defocus_disk_v: camera.defocus_disk_v().into(),
            _pad4: 0_f32,
            width: camera.image_width as i32,
            height: camera.image_height as i32,
            max_depth: camera.max_depth as i32,
            total_samples: total_samples as i32,
            current_sample: 0,
            _pad5: [0; 3],
        }
    }
}

/// Sphere entry of the binding-1 block, std430, 48 bytes. The tagged host
/// material flattens into `mat_type` plus a shared payload.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]

pub struct GpuSphere {
    pub center: [f32; 3],
    pub radius: f32,
    pub albedo: [f32; 3],
    pub mat_type: i32,
    pub fuzz_or_ior: f32,
    pub _pad: [f32; 3],
}

impl GpuSphere {
    pub fn new(sphere: &Sphere) -> Self {
        let (albedo, mat_type, fuzz_or_ior) = match sphere.material {
            Material::Lambertian { albedo } => (albedo.into(), MATERIAL_LAMBERTIAN, 0_f32),
            Material::Metallic { albedo, fuzz } => (albedo.into(), MATERIAL_METALLIC, fuzz),
            Material::Dielectric { refraction_index } => {
                ([1_f32, 1.0, 1.0], MATERIAL_DIELECTRIC, refraction_index)
            }
        };

        Self {
            center: sphere.center.into(),
            radius: sphere.radius,
            albedo,
            mat_type,
            fuzz_or_ior,
            _pad: [0_f32; 3],
        }
    }
}

/// 16-byte header preceding each storage block's element array.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]

pub struct BlockHeader {
    pub count: i32,
    pub _pad: [i32; 3],
}

/// Serializes `header + elements` for upload.
pub fn block_bytes<T: bytemuck::Pod>(items: &[T]) -> Vec<u8> {
    let header = BlockHeader {
        count: items.len() as i32,
        _pad: [0; 3],
    };
    let mut bytes = Vec::with_capacity(16 + std::mem::size_of_val(items));
    bytes.extend_from_slice(bytemuck::bytes_of(&header));
    bytes.extend_from_slice(bytemuck::cast_slice(items));
    bytes
}

const _: () = assert!(std::mem::size_of::<GpuUniforms>() == 128);
const _: () = assert!(std::mem::size_of::<GpuSphere>() == 48);
const _: () = assert!(std::mem::size_of::<FlatBvhNode>() == 32);
const _: () = assert!(std::mem::size_of::<BlockHeader>() == 16);

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_glm as glm;

    #[test]
    fn dielectric_uploads_white_albedo_and_ior() {
        let sphere = Sphere::new(
            glm::vec3(0.0, 1.0, 0.0),
            1.0,
            Material::Dielectric {
                refraction_index: 1.5,
            },
        );
        let gpu = GpuSphere::new(&sphere);
        assert_eq!(gpu.mat_type, MATERIAL_DIELECTRIC);
        assert_eq!(gpu.albedo, [1.0, 1.0, 1.0]);
        assert_eq!(gpu.fuzz_or_ior, 1.5);
    }

    #[test]
    fn metallic_carries_fuzz_in_the_shared_slot() {
        let sphere = Sphere::new(
            glm::vec3(4.0, 1.0, 0.0),
            1.0,
            Material::Metallic {
                albedo: glm::vec3(0.7, 0.6, 0.5),
                fuzz: 0.2,
            },
        );
        let gpu = GpuSphere::new(&sphere);
        assert_eq!(gpu.mat_type, MATERIAL_METALLIC);
        assert_eq!(gpu.fuzz_or_ior, 0.2);
        assert_eq!(gpu.albedo, [0.7, 0.6, 0.5]);
    }

    #[test]
    fn block_layout_is_header_then_elements() {
        let spheres = [GpuSphere::new(&Sphere::new(
            glm::vec3(0.0, 0.0, -1.0),
            0.5,
            Material::Lambertian {
                albedo: glm::vec3(0.1, 0.2, 0.3),
            },
        ))];
        let bytes = block_bytes(&spheres);
        assert_eq!(bytes.len(), 16 + 48);
        let count = i32::from_ne_bytes(bytes[0..4].try_into().unwrap());
        assert_eq!(count, 1);
        let radius = f32::from_ne_bytes(bytes[16 + 12..16 + 16].try_into().unwrap());
        assert_eq!(radius, 0.5);
    }

    #[test]
    fn uniforms_start_at_sample_zero() {
        let camera = Camera::new(64, 32, 8);
        let uniforms = GpuUniforms::new(&camera, 8);
        assert_eq!(uniforms.current_sample, 0);
        assert_eq!(uniforms.total_samples, 8);
        assert_eq!(uniforms.width, 64);
        assert_eq!(uniforms.height, 32);
    }
}
