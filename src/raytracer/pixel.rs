use std::sync::atomic::{AtomicU32, Ordering};

use crate::raytracer::math::Vec3;

/// Dense row-major framebuffer of linear-light RGB, indexed `y * W + x`.
///
/// Cells are f32 bits in relaxed atomics: each pixel has exactly one writer
/// (the worker that owns its tile), while the host may snapshot the buffer
/// at any time and observe a mix of finished and unwritten pixels. The
/// buffer starts zeroed, so a partial read is always finite.
pub struct PixelBuffer {
    width: u32,
    height: u32,
    cells: Vec<[AtomicU32; 3]>,
}

impl PixelBuffer {
    pub fn new(
        width: u32,
        height: u32,
    ) -> Self {
        let len = width as usize * height as usize;
        let mut cells = Vec::with_capacity(len);
        cells.resize_with(len, || {
            [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)]
        });
        Self {
            width,
            height,
            cells,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn store(
        &self,
        x: u32,
        y: u32,
        color: &Vec3,
    ) {
        let cell = &self.cells[(y * self.width + x) as usize];
        cell[0].store(color.x.to_bits(), Ordering::Relaxed);
        cell[1].store(color.y.to_bits(), Ordering::Relaxed);
        cell[2].store(color.z.to_bits(), Ordering::Relaxed);
    }

    pub fn load(
        &self,
        x: u32,
        y: u32,
    ) -> [f32; 3] {
        let cell = &self.cells[(y * self.width + x) as usize];
        [
            f32::from_bits(cell[0].load(Ordering::Relaxed)),
            f32::from_bits(cell[1].load(Ordering::Relaxed)),
            f32::from_bits(cell[2].load(Ordering::Relaxed)),
        ]
    }

    /// Copies the whole buffer. Safe mid-render; the result is a preview.
    pub fn snapshot(&self) -> Vec<[f32; 3]> {
        self.cells
            .iter()
            .map(|cell| {
                [
                    f32::from_bits(cell[0].load(Ordering::Relaxed)),
                    f32::from_bits(cell[1].load(Ordering::Relaxed)),
                    f32::from_bits(cell[2].load(Ordering::Relaxed)),
                ]
            })
            .collect()
    }

    /// Overwrites every pixel from an RGBA slice, dropping alpha. Used by
    /// the GPU path to publish the running average after a dispatch.
    pub fn publish(
        &self,
        linear: &[[f32; 4]],
    ) {
        for (cell, rgba) in self.cells.iter().zip(linear) {
            cell[0].store(rgba[0].to_bits(), Ordering::Relaxed);
            cell[1].store(rgba[1].to_bits(), Ordering::Relaxed);
            cell[2].store(rgba[2].to_bits(), Ordering::Relaxed);
        }
    }
}
