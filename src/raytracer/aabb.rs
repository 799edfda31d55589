use crate::raytracer::interval::Interval;
use crate::raytracer::math::{Ray, Vec3};

#[derive(Clone, Copy, Debug)]
pub struct Aabb {
    pub x: Interval,
    pub y: Interval,
    pub z: Interval,
}

impl Aabb {
    pub const EMPTY: Aabb = Aabb {
        x: Interval::EMPTY,
        y: Interval::EMPTY,
        z: Interval::EMPTY,
    };

    pub fn from_points(
        a: Vec3,
        b: Vec3,
    ) -> Self {
        Self {
            x: Interval::with_orderless_bounds(a.x, b.x),
            y: Interval::with_orderless_bounds(a.y, b.y),
            z: Interval::with_orderless_bounds(a.z, b.z),
        }
    }

    pub fn union(
        &self,
        rhs: &Aabb,
    ) -> Self {
        Self {
            x: self.x.union(rhs.x),
            y: self.y.union(rhs.y),
            z: self.z.union(rhs.z),
        }
    }

    pub fn axis_interval(
        &self,
        axis: usize,
    ) -> Interval {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    pub fn longest_axis(&self) -> usize {
        if self.x.size() > self.y.size() {
            if self.x.size() > self.z.size() {
                0
            } else {
                2
            }
        } else if self.y.size() > self.z.size() {
            1
        } else {
            2
        }
    }

    pub fn min_point(&self) -> [f32; 3] {
        [self.x.min, self.y.min, self.z.min]
    }

    pub fn max_point(&self) -> [f32; 3] {
        [self.x.max, self.y.max, self.z.max]
    }

    /// Slab test. Rays running parallel to a slab miss unless the origin
    /// already lies between its planes.
    pub fn hit(
        &self,
        ray: &Ray,
        ray_t: Interval,
    ) -> bool {
        let mut t_min = ray_t.min;
        let mut t_max = ray_t.max;

        for axis in 0..3 {
            let slab = self.axis_interval(axis);
            let origin = ray.origin[axis];
            let d = ray.direction[axis];

            if d.abs() < 1e-8 {
                if origin < slab.min || origin > slab.max {
                    return false;
                }
                continue;
            }

            let inv = 1.0 / d;
            let mut t0 = (slab.min - origin) * inv;
            let mut t1 = (slab.max - origin) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }

            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_max <= t_min {
                return false;
            }
        }
        true
    }
}
