use std::cmp::Ordering;

use crate::raytracer::aabb::Aabb;
use crate::raytracer::interval::Interval;
use crate::raytracer::math::Ray;
use crate::raytracer::{HitRecord, Sphere};

/// The traversal stack is fixed; a correctly median-split tree stays far
/// below this bound. Nodes that would not fit are dropped.
pub const TRAVERSAL_STACK_SIZE: usize = 64;

/// Pointer-tree form, used only during construction. Leaves refer back to
/// the scene's original sphere ordering.
pub struct BvhNode {
    pub aabb: Aabb,
    kind: BvhKind,
}

enum BvhKind {
    Leaf { sphere: u32 },
    Internal { left: Box<BvhNode>, right: Box<BvhNode> },
}

/// Flat node, 32 bytes, shared verbatim with the compute shader.
///
/// Internal nodes store child indices into the same array; leaves are
/// encoded with `left = -1` and `right_or_obj = -(sphere_index + 1)`.
/// Index 0 is always the root.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FlatBvhNode {
    pub aabb_min: [f32; 3],
    pub right_or_obj: i32,
    pub aabb_max: [f32; 3],
    pub left: i32,
}

impl FlatBvhNode {
    pub fn is_leaf(&self) -> bool {
        self.left < 0
    }

    pub fn sphere_index(&self) -> usize {
        (-self.right_or_obj - 1) as usize
    }

    pub fn aabb(&self) -> Aabb {
        Aabb {
            x: Interval::with_bounds(self.aabb_min[0], self.aabb_max[0]),
            y: Interval::with_bounds(self.aabb_min[1], self.aabb_max[1]),
            z: Interval::with_bounds(self.aabb_min[2], self.aabb_max[2]),
        }
    }
}

/// Median-split build over a copy of the sphere list. Returns `None` for an
/// empty scene.
pub fn build(spheres: &[Sphere]) -> Option<BvhNode> {
    if spheres.is_empty() {
        return None;
    }
    let mut indexed: Vec<(u32, Sphere)> = spheres
        .iter()
        .enumerate()
        .map(|(index, sphere)| (index as u32, *sphere))
        .collect();
    Some(build_recursive(&mut indexed))
}

fn build_recursive(slice: &mut [(u32, Sphere)]) -> BvhNode {
    if slice.len() == 1 {
        let (index, sphere) = slice[0];
        return BvhNode {
            aabb: sphere.bounding_box(),
            kind: BvhKind::Leaf { sphere: index },
        };
    }

    let mut bounds = Aabb::EMPTY;
    for (_, sphere) in slice.iter() {
        bounds = bounds.union(&sphere.bounding_box());
    }
    let axis = bounds.longest_axis();

    slice.sort_by(|a, b| {
        a.1.center[axis]
            .partial_cmp(&b.1.center[axis])
            .unwrap_or(Ordering::Equal)
    });

    let mid = slice.len() / 2;
    let (lo, hi) = slice.split_at_mut(mid);
    let left = Box::new(build_recursive(lo));
    let right = Box::new(build_recursive(hi));

    BvhNode {
        aabb: left.aabb.union(&right.aabb),
        kind: BvhKind::Internal { left, right },
    }
}

/// Depth-first preorder serialization. The result has exactly `2N - 1`
/// entries for `N` spheres and its root sits at index 0.
pub fn flatten(root: &BvhNode) -> Vec<FlatBvhNode> {
    let mut nodes = Vec::new();
    flatten_node(root, &mut nodes);
    nodes
}

fn flatten_node(
    node: &BvhNode,
    out: &mut Vec<FlatBvhNode>,
) -> i32 {
    let slot = out.len();
    out.push(FlatBvhNode {
        aabb_min: node.aabb.min_point(),
        right_or_obj: 0,
        aabb_max: node.aabb.max_point(),
        left: 0,
    });

    match &node.kind {
        BvhKind::Leaf { sphere } => {
            out[slot].left = -1;
            out[slot].right_or_obj = -(*sphere as i32 + 1);
        }
        BvhKind::Internal { left, right } => {
            let left_idx = flatten_node(left, out);
            let right_idx = flatten_node(right, out);
            out[slot].left = left_idx;
            out[slot].right_or_obj = right_idx;
        }
    }
    slot as i32
}

/// Iterative closest-hit query against the flat tree. Children are pushed
/// unordered; the interval upper bound tightens as hits are found.
pub fn hit_scene(
    nodes: &[FlatBvhNode],
    spheres: &[Sphere],
    ray: &Ray,
    ray_t: Interval,
) -> Option<HitRecord> {
    if nodes.is_empty() {
        return None;
    }

    let mut stack = [0_i32; TRAVERSAL_STACK_SIZE];
    let mut sp = 1_usize;
    stack[0] = 0;

    let mut closest = ray_t.max;
    let mut record = None;

    while sp > 0 {
        sp -= 1;
        let node = &nodes[stack[sp] as usize];

        if !node.aabb().hit(ray, Interval::with_bounds(ray_t.min, closest)) {
            continue;
        }

        if node.is_leaf() {
            let sphere = &spheres[node.sphere_index()];
            if let Some(hit) = sphere.hit(ray, Interval::with_bounds(ray_t.min, closest)) {
                closest = hit.t;
                record = Some(hit);
            }
        } else if sp + 2 <= TRAVERSAL_STACK_SIZE {
            stack[sp] = node.left;
            stack[sp + 1] = node.right_or_obj;
            sp += 2;
        } else if sp + 1 <= TRAVERSAL_STACK_SIZE {
            stack[sp] = node.left;
            sp += 1;
        }
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raytracer::Material;
    use nalgebra_glm as glm;
    use rand::Rng;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn grey() -> Material {
        Material::Lambertian {
            albedo: glm::vec3(0.5, 0.5, 0.5),
        }
    }

    fn scattered_spheres(count: usize) -> Vec<Sphere> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(99);
        (0..count)
            .map(|_| {
                Sphere::new(
                    glm::vec3(
                        rng.gen_range(-10.0_f32..10.0),
                        rng.gen_range(-10.0_f32..10.0),
                        rng.gen_range(-10.0_f32..10.0),
                    ),
                    rng.gen_range(0.1_f32..1.0),
                    grey(),
                )
            })
            .collect()
    }

    /// Reference recursive traversal over the tree form.
    fn hit_recursive(
        node: &BvhNode,
        spheres: &[Sphere],
        ray: &Ray,
        ray_t: Interval,
    ) -> Option<HitRecord> {
        if !node.aabb.hit(ray, ray_t) {
            return None;
        }
        match &node.kind {
            BvhKind::Leaf { sphere } => spheres[*sphere as usize].hit(ray, ray_t),
            BvhKind::Internal { left, right } => {
                let hit_left = hit_recursive(left, spheres, ray, ray_t);
                let upper = hit_left.as_ref().map_or(ray_t.max, |h| h.t);
                let hit_right =
                    hit_recursive(right, spheres, ray, Interval::with_bounds(ray_t.min, upper));
                hit_right.or(hit_left)
            }
        }
    }

    fn collect_leaves(
        node: &BvhNode,
        out: &mut Vec<u32>,
    ) {
        match &node.kind {
            BvhKind::Leaf { sphere } => out.push(*sphere),
            BvhKind::Internal { left, right } => {
                collect_leaves(left, out);
                collect_leaves(right, out);
            }
        }
    }

    #[test]
    fn empty_scene_builds_nothing() {
        assert!(build(&[]).is_none());
    }

    #[test]
    fn root_aabb_is_the_union_of_all_spheres() {
        let spheres = scattered_spheres(50);
        let root = build(&spheres).unwrap();

        let mut expected = Aabb::EMPTY;
        for sphere in &spheres {
            expected = expected.union(&sphere.bounding_box());
        }
        assert_eq!(root.aabb.min_point(), expected.min_point());
        assert_eq!(root.aabb.max_point(), expected.max_point());
    }

    #[test]
    fn every_sphere_appears_in_exactly_one_leaf() {
        let spheres = scattered_spheres(37);
        let root = build(&spheres).unwrap();
        let mut leaves = Vec::new();
        collect_leaves(&root, &mut leaves);
        leaves.sort_unstable();
        assert_eq!(leaves, (0..37).collect::<Vec<u32>>());
    }

    #[test]
    fn flat_form_has_2n_minus_1_nodes_with_root_first() {
        let spheres = scattered_spheres(33);
        let root = build(&spheres).unwrap();
        let nodes = flatten(&root);
        assert_eq!(nodes.len(), 2 * spheres.len() - 1);
        assert_eq!(nodes[0].aabb_min, root.aabb.min_point());
        assert_eq!(nodes[0].aabb_max, root.aabb.max_point());
    }

    #[test]
    fn leaf_decoding_maps_back_to_the_original_sphere() {
        let spheres = scattered_spheres(21);
        let root = build(&spheres).unwrap();
        let nodes = flatten(&root);

        let mut seen = vec![false; spheres.len()];
        for node in &nodes {
            if node.is_leaf() {
                let index = node.sphere_index();
                let decoded = spheres[index];
                // the leaf's box must be that sphere's box
                assert_eq!(node.aabb_min, decoded.bounding_box().min_point());
                assert!(!seen[index]);
                seen[index] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn child_indices_stay_inside_the_array() {
        let spheres = scattered_spheres(64);
        let nodes = flatten(&build(&spheres).unwrap());
        for node in &nodes {
            if !node.is_leaf() {
                assert!((node.left as usize) < nodes.len());
                assert!((node.right_or_obj as usize) < nodes.len());
                assert!(node.left >= 0 && node.right_or_obj >= 0);
            }
        }
    }

    #[test]
    fn iterative_traversal_matches_recursive() {
        let spheres = scattered_spheres(40);
        let root = build(&spheres).unwrap();
        let nodes = flatten(&root);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        for _ in 0..500 {
            let ray = Ray::new(
                glm::vec3(
                    rng.gen_range(-15.0_f32..15.0),
                    rng.gen_range(-15.0_f32..15.0),
                    rng.gen_range(-15.0_f32..15.0),
                ),
                glm::vec3(
                    rng.gen_range(-1.0_f32..1.0),
                    rng.gen_range(-1.0_f32..1.0),
                    rng.gen_range(-1.0_f32..1.0),
                ),
            );
            let interval = Interval::with_bounds(0.001, f32::INFINITY);
            let iterative = hit_scene(&nodes, &spheres, &ray, interval);
            let recursive = hit_recursive(&root, &spheres, &ray, interval);
            match (iterative, recursive) {
                (Some(a), Some(b)) => assert!((a.t - b.t).abs() < 1e-5),
                (None, None) => {}
                (a, b) => panic!(
                    "traversals disagree: iterative={:?} recursive={:?}",
                    a.map(|h| h.t),
                    b.map(|h| h.t)
                ),
            }
        }
    }

    #[test]
    fn missed_box_means_no_hit_in_subtree() {
        let spheres = scattered_spheres(16);
        let root = build(&spheres).unwrap();
        let nodes = flatten(&root);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
        for _ in 0..200 {
            let ray = Ray::new(
                glm::vec3(rng.gen_range(-30.0_f32..30.0), 50.0, 0.0),
                glm::vec3(
                    rng.gen_range(-1.0_f32..1.0),
                    rng.gen_range(0.1_f32..1.0),
                    rng.gen_range(-1.0_f32..1.0),
                ),
            );
            let interval = Interval::with_bounds(0.001, f32::INFINITY);
            if !nodes[0].aabb().hit(&ray, interval) {
                assert!(hit_scene(&nodes, &spheres, &ray, interval).is_none());
            }
        }
    }
}
