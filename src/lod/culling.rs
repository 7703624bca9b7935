//! Per-draw frustum culling of selected leaves

use glam::Vec3;

use crate::math::Frustum;
use super::chunk::LeafChunk;

/// Produces the compacted instance list for one draw (camera or shadow view).
///
/// Re-uses its allocations across frames.
#[derive(Default)]
pub struct LeafCuller {
    visible: Vec<u32>,
    sort_keys: Vec<(f32, u32)>,
}

impl LeafCuller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indices of leaves intersecting `frustum`, in leaf order
    pub fn cull(&mut self, leaves: &[LeafChunk], frustum: &Frustum) -> &[u32] {
        self.visible.clear();
        self.visible.extend(
            leaves
                .iter()
                .enumerate()
                .filter(|(_, leaf)| frustum.intersects_aabb(&leaf.bounds()))
                .map(|(index, _)| index as u32),
        );
        &self.visible
    }

    /// Visible leaf indices sorted front-to-back from `camera_pos`
    pub fn cull_and_sort(&mut self, leaves: &[LeafChunk], frustum: &Frustum, camera_pos: Vec3) -> &[u32] {
        self.sort_keys.clear();
        for (index, leaf) in leaves.iter().enumerate() {
            let bounds = leaf.bounds();
            if frustum.intersects_aabb(&bounds) {
                self.sort_keys
                    .push((camera_pos.distance_squared(bounds.center()), index as u32));
            }
        }

        self.sort_keys
            .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        self.visible.clear();
        self.visible.extend(self.sort_keys.iter().map(|&(_, index)| index));
        &self.visible
    }

    /// Result of the last cull
    pub fn visible(&self) -> &[u32] {
        &self.visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, UVec2, Vec2};

    fn leaf(x: f32, z: f32) -> LeafChunk {
        LeafChunk {
            lod: 0,
            x: 0,
            z: 0,
            chunk_index: 0,
            atlas_slot: UVec2::ZERO,
            world_origin: Vec2::new(x, z),
            world_size: 4.0,
            min_height: -1.0,
            max_height: 1.0,
            neighbor_lod_diff: [0; 4],
        }
    }

    fn frustum() -> Frustum {
        // Looking down -Z from the origin
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_3, 1.0, 0.1, 100.0);
        Frustum::from_view_projection(&proj)
    }

    #[test]
    fn test_cull_keeps_leaves_in_view() {
        let leaves = [leaf(-2.0, -20.0), leaf(-2.0, 10.0), leaf(500.0, -20.0), leaf(-2.0, -8.0)];
        let mut culler = LeafCuller::new();

        assert_eq!(culler.cull(&leaves, &frustum()), &[0, 3]);
        assert_eq!(culler.visible(), &[0, 3]);
    }

    #[test]
    fn test_cull_and_sort_front_to_back() {
        let leaves = [leaf(-2.0, -40.0), leaf(-2.0, -8.0), leaf(-2.0, -20.0)];
        let mut culler = LeafCuller::new();

        let visible = culler.cull_and_sort(&leaves, &frustum(), Vec3::ZERO);
        assert_eq!(visible, &[1, 2, 0]);
    }
}
