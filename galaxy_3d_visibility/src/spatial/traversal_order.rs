/// Camera-relative child ordering for octree traversal.
///
/// Octant index bits: bit0 = +X, bit1 = +Y, bit2 = +Z (set when the point is
/// on the positive side of the cell center). The child sharing the camera's
/// octant is nearest; each differing bit moves a child one step further away.

use glam::Vec3;

/// XOR masks ordered by number of set bits (0, 1, 1, 1, 2, 2, 2, 3)
const MASKS_BY_DISAGREEMENT: [u8; 8] = [0, 1, 2, 4, 3, 5, 6, 7];

/// `FRONT_TO_BACK[camera_octant]` lists the 8 child octants nearest first.
pub const FRONT_TO_BACK: [[u8; 8]; 8] = build_front_to_back();

const fn build_front_to_back() -> [[u8; 8]; 8] {
    let mut table = [[0u8; 8]; 8];
    let mut camera = 0;
    while camera < 8 {
        let mut slot = 0;
        while slot < 8 {
            table[camera][slot] = camera as u8 ^ MASKS_BY_DISAGREEMENT[slot];
            slot += 1;
        }
        camera += 1;
    }
    table
}

/// Octant of `point` relative to `center`.
#[inline]
pub fn point_octant(center: Vec3, point: Vec3) -> u8 {
    ((point.x >= center.x) as u8)
        | (((point.y >= center.y) as u8) << 1)
        | (((point.z >= center.z) as u8) << 2)
}

/// Child visiting order for a cell centered at `center` seen from `eye`.
#[inline]
pub fn front_to_back_order(center: Vec3, eye: Vec3) -> &'static [u8; 8] {
    &FRONT_TO_BACK[point_octant(center, eye) as usize]
}
