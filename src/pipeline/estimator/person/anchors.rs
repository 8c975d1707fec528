use super::super::common::PERSON_INPUT_SIZE;

pub const NUM_ANCHORS: usize = 2254;

const STRIDES: [u32; 5] = [8, 16, 32, 32, 32];
const ANCHOR_OFFSET: f32 = 0.5;
/// One anchor for the unit aspect ratio plus one interpolated scale.
const ANCHORS_PER_LAYER: usize = 2;

/// SSD anchor centres for the person detector, normalized to the input square.
/// Consecutive layers sharing a stride are merged into one feature map.
pub fn generate_anchors() -> Vec<[f32; 2]> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    let mut layer = 0;
    while layer < STRIDES.len() {
        let stride = STRIDES[layer];
        let mut per_cell = 0;
        while layer < STRIDES.len() && STRIDES[layer] == stride {
            per_cell += ANCHORS_PER_LAYER;
            layer += 1;
        }

        let cells = PERSON_INPUT_SIZE.div_ceil(stride);
        for y in 0..cells {
            for x in 0..cells {
                let cx = (x as f32 + ANCHOR_OFFSET) / cells as f32;
                let cy = (y as f32 + ANCHOR_OFFSET) / cells as f32;
                for _ in 0..per_cell {
                    anchors.push([cx, cy]);
                }
            }
        }
    }
    anchors
}
