use crate::types::Landmark;

/// MediaPipe `POSE_CONNECTIONS`.
pub const POSE_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 7),
    (0, 4),
    (4, 5),
    (5, 6),
    (6, 8),
    (9, 10),
    (11, 12),
    (11, 13),
    (13, 15),
    (15, 17),
    (15, 19),
    (15, 21),
    (17, 19),
    (12, 14),
    (14, 16),
    (16, 18),
    (16, 20),
    (16, 22),
    (18, 20),
    (11, 23),
    (12, 24),
    (23, 24),
    (23, 25),
    (24, 26),
    (25, 27),
    (26, 28),
    (27, 29),
    (28, 30),
    (29, 31),
    (30, 32),
    (27, 31),
    (28, 32),
];

const LINE_COLOR: [u8; 4] = [224, 224, 224, 255];
const POINT_COLOR: [u8; 4] = [255, 48, 48, 255];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StrokeStyle {
    pub line_thickness: i32,
    pub point_radius: i32,
}

impl StrokeStyle {
    /// Thin strokes for small clips, thicker ones for HD and up.
    pub fn for_frame(width: u32, height: u32) -> Self {
        let line_thickness = (width.max(height) / 320).clamp(2, 12) as i32;
        Self {
            line_thickness,
            point_radius: line_thickness + 1,
        }
    }
}

/// Draws the pose skeleton over an RGBA buffer. Landmarks below
/// `visibility_threshold` are skipped along with every edge touching them.
pub fn draw_pose(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    landmarks: &[Landmark],
    visibility_threshold: f32,
) {
    if landmarks.is_empty() {
        return;
    }
    let style = StrokeStyle::for_frame(width, height);
    let points: Vec<Option<(f32, f32)>> = landmarks
        .iter()
        .map(|lm| to_pixel(lm, width, height, visibility_threshold))
        .collect();

    for &(a, b) in POSE_CONNECTIONS {
        if let (Some(Some(pa)), Some(Some(pb))) = (points.get(a), points.get(b)) {
            draw_line(buffer, width, height, pa, pb, LINE_COLOR, style.line_thickness);
        }
    }

    for &(x, y) in points.iter().flatten() {
        draw_circle(
            buffer,
            width,
            height,
            (x as i32, y as i32),
            style.point_radius,
            POINT_COLOR,
        );
    }
}

fn to_pixel(lm: &Landmark, width: u32, height: u32, visibility_threshold: f32) -> Option<(f32, f32)> {
    if lm.visibility < visibility_threshold || !lm.x.is_finite() || !lm.y.is_finite() {
        return None;
    }
    // Keep far off-frame extrapolations from turning into huge line walks.
    let (w, h) = (width as f32, height as f32);
    Some((
        (lm.x * w).clamp(-w, 2.0 * w),
        (lm.y * h).clamp(-h, 2.0 * h),
    ))
}

fn draw_line(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    p0: &(f32, f32),
    p1: &(f32, f32),
    color: [u8; 4],
    thickness: i32,
) {
    let (mut x0, mut y0) = (p0.0 as i32, p0.1 as i32);
    let (x1, y1) = (p1.0 as i32, p1.1 as i32);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let radius = (thickness.max(1) - 1) / 2;

    loop {
        put_pixel_safe(buffer, width, height, x0, y0, color);
        if radius > 0 {
            for ox in -radius..=radius {
                for oy in -radius..=radius {
                    if (ox != 0 || oy != 0) && ox.abs() + oy.abs() <= radius {
                        put_pixel_safe(buffer, width, height, x0 + ox, y0 + oy, color);
                    }
                }
            }
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_circle(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    center: (i32, i32),
    radius: i32,
    color: [u8; 4],
) {
    let (cx, cy) = center;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_pixel_safe(buffer, width, height, cx + dx, cy + dy, color);
            }
        }
    }
}

fn put_pixel_safe(buffer: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 {
        return;
    }
    let (ux, uy) = (x as u32, y as u32);
    if ux >= width || uy >= height {
        return;
    }
    let idx = ((uy * width + ux) as usize) * 4;
    if idx + 3 < buffer.len() {
        buffer[idx..idx + 4].copy_from_slice(&color);
    }
}
