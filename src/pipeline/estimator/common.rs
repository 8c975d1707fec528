use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{Frame, Landmark};

pub const POSE_INPUT_SIZE: u32 = 256;
pub const PERSON_INPUT_SIZE: u32 = 224;
pub const NUM_BODY_LANDMARKS: usize = 33;
/// Body landmarks plus the alignment and auxiliary points the model emits.
pub const NUM_MODEL_LANDMARKS: usize = 39;
pub const VALUES_PER_LANDMARK: usize = 5;
pub const HIP_ALIGNMENT_POINT: usize = 33;
pub const BODY_ALIGNMENT_POINT: usize = 34;
pub const ROI_ENLARGE_FACTOR: f32 = 1.25;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputRange {
    /// [0, 1]
    Unit,
    /// [-1, 1]
    Signed,
}

#[derive(Clone, Debug)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

/// Rotated square region of the source frame fed to the landmark model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Roi {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
}

impl Roi {
    /// Builds the region from a centre point and a point marking body size and
    /// orientation; the centre→scale vector ends up pointing up in the crop.
    pub fn from_alignment(center: (f32, f32), scale_point: (f32, f32)) -> Option<Self> {
        let dx = scale_point.0 - center.0;
        let dy = scale_point.1 - center.1;
        let radius = (dx * dx + dy * dy).sqrt();
        if !radius.is_finite() || radius < 1.0 {
            return None;
        }
        Some(Self {
            center,
            side: radius * 2.0 * ROI_ENLARGE_FACTOR,
            angle: dx.atan2(-dy),
        })
    }
}

#[derive(Clone, Debug)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
    pub output_size: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

pub fn prepare_frame_with_size(
    frame: &Frame,
    target_size: u32,
    range: InputRange,
) -> Result<(Array4<f32>, LetterboxInfo)> {
    check_frame_len(frame)?;

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = (frame.width as f32 * scale).round().clamp(1.0, target_size as f32) as u32;
    let new_h = (frame.height as f32 * scale).round().clamp(1.0, target_size as f32) as u32;

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let pad_x = ((target_size as i64 - new_w as i64) / 2).max(0) as usize;
    let pad_y = ((target_size as i64 - new_h as i64) / 2).max(0) as usize;
    let mut canvas = vec![0u8; (target_size as usize) * (target_size as usize) * 4];
    for px in canvas.chunks_mut(4) {
        px[3] = 255;
    }
    let dst_stride = target_size as usize * 4;
    let src_stride = new_w as usize * 4;
    for row in 0..(new_h as usize) {
        let dst_offset = (pad_y + row) * dst_stride + pad_x * 4;
        let src_offset = row * src_stride;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[src_offset..src_offset + src_stride]);
    }

    let normalized: Vec<f32> = canvas
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            [
                normalize(px[0], range),
                normalize(px[1], range),
                normalize(px[2], range),
            ]
        })
        .collect();
    let input = Array4::<f32>::from_shape_vec(
        (1, target_size as usize, target_size as usize, 3),
        normalized,
    )
    .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    let letterbox = LetterboxInfo {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((input, letterbox))
}

fn normalize(value: u8, range: InputRange) -> f32 {
    let unit = value as f32 / 255.0;
    match range {
        InputRange::Unit => unit,
        InputRange::Signed => unit * 2.0 - 1.0,
    }
}

pub fn prepare_rotated_crop(
    frame: &Frame,
    roi: &Roi,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    check_frame_len(frame)?;

    let half = output_size as f32 / 2.0;
    let scale = roi.side / output_size as f32;
    let cos = roi.angle.cos();
    let sin = roi.angle.sin();

    let data: Vec<f32> = (0..output_size)
        .into_par_iter()
        .flat_map_iter(|y| {
            let dy = (y as f32 + 0.5 - half) * scale;
            (0..output_size).flat_map(move |x| {
                let dx = (x as f32 + 0.5 - half) * scale;
                let src_x = roi.center.0 + dx * cos - dy * sin;
                let src_y = roi.center.1 + dx * sin + dy * cos;
                sample_rgb(frame, src_x, src_y)
            })
        })
        .collect();

    let array =
        Array4::<f32>::from_shape_vec((1, output_size as usize, output_size as usize, 3), data)
            .map_err(|err| anyhow!("failed to build rotated crop tensor: {err}"))?;

    let transform = CropTransform {
        center: roi.center,
        side: roi.side,
        angle: roi.angle,
        output_size,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((array, transform))
}

impl CropTransform {
    /// Maps crop pixel coordinates back onto the source frame. Points outside
    /// the frame are kept as-is; the model extrapolates occluded limbs.
    pub fn project(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.side / self.output_size as f32;
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let cos = self.angle.cos();
        let sin = self.angle.sin();
        (
            self.center.0 + dx * cos - dy * sin,
            self.center.1 + dx * sin + dy * cos,
        )
    }

    pub fn depth_scale(&self) -> f32 {
        self.side / self.output_size as f32
    }
}

/// Raw model landmarks in source pixel space, kept for ROI tracking.
#[derive(Clone, Debug)]
pub struct ProjectedLandmarks {
    pub pixels: Vec<(f32, f32)>,
    pub body: Vec<Landmark>,
}

/// Decodes the landmark tensor (`[x, y, z, visibility, presence]` per point,
/// in crop pixels) into normalized body landmarks plus pixel positions for
/// every model point.
pub fn decode_landmarks(flat: &[f32], transform: &CropTransform) -> Result<ProjectedLandmarks> {
    if flat.len() < NUM_MODEL_LANDMARKS * VALUES_PER_LANDMARK {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            NUM_MODEL_LANDMARKS * VALUES_PER_LANDMARK
        ));
    }

    let width = transform.orig_w.max(1) as f32;
    let height = transform.orig_h.max(1) as f32;
    let depth_scale = transform.depth_scale();

    let mut pixels = Vec::with_capacity(NUM_MODEL_LANDMARKS);
    let mut body = Vec::with_capacity(NUM_BODY_LANDMARKS);
    for (idx, chunk) in flat
        .chunks_exact(VALUES_PER_LANDMARK)
        .take(NUM_MODEL_LANDMARKS)
        .enumerate()
    {
        let (px, py) = transform.project(chunk[0], chunk[1]);
        pixels.push((px, py));
        if idx < NUM_BODY_LANDMARKS {
            body.push(Landmark {
                x: px / width,
                y: py / height,
                z: chunk[2] * depth_scale / width,
                visibility: sigmoid(chunk[3]),
            });
        }
    }

    Ok(ProjectedLandmarks { pixels, body })
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x.clamp(-100.0, 100.0)).exp())
}

fn check_frame_len(frame: &Frame) -> Result<()> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }
    Ok(())
}

fn sample_rgb(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if x.is_nan() || y.is_nan() {
        return [0.0, 0.0, 0.0];
    }
    let x0 = x.floor();
    let y0 = y.floor();
    let x1 = x0 + 1.0;
    let y1 = y0 + 1.0;

    let (w, h) = (frame.width as i32, frame.height as i32);
    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        let ix = cx as i32;
        let iy = cy as i32;
        if ix < 0 || iy < 0 || ix >= w || iy >= h {
            return [0.0, 0.0, 0.0];
        }
        let idx = ((iy as u32 * frame.width + ix as u32) as usize) * 4;
        if idx + 2 >= frame.rgba.len() {
            return [0.0, 0.0, 0.0];
        }
        [
            frame.rgba[idx] as f32 / 255.0,
            frame.rgba[idx + 1] as f32 / 255.0,
            frame.rgba[idx + 2] as f32 / 255.0,
        ]
    };

    let fx = x - x0;
    let fy = y - y0;
    let c00 = fetch(x0, y0);
    let c10 = fetch(x1, y0);
    let c01 = fetch(x0, y1);
    let c11 = fetch(x1, y1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    [
        lerp(lerp(c00[0], c10[0], fx), lerp(c01[0], c11[0], fx), fy),
        lerp(lerp(c00[1], c10[1], fx), lerp(c01[1], c11[1], fx), fy),
        lerp(lerp(c00[2], c10[2], fx), lerp(c01[2], c11[2], fx), fy),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> Frame {
        Frame {
            rgba: vec![255u8; (width * height * 4) as usize],
            width,
            height,
            index: 0,
        }
    }

    #[test]
    fn upright_body_gives_zero_rotation() {
        let roi = Roi::from_alignment((100.0, 200.0), (100.0, 120.0)).unwrap();
        assert!(roi.angle.abs() < 1e-6);
        assert!((roi.side - 80.0 * 2.0 * ROI_ENLARGE_FACTOR).abs() < 1e-3);
        assert!(Roi::from_alignment((5.0, 5.0), (5.0, 5.0)).is_none());
    }

    #[test]
    fn crop_projection_round_trips_through_rotation() {
        let roi = Roi::from_alignment((120.0, 90.0), (160.0, 90.0)).unwrap();
        let transform = CropTransform {
            center: roi.center,
            side: roi.side,
            angle: roi.angle,
            output_size: POSE_INPUT_SIZE,
            orig_w: 320,
            orig_h: 240,
        };
        let half = POSE_INPUT_SIZE as f32 / 2.0;
        let (cx, cy) = transform.project(half, half);
        assert!((cx - 120.0).abs() < 1e-3 && (cy - 90.0).abs() < 1e-3);

        // Crop "up" follows the centre→scale vector, here pointing right.
        let (ux, uy) = transform.project(half, 0.0);
        assert!(ux > cx + 1.0, "expected up to map right, got ({ux}, {uy})");
        assert!((uy - cy).abs() < 1e-2);
    }

    #[test]
    fn letterbox_pads_short_side_and_normalizes() {
        let (input, letterbox) =
            prepare_frame_with_size(&frame(200, 100), PERSON_INPUT_SIZE, InputRange::Signed).unwrap();
        assert_eq!(input.shape(), &[1, 224, 224, 3]);
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 56.0);
        // Padding is black, content is white.
        assert_eq!(input[[0, 0, 0, 0]], -1.0);
        assert!((input[[0, 112, 112, 0]] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn rejects_inconsistent_frame_buffers() {
        let mut bad = frame(4, 4);
        bad.rgba.truncate(10);
        assert!(prepare_frame_with_size(&bad, PERSON_INPUT_SIZE, InputRange::Unit).is_err());
        let roi = Roi {
            center: (2.0, 2.0),
            side: 4.0,
            angle: 0.0,
        };
        assert!(prepare_rotated_crop(&bad, &roi, 8).is_err());
    }

    #[test]
    fn decodes_normalized_body_landmarks() {
        let transform = CropTransform {
            center: (50.0, 50.0),
            side: 256.0,
            angle: 0.0,
            output_size: 256,
            orig_w: 100,
            orig_h: 100,
        };
        let mut flat = vec![0.0f32; NUM_MODEL_LANDMARKS * VALUES_PER_LANDMARK];
        // landmark 0 at crop centre, visible.
        flat[0] = 128.0;
        flat[1] = 128.0;
        flat[2] = 10.0;
        flat[3] = 100.0;

        let decoded = decode_landmarks(&flat, &transform).unwrap();
        assert_eq!(decoded.body.len(), NUM_BODY_LANDMARKS);
        assert_eq!(decoded.pixels.len(), NUM_MODEL_LANDMARKS);
        let nose = decoded.body[0];
        assert!((nose.x - 0.5).abs() < 1e-4 && (nose.y - 0.5).abs() < 1e-4);
        assert!((nose.z - 0.1).abs() < 1e-4);
        assert!(nose.visibility > 0.99);
        assert!((decoded.body[1].visibility - 0.5).abs() < 1e-6);

        assert!(decode_landmarks(&flat[..10], &transform).is_err());
    }
}
