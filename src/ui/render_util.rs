use super::{Arc, ImageBuffer, ImageFrame, RenderImage, Rgba};
use crate::types::Frame;

pub(super) fn frame_to_image(frame: &Frame) -> Option<Arc<RenderImage>> {
    let mut bgra = frame.rgba.clone();
    // GPUI expects BGRA; convert in place to avoid the async asset pipeline and flicker.
    for px in bgra.chunks_exact_mut(4) {
        px.swap(0, 2);
    }

    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(frame.width, frame.height, bgra)?;
    Some(Arc::new(RenderImage::new(vec![ImageFrame::new(buffer)])))
}

/// Width/height of the player box for a `width`x`height` video that fits
/// inside `max_w`x`max_h`.
pub(super) fn fit_within(width: u32, height: u32, max_w: f32, max_h: f32) -> (f32, f32) {
    if width == 0 || height == 0 {
        return (max_w, max_h);
    }
    let scale = (max_w / width as f32).min(max_h / height as f32);
    (width as f32 * scale, height as f32 * scale)
}
