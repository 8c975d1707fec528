use anyhow::{Result, anyhow};
use yuv::{YuvPlanarImage, YuvRange, YuvStandardMatrix, yuv420_to_rgba};

/// Raw layout requested from ffmpeg. I420 is a third of the pipe traffic of
/// RGBA but needs even dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawLayout {
    I420,
    Rgba,
}

impl RawLayout {
    pub fn for_size(width: u32, height: u32) -> Self {
        if width % 2 == 0 && height % 2 == 0 {
            RawLayout::I420
        } else {
            RawLayout::Rgba
        }
    }

    pub fn pix_fmt(&self) -> &'static str {
        match self {
            RawLayout::I420 => "yuv420p",
            RawLayout::Rgba => "rgba",
        }
    }

    pub fn frame_len(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            RawLayout::I420 => pixels + 2 * ((width as usize).div_ceil(2) * (height as usize).div_ceil(2)),
            RawLayout::Rgba => pixels * 4,
        }
    }
}

pub fn convert_raw_frame(layout: RawLayout, data: Vec<u8>, width: u32, height: u32) -> Result<Vec<u8>> {
    match layout {
        RawLayout::I420 => i420_to_rgba(&data, width, height),
        RawLayout::Rgba => {
            let expected_len = layout.frame_len(width, height);
            if data.len() < expected_len {
                return Err(anyhow!(
                    "RGBA buffer too small: got {}, expected {}",
                    data.len(),
                    expected_len
                ));
            }
            Ok(data)
        }
    }
}

fn i420_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_plane_len = width as usize * height as usize;
    let chroma_w = width.div_ceil(2);
    let chroma_plane_len = chroma_w as usize * height.div_ceil(2) as usize;

    if data.len() < y_plane_len + 2 * chroma_plane_len {
        return Err(anyhow!(
            "I420 buffer too small: got {}, expected {}",
            data.len(),
            y_plane_len + 2 * chroma_plane_len
        ));
    }

    let (y_plane, rest) = data.split_at(y_plane_len);
    let (u_plane, rest) = rest.split_at(chroma_plane_len);
    let v_plane = &rest[..chroma_plane_len];
    let mut rgba = vec![0u8; y_plane_len * 4];

    let image = YuvPlanarImage {
        y_plane,
        y_stride: width,
        u_plane,
        u_stride: chroma_w,
        v_plane,
        v_stride: chroma_w,
        width,
        height,
    };

    // ffmpeg tags HD content as BT.709 and SD as BT.601; go by size when the
    // stream does not say otherwise.
    let matrix = if height >= 720 {
        YuvStandardMatrix::Bt709
    } else {
        YuvStandardMatrix::Bt601
    };

    yuv420_to_rgba(&image, &mut rgba, width * 4, YuvRange::Limited, matrix)
        .map_err(|err| anyhow!("I420→RGBA failed: {err:?}"))?;

    Ok(rgba)
}
