//! Frame type and image processing: pixel format conversion and downscaling.

use image::{imageops::FilterType, RgbImage};

/// A captured RGB camera frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    /// Driver sequence number.
    pub sequence: u32,
}

/// Downscale an image by `factor` in both dimensions.
///
/// Returns `None` when the result would be degenerate (zero width or height),
/// or when `factor` is not a positive finite number.
pub fn downscale(image: &RgbImage, factor: f32) -> Option<RgbImage> {
    if !factor.is_finite() || factor <= 0.0 {
        return None;
    }
    let width = (image.width() as f32 * factor).round() as u32;
    let height = (image.height() as f32 * factor).round() as u32;
    if width == 0 || height == 0 {
        return None;
    }
    if width == image.width() && height == image.height() {
        return Some(image.clone());
    }
    Some(image::imageops::resize(
        image,
        width,
        height,
        FilterType::Triangle,
    ))
}

/// Convert packed YUYV (4:2:2) to interleaved RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]. BT.601 full-range.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    let mut out = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0] as f32, chunk[2] as f32] {
            out.push(clamp_u8(y + 1.402 * v));
            out.push(clamp_u8(y - 0.344_136 * u - 0.714_136 * v));
            out.push(clamp_u8(y + 1.772 * u));
        }
    }
    Ok(out)
}

/// Expand 8-bit grayscale to RGB by replicating the luma channel.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    if grey.len() < pixels {
        return Err(FrameError::InvalidLength {
            expected: pixels,
            actual: grey.len(),
        });
    }
    Ok(grey[..pixels].iter().flat_map(|&y| [y, y, y]).collect())
}

/// Copy a packed RGB24 buffer, dropping any trailing padding.
pub fn rgb24(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 3) as usize;
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    Ok(buf[..expected].to_vec())
}

/// Decode a motion-JPEG buffer into RGB.
pub fn mjpeg_to_rgb(buf: &[u8]) -> Result<RgbImage, FrameError> {
    image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
        .map(|img| img.to_rgb8())
        .map_err(|e| FrameError::Decode(e.to_string()))
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("buffer does not match frame dimensions {width}x{height}")]
    Dimensions { width: u32, height: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_yuyv_to_rgb_grey_pixels() {
        // Neutral chroma: RGB equals luma.
        let yuyv = vec![100, 128, 200, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![100, 100, 100, 200, 200, 200]);
    }

    #[test]
    fn test_yuyv_to_rgb_clamps() {
        let yuyv = vec![255, 255, 255, 255];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb.len(), 6);
        assert_eq!(rgb[0], 255);
        assert_eq!(rgb[2], 255);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![100, 128];
        assert!(yuyv_to_rgb(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_grey_to_rgb() {
        let rgb = grey_to_rgb(&[7, 9], 2, 1).unwrap();
        assert_eq!(rgb, vec![7, 7, 7, 9, 9, 9]);
        assert!(grey_to_rgb(&[7], 2, 1).is_err());
    }

    #[test]
    fn test_rgb24_truncates_padding() {
        let buf = vec![1u8; 2 * 1 * 3 + 4];
        assert_eq!(rgb24(&buf, 2, 1).unwrap().len(), 6);
    }

    #[test]
    fn test_downscale_quarter() {
        let img = RgbImage::from_pixel(640, 480, Rgb([10, 20, 30]));
        let small = downscale(&img, 0.25).unwrap();
        assert_eq!(small.dimensions(), (160, 120));
        assert_eq!(small.get_pixel(80, 60), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_downscale_degenerate() {
        let img = RgbImage::new(3, 3);
        assert!(downscale(&img, 0.1).is_none());
        assert!(downscale(&RgbImage::new(0, 0), 0.5).is_none());
        assert!(downscale(&img, 0.0).is_none());
        assert!(downscale(&img, f32::NAN).is_none());
    }

    #[test]
    fn test_downscale_identity() {
        let img = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        assert_eq!(downscale(&img, 1.0).unwrap(), img);
    }
}
