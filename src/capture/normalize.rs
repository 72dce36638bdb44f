use crate::error::CaptureError;
use crate::frame::{PixelLayout, RawFrame};
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Convert a raw backend frame into packed RGB24 at `width`x`height`
pub fn normalize(raw: &RawFrame, width: u32, height: u32) -> Result<Vec<u8>, CaptureError> {
    if raw.width == 0 || raw.height == 0 {
        return Err(CaptureError::InvalidGeometry {
            details: format!("empty frame {}x{}", raw.width, raw.height),
        });
    }
    let row_len = raw.width as usize * raw.layout.bytes_per_pixel();
    if raw.stride < row_len || raw.data.len() < raw.required_len() {
        return Err(CaptureError::InvalidGeometry {
            details: format!(
                "{}x{} {:?} frame needs {} bytes with stride {}, got {}",
                raw.width,
                raw.height,
                raw.layout,
                raw.required_len(),
                raw.stride,
                raw.data.len()
            ),
        });
    }

    let mut rgb = Vec::with_capacity(raw.width as usize * raw.height as usize * 3);
    for row in 0..raw.height as usize {
        let start = row * raw.stride;
        let pixels = &raw.data[start..start + row_len];
        match raw.layout {
            PixelLayout::Bgra8 => {
                for px in pixels.chunks_exact(4) {
                    rgb.extend_from_slice(&[px[2], px[1], px[0]]);
                }
            }
            PixelLayout::Rgba8 => {
                for px in pixels.chunks_exact(4) {
                    rgb.extend_from_slice(&px[..3]);
                }
            }
            PixelLayout::Rgb8 => rgb.extend_from_slice(pixels),
        }
    }

    if raw.width == width && raw.height == height {
        return Ok(rgb);
    }
    resize_rgb(rgb, raw.width, raw.height, width, height)
}

/// Resize a packed RGB24 buffer
pub fn resize_rgb(
    data: Vec<u8>,
    width: u32,
    height: u32,
    target_width: u32,
    target_height: u32,
) -> Result<Vec<u8>, CaptureError> {
    if width == target_width && height == target_height {
        return Ok(data);
    }
    if target_width == 0 || target_height == 0 {
        return Err(CaptureError::InvalidGeometry {
            details: format!("cannot resize to {}x{}", target_width, target_height),
        });
    }

    let image = RgbImage::from_raw(width, height, data).ok_or_else(|| {
        CaptureError::InvalidGeometry {
            details: format!("buffer does not hold a {}x{} RGB image", width, height),
        }
    })?;

    Ok(imageops::resize(&image, target_width, target_height, FilterType::Triangle).into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgra_with_padded_stride() {
        // 2x2 BGRA, each row padded with 4 extra bytes
        let data = vec![
            1, 2, 3, 255, 4, 5, 6, 255, 0, 0, 0, 0, //
            7, 8, 9, 255, 10, 11, 12, 255, 0, 0, 0, 0,
        ];
        let raw = RawFrame {
            width: 2,
            height: 2,
            stride: 12,
            layout: PixelLayout::Bgra8,
            data,
        };

        let rgb = normalize(&raw, 2, 2).unwrap();
        assert_eq!(rgb, vec![3, 2, 1, 6, 5, 4, 9, 8, 7, 12, 11, 10]);
    }

    #[test]
    fn test_rgba_drops_alpha() {
        let raw = RawFrame::packed(1, 2, PixelLayout::Rgba8, vec![10, 20, 30, 40, 50, 60, 70, 80]);
        assert_eq!(normalize(&raw, 1, 2).unwrap(), vec![10, 20, 30, 50, 60, 70]);
    }

    #[test]
    fn test_resize_to_target() {
        let raw = RawFrame::packed(8, 6, PixelLayout::Rgb8, vec![128; 8 * 6 * 3]);
        let rgb = normalize(&raw, 4, 3).unwrap();

        assert_eq!(rgb.len(), 4 * 3 * 3);
        assert!(rgb.iter().all(|v| *v == 128));
    }

    #[test]
    fn test_short_buffer_rejected() {
        let raw = RawFrame::packed(4, 4, PixelLayout::Bgra8, vec![0; 10]);
        assert!(matches!(
            normalize(&raw, 4, 4),
            Err(CaptureError::InvalidGeometry { .. })
        ));

        let raw = RawFrame::packed(0, 4, PixelLayout::Rgb8, Vec::new());
        assert!(normalize(&raw, 4, 4).is_err());
    }
}
