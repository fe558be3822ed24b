//! Mask-into-alpha merge: the pixel work behind §4.B step 4's mask coupling
//! (S5). Grounded on `original_source/app/services/comfy_prepare_prompt.py`
//! (`_merge_mask_into_image`), which inverts the mask's luminance and resizes
//! it to the base image's size with nearest-neighbor before writing it as the
//! alpha channel.

use image::{imageops::FilterType, GenericImageView, ImageBuffer, Rgba};

#[derive(Debug, Clone, thiserror::Error)]
pub enum MaskError {
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error("could not encode merged image: {0}")]
    Encode(String),
}

/// Merges `mask_png`'s inverted luminance into `base_png`'s alpha channel,
/// resizing the mask to the base image's dimensions (nearest-neighbor) when
/// they differ. Returns PNG-encoded bytes.
pub fn merge_mask_into_alpha(base_png: &[u8], mask_png: &[u8]) -> Result<Vec<u8>, MaskError> {
    let base = image::load_from_memory(base_png)
        .map_err(|e| MaskError::Decode(e.to_string()))?
        .to_rgba8();
    let mask_img =
        image::load_from_memory(mask_png).map_err(|e| MaskError::Decode(e.to_string()))?;

    let (width, height) = base.dimensions();
    let mask_img = if mask_img.dimensions() != (width, height) {
        mask_img.resize_exact(width, height, FilterType::Nearest)
    } else {
        mask_img
    };
    let mask_gray = mask_img.to_luma8();

    let mut out = ImageBuffer::<Rgba<u8>, Vec<u8>>::new(width, height);
    for (x, y, px) in base.enumerate_pixels() {
        let luminance = mask_gray.get_pixel(x, y).0[0];
        let alpha = 255u8.saturating_sub(luminance);
        out.put_pixel(x, y, Rgba([px[0], px[1], px[2], alpha]));
    }

    let mut buf = Vec::new();
    out.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| MaskError::Encode(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn solid_png(w: u32, h: u32, gray: u8) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(w, h, |_, _| Rgb([gray, gray, gray]));
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn inverts_mask_luminance_into_alpha() {
        let base = solid_png(4, 4, 200);
        let mask = solid_png(4, 4, 0); // black mask -> full opacity (inverted)
        let merged = merge_mask_into_alpha(&base, &mask).unwrap();
        let decoded = image::load_from_memory(&merged).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(0, 0).0[3], 255);
    }

    #[test]
    fn resizes_mismatched_mask_dimensions() {
        let base = solid_png(8, 8, 100);
        let mask = solid_png(2, 2, 255); // white mask -> zero alpha
        let merged = merge_mask_into_alpha(&base, &mask).unwrap();
        let decoded = image::load_from_memory(&merged).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (8, 8));
        assert_eq!(decoded.get_pixel(4, 4).0[3], 0);
    }
}
