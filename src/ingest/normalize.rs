//! Frame geometry helpers shared by the ingest backends.

/// Apply a software zoom as a center crop of the luma plane.
///
/// A zoom of 1.0 returns the input untouched. Smaller factors keep the
/// middle `zoom * width` x `zoom * height` region, which is what the
/// original hardware scaler crop does optically.
pub fn crop_center(luma: Vec<u8>, width: u32, height: u32, zoom: f32) -> (Vec<u8>, u32, u32) {
    if zoom >= 1.0 {
        return (luma, width, height);
    }
    let crop_w = ((width as f32 * zoom) as u32).max(1);
    let crop_h = ((height as f32 * zoom) as u32).max(1);
    let x0 = (width - crop_w) / 2;
    let y0 = (height - crop_h) / 2;

    let mut out = Vec::with_capacity((crop_w * crop_h) as usize);
    for row in y0..y0 + crop_h {
        let start = (row * width + x0) as usize;
        out.extend_from_slice(&luma[start..start + crop_w as usize]);
    }
    (out, crop_w, crop_h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_zoom_is_identity() {
        let luma = vec![1u8, 2, 3, 4];
        let (out, w, h) = crop_center(luma.clone(), 2, 2, 1.0);
        assert_eq!(out, luma);
        assert_eq!((w, h), (2, 2));
    }

    #[test]
    fn half_zoom_keeps_the_center() {
        // 4x4 frame with a distinct center 2x2 block.
        #[rustfmt::skip]
        let luma = vec![
            0, 0, 0, 0,
            0, 9, 8, 0,
            0, 7, 6, 0,
            0, 0, 0, 0,
        ];
        let (out, w, h) = crop_center(luma, 4, 4, 0.5);
        assert_eq!((w, h), (2, 2));
        assert_eq!(out, vec![9, 8, 7, 6]);
    }

    #[test]
    fn tiny_zoom_never_collapses_to_zero() {
        let (out, w, h) = crop_center(vec![5u8; 100], 10, 10, 0.01);
        assert_eq!((w, h), (1, 1));
        assert_eq!(out.len(), 1);
    }
}
