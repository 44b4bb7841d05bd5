//! RGB crop and resize primitives shared by the detection, landmark and
//! embedding stages.

use rollcall_core::types::{FaceRegion, Frame};

/// Square crop window in source-frame coordinates, possibly extending past
/// the frame edges (sampling clamps to the border).
#[derive(Debug, Clone, Copy)]
pub(crate) struct CropBox {
    pub origin_x: f32,
    pub origin_y: f32,
    pub side: f32,
}

impl CropBox {
    /// Square window centered on the region, enlarged by `margin` (fraction
    /// of the longer region side) on every edge.
    pub(crate) fn around(region: &FaceRegion, margin: f32) -> Self {
        let w = region.width() as f32;
        let h = region.height() as f32;
        let side = w.max(h) * (1.0 + 2.0 * margin);
        let cx = region.left as f32 + w / 2.0;
        let cy = region.top as f32 + h / 2.0;
        Self {
            origin_x: cx - side / 2.0,
            origin_y: cy - side / 2.0,
            side,
        }
    }

    /// Map a point in crop-local pixel coordinates (for a crop resized to
    /// `resized_side`) back into source-frame coordinates.
    pub(crate) fn to_frame(&self, x: f32, y: f32, resized_side: usize) -> (f32, f32) {
        let scale = self.side / resized_side as f32;
        (self.origin_x + x * scale, self.origin_y + y * scale)
    }
}

/// Sample an RGB pixel with clamp-to-edge semantics.
fn sample(frame: &Frame, x: i64, y: i64) -> [u8; 3] {
    let x = x.clamp(0, frame.width as i64 - 1) as usize;
    let y = y.clamp(0, frame.height as i64 - 1) as usize;
    let off = (y * frame.width as usize + x) * 3;
    [frame.data[off], frame.data[off + 1], frame.data[off + 2]]
}

/// Extract a crop window resized to `side × side` interleaved RGB, bilinear.
pub(crate) fn crop_resize_rgb(frame: &Frame, crop: &CropBox, side: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(side * side * 3);
    let scale = crop.side / side as f32;

    for dy in 0..side {
        let src_y = crop.origin_y + (dy as f32 + 0.5) * scale - 0.5;
        let y0 = src_y.floor() as i64;
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for dx in 0..side {
            let src_x = crop.origin_x + (dx as f32 + 0.5) * scale - 0.5;
            let x0 = src_x.floor() as i64;
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = sample(frame, x0, y0);
            let tr = sample(frame, x0 + 1, y0);
            let bl = sample(frame, x0, y0 + 1);
            let br = sample(frame, x0 + 1, y0 + 1);

            for c in 0..3 {
                let top = tl[c] as f32 * (1.0 - fx) + tr[c] as f32 * fx;
                let bot = bl[c] as f32 * (1.0 - fx) + br[c] as f32 * fx;
                let val = top * (1.0 - fy) + bot * fy;
                out.push(val.round().clamp(0.0, 255.0) as u8);
            }
        }
    }

    out
}

/// Resize a full RGB frame to `dst_w × dst_h`, bilinear.
pub(crate) fn resize_rgb(frame: &Frame, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let sx = frame.width as f32 / dst_w as f32;
    let sy = frame.height as f32 / dst_h as f32;
    let mut out = Vec::with_capacity(dst_w * dst_h * 3);

    for dy in 0..dst_h {
        let src_y = (dy as f32 + 0.5) * sy - 0.5;
        let y0 = src_y.floor() as i64;
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for dx in 0..dst_w {
            let src_x = (dx as f32 + 0.5) * sx - 0.5;
            let x0 = src_x.floor() as i64;
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = sample(frame, x0, y0);
            let tr = sample(frame, x0 + 1, y0);
            let bl = sample(frame, x0, y0 + 1);
            let br = sample(frame, x0 + 1, y0 + 1);

            for c in 0..3 {
                let top = tl[c] as f32 * (1.0 - fx) + tr[c] as f32 * fx;
                let bot = bl[c] as f32 * (1.0 - fx) + br[c] as f32 * fx;
                let val = top * (1.0 - fy) + bot * fy;
                out.push(val.round().clamp(0.0, 255.0) as u8);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame {
            data: vec![value; Frame::expected_len(width, height)],
            width,
            height,
        }
    }

    #[test]
    fn test_crop_box_is_square_with_margin() {
        let region = FaceRegion { top: 100, right: 180, bottom: 220, left: 120 };
        // 60 wide, 120 tall → side = 120 * 1.2 = 144 with margin 0.1
        let crop = CropBox::around(&region, 0.1);
        assert!((crop.side - 144.0).abs() < 1e-3);
        // Centered on (150, 160)
        assert!((crop.origin_x - (150.0 - 72.0)).abs() < 1e-3);
        assert!((crop.origin_y - (160.0 - 72.0)).abs() < 1e-3);
    }

    #[test]
    fn test_crop_to_frame_roundtrip() {
        let region = FaceRegion { top: 0, right: 100, bottom: 100, left: 0 };
        let crop = CropBox::around(&region, 0.0);
        // Center of a 50x50 resized crop maps back to the region center.
        let (fx, fy) = crop.to_frame(25.0, 25.0, 50);
        assert!((fx - 50.0).abs() < 1e-3);
        assert!((fy - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_uniform_crop_stays_uniform() {
        let frame = uniform_frame(64, 64, 137);
        let region = FaceRegion { top: 8, right: 56, bottom: 56, left: 8 };
        let crop = CropBox::around(&region, 0.1);
        let out = crop_resize_rgb(&frame, &crop, 32);
        assert_eq!(out.len(), 32 * 32 * 3);
        assert!(out.iter().all(|&p| p == 137));
    }

    #[test]
    fn test_uniform_resize_stays_uniform() {
        let frame = uniform_frame(40, 30, 90);
        let out = resize_rgb(&frame, 80, 60);
        assert_eq!(out.len(), 80 * 60 * 3);
        assert!(out.iter().all(|&p| p == 90));
    }

    #[test]
    fn test_crop_past_edges_clamps() {
        let frame = uniform_frame(16, 16, 200);
        let region = FaceRegion { top: 0, right: 16, bottom: 16, left: 0 };
        // Large margin pushes the window past every border.
        let crop = CropBox::around(&region, 0.5);
        let out = crop_resize_rgb(&frame, &crop, 8);
        assert!(out.iter().all(|&p| p == 200));
    }
}
