// THEORY:
// The `color_mask` module is the segmentation layer. It turns a full colour
// frame into a binary mask of "pixels that look like the thing we want" and is
// the only place where raw frame data is read pixel by pixel.
//
// Key architectural principles:
// 1.  **Bands, not single ranges**: red pucks straddle hue 0, so one HSV box
//     cannot describe them. A `ColorBand` is a union of `HsvRange`s and the
//     configuration typically carries two ranges (one either side of the wrap).
// 2.  **Luma segmentation for the table**: the playing surface is a bright,
//     unsaturated region; calibration segments it on a narrow luma band instead
//     of hue.
// 3.  **Morphology as a mask operation**: closing (dilate then erode) merges
//     fragments split by the table markings before region extraction. It lives
//     on `BinaryMask` so detection and calibration share one implementation.

use crate::core_modules::pixel::pixel::{Hsv, Pixel};
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// An inclusive box in 8-bit HSV space.
///
/// Serialized as `[[h, s, v], [h, s, v]]`, low bound first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[[u8; 3]; 2]", into = "[[u8; 3]; 2]")]
pub struct HsvRange {
    /// Lower `[h, s, v]` bound, inclusive.
    pub low: [u8; 3],
    /// Upper `[h, s, v]` bound, inclusive.
    pub high: [u8; 3],
}

impl HsvRange {
    pub const fn new(low: [u8; 3], high: [u8; 3]) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, hsv: Hsv) -> bool {
        let channels = [hsv.hue, hsv.saturation, hsv.value];
        channels
            .iter()
            .zip(self.low.iter().zip(self.high.iter()))
            .all(|(c, (lo, hi))| lo <= c && c <= hi)
    }
}

impl From<[[u8; 3]; 2]> for HsvRange {
    fn from([low, high]: [[u8; 3]; 2]) -> Self {
        Self { low, high }
    }
}

impl From<HsvRange> for [[u8; 3]; 2] {
    fn from(range: HsvRange) -> Self {
        [range.low, range.high]
    }
}

/// A union of HSV ranges describing one object colour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorBand {
    pub ranges: Vec<HsvRange>,
}

impl ColorBand {
    pub fn new(ranges: Vec<HsvRange>) -> Self {
        Self { ranges }
    }

    pub fn contains(&self, hsv: Hsv) -> bool {
        self.ranges.iter().any(|range| range.contains(hsv))
    }

    /// Segments `frame` into a mask of pixels inside this band.
    pub fn mask(&self, frame: &RgbImage) -> BinaryMask {
        BinaryMask::from_fn(frame.width(), frame.height(), |x, y| {
            self.contains(Pixel::from(*frame.get_pixel(x, y)).hsv())
        })
    }
}

/// An inclusive luma interval, 0..255.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LumaBand {
    pub low: f64,
    pub high: f64,
}

impl LumaBand {
    pub fn mask(&self, frame: &RgbImage) -> BinaryMask {
        BinaryMask::from_fn(frame.width(), frame.height(), |x, y| {
            let luma = Pixel::from(*frame.get_pixel(x, y)).luminance();
            self.low <= luma && luma <= self.high
        })
    }
}

/// A row-major boolean image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl BinaryMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![false; (width * height) as usize],
        }
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    /// Out-of-bounds reads are `false`.
    #[inline]
    pub fn get(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return false;
        }
        self.data[self.index(x as u32, y as u32)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if x < self.width && y < self.height {
            let index = self.index(x, y);
            self.data[index] = value;
        }
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Morphological closing with a square `kernel` x `kernel` structuring element.
    ///
    /// A kernel of 0 or 1 returns the mask unchanged.
    pub fn close(&self, kernel: u32) -> BinaryMask {
        if kernel <= 1 {
            return self.clone();
        }
        self.dilate(kernel).erode(kernel)
    }

    pub fn dilate(&self, kernel: u32) -> BinaryMask {
        self.box_filter(kernel, |window| window.iter().any(|&v| v), false)
    }

    pub fn erode(&self, kernel: u32) -> BinaryMask {
        // Pixels beyond the border count as set, so erosion does not eat the frame edge.
        self.box_filter(kernel, |window| window.iter().all(|&v| v), true)
    }

    /// Separable box operation: rows first, then columns.
    fn box_filter(&self, kernel: u32, op: impl Fn(&[bool]) -> bool, border: bool) -> BinaryMask {
        let before = ((kernel - 1) / 2) as i64;
        let after = (kernel / 2) as i64;
        let sample = |mask: &BinaryMask, x: i64, y: i64| {
            if x < 0 || y < 0 || x >= mask.width as i64 || y >= mask.height as i64 {
                border
            } else {
                mask.data[mask.index(x as u32, y as u32)]
            }
        };

        let mut window = Vec::with_capacity(kernel as usize);
        let mut horizontal = BinaryMask::new(self.width, self.height);
        for y in 0..self.height as i64 {
            for x in 0..self.width as i64 {
                window.clear();
                window.extend((x - before..=x + after).map(|sx| sample(self, sx, y)));
                horizontal.set(x as u32, y as u32, op(&window));
            }
        }

        let mut output = BinaryMask::new(self.width, self.height);
        for y in 0..self.height as i64 {
            for x in 0..self.width as i64 {
                window.clear();
                window.extend((y - before..=y + after).map(|sy| sample(&horizontal, x, sy)));
                output.set(x as u32, y as u32, op(&window));
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn red_band() -> ColorBand {
        ColorBand::new(vec![
            HsvRange::new([0, 100, 100], [10, 255, 255]),
            HsvRange::new([160, 100, 100], [180, 255, 255]),
        ])
    }

    #[test]
    fn red_band_accepts_both_sides_of_the_hue_wrap() {
        let band = red_band();
        assert!(band.contains(Pixel::new(255, 0, 0).hsv()));
        assert!(band.contains(Pixel::new(255, 0, 40).hsv()));
        assert!(!band.contains(Pixel::new(0, 0, 255).hsv()));
        assert!(!band.contains(Pixel::new(200, 200, 200).hsv()));
    }

    #[test]
    fn band_mask_marks_matching_pixels_only() {
        let mut frame = RgbImage::from_pixel(8, 8, Rgb([200, 200, 200]));
        frame.put_pixel(3, 4, Rgb([230, 10, 10]));
        let mask = red_band().mask(&frame);
        assert_eq!(mask.count(), 1);
        assert!(mask.get(3, 4));
        assert!(!mask.get(4, 4));
    }

    #[test]
    fn luma_band_selects_the_bright_surface() {
        let mut frame = RgbImage::from_pixel(4, 4, Rgb([20, 20, 20]));
        frame.put_pixel(1, 1, Rgb([197, 197, 197]));
        let mask = LumaBand { low: 182.0, high: 212.0 }.mask(&frame);
        assert_eq!(mask.count(), 1);
        assert!(mask.get(1, 1));
    }

    #[test]
    fn closing_fills_a_one_pixel_gap() {
        let mut mask = BinaryMask::new(11, 5);
        for x in 0..11 {
            if x != 5 {
                for y in 1..4 {
                    mask.set(x, y, true);
                }
            }
        }
        let closed = mask.close(5);
        assert!(closed.get(5, 2));
        assert!(closed.count() >= mask.count());
    }

    #[test]
    fn out_of_bounds_reads_are_false() {
        let mask = BinaryMask::from_fn(2, 2, |_, _| true);
        assert!(!mask.get(-1, 0));
        assert!(!mask.get(2, 0));
        assert!(mask.get(1, 1));
    }
}
