// THEORY (single-pixel color heuristics):
// The `Pixel` module is the most fundamental unit of the detector. It is a
// "dumb" data container for one RGB sample plus the handful of single-pixel
// transforms the rest of the engine needs to segment the table, the puck and
// the paddles. Nothing in here looks at neighbors or at time.
//
// What lives here:
// - Raw channels (RGB) and their normalized (0..1 sRGB) forms.
// - Brightness: Rec. 601 luma, used to segment the bright table surface during
//   calibration.
// - HSV: hue, saturation and value. Colour bands in the configuration are
//   written in the 8-bit convention used by common camera tooling
//   (H in 0..180, S and V in 0..255) so thresholds tuned on the rig can be
//   pasted in unchanged. `Pixel::hsv` produces exactly that scale.
//
// Key principles:
// 1) Single-pixel scope: heuristics never read neighbors or history.
// 2) Cheap: everything is a handful of float ops, suitable for every pixel of
//    every frame.

pub mod pixel {
    pub type Channel = u8;
    pub type NormalizedChannel = f32;
    pub type Hue = f32;
    pub type Saturation = f32;
    pub type Value = f32;
    pub type Luminance = f64;

    /// A "dumb" data container representing a single RGB pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
    }

    /// A pixel expressed in 8-bit HSV: hue 0..180 (two degrees per step),
    /// saturation and value 0..255.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Hsv {
        pub hue: u8,
        pub saturation: u8,
        pub value: u8,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Self { red, green, blue }
        }

        fn normalized(&self) -> (NormalizedChannel, NormalizedChannel, NormalizedChannel) {
            (
                self.red as NormalizedChannel / 255.0,
                self.green as NormalizedChannel / 255.0,
                self.blue as NormalizedChannel / 255.0,
            )
        }

        /// Luminance estimate (Rec. 601 luma), 0..255.
        ///
        /// - The same weighting a grayscale conversion uses, so the calibration
        ///   luma band can be tuned on ordinary grayscale snapshots.
        pub fn luminance(&self) -> Luminance {
            0.299_f64 * self.red as f64
                + 0.587_f64 * self.green as f64
                + 0.114_f64 * self.blue as f64
        }

        /// Chroma (C): max(R,G,B) - min(R,G,B) on normalized sRGB.
        pub fn chroma(&self) -> f32 {
            let (r, g, b) = self.normalized();
            r.max(g.max(b)) - r.min(g.min(b))
        }

        /// Hue angle in degrees [0, 360).
        ///
        /// - Uses normalized sRGB channels, no linearization; the colour bands
        ///   are tuned against the camera's gamma-encoded output anyway.
        /// - Returns 0 for achromatic pixels.
        pub fn hue(&self) -> Hue {
            let (r, g, b) = self.normalized();
            let maximum_channel = r.max(g.max(b));
            let chroma = self.chroma();

            if chroma <= 1e-6 {
                return 0.0;
            }

            let inverse_chroma = 1.0 / chroma;

            let (base_difference, sector_offset) = if maximum_channel == r {
                (g - b, 0.0)
            } else if maximum_channel == g {
                (b - r, 2.0)
            } else {
                (r - g, 4.0)
            };

            let mut hue_degrees = (base_difference * inverse_chroma + sector_offset) * 60.0;
            if hue_degrees < 0.0 {
                hue_degrees += 360.0;
            }
            hue_degrees
        }

        /// Saturation (HSV): S = chroma / value, 0..1.
        pub fn saturation_hsv(&self) -> Saturation {
            let maximum_channel = self.value_hsv();
            if maximum_channel <= 1e-6 {
                return 0.0;
            }
            self.chroma() / maximum_channel
        }

        /// HSV Value (V): max(R, G, B), 0..1.
        pub fn value_hsv(&self) -> Value {
            let (r, g, b) = self.normalized();
            r.max(g.max(b))
        }

        /// The pixel in the 8-bit HSV convention used by the colour bands.
        pub fn hsv(&self) -> Hsv {
            // 360 degrees folded into 0..180; 359.x would round to 180, which wraps to 0.
            let hue = ((self.hue() / 2.0).round() as u16 % 180) as u8;
            Hsv {
                hue,
                saturation: (self.saturation_hsv() * 255.0).round() as u8,
                value: (self.value_hsv() * 255.0).round() as u8,
            }
        }
    }

    impl From<image::Rgb<u8>> for Pixel {
        fn from(rgb: image::Rgb<u8>) -> Self {
            let [red, green, blue] = rgb.0;
            Pixel::new(red, green, blue)
        }
    }
}
