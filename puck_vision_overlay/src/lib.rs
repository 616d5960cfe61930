// THEORY:
// The overlay is the live display of the tracking engine. It takes the frame
// the camera delivered and the `FrameRecord` the session produced for it, and
// paints what the engine believes onto the picture:
//
// - everything outside the calibrated table is dimmed, so a bad calibration is
//   obvious at a glance;
// - the table outline and both goal mouths;
// - one circle per entity, solid when detected and dashed when the position is
//   dead-reckoned, with a short heading tick when the entity is moving;
// - the score as pips along the top edge, and a frame-wide flash on the frame
//   a goal is declared.
//
// Rendering is plain pixel work on an `RgbImage`; encoding into a compressed
// `FramePacket` is a separate step so callers can choose where the bytes go.

use std::io::Cursor;
use std::sync::Arc;

use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    draw_polygon_mut,
};
use imageproc::point::Point;
use imageproc::rect::Rect;
use puck_vision::{
    Entity, EntityKind, FrameRecord, PixelPoint, PlayfieldMapping, Scorer, TableAxis, TablePoint,
    TrackerConfig,
};

/// Compressed output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Jpeg,
    Png,
}

impl FrameFormat {
    pub fn extension(self) -> &'static str {
        match self {
            FrameFormat::Jpeg => "jpg",
            FrameFormat::Png => "png",
        }
    }
}

/// One encoded overlay frame.
#[derive(Debug, Clone)]
pub struct FramePacket {
    pub ts_millis: u64,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    pub data: Arc<[u8]>,
}

impl FramePacket {
    pub fn encode(image: &RgbImage, ts_millis: u64, format: FrameFormat) -> anyhow::Result<Self> {
        let mut bytes = Cursor::new(Vec::new());
        let image_format = match format {
            FrameFormat::Jpeg => ImageFormat::Jpeg,
            FrameFormat::Png => ImageFormat::Png,
        };
        image.write_to(&mut bytes, image_format)?;
        Ok(Self {
            ts_millis,
            width: image.width(),
            height: image.height(),
            format,
            data: bytes.into_inner().into(),
        })
    }
}

/// Colours and sizes used by the overlay.
#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub table_outline: Rgb<u8>,
    pub goal_mouth: Rgb<u8>,
    pub puck: Rgb<u8>,
    pub paddle_a: Rgb<u8>,
    pub paddle_b: Rgb<u8>,
    /// Brightness multiplier for pixels off the table.
    pub dim_outside: f32,
    /// Circle radii in pixels.
    pub puck_radius: f64,
    pub paddle_radius: f64,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            table_outline: Rgb([43, 85, 156]),
            goal_mouth: Rgb([255, 255, 255]),
            puck: Rgb([0, 80, 255]),
            paddle_a: Rgb([255, 0, 0]),
            paddle_b: Rgb([255, 165, 0]),
            dim_outside: 0.4,
            puck_radius: 40.0,
            paddle_radius: 45.0,
        }
    }
}

/// Draws session state onto frames.
#[derive(Debug, Clone)]
pub struct Overlay {
    style: OverlayStyle,
    goal_axis: TableAxis,
    mouth: [f64; 2],
    win_score: u32,
}

impl Overlay {
    pub fn new(config: &TrackerConfig, style: OverlayStyle) -> Self {
        Self {
            style,
            goal_axis: config.table.goal_axis,
            mouth: config.goal.mouth,
            win_score: config.goal.win_score,
        }
    }

    /// A copy of `frame` with the overlay applied.
    pub fn render(
        &self,
        frame: &RgbImage,
        mapping: &PlayfieldMapping,
        record: &FrameRecord,
    ) -> RgbImage {
        let mut canvas = frame.clone();
        self.draw(&mut canvas, mapping, record);
        canvas
    }

    pub fn draw(&self, canvas: &mut RgbImage, mapping: &PlayfieldMapping, record: &FrameRecord) {
        self.dim_outside_table(canvas, mapping);

        let corners = mapping.corners();
        for i in 0..4 {
            draw_thick_line(canvas, corners[i], corners[(i + 1) % 4], self.style.table_outline, 3);
        }
        if let Some(mouths) = mapping.goal_mouths(self.goal_axis, self.mouth) {
            for (start, end) in mouths {
                draw_thick_line(canvas, start, end, self.style.goal_mouth, 5);
            }
        } else {
            tracing::debug!("goal mouths do not project into the frame");
        }

        for entity in record.entities() {
            self.draw_entity(canvas, mapping, entity);
        }

        self.draw_score(canvas, record);
        if record.in_goal {
            let colour = match record.scorer {
                Scorer::A => self.style.paddle_a,
                Scorer::B => self.style.paddle_b,
                Scorer::None => self.style.goal_mouth,
            };
            draw_border(canvas, colour, 8);
        }
    }

    fn dim_outside_table(&self, canvas: &mut RgbImage, mapping: &PlayfieldMapping) {
        let mut table = GrayImage::new(canvas.width(), canvas.height());
        let polygon = mapping
            .corners()
            .map(|c| Point::new(c.x.round() as i32, c.y.round() as i32));
        draw_polygon_mut(&mut table, &polygon, Luma([255]));

        let factor = self.style.dim_outside;
        for (pixel, inside) in canvas.pixels_mut().zip(table.pixels()) {
            if inside.0[0] == 0 {
                for channel in pixel.0.iter_mut() {
                    *channel = (*channel as f32 * factor) as u8;
                }
            }
        }
    }

    fn draw_entity(&self, canvas: &mut RgbImage, mapping: &PlayfieldMapping, entity: &Entity) {
        let (Some(centre), Some(position)) = (entity.pixel_center, entity.position) else {
            return;
        };
        let (colour, radius) = match entity.kind {
            EntityKind::Puck => (self.style.puck, self.style.puck_radius),
            EntityKind::PaddleA => (self.style.paddle_a, self.style.paddle_radius),
            EntityKind::PaddleB => (self.style.paddle_b, self.style.paddle_radius),
        };
        let (cx, cy) = (centre.x.round() as i32, centre.y.round() as i32);
        if entity.is_estimated() {
            draw_dashed_circle(canvas, centre, radius, colour);
        } else {
            draw_hollow_circle_mut(canvas, (cx, cy), radius.round() as i32, colour);
            draw_hollow_circle_mut(canvas, (cx, cy), radius.round() as i32 + 1, colour);
        }
        draw_filled_rect_mut(canvas, Rect::at(cx - 2, cy - 2).of_size(5, 5), colour);

        if entity.velocity.speed > 0.0 {
            let heading = entity.velocity.heading_degrees.to_radians();
            let ahead = TablePoint::new(
                position.u + 0.05 * heading.cos(),
                position.v + 0.05 * heading.sin(),
            );
            if let Some(tip) = mapping.to_pixel(ahead) {
                draw_thick_line(canvas, centre, tip, colour, 2);
            }
        }
    }

    /// One pip per goal: player A along the top-left, player B along the top-right.
    fn draw_score(&self, canvas: &mut RgbImage, record: &FrameRecord) {
        const PIP: i32 = 10;
        const GAP: i32 = 6;
        let width = canvas.width() as i32;
        for slot in 0..self.win_score as i32 {
            let a = Rect::at(GAP + slot * (PIP + GAP), GAP).of_size(PIP as u32, PIP as u32);
            let b = Rect::at(width - GAP - PIP - slot * (PIP + GAP), GAP)
                .of_size(PIP as u32, PIP as u32);
            for (pip, filled, colour) in [
                (a, slot < record.score.a as i32, self.style.paddle_a),
                (b, slot < record.score.b as i32, self.style.paddle_b),
            ] {
                if filled {
                    draw_filled_rect_mut(canvas, pip, colour);
                } else {
                    draw_hollow_rect_mut(canvas, pip, colour);
                }
            }
        }
    }
}

/// A line `thickness` pixels wide, as parallel one-pixel segments.
fn draw_thick_line(
    canvas: &mut RgbImage,
    from: PixelPoint,
    to: PixelPoint,
    colour: Rgb<u8>,
    thickness: u32,
) {
    let length = from.distance(&to);
    if length == 0.0 {
        return;
    }
    let (nx, ny) = ((from.y - to.y) / length, (to.x - from.x) / length);
    let first = -(thickness as i32 - 1) / 2;
    for offset in first..first + thickness as i32 {
        let (dx, dy) = (nx * offset as f64, ny * offset as f64);
        draw_line_segment_mut(
            canvas,
            ((from.x + dx) as f32, (from.y + dy) as f32),
            ((to.x + dx) as f32, (to.y + dy) as f32),
            colour,
        );
    }
}

/// Circle outline drawn as alternating arcs.
fn draw_dashed_circle(canvas: &mut RgbImage, centre: PixelPoint, radius: f64, colour: Rgb<u8>) {
    const DASHES: usize = 24;
    let point = |k: usize| {
        let angle = std::f64::consts::TAU * k as f64 / (2 * DASHES) as f64;
        (
            (centre.x + radius * angle.cos()) as f32,
            (centre.y + radius * angle.sin()) as f32,
        )
    };
    for dash in 0..DASHES {
        draw_line_segment_mut(canvas, point(2 * dash), point(2 * dash + 1), colour);
    }
}

fn draw_border(canvas: &mut RgbImage, colour: Rgb<u8>, thickness: u32) {
    let (width, height) = canvas.dimensions();
    for inset in 0..thickness.min(width / 2).min(height / 2) {
        let frame = Rect::at(inset as i32, inset as i32)
            .of_size(width - 2 * inset, height - 2 * inset);
        draw_hollow_rect_mut(canvas, frame, colour);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use puck_vision::{Distances, PositionSource, ScoreTally, Velocity};

    const GREY: Rgb<u8> = Rgb([200, 200, 200]);

    fn mapping() -> PlayfieldMapping {
        PlayfieldMapping::from_corners([
            PixelPoint::new(40.0, 40.0),
            PixelPoint::new(360.0, 40.0),
            PixelPoint::new(360.0, 260.0),
            PixelPoint::new(40.0, 260.0),
        ])
        .unwrap()
    }

    fn record() -> FrameRecord {
        let mut puck = Entity::unknown(EntityKind::Puck);
        puck.position = Some(TablePoint::new(0.5, 0.5));
        puck.pixel_center = Some(PixelPoint::new(200.0, 150.0));
        puck.source = PositionSource::Detected;
        puck.velocity = Velocity {
            speed: 1.0,
            heading_degrees: 0.0,
        };
        FrameRecord {
            timestamp: 0.0,
            frame_index: 0,
            puck,
            paddle_a: Entity::unknown(EntityKind::PaddleA),
            paddle_b: Entity::unknown(EntityKind::PaddleB),
            in_goal: false,
            scorer: Scorer::None,
            round_id: 3,
            game_id: 1,
            score: ScoreTally { a: 1, b: 1 },
            distances: Distances::default(),
        }
    }

    fn overlay() -> Overlay {
        Overlay::new(&TrackerConfig::default(), OverlayStyle::default())
    }

    #[test]
    fn outside_of_the_table_is_dimmed() {
        let frame = RgbImage::from_pixel(400, 300, GREY);
        let canvas = overlay().render(&frame, &mapping(), &record());
        assert_eq!(*canvas.get_pixel(20, 150), Rgb([80, 80, 80]));
        assert_eq!(*canvas.get_pixel(120, 100), GREY);
    }

    #[test]
    fn outline_goal_mouth_and_puck_are_drawn() {
        let style = OverlayStyle::default();
        let frame = RgbImage::from_pixel(400, 300, GREY);
        let canvas = overlay().render(&frame, &mapping(), &record());

        // Left rail, away from the mouths.
        assert_eq!(*canvas.get_pixel(40, 150), style.table_outline);
        // Top mouth spans u in [0.3, 0.7] along the top edge.
        assert_eq!(*canvas.get_pixel(200, 40), style.goal_mouth);
        // Puck centre marker and the rightmost point of its circle.
        assert_eq!(*canvas.get_pixel(200, 150), style.puck);
        assert_eq!(*canvas.get_pixel(240, 150), style.puck);
    }

    #[test]
    fn score_pips_fill_per_goal() {
        let style = OverlayStyle::default();
        let frame = RgbImage::from_pixel(400, 300, GREY);
        let canvas = overlay().render(&frame, &mapping(), &record());
        // First pip of A is filled, the second only outlined.
        assert_eq!(*canvas.get_pixel(11, 11), style.paddle_a);
        assert_ne!(*canvas.get_pixel(27, 11), style.paddle_a);
        assert_eq!(*canvas.get_pixel(22, 6), style.paddle_a);
    }

    #[test]
    fn goal_frames_flash_the_border() {
        let style = OverlayStyle::default();
        let mut goal = record();
        goal.in_goal = true;
        goal.scorer = Scorer::B;
        let canvas = overlay().render(&RgbImage::from_pixel(400, 300, GREY), &mapping(), &goal);
        assert_eq!(*canvas.get_pixel(399, 299), style.paddle_b);
    }

    #[test]
    fn packets_carry_encoded_images() {
        let frame = RgbImage::from_pixel(16, 8, GREY);
        let png = FramePacket::encode(&frame, 33, FrameFormat::Png).unwrap();
        assert_eq!(&png.data[1..4], b"PNG");
        assert_eq!((png.width, png.height, png.ts_millis), (16, 8, 33));

        let jpeg = FramePacket::encode(&frame, 0, FrameFormat::Jpeg).unwrap();
        assert_eq!(&jpeg.data[..2], &[0xFF, 0xD8]);
        assert_eq!(FrameFormat::Jpeg.extension(), "jpg");
    }
}
