//! Replays recorded frames, a video file or a camera through a tracking session.
//!
//! Telemetry goes out as JSON lines (one frame record per frame, plus one goal
//! event per goal). With `--overlay`, every annotated frame is written to a frame
//! directory or a video file. With `--clip-dir`, the seconds before each goal are saved.
mod clips;
mod input;
mod output;
#[cfg(feature = "video")]
mod video;
mod writer;

use std::iter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use image::RgbImage;
use puck_vision::{Calibrator, ChannelSink, PlayfieldMapping, TrackerConfig, TrackingSession};
use puck_vision_overlay::{Overlay, OverlayStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use clips::GoalClipRecorder;
use input::{FrameSource, HandSidecar};
use output::open_writer;
use writer::write_json_lines;

const DEFAULT_FPS: f64 = 30.0;

type Frames = Box<dyn Iterator<Item = Result<RgbImage>>>;

#[derive(Parser, Debug)]
#[clap(name = "puck_tester", about = "Track puck and paddles over recorded frames or video")]
struct Cli {
    /// Directory of frames replayed in file-name order, a video file, or a camera index.
    input: String,

    /// TOML configuration; defaults apply when omitted.
    #[clap(long)]
    config: Option<PathBuf>,

    /// JSON-lines hand landmarks, one line per frame.
    #[clap(long)]
    hands: Option<PathBuf>,

    /// Capture rate used to timestamp frames. Videos report their own; 30 otherwise.
    #[clap(long)]
    fps: Option<f64>,

    /// Telemetry destination; stdout when omitted.
    #[clap(long, short)]
    output: Option<PathBuf>,

    /// Annotated output: a video for .mp4/.avi/.mkv paths, a frame directory otherwise.
    #[clap(long)]
    overlay: Option<PathBuf>,

    /// Directory receiving a clip of the frames before each goal.
    #[clap(long)]
    clip_dir: Option<PathBuf>,

    /// Length of goal clips.
    #[clap(long, default_value_t = 3.0)]
    clip_secs: f64,
}

/// Opens the input and returns its frames with the rate it reports, if any.
fn open_input(input: &str) -> Result<(Frames, Option<f64>)> {
    let path = Path::new(input);
    if path.is_dir() {
        let source = FrameSource::open(path)?;
        if source.is_empty() {
            bail!("no frames found in {}", path.display());
        }
        info!(frames = source.len(), dir = %path.display(), "frame directory opened");
        return Ok((Box::new(source.frames()), None));
    }

    #[cfg(feature = "video")]
    {
        let source = video::VideoSource::open(input)?;
        let fps = source.fps();
        Ok((Box::new(source), fps))
    }
    #[cfg(not(feature = "video"))]
    {
        bail!("{input} is not a frame directory; video input needs the `video` feature")
    }
}

/// Calibrates on the leading frames and hands back every frame, the ones used included.
fn calibrate(mut frames: Frames, calibrator: &Calibrator) -> Result<(PlayfieldMapping, Frames)> {
    let mut pulled: Vec<Result<RgbImage>> = Vec::new();
    let attempts = iter::from_fn(|| {
        loop {
            match frames.next()? {
                Ok(frame) => {
                    pulled.push(Ok(frame.clone()));
                    return Some(frame);
                }
                Err(error) => {
                    warn!(%error, "undecodable frame skipped for calibration");
                    pulled.push(Err(error));
                }
            }
        }
    });
    let mapping = calibrator
        .calibrate_from(attempts)
        .context("table calibration failed")?;
    Ok((mapping, Box::new(pulled.into_iter().chain(frames))))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Some(fps) = cli.fps.filter(|fps| !(fps.is_finite() && *fps > 0.0)) {
        bail!("--fps must be positive, got {fps}");
    }
    if !(cli.clip_secs.is_finite() && cli.clip_secs > 0.0) {
        bail!("--clip-secs must be positive, got {}", cli.clip_secs);
    }

    let config = match &cli.config {
        Some(path) => TrackerConfig::load(path)
            .with_context(|| format!("cannot load config {}", path.display()))?,
        None => TrackerConfig::default(),
    };
    let hands = match &cli.hands {
        Some(path) => HandSidecar::load(path)?,
        None => HandSidecar::default(),
    };

    let (frames, reported_fps) = open_input(&cli.input)?;
    let fps = cli.fps.or(reported_fps).unwrap_or(DEFAULT_FPS);
    let calibrator = Calibrator::new(config.calibration.clone());
    let (mapping, frames) = calibrate(frames, &calibrator)?;
    info!(corners = ?mapping.corners(), fps, "table calibrated");

    let mut overlay = match &cli.overlay {
        Some(path) => {
            let destination = open_writer(path, fps)?;
            Some((Overlay::new(&config, OverlayStyle::default()), destination))
        }
        None => None,
    };
    let mut clips = cli
        .clip_dir
        .as_deref()
        .map(|dir| GoalClipRecorder::new(dir, cli.clip_secs, fps));

    let runtime = tokio::runtime::Runtime::new()?;
    let (mut sink, receiver) = ChannelSink::new();
    let writer = runtime.spawn(write_json_lines(receiver, cli.output.clone()));

    let mut session = TrackingSession::new(config, mapping);
    let mut goals = 0u64;
    for (index, frame) in frames.enumerate() {
        let frame = match frame {
            Ok(frame) => frame,
            Err(error) => {
                warn!(index, %error, "skipping frame");
                continue;
            }
        };
        let timestamp = index as f64 / fps;
        let output = session.step(&frame, hands.hands(index), timestamp, &mut sink);

        let annotated = overlay
            .as_ref()
            .map(|(overlay, _)| overlay.render(&frame, session.mapping(), &output.record));
        if let (Some(annotated), Some((_, destination))) = (&annotated, &mut overlay) {
            destination.write(annotated)?;
        }

        if let Some(recorder) = &mut clips {
            recorder.push(annotated.as_ref().unwrap_or(&frame));
            if let Some(goal) = &output.goal {
                if let Err(error) = recorder.save(goal) {
                    warn!(%error, "goal clip not saved");
                }
            }
        }
        if output.goal.is_some() {
            goals += 1;
        }
    }

    if let Some((_, destination)) = &mut overlay {
        destination.finish()?;
    }
    drop(sink);
    let lines = runtime.block_on(writer)??;
    let score = session.goals().score();
    info!(
        frames = session.frame_index(),
        lines,
        goals,
        rejections = session.rejections(),
        publish_failures = session.publish_failures(),
        score_a = score.a,
        score_b = score.b,
        game = session.goals().game_id(),
        "replay finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const SURFACE: Rgb<u8> = Rgb([197, 197, 197]);

    /// A bright, slightly skewed table quad on a dark background.
    fn table_frame() -> RgbImage {
        let quad = [(20.0, 15.0), (180.0, 20.0), (185.0, 135.0), (15.0, 130.0)];
        RgbImage::from_fn(200, 150, |x, y| {
            let (px, py) = (x as f64, y as f64);
            let inside = (0..4).all(|i| {
                let (ax, ay) = quad[i];
                let (bx, by) = quad[(i + 1) % 4];
                (bx - ax) * (py - ay) - (by - ay) * (px - ax) >= 0.0
            });
            if inside { SURFACE } else { Rgb([30, 40, 35]) }
        })
    }

    #[test]
    fn frames_used_for_calibration_are_replayed() {
        let frames: Frames = Box::new(
            vec![
                Err(anyhow::anyhow!("broken")),
                Ok(RgbImage::new(200, 150)),
                Ok(table_frame()),
                Ok(RgbImage::new(4, 4)),
            ]
            .into_iter(),
        );
        let calibrator = Calibrator::new(TrackerConfig::default().calibration);

        let (mapping, replay) = calibrate(frames, &calibrator).unwrap();
        assert!(mapping.area() > 10_000.0);

        let replay: Vec<_> = replay.collect();
        assert_eq!(replay.len(), 4);
        assert!(replay[0].is_err());
        assert_eq!(replay[2].as_ref().unwrap().get_pixel(100, 75), &SURFACE);
        assert_eq!(replay[3].as_ref().unwrap().width(), 4);
    }

    #[test]
    fn calibration_fails_when_no_frame_shows_the_table() {
        let dark = iter::repeat_with(|| Ok::<_, anyhow::Error>(RgbImage::new(50, 50)));
        let frames: Frames = Box::new(dark.take(3));
        let calibrator = Calibrator::new(TrackerConfig::default().calibration);
        assert!(calibrate(frames, &calibrator).is_err());
    }
}
