//! Destinations for annotated frames: a directory of JPEGs, or a video file.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbImage;
use puck_vision_overlay::{FrameFormat, FramePacket};

const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "avi", "mkv"];

pub trait FrameWriter {
    fn write(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flushes whatever the writer buffers. Writing after this is undefined.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Numbered JPEGs in a directory, created on open.
pub struct ImageSequenceWriter {
    dir: PathBuf,
    fps: f64,
    written: u64,
}

impl ImageSequenceWriter {
    pub fn create(dir: &Path, fps: f64) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            fps,
            written: 0,
        })
    }
}

impl FrameWriter for ImageSequenceWriter {
    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        let timestamp_ms = (self.written as f64 / self.fps * 1000.0) as u64;
        let packet = FramePacket::encode(frame, timestamp_ms, FrameFormat::Jpeg)?;
        let name = format!("frame_{:06}.{}", self.written, packet.format.extension());
        let path = self.dir.join(name);
        fs::write(&path, &packet.data)
            .with_context(|| format!("cannot write {}", path.display()))?;
        self.written += 1;
        Ok(())
    }
}

pub fn is_video_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// A video writer for `.mp4`, `.avi` and `.mkv` paths, a frame directory otherwise.
pub fn open_writer(path: &Path, fps: f64) -> Result<Box<dyn FrameWriter>> {
    if !is_video_path(path) {
        return Ok(Box::new(ImageSequenceWriter::create(path, fps)?));
    }

    #[cfg(feature = "video")]
    {
        Ok(Box::new(crate::video::VideoFileWriter::new(path, fps)?))
    }
    #[cfg(not(feature = "video"))]
    {
        anyhow::bail!(
            "writing {} needs puck_tester built with the `video` feature",
            path.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::tempdir;

    #[test]
    fn sequence_frames_are_numbered_in_order() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("overlay");
        let mut writer = open_writer(&out, 30.0).unwrap();
        for shade in [10u8, 200] {
            writer.write(&RgbImage::from_pixel(8, 8, Rgb([shade; 3]))).unwrap();
        }
        writer.finish().unwrap();

        let mut names: Vec<String> = fs::read_dir(&out)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["frame_000000.jpg", "frame_000001.jpg"]);
        let second = image::open(out.join("frame_000001.jpg")).unwrap().to_rgb8();
        assert!(second.get_pixel(4, 4).0[0] > 150);
    }

    #[test]
    fn video_extensions_are_recognised() {
        assert!(is_video_path(Path::new("out/replay.MP4")));
        assert!(is_video_path(Path::new("clip.mkv")));
        assert!(!is_video_path(Path::new("out/frames")));
        assert!(!is_video_path(Path::new("still.jpg")));
    }

    #[cfg(not(feature = "video"))]
    #[test]
    fn video_output_needs_the_feature() {
        let dir = tempdir().unwrap();
        let error = open_writer(&dir.path().join("replay.mp4"), 30.0).err().unwrap();
        assert!(error.to_string().contains("`video` feature"), "{error}");
    }
}
