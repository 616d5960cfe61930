//! Video files and camera devices through OpenCV.
use std::path::Path;

use anyhow::{Context, Result, bail};
use image::RgbImage;
use opencv::{
    core::{self, Mat, Scalar},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoWriter},
};
use tracing::{info, warn};

use crate::output::FrameWriter;

/// Frames read from a video file, or from a camera when the input is a device index.
pub struct VideoSource {
    capture: VideoCapture,
    fps: Option<f64>,
    finished: bool,
}

impl VideoSource {
    pub fn open(input: &str) -> Result<Self> {
        let capture = match input.parse::<i32>() {
            Ok(device) => VideoCapture::new(device, videoio::CAP_ANY),
            Err(_) => VideoCapture::from_file(input, videoio::CAP_ANY),
        }
        .with_context(|| format!("cannot open video input {input}"))?;
        if !capture.is_opened()? {
            bail!("video input {input} did not open");
        }

        let fps = capture.get(videoio::CAP_PROP_FPS)?;
        let fps = (fps.is_finite() && fps > 0.0).then_some(fps);
        info!(input, ?fps, "video input opened");
        Ok(Self {
            capture,
            fps,
            finished: false,
        })
    }

    /// Rate reported by the container or device, if it reports one.
    pub fn fps(&self) -> Option<f64> {
        self.fps
    }

    fn read(&mut self) -> Result<Option<RgbImage>> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }
        mat_to_rgb(&frame).map(Some)
    }
}

impl Iterator for VideoSource {
    type Item = Result<RgbImage>;

    /// Ends at the end of the stream; a read error is yielded once and ends it too.
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(error) => {
                warn!(%error, "video read failed");
                self.finished = true;
                Some(Err(error))
            }
        }
    }
}

/// An mp4v video, opened on the first frame so the size comes from the frames.
pub struct VideoFileWriter {
    path: String,
    fps: f64,
    writer: Option<VideoWriter>,
}

impl VideoFileWriter {
    pub fn new(path: &Path, fps: f64) -> Result<Self> {
        let path = path
            .to_str()
            .with_context(|| format!("video path {} is not UTF-8", path.display()))?
            .to_owned();
        Ok(Self {
            path,
            fps,
            writer: None,
        })
    }

    fn open(&self, frame: &RgbImage) -> Result<VideoWriter> {
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let size = core::Size::new(frame.width() as i32, frame.height() as i32);
        let writer = VideoWriter::new(&self.path, fourcc, self.fps, size, true)?;
        if !writer.is_opened()? {
            bail!("cannot open video writer for {}", self.path);
        }
        Ok(writer)
    }
}

impl FrameWriter for VideoFileWriter {
    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        let bgr = rgb_to_mat(frame)?;
        if self.writer.is_none() {
            self.writer = Some(self.open(frame)?);
        }
        if let Some(writer) = &mut self.writer {
            writer.write(&bgr)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.release()?;
        }
        Ok(())
    }
}

fn mat_to_rgb(bgr: &Mat) -> Result<RgbImage> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
    let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
    RgbImage::from_raw(width, height, rgb.data_bytes()?.to_vec())
        .context("decoded frame has an unexpected layout")
}

fn rgb_to_mat(frame: &RgbImage) -> Result<Mat> {
    let mut rgb = Mat::new_rows_cols_with_default(
        frame.height() as i32,
        frame.width() as i32,
        core::CV_8UC3,
        Scalar::all(0.0),
    )?;
    rgb.data_bytes_mut()?.copy_from_slice(frame.as_raw());
    let mut bgr = Mat::default();
    imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
    Ok(bgr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn conversion_keeps_channel_order() {
        let mut frame = RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]));
        frame.put_pixel(2, 1, Rgb([200, 0, 0]));

        let bgr = rgb_to_mat(&frame).unwrap();
        assert_eq!((bgr.cols(), bgr.rows()), (3, 2));
        assert_eq!(&bgr.data_bytes().unwrap()[..3], &[30, 20, 10]);

        let back = mat_to_rgb(&bgr).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn a_missing_file_does_not_open() {
        assert!(VideoSource::open("/nonexistent/table.mp4").is_err());
    }
}
