//! Recorded inputs: a directory of frames and an optional hand-landmark sidecar.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbImage;
use puck_vision::HandLandmarks;

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Image files of a directory, replayed in file-name order.
#[derive(Debug, Clone)]
pub struct FrameSource {
    paths: Vec<PathBuf>,
}

impl FrameSource {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        let entries = fs::read_dir(dir)
            .with_context(|| format!("cannot list frames in {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            let is_frame = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if is_frame {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(Self { paths })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Every frame in order. A frame that fails to decode yields its error and the
    /// iteration carries on with the next file.
    pub fn frames(self) -> impl Iterator<Item = Result<RgbImage>> {
        self.paths.into_iter().map(|path| decode(&path))
    }
}

fn decode(path: &Path) -> Result<RgbImage> {
    let image = image::open(path)
        .with_context(|| format!("cannot decode frame {}", path.display()))?;
    Ok(image.to_rgb8())
}

/// Hand skeletons per frame: line `n` of the file holds the JSON array of hands seen in frame `n`.
#[derive(Debug, Clone, Default)]
pub struct HandSidecar {
    frames: Vec<Vec<HandLandmarks>>,
}

impl HandSidecar {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("cannot read hand landmarks from {}", path.display()))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let frames = contents
            .lines()
            .enumerate()
            .map(|(number, line)| {
                if line.trim().is_empty() {
                    return Ok(Vec::new());
                }
                serde_json::from_str(line)
                    .with_context(|| format!("bad hand landmarks on line {}", number + 1))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { frames })
    }

    /// Hands of frame `index`; frames past the end of the file have none.
    pub fn hands(&self, index: usize) -> &[HandLandmarks] {
        self.frames.get(index).map(Vec::as_slice).unwrap_or(&[])
    }
}
