//! Keeps the last few seconds of frames and saves them when a goal is declared.
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::Result;
use image::RgbImage;
use puck_vision::GoalEvent;
use tracing::info;

use crate::output::open_writer;

pub struct GoalClipRecorder {
    buffer: VecDeque<RgbImage>,
    capacity: usize,
    dir: PathBuf,
    fps: f64,
}

impl GoalClipRecorder {
    pub fn new(dir: &Path, clip_secs: f64, fps: f64) -> Self {
        let capacity = ((clip_secs * fps).round() as usize).max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            dir: dir.to_path_buf(),
            fps,
        }
    }

    pub fn push(&mut self, frame: &RgbImage) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(frame.clone());
    }

    /// Writes the buffered frames, oldest first, and returns where they went.
    /// The buffer is kept, so a second goal inside the window shares frames.
    pub fn save(&self, goal: &GoalEvent) -> Result<PathBuf> {
        let scorer = format!("{:?}", goal.scorer).to_lowercase();
        let mut name = format!("goal_clip_g{}_r{}_{scorer}", goal.game_id, goal.round_id);
        if cfg!(feature = "video") {
            name.push_str(".mp4");
        }
        let path = self.dir.join(name);

        let mut writer = open_writer(&path, self.fps)?;
        for frame in &self.buffer {
            writer.write(frame)?;
        }
        writer.finish()?;
        info!(path = %path.display(), frames = self.buffer.len(), "goal clip saved");
        Ok(path)
    }
}
