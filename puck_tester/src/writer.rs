//! Drains session telemetry into JSON lines.
use std::path::PathBuf;

use anyhow::{Context, Result};
use puck_vision::Telemetry;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::UnboundedReceiver;

/// Writes every received item as one JSON object per line until the channel closes.
///
/// Writes to `path`, or stdout when `None`. Returns the number of lines written.
pub async fn write_json_lines(
    mut receiver: UnboundedReceiver<Telemetry>,
    path: Option<PathBuf>,
) -> Result<u64> {
    let output: Box<dyn AsyncWrite + Unpin + Send> = match &path {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("cannot create {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };
    let mut output = BufWriter::new(output);

    let mut lines = 0;
    while let Some(item) = receiver.recv().await {
        let mut line = serde_json::to_vec(&item)?;
        line.push(b'\n');
        output.write_all(&line).await?;
        lines += 1;
    }
    output.flush().await?;
    Ok(lines)
}
