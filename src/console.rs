use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::pipeline::{Pipeline, PipelineError};

/// Read protocol lines from `input` until EOF, writing each result to `output`.
///
/// Blank lines are ignored. Decode errors and pipeline failures are logged and
/// the loop moves on to the next line.
pub async fn run<R, W>(pipeline: &Pipeline, input: R, mut output: W) -> anyhow::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    info!("console ready, reading requests from stdin");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match pipeline.process(&line).await {
            Ok(result) => {
                output.write_all(result.as_bytes()).await?;
                output.write_all(b"\n").await?;
                output.flush().await?;
            }
            Err(PipelineError::Decode(_)) => {}
            Err(PipelineError::Failed(e)) => warn!("error handling request: {e:#}"),
        }
    }

    info!("console input closed");
    Ok(())
}
