use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::pipeline::PipelineError;

/// Read `source` line by line into `lines` until end of stream or cancellation.
///
/// Lines are decoded lossily and stripped of their `\n`/`\r\n` terminator.
/// Returns the number of lines handed downstream. Dropping `lines` on return
/// closes the handoff, which lets the later stages drain and exit.
pub async fn read_lines<R>(
    source: R,
    lines: mpsc::Sender<String>,
    cancel: CancellationToken,
) -> Result<u64, PipelineError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(source);
    let mut buf = Vec::with_capacity(512);
    let mut count = 0u64;

    loop {
        buf.clear();

        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read.map_err(PipelineError::Read)?,
        };

        if read == 0 {
            tracing::debug!(lines = count, "log source reached end of stream");
            break;
        }

        let line = decode_line(&buf);

        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = lines.send(line) => {
                if sent.is_err() {
                    // Downstream stopped
                    break;
                }
            }
        }
        count += 1;
    }

    Ok(count)
}

fn decode_line(buf: &[u8]) -> String {
    let mut end = buf.len();
    if end > 0 && buf[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && buf[end - 1] == b'\r' {
        end -= 1;
    }
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
