//! Output stream monitors.
//!
//! Each monitor owns one output pipe of the target, scans it line by line
//! against the crash signatures, and reports a single verdict. After a
//! match it keeps draining the pipe so a chatty target never blocks on a
//! full buffer while it is being stopped.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tripwire_core::{CrashSignatureSet, SignatureMatch, Stream};

/// Longest line kept for matching; the rest of an oversized line is discarded.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// A monitor's single report for its stream.
#[derive(Debug)]
pub(crate) enum ScanVerdict {
    /// A crash signature matched.
    Matched(SignatureMatch),
    /// The stream closed without any match.
    Clean,
    /// Reading the stream failed.
    Failed(io::Error),
}

/// Start a monitor task over `reader`.
///
/// Returns the verdict receiver and the task handle; aborting the handle
/// stops any post-match draining.
pub(crate) fn spawn_monitor<R>(
    reader: R,
    stream: Stream,
    signatures: Arc<CrashSignatureSet>,
) -> (oneshot::Receiver<ScanVerdict>, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let verdict = scan(&mut reader, &signatures).await;
        let matched = matches!(verdict, ScanVerdict::Matched(_));
        if tx.send(verdict).is_err() {
            tracing::debug!(%stream, "verdict dropped, case already decided");
        }
        if matched {
            match tokio::io::copy(&mut reader, &mut tokio::io::sink()).await {
                Ok(bytes) => tracing::debug!(%stream, bytes, "drained output after match"),
                Err(e) => tracing::debug!(%stream, error = %e, "drain stopped"),
            }
        }
    });
    (rx, handle)
}

/// Scan lines until a signature matches, the stream ends, or a read fails.
pub(crate) async fn scan<R>(reader: &mut R, signatures: &CrashSignatureSet) -> ScanVerdict
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::with_capacity(256);
    loop {
        match read_line_capped(reader, &mut line, MAX_LINE_LEN).await {
            Ok(false) => return ScanVerdict::Clean,
            Ok(true) => {
                if let Some(found) = signatures.find(&line) {
                    return ScanVerdict::Matched(found);
                }
            }
            Err(e) => return ScanVerdict::Failed(e),
        }
    }
}

/// Read one LF-terminated line into `line`, without the terminator.
///
/// A trailing CR is stripped. Bytes beyond `cap` are consumed but not kept.
/// Returns `false` at end of stream when no bytes were read.
async fn read_line_capped<R>(reader: &mut R, line: &mut Vec<u8>, cap: usize) -> io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    let mut read_any = false;
    loop {
        let (used, terminated) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                break;
            }
            read_any = true;
            let (chunk, used, terminated) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (&available[..i], i + 1, true),
                None => (available, available.len(), false),
            };
            let room = cap.saturating_sub(line.len());
            line.extend_from_slice(&chunk[..chunk.len().min(room)]);
            (used, terminated)
        };
        reader.consume(used);
        if terminated {
            break;
        }
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(read_any)
}
