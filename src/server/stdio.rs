//! Stdio transport: one JSON-RPC request per line in, one response per line out.
//!
//! Requests run concurrently, so responses can come back in a different
//! order than the requests; clients match them by `id`.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::RpcHandler;
use crate::error::Result;
use crate::types::JsonRpcResponse;

/// Serve the process's stdin and stdout.
pub async fn serve_stdio(handler: Arc<RpcHandler>, shutdown: CancellationToken) -> Result<()> {
    serve(
        handler,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown,
    )
    .await
}

/// Serve `reader` and `writer` until EOF or `shutdown`.
///
/// On EOF, requests already read still get their responses. A line that is
/// not valid JSON, including one that is not UTF-8, gets a parse error and
/// the loop keeps reading.
pub async fn serve<R, W>(
    handler: Arc<RpcHandler>,
    mut reader: R,
    mut writer: W,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!(target: "bridge.stdio", "serving stdio");
    // survives a cancelled read_until, which keeps the bytes it already read
    let mut line = Vec::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
    let mut tx = Some(tx);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            read = reader.read_until(b'\n', &mut line), if tx.is_some() => {
                let read = read?;
                if let Some(sender) = &tx {
                    dispatch(&handler, sender, std::mem::take(&mut line));
                }
                if read == 0 {
                    debug!(target: "bridge.stdio", "stdin closed");
                    tx = None;
                }
            },
            response = rx.recv() => match response {
                Some(response) => {
                    let mut out = serde_json::to_vec(&response)?;
                    out.push(b'\n');
                    writer.write_all(&out).await?;
                    writer.flush().await?;
                },
                None => break,
            },
        }
    }
    info!(target: "bridge.stdio", "stdio closed");
    Ok(())
}

/// Answer one line on its own task. Blank lines are skipped.
fn dispatch(
    handler: &Arc<RpcHandler>,
    sender: &mpsc::UnboundedSender<JsonRpcResponse>,
    line: Vec<u8>,
) {
    if line.iter().all(u8::is_ascii_whitespace) {
        return;
    }
    let sender = sender.clone();
    let handler = Arc::clone(handler);
    tokio::spawn(async move {
        if let Some(response) = handler.handle_bytes(&line).await {
            let _ = sender.send(response);
        }
    });
}
