//! Stdio message host
//!
//! Reads one JSON request per line from stdin and writes one JSON reply
//! per line to stdout. Each request runs as its own task, so an
//! `AUTH_REQUIRED` challenge is answered while a slow `UPDATE_PROXY` is
//! still waiting on the platform. Replies may therefore come back out of
//! order; a request carrying an `"id"` gets the same `"id"` on its reply.
//!
//! Every committed state change is pushed as a `STATE_CHANGED` line.

use anyhow::Result;
use serde_json::Value;
use sockswitch_core::{Event, ProxyController, ProxyPlatform, StateChange, handle_raw};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Outgoing lines buffered before backpressure
const OUTPUT_CAPACITY: usize = 256;

/// Serve on the process's stdin/stdout
pub async fn run<P: ProxyPlatform + 'static>(controller: Arc<ProxyController<P>>) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    run_with(controller, stdin, tokio::io::stdout()).await?;
    Ok(())
}

/// Serve until `input` ends and every request has been answered.
///
/// Returns the output sink.
pub async fn run_with<P, R, W>(controller: Arc<ProxyController<P>>, input: R, output: W) -> Result<W>
where
    P: ProxyPlatform + 'static,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    info!("Serving message protocol on stdio");

    let (out_tx, out_rx) = mpsc::channel::<String>(OUTPUT_CAPACITY);
    let writer = tokio::spawn(write_lines(out_rx, output));

    let mut changes = controller.subscribe();
    let mut requests = JoinSet::new();
    let mut lines = input.lines();
    let mut eof = false;

    loop {
        tokio::select! {
            line = lines.next_line(), if !eof => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    let controller = controller.clone();
                    let out_tx = out_tx.clone();
                    requests.spawn(async move {
                        let reply = respond(&controller, &line).await;
                        let _ = out_tx.send(reply).await;
                    });
                }
                None => {
                    debug!("stdin closed");
                    eof = true;
                }
            },
            Some(joined) = requests.join_next(), if !requests.is_empty() => {
                if let Err(e) = joined {
                    warn!("Request task failed: {}", e);
                }
            }
            change = changes.recv() => match change {
                Ok(change) => forward_change(&out_tx, change).await,
                Err(RecvError::Lagged(n)) => warn!("Dropped {} state change notifications", n),
                Err(RecvError::Closed) => break,
            },
        }

        if eof && requests.is_empty() {
            break;
        }
    }

    // Changes committed by the last requests
    while let Ok(change) = changes.try_recv() {
        forward_change(&out_tx, change).await;
    }

    drop(out_tx);
    let output = writer.await??;
    info!("Message host stopped");
    Ok(output)
}

/// Handle one line, echoing its `id` if it has one
async fn respond<P: ProxyPlatform>(controller: &ProxyController<P>, line: &str) -> String {
    let id = serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|mut v| v.as_object_mut().and_then(|o| o.remove("id")));

    let reply = handle_raw(controller, line).await;

    match id {
        Some(id) => {
            let mut value = serde_json::to_value(&reply).unwrap_or(Value::Null);
            if let Some(object) = value.as_object_mut() {
                object.insert("id".to_string(), id);
            }
            value.to_string()
        }
        None => reply.to_json(),
    }
}

async fn forward_change(out_tx: &mpsc::Sender<String>, change: StateChange) {
    if change.connection_changed() {
        debug!("Pushing connection change (connected: {})", change.current.is_connected);
    }
    let event = Event::StateChanged {
        state: change.current,
    };
    let _ = out_tx.send(event.to_json()).await;
}

async fn write_lines<W>(mut rx: mpsc::Receiver<String>, mut output: W) -> std::io::Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sockswitch_core::{DetachedPlatform, StateStore};

    fn controller() -> Arc<ProxyController<DetachedPlatform>> {
        Arc::new(ProxyController::new(DetachedPlatform::new(), StateStore::in_memory()))
    }

    async fn serve(ctl: Arc<ProxyController<DetachedPlatform>>, input: &str) -> Vec<Value> {
        let output = run_with(ctl, input.as_bytes(), Vec::new()).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_replies_carry_ids() {
        let input = concat!(
            r#"{"id":1,"type":"UPDATE_PROXY","data":{"isConnected":true,"host":"10.0.0.5","port":1080,"username":"alice","password":"pw"}}"#,
            "\n",
            "garbage\n",
            "\n",
        );
        let ctl = controller();
        let lines = serve(ctl.clone(), input).await;

        assert!(lines.contains(&json!({ "id": 1, "status": "success" })));
        assert!(lines.contains(&json!({ "status": "error", "reason": "malformed" })));

        let event = lines
            .iter()
            .find(|l| l["type"] == "STATE_CHANGED")
            .expect("state change event");
        assert_eq!(event["state"]["isConnected"], true);

        assert!(ctl.get_status().await.is_connected);
    }

    #[tokio::test]
    async fn test_auth_challenge_over_stdio() {
        let ctl = controller();
        ctl.apply_intent(
            sockswitch_core::ConnectionIntent::connect("10.0.0.5", 1080).with_credentials("alice", "pw"),
        )
        .await;

        let input = concat!(
            r#"{"id":"a","type":"AUTH_REQUIRED","details":{"isProxy":true}}"#,
            "\n",
            r#"{"id":"b","type":"AUTH_REQUIRED","details":{"isProxy":false}}"#,
            "\n",
        );
        let lines = serve(ctl, input).await;

        assert_eq!(lines.len(), 2);
        assert!(lines.contains(&json!({
            "id": "a",
            "authCredentials": { "username": "alice", "password": "pw" }
        })));
        assert!(lines.contains(&json!({ "id": "b" })));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let lines = serve(controller(), "").await;
        assert!(lines.is_empty());
    }
}
