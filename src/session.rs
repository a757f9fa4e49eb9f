//! Connection Session: one task per accepted TCP connection, enforcing the
//! login gate and running the read-parse-dispatch-reply loop. Grounded on
//! the teacher's `handle_connection`
//! (`examples/Zygimantass-slsk-rs/src/bin/server/connection.rs`) — same
//! split-socket-plus-writer-task shape, generalized from length-prefixed
//! binary frames to `\n`-delimited lines.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::dispatcher::{self, AppState};
use crate::protocol::{self, Command};

/// Runs a session to completion. The session always runs the `LOG OUT`
/// flow on the way out, however it ends — clean EOF, a transport error, or
/// the task being dropped.
pub async fn run_session(stream: TcpStream, state: AppState) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::warn!(error = %e, "failed to set TCP_NODELAY");
    }
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer_task = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let mut current_user: Option<String> = None;
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                for response in handle_line(&state, &mut current_user, &tx, &line).await {
                    if tx.send(response).is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "transport error, closing session");
                let _ = tx.send("ERROR\r\n".to_string());
                break;
            }
        }
    }

    if current_user.is_some() {
        let _ = dispatcher::handle_command(&state, &mut current_user, &tx, Command::LogOut).await;
    }

    drop(tx);
    let _ = writer_task.await;
}

async fn handle_line(
    state: &AppState,
    current_user: &mut Option<String>,
    tx: &mpsc::UnboundedSender<String>,
    line: &str,
) -> Vec<String> {
    let Some(cmd) = protocol::parse(line) else {
        return vec![protocol::UNKNOWN_COMMAND.to_string()];
    };

    if current_user.is_none() && !matches!(cmd, Command::Login { .. }) {
        return vec![protocol::NOT_LOGGED_IN.to_string()];
    }

    dispatcher::handle_command(state, current_user, tx, cmd).await
}
