//! Terminal side of a chat: line input and message display.

use std::io::Write;

use lanchat_core::EXIT_SENTINEL;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{broadcast, mpsc};

use crate::session::Incoming;

pub const PROMPT: &str = "Enter message to send (or 'exit' to disconnect): ";

/// Feed input lines into one session. End of input is turned into the exit sentinel.
pub async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>, prompt: bool) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        if prompt {
            print_prompt();
        }
        match lines.next_line().await? {
            Some(line) => {
                if tx.send(line).await.is_err() {
                    return Ok(());
                }
            }
            None => {
                let _ = tx.send(EXIT_SENTINEL.to_string()).await;
                return Ok(());
            }
        }
    }
}

/// Copy input lines to every live session. End of input just stops broadcasting.
pub async fn broadcast_lines<R>(
    reader: R,
    tx: broadcast::Sender<String>,
    prompt: bool,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        if prompt {
            print_prompt();
        }
        match lines.next_line().await? {
            // No subscribers is not an error: nobody is connected yet.
            Some(line) => {
                let _ = tx.send(line);
            }
            None => return Ok(()),
        }
    }
}

/// Print incoming messages, clearing the current prompt line first and redrawing it after.
pub async fn display_loop(mut rx: mpsc::UnboundedReceiver<Incoming>, prompt: bool) {
    while let Some(incoming) = rx.recv().await {
        print_incoming(&incoming, prompt);
    }
}

fn print_incoming(incoming: &Incoming, prompt: bool) {
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "\x1b[2K\r{}", format_incoming(incoming));
    if prompt {
        let _ = write!(out, "{PROMPT}");
    }
    let _ = out.flush();
}

pub fn format_incoming(incoming: &Incoming) -> String {
    format!(
        "Message received from {}: {}",
        incoming.message.sender, incoming.message.text
    )
}

fn print_prompt() {
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "{PROMPT}");
    let _ = out.flush();
}
