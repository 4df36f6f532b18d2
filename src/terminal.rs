//! Terminal input: stdin lines plus Ctrl-C.
//!
//! Stdin is read on a dedicated thread and forwarded over a channel so that
//! reading a line can be raced against the Ctrl-C signal.

use std::io::BufRead;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::shell::{Input, InputSource};

pub struct TerminalInput {
    lines: mpsc::UnboundedReceiver<String>,
}

impl TerminalInput {
    /// Start the stdin reader thread.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to read stdin");
                        break;
                    }
                }
            }
        });
        Self { lines: rx }
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Ctrl-C handler unavailable");
        std::future::pending::<()>().await
    }
}

#[async_trait]
impl InputSource for TerminalInput {
    async fn next(&mut self) -> Input {
        tokio::select! {
            line = self.lines.recv() => match line {
                Some(line) => Input::Line(line),
                None => Input::Eof,
            },
            _ = ctrl_c() => {
                println!();
                Input::Interrupt
            }
        }
    }

    async fn interrupted(&mut self) {
        ctrl_c().await
    }
}
