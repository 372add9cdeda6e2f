//! PTY (console) channel. Reads lines from stdin, hands them to the
//! dispatcher, prints the reply to stdout.
//!
//! The console is one direct conversation with the local user, so every
//! line is answered. Runs until the `shutdown` token is cancelled (Ctrl-C)
//! or stdin is closed.

use std::io::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::conversation::Dispatcher;
use crate::error::AppError;
use super::{IncomingMessage, TypingIndicator, handle_incoming};

/// Conversation id used for every console line.
pub const CONSOLE_CONVERSATION: &str = "console";

/// Console stand-in for a typing indicator.
struct ConsoleTyping;

impl TypingIndicator for ConsoleTyping {
    fn set_typing(&self, conversation_id: &str, typing: bool) {
        if typing {
            print!("…");
            let _ = std::io::stdout().flush();
        } else {
            print!("\r");
        }
        debug!(conversation_id, typing, "typing indicator");
    }
}

pub struct PtyChannel {
    bot_name: String,
    sender_name: String,
    dispatcher: Arc<Dispatcher>,
}

impl PtyChannel {
    pub fn new(bot_name: impl Into<String>, dispatcher: Arc<Dispatcher>) -> Self {
        let sender_name = std::env::var("USER").unwrap_or_else(|_| "you".to_string());
        Self { bot_name: bot_name.into(), sender_name, dispatcher }
    }

    fn message(&self, text: String) -> IncomingMessage {
        IncomingMessage {
            conversation_id: CONSOLE_CONVERSATION.to_string(),
            is_direct: true,
            was_addressed: false,
            text,
            sender_name: self.sender_name.clone(),
            sender_id: self.sender_name.clone(),
        }
    }

    pub async fn run(self, shutdown: CancellationToken) -> Result<(), AppError> {
        info!(bot_name = %self.bot_name, "pty channel started");
        println!("─────────────────────────────────");
        println!(" {}  (Ctrl-C to quit)", self.bot_name);
        println!("─────────────────────────────────");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            print!("> ");
            let _ = std::io::stdout().flush();

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    println!();
                    info!("pty channel shutting down");
                    break;
                }

                line = lines.next_line() => {
                    let input = match line {
                        Err(e) => {
                            return Err(AppError::Comms(format!("stdin read error: {e}")));
                        }
                        Ok(None) => {
                            info!("pty stdin closed");
                            break;
                        }
                        Ok(Some(input)) => input,
                    };
                    if input.trim().is_empty() {
                        continue;
                    }

                    let msg = self.message(input);
                    match handle_incoming(&self.dispatcher, &ConsoleTyping, &msg, &self.bot_name).await {
                        Some(reply) => println!("{reply}"),
                        None => warn!("console message produced no reply"),
                    }
                }
            }
        }

        Ok(())
    }
}
