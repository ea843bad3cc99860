//! Interactive command console.
//!
//! Reads one command per line from stdin and drives the [`ProxyController`].
//! Lines are parsed with clap, so `help` and per-command `--help` work.

use clap::{Parser, Subcommand};
use std::future::Future;
use tokio::sync::mpsc;

use crate::error::ProxyError;
use crate::lifecycle::{ControlError, ProxyController};

pub const BANNER: &str =
    "Enter \"add <domain> <limit_mb>\" to limit a domain's daily traffic, \"usage\" to see traffic so far, or \"start\"/\"stop\" to start or stop the proxy server.";

#[derive(Parser, Debug, PartialEq, Eq)]
#[command(name = "console", no_binary_name = true, disable_version_flag = true)]
pub struct ConsoleLine {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start the proxy server
    Start,
    /// Stop accepting connections; open connections finish on their own
    Stop,
    /// Limit a domain's daily traffic
    Add {
        /// Domain to track, e.g. facebook.com
        domain: String,
        /// Maximum traffic per day in MB
        limit_mb: u64,
    },
    /// Show traffic per domain, highest first
    Usage,
    /// Stop the proxy and exit
    #[command(alias = "quit")]
    Exit,
}

/// Whether the console keeps reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<Command>, clap::Error> {
    let line = line.trim().to_lowercase();
    if line.is_empty() {
        return Ok(None);
    }
    ConsoleLine::try_parse_from(line.split_whitespace()).map(|parsed| Some(parsed.command))
}

/// Spawn a thread that forwards stdin lines. A plain thread is used so a
/// pending read never holds up runtime shutdown.
pub fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read console input");
                    break;
                }
            }
        }
    });
    rx
}

pub struct Console {
    controller: ProxyController,
}

impl Console {
    pub fn new(controller: ProxyController) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &ProxyController {
        &self.controller
    }

    /// Run one command and return the text to show the user.
    ///
    /// Only a failure to bind the listener is returned as an error.
    pub async fn execute(&mut self, command: Command) -> Result<(String, Flow), ProxyError> {
        let reply = match command {
            Command::Start => match self.controller.start() {
                Ok(addr) => format!("Proxy started, listening at {}.", addr),
                Err(ControlError::Proxy(e)) => return Err(e),
                Err(e) => format!("Error: {}.", e),
            },
            Command::Stop => match self.controller.stop().await {
                Ok(()) => "Proxy stopped.".to_string(),
                Err(e) => format!("Error: {}.", e),
            },
            Command::Add { domain, limit_mb } => {
                let key = self.controller.add(&domain, limit_mb);
                format!(
                    "{} has been added to the list of tracked domains, with a limit of {} MB.",
                    key, limit_mb
                )
            }
            Command::Usage => {
                let usage = self.controller.usage();
                serde_json::to_string_pretty(&usage)
                    .unwrap_or_else(|e| format!("Error: failed to render usage: {}", e))
            }
            Command::Exit => {
                if self.controller.is_running() {
                    let _ = self.controller.stop().await;
                }
                return Ok(("Bye.".to_string(), Flow::Exit));
            }
        };
        Ok((reply, Flow::Continue))
    }

    /// Read commands from `lines` until exit, end of input, or `terminate`.
    /// The proxy is stopped before returning.
    pub async fn run<F>(
        mut self,
        mut lines: mpsc::UnboundedReceiver<String>,
        terminate: F,
    ) -> Result<(), ProxyError>
    where
        F: Future<Output = ()>,
    {
        println!("{}", BANNER);
        tokio::pin!(terminate);

        loop {
            tokio::select! {
                line = lines.recv() => {
                    let Some(line) = line else {
                        tracing::debug!("Console input closed");
                        break;
                    };
                    let command = match parse_line(&line) {
                        Ok(Some(command)) => command,
                        Ok(None) => continue,
                        Err(e) => {
                            println!("{}", e.render());
                            continue;
                        }
                    };
                    let (reply, flow) = self.execute(command).await?;
                    println!("{}", reply);
                    if flow == Flow::Exit {
                        return Ok(());
                    }
                }
                _ = &mut terminate => {
                    tracing::info!("Execution ended by user, shutting down");
                    break;
                }
            }
        }

        if self.controller.is_running() {
            let _ = self.controller.stop().await;
        }
        Ok(())
    }
}
