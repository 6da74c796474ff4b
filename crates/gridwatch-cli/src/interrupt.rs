//! Ctrl-C routing
//!
//! One signal listener lives for the whole process. While a turn runs, Ctrl-C
//! cancels it; at the prompt, Ctrl-C exits.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

/// Exit status for a process stopped by SIGINT
const SIGINT_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    active: Arc<Mutex<Option<CancellationToken>>>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the process-wide listener
    pub fn install(&self) {
        let interrupt = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !interrupt.on_signal() {
                    println!();
                    std::process::exit(SIGINT_EXIT_CODE);
                }
            }
        });
    }

    /// Token for a turn that is about to start
    pub fn begin_turn(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.slot() = Some(token.clone());
        token
    }

    pub fn end_turn(&self) {
        self.slot().take();
    }

    /// Cancel the running turn. Returns false when no turn is running.
    pub fn on_signal(&self) -> bool {
        match self.slot().take() {
            Some(token) => {
                tracing::info!("Ctrl-C: cancelling the running turn");
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}
