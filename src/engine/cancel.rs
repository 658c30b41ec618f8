//! Cooperative cancellation for a batch.
//!
//! The coordinator checks the flag between jobs only; an encode already in
//! flight always runs to its own terminal state.

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

pub trait CancellationSource: Send + Sync {
    fn request_cancel(&self);
    fn is_cancel_requested(&self) -> bool;
}

/// Shared, clonable cancel flag
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CancellationSource for CancelFlag {
    fn request_cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn is_cancel_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Terminal listener that requests cancellation on `q` (or Ctrl+C, which raw
/// mode delivers as a key instead of a signal). Raw mode lasts as long as the
/// listener; dropping it restores the terminal.
pub struct KeyCancelListener {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

const POLL_INTERVAL: Duration = Duration::from_millis(100);

impl KeyCancelListener {
    pub fn spawn(target: Arc<dyn CancellationSource>) -> Result<Self> {
        enable_raw_mode().context("Failed to enable raw terminal mode")?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let spawned = thread::Builder::new()
            .name("cancel-keys".to_string())
            .spawn(move || {
                while !thread_stop.load(Ordering::SeqCst) {
                    if !event::poll(POLL_INTERVAL).unwrap_or(false) {
                        continue;
                    }
                    if let Ok(Event::Key(key)) = event::read() {
                        if key.kind == KeyEventKind::Press && is_cancel_key(key.code, key.modifiers)
                        {
                            if !target.is_cancel_requested() {
                                debug!(code = ?key.code, "cancel key pressed");
                            }
                            target.request_cancel();
                        }
                    }
                }
            });

        match spawned {
            Ok(handle) => Ok(Self {
                stop,
                handle: Some(handle),
            }),
            Err(e) => {
                let _ = disable_raw_mode();
                Err(e).context("Failed to spawn key listener")
            }
        }
    }
}

fn is_cancel_key(code: KeyCode, modifiers: KeyModifiers) -> bool {
    matches!(code, KeyCode::Char('q') | KeyCode::Char('Q'))
        || (code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL))
}

impl Drop for KeyCancelListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        if let Err(e) = disable_raw_mode() {
            debug!(error = %e, "failed to restore terminal mode");
        }
    }
}
