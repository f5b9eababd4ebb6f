use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::types::PaperState;

/// File-backed store for the paper trader's state. The whole state is
/// small, so every save rewrites the file; a temp-file rename keeps
/// the write atomic.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the persisted state, falling back to a fresh state with
    /// the given balance when the file is missing or unreadable.
    pub fn load_or_default(&self, default_balance: Decimal) -> PaperState {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<PaperState>(&raw) {
                Ok(state) => {
                    info!(
                        "Loaded paper state: balance ${}, {} open position(s)",
                        state.balance,
                        state.positions.len()
                    );
                    state
                }
                Err(e) => {
                    warn!(
                        "State file {} is unreadable ({}), starting fresh",
                        self.path.display(),
                        e
                    );
                    PaperState::new(default_balance)
                }
            },
            Err(_) => {
                info!(
                    "No state file at {}, starting with ${}",
                    self.path.display(),
                    default_balance
                );
                PaperState::new(default_balance)
            }
        }
    }

    /// Persist the full state. Failures are reported to the caller,
    /// who downgrades them to warnings and keeps running in-memory.
    pub fn save(&self, state: &PaperState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}
