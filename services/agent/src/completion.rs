//! Bookkeeping after a transmission attempt.
//!
//! A 2xx response advances the dedup store and clears the readiness marker.
//! Anything else leaves both untouched, so the next tick sees the same
//! fingerprint mismatch and sends the same file again.

use crate::dedup_store::{DedupStore, StoreError};
use crate::fingerprint::Fingerprint;
use crate::signal_gate::SignalGate;
use crate::transmitter::TransmissionResult;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to remove readiness marker {path}: {source}")]
    ClearMarker {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// What the completion step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Fingerprint stored and marker removed
    Committed { status: u16 },
    /// Remote rejected the upload; state and marker kept for retry
    Retained {
        status: u16,
        failure: Option<String>,
    },
}

pub struct CompletionHandler {
    store: DedupStore,
    gate: SignalGate,
}

impl CompletionHandler {
    pub fn new(store: DedupStore, gate: SignalGate) -> Self {
        Self { store, gate }
    }

    pub fn store(&self) -> &DedupStore {
        &self.store
    }

    pub fn gate(&self) -> &SignalGate {
        &self.gate
    }

    #[instrument(skip(self, result), fields(status = result.status))]
    pub fn complete(
        &self,
        result: &TransmissionResult,
        fingerprint: &Fingerprint,
    ) -> Result<Completion, CompletionError> {
        if !result.is_success() {
            warn!(
                status = result.status,
                failure = result.failure.as_deref().unwrap_or(""),
                "Upload rejected, keeping readiness marker"
            );
            return Ok(Completion::Retained {
                status: result.status,
                failure: result.failure.clone(),
            });
        }

        // Fingerprint must be persisted before the marker goes away
        self.store.write(fingerprint)?;

        self.gate
            .clear()
            .map_err(|source| CompletionError::ClearMarker {
                path: self.gate.marker().display().to_string(),
                source,
            })?;

        info!(
            status = result.status,
            fingerprint = %fingerprint,
            "Upload accepted, readiness marker removed"
        );

        Ok(Completion::Committed {
            status: result.status,
        })
    }
}
