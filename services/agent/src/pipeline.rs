//! One tick of the sync pipeline:
//! signal check, file selection, fingerprinting, duplicate suppression,
//! transmission and completion bookkeeping.

use crate::completion::{Completion, CompletionError, CompletionHandler};
use crate::config::Config;
use crate::dedup_store::{DedupStore, StoreError};
use crate::file_selector::{FileSelector, SelectError};
use crate::fingerprint::{fingerprint_file, Fingerprint, FingerprintError};
use crate::fs::Filesystem;
use crate::signal_gate::SignalGate;
use crate::transmitter::{TransmitError, Transmitter};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Errors that abort the current tick
#[derive(Error, Debug)]
pub enum TickError {
    #[error(transparent)]
    Select(#[from] SelectError),

    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to send {file}: {source}")]
    Transmit {
        file: String,
        #[source]
        source: TransmitError,
    },

    #[error(transparent)]
    Completion(#[from] CompletionError),
}

/// How a tick ended when nothing went wrong
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No readiness marker
    SignalAbsent,
    /// Marker present, but no qualifying file
    NoCandidateFile,
    /// Candidate content matches the last sent fingerprint
    DuplicateContent {
        file: String,
        fingerprint: Fingerprint,
    },
    /// Upload accepted and recorded
    Sent {
        file: String,
        fingerprint: Fingerprint,
        status: u16,
    },
    /// Upload answered with a non-2xx status
    Rejected {
        file: String,
        status: u16,
        failure: Option<String>,
    },
}

/// The tick pipeline with all of its collaborators
pub struct SyncAgent {
    fs: Arc<dyn Filesystem>,
    selector: FileSelector,
    completion: CompletionHandler,
    transmitter: Arc<dyn Transmitter>,
}

impl SyncAgent {
    pub fn new(
        fs: Arc<dyn Filesystem>,
        selector: FileSelector,
        completion: CompletionHandler,
        transmitter: Arc<dyn Transmitter>,
    ) -> Self {
        Self {
            fs,
            selector,
            completion,
            transmitter,
        }
    }

    /// Wire every component from the loaded configuration
    pub fn from_config(
        config: &Config,
        fs: Arc<dyn Filesystem>,
        transmitter: Arc<dyn Transmitter>,
    ) -> Self {
        let selector = FileSelector::from_config(fs.clone(), &config.watch);
        let completion = CompletionHandler::new(
            DedupStore::new(fs.clone(), config.state.path.clone()),
            SignalGate::new(fs.clone(), config.marker_path()),
        );

        Self::new(fs, selector, completion, transmitter)
    }

    /// Run the pipeline once
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<TickOutcome, TickError> {
        let gate = self.completion.gate();
        if !gate.is_ready() {
            debug!(marker = %gate.marker().display(), "No readiness marker, waiting");
            return Ok(TickOutcome::SignalAbsent);
        }

        info!("Readiness marker detected, looking for candidate file");

        let Some(file) = self.selector.select()? else {
            warn!("Readiness marker present but no valid candidate file found");
            return Ok(TickOutcome::NoCandidateFile);
        };

        let content = fingerprint_file(self.fs.as_ref(), &file.path)?;
        let last_sent = self.completion.store().read()?;

        info!(
            file = %file.name,
            size_bytes = file.size_bytes,
            modified = %file.modified_utc().to_rfc3339(),
            fingerprint = %content.fingerprint,
            "Candidate file fingerprinted"
        );

        // The marker is intentionally left in place on this path
        if last_sent.as_ref() == Some(&content.fingerprint) {
            info!(file = %file.name, "Content already sent, not resending");
            metrics::counter!("agent.files.duplicate").increment(1);
            return Ok(TickOutcome::DuplicateContent {
                file: file.name,
                fingerprint: content.fingerprint,
            });
        }

        info!(file = %file.name, "Sending file to endpoint");

        let size_bytes = content.data.len() as u64;
        let started = Instant::now();
        let result = self.transmitter.transmit(content.data).await;
        metrics::histogram!("agent.transmit.duration_seconds")
            .record(started.elapsed().as_secs_f64());

        let result = result.map_err(|source| TickError::Transmit {
            file: file.name.clone(),
            source,
        })?;

        match self.completion.complete(&result, &content.fingerprint)? {
            Completion::Committed { status } => {
                metrics::counter!("agent.files.sent").increment(1);
                metrics::counter!("agent.bytes.sent").increment(size_bytes);
                Ok(TickOutcome::Sent {
                    file: file.name,
                    fingerprint: content.fingerprint,
                    status,
                })
            }
            Completion::Retained { status, failure } => {
                metrics::counter!("agent.files.rejected").increment(1);
                Ok(TickOutcome::Rejected {
                    file: file.name,
                    status,
                    failure,
                })
            }
        }
    }
}
