//! Per-issuer verifier cache with single-flight construction.
//!
//! Each issuer slot is either `Ready` with a built verifier or `Building`
//! with a watch channel that will carry the outcome of the one build in
//! flight. Builds run in their own task, so a caller that gives up waiting
//! does not cancel the build for everybody else. A build either publishes a
//! `Ready` slot or removes its own `Building` slot; failures are handed to the
//! callers that were waiting and then forgotten, so the next request retries.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::auth::error::DecoderBuildError;
use crate::auth::verifier::{TokenVerifier, VerifierFactory};
use crate::types::IssuerUrl;

/// Default upper bound on a single verifier build, in seconds.
pub const DEFAULT_BUILD_TIMEOUT_SECONDS: u64 = 10;

type BuildResult = Result<Arc<dyn TokenVerifier>, DecoderBuildError>;

enum Slot {
    Ready(Arc<dyn TokenVerifier>),
    Building {
        generation: u64,
        outcome: watch::Receiver<Option<BuildResult>>,
    },
}

/// Observable state of a cached issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderState {
    Ready,
    Building,
}

/// Cache of verifiers keyed by issuer URL.
pub struct DecoderCache {
    slots: Arc<DashMap<IssuerUrl, Slot>>,
    factory: Arc<dyn VerifierFactory>,
    build_timeout: Duration,
    next_generation: AtomicU64,
}

impl DecoderCache {
    /// Create an empty cache that builds verifiers with `factory`.
    pub fn new(factory: Arc<dyn VerifierFactory>, build_timeout: Duration) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            factory,
            build_timeout,
            next_generation: AtomicU64::new(0),
        }
    }

    /// Return the verifier for `issuer`, building it on first use.
    ///
    /// Concurrent callers for an issuer that is not cached yet share a
    /// single build and all observe its outcome.
    pub async fn get_or_build(
        &self,
        issuer: &IssuerUrl,
    ) -> Result<Arc<dyn TokenVerifier>, DecoderBuildError> {
        if let Some(slot) = self.slots.get(issuer)
            && let Slot::Ready(verifier) = slot.value()
        {
            return Ok(verifier.clone());
        }

        let mut outcome = match self.slots.entry(issuer.clone()) {
            Entry::Occupied(entry) => match entry.get() {
                Slot::Ready(verifier) => return Ok(verifier.clone()),
                Slot::Building { outcome, .. } => {
                    debug!(issuer = %issuer, "Joining in-flight verifier build");
                    outcome.clone()
                }
            },
            Entry::Vacant(entry) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let (sender, receiver) = watch::channel(None);
                entry.insert(Slot::Building {
                    generation,
                    outcome: receiver.clone(),
                });
                // The shard stays locked until `entry` drops, so the task
                // cannot publish before the Building slot is visible.
                self.spawn_build(issuer.clone(), generation, sender);
                receiver
            }
        };

        let published = outcome.wait_for(Option::is_some).await.map_err(|_| {
            DecoderBuildError::Aborted("build task ended without a result".to_string())
        })?;

        (*published).clone().unwrap_or_else(|| {
            Err(DecoderBuildError::Aborted(
                "build task ended without a result".to_string(),
            ))
        })
    }

    fn spawn_build(
        &self,
        issuer: IssuerUrl,
        generation: u64,
        sender: watch::Sender<Option<BuildResult>>,
    ) {
        let factory = self.factory.clone();
        let timeout = self.build_timeout;
        let mut guard = BuildGuard {
            slots: self.slots.clone(),
            issuer,
            generation,
            armed: true,
        };

        tokio::spawn(async move {
            let issuer = guard.issuer.clone();
            info!(issuer = %issuer, "Building verifier");

            let result = match tokio::time::timeout(timeout, factory.build(&issuer)).await {
                Ok(result) => result,
                Err(_) => Err(DecoderBuildError::Timeout(timeout)),
            };

            match &result {
                Ok(verifier) => {
                    guard.publish(verifier.clone());
                    info!(issuer = %issuer, "Verifier ready");
                }
                Err(e) => {
                    guard.release();
                    error!(issuer = %issuer, error = %e, "Verifier build failed");
                }
            }

            sender.send_replace(Some(result));
        });
    }

    /// Drop a ready verifier so the next request rebuilds it.
    ///
    /// Returns `false` when the issuer has no ready verifier. A build in
    /// flight is left alone.
    pub fn invalidate(&self, issuer: &IssuerUrl) -> bool {
        let removed = self
            .slots
            .remove_if(issuer, |_, slot| matches!(slot, Slot::Ready(_)))
            .is_some();
        if removed {
            info!(issuer = %issuer, "Evicted cached verifier");
        }
        removed
    }

    /// Snapshot of every issuer the cache knows about.
    pub fn cached_issuers(&self) -> BTreeMap<IssuerUrl, DecoderState> {
        self.slots
            .iter()
            .map(|entry| {
                let state = match entry.value() {
                    Slot::Ready(_) => DecoderState::Ready,
                    Slot::Building { .. } => DecoderState::Building,
                };
                (entry.key().clone(), state)
            })
            .collect()
    }

    /// Number of ready verifiers.
    pub fn ready_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| matches!(entry.value(), Slot::Ready(_)))
            .count()
    }
}

/// Removes a build's own `Building` slot unless the build published a
/// verifier, including when the build task panics or is torn down.
struct BuildGuard {
    slots: Arc<DashMap<IssuerUrl, Slot>>,
    issuer: IssuerUrl,
    generation: u64,
    armed: bool,
}

impl BuildGuard {
    /// Replace the `Building` slot with the finished verifier and disarm.
    fn publish(&mut self, verifier: Arc<dyn TokenVerifier>) {
        self.slots
            .insert(self.issuer.clone(), Slot::Ready(verifier));
        self.armed = false;
    }

    fn release(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        let generation = self.generation;
        self.slots.remove_if(&self.issuer, |_, slot| {
            matches!(slot, Slot::Building { generation: g, .. } if *g == generation)
        });
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        self.release();
    }
}
