//! Recipe request allocation
//!
//! Turns one [`Request`] into an ordered list of (signal, noise, microphone)
//! pairs. Each requested microphone is an independent lane; lanes are
//! visited round-robin so a request spreads evenly across microphones
//! instead of draining one lane first. Signals handed to an exclusive
//! request are marked consumed in the catalog and never handed out again.

use crate::catalog::{Catalog, EntryId};
use crate::error::{MixError, MixResult};
use crate::types::{MicIndex, Request};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// What to do when a request asks for more recordings than are available
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShortagePolicy {
    /// Fail the run
    #[default]
    Abort,
    /// Reduce the quantity to what is available and keep going
    Cap,
}

/// A signal recording paired with a noise recording from the same microphone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationPair {
    pub signal: EntryId,
    pub noise: EntryId,
    pub mic: MicIndex,
}

/// Result of allocating one request
#[derive(Debug, Clone)]
pub struct Allocation {
    /// Pairs in render order
    pub pairs: Vec<AllocationPair>,
    /// Baseline RMS of the request's signal class
    pub signal_rms: f64,
}

/// Candidate recordings of one microphone
struct Lane {
    mic: MicIndex,
    signals: VecDeque<EntryId>,
    noises: Vec<EntryId>,
}

/// Owns the catalog and hands out its recordings
#[derive(Debug)]
pub struct Allocator {
    catalog: Catalog,
    policy: ShortagePolicy,
}

impl Allocator {
    pub fn new(catalog: Catalog, policy: ShortagePolicy) -> Self {
        Self { catalog, policy }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Select the recordings for one request.
    ///
    /// Feasibility is checked before anything is marked, so a failing request
    /// leaves the catalog untouched.
    pub fn allocate<R: Rng + ?Sized>(
        &mut self,
        request: &Request,
        rng: &mut R,
    ) -> MixResult<Allocation> {
        let class = request
            .source_class()
            .ok_or_else(|| MixError::Catalog(format!("empty source id for {}", request.destination_pattern)))?;
        let signal_rms = self
            .catalog
            .class_baseline(class)
            .ok_or(MixError::MissingBaseline { class })?;

        let replaceable = request.quantity.is_replaceable();
        if replaceable {
            log::warn!("**WARNING** SAMPLE REPLACEABLE {}", request.source_id);
        }

        let mut lanes = self.build_lanes(request, replaceable);
        let sizes: Vec<(MicIndex, usize)> = lanes.iter().map(|l| (l.mic, l.signals.len())).collect();
        let noise_sizes: Vec<(MicIndex, usize)> = lanes.iter().map(|l| (l.mic, l.noises.len())).collect();
        log::info!(
            "Processing {} {} {} with samples: {:?}",
            request.destination_pattern,
            request.source_folder,
            request.source_id,
            sizes
        );
        log::info!(" with noise samples: {:?}", noise_sizes);

        let available: usize = sizes.iter().map(|(_, n)| n).sum();
        let mut quantity = request.quantity;
        if available < quantity.count() {
            match self.policy {
                ShortagePolicy::Abort => {
                    return Err(MixError::InsufficientSamples {
                        pattern: request.destination_pattern.clone(),
                        source_id: request.source_id.clone(),
                        available,
                        requested: quantity.count(),
                    });
                }
                ShortagePolicy::Cap => {
                    log::warn!(
                        "!!!!!!! SKIPPING total_available < qty ({} < {}) for {}",
                        available,
                        quantity,
                        request.destination_pattern
                    );
                    quantity = quantity.with_count(available);
                }
            }
        }

        let silent_mics: Vec<MicIndex> = lanes.iter().filter(|l| l.noises.is_empty()).map(|l| l.mic).collect();
        if !silent_mics.is_empty() {
            return Err(MixError::NoNoiseAvailable {
                pattern: request.destination_pattern.clone(),
                noise_key: format!("{}_N{}", request.machine(), request.noise_class),
                mics: silent_mics,
            });
        }

        let quantity = quantity.count();
        let mut pairs = Vec::with_capacity(quantity);
        while pairs.len() < quantity {
            for lane in lanes.iter_mut() {
                if pairs.len() == quantity {
                    break;
                }
                let Some(signal) = lane.signals.pop_front() else {
                    log::debug!("SHORT OF: {} mic {}", request.source_id, lane.mic);
                    continue;
                };
                if !replaceable {
                    self.catalog.mark_consumed(signal);
                }
                // Lanes without noise were rejected above
                let noise = *lane.noises.choose(rng).ok_or_else(|| MixError::NoNoiseAvailable {
                    pattern: request.destination_pattern.clone(),
                    noise_key: request.noise_key(lane.mic),
                    mics: vec![lane.mic],
                })?;
                pairs.push(AllocationPair {
                    signal,
                    noise,
                    mic: lane.mic,
                });
            }
        }

        Ok(Allocation { pairs, signal_rms })
    }

    fn build_lanes(&self, request: &Request, replaceable: bool) -> Vec<Lane> {
        request
            .microphones
            .iter()
            .map(|&mic| {
                let signal_key = request.signal_key(mic);
                let noise_key = request.noise_key(mic);
                let signals = self
                    .catalog
                    .matching(&signal_key)
                    .filter(|&id| replaceable || !self.catalog.get(id).is_consumed())
                    .collect();
                let noises = self.catalog.matching(&noise_key).collect();
                Lane { mic, signals, noises }
            })
            .collect()
    }
}
