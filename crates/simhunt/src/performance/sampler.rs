//! Resource sampling seam.
//!
//! The engine never reads memory, CPU, or frame-rate counters itself. It asks
//! a [`MetricsSampler`] for one [`ResourceSample`] at a time, so a real
//! instrumentation backend can be dropped in without touching the playbook.

use crate::result::SimhuntResult;
use crate::rng::SeededRng;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// One point-in-time reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    /// Resident memory in megabytes
    pub memory_mb: f64,
    /// CPU utilisation in percent
    pub cpu_percent: f64,
    /// Frames per second
    pub fps: f64,
}

/// Source of resource readings for a running app
#[async_trait]
pub trait MetricsSampler: Send + Sync {
    /// Take one reading
    async fn sample(&self, udid: &str, bundle_id: &str) -> SimhuntResult<ResourceSample>;

    /// Short name shown in reports
    fn name(&self) -> &'static str;
}

/// Seeded pseudo-random readings.
///
/// This is a simulation-only stand-in: values are drawn from plausible
/// ranges and say nothing about the app under test. Reports mark results
/// produced with it so nobody mistakes them for real measurements.
#[derive(Debug)]
pub struct SimulatedSampler {
    rng: Mutex<SeededRng>,
    base_memory_mb: f64,
}

impl SimulatedSampler {
    /// Create a sampler; readings repeat for the same seed
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: Mutex::new(SeededRng::new(seed)),
            base_memory_mb: 120.0,
        }
    }

    /// Centre the memory readings around `mb`
    #[must_use]
    pub const fn with_base_memory(mut self, mb: f64) -> Self {
        self.base_memory_mb = mb;
        self
    }
}

#[async_trait]
impl MetricsSampler for SimulatedSampler {
    async fn sample(&self, _udid: &str, _bundle_id: &str) -> SimhuntResult<ResourceSample> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(ResourceSample {
            memory_mb: self.base_memory_mb + rng.random() * 40.0,
            cpu_percent: 5.0 + rng.random() * 45.0,
            fps: 52.0 + rng.random() * 8.0,
        })
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
