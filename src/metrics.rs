//! Injected metrics sink replacing the original's histogram side channel.
//!
//! The weighting stage reports every final weight and every discarded hit
//! through this interface. Implementations decide whether to guard shared
//! state with a mutex or to accumulate per thread and merge at end of
//! event; the library itself holds no global state.

use crate::ids::Technology;
use serde::Serialize;
use std::sync::Mutex;

pub trait MetricsSink: Sync {
    /// Called once per hit with its final weight.
    fn record_weight(&self, tech: Technology, weight: f64);

    /// Called for hits rejected by the hard ADC/TDC cuts.
    fn record_discarded(&self, _tech: Technology) {}
}

/// Sink that drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullMetrics;

impl MetricsSink for NullMetrics {
    fn record_weight(&self, _tech: Technology, _weight: f64) {}
}

/// Fixed-bin weight histogram over `[0, 1]`, one per technology plus a
/// combined one, guarded by a mutex.
#[derive(Debug)]
pub struct WeightHistogram {
    inner: Mutex<HistogramData>,
    bins: usize,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct HistogramData {
    pub all: Vec<u64>,
    pub mdt: Vec<u64>,
    pub rpc: Vec<u64>,
    pub tgc: Vec<u64>,
    pub csc: Vec<u64>,
    pub stgc: Vec<u64>,
    pub mm: Vec<u64>,
    pub discarded: u64,
}

impl WeightHistogram {
    pub fn new(bins: usize) -> Self {
        let bins = bins.max(1);
        let data = HistogramData {
            all: vec![0; bins],
            mdt: vec![0; bins],
            rpc: vec![0; bins],
            tgc: vec![0; bins],
            csc: vec![0; bins],
            stgc: vec![0; bins],
            mm: vec![0; bins],
            discarded: 0,
        };
        Self {
            inner: Mutex::new(data),
            bins,
        }
    }

    fn bin(&self, weight: f64) -> usize {
        let clamped = weight.clamp(0.0, 1.0);
        ((clamped * self.bins as f64) as usize).min(self.bins - 1)
    }

    /// Snapshot of the accumulated counts.
    pub fn snapshot(&self) -> HistogramData {
        self.inner
            .lock()
            .map(|d| d.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl MetricsSink for WeightHistogram {
    fn record_weight(&self, tech: Technology, weight: f64) {
        let bin = self.bin(weight);
        let Ok(mut data) = self.inner.lock() else {
            return;
        };
        data.all[bin] += 1;
        let per_tech = match tech {
            Technology::Mdt => &mut data.mdt,
            Technology::Rpc => &mut data.rpc,
            Technology::Tgc => &mut data.tgc,
            Technology::Csc => &mut data.csc,
            Technology::Stgc => &mut data.stgc,
            Technology::Mm => &mut data.mm,
        };
        per_tech[bin] += 1;
    }

    fn record_discarded(&self, _tech: Technology) {
        if let Ok(mut data) = self.inner.lock() {
            data.discarded += 1;
        }
    }
}
