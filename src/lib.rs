#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod finder;
pub mod hit;
pub mod pattern;
pub mod prd;
pub mod track;

// Expert modules – still public, but considered unstable internals.
pub mod errors;
pub mod geom;
pub mod geometry;
pub mod ids;
pub mod metrics;
pub mod recovery;
pub mod seeded;
pub mod segment;
pub mod weighting;

// --- High-level re-exports -------------------------------------------------

// Main entry points: the event-level finder and its output.
pub use crate::finder::{FinderConfig, FinderOutput, MuonPatternFinder};
pub use crate::pattern::{BinnedHoughEngine, HoughParams, Maximum, PatternEngine, PatternOutput};

// The downstream stages.
pub use crate::recovery::{ChamberHoleRecovery, RecoveryParams};
pub use crate::seeded::{MuonSegment, SeededFinderParams, SeededSegmentFinder, TrackRoad};
pub use crate::segment::{fast_segment_finder, DriftCircle, SegmentFinderParams, SegmentSelection};
pub use crate::weighting::{LayerWeighting, WeightingParams};

// Cross-cutting pieces callers routinely need.
pub use crate::errors::RecoveryError;
pub use crate::metrics::{MetricsSink, NullMetrics, WeightHistogram};

// --- Prelude ---------------------------------------------------------------

/// Small prelude for quick experiments.
///
/// ```no_run
/// use muon_hough::prelude::*;
///
/// let engine = BinnedHoughEngine::default();
/// let finder = MuonPatternFinder::new(FinderConfig::default(), &engine, &NullMetrics);
/// let out = finder.find(&[], &[]);
/// println!("eta maxima: {}", out.patterns.eta.len());
/// ```
pub mod prelude {
    pub use crate::hit::{EtaPhiAssoc, HoughHit, HoughHitContainer};
    pub use crate::ids::{ChamberId, ChannelId, StationKey, Technology};
    pub use crate::{
        fast_segment_finder, BinnedHoughEngine, ChamberHoleRecovery, FinderConfig, FinderOutput,
        MuonPatternFinder, MuonSegment, NullMetrics, PatternEngine, RecoveryParams,
        SeededSegmentFinder, SegmentFinderParams, WeightingParams,
    };
}
