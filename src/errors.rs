//! Error taxonomy at the algorithm-entry boundary.
//!
//! Only true service unavailability propagates as an error; everything
//! recoverable (missing single hit, unreachable surface, sparse chamber)
//! degrades to an empty or reduced result and a log line.

use crate::ids::ChamberId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecoveryError {
    /// The geometry description knows nothing about a chamber the track
    /// claims to cross. Fatal for this event's processing.
    #[error("no geometry for chamber {0:?}")]
    MissingChamberGeometry(ChamberId),

    /// A configured PRD container is absent from the event store.
    #[error("prep-raw-data container for {0:?} is not present")]
    MissingPrdContainer(ChamberId),

    /// The input track carries no states to recover.
    #[error("track has no states")]
    EmptyTrack,
}
