//! Domain model (IDs, entries, pending views, outcomes, results).

pub mod entry;
pub mod ids;
pub mod index_key;
pub mod outcome;
pub mod pending;
pub mod result;

pub use entry::{Fields, StreamEntry};
pub use ids::{EntryId, ParseEntryIdError, PassId};
pub use index_key::IndexKeyPolicy;
pub use outcome::{OutcomeStatus, ReprocessOutcome};
pub use pending::{ClaimBatch, IdRange, PendingRecord, PendingSummary};
pub use result::ProcessResult;
