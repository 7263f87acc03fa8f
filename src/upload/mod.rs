//! Upload coordination: size ceiling, quota gate, transfer, and the
//! synthesized progress signal.

pub(crate) mod coordinator;
mod quota;
mod storage;

pub use coordinator::{DestinationKey, JobStatus, UploadCoordinator, UploadJob};
pub use quota::{HttpQuotaService, QuotaDecision, QuotaService};
pub use storage::{HttpStorageBackend, StorageBackend};
