use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// States in the Election lifecycle. Transitions are driven by the administration
/// system; this service only reads them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionStatus {
    /// Under construction, only visible to admins.
    Draft,
    /// Published but not yet accepting votes.
    Scheduled,
    /// Accepting votes between its start and end times.
    Active,
    /// Finished; no further votes.
    Completed,
    /// Abandoned; no further votes.
    Cancelled,
}

impl From<ElectionStatus> for Bson {
    fn from(status: ElectionStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}

/// Nomination review outcome for a candidate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl From<ApprovalStatus> for Bson {
    fn from(status: ApprovalStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}
