//! Service layer: orchestrates repositories, the gateway, and the QR
//! signer on behalf of the HTTP handlers. All business failures surface
//! as `CoreError` so the HTTP layer maps them uniformly.

pub mod deferred;
pub mod payment;
pub mod settlement;
pub mod voucher;
pub mod wallet;

/// Bounded retry budget for SQLITE_BUSY losses before a commit is
/// surfaced as `TransientConflict`.
pub(crate) const MAX_BUSY_RETRIES: u32 = 3;
