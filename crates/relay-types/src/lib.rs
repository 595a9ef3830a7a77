//! Wire types for the relay node HTTP API.
//! No transport or runtime dependency, so clients can use them too.

mod envelope;
mod request;
mod response;

pub use envelope::ErrorEnvelope;
pub use request::{AuditRelaysRequest, RelayTransactionRequest, SetHubRequest};
pub use response::{GetAddrResponse, SignedRelayTransaction};
