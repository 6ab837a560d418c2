// [libs/infra/source-client/src/lib.rs]
//! Source clients: a uniform contract for polling PVE and PBS hosts,
//! plus synthetic clients for `PULSE_MOCK_MODE`.

pub mod client;
pub mod errors;
pub mod mock;
pub mod pbs;
pub mod pve;
pub mod rate_limit;
pub mod retry;
pub mod transport;

pub use client::{Snapshot, SourceClient};
pub use errors::SourceClientError;
pub use mock::{MockPbsClient, MockPveClient};
pub use pbs::{PbsClient, PbsSnapshot};
pub use pve::{PveClient, PveSnapshot};
pub use transport::SharedTransport;
