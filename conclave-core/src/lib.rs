//! Process-group membership with totally ordered views.
//!
//! `conclave-core` tracks which nodes belong to a process group, stamps
//! every membership change with a totally ordered view, and reconciles
//! divergent views after a network partition heals. Failure detection and
//! the real network transport stay behind traits; this crate owns the
//! view, join, and merge coordination logic.

#![warn(
    missing_docs,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::unimplemented,
    clippy::todo
)]
#![deny(clippy::unwrap_in_result, clippy::panic_in_result_fn)]

/// Node identity and the process-wide logical-name cache.
pub mod address;
/// Declarative configuration shared by embedders and test harnesses.
pub mod config;
/// Per-member delivery bookkeeping spliced across view changes.
pub mod digest;
/// Per-node engine: a single-writer event loop owning the installed view.
pub mod engine;
/// Error types surfaced by the membership engine.
pub mod error;
/// Protocol messages and upward notifications.
pub mod event;
/// Join protocol types and admission policy.
pub mod join;
/// Ordered membership and deterministic merge-leader election.
pub mod membership;
/// Merge round bookkeeping and unified-view computation.
pub mod merge;
/// Transport boundary and the in-process loopback network.
pub mod transport;
/// Views and their totally ordered identifiers.
pub mod view;
/// Canonical wire forms for everything that crosses node boundaries.
pub mod wire;

pub use address::{Address, NameCache};
pub use config::{GroupConfig, MergeConfig};
pub use digest::{Digest, Seqnos, VanishedPolicy};
pub use engine::{EngineHandle, Installed, NodeEngine};
pub use error::GroupError;
pub use event::{GroupEvent, GroupMessage, MergeId};
pub use join::{AcceptAll, JoinPolicy, JoinRsp, NOT_COORDINATOR};
pub use membership::{Membership, elect_merge_leader};
pub use merge::{MergePhase, MergeRound, SubGroupState, views_overlap};
pub use transport::{GroupTransport, LoopbackNetwork, LoopbackTransport};
pub use view::{View, ViewId, ViewKind};
pub use wire::WireError;
