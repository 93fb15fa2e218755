//! Bí Cảnh Core Library
//!
//! Members, the score ledger, the meeting lifecycle, join-request admission,
//! hoster selection and their SQLite storage.

pub mod admission;
pub mod eligibility;
pub mod error;
pub mod invariants;
pub mod ledger;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod registry;
pub mod selector;
pub mod storage;

pub use admission::JoinAdmission;
pub use eligibility::*;
pub use error::{Error, ErrorKind, Result};
pub use ledger::ScoreLedger;
pub use lifecycle::{Confirmation, MeetingLifecycle};
pub use models::*;
pub use notify::{NoopNotifier, Notifier};
pub use registry::MemberRegistry;
pub use selector::{weighted_pick, HosterSelection, HosterSelector, RandomSource};
pub use storage::{
    Database, JoinRequestRepository, MeetingFilter, MeetingRepository, MemberRepository,
    ScoreRepository, Storage,
};
