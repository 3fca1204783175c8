//! Engine-owned domain types. Dynamic-typed rows and duck-typed dicts in the
//! source system become explicit record types with enumerated variant fields
//! here (spec §9) so the invariants in `spec.md` §3 are provable by exhaustive
//! match rather than by convention.

pub mod contact;
pub mod delivery_log;
pub mod episode;
pub mod job;
pub mod sos;
pub mod user;

pub use contact::*;
pub use delivery_log::*;
pub use episode::*;
pub use job::*;
pub use sos::*;
pub use user::*;
