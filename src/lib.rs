//! SoloCheck engine: the detection-and-dispatch core for an overdue
//! check-in alerting system. See `DESIGN.md` for the component map; this
//! file only wires up the module tree.

pub mod adapters;
pub mod clock;
pub mod config;
pub mod consent;
pub mod db;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod queue;
pub mod reminder;
pub mod render;
pub mod scanner;
pub mod sos;
pub mod worker;
