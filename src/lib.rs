//! cost-audit library crate
//!
//! The fixed-cost simulation pipeline: an editable store of cost records, the
//! two oracle-backed phases (data audit, then strategic analysis) and the
//! confirmation gate between them. The `cost-audit` binary is one front end;
//! anything else that can drive a [`session::ModuleSession`] is another.

pub mod analysis;
pub mod business;
pub mod config;
pub mod logging;
pub mod records;
pub mod session;
pub mod util;
