//! `mora-recon` — arrears vs payment-ledger reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded tables, returns reconciled members,
//! aggregate tables and diagnostics. No CLI or file IO.

pub mod aggregate;
pub mod aging;
pub mod classify;
pub mod config;
pub mod eligibility;
pub mod engine;
pub mod error;
pub mod identity;
pub mod installment;
pub mod model;
pub mod money;
pub mod table;
pub mod temporal;

pub use aggregate::{FilteredView, MemberFilter};
pub use config::ReconConfig;
pub use engine::run;
pub use error::ReconError;
pub use model::{ReconInput, ReconResult};
pub use table::Table;
