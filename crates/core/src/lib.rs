//! Domain core for the MSP AXS visitor access backend.
//!
//! Holds the visit lifecycle state machine, credential generation, the
//! evidence ledger and the role gate. Persistence and blob storage are
//! reached only through the [`store::VisitStore`] and
//! [`storage::BlobStore`] traits so this crate stays free of database code.

pub mod config;
pub mod credential;
pub mod domain;
pub mod error;
pub mod evidence;
pub mod hashing;
pub mod roles;
pub mod storage;
pub mod store;
pub mod types;
pub mod usuarios;
pub mod visits;
