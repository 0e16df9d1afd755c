//! `nexus-kernel`: contracts for the Nexus gateway dispatch core.
//!
//! The kernel holds *types and traits only*: the request/response model, the
//! filter contract, the discovery and rule-store collaborator interfaces, and
//! the configuration types with their structural validation.  Concrete
//! implementations live in `nexus-gateway`.

// gateway contracts
pub mod gateway;

// multi-format configuration loader
#[cfg(feature = "config")]
pub mod config;
