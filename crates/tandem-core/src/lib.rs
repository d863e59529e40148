//! tandem-core: shared types, persistent records, and configuration.
//! All other tandem crates depend on this one.

pub mod addr;
pub mod config;
pub mod profile;
pub mod quality;
pub mod record;

pub use addr::BdAddr;
pub use profile::{CallState, Profile, ProfileSet, ProfileState};
pub use quality::{Quality, QualityChoice};
