//! kots-lint Repo - Release version lookups
//!
//! This crate checks that the KOTS and embedded cluster versions a release
//! declares were actually published:
//! - `ReleaseIndex`: HTTP client for the release index
//! - `VersionCache`: process-wide record of versions known to exist

pub mod cache;
pub mod error;
pub mod index;

pub use cache::VersionCache;
pub use error::{RepoError, Result};
pub use index::{DEFAULT_BASE_URL, Product, ReleaseIndex};
