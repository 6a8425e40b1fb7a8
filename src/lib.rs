//! Profile evaluation, repository, and dependency resolution core for a
//! source-based, Portage-style package manager.
//!
//! The crate is organized bottom-up: atom/version algebra and the
//! restriction-tree algebra it builds on, a `ChunkedDataDict` toggle model
//! shared by profiles and package sets, stacked-profile evaluation, the
//! repository layer that binds profiles to on-disk ebuild trees, and
//! finally the resolver that turns a set of target atoms into an ordered
//! install plan.

pub mod atom;
pub mod chunked;
pub mod cpv;
pub mod eapi;
pub mod error;
pub mod oracle;
pub mod pkgset;
pub mod pool;
pub mod profile;
pub mod repo;
pub mod resolver;
pub mod restrict;
pub mod updates;
pub mod vdb;
pub mod version;
pub mod worker_pool;

pub use atom::{Atom, Blocker};
pub use cpv::{Cpn, Cpv};
pub use eapi::Eapi;
pub use error::{Error, Result};
pub use pool::{DepClass, PackageDeps, PackageMetadata, PackageName, Pool};
pub use profile::{OnDiskProfile, ProfileNode};
pub use repo::{ConfiguredTree, MultiplexTree, Package, RepoLayout, RepoTree, Syncable, UnconfiguredTree, UseState};
pub use resolver::{resolve, unmerge, Operation, ResolveContext, ResolveFlags};
pub use restrict::Restrict;
pub use vdb::Vdb;
pub use version::Version;
