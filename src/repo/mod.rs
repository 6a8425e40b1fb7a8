//! Repository layer: on-disk tree scanning, metadata caching, profile
//! configuration binding, multiplexing, and virtual/provided synthesis.

pub mod layout;
pub mod metadata;
pub mod tree;
pub mod virtuals;

pub use layout::RepoLayout;
pub use tree::{ConfiguredTree, MultiplexTree, Package, RepoTree, Syncable, UnconfiguredTree, UseState};
