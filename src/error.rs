//! Typed error taxonomy shared across the crate.
//!
//! Mirrors the failure modes enumerated in the profile, repository, and
//! resolver components: parse errors carry enough context to point a user
//! at the offending file/line, metadata errors are attached to a package,
//! and resolution errors carry the atoms/candidates involved.

use std::path::PathBuf;

use crate::atom::Atom;
use crate::cpv::Cpv;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed atom: {0}")]
    MalformedAtom(String),

    #[error("malformed version: {0}")]
    MalformedVersion(String),

    #[error("profile {path}: file {filename}: {reason}")]
    ProfileParse {
        path: PathBuf,
        filename: &'static str,
        reason: String,
    },

    #[error("profile directory does not exist: {0}")]
    ProfileMissing(PathBuf),

    #[error("cycle detected among profile parents starting at {0}")]
    ProfileCycle(PathBuf),

    #[error("metadata error for {cpv}: field {field}: {reason}")]
    MetadataError {
        cpv: Cpv,
        field: &'static str,
        reason: String,
    },

    #[error("path {0} is not inside the repository")]
    PathOutsideRepo(PathBuf),

    #[error("no candidate satisfies atom {0}")]
    Unsatisfied(Atom),

    #[error("conflicting versions requested for {key}: {candidates:?}")]
    Conflict { key: String, candidates: Vec<Cpv> },

    #[error("unbreakable dependency cycle: {0:?}")]
    Cycle(Vec<Cpv>),

    #[error("package {cpv} is masked by {masker}")]
    Masked { cpv: Cpv, masker: String },

    #[error("package {0} requires an unsupported EAPI {1}")]
    UnsupportedEapi(Cpv, String),

    #[error("unmerge token {0} matches packages in more than one category")]
    AmbiguousUnmerge(String),

    #[error("resolution cancelled")]
    Cancelled,

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
