//! Metadata oracle transport.
//!
//! Bash cannot be parsed by this crate (by design, see the crate's
//! Non-goals): ebuild metadata (`IUSE`, `DEPEND`, …) is obtained from an
//! external build-daemon process over a length-prefixed JSON protocol. This
//! module only models the *client* side of that contract as an injected
//! [`Transport`] — the daemon itself, its sandboxing, and its IPC framing
//! are out of scope and are supplied by the embedder.

use std::collections::HashMap;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::cpv::Cpv;
use crate::error::{Error, Result};

/// The raw, unparsed metadata fields returned by the oracle for one CPV.
/// Dependency strings are parsed into [`crate::restrict::Restrict`] trees
/// by [`crate::pool::parse_depset`] once the scan knows the package's EAPI;
/// this struct only carries the oracle's wire format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMetadata {
    pub eapi: String,
    pub slot: String,
    pub subslot: Option<String>,
    pub keywords: Vec<String>,
    pub iuse: Vec<String>,
    pub depend: String,
    pub rdepend: String,
    pub bdepend: String,
    pub pdepend: String,
    pub idepend: String,
    pub required_use: String,
    pub restrict: Vec<String>,
    pub license: String,
    pub src_uri: String,
    pub properties: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OracleRequest<'a> {
    cpv: &'a str,
    ebuild_path: &'a str,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum OracleResponse {
    Ok { metadata: RawMetadata },
    Error { reason: String },
}

/// Client side of the build-daemon metadata contract. One request is
/// in-flight per call; the resolver never pipelines requests to the same
/// repository (see §5's single-threaded cooperative model).
pub trait Transport: Send + Sync {
    fn request(&mut self, cpv: &Cpv, ebuild_path: &str) -> Result<RawMetadata>;
}

/// Frames requests/responses as `u32`-length-prefixed JSON over any
/// duplex byte stream (a pipe to the build-daemon process, in production).
pub struct FramedTransport<S> {
    stream: S,
}

impl<S: Read + Write> FramedTransport<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    fn write_frame(&mut self, payload: &[u8]) -> std::io::Result<()> {
        let len = u32::try_from(payload.len()).expect("oracle payload too large");
        self.stream.write_all(&len.to_be_bytes())?;
        self.stream.write_all(payload)
    }

    fn read_frame(&mut self) -> std::io::Result<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        self.stream.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<S: Read + Write + Send + Sync> Transport for FramedTransport<S> {
    fn request(&mut self, cpv: &Cpv, ebuild_path: &str) -> Result<RawMetadata> {
        let cpv_str = cpv.to_string();
        let req = OracleRequest {
            cpv: &cpv_str,
            ebuild_path,
        };
        let payload = serde_json::to_vec(&req).expect("oracle request is always serializable");
        self.write_frame(&payload).map_err(|source| Error::Io {
            path: ebuild_path.into(),
            source,
        })?;
        let resp = self.read_frame().map_err(|source| Error::Io {
            path: ebuild_path.into(),
            source,
        })?;
        let resp: OracleResponse = serde_json::from_slice(&resp).map_err(|e| Error::MetadataError {
            cpv: cpv.clone(),
            field: "<oracle response>",
            reason: e.to_string(),
        })?;
        match resp {
            OracleResponse::Ok { metadata } => Ok(metadata),
            OracleResponse::Error { reason } => Err(Error::MetadataError {
                cpv: cpv.clone(),
                field: "<oracle>",
                reason,
            }),
        }
    }
}

/// In-memory stand-in for the build daemon, used by tests and by
/// `ConfiguredTree` fixtures that never touch a real ebuild tree.
#[derive(Debug, Clone, Default)]
pub struct StubTransport {
    fixtures: HashMap<String, RawMetadata>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cpv: impl Into<String>, metadata: RawMetadata) {
        self.fixtures.insert(cpv.into(), metadata);
    }
}

impl Transport for StubTransport {
    fn request(&mut self, cpv: &Cpv, _ebuild_path: &str) -> Result<RawMetadata> {
        self.fixtures
            .get(&cpv.to_string())
            .cloned()
            .ok_or_else(|| Error::MetadataError {
                cpv: cpv.clone(),
                field: "<oracle>",
                reason: "no fixture registered".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_transport_roundtrip() {
        let mut t = StubTransport::new();
        t.insert(
            "dev-lang/rust-1.75.0",
            RawMetadata {
                eapi: "8".into(),
                slot: "0".into(),
                ..Default::default()
            },
        );
        let cpv = Cpv::parse("dev-lang/rust-1.75.0").unwrap();
        let meta = t.request(&cpv, "/repo/dev-lang/rust/rust-1.75.0.ebuild").unwrap();
        assert_eq!(meta.eapi, "8");
    }

    #[test]
    fn missing_fixture_is_metadata_error() {
        let mut t = StubTransport::new();
        let cpv = Cpv::parse("dev-lang/rust-1.75.0").unwrap();
        assert!(t.request(&cpv, "x").is_err());
    }

    #[test]
    fn framed_transport_over_inmemory_pipe() {
        use std::io::Cursor;

        let resp = OracleResponse::Ok {
            metadata: RawMetadata {
                eapi: "8".into(),
                slot: "0".into(),
                ..Default::default()
            },
        };
        let payload = serde_json::to_vec(&resp).unwrap();
        let mut framed = Vec::new();
        framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        framed.extend_from_slice(&payload);

        struct RW {
            read: Cursor<Vec<u8>>,
            write: Vec<u8>,
        }
        impl Read for RW {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                self.read.read(buf)
            }
        }
        impl Write for RW {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.write.write(buf)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let stream = RW {
            read: Cursor::new(framed),
            write: Vec::new(),
        };
        let mut transport = FramedTransport::new(stream);
        let cpv = Cpv::parse("dev-lang/rust-1.75.0").unwrap();
        let meta = transport.request(&cpv, "/repo/x.ebuild").unwrap();
        assert_eq!(meta.slot, "0");
    }
}
