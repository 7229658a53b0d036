//! # Digest Provider
//!
//! Incremental hashing primitives behind a trait seam. The engine only ever
//! talks to [`DigestProvider`] and [`DigestContext`]; [`StandardDigests`] is the
//! default implementation backed by the `md5` and `sha2` crates.

use std::fmt;

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DigestError {
    #[error("{0} is not supported by this provider")]
    Unsupported(DigestKind),
    #[error("{kind} context creation failed: {reason}")]
    Create { kind: DigestKind, reason: String },
    #[error("{kind} finalize failed: {reason}")]
    Finalize { kind: DigestKind, reason: String },
    #[error("provider self-check failed for {kind}: expected {expected}, got {actual}")]
    SelfCheck {
        kind: DigestKind,
        expected: String,
        actual: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum DigestKind {
    Md5,
    Sha256,
}

impl DigestKind {
    pub const ALL: [DigestKind; 2] = [DigestKind::Md5, DigestKind::Sha256];

    pub fn label(self) -> &'static str {
        match self {
            DigestKind::Md5 => "MD5",
            DigestKind::Sha256 => "SHA256",
        }
    }

    /// Length of the raw digest in bytes.
    pub fn output_len(self) -> usize {
        match self {
            DigestKind::Md5 => 16,
            DigestKind::Sha256 => 32,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            DigestKind::Md5 => 0,
            DigestKind::Sha256 => 1,
        }
    }
}

impl fmt::Display for DigestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which digests a task asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct DigestSet {
    pub md5: bool,
    pub sha256: bool,
}

impl DigestSet {
    pub const BOTH: DigestSet = DigestSet {
        md5: true,
        sha256: true,
    };

    pub fn new(md5: bool, sha256: bool) -> Self {
        Self { md5, sha256 }
    }

    pub fn only(kind: DigestKind) -> Self {
        match kind {
            DigestKind::Md5 => Self::new(true, false),
            DigestKind::Sha256 => Self::new(false, true),
        }
    }

    pub fn contains(&self, kind: DigestKind) -> bool {
        match kind {
            DigestKind::Md5 => self.md5,
            DigestKind::Sha256 => self.sha256,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.md5 && !self.sha256
    }

    pub fn kinds(&self) -> impl Iterator<Item = DigestKind> + '_ {
        DigestKind::ALL.into_iter().filter(|kind| self.contains(*kind))
    }
}

/// One in-progress digest computation.
pub trait DigestContext: Send {
    fn kind(&self) -> DigestKind;
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> Result<Vec<u8>, DigestError>;
}

/// Factory for digest contexts, shared read-only by every worker.
pub trait DigestProvider: Send + Sync {
    fn name(&self) -> &str;
    fn create(&self, kind: DigestKind) -> Result<Box<dyn DigestContext>, DigestError>;

    /// Verify the provider against known answers before the engine uses it.
    fn self_check(&self) -> Result<(), DigestError> {
        for kind in DigestKind::ALL {
            let mut ctx = self.create(kind)?;
            ctx.update(b"abc");
            let actual = to_hex_upper(&ctx.finalize()?);
            let expected = known_answer_abc(kind);
            if actual != expected {
                return Err(DigestError::SelfCheck {
                    kind,
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        Ok(())
    }
}

fn known_answer_abc(kind: DigestKind) -> &'static str {
    match kind {
        DigestKind::Md5 => "900150983CD24FB0D6963F7D28E17F72",
        DigestKind::Sha256 => "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD",
    }
}

pub fn to_hex_upper(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// MD5 and SHA-256 from the RustCrypto / `md5` crates.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardDigests;

impl DigestProvider for StandardDigests {
    fn name(&self) -> &str {
        "standard"
    }

    fn create(&self, kind: DigestKind) -> Result<Box<dyn DigestContext>, DigestError> {
        Ok(match kind {
            DigestKind::Md5 => Box::new(Md5Context(md5::Context::new())),
            DigestKind::Sha256 => Box::new(Sha256Context(Sha256::new())),
        })
    }
}

struct Md5Context(md5::Context);

impl DigestContext for Md5Context {
    fn kind(&self) -> DigestKind {
        DigestKind::Md5
    }

    fn update(&mut self, data: &[u8]) {
        self.0.consume(data);
    }

    fn finalize(self: Box<Self>) -> Result<Vec<u8>, DigestError> {
        Ok(self.0.compute().0.to_vec())
    }
}

struct Sha256Context(Sha256);

impl DigestContext for Sha256Context {
    fn kind(&self) -> DigestKind {
        DigestKind::Sha256
    }

    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }

    fn finalize(self: Box<Self>) -> Result<Vec<u8>, DigestError> {
        Ok(self.0.finalize().to_vec())
    }
}
