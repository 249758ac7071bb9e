//! Diagnostic sink. The core never formats diagnostics — it builds the
//! structured record and hands it to the sink, which dedups by content
//! hash and applies a severity filter; rendering (SARIF, XML, text) is the
//! out-of-scope front-end's job.

use crate::config::{Settings, Severity};
use crate::model::LocationHint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Certainty {
    Normal,
    Inconclusive,
}

/// A structured diagnostic record. `content_hash` is computed on
/// construction from the id, primary location, and message so the sink can
/// dedup without re-hashing on every insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub id: &'static str,
    pub severity: Severity,
    pub certainty: Certainty,
    pub short_message: String,
    pub verbose_message: String,
    pub cwe: Option<u32>,
    pub content_hash: u64,
    /// Ordered from root cause to reported use; index 0 is the primary
    /// location.
    pub call_stack: Vec<LocationHint>,
}

impl Diagnostic {
    pub fn new(
        id: &'static str,
        severity: Severity,
        certainty: Certainty,
        short_message: impl Into<String>,
        verbose_message: impl Into<String>,
        call_stack: Vec<LocationHint>,
    ) -> Self {
        let short_message = short_message.into();
        let verbose_message = verbose_message.into();
        let content_hash = Self::hash(id, &call_stack, &short_message);
        Diagnostic {
            id,
            severity,
            certainty,
            short_message,
            verbose_message,
            cwe: None,
            content_hash,
            call_stack,
        }
    }

    pub fn with_cwe(mut self, cwe: u32) -> Self {
        self.cwe = Some(cwe);
        self
    }

    fn hash(id: &str, call_stack: &[LocationHint], message: &str) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(id.as_bytes());
        for hop in call_stack {
            hasher.update(hop.location.file_index.to_le_bytes());
            hasher.update(hop.location.line.to_le_bytes());
            hasher.update(hop.location.column.to_le_bytes());
        }
        hasher.update(message.as_bytes());
        let digest = hasher.finalize();
        u64::from_le_bytes(digest[0..8].try_into().expect("sha256 digest >= 8 bytes"))
    }
}

/// Accepts diagnostics from the value-flow checks and the CTU join pass,
/// deduplicating by content hash and dropping anything below the
/// configured severity filter. Diagnostics are kept in emission order;
/// callers that need the documented source-order guarantee sort on
/// `call_stack[0].location` before handing results to a driver.
#[derive(Debug)]
pub struct DiagnosticSink {
    severity_filter: Severity,
    seen_hashes: rustc_hash::FxHashSet<u64>,
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new(settings: Settings) -> Self {
        DiagnosticSink {
            severity_filter: settings.severity_filter,
            seen_hashes: rustc_hash::FxHashSet::default(),
            diagnostics: Vec::new(),
        }
    }

    /// Emit a diagnostic; dropped silently if it is a duplicate (same
    /// content hash) or below the severity filter.
    pub fn emit(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity < self.severity_filter {
            return;
        }
        if !self.seen_hashes.insert(diagnostic.content_hash) {
            return;
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

/// A [`DiagnosticSink`] variant for a driver that analyzes several TUs on
/// separate `rayon` workers but wants one merged, deduplicated diagnostic
/// list rather than per-TU lists concatenated after the fact.
///
/// §5's resource model singles out the sink as "the only shared mutable
/// collaborator" and requires its `emit`/`finalize` operations to already be
/// safe to call from any worker. `DiagnosticSink` itself is `&mut self` and
/// not meant to be shared; this type is the one the spec describes —
/// `emit` takes `&self` and is internally serialized by a lock-free
/// content-hash set (`dashmap::DashSet`, hashed with `ahash` rather than the
/// default SipHash since the keys are already well-distributed `u64`
/// digests) plus a short-held `parking_lot::Mutex` around the output
/// buffer.
pub struct ConcurrentDiagnosticSink {
    severity_filter: Severity,
    seen_hashes: dashmap::DashSet<u64, ahash::RandomState>,
    diagnostics: parking_lot::Mutex<Vec<Diagnostic>>,
}

impl ConcurrentDiagnosticSink {
    pub fn new(settings: &Settings) -> Self {
        ConcurrentDiagnosticSink {
            severity_filter: settings.severity_filter,
            seen_hashes: dashmap::DashSet::with_hasher(ahash::RandomState::new()),
            diagnostics: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Emit a diagnostic from any worker thread; dropped silently if it is a
    /// duplicate (same content hash, possibly produced by another worker
    /// analyzing a different TU) or below the severity filter.
    pub fn emit(&self, diagnostic: Diagnostic) {
        if diagnostic.severity < self.severity_filter {
            return;
        }
        if !self.seen_hashes.insert(diagnostic.content_hash) {
            return;
        }
        self.diagnostics.lock().push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.diagnostics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.lock().is_empty()
    }

    /// Drains the accumulated diagnostics. Emission order across workers is
    /// not meaningful on its own; a driver wanting the documented
    /// source-order guarantee (§5) sorts on `call_stack[0].location` first.
    pub fn finalize(self) -> Vec<Diagnostic> {
        self.diagnostics.into_inner()
    }
}
