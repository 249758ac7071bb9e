//! Cross-translation-unit join (§4.H) and wire framing (§6).
//!
//! The join step matches one TU's dangerous call-site facts — a constant
//! null, a locally-uninitialized variable, or a parameter simply forwarded
//! on unchanged — against another TU's unsafe-usage summary for the
//! callee, then recursively forwards through intermediate functions up to
//! `Settings::ctu_depth_bound`. A fact that would cross the bound is
//! dropped, not reported as an error (§4.H boundary behavior). Matching and
//! the final ordering are both deterministic given the same inputs (I6):
//! nothing here depends on hash-map iteration order.
//!
//! CTU findings are weaker evidence than an intra-TU diagnostic — caller
//! and callee were analyzed independently, and the join only sees the
//! syntactic shape of the forwarding, not the full lattice — so every
//! diagnostic here carries `Certainty::Inconclusive` regardless of
//! `Settings::inconclusive`. That setting instead gates a different axis
//! entirely (per §9's open question on its interaction with widening): a
//! hypothesis the *value-flow* lattice itself is unsure of, not a join
//! across TUs. A CTU match is a concrete fact about one TU joined against a
//! concrete fact about another; it doesn't need the widening-hypothesis
//! knob to fire, which is why the scenario settings in §8 (`inconclusive:
//! false`) still produce the documented CTU diagnostic.

use crate::config::Settings;
use crate::diagnostics::{Certainty, Diagnostic, DiagnosticSink};
use crate::errors::{CtuError, CtuResult};
use crate::model::{Location, LocationHint};
use crate::summary::{CallArgValue, FileInfo, FunctionSummary, UsagePayload};
use crate::Severity;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rustc_hash::FxHashMap;
use std::io::Write;

/// One TU's contribution to a CTU join: the file it came from plus its
/// already-built summary.
pub struct CtuInput<'a> {
    pub file_name: &'a str,
    pub file_info: &'a FileInfo,
}

/// Bounded cache of decoded per-file summaries, keyed by file name, for a
/// driver that re-joins incrementally as individual TUs are re-analyzed
/// rather than re-decoding every frame on each run. `join` itself takes
/// plain borrowed `CtuInput`s and never touches this cache directly; it
/// exists for the driver loop that sits above `decode_stream`/`join`.
pub struct SummaryCache {
    entries: lru::LruCache<String, FileInfo>,
}

impl SummaryCache {
    pub fn new(capacity: std::num::NonZeroUsize) -> Self {
        SummaryCache {
            entries: lru::LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, file_name: &str) -> Option<&FileInfo> {
        self.entries.get(file_name)
    }

    pub fn insert(&mut self, file_name: impl Into<String>, info: FileInfo) {
        self.entries.put(file_name.into(), info);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Null,
    Uninit,
}

impl ValueKind {
    fn matches(self, payload: UsagePayload) -> bool {
        matches!(
            (self, payload),
            (ValueKind::Null, UsagePayload::RequiresNonNull) | (ValueKind::Uninit, UsagePayload::RequiresInitialized)
        )
    }

    fn check_id(self) -> &'static str {
        match self {
            ValueKind::Null => "ctunullpointer",
            ValueKind::Uninit => "ctuuninitvar",
        }
    }
}

struct Callee<'a> {
    file_name: &'a str,
    summary: &'a FunctionSummary,
}

#[derive(Clone)]
struct ResolvedFact {
    callee_name: String,
    argument_index: u32,
    kind: ValueKind,
    preamble: Vec<LocationHint>,
    depth: u32,
}

/// Joins every input's call facts against every other input's unsafe-usage
/// summaries and returns the resulting diagnostics, sorted by (callee name,
/// argument index, caller file, caller line, caller column) so the output
/// is stable across reruns regardless of input order or hash-map iteration.
pub fn join(inputs: &[CtuInput], settings: &Settings) -> Vec<Diagnostic> {
    let mut callees: FxHashMap<&str, Callee> = FxHashMap::default();
    for input in inputs {
        for summary in &input.file_info.functions {
            callees.entry(summary.function_name.as_str()).or_insert(Callee {
                file_name: input.file_name,
                summary,
            });
        }
    }

    let mut pending: Vec<ResolvedFact> = Vec::new();
    for input in inputs {
        for summary in &input.file_info.functions {
            for fact in &summary.call_facts {
                let kind = match fact.value {
                    CallArgValue::Null => Some(ValueKind::Null),
                    CallArgValue::Uninit => Some(ValueKind::Uninit),
                    CallArgValue::Known(_) | CallArgValue::ForwardedParam(_) => None,
                };
                let Some(kind) = kind else { continue };
                pending.push(ResolvedFact {
                    callee_name: fact.callee_name.clone(),
                    argument_index: fact.argument_index,
                    kind,
                    preamble: vec![LocationHint::new(fact.location, input.file_name, "value flows into this call")],
                    depth: 0,
                });
            }
        }
    }

    let mut seen_forwards: std::collections::HashSet<(String, u32, bool, Location)> = std::collections::HashSet::new();
    let mut found: Vec<(Diagnostic, (String, u32, String, u32, u32))> = Vec::new();

    while let Some(fact) = pending.pop() {
        let Some(callee) = callees.get(fact.callee_name.as_str()) else { continue };

        for usage in &callee.summary.unsafe_usages {
            if usage.argument_index != fact.argument_index || !fact.kind.matches(usage.payload) {
                continue;
            }
            let sort_key = sort_key(&fact);
            let diagnostic = build_diagnostic(&fact, usage, callee.file_name);
            found.push((diagnostic, sort_key));
        }

        if fact.depth + 1 > settings.ctu_depth_bound {
            continue;
        }
        for inner in &callee.summary.call_facts {
            let CallArgValue::ForwardedParam(p) = inner.value else { continue };
            if p != fact.argument_index {
                continue;
            }
            let dedup_key = (inner.callee_name.clone(), inner.argument_index, fact.kind == ValueKind::Null, inner.location);
            if !seen_forwards.insert(dedup_key) {
                continue;
            }
            let mut preamble = fact.preamble.clone();
            preamble.push(LocationHint::new(inner.location, callee.file_name, "forwarded to another call here"));
            pending.push(ResolvedFact {
                callee_name: inner.callee_name.clone(),
                argument_index: inner.argument_index,
                kind: fact.kind,
                preamble,
                depth: fact.depth + 1,
            });
        }
    }

    found.sort_by(|a, b| a.1.cmp(&b.1));

    let mut sink = DiagnosticSink::new(settings.clone());
    for (diagnostic, _) in found {
        sink.emit(diagnostic);
    }
    sink.into_diagnostics()
}

fn sort_key(fact: &ResolvedFact) -> (String, u32, String, u32, u32) {
    let site = fact.preamble.first().expect("a resolved fact always has at least its originating call site");
    (
        fact.callee_name.clone(),
        fact.argument_index,
        site.resolved_file.clone(),
        site.location.line,
        site.location.column,
    )
}

fn build_diagnostic(fact: &ResolvedFact, usage: &crate::summary::UnsafeUsage, callee_file: &str) -> Diagnostic {
    let mut call_stack = fact.preamble.clone();
    let what = match fact.kind {
        ValueKind::Null => "a null pointer",
        ValueKind::Uninit => "an uninitialized variable",
    };
    call_stack.push(LocationHint::new(
        usage.location,
        callee_file,
        format!("parameter '{}' is used here without a local guard", usage.parameter_name),
    ));
    let short = format!("Passing {what} here reaches an unguarded use in the called function");
    let verbose = format!(
        "Argument {} passed to '{}' carries {what} at the call site and is used without a guard inside the called function",
        fact.argument_index, fact.callee_name
    );
    Diagnostic::new(fact.kind.check_id(), Severity::Warning, Certainty::Inconclusive, short, verbose, call_stack).with_cwe(match fact.kind {
        ValueKind::Null => 476,
        ValueKind::Uninit => 457,
    })
}

/// Builds the static call graph implied by a set of CTU inputs' call facts:
/// one node per function name, one edge `caller -> callee` per distinct
/// argument index a call fact targets, weighted by how many call facts
/// contribute to that edge. This is not consulted by [`join`] itself (the
/// worklist there is already depth-bounded and cycle-safe); it exists for a
/// driver that wants to inspect or render the interprocedural shape CTU
/// analysis is walking — e.g. to explain why a join did or didn't reach some
/// function, or to flag recursion before the out-of-scope front-end renders
/// anything.
pub fn call_graph<'a>(inputs: &[CtuInput<'a>]) -> petgraph::graphmap::DiGraphMap<&'a str, u32> {
    let mut graph = petgraph::graphmap::DiGraphMap::new();
    for input in inputs {
        for summary in &input.file_info.functions {
            graph.add_node(summary.function_name.as_str());
            for fact in &summary.call_facts {
                graph.add_node(fact.callee_name.as_str());
                let weight = graph
                    .edge_weight(summary.function_name.as_str(), fact.callee_name.as_str())
                    .copied()
                    .unwrap_or(0);
                graph.add_edge(summary.function_name.as_str(), fact.callee_name.as_str(), weight + 1);
            }
        }
    }
    graph
}

/// Encodes one TU's [`FileInfo`] as a length-prefixed msgpack frame: a
/// `u32` little-endian byte length followed by the msgpack payload. This is
/// the unit the external driver streams between TU workers and whatever
/// process performs the join.
pub fn encode_frame(info: &FileInfo) -> CtuResult<Vec<u8>> {
    let payload = rmp_serde::to_vec(info)?;
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.write_u32::<LittleEndian>(payload.len() as u32)?;
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decodes one frame from the front of `bytes`, returning the decoded
/// `FileInfo` and the remaining, unconsumed slice.
pub fn decode_frame(bytes: &[u8]) -> CtuResult<(FileInfo, &[u8])> {
    if bytes.len() < 4 {
        return Err(CtuError::TruncatedFrame);
    }
    let mut header = &bytes[0..4];
    let len = header.read_u32::<LittleEndian>()? as usize;
    let body_start = 4;
    let body_end = body_start.checked_add(len).ok_or(CtuError::TruncatedFrame)?;
    if bytes.len() < body_end {
        return Err(CtuError::TruncatedFrame);
    }
    let info: FileInfo = rmp_serde::from_slice(&bytes[body_start..body_end])?;
    Ok((info, &bytes[body_end..]))
}

/// Decodes every frame in `bytes` in order. Used by a driver that
/// concatenates every TU worker's frame into one buffer before handing it
/// to the join step.
pub fn decode_stream(mut bytes: &[u8]) -> CtuResult<Vec<FileInfo>> {
    let mut out = Vec::new();
    while !bytes.is_empty() {
        let (info, rest) = decode_frame(bytes)?;
        out.push(info);
        bytes = rest;
    }
    Ok(out)
}

/// Encodes every `FileInfo` in order into one concatenated buffer of
/// frames, the inverse of [`decode_stream`].
pub fn encode_stream<'a>(infos: impl IntoIterator<Item = &'a FileInfo>) -> CtuResult<Vec<u8>> {
    let mut buf = Vec::new();
    for info in infos {
        buf.write_all(&encode_frame(info)?)?;
    }
    Ok(buf)
}

/// §7's input-format-fatal contract for one file's stream: a frame whose
/// length header can't be read ends decoding of this stream outright
/// (there is no way left to find the next frame boundary), but a frame
/// whose header is intact and whose payload fails to decode is skipped —
/// its declared length still tells us where the next frame starts — and
/// reported into `sink` as `ctuinfo-invalid` rather than aborting the rest
/// of the buffer the way [`decode_stream`]'s `?` does.
pub fn decode_stream_lenient(mut bytes: &[u8], file_name: &str, sink: &mut DiagnosticSink) -> Vec<FileInfo> {
    let mut out = Vec::new();
    let mut frame_index = 0u32;
    while !bytes.is_empty() {
        if bytes.len() < 4 {
            sink.emit(invalid_summary_diagnostic(file_name, frame_index, &CtuError::TruncatedFrame));
            break;
        }
        let mut header = &bytes[0..4];
        let len = match header.read_u32::<LittleEndian>() {
            Ok(len) => len as usize,
            Err(e) => {
                sink.emit(invalid_summary_diagnostic(file_name, frame_index, &CtuError::Io(e)));
                break;
            }
        };
        let body_start = 4;
        let Some(body_end) = body_start.checked_add(len) else {
            sink.emit(invalid_summary_diagnostic(file_name, frame_index, &CtuError::TruncatedFrame));
            break;
        };
        if bytes.len() < body_end {
            sink.emit(invalid_summary_diagnostic(file_name, frame_index, &CtuError::TruncatedFrame));
            break;
        }
        match rmp_serde::from_slice::<FileInfo>(&bytes[body_start..body_end]) {
            Ok(info) => out.push(info),
            Err(e) => sink.emit(invalid_summary_diagnostic(file_name, frame_index, &CtuError::Decode(e))),
        }
        bytes = &bytes[body_end..];
        frame_index += 1;
    }
    out
}

fn invalid_summary_diagnostic(file_name: &str, frame_index: u32, cause: &CtuError) -> Diagnostic {
    let hop = LocationHint::new(
        Location::synthetic(),
        file_name,
        format!("frame {frame_index} of this translation unit's CTU summary"),
    );
    Diagnostic::new(
        "ctuinfo-invalid",
        Severity::Warning,
        Certainty::Normal,
        format!("Malformed CTU summary for '{file_name}' (frame {frame_index}): {cause}"),
        format!(
            "Frame {frame_index} of the CTU summary produced for '{file_name}' could not be decoded and was dropped from the join: {cause}"
        ),
        vec![hop],
    )
}

/// Decodes every file's summary stream leniently and joins whatever
/// decoded cleanly, per §7: a malformed summary is rejected with a
/// `ctuinfo-invalid` diagnostic rather than aborting the whole batch, and
/// the rest of the join proceeds over everything that did decode.
/// `decode_stream`/`join` remain the strict building blocks this wraps —
/// a driver that would rather abort on the first malformed frame calls
/// those directly instead.
pub fn decode_and_join(streams: &[(&str, &[u8])], settings: &Settings) -> Vec<Diagnostic> {
    let mut sink = DiagnosticSink::new(settings.clone());
    let mut decoded: Vec<(&str, FileInfo)> = Vec::new();
    for &(file_name, bytes) in streams {
        for info in decode_stream_lenient(bytes, file_name, &mut sink) {
            decoded.push((file_name, info));
        }
    }
    let inputs: Vec<CtuInput> = decoded
        .iter()
        .map(|(file_name, info)| CtuInput { file_name, file_info: info })
        .collect();
    let mut diagnostics = sink.into_diagnostics();
    diagnostics.extend(join(&inputs, settings));
    diagnostics
}

/// Renders a `FileInfo` as pretty-printed JSON. Not the wire format used
/// between TU workers and the join step (that is [`encode_frame`]'s fixed
/// msgpack framing, per §6) — this is for a driver's debug/tracing output,
/// where a human wants to read a summary directly rather than decode a
/// binary frame.
pub fn to_json_pretty(info: &FileInfo) -> CtuResult<String> {
    Ok(serde_json::to_string_pretty(info)?)
}
