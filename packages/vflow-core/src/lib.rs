//! vflow-core: the value-flow dataflow engine and the checks built on it.
//!
//! This crate owns the token/AST arena, the abstract-value lattice, the
//! per-translation-unit value-flow engine, the uninitialized-variable and
//! null-pointer-dereference checks, and the cross-translation-unit (CTU)
//! summary/join layer. Lexing, parsing, symbol resolution, and diagnostic
//! serialization are the responsibility of an external driver; this crate
//! only models the interfaces that driver calls into.
//!
//! Module layout:
//! - [`model`] — token arena, variables, scopes, spans
//! - [`value`] — the abstract-value lattice and its join/meet/refine ops
//! - [`library`] — read-only function/type facts shared across TU workers
//! - [`valueflow`] — the per-TU engine and its ten deterministic rules
//! - [`checks`] — uninitialized-variable and null-dereference checks
//! - [`summary`] — per-TU file info (unsafe usages, call facts)
//! - [`ctu`] — cross-translation-unit join and wire framing
//! - [`diagnostics`] — the diagnostic sink (dedup, severity filtering)
//! - [`config`] — settings, presets, validation
//! - [`errors`] — the engine/CTU/config error taxonomy

#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

pub mod checks;
pub mod config;
pub mod ctu;
pub mod diagnostics;
pub mod errors;
pub mod library;
pub mod model;
pub mod summary;
pub mod value;
pub mod valueflow;

pub use config::{Preset, Settings};
pub use diagnostics::{Certainty, Diagnostic, DiagnosticSink, Severity};
pub use errors::{CtuError, EngineError};
pub use model::{Function, FunctionId, Location, LocationHint, Scope, Token, TokenId, VarId, Variable};
pub use value::AbstractValue;
pub use valueflow::Engine;

use rayon::prelude::*;

/// A single translation unit's token stream plus the variables it declares,
/// as handed to the engine by the external driver.
pub struct TranslationUnit {
    pub file_name: String,
    pub tokens: model::TokenArena,
    pub scope: Scope,
    pub functions: Vec<Function>,
}

/// Result of analyzing one translation unit: its diagnostics plus the
/// per-function summary the CTU layer later joins across TUs.
pub struct AnalysisResult {
    pub file_name: String,
    pub diagnostics: Vec<Diagnostic>,
    pub file_info: summary::FileInfo,
}

/// Analyze a single translation unit with the engine and the enabled checks.
pub fn analyze_one(tu: &TranslationUnit, settings: &Settings) -> AnalysisResult {
    let engine = Engine::new(settings.clone());
    let flow = engine.run(&tu.tokens, &tu.scope, &tu.functions);
    let library = engine.library_facts();
    let mut sink = DiagnosticSink::new(settings.clone());

    // §7 "engine-internal fatal": an I1-I4 invariant broke mid-function.
    // The function that hit it was already abandoned by the engine;
    // surfacing it here is the one outermost guard that both sees every
    // `FlowResult` the engine produced and has a file name to attach.
    for err in flow.internal_errors() {
        let hop = LocationHint::new(err.location, tu.file_name.as_str(), format!("in function '{}'", err.function));
        sink.emit(Diagnostic::new(
            "internalError",
            Severity::Error,
            Certainty::Normal,
            format!("Internal error analyzing '{}': {}", err.function, err.error),
            format!(
                "Value-flow analysis of function '{}' was aborted after an internal invariant was violated: {}",
                err.function, err.error
            ),
            vec![hop],
        ));
    }

    if settings.enabled_checks.uninit {
        checks::uninit::check(&tu.file_name, &tu.tokens, &tu.scope, &tu.functions, &flow, library, &mut sink);
    }
    if settings.enabled_checks.null_deref {
        checks::null_deref::check(&tu.file_name, &tu.tokens, &tu.scope, &tu.functions, &flow, &mut sink);
    }

    let file_info = summary::FileInfo::build(&tu.tokens, &tu.scope, &tu.functions, &flow, library);

    AnalysisResult {
        file_name: tu.file_name.clone(),
        diagnostics: sink.into_diagnostics(),
        file_info,
    }
}

/// Analyze many translation units in parallel, one `Engine` per TU and no
/// shared mutable state between them. This is the only place this crate
/// uses parallelism; a single TU's value-flow pass is always sequential.
pub fn analyze_many(tus: &[TranslationUnit], settings: &Settings) -> Vec<AnalysisResult> {
    tus.par_iter()
        .map(|tu| analyze_one(tu, settings))
        .collect()
}
