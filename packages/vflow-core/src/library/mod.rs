//! Library facts: per-function argument metadata the engine consumes to
//! decide whether a call is dangerous, whether it initializes its pointee,
//! and whether it terminates the path.
//!
//! Read-only after construction and safe to share by reference across
//! parallel TU workers; see [`crate::diagnostics::ConcurrentDiagnosticSink`]
//! for the one collaborator in this crate that actually needs a
//! `DashMap`-backed concurrent table rather than a plain shared reference.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    In,
    Out,
    InOut,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinSize {
    pub kind: MinSizeKind,
    pub related_arg: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinSizeKind {
    /// Buffer must be at least `strlen(arg)` bytes.
    Strlen,
    /// Buffer must be at least the integer value of `arg` bytes.
    ArgValue,
}

#[derive(Debug, Clone, Default)]
pub struct ArgumentFacts {
    pub notnull: bool,
    pub direction: Direction,
    pub formatstr: bool,
    pub minsize: Option<MinSize>,
    pub use_retval: bool,
}

impl ArgumentFacts {
    /// The conservative default for an argument of a function the library
    /// has no entry for: the engine assumes it reads the pointee and, if
    /// non-const, may also write through it.
    pub fn unknown_conservative() -> Self {
        ArgumentFacts {
            notnull: false,
            direction: Direction::Unknown,
            formatstr: false,
            minsize: None,
            use_retval: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FunctionFacts {
    pub noreturn: bool,
    pub arguments: FxHashMap<u32, ArgumentFacts>,
    /// `scanf`-family functions take a format string plus a variadic tail of
    /// output targets; rather than enumerate every index, any argument at or
    /// past this index defaults to `Direction::Out` unless the map above
    /// overrides it explicitly.
    pub variadic_out_from: Option<u32>,
}

impl FunctionFacts {
    pub fn argument(&self, index: u32) -> ArgumentFacts {
        if let Some(facts) = self.arguments.get(&index) {
            return facts.clone();
        }
        if self.variadic_out_from.is_some_and(|from| index >= from) {
            return ArgumentFacts {
                direction: Direction::Out,
                ..Default::default()
            };
        }
        ArgumentFacts::unknown_conservative()
    }
}

/// Maps function name to its per-argument facts, populated once from the
/// external library-definition document (out of scope here — this crate
/// only consumes already-parsed facts) or from
/// [`LibraryFacts::with_stdlib_defaults`] for a standalone demo/test run.
#[derive(Debug, Clone, Default)]
pub struct LibraryFacts {
    functions: FxHashMap<String, FunctionFacts>,
}

impl LibraryFacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, facts: FunctionFacts) {
        self.functions.insert(name.into(), facts);
    }

    pub fn lookup(&self, name: &str) -> Option<&FunctionFacts> {
        self.functions.get(name)
    }

    pub fn is_noreturn(&self, name: &str) -> bool {
        self.functions.get(name).map(|f| f.noreturn).unwrap_or(false)
    }

    pub fn argument_facts(&self, name: &str, index: u32) -> ArgumentFacts {
        self.functions
            .get(name)
            .map(|f| f.argument(index))
            .unwrap_or_else(ArgumentFacts::unknown_conservative)
    }

    /// A small built-in table covering the handful of standard-library
    /// functions the value-flow rules and checks name directly (malloc
    /// family, memcpy, strncpy, scanf, exit family). Real deployments load
    /// the full library document through the out-of-scope parser; this is
    /// what demos and tests run against instead.
    pub fn with_stdlib_defaults() -> Self {
        STDLIB_DEFAULTS.clone()
    }
}

static STDLIB_DEFAULTS: Lazy<LibraryFacts> = Lazy::new(|| {
    let mut lib = LibraryFacts::new();

    for name in ["exit", "abort", "_Exit", "longjmp"] {
        lib.insert(
            name,
            FunctionFacts {
                noreturn: true,
                arguments: FxHashMap::default(),
                variadic_out_from: None,
            },
        );
    }

    let mut scanf_args = FxHashMap::default();
    scanf_args.insert(
        0,
        ArgumentFacts {
            formatstr: true,
            ..Default::default()
        },
    );
    lib.insert(
        "scanf",
        FunctionFacts {
            noreturn: false,
            arguments: scanf_args,
            variadic_out_from: Some(1),
        },
    );

    let mut memcpy_args = FxHashMap::default();
    memcpy_args.insert(
        0,
        ArgumentFacts {
            notnull: true,
            direction: Direction::Out,
            minsize: Some(MinSize {
                kind: MinSizeKind::ArgValue,
                related_arg: 2,
            }),
            ..Default::default()
        },
    );
    memcpy_args.insert(
        1,
        ArgumentFacts {
            notnull: true,
            direction: Direction::In,
            minsize: Some(MinSize {
                kind: MinSizeKind::ArgValue,
                related_arg: 2,
            }),
            ..Default::default()
        },
    );
    lib.insert(
        "memcpy",
        FunctionFacts {
            noreturn: false,
            arguments: memcpy_args,
            variadic_out_from: None,
        },
    );

    let mut strncpy_args = FxHashMap::default();
    strncpy_args.insert(
        0,
        ArgumentFacts {
            notnull: true,
            direction: Direction::Out,
            ..Default::default()
        },
    );
    strncpy_args.insert(
        1,
        ArgumentFacts {
            notnull: true,
            direction: Direction::In,
            minsize: Some(MinSize {
                kind: MinSizeKind::Strlen,
                related_arg: 1,
            }),
            ..Default::default()
        },
    );
    lib.insert(
        "strncpy",
        FunctionFacts {
            noreturn: false,
            arguments: strncpy_args,
            variadic_out_from: None,
        },
    );

    lib
});
