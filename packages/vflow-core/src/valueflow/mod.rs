//! The per-translation-unit value-flow engine: ten deterministic rules,
//! applied in a fixed order, that assign an abstract [`ValueSet`] to every
//! token. Nothing here ever fails outright — an unrecognized construct
//! degrades its token to `Top` and the walk continues, so a partial or
//! unusual program still produces a usable (if conservative) result.

mod refine;
mod rules;

use crate::config::Settings;
use crate::errors::EngineError;
use crate::library::LibraryFacts;
use crate::model::{AstKind, Function, Location, Scope, TokenArena, TokenId, VarId};
use crate::value::{PathTag, ValueSet};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

/// One I1-I4 invariant violation recorded against the function and
/// location it was observed at. `analyze_one` turns each of these into an
/// `internalError` diagnostic once it has a file name to attach.
#[derive(Debug)]
pub struct InternalErrorRecord {
    pub function: String,
    pub location: Location,
    pub error: EngineError,
}

/// The outcome of running the engine over one translation unit: a value set
/// per token, plus the bookkeeping the checks need that isn't itself a
/// value (which pointers point at not-yet-written heap memory, which
/// tokens got widened to `Top` for a debug hook to observe).
#[derive(Debug, Default)]
pub struct FlowResult {
    values: FxHashMap<TokenId, ValueSet>,
    widened: FxHashSet<TokenId>,
    /// Tokens that are a dereference/member-access/index read whose base
    /// pointer currently points at heap memory allocated but never written.
    heap_uninit_reads: FxHashSet<TokenId>,
    internal_errors: Vec<InternalErrorRecord>,
    /// Last value a variable was assigned, independent of which token
    /// caused the assignment. Not path-sensitive (a branch join does not
    /// update it), so it under-approximates compared to the per-token value
    /// sets above; it exists only so a whole-aggregate read (`return ab;`,
    /// passing `ab` by value) can ask "is any leaf member still uninit"
    /// without a token position for each member at that read site.
    var_last_value: FxHashMap<VarId, ValueSet>,
}

impl FlowResult {
    pub fn value_at(&self, tok: TokenId) -> ValueSet {
        self.values.get(&tok).cloned().unwrap_or_default()
    }

    pub fn was_widened(&self, tok: TokenId) -> bool {
        self.widened.contains(&tok)
    }

    pub fn is_heap_uninit_read(&self, tok: TokenId) -> bool {
        self.heap_uninit_reads.contains(&tok)
    }

    pub fn internal_errors(&self) -> &[InternalErrorRecord] {
        &self.internal_errors
    }

    pub fn last_value_of(&self, var: VarId) -> ValueSet {
        self.var_last_value.get(&var).cloned().unwrap_or_default()
    }

    fn set(&mut self, tok: TokenId, value: ValueSet, bound: usize) {
        if let ValueSet::Values(facts) = &value {
            if facts.len() > bound {
                self.widened.insert(tok);
                self.values.insert(tok, ValueSet::top());
                return;
            }
        }
        if value.is_top() {
            self.widened.insert(tok);
        }
        self.values.insert(tok, value);
    }

    fn record_var(&mut self, var: VarId, value: ValueSet) {
        self.var_last_value.insert(var, value);
    }
}

/// Per-variable interpreter state threaded through one function's body:
/// the variable's current value set, plus (for pointers bound to a raw
/// heap allocation) whether its pointee is still unwritten.
#[derive(Debug, Clone, Default)]
struct Env {
    values: FxHashMap<VarId, ValueSet>,
    heap_uninit: FxHashSet<VarId>,
    /// Name of the function this environment walks, so a fatal invariant
    /// violation discovered deep in `rules` can be attributed without
    /// threading a separate parameter through every call.
    current_function: String,
}

impl Env {
    fn get(&self, var: VarId) -> ValueSet {
        self.values.get(&var).cloned().unwrap_or_else(ValueSet::top)
    }

    fn assign(&mut self, var: VarId, value: ValueSet) {
        self.values.insert(var, value);
        self.heap_uninit.remove(&var);
    }

    fn declare_uninit(&mut self, var: VarId) {
        self.values
            .insert(var, ValueSet::single(crate::value::ValueFact::new(crate::value::AbstractValue::Uninit)));
        self.heap_uninit.remove(&var);
    }

    fn mark_heap_uninit(&mut self, var: VarId, pointer_value: ValueSet) {
        self.values.insert(var, pointer_value);
        self.heap_uninit.insert(var);
    }

    fn clear_heap_uninit(&mut self, var: VarId) {
        self.heap_uninit.remove(&var);
    }

    fn is_heap_uninit(&self, var: VarId) -> bool {
        self.heap_uninit.contains(&var)
    }
}

/// Runs the value-flow rules over one translation unit. Stateless across
/// calls; all per-run state lives in the returned [`FlowResult`] and the
/// scratch [`Env`] built per function.
pub struct Engine {
    settings: Settings,
    library: LibraryFacts,
}

impl Engine {
    pub fn new(settings: Settings) -> Self {
        Engine {
            settings,
            library: LibraryFacts::with_stdlib_defaults(),
        }
    }

    pub fn with_library(settings: Settings, library: LibraryFacts) -> Self {
        Engine { settings, library }
    }

    pub fn run(&self, tokens: &TokenArena, scope: &Scope, functions: &[Function]) -> FlowResult {
        let mut result = FlowResult::default();
        for function in functions {
            if self.settings.is_terminated() {
                debug!(function = %function.name, "terminate flag observed, stopping early");
                break;
            }
            self.run_function(tokens, scope, function, &mut result);
        }
        result
    }

    fn run_function(&self, tokens: &TokenArena, scope: &Scope, function: &Function, result: &mut FlowResult) {
        let mut env = Env {
            current_function: function.name.clone(),
            ..Env::default()
        };
        for &param in &function.params {
            env.values.insert(param, ValueSet::top());
        }
        let mut terminated = false;
        rules::exec_block(
            self,
            tokens,
            scope,
            &function.body,
            &mut env,
            &mut terminated,
            result,
            PathTag::Unconditional,
        );
    }

    #[inline]
    fn bound(&self) -> usize {
        self.settings.widening_bound as usize
    }

    #[inline]
    fn loop_budget(&self) -> u32 {
        self.settings.loop_iteration_budget
    }

    fn library(&self) -> &LibraryFacts {
        &self.library
    }

    /// Exposes the library facts this engine ran with, so a check that
    /// walks the token stream after the fact (rather than during the
    /// value-flow pass itself) can apply the same argument-direction rules
    /// (§4.B) to decide whether a call argument position is a read use.
    pub fn library_facts(&self) -> &LibraryFacts {
        &self.library
    }

    /// Rule 1: literal and const propagation, including a constant-folded
    /// `sizeof`. The token kind carries an already-resolved numeric literal
    /// (constant folding is the parser's job); anything that doesn't parse
    /// as a number falls back to `Top`.
    fn eval_leaf_literal(&self, text: &str) -> ValueSet {
        match text.parse::<i64>() {
            Ok(n) => ValueSet::single(crate::value::ValueFact::new(crate::value::AbstractValue::known_int(n))),
            Err(_) => ValueSet::top(),
        }
    }

    /// §7 "engine-internal fatal": an I1-I4 invariant broke mid-function.
    /// Records the error against the function and location it happened at
    /// and sets `*terminated`, which unwinds `rules::exec_block` back out
    /// of this function the same way a `return`/`noreturn` call does —
    /// the current function's analysis is abandoned, `Engine::run`'s loop
    /// proceeds to the next one unaffected.
    fn record_internal_error(
        &self,
        result: &mut FlowResult,
        terminated: &mut bool,
        function: &str,
        location: Location,
        error: EngineError,
    ) {
        warn!(function, %location, %error, "value-flow invariant violated, aborting this function's analysis");
        result.internal_errors.push(InternalErrorRecord {
            function: function.to_string(),
            location,
            error,
        });
        *terminated = true;
    }
}

pub(crate) fn ast_kind_is_jump(kind: &AstKind) -> bool {
    matches!(
        kind,
        AstKind::Return
            | AstKind::Break
            | AstKind::Continue
            | AstKind::Goto
            | AstKind::Throw
            | AstKind::NoreturnCall
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::model::{
        AstKind, Function, FunctionId, Location, Scope, Token, TokenArena, TokenKind, VarId, VarType, Variable,
    };

    fn leaf_number(arena: &mut TokenArena, text: &str, line: u32) -> TokenId {
        arena.push(Token::new(text, TokenKind::NumberLiteral, Location::new(0, line, 1)))
    }

    #[test]
    fn straight_line_assignment_propagates_literal() {
        // int x; x = 5; (no uninit diagnostic expected, checked elsewhere)
        let mut arena = TokenArena::new();
        let mut scope = Scope::new();
        let x = scope.declare(Variable::new(VarId(0), "x", VarType::Scalar));

        let decl = arena
            .push(Token::new("x", TokenKind::Identifier, Location::new(0, 1, 1)).with_ast_kind(AstKind::Declare).with_variable(x));

        let lit = leaf_number(&mut arena, "5", 2);
        let lhs = arena.push(
            Token::new("x", TokenKind::Identifier, Location::new(0, 2, 1))
                .with_variable(x),
        );
        let assign = arena.push(
            Token::new("=", TokenKind::Operator, Location::new(0, 2, 3))
                .with_ast_kind(AstKind::Assign)
                .with_operands(Some(lhs), Some(lit)),
        );

        let function = Function::new(FunctionId(0), "f", vec![], vec![decl, assign]);
        let engine = Engine::new(Settings::default());
        let flow = engine.run(&arena, &scope, &[function]);

        assert!(flow.value_at(lit).facts().iter().any(|f| matches!(
            f.value,
            crate::value::AbstractValue::Known(crate::value::KnownValue::Int(5))
        )));
    }

    #[test]
    fn declare_with_no_resolved_variable_aborts_the_function_and_records_an_internal_error() {
        // A declare token the parser failed to resolve a variable for is an
        // I1 invariant violation, not a "missing type info" recoverable
        // case — the engine abandons the rest of this function rather than
        // guessing, and the statement after it must never run.
        let mut arena = TokenArena::new();
        let scope = Scope::new();

        let bad_decl =
            arena.push(Token::new("x", TokenKind::Identifier, Location::new(0, 1, 1)).with_ast_kind(AstKind::Declare));
        let never_reached = leaf_number(&mut arena, "7", 2);

        let function = Function::new(FunctionId(0), "f", vec![], vec![bad_decl, never_reached]);
        let engine = Engine::new(Settings::default());
        let flow = engine.run(&arena, &scope, &[function]);

        let errors = flow.internal_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].function, "f");
        assert!(matches!(errors[0].error, EngineError::Internal(_)));
        assert!(flow.value_at(never_reached).facts().is_empty());
    }

    #[test]
    fn declare_without_initializer_is_uninit() {
        let mut arena = TokenArena::new();
        let mut scope = Scope::new();
        let x = scope.declare(Variable::new(VarId(0), "x", VarType::Scalar));
        let decl = arena.push(
            Token::new("x", TokenKind::Identifier, Location::new(0, 1, 1))
                .with_ast_kind(AstKind::Declare)
                .with_variable(x),
        );
        let read = arena.push(Token::new("x", TokenKind::Identifier, Location::new(0, 2, 1)).with_variable(x));
        let ret = arena.push(
            Token::new("return", TokenKind::Keyword, Location::new(0, 2, 1))
                .with_ast_kind(AstKind::Return)
                .with_operands(Some(read), None),
        );

        let function = Function::new(FunctionId(0), "f", vec![], vec![decl, ret]);
        let engine = Engine::new(Settings::default());
        let flow = engine.run(&arena, &scope, &[function]);

        assert!(flow.value_at(read).contains_uninit());
    }
}
