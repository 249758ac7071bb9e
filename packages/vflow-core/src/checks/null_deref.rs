//! Null-pointer-dereference check (§4.F). Two things are reported here:
//!
//! - a deref site whose pointer value set contains `Null`, or pointer
//!   arithmetic on a pointer whose value set contains `Null`;
//! - the "redundant condition vs. possible deref" pattern: a pointer is
//!   dereferenced *and*, somewhere else in the same function, tested with
//!   `if (p)`/`if (p != nullptr)` (or the negated forms). Seeing both in one
//!   function is itself the signal cppcheck's check is named for — it does
//!   not require the deref to be proven-null first, since the presence of
//!   the later guard is the evidence the author thought `p` could be null.
//!
//! Guarding is tracked with a small boolean "known non-null on this path"
//! set threaded through the tree the same shape as `valueflow::rules`'s
//! `Env`, but carrying only that one bit instead of a full value lattice —
//! this check only ever needs "has a guard already fired on this path",
//! never the rest of the lattice.

use crate::diagnostics::{Certainty, Diagnostic, DiagnosticSink};
use crate::model::{ArithOp, AstKind, CompareOp, Function, LocationHint, Scope, SwitchCase, TokenArena, TokenId, VarId};
use crate::valueflow::FlowResult;
use crate::Severity;
use rustc_hash::{FxHashMap, FxHashSet};

struct Ctx<'a> {
    file_name: &'a str,
    tokens: &'a TokenArena,
    flow: &'a FlowResult,
    sink: &'a mut DiagnosticSink,
    /// Every `if (p)`-shaped condition location seen anywhere in the
    /// current function, keyed by the tested variable. Collected in a
    /// first pass so the second (reporting) pass can link a deref to a
    /// guard regardless of source order in either direction.
    guard_sites: FxHashMap<VarId, TokenId>,
}

pub fn check(file_name: &str, tokens: &TokenArena, _scope: &Scope, functions: &[Function], flow: &FlowResult, sink: &mut DiagnosticSink) {
    let mut ctx = Ctx {
        file_name,
        tokens,
        flow,
        sink,
        guard_sites: FxHashMap::default(),
    };
    for function in functions {
        ctx.guard_sites = collect_guard_sites(tokens, &function.body);
        let mut guarded = FxHashSet::default();
        let mut terminated = false;
        for &stmt in &function.body {
            if terminated {
                break;
            }
            walk_stmt(&mut ctx, stmt, &mut guarded, &mut terminated);
        }
    }
}

/// First pass: record every guard condition's location per variable, so the
/// redundant-condition diagnostic can fire regardless of whether the guard
/// textually precedes or follows the deref.
fn collect_guard_sites(tokens: &TokenArena, stmts: &[TokenId]) -> FxHashMap<VarId, TokenId> {
    let mut sites = FxHashMap::default();
    collect_guard_sites_into(tokens, stmts, &mut sites);
    sites
}

fn collect_guard_sites_into(tokens: &TokenArena, stmts: &[TokenId], sites: &mut FxHashMap<VarId, TokenId>) {
    for &stmt in stmts {
        let Some(tok) = tokens.get(stmt) else { continue };
        match &tok.ast_kind {
            AstKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                record_condition_guard(tokens, *condition, sites);
                collect_guard_sites_into(tokens, then_branch, sites);
                collect_guard_sites_into(tokens, else_branch, sites);
            }
            AstKind::Loop { condition, body, .. } => {
                if let Some(c) = condition {
                    record_condition_guard(tokens, *c, sites);
                }
                collect_guard_sites_into(tokens, body, sites);
            }
            AstKind::Switch { cases, .. } => {
                for case in cases {
                    collect_guard_sites_into(tokens, &case.body, sites);
                }
            }
            _ => {}
        }
    }
}

fn record_condition_guard(tokens: &TokenArena, cond: TokenId, sites: &mut FxHashMap<VarId, TokenId>) {
    if let Some(var) = classified_var(tokens, cond) {
        sites.entry(var).or_insert(cond);
    }
}

/// If `cond` is one of the shapes the engine's own refinement rule (§4.D
/// rule 5) recognizes (`p`, `!p`, `p == NULL`, `p != NULL`, `p == 0`, `p !=
/// 0`), return the tested variable.
fn classified_var(tokens: &TokenArena, cond: TokenId) -> Option<VarId> {
    let tok = tokens.get(cond)?;
    match &tok.ast_kind {
        AstKind::Leaf => tok.variable,
        AstKind::LogicalNot => tok.ast_operand1.and_then(|inner| leaf_var(tokens, inner)),
        AstKind::Compare { .. } => {
            let op1 = tok.ast_operand1.and_then(|id| leaf_var(tokens, id));
            let op2 = tok.ast_operand2.and_then(|id| leaf_var(tokens, id));
            op1.or(op2)
        }
        _ => None,
    }
}

fn leaf_var(tokens: &TokenArena, id: TokenId) -> Option<VarId> {
    let tok = tokens.get(id)?;
    match tok.ast_kind {
        AstKind::Leaf => tok.variable,
        _ => None,
    }
}

/// Whether `cond`'s true branch proves the named variable non-null, and
/// which variable (if any) that is — the same classification
/// `valueflow::refine` performs during propagation, duplicated here in
/// boolean-only form since this check doesn't have access to the engine's
/// internal `Env`.
enum Effect {
    NonNullWhenTrue(VarId),
    NonNullWhenFalse(VarId),
    None,
}

fn classify(tokens: &TokenArena, cond: TokenId) -> Effect {
    let Some(tok) = tokens.get(cond) else { return Effect::None };
    match &tok.ast_kind {
        AstKind::Leaf => tok.variable.map(Effect::NonNullWhenTrue).unwrap_or(Effect::None),
        AstKind::LogicalNot => tok
            .ast_operand1
            .and_then(|inner| leaf_var(tokens, inner))
            .map(Effect::NonNullWhenFalse)
            .unwrap_or(Effect::None),
        AstKind::Compare { op } => {
            let is_null_rhs = is_null_literal(tokens, tok.ast_operand2);
            let is_null_lhs = is_null_literal(tokens, tok.ast_operand1);
            let var = if is_null_rhs {
                tok.ast_operand1.and_then(|id| leaf_var(tokens, id))
            } else if is_null_lhs {
                tok.ast_operand2.and_then(|id| leaf_var(tokens, id))
            } else {
                None
            };
            match (var, op) {
                (Some(v), CompareOp::Eq) => Effect::NonNullWhenFalse(v),
                (Some(v), CompareOp::Ne) => Effect::NonNullWhenTrue(v),
                (None, _) => Effect::None,
            }
        }
        _ => Effect::None,
    }
}

fn is_null_literal(tokens: &TokenArena, id: Option<TokenId>) -> bool {
    match id.and_then(|id| tokens.get(id)) {
        Some(tok) => matches!(tok.ast_kind, AstKind::NullLiteral) || (tok.text == "0" && matches!(tok.ast_kind, AstKind::Leaf)),
        None => false,
    }
}

fn apply(effect: &Effect, guarded: &mut FxHashSet<VarId>, true_side: bool) {
    match *effect {
        Effect::NonNullWhenTrue(v) if true_side => {
            guarded.insert(v);
        }
        Effect::NonNullWhenFalse(v) if !true_side => {
            guarded.insert(v);
        }
        _ => {}
    }
}

fn walk_stmt(ctx: &mut Ctx, id: TokenId, guarded: &mut FxHashSet<VarId>, terminated: &mut bool) {
    let Some(tok) = ctx.tokens.get(id) else { return };
    match tok.ast_kind.clone() {
        AstKind::Declare => {
            if let Some(init) = tok.ast_operand2 {
                walk_expr(ctx, init, guarded);
            }
        }
        AstKind::Assign => walk_assign(ctx, id, guarded),
        AstKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            walk_expr(ctx, condition, guarded);
            let effect = classify(ctx.tokens, condition);

            let mut then_guarded = guarded.clone();
            apply(&effect, &mut then_guarded, true);
            let mut else_guarded = guarded.clone();
            apply(&effect, &mut else_guarded, false);

            let mut then_terminated = false;
            for &s in &then_branch {
                if then_terminated {
                    break;
                }
                walk_stmt(ctx, s, &mut then_guarded, &mut then_terminated);
            }
            let mut else_terminated = false;
            for &s in &else_branch {
                if else_terminated {
                    break;
                }
                walk_stmt(ctx, s, &mut else_guarded, &mut else_terminated);
            }

            if then_terminated && else_terminated {
                *terminated = true;
            } else if then_terminated {
                *guarded = else_guarded;
            } else if else_terminated {
                *guarded = then_guarded;
            } else {
                *guarded = then_guarded.intersection(&else_guarded).copied().collect();
            }
        }
        AstKind::Loop { condition, body, .. } => {
            if let Some(c) = condition {
                walk_expr(ctx, c, guarded);
            }
            let mut body_guarded = guarded.clone();
            let mut body_terminated = false;
            for &s in &body {
                if body_terminated {
                    break;
                }
                walk_stmt(ctx, s, &mut body_guarded, &mut body_terminated);
            }
        }
        AstKind::Switch { scrutinee, cases } => {
            walk_expr(ctx, scrutinee, guarded);
            walk_switch_cases(ctx, &cases, guarded);
        }
        AstKind::Call { .. } => walk_expr(ctx, id, guarded),
        kind if is_jump(&kind) => {
            if let Some(op) = tok.ast_operand1 {
                walk_expr(ctx, op, guarded);
            }
            *terminated = true;
        }
        _ => walk_expr(ctx, id, guarded),
    }
}

fn walk_switch_cases(ctx: &mut Ctx, cases: &[SwitchCase], guarded: &FxHashSet<VarId>) {
    for case in cases {
        let mut case_guarded = guarded.clone();
        let mut case_terminated = false;
        for &s in &case.body {
            if case_terminated {
                break;
            }
            walk_stmt(ctx, s, &mut case_guarded, &mut case_terminated);
        }
    }
}

fn is_jump(kind: &AstKind) -> bool {
    matches!(
        kind,
        AstKind::Return | AstKind::Break | AstKind::Continue | AstKind::Goto | AstKind::Throw | AstKind::NoreturnCall
    )
}

fn walk_assign(ctx: &mut Ctx, id: TokenId, guarded: &mut FxHashSet<VarId>) {
    let Some(tok) = ctx.tokens.get(id) else { return };
    let (lhs, rhs) = (tok.ast_operand1, tok.ast_operand2);
    if let Some(rhs) = rhs {
        walk_expr(ctx, rhs, guarded);
    }
    if let Some(lhs) = lhs {
        if let Some(base) = crate::checks::base_pointer_of(ctx.tokens, lhs) {
            walk_deref_base(ctx, lhs, base, guarded);
        }
        // A fresh assignment to a plain pointer variable invalidates any
        // previously-proven guard for it; it is re-checked fresh.
        if let Some(var) = ctx.tokens.get(lhs).and_then(|t| match t.ast_kind {
            AstKind::Leaf => t.variable,
            _ => None,
        }) {
            guarded.remove(&var);
        }
    }
}

fn walk_expr(ctx: &mut Ctx, id: TokenId, guarded: &mut FxHashSet<VarId>) {
    let Some(tok) = ctx.tokens.get(id) else { return };
    match tok.ast_kind.clone() {
        AstKind::Leaf | AstKind::NullLiteral | AstKind::SizeofKnownType | AstKind::AddressOf => {}
        AstKind::Deref => {
            if let Some(base) = tok.ast_operand1 {
                walk_expr(ctx, base, guarded);
                walk_deref_base(ctx, id, base, guarded);
            }
        }
        AstKind::Index => {
            if let Some(base) = tok.ast_operand1 {
                walk_expr(ctx, base, guarded);
                walk_deref_base(ctx, id, base, guarded);
            }
            if let Some(idx) = tok.ast_operand2 {
                walk_expr(ctx, idx, guarded);
            }
        }
        AstKind::MemberAccess { via_arrow } => {
            if via_arrow {
                if let Some(base) = tok.ast_operand1 {
                    walk_expr(ctx, base, guarded);
                    walk_deref_base(ctx, id, base, guarded);
                }
            }
        }
        AstKind::PointerArith { op } => {
            if let Some(base) = tok.ast_operand1 {
                walk_expr(ctx, base, guarded);
                walk_arith_base(ctx, id, base, op, guarded);
            }
            if let Some(o) = tok.ast_operand2 {
                walk_expr(ctx, o, guarded);
            }
        }
        AstKind::Ternary {
            condition,
            then_expr,
            else_expr,
        } => {
            walk_expr(ctx, condition, guarded);
            let effect = classify(ctx.tokens, condition);
            let mut then_guarded = guarded.clone();
            apply(&effect, &mut then_guarded, true);
            let mut else_guarded = guarded.clone();
            apply(&effect, &mut else_guarded, false);
            walk_expr(ctx, then_expr, &mut then_guarded);
            walk_expr(ctx, else_expr, &mut else_guarded);
        }
        AstKind::LogicalAnd => {
            // `p && *p`: the right operand only runs once the left has
            // proven true, so its guard applies there.
            if let Some(left) = tok.ast_operand1 {
                walk_expr(ctx, left, guarded);
                let effect = classify(ctx.tokens, left);
                let mut right_guarded = guarded.clone();
                apply(&effect, &mut right_guarded, true);
                if let Some(right) = tok.ast_operand2 {
                    walk_expr(ctx, right, &mut right_guarded);
                }
            }
        }
        AstKind::LogicalOr => {
            if let Some(left) = tok.ast_operand1 {
                walk_expr(ctx, left, guarded);
                let effect = classify(ctx.tokens, left);
                let mut right_guarded = guarded.clone();
                apply(&effect, &mut right_guarded, false);
                if let Some(right) = tok.ast_operand2 {
                    walk_expr(ctx, right, &mut right_guarded);
                }
            }
        }
        AstKind::LogicalNot => {
            if let Some(o) = tok.ast_operand1 {
                walk_expr(ctx, o, guarded);
            }
        }
        AstKind::Compare { .. } => {
            if let Some(o) = tok.ast_operand1 {
                walk_expr(ctx, o, guarded);
            }
            if let Some(o) = tok.ast_operand2 {
                walk_expr(ctx, o, guarded);
            }
        }
        AstKind::Call { args } => {
            for arg in args {
                walk_expr(ctx, arg, guarded);
            }
        }
        AstKind::Assign => walk_assign(ctx, id, guarded),
        _ => {}
    }
}

fn walk_deref_base(ctx: &mut Ctx, site: TokenId, base: TokenId, guarded: &FxHashSet<VarId>) {
    let Some(var) = leaf_var(ctx.tokens, base) else { return };
    if guarded.contains(&var) {
        return;
    }
    if let Some(&guard_loc) = ctx.guard_sites.get(&var) {
        emit_redundant_condition(ctx, site, guard_loc);
        return;
    }
    if ctx.flow.value_at(base).contains_null() {
        emit_null_pointer(ctx, site);
    }
}

fn walk_arith_base(ctx: &mut Ctx, site: TokenId, base: TokenId, _op: ArithOp, guarded: &FxHashSet<VarId>) {
    let Some(var) = leaf_var(ctx.tokens, base) else { return };
    if guarded.contains(&var) {
        return;
    }
    if ctx.flow.value_at(base).contains_null() || ctx.guard_sites.contains_key(&var) {
        emit_pointer_arith_null(ctx, site);
    }
}

fn emit_null_pointer(ctx: &mut Ctx, site: TokenId) {
    let loc = crate::checks::loc_of(ctx.tokens, site);
    let hop = LocationHint::new(loc, ctx.file_name, "pointer dereferenced here");
    ctx.sink.emit(
        Diagnostic::new(
            "nullPointer",
            Severity::Error,
            Certainty::Normal,
            "Null pointer dereference",
            "Possible null pointer dereference",
            vec![hop],
        )
        .with_cwe(476),
    );
}

fn emit_redundant_condition(ctx: &mut Ctx, site: TokenId, guard_loc: TokenId) {
    let deref_loc = crate::checks::loc_of(ctx.tokens, site);
    let cond_loc = crate::checks::loc_of(ctx.tokens, guard_loc);
    let call_stack = vec![
        LocationHint::new(deref_loc, ctx.file_name, "pointer dereferenced here"),
        LocationHint::new(cond_loc, ctx.file_name, "condition is redundant or deref above is unsafe"),
    ];
    ctx.sink.emit(
        Diagnostic::new(
            "nullPointer",
            Severity::Warning,
            Certainty::Normal,
            "Either the condition is redundant or there is a possible null pointer dereference",
            "Either the condition 'p' is redundant or there is possible null pointer dereference",
            call_stack,
        )
        .with_cwe(476),
    );
}

fn emit_pointer_arith_null(ctx: &mut Ctx, site: TokenId) {
    let loc = crate::checks::loc_of(ctx.tokens, site);
    let hop = LocationHint::new(loc, ctx.file_name, "pointer arithmetic here");
    ctx.sink.emit(
        Diagnostic::new(
            "pointerArithNull",
            Severity::Warning,
            Certainty::Normal,
            "Pointer arithmetic with NULL pointer",
            "Pointer arithmetic performed on a pointer that may be NULL",
            vec![hop],
        )
        .with_cwe(476),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::model::{Function, FunctionId, Location, Scope, Token, TokenKind, VarType, Variable};
    use crate::valueflow::Engine;

    fn run_check(tokens: &TokenArena, scope: &Scope, functions: &[Function]) -> Vec<Diagnostic> {
        let settings = Settings::default();
        let engine = Engine::new(settings.clone());
        let flow = engine.run(tokens, scope, functions);
        let mut sink = DiagnosticSink::new(settings);
        check("f.c", tokens, scope, functions, &flow, &mut sink);
        sink.into_diagnostics()
    }

    #[test]
    fn s2_deref_then_guard_is_redundant_condition() {
        // void f(int*p){ *p=0; if(p){} }
        let mut arena = TokenArena::new();
        let mut scope = Scope::new();
        let p = scope.declare(Variable::new(VarId(0), "p", VarType::Pointer).as_param(0));

        let lit0 = arena.push(Token::new("0", TokenKind::NumberLiteral, Location::new(0, 1, 6)));
        let p_ref1 = arena.push(Token::new("p", TokenKind::Identifier, Location::new(0, 1, 2)).with_variable(p));
        let deref = arena.push(
            Token::new("*", TokenKind::Operator, Location::new(0, 1, 1))
                .with_ast_kind(AstKind::Deref)
                .with_operands(Some(p_ref1), None),
        );
        let assign = arena.push(
            Token::new("=", TokenKind::Operator, Location::new(0, 1, 4))
                .with_ast_kind(AstKind::Assign)
                .with_operands(Some(deref), Some(lit0)),
        );
        let p_ref2 = arena.push(Token::new("p", TokenKind::Identifier, Location::new(0, 1, 10)).with_variable(p));
        let if_tok = arena.push(
            Token::new("if", TokenKind::Keyword, Location::new(0, 1, 7)).with_ast_kind(AstKind::If {
                condition: p_ref2,
                then_branch: vec![],
                else_branch: vec![],
            }),
        );

        let function = Function::new(FunctionId(0), "f", vec![p], vec![assign, if_tok]);
        let diags = run_check(&arena, &scope, &[function]);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].id, "nullPointer");
        assert_eq!(diags[0].call_stack.len(), 2);
    }

    #[test]
    fn s6_guard_then_deref_is_clean() {
        // int f(int*p){ if(!p) return 0; return *p; }
        let mut arena = TokenArena::new();
        let mut scope = Scope::new();
        let p = scope.declare(Variable::new(VarId(0), "p", VarType::Pointer).as_param(0));

        let p_ref1 = arena.push(Token::new("p", TokenKind::Identifier, Location::new(0, 1, 8)).with_variable(p));
        let not_p = arena.push(
            Token::new("!", TokenKind::Operator, Location::new(0, 1, 7))
                .with_ast_kind(AstKind::LogicalNot)
                .with_operands(Some(p_ref1), None),
        );
        let lit0 = arena.push(Token::new("0", TokenKind::NumberLiteral, Location::new(0, 1, 19)));
        let ret0 = arena.push(
            Token::new("return", TokenKind::Keyword, Location::new(0, 1, 12))
                .with_ast_kind(AstKind::Return)
                .with_operands(Some(lit0), None),
        );
        let if_tok = arena.push(
            Token::new("if", TokenKind::Keyword, Location::new(0, 1, 1)).with_ast_kind(AstKind::If {
                condition: not_p,
                then_branch: vec![ret0],
                else_branch: vec![],
            }),
        );

        let p_ref2 = arena.push(Token::new("p", TokenKind::Identifier, Location::new(0, 2, 9)).with_variable(p));
        let deref = arena.push(
            Token::new("*", TokenKind::Operator, Location::new(0, 2, 8))
                .with_ast_kind(AstKind::Deref)
                .with_operands(Some(p_ref2), None),
        );
        let ret_deref = arena.push(
            Token::new("return", TokenKind::Keyword, Location::new(0, 2, 1))
                .with_ast_kind(AstKind::Return)
                .with_operands(Some(deref), None),
        );

        let function = Function::new(FunctionId(0), "f", vec![p], vec![if_tok, ret_deref]);
        let diags = run_check(&arena, &scope, &[function]);
        assert!(diags.is_empty());
    }

    #[test]
    fn literal_null_deref_fires_plain_diagnostic() {
        // void f(){ int*p=0; *p=1; }  -- no guard anywhere in the function.
        let mut arena = TokenArena::new();
        let mut scope = Scope::new();
        let p = scope.declare(Variable::new(VarId(0), "p", VarType::Pointer));

        let null_lit = arena.push(Token::new("0", TokenKind::NumberLiteral, Location::new(0, 1, 6)).with_ast_kind(AstKind::NullLiteral));
        let decl = arena.push(
            Token::new("p", TokenKind::Identifier, Location::new(0, 1, 1))
                .with_ast_kind(AstKind::Declare)
                .with_variable(p)
                .with_operands(None, Some(null_lit)),
        );
        let p_ref = arena.push(Token::new("p", TokenKind::Identifier, Location::new(0, 2, 2)).with_variable(p));
        let deref = arena.push(
            Token::new("*", TokenKind::Operator, Location::new(0, 2, 1))
                .with_ast_kind(AstKind::Deref)
                .with_operands(Some(p_ref), None),
        );
        let lit1 = arena.push(Token::new("1", TokenKind::NumberLiteral, Location::new(0, 2, 5)));
        let assign = arena.push(
            Token::new("=", TokenKind::Operator, Location::new(0, 2, 4))
                .with_ast_kind(AstKind::Assign)
                .with_operands(Some(deref), Some(lit1)),
        );

        let function = Function::new(FunctionId(0), "f", vec![], vec![decl, assign]);
        let diags = run_check(&arena, &scope, &[function]);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].id, "nullPointer");
        assert_eq!(diags[0].call_stack.len(), 1);
    }
}
