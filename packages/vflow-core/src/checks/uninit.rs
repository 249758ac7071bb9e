//! Uninitialized-variable check (§4.E). Walks each function's body
//! classifying *read-use* positions the same way the value-flow engine's
//! own walk does (mirroring `valueflow::rules`'s `AstKind` dispatch, see
//! that module's doc comment), then asks the already-computed
//! [`FlowResult`] whether `Uninit` survives at that position. The check
//! does no propagation of its own — it is purely a consumer of the engine's
//! value sets plus the syntactic read/write classification spec.md §4.E
//! spells out (sizeof/address-of/plain-assignment-lhs/write-only contexts
//! are not read uses).

use crate::diagnostics::{Certainty, Diagnostic, DiagnosticSink};
use crate::library::{Direction, LibraryFacts};
use crate::model::{AstKind, Function, Location, LocationHint, Scope, SwitchCase, TokenArena, TokenId, VarId};
use crate::valueflow::FlowResult;
use crate::Severity;

struct Ctx<'a> {
    file_name: &'a str,
    tokens: &'a TokenArena,
    scope: &'a Scope,
    flow: &'a FlowResult,
    library: &'a LibraryFacts,
    sink: &'a mut DiagnosticSink,
}

/// Entry point: run the check over every function in the translation unit.
pub fn check(
    file_name: &str,
    tokens: &TokenArena,
    scope: &Scope,
    functions: &[Function],
    flow: &FlowResult,
    library: &LibraryFacts,
    sink: &mut DiagnosticSink,
) {
    let mut ctx = Ctx {
        file_name,
        tokens,
        scope,
        flow,
        library,
        sink,
    };
    for function in functions {
        let mut terminated = false;
        for &stmt in &function.body {
            if terminated {
                break;
            }
            walk_stmt(&mut ctx, stmt, &mut terminated);
        }
    }
}

fn walk_stmt(ctx: &mut Ctx, id: TokenId, terminated: &mut bool) {
    let Some(tok) = ctx.tokens.get(id) else { return };
    match tok.ast_kind.clone() {
        AstKind::Declare => {
            if let Some(init) = tok.ast_operand2 {
                walk_read_expr(ctx, init);
            }
        }
        AstKind::Assign => walk_assign(ctx, id),
        AstKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            walk_read_expr(ctx, condition);
            let mut then_terminated = false;
            for &s in &then_branch {
                if then_terminated {
                    break;
                }
                walk_stmt(ctx, s, &mut then_terminated);
            }
            let mut else_terminated = false;
            for &s in &else_branch {
                if else_terminated {
                    break;
                }
                walk_stmt(ctx, s, &mut else_terminated);
            }
            *terminated = then_terminated && else_terminated;
        }
        AstKind::Loop { condition, body, .. } => {
            if let Some(c) = condition {
                walk_read_expr(ctx, c);
            }
            let mut body_terminated = false;
            for &s in &body {
                if body_terminated {
                    break;
                }
                walk_stmt(ctx, s, &mut body_terminated);
            }
        }
        AstKind::Switch { scrutinee, cases } => {
            walk_read_expr(ctx, scrutinee);
            walk_switch_cases(ctx, &cases);
        }
        AstKind::Call { .. } => walk_read_expr(ctx, id),
        kind if super_ast_kind_is_jump(&kind) => {
            if let Some(op) = tok.ast_operand1 {
                walk_read_expr(ctx, op);
            }
            *terminated = true;
        }
        _ => walk_read_expr(ctx, id),
    }
}

fn walk_switch_cases(ctx: &mut Ctx, cases: &[SwitchCase]) {
    for case in cases {
        let mut case_terminated = false;
        for &s in &case.body {
            if case_terminated {
                break;
            }
            walk_stmt(ctx, s, &mut case_terminated);
        }
    }
}

fn super_ast_kind_is_jump(kind: &AstKind) -> bool {
    matches!(
        kind,
        AstKind::Return | AstKind::Break | AstKind::Continue | AstKind::Goto | AstKind::Throw | AstKind::NoreturnCall
    )
}

fn walk_assign(ctx: &mut Ctx, id: TokenId) {
    let Some(tok) = ctx.tokens.get(id) else { return };
    let (lhs, rhs) = (tok.ast_operand1, tok.ast_operand2);
    if let Some(rhs) = rhs {
        walk_read_expr(ctx, rhs);
    }
    if let Some(lhs) = lhs {
        // A plain `x = ...` target is a write, not a read (state machine
        // §4.E row "assigned" always lands on Defined regardless of prior
        // state). `*p = ...` / `p[i] = ...` / `p->m = ...` still read the
        // pointer `p` itself to compute the address being written through.
        if let Some(base) = crate::checks::base_pointer_of(ctx.tokens, lhs) {
            walk_read_expr(ctx, base);
        }
    }
}

fn walk_read_expr(ctx: &mut Ctx, id: TokenId) {
    let Some(tok) = ctx.tokens.get(id) else { return };
    match tok.ast_kind.clone() {
        AstKind::Leaf => {
            if tok.write_only_context {
                return;
            }
            if let Some(var) = tok.variable {
                check_variable_read(ctx, id, var);
            }
        }
        AstKind::NullLiteral | AstKind::SizeofKnownType => {}
        AstKind::AddressOf => {
            // Not a read use on its own (§4.E). Only becomes one when this
            // AddressOf is immediately a call argument the library marks as
            // reading the pointee; that case is handled entirely in
            // `walk_call_args`, which never delegates back into this arm.
        }
        AstKind::Deref => {
            if let Some(base) = tok.ast_operand1 {
                walk_read_expr(ctx, base);
            }
            check_heap_read(ctx, id);
        }
        AstKind::Index => {
            if let Some(base) = tok.ast_operand1 {
                walk_read_expr(ctx, base);
            }
            if let Some(idx) = tok.ast_operand2 {
                walk_read_expr(ctx, idx);
            }
            check_heap_read(ctx, id);
        }
        AstKind::MemberAccess { via_arrow } => {
            if via_arrow {
                if let Some(base) = tok.ast_operand1 {
                    walk_read_expr(ctx, base);
                }
                check_heap_read(ctx, id);
            }
            if let Some(member) = tok.variable {
                check_member_read(ctx, id, member);
            }
        }
        AstKind::Ternary {
            condition,
            then_expr,
            else_expr,
        } => {
            walk_read_expr(ctx, condition);
            walk_read_expr(ctx, then_expr);
            walk_read_expr(ctx, else_expr);
        }
        AstKind::LogicalAnd | AstKind::LogicalOr => {
            if let Some(o) = tok.ast_operand1 {
                walk_read_expr(ctx, o);
            }
            if let Some(o) = tok.ast_operand2 {
                walk_read_expr(ctx, o);
            }
        }
        AstKind::LogicalNot => {
            if let Some(o) = tok.ast_operand1 {
                walk_read_expr(ctx, o);
            }
        }
        AstKind::Compare { .. } | AstKind::PointerArith { .. } => {
            if let Some(o) = tok.ast_operand1 {
                walk_read_expr(ctx, o);
            }
            if let Some(o) = tok.ast_operand2 {
                walk_read_expr(ctx, o);
            }
        }
        AstKind::Call { args } => walk_call_args(ctx, id, &args),
        AstKind::Assign => walk_assign(ctx, id),
        _ => {}
    }
}

fn walk_call_args(ctx: &mut Ctx, call: TokenId, args: &[TokenId]) {
    let callee = callee_name(ctx.tokens, call).unwrap_or_default();
    for (i, &arg) in args.iter().enumerate() {
        let facts = ctx.library.argument_facts(&callee, i as u32);
        if facts.direction == Direction::Out {
            // A write-context use: taking `&x` here defines `x`, it never
            // reads it, even if `x` was uninitialized a moment ago.
            continue;
        }
        // in / inout / unknown: the callee reads through this argument.
        match ctx.tokens.get(arg).map(|t| t.ast_kind.clone()) {
            Some(AstKind::AddressOf) => {
                if let Some(inner) = ctx.tokens.get(arg).and_then(|t| t.ast_operand1) {
                    walk_read_expr(ctx, inner);
                }
            }
            _ => walk_read_expr(ctx, arg),
        }
    }
}

fn callee_name(tokens: &TokenArena, call: TokenId) -> Option<String> {
    let tok = tokens.get(call)?;
    let AstKind::Call { .. } = tok.ast_kind else {
        return None;
    };
    let callee = tok.ast_operand1?;
    tokens.get(callee).map(|t| t.text.clone())
}

fn check_variable_read(ctx: &mut Ctx, id: TokenId, var: VarId) {
    if let Some(variable) = ctx.scope.get(var) {
        if variable.is_aggregate() {
            let members = variable.members.clone();
            let agg_name = variable.name.clone();
            for member in members {
                if ctx.flow.last_value_of(member).contains_uninit() {
                    let member_name = ctx
                        .scope
                        .get(member)
                        .map(|v| v.name.clone())
                        .unwrap_or_else(|| "<member>".to_string());
                    emit_struct_member(ctx, id, &agg_name, &member_name);
                    return;
                }
            }
            return;
        }
        if ctx.flow.value_at(id).contains_uninit() {
            emit_uninitvar(ctx, id, &variable.name);
        }
    }
}

fn check_member_read(ctx: &mut Ctx, id: TokenId, member: VarId) {
    if ctx.flow.value_at(id).contains_uninit() {
        let member_name = ctx.scope.get(member).map(|v| v.name.clone()).unwrap_or_else(|| "<member>".to_string());
        emit_struct_member(ctx, id, "", &member_name);
    }
}

fn check_heap_read(ctx: &mut Ctx, id: TokenId) {
    if ctx.flow.is_heap_uninit_read(id) {
        emit_uninitdata(ctx, id);
    }
}

fn emit_uninitvar(ctx: &mut Ctx, id: TokenId, name: &str) {
    let loc = crate::checks::loc_of(ctx.tokens, id);
    let hop = LocationHint::new(loc, ctx.file_name, format!("'{name}' is read here"));
    ctx.sink.emit(
        Diagnostic::new(
            "uninitvar",
            Severity::Warning,
            Certainty::Normal,
            format!("Uninitialized variable: {name}"),
            format!("Using uninitialized variable: {name}"),
            vec![hop],
        )
        .with_cwe(457),
    );
}

fn emit_struct_member(ctx: &mut Ctx, id: TokenId, agg_name: &str, member_name: &str) {
    let loc = crate::checks::loc_of(ctx.tokens, id);
    let dotted = if agg_name.is_empty() {
        member_name.to_string()
    } else {
        format!("{agg_name}.{member_name}")
    };
    let hop = LocationHint::new(loc, ctx.file_name, format!("'{dotted}' is read here"));
    ctx.sink.emit(
        Diagnostic::new(
            "uninitStructMember",
            Severity::Warning,
            Certainty::Normal,
            format!("Uninitialized struct member: {dotted}"),
            format!("Using uninitialized struct member: {dotted}"),
            vec![hop],
        )
        .with_cwe(457),
    );
}

fn emit_uninitdata(ctx: &mut Ctx, id: TokenId) {
    let loc = crate::checks::loc_of(ctx.tokens, id);
    let hop = LocationHint::new(loc, ctx.file_name, "memory read here");
    ctx.sink.emit(
        Diagnostic::new(
            "uninitdata",
            Severity::Warning,
            Certainty::Normal,
            "Memory is allocated but not initialized",
            "Memory is allocated but not initialized: reading through a pointer from malloc/realloc before it was written",
            vec![hop],
        )
        .with_cwe(457),
    );
}
