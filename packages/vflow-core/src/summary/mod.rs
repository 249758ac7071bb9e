//! Per-translation-unit file info (§4.G): the summary the CTU join pass
//! (`ctu`) consumes. Pure function of the token stream and the already
//! computed [`FlowResult`] — running this twice over the same tokens
//! produces an identical summary (I6), which is what lets the CTU wire
//! format round-trip (P4) and what `ctu::join` relies on for determinism.

use crate::library::{Direction, LibraryFacts};
use crate::model::{AstKind, Function, Location, Scope, TokenArena, TokenId, VarId};
use crate::valueflow::FlowResult;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// What an [`UnsafeUsage`] requires of the caller's argument for the CTU
/// join to consider it dangerous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsagePayload {
    RequiresNonNull,
    RequiresInitialized,
}

/// A parameter use inside this function that the value-flow result shows
/// was never locally guarded or reassigned before the use — so a caller's
/// dangerous argument value flows straight to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsafeUsage {
    pub check_id: String,
    pub argument_index: u32,
    pub parameter_name: String,
    pub location: Location,
    pub payload: UsagePayload,
}

/// The abstract value an argument expression carries at a call site, as far
/// as this TU alone can tell. `ForwardedParam` covers the case where the
/// argument is simply one of the *current* function's own parameters passed
/// on unmodified — the CTU join chases these across the depth bound to
/// support forwarding call chains (§4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallArgValue {
    Null,
    Uninit,
    Known(i64),
    ForwardedParam(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFact {
    pub callee_name: String,
    pub argument_index: u32,
    pub value: CallArgValue,
    pub location: Location,
    /// Locations of the conditions the value's path passed through to reach
    /// this call, oldest first. Empty when the value holds unconditionally.
    pub path_preamble: Vec<Location>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionSummary {
    pub function_name: String,
    pub unsafe_usages: Vec<UnsafeUsage>,
    pub call_facts: Vec<CallFact>,
}

/// The complete per-TU summary handed to the CTU join pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub functions: Vec<FunctionSummary>,
}

impl FileInfo {
    pub fn build(tokens: &TokenArena, scope: &Scope, functions: &[Function], flow: &FlowResult, library: &LibraryFacts) -> Self {
        let summaries = functions
            .iter()
            .map(|f| build_function_summary(tokens, scope, f, flow, library))
            .collect();
        FileInfo { functions: summaries }
    }
}

fn build_function_summary(tokens: &TokenArena, scope: &Scope, function: &Function, flow: &FlowResult, library: &LibraryFacts) -> FunctionSummary {
    let mut usages = Vec::new();
    let mut facts = Vec::new();
    let mut cleared = FxHashSet::default();
    let mut terminated = false;
    for &stmt in &function.body {
        if terminated {
            break;
        }
        walk_stmt(tokens, scope, function, flow, library, stmt, &mut cleared, &mut terminated, &mut usages, &mut facts);
    }
    FunctionSummary {
        function_name: function.name.clone(),
        unsafe_usages: usages,
        call_facts: facts,
    }
}

#[allow(clippy::too_many_arguments)]
fn walk_stmt(
    tokens: &TokenArena,
    scope: &Scope,
    function: &Function,
    flow: &FlowResult,
    library: &LibraryFacts,
    id: TokenId,
    cleared: &mut FxHashSet<VarId>,
    terminated: &mut bool,
    usages: &mut Vec<UnsafeUsage>,
    facts: &mut Vec<CallFact>,
) {
    let Some(tok) = tokens.get(id) else { return };
    match tok.ast_kind.clone() {
        AstKind::Declare => {
            if let Some(init) = tok.ast_operand2 {
                walk_expr(tokens, scope, function, flow, library, init, cleared, usages, facts);
            }
        }
        AstKind::Assign => walk_assign(tokens, scope, function, flow, library, id, cleared, usages, facts),
        AstKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            walk_expr(tokens, scope, function, flow, library, condition, cleared, usages, facts);
            let effect = classify_guard(tokens, condition);

            let mut then_cleared = cleared.clone();
            apply_guard(&effect, &mut then_cleared, true);
            let mut else_cleared = cleared.clone();
            apply_guard(&effect, &mut else_cleared, false);

            let mut then_terminated = false;
            for &s in &then_branch {
                if then_terminated {
                    break;
                }
                walk_stmt(tokens, scope, function, flow, library, s, &mut then_cleared, &mut then_terminated, usages, facts);
            }

            let mut else_terminated = false;
            for &s in &else_branch {
                if else_terminated {
                    break;
                }
                walk_stmt(tokens, scope, function, flow, library, s, &mut else_cleared, &mut else_terminated, usages, facts);
            }

            if then_terminated && else_terminated {
                *terminated = true;
            } else if then_terminated {
                *cleared = else_cleared;
            } else if else_terminated {
                *cleared = then_cleared;
            } else {
                *cleared = then_cleared.intersection(&else_cleared).copied().collect();
            }
        }
        AstKind::Loop { condition, body, .. } => {
            if let Some(c) = condition {
                walk_expr(tokens, scope, function, flow, library, c, cleared, usages, facts);
            }
            let mut body_cleared = cleared.clone();
            let mut body_terminated = false;
            for &s in &body {
                if body_terminated {
                    break;
                }
                walk_stmt(tokens, scope, function, flow, library, s, &mut body_cleared, &mut body_terminated, usages, facts);
            }
        }
        AstKind::Switch { scrutinee, cases } => {
            walk_expr(tokens, scope, function, flow, library, scrutinee, cleared, usages, facts);
            for case in &cases {
                let mut case_cleared = cleared.clone();
                let mut case_terminated = false;
                for &s in &case.body {
                    if case_terminated {
                        break;
                    }
                    walk_stmt(tokens, scope, function, flow, library, s, &mut case_cleared, &mut case_terminated, usages, facts);
                }
            }
        }
        AstKind::Call { .. } => walk_expr(tokens, scope, function, flow, library, id, cleared, usages, facts),
        kind if is_jump(&kind) => {
            if let Some(op) = tok.ast_operand1 {
                walk_expr(tokens, scope, function, flow, library, op, cleared, usages, facts);
            }
            *terminated = true;
        }
        _ => walk_expr(tokens, scope, function, flow, library, id, cleared, usages, facts),
    }
}

/// Which variable (if any) a condition proves non-null, and on which
/// branch — the same boolean-only classification `checks::null_deref` uses,
/// duplicated here since this module tracks "cleared" (guarded-or-written)
/// rather than "guarded" alone.
enum GuardEffect {
    NonNullWhenTrue(VarId),
    NonNullWhenFalse(VarId),
    None,
}

fn classify_guard(tokens: &TokenArena, cond: TokenId) -> GuardEffect {
    let Some(tok) = tokens.get(cond) else { return GuardEffect::None };
    match &tok.ast_kind {
        AstKind::Leaf => tok.variable.map(GuardEffect::NonNullWhenTrue).unwrap_or(GuardEffect::None),
        AstKind::LogicalNot => tok
            .ast_operand1
            .and_then(|inner| leaf_var(tokens, inner))
            .map(GuardEffect::NonNullWhenFalse)
            .unwrap_or(GuardEffect::None),
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
                (Some(v), crate::model::CompareOp::Eq) => GuardEffect::NonNullWhenFalse(v),
                (Some(v), crate::model::CompareOp::Ne) => GuardEffect::NonNullWhenTrue(v),
                (None, _) => GuardEffect::None,
            }
        }
        _ => GuardEffect::None,
    }
}

fn is_null_literal(tokens: &TokenArena, id: Option<TokenId>) -> bool {
    match id.and_then(|id| tokens.get(id)) {
        Some(tok) => matches!(tok.ast_kind, AstKind::NullLiteral) || (tok.text == "0" && matches!(tok.ast_kind, AstKind::Leaf)),
        None => false,
    }
}

fn apply_guard(effect: &GuardEffect, cleared: &mut FxHashSet<VarId>, true_side: bool) {
    match *effect {
        GuardEffect::NonNullWhenTrue(v) if true_side => {
            cleared.insert(v);
        }
        GuardEffect::NonNullWhenFalse(v) if !true_side => {
            cleared.insert(v);
        }
        _ => {}
    }
}

fn is_jump(kind: &AstKind) -> bool {
    matches!(
        kind,
        AstKind::Return | AstKind::Break | AstKind::Continue | AstKind::Goto | AstKind::Throw | AstKind::NoreturnCall
    )
}

#[allow(clippy::too_many_arguments)]
fn walk_assign(
    tokens: &TokenArena,
    scope: &Scope,
    function: &Function,
    flow: &FlowResult,
    library: &LibraryFacts,
    id: TokenId,
    cleared: &mut FxHashSet<VarId>,
    usages: &mut Vec<UnsafeUsage>,
    facts: &mut Vec<CallFact>,
) {
    let Some(tok) = tokens.get(id) else { return };
    let (lhs, rhs) = (tok.ast_operand1, tok.ast_operand2);
    if let Some(rhs) = rhs {
        walk_expr(tokens, scope, function, flow, library, rhs, cleared, usages, facts);
    }
    if let Some(lhs) = lhs {
        if let Some(base) = crate::checks::base_pointer_of(tokens, lhs) {
            walk_expr(tokens, scope, function, flow, library, base, cleared, usages, facts);
            record_param_use(tokens, scope, function, base, UsagePayload::RequiresNonNull, "ctunullpointer", usages);
        }
        if let Some(var) = leaf_var(tokens, lhs) {
            cleared.insert(var);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn walk_expr(
    tokens: &TokenArena,
    scope: &Scope,
    function: &Function,
    flow: &FlowResult,
    library: &LibraryFacts,
    id: TokenId,
    cleared: &mut FxHashSet<VarId>,
    usages: &mut Vec<UnsafeUsage>,
    facts: &mut Vec<CallFact>,
) {
    let Some(tok) = tokens.get(id) else { return };
    match tok.ast_kind.clone() {
        AstKind::Leaf | AstKind::NullLiteral | AstKind::SizeofKnownType | AstKind::AddressOf => {}
        AstKind::Deref | AstKind::Index => {
            if let Some(base) = tok.ast_operand1 {
                walk_expr(tokens, scope, function, flow, library, base, cleared, usages, facts);
                if let Some(var) = leaf_var(tokens, base) {
                    if is_param(function, var) && !cleared.contains(&var) {
                        emit_deref_usages(tokens, scope, base, var, usages);
                    }
                }
            }
            if let AstKind::Index = tok.ast_kind {
                if let Some(idx) = tok.ast_operand2 {
                    walk_expr(tokens, scope, function, flow, library, idx, cleared, usages, facts);
                }
            }
        }
        AstKind::MemberAccess { via_arrow } => {
            if via_arrow {
                if let Some(base) = tok.ast_operand1 {
                    walk_expr(tokens, scope, function, flow, library, base, cleared, usages, facts);
                    if let Some(var) = leaf_var(tokens, base) {
                        if is_param(function, var) && !cleared.contains(&var) {
                            emit_deref_usages(tokens, scope, base, var, usages);
                        }
                    }
                }
            }
        }
        AstKind::PointerArith { .. } => {
            if let Some(o) = tok.ast_operand1 {
                walk_expr(tokens, scope, function, flow, library, o, cleared, usages, facts);
            }
            if let Some(o) = tok.ast_operand2 {
                walk_expr(tokens, scope, function, flow, library, o, cleared, usages, facts);
            }
        }
        AstKind::Ternary {
            condition,
            then_expr,
            else_expr,
        } => {
            walk_expr(tokens, scope, function, flow, library, condition, cleared, usages, facts);
            walk_expr(tokens, scope, function, flow, library, then_expr, cleared, usages, facts);
            walk_expr(tokens, scope, function, flow, library, else_expr, cleared, usages, facts);
        }
        AstKind::LogicalAnd | AstKind::LogicalOr | AstKind::Compare { .. } => {
            if let Some(o) = tok.ast_operand1 {
                walk_expr(tokens, scope, function, flow, library, o, cleared, usages, facts);
            }
            if let Some(o) = tok.ast_operand2 {
                walk_expr(tokens, scope, function, flow, library, o, cleared, usages, facts);
            }
        }
        AstKind::LogicalNot => {
            if let Some(o) = tok.ast_operand1 {
                walk_expr(tokens, scope, function, flow, library, o, cleared, usages, facts);
            }
        }
        AstKind::Call { args } => {
            for &arg in &args {
                walk_expr(tokens, scope, function, flow, library, arg, cleared, usages, facts);
            }
            record_call_facts(tokens, scope, function, flow, library, id, &args, cleared, usages, facts);
        }
        AstKind::Assign => walk_assign(tokens, scope, function, flow, library, id, cleared, usages, facts),
        _ => {}
    }
}

fn emit_deref_usages(tokens: &TokenArena, scope: &Scope, base: TokenId, var: VarId, usages: &mut Vec<UnsafeUsage>) {
    let location = crate::checks::loc_of(tokens, base);
    let name = scope.get(var).map(|v| v.name.clone()).unwrap_or_default();
    let index = scope.get(var).and_then(|v| v.param_index).unwrap_or(0);
    usages.push(UnsafeUsage {
        check_id: "ctunullpointer".to_string(),
        argument_index: index,
        parameter_name: name.clone(),
        location,
        payload: UsagePayload::RequiresNonNull,
    });
    usages.push(UnsafeUsage {
        check_id: "ctuuninitvar".to_string(),
        argument_index: index,
        parameter_name: name,
        location,
        payload: UsagePayload::RequiresInitialized,
    });
}

fn record_param_use(tokens: &TokenArena, scope: &Scope, function: &Function, base: TokenId, payload: UsagePayload, check_id: &str, usages: &mut Vec<UnsafeUsage>) {
    let Some(var) = leaf_var(tokens, base) else { return };
    if !is_param(function, var) {
        return;
    }
    let location = crate::checks::loc_of(tokens, base);
    let name = scope.get(var).map(|v| v.name.clone()).unwrap_or_default();
    let index = scope.get(var).and_then(|v| v.param_index).unwrap_or(0);
    usages.push(UnsafeUsage {
        check_id: check_id.to_string(),
        argument_index: index,
        parameter_name: name,
        location,
        payload,
    });
}

#[allow(clippy::too_many_arguments)]
fn record_call_facts(
    tokens: &TokenArena,
    scope: &Scope,
    function: &Function,
    flow: &FlowResult,
    library: &LibraryFacts,
    call: TokenId,
    args: &[TokenId],
    cleared: &FxHashSet<VarId>,
    usages: &mut Vec<UnsafeUsage>,
    facts: &mut Vec<CallFact>,
) {
    let Some(callee) = callee_name(tokens, call) else { return };

    for (i, &arg) in args.iter().enumerate() {
        let location = crate::checks::loc_of(tokens, arg);

        // A library function that reads through or requires non-null on
        // this argument, fed directly from one of our own parameters, is
        // also an unsafe usage of that parameter as far as this function's
        // own contract goes (e.g. `strncpy(p, ...)`).
        if let Some(arg_var) = address_of_var(tokens, arg).or_else(|| leaf_var(tokens, arg)) {
            if is_param(function, arg_var) && !cleared.contains(&arg_var) {
                if let Some(libfacts) = library.lookup(&callee) {
                    let argfacts = libfacts.argument(i as u32);
                    if argfacts.notnull || matches!(argfacts.direction, Direction::In | Direction::InOut) {
                        record_param_use(tokens, scope, function, arg, UsagePayload::RequiresNonNull, "ctunullpointer", usages);
                    }
                }
            }
        }

        if let Some(var) = address_of_var(tokens, arg) {
            if flow.last_value_of(var).contains_uninit() {
                facts.push(CallFact {
                    callee_name: callee.clone(),
                    argument_index: i as u32,
                    value: CallArgValue::Uninit,
                    location,
                    path_preamble: Vec::new(),
                });
                continue;
            }
        }
        if let Some(var) = leaf_var(tokens, arg) {
            if is_param(function, var) {
                let index = scope.get(var).and_then(|v| v.param_index).unwrap_or(0);
                facts.push(CallFact {
                    callee_name: callee.clone(),
                    argument_index: i as u32,
                    value: CallArgValue::ForwardedParam(index),
                    location,
                    path_preamble: Vec::new(),
                });
                continue;
            }
        }
        if flow.value_at(arg).contains_null() {
            facts.push(CallFact {
                callee_name: callee.clone(),
                argument_index: i as u32,
                value: CallArgValue::Null,
                location,
                path_preamble: Vec::new(),
            });
            continue;
        }
        if let Some(n) = known_int(tokens, flow, arg) {
            facts.push(CallFact {
                callee_name: callee.clone(),
                argument_index: i as u32,
                value: CallArgValue::Known(n),
                location,
                path_preamble: Vec::new(),
            });
        }
    }
}

fn known_int(tokens: &TokenArena, flow: &FlowResult, id: TokenId) -> Option<i64> {
    if !matches!(tokens.get(id)?.ast_kind, AstKind::Leaf) {
        return None;
    }
    let facts = flow.value_at(id).facts().to_vec();
    let mut found = None;
    for fact in facts {
        if let crate::value::AbstractValue::Known(crate::value::KnownValue::Int(n)) = fact.value {
            if found.is_some() {
                return None;
            }
            found = Some(n);
        }
    }
    found
}

fn address_of_var(tokens: &TokenArena, id: TokenId) -> Option<VarId> {
    let tok = tokens.get(id)?;
    match tok.ast_kind {
        AstKind::AddressOf => tok.ast_operand1.and_then(|inner| leaf_var(tokens, inner)),
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

fn is_param(function: &Function, var: VarId) -> bool {
    function.params.contains(&var)
}

fn callee_name(tokens: &TokenArena, call: TokenId) -> Option<String> {
    let tok = tokens.get(call)?;
    let AstKind::Call { .. } = tok.ast_kind else {
        return None;
    };
    let callee = tok.ast_operand1?;
    tokens.get(callee).map(|t| t.text.clone())
}
