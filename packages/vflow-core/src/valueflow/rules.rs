//! Rules 2-10: the statement/expression walker that threads a per-variable
//! environment through one function's body in source order, dispatching on
//! each token's [`AstKind`]. Rule 1 (literal propagation) lives on
//! [`Engine::eval_leaf_literal`]; everything else is here.
//!
//! Every walker here also carries `terminated: &mut bool`. Most of the time
//! it just records that a `return`/`break`/`noreturn` call ended the
//! current path early; an I1-I4 invariant violation (dangling token
//! reference, a malformed declare/assign node) sets it too, by the same
//! mechanism, so the remainder of the function's body is skipped exactly
//! the way a `return` would skip it.

use super::refine;
use super::{ast_kind_is_jump, Engine, Env, FlowResult};
use crate::errors::EngineError;
use crate::library::Direction;
use crate::model::{AstKind, Scope, SwitchCase, TokenArena, TokenId, VarId};
use crate::value::{AbstractValue, PathTag, ValueFact, ValueSet};
use rustc_hash::FxHashSet;

pub(super) fn exec_block(
    engine: &Engine,
    tokens: &TokenArena,
    scope: &Scope,
    stmts: &[TokenId],
    env: &mut Env,
    terminated: &mut bool,
    result: &mut FlowResult,
    tag: PathTag,
) {
    for &stmt in stmts {
        if *terminated || engine.settings.is_terminated() {
            *terminated = *terminated || engine.settings.is_terminated();
            return;
        }
        exec_stmt(engine, tokens, scope, stmt, env, terminated, result, tag);
    }
}

fn exec_stmt(
    engine: &Engine,
    tokens: &TokenArena,
    scope: &Scope,
    stmt: TokenId,
    env: &mut Env,
    terminated: &mut bool,
    result: &mut FlowResult,
    tag: PathTag,
) {
    let Some(tok) = tokens.get(stmt) else {
        engine.record_internal_error(
            result,
            terminated,
            &env.current_function,
            crate::checks::loc_of(tokens, stmt),
            EngineError::DanglingTokenRef(stmt),
        );
        return;
    };

    match &tok.ast_kind {
        AstKind::Declare => handle_declare(engine, tokens, scope, stmt, env, terminated, result, tag),
        AstKind::Assign => {
            handle_assign(engine, tokens, scope, stmt, env, terminated, result, tag);
        }
        AstKind::If {
            condition,
            then_branch,
            else_branch,
        } => handle_if(
            engine,
            tokens,
            scope,
            *condition,
            then_branch,
            else_branch,
            env,
            terminated,
            result,
            tag,
        ),
        AstKind::Loop { condition, body, .. } => {
            handle_loop(engine, tokens, scope, *condition, body, env, terminated, result, tag)
        }
        AstKind::Switch { scrutinee, cases } => {
            handle_switch(engine, tokens, scope, *scrutinee, cases, env, terminated, result, tag)
        }
        AstKind::Call { args } => {
            let (value, noreturn) = apply_call_effects(engine, tokens, scope, stmt, args, env, terminated, result, tag);
            result.set(stmt, value, engine.bound());
            if noreturn {
                *terminated = true;
            }
        }
        kind if ast_kind_is_jump(kind) => {
            if let Some(operand) = tok.ast_operand1 {
                eval_expr(engine, tokens, scope, operand, env, terminated, result, tag);
            }
            *terminated = true;
        }
        _ => {
            // An expression used as a statement (e.g. a bare ternary or
            // logical expression evaluated for its side effects only).
            eval_expr(engine, tokens, scope, stmt, env, terminated, result, tag);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_declare(
    engine: &Engine,
    tokens: &TokenArena,
    scope: &Scope,
    stmt: TokenId,
    env: &mut Env,
    terminated: &mut bool,
    result: &mut FlowResult,
    tag: PathTag,
) {
    let Some(tok) = tokens.get(stmt) else { return };
    let Some(var) = tok.variable else {
        engine.record_internal_error(
            result,
            terminated,
            &env.current_function,
            tok.location,
            EngineError::internal(format!("declare token {:?} has no resolved variable", stmt)),
        );
        return;
    };

    if let Some(init) = tok.ast_operand2 {
        let value = eval_expr(engine, tokens, scope, init, env, terminated, result, tag);
        env.assign(var, value.clone());
        result.record_var(var, value);
        return;
    }

    // Rule 3: declaration without an initializer. Aggregates track each
    // leaf member independently; scalars and pointers get a single Uninit
    // fact on the variable itself.
    match scope.get(var) {
        Some(variable) if variable.is_aggregate() => {
            for &member in &variable.members {
                env.declare_uninit(member);
                result.record_var(member, env.get(member));
            }
        }
        _ => {
            env.declare_uninit(var);
            result.record_var(var, env.get(var));
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_assign(
    engine: &Engine,
    tokens: &TokenArena,
    scope: &Scope,
    stmt: TokenId,
    env: &mut Env,
    terminated: &mut bool,
    result: &mut FlowResult,
    tag: PathTag,
) -> ValueSet {
    let Some(tok) = tokens.get(stmt) else {
        return ValueSet::top();
    };
    let (Some(lhs), Some(rhs)) = (tok.ast_operand1, tok.ast_operand2) else {
        engine.record_internal_error(
            result,
            terminated,
            &env.current_function,
            tok.location,
            EngineError::internal(format!("assign token {:?} missing an operand", stmt)),
        );
        return ValueSet::top();
    };

    // Rule 4: heap allocation. `p = malloc(n)`/`realloc(...)` yields a
    // possibly-null pointer whose pointee is allocated but unwritten;
    // `calloc` yields a possibly-null pointer with a defined (zeroed)
    // pointee.
    if let Some(callee) = call_callee_name(tokens, rhs) {
        if matches!(callee, "malloc" | "realloc") {
            let ptr_value = nullable_pointer_value(tag);
            result.set(rhs, ptr_value.clone(), engine.bound());
            if let Some(var) = leaf_var(tokens, lhs) {
                env.mark_heap_uninit(var, ptr_value.clone());
                result.record_var(var, ptr_value.clone());
            }
            result.set(lhs, ptr_value, engine.bound());
            return result.value_at(lhs);
        }
        if callee == "calloc" {
            let ptr_value = nullable_pointer_value(tag);
            result.set(rhs, ptr_value.clone(), engine.bound());
            if let Some(var) = leaf_var(tokens, lhs) {
                env.assign(var, ptr_value.clone());
                result.record_var(var, ptr_value.clone());
            }
            result.set(lhs, ptr_value, engine.bound());
            return result.value_at(lhs);
        }
    }

    let rhs_value = eval_expr(engine, tokens, scope, rhs, env, terminated, result, tag);

    if let Some(var) = leaf_var(tokens, lhs) {
        env.assign(var, rhs_value.clone());
        result.record_var(var, rhs_value.clone());
    } else if let Some(member) = member_var(tokens, lhs) {
        env.assign(member, rhs_value.clone());
        result.record_var(member, rhs_value.clone());
        if let Some(base) = base_pointer_var(tokens, lhs) {
            env.clear_heap_uninit(base);
        }
    } else if let Some(base) = base_pointer_var(tokens, lhs) {
        env.clear_heap_uninit(base);
    }
    result.set(lhs, rhs_value.clone(), engine.bound());
    rhs_value
}

fn nullable_pointer_value(tag: PathTag) -> ValueSet {
    ValueSet::Values(vec![
        ValueFact::new(AbstractValue::Null).with_tag(tag),
        ValueFact::new(AbstractValue::NonNull).with_tag(tag),
    ])
}

#[allow(clippy::too_many_arguments)]
fn handle_if(
    engine: &Engine,
    tokens: &TokenArena,
    scope: &Scope,
    condition: TokenId,
    then_branch: &[TokenId],
    else_branch: &[TokenId],
    env: &mut Env,
    terminated: &mut bool,
    result: &mut FlowResult,
    tag: PathTag,
) {
    eval_expr(engine, tokens, scope, condition, env, terminated, result, tag);
    let effect = refine::classify(tokens, condition);
    let then_tag = PathTag::Branch(condition.0.wrapping_mul(2));
    let else_tag = PathTag::Branch(condition.0.wrapping_mul(2) + 1);

    let mut then_env = env.clone();
    refine::apply(effect, &mut then_env, true);
    let mut else_env = env.clone();
    refine::apply(effect, &mut else_env, false);

    let errors_before = result.internal_errors().len();
    let mut then_terminated = false;
    let mut else_terminated = false;
    exec_block(engine, tokens, scope, then_branch, &mut then_env, &mut then_terminated, result, then_tag);
    exec_block(engine, tokens, scope, else_branch, &mut else_env, &mut else_terminated, result, else_tag);

    // A fatal invariant violation in just one branch still aborts the
    // whole function — it must not be masked by the other branch finishing
    // cleanly and winning the env join below.
    if result.internal_errors().len() > errors_before {
        *terminated = true;
        return;
    }
    if then_terminated && else_terminated {
        *terminated = true;
        return;
    }
    if then_terminated {
        *env = else_env;
        return;
    }
    if else_terminated {
        *env = then_env;
        return;
    }
    *env = join_envs(&then_env, &else_env, engine.bound());
}

#[allow(clippy::too_many_arguments)]
fn handle_loop(
    engine: &Engine,
    tokens: &TokenArena,
    scope: &Scope,
    condition: Option<TokenId>,
    body: &[TokenId],
    env: &mut Env,
    terminated: &mut bool,
    result: &mut FlowResult,
    tag: PathTag,
) {
    if let Some(cond) = condition {
        eval_expr(engine, tokens, scope, cond, env, terminated, result, tag);
    }

    // Rule 6: fixed-point over a bounded number of iterations. Each
    // iteration's end state joins back with the state so far, so the
    // result after the loop contains both the pre-loop values and whatever
    // an iteration could have assigned — the loop may run zero times.
    // `iter_terminated` (a `return`/`break` inside the body) is routine
    // control flow and intentionally discarded, same as before this
    // function learned about fatal errors — only a genuine invariant
    // violation, which grows `result.internal_errors()`, aborts the whole
    // function instead of just ending one iteration early.
    let mut current = env.clone();
    for _ in 0..engine.loop_budget() {
        let errors_before = result.internal_errors().len();
        let mut iter_env = current.clone();
        let mut iter_terminated = false;
        exec_block(engine, tokens, scope, body, &mut iter_env, &mut iter_terminated, result, tag);
        if result.internal_errors().len() > errors_before {
            *terminated = true;
            break;
        }
        current = join_envs(&current, &iter_env, engine.bound());
    }
    *env = current;
}

#[allow(clippy::too_many_arguments)]
fn handle_switch(
    engine: &Engine,
    tokens: &TokenArena,
    scope: &Scope,
    scrutinee: TokenId,
    cases: &[SwitchCase],
    env: &mut Env,
    terminated: &mut bool,
    result: &mut FlowResult,
    tag: PathTag,
) {
    eval_expr(engine, tokens, scope, scrutinee, env, terminated, result, tag);
    if cases.is_empty() {
        return;
    }

    let scrutinee_var = leaf_var(tokens, scrutinee);
    let mut live_envs: Vec<Env> = Vec::new();
    let mut any_fell_through = false;
    let errors_before = result.internal_errors().len();

    for (i, case) in cases.iter().enumerate() {
        let mut case_env = env.clone();
        if let (Some(var), Some(label)) = (scrutinee_var, case.label) {
            let case_tag = PathTag::Branch(scrutinee.0.wrapping_add(i as u32 + 1));
            case_env.assign(var, ValueSet::single(ValueFact::new(AbstractValue::known_int(label)).with_tag(case_tag)));
        }
        let mut case_terminated = false;
        exec_block(engine, tokens, scope, &case.body, &mut case_env, &mut case_terminated, result, tag);
        if !case_terminated {
            any_fell_through = true;
            live_envs.push(case_env);
        }
    }

    // A fatal invariant violation in any case still aborts the whole
    // function, regardless of whether other cases fell through cleanly.
    if result.internal_errors().len() > errors_before {
        *terminated = true;
        return;
    }
    if !any_fell_through {
        *terminated = true;
        return;
    }
    let mut merged = live_envs.remove(0);
    for other in &live_envs {
        merged = join_envs(&merged, other, engine.bound());
    }
    *env = merged;
}

#[allow(clippy::too_many_arguments)]
fn apply_call_effects(
    engine: &Engine,
    tokens: &TokenArena,
    scope: &Scope,
    call: TokenId,
    args: &[TokenId],
    env: &mut Env,
    terminated: &mut bool,
    result: &mut FlowResult,
    tag: PathTag,
) -> (ValueSet, bool) {
    let callee = call_callee_name(tokens, call).unwrap_or("");
    let noreturn = engine.library().is_noreturn(callee);

    for (i, &arg) in args.iter().enumerate() {
        eval_expr(engine, tokens, scope, arg, env, terminated, result, tag);
        let facts = engine.library().argument_facts(callee, i as u32);
        if matches!(facts.direction, Direction::Out | Direction::InOut) {
            if let Some(var) = out_target_var(tokens, arg) {
                env.assign(var, ValueSet::top());
                result.record_var(var, ValueSet::top());
            }
        }
    }

    (ValueSet::top(), noreturn)
}

#[allow(clippy::too_many_arguments)]
fn eval_expr(
    engine: &Engine,
    tokens: &TokenArena,
    scope: &Scope,
    id: TokenId,
    env: &mut Env,
    terminated: &mut bool,
    result: &mut FlowResult,
    tag: PathTag,
) -> ValueSet {
    let Some(tok) = tokens.get(id) else {
        engine.record_internal_error(
            result,
            terminated,
            &env.current_function,
            crate::checks::loc_of(tokens, id),
            EngineError::DanglingTokenRef(id),
        );
        return ValueSet::top();
    };

    let value = match tok.ast_kind.clone() {
        AstKind::Leaf => match tok.variable {
            Some(var) => env.get(var),
            None => engine.eval_leaf_literal(&tok.text),
        },
        AstKind::NullLiteral => ValueSet::single(ValueFact::new(AbstractValue::Null).with_tag(tag)),
        AstKind::SizeofKnownType => engine.eval_leaf_literal(&tok.text),
        AstKind::AddressOf => {
            if let Some(inner) = tok.ast_operand1 {
                eval_expr(engine, tokens, scope, inner, env, terminated, result, tag);
            }
            ValueSet::single(ValueFact::new(AbstractValue::NonNull).with_tag(tag))
        }
        AstKind::Deref => {
            if let Some(base) = tok.ast_operand1 {
                eval_expr(engine, tokens, scope, base, env, terminated, result, tag);
            }
            mark_heap_read_if_needed(tokens, id, env, result);
            ValueSet::top()
        }
        AstKind::Index => {
            if let Some(base) = tok.ast_operand1 {
                eval_expr(engine, tokens, scope, base, env, terminated, result, tag);
            }
            if let Some(idx) = tok.ast_operand2 {
                eval_expr(engine, tokens, scope, idx, env, terminated, result, tag);
            }
            mark_heap_read_if_needed(tokens, id, env, result);
            ValueSet::top()
        }
        AstKind::MemberAccess { via_arrow } => {
            if let Some(base) = tok.ast_operand1 {
                eval_expr(engine, tokens, scope, base, env, terminated, result, tag);
            }
            if via_arrow {
                mark_heap_read_if_needed(tokens, id, env, result);
            }
            match tok.variable {
                Some(var) => env.get(var),
                None => ValueSet::top(),
            }
        }
        AstKind::LogicalAnd | AstKind::LogicalOr => {
            let left = tok
                .ast_operand1
                .map(|o| eval_expr(engine, tokens, scope, o, env, terminated, result, tag))
                .unwrap_or_else(ValueSet::top);
            let right = tok
                .ast_operand2
                .map(|o| eval_expr(engine, tokens, scope, o, env, terminated, result, tag))
                .unwrap_or_else(ValueSet::top);
            left.join(&right, engine.bound())
        }
        AstKind::LogicalNot => {
            if let Some(o) = tok.ast_operand1 {
                eval_expr(engine, tokens, scope, o, env, terminated, result, tag);
            }
            ValueSet::top()
        }
        AstKind::Compare { .. } => {
            if let Some(o) = tok.ast_operand1 {
                eval_expr(engine, tokens, scope, o, env, terminated, result, tag);
            }
            if let Some(o) = tok.ast_operand2 {
                eval_expr(engine, tokens, scope, o, env, terminated, result, tag);
            }
            ValueSet::top()
        }
        AstKind::PointerArith { .. } => {
            if let Some(o) = tok.ast_operand1 {
                eval_expr(engine, tokens, scope, o, env, terminated, result, tag);
            }
            if let Some(o) = tok.ast_operand2 {
                eval_expr(engine, tokens, scope, o, env, terminated, result, tag);
            }
            ValueSet::top()
        }
        AstKind::Ternary {
            condition,
            then_expr,
            else_expr,
        } => {
            eval_expr(engine, tokens, scope, condition, env, terminated, result, tag);
            let effect = refine::classify(tokens, condition);
            let then_tag = PathTag::Branch(condition.0.wrapping_mul(2));
            let else_tag = PathTag::Branch(condition.0.wrapping_mul(2) + 1);

            let mut then_env = env.clone();
            refine::apply(effect, &mut then_env, true);
            let mut else_env = env.clone();
            refine::apply(effect, &mut else_env, false);

            let then_val = eval_expr(engine, tokens, scope, then_expr, &mut then_env, terminated, result, then_tag);
            let else_val = eval_expr(engine, tokens, scope, else_expr, &mut else_env, terminated, result, else_tag);
            then_val.promote(then_tag).join(&else_val.promote(else_tag), engine.bound())
        }
        AstKind::Call { ref args } => {
            let (value, _noreturn) = apply_call_effects(engine, tokens, scope, id, args, env, terminated, result, tag);
            value
        }
        AstKind::Assign => handle_assign(engine, tokens, scope, id, env, terminated, result, tag),
        _ => ValueSet::top(),
    };

    result.set(id, value.clone(), engine.bound());
    value
}

fn mark_heap_read_if_needed(tokens: &TokenArena, id: TokenId, env: &Env, result: &mut FlowResult) {
    if let Some(base) = base_pointer_var(tokens, id) {
        if env.is_heap_uninit(base) {
            result.heap_uninit_reads.insert(id);
        }
    }
}

fn join_envs(a: &Env, b: &Env, bound: usize) -> Env {
    let mut merged = Env {
        current_function: a.current_function.clone(),
        ..Env::default()
    };
    let mut keys: FxHashSet<VarId> = a.values.keys().copied().collect();
    keys.extend(b.values.keys().copied());
    for key in keys {
        let av = a.values.get(&key).cloned().unwrap_or_else(ValueSet::top);
        let bv = b.values.get(&key).cloned().unwrap_or_else(ValueSet::top);
        merged.values.insert(key, av.join(&bv, bound));
    }
    merged.heap_uninit = a.heap_uninit.intersection(&b.heap_uninit).copied().collect();
    merged
}

fn leaf_var(tokens: &TokenArena, id: TokenId) -> Option<VarId> {
    let tok = tokens.get(id)?;
    match tok.ast_kind {
        AstKind::Leaf => tok.variable,
        _ => None,
    }
}

fn member_var(tokens: &TokenArena, id: TokenId) -> Option<VarId> {
    let tok = tokens.get(id)?;
    match tok.ast_kind {
        AstKind::MemberAccess { .. } => tok.variable,
        _ => None,
    }
}

fn base_pointer_var(tokens: &TokenArena, id: TokenId) -> Option<VarId> {
    let tok = tokens.get(id)?;
    match tok.ast_kind {
        AstKind::Deref | AstKind::Index | AstKind::MemberAccess { .. } => tok.ast_operand1.and_then(|b| leaf_var(tokens, b)),
        _ => None,
    }
}

fn out_target_var(tokens: &TokenArena, id: TokenId) -> Option<VarId> {
    let tok = tokens.get(id)?;
    match tok.ast_kind {
        AstKind::AddressOf => tok.ast_operand1.and_then(|inner| leaf_var(tokens, inner)),
        AstKind::Leaf => tok.variable,
        _ => None,
    }
}

fn call_callee_name<'a>(tokens: &'a TokenArena, call: TokenId) -> Option<&'a str> {
    let tok = tokens.get(call)?;
    let AstKind::Call { .. } = tok.ast_kind else {
        return None;
    };
    let callee = tok.ast_operand1?;
    tokens.get(callee).map(|t| t.text.as_str())
}
