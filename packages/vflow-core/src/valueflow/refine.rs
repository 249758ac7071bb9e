//! Rule 5: condition refinement at `if`/`else` branches. Recognizes
//! `if (p)`, `if (!p)`, `p != nullptr`, `p == nullptr`, `p == 0`, `p != 0`;
//! anything else yields no refinement on either branch, which is always
//! sound (just less precise) since an un-refined value set still contains
//! whatever it contained before the branch.

use super::Env;
use crate::model::{AstKind, CompareOp, TokenArena, TokenId, TokenKind, VarId};

#[derive(Debug, Clone, Copy)]
pub(super) enum CondEffect {
    /// The named pointer is known non-null when the condition is true,
    /// and only possibly-null (unrefined) when false.
    NonNullWhenTrue(VarId),
    /// The named pointer is known non-null when the condition is false.
    NonNullWhenFalse(VarId),
    None,
}

pub(super) fn classify(tokens: &TokenArena, cond: TokenId) -> CondEffect {
    let Some(tok) = tokens.get(cond) else {
        return CondEffect::None;
    };
    match &tok.ast_kind {
        AstKind::Leaf => match tok.variable {
            Some(var) => CondEffect::NonNullWhenTrue(var),
            None => CondEffect::None,
        },
        AstKind::LogicalNot => tok
            .ast_operand1
            .and_then(|inner| leaf_var(tokens, inner))
            .map(CondEffect::NonNullWhenFalse)
            .unwrap_or(CondEffect::None),
        AstKind::Compare { op } => classify_compare(tokens, tok.ast_operand1, tok.ast_operand2, *op),
        _ => CondEffect::None,
    }
}

fn leaf_var(tokens: &TokenArena, id: TokenId) -> Option<VarId> {
    let tok = tokens.get(id)?;
    match tok.ast_kind {
        AstKind::Leaf => tok.variable,
        _ => None,
    }
}

fn is_null_literal(tokens: &TokenArena, id: Option<TokenId>) -> bool {
    match id.and_then(|id| tokens.get(id)) {
        Some(tok) => matches!(tok.ast_kind, AstKind::NullLiteral) || (tok.kind == TokenKind::NumberLiteral && tok.text == "0"),
        None => false,
    }
}

fn classify_compare(
    tokens: &TokenArena,
    op1: Option<TokenId>,
    op2: Option<TokenId>,
    op: CompareOp,
) -> CondEffect {
    let var = if let Some(v) = op1.and_then(|id| leaf_var(tokens, id)) {
        if is_null_literal(tokens, op2) {
            Some(v)
        } else {
            None
        }
    } else if let Some(v) = op2.and_then(|id| leaf_var(tokens, id)) {
        if is_null_literal(tokens, op1) {
            Some(v)
        } else {
            None
        }
    } else {
        None
    };
    match (var, op) {
        (Some(v), CompareOp::Eq) => CondEffect::NonNullWhenFalse(v),
        (Some(v), CompareOp::Ne) => CondEffect::NonNullWhenTrue(v),
        (None, _) => CondEffect::None,
    }
}

/// Apply a condition's effect to a cloned branch environment: drop the
/// inconsistent half of the pointer's value set. Only removes values the
/// condition rules out; never adds a value that wasn't already possible.
pub(super) fn apply(effect: CondEffect, env: &mut Env, branch_is_true_side: bool) {
    let (var, keep_nonnull) = match effect {
        CondEffect::NonNullWhenTrue(v) => (v, branch_is_true_side),
        CondEffect::NonNullWhenFalse(v) => (v, !branch_is_true_side),
        CondEffect::None => return,
    };
    let current = env.get(var);
    let refined = if keep_nonnull {
        current.refine(|v| !v.is_null())
    } else {
        current.refine(|v| !v.is_nonnull())
    };
    env.values.insert(var, refined);
}
