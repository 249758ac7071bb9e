//! Checks: pure functions from `(token stream, value-flow result, settings)`
//! to a stream of diagnostics, dispatched by calling the right module
//! directly rather than through a `Check` trait object — there are exactly
//! two of them in this crate's scope, and an enum-of-checks dispatch table
//! would be ceremony for a two-entry table (§9 "avoid deep inheritance").

pub mod null_deref;
pub mod uninit;

use crate::model::{ArithOp, AstKind, Location, TokenArena, TokenId};

/// Shared read-use/deref-site syntactic classification, used by both checks
/// so their tree walks agree on what counts as "the pointer expression" of
/// a deref-shaped token.
pub(crate) fn base_pointer_of(tokens: &TokenArena, id: TokenId) -> Option<TokenId> {
    let tok = tokens.get(id)?;
    match &tok.ast_kind {
        AstKind::Deref | AstKind::Index => tok.ast_operand1,
        AstKind::MemberAccess { via_arrow: true } => tok.ast_operand1,
        AstKind::PointerArith { .. } => tok.ast_operand1,
        _ => None,
    }
}

pub(crate) fn pointer_arith_op(tokens: &TokenArena, id: TokenId) -> Option<ArithOp> {
    match tokens.get(id)?.ast_kind {
        AstKind::PointerArith { op } => Some(op),
        _ => None,
    }
}

pub(crate) fn loc_of(tokens: &TokenArena, id: TokenId) -> Location {
    tokens.get(id).map(|t| t.location).unwrap_or_default()
}
