//! Token arena: an immutable-after-construction, doubly-linked token stream
//! with attached AST links, addressed by small integer indices rather than
//! pointers or `Rc` — the arena-of-indices idiom this crate uses everywhere
//! a cyclic or self-referential graph would otherwise appear.

use super::location::Location;
use super::scope::ScopeId;
use super::variable::VarId;
use serde::{Deserialize, Serialize};

/// Index into a [`TokenArena`]. `next`/`previous` are just `TokenId(n +- 1)`
/// within one arena; there is no separate linked-list pointer to keep in
/// sync, which is what invariant I1 (no cycles) is actually buying us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(pub u32);

impl TokenId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Lexical category of a token's literal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    Identifier,
    Keyword,
    Punctuator,
    NumberLiteral,
    StringLiteral,
    Operator,
    EndMarker,
}

/// The engine's semantic view of what role a token plays in its expression
/// or statement. The parser collaborator is expected to stamp this in
/// alongside the lexical `TokenKind`; rules pattern-match on it instead of
/// re-deriving control structure from raw punctuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AstKind {
    /// A leaf: a literal, an identifier read, or an unrecognized atom.
    Leaf,
    /// `nullptr` / `NULL`, a leaf that is specifically the null constant.
    NullLiteral,
    /// `sizeof(T)` with a statically known type.
    SizeofKnownType,
    /// `a == b` / `a != b`. Condition refinement only recognizes a compare
    /// against a null literal or the integer literal `0`; anything else
    /// falls back to no refinement on either branch.
    Compare { op: CompareOp },
    /// `lhs = rhs` (plain assignment, not compound).
    Assign,
    /// A local declaration. `variable` names the declared variable directly;
    /// an optional initializer expression hangs off `ast_operand2`.
    Declare,
    /// `*p`, unary dereference.
    Deref,
    /// `p->m` or `p.m`, member access; operand1 is the base, `member` names
    /// the accessed field on the resolved variable's aggregate.
    MemberAccess { via_arrow: bool },
    /// `p[i]`, array/pointer indexing.
    Index,
    /// `&x`, address-of.
    AddressOf,
    /// A function call; operand1 is the callee name token, `args` lists the
    /// argument expression roots in order.
    Call { args: Vec<TokenId> },
    /// `if (cond) { ... } else { ... }`.
    If {
        condition: TokenId,
        then_branch: Vec<TokenId>,
        else_branch: Vec<TokenId>,
    },
    /// `for`/`while`/`do`-`while`; `is_do_while` distinguishes the
    /// test-after-body form.
    Loop {
        condition: Option<TokenId>,
        body: Vec<TokenId>,
        is_do_while: bool,
    },
    /// `switch (expr) { case ...: ... }`.
    Switch { scrutinee: TokenId, cases: Vec<SwitchCase> },
    /// `cond ? then_expr : else_expr`.
    Ternary {
        condition: TokenId,
        then_expr: TokenId,
        else_expr: TokenId,
    },
    /// `a && b` / `a || b`.
    LogicalAnd,
    LogicalOr,
    /// Unary `!`.
    LogicalNot,
    /// `return expr;` (operand1 is the returned expression, if any).
    Return,
    Break,
    Continue,
    Goto,
    Throw,
    /// A call to a function the library marks `noreturn` (`exit`, `abort`,
    /// `longjmp` and friends).
    NoreturnCall,
    /// `p + n` / `p - n` where at least one operand has pointer type.
    /// Distinguished from ordinary arithmetic because the null-deref check
    /// treats it as its own dangerous-usage site (§4.F "pointer arithmetic
    /// on null").
    PointerArith { op: ArithOp },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
}

/// One `case`/`default` arm of a [`AstKind::Switch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// `None` for `default:`.
    pub label: Option<i64>,
    pub body: Vec<TokenId>,
}

/// A node in the token stream. Topology (links, AST shape) is frozen before
/// the engine runs; the engine only ever reads it and writes into separate
/// value-set storage (`valueflow::FlowResult`), never into the token itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub kind: TokenKind,
    pub ast_kind: AstKind,
    pub location: Location,
    /// Matching bracket / if-else partner, when applicable.
    pub link: Option<TokenId>,
    pub ast_parent: Option<TokenId>,
    pub ast_operand1: Option<TokenId>,
    pub ast_operand2: Option<TokenId>,
    /// Resolved variable identity, if this token is an identifier reference.
    pub variable: Option<VarId>,
    /// Resolved type name, when known; `None` means the parser could not
    /// resolve it. The engine must still accept the token and degrade its
    /// value to `Top` rather than fail.
    pub resolved_type: Option<String>,
    pub scope: Option<ScopeId>,
    /// `true` if this token sits in a context the library marks write-only
    /// (e.g. `scanf`'s `%d` target) — used by the uninit check to exclude
    /// "not a read use" positions.
    pub write_only_context: bool,
}

impl Token {
    pub fn new(text: impl Into<String>, kind: TokenKind, location: Location) -> Self {
        Self {
            text: text.into(),
            kind,
            ast_kind: AstKind::Leaf,
            location,
            link: None,
            ast_parent: None,
            ast_operand1: None,
            ast_operand2: None,
            variable: None,
            resolved_type: None,
            scope: None,
            write_only_context: false,
        }
    }

    pub fn with_ast_kind(mut self, ast_kind: AstKind) -> Self {
        self.ast_kind = ast_kind;
        self
    }

    pub fn with_variable(mut self, var: VarId) -> Self {
        self.variable = Some(var);
        self
    }

    pub fn with_operands(mut self, op1: Option<TokenId>, op2: Option<TokenId>) -> Self {
        self.ast_operand1 = op1;
        self.ast_operand2 = op2;
        self
    }

    pub fn with_scope(mut self, scope: ScopeId) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// The token stream for one translation unit, arena-allocated and indexed by
/// [`TokenId`]. `next`/`previous` are O(1) index arithmetic; every
/// navigation query on this type is O(1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenArena {
    tokens: Vec<Token>,
}

impl TokenArena {
    pub fn new() -> Self {
        Self { tokens: Vec::new() }
    }

    pub fn push(&mut self, token: Token) -> TokenId {
        let id = TokenId(self.tokens.len() as u32);
        self.tokens.push(token);
        id
    }

    pub fn get(&self, id: TokenId) -> Option<&Token> {
        self.tokens.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    #[inline]
    pub fn next(&self, id: TokenId) -> Option<TokenId> {
        let next = TokenId(id.0 + 1);
        if next.index() < self.tokens.len() {
            Some(next)
        } else {
            None
        }
    }

    #[inline]
    pub fn previous(&self, id: TokenId) -> Option<TokenId> {
        id.0.checked_sub(1).map(TokenId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TokenId, &Token)> {
        self.tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (TokenId(i as u32), t))
    }

    /// The top operator token of an expression tree containing `within`:
    /// walk `ast_parent` until it runs out. Guards against a cyclic
    /// parent chain (which invariant I1 forbids but a malformed fixture
    /// could still produce) with a bounded walk.
    pub fn ast_root(&self, within: TokenId) -> TokenId {
        let mut current = within;
        for _ in 0..self.tokens.len().max(1) {
            match self.get(current).and_then(|t| t.ast_parent) {
                Some(parent) => current = parent,
                None => return current,
            }
        }
        current
    }
}
