//! The token/AST arena, variables, scopes, functions, and source locations
//! that make up one parsed translation unit as handed to the engine.

mod function;
mod location;
mod scope;
mod token;
mod variable;

pub use function::{Function, FunctionId};
pub use location::{Location, LocationHint};
pub use scope::{Scope, ScopeId};
pub use token::{ArithOp, AstKind, CompareOp, SwitchCase, Token, TokenArena, TokenId, TokenKind};
pub use variable::{StorageClass, VarId, VarType, Variable};
