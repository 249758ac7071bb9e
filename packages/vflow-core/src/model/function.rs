use super::token::TokenId;
use super::variable::VarId;
use serde::{Deserialize, Serialize};

/// Identifies one function within a translation unit. Stable only for the
/// lifetime of one analysis run, the same way [`super::VarId`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

/// A function definition: its parameters (in declaration order) and the
/// ordered list of top-level statement roots making up its body. Nested
/// control structures carry their own statement lists inline on the
/// relevant [`super::AstKind`] variant (`If::then_branch`, `Loop::body`,
/// and so on), so this is only the outermost list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub params: Vec<VarId>,
    pub body: Vec<TokenId>,
}

impl Function {
    pub fn new(id: FunctionId, name: impl Into<String>, params: Vec<VarId>, body: Vec<TokenId>) -> Self {
        Function {
            id,
            name: name.into(),
            params,
            body,
        }
    }
}
