//! Lexical scopes: a function, block, or class, holding the variables
//! declared within it. The driver resolves scoping before handing a
//! translation unit to this crate; here a `Scope` is just the flat,
//! already-resolved variable table the engine and checks query by `VarId`.

use super::variable::{Variable, VarId};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

/// All variables visible in one translation unit, addressed by `VarId`.
/// Despite the name this is the flattened union of every lexical block's
/// variables (the parser collaborator already resolved which declaration a
/// given identifier token refers to); nested-block shadowing is therefore
/// the parser's problem, not this crate's.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scope {
    variables: FxHashMap<VarId, Variable>,
    next_id: u32,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a fresh variable and hand back its id.
    pub fn declare(&mut self, mut variable: Variable) -> VarId {
        let id = VarId(self.next_id);
        self.next_id += 1;
        variable.id = id;
        self.variables.insert(id, variable);
        id
    }

    pub fn get(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}
