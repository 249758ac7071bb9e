//! Variable identity. Two token references to the same declaration must
//! resolve to the same `Variable` identity, so a `VarId` newtype handed out
//! by a simple counter is sufficient — there is no need for a
//! content-addressed hashing scheme here, since these ids never cross a
//! process boundary and never need to be stable across unrelated runs, only
//! within one TU's analysis.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageClass {
    Auto,
    Static,
    ThreadLocal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarType {
    Scalar,
    Pointer,
    Array,
    Aggregate,
    Reference,
    FunctionPointer,
}

/// A declared variable's program-wide identity and static facts about it.
/// Aggregates carry the ordered list of their leaf members, each itself a
/// `Variable`, so the uninit check can track per-member definedness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub id: VarId,
    pub name: String,
    pub var_type: VarType,
    pub storage: StorageClass,
    pub is_const: bool,
    pub param_index: Option<u32>,
    pub members: Vec<VarId>,
}

impl Variable {
    pub fn new(id: VarId, name: impl Into<String>, var_type: VarType) -> Self {
        Self {
            id,
            name: name.into(),
            var_type,
            storage: StorageClass::Auto,
            is_const: false,
            param_index: None,
            members: Vec::new(),
        }
    }

    pub fn as_param(mut self, index: u32) -> Self {
        self.param_index = Some(index);
        self
    }

    pub fn as_const(mut self) -> Self {
        self.is_const = true;
        self
    }

    pub fn with_storage(mut self, storage: StorageClass) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_members(mut self, members: Vec<VarId>) -> Self {
        self.var_type = VarType::Aggregate;
        self.members = members;
        self
    }

    #[inline]
    pub fn is_parameter(&self) -> bool {
        self.param_index.is_some()
    }

    #[inline]
    pub fn is_aggregate(&self) -> bool {
        matches!(self.var_type, VarType::Aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_builder_sets_index() {
        let v = Variable::new(VarId(0), "p", VarType::Pointer).as_param(0);
        assert!(v.is_parameter());
        assert_eq!(v.param_index, Some(0));
    }

    #[test]
    fn with_members_flips_to_aggregate() {
        let v = Variable::new(VarId(0), "ab", VarType::Scalar)
            .with_members(vec![VarId(1), VarId(2)]);
        assert!(v.is_aggregate());
        assert_eq!(v.members.len(), 2);
    }
}
