//! The abstract-value lattice.
//!
//! `AbstractValue` is a sum type matched on directly rather than dispatched
//! through virtual methods; `ValueFact` wraps one value with its
//! path-condition tag and possible/inconclusive/error-path bits; `ValueSet`
//! is the per-token lattice element, either a bounded list of facts or
//! `Top`.

use crate::model::TokenId;
use serde::{Deserialize, Serialize};

/// A literal known at analysis time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum KnownValue {
    Int(i64),
    Float(OrderedFloat),
}

/// `f64` does not implement `Eq`/`Hash`; abstract values need both for set
/// dedup, so wrap it the way the rest of the ecosystem does for ordered
/// float keys rather than pulling in a dependency solely for this.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

/// Tagged union over the value kinds tracked during analysis. `TokSymbolic`
/// carries a reference to another token whose value is being tracked
/// symbolically rather than duplicating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AbstractValue {
    Known(KnownValue),
    SymbolicRange { low: i64, high: i64 },
    Uninit,
    Null,
    NonNull,
    ContainerSize(u64),
    Iterator { start: TokenId, end: TokenId },
    TokSymbolic(TokenId),
}

impl AbstractValue {
    pub fn known_int(v: i64) -> Self {
        AbstractValue::Known(KnownValue::Int(v))
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, AbstractValue::Null)
    }

    #[inline]
    pub fn is_uninit(&self) -> bool {
        matches!(self, AbstractValue::Uninit)
    }

    #[inline]
    pub fn is_nonnull(&self) -> bool {
        matches!(self, AbstractValue::NonNull)
    }
}

/// An opaque path-condition tag. `Unconditional` means the value holds on
/// every path reaching the token; any other tag means "only along the
/// branch this id names", and tags combine under implication at a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathTag {
    Unconditional,
    Branch(u32),
}

impl Default for PathTag {
    fn default() -> Self {
        PathTag::Unconditional
    }
}

/// One abstract value plus its lattice metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueFact {
    pub value: AbstractValue,
    pub path_tag: PathTag,
    /// `true` = "known to hold here", `false` = "known NOT to hold here".
    pub possible: bool,
    pub inconclusive: bool,
    pub error_path: bool,
}

impl ValueFact {
    pub fn new(value: AbstractValue) -> Self {
        Self {
            value,
            path_tag: PathTag::Unconditional,
            possible: true,
            inconclusive: false,
            error_path: false,
        }
    }

    pub fn with_tag(mut self, tag: PathTag) -> Self {
        self.path_tag = tag;
        self
    }

    pub fn inconclusive(mut self) -> Self {
        self.inconclusive = true;
        self
    }

    pub fn error_path(mut self) -> Self {
        self.error_path = true;
        self
    }
}

/// The value set attached to one token. `Top` is the widened/unknown
/// element; it refines to nothing and swallows everything it is joined
/// with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueSet {
    Values(Vec<ValueFact>),
    Top,
}

impl ValueSet {
    pub fn empty() -> Self {
        ValueSet::Values(Vec::new())
    }

    pub fn single(fact: ValueFact) -> Self {
        ValueSet::Values(vec![fact])
    }

    pub fn top() -> Self {
        ValueSet::Top
    }

    #[inline]
    pub fn is_top(&self) -> bool {
        matches!(self, ValueSet::Top)
    }

    pub fn facts(&self) -> &[ValueFact] {
        match self {
            ValueSet::Values(v) => v,
            ValueSet::Top => &[],
        }
    }

    /// Add a fact, widening to `Top` if doing so would exceed `bound`
    /// distinct values. Cardinality never exceeds `bound + 1`, the `+1`
    /// covering the `Top` marker itself.
    pub fn push(&mut self, fact: ValueFact, bound: usize) {
        if self.is_top() {
            return;
        }
        let ValueSet::Values(values) = self else {
            unreachable!()
        };
        if values.iter().any(|existing| existing.value == fact.value) {
            return;
        }
        if values.len() >= bound {
            *self = ValueSet::Top;
            return;
        }
        values.push(fact);
    }

    /// `join(a, b)`: set union with widening at the cardinality bound.
    pub fn join(&self, other: &ValueSet, bound: usize) -> ValueSet {
        if self.is_top() || other.is_top() {
            return ValueSet::Top;
        }
        let mut result = self.clone();
        for fact in other.facts() {
            result.push(fact.clone(), bound);
            if result.is_top() {
                break;
            }
        }
        result
    }

    /// `meet(a, b)`: set intersection by value (path tags/bits are not part
    /// of the equality test: a value present under two different branches
    /// that later join back together still meets to itself).
    pub fn meet(&self, other: &ValueSet) -> ValueSet {
        match (self, other) {
            (ValueSet::Top, _) => other.clone(),
            (_, ValueSet::Top) => self.clone(),
            (ValueSet::Values(a), ValueSet::Values(b)) => {
                let kept: Vec<ValueFact> = a
                    .iter()
                    .filter(|fa| b.iter().any(|fb| fb.value == fa.value))
                    .cloned()
                    .collect();
                ValueSet::Values(kept)
            }
        }
    }

    /// Drop values inconsistent with an observed-true predicate. `Top`
    /// refines to nothing.
    pub fn refine<F: Fn(&AbstractValue) -> bool>(&self, predicate: F) -> ValueSet {
        match self {
            ValueSet::Top => ValueSet::empty(),
            ValueSet::Values(values) => {
                ValueSet::Values(values.iter().filter(|f| predicate(&f.value)).cloned().collect())
            }
        }
    }

    /// Stamp a path-condition tag onto every value in the set.
    pub fn promote(&self, tag: PathTag) -> ValueSet {
        match self {
            ValueSet::Top => ValueSet::Top,
            ValueSet::Values(values) => ValueSet::Values(
                values
                    .iter()
                    .cloned()
                    .map(|mut f| {
                        f.path_tag = tag;
                        f
                    })
                    .collect(),
            ),
        }
    }

    pub fn contains(&self, predicate: impl Fn(&AbstractValue) -> bool) -> bool {
        self.facts().iter().any(|f| f.possible && predicate(&f.value))
    }

    #[inline]
    pub fn contains_uninit(&self) -> bool {
        self.contains(AbstractValue::is_uninit)
    }

    #[inline]
    pub fn contains_null(&self) -> bool {
        self.contains(AbstractValue::is_null)
    }

    #[inline]
    pub fn contains_nonnull(&self) -> bool {
        self.contains(AbstractValue::is_nonnull)
    }
}

impl Default for ValueSet {
    fn default() -> Self {
        ValueSet::empty()
    }
}
