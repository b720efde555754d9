use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a copy source is accessed: the argument value itself, one
/// dereference, or everything reachable from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    Value,
    Deref,
    Reachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceSpec {
    Arg(u8, AccessMode),
    Null,
    Universal,
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DestSpec {
    Return,
    Arg(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Alloc { size_arg: Option<u8> },
    Copy { dest: DestSpec, source: SourceSpec },
    Exit,
}

/// The pointer effects of one external function. An empty summary is an
/// explicit "no pointer effect" (the `IGNORE` form), which is distinct from
/// the function being absent from the table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectSummary {
    effects: Vec<Effect>,
}

impl EffectSummary {
    pub fn push(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.effects.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectTable {
    table: HashMap<String, EffectSummary>,
}

impl EffectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<&EffectSummary> {
        self.table.get(name)
    }

    pub fn insert_ignored(&mut self, name: impl Into<String>) {
        self.table.entry(name.into()).or_default();
    }

    pub fn insert_effect(&mut self, name: impl Into<String>, effect: Effect) {
        self.table.entry(name.into()).or_default().push(effect);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Merge `other` into `self`. Entries for the same function accumulate.
    pub fn extend(&mut self, other: EffectTable) {
        for (name, summary) in other.table {
            let slot = self.table.entry(name).or_default();
            for effect in summary.effects {
                slot.push(effect);
            }
        }
    }
}
