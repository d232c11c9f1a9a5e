//! Parameter plans: declared positional/context binding.
//!
//! A registered function declares up front which of its parameters bind to
//! the packet's positional arguments and which resolve by name against the
//! injection context. This replaces source introspection with an explicit
//! registration-time declaration.

use std::collections::BTreeMap;

use crosswire_core::Value;

/// A single declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamSlot {
    /// Takes the next positional call argument.
    Positional,
    /// Resolves by key against the injection context.
    Context(String),
}

/// Ordered parameter declaration for a handler or middleware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamPlan {
    slots: Vec<ParamSlot>,
}

impl ParamPlan {
    pub fn empty() -> Self {
        ParamPlan { slots: Vec::new() }
    }

    /// Plan of `n` purely positional parameters.
    pub fn positional(n: usize) -> Self {
        ParamPlan {
            slots: vec![ParamSlot::Positional; n],
        }
    }

    /// Append a positional slot.
    pub fn arg(mut self) -> Self {
        self.slots.push(ParamSlot::Positional);
        self
    }

    /// Append a context slot resolved by key.
    pub fn ctx(mut self, key: impl Into<String>) -> Self {
        self.slots.push(ParamSlot::Context(key.into()));
        self
    }

    pub fn slots(&self) -> &[ParamSlot] {
        &self.slots
    }

    /// Bind the plan: positional slots consume `args` in order (missing ones
    /// become `Absent`), context slots look up `injects` by key (unresolved
    /// ones become an empty map).
    pub fn resolve(&self, args: &[Value], injects: &BTreeMap<String, Value>) -> Vec<Value> {
        let mut pos = 0usize;
        self.slots
            .iter()
            .map(|slot| match slot {
                ParamSlot::Positional => {
                    let v = args.get(pos).cloned().unwrap_or(Value::Absent);
                    pos += 1;
                    v
                }
                ParamSlot::Context(key) => {
                    injects.get(key).cloned().unwrap_or_else(Value::empty_map)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn positional_and_context_interleave() {
        let mut injects = BTreeMap::new();
        injects.insert("meta".to_string(), Value::Str("m".into()));

        let plan = ParamPlan::empty().arg().ctx("meta").arg();
        let out = plan.resolve(&[Value::Int(1), Value::Int(2)], &injects);
        assert_eq!(
            out,
            vec![Value::Int(1), Value::Str("m".into()), Value::Int(2)]
        );
    }

    #[test]
    fn unresolved_context_is_empty_map_and_missing_arg_is_absent() {
        let plan = ParamPlan::empty().ctx("nope").arg();
        let out = plan.resolve(&[], &BTreeMap::new());
        assert_eq!(out, vec![Value::empty_map(), Value::Absent]);
    }
}
