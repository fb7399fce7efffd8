//! Stack frames and variable bindings

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::stoex::{Scope, ScopeEntry, StoEx, Value};

static NEXT_FRAME: AtomicU64 = AtomicU64::new(1);

/// Identity of a frame, preserved by clones.
///
/// Used to check that the frame popped after a nested scope is the one
/// pushed before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

impl FrameId {
    fn next() -> Self {
        Self(NEXT_FRAME.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

/// Expression bound together with the frame it must be evaluated in.
#[derive(Debug, Clone)]
pub struct LateBinding {
    expression: StoEx,
    origin: Arc<Frame>,
}

impl LateBinding {
    /// Bind `expression` to a snapshot of its declaring frame.
    pub fn new(expression: StoEx, origin: Arc<Frame>) -> Self {
        Self { expression, origin }
    }

    /// The deferred expression.
    pub fn expression(&self) -> &StoEx {
        &self.expression
    }

    /// Frame the expression reads its variables from.
    pub fn origin(&self) -> &Frame {
        &self.origin
    }
}

/// Value held by a frame entry.
#[derive(Debug, Clone)]
pub enum Binding {
    /// Evaluated once, at bind time.
    Value(Value),
    /// Evaluated again on every read.
    Late(LateBinding),
}

impl Binding {
    /// The concrete value, if this is not a late binding.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Binding::Value(value) => Some(value),
            Binding::Late(_) => None,
        }
    }
}

impl From<Value> for Binding {
    fn from(value: Value) -> Self {
        Binding::Value(value)
    }
}

/// Map from qualified variable names (`x.VALUE`) to bindings, optionally
/// chained to a parent snapshot consulted for names it does not bind.
#[derive(Debug, Clone)]
pub struct Frame {
    id: FrameId,
    bindings: BTreeMap<String, Binding>,
    parent: Option<Arc<Frame>>,
}

impl Frame {
    /// Empty frame without parent.
    pub fn new() -> Self {
        Self {
            id: FrameId::next(),
            bindings: BTreeMap::new(),
            parent: None,
        }
    }

    /// Empty frame that falls back to `parent` for lookups.
    pub fn with_parent(parent: Arc<Frame>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::new()
        }
    }

    /// Frame identity.
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Parent snapshot, if any.
    pub fn parent(&self) -> Option<&Frame> {
        self.parent.as_deref()
    }

    /// Bind `name` to a concrete value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), Binding::Value(value));
    }

    /// Bind `name`, replacing an existing own binding.
    pub fn bind(&mut self, name: impl Into<String>, binding: Binding) {
        self.bindings.insert(name.into(), binding);
    }

    /// Resolve `name` in this frame, then along the parent chain.
    pub fn get(&self, name: &str) -> Option<&Binding> {
        let mut frame = Some(self);
        while let Some(current) = frame {
            if let Some(binding) = current.bindings.get(name) {
                return Some(binding);
            }
            frame = current.parent.as_deref();
        }
        None
    }

    /// Concrete value bound to `name`, if any.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(Binding::value)
    }

    /// Whether `name` resolves in this frame or its parents.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Bindings made directly in this frame.
    pub fn own_bindings(&self) -> impl Iterator<Item = (&String, &Binding)> {
        self.bindings.iter()
    }

    /// Every visible binding, inner frames shadowing their parents.
    pub fn contents(&self) -> BTreeMap<&str, &Binding> {
        let mut chain = Vec::new();
        let mut frame = Some(self);
        while let Some(current) = frame {
            chain.push(current);
            frame = current.parent.as_deref();
        }
        let mut visible = BTreeMap::new();
        for current in chain.into_iter().rev() {
            for (name, binding) in &current.bindings {
                visible.insert(name.as_str(), binding);
            }
        }
        visible
    }

    /// Number of own bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the frame binds nothing itself.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope for Frame {
    fn entry(&self, name: &str) -> Option<ScopeEntry<'_>> {
        self.get(name).map(|binding| match binding {
            Binding::Value(value) => ScopeEntry::Value(value),
            Binding::Late(late) => ScopeEntry::Late {
                expression: &late.expression,
                origin: late.origin.as_ref(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_falls_back_to_parent() {
        let mut parent = Frame::new();
        parent.set("a.VALUE", Value::Int(1));
        parent.set("b.VALUE", Value::Int(2));

        let mut child = Frame::with_parent(Arc::new(parent));
        child.set("a.VALUE", Value::Int(10));

        assert_eq!(child.value("a.VALUE"), Some(&Value::Int(10)));
        assert_eq!(child.value("b.VALUE"), Some(&Value::Int(2)));
        assert!(!child.contains("c.VALUE"));
        assert_eq!(child.len(), 1);

        let visible = child.contents();
        assert_eq!(visible.len(), 2);
        assert_eq!(visible["a.VALUE"].value(), Some(&Value::Int(10)));
    }

    #[test]
    fn test_clone_keeps_identity() {
        let frame = Frame::new();
        assert_eq!(frame.clone().id(), frame.id());
        assert_ne!(Frame::new().id(), frame.id());
    }

    #[test]
    fn test_late_binding_reads_origin() {
        let mut origin = Frame::new();
        origin.set("n.VALUE", Value::Int(3));

        let mut frame = Frame::new();
        frame.set("n.VALUE", Value::Int(99));
        frame.bind(
            "m.VALUE",
            Binding::Late(LateBinding::new(
                StoEx::parse("n.VALUE * 2").unwrap(),
                Arc::new(origin),
            )),
        );

        match frame.entry("m.VALUE") {
            Some(ScopeEntry::Late { expression, origin }) => {
                assert_eq!(expression.source(), "n.VALUE * 2");
                assert!(matches!(origin.entry("n.VALUE"), Some(ScopeEntry::Value(Value::Int(3)))));
            }
            _ => panic!("expected a late binding"),
        }
    }
}
