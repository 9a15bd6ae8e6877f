use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use tracing::debug;

use crate::ast::{ClassDecl, FunctionDecl};

use super::error::RuntimeError;
use super::objects::ObjectHeap;
use super::value::{ArrayValue, ObjectId, Value};

/// Name of the scope that holds top-level variables and object attributes.
pub const GLOBAL_SCOPE: &str = ".global";

/// The implicit receiver variable inside methods.
pub const THIS: &str = "this";

/// Which of the three stores a binding points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Scalar,
    Array,
    Object,
}

impl SlotKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Array(_) => SlotKind::Array,
            Value::Object(_) => SlotKind::Object,
            _ => SlotKind::Scalar,
        }
    }
}

/// Where a variable's value lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub kind: SlotKind,
    pub key: String,
}

// ── Storage ─────────────────────────────────────────────────────────────

/// Value stores keyed by storage key. Scalars and arrays are owned by their
/// slot; object slots only hold a handle.
#[derive(Debug, Default, Clone)]
pub struct Storage {
    scalars: HashMap<String, Value>,
    arrays: HashMap<String, ArrayValue>,
    handles: HashMap<String, ObjectId>,
}

impl Storage {
    pub fn insert(&mut self, key: &str, value: Value) -> SlotKind {
        let kind = SlotKind::of(&value);
        match value {
            Value::Array(cells) => {
                self.arrays.insert(key.to_string(), cells);
            }
            Value::Object(id) => {
                self.handles.insert(key.to_string(), id);
            }
            scalar => {
                self.scalars.insert(key.to_string(), scalar);
            }
        }
        kind
    }

    /// Copy of the stored value (arrays by value, objects by handle).
    pub fn get(&self, binding: &Binding) -> Option<Value> {
        match binding.kind {
            SlotKind::Scalar => self.scalars.get(&binding.key).cloned(),
            SlotKind::Array => self.arrays.get(&binding.key).cloned().map(Value::Array),
            SlotKind::Object => self.handles.get(&binding.key).copied().map(Value::Object),
        }
    }

    pub fn remove(&mut self, binding: &Binding) -> Option<Value> {
        match binding.kind {
            SlotKind::Scalar => self.scalars.remove(&binding.key),
            SlotKind::Array => self.arrays.remove(&binding.key).map(Value::Array),
            SlotKind::Object => self.handles.remove(&binding.key).map(Value::Object),
        }
    }

    pub fn array(&self, key: &str) -> Option<&ArrayValue> {
        self.arrays.get(key)
    }

    pub fn array_mut(&mut self, key: &str) -> Option<&mut ArrayValue> {
        self.arrays.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.scalars.len() + self.arrays.len() + self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Frames ──────────────────────────────────────────────────────────────

/// The active function context.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Scope name: `.global`, a function name, or `Class::method`.
    pub scope: String,
    /// Class of the executing method, if any.
    pub class: Option<String>,
    /// Receiver of the executing method, if any.
    pub object: Option<ObjectId>,
    pub passed_params: usize,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            scope: GLOBAL_SCOPE.to_string(),
            class: None,
            object: None,
            passed_params: 0,
        }
    }
}

/// Bindings and values of a scope taken out of the state while a recursive
/// activation of the same function runs.
#[derive(Debug)]
pub struct SuspendedScope {
    name: String,
    bindings: HashMap<String, Binding>,
    values: Vec<(Binding, Value)>,
}

// ── Program state ───────────────────────────────────────────────────────

/// Everything one program run mutates. Reset between runs by replacing it
/// with `ProgramState::default()`.
#[derive(Debug, Default)]
pub struct ProgramState {
    pub(crate) scopes: HashMap<String, HashMap<String, Binding>>,
    pub(crate) storage: Storage,
    pub(crate) heap: ObjectHeap,
    pub(crate) functions: HashMap<String, Rc<FunctionDecl>>,
    pub(crate) classes: HashMap<String, Rc<ClassDecl>>,
    pub(crate) frame: Frame,
}

impl ProgramState {
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Switch to `frame`, returning the one it replaces.
    pub fn enter(&mut self, frame: Frame) -> Frame {
        mem::replace(&mut self.frame, frame)
    }

    pub fn leave(&mut self, saved: Frame) {
        self.frame = saved;
    }

    // ── Declarations ────────────────────────────────────────────────────

    pub fn declare_function(&mut self, decl: FunctionDecl) -> Result<(), RuntimeError> {
        if self.functions.contains_key(&decl.name) {
            return Err(RuntimeError::FunctionRedeclared { name: decl.name });
        }
        debug!(function = %decl.name, params = decl.params.len(), "declared function");
        self.functions.insert(decl.name.clone(), Rc::new(decl));
        Ok(())
    }

    pub fn declare_class(&mut self, decl: ClassDecl) -> Result<(), RuntimeError> {
        if self.classes.contains_key(&decl.name) {
            return Err(RuntimeError::ClassRedeclared { name: decl.name });
        }
        for (i, method) in decl.methods.iter().enumerate() {
            let name = &method.function.name;
            if decl.methods[..i].iter().any(|m| &m.function.name == name) {
                return Err(RuntimeError::FunctionRedeclared {
                    name: format!("{}::{}", decl.name, name),
                });
            }
        }
        debug!(
            class = %decl.name,
            attributes = decl.attributes.len(),
            methods = decl.methods.len(),
            "declared class"
        );
        self.classes.insert(decl.name.clone(), Rc::new(decl));
        Ok(())
    }

    pub fn function(&self, name: &str) -> Option<Rc<FunctionDecl>> {
        self.functions.get(name).cloned()
    }

    pub fn class(&self, name: &str) -> Option<Rc<ClassDecl>> {
        self.classes.get(name).cloned()
    }

    // ── Scopes ──────────────────────────────────────────────────────────

    /// Binding of `name` in `scope`, or in the global scope when the name is
    /// not bound there.
    pub fn lookup_binding(&self, name: &str, scope: Option<&str>) -> Option<&Binding> {
        let scope = scope.unwrap_or(self.frame.scope.as_str());
        self.scopes
            .get(scope)
            .and_then(|table| table.get(name))
            .or_else(|| self.scopes.get(GLOBAL_SCOPE).and_then(|table| table.get(name)))
    }

    /// Takes an active scope out of the state so a new activation of the same
    /// function starts empty.
    pub fn suspend_scope(&mut self, name: &str) -> Option<SuspendedScope> {
        let bindings = self.scopes.remove(name)?;
        let values = bindings
            .values()
            .filter_map(|binding| {
                self.storage
                    .remove(binding)
                    .map(|value| (binding.clone(), value))
            })
            .collect();
        Some(SuspendedScope {
            name: name.to_string(),
            bindings,
            values,
        })
    }

    pub fn resume_scope(&mut self, suspended: SuspendedScope) {
        for (binding, value) in suspended.values {
            self.storage.insert(&binding.key, value);
        }
        self.scopes.insert(suspended.name, suspended.bindings);
    }

    /// Removes a scope and releases everything bound in it.
    pub fn drop_scope(&mut self, name: &str) {
        let Some(bindings) = self.scopes.remove(name) else {
            return;
        };
        for binding in bindings.values() {
            if let Some(value) = self.storage.remove(binding) {
                self.release_value(value);
            }
        }
    }

    // ── Inspection ──────────────────────────────────────────────────────

    /// Current reference count of a live object.
    pub fn references(&self, id: ObjectId) -> Option<usize> {
        self.heap.get(id).map(|record| record.references)
    }

    pub fn class_of(&self, id: ObjectId) -> Option<&str> {
        self.heap.get(id).map(|record| record.class_name.as_str())
    }

    pub fn live_objects(&self) -> usize {
        self.heap.live_count()
    }

    pub fn stored_values(&self) -> usize {
        self.storage.len()
    }
}
