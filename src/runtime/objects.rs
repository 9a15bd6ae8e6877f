use tracing::debug;

use crate::ast::{ClassDecl, Modifier};

use super::error::RuntimeError;
use super::output::OutputSink;
use super::state::{ProgramState, GLOBAL_SCOPE};
use super::value::{ObjectId, Value};
use super::Interpreter;

// ── Heap ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    pub id: ObjectId,
    /// Number of slots (variables, attributes, array cells) holding a handle.
    pub references: usize,
    pub class_name: String,
}

/// Object records indexed by `ObjectId`. Indices are never reused within a
/// run, so a stale handle can only miss, never alias.
#[derive(Debug, Default, Clone)]
pub struct ObjectHeap {
    slots: Vec<Option<ObjectRecord>>,
}

impl ObjectHeap {
    pub fn allocate(&mut self, class_name: &str) -> ObjectId {
        let id = ObjectId(self.slots.len());
        self.slots.push(Some(ObjectRecord {
            id,
            references: 0,
            class_name: class_name.to_string(),
        }));
        id
    }

    pub fn get(&self, id: ObjectId) -> Option<&ObjectRecord> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: ObjectId) -> Option<&mut ObjectRecord> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn retain(&mut self, id: ObjectId) {
        if let Some(record) = self.get_mut(id) {
            record.references += 1;
        }
    }

    /// Decrements the count and returns what is left.
    pub fn decrement(&mut self, id: ObjectId) -> Option<usize> {
        let record = self.get_mut(id)?;
        record.references = record.references.saturating_sub(1);
        Some(record.references)
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<ObjectRecord> {
        self.slots.get_mut(id.0).and_then(Option::take)
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

// ── Reference counting ──────────────────────────────────────────────────

impl ProgramState {
    pub fn retain_value(&mut self, value: &Value) {
        for id in value.handles() {
            self.heap.retain(id);
        }
    }

    /// Drops one reference per handle in `value`, reclaiming objects that
    /// reach zero.
    pub fn release_value(&mut self, value: Value) {
        for id in value.handles() {
            self.release_object(id);
        }
    }

    /// Drops one reference per handle without reclaiming anything. Used when
    /// a value is handed back to an expression that has not stored it yet.
    pub fn disown_value(&mut self, value: &Value) {
        for id in value.handles() {
            self.heap.decrement(id);
        }
    }

    pub fn release_object(&mut self, id: ObjectId) {
        if self.heap.decrement(id) == Some(0) {
            self.delete_object(id);
        }
    }

    /// Reclaims objects in `value` that nothing refers to.
    pub fn discard_temporary(&mut self, value: &Value) {
        for id in value.handles() {
            if self.references(id) == Some(0) {
                self.delete_object(id);
            }
        }
    }

    fn delete_object(&mut self, id: ObjectId) {
        let Some(record) = self.heap.remove(id) else {
            return;
        };
        debug!(object = %id, class = %record.class_name, "reclaiming object");
        let attributes: Vec<String> = self
            .classes
            .get(&record.class_name)
            .map(|class| class.attributes.iter().map(|a| a.name.clone()).collect())
            .unwrap_or_default();
        for attribute in attributes {
            self.unlink(&attribute_slot(id, &attribute), Some(GLOBAL_SCOPE));
        }
    }
}

/// Global-scope name (and storage key) of an object attribute.
pub fn attribute_slot(id: ObjectId, attribute: &str) -> String {
    format!("{}::{}", id, attribute)
}

// ── Visibility ──────────────────────────────────────────────────────────

/// Whether code running in `invoker` may touch `member` of `class`.
/// Undeclared members are not visible. Protected access from another class
/// would need inheritance, which the language does not have.
pub fn check_visibility(
    invoker: Option<&str>,
    class: &ClassDecl,
    member: &str,
) -> Result<bool, RuntimeError> {
    let Some(modifier) = class.member_modifier(member) else {
        return Ok(false);
    };
    let same_class = invoker == Some(class.name.as_str());
    match modifier {
        Modifier::Public => Ok(true),
        Modifier::Private => Ok(same_class),
        Modifier::Protected if same_class => Ok(true),
        Modifier::Protected => Err(RuntimeError::InheritanceUnsupported {
            invoker: invoker.unwrap_or(GLOBAL_SCOPE).to_string(),
            class: class.name.clone(),
            member: member.to_string(),
        }),
    }
}

// ── Instantiation ───────────────────────────────────────────────────────

impl<S: OutputSink> Interpreter<S> {
    /// Allocates an object of `class` and initializes every declared
    /// attribute. The new object starts with no references.
    pub(crate) fn instantiate(&mut self, class: &ClassDecl) -> Result<ObjectId, RuntimeError> {
        for attribute in &class.attributes {
            if let Some(init) = &attribute.init {
                if !init.is_constant_expression() {
                    return Err(RuntimeError::NonConstantAttributeInit {
                        attribute: attribute.name.clone(),
                        class: class.name.clone(),
                    });
                }
            }
        }

        let id = self.state.heap.allocate(&class.name);
        for attribute in &class.attributes {
            let value = match &attribute.init {
                Some(init) => self.eval(init)?,
                None => Value::empty(),
            };
            self.state.assign_attribute(id, &attribute.name, value);
        }
        debug!(class = %class.name, object = %id, "instantiated object");
        Ok(id)
    }
}
