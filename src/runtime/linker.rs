//! Name resolution and value binding.
//!
//! A variable is a name in a scope table pointing at a storage slot. Every
//! write goes through [`ProgramState::bind`], which retains the handles of
//! the new value before releasing the old one, so overwriting a variable with
//! its own value never reclaims the object it holds.

use std::mem;

use tracing::trace;

use super::error::RuntimeError;
use super::objects::attribute_slot;
use super::state::{Binding, ProgramState, SlotKind, GLOBAL_SCOPE, THIS};
use super::value::{ArrayValue, ObjectId, Value};

impl ProgramState {
    /// Resolves a possibly dynamic variable name. A name beginning with `$`
    /// is replaced by the value of the variable it names, recursively.
    pub fn link_name(&self, name: &str) -> Result<String, RuntimeError> {
        let Some(inner) = name.strip_prefix('$') else {
            return Ok(name.to_string());
        };
        match self.resolve(inner, None)? {
            value @ (Value::Array(_) | Value::Object(_)) => {
                Err(RuntimeError::VariableNameMustBeString {
                    found: value.kind(),
                })
            }
            value => Ok(value.to_string()),
        }
    }

    /// Reads a variable: the given (or current) scope first, then global.
    /// `$this` inside a method is the receiver.
    pub fn resolve(&self, name: &str, scope: Option<&str>) -> Result<Value, RuntimeError> {
        let name = self.link_name(name)?;
        if name == THIS {
            if let Some(id) = self.frame.object {
                return Ok(Value::Object(id));
            }
        }
        self.lookup_binding(&name, scope)
            .and_then(|binding| self.storage.get(binding))
            .ok_or(RuntimeError::VariableNotFound { name })
    }

    /// Stores `value` under `name` in `scope` (the current scope by default).
    pub fn assign(&mut self, name: &str, value: Value, scope: Option<&str>) {
        let scope = scope.unwrap_or(self.frame.scope.as_str()).to_string();
        let key = format!("{}#{}", scope, name);
        self.bind(&scope, name, key, value);
    }

    pub fn assign_attribute(&mut self, id: ObjectId, attribute: &str, value: Value) {
        let slot = attribute_slot(id, attribute);
        self.bind(GLOBAL_SCOPE, &slot, slot.clone(), value);
    }

    pub fn read_attribute(&self, id: ObjectId, attribute: &str) -> Result<Value, RuntimeError> {
        let slot = attribute_slot(id, attribute);
        self.scopes
            .get(GLOBAL_SCOPE)
            .and_then(|table| table.get(&slot))
            .and_then(|binding| self.storage.get(binding))
            .ok_or_else(|| RuntimeError::VariableNotFound {
                name: attribute.to_string(),
            })
    }

    fn bind(&mut self, scope: &str, name: &str, key: String, value: Value) {
        trace!(scope, name, kind = %value.kind(), "bind");
        self.retain_value(&value);
        self.unlink(name, Some(scope));
        let kind = self.storage.insert(&key, value);
        self.scopes
            .entry(scope.to_string())
            .or_default()
            .insert(name.to_string(), Binding { kind, key });
    }

    /// Removes the binding of `name` in exactly `scope` and releases the
    /// value it held.
    pub fn unlink(&mut self, name: &str, scope: Option<&str>) {
        let scope = scope.unwrap_or(self.frame.scope.as_str());
        let Some(binding) = self
            .scopes
            .get_mut(scope)
            .and_then(|table| table.remove(name))
        else {
            return;
        };
        trace!(scope, name, "unlink");
        if let Some(old) = self.storage.remove(&binding) {
            self.release_value(old);
        }
    }

    // ── Arrays ──────────────────────────────────────────────────────────

    pub fn assign_array_element(&mut self, name: &str, key: String, value: Value, scope: Option<&str>) {
        self.assign_array_path(name, &[key], value, scope);
    }

    /// Writes `value` at `keys` inside the array bound to `name`. A variable
    /// that does not hold an array becomes an empty one first, and so does
    /// every non-array cell on the way down.
    pub fn assign_array_path(&mut self, name: &str, keys: &[String], value: Value, scope: Option<&str>) {
        let scope = scope.unwrap_or(self.frame.scope.as_str()).to_string();
        // Retained before the slot may be re-initialized: the value can hold
        // the very object the variable currently refers to.
        self.retain_value(&value);

        let existing = self
            .scopes
            .get(&scope)
            .and_then(|table| table.get(name))
            .filter(|binding| binding.kind == SlotKind::Array)
            .map(|binding| binding.key.clone());
        let key = match existing {
            Some(key) => key,
            None => {
                self.unlink(name, Some(&scope));
                let key = format!("{}#{}", scope, name);
                self.storage.insert(&key, Value::Array(ArrayValue::new()));
                self.scopes.entry(scope.clone()).or_default().insert(
                    name.to_string(),
                    Binding {
                        kind: SlotKind::Array,
                        key: key.clone(),
                    },
                );
                key
            }
        };

        trace!(scope = %scope, name, depth = keys.len(), "array write");
        let displaced = match self.storage.array_mut(&key) {
            Some(cells) => write_path(cells, keys, value),
            None => Vec::new(),
        };
        for old in displaced {
            self.release_value(old);
        }
    }

    pub fn read_array_element(&self, name: &str, key: &str, scope: Option<&str>) -> Result<Value, RuntimeError> {
        self.read_array_path(name, &[key.to_string()], scope)
    }

    /// Reads the cell at `keys`. A missing cell reads as the empty value.
    pub fn read_array_path(&self, name: &str, keys: &[String], scope: Option<&str>) -> Result<Value, RuntimeError> {
        let name = self.link_name(name)?;
        let binding = self
            .lookup_binding(&name, scope)
            .ok_or_else(|| RuntimeError::VariableNotFound { name: name.clone() })?;
        if binding.kind != SlotKind::Array {
            return Err(RuntimeError::ExpectedArrayNotFound { name });
        }
        let Some(mut cells) = self.storage.array(&binding.key) else {
            return Err(RuntimeError::VariableNotFound { name });
        };

        for (depth, key) in keys.iter().enumerate() {
            let last = depth + 1 == keys.len();
            match cells.get(key) {
                None => return Ok(Value::empty()),
                Some(value) if last => return Ok(value.clone()),
                Some(Value::Array(inner)) => cells = inner,
                Some(_) => {
                    return Err(RuntimeError::ExpectedArrayNotFound {
                        name: format!("{}[{}]", name, keys[..=depth].join("][")),
                    })
                }
            }
        }
        Ok(Value::empty())
    }
}

/// Stores `value` at `keys` and returns every value it displaced.
fn write_path(cells: &mut ArrayValue, keys: &[String], value: Value) -> Vec<Value> {
    let mut displaced = Vec::new();
    let Some((last, path)) = keys.split_last() else {
        return displaced;
    };

    let mut cells = cells;
    for key in path {
        let cell = cells
            .entry(key.clone())
            .or_insert_with(|| Value::Array(ArrayValue::new()));
        if !matches!(cell, Value::Array(_)) {
            displaced.push(mem::replace(cell, Value::Array(ArrayValue::new())));
        }
        cells = match cell {
            Value::Array(inner) => inner,
            _ => return displaced,
        };
    }

    if let Some(old) = cells.insert(last.clone(), value) {
        displaced.push(old);
    }
    displaced
}
