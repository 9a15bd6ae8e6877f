use tracing::debug;

use crate::ast::{ClassDecl, FunctionDecl, Name, Node};

use super::error::RuntimeError;
use super::objects::check_visibility;
use super::output::OutputSink;
use super::state::{Frame, THIS};
use super::value::{ObjectId, Value};
use super::{Flow, Interpreter};

/// How a receiver is let go after a method returns.
#[derive(Debug, Clone, Copy)]
struct Receiver {
    id: ObjectId,
    /// Constructors run on an object nobody holds yet; it must survive.
    keep_alive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Invoke,
    Fetch,
}

impl<S: OutputSink> Interpreter<S> {
    // ── Free functions ──────────────────────────────────────────────────

    pub(crate) fn call_function(&mut self, function: &Name, args: &[Node]) -> Result<Value, RuntimeError> {
        let name = self.callable_name(function)?;
        let decl = self
            .state
            .function(&name)
            .ok_or(RuntimeError::FunctionNotFound { name: name.clone() })?;
        let actuals = self.eval_args(args)?;
        let frame = Frame {
            scope: name,
            ..Frame::default()
        };
        self.invoke(&decl, frame, actuals, None)
    }

    fn callable_name(&mut self, name: &Name) -> Result<String, RuntimeError> {
        match name {
            Name::Static(name) => Ok(name.clone()),
            Name::Dynamic(node) => match self.eval(node)? {
                Value::Const(name) => Ok(name),
                other => Err(RuntimeError::FunctionNameMustBeString {
                    found: other.kind(),
                }),
            },
        }
    }

    /// Arguments are evaluated left to right in the caller's context. Each
    /// is retained until it has been bound in the callee; if a later argument
    /// fails, the ones already evaluated are released.
    fn eval_args(&mut self, args: &[Node]) -> Result<Vec<Value>, RuntimeError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match self.eval(arg) {
                Ok(value) => {
                    self.state.retain_value(&value);
                    values.push(value);
                }
                Err(e) => {
                    for value in values {
                        self.state.release_value(value);
                    }
                    return Err(e);
                }
            }
        }
        Ok(values)
    }

    /// Runs `decl` in `frame`. Any activation of the same scope already in
    /// progress is suspended and restored afterwards; the callee scope is
    /// torn down on every exit path.
    fn invoke(
        &mut self,
        decl: &FunctionDecl,
        frame: Frame,
        actuals: Vec<Value>,
        receiver: Option<Receiver>,
    ) -> Result<Value, RuntimeError> {
        let scope = frame.scope.clone();
        debug!(scope = %scope, args = actuals.len(), "invoke");

        if let Some(receiver) = receiver {
            self.state.heap.retain(receiver.id);
        }
        let suspended = self.state.suspend_scope(&scope);
        let saved = self.state.enter(frame);

        let outcome = self.run_body(decl, actuals);

        // The return value must outlive the scope it may be bound in.
        if let Ok(value) = &outcome {
            self.state.retain_value(value);
        }
        self.state.drop_scope(&scope);
        if let Some(suspended) = suspended {
            self.state.resume_scope(suspended);
        }
        self.state.leave(saved);

        if let Some(receiver) = receiver {
            let returned = matches!(&outcome, Ok(value) if value.handles().contains(&receiver.id));
            if receiver.keep_alive || returned {
                self.state.heap.decrement(receiver.id);
            } else {
                self.state.release_object(receiver.id);
            }
        }
        if let Ok(value) = &outcome {
            self.state.disown_value(value);
        }
        outcome
    }

    fn run_body(&mut self, decl: &FunctionDecl, actuals: Vec<Value>) -> Result<Value, RuntimeError> {
        let held: Vec<Value> = actuals.clone();
        self.bind_parameters(decl, actuals);
        for value in &held {
            self.state.disown_value(value);
        }

        let passed = self.state.frame.passed_params;
        if passed < decl.params.len() {
            return Err(RuntimeError::ArgumentCountMismatch {
                function: self.state.frame.scope.clone(),
                expected: decl.params.len(),
                found: passed,
            });
        }

        match self.exec_block(&decl.body)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal(_) => Ok(Value::empty()),
        }
    }

    /// Binds arguments to the formals in order; surplus arguments are bound
    /// as `.argN` by position.
    fn bind_parameters(&mut self, decl: &FunctionDecl, actuals: Vec<Value>) {
        for value in actuals {
            let position = self.state.frame.passed_params;
            let name = match decl.params.get(position) {
                Some(param) => param.clone(),
                None => format!(".arg{}", position),
            };
            self.state.assign(&name, value, None);
            self.state.frame.passed_params += 1;
        }
    }

    // ── Objects ─────────────────────────────────────────────────────────

    pub(crate) fn new_object(&mut self, class: &Name, args: &[Node]) -> Result<Value, RuntimeError> {
        let name = self.member_name(class)?;
        let decl = self
            .state
            .class(&name)
            .ok_or(RuntimeError::ClassDefinitionNotFound { name })?;
        let id = self.instantiate(&decl)?;
        if let Err(e) = self.construct(&decl, id, args) {
            // Reclaimed unless the constructor stored `$this` somewhere.
            self.state.discard_temporary(&Value::Object(id));
            return Err(e);
        }
        Ok(Value::Object(id))
    }

    fn construct(&mut self, decl: &ClassDecl, id: ObjectId, args: &[Node]) -> Result<(), RuntimeError> {
        if let Some(constructor) = decl.constructor() {
            let actuals = self.eval_args(args)?;
            let frame = Frame {
                scope: format!("{}::{}", decl.name, constructor.function.name),
                class: Some(decl.name.clone()),
                object: Some(id),
                passed_params: 0,
            };
            let receiver = Receiver {
                id,
                keep_alive: true,
            };
            self.invoke(&constructor.function, frame, actuals, Some(receiver))?;
        }
        Ok(())
    }

    pub(crate) fn call_method(&mut self, target: &Node, method: &Name, args: &[Node]) -> Result<Value, RuntimeError> {
        let id = self.receiver(target, Access::Invoke)?;
        let class_name = self
            .state
            .class_of(id)
            .ok_or_else(|| RuntimeError::InvocationTargetInvalid {
                found: "Unknown".to_string(),
            })?
            .to_string();
        let class = self
            .state
            .class(&class_name)
            .ok_or(RuntimeError::ClassDefinitionNotFound { name: class_name })?;
        let name = self.callable_name(method)?;
        let Some(decl) = class.method(&name) else {
            return Err(RuntimeError::MethodNotFound {
                class: class.name.clone(),
                name,
            });
        };
        if !check_visibility(self.state.frame.class.as_deref(), &class, &name)? {
            return Err(RuntimeError::MemberNotVisible { member: name });
        }

        let actuals = self.eval_args(args)?;
        let frame = Frame {
            scope: format!("{}::{}", class.name, name),
            class: Some(class.name.clone()),
            object: Some(id),
            passed_params: 0,
        };
        let receiver = Receiver {
            id,
            keep_alive: false,
        };
        self.invoke(&decl.function, frame, actuals, Some(receiver))
    }

    pub(crate) fn fetch_attribute(&mut self, target: &Node, attribute: &Name) -> Result<Value, RuntimeError> {
        let id = self.receiver(target, Access::Fetch)?;
        let name = self.visible_attribute(id, attribute)?;
        let value = self.state.read_attribute(id, &name)?;

        // A receiver produced by an expression (`make()->x`) is dropped here
        // unless the fetched value keeps it reachable.
        self.state.retain_value(&value);
        self.state.discard_temporary(&Value::Object(id));
        self.state.disown_value(&value);
        Ok(value)
    }

    pub(crate) fn store_attribute(&mut self, target: &Node, attribute: &Name, value: &Node) -> Result<Value, RuntimeError> {
        let id = self.receiver(target, Access::Fetch)?;
        let name = self.visible_attribute(id, attribute)?;
        let value = match self.eval(value) {
            Ok(v) => v,
            Err(e) if e.is_missing_variable(&name) => {
                debug!(attribute = %name, "initializing self-referenced attribute");
                self.state.assign_attribute(id, &name, Value::Int(0));
                self.eval(value)?
            }
            Err(e) => return Err(e),
        };
        self.state.assign_attribute(id, &name, value.clone());

        // `(new C())->x = v` writes into an object nobody holds.
        self.state.retain_value(&value);
        self.state.discard_temporary(&Value::Object(id));
        self.state.disown_value(&value);
        Ok(value)
    }

    fn visible_attribute(&mut self, id: ObjectId, attribute: &Name) -> Result<String, RuntimeError> {
        let name = self.member_name(attribute)?;
        let class = self
            .state
            .class_of(id)
            .and_then(|class_name| self.state.class(class_name))
            .ok_or(RuntimeError::FetchTargetInvalid)?;
        if !check_visibility(self.state.frame.class.as_deref(), &class, &name)? {
            return Err(RuntimeError::MemberNotVisible { member: name });
        }
        Ok(name)
    }

    /// Evaluates the target of `->`. `$this` outside a method has no object.
    fn receiver(&mut self, target: &Node, access: Access) -> Result<ObjectId, RuntimeError> {
        if matches!(target, Node::Variable(name) if name == THIS) && self.state.frame.object.is_none() {
            return Err(match access {
                Access::Invoke => RuntimeError::InvocationTargetInvalid {
                    found: "Unknown".to_string(),
                },
                Access::Fetch => RuntimeError::FetchTargetInvalid,
            });
        }
        match self.eval(target)? {
            Value::Object(id) => Ok(id),
            other => Err(match access {
                Access::Invoke => RuntimeError::InvocationTargetInvalid {
                    found: other.kind().to_string(),
                },
                Access::Fetch => RuntimeError::FetchTargetInvalid,
            }),
        }
    }

    /// Class and attribute names computed at run time accept any scalar.
    fn member_name(&mut self, name: &Name) -> Result<String, RuntimeError> {
        match name {
            Name::Static(name) => Ok(name.clone()),
            Name::Dynamic(node) => match self.eval(node)? {
                value @ (Value::Array(_) | Value::Object(_)) => {
                    Err(RuntimeError::VariableNameMustBeString {
                        found: value.kind(),
                    })
                }
                value => Ok(value.to_string()),
            },
        }
    }
}
