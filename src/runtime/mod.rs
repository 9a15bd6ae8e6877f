pub mod error;
pub mod invoke;
pub mod linker;
pub mod objects;
pub mod operators;
pub mod output;
pub mod state;
pub mod value;

use std::time::Instant;

use tracing::{debug, trace};

use crate::ast::*;

pub use error::RuntimeError;
pub use output::{BufferedOutput, OutputSink, StdoutOutput};
pub use state::{Frame, ProgramState, GLOBAL_SCOPE};
pub use value::{ArrayValue, ObjectId, Value, ValueKind};

use state::THIS;

/// Result of executing a node: either the value it produced, or a `return`
/// unwinding to the enclosing function.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal(Value),
    Return(Value),
}

impl Flow {
    pub fn into_value(self) -> Value {
        match self {
            Flow::Normal(value) | Flow::Return(value) => value,
        }
    }
}

/// Tree-walking interpreter. Program state persists across `run` calls until
/// `reset`, so a driver can feed it several programs in sequence.
pub struct Interpreter<S: OutputSink = BufferedOutput> {
    state: ProgramState,
    sink: S,
}

impl Interpreter<BufferedOutput> {
    pub fn new() -> Self {
        Self::with_sink(BufferedOutput::new())
    }

    /// Output produced so far.
    pub fn output(&self) -> &str {
        self.sink.as_str()
    }
}

impl Default for Interpreter<BufferedOutput> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: OutputSink> Interpreter<S> {
    pub fn with_sink(sink: S) -> Self {
        Self {
            state: ProgramState::default(),
            sink,
        }
    }

    pub fn state(&self) -> &ProgramState {
        &self.state
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Forget every variable, object, function and class.
    pub fn reset(&mut self) {
        self.state = ProgramState::default();
        self.sink.reset();
    }

    /// Registers the functions and classes of `program`. Fails on the first
    /// duplicate name, before any statement has run.
    pub fn register(&mut self, program: &Program) -> Result<(), RuntimeError> {
        for function in &program.functions {
            self.state.declare_function(function.clone())?;
        }
        for class in &program.classes {
            self.state.declare_class(class.clone())?;
        }
        Ok(())
    }

    /// Registers the declarations of `program` and runs its body. A
    /// top-level `return` ends the run.
    pub fn run(&mut self, program: &Program) -> Result<(), RuntimeError> {
        let start = Instant::now();
        self.register(program)?;
        let flow = self.exec_statement(&program.body)?;
        if let Flow::Return(value) = &flow {
            self.state.discard_temporary(value);
        }
        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            returned = matches!(flow, Flow::Return(_)),
            live_objects = self.state.live_objects(),
            "run finished"
        );
        Ok(())
    }

    // ── Execution ───────────────────────────────────────────────────────

    pub fn execute(&mut self, node: &Node) -> Result<Flow, RuntimeError> {
        match node {
            Node::Operation(op) => self.execute_operation(op),
            Node::Variable(name) => Ok(Flow::Normal(self.state.resolve(name, None)?)),
            Node::Constant(text) => Ok(Flow::Normal(Value::Const(text.clone()))),
            Node::Integer(n) => Ok(Flow::Normal(Value::Int(*n))),
            Node::Float(n) => Ok(Flow::Normal(Value::Float(*n))),
        }
    }

    /// Evaluates a node in expression position.
    pub(crate) fn eval(&mut self, node: &Node) -> Result<Value, RuntimeError> {
        Ok(self.execute(node)?.into_value())
    }

    /// Evaluates an operand the operation uses up. An object nobody stored
    /// is reclaimed as soon as it has been read.
    fn eval_consumed(&mut self, node: &Node) -> Result<Value, RuntimeError> {
        let value = self.eval(node)?;
        self.state.discard_temporary(&value);
        Ok(value)
    }

    /// Executes a node in statement position; an object the statement
    /// produced but nobody stored is reclaimed.
    fn exec_statement(&mut self, node: &Node) -> Result<Flow, RuntimeError> {
        let flow = self.execute(node)?;
        if let Flow::Normal(value) = &flow {
            self.state.discard_temporary(value);
        }
        Ok(flow)
    }

    pub(crate) fn exec_block(&mut self, nodes: &[Node]) -> Result<Flow, RuntimeError> {
        for node in nodes {
            if let Flow::Return(value) = self.exec_statement(node)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal(Value::empty()))
    }

    fn execute_operation(&mut self, op: &Operation) -> Result<Flow, RuntimeError> {
        trace!(opcode = op.opcode(), scope = %self.state.frame.scope, "execute");
        let value = match op {
            Operation::Sequence(nodes) => return self.exec_block(nodes),
            Operation::If {
                condition,
                then_branch,
            } => {
                if self.eval_consumed(condition)?.is_truthy() {
                    return self.exec_statement(then_branch);
                }
                Value::empty()
            }
            Operation::IfElse {
                condition,
                then_branch,
                else_branch,
            } => {
                let branch = if self.eval_consumed(condition)?.is_truthy() {
                    then_branch
                } else {
                    else_branch
                };
                return self.exec_statement(branch);
            }
            Operation::WhileDo { condition, body } => {
                while self.eval_consumed(condition)?.is_truthy() {
                    if let Flow::Return(value) = self.exec_statement(body)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Value::empty()
            }
            Operation::DoWhile { body, condition } => {
                loop {
                    if let Flow::Return(value) = self.exec_statement(body)? {
                        return Ok(Flow::Return(value));
                    }
                    if !self.eval_consumed(condition)?.is_truthy() {
                        break;
                    }
                }
                Value::empty()
            }
            Operation::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr)?,
                    None => Value::empty(),
                };
                return Ok(Flow::Return(value));
            }
            Operation::Echo(expr) => {
                let value = self.eval(expr)?;
                self.sink.emit(&value.to_string());
                self.state.discard_temporary(&value);
                Value::empty()
            }

            Operation::Assign { target, value } => self.exec_assign(target, value)?,
            Operation::ArrayAssign {
                variable,
                index,
                value,
            } => self.exec_array_assign(variable, index, value)?,
            Operation::ArrayFetch { variable, index } => {
                let keys = self.eval_keys(index)?;
                match keys.as_slice() {
                    [key] => self.state.read_array_element(variable, key, None)?,
                    _ => self.state.read_array_path(variable, &keys, None)?,
                }
            }

            Operation::Call { function, args } => self.call_function(function, args)?,
            Operation::New { class, args } => self.new_object(class, args)?,
            Operation::MethodCall {
                target,
                method,
                args,
            } => self.call_method(target, method, args)?,
            Operation::AttributeFetch { target, attribute } => {
                self.fetch_attribute(target, attribute)?
            }
            Operation::AttributeAssign {
                target,
                attribute,
                value,
            } => self.store_attribute(target, attribute, value)?,

            Operation::Compare { op, left, right } => {
                let l = self.eval_consumed(left)?;
                let r = self.eval_consumed(right)?;
                operators::compare(*op, &l, &r)?
            }
            Operation::Arithmetic { op, left, right } => {
                let l = self.eval_consumed(left)?;
                let r = self.eval_consumed(right)?;
                operators::arithmetic(*op, &l, &r)?
            }
            Operation::Negate(operand) => {
                let v = self.eval_consumed(operand)?;
                operators::negate(&v)?
            }
            Operation::Concat { left, right } => {
                let l = self.eval_consumed(left)?;
                let r = self.eval_consumed(right)?;
                operators::concat(&l, &r)
            }
        };
        Ok(Flow::Normal(value))
    }

    // ── Assignment ──────────────────────────────────────────────────────

    /// `$x = expr`. When `expr` reads the variable being assigned before it
    /// exists (`$i = $i + 1`), the variable starts at 0 and `expr` is
    /// evaluated once more.
    fn exec_assign(&mut self, target: &str, value: &Node) -> Result<Value, RuntimeError> {
        let name = self.state.link_name(target)?;
        if name == THIS {
            return Err(RuntimeError::ThisRedeclaration);
        }
        let value = match self.eval(value) {
            Ok(v) => v,
            Err(e) if e.is_missing_variable(&name) => {
                debug!(variable = %name, "initializing self-referenced variable");
                self.state.assign(&name, Value::Int(0), None);
                self.eval(value)?
            }
            Err(e) => return Err(e),
        };
        self.state.assign(&name, value.clone(), None);
        Ok(value)
    }

    fn exec_array_assign(&mut self, variable: &str, index: &Index, value: &Node) -> Result<Value, RuntimeError> {
        let name = self.state.link_name(variable)?;
        if name == THIS {
            return Err(RuntimeError::ThisRedeclaration);
        }
        let keys = self.eval_keys(index)?;
        let value = self.eval(value)?;
        match keys.as_slice() {
            [key] => self
                .state
                .assign_array_element(&name, key.clone(), value.clone(), None),
            _ => self.state.assign_array_path(&name, &keys, value.clone(), None),
        }
        Ok(value)
    }

    fn eval_keys(&mut self, index: &Index) -> Result<Vec<String>, RuntimeError> {
        match index {
            Index::Key(node) => Ok(vec![self.eval(node)?.to_key()?]),
            Index::Path(nodes) => {
                let mut keys = Vec::with_capacity(nodes.len());
                for node in nodes {
                    keys.push(self.eval(node)?.to_key()?);
                }
                Ok(keys)
            }
        }
    }
}
