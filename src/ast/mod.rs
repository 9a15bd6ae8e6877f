use std::fmt;

use serde::{Deserialize, Serialize};

// ── Nodes ───────────────────────────────────────────────────────────────

/// A node of the executable tree handed to the interpreter.
///
/// The tree is immutable once built. Names computed at run time are kept as
/// sub-expressions (see [`Name`]) and evaluated on every execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Operation(Box<Operation>),
    /// Variable reference without the leading `$`. A name that still starts
    /// with `$` is a variable-variable (`$$a` is stored as `"$a"`).
    Variable(String),
    Constant(String),
    Integer(i64),
    Float(f64),
}

impl Node {
    pub fn op(operation: Operation) -> Self {
        Node::Operation(Box::new(operation))
    }

    pub fn var(name: &str) -> Self {
        Node::Variable(name.to_string())
    }

    pub fn constant(text: &str) -> Self {
        Node::Constant(text.to_string())
    }

    /// Whether this expression can be folded without touching program state.
    /// Attribute initializers must satisfy this.
    pub fn is_constant_expression(&self) -> bool {
        match self {
            Node::Constant(_) | Node::Integer(_) | Node::Float(_) => true,
            Node::Variable(_) => false,
            Node::Operation(op) => match op.as_ref() {
                Operation::Compare { left, right, .. }
                | Operation::Arithmetic { left, right, .. }
                | Operation::Concat { left, right } => {
                    left.is_constant_expression() && right.is_constant_expression()
                }
                Operation::Negate(operand) => operand.is_constant_expression(),
                _ => false,
            },
        }
    }
}

/// A name that is either written literally or computed by an expression
/// (`$obj->$method()`, `new $class`, `$fn()`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Name {
    Static(String),
    Dynamic(Node),
}

impl Name {
    pub fn new(name: &str) -> Self {
        Name::Static(name.to_string())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Name::Static(name) => write!(f, "{}", name),
            Name::Dynamic(_) => write!(f, "<dynamic>"),
        }
    }
}

/// Array subscript of an array assignment or fetch: `$a[k]` or `$a[k1][k2]…`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Index {
    Key(Node),
    /// Keys in left-to-right order.
    Path(Vec<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
            CompareOp::Greater => ">",
            CompareOp::Less => "<",
            CompareOp::GreaterEqual => ">=",
            CompareOp::LessEqual => "<=",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Divide,
    Multiply,
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Divide => "/",
            ArithmeticOp::Multiply => "*",
        };
        write!(f, "{}", s)
    }
}

// ── Operations ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Sequence(Vec<Node>),
    Assign {
        target: String,
        value: Node,
    },
    If {
        condition: Node,
        then_branch: Node,
    },
    IfElse {
        condition: Node,
        then_branch: Node,
        else_branch: Node,
    },
    WhileDo {
        condition: Node,
        body: Node,
    },
    DoWhile {
        body: Node,
        condition: Node,
    },
    Call {
        function: Name,
        args: Vec<Node>,
    },
    Return(Option<Node>),
    Echo(Node),
    ArrayAssign {
        variable: String,
        index: Index,
        value: Node,
    },
    ArrayFetch {
        variable: String,
        index: Index,
    },
    New {
        class: Name,
        args: Vec<Node>,
    },
    MethodCall {
        target: Node,
        method: Name,
        args: Vec<Node>,
    },
    AttributeFetch {
        target: Node,
        attribute: Name,
    },
    AttributeAssign {
        target: Node,
        attribute: Name,
        value: Node,
    },
    Compare {
        op: CompareOp,
        left: Node,
        right: Node,
    },
    Arithmetic {
        op: ArithmeticOp,
        left: Node,
        right: Node,
    },
    Negate(Node),
    Concat {
        left: Node,
        right: Node,
    },
}

impl Operation {
    /// Opcode name, as logged by the evaluator.
    pub fn opcode(&self) -> &'static str {
        match self {
            Operation::Sequence(_) => "sequence",
            Operation::Assign { .. } => "assign",
            Operation::If { .. } => "if",
            Operation::IfElse { .. } => "if-else",
            Operation::WhileDo { .. } => "while-do",
            Operation::DoWhile { .. } => "do-while",
            Operation::Call { .. } => "free-call",
            Operation::Return(_) => "return",
            Operation::Echo(_) => "echo",
            Operation::ArrayAssign { .. } => "array-assign",
            Operation::ArrayFetch { .. } => "array-fetch",
            Operation::New { .. } => "object-new",
            Operation::MethodCall { .. } => "method-call",
            Operation::AttributeFetch { .. } => "attribute-fetch",
            Operation::AttributeAssign { .. } => "attribute-assign",
            Operation::Compare { .. } => "compare",
            Operation::Arithmetic { .. } => "arithmetic",
            Operation::Negate(_) => "negate",
            Operation::Concat { .. } => "concatenate",
        }
    }
}

// ── Declarations ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    Public,
    Protected,
    Private,
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modifier::Public => write!(f, "public"),
            Modifier::Protected => write!(f, "protected"),
            Modifier::Private => write!(f, "private"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    /// Formal parameter names without the leading `$`.
    pub params: Vec<String>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDecl {
    pub modifier: Modifier,
    pub name: String,
    #[serde(default)]
    pub init: Option<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub modifier: Modifier,
    pub function: FunctionDecl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub modifier: Modifier,
    pub name: String,
    pub attributes: Vec<AttributeDecl>,
    pub methods: Vec<MethodDecl>,
}

impl ClassDecl {
    pub fn method(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| m.function.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDecl> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// `__construct` wins over a method named after the class.
    pub fn constructor(&self) -> Option<&MethodDecl> {
        self.method("__construct").or_else(|| self.method(&self.name))
    }

    /// Declared modifier of a method or attribute, methods first.
    pub fn member_modifier(&self, member: &str) -> Option<Modifier> {
        self.method(member)
            .map(|m| m.modifier)
            .or_else(|| self.attribute(member).map(|a| a.modifier))
    }
}

// ── Program ─────────────────────────────────────────────────────────────

/// One parsed source text: the declarations found anywhere in it and the
/// statement sequence to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub functions: Vec<FunctionDecl>,
    pub classes: Vec<ClassDecl>,
    pub body: Node,
}

impl Program {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
