//! Abstract syntax tree for least programs.
//!
//! One tagged type per layer: statements, conditions and expressions.
//! Bodies carry the unique ids the code generator turns into
//! `.end<id>`/`.entry<id>` labels. Parent links are not stored; the
//! parser resolves block nesting with its own stack and the finished
//! tree is plain ownership downwards.

use crate::dictionary::{AritOp, CmpOp, FuncId, LogOp, ValueFunc, VarType};

/// An ordered block of statements with a unique id (>= 1024).
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub body_id: u32,
    pub line: usize,
    pub children: Vec<Stmt>,
}

impl Body {
    pub fn new(body_id: u32, line: usize) -> Self {
        Body {
            body_id,
            line,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    If(If),
    While(While),
    Func(FuncCall),
}

/// One `if`/`elif` link of a conditional chain.
#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub line: usize,
    pub cond: Cond,
    pub body: Body,
    /// The next alternative of the chain, if any.
    pub alt: Option<Box<Branch>>,
    pub is_elif: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Branch {
    Elif(If),
    Else(ElseBranch),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseBranch {
    pub line: usize,
    pub body: Body,
}

impl If {
    /// Body id whose `.end` label terminates the entire chain: the body
    /// of the last alternative, or this body when the chain is just one
    /// `if`.
    pub fn real_end_id(&self) -> u32 {
        let mut last = self;
        loop {
            match last.alt.as_deref() {
                None => return last.body.body_id,
                Some(Branch::Else(els)) => return els.body.body_id,
                Some(Branch::Elif(elif)) => last = elif,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct While {
    pub line: usize,
    pub cond: Cond,
    pub body: Body,
}

/// A statement-level builtin call, e.g. `set a 1 + 2`.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncCall {
    pub line: usize,
    pub func: FuncId,
    pub args: Vec<Expr>,
}

/// A condition: comparison atoms composed with `&&`/`||`.
#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    /// `left op right`, or the truthy form `left` alone (compared
    /// against 1 at runtime) when the operator and right side are
    /// absent.
    Cmp {
        line: usize,
        left: Expr,
        cmp: Option<(CmpOp, Expr)>,
    },
    Log {
        line: usize,
        op: LogOp,
        left: Box<Cond>,
        right: Box<Cond>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const {
        line: usize,
        value: i64,
    },
    Var {
        line: usize,
        var_id: usize,
    },
    /// `array{index}`
    Access {
        line: usize,
        array_id: usize,
        index: Box<Expr>,
    },
    /// An interned string literal inside an lstr.
    Str {
        line: usize,
        str_id: usize,
    },
    /// Interpolated string: alternating `Str` and value expressions.
    Lstr {
        line: usize,
        format: Vec<Expr>,
    },
    Arit {
        line: usize,
        op: AritOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `-> time` and friends.
    VFunc {
        line: usize,
        func: ValueFunc,
        return_type: VarType,
    },
}

impl Expr {
    pub fn line(&self) -> usize {
        match self {
            Expr::Const { line, .. }
            | Expr::Var { line, .. }
            | Expr::Access { line, .. }
            | Expr::Str { line, .. }
            | Expr::Lstr { line, .. }
            | Expr::Arit { line, .. }
            | Expr::VFunc { line, .. } => *line,
        }
    }
}
