//! Parser: token stream to abstract syntax tree.
//!
//! A single left-to-right walk over the tokens. Nesting is handled with
//! an explicit stack of open blocks; `elif`/`else` extend the innermost
//! open `if` chain and `end` folds the finished chain (or loop) into its
//! parent body. Arithmetic expressions are restructured for precedence
//! in two passes: `* / %` runs collapse into left-associative subtrees
//! first, the remaining `+ -` operators fold left-associatively second.

use crate::ast::{Body, Branch, Cond, ElseBranch, Expr, FuncCall, If, Stmt, While};
use crate::context::CompileInfo;
use crate::diagnostics::CompileError;
use crate::dictionary::{AritOp, FuncId, Keyword, LogOp};
use crate::lexer::{LstrSegment, Token, TokenKind};

/// Parse a token list into the top-level body.
pub fn gen_ast(tokens: &[Token], c_info: &mut CompileInfo) -> Result<Body, CompileError> {
    Parser::new(tokens).parse(c_info)
}

/// A block that has been opened but not yet `end`ed.
enum OpenBlock {
    If(OpenChain),
    While {
        line: usize,
        cond: Cond,
        body: Body,
    },
}

/// An `if`/`elif*`/`else?` chain under construction. Statements go into
/// the body of `current`; `elif`/`else` finish the current branch and
/// start the next one.
struct OpenChain {
    finished: Vec<OpenBranch>,
    current: OpenBranch,
}

struct OpenBranch {
    line: usize,
    /// `None` marks the `else` branch.
    cond: Option<Cond>,
    body: Body,
    is_elif: bool,
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    root: Body,
    blocks: Vec<OpenBlock>,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        let first_line = tokens.first().map(|t| t.line).unwrap_or(0);
        Parser {
            tokens,
            pos: 0,
            // The root body id is assigned in parse(); 0 is a placeholder.
            root: Body::new(0, first_line),
            blocks: Vec::new(),
        }
    }

    fn parse(mut self, c_info: &mut CompileInfo) -> Result<Body, CompileError> {
        self.root.body_id = c_info.next_body_id();

        while self.pos < self.tokens.len() {
            let token = &self.tokens[self.pos];
            c_info.err.set_line(token.line);

            match &token.kind {
                TokenKind::Key(key) => self.parse_keyword(*key, c_info)?,
                TokenKind::Eol | TokenKind::Sep => {}
                TokenKind::Var(name) => {
                    return Err(c_info.err.error(format!(
                        "Unexpected occurence of word expected to be variable: '{}'",
                        name
                    )));
                }
                _ => return Err(c_info.err.error("Invalid instruction")),
            }

            self.pos += 1;
        }

        c_info
            .err
            .on_false(self.blocks.is_empty(), "Unresolved blocks")?;

        Ok(self.root)
    }

    fn parse_keyword(&mut self, key: Keyword, c_info: &mut CompileInfo) -> Result<(), CompileError> {
        let line = self.tokens[self.pos].line;

        match key {
            Keyword::If => {
                self.pos += 1;
                let cond = self.parse_condition(c_info)?;
                self.blocks.push(OpenBlock::If(OpenChain {
                    finished: Vec::new(),
                    current: OpenBranch {
                        line,
                        cond: Some(cond),
                        body: Body::new(c_info.next_body_id(), line),
                        is_elif: false,
                    },
                }));
            }
            Keyword::Elif => {
                c_info
                    .err
                    .on_false(self.open_chain_active(), "Unexpected elif")?;
                self.pos += 1;
                let cond = self.parse_condition(c_info)?;
                let chain = match self.blocks.last_mut() {
                    Some(OpenBlock::If(chain)) => chain,
                    _ => unreachable!(),
                };
                let next = OpenBranch {
                    line,
                    cond: Some(cond),
                    body: Body::new(c_info.next_body_id(), line),
                    is_elif: true,
                };
                chain.finished.push(std::mem::replace(&mut chain.current, next));
            }
            Keyword::Else => {
                c_info
                    .err
                    .on_false(self.open_chain_active(), "Unexpected else")?;
                c_info.err.on_false(
                    matches!(
                        self.tokens.get(self.pos + 1).map(|t| &t.kind),
                        Some(TokenKind::Eol)
                    ),
                    "Else accepts no arguments",
                )?;
                let chain = match self.blocks.last_mut() {
                    Some(OpenBlock::If(chain)) => chain,
                    _ => unreachable!(),
                };
                let next = OpenBranch {
                    line,
                    cond: None,
                    body: Body::new(c_info.next_body_id(), line),
                    is_elif: false,
                };
                chain.finished.push(std::mem::replace(&mut chain.current, next));
            }
            Keyword::While => {
                self.pos += 1;
                let cond = self.parse_condition(c_info)?;
                self.blocks.push(OpenBlock::While {
                    line,
                    cond,
                    body: Body::new(c_info.next_body_id(), line),
                });
            }
            Keyword::End => {
                let block = self
                    .blocks
                    .pop()
                    .ok_or_else(|| c_info.err.error("Unexpected end"))?;
                let stmt = match block {
                    OpenBlock::While { line, cond, body } => {
                        Stmt::While(While { line, cond, body })
                    }
                    OpenBlock::If(chain) => Stmt::If(fold_chain(chain)),
                };
                self.current_body().children.push(stmt);
            }
            _ => match key.func() {
                Some(func) => self.parse_func(func, c_info)?,
                None => return Err(c_info.err.error("Invalid instruction")),
            },
        }

        Ok(())
    }

    /// Whether the innermost open block is an `if` chain that can still
    /// take an `elif`/`else` (its current branch is not the `else`).
    fn open_chain_active(&self) -> bool {
        matches!(
            self.blocks.last(),
            Some(OpenBlock::If(chain)) if chain.current.cond.is_some()
        )
    }

    /// The body new statements are appended to.
    fn current_body(&mut self) -> &mut Body {
        match self.blocks.last_mut() {
            Some(OpenBlock::If(chain)) => &mut chain.current.body,
            Some(OpenBlock::While { body, .. }) => body,
            None => &mut self.root,
        }
    }

    /// Parse a function call's arguments, delimited by `;` up to the end
    /// of the line, and append the finished call.
    fn parse_func(&mut self, func: FuncId, c_info: &mut CompileInfo) -> Result<(), CompileError> {
        let line = self.tokens[self.pos].line;

        if func == FuncId::Putchar {
            c_info.req_libs.putchar = true;
        }

        self.pos += 1;
        let mut args = Vec::new();

        loop {
            if matches!(self.tokens[self.pos].kind, TokenKind::Eol) {
                break;
            }
            let stop = self.next_sep_or_eol();

            match &self.tokens[self.pos].kind {
                TokenKind::Lstr(segments) => {
                    c_info.err.on_true(
                        stop - self.pos > 1,
                        "Excess tokens after string argument",
                    )?;
                    let lstr_line = self.tokens[self.pos].line;
                    args.push(lstr_to_expr(segments, lstr_line, c_info)?);
                }
                _ => {
                    args.push(parse_arit_expr(&self.tokens[self.pos..stop], c_info)?);
                }
            }

            if matches!(self.tokens[stop].kind, TokenKind::Eol) {
                self.pos = stop;
                break;
            }
            self.pos = stop + 1;
        }

        self.current_body()
            .children
            .push(Stmt::Func(FuncCall { line, func, args }));

        Ok(())
    }

    /// Index of the next `;` or end-of-line token at or after `pos`.
    fn next_sep_or_eol(&self) -> usize {
        let mut i = self.pos;
        while !matches!(self.tokens[i].kind, TokenKind::Sep | TokenKind::Eol) {
            i += 1;
        }
        i
    }

    /// Parse a condition up to the end of the line. Atoms separated by
    /// `&&`/`||` fold left-associatively into a boolean tree; each atom
    /// holds at most one comparison. Leaves `pos` at the `Eol`.
    fn parse_condition(&mut self, c_info: &mut CompileInfo) -> Result<Cond, CompileError> {
        let start = self.pos;
        let mut eol = start;
        while eol < self.tokens.len() && !matches!(self.tokens[eol].kind, TokenKind::Eol) {
            eol += 1;
        }
        let slice = &self.tokens[start..eol];

        let mut atoms: Vec<&[Token]> = Vec::new();
        let mut ops: Vec<(LogOp, usize)> = Vec::new();
        let mut atom_start = 0;
        for (i, tk) in slice.iter().enumerate() {
            if let TokenKind::Log(op) = tk.kind {
                atoms.push(&slice[atom_start..i]);
                ops.push((op, tk.line));
                atom_start = i + 1;
            }
        }
        atoms.push(&slice[atom_start..]);

        let mut cond = parse_cmp_atom(atoms[0], c_info)?;
        for (i, (op, line)) in ops.into_iter().enumerate() {
            let right = parse_cmp_atom(atoms[i + 1], c_info)?;
            cond = Cond::Log {
                line,
                op,
                left: Box::new(cond),
                right: Box::new(right),
            };
        }

        self.pos = eol;
        Ok(cond)
    }
}

/// Fold a finished chain into the nested `If` node, last branch first.
fn fold_chain(chain: OpenChain) -> If {
    let mut branches = chain.finished;
    branches.push(chain.current);

    let mut alt: Option<Box<Branch>> = None;
    for branch in branches.into_iter().rev() {
        match branch.cond {
            None => {
                alt = Some(Box::new(Branch::Else(ElseBranch {
                    line: branch.line,
                    body: branch.body,
                })));
            }
            Some(cond) => {
                let node = If {
                    line: branch.line,
                    cond,
                    body: branch.body,
                    alt: alt.take(),
                    is_elif: branch.is_elif,
                };
                if node.is_elif {
                    alt = Some(Box::new(Branch::Elif(node)));
                } else {
                    // The first branch of the chain; everything is folded.
                    return node;
                }
            }
        }
    }

    unreachable!("chain always starts with a non-elif if");
}

/// One comparison atom: at most one comparison operator, sides parsed as
/// arithmetic expressions. No operator yields the truthy form.
fn parse_cmp_atom(ts: &[Token], c_info: &mut CompileInfo) -> Result<Cond, CompileError> {
    let mut cmp_at = None;
    for (i, tk) in ts.iter().enumerate() {
        if let TokenKind::Cmp(op) = tk.kind {
            c_info
                .err
                .on_true(cmp_at.is_some(), "Found two operators")?;
            cmp_at = Some((i, op));
        }
    }

    c_info.err.on_true(
        ts.is_empty(),
        "Expected constant, variable or arithmetic expression",
    )?;
    let line = ts[0].line;

    match cmp_at {
        Some((i, op)) => {
            c_info.err.on_true(
                i == 0,
                "Expected constant, variable or arithmetic expression",
            )?;
            let left = parse_arit_expr(&ts[..i], c_info)?;
            let right = parse_arit_expr(&ts[i + 1..], c_info)?;
            Ok(Cond::Cmp {
                line,
                left,
                cmp: Some((op, right)),
            })
        }
        None => Ok(Cond::Cmp {
            line,
            left: parse_arit_expr(ts, c_info)?,
            cmp: None,
        }),
    }
}

/// Stage-one output: either a finished operand tree or a `+ -` operator
/// waiting for stage two.
enum Linearized {
    Node(Expr),
    PendingOp { line: usize, op: AritOp },
}

/// Parse a token slice into an expression tree respecting precedence.
pub fn parse_arit_expr(ts: &[Token], c_info: &mut CompileInfo) -> Result<Expr, CompileError> {
    c_info.err.on_true(
        ts.is_empty(),
        "Expected constant, variable or arithmetic expression",
    )?;

    let len = ts.len();
    let mut s2: Vec<Linearized> = Vec::new();
    let mut last_op: Option<AritOp> = None;

    // Stage one: collapse `* / %` runs in place, keep `+ -` and their
    // operands for stage two.
    for i in 0..len {
        let next_op = ts[i + 1..].iter().find_map(|t| match t.kind {
            TokenKind::Arit(op) => Some(op),
            _ => None,
        });

        let is_operator = matches!(ts[i].kind, TokenKind::Arit(_));
        // An operand owned by an upcoming `* / %` is consumed by it.
        if next_op.is_some_and(|op| op.has_precedence()) && !is_operator {
            continue;
        }

        match ts[i].kind {
            TokenKind::Arit(op) if op.has_precedence() => {
                c_info.err.on_false(
                    i > 0 && is_operand_token(&ts[i - 1].kind),
                    format!("Expected number before '{}' operator", op.as_str()),
                )?;
                c_info.err.on_false(
                    i + 1 < len && is_operand_token(&ts[i + 1].kind),
                    format!("Expected number after '{}' operator", op.as_str()),
                )?;

                if last_op.is_some_and(|op| op.has_precedence()) {
                    // Following another `* / %`: fold the previous subtree
                    // in as our left side.
                    let right = node_from_operand(&ts[i + 1], c_info)?;
                    let left = match s2.pop() {
                        Some(Linearized::Node(node)) => node,
                        _ => return Err(c_info.err.error("Malformed arithmetic expression")),
                    };
                    s2.push(Linearized::Node(Expr::Arit {
                        line: ts[i].line,
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    }));
                } else {
                    let left = node_from_operand(&ts[i - 1], c_info)?;
                    let right = node_from_operand(&ts[i + 1], c_info)?;
                    s2.push(Linearized::Node(Expr::Arit {
                        line: ts[i].line,
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    }));
                }
                last_op = Some(op);
            }
            TokenKind::Arit(op) => {
                s2.push(Linearized::PendingOp {
                    line: ts[i].line,
                    op,
                });
                last_op = Some(op);
            }
            _ => {
                // Already folded into the preceding multiplication.
                if last_op.is_some_and(|op| op.has_precedence()) {
                    continue;
                }
                s2.push(Linearized::Node(node_from_operand(&ts[i], c_info)?));
            }
        }
    }

    // Stage two: fold the remaining `+ -` operators left-associatively.
    let mut items = s2.into_iter();
    let mut acc = match items.next() {
        Some(Linearized::Node(node)) => node,
        Some(Linearized::PendingOp { op, .. }) => {
            return Err(c_info
                .err
                .error(format!("Expected number before '{}' operator", op.as_str())));
        }
        None => return Err(c_info.err.error("Malformed arithmetic expression")),
    };

    while let Some(item) = items.next() {
        let (line, op) = match item {
            Linearized::PendingOp { line, op } => (line, op),
            Linearized::Node(_) => {
                return Err(c_info.err.error("Malformed arithmetic expression"));
            }
        };
        let right = match items.next() {
            Some(Linearized::Node(node)) => node,
            Some(Linearized::PendingOp { .. }) => {
                return Err(c_info.err.error("+/- followed by another +/-"));
            }
            None => {
                return Err(c_info
                    .err
                    .error(format!("Expected number after operand '{}'", op.as_str())));
            }
        };
        acc = Expr::Arit {
            line,
            op,
            left: Box::new(acc),
            right: Box::new(right),
        };
    }

    Ok(acc)
}

fn is_operand_token(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Num(_) | TokenKind::Var(_) | TokenKind::Access { .. } | TokenKind::CompleteCall(_)
    )
}

/// Tree node from a single operand token.
fn node_from_operand(token: &Token, c_info: &mut CompileInfo) -> Result<Expr, CompileError> {
    match &token.kind {
        TokenKind::Num(value) => Ok(Expr::Const {
            line: token.line,
            value: *value,
        }),
        TokenKind::Var(name) => Ok(Expr::Var {
            line: token.line,
            var_id: c_info.check_var(name),
        }),
        TokenKind::Access { name, index } => {
            let array_id = c_info.check_var(name);
            let index = parse_arit_expr(index, c_info)?;
            Ok(Expr::Access {
                line: token.line,
                array_id,
                index: Box::new(index),
            })
        }
        TokenKind::CompleteCall(func) => Ok(Expr::VFunc {
            line: token.line,
            func: *func,
            return_type: func.return_type(),
        }),
        _ => Err(c_info
            .err
            .error("Expected constant, variable or arithmetic expression")),
    }
}

/// Lower an lstr token's segments into the AST form: interned string
/// fragments alternating with parsed value expressions.
fn lstr_to_expr(
    segments: &[LstrSegment],
    line: usize,
    c_info: &mut CompileInfo,
) -> Result<Expr, CompileError> {
    let mut format = Vec::new();
    for segment in segments {
        match segment {
            LstrSegment::Text(text) => {
                format.push(Expr::Str {
                    line,
                    str_id: c_info.check_str(text),
                });
            }
            LstrSegment::Expr(tokens) => {
                format.push(parse_arit_expr(tokens, c_info)?);
            }
        }
    }
    Ok(Expr::Lstr { line, format })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::{AritOp, CmpOp};
    use crate::lexer;

    fn parse(source: &str) -> Result<(Body, CompileInfo), CompileError> {
        let mut c_info = CompileInfo::new("test.least");
        let tokens = lexer::lex(source, &mut c_info)?;
        let root = gen_ast(&tokens, &mut c_info)?;
        Ok((root, c_info))
    }

    fn parse_expr(source: &str) -> Expr {
        let mut c_info = CompileInfo::new("test.least");
        let mut tokens = lexer::lex(source, &mut c_info).unwrap();
        assert!(matches!(tokens.pop().map(|t| t.kind), Some(TokenKind::Eol)));
        parse_arit_expr(&tokens, &mut c_info).unwrap()
    }

    #[test]
    fn test_single_statement() {
        let (root, _) = parse("exit 0").unwrap();
        assert_eq!(root.body_id, 1024);
        assert_eq!(root.children.len(), 1);
        match &root.children[0] {
            Stmt::Func(call) => {
                assert_eq!(call.func, FuncId::Exit);
                assert_eq!(call.args, vec![Expr::Const { line: 0, value: 0 }]);
            }
            other => panic!("Expected Func, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence_mul_binds_tighter() {
        // a + 3 * 4 must root at `+` with the multiplication on the right.
        let expr = parse_expr("a + 3 * 4");
        match expr {
            Expr::Arit {
                op: AritOp::Add,
                left,
                right,
                ..
            } => {
                assert!(matches!(*left, Expr::Var { .. }));
                match *right {
                    Expr::Arit {
                        op: AritOp::Mul,
                        left,
                        right,
                        ..
                    } => {
                        assert_eq!(*left, Expr::Const { line: 0, value: 3 });
                        assert_eq!(*right, Expr::Const { line: 0, value: 4 });
                    }
                    other => panic!("Expected Mul, got {:?}", other),
                }
            }
            other => panic!("Expected Add at root, got {:?}", other),
        }
    }

    #[test]
    fn test_left_associativity() {
        // 10 - 2 - 3 folds as (10 - 2) - 3.
        let expr = parse_expr("10 - 2 - 3");
        match expr {
            Expr::Arit {
                op: AritOp::Sub,
                left,
                right,
                ..
            } => {
                assert_eq!(*right, Expr::Const { line: 0, value: 3 });
                assert!(matches!(
                    *left,
                    Expr::Arit {
                        op: AritOp::Sub,
                        ..
                    }
                ));
            }
            other => panic!("Expected Sub at root, got {:?}", other),
        }

        // 2 * 3 * 4 keeps the stronger-binding run left-associative.
        let expr = parse_expr("2 * 3 * 4");
        match expr {
            Expr::Arit {
                op: AritOp::Mul,
                left,
                right,
                ..
            } => {
                assert_eq!(*right, Expr::Const { line: 0, value: 4 });
                assert!(matches!(
                    *left,
                    Expr::Arit {
                        op: AritOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("Expected Mul at root, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_expressions() {
        let mut c_info = CompileInfo::new("test.least");
        let mut tokens = lexer::lex("1 + + 2", &mut c_info).unwrap();
        tokens.pop();
        let err = parse_arit_expr(&tokens, &mut c_info).unwrap_err();
        assert!(err.message.contains("Expected number after '+'")
            || err.message.contains("+/- followed by another +/-"));

        let mut tokens = lexer::lex("* 2", &mut c_info).unwrap();
        tokens.pop();
        let err = parse_arit_expr(&tokens, &mut c_info).unwrap_err();
        assert!(err.message.contains("Expected number before '*' operator"));

        let mut tokens = lexer::lex("1 +", &mut c_info).unwrap();
        tokens.pop();
        let err = parse_arit_expr(&tokens, &mut c_info).unwrap_err();
        assert!(err.message.contains("Expected number after operand '+'"));
    }

    #[test]
    fn test_if_chain_structure_and_body_ids() {
        let source = "\
int a 1
if a == 1
exit 1
elif a == 2
exit 2
else
exit 0
end";
        let (root, _) = parse(source).unwrap();
        assert_eq!(root.children.len(), 2);

        let chain = match &root.children[1] {
            Stmt::If(chain) => chain,
            other => panic!("Expected If, got {:?}", other),
        };
        assert!(!chain.is_elif);
        assert_eq!(chain.body.body_id, 1025);

        let elif = match chain.alt.as_deref() {
            Some(Branch::Elif(elif)) => elif,
            other => panic!("Expected Elif, got {:?}", other),
        };
        assert!(elif.is_elif);
        assert_eq!(elif.body.body_id, 1026);

        let els = match elif.alt.as_deref() {
            Some(Branch::Else(els)) => els,
            other => panic!("Expected Else, got {:?}", other),
        };
        assert_eq!(els.body.body_id, 1027);

        // The chain's terminating label is the else body's.
        assert_eq!(chain.real_end_id(), 1027);
    }

    #[test]
    fn test_while_with_nested_if() {
        let source = "\
int a 10
while a > 0
if a == 5
sub a 2
end
sub a 1
end
exit a";
        let (root, _) = parse(source).unwrap();
        assert_eq!(root.children.len(), 3);
        let wh = match &root.children[1] {
            Stmt::While(wh) => wh,
            other => panic!("Expected While, got {:?}", other),
        };
        assert_eq!(wh.body.children.len(), 2);
        assert!(matches!(wh.body.children[0], Stmt::If(_)));
        assert!(matches!(wh.body.children[1], Stmt::Func(_)));
    }

    #[test]
    fn test_condition_forms() {
        let (root, _) = parse("int a 1\nwhile a\nsub a 1\nend").unwrap();
        let wh = match &root.children[1] {
            Stmt::While(wh) => wh,
            other => panic!("Expected While, got {:?}", other),
        };
        // No comparator: the truthy compare-against-1 form.
        match &wh.cond {
            Cond::Cmp { cmp, .. } => assert!(cmp.is_none()),
            other => panic!("Expected Cmp, got {:?}", other),
        }
    }

    #[test]
    fn test_logical_condition_tree() {
        let (root, _) = parse("int a 1\nif a > 0 && a < 10 || a == 99\nexit 0\nend").unwrap();
        let chain = match &root.children[1] {
            Stmt::If(chain) => chain,
            other => panic!("Expected If, got {:?}", other),
        };
        // Left-associative fold: (a > 0 && a < 10) || a == 99.
        match &chain.cond {
            Cond::Log {
                op: LogOp::Or,
                left,
                right,
                ..
            } => {
                assert!(matches!(
                    left.as_ref(),
                    Cond::Log {
                        op: LogOp::And,
                        ..
                    }
                ));
                assert!(matches!(
                    right.as_ref(),
                    Cond::Cmp {
                        cmp: Some((CmpOp::Equal, _)),
                        ..
                    }
                ));
            }
            other => panic!("Expected Or at root, got {:?}", other),
        }
    }

    #[test]
    fn test_two_comparators_fatal() {
        let err = parse("int a 1\nif a == 1 == 2\nexit 0\nend").unwrap_err();
        assert!(err.message.contains("Found two operators"));
    }

    #[test]
    fn test_unexpected_block_keywords() {
        let err = parse("elif 1\nexit 0\nend").unwrap_err();
        assert!(err.message.contains("Unexpected elif"));

        let err = parse("else\nexit 0\nend").unwrap_err();
        assert!(err.message.contains("Unexpected else"));

        let err = parse("end").unwrap_err();
        assert!(err.message.contains("Unexpected end"));

        let err = parse("int a 1\nif a == 1\nexit 0").unwrap_err();
        assert!(err.message.contains("Unresolved blocks"));
    }

    #[test]
    fn test_elif_after_closed_chain_is_fatal() {
        let source = "\
int a 1
if a == 1
exit 1
end
elif a == 2
exit 2
end";
        let err = parse(source).unwrap_err();
        assert!(err.message.contains("Unexpected elif"));
    }

    #[test]
    fn test_else_takes_no_arguments() {
        let err = parse("int a 1\nif a == 1\nexit 1\nelse a\nexit 0\nend").unwrap_err();
        assert!(err.message.contains("Else accepts no arguments"));
    }

    #[test]
    fn test_excess_tokens_after_string_argument() {
        let err = parse("print \"hi\" 5").unwrap_err();
        assert!(err.message.contains("Excess tokens after string argument"));
    }

    #[test]
    fn test_multiple_arguments() {
        let (root, _) = parse("int a 3").unwrap();
        match &root.children[0] {
            Stmt::Func(call) => {
                assert_eq!(call.args.len(), 2);
                assert!(matches!(call.args[0], Expr::Var { .. }));
                assert!(matches!(call.args[1], Expr::Const { value: 3, .. }));
            }
            other => panic!("Expected Func, got {:?}", other),
        }
    }

    #[test]
    fn test_lstr_argument_interns_fragments() {
        let (root, c_info) = parse("int a 1\nprint \"a is [a]!\"").unwrap();
        match &root.children[1] {
            Stmt::Func(call) => match &call.args[0] {
                Expr::Lstr { format, .. } => {
                    assert_eq!(format.len(), 3);
                    assert!(matches!(format[0], Expr::Str { str_id: 0, .. }));
                    assert!(matches!(format[1], Expr::Var { .. }));
                    assert!(matches!(format[2], Expr::Str { str_id: 1, .. }));
                }
                other => panic!("Expected Lstr, got {:?}", other),
            },
            other => panic!("Expected Func, got {:?}", other),
        }
        assert_eq!(c_info.known_strings, vec!["a is ", "!"]);
    }

    #[test]
    fn test_access_argument() {
        let (root, c_info) = parse("array xs 4\nset xs{1 + 1} 7").unwrap();
        match &root.children[1] {
            Stmt::Func(call) => match &call.args[0] {
                Expr::Access { array_id, index, .. } => {
                    assert_eq!(c_info.known_vars[*array_id].name, "xs");
                    assert!(matches!(
                        index.as_ref(),
                        Expr::Arit {
                            op: AritOp::Add,
                            ..
                        }
                    ));
                }
                other => panic!("Expected Access, got {:?}", other),
            },
            other => panic!("Expected Func, got {:?}", other),
        }
    }

    #[test]
    fn test_statement_level_junk() {
        let err = parse("5").unwrap_err();
        assert!(err.message.contains("Invalid instruction"));

        let err = parse("foo 1").unwrap_err();
        assert!(err.message.contains("expected to be variable"));

        // Value-function keywords are not statements.
        let err = parse("time").unwrap_err();
        assert!(err.message.contains("Invalid instruction"));
    }
}
