//! Code generation: AST to x86-64 instructions.
//!
//! Lowers the checked tree into an instruction list with a fixed
//! register scheme: arithmetic evaluates in `rax`/`rcx` (spilling
//! through the stack for nested subtrees), comparison operands sit in
//! `r8`/`r9`, in-memory stores go through `r8`, and computed array
//! addresses are formed in `r10`. Conditions compile to the *opposite*
//! conditional jump targeting the enclosing block's `.end` label.

pub mod elf;
pub mod instruction;

use crate::ast::{Body, Branch, Cond, Expr, FuncCall, If, Stmt, While};
use crate::context::{CompileInfo, STR_BUFFER_BYTES, WORD_SIZE};
use crate::diagnostics::CompileError;
use crate::dictionary::{AritOp, CmpOp, FuncId, LogOp, ValueFunc};
use instruction::{
    Instruction, Instructions, LabelInfo, Memory, Op, Operand, Register, Visibility,
};

/// Linux syscall numbers the generated code uses directly; read(2) is
/// number 0 and is loaded with an xor.
const SYS_WRITE: i64 = 1;
const SYS_GETUID: i64 = 102;
const SYS_EXIT: i64 = 60;
const SYS_TIME: i64 = 201;

/// Lower the whole program. The context must already have been through
/// the semantic pass; stack offsets and definedness are trusted here.
pub fn gen_instructions(
    root: &Body,
    c_info: &mut CompileInfo,
) -> Result<Instructions, CompileError> {
    let generator = X64Generator {
        c_info,
        ins: Instructions::new(),
        while_bodies: Vec::new(),
    };
    generator.generate(root)
}

struct X64Generator<'a> {
    c_info: &'a mut CompileInfo,
    ins: Instructions,
    /// Body ids of the enclosing while loops, innermost last; targets
    /// for `break` and `continue`.
    while_bodies: Vec<u32>,
}

fn end_label(body_id: u32) -> String {
    format!(".end{}", body_id)
}

fn entry_label(body_id: u32) -> String {
    format!(".entry{}", body_id)
}

/// The straight conditional jump for a comparison.
fn cmp_jump(op: CmpOp) -> Op {
    match op {
        CmpOp::Equal => Op::Je,
        CmpOp::NotEqual => Op::Jne,
        CmpOp::Less => Op::Jl,
        CmpOp::LessOrEq => Op::Jle,
        CmpOp::Greater => Op::Jg,
        CmpOp::GreaterOrEq => Op::Jge,
    }
}

/// The jump taken when a comparison fails.
fn cmp_opposite_jump(op: CmpOp) -> Op {
    match op {
        CmpOp::Equal => Op::Jne,
        CmpOp::NotEqual => Op::Je,
        CmpOp::Less => Op::Jge,
        CmpOp::LessOrEq => Op::Jg,
        CmpOp::Greater => Op::Jle,
        CmpOp::GreaterOrEq => Op::Jl,
    }
}

/// Operands `mov` can take directly without going through a register.
fn is_leaf(expr: &Expr) -> bool {
    matches!(expr, Expr::Const { .. } | Expr::Var { .. })
}

impl<'a> X64Generator<'a> {
    fn generate(mut self, root: &Body) -> Result<Instructions, CompileError> {
        self.ins.add(Instruction::label(LabelInfo::infile(
            "_start",
            Visibility::Global,
        )));

        // Reserve stack space for locals.
        if !self.c_info.known_vars.is_empty() {
            self.ins.add(Instruction::binary(
                Op::Mov,
                Operand::Reg(Register::Rbp),
                Operand::Reg(Register::Rsp),
            ));
            self.ins.add(Instruction::binary(
                Op::Sub,
                Operand::Reg(Register::Rsp),
                Operand::Imm(self.c_info.stack_size() * WORD_SIZE),
            ));
        }

        self.gen_body(root)?;

        // Programs that run off the end exit with code 0.
        self.ins.add(Instruction::binary(
            Op::Mov,
            Operand::Reg(Register::Rax),
            Operand::Imm(SYS_EXIT),
        ));
        self.ins.add(Instruction::binary(
            Op::Xor,
            Operand::Reg(Register::Rdi),
            Operand::Reg(Register::Rdi),
        ));
        self.ins.add(Instruction::nullary(Op::Syscall));

        if self.c_info.req_libs.uprint {
            self.ins.add_extern("uprint");
        }
        if self.c_info.req_libs.putchar {
            self.ins.add_extern("putchar");
        }

        Ok(self.ins)
    }

    fn gen_body(&mut self, body: &Body) -> Result<(), CompileError> {
        for child in &body.children {
            self.gen_stmt(child)?;
        }
        Ok(())
    }

    fn gen_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::If(chain) => self.gen_if(chain, chain.real_end_id()),
            Stmt::While(node) => self.gen_while(node),
            Stmt::Func(call) => self.gen_func(call),
        }
    }

    /// Lower one branch of an `if` chain. `real_end_id` names the label
    /// that terminates the whole chain; every taken branch jumps there
    /// past the remaining alternatives.
    fn gen_if(&mut self, node: &If, real_end_id: u32) -> Result<(), CompileError> {
        self.c_info.err.set_line(node.line);

        self.gen_cond_false(&node.cond, &end_label(node.body.body_id))?;
        self.gen_body(&node.body)?;

        match node.alt.as_deref() {
            Some(alt) => {
                self.ins.add(Instruction::unary(
                    Op::Jmp,
                    Operand::Symbol(end_label(real_end_id)),
                ));
                self.add_local_label(end_label(node.body.body_id));
                match alt {
                    Branch::Elif(elif) => self.gen_if(elif, real_end_id)?,
                    Branch::Else(els) => {
                        self.gen_body(&els.body)?;
                        self.add_local_label(end_label(els.body.body_id));
                    }
                }
            }
            None => self.add_local_label(end_label(node.body.body_id)),
        }

        Ok(())
    }

    fn gen_while(&mut self, node: &While) -> Result<(), CompileError> {
        self.c_info.err.set_line(node.line);
        let body_id = node.body.body_id;

        self.add_local_label(entry_label(body_id));
        self.gen_cond_false(&node.cond, &end_label(body_id))?;

        self.while_bodies.push(body_id);
        self.gen_body(&node.body)?;
        self.while_bodies.pop();

        self.ins.add(Instruction::unary(
            Op::Jmp,
            Operand::Symbol(entry_label(body_id)),
        ));
        self.add_local_label(end_label(body_id));

        Ok(())
    }

    fn add_local_label(&mut self, name: String) {
        self.ins
            .add(Instruction::label(LabelInfo::infile(name, Visibility::Local)));
    }

    /// Mint a fresh fall-through label for boolean lowering; shares the
    /// body-id counter so names never collide.
    fn fresh_cond_label(&mut self) -> String {
        format!(".cond{}", self.c_info.next_body_id())
    }

    /// Lower `cond`, jumping to `false_target` when it does not hold and
    /// falling through when it does.
    fn gen_cond_false(&mut self, cond: &Cond, false_target: &str) -> Result<(), CompileError> {
        match cond {
            Cond::Cmp { line, left, cmp } => {
                self.c_info.err.set_line(*line);
                self.gen_expr(left, Register::R8)?;
                match cmp {
                    Some((op, right)) => {
                        self.gen_expr(right, Register::R9)?;
                        self.ins.add(Instruction::binary(
                            Op::Cmp,
                            Operand::Reg(Register::R8),
                            Operand::Reg(Register::R9),
                        ));
                        self.ins.add(Instruction::unary(
                            cmp_opposite_jump(*op),
                            Operand::Symbol(false_target.to_string()),
                        ));
                    }
                    None => {
                        // Truthy form: holds iff the value equals one.
                        self.ins.add(Instruction::binary(
                            Op::Cmp,
                            Operand::Reg(Register::R8),
                            Operand::Imm(1),
                        ));
                        self.ins.add(Instruction::unary(
                            Op::Jne,
                            Operand::Symbol(false_target.to_string()),
                        ));
                    }
                }
                Ok(())
            }
            Cond::Log {
                op: LogOp::And,
                left,
                right,
                ..
            } => {
                self.gen_cond_false(left, false_target)?;
                self.gen_cond_false(right, false_target)
            }
            Cond::Log {
                op: LogOp::Or,
                left,
                right,
                ..
            } => {
                // Left side true short-circuits past the right side.
                let through = self.fresh_cond_label();
                self.gen_cond_true(left, &through)?;
                self.gen_cond_false(right, false_target)?;
                self.add_local_label(through);
                Ok(())
            }
        }
    }

    /// Dual of [`gen_cond_false`]: jump to `true_target` when `cond`
    /// holds, fall through when it does not.
    fn gen_cond_true(&mut self, cond: &Cond, true_target: &str) -> Result<(), CompileError> {
        match cond {
            Cond::Cmp { line, left, cmp } => {
                self.c_info.err.set_line(*line);
                self.gen_expr(left, Register::R8)?;
                match cmp {
                    Some((op, right)) => {
                        self.gen_expr(right, Register::R9)?;
                        self.ins.add(Instruction::binary(
                            Op::Cmp,
                            Operand::Reg(Register::R8),
                            Operand::Reg(Register::R9),
                        ));
                        self.ins.add(Instruction::unary(
                            cmp_jump(*op),
                            Operand::Symbol(true_target.to_string()),
                        ));
                    }
                    None => {
                        self.ins.add(Instruction::binary(
                            Op::Cmp,
                            Operand::Reg(Register::R8),
                            Operand::Imm(1),
                        ));
                        self.ins.add(Instruction::unary(
                            Op::Je,
                            Operand::Symbol(true_target.to_string()),
                        ));
                    }
                }
                Ok(())
            }
            Cond::Log {
                op: LogOp::And,
                left,
                right,
                ..
            } => {
                let fail = self.fresh_cond_label();
                self.gen_cond_false(left, &fail)?;
                self.gen_cond_true(right, true_target)?;
                self.add_local_label(fail);
                Ok(())
            }
            Cond::Log {
                op: LogOp::Or,
                left,
                right,
                ..
            } => {
                self.gen_cond_true(left, true_target)?;
                self.gen_cond_true(right, true_target)
            }
        }
    }

    /// Memory operand of an int variable.
    fn var_mem(&self, var_id: usize) -> Memory {
        Memory {
            base: Register::Rbp,
            disp: -self.c_info.known_vars[var_id].stack_offset * WORD_SIZE,
        }
    }

    /// Compute an expression into `target`.
    fn gen_expr(&mut self, expr: &Expr, target: Register) -> Result<(), CompileError> {
        match expr {
            Expr::Const { value, .. } => {
                self.ins.add(Instruction::binary(
                    Op::Mov,
                    Operand::Reg(target),
                    Operand::Imm(*value),
                ));
                Ok(())
            }
            Expr::Var { var_id, .. } => {
                self.ins.add(Instruction::binary(
                    Op::Mov,
                    Operand::Reg(target),
                    Operand::Mem(self.var_mem(*var_id)),
                ));
                Ok(())
            }
            Expr::Access {
                array_id, index, ..
            } => self.gen_access_load(*array_id, index, target),
            Expr::VFunc { func, .. } => {
                self.gen_vfunc(*func);
                self.mov_if_req(target, Register::Rax);
                Ok(())
            }
            Expr::Arit {
                line,
                op,
                left,
                right,
            } => {
                self.c_info.err.set_line(*line);

                let left_leaf = is_leaf(left);
                let right_leaf = is_leaf(right);

                // Subtrees first, leaves after; rax survives the right
                // recursion on the stack.
                let mut value_in_rax = false;
                if !left_leaf {
                    self.gen_expr(left, Register::Rax)?;
                    value_in_rax = true;
                }
                if !right_leaf {
                    if value_in_rax {
                        self.ins
                            .add(Instruction::unary(Op::Push, Operand::Reg(Register::Rax)));
                    }
                    self.gen_expr(right, Register::Rcx)?;
                    if value_in_rax {
                        self.ins
                            .add(Instruction::unary(Op::Pop, Operand::Reg(Register::Rax)));
                    }
                }
                if left_leaf {
                    self.mov_leaf(Register::Rax, left);
                }
                if right_leaf {
                    self.mov_leaf(Register::Rcx, right);
                }

                match op {
                    AritOp::Add => {
                        self.ins.add(Instruction::binary(
                            Op::Add,
                            Operand::Reg(Register::Rax),
                            Operand::Reg(Register::Rcx),
                        ));
                        self.mov_if_req(target, Register::Rax);
                    }
                    AritOp::Sub => {
                        self.ins.add(Instruction::binary(
                            Op::Sub,
                            Operand::Reg(Register::Rax),
                            Operand::Reg(Register::Rcx),
                        ));
                        self.mov_if_req(target, Register::Rax);
                    }
                    AritOp::Div => {
                        self.gen_divide();
                        self.mov_if_req(target, Register::Rax);
                    }
                    AritOp::Mod => {
                        self.gen_divide();
                        // Unsigned division leaves the remainder in rdx.
                        self.mov_if_req(target, Register::Rdx);
                    }
                    AritOp::Mul => {
                        self.ins.add(Instruction::binary(
                            Op::Xor,
                            Operand::Reg(Register::Rdx),
                            Operand::Reg(Register::Rdx),
                        ));
                        self.ins
                            .add(Instruction::unary(Op::Mul, Operand::Reg(Register::Rcx)));
                        self.mov_if_req(target, Register::Rax);
                    }
                }
                Ok(())
            }
            Expr::Str { .. } | Expr::Lstr { .. } => {
                Err(self.c_info.err.error("Invalid tree node"))
            }
        }
    }

    /// `xor rdx, rdx; div rcx` - quotient in rax, remainder in rdx.
    fn gen_divide(&mut self) {
        self.ins.add(Instruction::binary(
            Op::Xor,
            Operand::Reg(Register::Rdx),
            Operand::Reg(Register::Rdx),
        ));
        self.ins
            .add(Instruction::unary(Op::Div, Operand::Reg(Register::Rcx)));
    }

    /// Move a leaf operand (constant or int variable) into a register.
    fn mov_leaf(&mut self, target: Register, expr: &Expr) {
        match expr {
            Expr::Const { value, .. } => {
                self.ins.add(Instruction::binary(
                    Op::Mov,
                    Operand::Reg(target),
                    Operand::Imm(*value),
                ));
            }
            Expr::Var { var_id, .. } => {
                self.ins.add(Instruction::binary(
                    Op::Mov,
                    Operand::Reg(target),
                    Operand::Mem(self.var_mem(*var_id)),
                ));
            }
            _ => unreachable!("leaves are constants or variables"),
        }
    }

    /// `mov target, source` unless they already coincide.
    fn mov_if_req(&mut self, target: Register, source: Register) {
        if target != source {
            self.ins.add(Instruction::binary(
                Op::Mov,
                Operand::Reg(target),
                Operand::Reg(source),
            ));
        }
    }

    /// Load `array{index}` into `target`. A constant index folds into
    /// the displacement; anything else computes the element address in
    /// r10 first.
    fn gen_access_load(
        &mut self,
        array_id: usize,
        index: &Expr,
        target: Register,
    ) -> Result<(), CompileError> {
        let mem = self.gen_access_mem(array_id, index)?;
        self.ins.add(Instruction::binary(
            Op::Mov,
            Operand::Reg(target),
            Operand::Mem(mem),
        ));
        Ok(())
    }

    /// Memory operand of one array element.
    fn gen_access_mem(&mut self, array_id: usize, index: &Expr) -> Result<Memory, CompileError> {
        let offset = self.c_info.known_vars[array_id].stack_offset;

        if let Expr::Const { value, .. } = index {
            return Ok(Memory {
                base: Register::Rbp,
                disp: -(offset - value) * WORD_SIZE,
            });
        }

        // Scale the index by the word size and add the array base.
        self.gen_expr(index, Register::Rax)?;
        self.ins.add(Instruction::binary(
            Op::Mov,
            Operand::Reg(Register::Rcx),
            Operand::Imm(WORD_SIZE),
        ));
        self.ins.add(Instruction::binary(
            Op::Xor,
            Operand::Reg(Register::Rdx),
            Operand::Reg(Register::Rdx),
        ));
        self.ins
            .add(Instruction::unary(Op::Mul, Operand::Reg(Register::Rcx)));
        self.ins.add(Instruction::binary(
            Op::Mov,
            Operand::Reg(Register::R10),
            Operand::Reg(Register::Rbp),
        ));
        self.ins.add(Instruction::binary(
            Op::Sub,
            Operand::Reg(Register::R10),
            Operand::Imm(offset * WORD_SIZE),
        ));
        self.ins.add(Instruction::binary(
            Op::Add,
            Operand::Reg(Register::R10),
            Operand::Reg(Register::Rax),
        ));

        Ok(Memory {
            base: Register::R10,
            disp: 0,
        })
    }

    /// Memory operand for an in-memory destination: an int variable or
    /// an array element.
    fn gen_dest_mem(&mut self, expr: &Expr) -> Result<Memory, CompileError> {
        match expr {
            Expr::Var { var_id, .. } => Ok(self.var_mem(*var_id)),
            Expr::Access {
                array_id, index, ..
            } => self.gen_access_mem(*array_id, index),
            _ => Err(self.c_info.err.error("Invalid tree node")),
        }
    }

    /// Value functions are raw syscalls leaving their result in rax.
    fn gen_vfunc(&mut self, func: ValueFunc) {
        match func {
            ValueFunc::Time => {
                self.ins.add(Instruction::binary(
                    Op::Mov,
                    Operand::Reg(Register::Rax),
                    Operand::Imm(SYS_TIME),
                ));
                self.ins.add(Instruction::binary(
                    Op::Xor,
                    Operand::Reg(Register::Rdi),
                    Operand::Reg(Register::Rdi),
                ));
                self.ins.add(Instruction::nullary(Op::Syscall));
            }
            ValueFunc::Getuid => {
                self.ins.add(Instruction::binary(
                    Op::Mov,
                    Operand::Reg(Register::Rax),
                    Operand::Imm(SYS_GETUID),
                ));
                self.ins.add(Instruction::nullary(Op::Syscall));
            }
        }
    }

    fn gen_func(&mut self, call: &FuncCall) -> Result<(), CompileError> {
        self.c_info.err.set_line(call.line);

        match call.func {
            FuncId::Exit => {
                match &call.args[0] {
                    leaf if is_leaf(leaf) => {
                        self.mov_leaf(Register::Rdi, leaf);
                    }
                    expr => {
                        self.gen_expr(expr, Register::Rax)?;
                        self.mov_if_req(Register::Rdi, Register::Rax);
                    }
                }
                self.ins.add(Instruction::binary(
                    Op::Mov,
                    Operand::Reg(Register::Rax),
                    Operand::Imm(SYS_EXIT),
                ));
                self.ins.add(Instruction::nullary(Op::Syscall));
            }

            // `int` initializes its fresh slot, `set` overwrites; both
            // are a store of the computed value.
            FuncId::Int | FuncId::Set => {
                let src = &call.args[1];
                if let Expr::Const { value, .. } = src {
                    let mem = self.gen_dest_mem(&call.args[0])?;
                    self.ins.add(Instruction::binary(
                        Op::Mov,
                        Operand::Mem(mem),
                        Operand::Imm(*value),
                    ));
                } else {
                    self.gen_expr(src, Register::R8)?;
                    let mem = self.gen_dest_mem(&call.args[0])?;
                    self.ins.add(Instruction::binary(
                        Op::Mov,
                        Operand::Mem(mem),
                        Operand::Reg(Register::R8),
                    ));
                }
            }

            // Declarations without an initial value; the semantic pass
            // reserved their stack words.
            FuncId::Array | FuncId::Str => {}

            FuncId::Print => {
                let format = match &call.args[0] {
                    Expr::Lstr { format, .. } => format,
                    _ => return Err(self.c_info.err.error("Invalid tree node")),
                };
                for part in format {
                    match part {
                        Expr::Str { str_id, .. } => self.gen_write_str(*str_id),
                        expr => {
                            self.gen_expr(expr, Register::Rax)?;
                            self.ins.add(Instruction::unary(
                                Op::Call,
                                Operand::Symbol("uprint".to_string()),
                            ));
                            self.c_info.req_libs.uprint = true;
                        }
                    }
                }
            }

            FuncId::Putchar => {
                self.gen_expr(&call.args[0], Register::Rax)?;
                self.ins.add(Instruction::unary(
                    Op::Call,
                    Operand::Symbol("putchar".to_string()),
                ));
            }

            FuncId::Read => {
                let var_id = match &call.args[0] {
                    Expr::Var { var_id, .. } => *var_id,
                    _ => return Err(self.c_info.err.error("Invalid tree node")),
                };
                self.gen_read(var_id);
            }

            FuncId::Add | FuncId::Sub => {
                let op = if call.func == FuncId::Add {
                    Op::Add
                } else {
                    Op::Sub
                };
                let src = &call.args[1];
                if let Expr::Const { value, .. } = src {
                    let mem = self.gen_dest_mem(&call.args[0])?;
                    self.ins
                        .add(Instruction::binary(op, Operand::Mem(mem), Operand::Imm(*value)));
                } else {
                    self.gen_expr(src, Register::R8)?;
                    let mem = self.gen_dest_mem(&call.args[0])?;
                    self.ins.add(Instruction::binary(
                        op,
                        Operand::Mem(mem),
                        Operand::Reg(Register::R8),
                    ));
                }
            }

            FuncId::Break => {
                let body_id = *self
                    .while_bodies
                    .last()
                    .ok_or_else(|| self.c_info.err.error("'break' outside of while loop"))?;
                self.ins.add(Instruction::unary(
                    Op::Jmp,
                    Operand::Symbol(end_label(body_id)),
                ));
            }
            FuncId::Continue => {
                let body_id = *self
                    .while_bodies
                    .last()
                    .ok_or_else(|| self.c_info.err.error("'continue' outside of while loop"))?;
                self.ins.add(Instruction::unary(
                    Op::Jmp,
                    Operand::Symbol(entry_label(body_id)),
                ));
            }
        }

        Ok(())
    }

    /// write(2) of one interned string to stdout.
    fn gen_write_str(&mut self, str_id: usize) {
        let len = self.c_info.known_strings[str_id].len() as i64;

        self.ins.add(Instruction::binary(
            Op::Mov,
            Operand::Reg(Register::Rax),
            Operand::Imm(SYS_WRITE),
        ));
        self.ins.add(Instruction::binary(
            Op::Mov,
            Operand::Reg(Register::Rdi),
            Operand::Imm(1),
        ));
        self.ins.add(Instruction::binary(
            Op::Mov,
            Operand::Reg(Register::Rsi),
            Operand::Str(str_id),
        ));
        self.ins.add(Instruction::binary(
            Op::Mov,
            Operand::Reg(Register::Rdx),
            Operand::Imm(len),
        ));
        self.ins.add(Instruction::nullary(Op::Syscall));
    }

    /// read(2) into a str variable's buffer; the length slot below the
    /// buffer records the byte count with the trailing newline dropped.
    fn gen_read(&mut self, var_id: usize) {
        let buf_offset = self.c_info.known_vars[var_id].stack_offset;
        let len_offset = buf_offset + 1;

        self.ins.add(Instruction::binary(
            Op::Xor,
            Operand::Reg(Register::Rax),
            Operand::Reg(Register::Rax),
        ));
        self.ins.add(Instruction::binary(
            Op::Xor,
            Operand::Reg(Register::Rdi),
            Operand::Reg(Register::Rdi),
        ));
        self.ins.add(Instruction::binary(
            Op::Mov,
            Operand::Reg(Register::Rsi),
            Operand::Reg(Register::Rbp),
        ));
        self.ins.add(Instruction::binary(
            Op::Sub,
            Operand::Reg(Register::Rsi),
            Operand::Imm(buf_offset * WORD_SIZE),
        ));
        self.ins.add(Instruction::binary(
            Op::Mov,
            Operand::Reg(Register::Rdx),
            Operand::Imm(STR_BUFFER_BYTES),
        ));
        self.ins.add(Instruction::nullary(Op::Syscall));
        self.ins.add(Instruction::binary(
            Op::Sub,
            Operand::Reg(Register::Rax),
            Operand::Imm(1),
        ));
        self.ins.add(Instruction::binary(
            Op::Mov,
            Operand::Mem(Memory {
                base: Register::Rbp,
                disp: -len_offset * WORD_SIZE,
            }),
            Operand::Reg(Register::Rax),
        ));
    }
}
