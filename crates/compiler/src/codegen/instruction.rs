//! x86-64 instruction list and byte encoding.
//!
//! Instructions closely resemble the lines of an assembly file: labels
//! are pseudo-instructions that encode to zero bytes and resolve to
//! their byte position instead. Encoding an instruction also yields the
//! relocation entries the linker needs: string references become
//! `.rodata` relocations, and every call or jump to a symbol becomes a
//! PC-relative relocation, whether the target lives in this file or not.

use crate::diagnostics::{CompileError, ErrorContext};

/// Register numbers as encoded in ModR/M; r8..r15 need a REX prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Register {
    fn index(self) -> u8 {
        self as u8
    }

    /// The three bits that go into ModR/M or an opcode.
    fn low3(self) -> u8 {
        self.index() & 0b111
    }

    /// Whether the fourth register bit needs a REX extension.
    fn extended(self) -> bool {
        self.index() >= 8
    }
}

/// `[base + disp]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Memory {
    pub base: Register,
    pub disp: i64,
}

/// Whether a symbol is visible outside the object file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Local,
    Global,
}

/// A symbol the object file defines or imports.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelInfo {
    pub name: String,
    pub visibility: Visibility,
    /// Defined in another object; gets an undefined symtab entry.
    pub is_extern: bool,
    /// Byte offset in `.text`, resolved during encoding.
    pub position: u64,
}

impl LabelInfo {
    /// A label defined in this file.
    pub fn infile(name: impl Into<String>, visibility: Visibility) -> Self {
        LabelInfo {
            name: name.into(),
            visibility,
            is_extern: false,
            position: 0,
        }
    }

    /// A symbol implemented in another file.
    pub fn extern_sym(name: impl Into<String>) -> Self {
        LabelInfo {
            name: name.into(),
            visibility: Visibility::Global,
            is_extern: true,
            position: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Reg(Register),
    Imm(i64),
    /// Interned string literal, resolved by a `.rodata` relocation.
    Str(usize),
    /// A label or extern referenced by name, resolved by relocation.
    Symbol(String),
    /// Payload of a `label` pseudo-instruction.
    Label(LabelInfo),
    Mem(Memory),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Mov,
    Syscall,
    Label,
    Call,
    Jmp,
    Je,
    Jne,
    Jl,
    Jle,
    Jg,
    Jge,
    Add,
    Sub,
    Cmp,
    Xor,
    Push,
    Pop,
    Div,
    Mul,
}

/// What a relocation entry points at.
#[derive(Debug, Clone, PartialEq)]
pub enum RelaTarget {
    /// String id; resolved against the `.rodata` section symbol with the
    /// string's offset as addend.
    Str(usize),
    /// Symbol name; resolved PC-relative with addend -4.
    Symbol(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelaEntry {
    /// Byte offset of the field to patch, relative to `.text` once the
    /// instruction list is encoded.
    pub offset: u64,
    pub target: RelaTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub op1: Operand,
    pub op2: Operand,
}

impl Instruction {
    pub fn nullary(op: Op) -> Self {
        Instruction {
            op,
            op1: Operand::None,
            op2: Operand::None,
        }
    }

    pub fn unary(op: Op, op1: Operand) -> Self {
        Instruction {
            op,
            op1,
            op2: Operand::None,
        }
    }

    pub fn binary(op: Op, op1: Operand, op2: Operand) -> Self {
        Instruction { op, op1, op2 }
    }

    pub fn label(info: LabelInfo) -> Self {
        Instruction {
            op: Op::Label,
            op1: Operand::Label(info),
            op2: Operand::None,
        }
    }
}

/// ModR/M addressing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum AddressingMode {
    Disp0 = 0b00,
    Disp8 = 0b01,
    Disp32 = 0b10,
    Direct = 0b11,
}

/// One ModR/M byte plus its displacement, if any.
#[derive(Debug, Clone, Copy)]
struct ModRM {
    mode: AddressingMode,
    rm: Register,
    reg_op: u8,
    disp: i64,
}

impl ModRM {
    fn from_reg(reg: Register) -> Self {
        ModRM {
            mode: AddressingMode::Direct,
            rm: reg,
            reg_op: 0,
            disp: 0,
        }
    }

    fn from_mem(mem: Memory, err: &ErrorContext) -> Result<Self, CompileError> {
        // rsp/r12 as a base demand a SIB byte, which this encoder does
        // not produce.
        err.on_true(
            mem.base.low3() == Register::Rsp.low3(),
            "Unrepresentable instruction combination",
        )?;

        // `[rbp]` with no displacement does not exist on x86-64 (that
        // encoding means rip-relative); use an explicit zero byte.
        let mode = if mem.disp == 0 && mem.base.low3() != Register::Rbp.low3() {
            AddressingMode::Disp0
        } else if (-128..=127).contains(&mem.disp) {
            AddressingMode::Disp8
        } else {
            AddressingMode::Disp32
        };

        Ok(ModRM {
            mode,
            rm: mem.base,
            reg_op: 0,
            disp: mem.disp,
        })
    }

    fn from_operand(operand: &Operand, err: &ErrorContext) -> Result<Self, CompileError> {
        match operand {
            Operand::Reg(reg) => Ok(Self::from_reg(*reg)),
            Operand::Mem(mem) => Self::from_mem(*mem, err),
            _ => Err(err.error("Unrepresentable instruction combination")),
        }
    }

    fn value(&self) -> u8 {
        ((self.mode as u8) << 6) | (self.reg_op << 3) | self.rm.low3()
    }

    fn emit(&self, out: &mut Vec<u8>) {
        out.push(self.value());
        match self.mode {
            AddressingMode::Disp8 => out.push(self.disp as i8 as u8),
            AddressingMode::Disp32 => out.extend_from_slice(&(self.disp as i32).to_le_bytes()),
            _ => {}
        }
    }
}

/// REX prefix: W selects 64-bit operands, R extends the ModR/M reg
/// field, B extends the ModR/M base (or the opcode-embedded register).
fn rex(w: bool, r: bool, b: bool) -> u8 {
    0x40 | ((w as u8) << 3) | ((r as u8) << 2) | (b as u8)
}

fn is_rm(operand: &Operand) -> bool {
    matches!(operand, Operand::Reg(_) | Operand::Mem(_))
}

impl Instruction {
    /// Encode to bytes. Relocation offsets in the result are relative to
    /// the start of this instruction.
    fn encode(&self, err: &ErrorContext) -> Result<(Vec<u8>, Vec<RelaEntry>), CompileError> {
        let mut bytes: Vec<u8> = Vec::new();
        let mut relas: Vec<RelaEntry> = Vec::new();

        if self.op == Op::Label {
            return Ok((bytes, relas));
        }

        let imm32 = |value: i64, err: &ErrorContext| -> Result<[u8; 4], CompileError> {
            err.on_false(
                i32::try_from(value).is_ok(),
                "Unrepresentable instruction combination",
            )?;
            Ok((value as i32).to_le_bytes())
        };

        match (self.op, &self.op1, &self.op2) {
            // Register encoded in the opcode byte; a plain 32-bit move
            // zero-extends, which is all the language's values need.
            (Op::Mov, Operand::Reg(reg), Operand::Imm(value)) => {
                if reg.extended() {
                    bytes.push(rex(false, false, true));
                }
                bytes.push(0xb8 + reg.low3());
                bytes.extend_from_slice(&imm32(*value, err)?);
            }
            (Op::Mov, Operand::Reg(reg), Operand::Str(str_id)) => {
                if reg.extended() {
                    bytes.push(rex(false, false, true));
                }
                bytes.push(0xb8 + reg.low3());
                relas.push(RelaEntry {
                    offset: bytes.len() as u64,
                    target: RelaTarget::Str(*str_id),
                });
                bytes.extend_from_slice(&[0, 0, 0, 0]);
            }

            (Op::Syscall, Operand::None, Operand::None) => {
                bytes.extend_from_slice(&[0x0f, 0x05]);
            }

            // Calls and jumps always go through a symbol; the linker
            // resolves in-file labels the same way it resolves externs.
            (op, Operand::Symbol(name), Operand::None) => {
                let opcode: &[u8] = match op {
                    Op::Call => &[0xe8],
                    Op::Jmp => &[0xe9],
                    Op::Je => &[0x0f, 0x84],
                    Op::Jne => &[0x0f, 0x85],
                    Op::Jl => &[0x0f, 0x8c],
                    Op::Jle => &[0x0f, 0x8e],
                    Op::Jg => &[0x0f, 0x8f],
                    Op::Jge => &[0x0f, 0x8d],
                    _ => return Err(err.error("Unrepresentable instruction combination")),
                };
                bytes.extend_from_slice(opcode);
                relas.push(RelaEntry {
                    offset: bytes.len() as u64,
                    target: RelaTarget::Symbol(name.clone()),
                });
                bytes.extend_from_slice(&[0, 0, 0, 0]);
            }

            // `op rm, imm32` forms.
            (op, rm_operand, Operand::Imm(value)) if is_rm(rm_operand) => {
                let (opcode, modifier) = match op {
                    Op::Mov => (0xc7, 0),
                    Op::Add => (0x81, 0),
                    Op::Sub => (0x81, 5),
                    Op::Cmp => (0x81, 7),
                    _ => return Err(err.error("Unrepresentable instruction combination")),
                };
                let mut modrm = ModRM::from_operand(rm_operand, err)?;
                modrm.reg_op = modifier;
                bytes.push(rex(true, false, modrm.rm.extended()));
                bytes.push(opcode);
                modrm.emit(&mut bytes);
                bytes.extend_from_slice(&imm32(*value, err)?);
            }

            // `op rm, r` forms.
            (op, rm_operand, Operand::Reg(src)) if is_rm(rm_operand) => {
                let opcode = match op {
                    Op::Mov => 0x89,
                    Op::Add => 0x01,
                    Op::Sub => 0x29,
                    Op::Cmp => 0x39,
                    Op::Xor => 0x31,
                    _ => return Err(err.error("Unrepresentable instruction combination")),
                };
                let mut modrm = ModRM::from_operand(rm_operand, err)?;
                modrm.reg_op = src.low3();
                bytes.push(rex(true, src.extended(), modrm.rm.extended()));
                bytes.push(opcode);
                modrm.emit(&mut bytes);
            }

            // `mov r, rm` loads.
            (Op::Mov, Operand::Reg(dst), Operand::Mem(mem)) => {
                let mut modrm = ModRM::from_mem(*mem, err)?;
                modrm.reg_op = dst.low3();
                bytes.push(rex(true, dst.extended(), modrm.rm.extended()));
                bytes.push(0x8b);
                modrm.emit(&mut bytes);
            }

            // Unsigned divide/multiply by a register; rdx:rax implied.
            (Op::Div, Operand::Reg(reg), Operand::None) => {
                let mut modrm = ModRM::from_reg(*reg);
                modrm.reg_op = 6;
                bytes.push(rex(true, false, reg.extended()));
                bytes.push(0xf7);
                modrm.emit(&mut bytes);
            }
            (Op::Mul, Operand::Reg(reg), Operand::None) => {
                let mut modrm = ModRM::from_reg(*reg);
                modrm.reg_op = 4;
                bytes.push(rex(true, false, reg.extended()));
                bytes.push(0xf7);
                modrm.emit(&mut bytes);
            }

            (Op::Push, Operand::Reg(reg), Operand::None) => {
                if reg.extended() {
                    bytes.push(rex(false, false, true));
                }
                bytes.push(0x50 + reg.low3());
            }
            (Op::Pop, Operand::Reg(reg), Operand::None) => {
                if reg.extended() {
                    bytes.push(rex(false, false, true));
                }
                bytes.push(0x58 + reg.low3());
            }

            _ => return Err(err.error("Unrepresentable instruction combination")),
        }

        Ok((bytes, relas))
    }
}

/// The encoded `.text` contents plus everything the ELF writer needs to
/// reference into them.
#[derive(Debug, Clone)]
pub struct EncodedText {
    pub bytes: Vec<u8>,
    pub relas: Vec<RelaEntry>,
    /// In-file labels with resolved positions, then externs.
    pub labels: Vec<LabelInfo>,
}

/// An ordered instruction list, closely resembling an assembly file.
#[derive(Debug, Clone, Default)]
pub struct Instructions {
    ins: Vec<Instruction>,
    externs: Vec<LabelInfo>,
}

impl Instructions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, instruction: Instruction) {
        self.ins.push(instruction);
    }

    /// Declare a symbol that another object file provides.
    pub fn add_extern(&mut self, name: impl Into<String>) {
        self.externs.push(LabelInfo::extern_sym(name));
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.ins.iter()
    }

    /// Encode every instruction in order, rebasing relocation offsets
    /// and resolving label positions along the way.
    pub fn encode(&self, err: &ErrorContext) -> Result<EncodedText, CompileError> {
        let mut bytes = Vec::new();
        let mut relas = Vec::new();
        let mut labels = Vec::new();

        for instruction in &self.ins {
            let (encoded, ins_relas) = instruction.encode(err)?;

            for mut rela in ins_relas {
                rela.offset += bytes.len() as u64;
                relas.push(rela);
            }

            if let (Op::Label, Operand::Label(info)) = (&instruction.op, &instruction.op1) {
                let mut resolved = info.clone();
                resolved.position = bytes.len() as u64;
                labels.push(resolved);
            }

            bytes.extend_from_slice(&encoded);
        }

        labels.extend(self.externs.iter().cloned());

        Ok(EncodedText {
            bytes,
            relas,
            labels,
        })
    }
}
