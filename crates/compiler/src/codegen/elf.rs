//! ELF64 relocatable object writer.
//!
//! Emits seven sections in fixed order: the null section, `.text`,
//! `.rodata`, `.shstrtab`, `.symtab`, `.strtab` and `.rela.text`.
//! Section contents follow the headers, each padded to a 16-byte
//! boundary; `sh_offset` values are computed with the same rule. All
//! serialization is explicit little-endian byte pushing, no struct
//! dumping.

use std::collections::HashMap;

use crate::context::CompileInfo;
use crate::diagnostics::CompileError;

use super::instruction::{EncodedText, RelaTarget, Visibility};

const EI_NIDENT: usize = 16;
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const EV_CURRENT: u8 = 1;
const ELFOSABI_SYSV: u8 = 0;
const SYSV_ABI_VERSION: u8 = 0;

const ET_REL: u16 = 1;
const EM_X86_64: u16 = 62;

const SHT_PROGBITS: u32 = 1;
const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;
const SHT_RELA: u32 = 4;

const SHF_ALLOC: u64 = 1 << 1;
const SHF_EXECINSTR: u64 = 1 << 2;

const STB_LOCAL: u8 = 0;
const STB_GLOBAL: u8 = 1;
const STT_NOTYPE: u8 = 0;
const STT_SECTION: u8 = 3;
const STT_FILE: u8 = 4;

const SHN_UNDEF: u16 = 0;
const SHN_ABS: u16 = 0xfff1;

const R_X86_64_PC32: u32 = 2;
const R_X86_64_32: u32 = 10;

const EHSIZE: u64 = 64;
const SHENTSIZE: u64 = 64;
const SYM_ENTSIZE: u64 = 0x18;
const RELA_ENTSIZE: u64 = 0x18;

/// Section count and the well-known indices the tables refer to.
const SHNUM: u64 = 7;
const TEXT_NDX: u16 = 1;
const RODATA_NDX: u16 = 2;
const SHSTRTAB_NDX: u16 = 3;
const SYMTAB_NDX: u32 = 4;
const STRTAB_NDX: u32 = 5;

/// Symtab index of the `.rodata` section symbol (null, file, `.text`,
/// then `.rodata`); string relocations resolve against it.
const RODATA_SYM: u64 = 3;

/// Fixed name of the `STT_FILE` symbol. Every emitted object carries
/// this exact string, independent of the compiled source's name.
const FILE_SYM_NAME: &str = "elf.cpp";

/// Every section is padded to this boundary.
const SECTION_ALIGN: u64 = 16;

fn align_up(n: u64, align: u64) -> u64 {
    n.div_ceil(align) * align
}

fn sym_info(bind: u8, sym_type: u8) -> u8 {
    (bind << 4) + sym_type
}

fn rela_info(sym: u64, rela_type: u32) -> u64 {
    (sym << 32) + rela_type as u64
}

/// A null-prefixed string table that remembers where each name landed.
struct StrTab {
    data: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl StrTab {
    fn new() -> Self {
        StrTab {
            data: vec![0],
            offsets: HashMap::new(),
        }
    }

    /// Append `name`, returning its offset. Repeated names reuse the
    /// first entry.
    fn add(&mut self, name: &str) -> u32 {
        if let Some(&offset) = self.offsets.get(name) {
            return offset;
        }
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(name.as_bytes());
        self.data.push(0);
        self.offsets.insert(name.to_string(), offset);
        offset
    }
}

struct SectionHeader {
    name: u32,
    sh_type: u32,
    flags: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    addralign: u64,
    entsize: u64,
}

impl SectionHeader {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.name.to_le_bytes());
        out.extend_from_slice(&self.sh_type.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes()); // sh_addr: ld's job
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(&self.link.to_le_bytes());
        out.extend_from_slice(&self.info.to_le_bytes());
        out.extend_from_slice(&self.addralign.to_le_bytes());
        out.extend_from_slice(&self.entsize.to_le_bytes());
    }
}

struct Sym {
    name: u32,
    info: u8,
    shndx: u16,
    value: u64,
}

impl Sym {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.name.to_le_bytes());
        out.push(self.info);
        out.push(0); // st_other
        out.extend_from_slice(&self.shndx.to_le_bytes());
        out.extend_from_slice(&self.value.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes()); // st_size
    }
}

struct Rela {
    offset: u64,
    info: u64,
    addend: i64,
}

impl Rela {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.info.to_le_bytes());
        out.extend_from_slice(&self.addend.to_le_bytes());
    }
}

/// Build the complete object file for the encoded text and the interned
/// strings of the compilation.
pub fn generate(text: &EncodedText, c_info: &CompileInfo) -> Result<Vec<u8>, CompileError> {
    // `.shstrtab`: the section names themselves.
    let mut shstrtab = StrTab::new();
    let text_name = shstrtab.add(".text");
    let rodata_name = shstrtab.add(".rodata");
    let shstrtab_name = shstrtab.add(".shstrtab");
    let symtab_name = shstrtab.add(".symtab");
    let strtab_name = shstrtab.add(".strtab");
    let rela_name = shstrtab.add(".rela.text");

    // `.rodata`: interned strings concatenated in id order; the offset
    // table feeds relocation addends and the strN symbol values.
    let mut rodata: Vec<u8> = Vec::new();
    let mut rodata_offsets: Vec<u64> = Vec::new();
    for string in &c_info.known_strings {
        rodata_offsets.push(rodata.len() as u64);
        rodata.extend_from_slice(string.as_bytes());
    }

    // `.symtab`/`.strtab`. Local symbols must precede globals; the
    // local count goes into sh_info.
    let str_names: Vec<String> = (0..c_info.known_strings.len())
        .map(|i| format!("str{}", i))
        .collect();
    let mut strtab = StrTab::new();
    let mut syms: Vec<Sym> = Vec::new();
    let mut sym_index: HashMap<&str, u64> = HashMap::new();

    syms.push(Sym {
        name: 0,
        info: 0,
        shndx: SHN_UNDEF,
        value: 0,
    });
    syms.push(Sym {
        name: strtab.add(FILE_SYM_NAME),
        info: sym_info(STB_LOCAL, STT_FILE),
        shndx: SHN_ABS,
        value: 0,
    });
    syms.push(Sym {
        name: 0,
        info: sym_info(STB_LOCAL, STT_SECTION),
        shndx: TEXT_NDX,
        value: 0,
    });
    syms.push(Sym {
        name: 0,
        info: sym_info(STB_LOCAL, STT_SECTION),
        shndx: RODATA_NDX,
        value: 0,
    });

    for (i, name) in str_names.iter().enumerate() {
        sym_index.insert(name, syms.len() as u64);
        syms.push(Sym {
            name: strtab.add(name),
            info: sym_info(STB_LOCAL, STT_NOTYPE),
            shndx: RODATA_NDX,
            value: rodata_offsets[i],
        });
    }

    for label in &text.labels {
        if !label.is_extern && label.visibility == Visibility::Local {
            sym_index.insert(&label.name, syms.len() as u64);
            syms.push(Sym {
                name: strtab.add(&label.name),
                info: sym_info(STB_LOCAL, STT_NOTYPE),
                shndx: TEXT_NDX,
                value: label.position,
            });
        }
    }

    let n_local = syms.len() as u32;

    for label in &text.labels {
        if !label.is_extern && label.visibility == Visibility::Global {
            sym_index.insert(&label.name, syms.len() as u64);
            syms.push(Sym {
                name: strtab.add(&label.name),
                info: sym_info(STB_GLOBAL, STT_NOTYPE),
                shndx: TEXT_NDX,
                value: label.position,
            });
        }
    }
    for label in &text.labels {
        if label.is_extern {
            sym_index.insert(&label.name, syms.len() as u64);
            syms.push(Sym {
                name: strtab.add(&label.name),
                info: sym_info(STB_GLOBAL, STT_NOTYPE),
                shndx: SHN_UNDEF,
                value: 0,
            });
        }
    }

    // `.rela.text`.
    let mut relas: Vec<Rela> = Vec::new();
    for entry in &text.relas {
        match &entry.target {
            RelaTarget::Str(str_id) => {
                relas.push(Rela {
                    offset: entry.offset,
                    info: rela_info(RODATA_SYM, R_X86_64_32),
                    addend: rodata_offsets[*str_id] as i64,
                });
            }
            RelaTarget::Symbol(name) => {
                let sym = *sym_index.get(name.as_str()).ok_or_else(|| {
                    c_info
                        .err
                        .error(format!("Undefined symbol '{}' in relocation", name))
                })?;
                relas.push(Rela {
                    offset: entry.offset,
                    info: rela_info(sym, R_X86_64_PC32),
                    addend: -4,
                });
            }
        }
    }

    // Section layout: contents start after the headers, every section
    // padded to the alignment boundary.
    let sizes = [
        0u64,
        text.bytes.len() as u64,
        rodata.len() as u64,
        shstrtab.data.len() as u64,
        syms.len() as u64 * SYM_ENTSIZE,
        strtab.data.len() as u64,
        relas.len() as u64 * RELA_ENTSIZE,
    ];
    let mut offsets = [0u64; 7];
    let mut section_offset = align_up(EHSIZE + SHNUM * SHENTSIZE, SECTION_ALIGN);
    for i in 1..7 {
        offsets[i] = section_offset;
        section_offset += align_up(sizes[i], SECTION_ALIGN);
    }

    let headers = [
        SectionHeader {
            name: 0,
            sh_type: 0,
            flags: 0,
            offset: 0,
            size: 0,
            link: 0,
            info: 0,
            addralign: 0,
            entsize: 0,
        },
        SectionHeader {
            name: text_name,
            sh_type: SHT_PROGBITS,
            flags: SHF_ALLOC | SHF_EXECINSTR,
            offset: offsets[1],
            size: sizes[1],
            link: 0,
            info: 0,
            addralign: 16,
            entsize: 0,
        },
        SectionHeader {
            name: rodata_name,
            sh_type: SHT_PROGBITS,
            flags: SHF_ALLOC,
            offset: offsets[2],
            size: sizes[2],
            link: 0,
            info: 0,
            addralign: 4,
            entsize: 0,
        },
        SectionHeader {
            name: shstrtab_name,
            sh_type: SHT_STRTAB,
            flags: 0,
            offset: offsets[3],
            size: sizes[3],
            link: 0,
            info: 0,
            addralign: 1,
            entsize: 0,
        },
        SectionHeader {
            name: symtab_name,
            sh_type: SHT_SYMTAB,
            flags: 0,
            offset: offsets[4],
            size: sizes[4],
            link: STRTAB_NDX,
            info: n_local,
            addralign: 8,
            entsize: SYM_ENTSIZE,
        },
        SectionHeader {
            name: strtab_name,
            sh_type: SHT_STRTAB,
            flags: 0,
            offset: offsets[5],
            size: sizes[5],
            link: 0,
            info: 0,
            addralign: 1,
            entsize: 0,
        },
        SectionHeader {
            name: rela_name,
            sh_type: SHT_RELA,
            flags: 0,
            offset: offsets[6],
            size: sizes[6],
            link: SYMTAB_NDX,
            info: TEXT_NDX as u32,
            addralign: 8,
            entsize: RELA_ENTSIZE,
        },
    ];

    // Serialize: ELF header, section headers, then the contents.
    let mut out: Vec<u8> = Vec::new();

    let mut e_ident = [0u8; EI_NIDENT];
    e_ident[0] = 0x7f;
    e_ident[1] = b'E';
    e_ident[2] = b'L';
    e_ident[3] = b'F';
    e_ident[4] = ELFCLASS64;
    e_ident[5] = ELFDATA2LSB;
    e_ident[6] = EV_CURRENT;
    e_ident[7] = ELFOSABI_SYSV;
    e_ident[8] = SYSV_ABI_VERSION;
    out.extend_from_slice(&e_ident);

    out.extend_from_slice(&ET_REL.to_le_bytes());
    out.extend_from_slice(&EM_X86_64.to_le_bytes());
    out.extend_from_slice(&(EV_CURRENT as u32).to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes()); // e_entry
    out.extend_from_slice(&0u64.to_le_bytes()); // e_phoff
    out.extend_from_slice(&EHSIZE.to_le_bytes()); // e_shoff: right after the header
    out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    out.extend_from_slice(&(EHSIZE as u16).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // e_phentsize
    out.extend_from_slice(&0u16.to_le_bytes()); // e_phnum
    out.extend_from_slice(&(SHENTSIZE as u16).to_le_bytes());
    out.extend_from_slice(&(SHNUM as u16).to_le_bytes());
    out.extend_from_slice(&SHSTRTAB_NDX.to_le_bytes());
    debug_assert_eq!(out.len() as u64, EHSIZE);

    for header in &headers {
        header.write(&mut out);
    }

    let pad = |out: &mut Vec<u8>| {
        while (out.len() as u64) % SECTION_ALIGN != 0 {
            out.push(0);
        }
    };

    pad(&mut out);
    out.extend_from_slice(&text.bytes);
    pad(&mut out);
    out.extend_from_slice(&rodata);
    pad(&mut out);
    out.extend_from_slice(&shstrtab.data);
    pad(&mut out);
    for sym in &syms {
        sym.write(&mut out);
    }
    pad(&mut out);
    out.extend_from_slice(&strtab.data);
    pad(&mut out);
    for rela in &relas {
        rela.write(&mut out);
    }
    pad(&mut out);

    Ok(out)
}
