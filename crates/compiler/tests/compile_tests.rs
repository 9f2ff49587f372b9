//! End-to-end tests: least source text in, ELF object bytes out.
//!
//! These drive the whole pipeline through `compile_to_object` and check
//! the emitted object with a small hand-rolled ELF reader.

use lcc::compile_to_object;

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes(bytes[at..at + 2].try_into().unwrap())
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn u64_at(bytes: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap())
}

/// `(sh_offset, sh_size)` of section `i`.
fn section(bytes: &[u8], i: usize) -> (usize, usize) {
    let header = 64 + i * 64;
    (
        u64_at(bytes, header + 24) as usize,
        u64_at(bytes, header + 32) as usize,
    )
}

fn section_bytes<'a>(object: &'a [u8], i: usize) -> &'a [u8] {
    let (offset, size) = section(object, i);
    &object[offset..offset + size]
}

/// Symbol names in symtab order, read through `.strtab`.
fn symbol_names(object: &[u8]) -> Vec<String> {
    let symtab = section_bytes(object, 4);
    let strtab = section_bytes(object, 5);

    symtab
        .chunks(24)
        .map(|sym| {
            let name_off = u32_at(sym, 0) as usize;
            let end = strtab[name_off..]
                .iter()
                .position(|&b| b == 0)
                .map(|p| name_off + p)
                .unwrap_or(strtab.len());
            String::from_utf8_lossy(&strtab[name_off..end]).to_string()
        })
        .collect()
}

/// `(offset, symbol index, relocation type, addend)` per rela entry.
fn relocations(object: &[u8]) -> Vec<(u64, u64, u32, i64)> {
    section_bytes(object, 6)
        .chunks(24)
        .map(|rela| {
            let info = u64_at(rela, 8);
            (
                u64_at(rela, 0),
                info >> 32,
                (info & 0xffff_ffff) as u32,
                u64_at(rela, 16) as i64,
            )
        })
        .collect()
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

const R_X86_64_PC32: u32 = 2;
const R_X86_64_32: u32 = 10;

#[test]
fn test_print_string_object() {
    let object = compile_to_object("print \"hi\"", "hi.least").unwrap();

    assert_eq!(&object[0..4], b"\x7fELF");
    assert_eq!(u16_at(&object, 60), 7); // e_shnum

    // The STT_FILE entry carries the emitter's fixed name.
    assert_eq!(symbol_names(&object)[1], "elf.cpp");

    // One string in .rodata.
    assert_eq!(section_bytes(&object, 2), b"hi");

    // The write(2) sequence: rax = 1, rdi = 1, then (after the string
    // mov) rdx = 2 and syscall.
    let text = section_bytes(&object, 1);
    assert!(contains_bytes(text, &[0xb8, 1, 0, 0, 0, 0xbf, 1, 0, 0, 0]));
    assert!(contains_bytes(text, &[0xba, 2, 0, 0, 0, 0x0f, 0x05]));

    // Exactly one relocation: the string reference against .rodata.
    let relas = relocations(&object);
    assert_eq!(relas.len(), 1);
    let (_, sym, rela_type, addend) = relas[0];
    assert_eq!(sym, 3); // .rodata section symbol
    assert_eq!(rela_type, R_X86_64_32);
    assert_eq!(addend, 0);
}

#[test]
fn test_int_and_exit_object() {
    let object = compile_to_object("int a 3\nexit a", "exit.least").unwrap();
    let text = section_bytes(&object, 1);

    // One stack word is reserved.
    assert!(contains_bytes(text, &[0x48, 0x81, 0xec, 8, 0, 0, 0]));
    // 3 is stored at [rbp - 8].
    assert!(contains_bytes(text, &[0x48, 0xc7, 0x45, 0xf8, 3, 0, 0, 0]));
    // The slot is loaded into rdi, rax becomes 60, syscall.
    assert!(contains_bytes(text, &[0x48, 0x8b, 0x7d, 0xf8]));
    assert!(contains_bytes(text, &[0xb8, 60, 0, 0, 0, 0x0f, 0x05]));
}

#[test]
fn test_precedence_computation_object() {
    let object =
        compile_to_object("int a 2\nset a a + 3 * 4\nexit a", "arith.least").unwrap();
    let text = section_bytes(&object, 1);

    // The multiplication runs through `mul rcx` and the result is
    // stored back through r8.
    assert!(contains_bytes(text, &[0x48, 0xf7, 0xe1]));
    assert!(contains_bytes(text, &[0x4c, 0x89, 0x45, 0xf8]));
}

#[test]
fn test_if_chain_object() {
    let source = "\
int a 1
if a == 1
exit 1
elif a == 2
exit 2
else
exit 0
end";
    let object = compile_to_object(source, "chain.least").unwrap();

    let names = symbol_names(&object);
    assert!(names.iter().any(|n| n == ".end1025"));
    assert!(names.iter().any(|n| n == ".end1026"));
    assert!(names.iter().any(|n| n == ".end1027"));

    // Both non-terminal branches jump to the chain's real end: two
    // PC-relative relocations against `.end1027`.
    let real_end = names.iter().position(|n| n == ".end1027").unwrap() as u64;
    let jumps_to_real_end = relocations(&object)
        .iter()
        .filter(|(_, sym, rela_type, addend)| {
            *sym == real_end && *rela_type == R_X86_64_PC32 && *addend == -4
        })
        .count();
    assert_eq!(jumps_to_real_end, 2);

    // `==` compiles to its opposite, jne (0x0f 0x85).
    let text = section_bytes(&object, 1);
    assert!(contains_bytes(text, &[0x0f, 0x85]));
}

#[test]
fn test_extern_symbols_are_undefined() {
    let object = compile_to_object("int a 5\nprint \"[a]\"", "ext.least").unwrap();

    let names = symbol_names(&object);
    let uprint = names.iter().position(|n| n == "uprint").unwrap();

    // st_shndx of the extern is SHN_UNDEF.
    let symtab = section_bytes(&object, 4);
    assert_eq!(u16_at(&symtab[uprint * 24..], 6), 0);

    // The call references it PC-relative.
    assert!(relocations(&object)
        .iter()
        .any(|(_, sym, rela_type, _)| *sym == uprint as u64 && *rela_type == R_X86_64_PC32));
}

#[test]
fn test_symtab_locals_precede_globals() {
    let object = compile_to_object("int a 5\nprint \"[a]\"", "locals.least").unwrap();

    // sh_info is the index of the first global symbol.
    let symtab_header = 64 + 4 * 64;
    let first_global = u32_at(&object, symtab_header + 44) as usize;

    let symtab = section_bytes(&object, 4);
    for (i, sym) in symtab.chunks(24).enumerate() {
        let bind = sym[4] >> 4;
        if i < first_global {
            assert_eq!(bind, 0, "symbol {} should be local", i);
        } else {
            assert_eq!(bind, 1, "symbol {} should be global", i);
        }
    }
}

#[test]
fn test_unterminated_string_diagnostic() {
    let err = compile_to_object("print \"oops", "oops.least").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Unterminated string-literal"));
    assert!(message.starts_with("Compiler Error! oops.least:1"));
}

#[test]
fn test_undefined_variable_diagnostic() {
    let err = compile_to_object("exit a", "undef.least").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("'a'"));
    assert!(message.contains("undefined"));
}

#[test]
fn test_no_partial_output_on_failure() {
    // The object for a failing program is never produced at all; the
    // pipeline stops at the first error.
    assert!(compile_to_object("int a 1\nint a 2\nexit a", "dup.least").is_err());
}

#[test]
fn test_object_roundtrip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("roundtrip.least");
    std::fs::write(&source_path, "putchar 'x'\nexit 0\n").unwrap();

    let source = std::fs::read_to_string(&source_path).unwrap();
    let object = compile_to_object(&source, "roundtrip.least").unwrap();

    let object_path = dir.path().join("roundtrip.o");
    std::fs::write(&object_path, &object).unwrap();

    let reread = std::fs::read(&object_path).unwrap();
    assert_eq!(reread, object);
    assert_eq!(&reread[0..4], b"\x7fELF");
    assert!(symbol_names(&reread).iter().any(|n| n == "putchar"));
}

/// An empty `ar` archive: runtime enough for programs that never call
/// `uprint` or `putchar`.
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
const EMPTY_ARCHIVE: &[u8] = b"!<arch>\n";

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
fn ld_available() -> bool {
    std::process::Command::new("ld")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success())
}

#[test]
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
fn test_run_after_link_propagates_exit_status() {
    if !ld_available() {
        eprintln!("skipping: no ld on this machine");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let runtime = dir.path().join("libstdleast.a");
    std::fs::write(&runtime, EMPTY_ARCHIVE).unwrap();

    // A program that fails must fail the driver too.
    let seven = dir.path().join("seven.least");
    std::fs::write(&seven, "exit 7\n").unwrap();
    let mut config = lcc::CompilerConfig::new().with_runtime_lib(runtime.clone());
    config.run_after_link = true;
    let err = lcc::compile_file(&seven, &config).unwrap_err();
    assert!(err.contains("exited with code 7"), "{}", err);

    // A clean exit keeps the driver's result clean.
    let zero = dir.path().join("zero.least");
    std::fs::write(&zero, "exit 0\n").unwrap();
    let mut config = lcc::CompilerConfig::new().with_runtime_lib(runtime);
    config.run_after_link = true;
    lcc::compile_file(&zero, &config).unwrap();
}

#[test]
fn test_while_loop_object() {
    let source = "\
int a 10
while a > 0
sub a 1
end
exit a";
    let object = compile_to_object(source, "loop.least").unwrap();
    let names = symbol_names(&object);
    assert!(names.iter().any(|n| n == ".entry1025"));
    assert!(names.iter().any(|n| n == ".end1025"));

    // The loop fails its condition with jle (opposite of >).
    let text = section_bytes(&object, 1);
    assert!(contains_bytes(text, &[0x0f, 0x8e]));
}
