//! Lexer for least source code.
//!
//! Turns source text into a flat token stream, one `Eol` per input line.
//! Interpolated string literals re-enter the lexer for their `[ ... ]`
//! substitutions, and a consolidation pass fuses array accesses and
//! `-> keyword` value-function calls into single tokens.

use crate::context::CompileInfo;
use crate::diagnostics::CompileError;
use crate::dictionary::{AritOp, CmpOp, Keyword, LogOp, ValueFunc};

/// What a bracket pair is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BracketPurpose {
    /// `(` and `)`.
    Grouping,
    /// `{` and `}`, array subscripts.
    Access,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BracketKind {
    Open,
    Close,
}

/// One piece of an interpolated string literal.
#[derive(Debug, Clone, PartialEq)]
pub enum LstrSegment {
    /// Literal text between substitutions, escapes already expanded.
    Text(String),
    /// The tokens of one `[ ... ]` substitution.
    Expr(Vec<Token>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Key(Keyword),
    Arit(AritOp),
    Cmp(CmpOp),
    Log(LogOp),
    /// Interpolated string literal.
    Lstr(Vec<LstrSegment>),
    Num(i64),
    Var(String),
    /// `name{ ... }`, fused by consolidation.
    Access { name: String, index: Vec<Token> },
    /// `->` before consolidation.
    Call,
    /// `-> keyword`, fused by consolidation.
    CompleteCall(ValueFunc),
    Bracket {
        purpose: BracketPurpose,
        kind: BracketKind,
    },
    /// `;`
    Sep,
    /// End of a source line.
    Eol,
}

/// A token and the zero-based line its first character appeared on.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize) -> Self {
        Token { kind, line }
    }
}

/// Characters that are tokens of their own and therefore end a word.
const SINGLE_SYMBOLS: &str = "+-*/%<>;()[]{}";

/// Characters that only occur inside two-character symbols but still end
/// a word.
const SYMBOL_PARTS: &str = "=!&|";

const DOUBLE_SYMBOLS: [&str; 7] = ["==", "!=", "<=", ">=", "&&", "||", "->"];

fn is_word_ending(c: char) -> bool {
    c.is_whitespace() || SINGLE_SYMBOLS.contains(c) || SYMBOL_PARTS.contains(c)
}

/// Expansion of `\e` escapes, shared by string and char contexts.
fn escape_char(e: char) -> Option<char> {
    match e {
        'n' => Some('\n'),
        't' => Some('\t'),
        '\\' => Some('\\'),
        '"' => Some('"'),
        '\'' => Some('\''),
        '[' => Some('['),
        ']' => Some(']'),
        _ => None,
    }
}

/// Lex a whole source file into tokens. Every line boundary emits exactly
/// one `Eol`, empty lines included.
pub fn lex(source: &str, c_info: &mut CompileInfo) -> Result<Vec<Token>, CompileError> {
    let mut tokens = Vec::new();

    for (line_no, line) in source.lines().enumerate() {
        c_info.err.set_line(line_no);

        let mut rest = line;
        while let Some(word) = next_word(&mut rest, c_info)? {
            tokens.push(token_from_word(word, line_no, c_info)?);
        }
        tokens.push(Token::new(TokenKind::Eol, line_no));
    }

    consolidate(&mut tokens, c_info)?;

    Ok(tokens)
}

/// Lex the contents of one `[ ... ]` substitution. The fragment belongs
/// to `line`; a temporary `Eol` bounds the consolidation scan and is
/// stripped again before returning.
fn lex_fragment(
    fragment: &str,
    line: usize,
    c_info: &mut CompileInfo,
) -> Result<Vec<Token>, CompileError> {
    let mut tokens = Vec::new();

    let mut rest = fragment;
    while let Some(word) = next_word(&mut rest, c_info)? {
        tokens.push(token_from_word(word, line, c_info)?);
    }
    tokens.push(Token::new(TokenKind::Eol, line));

    consolidate(&mut tokens, c_info)?;

    debug_assert!(matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Eol)));
    tokens.pop();

    Ok(tokens)
}

/// Extract the next word from `line`, advancing it past the consumed
/// characters. Returns `None` once the line is exhausted.
fn next_word<'a>(
    line: &mut &'a str,
    c_info: &CompileInfo,
) -> Result<Option<&'a str>, CompileError> {
    *line = line.trim_start();
    let first = match line.chars().next() {
        Some(c) => c,
        None => return Ok(None),
    };

    // String and char literals span word-ending characters, so they are
    // carved out before symbol and word scanning.
    if line.starts_with('"') {
        let end = find_closing_quote(line, '"');
        let end = end.ok_or_else(|| {
            c_info
                .err
                .error(format!("Unterminated string-literal {}", line))
        })?;
        let (word, rest) = line.split_at(end + 1);
        *line = rest;
        return Ok(Some(word));
    }
    if line.starts_with('\'') {
        if let Some(end) = find_closing_quote(line, '\'') {
            let (word, rest) = line.split_at(end + 1);
            *line = rest;
            return Ok(Some(word));
        }
        // No closing quote on this line; hand the rest to the char parser
        // for its length diagnostics.
        let word = *line;
        *line = "";
        return Ok(Some(word));
    }

    if line.len() >= 2 && line.is_char_boundary(2) && DOUBLE_SYMBOLS.contains(&&line[..2]) {
        let (word, rest) = line.split_at(2);
        *line = rest;
        return Ok(Some(word));
    }
    if SINGLE_SYMBOLS.contains(first) {
        let (word, rest) = line.split_at(first.len_utf8());
        *line = rest;
        return Ok(Some(word));
    }

    let end = line
        .char_indices()
        .find(|&(_, c)| is_word_ending(c))
        .map(|(i, _)| i)
        .unwrap_or(line.len());
    // A lone symbol-part character ('=', '!', ...) would otherwise yield
    // an empty word; consume it and let classification reject it.
    let end = if end == 0 { first.len_utf8() } else { end };

    let (word, rest) = line.split_at(end);
    *line = rest;
    Ok(Some(word))
}

/// Byte index of the closing unescaped `quote`, assuming `line` starts
/// with one.
fn find_closing_quote(line: &str, quote: char) -> Option<usize> {
    let mut last = '\0';
    for (i, c) in line.char_indices().skip(1) {
        if c == quote && last != '\\' {
            return Some(i);
        }
        last = c;
    }
    None
}

/// Classify one extracted word.
fn token_from_word(
    word: &str,
    line: usize,
    c_info: &mut CompileInfo,
) -> Result<Token, CompileError> {
    let kind = if word.starts_with('"') {
        TokenKind::Lstr(parse_string(word, line, c_info)?)
    } else if word.starts_with('\'') {
        TokenKind::Num(parse_char(word, c_info)?)
    } else if word.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        TokenKind::Num(parse_number(word, c_info)?)
    } else if word == ";" {
        TokenKind::Sep
    } else if word == "->" {
        TokenKind::Call
    } else if let Some(op) = CmpOp::from_str(word) {
        TokenKind::Cmp(op)
    } else if let Some(key) = Keyword::from_str(word) {
        TokenKind::Key(key)
    } else if let Some(op) = AritOp::from_str(word) {
        TokenKind::Arit(op)
    } else if let Some(op) = LogOp::from_str(word) {
        TokenKind::Log(op)
    } else if let Some((purpose, bracket_kind)) = bracket_from_word(word) {
        TokenKind::Bracket {
            purpose,
            kind: bracket_kind,
        }
    } else {
        check_correct_var_name(word, c_info)?;
        TokenKind::Var(word.to_string())
    };

    Ok(Token::new(kind, line))
}

fn bracket_from_word(word: &str) -> Option<(BracketPurpose, BracketKind)> {
    match word {
        "(" => Some((BracketPurpose::Grouping, BracketKind::Open)),
        ")" => Some((BracketPurpose::Grouping, BracketKind::Close)),
        "{" => Some((BracketPurpose::Access, BracketKind::Open)),
        "}" => Some((BracketPurpose::Access, BracketKind::Close)),
        _ => None,
    }
}

/// Variables must start with a letter; afterwards letters, digits and
/// underscores are allowed.
fn check_correct_var_name(word: &str, c_info: &CompileInfo) -> Result<(), CompileError> {
    let mut chars = word.chars();
    let first = chars.next();
    c_info.err.on_false(
        first.is_some_and(|c| c.is_ascii_alphabetic()),
        format!("Variables must begin with a letter: '{}'", word),
    )?;
    for c in chars {
        c_info.err.on_false(
            c.is_ascii_alphanumeric() || c == '_',
            format!("Invalid character '{}' in variable name: '{}'", c, word),
        )?;
    }
    Ok(())
}

/// Integer literals: `0x` prefix is hexadecimal, any other leading zero
/// is octal, everything else is decimal.
fn parse_number(word: &str, c_info: &CompileInfo) -> Result<i64, CompileError> {
    let parsed = if let Some(hex) = word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else if word.len() > 1 && word.starts_with('0') {
        i64::from_str_radix(&word[1..], 8)
    } else {
        word.parse::<i64>()
    };

    parsed.map_err(|_| {
        c_info
            .err
            .error(format!("Could not convert '{}' to an integer", word))
    })
}

/// Character constants: `'c'` or `'\e'`, both quotes included in `word`.
fn parse_char(word: &str, c_info: &CompileInfo) -> Result<i64, CompileError> {
    let chars: Vec<char> = word.chars().collect();
    let len = chars.len();

    c_info.err.on_false(
        (len == 3 || len == 4) && chars[0] == '\'' && chars[len - 1] == '\'',
        format!("Could not parse string '{}' as character constant", word),
    )?;

    if chars[1] == '\\' {
        c_info
            .err
            .on_false(len == 4, "Expected another character after '\\'")?;
        let parsed = escape_char(chars[2]).ok_or_else(|| {
            c_info
                .err
                .error(format!("Could not parse escape sequence '\\{}'", chars[2]))
        })?;
        Ok(parsed as i64)
    } else {
        c_info.err.on_false(
            len == 3,
            format!("Too many symbols in character constant {}", word),
        )?;
        Ok(chars[1] as i64)
    }
}

/// Check validity of a quoted string literal, expand escape sequences and
/// re-lex any `[ ... ]` substitutions into token groups.
fn parse_string(
    word: &str,
    line: usize,
    c_info: &mut CompileInfo,
) -> Result<Vec<LstrSegment>, CompileError> {
    let chars: Vec<char> = word.chars().collect();
    let len = chars.len();

    c_info.err.on_false(len > 2, "String is empty")?;
    debug_assert!(chars[0] == '"' && chars[len - 1] == '"');

    let mut segments = Vec::new();
    let mut text = String::new();

    let mut i = 1;
    while i < len - 1 {
        match chars[i] {
            '\\' => {
                i += 1;
                c_info.err.on_true(
                    i >= len - 1,
                    "Reached end of line while trying to parse escape sequence",
                )?;
                let expanded = escape_char(chars[i]).ok_or_else(|| {
                    c_info
                        .err
                        .error(format!("Could not parse escape sequence: '\\{}'", chars[i]))
                })?;
                text.push(expanded);
            }
            '[' => {
                if !text.is_empty() {
                    segments.push(LstrSegment::Text(std::mem::take(&mut text)));
                }

                let close = chars[i..len - 1]
                    .iter()
                    .position(|&c| c == ']')
                    .ok_or_else(|| c_info.err.error("'[' without closing ']'"))?;
                let inside: String = chars[i + 1..i + close].iter().collect();

                c_info
                    .err
                    .on_true(inside.contains('['), "Found '[' inside format argument")?;

                let parsed = lex_fragment(&inside, line, c_info)?;
                c_info.err.on_true(
                    parsed.is_empty(),
                    "Could not parse format parameter to tokens",
                )?;
                for tk in &parsed {
                    c_info.err.on_false(
                        could_be_num(&tk.kind),
                        "Only variables, numbers and operators are allowed inside a format parameter",
                    )?;
                }
                segments.push(LstrSegment::Expr(parsed));

                i += close;
            }
            ']' => {
                return Err(c_info.err.error("Unexpected closing ']'"));
            }
            c => {
                text.push(c);
            }
        }
        i += 1;
    }

    if !text.is_empty() {
        segments.push(LstrSegment::Text(text));
    }

    c_info.err.on_true(
        segments.is_empty(),
        "lstring format has no contents after parse_string",
    )?;

    Ok(segments)
}

/// Tokens allowed inside an arithmetic expression.
fn could_be_num(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Num(_)
            | TokenKind::Var(_)
            | TokenKind::Arit(_)
            | TokenKind::Access { .. }
            | TokenKind::CompleteCall(_)
    )
}

/// Fuse array accesses and `-> keyword` calls into single tokens.
///
/// Restarts from the top after every rewrite, because splicing shifts
/// all following indices; runs until no rewrite applies. Nested accesses
/// are handled by consolidating the extracted inner tokens first.
fn consolidate(tokens: &mut Vec<Token>, c_info: &mut CompileInfo) -> Result<(), CompileError> {
    'restart: loop {
        for i in 0..tokens.len() {
            c_info.err.set_line(tokens[i].line);

            match &tokens[i].kind {
                TokenKind::Bracket {
                    purpose: BracketPurpose::Access,
                    kind,
                } => {
                    c_info.err.on_true(
                        i == 0 || !matches!(tokens[i - 1].kind, TokenKind::Var(_)),
                        "'{' not following variable",
                    )?;
                    c_info
                        .err
                        .on_true(*kind == BracketKind::Close, "Unexpected closing '}'")?;

                    let close = find_closing_bracket(tokens, i + 1, c_info)?;

                    let line = tokens[i].line;
                    let name = match &tokens[i - 1].kind {
                        TokenKind::Var(name) => name.clone(),
                        _ => unreachable!(),
                    };

                    let mut inner: Vec<Token> = tokens.drain(i + 1..close).collect();
                    consolidate(&mut inner, c_info)?;

                    // Remove `var`, `{` and `}`; insert the fused access.
                    tokens.drain(i - 1..=i + 1);
                    tokens.insert(
                        i - 1,
                        Token::new(TokenKind::Access { name, index: inner }, line),
                    );

                    continue 'restart;
                }
                TokenKind::Call => {
                    c_info
                        .err
                        .on_true(i == tokens.len() - 1, "No more tokens after '->'")?;
                    let key = match &tokens[i + 1].kind {
                        TokenKind::Key(key) => *key,
                        _ => return Err(c_info.err.error("No key after '->'")),
                    };
                    let vfunc = key.value_func().ok_or_else(|| {
                        c_info.err.error(format!(
                            "Key '{}' not convertible to evaluable function",
                            key.as_str()
                        ))
                    })?;

                    let line = tokens[i + 1].line;
                    tokens.drain(i..=i + 1);
                    tokens.insert(i, Token::new(TokenKind::CompleteCall(vfunc), line));

                    continue 'restart;
                }
                _ => {}
            }
        }

        return Ok(());
    }
}

/// Index of the `}` matching an access bracket opened just before
/// `after_open`, by balanced scan bounded to the current line.
fn find_closing_bracket(
    tokens: &[Token],
    after_open: usize,
    c_info: &CompileInfo,
) -> Result<usize, CompileError> {
    let mut count = 1;

    for (i, tk) in tokens.iter().enumerate().skip(after_open) {
        if matches!(tk.kind, TokenKind::Eol) {
            break;
        }
        if let TokenKind::Bracket {
            purpose: BracketPurpose::Access,
            kind,
        } = tk.kind
        {
            match kind {
                BracketKind::Open => count += 1,
                BracketKind::Close => count -= 1,
            }
            if count == 0 {
                return Ok(i);
            }
        }
    }

    Err(c_info.err.error("Unclosed bracket"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_str(source: &str) -> Result<Vec<Token>, CompileError> {
        let mut c_info = CompileInfo::new("test.least");
        lex(source, &mut c_info)
    }

    fn kinds(tokens: &[Token]) -> Vec<&TokenKind> {
        tokens.iter().map(|t| &t.kind).collect()
    }

    #[test]
    fn test_basic_statement() {
        let ts = lex_str("int a 3").unwrap();
        assert_eq!(
            kinds(&ts),
            vec![
                &TokenKind::Key(Keyword::Int),
                &TokenKind::Var("a".to_string()),
                &TokenKind::Num(3),
                &TokenKind::Eol,
            ]
        );
    }

    #[test]
    fn test_lines_are_preserved() {
        let ts = lex_str("exit 0\n\nexit 1").unwrap();
        let lines: Vec<usize> = ts.iter().map(|t| t.line).collect();
        // Line 1 is empty and still contributes its Eol.
        assert_eq!(lines, vec![0, 0, 0, 1, 2, 2, 2]);
        assert!(matches!(ts[3].kind, TokenKind::Eol));
    }

    #[test]
    fn test_operators_and_separators() {
        let ts = lex_str("set a 1 + 2 * 3 ; exit a").unwrap();
        assert_eq!(
            kinds(&ts),
            vec![
                &TokenKind::Key(Keyword::Set),
                &TokenKind::Var("a".to_string()),
                &TokenKind::Num(1),
                &TokenKind::Arit(AritOp::Add),
                &TokenKind::Num(2),
                &TokenKind::Arit(AritOp::Mul),
                &TokenKind::Num(3),
                &TokenKind::Sep,
                &TokenKind::Key(Keyword::Exit),
                &TokenKind::Var("a".to_string()),
                &TokenKind::Eol,
            ]
        );
    }

    #[test]
    fn test_two_char_symbols_win_over_single() {
        let ts = lex_str("while a >= 10").unwrap();
        assert!(matches!(ts[2].kind, TokenKind::Cmp(CmpOp::GreaterOrEq)));

        // `->` must not lex as `-`, `>`.
        let ts = lex_str("set a -> time").unwrap();
        assert!(matches!(ts[2].kind, TokenKind::CompleteCall(ValueFunc::Time)));
    }

    #[test]
    fn test_symbols_end_words_without_spaces() {
        let ts = lex_str("exit a+1").unwrap();
        assert_eq!(
            kinds(&ts),
            vec![
                &TokenKind::Key(Keyword::Exit),
                &TokenKind::Var("a".to_string()),
                &TokenKind::Arit(AritOp::Add),
                &TokenKind::Num(1),
                &TokenKind::Eol,
            ]
        );
    }

    #[test]
    fn test_number_bases() {
        let ts = lex_str("exit 0x1f ; exit 010 ; exit 42").unwrap();
        let nums: Vec<i64> = ts
            .iter()
            .filter_map(|t| match t.kind {
                TokenKind::Num(n) => Some(n),
                _ => None,
            })
            .collect();
        assert_eq!(nums, vec![0x1f, 8, 42]);
    }

    #[test]
    fn test_malformed_number_is_fatal() {
        let err = lex_str("exit 9x").unwrap_err();
        assert!(err.message.contains("Could not convert '9x' to an integer"));
    }

    #[test]
    fn test_char_literals() {
        let ts = lex_str("putchar 'a' ; putchar '\\n' ; putchar ' '").unwrap();
        let nums: Vec<i64> = ts
            .iter()
            .filter_map(|t| match t.kind {
                TokenKind::Num(n) => Some(n),
                _ => None,
            })
            .collect();
        assert_eq!(nums, vec![97, 10, 32]);
    }

    #[test]
    fn test_bad_char_literals() {
        let err = lex_str("putchar 'ab'").unwrap_err();
        assert!(err.message.contains("character constant"));

        let err = lex_str("putchar '\\q'").unwrap_err();
        assert!(err.message.contains("Could not parse escape sequence"));
    }

    #[test]
    fn test_unterminated_string() {
        let err = lex_str("print \"oops").unwrap_err();
        assert!(err.message.contains("Unterminated string-literal"));
    }

    #[test]
    fn test_plain_lstr() {
        let ts = lex_str("print \"hi\"").unwrap();
        match &ts[1].kind {
            TokenKind::Lstr(segments) => {
                assert_eq!(segments, &vec![LstrSegment::Text("hi".to_string())]);
            }
            other => panic!("Expected Lstr, got {:?}", other),
        }
    }

    #[test]
    fn test_lstr_escapes() {
        let ts = lex_str("print \"a\\n\\t\\\\b\\[c\\]\"").unwrap();
        match &ts[1].kind {
            TokenKind::Lstr(segments) => {
                assert_eq!(segments, &vec![LstrSegment::Text("a\n\t\\b[c]".to_string())]);
            }
            other => panic!("Expected Lstr, got {:?}", other),
        }
    }

    #[test]
    fn test_lstr_substitution() {
        let ts = lex_str("print \"value: [a + 1]!\"").unwrap();
        match &ts[1].kind {
            TokenKind::Lstr(segments) => {
                assert_eq!(segments.len(), 3);
                assert_eq!(segments[0], LstrSegment::Text("value: ".to_string()));
                match &segments[1] {
                    LstrSegment::Expr(tokens) => {
                        assert_eq!(
                            kinds(tokens),
                            vec![
                                &TokenKind::Var("a".to_string()),
                                &TokenKind::Arit(AritOp::Add),
                                &TokenKind::Num(1),
                            ]
                        );
                    }
                    other => panic!("Expected Expr segment, got {:?}", other),
                }
                assert_eq!(segments[2], LstrSegment::Text("!".to_string()));
            }
            other => panic!("Expected Lstr, got {:?}", other),
        }
    }

    #[test]
    fn test_lstr_adjacent_substitutions_stay_grouped() {
        let ts = lex_str("print \"[a][b]\"").unwrap();
        match &ts[1].kind {
            TokenKind::Lstr(segments) => {
                assert_eq!(segments.len(), 2);
                assert!(matches!(segments[0], LstrSegment::Expr(_)));
                assert!(matches!(segments[1], LstrSegment::Expr(_)));
            }
            other => panic!("Expected Lstr, got {:?}", other),
        }
    }

    #[test]
    fn test_lstr_bracket_errors() {
        let err = lex_str("print \"[a\"").unwrap_err();
        assert!(err.message.contains("'[' without closing ']'"));

        let err = lex_str("print \"a]b\"").unwrap_err();
        assert!(err.message.contains("Unexpected closing ']'"));

        let err = lex_str("print \"\"").unwrap_err();
        assert!(err.message.contains("String is empty"));
    }

    #[test]
    fn test_lstr_rejects_statement_tokens() {
        let err = lex_str("print \"[print]\"").unwrap_err();
        assert!(err
            .message
            .contains("Only variables, numbers and operators are allowed"));
    }

    #[test]
    fn test_access_consolidation() {
        let ts = lex_str("set xs{1} 2").unwrap();
        match &ts[1].kind {
            TokenKind::Access { name, index } => {
                assert_eq!(name, "xs");
                assert_eq!(kinds(index), vec![&TokenKind::Num(1)]);
            }
            other => panic!("Expected Access, got {:?}", other),
        }
        assert!(matches!(ts[2].kind, TokenKind::Num(2)));
    }

    #[test]
    fn test_nested_access_consolidation() {
        let ts = lex_str("exit xs{ys{0}}").unwrap();
        match &ts[1].kind {
            TokenKind::Access { name, index } => {
                assert_eq!(name, "xs");
                match &index[0].kind {
                    TokenKind::Access { name, index } => {
                        assert_eq!(name, "ys");
                        assert_eq!(kinds(index), vec![&TokenKind::Num(0)]);
                    }
                    other => panic!("Expected nested Access, got {:?}", other),
                }
            }
            other => panic!("Expected Access, got {:?}", other),
        }
    }

    #[test]
    fn test_access_errors() {
        let err = lex_str("set { 1").unwrap_err();
        assert!(err.message.contains("'{' not following variable"));

        let err = lex_str("set xs{1 2").unwrap_err();
        assert!(err.message.contains("Unclosed bracket"));
    }

    #[test]
    fn test_call_consolidation_errors() {
        // The line's Eol sits after `->`, so the missing-key branch fires.
        let err = lex_str("set a ->").unwrap_err();
        assert!(err.message.contains("No key after '->'"));

        let err = lex_str("set a -> 5").unwrap_err();
        assert!(err.message.contains("No key after '->'"));

        let err = lex_str("set a -> print").unwrap_err();
        assert!(err
            .message
            .contains("Key 'print' not convertible to evaluable function"));
    }

    #[test]
    fn test_var_name_validation() {
        let err = lex_str("int _a 1").unwrap_err();
        assert!(err.message.contains("Variables must begin with a letter"));

        let err = lex_str("int a$b 1").unwrap_err();
        assert!(err.message.contains("Invalid character '$'"));
    }
}
