//! Indent-stack tokeniser (spec §4.1).
//!
//! The retrieved reference pack did not carry the teacher's own
//! `tokenizer::core` module (its CPython-derived tokenising state machine is
//! license-gated and was filtered out of the pack — see `tokenizer/tests.rs`
//! for the shape of its public surface: a `TokConfig`/`TokState`/`TokType`
//! pair driven by repeated `.next()` calls). This module follows that same
//! shape — a `Tokenizer` driven by repeated `next_token()` calls, carrying an
//! explicit indent stack and bracket-depth counter — built from the Python
//! reference grammar's lexical rules directly rather than ported line by
//! line from source we don't have.

use pyrite_core::Span;

use crate::errors::LexError;
use crate::token::{
    FStringPart, Keyword, NumberKind, NumberLiteral, Operator, QuoteStyle, StringFlags,
    StringLiteral, Token, TokenKind,
};

pub struct Tokenizer<'a> {
    src: &'a [u8],
    text: &'a str,
    pos: usize,
    /// Indentation widths of currently open blocks, outermost first; `[0]`
    /// is always present for the module level.
    indent_stack: Vec<usize>,
    paren_depth: u32,
    /// True at the start of a logical line, before leading whitespace has
    /// been measured into an Indent/Dedent decision.
    at_line_start: bool,
    pending_dedents: u32,
    emitted_final_newline: bool,
    done: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(text: &'a str) -> Tokenizer<'a> {
        Tokenizer {
            src: text.as_bytes(),
            text,
            pos: 0,
            indent_stack: vec![0],
            paren_depth: 0,
            at_line_start: true,
            pending_dedents: 0,
            emitted_final_newline: false,
            done: false,
        }
    }

    pub fn tokenize_all(text: &'a str) -> Vec<Token> {
        let mut tok = Tokenizer::new(text);
        let mut out = Vec::new();
        loop {
            let t = tok.next_token();
            let is_eof = matches!(t.kind, TokenKind::EndOfFile);
            out.push(t);
            if is_eof {
                break;
            }
        }
        out
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub fn next_token(&mut self) -> Token {
        if self.pending_dedents > 0 {
            self.pending_dedents -= 1;
            return Token::new(TokenKind::Dedent, Span::new(self.pos as u32, self.pos as u32));
        }
        if self.done {
            return Token::new(TokenKind::EndOfFile, Span::new(self.pos as u32, self.pos as u32));
        }

        if self.at_line_start && self.paren_depth == 0 {
            if let Some(tok) = self.measure_indentation() {
                return tok;
            }
        }

        self.skip_intra_line_whitespace_and_continuations();

        if self.at_end() {
            return self.finish();
        }

        let start = self.pos;
        let c = self.peek().unwrap();

        if c == b'#' {
            return self.lex_comment(start);
        }
        if c == b'\n' || c == b'\r' {
            return self.lex_newline(start);
        }
        if c.is_ascii_alphabetic() || c == b'_' || c >= 0x80 {
            return self.lex_name_or_string_prefix(start);
        }
        if c.is_ascii_digit() || (c == b'.' && self.peek_at(1).map_or(false, |d| d.is_ascii_digit())) {
            return self.lex_number(start);
        }
        if c == b'\'' || c == b'"' {
            return self.lex_string(start, StringFlags::default());
        }
        self.lex_operator(start)
    }

    fn finish(&mut self) -> Token {
        let pos = self.pos as u32;
        if !self.emitted_final_newline {
            self.emitted_final_newline = true;
            if self.indent_stack.len() > 1 {
                self.pending_dedents = (self.indent_stack.len() - 1) as u32;
                self.indent_stack.truncate(1);
            } else {
                self.done = true;
            }
            return Token::new(TokenKind::Newline, Span::new(pos, pos));
        }
        if self.indent_stack.len() > 1 {
            self.pending_dedents = (self.indent_stack.len() - 1) as u32;
            self.indent_stack.truncate(1);
            return self.next_token();
        }
        self.done = true;
        Token::new(TokenKind::EndOfFile, Span::new(pos, pos))
    }

    /// Consumes leading whitespace on a logical line and decides whether it
    /// opens a new indented block, closes one or more, or changes nothing.
    /// Blank lines and comment-only lines never affect the indent stack.
    fn measure_indentation(&mut self) -> Option<Token> {
        let line_start = self.pos;
        let mut width = 0usize;
        let mut saw_tab = false;
        let mut saw_space = false;
        loop {
            match self.peek() {
                Some(b' ') => {
                    width += 1;
                    saw_space = true;
                    self.pos += 1;
                }
                Some(b'\t') => {
                    width += 8 - (width % 8);
                    saw_tab = true;
                    self.pos += 1;
                }
                Some(b'\x0c') => {
                    self.pos += 1;
                }
                _ => break,
            }
        }
        let _ = (saw_tab, saw_space);

        match self.peek() {
            None => {
                self.pos = line_start;
                self.at_line_start = false;
                return None;
            }
            Some(b'\n') | Some(b'\r') | Some(b'#') => {
                self.at_line_start = false;
                return None;
            }
            _ => {}
        }

        self.at_line_start = false;
        let current = *self.indent_stack.last().unwrap();
        if width > current {
            self.indent_stack.push(width);
            return Some(Token::new(
                TokenKind::Indent,
                Span::new(line_start as u32, self.pos as u32),
            ));
        }
        if width < current {
            let mut count = 0u32;
            while *self.indent_stack.last().unwrap() > width {
                self.indent_stack.pop();
                count += 1;
            }
            if *self.indent_stack.last().unwrap() != width {
                // Indentation doesn't match any outer level; recover by
                // treating it as the nearest enclosing level.
                self.indent_stack.push(width);
            }
            self.pending_dedents = count.saturating_sub(1);
            return Some(Token::new(
                TokenKind::Dedent,
                Span::new(line_start as u32, self.pos as u32),
            ));
        }
        None
    }

    fn skip_intra_line_whitespace_and_continuations(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\x0c') => {
                    self.pos += 1;
                }
                Some(b'\\') if matches!(self.peek_at(1), Some(b'\n') | Some(b'\r')) => {
                    self.pos += 1;
                    if self.peek() == Some(b'\r') {
                        self.pos += 1;
                    }
                    if self.peek() == Some(b'\n') {
                        self.pos += 1;
                    }
                }
                Some(b'\n') | Some(b'\r') if self.paren_depth > 0 => {
                    self.pos += 1;
                }
                _ => break,
            }
        }
    }

    fn lex_comment(&mut self, start: usize) -> Token {
        while let Some(c) = self.peek() {
            if c == b'\n' {
                break;
            }
            self.pos += 1;
        }
        let text = self.text[start..self.pos].to_string();
        Token::new(TokenKind::Comment(text), self.span_from(start))
    }

    fn lex_newline(&mut self, start: usize) -> Token {
        if self.peek() == Some(b'\r') {
            self.pos += 1;
        }
        if self.peek() == Some(b'\n') {
            self.pos += 1;
        }
        if self.paren_depth > 0 {
            return self.next_token();
        }
        self.at_line_start = true;
        Token::new(TokenKind::Newline, self.span_from(start))
    }

    fn lex_name_or_string_prefix(&mut self, start: usize) -> Token {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' || c >= 0x80 {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.text[start..self.pos];

        if matches!(self.peek(), Some(b'\'') | Some(b'"')) {
            if let Some(flags) = string_prefix_flags(text) {
                return self.lex_string(start, flags);
            }
        }

        if let Some(kw) = Keyword::from_str(text) {
            return Token::new(TokenKind::Keyword(kw), self.span_from(start));
        }
        Token::new(TokenKind::Identifier(text.to_string()), self.span_from(start))
    }

    fn lex_number(&mut self, start: usize) -> Token {
        let mut kind = NumberKind::Int;
        if self.peek() == Some(b'0')
            && matches!(self.peek_at(1), Some(b'x') | Some(b'X') | Some(b'o') | Some(b'O') | Some(b'b') | Some(b'B'))
        {
            self.pos += 2;
            while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
                self.pos += 1;
            }
        } else {
            while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == b'_') {
                self.pos += 1;
            }
            if self.peek() == Some(b'.') {
                kind = NumberKind::Float;
                self.pos += 1;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == b'_') {
                    self.pos += 1;
                }
            }
            if matches!(self.peek(), Some(b'e') | Some(b'E')) {
                let save = self.pos;
                self.pos += 1;
                if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                    self.pos += 1;
                }
                if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    kind = NumberKind::Float;
                    while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == b'_') {
                        self.pos += 1;
                    }
                } else {
                    self.pos = save;
                }
            }
            if matches!(self.peek(), Some(b'j') | Some(b'J')) {
                kind = NumberKind::Imaginary;
                self.pos += 1;
            }
        }
        let text = self.text[start..self.pos].to_string();
        if text.ends_with('_') || text.contains("__") {
            return Token::new(
                TokenKind::Error(LexError::BadNumber(text).to_string()),
                self.span_from(start),
            );
        }
        Token::new(TokenKind::Number(NumberLiteral { kind, text }), self.span_from(start))
    }

    fn lex_string(&mut self, start: usize, flags: StringFlags) -> Token {
        let quote_char = self.peek().unwrap();
        let triple = self.peek_at(1) == Some(quote_char) && self.peek_at(2) == Some(quote_char);
        let quote_len = if triple { 3 } else { 1 };
        self.pos += quote_len;
        let quote = match (quote_char, triple) {
            (b'\'', false) => QuoteStyle::Single,
            (b'"', false) => QuoteStyle::Double,
            (b'\'', true) => QuoteStyle::TripleSingle,
            (_, true) => QuoteStyle::TripleDouble,
            _ => unreachable!(),
        };

        let mut value = String::new();
        let mut fstring_parts = Vec::new();
        let mut current_literal = String::new();
        loop {
            if self.at_end() {
                return Token::new(
                    TokenKind::Error(LexError::UnterminatedString.to_string()),
                    self.span_from(start),
                );
            }
            let c = self.peek().unwrap();
            if c == quote_char {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote_char) && self.peek_at(2) == Some(quote_char) {
                    self.pos += 3;
                    break;
                }
                self.pos += 1;
                current_literal.push(c as char);
                continue;
            }
            if !triple && (c == b'\n' || c == b'\r') {
                return Token::new(
                    TokenKind::Error(LexError::UnterminatedString.to_string()),
                    self.span_from(start),
                );
            }
            if c == b'\\' && !flags.raw {
                self.pos += 1;
                if let Some(escaped) = self.bump() {
                    current_literal.push_str(&decode_escape(escaped));
                } else {
                    return Token::new(
                        TokenKind::Error(LexError::UnterminatedString.to_string()),
                        self.span_from(start),
                    );
                }
                continue;
            }
            if c == b'\\' && flags.raw {
                self.pos += 1;
                current_literal.push('\\');
                if let Some(next) = self.bump() {
                    current_literal.push(next as char);
                }
                continue;
            }
            if flags.formatted && c == b'{' {
                if self.peek_at(1) == Some(b'{') {
                    self.pos += 2;
                    current_literal.push('{');
                    continue;
                }
                if !current_literal.is_empty() {
                    fstring_parts.push(FStringPart::Literal(std::mem::take(&mut current_literal)));
                }
                self.pos += 1;
                let expr_start = self.pos;
                let mut depth = 1u32;
                while depth > 0 {
                    match self.peek() {
                        None => {
                            return Token::new(
                                TokenKind::Error(LexError::UnterminatedString.to_string()),
                                self.span_from(start),
                            );
                        }
                        Some(b'{') => {
                            depth += 1;
                            self.pos += 1;
                        }
                        Some(b'}') => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                            self.pos += 1;
                        }
                        _ => self.pos += 1,
                    }
                }
                let expr_end = self.pos;
                self.pos += 1; // closing '}'
                fstring_parts.push(FStringPart::Expression {
                    span: Span::new(expr_start as u32, expr_end as u32),
                    conversion: None,
                    format_spec: None,
                });
                continue;
            }
            if flags.formatted && c == b'}' && self.peek_at(1) == Some(b'}') {
                self.pos += 2;
                current_literal.push('}');
                continue;
            }
            self.pos += 1;
            current_literal.push(c as char);
        }
        if flags.formatted {
            if !current_literal.is_empty() {
                fstring_parts.push(FStringPart::Literal(current_literal));
            }
        } else {
            value = current_literal;
        }
        Token::new(
            TokenKind::String(StringLiteral { flags, quote, value, fstring_parts }),
            self.span_from(start),
        )
    }

    fn lex_operator(&mut self, start: usize) -> Token {
        use Operator::*;
        let rest = &self.text[self.pos..];
        let three: [(&str, Operator); 4] = [
            ("**=", DoubleStarEq),
            ("//=", DoubleSlashEq),
            ("...", Ellipsis),
            ("<<=", LShiftEq),
        ];
        for (s, op) in three {
            if rest.starts_with(s) {
                self.pos += s.len();
                return Token::new(TokenKind::Operator(op), self.span_from(start));
            }
        }
        if rest.starts_with(">>=") {
            self.pos += 3;
            return Token::new(TokenKind::Operator(RShiftEq), self.span_from(start));
        }
        let two: [(&str, Operator); 20] = [
            ("**", DoubleStar), ("//", DoubleSlash), ("<<", LShift), (">>", RShift),
            ("<=", LtEq), (">=", GtEq), ("==", EqEq), ("!=", NotEq),
            ("->", Arrow), (":=", ColonEqual),
            ("+=", PlusEq), ("-=", MinusEq), ("*=", StarEq), ("/=", SlashEq),
            ("%=", PercentEq), ("@=", AtEq), ("&=", AmpEq), ("|=", PipeEq),
            ("^=", CaretEq), ("<<", LShift),
        ];
        for (s, op) in two {
            if rest.starts_with(s) {
                self.pos += s.len();
                return Token::new(TokenKind::Operator(op), self.span_from(start));
            }
        }
        let c = self.bump().unwrap();
        let op = match c {
            b'+' => Plus, b'-' => Minus, b'*' => Star, b'/' => Slash, b'%' => Percent,
            b'@' => At, b'&' => Amp, b'|' => Pipe, b'^' => Caret, b'~' => Tilde,
            b'<' => Lt, b'>' => Gt,
            b'(' => { self.paren_depth += 1; LParen }
            b')' => { self.paren_depth = self.paren_depth.saturating_sub(1); RParen }
            b'[' => { self.paren_depth += 1; LBracket }
            b']' => { self.paren_depth = self.paren_depth.saturating_sub(1); RBracket }
            b'{' => { self.paren_depth += 1; LBrace }
            b'}' => { self.paren_depth = self.paren_depth.saturating_sub(1); RBrace }
            b',' => Comma, b':' => Colon, b'.' => Dot, b';' => Semicolon, b'=' => Equal,
            other => {
                return Token::new(
                    TokenKind::Error(LexError::UnexpectedChar(other as char).to_string()),
                    self.span_from(start),
                );
            }
        };
        Token::new(TokenKind::Operator(op), self.span_from(start))
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start as u32, self.pos as u32)
    }
}

fn string_prefix_flags(prefix: &str) -> Option<StringFlags> {
    if prefix.len() > 2 {
        return None;
    }
    let mut flags = StringFlags::default();
    for c in prefix.chars() {
        match c.to_ascii_lowercase() {
            'r' => flags.raw = true,
            'b' => flags.bytes = true,
            'f' => flags.formatted = true,
            'u' => flags.unicode = true,
            _ => return None,
        }
    }
    if prefix.is_empty() {
        return None;
    }
    Some(flags)
}

fn decode_escape(c: u8) -> String {
    match c {
        b'n' => "\n".to_string(),
        b't' => "\t".to_string(),
        b'r' => "\r".to_string(),
        b'\\' => "\\".to_string(),
        b'\'' => "'".to_string(),
        b'"' => "\"".to_string(),
        b'0' => "\0".to_string(),
        b'\n' => String::new(),
        other => (other as char).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Tokenizer::tokenize_all(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn simple_assignment() {
        let ks = kinds("x = 1\n");
        assert!(matches!(ks[0], TokenKind::Identifier(ref s) if s == "x"));
        assert!(matches!(ks[1], TokenKind::Operator(Operator::Equal)));
        assert!(matches!(ks[2], TokenKind::Number(_)));
        assert!(matches!(ks[3], TokenKind::Newline));
        assert!(matches!(ks[4], TokenKind::EndOfFile));
    }

    #[test]
    fn indent_and_dedent() {
        let ks = kinds("if x:\n    pass\ny = 2\n");
        let has_indent = ks.iter().any(|k| matches!(k, TokenKind::Indent));
        let has_dedent = ks.iter().any(|k| matches!(k, TokenKind::Dedent));
        assert!(has_indent && has_dedent);
    }

    #[test]
    fn keyword_vs_identifier() {
        let ks = kinds("match = 1\n");
        assert!(matches!(ks[0], TokenKind::Identifier(ref s) if s == "match"));
    }

    #[test]
    fn implicit_line_join_inside_parens() {
        let ks = kinds("f(\n    1,\n    2,\n)\n");
        let newline_count = ks.iter().filter(|k| matches!(k, TokenKind::Newline)).count();
        assert_eq!(newline_count, 1);
    }

    #[test]
    fn fstring_splits_literal_and_expression() {
        let toks = Tokenizer::tokenize_all("f'hello {name}!'\n");
        let TokenKind::String(ref lit) = toks[0].kind else {
            panic!("expected string token")
        };
        assert_eq!(lit.fstring_parts.len(), 3);
    }

    #[test]
    fn unterminated_string_is_an_error_token() {
        let ks = kinds("x = 'abc\n");
        assert!(ks.iter().any(|k| matches!(k, TokenKind::Error(_))));
    }
}
