//! Layered tokenizer for KLL source text.
//!
//! The tokenizer is a priority-ordered table of regex rules; the first
//! rule matching at the current offset wins. Whitespace and `#`
//! comments are recognized and dropped. Namespaced identifiers
//! (`U"A"`, `S0x43`, `Layer[`) capture their namespace in the token
//! kind so the grammar never re-inspects raw source text for it.

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::models::id::LayerMode;
use regex::Regex;

/// Namespace prefix of a namespaced token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// `U` — USB keyboard usage
    Usb,
    /// `CONS` — consumer control usage
    Consumer,
    /// `SYS` — system control usage
    System,
    /// `I` — LED indicator usage
    Indicator,
    /// `S` — scan code
    ScanCode,
    /// `P` — pixel
    Pixel,
    /// `PL` — pixel layer
    PixelLayer,
    /// `A` — animation
    Animation,
    /// `T` — generic trigger
    Trigger,
    /// `Layer` / `LayerShift` / `LayerLatch` / `LayerLock`
    Layer(LayerMode),
}

impl Namespace {
    /// Source prefix this namespace was written with.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Namespace::Usb => "U",
            Namespace::Consumer => "CONS",
            Namespace::System => "SYS",
            Namespace::Indicator => "I",
            Namespace::ScanCode => "S",
            Namespace::Pixel => "P",
            Namespace::PixelLayer => "PL",
            Namespace::Animation => "A",
            Namespace::Trigger => "T",
            Namespace::Layer(mode) => mode.prefix(),
        }
    }
}

/// Kind of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Decimal, hex (`0x…`), binary (`0b…`), or unit-suffixed numeric
    Number,
    /// `"…"` double-quoted string
    String,
    /// `'…'` single-quoted raw string
    CharString,
    /// `u'…'` Unicode raw string
    UString,
    /// `U+hhhh` Unicode code point
    CodePoint,
    /// Bare identifier
    Name,
    Colon,
    ColonPlus,
    ColonMinus,
    ColonColon,
    /// `i:` family
    IndColon,
    IndColonPlus,
    IndColonMinus,
    IndColonColon,
    Comma,
    Semi,
    Plus,
    Dash,
    Equals,
    /// `=>`
    ArrowRight,
    /// `<=`
    ArrowLeft,
    BracketOpen,
    BracketClose,
    ParenOpen,
    ParenClose,
    /// Complete namespaced id: `U"A"`, `S0x43`, `P12`, `A"name"`
    Namespaced(Namespace),
    /// Namespaced bracket opener: `U[`, `S[`, `Layer[`, `T[`
    NamespaceOpen(Namespace),
}

/// A token with its source position (1-based line and column).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub col: u32,
}

impl Token {
    /// Inner value of a namespaced token, with the prefix stripped.
    ///
    /// `U"A"` yields `"A"` (quotes retained), `S0x43` yields `0x43`.
    #[must_use]
    pub fn ns_value(&self) -> &str {
        match self.kind {
            TokenKind::Namespaced(ns) => &self.text[ns.prefix().len()..],
            _ => &self.text,
        }
    }
}

enum Rule {
    Skip,
    Emit(TokenKind),
}

/// Priority-ordered tokenizer rule table. Order matters: earlier rules
/// shadow later ones at the same offset.
fn rules() -> Vec<(Rule, Regex)> {
    let rule = |pattern: &str| Regex::new(&format!("^(?:{pattern})")).unwrap();

    vec![
        (Rule::Skip, rule(r"[ \t\r\n]+")),
        (Rule::Skip, rule(r"#[^\n]*")),
        (Rule::Emit(TokenKind::ArrowRight), rule(r"=>")),
        (Rule::Emit(TokenKind::ArrowLeft), rule(r"<=")),
        // Code points and Unicode strings outrank the U namespace
        (Rule::Emit(TokenKind::CodePoint), rule(r"U\+[0-9A-Fa-f]+")),
        (Rule::Emit(TokenKind::UString), rule(r"u'[^'\n]*'")),
        // Layer namespaces outrank the bare Name rule
        (
            Rule::Emit(TokenKind::NamespaceOpen(Namespace::Layer(LayerMode::Shift))),
            rule(r"LayerShift\["),
        ),
        (
            Rule::Emit(TokenKind::NamespaceOpen(Namespace::Layer(LayerMode::Latch))),
            rule(r"LayerLatch\["),
        ),
        (
            Rule::Emit(TokenKind::NamespaceOpen(Namespace::Layer(LayerMode::Lock))),
            rule(r"LayerLock\["),
        ),
        (
            Rule::Emit(TokenKind::NamespaceOpen(Namespace::Layer(LayerMode::Default))),
            rule(r"Layer\["),
        ),
        // Multi-letter namespaces before single-letter ones
        (
            Rule::Emit(TokenKind::NamespaceOpen(Namespace::Consumer)),
            rule(r"CONS\["),
        ),
        (
            Rule::Emit(TokenKind::Namespaced(Namespace::Consumer)),
            rule(r#"CONS(?:"[^"\n]*"|0x[0-9A-Fa-f]+|[0-9]+)"#),
        ),
        (
            Rule::Emit(TokenKind::NamespaceOpen(Namespace::System)),
            rule(r"SYS\["),
        ),
        (
            Rule::Emit(TokenKind::Namespaced(Namespace::System)),
            rule(r#"SYS(?:"[^"\n]*"|0x[0-9A-Fa-f]+|[0-9]+)"#),
        ),
        (
            Rule::Emit(TokenKind::NamespaceOpen(Namespace::PixelLayer)),
            rule(r"PL\["),
        ),
        (
            Rule::Emit(TokenKind::Namespaced(Namespace::PixelLayer)),
            rule(r"PL(?:0x[0-9A-Fa-f]+|[0-9]+)"),
        ),
        (
            Rule::Emit(TokenKind::NamespaceOpen(Namespace::Usb)),
            rule(r"U\["),
        ),
        (
            Rule::Emit(TokenKind::Namespaced(Namespace::Usb)),
            rule(r#"U(?:"[^"\n]*"|0x[0-9A-Fa-f]+|[0-9]+)"#),
        ),
        (
            Rule::Emit(TokenKind::NamespaceOpen(Namespace::Indicator)),
            rule(r"I\["),
        ),
        (
            Rule::Emit(TokenKind::Namespaced(Namespace::Indicator)),
            rule(r#"I(?:"[^"\n]*"|0x[0-9A-Fa-f]+|[0-9]+)"#),
        ),
        (
            Rule::Emit(TokenKind::NamespaceOpen(Namespace::ScanCode)),
            rule(r"S\["),
        ),
        (
            Rule::Emit(TokenKind::Namespaced(Namespace::ScanCode)),
            rule(r"S(?:0x[0-9A-Fa-f]+|[0-9]+)"),
        ),
        (
            Rule::Emit(TokenKind::NamespaceOpen(Namespace::Pixel)),
            rule(r"P\["),
        ),
        (
            Rule::Emit(TokenKind::Namespaced(Namespace::Pixel)),
            rule(r"P(?:0x[0-9A-Fa-f]+|[0-9]+)"),
        ),
        (
            Rule::Emit(TokenKind::NamespaceOpen(Namespace::Animation)),
            rule(r"A\["),
        ),
        (
            Rule::Emit(TokenKind::Namespaced(Namespace::Animation)),
            rule(r#"A"[^"\n]*""#),
        ),
        (
            Rule::Emit(TokenKind::NamespaceOpen(Namespace::Trigger)),
            rule(r"T\["),
        ),
        // Indicator-map operators before the Name rule catches the `i`
        (Rule::Emit(TokenKind::IndColonColon), rule(r"i::")),
        (Rule::Emit(TokenKind::IndColonPlus), rule(r"i:\+")),
        (Rule::Emit(TokenKind::IndColonMinus), rule(r"i:-")),
        (Rule::Emit(TokenKind::IndColon), rule(r"i:")),
        (Rule::Emit(TokenKind::ColonColon), rule(r"::")),
        (Rule::Emit(TokenKind::ColonPlus), rule(r":\+")),
        (Rule::Emit(TokenKind::ColonMinus), rule(r":-")),
        (Rule::Emit(TokenKind::Colon), rule(r":")),
        (Rule::Emit(TokenKind::String), rule(r#""[^"\n]*""#)),
        (Rule::Emit(TokenKind::CharString), rule(r"'[^'\n]*'")),
        (
            Rule::Emit(TokenKind::Number),
            rule(r"0x[0-9A-Fa-f]+|0b[01]+|[0-9]+(?:\.[0-9]+)?(?:ms|us|ns|s)?"),
        ),
        (Rule::Emit(TokenKind::Name), rule(r"[A-Za-z_][A-Za-z_0-9]*")),
        (Rule::Emit(TokenKind::Comma), rule(r",")),
        (Rule::Emit(TokenKind::Semi), rule(r";")),
        (Rule::Emit(TokenKind::Plus), rule(r"\+")),
        (Rule::Emit(TokenKind::Dash), rule(r"-")),
        (Rule::Emit(TokenKind::Equals), rule(r"=")),
        (Rule::Emit(TokenKind::BracketOpen), rule(r"\[")),
        (Rule::Emit(TokenKind::BracketClose), rule(r"\]")),
        (Rule::Emit(TokenKind::ParenOpen), rule(r"\(")),
        (Rule::Emit(TokenKind::ParenClose), rule(r"\)")),
    ]
}

/// Converts source text into a flat token stream with positions.
///
/// # Errors
///
/// Returns a `Tokenizer` diagnostic on illegal characters or
/// unterminated string literals. Tokenizing is otherwise total.
pub fn tokenize(file: &str, text: &str) -> Result<Vec<Token>, Box<Diagnostic>> {
    let rules = rules();
    let mut tokens = Vec::new();

    let mut pos = 0usize;
    let mut line = 1u32;
    let mut col = 1u32;

    'scan: while pos < text.len() {
        let rest = &text[pos..];

        for (rule, regex) in &rules {
            let Some(found) = regex.find(rest) else {
                continue;
            };
            let matched = found.as_str();

            if let Rule::Emit(kind) = rule {
                tokens.push(Token {
                    kind: *kind,
                    text: matched.to_string(),
                    line,
                    col,
                });
            }

            // Advance position, tracking line breaks in skipped text
            for ch in matched.chars() {
                if ch == '\n' {
                    line += 1;
                    col = 1;
                } else {
                    col += 1;
                }
            }
            pos += matched.len();
            continue 'scan;
        }

        // No rule matched: report the offending character
        let offending = rest.chars().next().unwrap_or('?');
        let excerpt: String = rest.chars().take(20).take_while(|c| *c != '\n').collect();
        let message = if offending == '"' || offending == '\'' {
            "unterminated string literal".to_string()
        } else {
            format!("illegal character '{offending}'")
        };
        return Err(Box::new(
            Diagnostic::error(DiagnosticKind::Tokenizer, message)
                .at(file, line, col)
                .with_excerpt(excerpt),
        ));
    }

    Ok(tokens)
}
