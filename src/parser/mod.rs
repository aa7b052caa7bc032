//! KLL source parsing: tokenizer and grammar.

pub mod grammar;
pub mod tokenizer;

pub use grammar::parse_tokens;
pub use tokenizer::{tokenize, Namespace, Token, TokenKind};

use crate::diagnostics::Diagnostics;
use crate::models::Expression;

/// Tokenizes and parses one KLL source file.
///
/// Problems are accumulated into `diagnostics`; parsing continues past
/// recoverable statement errors so one pass can report several.
pub fn parse_source(file: &str, text: &str, diagnostics: &mut Diagnostics) -> Vec<Expression> {
    let tokens = match tokenize(file, text) {
        Ok(tokens) => tokens,
        Err(diagnostic) => {
            diagnostics.push(*diagnostic);
            return Vec::new();
        }
    };

    parse_tokens(file, &tokens, diagnostics)
}
