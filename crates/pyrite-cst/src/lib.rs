//! Tokeniser, recursive-descent parser, and arena-based parse tree for
//! Python source (spec §4.1, §4.2). Restructured from the whitespace-
//! preserving CST this crate is grounded on (see `/DESIGN.md`) into an
//! index-addressed arena the binder and type evaluator can hold `NodeId`
//! references into without fighting the borrow checker.

pub mod errors;
pub mod node;
pub mod parser;
pub mod token;
pub mod tokenizer;
pub mod visitor;

pub use errors::{prettify_error, LexError, ParseError};
pub use node::{Arena, ComprehensionKind, Node, NodeId, NodeKind, ParamKind};
pub use parser::{parse_module, ParseOptions, ParseResult};
pub use token::{Keyword, Operator, Token, TokenKind};
pub use tokenizer::Tokenizer;
pub use visitor::{walk, NameCollector, NodeCounter, Visitor, VisitResult};
