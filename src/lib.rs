//! pyrite: the core of a Python static type checker powering an editor
//! language service — tokeniser, parser, import resolver, binder, and lazy
//! type evaluator live in `crates/`; this crate is the front door that ties
//! them into a `Program` facade, a command-line report, and an MCP server.

pub mod cli;
pub mod output;
pub mod program;

#[cfg(feature = "mcp")]
pub mod mcp;

pub use program::Program;
