// dacc: Dataflow Actor Compiler Collection
//
// Library root. Actor IR and its passes, the action classifier, and the
// network loader used by the `dacc` binary.

pub mod actor;
pub mod ast;
pub mod cast;
pub mod classify;
pub mod diag;
pub mod dot;
pub mod expr;
pub mod fsm;
pub mod id;
pub mod if_convert;
pub mod interp;
pub mod ir;
pub mod lexer;
pub mod network;
pub mod parser;
pub mod pass;
pub mod phi_removal;
pub mod pipeline;
pub mod registry;
pub mod schedule;
pub mod store_once;
pub mod types;
