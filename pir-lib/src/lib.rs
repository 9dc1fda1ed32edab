#[macro_use]
extern crate lazy_static;

pub mod analysis;
pub mod ir;
pub mod lexer;
pub mod lower;
pub mod parser;


#[cfg(test)]
mod parser_tests;
