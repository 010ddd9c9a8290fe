pub mod benchmark;
pub mod config;
pub mod corpus;
pub mod dense;
pub mod embedding;
pub mod errors;
pub mod generation;
pub mod lexical;
pub mod logging;
pub mod rerank;
pub mod search;
pub mod service;
