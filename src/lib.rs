#[macro_use]
extern crate log;

pub mod corpus;
pub mod driver;
pub mod formula;
pub mod manifest;
pub mod oracle;
pub mod parser;
pub mod prelude;
pub mod report;
pub mod runner;
pub mod solver;
pub mod verify;
