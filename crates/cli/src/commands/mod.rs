//! CLI subcommands.

pub mod routes;
pub mod serve;
