//! `hrmel` command-line front-end and the pipelines behind its subcommands.

pub mod cli;
pub mod pipeline;
