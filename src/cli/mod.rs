//! CLI subcommand implementations for the colorloop binary.

pub mod crawl_cmd;
pub mod doctor;
