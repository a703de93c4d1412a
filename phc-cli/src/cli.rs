//! CLI definition for the `phc` command line.
//!
//! Only depends on `clap` and `std`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Entity kind as typed on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    /// Customers (cl)
    #[value(aliases = ["cliente", "cl"])]
    Customer,
    /// Orders (bo)
    #[value(aliases = ["encomenda", "bo"])]
    Order,
    /// Stock articles (st)
    #[value(aliases = ["artigo", "st"])]
    Article,
}

/// PHC - customers, orders and articles with custom fields
#[derive(Parser, Debug)]
#[command(name = "phc")]
#[command(version)]
#[command(about = "Read and write PHC entities together with their custom fields")]
pub struct Cli {
    /// Enable debug output to stderr
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Configuration file (default: phc.{toml,yaml,yml,json} in the working directory)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Database file, overriding the configuration
    #[arg(long, global = true, value_name = "PATH")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the entity and custom field tables if missing
    Init,
    /// Inspect custom field definitions
    Fields {
        #[command(subcommand)]
        action: FieldsAction,
    },
    /// Show one entity with its custom fields
    Get {
        #[arg(value_enum)]
        kind: KindArg,
        id: String,
    },
    /// List entities, newest first
    List {
        #[arg(value_enum)]
        kind: KindArg,
        /// One-based page number
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Entities per page
        #[arg(long, default_value_t = 50)]
        limit: u32,
        /// Substring matched against the searchable columns
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Create an entity
    Create {
        #[arg(value_enum)]
        kind: KindArg,
        /// Entity columns as a JSON object
        #[arg(long, default_value = "{}")]
        base: String,
        /// Custom fields as a JSON array of {codigo, tipo, valor} or an object of code to value
        #[arg(long, default_value = "[]")]
        fields: String,
    },
    /// Update an entity
    Update {
        #[arg(value_enum)]
        kind: KindArg,
        id: String,
        /// Entity columns to change as a JSON object
        #[arg(long)]
        base: Option<String>,
        /// Custom fields to change
        #[arg(long)]
        fields: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum FieldsAction {
    /// List the active definitions of an entity kind
    List {
        #[arg(value_enum)]
        kind: KindArg,
    },
    /// Show one definition
    Get {
        #[arg(value_enum)]
        kind: KindArg,
        code: String,
    },
}
