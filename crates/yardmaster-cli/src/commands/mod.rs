//! CLI commands and argument parsing.

pub mod controller;
pub mod crd;
pub mod discover;
pub mod validate;

use clap::{Parser, Subcommand};

/// Yardmaster - artifact discovery and Freight synthesis for Warehouses
#[derive(Parser)]
#[command(name = "yardmaster")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the Warehouse controller against the current cluster
    Controller(controller::ControllerArgs),

    /// Discover images in one repository and print them as JSON
    Discover(discover::DiscoverArgs),

    /// Validate Warehouse manifests
    Validate(validate::ValidateArgs),

    /// Print the Warehouse and Freight CustomResourceDefinitions
    Crd,

    /// Print version information
    Version,
}
