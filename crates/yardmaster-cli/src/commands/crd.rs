//! CRD command implementation.

use anyhow::{Context, Result};
use kube::CustomResourceExt;

use yardmaster_core::{Freight, Warehouse};

/// Prints the Warehouse and Freight CRDs as a multi-document YAML stream.
///
/// # Errors
///
/// Returns an error if a definition cannot be serialized.
pub fn run() -> Result<()> {
    print!("{}", render()?);
    Ok(())
}

fn render() -> Result<String> {
    let warehouse =
        serde_yaml::to_string(&Warehouse::crd()).context("Failed to serialize Warehouse CRD")?;
    let freight =
        serde_yaml::to_string(&Freight::crd()).context("Failed to serialize Freight CRD")?;
    Ok(format!("---\n{warehouse}---\n{freight}"))
}
