//! # Operations Subcommand
//!
//! Lists the operations of the loaded document in resolution order, with
//! the actions each one accepts. An action listed twice is only ever
//! resolved to its first operation.

use anyhow::Result;
use clap::Args;

use onix_schema::resolver::declared_actions;
use onix_schema::SchemaDocument;

use crate::SourceArgs;

/// Arguments for the operations subcommand.
#[derive(Args, Debug)]
pub struct OperationsArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

/// Execute the operations subcommand.
pub async fn run_operations(args: &OperationsArgs) -> Result<u8> {
    let validator = args.source.build().await?;
    if let Some(spec) = validator.snapshot() {
        let document = &spec.document;
        println!(
            "{} {} (loaded {})",
            document.title().unwrap_or("untitled"),
            document.version().unwrap_or("-"),
            spec.loaded_at_utc.to_rfc3339(),
        );
        for line in operation_lines(document) {
            println!("{line}");
        }
        for finding in document.findings() {
            println!("warning: {finding}");
        }
    }
    validator.shutdown().await;
    Ok(0)
}

/// `METHOD path actions` for each operation, in resolution order.
pub fn operation_lines(document: &SchemaDocument) -> Vec<String> {
    document
        .operations()
        .iter()
        .map(|op| {
            let actions = declared_actions(op.node());
            let actions = if actions.is_empty() {
                "-".to_string()
            } else {
                actions.join(",")
            };
            format!("{:<6} {} {}", op.method(), op.path(), actions)
        })
        .collect()
}
