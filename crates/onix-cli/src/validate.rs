//! # Validate Subcommand
//!
//! Validates payload files against the loaded document, one line of output
//! per violation so results can be grepped or diffed:
//!
//! ```text
//! OK search.json
//! select.json: message/order: "order" is a required property
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use onix_schema::ValidateError;

use crate::SourceArgs;

/// Arguments for the validate subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Print the gateway's JSON error body instead of one line per violation.
    #[arg(long)]
    pub json: bool,

    /// Payload files to validate.
    #[arg(required = true)]
    pub payloads: Vec<PathBuf>,
}

/// Execute the validate subcommand. Exit code 1 if any payload fails.
pub async fn run_validate(args: &ValidateArgs) -> Result<u8> {
    let validator = args.source.build().await?;
    let mut failed = 0usize;

    for payload in &args.payloads {
        let body = tokio::fs::read(payload)
            .await
            .with_context(|| format!("failed to read {}", payload.display()))?;
        match validator.validate(None, &body) {
            Ok(()) => println!("OK {}", payload.display()),
            Err(e) => {
                failed += 1;
                if args.json {
                    println!("{}", e.to_response_body());
                } else {
                    for line in report_lines(payload, &e) {
                        println!("{line}");
                    }
                }
            }
        }
    }

    validator.shutdown().await;
    tracing::info!(
        total = args.payloads.len(),
        failed,
        "payload validation complete"
    );
    Ok(u8::from(failed > 0))
}

/// Output lines for one failed payload.
pub fn report_lines(payload: &Path, err: &ValidateError) -> Vec<String> {
    let name = payload.display();
    match err.violations() {
        Some(violations) => violations
            .violations()
            .iter()
            .map(|v| format!("{name}: {}: {}", v.path, v.message))
            .collect(),
        None => vec![format!("{name}: {err}")],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onix_schema::{ValidationViolations, Violation};

    #[test]
    fn report_lines_one_per_violation() {
        let err = ValidateError::SchemaValidation {
            violations: ValidationViolations::from(vec![
                Violation::new("message", "missing"),
                Violation::new("context/domain", "not a string"),
            ]),
        };
        let lines = report_lines(Path::new("select.json"), &err);
        assert_eq!(
            lines,
            [
                "select.json: message: missing",
                "select.json: context/domain: not a string"
            ]
        );
    }

    #[test]
    fn report_lines_plain_error() {
        let err = ValidateError::UnsupportedAction {
            action: "unknown".into(),
        };
        let lines = report_lines(Path::new("x.json"), &err);
        assert_eq!(lines, ["x.json: unsupported action: unknown"]);
    }

    #[tokio::test]
    async fn run_validate_reports_failures_in_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let spec = dir.path().join("core.yaml");
        std::fs::write(
            &spec,
            r#"
openapi: 3.1.0
info: { title: t, version: "1" }
paths:
  /search:
    post:
      requestBody:
        content:
          application/json:
            schema:
              required: [message]
              properties:
                context:
                  properties:
                    action: { const: search }
"#,
        )
        .unwrap();
        let good = dir.path().join("good.json");
        std::fs::write(&good, r#"{"context":{"action":"search"},"message":{}}"#).unwrap();
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"context":{"action":"search"}}"#).unwrap();

        let args = |payloads: Vec<PathBuf>| ValidateArgs {
            source: SourceArgs {
                kind: onix_schema::SourceKind::File,
                location: spec.display().to_string(),
                cache_ttl: None,
                fetch_timeout: None,
            },
            json: false,
            payloads,
        };
        assert_eq!(run_validate(&args(vec![good.clone()])).await.unwrap(), 0);
        assert_eq!(run_validate(&args(vec![good, bad])).await.unwrap(), 1);
        assert!(run_validate(&args(vec![dir.path().join("missing.json")]))
            .await
            .is_err());
    }
}
