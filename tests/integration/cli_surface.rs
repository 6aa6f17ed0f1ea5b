//! Integration tests for the CLI surface: flag parsing, override precedence,
//! and dry-run behavior.

use clap::Parser;
use storbatch::cli::{run, Cli};
use storbatch::config::StorbatchConfig;

fn parse(args: &[&str]) -> Cli {
    let mut full = vec!["storbatch"];
    full.extend_from_slice(args);
    Cli::try_parse_from(full).unwrap()
}

#[test]
fn flags_override_loaded_configuration() {
    let cli = parse(&[
        "--prefix",
        "efitabdesa",
        "--count",
        "10",
        "--max-concurrency",
        "5",
        "--output",
        "out.json",
        "--verbose",
    ]);

    let mut config = StorbatchConfig::default();
    config.batch.name_prefix = "fromfile".to_string();
    config.batch.count = 2;
    cli.apply_overrides(&mut config);

    assert_eq!(config.batch.name_prefix, "efitabdesa");
    assert_eq!(config.batch.count, 10);
    assert_eq!(config.batch.max_concurrency, 5);
    assert_eq!(config.output.path.to_str(), Some("out.json"));
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn quiet_wins_over_verbose() {
    let cli = parse(&["--verbose", "--quiet"]);
    let mut config = StorbatchConfig::default();
    cli.apply_overrides(&mut config);
    assert_eq!(config.logging.level, "off");
}

#[tokio::test]
async fn dry_run_needs_no_credentials_and_exits_zero() {
    let cli = parse(&["--dry-run", "--prefix", "efitabdesa", "--count", "3"]);
    let mut config = StorbatchConfig::default();
    config.batch.resource_group = "rg-dry".to_string();
    cli.apply_overrides(&mut config);

    // Credentials are intentionally empty: a dry run never builds a client.
    let code = run(&cli, &config).await.unwrap();
    assert_eq!(code, 0);
}

#[tokio::test]
async fn invalid_request_is_rejected_before_any_client_setup() {
    let cli = parse(&["--prefix", "Bad-Prefix", "--count", "1"]);
    let mut config = StorbatchConfig::default();
    cli.apply_overrides(&mut config);

    assert!(run(&cli, &config).await.is_err());
}
