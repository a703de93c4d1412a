//! Parsing and executing `phc` commands against an in-memory database.

use clap::Parser;
use phc::commands::{EXIT_CLIENT_ERROR, EXIT_NOT_FOUND};
use phc::{execute, Cli, Commands, FieldsAction, KindArg};
use phc_entity::test_support::{define_field, memory_context};
use phc_entity::EntityKind;
use serde_json::json;

fn run(ctx: &phc_entity::ErpContext, args: &[&str]) -> Result<serde_json::Value, phc::CliError> {
    let cli = Cli::try_parse_from(std::iter::once("phc").chain(args.iter().copied())).unwrap();
    execute(ctx, cli.command)
}

#[test]
fn parses_global_flags_and_aliases() {
    let cli = Cli::try_parse_from([
        "phc", "get", "cliente", "7", "--debug", "--database", "erp.db",
    ])
    .unwrap();
    assert!(cli.debug);
    assert_eq!(cli.database.unwrap().to_str(), Some("erp.db"));
    match cli.command {
        Commands::Get { kind, id } => {
            assert_eq!(kind, KindArg::Customer);
            assert_eq!(id, "7");
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn fields_subcommand_parses() {
    let cli = Cli::try_parse_from(["phc", "fields", "get", "artigo", "garantia_meses"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Fields {
            action: FieldsAction::Get { kind: KindArg::Article, ref code }
        } if code == "garantia_meses"
    ));
}

#[test]
fn unknown_kind_is_a_usage_error() {
    assert!(Cli::try_parse_from(["phc", "list", "fornecedor"]).is_err());
}

#[test]
fn create_then_get_article() {
    let ctx = memory_context();
    define_field(&ctx, EntityKind::Article, "garantia_meses", "number", |_| {});

    let created = run(
        &ctx,
        &[
            "create",
            "article",
            "--base",
            r#"{"ref": "ART-001", "design": "Berbequim"}"#,
            "--fields",
            r#"{"garantia_meses": 24}"#,
        ],
    )
    .unwrap();
    assert_eq!(created["id"], json!("ART-001"));

    let record = run(&ctx, &["get", "article", "ART-001"]).unwrap();
    assert_eq!(record["base"]["design"], json!("Berbequim"));
    assert_eq!(record["fields"][0]["value"], json!(24));
}

#[test]
fn update_and_list_customers() {
    let ctx = memory_context();
    run(&ctx, &["create", "customer", "--base", r#"{"nome": "Ana"}"#]).unwrap();
    run(
        &ctx,
        &["update", "cl", "1", "--base", r#"{"nome": "Ana Maria"}"#],
    )
    .unwrap();

    let page = run(&ctx, &["list", "customer", "--search", "Maria"]).unwrap();
    assert_eq!(page["total"], json!(1));
    assert_eq!(page["items"][0]["base"]["nome"], json!("Ana Maria"));
}

#[test]
fn errors_map_to_exit_codes() {
    let ctx = memory_context();
    define_field(&ctx, EntityKind::Customer, "nif_alternativo", "text", |f| {
        f.required = true;
    });

    let missing = run(&ctx, &["get", "customer", "99"]).unwrap_err();
    assert_eq!(missing.exit_code(), EXIT_NOT_FOUND);

    let rejected = run(
        &ctx,
        &["create", "customer", "--fields", r#"{"nif_alternativo": ""}"#],
    )
    .unwrap_err();
    assert_eq!(rejected.exit_code(), EXIT_CLIENT_ERROR);

    let orphan = run(&ctx, &["create", "order", "--base", r#"{"no": 999}"#]).unwrap_err();
    assert_eq!(orphan.exit_code(), EXIT_NOT_FOUND);
    assert!(orphan.to_string().contains("999"));
}

#[test]
fn init_reports_tables() {
    let ctx = memory_context();
    let out = run(&ctx, &["init"]).unwrap();
    let tables = out["installed"].as_array().unwrap();
    assert!(tables.contains(&json!("cl_valores_personalizados")));
    assert_eq!(tables.len(), 9);
}
