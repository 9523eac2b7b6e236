//! Command execution tests against an on-disk workspace

mod common;

use clap::Parser;
use common::Workspace;
use ehrglot::cli::{exit_code_for, Cli, Commands, EXIT_CONFIG, EXIT_OK, EXIT_PARTIAL};
use ehrglot::config::EhrglotConfig;
use serde_json::json;
use std::fs;

fn config(ws: &Workspace) -> EhrglotConfig {
    let mut config = EhrglotConfig::default();
    config.schemas.schema_dir = ws.schema_dir();
    config.schemas.override_dir = Some(ws.override_dir());
    config
}

async fn run(config: &EhrglotConfig, args: &[&str]) -> anyhow::Result<i32> {
    let cli = Cli::try_parse_from(std::iter::once("ehrglot").chain(args.iter().copied()))?;
    match &cli.command {
        Commands::Convert(args) => args.execute(config).await,
        Commands::Validate(args) => args.execute(config).await,
        Commands::ListSources(args) => args.execute(config).await,
        Commands::ListResources(args) => args.execute(config).await,
        Commands::ShowMappings(args) => args.execute(config).await,
        Commands::DetectPii(args) => args.execute(config).await,
        Commands::GenerateMasking(args) => args.execute(config).await,
        Commands::ParseHl7(args) => args.execute(config).await,
    }
}

fn arg(path: &std::path::Path) -> String {
    path.display().to_string()
}

#[tokio::test]
async fn test_listing_commands() {
    let ws = Workspace::new();
    let config = config(&ws);

    assert_eq!(run(&config, &["list-sources"]).await.unwrap(), EXIT_OK);
    assert_eq!(run(&config, &["list-resources", "--all"]).await.unwrap(), EXIT_OK);
    assert_eq!(
        run(&config, &["show-mappings", "epic", "patient"]).await.unwrap(),
        EXIT_OK
    );
}

#[tokio::test]
async fn test_show_mappings_unknown_system() {
    let ws = Workspace::new();
    let err = run(&config(&ws), &["show-mappings", "meditech", "patient"])
        .await
        .unwrap_err();
    assert_eq!(exit_code_for(&err), EXIT_CONFIG);
}

#[tokio::test]
async fn test_convert_writes_output_sql_and_report() {
    let ws = Workspace::new();
    let source = ws.path("data/epic_patients.json");
    let output = ws.path("out/patients.json");
    let sql = ws.path("out/masking.sql");
    let report = ws.path("out/report.json");

    let code = run(
        &config(&ws),
        &[
            "convert",
            &arg(&source),
            "-s",
            "epic",
            "-r",
            "Patient",
            "-o",
            &arg(&output),
            "--platform",
            "synapse",
            "--sql-output",
            &arg(&sql),
            "--report",
            &arg(&report),
        ],
    )
    .await
    .unwrap();
    assert_eq!(code, EXIT_OK);

    let rows = ws.read_json(&output);
    assert_eq!(rows.as_array().unwrap().len(), 3);
    assert_eq!(rows[2]["name_0_family"], "Garcia");

    let script = fs::read_to_string(&sql).unwrap();
    assert!(script.starts_with("-- EHRglot Generated Masking Policies"));

    let report = ws.read_json(&report);
    assert_eq!(report["success"], true);
    assert_eq!(report["rows_written"], 3);
}

#[tokio::test]
async fn test_convert_exit_codes() {
    let ws = Workspace::new();
    let config = config(&ws);
    ws.write_json(
        "data/mixed.json",
        &json!([
            {"PAT_ID": 5, "SEX_C": 2},
            {"PAT_ID": "not valid!", "SEX_C": 1}
        ]),
    );
    let mixed = arg(&ws.path("data/mixed.json"));

    let code = run(&config, &["convert", &mixed, "-s", "epic", "-r", "patient", "--no-pii"])
        .await
        .unwrap();
    assert_eq!(code, EXIT_PARTIAL);

    let code = run(
        &config,
        &["convert", &mixed, "-s", "epic", "-r", "patient", "--no-validate", "--no-pii"],
    )
    .await
    .unwrap();
    assert_eq!(code, EXIT_OK);

    let err = run(&config, &["convert", &mixed, "-s", "allscripts", "-r", "patient"])
        .await
        .unwrap_err();
    assert_eq!(exit_code_for(&err), EXIT_CONFIG);
}

#[tokio::test]
async fn test_detect_pii_modes() {
    let ws = Workspace::new();
    let config = config(&ws);
    let input = arg(&ws.path("data/epic_patients.json"));

    assert_eq!(run(&config, &["detect-pii", "-i", &input]).await.unwrap(), EXIT_OK);
    assert_eq!(
        run(&config, &["detect-pii", "-r", "Patient", "--json"]).await.unwrap(),
        EXIT_OK
    );
    assert_eq!(
        run(&config, &["detect-pii", "-i", &input, "-s", "epic", "-r", "patient"])
            .await
            .unwrap(),
        EXIT_OK
    );

    // One of --input or --resource is required
    assert!(run(&config, &["detect-pii"]).await.is_err());
}

#[tokio::test]
async fn test_generate_masking() {
    let ws = Workspace::new();
    let mut config = config(&ws);
    config.masking.full_access_roles = vec!["PRIVACY_OFFICER".to_string()];
    let output = ws.path("sql/patient_snowflake.sql");

    let code = run(
        &config,
        &[
            "generate-masking",
            "-r",
            "Patient",
            "-p",
            "snowflake",
            "-o",
            &arg(&output),
            "--include-drops",
        ],
    )
    .await
    .unwrap();
    assert_eq!(code, EXIT_OK);

    let script = fs::read_to_string(&output).unwrap();
    assert!(script.contains("MASKING POLICY"));
    assert!(script.contains("PRIVACY_OFFICER"));
    assert!(script.contains("-- Drop existing policies"));
    assert!(script.contains("healthcare.patient"));

    let code = run(&config, &["generate-masking", "-r", "Patient"]).await.unwrap();
    assert_eq!(code, EXIT_CONFIG);
}

#[tokio::test]
async fn test_validate_command() {
    let ws = Workspace::new();
    let config = config(&ws);
    let good = ws.write_json(
        "fhir/good.json",
        &json!([{"resourceType": "Patient", "id": "p1", "gender": "female"}]),
    );
    let bad = ws.write_json(
        "fhir/bad.json",
        &json!([
            {"resourceType": "Patient", "id": "p1"},
            {"resourceType": "Patient", "gender": "robot"}
        ]),
    );

    assert_eq!(run(&config, &["validate", &arg(&good)]).await.unwrap(), EXIT_OK);
    assert_eq!(
        run(&config, &["validate", &arg(&bad), "--json"]).await.unwrap(),
        EXIT_PARTIAL
    );
}

#[tokio::test]
async fn test_parse_hl7_command() {
    let ws = Workspace::new();
    let config = config(&ws);
    let feed = ws.write(
        "feeds/oru.hl7",
        "MSH|^~\\&|LAB|MAIN|||20240302||ORU^R01|L1|P|2.5\n\
         PID|1||M1^^^MRN||DOE^ANN\n\
         OBX|1|NM|2951-2^SODIUM^LN||140|mmol/L|136-145|N|||F\n\
         OBX|2|NM|2823-3^POTASSIUM^LN||4.1|mmol/L|3.5-5.1|N|||F\n",
    );
    let output = ws.path("out/observations.json");

    assert_eq!(run(&config, &["parse-hl7", &arg(&feed)]).await.unwrap(), EXIT_OK);

    let code = run(
        &config,
        &["parse-hl7", &arg(&feed), "-r", "Observation", "--all", "-o", &arg(&output)],
    )
    .await
    .unwrap();
    assert_eq!(code, EXIT_OK);
    let observations = ws.read_json(&output);
    assert_eq!(observations.as_array().unwrap().len(), 2);
    assert_eq!(observations[1]["code"]["coding"][0]["code"], "2823-3");

    let code = run(&config, &["parse-hl7", &arg(&feed), "-r", "Encounter"])
        .await
        .unwrap();
    assert_eq!(code, EXIT_PARTIAL);
}
