//! audit-runner: headless OTP destination audit over a snapshot database.
//!
//! Usage:
//!   audit-runner --db snapshot.db
//!   audit-runner --db snapshot.db --data-dir ./data --out findings.jsonl
//!   audit-runner --db snapshot.db --alarming-only --dry-run

use anyhow::{Context, Result};
use otp_audit_core::{
    classifier::Finding,
    config::AuditConfig,
    contact::{canonical_phone, format_phone},
    engine::AuditEngine,
    report::AuditReport,
    store::AuditStore,
    types::ContactKind,
};
use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = arg_value(&args, "--db").context("missing required --db <path>")?;
    let data_dir = arg_value(&args, "--data-dir");
    let out = arg_value(&args, "--out");
    let alarming_only = args.iter().any(|a| a == "--alarming-only");
    let dry_run = args.iter().any(|a| a == "--dry-run");

    let config = load_config(data_dir)?;
    let run_id = format!(
        "audit-{}-{}",
        chrono::Local::now().format("%Y%m%d"),
        uuid::Uuid::new_v4().simple()
    );

    println!("OTP destination audit: audit-runner");
    println!("  db:        {db}");
    println!("  run_id:    {run_id}");
    println!("  window:    {:?}", config.change_window);
    println!();

    let store = AuditStore::open(db)?;
    store.migrate()?;
    let engine = AuditEngine::new(run_id, config, store);

    let report = if dry_run { engine.evaluate()? } else { engine.run()? };

    if let Some(path) = out {
        let written = write_jsonl(path, &report, alarming_only)?;
        println!("wrote {written} findings to {path}");
        println!();
    }

    print_summary(&report, alarming_only);
    Ok(())
}

/// Explicit --data-dir must load; the implicit ./data falls back to defaults.
fn load_config(data_dir: Option<&str>) -> Result<AuditConfig> {
    match data_dir {
        Some(dir) => AuditConfig::load(dir),
        None if Path::new("./data/policy/classifier_policy.json").exists() => {
            AuditConfig::load("./data")
        }
        None => {
            log::warn!("no ./data/policy/classifier_policy.json; using built-in policy");
            Ok(AuditConfig::default())
        }
    }
}

fn write_jsonl(path: &str, report: &AuditReport, alarming_only: bool) -> Result<usize> {
    let file = File::create(path).with_context(|| format!("Cannot create {path}"))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0;
    for finding in report
        .findings
        .iter()
        .filter(|f| !alarming_only || f.is_alarming())
    {
        writeln!(writer, "{}", serde_json::to_string(finding)?)?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

fn print_summary(report: &AuditReport, alarming_only: bool) {
    println!("=== RUN SUMMARY ===");
    for line in report.summary_lines() {
        println!("  {line}");
    }

    println!();
    println!("=== UNEXPLAINED DESTINATION CHANGES (first 20) ===");
    let alarming: Vec<&Finding> = report.alarming().take(20).collect();
    if alarming.is_empty() {
        println!("  (none)");
    }
    for f in alarming {
        print_finding(f);
    }

    if !alarming_only {
        let failures = report.parse_failure_total();
        if failures > 0 {
            println!();
            println!("=== PARSE FAILURES ===");
            for (kind, count) in &report.parse_failures {
                println!("  {kind:<24} {count:>8}");
            }
        }
    }
}

fn print_finding(f: &Finding) {
    let is_phone = f.channel.contact_kind() == Some(ContactKind::Phone);
    let profile = if f.profile_contacts_considered.is_empty() {
        "(none in profile)".to_string()
    } else if is_phone {
        f.profile_contacts_considered
            .iter()
            .map(|p| format_phone(p))
            .collect::<Vec<_>>()
            .join("; ")
    } else {
        f.profile_contacts_considered.join("; ")
    };
    let destination = match f.destination.as_deref() {
        Some(d) if is_phone => canonical_phone(d)
            .as_str()
            .map_or_else(|| d.to_string(), format_phone),
        Some(d) => d.to_string(),
        None => "-".to_string(),
    };
    let name = [f.first_name.as_deref(), f.last_name.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    println!(
        "  {} | subject {} | member {} | user {} | {}",
        f.timestamp,
        f.subject_id.as_deref().unwrap_or("-"),
        f.member_number.as_deref().unwrap_or("-"),
        f.username.as_deref().unwrap_or("-"),
        if name.is_empty() { "-" } else { name.as_str() }
    );
    println!(
        "    {} to {destination}{}",
        f.channel,
        if f.suspicious_domain { "  [suspicious domain]" } else { "" }
    );
    println!("    profile: {profile}");
    println!("    verdict: {}", f.verdict());
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
