//! CLI entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `idlink_core` linkage.
//! - Drive one reconciliation from the command line, playing the transport
//!   role: validate input, retry retryable faults, render JSON.

use idlink_core::db::open_db;
use idlink_core::{default_log_level, identify, Sighting};
use std::env;
use std::process::ExitCode;

const DB_PATH_ENV: &str = "IDLINK_DB";
const LOG_DIR_ENV: &str = "IDLINK_LOG_DIR";
const LOG_LEVEL_ENV: &str = "IDLINK_LOG_LEVEL";
const DEFAULT_DB_PATH: &str = "idlink.sqlite3";
const MAX_IDENTIFY_ATTEMPTS: u32 = 3;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    if let Ok(log_dir) = env::var(LOG_DIR_ENV) {
        let level = env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| default_log_level().to_string());
        if let Err(err) = idlink_core::init_logging(&level, &log_dir) {
            eprintln!("logging init failed: {err}");
            return ExitCode::FAILURE;
        }
    }

    match args.first().map(String::as_str) {
        None => {
            // Tiny probe to validate core crate wiring without a database.
            println!("idlink_core ping={}", idlink_core::ping());
            println!("idlink_core version={}", idlink_core::core_version());
            ExitCode::SUCCESS
        }
        Some("identify") => run_identify(&args[1..]),
        Some(other) => {
            eprintln!("unknown command `{other}`");
            usage();
            ExitCode::FAILURE
        }
    }
}

fn usage() {
    eprintln!("usage: idlink [identify [--email <address>] [--phone <number>]]");
}

fn run_identify(args: &[String]) -> ExitCode {
    let (email, phone) = match parse_identify_args(args) {
        Ok(pair) => pair,
        Err(message) => {
            eprintln!("{message}");
            usage();
            return ExitCode::FAILURE;
        }
    };

    let sighting = match Sighting::new(email.as_deref(), phone.as_deref()) {
        Ok(sighting) => sighting,
        Err(err) => {
            eprintln!("invalid sighting: {err}");
            return ExitCode::FAILURE;
        }
    };

    let db_path = env::var(DB_PATH_ENV).unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
    let mut conn = match open_db(&db_path) {
        Ok(conn) => conn,
        Err(err) => {
            eprintln!("failed to open database `{db_path}`: {err}");
            return ExitCode::FAILURE;
        }
    };

    // Replaying the whole sighting is safe: an aborted reconciliation
    // transaction leaves no partial mutation behind.
    let mut attempt = 1;
    let summary = loop {
        match identify(&mut conn, &sighting) {
            Ok(summary) => break summary,
            Err(err) if err.is_retryable() && attempt < MAX_IDENTIFY_ATTEMPTS => {
                attempt += 1;
            }
            Err(err) => {
                eprintln!("identify failed: {err}");
                return ExitCode::FAILURE;
            }
        }
    };

    match serde_json::to_string_pretty(&summary) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("failed to render summary: {err}");
            ExitCode::FAILURE
        }
    }
}

fn parse_identify_args(args: &[String]) -> Result<(Option<String>, Option<String>), String> {
    let mut email = None;
    let mut phone = None;

    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--email" => {
                email = Some(iter.next().ok_or("--email requires a value")?.clone());
            }
            "--phone" => {
                phone = Some(iter.next().ok_or("--phone requires a value")?.clone());
            }
            other => return Err(format!("unknown argument `{other}`")),
        }
    }

    if email.is_none() && phone.is_none() {
        return Err("at least one of --email/--phone is required".to_string());
    }

    Ok((email, phone))
}
