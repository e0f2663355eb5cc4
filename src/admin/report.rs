//! CSV files and console summary for an inventory run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use crossterm::style::Stylize;

use super::checks::{SolutionStatus, WebResource};
use super::environments::Environment;
use crate::error::Result;
use crate::ui::heading;

pub const CSV_COLUMNS: [&str; 5] = ["name", "displayname", "ismanaged", "createdon", "modifiedon"];

/// How many findings are listed per environment while checking.
pub const PREVIEW_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum CheckStatus {
    Solution(SolutionStatus),
    AuthFailed,
}

/// Everything learned about one Dataverse environment.
#[derive(Debug, Clone)]
pub struct EnvironmentResult {
    pub environment: Environment,
    pub status: CheckStatus,
    /// `None` when the web resource check was not run.
    pub scripts: Option<std::result::Result<Vec<WebResource>, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvFile {
    pub environment: String,
    pub path: PathBuf,
    pub count: usize,
}

#[derive(Debug, Default)]
pub struct InventoryReport {
    pub solution_name: String,
    pub results: Vec<EnvironmentResult>,
    pub csv_files: Vec<CsvFile>,
}

/// File-name-safe form of an environment name.
pub fn sanitize_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    kept.trim().replace(' ', "_")
}

pub fn csv_file_name(environment: &str, at: DateTime<Local>) -> String {
    format!(
        "webresources_{}_{}.csv",
        sanitize_name(environment),
        at.format("%Y%m%d_%H%M%S")
    )
}

pub fn write_scripts_csv(
    dir: &Path,
    environment: &str,
    resources: &[WebResource],
    at: DateTime<Local>,
) -> Result<PathBuf> {
    let path = dir.join(csv_file_name(environment, at));
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(CSV_COLUMNS)?;
    for wr in resources {
        writer.write_record([
            wr.name.as_str(),
            wr.displayname.as_deref().unwrap_or(""),
            if wr.ismanaged { "True" } else { "False" },
            wr.createdon.as_deref().unwrap_or(""),
            wr.modifiedon.as_deref().unwrap_or(""),
        ])?;
    }
    writer.flush()?;
    Ok(path)
}

impl InventoryReport {
    pub fn found(&self) -> impl Iterator<Item = (&EnvironmentResult, &super::checks::SolutionInfo)> {
        self.results.iter().filter_map(|r| match &r.status {
            CheckStatus::Solution(SolutionStatus::Found(info)) => Some((r, info)),
            _ => None,
        })
    }

    pub fn not_found(&self) -> impl Iterator<Item = &EnvironmentResult> {
        self.results
            .iter()
            .filter(|r| r.status == CheckStatus::Solution(SolutionStatus::NotFound))
    }

    pub fn errors(&self) -> impl Iterator<Item = (&EnvironmentResult, String)> {
        self.results.iter().filter_map(|r| match &r.status {
            CheckStatus::Solution(SolutionStatus::Error(e)) => Some((r, e.clone())),
            CheckStatus::AuthFailed => Some((r, "Auth Failed".to_string())),
            _ => None,
        })
    }

    pub fn with_scripts(&self) -> impl Iterator<Item = (&EnvironmentResult, &[WebResource])> {
        self.results.iter().filter_map(|r| match &r.scripts {
            Some(Ok(list)) if !list.is_empty() => Some((r, list.as_slice())),
            _ => None,
        })
    }

    pub fn clean(&self) -> impl Iterator<Item = &EnvironmentResult> {
        self.results
            .iter()
            .filter(|r| matches!(&r.scripts, Some(Ok(list)) if list.is_empty()))
    }

    pub fn print_summary(&self) {
        heading("SUMMARY");

        println!("\n--- {} Solution ---", self.solution_name);
        let found: Vec<_> = self.found().collect();
        println!("\n{}", format!("Found in {} environment(s):", found.len()).green());
        for (r, info) in &found {
            println!(
                "   • {}: v{} ({})",
                r.environment.name,
                info.version.as_deref().unwrap_or("?"),
                info.managed_label()
            );
        }

        let not_found: Vec<_> = self.not_found().collect();
        if !not_found.is_empty() {
            println!("\n{}", format!("Not found in {} environment(s):", not_found.len()).red());
            for r in not_found {
                println!("   • {}", r.environment.name);
            }
        }

        let errors: Vec<_> = self.errors().collect();
        if !errors.is_empty() {
            println!("\n{}", format!("Errors in {} environment(s):", errors.len()).yellow());
            for (r, e) in errors {
                println!("   • {}: {}", r.environment.name, e);
            }
        }

        println!("\n--- Unmanaged, Non-Microsoft JavaScript Files in Default Solution ---");
        let with_scripts: Vec<_> = self.with_scripts().collect();
        if with_scripts.is_empty() {
            println!("\nNo non-Microsoft JS files found in Default solution");
        } else {
            println!(
                "\nFound non-Microsoft JS files in {} environment(s):",
                with_scripts.len()
            );
            for (r, list) in with_scripts {
                println!("\n   {} ({} JS file(s)):", r.environment.name, list.len());
                for wr in list {
                    match wr.displayname.as_deref().filter(|d| !d.is_empty()) {
                        Some(display) => println!("      • {} ({})", wr.name, display),
                        None => println!("      • {}", wr.name),
                    }
                }
            }
        }

        let clean: Vec<_> = self.clean().collect();
        if !clean.is_empty() {
            println!(
                "\nClean environments (no non-Microsoft JS files): {}",
                clean.len()
            );
            for r in clean {
                println!("   • {}", r.environment.name);
            }
        }

        if !self.csv_files.is_empty() {
            println!("\n--- CSV Files Created ---");
            for f in &self.csv_files {
                println!("   • {}: {} ({} records)", f.environment, f.path.display(), f.count);
            }
        }

        heading("Done!");
    }
}
