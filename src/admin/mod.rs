//! Tenant inventory: sign in, list environments, and check every Dataverse
//! environment for a solution and for custom scripts in its Default solution.

pub mod auth;
pub mod checks;
pub mod environments;
pub mod report;

use std::path::PathBuf;
use std::time::Duration;

use chrono::Local;
use reqwest::Client;

use crate::api::DataverseClient;
use crate::error::{FlowError, Result};
use crate::ui::heading;
use auth::{dataverse_scope, Authenticator, BAP_SCOPE};
use checks::SolutionStatus;
use environments::{list_environments, Environment, BAP_BASE};
use report::{write_scripts_csv, CheckStatus, CsvFile, EnvironmentResult, InventoryReport, PREVIEW_LIMIT};

pub const DEFAULT_SOLUTION: &str = "Develop1SmartButtons";
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct InventoryOptions {
    pub solution_name: String,
    pub output_dir: PathBuf,
    pub bap_base: String,
}

impl Default for InventoryOptions {
    fn default() -> Self {
        Self {
            solution_name: DEFAULT_SOLUTION.to_string(),
            output_dir: PathBuf::from("."),
            bap_base: BAP_BASE.to_string(),
        }
    }
}

/// Run the full inventory. Environment-level failures are recorded in the
/// report; only sign-in and listing failures abort the run.
pub async fn run_inventory(
    client: &Client,
    auth: &mut Authenticator,
    options: &InventoryOptions,
) -> Result<InventoryReport> {
    heading("DATAVERSE SOLUTION CHECKER");
    println!("Looking for: {}", options.solution_name);
    println!("Also checking: Unmanaged, non-Microsoft JavaScript (.js) in Default solution");

    println!("\nStep 1: Authenticating to Power Platform...");
    let bap_token = auth
        .acquire_token(BAP_SCOPE, false)
        .await?
        .ok_or_else(|| FlowError::Auth("Could not authenticate".into()))?;

    println!("Step 2: Fetching environments...");
    let environments = list_environments(client, &options.bap_base, &bap_token).await?;
    if environments.is_empty() {
        return Err(FlowError::Query("No environments found or access denied".into()));
    }
    println!("\nFound {} environment(s)\n", environments.len());

    heading("CHECKING ENVIRONMENTS");
    let dataverse: Vec<Environment> = environments
        .into_iter()
        .filter(|env| {
            if env.instance_url.is_none() {
                println!("Skipping {} ({}) - No Dataverse database", env.name, env.sku);
            }
            env.instance_url.is_some()
        })
        .collect();
    if dataverse.is_empty() {
        return Err(FlowError::Query("No environments with Dataverse found".into()));
    }
    println!("\n{} environment(s) with Dataverse to check", dataverse.len());

    let mut report = InventoryReport {
        solution_name: options.solution_name.clone(),
        ..Default::default()
    };
    let total = dataverse.len();
    for (i, env) in dataverse.into_iter().enumerate() {
        let url = env.instance_url.clone().unwrap_or_default();
        println!("\n[{}/{}] {} ({})", i + 1, total, env.name, env.sku);
        println!("    URL: {url}");

        let token = match auth.acquire_token(&dataverse_scope(&url), false).await {
            Ok(Some(token)) => token,
            Ok(None) | Err(_) => {
                println!("    Could not get token for this environment");
                report.results.push(EnvironmentResult {
                    environment: env,
                    status: CheckStatus::AuthFailed,
                    scripts: None,
                });
                continue;
            }
        };
        let api = DataverseClient::new(client.clone(), &url)
            .with_token(&token)
            .with_timeout(QUERY_TIMEOUT);
        let result = check_environment(&api, env, options, &mut report.csv_files).await;
        report.results.push(result);
    }

    auth.save_cache();
    report.print_summary();
    Ok(report)
}

/// Both checks for one environment, printing progress as it goes.
pub async fn check_environment(
    api: &DataverseClient,
    environment: Environment,
    options: &InventoryOptions,
    csv_files: &mut Vec<CsvFile>,
) -> EnvironmentResult {
    let solution = checks::check_solution(api, &options.solution_name).await;
    match &solution {
        SolutionStatus::Found(info) => println!(
            "    FOUND: {} v{} ({})",
            info.friendlyname.as_deref().unwrap_or(""),
            info.version.as_deref().unwrap_or("Unknown"),
            info.managed_label()
        ),
        SolutionStatus::NotFound => println!("    Solution not found"),
        SolutionStatus::Error(e) => println!("    Solution check error: {e}"),
    }

    let scripts = match checks::custom_scripts(api).await {
        Ok(list) => {
            if list.is_empty() {
                println!("    No non-Microsoft JS files in Default solution");
            } else {
                println!(
                    "    Found {} non-Microsoft JS file(s) in Default solution:",
                    list.len()
                );
                for wr in list.iter().take(PREVIEW_LIMIT) {
                    println!("       • {}", wr.name);
                }
                if list.len() > PREVIEW_LIMIT {
                    println!("       ... and {} more", list.len() - PREVIEW_LIMIT);
                }
                match write_scripts_csv(&options.output_dir, &environment.name, &list, Local::now()) {
                    Ok(path) => {
                        println!("    Saved to: {}", path.display());
                        csv_files.push(CsvFile {
                            environment: environment.name.clone(),
                            path,
                            count: list.len(),
                        });
                    }
                    Err(e) => println!("    Could not write CSV: {e}"),
                }
            }
            Ok(list)
        }
        Err(e) => {
            let text = checks::describe_error(&e);
            println!("    JS web resources check error: {text}");
            Err(text)
        }
    };

    EnvironmentResult {
        environment,
        status: CheckStatus::Solution(solution),
        scripts: Some(scripts),
    }
}
