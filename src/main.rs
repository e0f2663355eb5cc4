// Entrypoint for the CLI application.
// - Keeps `main` small: read settings, build the HTTP client and session, and
//   hand them to a subcommand or to the interactive menu.
// - Returns `anyhow::Result` so failures at the edges carry context.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::warn;

use flowbutton::admin::{self, auth::Authenticator, InventoryOptions};
use flowbutton::api::DataverseClient;
use flowbutton::button::{run_custom_fields_button, run_flow_button, ButtonOptions, ButtonOutcome};
use flowbutton::config_store::DataverseConfigStore;
use flowbutton::dispatch::WebhookDispatcher;
use flowbutton::host::HostUi;
use flowbutton::record::{ExplicitRef, FormRecord, GridSelection, PrimaryControl};
use flowbutton::session::FlowSession;
use flowbutton::settings::Settings;
use flowbutton::ui::{ask, main_menu_choice, MenuChoice, TerminalUi};

#[derive(Parser)]
#[command(name = "flowbutton")]
#[command(about = "Run webhook-triggered flows for Dataverse records and inventory tenant environments")]
struct Cli {
    /// Dataverse organization URL (overrides FLOWBUTTON_ORG_URL)
    #[arg(long, global = true)]
    org_url: Option<String>,

    /// Bearer token for the organization; skips device-code sign-in
    #[arg(long, global = true)]
    token: Option<String>,

    /// Locale id used to pick the message language (e.g. 1030)
    #[arg(long, global = true)]
    lcid: Option<u32>,

    /// Configuration name of a JSON string table
    #[arg(long, global = true)]
    strings_variable: Option<String>,

    /// Reuse the first successful configuration lookup for the whole run
    #[arg(long, global = true)]
    cache_lookups: bool,

    /// Token cache file
    #[arg(long, global = true)]
    cache_file: Option<PathBuf>,

    /// Accept confirmations and do not wait on alerts
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    /// Debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a flow for selected records
    Trigger(TriggerArgs),
    /// Run a flow for a single form record
    TriggerForm(FormArgs),
    /// Run a flow for a form record, sending field values along
    TriggerFields(FieldsArgs),
    /// Inventory environments for a solution and custom scripts
    Inventory(InventoryArgs),
}

#[derive(Args, Debug, Clone)]
struct CommonButtonArgs {
    /// Environment variable holding the flow's HTTP trigger URL
    #[arg(long)]
    url_variable: String,

    /// Confirmation text; {0} is the record count
    #[arg(long)]
    confirm_text: Option<String>,

    /// Success text; {0} is the number of records processed
    #[arg(long)]
    success_text: Option<String>,
}

#[derive(Args, Debug)]
struct TriggerArgs {
    #[command(flatten)]
    common: CommonButtonArgs,

    /// Table (entity) logical name of the selected rows
    #[arg(long, required_unless_present = "refs")]
    entity: Option<String>,

    /// Selected row id; repeat for several rows
    #[arg(long = "id")]
    ids: Vec<String>,

    /// JSON file with a list of record references ({"Id", "TypeName"})
    #[arg(long, conflicts_with_all = ["entity", "ids"])]
    refs: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct FormArgs {
    #[command(flatten)]
    common: CommonButtonArgs,

    #[arg(long)]
    entity: String,

    #[arg(long)]
    id: String,

    /// Field value on the form, as name=value (value may be JSON)
    #[arg(long = "field", value_parser = parse_field)]
    fields: Vec<(String, Value)>,

    /// Sub-grid to refresh afterwards
    #[arg(long)]
    refresh_subgrid: Option<String>,
}

#[derive(Args, Debug)]
struct FieldsArgs {
    #[command(flatten)]
    form: FormArgs,

    /// Field to send to the flow; repeat for several
    #[arg(long = "send", required = true)]
    send: Vec<String>,
}

#[derive(Args, Debug)]
struct InventoryArgs {
    /// Solution unique name to look for
    #[arg(long, default_value = admin::DEFAULT_SOLUTION)]
    solution: String,

    /// Directory for CSV reports
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

fn parse_field(s: &str) -> std::result::Result<(String, Value), String> {
    let (name, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {s}"))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((name.to_string(), value))
}

impl FormArgs {
    fn control(&self) -> PrimaryControl {
        let fields: Map<String, Value> = self.fields.iter().cloned().collect();
        PrimaryControl::Form(FormRecord {
            id: self.id.clone(),
            entity_name: self.entity.clone(),
            fields,
        })
    }

    fn options(&self) -> ButtonOptions {
        ButtonOptions {
            refresh_subgrid: self.refresh_subgrid.clone(),
            ..self.common.options()
        }
    }
}

impl CommonButtonArgs {
    fn options(&self) -> ButtonOptions {
        ButtonOptions {
            url_variable: self.url_variable.clone(),
            confirm_text: self.confirm_text.clone(),
            success_text: self.success_text.clone(),
            ..Default::default()
        }
    }
}

impl TriggerArgs {
    fn control(&self) -> Result<PrimaryControl> {
        if let Some(path) = &self.refs {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let refs: Vec<ExplicitRef> =
                serde_json::from_str(&data).context("Parsing record references")?;
            return Ok(PrimaryControl::References(refs));
        }
        Ok(PrimaryControl::Grid(GridSelection {
            entity_name: self.entity.clone().unwrap_or_default(),
            rows: self.ids.clone(),
        }))
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let default = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

impl Cli {
    fn settings(&self) -> Settings {
        let mut settings = Settings::from_env();
        if let Some(url) = &self.org_url {
            settings.org_url = Some(url.clone());
        }
        if let Some(token) = &self.token {
            settings.token = Some(token.clone());
        }
        if self.lcid.is_some() {
            settings.lcid = self.lcid;
        }
        if let Some(name) = &self.strings_variable {
            settings.strings_variable = Some(name.clone());
        }
        if let Some(path) = &self.cache_file {
            settings.cache_file = path.clone();
        }
        settings.cache_lookups |= self.cache_lookups;
        settings.assume_yes = self.yes;
        settings
    }
}

/// Build a session against the configured organization, signing in when no
/// token was given.
async fn build_session(settings: &Settings, client: &reqwest::Client) -> Result<FlowSession> {
    let org_url = settings
        .org_url
        .clone()
        .context("No organization URL; set FLOWBUTTON_ORG_URL or pass --org-url")?;
    let token = match &settings.token {
        Some(token) => token.clone(),
        None => {
            let mut auth = Authenticator::new(client.clone(), settings.cache_file.clone());
            auth.acquire_token(&admin::auth::dataverse_scope(&org_url), false)
                .await?
                .context("Could not authenticate")?
        }
    };
    let api = DataverseClient::new(client.clone(), &org_url).with_token(&token);
    let store = Arc::new(DataverseConfigStore::new(api));
    Ok(FlowSession::new(WebhookDispatcher::new(client.clone()), store)
        .with_strings(settings.string_source())
        .with_cached_lookups(settings.cache_lookups))
}

/// Run one button invocation. Ctrl-C drops it, which cancels any calls
/// still in flight.
async fn press(
    session: &FlowSession,
    ui: &TerminalUi,
    control: &PrimaryControl,
    options: &ButtonOptions,
    with_fields: bool,
) -> Option<ButtonOutcome> {
    let run = async {
        if with_fields {
            run_custom_fields_button(session, ui, control, options).await
        } else {
            run_flow_button(session, ui, control, options).await
        }
    };
    tokio::select! {
        outcome = run => Some(outcome),
        _ = tokio::signal::ctrl_c() => {
            ui.close_progress();
            warn!("Interrupted; outstanding flow calls were cancelled");
            None
        }
    }
}

async fn inventory(settings: &Settings, client: &reqwest::Client, options: InventoryOptions) -> Result<()> {
    let mut auth = Authenticator::new(client.clone(), settings.cache_file.clone());
    admin::run_inventory(client, &mut auth, &options)
        .await
        .context("Inventory failed")?;
    Ok(())
}

/// Interactive loop used when no subcommand is given.
async fn main_menu(settings: &Settings, client: &reqwest::Client, ui: &TerminalUi) -> Result<()> {
    let mut session: Option<FlowSession> = None;
    loop {
        match main_menu_choice()? {
            MenuChoice::TriggerRecords => {
                let url_variable = ask("Flow URL environment variable", false)?;
                let entity = ask("Table logical name", false)?;
                let ids = ask("Record ids (comma separated)", true)?;
                let control = PrimaryControl::Grid(GridSelection {
                    entity_name: entity,
                    rows: ids
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect(),
                });
                let options = ButtonOptions {
                    url_variable,
                    ..Default::default()
                };
                if session.is_none() {
                    session = Some(build_session(settings, client).await?);
                }
                if let Some(session) = &session {
                    press(session, ui, &control, &options, false).await;
                }
            }
            MenuChoice::TriggerForm => {
                let url_variable = ask("Flow URL environment variable", false)?;
                let entity = ask("Table logical name", false)?;
                let id = ask("Record id", false)?;
                let subgrid = ask("Sub-grid to refresh (optional)", true)?;
                let control = PrimaryControl::Form(FormRecord {
                    id,
                    entity_name: entity,
                    fields: Map::new(),
                });
                let options = ButtonOptions {
                    url_variable,
                    refresh_subgrid: Some(subgrid).filter(|s| !s.is_empty()),
                    ..Default::default()
                };
                if session.is_none() {
                    session = Some(build_session(settings, client).await?);
                }
                if let Some(session) = &session {
                    press(session, ui, &control, &options, false).await;
                }
            }
            MenuChoice::Inventory => {
                if let Err(e) = inventory(settings, client, InventoryOptions::default()).await {
                    println!("{e:#}");
                }
            }
            MenuChoice::Exit => break,
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let settings = cli.settings();

    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let ui = TerminalUi::new(settings.assume_yes);

    match &cli.command {
        None => main_menu(&settings, &client, &ui).await?,
        Some(Commands::Trigger(args)) => {
            let control = args.control()?;
            let session = build_session(&settings, &client).await?;
            press(&session, &ui, &control, &args.common.options(), false).await;
        }
        Some(Commands::TriggerForm(args)) => {
            let session = build_session(&settings, &client).await?;
            press(&session, &ui, &args.control(), &args.options(), false).await;
        }
        Some(Commands::TriggerFields(args)) => {
            let session = build_session(&settings, &client).await?;
            let options = ButtonOptions {
                fields: args.send.clone(),
                ..args.form.options()
            };
            press(&session, &ui, &args.form.control(), &options, true).await;
        }
        Some(Commands::Inventory(args)) => {
            let options = InventoryOptions {
                solution_name: args.solution.clone(),
                output_dir: args.output_dir.clone(),
                ..Default::default()
            };
            inventory(&settings, &client, options).await?;
        }
    }
    Ok(())
}
