//! Binary entry point for the Burrow CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8Path;
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use burrow::config::ConfigError;
use burrow::provider::{DigitalOcean, Vultr};
use burrow::resource::teardown;
use burrow::vpn::SelfDestructPlan;
use burrow::{
    BurrowConfig, ConnectError, DigitalOceanConfig, ManagedResource, PollSettings,
    ProcessCommandRunner, Provider, ProviderError, ProviderKind, ReconcileError, RemoteExecutor,
    RemoteSettings, StdoutProgress, TeardownOutcome, UpError, UpOrchestrator, UpOutcome,
    UpRequest, VultrConfig, read_public_key, run_connect_commands, substitute_variables,
};

mod cli;

use cli::{Cli, ProviderArgs, UpCommand};

const DEFAULT_LOG_FILTER: &str = "burrow=info";
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Up(#[from] UpError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("autoconnect failed: {0}")]
    Connect(#[from] ConnectError),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = tokio::select! {
        result = dispatch(cli) => match result {
            Ok(()) => 0,
            Err(err) => {
                report_error(&err);
                1
            }
        },
        _ = tokio::signal::ctrl_c() => {
            writeln!(io::stderr(), "interrupted").ok();
            INTERRUPTED_EXIT_CODE
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Up(command) => run_up(command).await,
        Cli::Down(args) => run_down(&args).await,
        Cli::Show(args) => run_show(&args).await,
    }
}

fn config_path(args: &ProviderArgs) -> Option<&Utf8Path> {
    args.config.as_deref().map(Utf8Path::new)
}

fn load_config(args: &ProviderArgs) -> Result<BurrowConfig, CliError> {
    let mut config = BurrowConfig::load_from(config_path(args))?;
    if let Some(provider) = &args.provider {
        provider.trim().clone_into(&mut config.provider);
    }
    config.validate()?;
    Ok(config)
}

fn apply_up_overrides(config: &mut BurrowConfig, args: &UpCommand) {
    if let Some(autoconnect) = args.autoconnect {
        config.autoconnect = autoconnect;
    }
    if args.no_connect {
        config.autoconnect = false;
    }
    if let Some(minutes) = args.idletime {
        config.max_idle_minutes = minutes;
    }
    if let Some(minutes) = args.uptime {
        config.max_uptime_minutes = minutes;
    }
}

fn digitalocean_settings(
    args: &ProviderArgs,
    region: Option<&str>,
) -> Result<DigitalOceanConfig, CliError> {
    let mut settings = DigitalOceanConfig::load_from(config_path(args))?;
    if let Some(key) = &args.api_key {
        key.trim().clone_into(&mut settings.api_token);
    }
    if let Some(value) = region {
        value.clone_into(&mut settings.region);
    }
    Ok(settings)
}

fn vultr_settings(args: &ProviderArgs, region: Option<&str>) -> Result<VultrConfig, CliError> {
    let mut settings = VultrConfig::load_from(config_path(args))?;
    if let Some(key) = &args.api_key {
        key.trim().clone_into(&mut settings.api_key);
    }
    if let Some(value) = region {
        value.clone_into(&mut settings.region);
    }
    Ok(settings)
}

fn build_provider(
    config: &BurrowConfig,
    args: &ProviderArgs,
    region: Option<&str>,
) -> Result<Box<dyn Provider>, CliError> {
    let provider: Box<dyn Provider> = match config.provider_kind()? {
        ProviderKind::DigitalOcean => {
            Box::new(DigitalOcean::new(&digitalocean_settings(args, region)?)?)
        }
        ProviderKind::Vultr => Box::new(Vultr::new(&vultr_settings(args, region)?)?),
    };
    Ok(provider)
}

fn self_destruct_plan(config: &BurrowConfig) -> Option<SelfDestructPlan> {
    config
        .self_destruct_script
        .as_deref()
        .map(str::trim)
        .filter(|script| !script.is_empty())
        .map(|script| SelfDestructPlan {
            script: script.to_owned(),
            max_idle_minutes: config.max_idle_minutes,
            max_uptime_minutes: config.max_uptime_minutes,
        })
}

async fn run_up(args: UpCommand) -> Result<(), CliError> {
    let mut config = load_config(&args.target)?;
    apply_up_overrides(&mut config, &args);
    let provider = build_provider(&config, &args.target, args.region.as_deref())?;
    let public_key = read_public_key(&config.ssh_public_key)?;
    let executor = RemoteExecutor::new(RemoteSettings::from_config(&config), ProcessCommandRunner);
    let orchestrator = UpOrchestrator::new(provider.as_ref(), executor, StdoutProgress::new())
        .with_settings(PollSettings::standard().with_timeout(config.poll_timeout()));
    let request = UpRequest {
        name: config.resource_name.clone(),
        public_key,
        self_destruct: self_destruct_plan(&config),
    };

    let mut stdout = io::stdout();
    let outcome = orchestrator.execute(&request, &mut stdout).await?;
    write_summary(&mut stdout, &outcome)?;

    if config.autoconnect {
        let login = &outcome.endpoint.login;
        let commands = substitute_variables(
            &config.connect_commands(),
            &outcome.endpoint.address.to_string(),
            &login.username,
            &login.password,
        );
        run_connect_commands(&ProcessCommandRunner, &commands, &mut stdout).await?;
    }
    Ok(())
}

async fn run_down(args: &ProviderArgs) -> Result<(), CliError> {
    let config = load_config(args)?;
    let provider = build_provider(&config, args, None)?;
    let mut input = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = io::stdout();
    match teardown(provider.as_ref(), &config.resource_name, &mut input, &mut stdout).await? {
        TeardownOutcome::Destroyed { id } => tracing::info!(id = %id, "teardown complete"),
        TeardownOutcome::Aborted | TeardownOutcome::NotFound => {}
    }
    Ok(())
}

async fn run_show(args: &ProviderArgs) -> Result<(), CliError> {
    let config = load_config(args)?;
    let provider = build_provider(&config, args, None)?;
    let resources = provider.list_resources().await?;
    let mut stdout = io::stdout();
    write!(stdout, "{}", render_table(&resources))?;
    Ok(())
}

fn write_summary(mut target: impl Write, outcome: &UpOutcome) -> io::Result<()> {
    let endpoint = &outcome.endpoint;
    if !endpoint.freshly_installed {
        writeln!(target, "VPN server was already running")?;
    }
    writeln!(target, "VPN server:   {}", endpoint.address)?;
    writeln!(target, "VPN username: {}", endpoint.login.username)?;
    writeln!(target, "VPN password: {}", endpoint.login.password)
}

fn render_table(resources: &[ManagedResource]) -> String {
    if resources.is_empty() {
        return String::from("No virtual machines found\n");
    }
    let mut table = format!(
        "{:<12} {:<20} {:<24} {:<16} {:<8} {}\n",
        "ID", "NAME", "OS", "ADDRESS", "REGION", "STATUS"
    );
    for resource in resources {
        table.push_str(&format!(
            "{:<12} {:<20} {:<24} {:<16} {:<8} {}\n",
            resource.id,
            resource.name,
            resource.operating_system,
            resource.address_text(),
            resource.region,
            resource.status
        ));
    }
    table
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
