//! Bulkcast CLI entry point.
//!
//! Provides `send`, `templates`, `validate`, and `status` subcommands for
//! running a bulk dispatch, browsing the template catalog, checking
//! addresses, and probing provider connectivity.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use bulkcast::config::{runtime_paths, Config, RuntimePaths};
use bulkcast::credentials::load_credentials;
use bulkcast::dispatch::{DispatchRequest, Dispatcher};
use bulkcast::ledger::JsonFileLedger;
use bulkcast::providers::router::ProviderRouter;
use bulkcast::recipient::{is_valid, sendable_address, Channel};
use bulkcast::template::{MessageTemplate, TemplateCatalog, TemplateVars};

/// Bulkcast: bulk email and SMS dispatch.
#[derive(Parser)]
#[command(name = "bulkcast", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Send one message to every address in a recipients file.
    Send(SendArgs),
    /// List catalog templates and their variables.
    Templates {
        /// Only show templates for this channel.
        #[arg(long)]
        channel: Option<Channel>,
    },
    /// Validate and normalize addresses for a channel.
    Validate {
        /// Channel to validate against.
        #[arg(long)]
        channel: Channel,
        /// Read addresses from a file instead of the command line.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Addresses to check.
        addresses: Vec<String>,
    },
    /// Check provider credentials against the vendor API.
    Status {
        /// Provider to check; all configured providers when omitted.
        provider: Option<String>,
    },
}

/// Arguments for `bulkcast send`.
#[derive(clap::Args)]
struct SendArgs {
    /// Delivery channel (`email` or `sms`).
    #[arg(long)]
    channel: Channel,
    /// Provider name (`mailgun`, `twilio`, `plivo`).
    #[arg(long)]
    provider: String,
    /// File with one address per line; `#` comments and blank lines are skipped.
    #[arg(long)]
    recipients: PathBuf,
    /// Catalog template key.
    #[arg(long, conflicts_with = "body")]
    template: Option<String>,
    /// Subject line (email only).
    #[arg(long)]
    subject: Option<String>,
    /// Message body with `{{name}}` placeholders.
    #[arg(long)]
    body: Option<String>,
    /// JSON file mapping each address to its variables.
    #[arg(long)]
    variables: Option<PathBuf>,
    /// Shared variable as `key=value`; repeatable.
    #[arg(long = "var", value_parser = parse_key_value)]
    vars: Vec<(String, String)>,
    /// Render one message per recipient.
    #[arg(long)]
    personalize: bool,
    /// Pause between recipients in milliseconds.
    #[arg(long)]
    delay_ms: Option<u64>,
    /// Retries after a failed attempt.
    #[arg(long)]
    max_retries: Option<u32>,
    /// Pause between attempts in milliseconds.
    #[arg(long)]
    retry_delay_ms: Option<u64>,
    /// Sender identity overriding the configured default.
    #[arg(long)]
    from: Option<String>,
    /// Address to skip; repeatable.
    #[arg(long = "exclude")]
    excluded: Vec<String>,
    /// Record the template key against each successful recipient.
    #[arg(long, requires = "template")]
    mark_sent: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Send(args) => handle_send(args).await,
        Command::Templates { channel } => handle_templates(channel),
        Command::Validate {
            channel,
            file,
            addresses,
        } => handle_validate(channel, file.as_deref(), addresses),
        Command::Status { provider } => handle_status(provider.as_deref()).await,
    }
}

/// Run one bulk dispatch and print its summary as JSON.
async fn handle_send(args: SendArgs) -> anyhow::Result<()> {
    let paths = runtime_paths()?;
    let _logging_guard = bulkcast::logging::init_production(&paths.logs_dir)?;

    let config = Config::load(&paths.config_file)
        .with_context(|| format!("failed to load {}", paths.config_file.display()))?;
    let credentials = load_credentials(&paths.env_file)
        .with_context(|| format!("failed to load {}", paths.env_file.display()))?;
    let catalog = load_catalog(&config)?;

    let recipients = read_address_file(&args.recipients)?;
    let shared: TemplateVars = args.vars.iter().cloned().collect();
    let template = select_template(&args, &catalog, &shared)?;

    let mut options = config.dispatch_defaults();
    options.personalize = args.personalize;
    options.variables = shared;
    options.from_override = args.from.clone();
    options.excluded_addresses = args.excluded.clone();
    if let Some(delay_ms) = args.delay_ms {
        options.delay_ms = delay_ms;
    }
    if let Some(max_retries) = args.max_retries {
        options.max_retries = max_retries;
    }
    if let Some(retry_delay_ms) = args.retry_delay_ms {
        options.retry_delay_ms = retry_delay_ms;
    }
    if let Some(path) = &args.variables {
        options.per_recipient_variables = read_variables_file(path)?;
    }

    let router = ProviderRouter::from_config(&config.providers, &credentials);
    let mut dispatcher = Dispatcher::from_config(&config, Arc::new(router));

    let mut request = DispatchRequest::new(recipients, template, args.channel, &args.provider)
        .with_options(options);
    if args.mark_sent {
        if let Some(key) = &args.template {
            dispatcher =
                dispatcher.with_recorder(Arc::new(JsonFileLedger::new(paths.sent_ledger.clone())));
            request = request.with_template_key(key);
        }
    }

    let report = dispatcher
        .dispatch(request)
        .await
        .context("dispatch failed before sending")?;

    let json = serde_json::to_string_pretty(&report.summary())
        .context("failed to serialize dispatch summary")?;
    println!("{json}");
    Ok(())
}

fn select_template(
    args: &SendArgs,
    catalog: &TemplateCatalog,
    shared: &TemplateVars,
) -> anyhow::Result<MessageTemplate> {
    if let Some(key) = &args.template {
        let entry = catalog.get(key)?;
        if entry.channel != args.channel {
            warn!(
                template = %key,
                template_channel = %entry.channel,
                channel = %args.channel,
                "template written for a different channel"
            );
        }
        if !args.personalize {
            let missing = entry.missing_variables(shared);
            if !missing.is_empty() {
                warn!(template = %key, ?missing, "template variables not supplied");
            }
        }
        let mut template = entry.template();
        if let Some(subject) = &args.subject {
            template.subject = Some(subject.clone());
        }
        return Ok(template);
    }

    let body = args
        .body
        .clone()
        .ok_or_else(|| anyhow::anyhow!("either --template or --body is required"))?;
    let mut template = MessageTemplate::new(body);
    template.subject = args.subject.clone();
    Ok(template)
}

/// Print the template catalog.
fn handle_templates(channel: Option<Channel>) -> anyhow::Result<()> {
    bulkcast::logging::init_cli(false);
    let config = load_config_quietly()?;
    let catalog = load_catalog(&config)?;

    for (key, entry) in catalog.iter() {
        if channel.is_some_and(|c| c != entry.channel) {
            continue;
        }
        println!(
            "{key:<20} {:<6} {:<14} {}",
            entry.channel.as_str(),
            entry.category,
            entry.name
        );
        let variables = entry.declared_variables();
        if !variables.is_empty() {
            println!("{:<20} variables: {}", "", variables.join(", "));
        }
    }
    Ok(())
}

/// Print validity and the sendable form of each address.
fn handle_validate(
    channel: Channel,
    file: Option<&Path>,
    mut addresses: Vec<String>,
) -> anyhow::Result<()> {
    bulkcast::logging::init_cli(false);
    let config = load_config_quietly()?;
    if let Some(path) = file {
        addresses.extend(read_address_file(path)?);
    }

    let mut invalid = 0_usize;
    for address in &addresses {
        if is_valid(address, channel) {
            let sendable = sendable_address(address, channel, &config.sms.default_country_code);
            println!("valid    {address} -> {sendable}");
        } else {
            invalid = invalid.saturating_add(1);
            println!("invalid  {address}");
        }
    }
    info!(checked = addresses.len(), invalid, "address validation finished");
    Ok(())
}

/// Probe one or all configured providers.
async fn handle_status(provider: Option<&str>) -> anyhow::Result<()> {
    bulkcast::logging::init_cli(false);
    let paths = runtime_paths()?;
    let config = Config::load(&paths.config_file)
        .with_context(|| format!("failed to load {}", paths.config_file.display()))?;
    let credentials = load_credentials(&paths.env_file)
        .with_context(|| format!("failed to load {}", paths.env_file.display()))?;
    let router = ProviderRouter::from_config(&config.providers, &credentials);

    let checks = match provider {
        Some(name) => vec![router.check(name).await?],
        None => router.check_all().await,
    };
    if checks.is_empty() {
        println!("no providers configured in {}", paths.env_file.display());
    }
    for check in checks {
        match check.status {
            Ok(status) => println!(
                "{:<8} {} {}",
                check.provider,
                if status.connected { "ok  " } else { "FAIL" },
                status.message
            ),
            Err(e) => println!("{:<8} FAIL {e}", check.provider),
        }
    }
    Ok(())
}

fn load_config_quietly() -> anyhow::Result<Config> {
    let paths: RuntimePaths = runtime_paths()?;
    Config::load(&paths.config_file)
        .with_context(|| format!("failed to load {}", paths.config_file.display()))
}

fn load_catalog(config: &Config) -> anyhow::Result<TemplateCatalog> {
    let mut catalog = TemplateCatalog::builtin();
    if let Some(path) = &config.templates.catalog {
        catalog.extend(TemplateCatalog::load(path)?);
    }
    Ok(catalog)
}

fn read_address_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read recipients file {}", path.display()))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect())
}

fn read_variables_file(path: &Path) -> anyhow::Result<BTreeMap<String, TemplateVars>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read variables file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("invalid variables JSON in {}", path.display()))
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_owned(), value.to_owned()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}
