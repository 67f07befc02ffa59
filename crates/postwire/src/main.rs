//! `postwire` - command-line mail submission client
//!
//! Builds plain-text messages and submits them over SMTP with optional
//! STARTTLS and SASL authentication.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;
mod config;
mod service;

use std::io::Read;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use postwire_mime::EmailMessage;
use tracing::error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands, SendArgs};
use config::ClientConfig;

fn init_logging(verbose: bool) {
    let default = if verbose {
        "postwire=debug,postwire_smtp=debug"
    } else {
        "postwire=info,postwire_smtp=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    if matches!(cli.command, Commands::SampleConfig) {
        print!("{}", ClientConfig::sample());
        return Ok(ExitCode::SUCCESS);
    }

    let path = cli.config.unwrap_or_else(ClientConfig::default_path);
    let config = ClientConfig::load(&path)?;

    match cli.command {
        Commands::Send(args) => {
            let message = build_message(&config, args)?;
            let refused = service::send(&config, &message).await?;
            for (recipient, reply) in &refused {
                eprintln!("refused {recipient}: {reply}");
            }
            Ok(if refused.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
        Commands::Check => {
            service::check(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::SampleConfig => Ok(ExitCode::SUCCESS),
    }
}

fn build_message(config: &ClientConfig, args: SendArgs) -> Result<EmailMessage> {
    let Some(from) = args.from.or_else(|| config.message.from.clone()) else {
        bail!("no sender: pass --from or set message.from");
    };

    let body = match (args.body, args.body_file) {
        (Some(body), _) => body,
        (None, Some(path)) if path.as_os_str() == "-" => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("failed to read body from stdin")?;
            body
        }
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read body from {}", path.display()))?,
        (None, None) => String::new(),
    };

    let mut to = args.to.into_iter();
    let first = to.next().context("at least one --to is required")?;
    let mut message = EmailMessage::new(from, first, args.subject, body);
    for recipient in to {
        message = message.to(recipient);
    }
    for recipient in args.cc {
        message = message.cc(recipient);
    }
    for (name, value) in args.headers {
        message = message.header(name, value);
    }
    Ok(message)
}
