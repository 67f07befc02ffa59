//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "postwire", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    /// Configuration file, defaults to the user config directory
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Log the SMTP transcript
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build a plain-text message and submit it
    Send(SendArgs),
    /// Connect, identify and authenticate without sending anything
    Check,
    /// Print a sample configuration file
    SampleConfig,
}

#[derive(Debug, clap::Args)]
pub struct SendArgs {
    /// Recipient mailbox, repeat for more
    #[arg(short, long, required = true)]
    pub to: Vec<String>,
    /// Carbon-copy recipient, repeat for more
    #[arg(long)]
    pub cc: Vec<String>,
    /// Sender mailbox, defaults to message.from in the config
    #[arg(short, long)]
    pub from: Option<String>,
    /// Subject line
    #[arg(short, long, default_value = "")]
    pub subject: String,
    /// Message body
    #[arg(short, long, conflicts_with = "body_file")]
    pub body: Option<String>,
    /// Read the message body from a file, or '-' for stdin
    #[arg(long)]
    pub body_file: Option<PathBuf>,
    /// Extra header as 'Name: value', repeat for more
    #[arg(long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected 'Name: value', got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing header name in {raw:?}"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_send_arguments() {
        let cli = Cli::try_parse_from([
            "postwire",
            "send",
            "--to",
            "a@example.com",
            "--to",
            "b@example.com",
            "--subject",
            "Hi",
            "--body",
            "Hello",
            "--header",
            "X-Mailer: postwire",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        let Commands::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.to, vec!["a@example.com", "b@example.com"]);
        assert_eq!(args.subject, "Hi");
        assert_eq!(args.body.as_deref(), Some("Hello"));
        assert_eq!(
            args.headers,
            vec![("X-Mailer".to_string(), "postwire".to_string())]
        );
    }

    #[test]
    fn test_send_requires_recipient() {
        assert!(Cli::try_parse_from(["postwire", "send", "--body", "x"]).is_err());
    }

    #[test]
    fn test_body_sources_conflict() {
        let parsed = Cli::try_parse_from([
            "postwire", "send", "--to", "a@b", "--body", "x", "--body-file", "f",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Reply-To: ann@example.com").unwrap(),
            ("Reply-To".to_string(), "ann@example.com".to_string())
        );
        assert!(parse_header("no colon").is_err());
        assert!(parse_header(": value").is_err());
    }
}
