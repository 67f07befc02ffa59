//! Mail submission runs.
//!
//! Maps the command-line operations onto one SMTP session each.

use anyhow::{Context, Result};
use postwire_mime::EmailMessage;
use postwire_smtp::{RecipientOutcomes, Security, Session};
use tracing::{info, warn};

use crate::config::ClientConfig;

/// Recipients the server refused, reported after an otherwise successful
/// submission.
pub type Refused = RecipientOutcomes;

/// Connects, upgrades when configured and logs in when credentials exist.
async fn open(config: &ClientConfig) -> Result<Session> {
    let session_config = config.session_config();
    let host = session_config.host.clone();
    let security = session_config.security;

    let mut session = Session::new(session_config);
    let greeting = session
        .connect()
        .await
        .with_context(|| format!("failed to connect to {host}"))?;
    info!("Greeting: {greeting}");

    if security == Security::StartTls {
        session.upgrade_security().await.context("STARTTLS failed")?;
    }

    if let Some((user, password)) = config.credentials() {
        session
            .login(user, password)
            .await
            .with_context(|| format!("authentication as {user} failed"))?;
    } else {
        session.identify().await.context("HELO failed")?;
    }
    Ok(session)
}

/// Sends `message` and returns the refused recipients.
pub async fn send(config: &ClientConfig, message: &EmailMessage) -> Result<Refused> {
    let bytes = message.to_bytes().context("failed to build message")?;
    let recipients = message.recipients();

    let mut session = open(config).await?;
    let refused = match session
        .send_mail(message.sender(), recipients.as_slice(), &bytes)
        .await
    {
        Ok(refused) => refused,
        Err(err) => {
            session.close();
            return Err(err).context("submission failed");
        }
    };
    // The message is already accepted; a failed QUIT must not read as a
    // failed send.
    if let Err(err) = session.quit().await {
        warn!(error = %err, "QUIT failed after the message was accepted");
    }

    info!(
        "Delivered to {} of {} recipients",
        recipients.len() - refused.len(),
        recipients.len()
    );
    Ok(refused)
}

/// Opens and authenticates a session, then quits.
pub async fn check(config: &ClientConfig) -> Result<()> {
    let mut session = open(config).await?;
    let encrypted = session.is_encrypted();
    session.quit().await.context("QUIT failed")?;
    info!("Server check passed (encrypted: {encrypted})");
    Ok(())
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
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Accepts one client and plays a minimal server that hangs up on QUIT
    /// without answering.
    async fn serve_once(listener: TcpListener) -> Vec<String> {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();
        let mut seen = Vec::new();

        write.write_all(b"220 test ESMTP\r\n").await.unwrap();
        let mut in_data = false;
        while let Some(line) = lines.next_line().await.unwrap() {
            if in_data {
                if line == "." {
                    in_data = false;
                    write.write_all(b"250 queued\r\n").await.unwrap();
                }
                continue;
            }
            let verb = line.split(' ').next().unwrap_or_default().to_string();
            seen.push(verb.clone());
            let reply: &[u8] = match verb.as_str() {
                "DATA" => {
                    in_data = true;
                    b"354 go ahead\r\n"
                }
                "QUIT" => break,
                _ => b"250 ok\r\n",
            };
            write.write_all(reply).await.unwrap();
        }
        seen
    }

    fn local_config(port: u16) -> ClientConfig {
        ClientConfig::parse(&format!(
            "[server]\nhost = \"127.0.0.1\"\nport = {port}\nsecurity = \"none\"\n\
             timeout_secs = 5\nlocal_hostname = \"client.test\"\n"
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_succeeds_when_quit_goes_unanswered() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(serve_once(listener));

        let message = EmailMessage::new("a@example.com", "b@example.com", "Hi", "Hello");
        let refused = send(&local_config(port), &message).await.unwrap();

        assert!(refused.is_empty());
        let verbs = server.await.unwrap();
        assert_eq!(verbs, vec!["HELO", "MAIL", "RCPT", "DATA", "QUIT"]);
    }
}
