//! Command implementations and shared output helpers.

use std::path::PathBuf;

use futures::{Stream, StreamExt};
use keyhaven_client::request::{Fetched, FilePart};
use keyhaven_client::{ClientError, GuardOutcome, KeyhavenClient};
use serde::Serialize;
use thiserror::Error;

pub mod auth;
pub mod property;
pub mod user;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The command needs a session.
    #[error("Not logged in. Run `kh auth login` then `kh auth verify` (redirect: {0})")]
    NotLoggedIn(String),

    #[error("Could not read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not render output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code for this error class.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::NotLoggedIn(_) => 2,
            Self::Client(e) if e.is_auth_failure() => 2,
            Self::Client(ClientError::Validation(_)) | Self::ReadFile { .. } => 3,
            _ => 1,
        }
    }
}

/// Fail unless a session exists.
pub fn require_session(client: &KeyhavenClient) -> Result<(), CliError> {
    match client.guard().check()? {
        GuardOutcome::Allow => Ok(()),
        GuardOutcome::RedirectTo(route) => Err(CliError::NotLoggedIn(route)),
    }
}

/// Print a value as pretty JSON on stdout.
#[allow(clippy::print_stdout)]
pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print every value of a client stream.
///
/// The response cache lives in memory, so a single `kh` invocation only ever
/// sees network results. A `(stale)` marker line is printed only for values
/// served from a cache populated earlier in the same process.
#[allow(clippy::print_stdout)]
pub async fn print_stream<T, S>(stream: S) -> Result<(), CliError>
where
    T: Serialize,
    S: Stream<Item = keyhaven_client::Result<Fetched<T>>>,
{
    let mut stream = std::pin::pin!(stream);
    while let Some(fetched) = stream.next().await {
        println!("{}", render_fetched(&fetched?)?);
    }
    Ok(())
}

fn render_fetched<T: Serialize>(fetched: &Fetched<T>) -> Result<String, CliError> {
    let json = serde_json::to_string_pretty(&fetched.value)?;
    if fetched.is_stale() {
        Ok(format!("(stale)\n{json}"))
    } else {
        Ok(json)
    }
}

/// Load image files for upload.
pub async fn read_images(paths: &[PathBuf]) -> Result<Vec<FilePart>, CliError> {
    let mut parts = Vec::with_capacity(paths.len());
    for path in paths {
        let part = FilePart::from_path(path)
            .await
            .map_err(|source| CliError::ReadFile {
                path: path.clone(),
                source,
            })?;
        parts.push(part);
    }
    Ok(parts)
}
