//! Keyhaven CLI - Session and property management from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Sign in: request an OTP, then verify it
//! kh auth login -e ada@example.com
//! kh auth verify -e ada@example.com -o 123456
//!
//! # List properties
//! kh property list
//!
//! # Create a property with photos
//! kh property create -t "Harbour Loft" -l Lisbon -p 120.50 --image front.jpg --image kitchen.jpg
//! ```
//!
//! # Commands
//!
//! - `auth` - Login, registration, OTP, token refresh, logout, status
//! - `user` - View and update user accounts
//! - `property` - List, view, create, update and delete properties
//!
//! Configuration comes from `KEYHAVEN_*` environment variables or a `.env`
//! file; see `keyhaven_client::config`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use keyhaven_client::KeyhavenClient;
use keyhaven_core::{Email, Price, PropertyId, Role, UserId};
use tracing_subscriber::prelude::*;

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "kh")]
#[command(author, version, about = "Keyhaven property-management CLI")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and manage the local session
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// View and update user accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage properties
    Property {
        #[command(subcommand)]
        action: PropertyAction,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Request a login OTP by email or phone
    Login {
        #[arg(short, long)]
        email: String,
    },
    /// Create an account
    Register {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        phone: String,

        #[arg(short, long)]
        email: Email,

        /// Account role (`host`, `manager`, `cleaner`)
        #[arg(short, long, default_value = "host")]
        role: Role,
    },
    /// Send a new OTP to an existing account
    RequestOtp {
        #[arg(short, long)]
        email: Email,
    },
    /// Verify an OTP and start a session
    Verify {
        #[arg(short, long)]
        email: Email,

        #[arg(short, long)]
        otp: String,
    },
    /// Exchange the stored refresh token for a new pair
    Refresh,
    /// Clear the local session and response cache
    Logout,
    /// Show whether a session exists
    Status,
}

#[derive(Subcommand)]
enum UserAction {
    /// Fetch a user (defaults to the signed-in user)
    Get { id: Option<UserId> },
    /// Update fields of a user (defaults to the signed-in user)
    Update {
        #[arg(long)]
        id: Option<UserId>,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        email: Option<Email>,

        #[arg(short, long)]
        phone: Option<String>,

        #[arg(short, long)]
        role: Option<Role>,
    },
}

#[derive(Subcommand)]
enum PropertyAction {
    /// List properties
    List,
    /// Show a single property
    Get { id: PropertyId },
    /// Create a property
    Create {
        #[arg(short, long)]
        title: String,

        #[arg(short, long, default_value = "")]
        description: String,

        #[arg(short, long)]
        location: String,

        #[arg(short, long)]
        price: Price,

        #[arg(long)]
        available: Option<bool>,

        /// Image file to upload (repeatable)
        #[arg(long = "image")]
        images: Vec<PathBuf>,
    },
    /// Update a property
    Update {
        id: PropertyId,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        location: Option<String>,

        #[arg(short, long)]
        price: Option<Price>,

        #[arg(long)]
        available: Option<bool>,

        /// Existing image URL to keep (repeatable)
        #[arg(long = "keep-image")]
        keep_images: Vec<String>,

        /// New image file to upload (repeatable)
        #[arg(long = "image")]
        images: Vec<PathBuf>,
    },
    /// Delete a property
    Delete { id: PropertyId },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json);

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(e.exit_code());
    }
}

fn init_tracing(json: bool) {
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "keyhaven_client=info,keyhaven_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let client = KeyhavenClient::from_env()?;

    match cli.command {
        Commands::Auth { action } => match action {
            AuthAction::Login { email } => commands::auth::login(&client, email).await?,
            AuthAction::Register {
                name,
                phone,
                email,
                role,
            } => commands::auth::register(&client, name, phone, &email, role).await?,
            AuthAction::RequestOtp { email } => commands::auth::request_otp(&client, &email).await?,
            AuthAction::Verify { email, otp } => commands::auth::verify(&client, &email, otp).await?,
            AuthAction::Refresh => commands::auth::refresh(&client).await?,
            AuthAction::Logout => commands::auth::logout(&client)?,
            AuthAction::Status => commands::auth::status(&client)?,
        },
        Commands::User { action } => match action {
            UserAction::Get { id } => commands::user::get(&client, id).await?,
            UserAction::Update {
                id,
                name,
                email,
                phone,
                role,
            } => {
                let update = keyhaven_client::auth::UserUpdate {
                    name,
                    email: email.map(String::from),
                    phone,
                    role,
                };
                commands::user::update(&client, id, &update).await?;
            }
        },
        Commands::Property { action } => match action {
            PropertyAction::List => commands::property::list(&client).await?,
            PropertyAction::Get { id } => commands::property::get(&client, &id).await?,
            PropertyAction::Create {
                title,
                description,
                location,
                price,
                available,
                images,
            } => {
                let property = keyhaven_client::properties::NewProperty {
                    title,
                    description,
                    location,
                    price,
                    available,
                    images: commands::read_images(&images).await?,
                };
                commands::property::create(&client, &property).await?;
            }
            PropertyAction::Update {
                id,
                title,
                description,
                location,
                price,
                available,
                keep_images,
                images,
            } => {
                let update = keyhaven_client::properties::PropertyUpdate {
                    title,
                    description,
                    location,
                    price,
                    available,
                    keep_images: (!keep_images.is_empty()).then_some(keep_images),
                    new_images: commands::read_images(&images).await?,
                };
                commands::property::update(&client, &id, &update).await?;
            }
            PropertyAction::Delete { id } => commands::property::delete(&client, &id).await?,
        },
    }
    Ok(())
}
