//! Session commands.
//!
//! # Usage
//!
//! ```bash
//! kh auth register -n "Ada Lovelace" -p 5550100 -e ada@example.com -r host
//! kh auth login -e ada@example.com
//! kh auth verify -e ada@example.com -o 123456
//! kh auth status
//! kh auth logout
//! ```

use keyhaven_client::KeyhavenClient;
use keyhaven_client::auth::{LoginRequest, OtpRequest, RegisterRequest, VerifyOtpRequest};
use keyhaven_core::{Email, Role};
use serde_json::json;

use super::{CliError, print_json};

pub async fn login(client: &KeyhavenClient, email: String) -> Result<(), CliError> {
    let response = client.auth().login(&LoginRequest { email }).await?;
    print_json(&response)
}

pub async fn register(
    client: &KeyhavenClient,
    name: String,
    phone: String,
    email: &Email,
    role: Role,
) -> Result<(), CliError> {
    let request = RegisterRequest {
        name,
        phone,
        email: email.to_string(),
        role,
    };
    let response = client.auth().register(&request).await?;
    print_json(&response)
}

pub async fn request_otp(client: &KeyhavenClient, email: &Email) -> Result<(), CliError> {
    let request = OtpRequest {
        email: email.to_string(),
    };
    let response = client.auth().request_otp(&request).await?;
    print_json(&response)
}

pub async fn verify(client: &KeyhavenClient, email: &Email, otp: String) -> Result<(), CliError> {
    let request = VerifyOtpRequest {
        email: email.to_string(),
        otp,
    };
    let session = client.auth().verify_otp(&request).await?;
    tracing::info!(user_id = %session.user.id, "Signed in");
    print_json(&session.user)
}

pub async fn refresh(client: &KeyhavenClient) -> Result<(), CliError> {
    client.auth().refresh_stored().await?;
    tracing::info!("Session refreshed");
    print_json(&json!({ "refreshed": true }))
}

pub fn logout(client: &KeyhavenClient) -> Result<(), CliError> {
    client.auth().logout()?;
    tracing::info!("Signed out");
    Ok(())
}

pub fn status(client: &KeyhavenClient) -> Result<(), CliError> {
    let auth = client.auth();
    print_json(&json!({
        "logged_in": auth.is_logged_in()?,
        "user": auth.current_user()?,
    }))
}
