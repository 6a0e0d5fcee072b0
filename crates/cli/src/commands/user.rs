//! User account commands.

use keyhaven_client::auth::UserUpdate;
use keyhaven_client::{ClientError, KeyhavenClient};
use keyhaven_core::UserId;

use super::{CliError, print_json, require_session};

pub async fn get(client: &KeyhavenClient, id: Option<UserId>) -> Result<(), CliError> {
    require_session(client)?;
    let id = resolve_id(client, id)?;
    let user = client.auth().get_user(&id).await?;
    print_json(&user)
}

pub async fn update(
    client: &KeyhavenClient,
    id: Option<UserId>,
    update: &UserUpdate,
) -> Result<(), CliError> {
    require_session(client)?;
    let id = resolve_id(client, id)?;
    let response = client.auth().update_user(&id, update).await?;
    print_json(&response)
}

/// Use the explicit id, or fall back to the signed-in user.
fn resolve_id(client: &KeyhavenClient, id: Option<UserId>) -> Result<UserId, CliError> {
    if let Some(id) = id {
        return Ok(id);
    }
    client
        .auth()
        .current_user()?
        .map(|user| user.id)
        .ok_or_else(|| ClientError::Validation("no current user; pass a user id".to_string()).into())
}
