//! Property commands.
//!
//! # Usage
//!
//! ```bash
//! kh property list
//! kh property get 6650a1f2c3
//! kh property update 6650a1f2c3 --price 135 --keep-image https://cdn.example.com/a.jpg --image b.jpg
//! kh property delete 6650a1f2c3
//! ```

use keyhaven_client::KeyhavenClient;
use keyhaven_client::properties::{NewProperty, PropertyUpdate};
use keyhaven_core::PropertyId;

use super::{CliError, print_json, print_stream, require_session};

pub async fn list(client: &KeyhavenClient) -> Result<(), CliError> {
    require_session(client)?;
    print_stream(client.properties().list_stream()).await
}

pub async fn get(client: &KeyhavenClient, id: &PropertyId) -> Result<(), CliError> {
    require_session(client)?;
    print_stream(client.properties().get_stream(id)?).await
}

pub async fn create(client: &KeyhavenClient, property: &NewProperty) -> Result<(), CliError> {
    require_session(client)?;
    let created = client.properties().create(property).await?;
    tracing::info!(property_id = %created.id, "Property created");
    print_json(&created)
}

pub async fn update(
    client: &KeyhavenClient,
    id: &PropertyId,
    update: &PropertyUpdate,
) -> Result<(), CliError> {
    require_session(client)?;
    let response = client.properties().update(id, update).await?;
    print_json(&response)
}

pub async fn delete(client: &KeyhavenClient, id: &PropertyId) -> Result<(), CliError> {
    require_session(client)?;
    let response = client.properties().delete(id).await?;
    print_json(&response)
}
