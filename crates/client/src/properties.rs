//! Property listing and management.
//!
//! Reads go through the response cache, so `list_stream`/`get_stream` can
//! yield a stale value before the fresh one. Writes are multipart forms
//! carrying the text fields plus image files.

use futures::Stream;
use keyhaven_core::{Price, Property, PropertyId};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{ClientError, Result};
use crate::interceptor::Interceptor;
use crate::request::{ApiRequest, Fetched, FilePart, FormData};

/// Form field carrying images of a new property.
const CREATE_IMAGES_FIELD: &str = "images";
/// Form field carrying images added by an update.
const UPDATE_IMAGES_FIELD: &str = "new_images";
/// Form field listing existing image URLs an update keeps.
const KEEP_IMAGES_FIELD: &str = "images";

/// A property to create.
#[derive(Debug, Clone)]
pub struct NewProperty {
    pub title: String,
    pub description: String,
    pub location: String,
    pub price: Price,
    pub available: Option<bool>,
    pub images: Vec<FilePart>,
}

impl NewProperty {
    fn to_form(&self) -> FormData {
        let mut form = FormData::new()
            .text("title", self.title.clone())
            .text("description", self.description.clone())
            .text("location", self.location.clone())
            .text("price", self.price.amount().to_string());
        if let Some(available) = self.available {
            form = form.text("available", available.to_string());
        }
        for image in &self.images {
            form = form.file(CREATE_IMAGES_FIELD, image.clone());
        }
        form
    }
}

/// Changes to an existing property. Unset fields are left as they are.
#[derive(Debug, Clone, Default)]
pub struct PropertyUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub price: Option<Price>,
    pub available: Option<bool>,
    /// Existing image URLs to keep. `None` leaves the image list untouched
    /// unless new images are added.
    pub keep_images: Option<Vec<String>>,
    pub new_images: Vec<FilePart>,
}

impl PropertyUpdate {
    fn to_form(&self) -> FormData {
        let mut form = FormData::new();
        for (name, value) in [
            ("title", &self.title),
            ("description", &self.description),
            ("location", &self.location),
        ] {
            if let Some(value) = value {
                form = form.text(name, value.clone());
            }
        }
        if let Some(price) = &self.price {
            form = form.text("price", price.amount().to_string());
        }
        if let Some(available) = self.available {
            form = form.text("available", available.to_string());
        }
        for url in self.keep_images.iter().flatten() {
            form = form.text(KEEP_IMAGES_FIELD, url.clone());
        }
        for image in &self.new_images {
            form = form.file(UPDATE_IMAGES_FIELD, image.clone());
        }
        form
    }
}

/// Response of `PATCH /properties/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyUpdateResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The full image list after the update, when it changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

/// Response of `DELETE /properties/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PropertyId>,
}

/// Property operations.
#[derive(Debug, Clone)]
pub struct PropertyService {
    interceptor: Interceptor,
}

impl PropertyService {
    #[must_use]
    pub const fn new(interceptor: Interceptor) -> Self {
        Self { interceptor }
    }

    /// Fetch every property visible to the current user.
    ///
    /// # Errors
    ///
    /// Returns the `ClientError` of the exchange.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Property>> {
        let request = ApiRequest::get(self.collection());
        Ok(self.interceptor.execute_json(request).await?.value)
    }

    /// Stream the property list: a cached copy first when available, then
    /// the fresh list.
    pub fn list_stream(&self) -> impl Stream<Item = Result<Fetched<Vec<Property>>>> + Send + 'static {
        self.interceptor.stream_json(ApiRequest::get(self.collection()))
    }

    /// Fetch a single property.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for a blank id.
    #[instrument(skip(self), fields(property_id = %id))]
    pub async fn get(&self, id: &PropertyId) -> Result<Property> {
        let request = ApiRequest::get(self.item_path(id)?);
        Ok(self.interceptor.execute_json(request).await?.value)
    }

    /// Stream a single property: cached copy first, then the fresh one.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for a blank id, before any stream
    /// is created.
    pub fn get_stream(
        &self,
        id: &PropertyId,
    ) -> Result<impl Stream<Item = Result<Fetched<Property>>> + Send + 'static> {
        let request = ApiRequest::get(self.item_path(id)?);
        Ok(self.interceptor.stream_json(request))
    }

    /// Create a property with its images.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` if the title or location is blank or
    /// the price is not positive.
    #[instrument(skip(self, property), fields(title = %property.title, images = property.images.len()))]
    pub async fn create(&self, property: &NewProperty) -> Result<Property> {
        if property.title.trim().is_empty() {
            return Err(ClientError::Validation("property title is required".to_string()));
        }
        if property.location.trim().is_empty() {
            return Err(ClientError::Validation("property location is required".to_string()));
        }
        if !property.price.is_positive() {
            return Err(ClientError::Validation("property price must be positive".to_string()));
        }
        let request = ApiRequest::post(self.collection()).form(property.to_form());
        let created: Property = self.interceptor.execute_json(request).await?.value;
        self.interceptor.cache().invalidate(&self.collection()).await;
        Ok(created)
    }

    /// Update a property, optionally adding images.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for a blank id, a price that is not
    /// positive, or an update that changes nothing.
    #[instrument(skip(self, update), fields(property_id = %id))]
    pub async fn update(&self, id: &PropertyId, update: &PropertyUpdate) -> Result<PropertyUpdateResponse> {
        let path = self.item_path(id)?;
        if update.price.is_some_and(|price| !price.is_positive()) {
            return Err(ClientError::Validation("property price must be positive".to_string()));
        }
        let form = update.to_form();
        if form.is_empty() {
            return Err(ClientError::Validation("nothing to update".to_string()));
        }
        let request = ApiRequest::patch(path.clone()).form(form);
        let response = self.interceptor.execute_json(request).await?.value;
        self.interceptor.cache().invalidate(&path).await;
        Ok(response)
    }

    /// Delete a property.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for a blank id.
    #[instrument(skip(self), fields(property_id = %id))]
    pub async fn delete(&self, id: &PropertyId) -> Result<DeleteResponse> {
        let path = self.item_path(id)?;
        let response = self
            .interceptor
            .execute_json(ApiRequest::delete(path.clone()))
            .await?
            .value;
        self.interceptor.cache().invalidate(&path).await;
        self.interceptor.cache().invalidate(&self.collection()).await;
        Ok(response)
    }

    fn collection(&self) -> String {
        self.interceptor.config().endpoints.properties.clone()
    }

    fn item_path(&self, id: &PropertyId) -> Result<String> {
        if id.is_blank() {
            return Err(ClientError::Validation("property id is required".to_string()));
        }
        Ok(format!("{}/{}", self.collection(), id.as_str().trim()))
    }
}
