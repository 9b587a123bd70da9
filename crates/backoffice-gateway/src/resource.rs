//! Typed REST resource client
//!
//! Every back-office resource (tables, orders, products, ...) exposes the
//! same shape under its base path: list, fetch by id, create, update, delete
//! and `/buscar` for criteria search, each answering with the standard
//! envelope. [`Resource`] wraps that shape once for any payload type.

use std::fmt::Display;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::gateway::{ApiRequest, Gateway};

/// Client for the resource rooted at `base_path`.
pub struct Resource<T> {
    gateway: Gateway,
    base_path: String,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            base_path: self.base_path.clone(),
            _payload: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Resource<T> {
    pub fn new(gateway: Gateway, base_path: impl Into<String>) -> Self {
        let base_path = base_path.into();
        Self {
            gateway,
            base_path: base_path.trim_end_matches('/').to_string(),
            _payload: PhantomData,
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    fn item_path(&self, id: impl Display) -> String {
        format!("{}/{id}", self.base_path)
    }

    /// All entries. A response without data is an empty list.
    pub async fn list(&self) -> Result<Vec<T>> {
        let response = self.gateway.get(&self.base_path).await?;
        Ok(response.envelope::<Vec<T>>()?.data.unwrap_or_default())
    }

    pub async fn get(&self, id: impl Display) -> Result<T> {
        self.gateway.get(&self.item_path(id)).await?.data()
    }

    pub async fn create<B: Serialize + ?Sized>(&self, body: &B) -> Result<T> {
        self.gateway.post(&self.base_path, body).await?.data()
    }

    pub async fn update<B: Serialize + ?Sized>(&self, id: impl Display, body: &B) -> Result<T> {
        self.gateway.put(&self.item_path(id), body).await?.data()
    }

    pub async fn delete(&self, id: impl Display) -> Result<()> {
        self.gateway.delete(&self.item_path(id)).await?;
        Ok(())
    }

    /// Criteria search on `{base}/buscar`. Criteria with empty values are
    /// left out of the query.
    pub async fn search(&self, criteria: &[(&str, &str)]) -> Result<Vec<T>> {
        let request = criteria
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .fold(
                ApiRequest::get(format!("{}/buscar", self.base_path)),
                |request, (key, value)| request.with_query(*key, *value),
            );
        let response = self.gateway.send(request).await?;
        Ok(response.envelope::<Vec<T>>()?.data.unwrap_or_default())
    }
}
