//! Authenticated entry points consumed by a request-routing layer.
//!
//! Every call verifies the caller's bearer token before the engine is reached. Token
//! issuance lives elsewhere; this module only consumes a [`TokenVerifier`].

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::{
    engine::AggregationEngine,
    error::WeatherError,
    model::{LocationId, WeatherSnapshot},
};

/// Identity extracted from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject: String,
    pub expired: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("Unauthorized")]
    MissingToken,

    #[error("Invalid token")]
    Rejected,

    #[error("Token expired")]
    Expired,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Claims, AccessError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error(transparent)]
    Unauthorized(#[from] AccessError),

    #[error(transparent)]
    Weather(#[from] WeatherError),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            Self::Unauthorized(_) => 401,
            Self::Weather(err) => err.http_status(),
        }
    }
}

/// Engine operations guarded by bearer-token verification.
pub struct WeatherApi<V> {
    engine: Arc<AggregationEngine>,
    verifier: V,
}

impl<V: TokenVerifier> WeatherApi<V> {
    pub fn new(engine: Arc<AggregationEngine>, verifier: V) -> Self {
        Self { engine, verifier }
    }

    /// `authorization` is the raw `Authorization` header value, if any.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<Claims, AccessError> {
        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AccessError::MissingToken)?;

        let claims = self.verifier.verify(token).await?;
        if claims.expired {
            return Err(AccessError::Expired);
        }

        debug!(subject = %claims.subject, "request authenticated");
        Ok(claims)
    }

    pub async fn roster(&self, authorization: Option<&str>) -> Result<Vec<LocationId>, ApiError> {
        self.authenticate(authorization).await?;
        Ok(self.engine.roster().await?)
    }

    pub async fn all_snapshots(
        &self,
        authorization: Option<&str>,
    ) -> Result<Vec<WeatherSnapshot>, ApiError> {
        self.authenticate(authorization).await?;
        Ok(self.engine.get_all().await?)
    }

    pub async fn snapshot(
        &self,
        authorization: Option<&str>,
        id: &LocationId,
    ) -> Result<WeatherSnapshot, ApiError> {
        self.authenticate(authorization).await?;
        Ok(self.engine.get_one(id).await?)
    }
}
