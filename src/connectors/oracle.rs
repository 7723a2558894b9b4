// src/connectors/oracle.rs
use crate::connectors::messages::PredictionResponse;
use crate::connectors::traits::PriceOracle;
use crate::error::{ConnectorError, Result};
use crate::types::PricePoint;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Client for the prediction service (`/predict/{symbol}` and `/health`).
pub struct HttpPriceOracle {
    http_client: Client,
    base_url: Url,
}

impl HttpPriceOracle {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http_client: Client::builder().timeout(timeout).build()?,
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn get(&self, symbol: &str) -> Result<PricePoint> {
        let url = self.endpoint(&format!("predict/{}", symbol))?;
        let response = self.http_client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ConnectorError::Api {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: PredictionResponse = response.json().await?;
        Ok(PricePoint {
            current: body.last_close,
            predicted: body.predicted_next_close,
        })
    }

    async fn is_available(&self) -> Result<bool> {
        let url = self.endpoint("health")?;
        let status = self.http_client.get(url).send().await?.status();
        debug!("Oracle health check: {}", status);
        Ok(status.is_success())
    }
}
