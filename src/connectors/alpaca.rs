// src/connectors/alpaca.rs
use crate::connectors::messages::{
    AlpacaClock, AlpacaErrorBody, AlpacaOrder, AlpacaOrderRequest, AlpacaPosition,
};
use crate::connectors::traits::BrokerGateway;
use crate::error::{ConnectorError, Result};
use crate::types::{MarketClock, Order, OrderResponse, Position};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

const PAPER_URL: &str = "https://paper-api.alpaca.markets";
const LIVE_URL: &str = "https://api.alpaca.markets";

pub struct AlpacaClient {
    api_key: String,
    api_secret: String,
    http_client: Client,
    base_rest_url: String,
}

impl AlpacaClient {
    pub fn new(
        api_key: String,
        api_secret: String,
        paper: bool,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        let base_rest_url = (if paper { PAPER_URL } else { LIVE_URL }).to_string();
        Ok(Self {
            api_key,
            api_secret,
            http_client,
            base_rest_url,
        })
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_rest_url, endpoint);
        self.http_client
            .request(method, url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        let response = req.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(api_error(response).await)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let response = self.send(req).await?;
        Ok(response.json::<T>().await?)
    }
}

async fn api_error(response: Response) -> ConnectorError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<AlpacaErrorBody>(&text) {
        Ok(AlpacaErrorBody {
            code: Some(code),
            message,
        }) => format!("{} (code {})", message, code),
        Ok(body) => body.message,
        Err(_) => text,
    };
    ConnectorError::Api { status, message }
}

#[async_trait]
impl BrokerGateway for AlpacaClient {
    async fn get_clock(&self) -> Result<MarketClock> {
        let clock: AlpacaClock = self.send_json(self.request(Method::GET, "/v2/clock")).await?;
        Ok(clock.into())
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<Position>> {
        let endpoint = format!("/v2/positions/{}", symbol);
        let response = self.request(Method::GET, &endpoint).send().await?;

        // Alpaca answers 404 "position does not exist" for a flat symbol
        if response.status() == StatusCode::NOT_FOUND {
            debug!("No open position for {}", symbol);
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let position: Position = response.json::<AlpacaPosition>().await?.into();
        if position.is_flat() {
            return Ok(None);
        }
        Ok(Some(position))
    }

    async fn submit_order(&self, order: &Order) -> Result<OrderResponse> {
        let body = AlpacaOrderRequest::from(order);
        info!(
            "Sending Order: {} {} {} {} ({:?})",
            body.order_type, body.side, body.qty, body.symbol, order.kind
        );

        let resp: AlpacaOrder = self
            .send_json(self.request(Method::POST, "/v2/orders").json(&body))
            .await?;
        Ok(resp.into())
    }

    async fn get_all_positions(&self) -> Result<Vec<Position>> {
        let positions: Vec<AlpacaPosition> =
            self.send_json(self.request(Method::GET, "/v2/positions")).await?;
        Ok(positions.into_iter().map(Position::from).collect())
    }

    async fn get_open_orders(&self) -> Result<Vec<OrderResponse>> {
        let orders: Vec<AlpacaOrder> = self
            .send_json(
                self.request(Method::GET, "/v2/orders")
                    .query(&[("status", "open"), ("limit", "500")]),
            )
            .await?;
        Ok(orders.into_iter().map(OrderResponse::from).collect())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let endpoint = format!("/v2/orders/{}", order_id);
        self.send(self.request(Method::DELETE, &endpoint)).await?;
        Ok(())
    }
}
