// src/testing.rs
//! In-memory broker, oracle and sink used by the unit tests.

use crate::connectors::traits::{BrokerGateway, PriceOracle};
use crate::error::{ConnectorError, Result};
use crate::notify::NotificationSink;
use crate::types::{MarketClock, Order, OrderResponse, Position, PricePoint};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Hook = Box<dyn FnOnce() + Send>;

fn api_error(message: &str) -> ConnectorError {
    ConnectorError::Api {
        status: 500,
        message: message.to_string(),
    }
}

pub struct FakeOracle {
    unhealthy_probes: AtomicU32,
    health_calls: AtomicU32,
    price_calls: AtomicU32,
    price: Mutex<PricePoint>,
    fail_prices: AtomicBool,
    on_price: Mutex<Option<Hook>>,
}

impl FakeOracle {
    pub fn new(current: Option<Decimal>, predicted: Option<Decimal>) -> Self {
        Self {
            unhealthy_probes: AtomicU32::new(0),
            health_calls: AtomicU32::new(0),
            price_calls: AtomicU32::new(0),
            price: Mutex::new(PricePoint { current, predicted }),
            fail_prices: AtomicBool::new(false),
            on_price: Mutex::new(None),
        }
    }

    /// Runs `hook` once, inside the next price request.
    pub fn on_next_price(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_price.lock().unwrap() = Some(Box::new(hook));
    }

    /// Health probe fails `n` times before succeeding.
    pub fn unavailable_for(n: u32) -> Self {
        let oracle = Self::new(None, None);
        oracle.unhealthy_probes.store(n, Ordering::SeqCst);
        oracle
    }

    pub fn fail_prices(&self, fail: bool) {
        self.fail_prices.store(fail, Ordering::SeqCst);
    }

    pub fn health_calls(&self) -> u32 {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub fn price_calls(&self) -> u32 {
        self.price_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceOracle for FakeOracle {
    async fn get(&self, _symbol: &str) -> Result<PricePoint> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        let hook = self.on_price.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        if self.fail_prices.load(Ordering::SeqCst) {
            return Err(api_error("model exploded"));
        }
        Ok(*self.price.lock().unwrap())
    }

    async fn is_available(&self) -> Result<bool> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.unhealthy_probes.load(Ordering::SeqCst);
        if remaining == 0 {
            return Ok(true);
        }
        if remaining != u32::MAX {
            self.unhealthy_probes.store(remaining - 1, Ordering::SeqCst);
        }
        Err(api_error("connection refused"))
    }
}

pub struct FakeBroker {
    market_open: AtomicBool,
    position: Mutex<Option<Position>>,
    fail_position: AtomicBool,
    fail_submit: AtomicBool,
    fail_cancel_id: Mutex<Option<String>>,
    submitted: Mutex<Vec<Order>>,
    open_orders: Mutex<Vec<OrderResponse>>,
    cancelled: Mutex<Vec<String>>,
    clock_calls: AtomicU32,
    clock_delay: Mutex<Option<Duration>>,
}

impl Default for FakeBroker {
    fn default() -> Self {
        Self {
            market_open: AtomicBool::new(true),
            position: Mutex::new(None),
            fail_position: AtomicBool::new(false),
            fail_submit: AtomicBool::new(false),
            fail_cancel_id: Mutex::new(None),
            submitted: Mutex::new(Vec::new()),
            open_orders: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            clock_calls: AtomicU32::new(0),
            clock_delay: Mutex::new(None),
        }
    }
}

impl FakeBroker {
    pub fn with_position(symbol: &str, quantity: Decimal, entry_price: Decimal) -> Self {
        let broker = Self::default();
        *broker.position.lock().unwrap() = Some(Position {
            symbol: symbol.to_string(),
            quantity,
            entry_price,
        });
        broker
    }

    pub fn set_market_open(&self, open: bool) {
        self.market_open.store(open, Ordering::SeqCst);
    }

    /// The next clock request stalls for `delay` before answering.
    pub fn stall_next_clock(&self, delay: Duration) {
        *self.clock_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_position(&self, fail: bool) {
        self.fail_position.store(fail, Ordering::SeqCst);
    }

    pub fn fail_submit(&self, fail: bool) {
        self.fail_submit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_cancel(&self, order_id: &str) {
        *self.fail_cancel_id.lock().unwrap() = Some(order_id.to_string());
    }

    pub fn add_open_order(&self, id: &str, symbol: &str) {
        self.open_orders.lock().unwrap().push(OrderResponse {
            id: id.to_string(),
            symbol: symbol.to_string(),
            status: "new".to_string(),
        });
    }

    pub fn submitted(&self) -> Vec<Order> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    pub fn clock_calls(&self) -> u32 {
        self.clock_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerGateway for FakeBroker {
    async fn get_clock(&self) -> Result<MarketClock> {
        self.clock_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.clock_delay.lock().unwrap().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(MarketClock {
            is_open: self.market_open.load(Ordering::SeqCst),
            next_open: None,
        })
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<Position>> {
        if self.fail_position.load(Ordering::SeqCst) {
            return Err(api_error("gateway timeout"));
        }
        let position = self.position.lock().unwrap().clone();
        Ok(position.filter(|p| p.symbol == symbol && !p.is_flat()))
    }

    async fn submit_order(&self, order: &Order) -> Result<OrderResponse> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(api_error("insufficient buying power"));
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(order.clone());
        Ok(OrderResponse {
            id: format!("ord-{}", submitted.len()),
            symbol: order.symbol.clone(),
            status: "accepted".to_string(),
        })
    }

    async fn get_all_positions(&self) -> Result<Vec<Position>> {
        Ok(self.position.lock().unwrap().iter().cloned().collect())
    }

    async fn get_open_orders(&self) -> Result<Vec<OrderResponse>> {
        Ok(self.open_orders.lock().unwrap().clone())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        if self.fail_cancel_id.lock().unwrap().as_deref() == Some(order_id) {
            return Err(api_error("order not cancelable"));
        }
        self.cancelled.lock().unwrap().push(order_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|l| l.contains(needle))
    }
}

impl NotificationSink for RecordingSink {
    fn publish(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}
