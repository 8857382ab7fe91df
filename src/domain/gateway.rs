use super::ids::OrderId;
use super::money::Money;
use super::pending::GatewayPayload;
use serde::{Deserialize, Serialize};

/// Handle returned by the gateway when an order is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub order_id: OrderId,
    /// Session key the checkout UI is opened with.
    pub checkout_key: String,
    pub amount: Money,
    pub currency: String,
}

/// How a checkout ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutOutcome {
    Succeeded(GatewayPayload),
    Cancelled,
    Failed(String),
}
