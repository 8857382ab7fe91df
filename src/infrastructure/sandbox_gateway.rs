use crate::domain::gateway::{CheckoutOutcome, GatewayOrder};
use crate::domain::ids::{OrderId, PaymentId};
use crate::domain::money::{Amount, Money};
use crate::domain::pending::{GatewayPayload, PaymentIntent};
use crate::domain::ports::PaymentGateway;
use crate::domain::signature::GatewaySignature;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// How the next sandbox checkout ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedCheckout {
    Approve,
    Cancel,
    Decline,
    /// Reports success with a signature that will not verify.
    TamperSignature,
}

impl FromStr for ScriptedCheckout {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "approve" | "success" => Ok(ScriptedCheckout::Approve),
            "cancel" => Ok(ScriptedCheckout::Cancel),
            "decline" => Ok(ScriptedCheckout::Decline),
            "tamper" => Ok(ScriptedCheckout::TamperSignature),
            other => Err(PaymentError::ValidationError(format!(
                "Unknown checkout outcome '{}'",
                other
            ))),
        }
    }
}

/// In-process stand-in for the payment gateway.
///
/// Orders get random ids; checkouts play back a queue of scripted outcomes, falling back to
/// `default_outcome` when the queue is empty. Successful results are signed with the shared
/// secret exactly like the real gateway does.
#[derive(Clone)]
pub struct SandboxGateway {
    signer: GatewaySignature,
    default_outcome: ScriptedCheckout,
    script: Arc<Mutex<VecDeque<ScriptedCheckout>>>,
    orders: Arc<Mutex<HashMap<OrderId, GatewayOrder>>>,
}

impl SandboxGateway {
    pub fn new(signer: GatewaySignature) -> Self {
        Self {
            signer,
            default_outcome: ScriptedCheckout::Approve,
            script: Arc::new(Mutex::new(VecDeque::new())),
            orders: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_default_outcome(mut self, outcome: ScriptedCheckout) -> Self {
        self.default_outcome = outcome;
        self
    }

    /// Queues the outcome of the next checkout.
    pub async fn push_outcome(&self, outcome: ScriptedCheckout) {
        self.script.lock().await.push_back(outcome);
    }

    pub async fn orders_created(&self) -> usize {
        self.orders.lock().await.len()
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_order(
        &self,
        amount: Amount,
        currency: &str,
        intent: &PaymentIntent,
    ) -> Result<GatewayOrder> {
        let order = GatewayOrder {
            order_id: OrderId::new(format!("order_{}", Uuid::new_v4().simple())),
            checkout_key: format!("chk_{}", Uuid::new_v4().simple()),
            amount: Money::from(amount),
            currency: currency.to_string(),
        };
        info!(
            order_id = %order.order_id,
            enrollment_id = %intent.enrollment_id,
            amount = %order.amount,
            currency,
            "Sandbox order created"
        );
        self.orders
            .lock()
            .await
            .insert(order.order_id.clone(), order.clone());
        Ok(order)
    }

    async fn await_result(&self, order: &GatewayOrder) -> Result<CheckoutOutcome> {
        if !self.orders.lock().await.contains_key(&order.order_id) {
            return Err(PaymentError::Gateway(format!(
                "Unknown order {}",
                order.order_id
            )));
        }
        let outcome = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or(self.default_outcome);
        debug!(order_id = %order.order_id, ?outcome, "Sandbox checkout finished");

        let payment_id = PaymentId::new(format!("pay_{}", Uuid::new_v4().simple()));
        Ok(match outcome {
            ScriptedCheckout::Approve => CheckoutOutcome::Succeeded(GatewayPayload {
                signature: self.signer.sign(&order.order_id, &payment_id)?,
                order_id: order.order_id.clone(),
                payment_id,
            }),
            ScriptedCheckout::TamperSignature => CheckoutOutcome::Succeeded(GatewayPayload {
                signature: "0".repeat(64),
                order_id: order.order_id.clone(),
                payment_id,
            }),
            ScriptedCheckout::Cancel => CheckoutOutcome::Cancelled,
            ScriptedCheckout::Decline => CheckoutOutcome::Failed("card declined".to_string()),
        })
    }
}
