use super::ids::{OrderId, PaymentId};
use crate::error::{PaymentError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Shared-secret signature scheme used by the gateway:
/// `hex(HMAC-SHA256(secret, "{order_id}|{payment_id}"))`.
#[derive(Clone)]
pub struct GatewaySignature {
    secret: String,
}

impl GatewaySignature {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self, order_id: &OrderId, payment_id: &PaymentId) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).map_err(|e| {
            PaymentError::InternalError(Box::new(std::io::Error::other(e.to_string())))
        })?;
        mac.update(order_id.as_str().as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_str().as_bytes());
        Ok(mac)
    }

    pub fn sign(&self, order_id: &OrderId, payment_id: &PaymentId) -> Result<String> {
        let mac = self.mac(order_id, payment_id)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Constant-time check of a hex signature.
    pub fn verify(&self, order_id: &OrderId, payment_id: &PaymentId, signature: &str) -> bool {
        let (Ok(expected), Ok(mac)) = (hex::decode(signature.trim()), self.mac(order_id, payment_id))
        else {
            return false;
        };
        mac.verify_slice(&expected).is_ok()
    }
}

impl std::fmt::Debug for GatewaySignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySignature")
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let scheme = GatewaySignature::new("test_secret_key");
        let order = OrderId::new("order_1");
        let payment = PaymentId::new("pay_1");

        let signature = scheme.sign(&order, &payment).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(scheme.verify(&order, &payment, &signature));
    }

    #[test]
    fn test_signature_bound_to_order_and_payment() {
        let scheme = GatewaySignature::new("test_secret_key");
        let signature = scheme
            .sign(&OrderId::new("order_1"), &PaymentId::new("pay_1"))
            .unwrap();

        assert!(!scheme.verify(&OrderId::new("order_2"), &PaymentId::new("pay_1"), &signature));
        assert!(!scheme.verify(&OrderId::new("order_1"), &PaymentId::new("pay_2"), &signature));
    }

    #[test]
    fn test_wrong_secret_or_garbage_rejected() {
        let order = OrderId::new("order_1");
        let payment = PaymentId::new("pay_1");
        let signature = GatewaySignature::new("a").sign(&order, &payment).unwrap();

        assert!(!GatewaySignature::new("b").verify(&order, &payment, &signature));
        assert!(!GatewaySignature::new("a").verify(&order, &payment, "not-hex"));
    }
}
