//! In-memory purchase gateway for development and testing.

use super::{GatewayError, GatewayResult, PurchaseGateway, PurchaseReceipt, PurchaseRequest};
use crate::coupon::InMemoryCouponBook;
use crate::session::Session;
use crate::types::TicketId;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock purchase gateway
///
/// Confirms every purchase unless told to fail. When a coupon book is
/// attached, a purchase carrying a coupon code redeems it there, so usage
/// counts move exactly as they would on the backend. Clones share the list of
/// recorded purchases.
#[derive(Clone, Debug, Default)]
pub struct MockPurchaseGateway {
    coupons: Option<InMemoryCouponBook>,
    failure: Option<GatewayError>,
    latency: Duration,
    purchases: Arc<Mutex<Vec<PurchaseRequest>>>,
}

impl MockPurchaseGateway {
    /// Creates a gateway that confirms every purchase
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Redeems applied coupons against `book`
    #[must_use]
    pub fn with_coupons(mut self, book: InMemoryCouponBook) -> Self {
        self.coupons = Some(book);
        self
    }

    /// Fails every purchase with `error`
    #[must_use]
    pub fn failing(mut self, error: GatewayError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Delays every purchase by `latency`
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Purchases confirmed so far
    #[must_use]
    pub fn purchases(&self) -> Vec<PurchaseRequest> {
        self.purchases
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn confirm(&self, request: PurchaseRequest) -> GatewayResult<PurchaseReceipt> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        if let (Some(book), Some(code)) = (&self.coupons, &request.coupon_code) {
            // A coupon that lapsed after validation is not redeemed; the sale
            // still goes through.
            if let Err(rejection) = book.redeem(code, &request.event_id) {
                tracing::warn!(code = %code, %rejection, "Coupon not redeemed at purchase");
            }
        }

        let ticket_id = TicketId::generate();
        tracing::info!(
            ticket_id = %ticket_id,
            event_id = %request.event_id,
            total = %request.total_amount,
            "Mock purchase confirmed"
        );

        if let Ok(mut purchases) = self.purchases.lock() {
            purchases.push(request);
        }

        Ok(PurchaseReceipt {
            ticket_id,
            message: Some("Tickets purchased successfully".to_string()),
        })
    }
}

impl PurchaseGateway for MockPurchaseGateway {
    fn purchase(
        &self,
        _session: &Session,
        request: PurchaseRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<PurchaseReceipt>> + Send>> {
        let gateway = self.clone();

        Box::pin(async move {
            if !gateway.latency.is_zero() {
                tokio::time::sleep(gateway.latency).await;
            }
            gateway.confirm(request)
        })
    }
}
