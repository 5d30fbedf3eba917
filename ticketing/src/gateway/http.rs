//! HTTP client for the ticketing backend.

use super::{
    CouponValidator, GatewayError, GatewayResult, PurchaseGateway, PurchaseReceipt,
    PurchaseRequest,
};
use crate::config::BackendConfig;
use crate::coupon::{CouponRejection, CouponVerdict};
use crate::session::Session;
use crate::types::{DiscountPercentage, Event, EventId, UserProfile};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    access_token: String,
    user: UserProfile,
}

#[derive(Serialize)]
struct ValidateCouponRequest<'a> {
    coupon_code: &'a str,
    event_id: &'a EventId,
}

#[derive(Deserialize)]
struct ValidateCouponResponse {
    valid: bool,
    #[serde(default)]
    discount_percentage: Option<DiscountPercentage>,
    #[serde(default)]
    message: Option<String>,
}

impl ValidateCouponResponse {
    fn into_verdict(self) -> GatewayResult<CouponVerdict> {
        if !self.valid {
            return Ok(CouponVerdict::Rejected(CouponRejection::from_remote(
                self.message,
            )));
        }

        let discount = self.discount_percentage.ok_or_else(|| {
            GatewayError::Decode("valid coupon without discount_percentage".to_string())
        })?;

        Ok(match self.message {
            Some(message) => CouponVerdict::Valid { discount, message },
            None => CouponVerdict::valid(discount),
        })
    }
}

/// FastAPI-style error body
#[derive(Deserialize)]
struct ErrorBody {
    detail: String,
}

/// Ticketing backend client
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone, Debug)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    /// Creates a client for the API rooted at `base_url`
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Network`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Creates a client from configuration
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Network`] if the HTTP client cannot be built.
    pub fn from_config(config: &BackendConfig) -> GatewayResult<Self> {
        Self::new(config.base_url.clone(), config.timeout())
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Signs in and opens a session
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthorized`] for bad credentials, or another
    /// [`GatewayError`] if the backend could not be reached.
    #[tracing::instrument(skip(self, password), fields(base_url = %self.base_url))]
    pub async fn login(&self, email: &str, password: &str) -> GatewayResult<Session> {
        let response: LoginResponse = self
            .post("/auth/login", None, &LoginRequest { email, password })
            .await?;

        tracing::info!(user_id = %response.user.id, "Signed in");
        Ok(Session::new(response.access_token, response.user))
    }

    /// Loads an event's title and prices
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Api`] with status 404 for an unknown event, or
    /// [`GatewayError::Decode`] if the stored prices are invalid.
    #[tracing::instrument(skip(self), fields(event_id = %event_id))]
    pub async fn fetch_event(&self, event_id: &EventId) -> GatewayResult<Event> {
        self.get(&format!("/events/{event_id}")).await
    }

    /// Asks the backend whether a coupon may be applied
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] if the backend could not be reached or
    /// answered with an error status.
    #[tracing::instrument(skip(self, session, event_id), fields(event_id = %event_id))]
    pub async fn validate_coupon(
        &self,
        session: &Session,
        coupon_code: &str,
        event_id: &EventId,
    ) -> GatewayResult<CouponVerdict> {
        let response: ValidateCouponResponse = self
            .post(
                "/validate-coupon",
                Some(session),
                &ValidateCouponRequest {
                    coupon_code,
                    event_id,
                },
            )
            .await?;

        let verdict = response.into_verdict()?;
        tracing::debug!(valid = verdict.is_valid(), message = verdict.message(), "Coupon validated");
        Ok(verdict)
    }

    /// Buys tickets
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] if the backend could not be reached or
    /// refused the purchase.
    #[tracing::instrument(
        skip(self, session, request),
        fields(event_id = %request.event_id, quantity = request.quantity.get())
    )]
    pub async fn purchase_tickets(
        &self,
        session: &Session,
        request: &PurchaseRequest,
    ) -> GatewayResult<PurchaseReceipt> {
        let receipt: PurchaseReceipt = self
            .post("/purchase-tickets", Some(session), request)
            .await?;

        tracing::info!(ticket_id = %receipt.ticket_id, total = %request.total_amount, "Tickets purchased");
        Ok(receipt)
    }

    async fn post<B, T>(&self, path: &str, session: Option<&Session>, body: &B) -> GatewayResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body);
        if let Some(session) = session {
            request = request.bearer_auth(session.token());
        }

        Self::read_response(request, path).await
    }

    async fn get<T>(&self, path: &str) -> GatewayResult<T>
    where
        T: DeserializeOwned,
    {
        let request = self.client.get(format!("{}{path}", self.base_url));
        Self::read_response(request, path).await
    }

    async fn read_response<T>(request: reqwest::RequestBuilder, path: &str) -> GatewayResult<T>
    where
        T: DeserializeOwned,
    {
        let response = request.send().await.map_err(map_transport_error)?;

        match response.status() {
            status if status.is_success() => response
                .json::<T>()
                .await
                .map_err(|e| GatewayError::Decode(e.to_string())),
            StatusCode::UNAUTHORIZED => Err(GatewayError::Unauthorized),
            status => {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ErrorBody>(&body)
                    .map_or(body, |error| error.detail);
                tracing::warn!(status = status.as_u16(), %message, path, "Backend returned an error");
                Err(GatewayError::Api {
                    status: status.as_u16(),
                    message,
                })
            },
        }
    }
}

fn map_transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Network(error.to_string())
    }
}

impl CouponValidator for BackendClient {
    fn validate(
        &self,
        session: &Session,
        coupon_code: &str,
        event_id: &EventId,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<CouponVerdict>> + Send>> {
        let client = self.clone();
        let session = session.clone();
        let coupon_code = coupon_code.to_string();
        let event_id = event_id.clone();

        Box::pin(async move {
            client
                .validate_coupon(&session, &coupon_code, &event_id)
                .await
        })
    }
}

impl PurchaseGateway for BackendClient {
    fn purchase(
        &self,
        session: &Session,
        request: PurchaseRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<PurchaseReceipt>> + Send>> {
        let client = self.clone();
        let session = session.clone();

        Box::pin(async move { client.purchase_tickets(&session, &request).await })
    }
}
