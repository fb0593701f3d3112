use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::domain::order::{Order, OrderId};
use crate::domain::ports::{CatalogClient, OrderLedgerClient};
use crate::domain::product::{NetworkInfo, Product, ProductId};
use crate::error::{PaymentError, Result};

/// Connection settings for the payment backend.
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: Url,
    pub bearer_token: String,
    pub timeout: Duration,
}

impl RestConfig {
    pub fn new(base_url: &str, bearer_token: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PaymentError::Config(format!("invalid base url: {e}")))?;
        Ok(Self {
            base_url,
            bearer_token: bearer_token.into(),
            timeout: Duration::from_secs(10),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderRequest<'a> {
    product_id: &'a ProductId,
    wallet_address: &'a str,
}

/// The `/api/crypto-payments` backend over JSON/HTTPS.
///
/// One client serves both the catalog and the order ledger port; clone it
/// into each `Arc` slot (the underlying `reqwest::Client` shares its
/// connection pool across clones).
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    bearer_token: String,
}

impl RestClient {
    pub fn new(config: RestConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url,
            bearer_token: config.bearer_token,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PaymentError::Config("base url cannot serve as a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn http_get<R: DeserializeOwned>(&self, url: Url) -> Result<R> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn http_post<P: Serialize, R: DeserializeOwned>(&self, url: Url, payload: &P) -> Result<R> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.bearer_token)
            .json(payload)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("backend responded {status}: {body}");
            return Err(PaymentError::Network(format!("http {status}")));
        }
        Ok(response.json::<R>().await?)
    }
}

#[async_trait]
impl CatalogClient for RestClient {
    async fn products(&self) -> Result<Vec<Product>> {
        self.http_get(self.endpoint(&["api", "crypto-payments", "products"])?)
            .await
    }

    async fn network(&self) -> Result<NetworkInfo> {
        self.http_get(self.endpoint(&["api", "crypto-payments", "network"])?)
            .await
    }
}

#[async_trait]
impl OrderLedgerClient for RestClient {
    async fn create_order(&self, product_id: &ProductId, wallet: &str) -> Result<Order> {
        let request = CreateOrderRequest {
            product_id,
            wallet_address: wallet,
        };
        self.http_post(self.endpoint(&["api", "crypto-payments", "orders"])?, &request)
            .await
    }

    async fn get_order(&self, order_id: &OrderId) -> Result<Order> {
        let url = self.endpoint(&["api", "crypto-payments", "orders", order_id.as_str()])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;
        // The ledger answers 404 for ids it never issued; that is a caller
        // bug, not a transient condition.
        if response.status() == StatusCode::NOT_FOUND {
            return Err(PaymentError::OrderNotFound(order_id.clone()));
        }
        Self::decode(response).await
    }

    async fn orders_for_wallet(&self, wallet: &str) -> Result<Vec<Order>> {
        let mut url = self.endpoint(&["api", "crypto-payments", "orders"])?;
        url.query_pairs_mut().append_pair("walletAddress", wallet);
        self.http_get(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> RestClient {
        RestClient::new(RestConfig::new(base, "token-1").unwrap()).unwrap()
    }

    #[test]
    fn test_endpoint_construction() {
        let client = client("https://backend.example.com");
        let url = client
            .endpoint(&["api", "crypto-payments", "orders", "ord-1"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://backend.example.com/api/crypto-payments/orders/ord-1"
        );
    }

    #[test]
    fn test_endpoint_tolerates_trailing_slash() {
        let client = client("https://backend.example.com/");
        let url = client
            .endpoint(&["api", "crypto-payments", "products"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://backend.example.com/api/crypto-payments/products"
        );
    }

    #[test]
    fn test_wallet_query_parameter() {
        let client = client("https://backend.example.com");
        let mut url = client
            .endpoint(&["api", "crypto-payments", "orders"])
            .unwrap();
        url.query_pairs_mut().append_pair("walletAddress", "0xabc");
        assert_eq!(
            url.as_str(),
            "https://backend.example.com/api/crypto-payments/orders?walletAddress=0xabc"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = RestConfig::new("not a url", "token-1");
        assert!(matches!(result, Err(PaymentError::Config(_))));
    }

    #[test]
    fn test_create_order_request_wire_format() {
        let request = CreateOrderRequest {
            product_id: &ProductId::new("prod-7"),
            wallet_address: "0xabc",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"productId": "prod-7", "walletAddress": "0xabc"})
        );
    }
}
