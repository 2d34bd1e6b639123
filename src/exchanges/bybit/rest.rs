use crate::core::errors::BybitError;
use crate::core::kernel::RestClient;
use crate::exchanges::bybit::types::{
    BybitOrderRequest, BybitOrderResponse, BybitServerTime, BybitSetLeverageRequest,
    BybitWalletBalanceResult,
};
use serde_json::Value;

/// Thin typed wrapper around `RestClient` for the Bybit API
pub struct BybitRestClient<R: RestClient> {
    client: R,
}

impl<R: RestClient> BybitRestClient<R> {
    pub fn new(client: R) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &R {
        &self.client
    }

    /// Server clock, useful to check drift against the receive window
    pub async fn get_server_time(&self) -> Result<BybitServerTime, BybitError> {
        self.client.get_json("/v5/market/time", &[], false).await
    }

    /// Wallet balance for an account type, optionally narrowed to one coin
    pub async fn get_wallet_balance(
        &self,
        account_type: &str,
        coin: Option<&str>,
    ) -> Result<BybitWalletBalanceResult, BybitError> {
        let mut params = vec![("accountType", account_type)];
        if let Some(coin) = coin {
            params.push(("coin", coin));
        }

        self.client
            .get_json("/v5/account/wallet-balance", &params, true)
            .await
    }

    pub async fn place_order(
        &self,
        order: &BybitOrderRequest,
    ) -> Result<BybitOrderResponse, BybitError> {
        let body = serde_json::to_value(order).map_err(|e| {
            BybitError::InvalidParameters(format!("Failed to serialize order: {}", e))
        })?;

        self.client.post_json("/v5/order/create", &body, true).await
    }

    pub async fn cancel_order(
        &self,
        category: &str,
        symbol: &str,
        order_id: &str,
    ) -> Result<BybitOrderResponse, BybitError> {
        let body = serde_json::json!({
            "category": category,
            "symbol": symbol,
            "orderId": order_id
        });

        self.client.post_json("/v5/order/cancel", &body, true).await
    }

    /// Set leverage for a derivatives symbol.
    ///
    /// Setting the current value again is answered with a non-zero retCode
    /// ("leverage not modified") and comes back as a `BusinessError`.
    pub async fn set_leverage(
        &self,
        request: &BybitSetLeverageRequest,
    ) -> Result<Value, BybitError> {
        let body = serde_json::to_value(request).map_err(|e| {
            BybitError::InvalidParameters(format!("Failed to serialize leverage request: {}", e))
        })?;

        self.client
            .post("/v5/position/set-leverage", &body, true)
            .await
    }
}
