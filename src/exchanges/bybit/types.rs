use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// REST

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitServerTime {
    pub time_second: String,
    pub time_nano: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitWalletBalanceResult {
    pub list: Vec<BybitWalletAccount>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitWalletAccount {
    pub account_type: String,
    #[serde(default)]
    pub total_equity: String,
    #[serde(default)]
    pub total_wallet_balance: String,
    #[serde(default)]
    pub total_available_balance: String,
    #[serde(default)]
    pub coin: Vec<BybitCoinBalance>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitCoinBalance {
    pub coin: String,
    #[serde(default)]
    pub equity: String,
    #[serde(default)]
    pub wallet_balance: String,
    #[serde(default)]
    pub locked: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitOrderRequest {
    pub category: String,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub qty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_link_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitOrderResponse {
    pub order_id: String,
    #[serde(default)]
    pub order_link_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitSetLeverageRequest {
    pub category: String,
    pub symbol: String,
    pub buy_leverage: String,
    pub sell_leverage: String,
}

// Public spot stream

/// Routing parameters echoed back on every public frame
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitPublicParams {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub kline_type: Option<String>,
}

/// A public frame for one topic and symbol
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitPublicFrame<T> {
    pub symbol: String,
    pub topic: String,
    #[serde(default)]
    pub params: BybitPublicParams,
    pub data: Vec<T>,
    #[serde(default)]
    pub send_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitTradeData {
    #[serde(rename = "v")]
    pub trade_id: String,
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "p")]
    pub price: Decimal,
    #[serde(rename = "q")]
    pub quantity: Decimal,
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitDepthData {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "v")]
    pub version: String,
    #[serde(rename = "b", default)]
    pub bids: Vec<[Decimal; 2]>,
    #[serde(rename = "a", default)]
    pub asks: Vec<[Decimal; 2]>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitKlineData {
    #[serde(rename = "t")]
    pub start_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "o")]
    pub open: Decimal,
    #[serde(rename = "h")]
    pub high: Decimal,
    #[serde(rename = "l")]
    pub low: Decimal,
    #[serde(rename = "c")]
    pub close: Decimal,
    #[serde(rename = "v")]
    pub volume: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitTickerData {
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "o")]
    pub open: Decimal,
    #[serde(rename = "h")]
    pub high: Decimal,
    #[serde(rename = "l")]
    pub low: Decimal,
    #[serde(rename = "c")]
    pub close: Decimal,
    #[serde(rename = "v")]
    pub volume: Decimal,
    #[serde(rename = "qv", default)]
    pub quote_volume: Option<Decimal>,
    #[serde(rename = "m", default)]
    pub change: Option<Decimal>,
}

pub type BybitTradeEvent = BybitPublicFrame<BybitTradeData>;
pub type BybitDepthEvent = BybitPublicFrame<BybitDepthData>;
pub type BybitKlineEvent = BybitPublicFrame<BybitKlineData>;
pub type BybitTickerEvent = BybitPublicFrame<BybitTickerData>;

// Private spot stream

#[derive(Debug, Clone, Deserialize)]
pub struct BybitOutboundAccountInfo {
    #[serde(rename = "E")]
    pub event_time: String,
    #[serde(rename = "T", default)]
    pub can_trade: bool,
    #[serde(rename = "W", default)]
    pub can_withdraw: bool,
    #[serde(rename = "D", default)]
    pub can_deposit: bool,
    #[serde(rename = "B", default)]
    pub balances: Vec<BybitAccountBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitAccountBalance {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "f")]
    pub free: Decimal,
    #[serde(rename = "l")]
    pub locked: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitExecutionReport {
    #[serde(rename = "E")]
    pub event_time: String,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub client_order_id: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "o")]
    pub order_type: String,
    #[serde(rename = "f")]
    pub time_in_force: String,
    #[serde(rename = "q")]
    pub quantity: Decimal,
    #[serde(rename = "p")]
    pub price: Decimal,
    #[serde(rename = "X")]
    pub status: String,
    #[serde(rename = "i")]
    pub order_id: String,
    #[serde(rename = "l", default)]
    pub last_filled_quantity: Option<Decimal>,
    #[serde(rename = "z", default)]
    pub cumulative_filled_quantity: Option<Decimal>,
    #[serde(rename = "L", default)]
    pub last_price: Option<Decimal>,
    #[serde(rename = "n", default)]
    pub commission: Option<Decimal>,
    #[serde(rename = "N", default)]
    pub commission_asset: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitTicketInfo {
    #[serde(rename = "E")]
    pub event_time: String,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "q")]
    pub quantity: Decimal,
    #[serde(rename = "t")]
    pub trade_time: String,
    #[serde(rename = "p")]
    pub price: Decimal,
    #[serde(rename = "T")]
    pub trade_id: String,
    #[serde(rename = "o")]
    pub order_id: String,
    #[serde(rename = "c")]
    pub client_order_id: String,
    #[serde(rename = "m")]
    pub is_maker: bool,
}
