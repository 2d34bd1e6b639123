pub mod core;
pub mod exchanges;

pub use crate::core::config::{AuthMode, ExchangeConfig};
pub use crate::core::errors::BybitError;
pub use crate::exchanges::bybit::{BybitRestClient, SpotPrivateStream, SpotPublicStream};
