//! Exchange-agnostic transport layer.
//!
//! - `signer` / `key_codec`: request authentication (HMAC-SHA256 or RSA
//!   PKCS#1 v1.5) and PEM key loading
//! - `rest`: signed request execution and response envelope classification
//! - `ws`: one duplex streaming connection and its lifecycle
//! - `codec` / `registry` / `service`: discriminator-based routing of stream
//!   frames to per-key callbacks
//! - `event_loop`: read task, heartbeat and cancellation for a stream
//!
//! ```rust,no_run
//! use bybitx::core::kernel::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), bybitx::BybitError> {
//! let signer = Arc::new(HmacSigner::new("api_key".to_string(), "secret".to_string(), 5000));
//! let rest = RestClientBuilder::new(RestClientConfig::new(
//!     "https://api.bybit.com".to_string(),
//!     "bybit".to_string(),
//! ))
//! .with_signer(signer)
//! .build()?;
//!
//! let balance = rest
//!     .get("/v5/account/wallet-balance", &[("accountType", "UNIFIED")], true)
//!     .await?;
//! println!("{}", balance);
//! # Ok(())
//! # }
//! ```
pub mod codec;
pub mod event_loop;
pub mod key_codec;
pub mod registry;
pub mod rest;
pub mod service;
pub mod signer;
pub mod ws;

pub use codec::{Decoded, FrameKind, StreamCodec, TopicParser, TopicTable};
pub use event_loop::{EventLoop, EventLoopConfig};
pub use key_codec::{load_private_key_file, parse_private_key};
pub use registry::{Callback, SubscriptionRegistry};
pub use rest::{classify_response, ReqwestRest, RestClient, RestClientBuilder, RestClientConfig};
pub use service::KeyedStreamService;
pub use signer::{canonical_payload, HmacSigner, RsaSigner, SignatureResult, Signer};
pub use ws::{SessionState, WsConfig, WsSession};
