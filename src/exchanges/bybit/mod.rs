pub mod builder;
pub mod codec;
pub mod private_ws;
pub mod public_ws;
pub mod rest;
pub mod types;

// Re-export main types for easier importing
pub use builder::{build_private_stream, build_public_stream, build_rest_client, build_signer};
pub use codec::{
    PrivateTopic, PublicTopic, PublicTopicKey, SpotPrivateCodec, SpotPrivateEvent,
    SpotPublicCodec, SpotPublicEvent,
};
pub use private_ws::SpotPrivateStream;
pub use public_ws::SpotPublicStream;
pub use rest::BybitRestClient;
pub use types::{
    BybitDepthEvent, BybitExecutionReport, BybitKlineEvent, BybitOrderRequest,
    BybitOrderResponse, BybitOutboundAccountInfo, BybitSetLeverageRequest, BybitTickerEvent,
    BybitTicketInfo, BybitTradeEvent, BybitWalletBalanceResult,
};
