use crate::core::config::{AuthMode, ExchangeConfig};
use crate::core::errors::BybitError;
use crate::core::kernel::{
    load_private_key_file, HmacSigner, ReqwestRest, RestClientBuilder, RestClientConfig,
    RsaSigner, Signer,
};
use crate::exchanges::bybit::private_ws::SpotPrivateStream;
use crate::exchanges::bybit::public_ws::SpotPublicStream;
use crate::exchanges::bybit::rest::BybitRestClient;
use std::sync::Arc;
use tracing::info;

const MAINNET_REST_URL: &str = "https://api.bybit.com";
const TESTNET_REST_URL: &str = "https://api-testnet.bybit.com";
const MAINNET_PUBLIC_WS_URL: &str = "wss://stream.bybit.com/spot/quote/ws/v1";
const TESTNET_PUBLIC_WS_URL: &str = "wss://stream-testnet.bybit.com/spot/quote/ws/v1";
const MAINNET_PRIVATE_WS_URL: &str = "wss://stream.bybit.com/spot/ws";
const TESTNET_PRIVATE_WS_URL: &str = "wss://stream-testnet.bybit.com/spot/ws";

/// Turn the configured credentials into a signer, once.
///
/// `None` for read-only configs. A configured key file that cannot be read
/// or parsed fails here rather than on the first signed call.
pub fn build_signer(config: &ExchangeConfig) -> Result<Option<Arc<dyn Signer>>, BybitError> {
    let signer: Arc<dyn Signer> = match config.auth_mode() {
        AuthMode::None => return Ok(None),
        AuthMode::SharedSecret => Arc::new(HmacSigner::new(
            config.api_key().to_string(),
            config.secret_key().to_string(),
            config.recv_window_ms,
        )),
        AuthMode::PrivateKey => {
            let path = config.private_key_path.as_ref().ok_or_else(|| {
                BybitError::AuthError("Private key mode without a key path".to_string())
            })?;
            let key = load_private_key_file(path)?;
            Arc::new(RsaSigner::new(
                config.api_key().to_string(),
                key,
                config.recv_window_ms,
            ))
        }
    };

    Ok(Some(signer))
}

pub fn rest_url(config: &ExchangeConfig) -> String {
    config.base_url.clone().unwrap_or_else(|| {
        if config.testnet {
            TESTNET_REST_URL.to_string()
        } else {
            MAINNET_REST_URL.to_string()
        }
    })
}

pub fn public_ws_url(config: &ExchangeConfig) -> String {
    config.ws_public_url.clone().unwrap_or_else(|| {
        if config.testnet {
            TESTNET_PUBLIC_WS_URL.to_string()
        } else {
            MAINNET_PUBLIC_WS_URL.to_string()
        }
    })
}

pub fn private_ws_url(config: &ExchangeConfig) -> String {
    config.ws_private_url.clone().unwrap_or_else(|| {
        if config.testnet {
            TESTNET_PRIVATE_WS_URL.to_string()
        } else {
            MAINNET_PRIVATE_WS_URL.to_string()
        }
    })
}

/// Create a typed REST client; signed calls need credentials in `config`
pub fn build_rest_client(
    config: &ExchangeConfig,
) -> Result<BybitRestClient<ReqwestRest>, BybitError> {
    let rest_config = RestClientConfig::new(rest_url(config), "bybit".to_string()).with_timeout(30);

    let mut rest_builder = RestClientBuilder::new(rest_config);
    if let Some(signer) = build_signer(config)? {
        rest_builder = rest_builder.with_signer(signer);
    }

    let rest = rest_builder.build()?;
    info!(mode = ?config.auth_mode(), testnet = config.testnet, "bybit rest client ready");
    Ok(BybitRestClient::new(rest))
}

pub async fn build_public_stream(config: &ExchangeConfig) -> Result<SpotPublicStream, BybitError> {
    SpotPublicStream::connect(&public_ws_url(config)).await
}

/// Connect and authenticate the private stream
pub async fn build_private_stream(
    config: &ExchangeConfig,
) -> Result<SpotPrivateStream, BybitError> {
    let signer = build_signer(config)?.ok_or_else(|| {
        BybitError::AuthError("Private stream requires credentials".to_string())
    })?;

    SpotPrivateStream::connect(&private_ws_url(config), signer).await
}
