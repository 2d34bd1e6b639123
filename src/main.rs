use bybitx::exchanges::bybit::{build_public_stream, build_rest_client};
use bybitx::ExchangeConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Credentials are optional; without them only public calls are made
    let config = ExchangeConfig::from_env("BYBIT").unwrap_or_else(|e| {
        tracing::info!(reason = %e, "no credentials, running read-only");
        ExchangeConfig::read_only()
    });
    let symbol = std::env::args().nth(1).unwrap_or_else(|| "BTCUSDT".to_string());

    let rest = build_rest_client(&config)?;
    let time = rest.get_server_time().await?;
    tracing::info!(server_time = %time.time_second, "connected to REST API");

    if config.has_credentials() {
        match rest.get_wallet_balance("UNIFIED", None).await {
            Ok(balance) => {
                for account in balance.list {
                    tracing::info!(
                        account_type = %account.account_type,
                        equity = %account.total_equity,
                        "wallet balance"
                    );
                }
            }
            Err(e) => tracing::warn!(error = %e, "wallet balance request failed"),
        }
    }

    let stream = build_public_stream(&config).await?;
    stream
        .subscribe_trade(&symbol, |event| {
            for trade in &event.data {
                tracing::info!(
                    symbol = %event.symbol,
                    price = %trade.price,
                    qty = %trade.quantity,
                    buyer_maker = trade.is_buyer_maker,
                    "trade"
                );
            }
            Ok(())
        })
        .await?;

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            interrupt.cancel();
        }
    });

    stream.start(token).await?;
    tracing::info!("stream stopped");
    Ok(())
}
