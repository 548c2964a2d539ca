use anyhow::Context;
use binkeeper::domain::Address;
use binkeeper::orchestration::stop_channel;
use binkeeper::{
    api, config::Config, db::init_db, LbPoolGateway, MonitorLoop, PoolContext, PoolGateway,
    Repository, Session, Workflows,
};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        eprintln!("Fatal: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    // Connectivity check happens here; nothing runs if the chain is unreachable.
    let gateway = LbPoolGateway::connect(&config)
        .await
        .with_context(|| format!("cannot reach chain endpoint {}", config.rpc_url))?;
    let wallet = gateway.wallet_address();
    let tokens = gateway.pool_tokens().await.context("reading pool tokens")?;

    let ctx = PoolContext::new(
        wallet,
        Address::new(config.pool_address.as_str()),
        Address::new(config.router_address.as_str()),
        tokens,
        &Address::new(config.primary_token.as_str()),
        &Address::new(config.paired_token.as_str()),
    )
    .context("token roles do not match the pool")?;

    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("initializing database {}", config.database_path))?;
    let repo = Arc::new(Repository::new(pool));

    let gateway: Arc<dyn PoolGateway> = Arc::new(gateway);
    let session = Arc::new(Session::new(Workflows::new(
        gateway,
        repo,
        ctx,
        config.policy.clone(),
        config.scan,
    )));

    // Create router
    let app = api::create_router(api::AppState::new(session.clone()));
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("Control API listening on {}", addr);

    let (stop_tx, stop_rx) = stop_channel();
    let mut api_stop = stop_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = api_stop.wait_for(|stopped| *stopped).await;
            })
            .await
    });

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Stop requested, finishing current cycle");
                let _ = stop_tx.send(true);
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot listen for Ctrl-C, running until killed");
                // A dropped sender reads as a stop request.
                std::future::pending::<()>().await;
            }
        }
    });

    MonitorLoop::new(session, config.timing).run(stop_rx).await;

    server
        .await
        .context("control API task panicked")?
        .context("control API failed")?;
    Ok(())
}
