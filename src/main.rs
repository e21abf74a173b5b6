use clap::Parser;
use exchange_chat::runtime::create_runtime;
use exchange_chat::{ChatServer, Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    if config.console {
        console_subscriber::init();
    } else {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.log_level))?;
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let runtime = create_runtime(config.workers)?;
    runtime.block_on(async {
        info!("Starting chat server on {}", config.listen);
        let server = ChatServer::from_config(&config).await?;
        server.run_until_ctrl_c().await
    })?;
    info!("Chat server stopped");
    Ok(())
}
