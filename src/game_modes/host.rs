use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::host::GameHost;

/// Host rooms until Ctrl-C
pub async fn run_host(config: Config, username: String) -> Result<()> {
    let host = GameHost::new(config, username.clone());
    println!("Hosting as {} (server id {})", username, host.server_id());
    println!("Press Ctrl-C to stop");

    host.run(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
        }
    })
    .await
}
