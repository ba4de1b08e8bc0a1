//! Serve command - run the gateway

use crate::cli::ServeArgs;
use crate::config::Config;
use crate::error::GateResult;
use crate::gateway;

/// Start the gateway server with CLI overrides applied.
pub async fn serve(args: ServeArgs, config: &Config) -> GateResult<()> {
    let mut config = config.clone();
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(root_dir) = args.root_dir {
        config.server.root_dir = root_dir;
    }

    gateway::serve(&config).await
}
