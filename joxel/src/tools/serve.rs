use crate::config::Config;
use crate::server::{HttpServer, JpipServer};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Loads the configuration, registers the targets and serves until ctrl-c.
pub async fn serve(config_path: &Path) -> Result<()> {
	let config = Config::from_file(config_path)?;
	let core = Arc::new(JpipServer::new(config.clone()));

	for target in &config.targets {
		core
			.images()
			.register_file(&target.name, &target.path)
			.with_context(|| format!("registering target {:?}", target.name))?;
	}
	if core.images().is_empty() {
		log::warn!("no targets registered, the server will answer 404 for every image");
	}

	let mut server = HttpServer::new(core, &config.server.ip, config.server.port);
	server.start().await?;

	tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
	log::info!("shutting down");
	server.stop().await;
	Ok(())
}
