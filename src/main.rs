use anyhow::{Context, Result};
use serenity::model::id::UserId;
use std::sync::Arc;
use tracing::{error, info, warn};

use open_music_lavalink::{Config, LavalinkManager, LoadType};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_music_lavalink=debug".parse()?)
                .add_directive("reqwest=info".parse()?)
                .add_directive("tungstenite=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Open Music Lavalink v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let user_id = config
        .client_user_id
        .filter(|id| *id != 0)
        .map(UserId::new)
        .context("CLIENT_USER_ID es obligatorio")?;

    let manager = Arc::new(LavalinkManager::new(config)?);

    let args: Vec<String> = std::env::args().skip(1).collect();

    // Manejar health check si es necesario
    if args.iter().any(|arg| arg == "--health-check") {
        return health_check(&manager, user_id).await;
    }

    if let Some(position) = args.iter().position(|arg| arg == "--search") {
        let query = args[position + 1..].join(" ");
        if query.trim().is_empty() {
            anyhow::bail!("Uso: --search <query>");
        }
        return search(&manager, user_id, &query).await;
    }

    if let Err(e) = manager.start(user_id).await {
        error!("❌ Error al inicializar Lavalink: {}", e);
        return Err(e.into());
    }

    info!("🚀 Driver iniciado, Ctrl+C para salir");
    tokio::signal::ctrl_c()
        .await
        .context("Error al registrar Ctrl+C")?;

    info!("⚠️ Señal de shutdown recibida, cerrando...");
    manager.stop().await;

    Ok(())
}

async fn health_check(manager: &LavalinkManager, user_id: UserId) -> Result<()> {
    let started = manager.start(user_id).await;

    for node in manager.nodes() {
        let version = node
            .info()
            .map(|info| info.version.semver)
            .unwrap_or_else(|| "?".to_string());
        println!(
            "{} {} (v{})",
            if node.is_available() { "OK  " } else { "DOWN" },
            node.label(),
            version
        );
    }

    manager.stop().await;

    match started {
        Ok(()) => Ok(()),
        Err(e) => anyhow::bail!("Ningún nodo disponible: {}", e),
    }
}

async fn search(manager: &LavalinkManager, user_id: UserId, query: &str) -> Result<()> {
    manager.start(user_id).await?;

    let result = manager.resolve(query, None, Some(user_id)).await;
    manager.stop().await;
    let result = result?;

    match result.load_type {
        LoadType::Error => {
            warn!("Error al cargar track: {:?}", result.exception);
            anyhow::bail!("Error al cargar track");
        }
        LoadType::Playlist => {
            let name = result
                .playlist_info
                .as_ref()
                .and_then(|info| info.name.clone())
                .unwrap_or_else(|| "Playlist".to_string());
            println!("📃 {} ({} tracks)", name, result.tracks.len());
        }
        _ => {}
    }

    for (index, track) in result.tracks.iter().enumerate() {
        println!("{:>2}. {} [{}]", index + 1, track, track.pretty_duration());
    }
    if result.is_empty() {
        println!("Sin resultados");
    }

    Ok(())
}
