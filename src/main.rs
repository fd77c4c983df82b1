use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

use discbot_music::{
    audio::{
        manager::PlayerManager,
        session::SessionDeps,
        voice::SongbirdTransport,
    },
    bot::{presenter::DiscordPanel, MusicBot},
    config::Config,
    sources::{
        MediaSearch, Resolver, SpotifyCatalog, SpotifyClient, StreamOpener, YtDlpClient,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("discbot_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando DiscBot Music v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    // Proveedores
    let youtube: Arc<dyn MediaSearch> = Arc::new(YtDlpClient::new(config.ytdlp_options())?);
    let spotify: Option<Arc<dyn SpotifyCatalog>> = match config.spotify_credentials() {
        Some((id, secret)) => Some(Arc::new(SpotifyClient::new(http_client.clone(), id, secret))),
        None => {
            warn!("⚠️ Spotify deshabilitado: faltan SPOTIFY_CLIENT_ID/SPOTIFY_CLIENT_SECRET");
            None
        }
    };
    let resolver = Resolver::new(youtube, spotify).with_limits(config.playlist_max, config.spotify_max);

    // Voz y panel
    let songbird = Songbird::serenity();
    let discord_http = Arc::new(Http::new(&config.discord_token));
    let panel = Arc::new(DiscordPanel::new(discord_http, config.panel_bump_interval()));

    let deps = SessionDeps {
        resolver: Arc::new(resolver),
        source: Arc::new(StreamOpener::new(http_client, config.stream_open_timeout)),
        voice: Arc::new(SongbirdTransport::new(songbird.clone())),
        presenter: panel.clone(),
    };
    let manager = Arc::new(PlayerManager::new(deps, config.session_settings()));

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES;

    let handler = MusicBot::new(config.clone(), manager, panel);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
