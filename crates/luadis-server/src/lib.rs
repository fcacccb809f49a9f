//! luadis-server: service de désassemblage sur WebSocket
//!
//! - `ServerConfig` : options CLI + variables d’environnement (`LUADIS_*`)
//! - `handler`      : logique requête → réponse, sans IO
//! - `serve`        : boucle d’acceptation tokio, une tâche par connexion
//!
//! Un échec de décodage ne coûte qu’une réponse `error: ...` sur la
//! connexion concernée ; les autres connexions ne sont pas affectées.

#![forbid(unsafe_code)]

pub mod handler;

use std::future::Future;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;

use handler::{Frame, Handler};

/// Port d’écoute par défaut.
pub const DEFAULT_PORT: u16 = 8080;
/// Adresse d’écoute par défaut.
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Taille maximale d’un module (16 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Configuration du serveur.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "luadis-server", version, about = "Désassemblage de bytecode Luau sur WebSocket")]
pub struct ServerConfig {
    /// Port d’écoute
    #[arg(short = 'p', long, env = "LUADIS_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Adresse d’écoute
    #[arg(long, env = "LUADIS_BIND", default_value = DEFAULT_BIND)]
    pub bind: String,

    /// Préfixe chaque instruction par sa ligne source (`L<n>`)
    #[arg(short = 'l', long, env = "LUADIS_LINE_INFO")]
    pub line_info: bool,

    /// Taille maximale d’un module, en octets
    #[arg(long, env = "LUADIS_MAX_PAYLOAD", default_value_t = DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,

    /// Verbosité (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Silencieux (erreurs seulement)
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    pub quiet: bool,
}

impl ServerConfig {
    /// `bind:port`, prêt pour `TcpListener::bind`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Handler frais pour une connexion.
    pub fn handler(&self) -> Handler {
        Handler::new(self.line_info, self.max_payload)
    }

    /// Limites du transport ; le base64 gonfle d’un tiers, le handler tranche.
    fn ws_config(&self) -> WebSocketConfig {
        let limit = self.max_payload.saturating_mul(2).max(1024);
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(limit);
        config.max_frame_size = Some(limit);
        config
    }
}

/// Accepte des connexions jusqu’à ce que `shutdown` se termine.
pub async fn serve(listener: TcpListener, config: ServerConfig, shutdown: impl Future<Output = ()>) -> Result<()> {
    info!("listening on ws://{}", listener.local_addr()?);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("accept failed: {e}");
                        continue;
                    }
                };
                let config = config.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, peer, &config).await {
                        warn!("{peer}: {e:#}");
                    }
                });
            }
            () = &mut shutdown => {
                info!("shutting down");
                return Ok(());
            }
        }
    }
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, config: &ServerConfig) -> Result<()> {
    let ws = tokio_tungstenite::accept_async_with_config(stream, Some(config.ws_config()))
        .await
        .context("websocket handshake")?;
    debug!("{peer}: connected");

    let mut handler = config.handler();
    let (mut sink, mut source) = ws.split();

    while let Some(msg) = source.next().await {
        let reply = match msg.context("read")? {
            Message::Binary(bytes) => handler.handle(Frame::Binary(&bytes)),
            Message::Text(text) => handler.handle(Frame::Text(&text)),
            Message::Close(_) => break,
            // ping/pong: géré par tungstenite
            _ => continue,
        };
        sink.send(Message::Text(reply.into_text())).await.context("write")?;
    }

    debug!("{peer}: closed after {} request(s)", handler.handled());
    Ok(())
}
