//! handler.rs: Cœur métier du serveur (sans IO)
//!
//! - Sépare la logique requête → réponse de la boucle WebSocket.
//! - Un message binaire est du bytecode brut ; un message texte est du base64.
//! - Toute erreur devient une réponse `error: <message>` : la connexion et
//!   le processus continuent de servir.
//!
//! Utilisation (depuis la boucle de transport) :
//!   let mut h = Handler::new(show_lines, max_payload);
//!   let reply = h.handle(Frame::Binary(&bytes));
//!   send(reply.into_text());

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, warn};

use luadis_core::DecodeError;

/// Message entrant, déjà désencapsulé par le transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Bytecode brut.
    Binary(&'a [u8]),
    /// Bytecode encodé en base64 (espaces en bordure tolérés).
    Text(&'a str),
}

impl Frame<'_> {
    /// Taille brute du message.
    pub fn len(&self) -> usize {
        match self {
            Frame::Binary(b) => b.len(),
            Frame::Text(t) => t.len(),
        }
    }

    /// Message vide ?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Raisons d’échec d’une requête.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Message au-delà de `max_payload`.
    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge {
        /// Taille reçue.
        size: usize,
        /// Limite configurée.
        limit: usize,
    },
    /// Texte qui n’est pas du base64 valide.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    /// Bytecode rejeté par le décodeur.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Réponse à renvoyer au client (toujours un message texte).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Désassemblage complet.
    Disassembly(String),
    /// Description de l’erreur.
    Error(String),
}

impl Reply {
    /// Texte envoyé sur le fil.
    pub fn into_text(self) -> String {
        match self {
            Reply::Disassembly(text) => text,
            Reply::Error(msg) => format!("error: {msg}"),
        }
    }

    /// Réponse d’erreur ?
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

/// État par connexion.
#[derive(Debug, Clone)]
pub struct Handler {
    show_lines: bool,
    max_payload: usize,
    handled: u64,
}

impl Handler {
    /// Crée un handler ; `show_lines` active le préfixe `L<ligne>`.
    pub fn new(show_lines: bool, max_payload: usize) -> Self {
        Self { show_lines, max_payload, handled: 0 }
    }

    /// Nombre de requêtes traitées.
    pub fn handled(&self) -> u64 {
        self.handled
    }

    /// Traite un message ; ne panique pas et n’échoue pas.
    pub fn handle(&mut self, frame: Frame<'_>) -> Reply {
        self.handled += 1;
        let id = self.handled;
        match self.process(frame) {
            Ok(text) => {
                debug!("request #{id}: {} bytes in, {} bytes out", frame.len(), text.len());
                Reply::Disassembly(text)
            }
            Err(e) => {
                warn!("request #{id} rejected: {e}");
                Reply::Error(e.to_string())
            }
        }
    }

    fn process(&self, frame: Frame<'_>) -> Result<String, RequestError> {
        let text = match frame {
            Frame::Binary(bytes) => {
                check_size(bytes.len(), self.max_payload)?;
                luadis_core::disassemble(bytes, self.show_lines)?
            }
            Frame::Text(text) => {
                let text = text.trim();
                // base64 de `max_payload` octets, padding compris
                check_size(text.len(), self.max_payload.div_ceil(3).saturating_mul(4))?;
                let bytes = STANDARD.decode(text)?;
                check_size(bytes.len(), self.max_payload)?;
                luadis_core::disassemble(&bytes, self.show_lines)?
            }
        };
        Ok(text)
    }
}

fn check_size(size: usize, limit: usize) -> Result<(), RequestError> {
    if size > limit {
        return Err(RequestError::TooLarge { size, limit });
    }
    Ok(())
}
