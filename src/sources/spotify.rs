use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::MusicError;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

/// Una referencia de track dentro de una playlist: nombre + artista,
/// todavía sin resolver a un stream reproducible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub name: String,
    pub artist: String,
}

/// Proveedor de playlists externas. El contrato drena la paginación del
/// proveedor antes de devolver: el importador recibe la lista completa.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaylistProvider: Send + Sync {
    async fn fetch_playlist(&self, id: &str)
        -> Result<(String, Vec<PlaylistEntry>), MusicError>;
}

/// Cliente de la Web API de Spotify con flujo client-credentials.
///
/// Se construye en el arranque con credenciales explícitas y se inyecta
/// en el importador; el token se renueva bajo demanda.
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    /// Extrae el id de playlist de una URL de Spotify, si lo es.
    pub fn playlist_id_from_url(url: &str) -> Option<String> {
        // El formato es open.spotify.com/playlist/<id>[?si=...]
        let re = Regex::new(r"spotify\.com/playlist/([A-Za-z0-9]+)").ok()?;
        re.captures(url).map(|c| c[1].to_string())
    }

    pub fn is_playlist_url(url: &str) -> bool {
        Self::playlist_id_from_url(url).is_some()
    }

    async fn token(&self) -> Result<String, MusicError> {
        let mut slot = self.token.lock().await;

        if let Some(cached) = slot.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.value.clone());
            }
        }

        debug!("🔑 Renovando token de Spotify");
        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| MusicError::Resolution(format!("token de Spotify: {e}")))?
            .error_for_status()
            .map_err(|e| MusicError::Resolution(format!("token de Spotify: {e}")))?;

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| MusicError::Resolution(format!("token de Spotify: {e}")))?;

        // Renovar un minuto antes de la caducidad nominal
        let expires_at =
            Instant::now() + Duration::from_secs(body.expires_in.saturating_sub(60).max(30));
        let value = body.access_token.clone();
        *slot = Some(CachedToken {
            value: body.access_token,
            expires_at,
        });

        Ok(value)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, MusicError> {
        let token = self.token().await?;
        self.http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| MusicError::Resolution(format!("API de Spotify: {e}")))?
            .error_for_status()
            .map_err(|e| MusicError::Resolution(format!("API de Spotify: {e}")))?
            .json()
            .await
            .map_err(|e| MusicError::Resolution(format!("API de Spotify: {e}")))
    }
}

#[async_trait]
impl PlaylistProvider for SpotifyClient {
    async fn fetch_playlist(
        &self,
        id: &str,
    ) -> Result<(String, Vec<PlaylistEntry>), MusicError> {
        let meta: PlaylistMeta = self
            .get_json(&format!("{API_BASE}/playlists/{id}?fields=name"))
            .await?;

        // Drenar la paginación del proveedor entera antes de devolver
        let mut entries = Vec::new();
        let mut next = Some(format!("{API_BASE}/playlists/{id}/tracks?limit=100"));
        while let Some(url) = next {
            let page: TracksPage = self.get_json(&url).await?;
            entries.extend(page.items.into_iter().filter_map(|item| {
                let track = item.track?;
                let artist = track.artists.into_iter().next()?.name;
                Some(PlaylistEntry {
                    name: track.name,
                    artist,
                })
            }));
            next = page.next;
        }

        info!(
            "📜 Playlist `{}` con {} referencias de track",
            meta.name,
            entries.len()
        );
        Ok((meta.name, entries))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct PlaylistMeta {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TracksPage {
    items: Vec<TrackItem>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    track: Option<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: String,
    artists: Vec<SpotifyArtist>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_playlist_id_extraction() {
        assert_eq!(
            SpotifyClient::playlist_id_from_url(
                "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M?si=abc"
            ),
            Some("37i9dQZF1DXcBWIGoYBM5M".to_string())
        );
        assert_eq!(
            SpotifyClient::playlist_id_from_url("https://open.spotify.com/playlist/xyz789"),
            Some("xyz789".to_string())
        );
        assert_eq!(
            SpotifyClient::playlist_id_from_url("https://www.youtube.com/watch?v=abc"),
            None
        );
        assert!(!SpotifyClient::is_playlist_url(
            "https://open.spotify.com/track/abc"
        ));
    }

    #[test]
    fn test_tracks_page_parsing() {
        let raw = r#"{
            "items": [
                {"track": {"name": "Uno", "artists": [{"name": "A"}, {"name": "B"}]}},
                {"track": null},
                {"track": {"name": "Dos", "artists": [{"name": "C"}]}}
            ],
            "next": null
        }"#;

        let page: TracksPage = serde_json::from_str(raw).unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.next.is_none());

        let entries: Vec<PlaylistEntry> = page
            .items
            .into_iter()
            .filter_map(|item| {
                let track = item.track?;
                let artist = track.artists.into_iter().next()?.name;
                Some(PlaylistEntry {
                    name: track.name,
                    artist,
                })
            })
            .collect();

        assert_eq!(
            entries,
            vec![
                PlaylistEntry {
                    name: "Uno".to_string(),
                    artist: "A".to_string()
                },
                PlaylistEntry {
                    name: "Dos".to_string(),
                    artist: "C".to_string()
                },
            ]
        );
    }
}
