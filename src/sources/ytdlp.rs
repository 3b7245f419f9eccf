use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serenity::model::id::UserId;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{MediaResolver, Track};
use crate::error::MusicError;

/// Resolutor respaldado por yt-dlp como subproceso.
///
/// Se construye explícitamente en el arranque y se inyecta donde haga
/// falta; nunca es un singleton global. El caché interno guarda solo el
/// mapeo `texto de búsqueda -> URLs estables`: la extracción pesada de
/// metadatos + stream no se cachea porque las URLs de stream caducan.
pub struct YtDlpResolver {
    timeout: Duration,
    default_volume: f32,
    cache: Mutex<SearchCache>,
}

impl YtDlpResolver {
    pub fn new(timeout: Duration, default_volume: f32, cache_cap: usize) -> Self {
        Self {
            timeout,
            default_volume,
            cache: Mutex::new(SearchCache::new(cache_cap)),
        }
    }

    fn is_url(query: &str) -> bool {
        url::Url::parse(query)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false)
    }

    /// Resuelve la búsqueda o URL a sus URLs de página estables.
    ///
    /// Solo los términos de búsqueda pasan por el caché; una URL se
    /// expande siempre (puede ser una playlist que cambió).
    async fn stable_urls(&self, query: &str) -> Result<Vec<String>, MusicError> {
        if !Self::is_url(query) {
            if let Some(urls) = self.cache.lock().get(query) {
                debug!("🔎 Búsqueda `{}` servida desde caché", query);
                return Ok(urls);
            }
        }

        let raw = self
            .run_ytdlp(&["-J", "--flat-playlist", "--default-search", "ytsearch", query])
            .await?;
        let urls = parse_stable_urls(&raw)
            .ok_or_else(|| MusicError::Resolution(query.to_string()))?;

        if urls.is_empty() {
            return Err(MusicError::Resolution(query.to_string()));
        }

        if !Self::is_url(query) {
            self.cache.lock().put(query.to_string(), urls.clone());
        }

        Ok(urls)
    }

    /// Extracción completa de una URL estable: metadatos + stream + cabeceras.
    async fn extract(&self, url: &str, requested_by: UserId) -> Result<Vec<Track>, MusicError> {
        let raw = self.run_ytdlp(&["-J", url]).await?;
        let tracks = parse_tracks(&raw, requested_by, self.default_volume)
            .ok_or_else(|| MusicError::Resolution(url.to_string()))?;

        if tracks.is_empty() {
            return Err(MusicError::Resolution(url.to_string()));
        }

        Ok(tracks)
    }

    async fn run_ytdlp(&self, args: &[&str]) -> Result<String, MusicError> {
        let mut cmd = Command::new("yt-dlp");
        cmd.args(["--no-warnings", "--quiet", "--no-check-certificate"])
            .args(args)
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| MusicError::Resolution("yt-dlp agotó el tiempo de espera".to_string()))?
            .map_err(|e| MusicError::Resolution(format!("no se pudo ejecutar yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MusicError::Resolution(format!(
                "yt-dlp terminó con error: {}",
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Vec<Track>, MusicError> {
        let urls = self.stable_urls(query).await?;

        let mut tracks = Vec::new();
        for url in &urls {
            match self.extract(url, requested_by).await {
                Ok(mut found) => tracks.append(&mut found),
                Err(e) => warn!("❌ No se pudo extraer {}: {}", url, e),
            }
        }

        if tracks.is_empty() {
            return Err(MusicError::Resolution(query.to_string()));
        }

        info!("🎵 Resueltos {} track(s) para `{}`", tracks.len(), query);
        Ok(tracks)
    }

    async fn refresh(&self, track: &Track) -> Result<Track, MusicError> {
        let fresh = self
            .extract(&track.url, track.requested_by)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MusicError::Resolution(track.url.clone()))?;

        debug!("♻️ Stream renovado para: {}", track.title);
        Ok(track.with_refreshed_stream(fresh.stream_url, fresh.stream_headers))
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    title: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    webpage_url: Option<String>,
    /// En extracción plana es la URL de página; en extracción completa,
    /// la URL temporal del stream.
    url: Option<String>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
    entries: Option<Vec<YtDlpEntry>>,
}

fn parse_stable_urls(raw: &str) -> Option<Vec<String>> {
    let root: YtDlpEntry = serde_json::from_str(raw).ok()?;

    let urls = match root.entries {
        Some(entries) => entries
            .into_iter()
            .filter_map(|e| e.webpage_url.or(e.url))
            .collect(),
        None => root.webpage_url.into_iter().collect(),
    };

    Some(urls)
}

fn parse_tracks(raw: &str, requested_by: UserId, volume: f32) -> Option<Vec<Track>> {
    let root: YtDlpEntry = serde_json::from_str(raw).ok()?;

    let entries = match root.entries {
        Some(entries) => entries,
        None => vec![root],
    };

    let tracks = entries
        .into_iter()
        .filter_map(|e| entry_to_track(e, requested_by, volume))
        .collect();

    Some(tracks)
}

fn entry_to_track(entry: YtDlpEntry, requested_by: UserId, volume: f32) -> Option<Track> {
    let stream_url = entry.url?;
    let url = entry.webpage_url?;

    Some(Track {
        title: entry.title.unwrap_or_else(|| "Desconocido".to_string()),
        uploader: entry.uploader.unwrap_or_else(|| "Desconocido".to_string()),
        duration: entry.duration.map(|d| d as u64).unwrap_or(0),
        thumbnail: entry.thumbnail,
        description: entry.description,
        tags: entry.tags,
        url,
        stream_url,
        stream_headers: entry.http_headers,
        requested_by,
        volume,
    })
}

/// Caché acotado de búsquedas, con expulsión FIFO al llegar al límite.
/// Un tope pequeño conserva el ahorro de búsquedas repetidas sin crecer
/// sin límite bajo uso multi-servidor.
struct SearchCache {
    cap: usize,
    order: VecDeque<String>,
    entries: HashMap<String, Vec<String>>,
}

impl SearchCache {
    fn new(cap: usize) -> Self {
        Self {
            cap,
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    fn get(&self, query: &str) -> Option<Vec<String>> {
        self.entries.get(query).cloned()
    }

    fn put(&mut self, query: String, urls: Vec<String>) {
        if self.entries.contains_key(&query) {
            self.entries.insert(query, urls);
            return;
        }

        while self.order.len() >= self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }

        self.order.push_back(query.clone());
        self.entries.insert(query, urls);
    }
}
