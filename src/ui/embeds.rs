use serenity::all::Timestamp;
use serenity::builder::{CreateEmbed, CreateEmbedFooter};

use crate::sources::Track;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

const STANDARD_FOOTER: &str = "🎵 Cadence";

/// Embed de "Reproduciendo Ahora", con la anotación de acción pendiente
/// (quién cambió el volumen, quién agregó qué) si la hay.
pub fn now_playing(track: &Track, volume: f32, action: &str) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", track.uploader.clone(), true)
        .field("⏱️ Duración", format_duration(track.duration), true)
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by), true)
        .field("🔊 Volumen", format!("{}%", (volume * 100.0).round() as u32), true);

    if !action.is_empty() {
        embed = embed.field("📣 Acción", action.to_string(), false);
    }

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail.clone());
    }

    embed
        .url(track.url.clone())
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed de una página de la cola. `page` empieza en 1.
pub fn queue_page(items: &[Track], total: usize, page: usize, per_page: usize) -> CreateEmbed {
    if total == 0 {
        return CreateEmbed::default()
            .description("**Cola vacía.**")
            .color(colors::INFO_BLUE)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    let pages = page_count(total, per_page);
    let start = (page.saturating_sub(1)) * per_page;

    let mut body = String::new();
    for (i, track) in items.iter().enumerate() {
        body.push_str(&format!(
            "`{}.` [**{}**]({})\n",
            start + i + 1,
            track.title,
            track.url
        ));
    }

    CreateEmbed::default()
        .description(format!("**{total} track(s):**\n\n{body}"))
        .color(colors::MUSIC_PURPLE)
        .footer(CreateEmbedFooter::new(format!(
            "Viendo página {page}/{pages} · {STANDARD_FOOTER}"
        )))
}

/// Embed de confirmación al agregar un track o una playlist.
pub fn track_added(track: &Track) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Agregado a la cola")
        .description(format!("{track}"))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", format_duration(track.duration), true)
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by), true);

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail.clone());
    }

    embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Progreso de una importación de playlist. Se edita en el sitio,
/// con throttling, en lugar de publicar un mensaje por track.
pub fn playlist_progress(name: &str, done: usize, total: usize) -> CreateEmbed {
    CreateEmbed::default()
        .description(format!(
            "Agregando canciones de **{name}**... ({done}/{total}) 🔄"
        ))
        .color(colors::WARNING_ORANGE)
}

pub fn playlist_done(name: &str, imported: usize, failed: usize) -> CreateEmbed {
    let mut description = format!("✅ Se agregaron {imported} canciones de **{name}**.");
    if failed > 0 {
        description.push_str(&format!(" ({failed} no se pudieron resolver)"));
    }
    CreateEmbed::default()
        .description(description)
        .color(colors::SUCCESS_GREEN)
}

pub fn playlist_aborted(name: &str, imported: usize) -> CreateEmbed {
    CreateEmbed::default()
        .description(format!(
            "⚠️ Bot desconectado del canal de voz. Importación de **{name}** detenida con {imported} canciones agregadas."
        ))
        .color(colors::ERROR_RED)
}

/// Aviso simple (despedida por inactividad, desconexión, errores).
pub fn notice(text: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(text.to_string())
        .color(colors::INFO_BLUE)
}

pub fn error_notice(text: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(format!("❌ {text}"))
        .color(colors::ERROR_RED)
}

/// Número de páginas para `total` elementos a `per_page` por página.
/// Una cola vacía sigue teniendo una página (la vista "Cola vacía").
pub fn page_count(total: usize, per_page: usize) -> usize {
    if total == 0 {
        1
    } else {
        total.div_ceil(per_page)
    }
}

/// Límites `[start, end)` de una página, ya acotados al total.
pub fn page_bounds(page: usize, per_page: usize, total: usize) -> (usize, usize) {
    let page = page.max(1);
    let start = (page - 1) * per_page;
    let end = (start + per_page).min(total);
    (start.min(total), end)
}

/// Formatea segundos como `m:ss` o `h:mm:ss`; 0 es una transmisión en vivo.
pub fn format_duration(secs: u64) -> String {
    if secs == 0 {
        return "🔴 En vivo".to_string();
    }

    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_page_math_for_25_tracks() {
        // 25 tracks a 10 por página: 3 páginas, la 1 muestra 1-10,
        // la 3 muestra 21-25.
        assert_eq!(page_count(25, 10), 3);
        assert_eq!(page_bounds(1, 10, 25), (0, 10));
        assert_eq!(page_bounds(3, 10, 25), (20, 25));
    }

    #[test]
    fn test_page_math_edges() {
        assert_eq!(page_count(0, 10), 1);
        assert_eq!(page_count(10, 10), 1);
        assert_eq!(page_count(11, 10), 2);
        // Página fuera de rango queda acotada al total
        assert_eq!(page_bounds(9, 10, 25), (25, 25));
        // Página 0 se trata como página 1
        assert_eq!(page_bounds(0, 10, 25), (0, 10));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "🔴 En vivo");
        assert_eq!(format_duration(59), "0:59");
        assert_eq!(format_duration(200), "3:20");
        assert_eq!(format_duration(3725), "1:02:05");
    }
}
