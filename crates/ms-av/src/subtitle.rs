//! Subtitle artifact naming.
//!
//! Output filenames are derived deterministically from the source
//! filename, a normalized two-letter language code, an optional "forced"
//! marker, and an extension chosen from the subtitle codec family.

/// Common three-letter and long-form language tags mapped to two-letter
/// codes. Tags not in the table fall back to the raw tag, lowercased.
const LANGUAGE_MAP: &[(&str, &str)] = &[
    ("eng", "en"),
    ("english", "en"),
    ("ger", "de"),
    ("deu", "de"),
    ("german", "de"),
    ("fre", "fr"),
    ("fra", "fr"),
    ("french", "fr"),
    ("spa", "es"),
    ("spanish", "es"),
    ("ita", "it"),
    ("italian", "it"),
    ("jpn", "ja"),
    ("japanese", "ja"),
    ("chi", "zh"),
    ("zho", "zh"),
    ("chinese", "zh"),
    ("rus", "ru"),
    ("russian", "ru"),
    ("por", "pt"),
    ("portuguese", "pt"),
    ("dut", "nl"),
    ("nld", "nl"),
    ("dutch", "nl"),
    ("kor", "ko"),
    ("korean", "ko"),
    ("ara", "ar"),
    ("arabic", "ar"),
    ("pol", "pl"),
    ("polish", "pl"),
    ("swe", "sv"),
    ("swedish", "sv"),
    ("nor", "no"),
    ("norwegian", "no"),
    ("dan", "da"),
    ("danish", "da"),
    ("fin", "fi"),
    ("finnish", "fi"),
    ("hin", "hi"),
    ("hindi", "hi"),
    ("tur", "tr"),
    ("turkish", "tr"),
    ("ces", "cs"),
    ("cze", "cs"),
    ("czech", "cs"),
    ("ell", "el"),
    ("gre", "el"),
    ("greek", "el"),
    ("heb", "he"),
    ("hebrew", "he"),
    ("hun", "hu"),
    ("hungarian", "hu"),
    ("tha", "th"),
    ("thai", "th"),
    ("ukr", "uk"),
    ("ukrainian", "uk"),
    ("vie", "vi"),
    ("vietnamese", "vi"),
];

/// Normalize a language tag to a two-letter code, falling back to the raw
/// tag (lowercased) when no mapping exists.
pub fn normalize_language(tag: &str) -> String {
    let lower = tag.trim().to_lowercase();
    LANGUAGE_MAP
        .iter()
        .find(|(from, _)| *from == lower)
        .map(|(_, to)| to.to_string())
        .unwrap_or(lower)
}

/// Pick the output extension for a subtitle codec family.
pub fn extension_for_codec(codec: Option<&str>) -> &'static str {
    match codec.map(|c| c.to_lowercase()).as_deref() {
        Some("subrip") | Some("srt") => "srt",
        Some("ass") | Some("ssa") => "ass",
        Some("webvtt") | Some("vtt") => "vtt",
        Some("mov_text") | Some("tx3g") => "srt",
        Some("hdmv_pgs_subtitle") | Some("pgs") => "sup",
        Some("dvd_subtitle") | Some("dvb_subtitle") => "sub",
        _ => "srt",
    }
}

/// Derive the subtitle output filename for a source file.
pub fn subtitle_file_name(
    source_name: &str,
    language: Option<&str>,
    forced: bool,
    codec: Option<&str>,
) -> String {
    let stem = source_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(source_name);
    let ext = extension_for_codec(codec);

    let mut name = stem.to_string();
    if let Some(lang) = language {
        name.push('.');
        name.push_str(&normalize_language(lang));
    }
    if forced {
        name.push_str(".forced");
    }
    name.push('.');
    name.push_str(ext);
    name
}
