//! Media URL classification.
//!
//! Maps media URLs onto the `(type, id)` pairs the playlist protocol
//! expects, and back. The rule table mirrors the server's supported
//! providers; raw file links must be https and carry a known extension.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// A media URL could not be classified.
#[derive(Debug, Clone)]
pub struct MediaLinkError(pub String);

impl std::fmt::Display for MediaLinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MediaLinkError {}

/// `(type, id)` media reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLink {
    /// Provider type code (e.g. `yt`, `tw`, `fi`).
    pub kind: String,
    /// Provider-specific media id.
    pub id: String,
}

/// URL pattern → `(type template, id template)`.
///
/// Templates interpolate `{N}` capture groups and `{name}` query
/// parameters; `{url}` is the whole URL.
struct UrlRule {
    pattern: Regex,
    kind: &'static str,
    id: &'static str,
}

const URL_RULES: &[(&str, &str, &str)] = &[
    (r"youtube\.com/watch\?([^#]+)", "yt", "{v}"),
    (r"youtu\.be/([^\?&#]+)", "yt", "{0}"),
    (r"youtube\.com/playlist\?([^#]+)", "yp", "{list}"),
    (r"clips\.twitch\.tv/([A-Za-z]+)", "tc", "{0}"),
    (r"twitch\.tv/(?:.*?)/([cv])/(\d+)", "tv", "{0}{1}"),
    (r"twitch\.tv/videos/(\d+)", "tv", "v{0}"),
    (r"twitch\.tv/([\w-]+)", "tw", "{0}"),
    (r"livestream\.com/([^\?&#]+)", "li", "{0}"),
    (r"ustream\.tv/([^\?&#]+)", "us", "{0}"),
    (r"(?:hitbox|smashcast)\.tv/([^\?&#]+)", "hb", "{0}"),
    (r"vimeo\.com/([^\?&#]+)", "vi", "{0}"),
    (r"dailymotion\.com/video/([^\?&#_]+)", "dm", "{0}"),
    (r"imgur\.com/a/([^\?&#]+)", "im", "{0}"),
    (r"soundcloud\.com/([^\?&#]+)", "sc", "{url}"),
    (r"(?:docs|drive)\.google\.com/file/d/([a-zA-Z0-9_-]+)", "gd", "{0}"),
    (r"drive\.google\.com/open\?id=([a-zA-Z0-9_-]+)", "gd", "{0}"),
    (r"vid\.me/embedded/([\w-]+)", "vm", "{0}"),
    (r"vid\.me/([\w-]+)", "vm", "{0}"),
    (r"(.*\.m3u8)", "hl", "{url}"),
    (r"streamable\.com/([\w-]+)", "sb", "{0}"),
    (r"^dm:([^\?&#_]+)", "dm", "{0}"),
    (r"^fi:(.*)", "fi", "{0}"),
    (r"^cm:(.*)", "cm", "{0}"),
    (r"^([a-z]{2}):([^\?&#]+)", "{0}", "{1}"),
];

/// Raw file extensions the server accepts.
const FILE_TYPES: &[&str] = &[
    ".mp4", ".flv", ".webm", ".ogg", ".ogv", ".mp3", ".mov", ".m4a",
];

fn rules() -> &'static Vec<UrlRule> {
    static RULES: OnceLock<Vec<UrlRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        URL_RULES
            .iter()
            .map(|&(pattern, kind, id)| UrlRule {
                pattern: Regex::new(pattern).expect("valid media pattern"),
                kind,
                id,
            })
            .collect()
    })
}

impl MediaLink {
    #[must_use]
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Classify a media URL.
    pub fn from_url(url: &str) -> Result<Self, MediaLinkError> {
        let url = url.trim().replace("feature=player_embedded&", "");

        if url.starts_with("rtmp://") {
            return Ok(Self::new("rt", url));
        }

        let params = parse_query(&url);
        for rule in rules() {
            if let Some(caps) = rule.pattern.captures(&url) {
                let kind = expand(rule.kind, &caps, &params, &url)?;
                let id = expand(rule.id, &caps, &params, &url)?;
                return Ok(Self::new(kind, id));
            }
        }

        if url.starts_with("https://") {
            let ext = path_extension(&url);
            if ext == ".json" {
                return Ok(Self::new("cm", url));
            }
            if FILE_TYPES.contains(&ext.as_str()) {
                return Ok(Self::new("fi", url));
            }
            return Err(MediaLinkError(format!(
                "unsupported file extension \"{ext}\" (supported: {})",
                FILE_TYPES.join(", ")
            )));
        }

        Err(MediaLinkError(
            "raw files must begin with \"https\"; plain http is not supported".into(),
        ))
    }

    /// The canonical URL for this link. Unknown types fall back to
    /// `type:id` with a warning.
    #[must_use]
    pub fn url(&self) -> String {
        let template = match self.kind.as_str() {
            "yt" => "https://youtube.com/watch?v={0}",
            "yp" => "https://youtube.com/playlist?list={0}",
            "tc" => "https://clips.twitch.tv/{0}",
            "tw" => "https://twitch.tv/{0}",
            "li" => "https://livestream.com/{0}",
            "us" => "https://www.ustream.tv/{0}",
            "hb" => "https://smashcast.tv/{0}",
            "vi" => "https://vimeo.com/{0}",
            "dm" => "https://dailymotion.com/video/{0}",
            "im" => "https://imgur.com/a/{0}",
            "sc" => "https://soundcloud.com/{0}",
            "gd" => "https://drive.google.com/file/d/{0}",
            "vm" => "https://vid.me/{0}",
            "hl" | "fi" | "cm" | "rt" => "{0}",
            "sb" => "https://streamable.com/{0}",
            _ => {
                log::warn!(
                    "[MediaLink] Unknown media type \"{}\" (id=\"{}\")",
                    self.kind,
                    self.id
                );
                return format!("{}:{}", self.kind, self.id);
            }
        };
        template.replace("{0}", &self.id)
    }
}

impl std::fmt::Display for MediaLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Expand a rule template against capture groups and query parameters.
fn expand(
    template: &str,
    caps: &regex::Captures<'_>,
    params: &HashMap<String, String>,
    url: &str,
) -> Result<String, MediaLinkError> {
    let mut out = String::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('}') else {
            out.push_str(&rest[open..]);
            return Ok(out);
        };
        let name = &rest[open + 1..open + close];
        if let Ok(index) = name.parse::<usize>() {
            let group = caps
                .get(index + 1)
                .ok_or_else(|| MediaLinkError(format!("no capture group {index}")))?;
            out.push_str(group.as_str());
        } else if name == "url" {
            out.push_str(url);
        } else {
            let value = params
                .get(name)
                .ok_or_else(|| MediaLinkError(format!("no \"{name}\" parameter in URL")))?;
            out.push_str(value);
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Query parameters of a URL (no percent-decoding; media ids are URL-safe).
fn parse_query(url: &str) -> HashMap<String, String> {
    let Some(query_start) = url.find('?') else {
        return HashMap::new();
    };
    let query = &url[query_start + 1..];
    let query = query.split('#').next().unwrap_or_default();
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// File extension of the URL path (query/fragment stripped), with dot.
fn path_extension(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let name = path.rsplit('/').next().unwrap_or_default();
    match name.rfind('.') {
        Some(dot) => name[dot..].to_ascii_lowercase(),
        None => String::new(),
    }
}
