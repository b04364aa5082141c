//! User identity and metadata.

use serde_json::Value;

use crate::cloak::uncloak_ip;

/// A channel user (including the bot's own identity).
///
/// Profile and meta are merged from `userlist`/`addUser`/`setUserMeta`
/// events; setting a cloaked IP eagerly computes the uncloak candidates.
#[derive(Debug, Clone)]
pub struct User {
    pub name: String,
    pub password: Option<String>,
    pub rank: f64,
    pub image: String,
    pub text: String,
    pub afk: bool,
    pub muted: bool,
    pub smuted: bool,
    ip: Option<String>,
    pub uncloaked_ip: Vec<String>,
    pub aliases: Vec<String>,
}

impl Default for User {
    fn default() -> Self {
        Self {
            name: String::new(),
            password: None,
            rank: -1.0,
            image: String::new(),
            text: String::new(),
            afk: false,
            muted: false,
            smuted: false,
            ip: None,
            uncloaked_ip: Vec::new(),
            aliases: Vec::new(),
        }
    }
}

impl User {
    /// An anonymous (nameless) user.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new(name: impl Into<String>, password: Option<String>) -> Self {
        Self {
            name: name.into(),
            password,
            ..Self::default()
        }
    }

    /// Build a user from a `userlist`/`addUser` entry.
    #[must_use]
    pub fn from_event(data: &Value) -> Self {
        let mut user = Self::new(
            data.get("name").and_then(Value::as_str).unwrap_or_default(),
            None,
        );
        user.apply_event(data);
        user
    }

    /// Merge the fields present in an event payload.
    pub fn apply_event(&mut self, data: &Value) {
        if let Some(name) = data.get("name").and_then(Value::as_str) {
            self.name = name.to_string();
        }
        if let Some(rank) = data.get("rank").and_then(Value::as_f64) {
            self.rank = rank;
        }
        if let Some(profile) = data.get("profile") {
            self.apply_profile(profile);
        }
        if let Some(meta) = data.get("meta") {
            self.apply_meta(meta);
        }
    }

    /// Replace the profile fields.
    pub fn apply_profile(&mut self, profile: &Value) {
        self.image = profile
            .get("image")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.text = profile
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
    }

    /// Replace the meta fields (afk/muted/smuted/ip/aliases).
    pub fn apply_meta(&mut self, meta: &Value) {
        self.afk = meta.get("afk").and_then(Value::as_bool).unwrap_or(false);
        self.muted = meta.get("muted").and_then(Value::as_bool).unwrap_or(false);
        self.smuted = meta.get("smuted").and_then(Value::as_bool).unwrap_or(false);
        self.set_ip(
            meta.get("ip")
                .and_then(Value::as_str)
                .map(str::to_string),
        );
        self.aliases = meta
            .get("aliases")
            .and_then(Value::as_array)
            .map(|aliases| {
                aliases
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
    }

    /// The cloaked IP, if the server exposed one.
    #[must_use]
    pub fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    /// Set the cloaked IP and recompute the uncloak candidates.
    pub fn set_ip(&mut self, ip: Option<String>) {
        self.uncloaked_ip = match &ip {
            Some(ip) => uncloak_ip(ip, Some(0)),
            None => Vec::new(),
        };
        self.ip = ip;
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.ip {
            Some(ip) => write!(
                f,
                "<user \"{}\" [{} {:?}] (rank {:.2})>",
                self.name, ip, self.uncloaked_ip, self.rank
            ),
            None => write!(f, "<user \"{}\" (rank {:.2})>", self.name, self.rank),
        }
    }
}
