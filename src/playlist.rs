//! Playlist mirror.
//!
//! Updated strictly in inbound-event order by the session's default
//! handlers; holds no locking or protocol logic of its own.

use serde_json::Value;

/// One playlist entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistItem {
    pub uid: i64,
    pub temp: bool,
    /// Name of the user who queued the item.
    pub queueby: String,
    pub title: String,
    pub media_type: String,
    pub media_id: String,
    /// Duration in seconds.
    pub duration: f64,
}

impl PlaylistItem {
    /// Parse a `queue`/`playlist` item payload
    /// (`{uid, temp, queueby, media: {title, type, id, seconds}}`).
    #[must_use]
    pub fn from_event(data: &Value) -> Option<Self> {
        let media = data.get("media")?;
        Some(Self {
            uid: data.get("uid")?.as_i64()?,
            temp: data.get("temp").and_then(Value::as_bool).unwrap_or(false),
            queueby: data
                .get("queueby")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            title: media
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            media_type: media
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            media_id: media
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            duration: media.get("seconds").and_then(Value::as_f64).unwrap_or(0.0),
        })
    }
}

impl std::fmt::Display for PlaylistItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<playlist item #{} \"{}\">", self.uid, self.title)
    }
}

/// The channel playlist.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    /// Total runtime reported by `setPlaylistMeta`.
    pub time: f64,
    pub paused: bool,
    pub current_time: f64,
    pub locked: bool,
    current: Option<i64>,
    pub queue: Vec<PlaylistItem>,
}

impl Playlist {
    #[must_use]
    pub fn new() -> Self {
        Self {
            paused: true,
            ..Self::default()
        }
    }

    /// UID of the currently playing item.
    #[must_use]
    pub fn current_uid(&self) -> Option<i64> {
        self.current
    }

    /// The currently playing item.
    #[must_use]
    pub fn current_item(&self) -> Option<&PlaylistItem> {
        self.current.and_then(|uid| self.get(uid))
    }

    /// Set the current item by uid (`None` clears it).
    pub fn set_current(&mut self, uid: Option<i64>) {
        match uid {
            Some(uid) if self.get(uid).is_none() => {
                log::warn!("[Playlist] setCurrent: unknown uid {uid}");
                self.current = None;
            }
            _ => self.current = uid,
        }
    }

    #[must_use]
    pub fn get(&self, uid: i64) -> Option<&PlaylistItem> {
        self.queue.iter().find(|item| item.uid == uid)
    }

    #[must_use]
    pub fn get_mut(&mut self, uid: i64) -> Option<&mut PlaylistItem> {
        self.queue.iter_mut().find(|item| item.uid == uid)
    }

    fn index_of(&self, uid: i64) -> Option<usize> {
        self.queue.iter().position(|item| item.uid == uid)
    }

    /// Insert an item after the item with uid `after` (`None` appends).
    pub fn add(&mut self, after: Option<i64>, item: PlaylistItem) {
        match after.and_then(|uid| self.index_of(uid)) {
            Some(index) => self.queue.insert(index + 1, item),
            None => self.queue.push(item),
        }
    }

    /// Remove an item; clears playback state if it was current.
    pub fn remove(&mut self, uid: i64) {
        if self.current == Some(uid) {
            self.current = None;
            self.current_time = 0.0;
            self.paused = true;
        }
        match self.index_of(uid) {
            Some(index) => {
                self.queue.remove(index);
            }
            None => log::warn!("[Playlist] remove: unknown uid {uid}"),
        }
    }

    /// Move an item after another (`after` may also be the literal
    /// `"prepend"`, moving it to the front).
    pub fn move_item(&mut self, from: i64, after: &Value) {
        let Some(index) = self.index_of(from) else {
            log::warn!("[Playlist] move: unknown uid {from}");
            return;
        };
        let item = self.queue.remove(index);
        match after.as_i64() {
            Some(uid) => self.add(Some(uid), item),
            None => self.queue.insert(0, item),
        }
    }

    /// Reset to the empty, paused state.
    pub fn clear(&mut self) {
        self.time = 0.0;
        self.paused = true;
        self.current = None;
        self.current_time = 0.0;
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(uid: i64) -> PlaylistItem {
        PlaylistItem {
            uid,
            temp: true,
            queueby: "bot".into(),
            title: format!("item {uid}"),
            media_type: "yt".into(),
            media_id: format!("id{uid}"),
            duration: 60.0,
        }
    }

    #[test]
    fn test_from_event() {
        let parsed = PlaylistItem::from_event(&json!({
            "uid": 7,
            "temp": true,
            "queueby": "alice",
            "media": {"title": "song", "type": "yt", "id": "abc", "seconds": 212},
        }))
        .expect("valid item");
        assert_eq!(parsed.uid, 7);
        assert_eq!(parsed.title, "song");
        assert_eq!(parsed.duration, 212.0);
        assert!(PlaylistItem::from_event(&json!({"uid": 1})).is_none());
    }

    #[test]
    fn test_add_after() {
        let mut playlist = Playlist::new();
        playlist.add(None, item(1));
        playlist.add(None, item(3));
        playlist.add(Some(1), item(2));
        let uids: Vec<i64> = playlist.queue.iter().map(|i| i.uid).collect();
        assert_eq!(uids, vec![1, 2, 3]);
    }

    #[test]
    fn test_remove_current_resets_playback() {
        let mut playlist = Playlist::new();
        playlist.add(None, item(1));
        playlist.set_current(Some(1));
        playlist.paused = false;
        playlist.current_time = 30.0;

        playlist.remove(1);
        assert!(playlist.current_uid().is_none());
        assert!(playlist.paused);
        assert_eq!(playlist.current_time, 0.0);
        assert!(playlist.queue.is_empty());
    }

    #[test]
    fn test_move_item() {
        let mut playlist = Playlist::new();
        for uid in 1..=3 {
            playlist.add(None, item(uid));
        }
        playlist.move_item(1, &json!(3));
        let uids: Vec<i64> = playlist.queue.iter().map(|i| i.uid).collect();
        assert_eq!(uids, vec![2, 3, 1]);

        playlist.move_item(1, &json!("prepend"));
        let uids: Vec<i64> = playlist.queue.iter().map(|i| i.uid).collect();
        assert_eq!(uids, vec![1, 2, 3]);
    }

    #[test]
    fn test_clear() {
        let mut playlist = Playlist::new();
        playlist.add(None, item(1));
        playlist.set_current(Some(1));
        playlist.clear();
        assert!(playlist.queue.is_empty());
        assert!(playlist.current_uid().is_none());
        assert!(playlist.paused);
    }
}
