//! Channel state mirror.
//!
//! Holds everything the inbound event stream reports about the joined
//! channel: metadata, permissions, the user directory, and the playlist.
//! The session's default handlers update it strictly in event order; this
//! module itself has no concurrency or protocol logic.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::CytubeError;
use crate::playlist::Playlist;
use crate::user::User;

/// Directory of users currently in the channel.
#[derive(Debug, Clone, Default)]
pub struct UserList {
    users: HashMap<String, User>,
    /// Server-reported user count (includes anonymous viewers).
    pub count: i64,
    leader: Option<String>,
}

impl UserList {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&User> {
        self.users.get(name)
    }

    #[must_use]
    pub fn get_mut(&mut self, name: &str) -> Option<&mut User> {
        self.users.get_mut(name)
    }

    /// Add a user; an existing entry under the same name is replaced with a
    /// warning.
    pub fn add(&mut self, user: User) {
        if self.users.insert(user.name.clone(), user).is_some() {
            log::warn!("[Channel] add: user exists, replacing");
        }
    }

    /// Remove a user by name.
    pub fn remove(&mut self, name: &str) -> Option<User> {
        if self.leader.as_deref() == Some(name) {
            self.leader = None;
        }
        self.users.remove(name)
    }

    /// The current leader, if any.
    #[must_use]
    pub fn leader(&self) -> Option<&User> {
        self.leader.as_deref().and_then(|name| self.users.get(name))
    }

    /// Set the leader by name (empty name clears it).
    pub fn set_leader(&mut self, name: &str) {
        if name.is_empty() {
            self.leader = None;
        } else {
            if !self.users.contains_key(name) {
                log::warn!("[Channel] setLeader: unknown user {name}");
            }
            self.leader = Some(name.to_string());
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn clear(&mut self) {
        self.users.clear();
        self.leader = None;
    }
}

/// The joined channel.
#[derive(Debug, Clone)]
pub struct Channel {
    pub name: String,
    pub password: Option<String>,
    pub drink_count: i64,
    pub motd: String,
    pub css: String,
    pub js: String,
    pub emotes: Value,
    pub options: Value,
    /// Action name → minimum rank.
    pub permissions: HashMap<String, f64>,
    pub voteskip_count: i64,
    pub voteskip_need: i64,
    pub userlist: UserList,
    pub playlist: Playlist,
}

impl Channel {
    #[must_use]
    pub fn new(name: impl Into<String>, password: Option<String>) -> Self {
        Self {
            name: name.into(),
            password,
            drink_count: 0,
            motd: String::new(),
            css: String::new(),
            js: String::new(),
            emotes: Value::Null,
            options: Value::Null,
            permissions: HashMap::new(),
            voteskip_count: 0,
            voteskip_need: 0,
            userlist: UserList::default(),
            playlist: Playlist::new(),
        }
    }

    /// Replace the permissions table from a `setPermissions` payload.
    pub fn set_permissions(&mut self, data: &Value) {
        self.permissions = data
            .as_object()
            .map(|map| {
                map.iter()
                    .filter_map(|(action, rank)| Some((action.clone(), rank.as_f64()?)))
                    .collect()
            })
            .unwrap_or_default();
    }

    /// Require `user` to hold the permission for `action`.
    ///
    /// An unknown action is a channel error (the table never listed it);
    /// an insufficient rank is a permission error. Neither touches the
    /// network.
    pub fn check_permission(&self, action: &str, user: &User) -> Result<(), CytubeError> {
        let min_rank = self
            .permissions
            .get(action)
            .ok_or_else(|| CytubeError::Channel(format!("unknown action \"{action}\"")))?;
        if user.rank < *min_rank {
            return Err(CytubeError::Permission(format!(
                "\"{action}\": permission denied ({} rank {} < {})",
                user.name, user.rank, min_rank
            )));
        }
        Ok(())
    }

    /// Non-failing permission probe.
    #[must_use]
    pub fn has_permission(&self, action: &str, user: &User) -> bool {
        matches!(self.check_permission(action, user), Ok(()))
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<channel \"{}\">", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ranked_user(rank: f64) -> User {
        let mut user = User::new("alice", None);
        user.rank = rank;
        user
    }

    #[test]
    fn test_check_permission() {
        let mut channel = Channel::new("test", None);
        channel.set_permissions(&json!({"chat": 1.0, "chatclear": 2.0}));

        assert!(channel.check_permission("chat", &ranked_user(1.0)).is_ok());
        let err = channel
            .check_permission("chat", &ranked_user(0.0))
            .expect_err("denied");
        assert!(matches!(err, CytubeError::Permission(_)));

        let err = channel
            .check_permission("nonsense", &ranked_user(5.0))
            .expect_err("unknown");
        assert!(matches!(err, CytubeError::Channel(_)));
    }

    #[test]
    fn test_has_permission() {
        let mut channel = Channel::new("test", None);
        channel.set_permissions(&json!({"chat": 1.5}));
        assert!(channel.has_permission("chat", &ranked_user(2.0)));
        assert!(!channel.has_permission("chat", &ranked_user(1.0)));
        assert!(!channel.has_permission("unknown", &ranked_user(9.0)));
    }

    #[test]
    fn test_userlist_add_replace_remove() {
        let mut list = UserList::default();
        list.add(User::new("alice", None));
        list.add(User::new("bob", None));
        assert_eq!(list.len(), 2);

        // Replacing keeps a single entry
        list.add(User::new("alice", None));
        assert_eq!(list.len(), 2);

        assert!(list.remove("alice").is_some());
        assert!(list.remove("alice").is_none());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_leader() {
        let mut list = UserList::default();
        list.add(User::new("alice", None));
        list.set_leader("alice");
        assert_eq!(list.leader().map(|u| u.name.as_str()), Some("alice"));
        list.set_leader("");
        assert!(list.leader().is_none());

        list.set_leader("alice");
        list.remove("alice");
        assert!(list.leader().is_none());
    }
}
