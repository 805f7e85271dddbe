use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};

use hikebot_common::{
    AuthUser, DM_DESCRIPTION, FriendRequestItem, FriendSummary, GroupMember, GroupMessage,
    GroupSummary, MemberRole, MessageRole, TrailRecord, TrailSummary,
};

use crate::errors::HikeError;

/// Tag columns copied from OSM ways into the trail table, in column order.
pub const TRAIL_TAG_COLUMNS: [&str; 16] = [
    "sac_scale",
    "trail_visibility",
    "smoothness",
    "surface",
    "tracktype",
    "width",
    "incline",
    "description",
    "access",
    "foot",
    "dog",
    "bicycle",
    "horse",
    "tourism",
    "natural",
    "landmark",
];

/// Name given to seeded ways that carry no `name` tag.
pub const UNNAMED_TRAIL: &str = "Unnamed Trail";

const MESSAGE_HISTORY_LIMIT: i64 = 100;

/// Async-safe handle to the HikeBot database.
///
/// Wraps `HikeDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<HikeDb>>,
}

impl DbHandle {
    pub fn new(db: HikeDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&HikeDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

/// Outcome of a friend request.
#[derive(Debug, Clone, PartialEq)]
pub enum FriendRequestOutcome {
    /// A request already exists in one direction or the other.
    Exists,
    Sent { username: String },
}

/// One OSM way converted for insertion into a trail table.
#[derive(Debug, Clone, Default)]
pub struct NewTrail {
    pub name: String,
    pub length_km: f64,
    /// Only keys listed in [`TRAIL_TAG_COLUMNS`] are written.
    pub tags: BTreeMap<String, String>,
    /// WKT `LINESTRING`, lon lat order.
    pub geometry: String,
}

pub struct HikeDb {
    conn: Connection,
}

impl HikeDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    user_code TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    password_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username_lower ON users(LOWER(username));

                CREATE TABLE IF NOT EXISTS friend_requests (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    from_user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    to_user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    status TEXT NOT NULL DEFAULT 'pending',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE(from_user_id, to_user_id)
                );

                CREATE TABLE IF NOT EXISTS friendships (
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    friend_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (user_id, friend_id)
                );

                CREATE TABLE IF NOT EXISTS groups (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    description TEXT,
                    created_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS group_members (
                    group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    role TEXT NOT NULL DEFAULT 'member',
                    joined_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (group_id, user_id)
                );

                CREATE TABLE IF NOT EXISTS group_messages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                    user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
                    sender_display TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'user',
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_group_members_user ON group_members(user_id);
                CREATE INDEX IF NOT EXISTS idx_group_messages_group ON group_messages(group_id, id);
                CREATE INDEX IF NOT EXISTS idx_friend_requests_to ON friend_requests(to_user_id, status);
                ",
            )
            .context("Failed to create tables")?;

        self.conn
            .execute_batch(&trail_table_sql("trails"))
            .context("Failed to create trails table")?;
        Ok(())
    }

    // ── Users ─────────────────────────────────────────────────────────

    /// Insert a new user. Username and user code are unique ignoring case.
    pub fn create_user(
        &self,
        username: &str,
        user_code: &str,
        password_hash: &str,
    ) -> Result<AuthUser> {
        let name_taken: bool = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(username) = LOWER(?1))",
                params![username],
                |row| row.get(0),
            )
            .context("Failed to check username")?;
        if name_taken {
            bail!(HikeError::Validation("Username already exists".into()));
        }

        let code_taken: bool = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(user_code) = LOWER(?1))",
                params![user_code],
                |row| row.get(0),
            )
            .context("Failed to check user_code")?;
        if code_taken {
            bail!(HikeError::Validation(format!(
                "User code {} is already taken",
                user_code
            )));
        }

        self.conn
            .execute(
                "INSERT INTO users (username, user_code, password_hash) VALUES (?1, ?2, ?3)",
                params![username, user_code, password_hash],
            )
            .context("Failed to insert user")?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.context("User not found after insert")
    }

    pub fn get_user(&self, id: i64) -> Result<Option<AuthUser>> {
        self.conn
            .query_row(
                "SELECT id, username, user_code FROM users WHERE id = ?1",
                params![id],
                auth_user_from_row,
            )
            .optional()
            .context("Failed to query user")
    }

    /// Look up a user and their stored password hash by exact username.
    pub fn get_credentials(&self, username: &str) -> Result<Option<(AuthUser, String)>> {
        self.conn
            .query_row(
                "SELECT id, username, user_code, password_hash FROM users WHERE username = ?1",
                params![username],
                |row| Ok((auth_user_from_row(row)?, row.get::<_, String>(3)?)),
            )
            .optional()
            .context("Failed to query credentials")
    }

    /// Resolve the caller from the username and user code pair.
    pub fn find_user_by_identity(&self, username: &str, user_code: &str) -> Result<Option<AuthUser>> {
        self.conn
            .query_row(
                "SELECT id, username, user_code FROM users WHERE username = ?1 AND user_code = ?2",
                params![username, user_code],
                auth_user_from_row,
            )
            .optional()
            .context("Failed to query user by identity")
    }

    pub fn find_user_by_code(&self, user_code: &str) -> Result<Option<AuthUser>> {
        self.conn
            .query_row(
                "SELECT id, username, user_code FROM users WHERE user_code = ?1",
                params![user_code],
                auth_user_from_row,
            )
            .optional()
            .context("Failed to query user by code")
    }

    // ── Friends ───────────────────────────────────────────────────────

    pub fn list_friends(&self, user_id: i64) -> Result<Vec<FriendSummary>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT u.id, u.username, u.user_code
                 FROM friendships f JOIN users u ON f.friend_id = u.id
                 WHERE f.user_id = ?1
                 ORDER BY u.username COLLATE NOCASE",
            )
            .context("Failed to prepare list_friends")?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(FriendSummary {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    user_code: row.get(2)?,
                })
            })
            .context("Failed to query friends")?;
        let mut friends = Vec::new();
        for row in rows {
            friends.push(row.context("Failed to read friend row")?);
        }
        Ok(friends)
    }

    pub fn send_friend_request(&self, me: i64, friend_code: &str) -> Result<FriendRequestOutcome> {
        let target = self
            .find_user_by_code(friend_code.trim())?
            .ok_or(HikeError::UserNotFound)?;
        if target.id == me {
            bail!(HikeError::Validation("Cannot add self".into()));
        }

        let exists: bool = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM friend_requests
                 WHERE (from_user_id = ?1 AND to_user_id = ?2)
                    OR (from_user_id = ?2 AND to_user_id = ?1))",
                params![me, target.id],
                |row| row.get(0),
            )
            .context("Failed to check existing friend request")?;
        if exists {
            return Ok(FriendRequestOutcome::Exists);
        }

        self.conn
            .execute(
                "INSERT INTO friend_requests (from_user_id, to_user_id, status) VALUES (?1, ?2, 'pending')",
                params![me, target.id],
            )
            .context("Failed to insert friend request")?;
        Ok(FriendRequestOutcome::Sent {
            username: target.username,
        })
    }

    /// Pending requests addressed to `user_id`.
    pub fn list_friend_requests(&self, user_id: i64) -> Result<Vec<FriendRequestItem>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT r.id, r.from_user_id, u.username, u.user_code, r.created_at
                 FROM friend_requests r JOIN users u ON r.from_user_id = u.id
                 WHERE r.to_user_id = ?1 AND r.status = 'pending'
                 ORDER BY r.id",
            )
            .context("Failed to prepare list_friend_requests")?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(FriendRequestItem {
                    id: row.get(0)?,
                    from_user_id: row.get(1)?,
                    from_username: row.get(2)?,
                    from_user_code: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .context("Failed to query friend requests")?;
        let mut requests = Vec::new();
        for row in rows {
            requests.push(row.context("Failed to read friend request row")?);
        }
        Ok(requests)
    }

    /// Accept a request addressed to `me` and create both friendship rows.
    pub fn accept_friend_request(&self, me: i64, request_id: i64) -> Result<()> {
        let from_user_id: i64 = self
            .conn
            .query_row(
                "SELECT from_user_id FROM friend_requests WHERE id = ?1 AND to_user_id = ?2",
                params![request_id, me],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query friend request")?
            .ok_or(HikeError::RequestNotFound)?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "UPDATE friend_requests SET status = 'accepted' WHERE id = ?1",
            params![request_id],
        )
        .context("Failed to mark request accepted")?;
        for (a, b) in [(me, from_user_id), (from_user_id, me)] {
            tx.execute(
                "INSERT OR IGNORE INTO friendships (user_id, friend_id) VALUES (?1, ?2)",
                params![a, b],
            )
            .context("Failed to insert friendship")?;
        }
        tx.commit().context("Failed to commit friend accept")?;
        Ok(())
    }

    /// Drop the friendship in both directions, along with any request rows.
    pub fn remove_friend(&self, me: i64, friend_id: i64) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "DELETE FROM friendships WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
            params![me, friend_id],
        )
        .context("Failed to delete friendship")?;
        tx.execute(
            "DELETE FROM friend_requests WHERE (from_user_id = ?1 AND to_user_id = ?2) OR (from_user_id = ?2 AND to_user_id = ?1)",
            params![me, friend_id],
        )
        .context("Failed to delete friend requests")?;
        tx.commit().context("Failed to commit friend removal")?;
        Ok(())
    }

    /// Find the DM group shared with `friend_id`, creating it if needed.
    /// Returns the group id and whether it was created.
    pub fn get_or_create_dm(&self, me: &AuthUser, friend_id: i64) -> Result<(String, bool)> {
        if friend_id == me.id {
            bail!(HikeError::Validation("Cannot DM self".into()));
        }

        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT g.id FROM groups g
                 JOIN group_members a ON g.id = a.group_id
                 JOIN group_members b ON g.id = b.group_id
                 WHERE a.user_id = ?1 AND b.user_id = ?2 AND g.description = ?3
                 LIMIT 1",
                params![me.id, friend_id, DM_DESCRIPTION],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up DM group")?;
        if let Some(id) = existing {
            return Ok((id, false));
        }

        let friend = self.get_user(friend_id)?.ok_or(HikeError::UserNotFound)?;
        let name = format!("DM: {} & {}", me.username, friend.username);
        let id = uuid::Uuid::new_v4().to_string();

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO groups (id, name, description, created_by) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, DM_DESCRIPTION, me.id],
        )
        .context("Failed to insert DM group")?;
        for user_id in [me.id, friend_id] {
            tx.execute(
                "INSERT INTO group_members (group_id, user_id, role) VALUES (?1, ?2, 'admin')",
                params![id, user_id],
            )
            .context("Failed to insert DM member")?;
        }
        tx.commit().context("Failed to commit DM creation")?;
        Ok((id, true))
    }

    // ── Groups ────────────────────────────────────────────────────────

    /// Groups the user belongs to, newest first.
    pub fn list_groups(&self, user_id: i64) -> Result<Vec<GroupSummary>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT g.id, g.name, g.description, g.created_at
                 FROM groups g JOIN group_members gm ON g.id = gm.group_id
                 WHERE gm.user_id = ?1
                 ORDER BY g.created_at DESC, g.rowid DESC",
            )
            .context("Failed to prepare list_groups")?;
        let rows = stmt
            .query_map(params![user_id], group_from_row)
            .context("Failed to query groups")?;
        let mut groups = Vec::new();
        for row in rows {
            groups.push(row.context("Failed to read group row")?);
        }
        Ok(groups)
    }

    pub fn get_group(&self, group_id: &str) -> Result<Option<GroupSummary>> {
        self.conn
            .query_row(
                "SELECT id, name, description, created_at FROM groups WHERE id = ?1",
                params![group_id],
                group_from_row,
            )
            .optional()
            .context("Failed to query group")
    }

    /// Create a group with `creator` as admin. Each distinct known code other
    /// than the creator's own becomes a plain member; unknown codes are skipped.
    pub fn create_group(
        &self,
        creator: i64,
        name: &str,
        description: Option<&str>,
        member_codes: &[String],
    ) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            bail!(HikeError::Validation("Group name is required".into()));
        }
        let id = uuid::Uuid::new_v4().to_string();

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO groups (id, name, description, created_by) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, description, creator],
        )
        .context("Failed to insert group")?;
        tx.execute(
            "INSERT INTO group_members (group_id, user_id, role) VALUES (?1, ?2, 'admin')",
            params![id, creator],
        )
        .context("Failed to insert group admin")?;

        let mut seen = std::collections::BTreeSet::new();
        for code in member_codes.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
            if !seen.insert(code) {
                continue;
            }
            let target: Option<i64> = tx
                .query_row(
                    "SELECT id FROM users WHERE user_code = ?1",
                    params![code],
                    |row| row.get(0),
                )
                .optional()
                .context("Failed to look up member code")?;
            match target {
                Some(uid) if uid != creator => {
                    tx.execute(
                        "INSERT OR IGNORE INTO group_members (group_id, user_id, role) VALUES (?1, ?2, 'member')",
                        params![id, uid],
                    )
                    .context("Failed to insert group member")?;
                }
                _ => {}
            }
        }
        tx.commit().context("Failed to commit group creation")?;
        Ok(id)
    }

    pub fn member_role(&self, group_id: &str, user_id: i64) -> Result<Option<MemberRole>> {
        let role: Option<String> = self
            .conn
            .query_row(
                "SELECT role FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                params![group_id, user_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query member role")?;
        Ok(role.map(|r| r.parse().unwrap_or(MemberRole::Member)))
    }

    /// Fails with `GroupNotFound` or `NotMember` unless `user_id` is in the group.
    pub fn require_member(&self, group_id: &str, user_id: i64) -> Result<GroupSummary> {
        let group = self
            .get_group(group_id)?
            .ok_or_else(|| HikeError::GroupNotFound {
                id: group_id.to_string(),
            })?;
        if self.member_role(group_id, user_id)?.is_none() {
            bail!(HikeError::NotMember {
                group_id: group_id.to_string(),
            });
        }
        Ok(group)
    }

    pub fn list_members(&self, group_id: &str, viewer: i64) -> Result<Vec<GroupMember>> {
        self.require_member(group_id, viewer)?;
        let mut stmt = self
            .conn
            .prepare(
                "SELECT u.id, u.username, u.user_code, gm.role
                 FROM group_members gm JOIN users u ON gm.user_id = u.id
                 WHERE gm.group_id = ?1
                 ORDER BY gm.joined_at, u.id",
            )
            .context("Failed to prepare list_members")?;
        let rows = stmt
            .query_map(params![group_id], |row| {
                let role: String = row.get(3)?;
                Ok(GroupMember {
                    user_id: row.get(0)?,
                    username: row.get(1)?,
                    user_code: row.get(2)?,
                    role: role.parse().unwrap_or(MemberRole::Member),
                })
            })
            .context("Failed to query members")?;
        let mut members = Vec::new();
        for row in rows {
            members.push(row.context("Failed to read member row")?);
        }
        Ok(members)
    }

    pub fn join_group(&self, group_id: &str, user_id: i64) -> Result<()> {
        let group = self
            .get_group(group_id)?
            .ok_or_else(|| HikeError::GroupNotFound {
                id: group_id.to_string(),
            })?;
        if group.is_dm() {
            bail!(HikeError::Forbidden("Cannot join a direct message".into()));
        }
        self.conn
            .execute(
                "INSERT OR IGNORE INTO group_members (group_id, user_id, role) VALUES (?1, ?2, 'member')",
                params![group_id, user_id],
            )
            .context("Failed to join group")?;
        Ok(())
    }

    /// Remove the user from the group. Returns `true` when the group was
    /// deleted because nobody is left.
    pub fn leave_group(&self, group_id: &str, user_id: i64) -> Result<bool> {
        self.require_member(group_id, user_id)?;
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            params![group_id, user_id],
        )
        .context("Failed to leave group")?;
        let remaining: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM group_members WHERE group_id = ?1",
                params![group_id],
                |row| row.get(0),
            )
            .context("Failed to count members")?;
        let deleted = remaining == 0;
        if deleted {
            tx.execute("DELETE FROM groups WHERE id = ?1", params![group_id])
                .context("Failed to delete empty group")?;
        }
        tx.commit().context("Failed to commit leave")?;
        Ok(deleted)
    }

    /// Add the user with `friend_code` to the group on behalf of member `inviter`.
    pub fn invite_member(&self, group_id: &str, inviter: i64, friend_code: &str) -> Result<AuthUser> {
        let group = self.require_member(group_id, inviter)?;
        if group.is_dm() {
            bail!(HikeError::Forbidden("Cannot invite into a direct message".into()));
        }
        let target = self
            .find_user_by_code(friend_code.trim())?
            .ok_or(HikeError::UserNotFound)?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO group_members (group_id, user_id, role) VALUES (?1, ?2, 'member')",
                params![group_id, target.id],
            )
            .context("Failed to insert invited member")?;
        Ok(target)
    }

    pub fn kick_member(&self, group_id: &str, admin: i64, user_id: i64) -> Result<()> {
        self.require_member(group_id, admin)?;
        if self.member_role(group_id, admin)? != Some(MemberRole::Admin) {
            bail!(HikeError::Forbidden("Only admins can remove members".into()));
        }
        if user_id == admin {
            bail!(HikeError::Validation("Cannot kick yourself".into()));
        }
        let removed = self
            .conn
            .execute(
                "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                params![group_id, user_id],
            )
            .context("Failed to kick member")?;
        if removed == 0 {
            bail!(HikeError::UserNotFound);
        }
        Ok(())
    }

    // ── Messages ──────────────────────────────────────────────────────

    /// The latest 100 messages of a group, oldest first.
    pub fn list_messages(&self, group_id: &str, viewer: i64) -> Result<Vec<GroupMessage>> {
        self.require_member(group_id, viewer)?;
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, group_id, sender_display, role, content, created_at FROM (
                     SELECT * FROM group_messages WHERE group_id = ?1 ORDER BY id DESC LIMIT ?2
                 ) ORDER BY id ASC",
            )
            .context("Failed to prepare list_messages")?;
        let rows = stmt
            .query_map(params![group_id, MESSAGE_HISTORY_LIMIT], message_from_row)
            .context("Failed to query messages")?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row.context("Failed to read message row")?);
        }
        Ok(messages)
    }

    pub fn insert_message(
        &self,
        group_id: &str,
        user_id: Option<i64>,
        sender: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<GroupMessage> {
        self.conn
            .execute(
                "INSERT INTO group_messages (group_id, user_id, sender_display, role, content)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![group_id, user_id, sender, role.as_str(), content],
            )
            .context("Failed to insert message")?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                "SELECT id, group_id, sender_display, role, content, created_at FROM group_messages WHERE id = ?1",
                params![id],
                message_from_row,
            )
            .context("Message not found after insert")
    }

    /// Store a chat message from a member.
    pub fn post_user_message(&self, group_id: &str, author: &AuthUser, content: &str) -> Result<GroupMessage> {
        if content.trim().is_empty() {
            bail!(HikeError::Validation("Message content is required".into()));
        }
        self.require_member(group_id, author.id)?;
        self.insert_message(
            group_id,
            Some(author.id),
            &author.username,
            MessageRole::User,
            content,
        )
    }

    // ── Trails ────────────────────────────────────────────────────────

    pub fn list_trails(&self, limit: i64) -> Result<Vec<TrailSummary>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, length_km FROM trails ORDER BY id LIMIT ?1")
            .context("Failed to prepare list_trails")?;
        let rows = stmt
            .query_map(params![limit], trail_summary_from_row)
            .context("Failed to query trails")?;
        let mut trails = Vec::new();
        for row in rows {
            trails.push(row.context("Failed to read trail row")?);
        }
        Ok(trails)
    }

    /// Case-insensitive substring search on trail names, at most 10 rows.
    pub fn search_trails(&self, query: &str) -> Result<Vec<TrailSummary>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, length_km FROM trails WHERE LOWER(name) LIKE ?1 ESCAPE '\\' ORDER BY id LIMIT 10",
            )
            .context("Failed to prepare search_trails")?;
        let rows = stmt
            .query_map(params![pattern], trail_summary_from_row)
            .context("Failed to search trails")?;
        let mut trails = Vec::new();
        for row in rows {
            trails.push(row.context("Failed to read trail row")?);
        }
        Ok(trails)
    }

    /// Named trails from the seeded catalog, one per distinct name.
    pub fn trail_catalog(&self) -> Result<Vec<TrailRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name, MAX(length_km) FROM trails
                 WHERE name IS NOT NULL AND TRIM(name) != '' AND name != ?1
                 GROUP BY name
                 ORDER BY MIN(id)",
            )
            .context("Failed to prepare trail_catalog")?;
        let rows = stmt
            .query_map(params![UNNAMED_TRAIL], |row| {
                let name: String = row.get(0)?;
                let length: Option<f64> = row.get(1)?;
                Ok(TrailRecord::named(&name, length.unwrap_or(0.0)))
            })
            .context("Failed to query trail catalog")?;
        let mut trails = Vec::new();
        for row in rows {
            trails.push(row.context("Failed to read catalog row")?);
        }
        Ok(trails)
    }

    /// The longest named trails, used for recommendations.
    pub fn longest_trails(&self, limit: i64) -> Result<Vec<TrailRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name, MAX(length_km) AS len FROM trails
                 WHERE name IS NOT NULL AND TRIM(name) != '' AND name != ?1
                 GROUP BY name
                 ORDER BY len DESC, name
                 LIMIT ?2",
            )
            .context("Failed to prepare longest_trails")?;
        let rows = stmt
            .query_map(params![UNNAMED_TRAIL, limit], |row| {
                let name: String = row.get(0)?;
                let length: Option<f64> = row.get(1)?;
                Ok(TrailRecord::named(&name, length.unwrap_or(0.0)))
            })
            .context("Failed to query longest trails")?;
        let mut trails = Vec::new();
        for row in rows {
            trails.push(row.context("Failed to read trail row")?);
        }
        Ok(trails)
    }

    /// Replace the contents of `table` with `trails` in one transaction.
    /// The table is created first if it does not exist.
    pub fn replace_trails(&self, table: &str, trails: &[NewTrail]) -> Result<usize> {
        if !is_valid_table_name(table) {
            bail!("Invalid table name: {}", table);
        }
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute_batch(&trail_table_sql(table))
            .context("Failed to create trail table")?;
        tx.execute(&format!("DELETE FROM {}", table), [])
            .context("Failed to clear trail table")?;

        let columns: Vec<String> = TRAIL_TAG_COLUMNS.iter().map(|c| format!("\"{}\"", c)).collect();
        let placeholders: Vec<String> = (1..=TRAIL_TAG_COLUMNS.len() + 3)
            .map(|i| format!("?{}", i))
            .collect();
        let sql = format!(
            "INSERT INTO {} (name, length_km, {}, geometry) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        );
        {
            let mut stmt = tx.prepare(&sql).context("Failed to prepare trail insert")?;
            for trail in trails {
                let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(TRAIL_TAG_COLUMNS.len() + 3);
                values.push(trail.name.clone().into());
                values.push(trail.length_km.into());
                for column in TRAIL_TAG_COLUMNS {
                    values.push(match trail.tags.get(column) {
                        Some(v) => v.clone().into(),
                        None => rusqlite::types::Value::Null,
                    });
                }
                values.push(trail.geometry.clone().into());
                stmt.execute(rusqlite::params_from_iter(values))
                    .context("Failed to insert trail")?;
            }
        }
        tx.commit().context("Failed to commit trail replacement")?;
        Ok(trails.len())
    }

    #[cfg(test)]
    pub fn count_rows(&self, table: &str) -> Result<i64> {
        if !is_valid_table_name(table) {
            bail!("Invalid table name: {}", table);
        }
        self.conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .with_context(|| format!("Failed to count rows in {}", table))
    }
}

// ── Row helpers ───────────────────────────────────────────────────────

fn auth_user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuthUser> {
    Ok(AuthUser {
        id: row.get(0)?,
        username: row.get(1)?,
        user_code: row.get(2)?,
    })
}

fn group_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupSummary> {
    Ok(GroupSummary {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupMessage> {
    let role: String = row.get(3)?;
    Ok(GroupMessage {
        id: row.get(0)?,
        group_id: row.get(1)?,
        sender: row.get(2)?,
        role: role.parse().unwrap_or(MessageRole::User),
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn trail_summary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrailSummary> {
    Ok(TrailSummary {
        id: row.get(0)?,
        name: row.get::<_, Option<String>>(1)?.unwrap_or_else(|| UNNAMED_TRAIL.to_string()),
        length_km: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
    })
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
/// Make `%`, `_` and `\` match literally in a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn trail_table_sql(table: &str) -> String {
    let tag_columns: Vec<String> = TRAIL_TAG_COLUMNS
        .iter()
        .map(|c| format!("\"{}\" TEXT", c))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT,
            length_km REAL,
            {tags},
            geometry TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_name ON {table}(name);",
        table = table,
        tags = tag_columns.join(",\n            "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_user(db: &HikeDb, name: &str, code: &str) -> AuthUser {
        db.create_user(name, code, "hash").unwrap()
    }

    fn hike_error(err: &anyhow::Error) -> &HikeError {
        err.downcast_ref::<HikeError>().expect("expected HikeError")
    }

    fn make_friends(db: &HikeDb, a: &AuthUser, b: &AuthUser) {
        db.send_friend_request(a.id, &b.user_code).unwrap();
        let req = db.list_friend_requests(b.id).unwrap().remove(0);
        db.accept_friend_request(b.id, req.id).unwrap();
    }

    #[test]
    fn test_migrations_are_idempotent() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        db.run_migrations()?;
        let tables: i64 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN
             ('users','friend_requests','friendships','groups','group_members','group_messages','trails')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(tables, 7);
        Ok(())
    }

    #[test]
    fn test_open_creates_parent_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("hikebot.db");
        HikeDb::new(&path)?;
        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn test_create_user_rejects_duplicates_ignoring_case() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        add_user(&db, "Alice", "alice01");

        let err = db.create_user("alice", "other1", "h").unwrap_err();
        assert!(matches!(hike_error(&err), HikeError::Validation(m) if m == "Username already exists"));

        let err = db.create_user("bob", "ALICE01", "h").unwrap_err();
        assert!(matches!(hike_error(&err), HikeError::Validation(_)));
        Ok(())
    }

    #[test]
    fn test_username_lookups_are_exact() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        add_user(&db, "Alice", "alice01");

        assert!(db.get_credentials("Alice")?.is_some());
        assert!(db.get_credentials("alice")?.is_none());
        assert!(db.find_user_by_identity("ALICE", "alice01")?.is_none());
        assert!(db.find_user_by_identity("Alice", "alice01")?.is_some());

        // Uniqueness still ignores case, even bypassing the pre-check.
        let raw = db.conn.execute(
            "INSERT INTO users (username, user_code, password_hash) VALUES ('ALICE', 'zzzz', 'h')",
            [],
        );
        assert!(raw.is_err());
        Ok(())
    }

    #[test]
    fn test_group_named_like_a_dm_is_still_joinable() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        let alice = add_user(&db, "alice", "alice01");
        let bob = add_user(&db, "bob", "bob0001");
        let carol = add_user(&db, "carol", "carol01");
        let gid = db.create_group(alice.id, "dm: weekend", None, &[])?;

        db.join_group(&gid, bob.id)?;
        db.invite_member(&gid, alice.id, &carol.user_code)?;
        assert_eq!(db.list_members(&gid, alice.id)?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_find_user_by_identity_requires_both_fields() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        let alice = add_user(&db, "alice", "alice01");
        assert_eq!(db.find_user_by_identity("alice", "alice01")?, Some(alice));
        assert!(db.find_user_by_identity("alice", "wrong1")?.is_none());
        assert!(db.get_credentials("nobody")?.is_none());
        Ok(())
    }

    #[test]
    fn test_friend_request_flow() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        let alice = add_user(&db, "alice", "alice01");
        let bob = add_user(&db, "bob", "bob0001");

        let outcome = db.send_friend_request(alice.id, "bob0001")?;
        assert_eq!(outcome, FriendRequestOutcome::Sent { username: "bob".into() });
        // Reverse direction counts as existing.
        assert_eq!(db.send_friend_request(bob.id, "alice01")?, FriendRequestOutcome::Exists);

        let requests = db.list_friend_requests(bob.id)?;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].from_username, "alice");

        // Only the addressee can accept.
        let err = db.accept_friend_request(alice.id, requests[0].id).unwrap_err();
        assert!(matches!(hike_error(&err), HikeError::RequestNotFound));

        db.accept_friend_request(bob.id, requests[0].id)?;
        db.accept_friend_request(bob.id, requests[0].id)?;
        assert_eq!(db.list_friends(alice.id)?.len(), 1);
        assert_eq!(db.list_friends(bob.id)?[0].username, "alice");
        assert!(db.list_friend_requests(bob.id)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_friend_request_errors() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        let alice = add_user(&db, "alice", "alice01");
        let err = db.send_friend_request(alice.id, "ghost99").unwrap_err();
        assert!(matches!(hike_error(&err), HikeError::UserNotFound));
        let err = db.send_friend_request(alice.id, "alice01").unwrap_err();
        assert!(matches!(hike_error(&err), HikeError::Validation(_)));
        Ok(())
    }

    #[test]
    fn test_remove_friend_clears_requests() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        let alice = add_user(&db, "alice", "alice01");
        let bob = add_user(&db, "bob", "bob0001");
        make_friends(&db, &alice, &bob);

        db.remove_friend(alice.id, bob.id)?;
        assert!(db.list_friends(alice.id)?.is_empty());
        assert!(db.list_friends(bob.id)?.is_empty());
        // A fresh request is possible again.
        assert!(matches!(
            db.send_friend_request(bob.id, "alice01")?,
            FriendRequestOutcome::Sent { .. }
        ));
        Ok(())
    }

    #[test]
    fn test_dm_is_created_once() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        let alice = add_user(&db, "alice", "alice01");
        let bob = add_user(&db, "bob", "bob0001");

        let (gid, created) = db.get_or_create_dm(&alice, bob.id)?;
        assert!(created);
        let (again, created) = db.get_or_create_dm(&bob, alice.id)?;
        assert!(!created);
        assert_eq!(gid, again);

        let group = db.get_group(&gid)?.unwrap();
        assert_eq!(group.name, "DM: alice & bob");
        assert!(group.is_dm());
        let members = db.list_members(&gid, alice.id)?;
        assert!(members.iter().all(|m| m.role == MemberRole::Admin));

        let err = db.get_or_create_dm(&alice, alice.id).unwrap_err();
        assert!(matches!(hike_error(&err), HikeError::Validation(_)));
        let err = db.get_or_create_dm(&alice, 999).unwrap_err();
        assert!(matches!(hike_error(&err), HikeError::UserNotFound));
        Ok(())
    }

    #[test]
    fn test_create_group_adds_known_codes_once() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        let alice = add_user(&db, "alice", "alice01");
        add_user(&db, "bob", "bob0001");

        let codes = vec![
            "bob0001".to_string(),
            "bob0001".to_string(),
            "alice01".to_string(),
            "nobody1".to_string(),
        ];
        let gid = db.create_group(alice.id, "Weekend crew", Some("Hikes"), &codes)?;
        let members = db.list_members(&gid, alice.id)?;
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].role, MemberRole::Admin);
        assert_eq!(members[1].username, "bob");
        assert_eq!(members[1].role, MemberRole::Member);

        let err = db.create_group(alice.id, "   ", None, &[]).unwrap_err();
        assert!(matches!(hike_error(&err), HikeError::Validation(_)));
        Ok(())
    }

    #[test]
    fn test_list_groups_newest_first() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        let alice = add_user(&db, "alice", "alice01");
        db.create_group(alice.id, "first", None, &[])?;
        db.create_group(alice.id, "second", None, &[])?;
        let groups = db.list_groups(alice.id)?;
        assert_eq!(groups[0].name, "second");
        assert_eq!(groups[1].name, "first");
        Ok(())
    }

    #[test]
    fn test_members_require_membership() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        let alice = add_user(&db, "alice", "alice01");
        let bob = add_user(&db, "bob", "bob0001");
        let gid = db.create_group(alice.id, "crew", None, &[])?;

        let err = db.list_members(&gid, bob.id).unwrap_err();
        assert!(matches!(hike_error(&err), HikeError::NotMember { .. }));
        let err = db.list_members("missing", bob.id).unwrap_err();
        assert!(matches!(hike_error(&err), HikeError::GroupNotFound { .. }));
        Ok(())
    }

    #[test]
    fn test_join_rejects_dm_groups() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        let alice = add_user(&db, "alice", "alice01");
        let bob = add_user(&db, "bob", "bob0001");
        let carol = add_user(&db, "carol", "carol01");

        let gid = db.create_group(alice.id, "crew", None, &[])?;
        db.join_group(&gid, carol.id)?;
        db.join_group(&gid, carol.id)?;
        assert_eq!(db.list_members(&gid, carol.id)?.len(), 2);

        let (dm, _) = db.get_or_create_dm(&alice, bob.id)?;
        let err = db.join_group(&dm, carol.id).unwrap_err();
        assert!(matches!(hike_error(&err), HikeError::Forbidden(_)));
        Ok(())
    }

    #[test]
    fn test_last_member_leaving_deletes_group() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        let alice = add_user(&db, "alice", "alice01");
        let bob = add_user(&db, "bob", "bob0001");
        let gid = db.create_group(alice.id, "crew", None, &["bob0001".to_string()])?;
        db.insert_message(&gid, Some(alice.id), "alice", MessageRole::User, "hi")?;

        assert!(!db.leave_group(&gid, alice.id)?);
        assert!(db.get_group(&gid)?.is_some());
        assert!(db.leave_group(&gid, bob.id)?);
        assert!(db.get_group(&gid)?.is_none());
        let orphaned: i64 = db.conn.query_row(
            "SELECT COUNT(*) FROM group_messages WHERE group_id = ?1",
            params![gid],
            |row| row.get(0),
        )?;
        assert_eq!(orphaned, 0);
        Ok(())
    }

    #[test]
    fn test_invite_and_kick() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        let alice = add_user(&db, "alice", "alice01");
        let bob = add_user(&db, "bob", "bob0001");
        let carol = add_user(&db, "carol", "carol01");
        let gid = db.create_group(alice.id, "crew", None, &["bob0001".to_string()])?;

        let invited = db.invite_member(&gid, bob.id, "carol01")?;
        assert_eq!(invited.id, carol.id);

        let err = db.kick_member(&gid, bob.id, carol.id).unwrap_err();
        assert!(matches!(hike_error(&err), HikeError::Forbidden(_)));
        let err = db.kick_member(&gid, alice.id, alice.id).unwrap_err();
        assert!(matches!(hike_error(&err), HikeError::Validation(_)));

        db.kick_member(&gid, alice.id, carol.id)?;
        assert_eq!(db.member_role(&gid, carol.id)?, None);
        Ok(())
    }

    #[test]
    fn test_messages_return_latest_hundred_in_order() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        let alice = add_user(&db, "alice", "alice01");
        let gid = db.create_group(alice.id, "crew", None, &[])?;
        for i in 0..105 {
            db.post_user_message(&gid, &alice, &format!("msg {}", i))?;
        }
        let messages = db.list_messages(&gid, alice.id)?;
        assert_eq!(messages.len(), 100);
        assert_eq!(messages[0].content, "msg 5");
        assert_eq!(messages[99].content, "msg 104");
        assert_eq!(messages[0].sender, "alice");
        assert_eq!(messages[0].role, MessageRole::User);
        Ok(())
    }

    #[test]
    fn test_post_requires_membership_and_content() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        let alice = add_user(&db, "alice", "alice01");
        let bob = add_user(&db, "bob", "bob0001");
        let gid = db.create_group(alice.id, "crew", None, &[])?;

        let err = db.post_user_message(&gid, &bob, "hello").unwrap_err();
        assert!(matches!(hike_error(&err), HikeError::NotMember { .. }));
        let err = db.post_user_message(&gid, &alice, "   ").unwrap_err();
        assert!(matches!(hike_error(&err), HikeError::Validation(_)));
        Ok(())
    }

    fn seed_trail(name: &str, length_km: f64) -> NewTrail {
        let mut tags = BTreeMap::new();
        tags.insert("surface".to_string(), "dirt".to_string());
        tags.insert("natural".to_string(), "peak".to_string());
        tags.insert("not_a_column".to_string(), "x".to_string());
        NewTrail {
            name: name.to_string(),
            length_km,
            tags,
            geometry: "LINESTRING(0 0, 1 1)".to_string(),
        }
    }

    #[test]
    fn test_replace_trails_swaps_contents() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        db.replace_trails("trails", &[seed_trail("Old Trail", 1.0)])?;
        let written = db.replace_trails(
            "trails",
            &[
                seed_trail("Fern Dell Trail", 2.4),
                seed_trail(UNNAMED_TRAIL, 0.3),
                seed_trail("Fern Dell Trail", 0.8),
            ],
        )?;
        assert_eq!(written, 3);
        assert_eq!(db.count_rows("trails")?, 3);

        let catalog = db.trail_catalog()?;
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].name, "Fern Dell Trail");
        assert_eq!(catalog[0].length_km, 2.4);

        let natural: Option<String> = db.conn.query_row(
            "SELECT \"natural\" FROM trails WHERE name = 'Fern Dell Trail' LIMIT 1",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(natural.as_deref(), Some("peak"));
        Ok(())
    }

    #[test]
    fn test_replace_trails_creates_custom_table() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        db.replace_trails("trails_la", &[seed_trail("Mt Hollywood", 3.0)])?;
        assert_eq!(db.count_rows("trails_la")?, 1);
        assert_eq!(db.count_rows("trails")?, 0);
        assert!(db.replace_trails("bad name;", &[]).is_err());
        Ok(())
    }

    #[test]
    fn test_trail_search_and_listing() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        db.replace_trails(
            "trails",
            &[
                seed_trail("Mount Hollywood Trail", 3.1),
                seed_trail("Fern Dell", 1.2),
                seed_trail("Hollywood Sign Hike", 5.0),
            ],
        )?;
        assert_eq!(db.search_trails("hollywood")?.len(), 2);
        assert!(db.search_trails("  ")?.is_empty());
        assert_eq!(db.list_trails(2)?.len(), 2);

        let longest = db.longest_trails(2)?;
        assert_eq!(longest[0].name, "Hollywood Sign Hike");
        assert_eq!(longest[1].name, "Mount Hollywood Trail");
        Ok(())
    }

    #[test]
    fn test_trail_search_treats_wildcards_literally() -> Result<()> {
        let db = HikeDb::new_in_memory()?;
        db.replace_trails(
            "trails",
            &[
                seed_trail("Fern Dell", 1.2),
                seed_trail("100% Ridge", 2.0),
                seed_trail("Lake_Loop", 3.0),
            ],
        )?;
        let names = |q: &str| -> Result<Vec<String>> {
            Ok(db.search_trails(q)?.into_iter().map(|t| t.name).collect())
        };
        assert_eq!(names("%")?, vec!["100% Ridge"]);
        assert_eq!(names("_")?, vec!["Lake_Loop"]);
        assert!(names("f_rn")?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_db_handle_runs_on_blocking_pool() -> Result<()> {
        let handle = DbHandle::new(HikeDb::new_in_memory()?);
        let user = handle
            .call(|db| db.create_user("alice", "alice01", "hash"))
            .await?;
        let fetched = handle.call(move |db| db.get_user(user.id)).await?;
        assert_eq!(fetched.unwrap().username, "alice");
        Ok(())
    }
}
