use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tokio::task;
use uuid::Uuid;

use scriptorium_schema::{
    AuditAction, AuditDetails, AuditLog, ChatMessage, Episode, KnowledgeGraph, MessageEdit,
    MessageMetadata, MessageRole, MessageStatus, Project, ScriptVersion, StyleDna,
};

use crate::migrations::run_migrations;
use crate::{Result, StoreError};

#[derive(Debug, Clone)]
pub struct NewProject {
    pub user_id: String,
    pub title: String,
    pub genre: Option<String>,
    pub synopsis: Option<String>,
    pub tone: Option<String>,
    pub total_episodes: u32,
}

/// Partial merge update for a project. None fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub title: Option<String>,
    pub genre: Option<String>,
    pub synopsis: Option<String>,
    pub tone: Option<String>,
    pub total_episodes: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct NewEpisode {
    pub project_id: Uuid,
    pub episode_number: u32,
    pub title: String,
    pub synopsis: Option<String>,
    pub setting: Option<String>,
    pub min_pages: u32,
}

#[derive(Debug, Clone, Default)]
pub struct EpisodePatch {
    pub title: Option<String>,
    pub synopsis: Option<String>,
    pub setting: Option<String>,
    pub min_pages: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub episode_id: Uuid,
    pub project_id: Uuid,
    pub user_id: String,
    pub role: MessageRole,
    pub content: String,
    pub parent_message_id: Option<Uuid>,
    pub metadata: MessageMetadata,
}

/// All writes of one edit operation, applied as a single transaction.
#[derive(Debug, Clone)]
pub struct EditBatch {
    pub message_id: Uuid,
    pub new_content: String,
    pub edited_at: DateTime<Utc>,
    /// Messages positioned after the edit point, in thread order.
    pub invalidate: Vec<Uuid>,
    pub audit: AuditLog,
    pub edit_record: MessageEdit,
}

#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_migrations(&conn)?;
        tracing::debug!(path, "database opened");
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_migrations(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    // ------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------

    pub async fn create_project(&self, new: NewProject) -> Result<Project> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let now = Utc::now();
            let project = Project {
                id: Uuid::new_v4(),
                user_id: new.user_id,
                title: new.title,
                genre: new.genre,
                synopsis: new.synopsis,
                tone: new.tone,
                total_episodes: new.total_episodes,
                created_at: now,
                updated_at: now,
            };
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            conn.execute(
                r#"
                INSERT INTO projects (id, user_id, title, genre, synopsis, tone, total_episodes, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    project.id.to_string(),
                    project.user_id,
                    project.title,
                    project.genre,
                    project.synopsis,
                    project.tone,
                    project.total_episodes,
                    project.created_at.to_rfc3339(),
                    project.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(project)
        })
        .await?
    }

    pub async fn get_project(&self, id: Uuid) -> Result<Project> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, genre, synopsis, tone, total_episodes, created_at, updated_at
                 FROM projects WHERE id = ?1 LIMIT 1",
            )?;
            let mut rows = stmt.query(params![id.to_string()])?;
            match rows.next()? {
                Some(row) => Ok(row_to_project(row)?),
                None => Err(StoreError::not_found("project", id)),
            }
        })
        .await?
    }

    pub async fn list_projects(&self, user_id: &str) -> Result<Vec<Project>> {
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_owned();
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, genre, synopsis, tone, total_episodes, created_at, updated_at
                 FROM projects WHERE user_id = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map(params![user_id], row_to_project)?;
            let mut projects = Vec::new();
            for row in rows {
                projects.push(row?);
            }
            Ok(projects)
        })
        .await?
    }

    pub async fn update_project(&self, id: Uuid, patch: ProjectPatch) -> Result<Project> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let mut project = {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, title, genre, synopsis, tone, total_episodes, created_at, updated_at
                     FROM projects WHERE id = ?1 LIMIT 1",
                )?;
                let mut rows = stmt.query(params![id.to_string()])?;
                match rows.next()? {
                    Some(row) => row_to_project(row)?,
                    None => return Err(StoreError::not_found("project", id)),
                }
            };

            if let Some(title) = patch.title {
                project.title = title;
            }
            if let Some(genre) = patch.genre {
                project.genre = Some(genre);
            }
            if let Some(synopsis) = patch.synopsis {
                project.synopsis = Some(synopsis);
            }
            if let Some(tone) = patch.tone {
                project.tone = Some(tone);
            }
            if let Some(total) = patch.total_episodes {
                project.total_episodes = total;
            }
            project.updated_at = Utc::now();

            conn.execute(
                r#"
                UPDATE projects SET title = ?2, genre = ?3, synopsis = ?4, tone = ?5,
                    total_episodes = ?6, updated_at = ?7
                WHERE id = ?1
                "#,
                params![
                    project.id.to_string(),
                    project.title,
                    project.genre,
                    project.synopsis,
                    project.tone,
                    project.total_episodes,
                    project.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(project)
        })
        .await?
    }

    /// Delete a project and everything scoped to it, except append-only audit
    /// records (audit_logs, message_edits), which survive for accountability.
    pub async fn delete_project(&self, id: Uuid) -> Result<()> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let mut conn = db.lock().map_err(|_| StoreError::Lock)?;
            let tx = conn.transaction()?;
            let pid = id.to_string();
            let deleted = tx.execute("DELETE FROM projects WHERE id = ?1", params![pid])?;
            if deleted == 0 {
                return Err(StoreError::not_found("project", id));
            }
            tx.execute(
                "DELETE FROM script_versions WHERE episode_id IN (SELECT id FROM episodes WHERE project_id = ?1)",
                params![pid],
            )?;
            tx.execute("DELETE FROM messages WHERE project_id = ?1", params![pid])?;
            tx.execute("DELETE FROM episodes WHERE project_id = ?1", params![pid])?;
            tx.execute("DELETE FROM style_dna WHERE project_id = ?1", params![pid])?;
            tx.execute(
                "DELETE FROM knowledge_graphs WHERE project_id = ?1",
                params![pid],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await?
    }

    // ------------------------------------------------------------
    // Episodes
    // ------------------------------------------------------------

    pub async fn create_episode(&self, new: NewEpisode) -> Result<Episode> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let now = Utc::now();
            let episode = Episode {
                id: Uuid::new_v4(),
                project_id: new.project_id,
                episode_number: new.episode_number,
                title: new.title,
                synopsis: new.synopsis,
                setting: new.setting,
                script: None,
                min_pages: new.min_pages,
                created_at: now,
                updated_at: now,
            };
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let inserted = conn.execute(
                r#"
                INSERT INTO episodes (id, project_id, episode_number, title, synopsis, setting, script, min_pages, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?9)
                "#,
                params![
                    episode.id.to_string(),
                    episode.project_id.to_string(),
                    episode.episode_number,
                    episode.title,
                    episode.synopsis,
                    episode.setting,
                    episode.min_pages,
                    episode.created_at.to_rfc3339(),
                    episode.updated_at.to_rfc3339(),
                ],
            );
            match inserted {
                Ok(_) => Ok(episode),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::EpisodeNumberTaken {
                        project_id: episode.project_id,
                        number: episode.episode_number,
                    })
                }
                Err(e) => Err(e.into()),
            }
        })
        .await?
    }

    pub async fn get_episode(&self, id: Uuid) -> Result<Episode> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let mut stmt = conn.prepare(
                "SELECT id, project_id, episode_number, title, synopsis, setting, script, min_pages, created_at, updated_at
                 FROM episodes WHERE id = ?1 LIMIT 1",
            )?;
            let mut rows = stmt.query(params![id.to_string()])?;
            match rows.next()? {
                Some(row) => Ok(row_to_episode(row)?),
                None => Err(StoreError::not_found("episode", id)),
            }
        })
        .await?
    }

    pub async fn list_episodes(&self, project_id: Uuid) -> Result<Vec<Episode>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let mut stmt = conn.prepare(
                "SELECT id, project_id, episode_number, title, synopsis, setting, script, min_pages, created_at, updated_at
                 FROM episodes WHERE project_id = ?1 ORDER BY episode_number ASC",
            )?;
            let rows = stmt.query_map(params![project_id.to_string()], row_to_episode)?;
            let mut episodes = Vec::new();
            for row in rows {
                episodes.push(row?);
            }
            Ok(episodes)
        })
        .await?
    }

    /// Episodes before `before_number` in the same project, most recent
    /// `limit`, returned in ascending episode order.
    pub async fn previous_episodes(
        &self,
        project_id: Uuid,
        before_number: u32,
        limit: usize,
    ) -> Result<Vec<Episode>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let mut stmt = conn.prepare(
                "SELECT id, project_id, episode_number, title, synopsis, setting, script, min_pages, created_at, updated_at
                 FROM episodes WHERE project_id = ?1 AND episode_number < ?2
                 ORDER BY episode_number DESC LIMIT ?3",
            )?;
            let rows = stmt.query_map(
                params![project_id.to_string(), before_number, limit as i64],
                row_to_episode,
            )?;
            let mut episodes = Vec::new();
            for row in rows {
                episodes.push(row?);
            }
            episodes.reverse();
            Ok(episodes)
        })
        .await?
    }

    pub async fn update_episode(&self, id: Uuid, patch: EpisodePatch) -> Result<Episode> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let mut episode = {
                let mut stmt = conn.prepare(
                    "SELECT id, project_id, episode_number, title, synopsis, setting, script, min_pages, created_at, updated_at
                     FROM episodes WHERE id = ?1 LIMIT 1",
                )?;
                let mut rows = stmt.query(params![id.to_string()])?;
                match rows.next()? {
                    Some(row) => row_to_episode(row)?,
                    None => return Err(StoreError::not_found("episode", id)),
                }
            };

            if let Some(title) = patch.title {
                episode.title = title;
            }
            if let Some(synopsis) = patch.synopsis {
                episode.synopsis = Some(synopsis);
            }
            if let Some(setting) = patch.setting {
                episode.setting = Some(setting);
            }
            if let Some(min_pages) = patch.min_pages {
                episode.min_pages = min_pages;
            }
            episode.updated_at = Utc::now();

            conn.execute(
                "UPDATE episodes SET title = ?2, synopsis = ?3, setting = ?4, min_pages = ?5, updated_at = ?6
                 WHERE id = ?1",
                params![
                    episode.id.to_string(),
                    episode.title,
                    episode.synopsis,
                    episode.setting,
                    episode.min_pages,
                    episode.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(episode)
        })
        .await?
    }

    pub async fn update_episode_script(&self, id: Uuid, script: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let script = script.to_owned();
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let changed = conn.execute(
                "UPDATE episodes SET script = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), script, Utc::now().to_rfc3339()],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("episode", id));
            }
            Ok(())
        })
        .await?
    }

    // ------------------------------------------------------------
    // Messages (thread state machine)
    // ------------------------------------------------------------

    /// Append a message at the next thread position. The position is computed
    /// and the row inserted inside one transaction, so concurrent appends to
    /// the same episode cannot collide on a position.
    pub async fn append_message(&self, new: NewMessage) -> Result<ChatMessage> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let mut conn = db.lock().map_err(|_| StoreError::Lock)?;
            let tx = conn.transaction()?;
            let position: i64 = tx.query_row(
                "SELECT COALESCE(MAX(thread_position) + 1, 0) FROM messages
                 WHERE episode_id = ?1 AND status = 'active'",
                params![new.episode_id.to_string()],
                |row| row.get(0),
            )?;

            let message = ChatMessage {
                id: Uuid::new_v4(),
                episode_id: new.episode_id,
                project_id: new.project_id,
                user_id: new.user_id,
                role: new.role,
                content: new.content,
                thread_position: position,
                status: MessageStatus::Active,
                is_edited: false,
                edited_at: None,
                original_message_id: None,
                parent_message_id: new.parent_message_id,
                metadata: new.metadata,
                created_at: Utc::now(),
            };

            let metadata = serde_json::to_string(&message.metadata)?;
            tx.execute(
                r#"
                INSERT INTO messages (id, episode_id, project_id, user_id, role, content,
                    thread_position, status, deleted_at, is_edited, edited_at,
                    original_message_id, parent_message_id, metadata, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active', NULL, 0, NULL, NULL, ?8, ?9, ?10)
                "#,
                params![
                    message.id.to_string(),
                    message.episode_id.to_string(),
                    message.project_id.to_string(),
                    message.user_id,
                    message.role.as_str(),
                    message.content,
                    message.thread_position,
                    message.parent_message_id.map(|id| id.to_string()),
                    metadata,
                    message.created_at.to_rfc3339(),
                ],
            )?;
            tx.commit()?;
            Ok(message)
        })
        .await?
    }

    pub async fn get_message(&self, id: Uuid) -> Result<ChatMessage> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1 LIMIT 1"
            ))?;
            let mut rows = stmt.query(params![id.to_string()])?;
            match rows.next()? {
                Some(row) => Ok(row_to_message(row)?),
                None => Err(StoreError::not_found("message", id)),
            }
        })
        .await?
    }

    /// Active messages for an episode ordered by thread position ascending.
    /// `before` bounds positions to `<= before`; `last` keeps only the most
    /// recent N of the result.
    pub async fn active_thread(
        &self,
        episode_id: Uuid,
        before: Option<i64>,
        last: Option<usize>,
    ) -> Result<Vec<ChatMessage>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE episode_id = ?1 AND status = 'active' AND thread_position <= ?2
                 ORDER BY thread_position ASC"
            ))?;
            let cutoff = before.unwrap_or(i64::MAX);
            let rows = stmt.query_map(params![episode_id.to_string(), cutoff], row_to_message)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            if let Some(last) = last {
                if messages.len() > last {
                    let start = messages.len() - last;
                    messages = messages.split_off(start);
                }
            }
            Ok(messages)
        })
        .await?
    }

    /// Soft-delete a message. Idempotent: returns false when the message was
    /// already non-active.
    pub async fn soft_delete_message(&self, id: Uuid) -> Result<bool> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let changed = conn.execute(
                "UPDATE messages SET status = 'deleted', deleted_at = ?2
                 WHERE id = ?1 AND status = 'active'",
                params![id.to_string(), Utc::now().to_rfc3339()],
            )?;
            Ok(changed > 0)
        })
        .await?
    }

    /// Apply one edit operation atomically: the in-place content mutation, the
    /// soft-deletes of everything after the edit point, the audit log entry
    /// and the message-edit record. All writes commit together or none do.
    pub async fn apply_edit(&self, batch: EditBatch) -> Result<()> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let mut conn = db.lock().map_err(|_| StoreError::Lock)?;
            let tx = conn.transaction()?;

            let changed = tx.execute(
                "UPDATE messages SET content = ?2, is_edited = 1, edited_at = ?3,
                     original_message_id = id
                 WHERE id = ?1 AND status = 'active'",
                params![
                    batch.message_id.to_string(),
                    batch.new_content,
                    batch.edited_at.to_rfc3339(),
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("message", batch.message_id));
            }

            let deleted_at = batch.edited_at.to_rfc3339();
            for id in &batch.invalidate {
                tx.execute(
                    "UPDATE messages SET status = 'deleted', deleted_at = ?2
                     WHERE id = ?1 AND status = 'active'",
                    params![id.to_string(), deleted_at],
                )?;
            }

            let details = serde_json::to_string(&batch.audit.details)?;
            tx.execute(
                r#"
                INSERT INTO audit_logs (id, action, actor_id, project_id, episode_id, details, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    batch.audit.id.to_string(),
                    batch.audit.action.as_str(),
                    batch.audit.actor_id,
                    batch.audit.project_id.to_string(),
                    batch.audit.episode_id.to_string(),
                    details,
                    batch.audit.created_at.to_rfc3339(),
                ],
            )?;

            let edit = &batch.edit_record;
            let invalidated = serde_json::to_string(&edit.invalidated_message_ids)?;
            tx.execute(
                r#"
                INSERT INTO message_edits (id, message_id, episode_id, old_content, new_content,
                    invalidated_ids, message_count, approx_tokens, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    edit.id.to_string(),
                    edit.message_id.to_string(),
                    edit.episode_id.to_string(),
                    edit.old_content,
                    edit.new_content,
                    invalidated,
                    edit.continuity.message_count as i64,
                    edit.continuity.approx_tokens as i64,
                    edit.created_at.to_rfc3339(),
                ],
            )?;

            tx.commit()?;
            Ok(())
        })
        .await?
    }

    // ------------------------------------------------------------
    // Audit
    // ------------------------------------------------------------

    pub async fn insert_audit_log(&self, log: AuditLog) -> Result<()> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let details = serde_json::to_string(&log.details)?;
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            conn.execute(
                r#"
                INSERT INTO audit_logs (id, action, actor_id, project_id, episode_id, details, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    log.id.to_string(),
                    log.action.as_str(),
                    log.actor_id,
                    log.project_id.to_string(),
                    log.episode_id.to_string(),
                    details,
                    log.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn audit_logs_for_episode(&self, episode_id: Uuid) -> Result<Vec<AuditLog>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let mut stmt = conn.prepare(
                "SELECT id, action, actor_id, project_id, episode_id, details, created_at
                 FROM audit_logs WHERE episode_id = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![episode_id.to_string()], row_to_audit)?;
            let mut logs = Vec::new();
            for row in rows {
                logs.push(row?);
            }
            Ok(logs)
        })
        .await?
    }

    pub async fn edits_for_message(&self, message_id: Uuid) -> Result<Vec<MessageEdit>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let mut stmt = conn.prepare(
                "SELECT id, message_id, episode_id, old_content, new_content, invalidated_ids,
                        message_count, approx_tokens, created_at
                 FROM message_edits WHERE message_id = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![message_id.to_string()], row_to_edit)?;
            let mut edits = Vec::new();
            for row in rows {
                edits.push(row?);
            }
            Ok(edits)
        })
        .await?
    }

    // ------------------------------------------------------------
    // Derived artifacts
    // ------------------------------------------------------------

    pub async fn save_style_dna(&self, dna: StyleDna) -> Result<()> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            conn.execute(
                r#"
                INSERT INTO style_dna (id, user_id, project_id, script_id, voice, themes,
                    characters, narrative, dialog, confidence, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                params![
                    dna.id.to_string(),
                    dna.user_id,
                    dna.project_id.to_string(),
                    dna.script_id.to_string(),
                    serde_json::to_string(&dna.voice)?,
                    serde_json::to_string(&dna.themes)?,
                    serde_json::to_string(&dna.characters)?,
                    serde_json::to_string(&dna.narrative)?,
                    serde_json::to_string(&dna.dialog)?,
                    dna.confidence,
                    dna.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await?
    }

    /// Most recently created StyleDNA for a project, if any.
    pub async fn latest_style_dna(&self, project_id: Uuid) -> Result<Option<StyleDna>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let mut stmt = conn.prepare(
                "SELECT id, user_id, project_id, script_id, voice, themes, characters, narrative, dialog, confidence, created_at
                 FROM style_dna WHERE project_id = ?1 ORDER BY created_at DESC LIMIT 1",
            )?;
            let mut rows = stmt.query(params![project_id.to_string()])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_style(row)?)),
                None => Ok(None),
            }
        })
        .await?
    }

    pub async fn delete_style_dna(&self, project_id: Uuid, id: Uuid) -> Result<bool> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let changed = conn.execute(
                "DELETE FROM style_dna WHERE id = ?1 AND project_id = ?2",
                params![id.to_string(), project_id.to_string()],
            )?;
            Ok(changed > 0)
        })
        .await?
    }

    pub async fn save_knowledge_graph(&self, graph: KnowledgeGraph) -> Result<()> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            conn.execute(
                r#"
                INSERT INTO knowledge_graphs (id, user_id, project_id, script_id, entities,
                    relationships, timeline, themes, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    graph.id.to_string(),
                    graph.user_id,
                    graph.project_id.to_string(),
                    graph.script_id.to_string(),
                    serde_json::to_string(&graph.entities)?,
                    serde_json::to_string(&graph.relationships)?,
                    serde_json::to_string(&graph.timeline)?,
                    serde_json::to_string(&graph.themes)?,
                    graph.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn latest_knowledge_graph(&self, project_id: Uuid) -> Result<Option<KnowledgeGraph>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let mut stmt = conn.prepare(
                "SELECT id, user_id, project_id, script_id, entities, relationships, timeline, themes, created_at
                 FROM knowledge_graphs WHERE project_id = ?1 ORDER BY created_at DESC LIMIT 1",
            )?;
            let mut rows = stmt.query(params![project_id.to_string()])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_graph(row)?)),
                None => Ok(None),
            }
        })
        .await?
    }

    pub async fn delete_knowledge_graph(&self, project_id: Uuid, id: Uuid) -> Result<bool> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let changed = conn.execute(
                "DELETE FROM knowledge_graphs WHERE id = ?1 AND project_id = ?2",
                params![id.to_string(), project_id.to_string()],
            )?;
            Ok(changed > 0)
        })
        .await?
    }

    // ------------------------------------------------------------
    // Script versions
    // ------------------------------------------------------------

    pub async fn add_script_version(&self, episode_id: Uuid, content: &str) -> Result<ScriptVersion> {
        let db = Arc::clone(&self.db);
        let content = content.to_owned();
        task::spawn_blocking(move || {
            let version = ScriptVersion {
                id: Uuid::new_v4(),
                episode_id,
                content,
                created_at: Utc::now(),
            };
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            conn.execute(
                "INSERT INTO script_versions (id, episode_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    version.id.to_string(),
                    version.episode_id.to_string(),
                    version.content,
                    version.created_at.to_rfc3339(),
                ],
            )?;
            Ok(version)
        })
        .await?
    }

    pub async fn script_versions(&self, episode_id: Uuid) -> Result<Vec<ScriptVersion>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let mut stmt = conn.prepare(
                "SELECT id, episode_id, content, created_at
                 FROM script_versions WHERE episode_id = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![episode_id.to_string()], row_to_version)?;
            let mut versions = Vec::new();
            for row in rows {
                versions.push(row?);
            }
            Ok(versions)
        })
        .await?
    }
}

const MESSAGE_COLUMNS: &str = "id, episode_id, project_id, user_id, role, content, \
    thread_position, status, deleted_at, is_edited, edited_at, original_message_id, \
    parent_message_id, metadata, created_at";

// ------------------------------------------------------------
// Row mappers
// ------------------------------------------------------------

fn conversion_err(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn parse_id(idx: usize, raw: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&raw).map_err(|e| conversion_err(idx, e))
}

fn row_to_project(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_id(0, row.get(0)?)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        genre: row.get(3)?,
        synopsis: row.get(4)?,
        tone: row.get(5)?,
        total_episodes: row.get::<_, i64>(6)? as u32,
        created_at: parse_ts(7, row.get(7)?)?,
        updated_at: parse_ts(8, row.get(8)?)?,
    })
}

fn row_to_episode(row: &Row) -> rusqlite::Result<Episode> {
    Ok(Episode {
        id: parse_id(0, row.get(0)?)?,
        project_id: parse_id(1, row.get(1)?)?,
        episode_number: row.get::<_, i64>(2)? as u32,
        title: row.get(3)?,
        synopsis: row.get(4)?,
        setting: row.get(5)?,
        script: row.get(6)?,
        min_pages: row.get::<_, i64>(7)? as u32,
        created_at: parse_ts(8, row.get(8)?)?,
        updated_at: parse_ts(9, row.get(9)?)?,
    })
}

fn row_to_message(row: &Row) -> rusqlite::Result<ChatMessage> {
    let status_raw: String = row.get(7)?;
    let deleted_at: Option<String> = row.get(8)?;
    let status = match status_raw.as_str() {
        "deleted" => {
            let raw = deleted_at.ok_or_else(|| {
                conversion_err(8, std::io::Error::other("deleted message missing deleted_at"))
            })?;
            MessageStatus::Deleted {
                at: parse_ts(8, raw)?,
            }
        }
        "muted" => MessageStatus::Muted,
        _ => MessageStatus::Active,
    };

    let role_raw: String = row.get(4)?;
    let role = match role_raw.as_str() {
        "assistant" => MessageRole::Assistant,
        _ => MessageRole::User,
    };

    let metadata_raw: String = row.get(13)?;
    let metadata: MessageMetadata =
        serde_json::from_str(&metadata_raw).map_err(|e| conversion_err(13, e))?;

    let edited_at: Option<String> = row.get(10)?;
    let original: Option<String> = row.get(11)?;
    let parent: Option<String> = row.get(12)?;

    Ok(ChatMessage {
        id: parse_id(0, row.get(0)?)?,
        episode_id: parse_id(1, row.get(1)?)?,
        project_id: parse_id(2, row.get(2)?)?,
        user_id: row.get(3)?,
        role,
        content: row.get(5)?,
        thread_position: row.get(6)?,
        status,
        is_edited: row.get::<_, i64>(9)? != 0,
        edited_at: edited_at.map(|raw| parse_ts(10, raw)).transpose()?,
        original_message_id: original.map(|raw| parse_id(11, raw)).transpose()?,
        parent_message_id: parent.map(|raw| parse_id(12, raw)).transpose()?,
        metadata,
        created_at: parse_ts(14, row.get(14)?)?,
    })
}

fn row_to_audit(row: &Row) -> rusqlite::Result<AuditLog> {
    let action_raw: String = row.get(1)?;
    let action = match action_raw.as_str() {
        "edit_message" => AuditAction::EditMessage,
        "delete_responses" => AuditAction::DeleteResponses,
        "regenerate_response" => AuditAction::RegenerateResponse,
        other => {
            return Err(conversion_err(
                1,
                std::io::Error::other(format!("unknown audit action: {other}")),
            ))
        }
    };
    let details_raw: String = row.get(5)?;
    let details: AuditDetails =
        serde_json::from_str(&details_raw).map_err(|e| conversion_err(5, e))?;
    Ok(AuditLog {
        id: parse_id(0, row.get(0)?)?,
        action,
        actor_id: row.get(2)?,
        project_id: parse_id(3, row.get(3)?)?,
        episode_id: parse_id(4, row.get(4)?)?,
        details,
        created_at: parse_ts(6, row.get(6)?)?,
    })
}

fn row_to_edit(row: &Row) -> rusqlite::Result<MessageEdit> {
    let ids_raw: String = row.get(5)?;
    let invalidated: Vec<Uuid> =
        serde_json::from_str(&ids_raw).map_err(|e| conversion_err(5, e))?;
    Ok(MessageEdit {
        id: parse_id(0, row.get(0)?)?,
        message_id: parse_id(1, row.get(1)?)?,
        episode_id: parse_id(2, row.get(2)?)?,
        old_content: row.get(3)?,
        new_content: row.get(4)?,
        invalidated_message_ids: invalidated,
        continuity: scriptorium_schema::ContextContinuity {
            message_count: row.get::<_, i64>(6)? as usize,
            approx_tokens: row.get::<_, i64>(7)? as usize,
        },
        created_at: parse_ts(8, row.get(8)?)?,
    })
}

fn row_to_style(row: &Row) -> rusqlite::Result<StyleDna> {
    let json_col = |idx: usize, raw: String| -> rusqlite::Result<Vec<String>> {
        serde_json::from_str(&raw).map_err(|e| conversion_err(idx, e))
    };
    Ok(StyleDna {
        id: parse_id(0, row.get(0)?)?,
        user_id: row.get(1)?,
        project_id: parse_id(2, row.get(2)?)?,
        script_id: parse_id(3, row.get(3)?)?,
        voice: json_col(4, row.get(4)?)?,
        themes: json_col(5, row.get(5)?)?,
        characters: json_col(6, row.get(6)?)?,
        narrative: json_col(7, row.get(7)?)?,
        dialog: json_col(8, row.get(8)?)?,
        confidence: row.get(9)?,
        created_at: parse_ts(10, row.get(10)?)?,
    })
}

fn row_to_graph(row: &Row) -> rusqlite::Result<KnowledgeGraph> {
    let entities: String = row.get(4)?;
    let relationships: String = row.get(5)?;
    let timeline: String = row.get(6)?;
    let themes: String = row.get(7)?;
    Ok(KnowledgeGraph {
        id: parse_id(0, row.get(0)?)?,
        user_id: row.get(1)?,
        project_id: parse_id(2, row.get(2)?)?,
        script_id: parse_id(3, row.get(3)?)?,
        entities: serde_json::from_str(&entities).map_err(|e| conversion_err(4, e))?,
        relationships: serde_json::from_str(&relationships).map_err(|e| conversion_err(5, e))?,
        timeline: serde_json::from_str(&timeline).map_err(|e| conversion_err(6, e))?,
        themes: serde_json::from_str(&themes).map_err(|e| conversion_err(7, e))?,
        created_at: parse_ts(8, row.get(8)?)?,
    })
}

fn row_to_version(row: &Row) -> rusqlite::Result<ScriptVersion> {
    Ok(ScriptVersion {
        id: parse_id(0, row.get(0)?)?,
        episode_id: parse_id(1, row.get(1)?)?,
        content: row.get(2)?,
        created_at: parse_ts(3, row.get(3)?)?,
    })
}
