use rusqlite::Connection;

/// Schema migrations keyed on the sqlite `user_version` pragma.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version < 1 {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                genre TEXT,
                synopsis TEXT,
                tone TEXT,
                total_episodes INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS episodes (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                episode_number INTEGER NOT NULL,
                title TEXT NOT NULL,
                synopsis TEXT,
                setting TEXT,
                script TEXT,
                min_pages INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(project_id, episode_number)
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                episode_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                thread_position INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                deleted_at TEXT,
                is_edited INTEGER NOT NULL DEFAULT 0,
                edited_at TEXT,
                original_message_id TEXT,
                parent_message_id TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_episode_status
                ON messages(episode_id, status, thread_position);

            CREATE TABLE IF NOT EXISTS message_edits (
                id TEXT PRIMARY KEY,
                message_id TEXT NOT NULL,
                episode_id TEXT NOT NULL,
                old_content TEXT NOT NULL,
                new_content TEXT NOT NULL,
                invalidated_ids TEXT NOT NULL,
                message_count INTEGER NOT NULL,
                approx_tokens INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_logs (
                id TEXT PRIMARY KEY,
                action TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                episode_id TEXT NOT NULL,
                details TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_episode ON audit_logs(episode_id, created_at);

            CREATE TABLE IF NOT EXISTS style_dna (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                script_id TEXT NOT NULL,
                voice TEXT NOT NULL,
                themes TEXT NOT NULL,
                characters TEXT NOT NULL,
                narrative TEXT NOT NULL,
                dialog TEXT NOT NULL,
                confidence REAL NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS knowledge_graphs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                script_id TEXT NOT NULL,
                entities TEXT NOT NULL,
                relationships TEXT NOT NULL,
                timeline TEXT NOT NULL,
                themes TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS script_versions (
                id TEXT PRIMARY KEY,
                episode_id TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_versions_episode
                ON script_versions(episode_id, created_at);

            PRAGMA user_version = 1;
            "#,
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='messages'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
