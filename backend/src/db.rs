//! SQLite persistence.
//!
//! The store owns the pool and exposes typed queries; nothing outside this
//! module writes SQL. The schema is created on startup, and games persist
//! their full state (including the serialised position) so a restarted
//! process can pick live games back up from the snapshot.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    encode_history, encode_position, Game, GameRow, Notification, Session, User,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    email_verify_token TEXT,
    elo INTEGER NOT NULL DEFAULT 1000,
    avatar BLOB,
    avatar_number INTEGER NOT NULL DEFAULT 0,
    avatar_extension TEXT,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    token_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS games (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mode INTEGER NOT NULL,
    host_id INTEGER NOT NULL REFERENCES users(id),
    away_id INTEGER REFERENCES users(id),
    invited_id INTEGER REFERENCES users(id),
    current_turn INTEGER NOT NULL DEFAULT 1,
    turn_number INTEGER NOT NULL DEFAULT 0,
    main_thinking_time INTEGER NOT NULL,
    fixed_extra_time INTEGER NOT NULL,
    time_increment_per_turn INTEGER NOT NULL,
    host_time INTEGER NOT NULL,
    away_time INTEGER NOT NULL,
    host_offering_draw INTEGER NOT NULL DEFAULT 0,
    away_offering_draw INTEGER NOT NULL DEFAULT 0,
    other_valid_draw_claim INTEGER,
    halfmove_clock INTEGER NOT NULL DEFAULT 0,
    winner INTEGER NOT NULL DEFAULT 1,
    conclusion_type INTEGER NOT NULL DEFAULT 1,
    board_state TEXT NOT NULL,
    position_history TEXT NOT NULL,
    opened_at INTEGER NOT NULL,
    started_at INTEGER,
    last_turn INTEGER,
    ended_at INTEGER
);

CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    sent_at INTEGER NOT NULL,
    type_code TEXT NOT NULL,
    game_id INTEGER REFERENCES games(id),
    read INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, read);
CREATE INDEX IF NOT EXISTS idx_games_live ON games(started_at, ended_at);
";

const USER_COLUMNS: &str = "id, username, password_hash, email, email_verify_token, \
     elo, avatar_number, avatar_extension, created_at";

const GAME_COLUMNS: &str = "id, mode, host_id, away_id, invited_id, current_turn, \
     turn_number, main_thinking_time, fixed_extra_time, time_increment_per_turn, \
     host_time, away_time, host_offering_draw, away_offering_draw, \
     other_valid_draw_claim, halfmove_clock, winner, conclusion_type, board_state, \
     position_history, opened_at, started_at, last_turn, ended_at";

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Store {
        Store { pool }
    }

    /// Open a pool against `database_url`, creating the file if necessary.
    pub async fn connect(database_url: &str) -> ApiResult<Store> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|err| ApiError::Internal(format!("invalid database URL: {err}")))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Store { pool })
    }

    pub async fn init_schema(&self) -> ApiResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    // Users

    pub async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        email: &str,
        verify_token: &str,
        now: i64,
    ) -> ApiResult<i64> {
        let result = sqlx::query(
            "INSERT INTO users (username, password_hash, email, email_verify_token, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(username)
        .bind(password_hash)
        .bind(email)
        .bind(verify_token)
        .bind(now)
        .execute(&self.pool)
        .await;
        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(err) => {
                let text = err.to_string();
                if text.contains("UNIQUE constraint failed: users.username") {
                    Err(ApiError::UsernameTaken)
                } else if text.contains("UNIQUE constraint failed: users.email") {
                    Err(ApiError::EmailTaken)
                } else {
                    Err(err.into())
                }
            }
        }
    }

    pub async fn user_by_id(&self, id: i64) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn user_by_username(&self, username: &str) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn users_by_ids(&self, ids: &[i64]) -> ApiResult<Vec<User>> {
        let mut users = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(user) = self.user_by_id(id).await? {
                users.push(user);
            }
        }
        Ok(users)
    }

    pub async fn count_users(&self) -> ApiResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn users_by_elo(&self, limit: i64, offset: i64) -> ApiResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY elo DESC, id ASC LIMIT ?1 OFFSET ?2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    /// Set a new password hash. All of the user's sessions are invalidated.
    pub async fn update_password(&self, user_id: i64, password_hash: &str) -> ApiResult<()> {
        sqlx::query("UPDATE users SET password_hash = ?1 WHERE id = ?2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        self.delete_sessions_for_user(user_id).await
    }

    /// Change email and reset verification with a fresh token.
    pub async fn update_email(&self, user_id: i64, email: &str, token: &str) -> ApiResult<()> {
        let result = sqlx::query(
            "UPDATE users SET email = ?1, email_verify_token = ?2 WHERE id = ?3",
        )
        .bind(email)
        .bind(token)
        .bind(user_id)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) if err.to_string().contains("UNIQUE constraint failed: users.email") => {
                Err(ApiError::EmailTaken)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn mark_email_verified(&self, user_id: i64) -> ApiResult<()> {
        sqlx::query("UPDATE users SET email_verify_token = NULL WHERE id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_elo(&self, user_id: i64, elo: i64) -> ApiResult<()> {
        sqlx::query("UPDATE users SET elo = ?1 WHERE id = ?2")
            .bind(elo)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_avatar(&self, user_id: i64, avatar: &[u8], extension: &str) -> ApiResult<()> {
        sqlx::query(
            "UPDATE users SET avatar = ?1, avatar_extension = ?2,
                    avatar_number = avatar_number + 1
             WHERE id = ?3",
        )
        .bind(avatar)
        .bind(extension)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn avatar(
        &self,
        user_id: i64,
        avatar_number: i64,
        extension: &str,
    ) -> ApiResult<Option<Vec<u8>>> {
        let row = sqlx::query(
            "SELECT avatar FROM users
             WHERE id = ?1 AND avatar_number = ?2 AND avatar_extension = ?3",
        )
        .bind(user_id)
        .bind(avatar_number)
        .bind(extension)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.and_then(|row| row.get::<Option<Vec<u8>>, _>("avatar")))
    }

    pub async fn delete_user(&self, user_id: i64) -> ApiResult<()> {
        sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // Sessions

    pub async fn create_session(
        &self,
        user_id: i64,
        token_hash: &str,
        now: i64,
        expires_at: i64,
    ) -> ApiResult<Session> {
        let done = sqlx::query(
            "INSERT INTO sessions (user_id, token_hash, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(Session {
            id: done.last_insert_rowid(),
            user_id,
            token_hash: token_hash.to_string(),
            created_at: now,
            expires_at,
        })
    }

    pub async fn session_by_id(&self, id: i64) -> ApiResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT id, user_id, token_hash, created_at, expires_at
             FROM sessions WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    pub async fn delete_session(&self, id: i64) -> ApiResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_sessions_for_user(&self, user_id: i64) -> ApiResult<()> {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // Games

    /// Insert a game and return it with its assigned id.
    pub async fn insert_game(&self, mut game: Game) -> ApiResult<Game> {
        let done = sqlx::query(
            "INSERT INTO games (mode, host_id, away_id, invited_id, current_turn,
                 turn_number, main_thinking_time, fixed_extra_time,
                 time_increment_per_turn, host_time, away_time,
                 host_offering_draw, away_offering_draw, other_valid_draw_claim,
                 halfmove_clock, winner, conclusion_type, board_state,
                 position_history, opened_at, started_at, last_turn, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                 ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
        )
        .bind(u8::from(game.mode) as i64)
        .bind(game.host_id)
        .bind(game.away_id)
        .bind(game.invited_id)
        .bind(shared::side_code(game.current_turn) as i64)
        .bind(game.turn_number as i64)
        .bind(game.main_thinking_time)
        .bind(game.fixed_extra_time)
        .bind(game.time_increment_per_turn)
        .bind(game.host_time)
        .bind(game.away_time)
        .bind(game.host_offering_draw)
        .bind(game.away_offering_draw)
        .bind(game.other_valid_draw_claim.map(|c| u8::from(c) as i64))
        .bind(game.halfmove_clock as i64)
        .bind(u8::from(game.winner) as i64)
        .bind(u8::from(game.conclusion) as i64)
        .bind(encode_position(&game.position))
        .bind(encode_history(&game.position_history))
        .bind(game.opened_at)
        .bind(game.started_at)
        .bind(game.last_turn)
        .bind(game.ended_at)
        .execute(&self.pool)
        .await?;
        game.id = done.last_insert_rowid();
        Ok(game)
    }

    pub async fn game(&self, id: i64) -> ApiResult<Option<Game>> {
        let row = sqlx::query_as::<_, GameRow>(&format!(
            "SELECT {GAME_COLUMNS} FROM games WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Game::try_from).transpose()
    }

    /// Persist every mutable field of a game.
    pub async fn save_game(&self, game: &Game) -> ApiResult<()> {
        sqlx::query(
            "UPDATE games SET away_id = ?1, invited_id = ?2, current_turn = ?3,
                 turn_number = ?4, host_time = ?5, away_time = ?6,
                 host_offering_draw = ?7, away_offering_draw = ?8,
                 other_valid_draw_claim = ?9, halfmove_clock = ?10, winner = ?11,
                 conclusion_type = ?12, board_state = ?13, position_history = ?14,
                 started_at = ?15, last_turn = ?16, ended_at = ?17
             WHERE id = ?18",
        )
        .bind(game.away_id)
        .bind(game.invited_id)
        .bind(shared::side_code(game.current_turn) as i64)
        .bind(game.turn_number as i64)
        .bind(game.host_time)
        .bind(game.away_time)
        .bind(game.host_offering_draw)
        .bind(game.away_offering_draw)
        .bind(game.other_valid_draw_claim.map(|c| u8::from(c) as i64))
        .bind(game.halfmove_clock as i64)
        .bind(u8::from(game.winner) as i64)
        .bind(u8::from(game.conclusion) as i64)
        .bind(encode_position(&game.position))
        .bind(encode_history(&game.position_history))
        .bind(game.started_at)
        .bind(game.last_turn)
        .bind(game.ended_at)
        .bind(game.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove a user's not-yet-started games: their open searches, their
    /// outgoing invitations and invitations addressed to them.
    pub async fn delete_pending_games_for(&self, user_id: i64) -> ApiResult<()> {
        sqlx::query(
            "DELETE FROM games
             WHERE away_id IS NULL AND ended_at IS NULL
               AND (host_id = ?1 OR invited_id = ?1)",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_game(&self, id: i64) -> ApiResult<()> {
        sqlx::query("DELETE FROM games WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Open "find" games awaiting a second player, for priming the
    /// matchmaker index after a restart.
    pub async fn searching_games(&self) -> ApiResult<Vec<Game>> {
        let rows = sqlx::query_as::<_, GameRow>(&format!(
            "SELECT {GAME_COLUMNS} FROM games
             WHERE away_id IS NULL AND invited_id IS NULL AND ended_at IS NULL"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Game::try_from).collect()
    }

    /// Started, unfinished games; the timeout sweep walks these.
    pub async fn live_games(&self) -> ApiResult<Vec<Game>> {
        let rows = sqlx::query_as::<_, GameRow>(&format!(
            "SELECT {GAME_COLUMNS} FROM games
             WHERE started_at IS NOT NULL AND ended_at IS NULL"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Game::try_from).collect()
    }

    pub async fn invites_for(&self, user_id: i64, limit: i64, offset: i64) -> ApiResult<(Vec<Game>, i64)> {
        self.game_page(
            "invited_id = ?1 AND ended_at IS NULL",
            &[user_id],
            limit,
            offset,
        )
        .await
    }

    pub async fn searches_for(&self, user_id: i64, limit: i64, offset: i64) -> ApiResult<(Vec<Game>, i64)> {
        self.game_page(
            "host_id = ?1 AND away_id IS NULL AND invited_id IS NULL AND ended_at IS NULL",
            &[user_id],
            limit,
            offset,
        )
        .await
    }

    pub async fn ongoing_for(&self, user_id: i64, limit: i64, offset: i64) -> ApiResult<(Vec<Game>, i64)> {
        self.game_page(
            "(host_id = ?1 OR away_id = ?1) AND started_at IS NOT NULL AND ended_at IS NULL",
            &[user_id],
            limit,
            offset,
        )
        .await
    }

    pub async fn completed_for(&self, user_id: i64, limit: i64, offset: i64) -> ApiResult<(Vec<Game>, i64)> {
        self.game_page(
            "(host_id = ?1 OR away_id = ?1) AND ended_at IS NOT NULL",
            &[user_id],
            limit,
            offset,
        )
        .await
    }

    pub async fn common_completed(
        &self,
        user_id: i64,
        other_id: i64,
        limit: i64,
        offset: i64,
    ) -> ApiResult<(Vec<Game>, i64)> {
        self.game_page(
            "((host_id = ?1 AND away_id = ?2) OR (host_id = ?2 AND away_id = ?1))
                 AND ended_at IS NOT NULL",
            &[user_id, other_id],
            limit,
            offset,
        )
        .await
    }

    async fn game_page(
        &self,
        condition: &str,
        binds: &[i64],
        limit: i64,
        offset: i64,
    ) -> ApiResult<(Vec<Game>, i64)> {
        let count_sql = format!("SELECT COUNT(*) AS n FROM games WHERE {condition}");
        let mut count_query = sqlx::query(&count_sql);
        for &value in binds {
            count_query = count_query.bind(value);
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?.get("n");

        let sql = format!(
            "SELECT {GAME_COLUMNS} FROM games WHERE {condition}
             ORDER BY opened_at DESC, id DESC LIMIT {limit} OFFSET {offset}"
        );
        let mut page_query = sqlx::query_as::<_, GameRow>(&sql);
        for &value in binds {
            page_query = page_query.bind(value);
        }
        let rows = page_query.fetch_all(&self.pool).await?;
        let games: ApiResult<Vec<Game>> = rows.into_iter().map(Game::try_from).collect();
        Ok((games?, total))
    }

    // Notifications

    pub async fn insert_notification(
        &self,
        user_id: i64,
        type_code: &str,
        game_id: Option<i64>,
        now: i64,
    ) -> ApiResult<Notification> {
        let done = sqlx::query(
            "INSERT INTO notifications (user_id, sent_at, type_code, game_id, read)
             VALUES (?1, ?2, ?3, ?4, 0)",
        )
        .bind(user_id)
        .bind(now)
        .bind(type_code)
        .bind(game_id)
        .execute(&self.pool)
        .await?;
        Ok(Notification {
            id: done.last_insert_rowid(),
            user_id,
            sent_at: now,
            type_code: type_code.to_string(),
            game_id,
            read: false,
        })
    }

    pub async fn notification(&self, id: i64) -> ApiResult<Option<Notification>> {
        let notification = sqlx::query_as::<_, Notification>(
            "SELECT id, user_id, sent_at, type_code, game_id, read
             FROM notifications WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(notification)
    }

    pub async fn notifications_for(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> ApiResult<(Vec<Notification>, i64)> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS n FROM notifications WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?
            .get("n");
        let notifications = sqlx::query_as::<_, Notification>(
            "SELECT id, user_id, sent_at, type_code, game_id, read
             FROM notifications WHERE user_id = ?1
             ORDER BY sent_at ASC, id ASC LIMIT ?2 OFFSET ?3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok((notifications, total))
    }

    pub async fn unread_notification_count(&self, user_id: i64) -> ApiResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM notifications WHERE user_id = ?1 AND read = 0",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    pub async fn mark_notification_read(&self, id: i64) -> ApiResult<()> {
        sqlx::query("UPDATE notifications SET read = 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
