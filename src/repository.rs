use crate::models::{
    AdminDashboardStats, Announcement, CreateAnnouncementRequest, CreateItemRequest,
    CreateMessageRequest, Credentials, Item, ItemStatus, LikeState, Message, NewUser, PageRequest,
    Photo, Role, UpdateAnnouncementRequest, UpdateItemRequest, UpdateProfileRequest, User,
    UserStats,
};
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, query_builder::QueryBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// RepoError
///
/// Failures of the persistence layer. `Exhausted` and `Conflict` are expected outcomes
/// the API reports to clients; `Database` is everything else.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("datastore admission queue is full")]
    Exhausted,
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => RepoError::Exhausted,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                RepoError::Conflict("resource already exists".to_string())
            }
            other => RepoError::Database(other),
        }
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

/// PoolGate
///
/// Bounded admission in front of the connection pool. At most
/// `max_connections + queue_depth` operations may hold or wait for a connection;
/// anything past that fails immediately with `RepoError::Exhausted`.
#[derive(Clone, Debug)]
pub struct PoolGate {
    permits: Arc<Semaphore>,
}

impl PoolGate {
    pub fn new(max_connections: u32, queue_depth: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_connections as usize + queue_depth)),
        }
    }

    /// Takes a slot or fails fast. The slot is released when the permit drops.
    pub fn admit(&self) -> RepoResult<OwnedSemaphorePermit> {
        self.permits.clone().try_acquire_owned().map_err(|_| {
            tracing::warn!("repository admission rejected: queue full");
            RepoError::Exhausted
        })
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Repository Trait
///
/// Defines the abstract contract for all persistence operations. Handlers talk to
/// `Arc<dyn Repository>` and never know whether Postgres or an in-memory fake is
/// behind it.
///
/// **Send + Sync + async_trait** are required to make the trait object shareable
/// across Axum's asynchronous task boundaries.
///
/// None of these methods authorize anything: gates and ownership checks run in the
/// handlers before a mutating call is made.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Round-trips the datastore. Used by `/health`.
    async fn ping(&self) -> RepoResult<()>;

    // --- Users / Credentials ---
    /// Fails with `Conflict` when the username is taken.
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: i64) -> RepoResult<Option<User>>;
    async fn get_credentials(&self, username: &str) -> RepoResult<Option<Credentials>>;
    async fn get_password_hash(&self, id: i64) -> RepoResult<Option<String>>;
    async fn update_profile(&self, id: i64, req: UpdateProfileRequest) -> RepoResult<Option<User>>;
    async fn update_password(&self, id: i64, password_hash: String) -> RepoResult<bool>;
    async fn get_user_stats(&self, id: i64) -> RepoResult<UserStats>;
    async fn list_users(&self, page: PageRequest) -> RepoResult<(Vec<User>, i64)>;
    async fn set_user_role(&self, id: i64, role: Role) -> RepoResult<Option<User>>;

    // --- Items ---
    /// Public listing, newest first, with an optional title/description search.
    async fn list_items(
        &self,
        search: Option<String>,
        page: PageRequest,
    ) -> RepoResult<(Vec<Item>, i64)>;
    async fn list_items_by_publisher(
        &self,
        publisher_id: i64,
        page: PageRequest,
    ) -> RepoResult<(Vec<Item>, i64)>;
    /// Detail view: includes photos and the publisher's phone.
    async fn get_item(&self, id: i64) -> RepoResult<Option<Item>>;
    /// Inserts the item (status `pending`) and its photos in one transaction.
    async fn create_item(&self, publisher_id: i64, req: CreateItemRequest) -> RepoResult<Item>;
    /// Partial update; replaces the photo set when `req.photos` is present. One transaction.
    async fn update_item(&self, id: i64, req: UpdateItemRequest) -> RepoResult<Option<Item>>;
    /// Photos go with the item (ON DELETE CASCADE).
    async fn delete_item(&self, id: i64) -> RepoResult<bool>;
    /// Compare-and-set on the status: only applies while the row is still in `from`.
    /// `None` means the row is gone or moved on concurrently.
    async fn set_item_status(
        &self,
        id: i64,
        from: ItemStatus,
        to: ItemStatus,
        rejection_reason: Option<String>,
    ) -> RepoResult<Option<Item>>;

    // --- Photos ---
    async fn list_photos(&self, page: PageRequest) -> RepoResult<(Vec<Photo>, i64)>;
    /// Rows referencing `url`, each carrying the owner of its item.
    async fn get_photos_by_url(&self, url: &str) -> RepoResult<Vec<Photo>>;
    async fn delete_photos_by_url(&self, url: &str) -> RepoResult<u64>;

    // --- Messages ---
    /// Top-level messages only, newest first.
    async fn list_messages(&self, page: PageRequest) -> RepoResult<(Vec<Message>, i64)>;
    async fn get_message(&self, id: i64) -> RepoResult<Option<Message>>;
    /// Replies oldest first.
    async fn get_replies(&self, parent_id: i64) -> RepoResult<Vec<Message>>;
    async fn create_message(&self, user_id: i64, req: CreateMessageRequest) -> RepoResult<Message>;
    /// Replies and likes go with the message (ON DELETE CASCADE).
    async fn delete_message(&self, id: i64) -> RepoResult<bool>;
    /// Idempotent. `None` when the message does not exist.
    async fn like_message(&self, message_id: i64, user_id: i64) -> RepoResult<Option<LikeState>>;
    /// Idempotent. Removing a like that is not there, even on a missing message, succeeds.
    async fn unlike_message(&self, message_id: i64, user_id: i64) -> RepoResult<LikeState>;

    // --- Announcements ---
    async fn list_announcements(&self) -> RepoResult<Vec<Announcement>>;
    async fn get_announcement(&self, id: i64) -> RepoResult<Option<Announcement>>;
    async fn create_announcement(
        &self,
        req: CreateAnnouncementRequest,
        author: String,
    ) -> RepoResult<Announcement>;
    async fn update_announcement(
        &self,
        id: i64,
        req: UpdateAnnouncementRequest,
    ) -> RepoResult<Option<Announcement>>;
    async fn delete_announcement(&self, id: i64) -> RepoResult<bool>;

    // --- Admin ---
    async fn get_stats(&self) -> RepoResult<AdminDashboardStats>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer access across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str =
    "id, username, role, phone, student_no, full_name, avatar_url, created_at";

const ITEM_COLUMNS: &str = r#"
    i.id, i.publisher_id, i.kind, i.title, i.description, i.location, i.lost_date,
    i.contact_info, i.status, i.rejection_reason, i.posted_date,
    u.username AS publisher_name, u.full_name AS publisher_full_name"#;

const MESSAGE_SELECT: &str = r#"
    SELECT m.id, m.user_id, u.username, u.avatar_url, m.content, m.parent_id, m.created_at,
        (SELECT COUNT(*) FROM message_likes l WHERE l.message_id = m.id) AS like_count,
        (SELECT COUNT(*) FROM messages r WHERE r.parent_id = m.id) AS reply_count
    FROM messages m
    JOIN users u ON u.id = m.user_id"#;

const ANNOUNCEMENT_COLUMNS: &str = "id, title, content, priority, author, created_at, updated_at";

/// Escapes LIKE wildcards so a search term matches literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn push_item_search(builder: &mut QueryBuilder<'_, Postgres>, search: &Option<String>) {
    builder.push(" WHERE 1=1");
    if let Some(term) = search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = like_pattern(term);
        builder.push(" AND (i.title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR i.description ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
}

/// Loads photo URLs for a batch of items in one query and attaches them in order.
async fn attach_photos(conn: &mut PgConnection, items: Vec<Item>) -> Result<Vec<Item>, sqlx::Error> {
    if items.is_empty() {
        return Ok(items);
    }
    let ids: Vec<i64> = items.iter().map(|i| i.id).collect();
    let rows: Vec<(i64, String)> =
        sqlx::query_as("SELECT item_id, url FROM photo WHERE item_id = ANY($1) ORDER BY id")
            .bind(&ids)
            .fetch_all(&mut *conn)
            .await?;

    let mut by_item: HashMap<i64, Vec<String>> = HashMap::new();
    for (item_id, url) in rows {
        by_item.entry(item_id).or_default().push(url);
    }
    Ok(items
        .into_iter()
        .map(|item| {
            let photos = by_item.remove(&item.id).unwrap_or_default();
            item.with_photos(photos)
        })
        .collect())
}

async fn load_item(conn: &mut PgConnection, id: i64) -> Result<Option<Item>, sqlx::Error> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS}, u.phone AS publisher_phone
         FROM item i LEFT JOIN users u ON u.id = i.publisher_id
         WHERE i.id = $1"
    );
    let item: Option<Item> = sqlx::query_as(&sql).bind(id).fetch_optional(&mut *conn).await?;
    match item {
        Some(item) => Ok(attach_photos(conn, vec![item]).await?.pop()),
        None => Ok(None),
    }
}

async fn insert_photos(conn: &mut PgConnection, item_id: i64, urls: &[String]) -> Result<(), sqlx::Error> {
    if urls.is_empty() {
        return Ok(());
    }
    sqlx::query("INSERT INTO photo (item_id, url) SELECT $1, UNNEST($2::text[])")
        .bind(item_id)
        .bind(urls)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn count_likes(conn: &mut PgConnection, message_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM message_likes WHERE message_id = $1")
        .bind(message_id)
        .fetch_one(&mut *conn)
        .await
}

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// Every query is parameterized; multi-statement writes run in one transaction, so
/// an error or a dropped future rolls back.
pub struct PostgresRepository {
    pool: PgPool,
    gate: PoolGate,
}

impl PostgresRepository {
    /// Creates a new repository over the initialized pool and its admission gate.
    pub fn new(pool: PgPool, gate: PoolGate) -> Self {
        Self { pool, gate }
    }

    async fn paged_items(
        &self,
        publisher_id: Option<i64>,
        search: Option<String>,
        page: PageRequest,
    ) -> RepoResult<(Vec<Item>, i64)> {
        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM item i");
        push_item_search(&mut count, &search);
        if let Some(owner) = publisher_id {
            count.push(" AND i.publisher_id = ");
            count.push_bind(owner);
        }

        let mut list: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {ITEM_COLUMNS} FROM item i LEFT JOIN users u ON u.id = i.publisher_id"
        ));
        push_item_search(&mut list, &search);
        if let Some(owner) = publisher_id {
            list.push(" AND i.publisher_id = ");
            list.push_bind(owner);
        }
        list.push(" ORDER BY i.posted_date DESC, i.id DESC LIMIT ");
        list.push_bind(page.limit);
        list.push(" OFFSET ");
        list.push_bind(page.offset());

        let mut conn = self.pool.acquire().await?;
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&mut *conn)
            .await?;
        let items = list.build_query_as::<Item>().fetch_all(&mut *conn).await?;
        let items = attach_photos(&mut conn, items).await?;
        Ok((items, total))
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn ping(&self) -> RepoResult<()> {
        let _permit = self.gate.admit()?;
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// create_user
    ///
    /// The unique index on `username` turns a duplicate into `RepoError::Conflict`.
    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let _permit = self.gate.admit()?;
        let sql = format!(
            "INSERT INTO users (username, password_hash, role, phone, student_no, full_name, avatar_url)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as(&sql)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(user.role)
            .bind(&user.phone)
            .bind(&user.student_no)
            .bind(&user.full_name)
            .bind(&user.avatar_url)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match RepoError::from(e) {
                RepoError::Conflict(_) => RepoError::Conflict("username already taken".to_string()),
                other => other,
            })
    }

    async fn get_user(&self, id: i64) -> RepoResult<Option<User>> {
        let _permit = self.gate.admit()?;
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn get_credentials(&self, username: &str) -> RepoResult<Option<Credentials>> {
        let _permit = self.gate.admit()?;
        Ok(sqlx::query_as(
            "SELECT id, username, role, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn get_password_hash(&self, id: i64) -> RepoResult<Option<String>> {
        let _permit = self.gate.admit()?;
        Ok(sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// update_profile
    ///
    /// COALESCE keeps every column the request leaves out.
    async fn update_profile(&self, id: i64, req: UpdateProfileRequest) -> RepoResult<Option<User>> {
        let _permit = self.gate.admit()?;
        let sql = format!(
            "UPDATE users SET
                phone = COALESCE($2, phone),
                student_no = COALESCE($3, student_no),
                full_name = COALESCE($4, full_name),
                avatar_url = COALESCE($5, avatar_url)
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as(&sql)
            .bind(id)
            .bind(req.phone)
            .bind(req.student_no)
            .bind(req.full_name)
            .bind(req.avatar_url)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_password(&self, id: i64, password_hash: String) -> RepoResult<bool> {
        let _permit = self.gate.admit()?;
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_user_stats(&self, id: i64) -> RepoResult<UserStats> {
        let _permit = self.gate.admit()?;
        let (posts, messages): (i64, i64) = sqlx::query_as(
            "SELECT
                (SELECT COUNT(*) FROM item WHERE publisher_id = $1),
                (SELECT COUNT(*) FROM messages WHERE user_id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(UserStats { posts, messages })
    }

    async fn list_users(&self, page: PageRequest) -> RepoResult<(Vec<User>, i64)> {
        let _permit = self.gate.admit()?;
        let mut conn = self.pool.acquire().await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *conn)
            .await?;
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id LIMIT $1 OFFSET $2");
        let users = sqlx::query_as(&sql)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&mut *conn)
            .await?;
        Ok((users, total))
    }

    async fn set_user_role(&self, id: i64, role: Role) -> RepoResult<Option<User>> {
        let _permit = self.gate.admit()?;
        let sql = format!("UPDATE users SET role = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
        Ok(sqlx::query_as(&sql)
            .bind(id)
            .bind(role)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// list_items
    ///
    /// Implements search/filtering with QueryBuilder for safe parameterization.
    async fn list_items(
        &self,
        search: Option<String>,
        page: PageRequest,
    ) -> RepoResult<(Vec<Item>, i64)> {
        let _permit = self.gate.admit()?;
        self.paged_items(None, search, page).await
    }

    async fn list_items_by_publisher(
        &self,
        publisher_id: i64,
        page: PageRequest,
    ) -> RepoResult<(Vec<Item>, i64)> {
        let _permit = self.gate.admit()?;
        self.paged_items(Some(publisher_id), None, page).await
    }

    async fn get_item(&self, id: i64) -> RepoResult<Option<Item>> {
        let _permit = self.gate.admit()?;
        let mut conn = self.pool.acquire().await?;
        Ok(load_item(&mut conn, id).await?)
    }

    /// create_item
    ///
    /// Item row and photo rows commit together or not at all.
    async fn create_item(&self, publisher_id: i64, req: CreateItemRequest) -> RepoResult<Item> {
        let _permit = self.gate.admit()?;
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO item (publisher_id, kind, title, description, location, lost_date, contact_info, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
             RETURNING id",
        )
        .bind(publisher_id)
        .bind(req.kind)
        .bind(&req.title)
        .bind(&req.description)
        .bind(&req.location)
        .bind(req.lost_date)
        .bind(&req.contact_info)
        .fetch_one(&mut *tx)
        .await?;

        insert_photos(&mut tx, id, &req.photos).await?;
        let item = load_item(&mut tx, id)
            .await?
            .ok_or_else(|| RepoError::Database(sqlx::Error::RowNotFound))?;

        tx.commit().await?;
        Ok(item)
    }

    /// update_item
    ///
    /// COALESCE partial update plus optional photo replacement, in one transaction.
    async fn update_item(&self, id: i64, req: UpdateItemRequest) -> RepoResult<Option<Item>> {
        let _permit = self.gate.admit()?;
        let mut tx = self.pool.begin().await?;

        let updated: Option<i64> = sqlx::query_scalar(
            "UPDATE item SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                kind = COALESCE($4, kind),
                location = COALESCE($5, location),
                contact_info = COALESCE($6, contact_info),
                lost_date = COALESCE($7, lost_date)
             WHERE id = $1
             RETURNING id",
        )
        .bind(id)
        .bind(&req.title)
        .bind(&req.description)
        .bind(req.kind)
        .bind(&req.location)
        .bind(&req.contact_info)
        .bind(req.lost_date)
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            return Ok(None);
        }

        if let Some(photos) = &req.photos {
            sqlx::query("DELETE FROM photo WHERE item_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            insert_photos(&mut tx, id, photos).await?;
        }

        let item = load_item(&mut tx, id).await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn delete_item(&self, id: i64) -> RepoResult<bool> {
        let _permit = self.gate.admit()?;
        let result = sqlx::query("DELETE FROM item WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_item_status(
        &self,
        id: i64,
        from: ItemStatus,
        to: ItemStatus,
        rejection_reason: Option<String>,
    ) -> RepoResult<Option<Item>> {
        let _permit = self.gate.admit()?;
        let mut conn = self.pool.acquire().await?;
        let updated: Option<i64> = sqlx::query_scalar(
            "UPDATE item SET status = $3, rejection_reason = $4
             WHERE id = $1 AND status = $2
             RETURNING id",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(rejection_reason)
        .fetch_optional(&mut *conn)
        .await?;

        match updated {
            Some(_) => Ok(load_item(&mut conn, id).await?),
            None => Ok(None),
        }
    }

    async fn list_photos(&self, page: PageRequest) -> RepoResult<(Vec<Photo>, i64)> {
        let _permit = self.gate.admit()?;
        let mut conn = self.pool.acquire().await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM photo")
            .fetch_one(&mut *conn)
            .await?;
        let photos = sqlx::query_as(
            "SELECT p.id, p.item_id, p.url, i.title AS item_title, i.publisher_id
             FROM photo p JOIN item i ON i.id = p.item_id
             ORDER BY p.id DESC
             LIMIT $1 OFFSET $2",
        )
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&mut *conn)
        .await?;
        Ok((photos, total))
    }

    async fn get_photos_by_url(&self, url: &str) -> RepoResult<Vec<Photo>> {
        let _permit = self.gate.admit()?;
        Ok(sqlx::query_as(
            "SELECT p.id, p.item_id, p.url, i.title AS item_title, i.publisher_id
             FROM photo p JOIN item i ON i.id = p.item_id
             WHERE p.url = $1",
        )
        .bind(url)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn delete_photos_by_url(&self, url: &str) -> RepoResult<u64> {
        let _permit = self.gate.admit()?;
        let result = sqlx::query("DELETE FROM photo WHERE url = $1")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_messages(&self, page: PageRequest) -> RepoResult<(Vec<Message>, i64)> {
        let _permit = self.gate.admit()?;
        let mut conn = self.pool.acquire().await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE parent_id IS NULL")
            .fetch_one(&mut *conn)
            .await?;
        let sql = format!(
            "{MESSAGE_SELECT} WHERE m.parent_id IS NULL ORDER BY m.created_at DESC, m.id DESC LIMIT $1 OFFSET $2"
        );
        let messages = sqlx::query_as(&sql)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&mut *conn)
            .await?;
        Ok((messages, total))
    }

    async fn get_message(&self, id: i64) -> RepoResult<Option<Message>> {
        let _permit = self.gate.admit()?;
        let sql = format!("{MESSAGE_SELECT} WHERE m.id = $1");
        Ok(sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn get_replies(&self, parent_id: i64) -> RepoResult<Vec<Message>> {
        let _permit = self.gate.admit()?;
        let sql = format!("{MESSAGE_SELECT} WHERE m.parent_id = $1 ORDER BY m.created_at ASC, m.id ASC");
        Ok(sqlx::query_as(&sql).bind(parent_id).fetch_all(&self.pool).await?)
    }

    async fn create_message(&self, user_id: i64, req: CreateMessageRequest) -> RepoResult<Message> {
        let _permit = self.gate.admit()?;
        let mut tx = self.pool.begin().await?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO messages (user_id, content, parent_id) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(user_id)
        .bind(req.content.trim())
        .bind(req.parent_id)
        .fetch_one(&mut *tx)
        .await?;

        let sql = format!("{MESSAGE_SELECT} WHERE m.id = $1");
        let message = sqlx::query_as(&sql).bind(id).fetch_one(&mut *tx).await?;
        tx.commit().await?;
        Ok(message)
    }

    async fn delete_message(&self, id: i64) -> RepoResult<bool> {
        let _permit = self.gate.admit()?;
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// like_message
    ///
    /// `ON CONFLICT DO NOTHING` makes a repeated like a no-op. The `FOR SHARE` lock keeps
    /// the message from disappearing between the existence check and the insert.
    async fn like_message(&self, message_id: i64, user_id: i64) -> RepoResult<Option<LikeState>> {
        let _permit = self.gate.admit()?;
        let mut tx = self.pool.begin().await?;
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM messages WHERE id = $1 FOR SHARE")
            .bind(message_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        sqlx::query(
            "INSERT INTO message_likes (message_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(message_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let like_count = count_likes(&mut tx, message_id).await?;
        tx.commit().await?;
        Ok(Some(LikeState {
            liked: true,
            like_count,
        }))
    }

    async fn unlike_message(&self, message_id: i64, user_id: i64) -> RepoResult<LikeState> {
        let _permit = self.gate.admit()?;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM message_likes WHERE message_id = $1 AND user_id = $2")
            .bind(message_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let like_count = count_likes(&mut tx, message_id).await?;
        tx.commit().await?;
        Ok(LikeState {
            liked: false,
            like_count,
        })
    }

    async fn list_announcements(&self) -> RepoResult<Vec<Announcement>> {
        let _permit = self.gate.admit()?;
        let sql = format!(
            "SELECT {ANNOUNCEMENT_COLUMNS} FROM announcements ORDER BY created_at DESC, id DESC"
        );
        Ok(sqlx::query_as(&sql).fetch_all(&self.pool).await?)
    }

    async fn get_announcement(&self, id: i64) -> RepoResult<Option<Announcement>> {
        let _permit = self.gate.admit()?;
        let sql = format!("SELECT {ANNOUNCEMENT_COLUMNS} FROM announcements WHERE id = $1");
        Ok(sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn create_announcement(
        &self,
        req: CreateAnnouncementRequest,
        author: String,
    ) -> RepoResult<Announcement> {
        let _permit = self.gate.admit()?;
        let sql = format!(
            "INSERT INTO announcements (title, content, priority, author)
             VALUES ($1, $2, $3, $4)
             RETURNING {ANNOUNCEMENT_COLUMNS}"
        );
        Ok(sqlx::query_as(&sql)
            .bind(req.title)
            .bind(req.content)
            .bind(req.priority)
            .bind(author)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_announcement(
        &self,
        id: i64,
        req: UpdateAnnouncementRequest,
    ) -> RepoResult<Option<Announcement>> {
        let _permit = self.gate.admit()?;
        let sql = format!(
            "UPDATE announcements SET
                title = COALESCE($2, title),
                content = COALESCE($3, content),
                priority = COALESCE($4, priority),
                author = COALESCE($5, author),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {ANNOUNCEMENT_COLUMNS}"
        );
        Ok(sqlx::query_as(&sql)
            .bind(id)
            .bind(req.title)
            .bind(req.content)
            .bind(req.priority)
            .bind(req.author)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_announcement(&self, id: i64) -> RepoResult<bool> {
        let _permit = self.gate.admit()?;
        let result = sqlx::query("DELETE FROM announcements WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// get_stats
    ///
    /// Aggregates all dashboard counters in a single round trip.
    async fn get_stats(&self) -> RepoResult<AdminDashboardStats> {
        let _permit = self.gate.admit()?;
        let (item_count, user_count, pending_count, approved_count, rejected_count, message_count): (
            i64,
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            "SELECT
                (SELECT COUNT(*) FROM item),
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM item WHERE status = 'pending'),
                (SELECT COUNT(*) FROM item WHERE status = 'approved'),
                (SELECT COUNT(*) FROM item WHERE status = 'rejected'),
                (SELECT COUNT(*) FROM messages)",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(AdminDashboardStats {
            item_count,
            user_count,
            pending_count,
            approved_count,
            rejected_count,
            message_count,
        })
    }
}
