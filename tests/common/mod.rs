#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use campus_lost_found::{
    AppConfig, AppState, MockStorageService, PoolGate, TokenService,
    auth::AuthUser,
    create_router,
    models::{
        AdminDashboardStats, Announcement, CreateAnnouncementRequest, CreateItemRequest,
        CreateMessageRequest, Credentials, Item, ItemKind, ItemStatus, LikeState, Message,
        NewUser, PageRequest, Photo, Role, UpdateAnnouncementRequest, UpdateItemRequest,
        UpdateProfileRequest, User, UserStats,
    },
    repository::{RepoError, RepoResult, Repository, RepositoryState},
};
use chrono::Utc;
use serde_json::Value;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::sync::OwnedSemaphorePermit;
use tower::ServiceExt;

// --- In-memory Repository ---

#[derive(Clone)]
struct MessageRow {
    id: i64,
    user_id: i64,
    content: String,
    parent_id: Option<i64>,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Default)]
struct Store {
    next_id: i64,
    users: Vec<User>,
    hashes: HashMap<i64, String>,
    items: Vec<Item>,
    // (photo id, item id, url)
    photos: Vec<(i64, i64, String)>,
    messages: Vec<MessageRow>,
    likes: HashSet<(i64, i64)>,
    announcements: Vec<Announcement>,
}

impl Store {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, id: i64) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    fn item_view(&self, item: &Item, detail: bool) -> Item {
        let publisher = self.user(item.publisher_id);
        let photos = self
            .photos
            .iter()
            .filter(|(_, item_id, _)| *item_id == item.id)
            .map(|(_, _, url)| url.clone())
            .collect();
        Item {
            publisher_name: publisher.map(|u| u.username.clone()),
            publisher_full_name: publisher.and_then(|u| u.full_name.clone()),
            publisher_phone: if detail {
                publisher.and_then(|u| u.phone.clone())
            } else {
                None
            },
            ..item.clone()
        }
        .with_photos(photos)
    }

    fn message_view(&self, row: &MessageRow) -> Message {
        let author = self.user(row.user_id);
        Message {
            id: row.id,
            user_id: row.user_id,
            username: author.map(|u| u.username.clone()).unwrap_or_default(),
            avatar_url: author.and_then(|u| u.avatar_url.clone()),
            content: row.content.clone(),
            parent_id: row.parent_id,
            created_at: row.created_at,
            like_count: self.likes.iter().filter(|(m, _)| *m == row.id).count() as i64,
            reply_count: self
                .messages
                .iter()
                .filter(|m| m.parent_id == Some(row.id))
                .count() as i64,
        }
    }

    fn photo_view(&self, (id, item_id, url): &(i64, i64, String)) -> Photo {
        let item = self.items.iter().find(|i| i.id == *item_id);
        Photo {
            id: *id,
            item_id: *item_id,
            url: url.clone(),
            item_title: item.map(|i| i.title.clone()),
            publisher_id: item.map(|i| i.publisher_id),
        }
    }

    fn replace_photos(&mut self, item_id: i64, urls: Vec<String>) {
        self.photos.retain(|(_, owner, _)| *owner != item_id);
        for url in urls {
            let id = self.next_id();
            self.photos.push((id, item_id, url));
        }
    }

    fn like_state(&self, message_id: i64, liked: bool) -> LikeState {
        LikeState {
            liked,
            like_count: self.likes.iter().filter(|(m, _)| *m == message_id).count() as i64,
        }
    }
}

fn page_of<T>(all: Vec<T>, page: PageRequest) -> (Vec<T>, i64) {
    let total = all.len() as i64;
    let rows = all
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect();
    (rows, total)
}

/// InMemoryRepository
///
/// A `Repository` backed by vectors behind a mutex. Optionally sits behind a
/// `PoolGate` and sleeps before every call, to drive the 503 and 504 paths.
#[derive(Default)]
pub struct InMemoryRepository {
    store: Mutex<Store>,
    gate: Option<PoolGate>,
    latency: Option<Duration>,
    offline: bool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gate(gate: PoolGate) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn with_latency_of(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Every call fails as if the database were unreachable.
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    async fn enter(&self) -> RepoResult<Option<OwnedSemaphorePermit>> {
        if self.offline {
            return Err(RepoError::Database(sqlx::Error::PoolClosed));
        }
        let permit = match &self.gate {
            Some(gate) => Some(gate.admit()?),
            None => None,
        };
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(permit)
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap()
    }

    // --- Seeding helpers ---

    pub fn seed_user(&self, username: &str, role: Role) -> User {
        let mut store = self.lock();
        let user = User {
            id: store.next_id(),
            username: username.to_string(),
            role,
            phone: Some("13800138000".to_string()),
            created_at: Utc::now(),
            ..User::default()
        };
        store.hashes.insert(user.id, "not-a-real-hash".to_string());
        store.users.push(user.clone());
        user
    }

    pub fn seed_item(&self, publisher_id: i64, title: &str) -> Item {
        let mut store = self.lock();
        let item = Item {
            id: store.next_id(),
            publisher_id,
            kind: ItemKind::Lost,
            title: title.to_string(),
            status: ItemStatus::Pending,
            posted_date: Utc::now(),
            ..Item::default()
        };
        store.items.push(item.clone());
        item
    }

    pub fn seed_photo(&self, item_id: i64, url: &str) {
        let mut store = self.lock();
        let id = store.next_id();
        store.photos.push((id, item_id, url.to_string()));
    }

    pub fn seed_message(&self, user_id: i64, content: &str, parent_id: Option<i64>) -> i64 {
        let mut store = self.lock();
        let id = store.next_id();
        store.messages.push(MessageRow {
            id,
            user_id,
            content: content.to_string(),
            parent_id,
            created_at: Utc::now(),
        });
        id
    }

    pub fn item_status(&self, id: i64) -> Option<ItemStatus> {
        self.lock().items.iter().find(|i| i.id == id).map(|i| i.status)
    }

    pub fn item_count(&self) -> usize {
        self.lock().items.len()
    }

    pub fn message_count(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn like_count(&self) -> usize {
        self.lock().likes.len()
    }

    pub fn force_role(&self, id: i64, role: Role) {
        if let Some(user) = self.lock().users.iter_mut().find(|u| u.id == id) {
            user.role = role;
        }
    }

    pub fn role_of(&self, id: i64) -> Option<Role> {
        self.lock().user(id).map(|u| u.role)
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn ping(&self) -> RepoResult<()> {
        let _permit = self.enter().await?;
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let _permit = self.enter().await?;
        let mut store = self.lock();
        if store.users.iter().any(|u| u.username == user.username) {
            return Err(RepoError::Conflict("username already taken".to_string()));
        }
        let created = User {
            id: store.next_id(),
            username: user.username,
            role: user.role,
            phone: user.phone,
            student_no: user.student_no,
            full_name: user.full_name,
            avatar_url: user.avatar_url,
            created_at: Utc::now(),
        };
        store.hashes.insert(created.id, user.password_hash);
        store.users.push(created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: i64) -> RepoResult<Option<User>> {
        let _permit = self.enter().await?;
        Ok(self.lock().user(id).cloned())
    }

    async fn get_credentials(&self, username: &str) -> RepoResult<Option<Credentials>> {
        let _permit = self.enter().await?;
        let store = self.lock();
        Ok(store
            .users
            .iter()
            .find(|u| u.username == username)
            .map(|u| Credentials {
                id: u.id,
                username: u.username.clone(),
                role: u.role,
                password_hash: store.hashes.get(&u.id).cloned().unwrap_or_default(),
            }))
    }

    async fn get_password_hash(&self, id: i64) -> RepoResult<Option<String>> {
        let _permit = self.enter().await?;
        Ok(self.lock().hashes.get(&id).cloned())
    }

    async fn update_profile(&self, id: i64, req: UpdateProfileRequest) -> RepoResult<Option<User>> {
        let _permit = self.enter().await?;
        let mut store = self.lock();
        let Some(user) = store.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(phone) = req.phone {
            user.phone = Some(phone);
        }
        if let Some(student_no) = req.student_no {
            user.student_no = Some(student_no);
        }
        if let Some(full_name) = req.full_name {
            user.full_name = Some(full_name);
        }
        if let Some(avatar_url) = req.avatar_url {
            user.avatar_url = Some(avatar_url);
        }
        Ok(Some(user.clone()))
    }

    async fn update_password(&self, id: i64, password_hash: String) -> RepoResult<bool> {
        let _permit = self.enter().await?;
        let mut store = self.lock();
        if store.user(id).is_none() {
            return Ok(false);
        }
        store.hashes.insert(id, password_hash);
        Ok(true)
    }

    async fn get_user_stats(&self, id: i64) -> RepoResult<UserStats> {
        let _permit = self.enter().await?;
        let store = self.lock();
        Ok(UserStats {
            posts: store.items.iter().filter(|i| i.publisher_id == id).count() as i64,
            messages: store.messages.iter().filter(|m| m.user_id == id).count() as i64,
        })
    }

    async fn list_users(&self, page: PageRequest) -> RepoResult<(Vec<User>, i64)> {
        let _permit = self.enter().await?;
        let mut users = self.lock().users.clone();
        users.sort_by_key(|u| u.id);
        Ok(page_of(users, page))
    }

    async fn set_user_role(&self, id: i64, role: Role) -> RepoResult<Option<User>> {
        let _permit = self.enter().await?;
        let mut store = self.lock();
        Ok(store.users.iter_mut().find(|u| u.id == id).map(|u| {
            u.role = role;
            u.clone()
        }))
    }

    async fn list_items(
        &self,
        search: Option<String>,
        page: PageRequest,
    ) -> RepoResult<(Vec<Item>, i64)> {
        let _permit = self.enter().await?;
        let store = self.lock();
        let needle = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let mut items: Vec<Item> = store
            .items
            .iter()
            .filter(|i| match &needle {
                Some(n) => {
                    i.title.to_lowercase().contains(n)
                        || i.description
                            .as_deref()
                            .is_some_and(|d| d.to_lowercase().contains(n))
                }
                None => true,
            })
            .map(|i| store.item_view(i, false))
            .collect();
        items.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(page_of(items, page))
    }

    async fn list_items_by_publisher(
        &self,
        publisher_id: i64,
        page: PageRequest,
    ) -> RepoResult<(Vec<Item>, i64)> {
        let _permit = self.enter().await?;
        let store = self.lock();
        let mut items: Vec<Item> = store
            .items
            .iter()
            .filter(|i| i.publisher_id == publisher_id)
            .map(|i| store.item_view(i, false))
            .collect();
        items.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(page_of(items, page))
    }

    async fn get_item(&self, id: i64) -> RepoResult<Option<Item>> {
        let _permit = self.enter().await?;
        let store = self.lock();
        Ok(store
            .items
            .iter()
            .find(|i| i.id == id)
            .map(|i| store.item_view(i, true)))
    }

    async fn create_item(&self, publisher_id: i64, req: CreateItemRequest) -> RepoResult<Item> {
        let _permit = self.enter().await?;
        let mut store = self.lock();
        let item = Item {
            id: store.next_id(),
            publisher_id,
            kind: req.kind,
            title: req.title,
            description: req.description,
            location: req.location,
            lost_date: req.lost_date,
            contact_info: req.contact_info,
            status: ItemStatus::Pending,
            posted_date: Utc::now(),
            ..Item::default()
        };
        store.items.push(item.clone());
        store.replace_photos(item.id, req.photos);
        Ok(store.item_view(&item, true))
    }

    async fn update_item(&self, id: i64, req: UpdateItemRequest) -> RepoResult<Option<Item>> {
        let _permit = self.enter().await?;
        let mut store = self.lock();
        let Some(item) = store.items.iter_mut().find(|i| i.id == id) else {
            return Ok(None);
        };
        if let Some(title) = req.title {
            item.title = title;
        }
        if let Some(description) = req.description {
            item.description = Some(description);
        }
        if let Some(kind) = req.kind {
            item.kind = kind;
        }
        if let Some(location) = req.location {
            item.location = Some(location);
        }
        if let Some(contact_info) = req.contact_info {
            item.contact_info = Some(contact_info);
        }
        if let Some(lost_date) = req.lost_date {
            item.lost_date = Some(lost_date);
        }
        let item = item.clone();
        if let Some(photos) = req.photos {
            store.replace_photos(id, photos);
        }
        Ok(Some(store.item_view(&item, true)))
    }

    async fn delete_item(&self, id: i64) -> RepoResult<bool> {
        let _permit = self.enter().await?;
        let mut store = self.lock();
        let before = store.items.len();
        store.items.retain(|i| i.id != id);
        store.photos.retain(|(_, item_id, _)| *item_id != id);
        Ok(store.items.len() < before)
    }

    async fn set_item_status(
        &self,
        id: i64,
        from: ItemStatus,
        to: ItemStatus,
        rejection_reason: Option<String>,
    ) -> RepoResult<Option<Item>> {
        let _permit = self.enter().await?;
        let mut store = self.lock();
        let Some(item) = store.items.iter_mut().find(|i| i.id == id && i.status == from) else {
            return Ok(None);
        };
        item.status = to;
        item.rejection_reason = rejection_reason;
        let item = item.clone();
        Ok(Some(store.item_view(&item, true)))
    }

    async fn list_photos(&self, page: PageRequest) -> RepoResult<(Vec<Photo>, i64)> {
        let _permit = self.enter().await?;
        let store = self.lock();
        let mut photos: Vec<Photo> = store.photos.iter().map(|p| store.photo_view(p)).collect();
        photos.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(page_of(photos, page))
    }

    async fn get_photos_by_url(&self, url: &str) -> RepoResult<Vec<Photo>> {
        let _permit = self.enter().await?;
        let store = self.lock();
        Ok(store
            .photos
            .iter()
            .filter(|(_, _, u)| u == url)
            .map(|p| store.photo_view(p))
            .collect())
    }

    async fn delete_photos_by_url(&self, url: &str) -> RepoResult<u64> {
        let _permit = self.enter().await?;
        let mut store = self.lock();
        let before = store.photos.len();
        store.photos.retain(|(_, _, u)| u != url);
        Ok((before - store.photos.len()) as u64)
    }

    async fn list_messages(&self, page: PageRequest) -> RepoResult<(Vec<Message>, i64)> {
        let _permit = self.enter().await?;
        let store = self.lock();
        let mut messages: Vec<Message> = store
            .messages
            .iter()
            .filter(|m| m.parent_id.is_none())
            .map(|m| store.message_view(m))
            .collect();
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(page_of(messages, page))
    }

    async fn get_message(&self, id: i64) -> RepoResult<Option<Message>> {
        let _permit = self.enter().await?;
        let store = self.lock();
        Ok(store
            .messages
            .iter()
            .find(|m| m.id == id)
            .map(|m| store.message_view(m)))
    }

    async fn get_replies(&self, parent_id: i64) -> RepoResult<Vec<Message>> {
        let _permit = self.enter().await?;
        let store = self.lock();
        Ok(store
            .messages
            .iter()
            .filter(|m| m.parent_id == Some(parent_id))
            .map(|m| store.message_view(m))
            .collect())
    }

    async fn create_message(&self, user_id: i64, req: CreateMessageRequest) -> RepoResult<Message> {
        let _permit = self.enter().await?;
        let mut store = self.lock();
        let row = MessageRow {
            id: store.next_id(),
            user_id,
            content: req.content.trim().to_string(),
            parent_id: req.parent_id,
            created_at: Utc::now(),
        };
        store.messages.push(row.clone());
        Ok(store.message_view(&row))
    }

    async fn delete_message(&self, id: i64) -> RepoResult<bool> {
        let _permit = self.enter().await?;
        let mut store = self.lock();
        if !store.messages.iter().any(|m| m.id == id) {
            return Ok(false);
        }
        let doomed: HashSet<i64> = store
            .messages
            .iter()
            .filter(|m| m.id == id || m.parent_id == Some(id))
            .map(|m| m.id)
            .collect();
        store.messages.retain(|m| !doomed.contains(&m.id));
        store.likes.retain(|(m, _)| !doomed.contains(m));
        Ok(true)
    }

    async fn like_message(&self, message_id: i64, user_id: i64) -> RepoResult<Option<LikeState>> {
        let _permit = self.enter().await?;
        let mut store = self.lock();
        if !store.messages.iter().any(|m| m.id == message_id) {
            return Ok(None);
        }
        store.likes.insert((message_id, user_id));
        Ok(Some(store.like_state(message_id, true)))
    }

    async fn unlike_message(&self, message_id: i64, user_id: i64) -> RepoResult<LikeState> {
        let _permit = self.enter().await?;
        let mut store = self.lock();
        store.likes.remove(&(message_id, user_id));
        Ok(store.like_state(message_id, false))
    }

    async fn list_announcements(&self) -> RepoResult<Vec<Announcement>> {
        let _permit = self.enter().await?;
        let mut announcements = self.lock().announcements.clone();
        announcements.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(announcements)
    }

    async fn get_announcement(&self, id: i64) -> RepoResult<Option<Announcement>> {
        let _permit = self.enter().await?;
        Ok(self.lock().announcements.iter().find(|a| a.id == id).cloned())
    }

    async fn create_announcement(
        &self,
        req: CreateAnnouncementRequest,
        author: String,
    ) -> RepoResult<Announcement> {
        let _permit = self.enter().await?;
        let mut store = self.lock();
        let now = Utc::now();
        let announcement = Announcement {
            id: store.next_id(),
            title: req.title,
            content: req.content,
            priority: req.priority,
            author,
            created_at: now,
            updated_at: now,
        };
        store.announcements.push(announcement.clone());
        Ok(announcement)
    }

    async fn update_announcement(
        &self,
        id: i64,
        req: UpdateAnnouncementRequest,
    ) -> RepoResult<Option<Announcement>> {
        let _permit = self.enter().await?;
        let mut store = self.lock();
        let Some(announcement) = store.announcements.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };
        if let Some(title) = req.title {
            announcement.title = title;
        }
        if let Some(content) = req.content {
            announcement.content = content;
        }
        if let Some(priority) = req.priority {
            announcement.priority = priority;
        }
        if let Some(author) = req.author {
            announcement.author = author;
        }
        announcement.updated_at = Utc::now();
        Ok(Some(announcement.clone()))
    }

    async fn delete_announcement(&self, id: i64) -> RepoResult<bool> {
        let _permit = self.enter().await?;
        let mut store = self.lock();
        let before = store.announcements.len();
        store.announcements.retain(|a| a.id != id);
        Ok(store.announcements.len() < before)
    }

    async fn get_stats(&self) -> RepoResult<AdminDashboardStats> {
        let _permit = self.enter().await?;
        let store = self.lock();
        let by_status = |status: ItemStatus| store.items.iter().filter(|i| i.status == status).count() as i64;
        Ok(AdminDashboardStats {
            item_count: store.items.len() as i64,
            user_count: store.users.len() as i64,
            pending_count: by_status(ItemStatus::Pending),
            approved_count: by_status(ItemStatus::Approved),
            rejected_count: by_status(ItemStatus::Rejected),
            message_count: store.messages.len() as i64,
        })
    }
}

// --- Application Harness ---

/// TestApp
///
/// A fully wired router over the in-memory repository and mock storage, plus direct
/// handles to both so tests can seed and inspect state.
pub struct TestApp {
    pub router: Router,
    pub repo: Arc<InMemoryRepository>,
    pub storage: MockStorageService,
    pub tokens: TokenService,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(InMemoryRepository::new(), AppConfig::default())
    }

    pub fn with(repo: InMemoryRepository, config: AppConfig) -> Self {
        Self::with_storage(repo, config, MockStorageService::new())
    }

    pub fn with_storage(
        repo: InMemoryRepository,
        config: AppConfig,
        storage: MockStorageService,
    ) -> Self {
        let repo = Arc::new(repo);
        let state = AppState::new(
            repo.clone() as RepositoryState,
            Arc::new(storage.clone()),
            config,
        );
        let tokens = state.tokens.clone();
        Self {
            router: create_router(state),
            repo,
            storage,
            tokens,
        }
    }

    /// Seeds an account and returns it with a valid bearer token.
    pub fn user(&self, username: &str, role: Role) -> (User, String) {
        let user = self.repo.seed_user(username, role);
        let token = self.token_for(&user);
        (user, token)
    }

    pub fn token_for(&self, user: &User) -> String {
        self.tokens
            .issue(&AuthUser {
                id: user.id,
                username: user.username.clone(),
                role: user.role,
            })
            .unwrap()
    }

    /// Sends one request through the whole middleware stack and decodes the envelope.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

// --- Request Builders ---

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    without_body("GET", uri, token)
}

pub fn delete(uri: &str, token: Option<&str>) -> Request<Body> {
    without_body("DELETE", uri, token)
}

pub fn without_body(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    raw_json(method, uri, token, body.to_string())
}

pub fn raw_json(method: &str, uri: &str, token: Option<&str>, body: String) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

/// The `error.code` of a failure envelope.
pub fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}
