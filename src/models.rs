use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

// --- Canonical Enums (Mapped to Postgres enum types) ---

/// Role
///
/// The one source of truth for privilege levels. Stored as the `user_role` Postgres
/// enum and serialized as `regular_user` / `regular_admin` / `super_admin`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema,
    sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    #[default]
    RegularUser,
    RegularAdmin,
    SuperAdmin,
}

impl Role {
    /// Roles allowed past the admin gate and allowed to bypass ownership checks.
    pub const ELEVATED: [Role; 2] = [Role::RegularAdmin, Role::SuperAdmin];

    pub fn is_elevated(self) -> bool {
        Self::ELEVATED.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::RegularUser => "regular_user",
            Role::RegularAdmin => "regular_admin",
            Role::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role {0:?}")]
pub struct UnknownRole(pub String);

/// The legacy boundary: older clients and imported rows spell roles in several
/// ways. Every spelling collapses onto the canonical enum here and nowhere else.
impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "regular_user" | "user" | "regular user" | "普通用户" => Ok(Role::RegularUser),
            "regular_admin" | "admin" | "regular admin" | "普通管理员" => Ok(Role::RegularAdmin),
            "super_admin" | "super admin" | "superadmin" | "超级管理员" => Ok(Role::SuperAdmin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// ItemKind
///
/// Whether the publisher lost the item or found it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "item_kind", rename_all = "snake_case")]
#[ts(export)]
pub enum ItemKind {
    #[default]
    Lost,
    Found,
}

/// ItemStatus
///
/// Moderation state. Every item starts `Pending`; an administrator moves it to
/// `Approved` or `Rejected`, both terminal.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "item_status", rename_all = "snake_case")]
#[ts(export)]
pub enum ItemStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Approved => "approved",
            ItemStatus::Rejected => "rejected",
        }
    }

    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        matches!(
            (self, next),
            (ItemStatus::Pending, ItemStatus::Approved) | (ItemStatus::Pending, ItemStatus::Rejected)
        )
    }
}

/// AnnouncementPriority
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "announcement_priority", rename_all = "snake_case")]
#[ts(export)]
pub enum AnnouncementPriority {
    Low,
    #[default]
    Normal,
    High,
}

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// Public profile of a row in the `users` table. The password hash never leaves the
/// repository inside this struct.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub phone: Option<String>,
    pub student_no: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Credentials
///
/// The subset of a user row needed to check a password. Internal only.
#[derive(Debug, Clone, FromRow)]
pub struct Credentials {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub password_hash: String,
}

/// NewUser
///
/// Insert payload built by the register handler once the password is hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub phone: Option<String>,
    pub student_no: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Item
///
/// A lost or found report from the `item` table joined with its publisher and photos.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Item {
    pub id: i64,
    // FK to users.id (Owner).
    pub publisher_id: i64,
    // `type` is reserved in Rust; the column is `kind`, the JSON key stays `type`.
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    #[ts(type = "string | null")]
    pub lost_date: Option<NaiveDate>,
    pub contact_info: Option<String>,
    pub status: ItemStatus,
    pub rejection_reason: Option<String>,
    #[ts(type = "string")]
    pub posted_date: DateTime<Utc>,

    // Loaded via JOIN on users.
    #[sqlx(default)]
    pub publisher_name: Option<String>,
    #[sqlx(default)]
    pub publisher_full_name: Option<String>,
    // Only populated on the detail view.
    #[sqlx(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher_phone: Option<String>,

    // Loaded by a second query against `photo`.
    #[sqlx(skip)]
    pub photos: Vec<String>,
    // Cover image: the first photo, if any.
    #[sqlx(skip)]
    #[serde(rename = "photoUrl")]
    pub photo_url: Option<String>,
}

impl Item {
    /// Attaches the photo URL list and derives the cover image from it.
    pub fn with_photos(mut self, photos: Vec<String>) -> Self {
        self.photo_url = photos.first().cloned();
        self.photos = photos;
        self
    }
}

/// Photo
///
/// A row of the `photo` table joined with its item's title and owner.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Photo {
    pub id: i64,
    pub item_id: i64,
    pub url: String,
    #[sqlx(default)]
    pub item_title: Option<String>,
    // Owner of the parent item, used by the ownership check on delete.
    #[sqlx(default)]
    #[serde(skip_serializing)]
    #[ts(skip)]
    pub publisher_id: Option<i64>,
}

/// Message
///
/// A message-board entry. Top-level messages have no `parent_id`; replies point at
/// a top-level message.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Message {
    pub id: i64,
    // FK to users.id (Owner).
    pub user_id: i64,
    pub username: String,
    pub avatar_url: Option<String>,
    pub content: String,
    pub parent_id: Option<i64>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub like_count: i64,
    pub reply_count: i64,
}

/// MessageThread
///
/// A top-level message with every reply, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MessageThread {
    #[serde(flatten)]
    pub message: Message,
    pub replies: Vec<Message>,
}

/// Announcement
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Announcement {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub priority: AnnouncementPriority,
    pub author: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterRequest
///
/// Input payload for POST /api/auth/register. The role is never client-chosen.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct RegisterRequest {
    // Trimmed on the way in, so the length rule sees the name that gets stored.
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 3, max = 50, message = "username must be 3-50 characters"))]
    pub username: String,
    #[validate(length(min = 6, max = 128, message = "password must be at least 6 characters"))]
    pub password: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 20, message = "student_no must be 1-20 characters"))]
    pub student_no: Option<String>,
    #[validate(length(min = 1, max = 50, message = "full_name must be 1-50 characters"))]
    pub full_name: Option<String>,
    #[validate(url(message = "avatar_url must be a URL"))]
    pub avatar_url: Option<String>,
}

/// LoginRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "username must not be empty"))]
    pub username: String,
    #[validate(length(min = 1, message = "password must not be empty"))]
    pub password: String,
}

/// UpdateProfileRequest
///
/// Partial update of the caller's own profile (PUT /api/users/profile).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct UpdateProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 20, message = "student_no must be 1-20 characters"))]
    pub student_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 50, message = "full_name must be 1-50 characters"))]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(url(message = "avatar_url must be a URL"))]
    pub avatar_url: Option<String>,
}

impl UpdateProfileRequest {
    pub fn is_empty(&self) -> bool {
        self.phone.is_none()
            && self.student_no.is_none()
            && self.full_name.is_none()
            && self.avatar_url.is_none()
    }
}

/// ChangePasswordRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "old password must not be empty"))]
    pub old_password: String,
    #[validate(length(min = 6, max = 128, message = "new password must be at least 6 characters"))]
    pub new_password: String,
}

/// CreateItemRequest
///
/// Input payload for POST /api/items. `photos` holds URLs previously returned by the
/// upload endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateItemRequest {
    #[validate(length(min = 1, max = 100, message = "title must be 1-100 characters"))]
    pub title: String,
    #[validate(length(max = 1000, message = "description must be at most 1000 characters"))]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[validate(length(max = 255, message = "location must be at most 255 characters"))]
    pub location: Option<String>,
    #[validate(length(max = 100, message = "contact_info must be at most 100 characters"))]
    pub contact_info: Option<String>,
    #[ts(type = "string | null")]
    pub lost_date: Option<NaiveDate>,
    #[serde(default)]
    #[validate(
        length(max = 9, message = "at most 9 photos per item"),
        custom(function = "validate_photo_urls")
    )]
    pub photos: Vec<String>,
}

/// UpdateItemRequest
///
/// Partial update payload (PUT /api/items/{id}). When `photos` is present the whole
/// photo set is replaced. Status is not client-writable here.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct UpdateItemRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 100, message = "title must be 1-100 characters"))]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1000, message = "description must be at most 1000 characters"))]
    pub description: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ItemKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 255, message = "location must be at most 255 characters"))]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 100, message = "contact_info must be at most 100 characters"))]
    pub contact_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub lost_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(
        length(max = 9, message = "at most 9 photos per item"),
        custom(function = "validate_photo_urls")
    )]
    pub photos: Option<Vec<String>>,
}

impl UpdateItemRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.kind.is_none()
            && self.location.is_none()
            && self.contact_info.is_none()
            && self.lost_date.is_none()
            && self.photos.is_none()
    }
}

/// ItemStatusRequest
///
/// Moderation decision (PUT /api/admin/items/{id}/status).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct ItemStatusRequest {
    pub status: ItemStatus,
    #[serde(default, alias = "rejectionReason")]
    #[validate(length(min = 1, max = 255, message = "rejection reason must be 1-255 characters"))]
    pub rejection_reason: Option<String>,
}

/// CreateMessageRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateMessageRequest {
    #[validate(
        length(min = 1, max = 1000, message = "content must be 1-1000 characters"),
        custom(function = "validate_not_blank")
    )]
    pub content: String,
    pub parent_id: Option<i64>,
}

/// CreateAnnouncementRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateAnnouncementRequest {
    #[validate(length(min = 1, max = 100, message = "title must be 1-100 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 5000, message = "content must be 1-5000 characters"))]
    pub content: String,
    #[serde(default)]
    pub priority: AnnouncementPriority,
    // Defaults to the publishing administrator's username.
    #[validate(length(min = 1, max = 50, message = "author must be 1-50 characters"))]
    pub author: Option<String>,
}

/// UpdateAnnouncementRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct UpdateAnnouncementRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 100, message = "title must be 1-100 characters"))]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 5000, message = "content must be 1-5000 characters"))]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<AnnouncementPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 50, message = "author must be 1-50 characters"))]
    pub author: Option<String>,
}

impl UpdateAnnouncementRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.priority.is_none() && self.author.is_none()
    }
}

/// RoleChangeRequest
///
/// `role` is free text on purpose: it passes through the legacy mapping in
/// `Role::from_str`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct RoleChangeRequest {
    #[validate(length(min = 1, max = 32, message = "role must not be empty"))]
    pub role: String,
}

// --- Query Parameters ---

/// ItemFilter
///
/// Query parameters for GET /api/items.
#[derive(Debug, Clone, Deserialize, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ItemFilter {
    /// 1-based page number.
    pub page: Option<i64>,
    /// Page size, capped at 100.
    pub limit: Option<i64>,
    /// Case-insensitive match against title and description.
    pub search: Option<String>,
}

/// PageFilter
///
/// Plain pagination parameters. `pageSize` is accepted as an alias of `limit`.
#[derive(Debug, Clone, Deserialize, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageFilter {
    pub page: Option<i64>,
    #[serde(alias = "pageSize")]
    pub limit: Option<i64>,
}

/// PageRequest
///
/// Normalized pagination window: page ≥ 1, 1 ≤ limit ≤ `MAX_PAGE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

pub const MAX_PAGE_SIZE: i64 = 100;

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> Self {
        let page = page.filter(|p| *p >= 1).unwrap_or(1);
        let limit = limit
            .filter(|l| *l >= 1)
            .unwrap_or(default_limit)
            .min(MAX_PAGE_SIZE);
        Self { page, limit }
    }

    /// Rows to skip. Saturates, so an absurd page number reads past the end
    /// and yields an empty page.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

// --- Output Schemas ---

/// Pagination
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(request: PageRequest, total: i64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + request.limit - 1) / request.limit
        };
        Self {
            page: request.page,
            limit: request.limit,
            total,
            total_pages,
        }
    }
}

/// ItemPage
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ItemPage {
    pub items: Vec<Item>,
    pub pagination: Pagination,
}

/// MessagePage
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub total: i64,
}

/// UserPage
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: i64,
}

/// PhotoPage
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PhotoPage {
    pub photos: Vec<Photo>,
    pub pagination: Pagination,
}

/// LoginResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

/// RegisteredUser
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisteredUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

/// UploadResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UploadResponse {
    pub url: String,
    pub filename: String,
    pub original_name: String,
    pub size: usize,
}

/// LikeState
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LikeState {
    pub liked: bool,
    pub like_count: i64,
}

/// CreatedId
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreatedId {
    pub id: i64,
}

/// UserStats
///
/// Per-user activity counters (GET /api/users/stats).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct UserStats {
    pub posts: i64,
    pub messages: i64,
}

/// HealthStatus
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct HealthStatus {
    pub status: String,
    pub database: String,
}

/// AdminDashboardStats
///
/// Output schema for the administrative dashboard (GET /api/admin/stats).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AdminDashboardStats {
    pub item_count: i64,
    pub user_count: i64,
    pub pending_count: i64,
    pub approved_count: i64,
    pub rejected_count: i64,
    pub message_count: i64,
}

// --- Field Validators ---

fn trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().to_string())
}

/// Mainland mobile numbers: 11 digits, leading `1`, second digit 3-9.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let bytes = phone.as_bytes();
    let well_formed = bytes.len() == 11
        && bytes[0] == b'1'
        && (b'3'..=b'9').contains(&bytes[1])
        && bytes.iter().all(u8::is_ascii_digit);
    if well_formed {
        Ok(())
    } else {
        Err(ValidationError::new("phone").with_message("phone must be a valid mobile number".into()))
    }
}

fn validate_photo_urls(urls: &[String]) -> Result<(), ValidationError> {
    let bad = urls
        .iter()
        .any(|url| url.trim().is_empty() || url.len() > 512 || url.contains(".."));
    if bad {
        Err(ValidationError::new("photos").with_message("photo URLs must be non-empty paths".into()))
    } else {
        Ok(())
    }
}

fn validate_not_blank(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        Err(ValidationError::new("blank").with_message("must not be blank".into()))
    } else {
        Ok(())
    }
}
