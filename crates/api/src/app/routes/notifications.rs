use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;

use miam_auth::permissions::notifications;
use miam_notifications::{InboxCommand, MarkAllRead, MarkRead, Notification};

use crate::app::dto::{self, AppQuery};
use crate::app::errors::ApiResult;
use crate::app::routes::common::{CmdAuth, parse_id};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_notifications))
        .route("/unread-count", get(unread_count))
        .route("/read-all", post(mark_all_read))
        .route("/:id/read", post(mark_read))
}

/// Newest first.
pub async fn list_notifications(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    AppQuery(query): AppQuery<dto::NotificationQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    require(&principal, &notifications::READ)?;
    let inbox = services.load_inbox(principal.user_id()).await?;
    let mut items: Vec<_> = inbox
        .notifications()
        .iter()
        .filter(|n| !query.unread || !n.is_read())
        .cloned()
        .collect();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(items))
}

pub async fn unread_count(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
) -> ApiResult<impl IntoResponse> {
    require(&principal, &notifications::READ)?;
    let inbox = services.load_inbox(principal.user_id()).await?;
    Ok(Json(json!({ "unread": inbox.unread_count() })))
}

pub async fn mark_read(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let recipient_id = principal.user_id();
    let cmd = InboxCommand::MarkRead(MarkRead {
        recipient_id,
        notification_id: parse_id(&id)?,
        occurred_at: Utc::now(),
    });
    let cmd = CmdAuth::new(cmd, [notifications::READ]).authorize(&principal)?;
    services.inbox(recipient_id, cmd).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
) -> ApiResult<StatusCode> {
    let recipient_id = principal.user_id();
    let cmd = InboxCommand::MarkAllRead(MarkAllRead { recipient_id, occurred_at: Utc::now() });
    let cmd = CmdAuth::new(cmd, [notifications::READ]).authorize(&principal)?;
    services.inbox(recipient_id, cmd).await?;
    Ok(StatusCode::NO_CONTENT)
}
