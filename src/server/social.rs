use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tracing::{debug, info};

use hikebot_common::{AuthUser, GroupMessage};

use super::api::{ApiError, SharedState};
use super::auth::CurrentUser;
use super::db::FriendRequestOutcome;
use super::ws::WsMessage;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct FriendCodeRequest {
    pub friend_code: String,
}

#[derive(Deserialize)]
pub struct RequestIdRequest {
    pub request_id: i64,
}

#[derive(Deserialize)]
pub struct FriendIdRequest {
    pub friend_id: i64,
}

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub member_codes: Vec<String>,
}

#[derive(Deserialize)]
pub struct KickRequest {
    pub user_id: i64,
}

#[derive(Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/social/friends", get(list_friends))
        .route("/social/friends/add", post(add_friend))
        .route("/social/friends/requests", get(list_requests))
        .route("/social/friends/accept", post(accept_request))
        .route("/social/friends/remove", post(remove_friend))
        .route("/social/friends/dm", post(open_dm))
        .route("/social/groups", get(list_groups).post(create_group))
        .route("/social/groups/{id}/members", get(list_members))
        .route("/social/groups/{id}/join", post(join_group))
        .route("/social/groups/{id}/leave", post(leave_group))
        .route("/social/groups/{id}/invite", post(invite_member))
        .route("/social/groups/{id}/kick", post(kick_member))
        .route(
            "/social/groups/{id}/messages",
            get(list_messages).post(post_message),
        )
        .route("/social/groups/{id}/ai/recommend_routes", post(recommend_routes))
}

// ── Shared group operations ───────────────────────────────────────────
// Used by the JSON API, the room socket and the dashboard forms.

/// Store a chat message, push it to the room and hand it to the planner.
pub(crate) async fn deliver_user_message(
    state: &SharedState,
    group_id: String,
    user: AuthUser,
    content: String,
) -> Result<GroupMessage, ApiError> {
    let gid = group_id.clone();
    let text = content.clone();
    let message = state
        .db
        .call(move |db| db.post_user_message(&gid, &user, &text))
        .await?;

    let reached = state.rooms.broadcast_json(
        &group_id,
        &WsMessage::NewMessage {
            message: message.clone(),
        },
    );
    debug!(group_id = %group_id, message_id = message.id, reached, "Message delivered");

    state.planner.spawn(group_id, content);
    Ok(message)
}

pub(crate) async fn join_and_announce(
    state: &SharedState,
    group_id: String,
    user: &AuthUser,
) -> Result<(), ApiError> {
    let gid = group_id.clone();
    let user_id = user.id;
    state.db.call(move |db| db.join_group(&gid, user_id)).await?;
    state.rooms.broadcast_json(
        &group_id,
        &WsMessage::MemberJoined {
            group_id: group_id.clone(),
            username: user.username.clone(),
        },
    );
    info!(group_id = %group_id, user_id, "Joined group");
    Ok(())
}

/// Add a user by code on behalf of a member and announce them to the room.
pub(crate) async fn invite_and_announce(
    state: &SharedState,
    group_id: String,
    inviter: &AuthUser,
    friend_code: String,
) -> Result<AuthUser, ApiError> {
    let gid = group_id.clone();
    let inviter_id = inviter.id;
    let invited = state
        .db
        .call(move |db| db.invite_member(&gid, inviter_id, &friend_code))
        .await?;
    state.rooms.broadcast_json(
        &group_id,
        &WsMessage::MemberJoined {
            group_id: group_id.clone(),
            username: invited.username.clone(),
        },
    );
    info!(group_id = %group_id, user_id = invited.id, "Member invited");
    Ok(invited)
}

/// Returns `true` when the group was deleted.
pub(crate) async fn leave_and_announce(
    state: &SharedState,
    group_id: String,
    user: &AuthUser,
) -> Result<bool, ApiError> {
    let gid = group_id.clone();
    let user_id = user.id;
    let deleted = state.db.call(move |db| db.leave_group(&gid, user_id)).await?;
    if !deleted {
        state.rooms.broadcast_json(
            &group_id,
            &WsMessage::MemberLeft {
                group_id: group_id.clone(),
                username: user.username.clone(),
            },
        );
    }
    info!(group_id = %group_id, user_id, deleted, "Left group");
    Ok(deleted)
}

/// Post a route recommendation card on behalf of a member.
pub(crate) async fn recommend_for_member(
    state: &SharedState,
    group_id: String,
    user: &AuthUser,
) -> Result<GroupMessage, ApiError> {
    let gid = group_id.clone();
    let user_id = user.id;
    state.db.call(move |db| db.require_member(&gid, user_id)).await?;
    Ok(state.planner.recommend_routes(&group_id).await?)
}

// ── Friends ───────────────────────────────────────────────────────────

async fn list_friends(
    State(state): State<SharedState>,
    CurrentUser(me): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let friends = state.db.call(move |db| db.list_friends(me.id)).await?;
    Ok(Json(serde_json::json!({ "friends": friends })))
}

async fn add_friend(
    State(state): State<SharedState>,
    CurrentUser(me): CurrentUser,
    Json(req): Json<FriendCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .db
        .call(move |db| db.send_friend_request(me.id, &req.friend_code))
        .await?;
    let body = match outcome {
        FriendRequestOutcome::Exists => serde_json::json!({"message": "Exists"}),
        FriendRequestOutcome::Sent { username } => {
            serde_json::json!({"message": "Sent", "username": username})
        }
    };
    Ok(Json(body))
}

async fn list_requests(
    State(state): State<SharedState>,
    CurrentUser(me): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let requests = state.db.call(move |db| db.list_friend_requests(me.id)).await?;
    Ok(Json(serde_json::json!({"requests": requests})))
}

async fn accept_request(
    State(state): State<SharedState>,
    CurrentUser(me): CurrentUser,
    Json(req): Json<RequestIdRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .call(move |db| db.accept_friend_request(me.id, req.request_id))
        .await?;
    Ok(Json(serde_json::json!({"message": "Accepted"})))
}

async fn remove_friend(
    State(state): State<SharedState>,
    CurrentUser(me): CurrentUser,
    Json(req): Json<FriendIdRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .call(move |db| db.remove_friend(me.id, req.friend_id))
        .await?;
    Ok(Json(serde_json::json!({"message": "Removed"})))
}

async fn open_dm(
    State(state): State<SharedState>,
    CurrentUser(me): CurrentUser,
    Json(req): Json<FriendIdRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (group_id, new) = state
        .db
        .call(move |db| db.get_or_create_dm(&me, req.friend_id))
        .await?;
    Ok(Json(serde_json::json!({"group_id": group_id, "new": new})))
}

// ── Groups ────────────────────────────────────────────────────────────

async fn list_groups(
    State(state): State<SharedState>,
    CurrentUser(me): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let groups = state.db.call(move |db| db.list_groups(me.id)).await?;
    Ok(Json(serde_json::json!({"groups": groups})))
}

async fn create_group(
    State(state): State<SharedState>,
    CurrentUser(me): CurrentUser,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let group_id = state
        .db
        .call(move |db| {
            db.create_group(me.id, &req.name, req.description.as_deref(), &req.member_codes)
        })
        .await?;
    info!(group_id = %group_id, "Group created");
    Ok(Json(serde_json::json!({"message": "Created", "group_id": group_id})))
}

async fn list_members(
    State(state): State<SharedState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let members = state.db.call(move |db| db.list_members(&id, me.id)).await?;
    Ok(Json(serde_json::json!({ "members": members })))
}

async fn join_group(
    State(state): State<SharedState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    join_and_announce(&state, id, &me).await?;
    Ok(Json(serde_json::json!({"message": "Joined"})))
}

async fn leave_group(
    State(state): State<SharedState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = leave_and_announce(&state, id, &me).await?;
    Ok(Json(serde_json::json!({"message": "Left", "group_deleted": deleted})))
}

async fn invite_member(
    State(state): State<SharedState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<FriendCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invited = invite_and_announce(&state, id, &me, req.friend_code).await?;
    Ok(Json(serde_json::json!({"message": "Invited", "username": invited.username})))
}

async fn kick_member(
    State(state): State<SharedState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<KickRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .call(move |db| db.kick_member(&id, me.id, req.user_id))
        .await?;
    Ok(Json(serde_json::json!({"message": "Kicked"})))
}

// ── Messages ──────────────────────────────────────────────────────────

async fn list_messages(
    State(state): State<SharedState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state.db.call(move |db| db.list_messages(&id, me.id)).await?;
    Ok(Json(serde_json::json!({ "messages": messages })))
}

async fn post_message(
    State(state): State<SharedState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = deliver_user_message(&state, id, me, req.content).await?;
    Ok(Json(message))
}

async fn recommend_routes(
    State(state): State<SharedState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let message = recommend_for_member(&state, id, &me).await?;
    Ok(Json(message))
}
