//! Server-rendered dashboard under `/app`.
//!
//! Pages are handlebars templates embedded in the binary. The browser keeps
//! its identity in two cookies (`saved_username`, `saved_usercode`); every
//! page without them redirects to the login form. Form posts go through the
//! same database operations as the JSON API, then redirect back, carrying any
//! error in a one-shot `flash` cookie.

use anyhow::Context;
use axum::{
    Form, Router,
    extract::{FromRequestParts, Path, Query, State},
    http::request::Parts,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use handlebars::Handlebars;
use serde::Deserialize;
use tracing::{error, info};

use hikebot_common::{AuthUser, GroupMessage, MemberRole, MessageRole, TripCard};

use super::api::{ApiError, SharedState};
use super::auth;
use super::db::FriendRequestOutcome;
use super::embedded::Templates;
use super::social::{
    deliver_user_message, invite_and_announce, join_and_announce, leave_and_announce, recommend_for_member,
};

pub const USERNAME_COOKIE: &str = "saved_username";
pub const USERCODE_COOKIE: &str = "saved_usercode";
const FLASH_COOKIE: &str = "flash";
const SESSION_DAYS: i64 = 30;
const LOGIN_PATH: &str = "/app/login";
const HOME_PATH: &str = "/app";
const TRAIL_PAGE_SIZE: i64 = 20;

/// Compile every embedded template. A template named `card.hbs` is
/// available to the others as the partial `{{> card}}`.
pub fn load_templates() -> anyhow::Result<Handlebars<'static>> {
    let mut hb = Handlebars::new();
    for file in Templates::iter() {
        let Some(content) = Templates::get(&file) else {
            continue;
        };
        let source = std::str::from_utf8(&content.data)
            .with_context(|| format!("Template {} is not UTF-8", file))?;
        let name = file.trim_end_matches(".hbs");
        hb.register_template_string(name, source)
            .with_context(|| format!("Failed to compile template {}", file))?;
    }
    Ok(hb)
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/app", get(home_page))
        .route("/app/login", get(login_page).post(login_form))
        .route("/app/signup", post(signup_form))
        .route("/app/logout", get(logout))
        .route("/app/friends/add", post(add_friend_form))
        .route("/app/friends/accept", post(accept_friend_form))
        .route("/app/friends/remove", post(remove_friend_form))
        .route("/app/friends/dm", post(open_dm_form))
        .route("/app/groups", post(create_group_form))
        .route("/app/groups/join", post(join_group_form))
        .route("/app/groups/{id}", get(group_page))
        .route("/app/groups/{id}/messages", post(post_message_form))
        .route("/app/groups/{id}/leave", post(leave_group_form))
        .route("/app/groups/{id}/invite", post(invite_form))
        .route("/app/groups/{id}/kick", post(kick_form))
        .route("/app/groups/{id}/recommend", post(recommend_form))
        .route("/app/trails", get(trails_page))
        .route("/app/assistant", get(assistant_page).post(assistant_form))
}

// ── Cookies ───────────────────────────────────────────────────────────

fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::days(SESSION_DAYS))
        .build()
}

fn expired(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}

fn sign_in(jar: CookieJar, user: &AuthUser) -> CookieJar {
    jar.add(session_cookie(USERNAME_COOKIE, user.username.clone()))
        .add(session_cookie(USERCODE_COOKIE, user.user_code.clone()))
}

fn redirect_with_flash(jar: CookieJar, to: &str, message: &str) -> Response {
    let flash = Cookie::build((FLASH_COOKIE, message.to_string())).path("/").build();
    (jar.add(flash), Redirect::to(to)).into_response()
}

/// Read and clear the one-shot flash message.
fn take_flash(jar: CookieJar) -> (CookieJar, Option<String>) {
    match jar.get(FLASH_COOKIE).map(|c| c.value().to_string()) {
        Some(message) => (jar.remove(expired(FLASH_COOKIE)), Some(message)),
        None => (jar, None),
    }
}

/// Redirect to `to`, flashing the error if the action failed.
fn after_action<T>(jar: CookieJar, to: &str, result: Result<T, ApiError>) -> Response {
    match result {
        Ok(_) => Redirect::to(to).into_response(),
        Err(e) => redirect_with_flash(jar, to, e.message()),
    }
}

// ── Session extractor ─────────────────────────────────────────────────

/// The signed-in browser user. Missing or stale cookies redirect to the
/// login page.
pub struct SessionUser(pub AuthUser);

impl FromRequestParts<SharedState> for SessionUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let (Some(username), Some(user_code)) = (jar.get(USERNAME_COOKIE), jar.get(USERCODE_COOKIE)) else {
            return Err(Redirect::to(LOGIN_PATH).into_response());
        };
        match auth::resolve_identity(state, username.value(), user_code.value()).await {
            Ok(Some(user)) => Ok(SessionUser(user)),
            Ok(None) => Err(Redirect::to(LOGIN_PATH).into_response()),
            Err(e) => Err(e.into_response()),
        }
    }
}

fn render(state: &SharedState, name: &str, ctx: &serde_json::Value) -> Result<Html<String>, ApiError> {
    state.templates.render(name, ctx).map(Html).map_err(|e| {
        error!(template = name, error = %e, "Template render failed");
        ApiError::Internal("Failed to render page".into())
    })
}

// ── Form payloads ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub user_code: String,
}

#[derive(Deserialize)]
pub struct FriendCodeForm {
    #[serde(default)]
    pub friend_code: String,
}

#[derive(Deserialize)]
pub struct RequestIdForm {
    pub request_id: i64,
}

#[derive(Deserialize)]
pub struct FriendIdForm {
    pub friend_id: i64,
}

#[derive(Deserialize)]
pub struct CreateGroupForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Comma or space separated user codes.
    #[serde(default)]
    pub member_codes: String,
}

#[derive(Deserialize)]
pub struct JoinGroupForm {
    #[serde(default)]
    pub group_id: String,
}

#[derive(Deserialize)]
pub struct MessageForm {
    #[serde(default)]
    pub content: String,
}

#[derive(Deserialize)]
pub struct KickForm {
    pub user_id: i64,
}

#[derive(Deserialize)]
pub struct TrailQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize)]
pub struct AssistantForm {
    #[serde(default)]
    pub message: String,
}

fn split_codes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Login / signup ────────────────────────────────────────────────────

async fn login_page(State(state): State<SharedState>, jar: CookieJar) -> Result<Response, ApiError> {
    if let (Some(name), Some(code)) = (jar.get(USERNAME_COOKIE), jar.get(USERCODE_COOKIE)) {
        if auth::resolve_identity(&state, name.value(), code.value()).await?.is_some() {
            return Ok(Redirect::to(HOME_PATH).into_response());
        }
    }
    let (jar, flash) = take_flash(jar);
    let page = render(&state, "login", &serde_json::json!({ "title": "Sign in", "flash": flash }))?;
    Ok((jar, page).into_response())
}

async fn login_form(State(state): State<SharedState>, jar: CookieJar, Form(form): Form<LoginForm>) -> Response {
    match auth::authenticate(&state, &form.username, &form.password).await {
        Ok(user) => {
            info!(user_id = user.id, "Dashboard login");
            (sign_in(jar, &user), Redirect::to(HOME_PATH)).into_response()
        }
        Err(e) => redirect_with_flash(jar, LOGIN_PATH, e.message()),
    }
}

async fn signup_form(State(state): State<SharedState>, jar: CookieJar, Form(form): Form<SignupForm>) -> Response {
    match auth::register(&state, &form.username, &form.password, &form.user_code).await {
        Ok(user) => (sign_in(jar, &user), Redirect::to(HOME_PATH)).into_response(),
        Err(e) => redirect_with_flash(jar, LOGIN_PATH, e.message()),
    }
}

async fn logout(jar: CookieJar) -> impl IntoResponse {
    let jar = jar.remove(expired(USERNAME_COOKIE)).remove(expired(USERCODE_COOKIE));
    (jar, Redirect::to(LOGIN_PATH))
}

// ── Home ──────────────────────────────────────────────────────────────

async fn home_page(
    State(state): State<SharedState>,
    SessionUser(me): SessionUser,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let user_id = me.id;
    let (groups, friends, requests) = state
        .db
        .call(move |db| {
            let groups: Vec<_> = db
                .list_groups(user_id)?
                .into_iter()
                .filter(|g| !g.looks_like_dm())
                .collect();
            Ok((groups, db.list_friends(user_id)?, db.list_friend_requests(user_id)?))
        })
        .await?;

    let (jar, flash) = take_flash(jar);
    let page = render(
        &state,
        "dashboard",
        &serde_json::json!({
            "title": "Dashboard",
            "me": me,
            "flash": flash,
            "groups": groups,
            "friends": friends,
            "requests": requests,
        }),
    )?;
    Ok((jar, page).into_response())
}

// ── Friends ───────────────────────────────────────────────────────────

async fn add_friend_form(
    State(state): State<SharedState>,
    SessionUser(me): SessionUser,
    jar: CookieJar,
    Form(form): Form<FriendCodeForm>,
) -> Response {
    let result: Result<_, ApiError> = state
        .db
        .call(move |db| db.send_friend_request(me.id, &form.friend_code))
        .await
        .map_err(Into::into);
    match result {
        Ok(FriendRequestOutcome::Sent { username }) => {
            redirect_with_flash(jar, HOME_PATH, &format!("Friend request sent to {}", username))
        }
        Ok(FriendRequestOutcome::Exists) => {
            redirect_with_flash(jar, HOME_PATH, "A friend request already exists")
        }
        Err(e) => redirect_with_flash(jar, HOME_PATH, e.message()),
    }
}

async fn accept_friend_form(
    State(state): State<SharedState>,
    SessionUser(me): SessionUser,
    jar: CookieJar,
    Form(form): Form<RequestIdForm>,
) -> Response {
    let result = state
        .db
        .call(move |db| db.accept_friend_request(me.id, form.request_id))
        .await
        .map_err(ApiError::from);
    after_action(jar, HOME_PATH, result)
}

async fn remove_friend_form(
    State(state): State<SharedState>,
    SessionUser(me): SessionUser,
    jar: CookieJar,
    Form(form): Form<FriendIdForm>,
) -> Response {
    let result = state
        .db
        .call(move |db| db.remove_friend(me.id, form.friend_id))
        .await
        .map_err(ApiError::from);
    after_action(jar, HOME_PATH, result)
}

async fn open_dm_form(
    State(state): State<SharedState>,
    SessionUser(me): SessionUser,
    jar: CookieJar,
    Form(form): Form<FriendIdForm>,
) -> Response {
    match state
        .db
        .call(move |db| db.get_or_create_dm(&me, form.friend_id))
        .await
    {
        Ok((group_id, _)) => Redirect::to(&format!("/app/groups/{}", group_id)).into_response(),
        Err(e) => redirect_with_flash(jar, HOME_PATH, ApiError::from(e).message()),
    }
}

// ── Groups ────────────────────────────────────────────────────────────

async fn create_group_form(
    State(state): State<SharedState>,
    SessionUser(me): SessionUser,
    jar: CookieJar,
    Form(form): Form<CreateGroupForm>,
) -> Response {
    let codes = split_codes(&form.member_codes);
    let description = Some(form.description.trim().to_string()).filter(|d| !d.is_empty());
    match state
        .db
        .call(move |db| db.create_group(me.id, &form.name, description.as_deref(), &codes))
        .await
    {
        Ok(group_id) => Redirect::to(&format!("/app/groups/{}", group_id)).into_response(),
        Err(e) => redirect_with_flash(jar, HOME_PATH, ApiError::from(e).message()),
    }
}

async fn join_group_form(
    State(state): State<SharedState>,
    SessionUser(me): SessionUser,
    jar: CookieJar,
    Form(form): Form<JoinGroupForm>,
) -> Response {
    let group_id = form.group_id.trim().to_string();
    match join_and_announce(&state, group_id.clone(), &me).await {
        Ok(()) => Redirect::to(&format!("/app/groups/{}", group_id)).into_response(),
        Err(e) => redirect_with_flash(jar, HOME_PATH, e.message()),
    }
}

fn message_view(message: &GroupMessage, me: &AuthUser) -> serde_json::Value {
    let card = match message.role {
        MessageRole::Assistant => TripCard::from_message_content(&message.content),
        MessageRole::User => None,
    };
    serde_json::json!({
        "sender": message.sender,
        "content": message.content,
        "created_at": message.created_at,
        "is_bot": message.role == MessageRole::Assistant,
        "mine": message.role == MessageRole::User && message.sender == me.username,
        "card": card,
    })
}

async fn group_page(
    State(state): State<SharedState>,
    SessionUser(me): SessionUser,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let user_id = me.id;
    let loaded = state
        .db
        .call(move |db| {
            let group = db.require_member(&id, user_id)?;
            let members = db.list_members(&id, user_id)?;
            let messages = db.list_messages(&id, user_id)?;
            Ok((group, members, messages))
        })
        .await;
    let (group, members, messages) = match loaded {
        Ok(data) => data,
        Err(e) => return Ok(redirect_with_flash(jar, HOME_PATH, ApiError::from(e).message())),
    };

    let is_admin = members
        .iter()
        .any(|m| m.user_id == me.id && m.role == MemberRole::Admin);
    let messages: Vec<_> = messages.iter().map(|m| message_view(m, &me)).collect();

    let (jar, flash) = take_flash(jar);
    let page = render(
        &state,
        "group",
        &serde_json::json!({
            "title": group.name,
            "me": me,
            "flash": flash,
            "group": group,
            "is_dm": group.is_dm(),
            "is_admin": is_admin,
            "members": members,
            "messages": messages,
        }),
    )?;
    Ok((jar, page).into_response())
}

fn group_path(id: &str) -> String {
    format!("/app/groups/{}", id)
}

async fn post_message_form(
    State(state): State<SharedState>,
    SessionUser(me): SessionUser,
    jar: CookieJar,
    Path(id): Path<String>,
    Form(form): Form<MessageForm>,
) -> Response {
    let to = group_path(&id);
    let result = deliver_user_message(&state, id, me, form.content).await;
    after_action(jar, &to, result)
}

async fn leave_group_form(
    State(state): State<SharedState>,
    SessionUser(me): SessionUser,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    let to = group_path(&id);
    match leave_and_announce(&state, id, &me).await {
        Ok(_) => Redirect::to(HOME_PATH).into_response(),
        Err(e) => redirect_with_flash(jar, &to, e.message()),
    }
}

async fn invite_form(
    State(state): State<SharedState>,
    SessionUser(me): SessionUser,
    jar: CookieJar,
    Path(id): Path<String>,
    Form(form): Form<FriendCodeForm>,
) -> Response {
    let to = group_path(&id);
    match invite_and_announce(&state, id, &me, form.friend_code).await {
        Ok(user) => redirect_with_flash(jar, &to, &format!("{} was added", user.username)),
        Err(e) => redirect_with_flash(jar, &to, e.message()),
    }
}

async fn kick_form(
    State(state): State<SharedState>,
    SessionUser(me): SessionUser,
    jar: CookieJar,
    Path(id): Path<String>,
    Form(form): Form<KickForm>,
) -> Response {
    let to = group_path(&id);
    let result = state
        .db
        .call(move |db| db.kick_member(&id, me.id, form.user_id))
        .await
        .map_err(ApiError::from);
    after_action(jar, &to, result)
}

async fn recommend_form(
    State(state): State<SharedState>,
    SessionUser(me): SessionUser,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    let to = group_path(&id);
    let result = recommend_for_member(&state, id, &me).await;
    after_action(jar, &to, result)
}

// ── Trails and assistant ──────────────────────────────────────────────

async fn trails_page(
    State(state): State<SharedState>,
    SessionUser(me): SessionUser,
    Query(query): Query<TrailQuery>,
) -> Result<Html<String>, ApiError> {
    let q = query.q.trim().to_string();
    let search = q.clone();
    let trails = state
        .db
        .call(move |db| {
            if search.is_empty() {
                db.list_trails(TRAIL_PAGE_SIZE)
            } else {
                db.search_trails(&search)
            }
        })
        .await?;
    render(
        &state,
        "trails",
        &serde_json::json!({
            "title": "Trails",
            "me": me,
            "q": q,
            "searched": !q.is_empty(),
            "trails": trails,
        }),
    )
}

async fn assistant_page(
    State(state): State<SharedState>,
    SessionUser(me): SessionUser,
) -> Result<Html<String>, ApiError> {
    render(&state, "assistant", &serde_json::json!({ "title": "Trail assistant", "me": me }))
}

async fn assistant_form(
    State(state): State<SharedState>,
    SessionUser(me): SessionUser,
    Form(form): Form<AssistantForm>,
) -> Result<Html<String>, ApiError> {
    let message = form.message.trim().to_string();
    let reply = if message.is_empty() {
        None
    } else {
        Some(state.planner.assistant_reply(&message).await)
    };
    let card = reply.as_deref().and_then(TripCard::from_message_content);
    render(
        &state,
        "assistant",
        &serde_json::json!({
            "title": "Trail assistant",
            "me": me,
            "message": message,
            "reply": if card.is_some() { None } else { reply },
            "card": card,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::testing::{create_user, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app() -> (Router, SharedState) {
        let state = test_state();
        (router().with_state(state.clone()), state)
    }

    fn session_header(user: &AuthUser) -> String {
        format!(
            "{}={}; {}={}",
            USERNAME_COOKIE, user.username, USERCODE_COOKIE, user.user_code
        )
    }

    fn form_post(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn page(uri: &str, cookie: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    fn location(response: &Response) -> &str {
        response.headers().get(header::LOCATION).unwrap().to_str().unwrap()
    }

    #[test]
    fn test_split_codes() {
        assert_eq!(split_codes("AB12, CD34 EF56,,"), vec!["AB12", "CD34", "EF56"]);
        assert!(split_codes("  ").is_empty());
    }

    #[tokio::test]
    async fn test_pages_redirect_without_session() {
        let (app, _) = test_app();
        for uri in ["/app", "/app/trails", "/app/assistant", "/app/groups/abc"] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{}", uri);
            assert_eq!(location(&response), LOGIN_PATH);
        }

        let response = app
            .oneshot(page("/app", "saved_username=ghost; saved_usercode=NOPE"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn test_signup_sets_session_cookies() {
        let (app, _) = test_app();
        let response = app
            .oneshot(form_post(
                "/app/signup",
                None,
                "username=frank&password=pw&user_code=FRNK",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), HOME_PATH);
        let cookies = set_cookies(&response);
        assert!(cookies.iter().any(|c| c.starts_with("saved_username=frank")));
        assert!(cookies.iter().any(|c| c.starts_with("saved_usercode=FRNK")));
        assert!(cookies.iter().all(|c| c.contains("Max-Age=2592000")));
    }

    #[tokio::test]
    async fn test_failed_login_flashes_error() {
        let (app, _) = test_app();
        let response = app
            .clone()
            .oneshot(form_post("/app/login", None, "username=nobody&password=x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), LOGIN_PATH);
        let flash = set_cookies(&response)
            .into_iter()
            .find(|c| c.starts_with("flash="))
            .unwrap();

        let cookie = flash.split(';').next().unwrap().to_string();
        let response = app.oneshot(page(LOGIN_PATH, &cookie)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Invalid username or password"));
    }

    #[tokio::test]
    async fn test_logout_clears_cookies() {
        let (app, _) = test_app();
        // Removal cookies are only emitted for cookies the browser sent.
        let response = app
            .oneshot(page("/app/logout", "saved_username=alice; saved_usercode=ALC1"))
            .await
            .unwrap();
        assert_eq!(location(&response), LOGIN_PATH);
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    }

    #[tokio::test]
    async fn test_invite_form_announces_new_member() {
        let (app, state) = test_app();
        let alice = create_user(&state, "alice", "ALC1").await;
        create_user(&state, "bob", "BOB1").await;
        let alice_id = alice.id;
        let group_id = state
            .db
            .call(move |db| db.create_group(alice_id, "Sunrise Crew", None, &[]))
            .await
            .unwrap();
        let (_, mut room) = state.rooms.connect(&group_id, alice.id);

        let uri = format!("/app/groups/{}/invite", group_id);
        let response = app
            .oneshot(form_post(&uri, Some(&session_header(&alice)), "friend_code=BOB1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let pushed = room.recv().await.unwrap();
        assert!(pushed.contains("\"type\":\"MemberJoined\""));
        assert!(pushed.contains("\"username\":\"bob\""));
    }

    #[tokio::test]
    async fn test_dashboard_hides_dm_groups() {
        let (app, state) = test_app();
        let alice = create_user(&state, "alice", "ALC1").await;
        let bob = create_user(&state, "bob", "BOB1").await;
        let (a, b) = (alice.clone(), bob.id);
        state
            .db
            .call(move |db| {
                db.create_group(a.id, "Sunrise Crew", None, &[])?;
                db.get_or_create_dm(&a, b)?;
                Ok(())
            })
            .await
            .unwrap();

        let response = app.oneshot(page("/app", &session_header(&alice))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Sunrise Crew"));
        assert!(!html.contains("DM: alice"));
        assert!(html.contains("ALC1"));
    }

    #[tokio::test]
    async fn test_group_page_renders_cards_and_bubbles() {
        let (app, state) = test_app();
        let alice = create_user(&state, "alice", "ALC1").await;
        let a = alice.clone();
        let group_id = state
            .db
            .call(move |db| {
                let id = db.create_group(a.id, "Peaks", None, &[])?;
                db.post_user_message(&id, &a, "who is in for saturday?")?;
                Ok(id)
            })
            .await
            .unwrap();
        state.planner.recommend_routes(&group_id).await.unwrap();

        let response = app
            .oneshot(page(&format!("/app/groups/{}", group_id), &session_header(&alice)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("who is in for saturday?"));
        assert!(html.contains("Recommended Routes"));
        assert!(html.contains("Mailbox Peak"));
        assert!(html.contains(&format!("data-group=\"{}\"", group_id)));
    }

    #[tokio::test]
    async fn test_non_member_group_page_redirects_home() {
        let (app, state) = test_app();
        let alice = create_user(&state, "alice", "ALC1").await;
        let bob = create_user(&state, "bob", "BOB1").await;
        let a = alice.id;
        let group_id = state
            .db
            .call(move |db| db.create_group(a, "Private", None, &[]))
            .await
            .unwrap();

        let response = app
            .oneshot(page(&format!("/app/groups/{}", group_id), &session_header(&bob)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), HOME_PATH);
    }

    #[tokio::test]
    async fn test_create_group_form_redirects_to_group() {
        let (app, state) = test_app();
        let alice = create_user(&state, "alice", "ALC1").await;
        create_user(&state, "bob", "BOB1").await;
        let cookie = session_header(&alice);

        let response = app
            .oneshot(form_post(
                "/app/groups",
                Some(&cookie),
                "name=Ridge+Runners&description=&member_codes=BOB1%2C+NOPE",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let to = location(&response).to_string();
        let group_id = to.trim_start_matches("/app/groups/").to_string();

        let members = state
            .db
            .call(move |db| db.list_members(&group_id, alice.id))
            .await
            .unwrap();
        assert_eq!(members.len(), 2);
    }

    #[tokio::test]
    async fn test_trail_search_page() {
        let (app, state) = test_app();
        let alice = create_user(&state, "alice", "ALC1").await;
        state
            .db
            .call(|db| {
                db.replace_trails(
                    "trails",
                    &[crate::server::db::NewTrail {
                        name: "Bronson Canyon".into(),
                        length_km: 1.2,
                        ..Default::default()
                    }],
                )
            })
            .await
            .unwrap();

        let response = app
            .oneshot(page("/app/trails?q=bronson", &session_header(&alice)))
            .await
            .unwrap();
        let html = body_text(response).await;
        assert!(html.contains("Bronson Canyon"));
        assert!(html.contains("1.2"));
    }

    #[tokio::test]
    async fn test_assistant_form_shows_reply() {
        let (app, state) = test_app();
        let alice = create_user(&state, "alice", "ALC1").await;
        let cookie = session_header(&alice);
        let response = app
            .oneshot(form_post("/app/assistant", Some(&cookie), "message=what+should+I+pack"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("offline"));
    }
}
