//! HTTP, WebSocket and dashboard back-end.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (build_router, start_server)         │
//! │ (mobile, │ <─────── │    ├─ api.rs        (AppState, ApiError, routes)  │
//! │ browser) │ WebSocket│    ├─ auth.rs       (signup/login, CurrentUser)   │
//! └──────────┘          │    ├─ social.rs     (friends, groups, messages)   │
//!                       │    ├─ dashboard.rs  (/app pages, cookie session)  │
//!                       │    └─ ws.rs         (ConnectionManager, rooms)    │
//!                       │         │                                        │
//!                       │         │ AutoPlanner::spawn() per chat message  │
//!                       │         v                                        │
//!                       │  crate::planner  (intent → match → card → post)  │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module     | Responsibility                                           |
//! |------------|----------------------------------------------------------|
//! | `db`       | SQLite access via `DbHandle` (thin `Arc<Mutex<_>>`)      |
//! | `embedded` | Templates and static assets compiled into the binary     |

pub mod api;
pub mod auth;
pub mod dashboard;
pub mod db;
pub mod embedded;
pub mod server;
pub mod social;
pub mod ws;

pub use server::{build_router, open_database, start_server};
