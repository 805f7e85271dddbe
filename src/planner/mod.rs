//! AutoPlanner: turns trip talk in a group chat into a posted trip card.
//!
//! ```text
//! chat text ─► trigger words ─► intent (LLM, JSON) ─► fuzzy trail match
//!                                                          │
//!        posted + broadcast ◄─ trip card (LLM, JSON) ◄─ trip reports
//! ```
//!
//! Every external failure degrades: a failed intent call means "not
//! planning", a failed report lookup becomes a context note, and a failed
//! card call falls back to [`TripCard::fallback`].

pub mod llm;
pub mod reports;

use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use hikebot_common::{
    BOT_SENDER, GroupMessage, MessageRole, TrailRecord, builtin_catalog, fuzzy,
    trip_card::{RouteLine, TripCard, TripStats},
};

use crate::config::PlannerSettings;
use crate::server::db::DbHandle;
use crate::server::ws::{ConnectionManager, WsMessage};

use llm::{ChatModel, ChatTurn};
use reports::{TripReportSource, check_hazards};

/// Lowercased substrings that make a message worth an intent call.
pub const TRIGGER_WORDS: &[&str] = &[
    "go to", "hike", "trail", "plan", "weekend", "trip", "join", "去", "爬山", "路线",
];

const INTENT_TEMPERATURE: f32 = 0.0;
const CARD_TEMPERATURE: f32 = 0.7;
const RECOMMENDATION_COUNT: usize = 3;

/// Longest text scored against trail names. Longer input is cut.
pub const MAX_MATCH_QUERY_CHARS: usize = 200;

/// No forecast source is wired in yet.
const WEATHER_NOTE: &str = "No live forecast available; check conditions before you go.";

const OFFLINE_REPLY: &str =
    "The trail assistant is offline right now. Please try again in a few minutes.";

const INTENT_SYSTEM_PROMPT: &str = r#"You are a JSON extractor for a hiking group chat. Current Date: {date}.
Decide whether the users are actively proposing a hike on a specific trail.
Respond with ONLY a JSON object, no markdown:
{"is_planning_trip": true, "trail_name_raw": "name as written", "target_date_str": "date or day as written"}
Use false and null when nobody is proposing a trip."#;

const CARD_SYSTEM_PROMPT: &str = r#"You are an expert hiking guide. Generate a JSON trip card.
Trail: {name} | Length: {length}km | Elevation gain: {elev}
Date: {date}
Weather: {weather}
Conditions: {conditions}
Hazards: {hazards}

Respond with ONLY a JSON object, no markdown:
{"title": "Trip Plan: {name}", "summary": "...", "stats": {"dist": "{dist}", "elev": "{elev}"}, "weather_warning": "...", "gear_required": ["Item1", "Item2"], "fun_fact": "..."}"#;

const GUIDE_SYSTEM_PROMPT: &str = "You are HikeBot, a friendly and practical hiking guide. \
Answer briefly. Recommend trails, gear and safety tips, and say so when you are unsure.";

/// What the intent call extracted from a chat message.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Intent {
    #[serde(default)]
    pub is_planning_trip: bool,
    #[serde(default)]
    pub trail_name_raw: Option<String>,
    #[serde(default)]
    pub target_date_str: Option<String>,
}

impl Intent {
    /// The trail name, if the users are planning and named one.
    pub fn trail_name(&self) -> Option<&str> {
        if !self.is_planning_trip {
            return None;
        }
        self.trail_name_raw
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

/// Trip-report context fed into card generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub context: String,
    pub hazards: Vec<String>,
}

/// True when the message contains one of [`TRIGGER_WORDS`].
pub fn is_triggered(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRIGGER_WORDS.iter().any(|w| lower.contains(w))
}

fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}

/// Best match above `threshold` (exclusive) among `trails`.
pub fn best_match<'a>(raw: &str, trails: &'a [TrailRecord], threshold: u8) -> Option<&'a TrailRecord> {
    let (name, score) = fuzzy::extract_one(raw, trails.iter().map(|t| t.name.as_str()))?;
    debug!(query = raw, candidate = name, score, threshold, "Fuzzy trail match");
    if score > threshold {
        trails.iter().find(|t| t.name == name)
    } else {
        None
    }
}

fn match_query(raw: &str) -> String {
    raw.chars().take(MAX_MATCH_QUERY_CHARS).collect()
}

pub struct AutoPlanner {
    db: DbHandle,
    rooms: ConnectionManager,
    llm: Arc<dyn ChatModel>,
    reports: Option<Arc<dyn TripReportSource>>,
    settings: PlannerSettings,
    max_reports: usize,
}

impl AutoPlanner {
    pub fn new(
        db: DbHandle,
        rooms: ConnectionManager,
        llm: Arc<dyn ChatModel>,
        reports: Option<Arc<dyn TripReportSource>>,
        settings: PlannerSettings,
        max_reports: usize,
    ) -> Self {
        Self {
            db,
            rooms,
            llm,
            reports,
            settings,
            max_reports: max_reports.max(1),
        }
    }

    /// Run the pipeline in the background. Failures are logged, never surfaced.
    pub fn spawn(self: &Arc<Self>, group_id: String, user_message: String) {
        let planner = Arc::clone(self);
        tokio::spawn(async move {
            match planner.run_pipeline(&group_id, &user_message).await {
                Ok(Some(msg)) => debug!(group_id = %group_id, message_id = msg.id, "Planner posted card"),
                Ok(None) => {}
                Err(e) => error!(group_id = %group_id, error = %e, "Planner pipeline failed"),
            }
        });
    }

    /// Run the whole pipeline for one chat message. Returns the posted card
    /// message, or `None` when the message did not lead to a plan.
    pub async fn run_pipeline(&self, group_id: &str, user_message: &str) -> Result<Option<GroupMessage>> {
        if !is_triggered(user_message) {
            return Ok(None);
        }

        let intent = self.extract_intent(user_message).await;
        let Some(raw_name) = intent.trail_name() else {
            debug!(group_id, "No trip intent");
            return Ok(None);
        };
        info!(group_id, trail = raw_name, "Trip intent detected");

        let Some(trail) = self
            .match_trail(raw_name, self.settings.catalog_threshold, self.settings.builtin_threshold)
            .await?
        else {
            info!(group_id, trail = raw_name, "No matching trail");
            return Ok(None);
        };
        info!(group_id, trail = %trail.name, "Trail matched");

        let enrichment = self.enrich(&trail.name).await;
        let card = self
            .generate_card(&trail, intent.target_date_str.as_deref(), &enrichment)
            .await;

        let message = self.post_card(group_id, &card).await?;
        info!(group_id, trail = %trail.name, message_id = message.id, "Trip card posted");
        Ok(Some(message))
    }

    /// Ask the model whether the message proposes a trip. Any failure counts
    /// as "not planning".
    pub async fn extract_intent(&self, message: &str) -> Intent {
        let today = Local::now().format("%Y-%m-%d").to_string();
        let system = render(INTENT_SYSTEM_PROMPT, &[("date", today.as_str())]);
        let turns = [ChatTurn::system(system), ChatTurn::user(message)];

        match self.llm.complete_json(&turns, INTENT_TEMPERATURE).await {
            Ok(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!(error = %e, "Intent reply did not match schema");
                Intent::default()
            }),
            Err(e) => {
                warn!(error = %e, "Intent extraction failed");
                Intent::default()
            }
        }
    }

    /// Match against the seeded catalog first, then the built-in trails.
    /// Scoring runs on the blocking pool next to the catalog read.
    pub async fn match_trail(
        &self,
        raw_name: &str,
        catalog_threshold: u8,
        builtin_threshold: u8,
    ) -> Result<Option<TrailRecord>> {
        let query = match_query(raw_name);
        self.db
            .call(move |db| {
                let catalog = db.trail_catalog()?;
                if let Some(trail) = best_match(&query, &catalog, catalog_threshold) {
                    return Ok(Some(trail.clone()));
                }
                let builtin = builtin_catalog();
                Ok(best_match(&query, &builtin, builtin_threshold).cloned())
            })
            .await
    }

    /// Collect recent trip reports and hazards for the trail.
    pub async fn enrich(&self, trail_name: &str) -> Enrichment {
        let Some(source) = &self.reports else {
            return Enrichment {
                context: "WTA data unavailable.".to_string(),
                hazards: Vec::new(),
            };
        };

        let url = match source.find_trail_url(trail_name).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                return Enrichment {
                    context: "Trail not found on WTA.".to_string(),
                    hazards: Vec::new(),
                };
            }
            Err(e) => {
                warn!(trail = trail_name, error = %e, "Trip report lookup failed");
                return Enrichment {
                    context: "WTA data unavailable.".to_string(),
                    hazards: Vec::new(),
                };
            }
        };

        match source.recent_reports(&url).await {
            Ok(reports) if reports.is_empty() => Enrichment {
                context: "No recent trip reports found.".to_string(),
                hazards: Vec::new(),
            },
            Ok(reports) => {
                let hazards = check_hazards(&reports);
                let recent: Vec<&str> = reports
                    .iter()
                    .take(self.max_reports)
                    .map(String::as_str)
                    .collect();
                Enrichment {
                    context: format!("Recent User Reports:\n- {}", recent.join("\n- ")),
                    hazards,
                }
            }
            Err(e) => {
                warn!(trail = trail_name, error = %e, "Trip report fetch failed");
                Enrichment {
                    context: "WTA data unavailable.".to_string(),
                    hazards: Vec::new(),
                }
            }
        }
    }

    /// Ask the model for a trip card, falling back to one built from the
    /// trail data.
    pub async fn generate_card(
        &self,
        trail: &TrailRecord,
        date: Option<&str>,
        enrichment: &Enrichment,
    ) -> TripCard {
        let length = format!("{}", trail.length_km);
        let dist = trail.distance_label();
        let elev = trail.elevation_label();
        let hazards = if enrichment.hazards.is_empty() {
            "none reported".to_string()
        } else {
            enrichment.hazards.join(", ")
        };
        let system = render(
            CARD_SYSTEM_PROMPT,
            &[
                ("name", trail.name.as_str()),
                ("length", length.as_str()),
                ("dist", dist.as_str()),
                ("elev", elev.as_str()),
                ("date", date.unwrap_or("not set")),
                ("weather", WEATHER_NOTE),
                ("conditions", enrichment.context.as_str()),
                ("hazards", hazards.as_str()),
            ],
        );
        let turns = [ChatTurn::system(system), ChatTurn::user("Generate plan")];

        let fallback = || TripCard::fallback(trail, date, &enrichment.hazards);
        match self.llm.complete_json(&turns, CARD_TEMPERATURE).await {
            Ok(value) => TripCard::from_message_content(&value.to_string()).unwrap_or_else(|| {
                warn!(trail = %trail.name, "Card reply lacked title or stats");
                fallback()
            }),
            Err(e) => {
                warn!(trail = %trail.name, error = %e, "Card generation failed");
                fallback()
            }
        }
    }

    /// Store the card as a HikeBot message and broadcast it to the room.
    pub async fn post_card(&self, group_id: &str, card: &TripCard) -> Result<GroupMessage> {
        let gid = group_id.to_string();
        let content = card.to_json();
        let message = self
            .db
            .call(move |db| db.insert_message(&gid, None, BOT_SENDER, MessageRole::Assistant, &content))
            .await?;
        self.rooms.broadcast_json(
            group_id,
            &WsMessage::NewMessage {
                message: message.clone(),
            },
        );
        Ok(message)
    }

    /// Post a card listing up to three catalog trails.
    pub async fn recommend_routes(&self, group_id: &str) -> Result<GroupMessage> {
        let mut trails = self
            .db
            .call(|db| db.longest_trails(RECOMMENDATION_COUNT as i64))
            .await?;
        if trails.is_empty() {
            trails = builtin_catalog();
            trails.truncate(RECOMMENDATION_COUNT);
        }
        let card = recommendation_card(&trails);
        self.post_card(group_id, &card).await
    }

    /// Personal assistant reply. A message naming a known trail gets a trip
    /// card; anything else gets a plain guide answer.
    pub async fn assistant_reply(&self, user_message: &str) -> String {
        let threshold = self.settings.catalog_threshold;
        match self.match_trail(user_message, threshold, threshold).await {
            Ok(Some(trail)) => {
                info!(trail = %trail.name, "Assistant matched trail");
                let enrichment = self.enrich(&trail.name).await;
                return self.generate_card(&trail, None, &enrichment).await.to_json();
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Assistant trail lookup failed"),
        }

        let turns = [ChatTurn::system(GUIDE_SYSTEM_PROMPT), ChatTurn::user(user_message)];
        match self.llm.complete_text(&turns, CARD_TEMPERATURE).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Assistant completion failed");
                OFFLINE_REPLY.to_string()
            }
        }
    }
}

fn recommendation_card(trails: &[TrailRecord]) -> TripCard {
    let routes: Vec<RouteLine> = trails
        .iter()
        .map(|t| RouteLine {
            name: t.name.clone(),
            dist: t.distance_label(),
        })
        .collect();
    let total: f64 = trails.iter().map(|t| t.length_km).sum();
    TripCard {
        title: "Recommended Routes".to_string(),
        summary: Some(format!("{} trails worth a look for the next outing.", routes.len())),
        stats: TripStats {
            dist: Some(format!("{:.1}km total", total)),
            elev: None,
        },
        weather_warning: None,
        gear_required: Vec::new(),
        fun_fact: None,
        routes,
    }
}
