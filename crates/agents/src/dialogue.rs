use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, NaiveDate};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use wayfinder_core::dates::{normalize_num_days, normalize_start_date, parse_relative_phrase};
use wayfinder_core::{extract_json_object, ChatTurn, ConversationState, SlotField, TranscriptTurn};
use wayfinder_lookup::ChatModel;
use wayfinder_observability::AppMetrics;

const DIALOGUE_MAX_TOKENS: u32 = 380;
const MAX_TRANSCRIPT_TURNS: usize = 40;
const APOLOGY_REPLY: &str = "Sorry, I didn't understand that. Please try again.";
const RESET_REPLY: &str = "Okay, starting fresh! Where would you like to go?";

const RESET_KEYWORDS: [&str; 5] = ["reset", "start over", "new plan", "new trip", "new journey"];

/// What the model is asked to return each turn.
#[derive(Debug, Default, Deserialize)]
struct ModelTurn {
    reply: Option<String>,
    #[serde(default)]
    field_updates: serde_json::Map<String, Value>,
    #[serde(default)]
    suggestions: Vec<Value>,
}

/// Slot-filling dialogue manager. Conversation state is keyed by session id;
/// each session serializes its own updates behind an async mutex, so
/// concurrent sessions never interfere.
pub struct DialogueManager {
    model: Arc<dyn ChatModel>,
    metrics: Arc<AppMetrics>,
    sessions: RwLock<HashMap<String, Arc<Mutex<ConversationState>>>>,
}

impl DialogueManager {
    pub fn new(model: Arc<dyn ChatModel>, metrics: Arc<AppMetrics>) -> Self {
        Self {
            model,
            metrics,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    #[instrument(skip(self, message))]
    pub async fn handle_turn(&self, session_id: &str, message: &str) -> ChatTurn {
        self.turn_at(session_id, message, Local::now().date_naive())
            .await
    }

    /// Turn handling against an explicit "today", which pins the relative
    /// date arithmetic.
    pub async fn turn_at(&self, session_id: &str, message: &str, today: NaiveDate) -> ChatTurn {
        let started = Instant::now();
        self.metrics.inc_chat_turn();

        let session = self.session(session_id);
        let mut state = session.lock().await;
        let turn = self.advance(&mut state, message, today).await;

        state.context.push(TranscriptTurn {
            user_text: message.to_string(),
            assistant_text: turn.reply.clone(),
        });
        if state.context.len() > MAX_TRANSCRIPT_TURNS {
            let keep_from = state.context.len() - MAX_TRANSCRIPT_TURNS;
            state.context.drain(..keep_from);
        }

        self.metrics.observe_latency(started.elapsed());
        info!(
            session_id = %session_id,
            done = turn.done,
            missing = state.missing_fields().len(),
            "chat turn handled"
        );
        turn
    }

    pub async fn reset(&self, session_id: &str) {
        let session = self.session(session_id);
        session.lock().await.reset();
        info!(session_id = %session_id, "conversation reset");
    }

    pub async fn snapshot(&self, session_id: &str) -> ConversationState {
        self.session(session_id).lock().await.clone()
    }

    fn session(&self, session_id: &str) -> Arc<Mutex<ConversationState>> {
        if let Some(existing) = self.sessions.read().get(session_id) {
            return existing.clone();
        }
        self.sessions
            .write()
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    async fn advance(
        &self,
        state: &mut ConversationState,
        message: &str,
        today: NaiveDate,
    ) -> ChatTurn {
        if is_reset_request(message) {
            state.reset();
            return ChatTurn {
                reply: RESET_REPLY.to_string(),
                variables: state.as_value(),
                done: false,
            };
        }

        // Deterministic date pre-parse: a relative phrase in the utterance
        // pins start_date for this turn, whatever the model proposes.
        let date_locked = match parse_relative_phrase(message, today) {
            Some(date) => {
                state.start_date = date.format("%Y-%m-%d").to_string();
                true
            }
            None => false,
        };

        let prompt = build_prompt(state, message, today);

        self.metrics.inc_llm_call();
        let raw = match self.model.complete(None, &prompt, DIALOGUE_MAX_TOKENS).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(%error, "dialogue model call failed");
                self.metrics.inc_llm_failure();
                return self.apology(state);
            }
        };

        let model_turn: ModelTurn = match extract_json_object(&raw)
            .map_err(anyhow::Error::from)
            .and_then(|value| serde_json::from_value(value).map_err(anyhow::Error::from))
        {
            Ok(turn) => turn,
            Err(error) => {
                warn!(%error, "model output was not the expected JSON shape");
                return self.apology(state);
            }
        };

        let Some(reply) = model_turn.reply else {
            warn!("model output was missing the reply key");
            return self.apology(state);
        };

        for (key, value) in &model_turn.field_updates {
            let Some(field) = SlotField::parse(key) else {
                continue;
            };
            // Pre-parsed dates win over whatever the model suggests.
            if field == SlotField::StartDate && date_locked {
                continue;
            }
            let Some(proposed) = scalar_to_string(value) else {
                continue;
            };

            let normalized = match field {
                SlotField::StartDate => normalize_start_date(&proposed, today),
                SlotField::NumDays => normalize_num_days(&proposed),
                _ => proposed.trim().to_string(),
            };
            state.set(field, normalized);
        }

        let missing = state.missing_fields();
        if missing.is_empty() {
            state.last_asked_field = None;
            return ChatTurn {
                reply: completion_summary(state),
                variables: state.as_value(),
                done: true,
            };
        }

        let next_field = missing[0];
        let mut reply = if state.last_asked_field != Some(next_field) {
            state.last_asked_field = Some(next_field);
            format!(
                "{} Could you please provide your {}?",
                reply,
                next_field.label()
            )
        } else {
            // Same slot as last turn: the question is already on the table.
            reply
        };

        let suggestions: Vec<&str> = model_turn
            .suggestions
            .iter()
            .filter_map(Value::as_str)
            .take(4)
            .collect();
        if !suggestions.is_empty() {
            reply.push_str(&format!(" suggestions: {}", suggestions.join(", ")));
        }

        ChatTurn {
            reply,
            variables: state.as_value(),
            done: false,
        }
    }

    fn apology(&self, state: &ConversationState) -> ChatTurn {
        self.metrics.inc_fallback();
        ChatTurn {
            reply: APOLOGY_REPLY.to_string(),
            variables: state.as_value(),
            done: false,
        }
    }
}

fn is_reset_request(message: &str) -> bool {
    let lower = message.trim().to_lowercase();
    RESET_KEYWORDS.iter().any(|keyword| lower == *keyword)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn build_prompt(state: &ConversationState, message: &str, today: NaiveDate) -> String {
    format!(
        r#"You are a friendly AI travel planner.

We are gathering: destination, start_date, num_days, budget, departure_city, trip_type.
Current known info: {known}
User said: "{message}"

GENERAL RULES:
- When the user greets you, greet them back and ask for their destination.
- Keep your answers short, warm, and easy to read.

DESTINATION RULES:
- Accept real destinations:
  cities (Paris, Tokyo), regions (Swiss Alps), named parks (Banff).
- Reject generic nature words:
  rainforest, forest, jungle, mountains, mountain range, beach, island, lake, desert, valley, canyon.
- If generic: ask "Which specific place?" and provide 3-5 real examples.

DATE RULES:
- Today is {today}.
- Natural options allowed: "tomorrow", "next week", "next weekend", "next month".
- DO NOT output ISO dates unless the user explicitly asks.
- All dates must be future dates.

CONVERSATION RULES:
- Ask only one missing detail at a time.
- Do NOT repeat questions.
- If the user says "reset", "start over", "new plan", "new trip" or "new journey", treat it as a request to clear all collected details.
- After the user gives info, acknowledge and move to the next field.

SUGGESTION RULES:
- Suggestions MUST relate to the next missing field.
- MAX 4 suggestions.
- Must be short (1-4 words).
- Never break numbers across lines.
- Budget examples: "$1000-$2000", "$2000-$4000", "luxury", "no limit".
- Always use single-hyphen numeric ranges: "$4000-$6000".

RETURN JSON ONLY:
{{
  "reply": "text",
  "field_updates": {{}},
  "suggestions": ["one", "two", "three"]
}}
"#,
        known = state.as_value(),
        message = message,
        today = today.format("%Y-%m-%d"),
    )
}

fn completion_summary(state: &ConversationState) -> String {
    format!(
        "All details collected! Here's your trip summary:\n\n\
         - Destination: {}\n\
         - Start Date: {}\n\
         - Duration: {} days\n\
         - Budget: {}\n\
         - Departure City: {}\n\
         - Trip Type: {}\n\n\
         You can now generate your itinerary!",
        state.destination,
        state.start_date,
        state.num_days,
        state.budget,
        state.departure_city,
        state.trip_type,
    )
}
