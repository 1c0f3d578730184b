//! A number-guessing game kept in session data: `imagine` picks a secret,
//! `isLessThan` and `guess` probe it, `reveal` gives it away.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};

use sg_mcp::{Tool, ToolContext, ToolDefinition, ToolError};
use sg_sessions::{DataKey, SessionStore};

use super::{parse_args, require_session};

/// Written by `imagine`, read by the other guessing tools.
pub const IMAGINED: DataKey<Imagined> = DataKey::new("imagined");

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Imagined {
    pub lower: f64,
    pub upper: f64,
    pub number: i64,
}

fn imagined(session: &sg_sessions::Session) -> Result<Imagined, ToolError> {
    let secret = session
        .get(IMAGINED)
        .ok_or_else(|| ToolError::Failed("No number imagined yet".into()))?;
    Ok(*secret)
}

fn definition(name: &str, description: &str, input: Value, output: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.into(),
        description: description.into(),
        input_schema: input,
        output_schema: Some(output),
    }
}

fn number_schema(fields: &[&str]) -> Value {
    let properties: serde_json::Map<String, Value> = fields
        .iter()
        .map(|f| (f.to_string(), json!({ "type": "number" })))
        .collect();
    json!({ "type": "object", "properties": properties, "required": fields })
}

// ── imagine ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RangeArgs {
    lower: f64,
    upper: f64,
}

pub struct Imagine {
    store: Arc<SessionStore>,
}

impl Imagine {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for Imagine {
    fn definition(&self) -> ToolDefinition {
        definition(
            "imagine",
            "Pick a random number between lower and upper",
            number_schema(&["lower", "upper"]),
            number_schema(&["lower", "upper"]),
        )
    }

    async fn call(&self, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let RangeArgs { lower, upper } = parse_args(arguments)?;
        let session = require_session(&self.store, "imagine", ctx).await?;

        let (lo, hi) = (lower.ceil() as i64, upper.floor() as i64);
        if lo > hi {
            return Err(ToolError::InvalidArguments(format!(
                "no whole number between {lower} and {upper}"
            )));
        }
        let number = rand::thread_rng().gen_range(lo..=hi);
        session.insert(IMAGINED, Imagined { lower, upper, number });

        Ok(json!({ "lower": lower, "upper": upper }))
    }
}

// ── isLessThan ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct NumberArg {
    n: f64,
}

pub struct IsLessThan {
    store: Arc<SessionStore>,
}

impl IsLessThan {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for IsLessThan {
    fn definition(&self) -> ToolDefinition {
        definition(
            "isLessThan",
            "Ask if the imagined number is less than the given number",
            number_schema(&["n"]),
            json!({ "type": "object", "properties": { "isLess": { "type": "boolean" } } }),
        )
    }

    async fn call(&self, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let NumberArg { n } = parse_args(arguments)?;
        let session = require_session(&self.store, "isLessThan", ctx).await?;
        let secret = imagined(&session)?;
        let number = secret.number as f64;
        if number < secret.lower.floor() || number > secret.upper {
            return Err(ToolError::Failed(format!(
                "imagined number {} is outside of range [{}, {}]",
                secret.number, secret.lower, secret.upper
            )));
        }
        Ok(json!({ "isLess": secret.number < n.floor() as i64 }))
    }
}

// ── guess ────────────────────────────────────────────────────────────

pub struct Guess {
    store: Arc<SessionStore>,
}

impl Guess {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for Guess {
    fn definition(&self) -> ToolDefinition {
        definition(
            "guess",
            "Guess the imagined number",
            number_schema(&["n"]),
            json!({ "type": "object", "properties": { "correct": { "type": "boolean" } } }),
        )
    }

    async fn call(&self, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let NumberArg { n } = parse_args(arguments)?;
        let session = require_session(&self.store, "guess", ctx).await?;
        let secret = imagined(&session)?;
        Ok(json!({ "correct": secret.number == n.floor() as i64 }))
    }
}

// ── reveal ───────────────────────────────────────────────────────────

pub struct Reveal {
    store: Arc<SessionStore>,
}

impl Reveal {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for Reveal {
    fn definition(&self) -> ToolDefinition {
        definition(
            "reveal",
            "Reveal the imagined number",
            json!({ "type": "object", "properties": {} }),
            json!({ "type": "object", "properties": { "secret": { "type": "number" } } }),
        )
    }

    async fn call(&self, _arguments: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let session = require_session(&self.store, "reveal", ctx).await?;
        let secret = imagined(&session)?;
        Ok(json!({ "secret": secret.number }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::NullTransport;
    use sg_mcp::Notifier;
    use sg_sessions::SessionData;

    fn setup() -> (Arc<SessionStore>, ToolContext) {
        let store = Arc::new(SessionStore::new());
        store
            .create_session("s", Arc::new(NullTransport), SessionData::new())
            .unwrap();
        (store, ToolContext::new("s", Notifier::disconnected()))
    }

    #[tokio::test]
    async fn full_game() {
        let (store, ctx) = setup();
        let out = Imagine::new(store.clone())
            .call(json!({"lower": 1, "upper": 10}), &ctx)
            .await
            .unwrap();
        assert_eq!(out, json!({"lower": 1.0, "upper": 10.0}));

        let secret = Reveal::new(store.clone()).call(json!({}), &ctx).await.unwrap()["secret"]
            .as_i64()
            .unwrap();
        assert!((1..=10).contains(&secret));

        let less = IsLessThan::new(store.clone())
            .call(json!({"n": secret + 1}), &ctx)
            .await
            .unwrap();
        assert_eq!(less["isLess"], true);
        let less = IsLessThan::new(store.clone())
            .call(json!({"n": secret}), &ctx)
            .await
            .unwrap();
        assert_eq!(less["isLess"], false);

        let guess = Guess::new(store.clone());
        assert_eq!(guess.call(json!({"n": secret}), &ctx).await.unwrap()["correct"], true);
        assert_eq!(
            guess.call(json!({"n": secret as f64 + 0.5}), &ctx).await.unwrap()["correct"],
            true
        );
        assert_eq!(guess.call(json!({"n": secret + 1}), &ctx).await.unwrap()["correct"], false);
    }

    #[tokio::test]
    async fn probing_before_imagine_fails() {
        let (store, ctx) = setup();
        let err = Guess::new(store).call(json!({"n": 3}), &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::Failed(msg) if msg == "No number imagined yet"));
    }

    #[tokio::test]
    async fn bad_arguments_are_rejected() {
        let (store, ctx) = setup();
        let err = Imagine::new(store.clone())
            .call(json!({"lower": "one"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let err = Imagine::new(store)
            .call(json!({"lower": 5.2, "upper": 5.8}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn schemas_list_required_fields() {
        let def = Imagine::new(Arc::new(SessionStore::new())).definition();
        assert_eq!(def.input_schema["required"], json!(["lower", "upper"]));
        assert_eq!(def.input_schema["properties"]["lower"]["type"], "number");
    }
}
