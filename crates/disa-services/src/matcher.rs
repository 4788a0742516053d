//! Task-to-person matching.
//!
//! The LLM matcher renders the task and the available personnel into a
//! prompt, sends it to an OpenAI-compatible chat completions endpoint and
//! expects `{"personId", "reason", "matchScore"}` back. Any failure along
//! the way (HTTP, template, parse, unknown person) falls back to the first
//! candidate with a score of 50. An empty candidate list is the only error.

use std::fmt;
use std::time::Duration;

use disa_types::{Person, PersonnelId, Task};
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ServiceError;

/// Score given to a fallback selection.
pub const FALLBACK_SCORE: f64 = 50.0;

const SYSTEM_PROMPT: &str = "You are an AI assistant for disaster management personnel \
assignment. You answer with a single JSON object and nothing else.";

const MATCH_TEMPLATE: &str = r#"Analyze the following task and available personnel, then select the MOST SUITABLE person for this task.

### TASK DETAILS ###
Task ID: {{ task.id }}
Task Code: {{ task.taskCode }}
Task Type: {{ task["type"] }}
Title: {{ task.title }}
Description: {{ task.description or "None" }}
Priority: {{ task.priority }}
Location: {{ task.location or "Not specified" }}

### AVAILABLE PERSONNEL ###
{% for p in persons %}
Person {{ loop.index }}:
- ID: {{ p.id }}
- Name: {{ p.firstName }} {{ p.lastName }}
- Role: {{ p.role or "Not specified" }}
- Department: {{ p.department or "Not specified" }}
- Rank: {{ p.rank or "Not specified" }}
- Organization: {{ p.organization or "Not specified" }}
- Skills: {% for s in p.skills %}{{ s.skillName }} (Level: {{ s.proficiencyLevel }}){% if not loop.last %}, {% endif %}{% else %}None listed{% endfor %}
{% if p.hasMedicalCondition %}- Medical Conditions: Has medical conditions
{% endif %}- Status: {{ p.status }}
- Shift: {% if p.shiftStart and p.shiftEnd %}{{ p.shiftStart }} to {{ p.shiftEnd }}{% else %}Not specified{% endif %}
{% endfor %}
### INSTRUCTIONS ###
1. Match the task type and description against each person's role and skills.
2. Prefer higher skill levels for higher priority tasks.
3. Avoid people with medical conditions for physically demanding tasks.
4. Consider shift times when they are given.
5. Pick exactly one person from the list above.

Respond with JSON only, in this format:
{"personId": <ID of the selected person>, "reason": "<short explanation>", "matchScore": <0-100>}
"#;

/// Matcher settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Use the LLM matcher. When false, the first candidate is always picked.
    pub enabled: bool,
    /// Base URL of an OpenAI-compatible API, without `/chat/completions`.
    pub api_url: String,
    /// Bearer token.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// Request timeout.
    pub timeout_ms: u64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://api.openai.com/v1".to_owned(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_owned(),
            timeout_ms: 10_000,
        }
    }
}

impl fmt::Debug for MatcherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherConfig")
            .field("enabled", &self.enabled)
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// The selected person for a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    /// Chosen person.
    pub person_id: PersonnelId,
    /// Why this person was chosen.
    pub reason: String,
    /// Suitability, 0 to 100.
    pub match_score: f64,
    /// True when the selection did not come from the model.
    pub fallback: bool,
}

impl MatchResult {
    fn fallback(person: &Person, cause: &str) -> Self {
        Self {
            person_id: person.id,
            reason: format!("Selected by fallback mechanism due to {cause}"),
            match_score: FALLBACK_SCORE,
            fallback: true,
        }
    }
}

/// Picks one person for a task.
///
/// Enum dispatch instead of a trait object, since `select` is async.
#[derive(Debug)]
pub enum TaskMatcher {
    /// Ask an LLM.
    Llm(Box<LlmMatcher>),
    /// Always the first candidate.
    FirstAvailable,
}

impl TaskMatcher {
    /// Build the matcher described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Matcher`] if the HTTP client or the prompt
    /// template cannot be built.
    pub fn from_config(config: &MatcherConfig) -> Result<Self, ServiceError> {
        if config.enabled {
            Ok(Self::Llm(Box::new(LlmMatcher::new(config)?)))
        } else {
            Ok(Self::FirstAvailable)
        }
    }

    /// Human-readable name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Llm(_) => "llm",
            Self::FirstAvailable => "first-available",
        }
    }

    /// Select one of `candidates` for `task`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Matcher`] only when `candidates` is empty.
    pub async fn select(&self, task: &Task, candidates: &[Person]) -> Result<MatchResult, ServiceError> {
        let first = candidates.first().ok_or_else(|| {
            ServiceError::Matcher("No available persons found for task assignment".to_owned())
        })?;
        match self {
            Self::Llm(llm) => match llm.rank(task, candidates).await {
                Ok(result) => Ok(result),
                Err(e) => {
                    warn!(task_code = task.task_code, error = %e, "LLM matching failed, using fallback");
                    Ok(MatchResult::fallback(first, &e.to_string()))
                }
            },
            Self::FirstAvailable => Ok(MatchResult::fallback(first, "matcher disabled")),
        }
    }
}

/// Matcher backed by an OpenAI-compatible chat completions API.
pub struct LlmMatcher {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    prompts: Environment<'static>,
}

impl fmt::Debug for LlmMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmMatcher")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl LlmMatcher {
    /// Create a matcher from settings.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Matcher`] if the HTTP client or the prompt
    /// template cannot be built.
    pub fn new(config: &MatcherConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ServiceError::Matcher(format!("failed to build HTTP client: {e}")))?;
        let mut prompts = Environment::new();
        prompts
            .add_template_owned("match", MATCH_TEMPLATE.to_owned())
            .map_err(|e| ServiceError::Matcher(format!("failed to load match template: {e}")))?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            prompts,
        })
    }

    /// Render the user prompt for `task` and `candidates`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Matcher`] if rendering fails.
    pub fn render(&self, task: &Task, candidates: &[Person]) -> Result<String, ServiceError> {
        self.prompts
            .get_template("match")
            .and_then(|tpl| tpl.render(context! { task => task, persons => candidates }))
            .map_err(|e| ServiceError::Matcher(format!("match prompt render failed: {e}")))
    }

    async fn rank(&self, task: &Task, candidates: &[Person]) -> Result<MatchResult, ServiceError> {
        let user = self.render(task, candidates)?;
        let raw = self.complete(&user).await?;
        debug!(task_code = task.task_code, raw_response = raw, "matcher response");
        parse_selection(&raw, candidates)
    }

    async fn complete(&self, user: &str) -> Result<String, ServiceError> {
        let url = format!("{}/chat/completions", self.api_url);

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user}
            ],
            "temperature": 0.7,
            "max_tokens": 512,
            "response_format": {"type": "json_object"}
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Matcher(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(ServiceError::Matcher(format!(
                "API returned {status}: {error_body}"
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::Matcher(format!("response parse failed: {e}")))?;

        extract_openai_content(&json)
    }
}

/// Extract the text content from a chat completions response.
fn extract_openai_content(json: &serde_json::Value) -> Result<String, ServiceError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            ServiceError::Matcher("response missing choices[0].message.content".to_owned())
        })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSelection {
    person_id: serde_json::Value,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    match_score: Option<f64>,
}

/// Parse the model's answer and check the chosen person is a candidate.
fn parse_selection(raw: &str, candidates: &[Person]) -> Result<MatchResult, ServiceError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| ServiceError::Matcher(format!("parsing error: no JSON object in {raw:?}")))?;
    let selection: RawSelection = serde_json::from_str(json)
        .map_err(|e| ServiceError::Matcher(format!("parsing error: {e}")))?;

    let person_id = person_id_from(&selection.person_id).ok_or_else(|| {
        ServiceError::Matcher(format!("parsing error: bad personId {}", selection.person_id))
    })?;
    if !candidates.iter().any(|p| p.id == person_id) {
        return Err(ServiceError::Matcher(format!(
            "selected person {person_id} is not among the candidates"
        )));
    }

    let score = selection.match_score.filter(|s| s.is_finite()).unwrap_or(0.0);
    Ok(MatchResult {
        person_id,
        reason: selection.reason.unwrap_or_default(),
        match_score: score.clamp(0.0, 100.0),
        fallback: false,
    })
}

/// Strip a markdown fence and anything outside the outermost braces.
fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    unfenced.get(start..=end)
}

/// Accept `3`, `"3"` and `"PER-003"`.
fn person_id_from(value: &serde_json::Value) -> Option<PersonnelId> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().map(PersonnelId::new),
        serde_json::Value::String(s) => PersonnelId::from_code(s),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use disa_types::{Priority, Skill, TaskId, TaskStatus, TaskType};

    use super::*;

    fn task() -> Task {
        Task {
            id: TaskId::new(4),
            task_code: "TSK-004".to_owned(),
            task_type: TaskType::MedicalAid,
            title: "treat injured at camp".to_owned(),
            description: None,
            priority: Priority::High,
            incident_id: None,
            assigned_to: None,
            location: Some("Kelaniya".to_owned()),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    fn person(id: u64, first: &str, skill: &str) -> Person {
        Person {
            id: PersonnelId::new(id),
            first_name: first.to_owned(),
            last_name: "Perera".to_owned(),
            role: Some("Responder".to_owned()),
            department: None,
            rank: None,
            organization: Some("DMC".to_owned()),
            skills: vec![Skill {
                skill_name: skill.to_owned(),
                proficiency_level: "Expert".to_owned(),
            }],
            status: "Available".to_owned(),
            has_medical_condition: id == 2,
            shift_start: None,
            shift_end: None,
            enabled: true,
        }
    }

    fn crew() -> Vec<Person> {
        vec![person(1, "Nimal", "Rescue"), person(2, "Saman", "First aid")]
    }

    #[test]
    fn parses_fenced_answer_with_trailing_text() {
        let raw = "```json\n{\"personId\": 2, \"reason\": \"medic\", \"matchScore\": 87.5}\n```\nDone.";
        let result = parse_selection(raw, &crew()).unwrap();
        assert_eq!(result.person_id, PersonnelId::new(2));
        assert_eq!(result.reason, "medic");
        assert!((result.match_score - 87.5).abs() < f64::EPSILON);
        assert!(!result.fallback);
    }

    #[test]
    fn accepts_string_ids_and_clamps_scores() {
        let raw = r#"{"personId": "PER-001", "reason": "closest", "matchScore": 140}"#;
        let result = parse_selection(raw, &crew()).unwrap();
        assert_eq!(result.person_id, PersonnelId::new(1));
        assert!((result.match_score - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_unknown_or_garbled_answers() {
        assert!(parse_selection(r#"{"personId": 9, "reason": "x"}"#, &crew()).is_err());
        assert!(parse_selection("no idea", &crew()).is_err());
        assert!(parse_selection(r#"{"reason": "x"}"#, &crew()).is_err());
    }

    #[test]
    fn extracts_content_from_chat_response() {
        let json = serde_json::json!({"choices": [{"message": {"content": "{}"}}]});
        assert_eq!(extract_openai_content(&json).unwrap(), "{}");
        assert!(extract_openai_content(&serde_json::json!({"choices": []})).is_err());
    }

    #[test]
    fn prompt_lists_task_and_people() {
        let matcher = LlmMatcher::new(&MatcherConfig {
            enabled: true,
            ..MatcherConfig::default()
        })
        .unwrap();
        let prompt = matcher.render(&task(), &crew()).unwrap();
        assert!(prompt.contains("### TASK DETAILS ###"));
        assert!(prompt.contains("Task Code: TSK-004"));
        assert!(prompt.contains("Task Type: MEDICAL_AID"));
        assert!(prompt.contains("Description: None"));
        assert!(prompt.contains("Person 2:"));
        assert!(prompt.contains("First aid (Level: Expert)"));
        assert!(prompt.contains("Medical Conditions: Has medical conditions"));
        assert!(prompt.contains("Shift: Not specified"));
    }

    #[test]
    fn debug_hides_the_api_key() {
        let config = MatcherConfig {
            api_key: "sk-secret".to_owned(),
            ..MatcherConfig::default()
        };
        assert!(!format!("{config:?}").contains("sk-secret"));
    }

    #[tokio::test]
    async fn empty_candidates_is_an_error() {
        let result = TaskMatcher::FirstAvailable.select(&task(), &[]).await;
        assert!(matches!(result, Err(ServiceError::Matcher(m)) if m.contains("No available persons")));
    }

    #[tokio::test]
    async fn unreachable_endpoint_falls_back_to_first_candidate() {
        let matcher = TaskMatcher::from_config(&MatcherConfig {
            enabled: true,
            api_url: "http://127.0.0.1:9".to_owned(),
            timeout_ms: 500,
            ..MatcherConfig::default()
        })
        .unwrap();
        assert_eq!(matcher.name(), "llm");
        let result = matcher.select(&task(), &crew()).await.unwrap();
        assert_eq!(result.person_id, PersonnelId::new(1));
        assert!(result.fallback);
        assert!((result.match_score - FALLBACK_SCORE).abs() < f64::EPSILON);
        assert!(result.reason.starts_with("Selected by fallback mechanism due to"));
    }
}
