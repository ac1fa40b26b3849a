use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::{SyllabusError, SyllabusResult};
use crate::types::LearningObjective;

use super::traits::{
    AssignmentRound, Collaborator, ExtractedObjective, MergedObjective, SubmoduleAssignment,
    SubmoduleSlot,
};

/// Production collaborator over an OpenAI-compatible endpoint.
///
/// Structured generation uses JSON-mode chat completions; embeddings use the
/// embeddings endpoint. Each trait method is one prompt type with its own
/// response shape.
pub struct HttpCollaborator {
    client: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
}

impl HttpCollaborator {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url("https://api.openai.com", api_key)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            chat_model: "gpt-4o-mini".into(),
            embedding_model: "text-embedding-3-small".into(),
        }
    }

    pub fn with_models(
        mut self,
        chat_model: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Self {
        self.chat_model = chat_model.into();
        self.embedding_model = embedding_model.into();
        self
    }

    /// One structured-generation round trip. The system prompt pins the
    /// response to a single JSON object with a top-level `result` field
    /// matching `schema_hint`.
    async fn structured<T: DeserializeOwned>(
        &self,
        context: &str,
        prompt: String,
        schema_hint: &str,
    ) -> SyllabusResult<T> {
        let body = json!({
            "model": self.chat_model,
            "messages": [
                {
                    "role": "system",
                    "content": format!(
                        "Respond with a single JSON object: {{\"result\": {schema_hint}}}. No prose."
                    )
                },
                {"role": "user", "content": prompt},
            ],
            "response_format": {"type": "json_object"},
        });

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(SyllabusError::Collaborator(format!(
                "{context}: HTTP {status}: {text}"
            )));
        }

        let envelope: serde_json::Value = resp.json().await?;
        let content = envelope["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| SyllabusError::SchemaMismatch {
                context: context.into(),
                message: "response has no message content".into(),
            })?;

        let parsed: serde_json::Value =
            serde_json::from_str(content).map_err(|e| SyllabusError::SchemaMismatch {
                context: context.into(),
                message: format!("content is not valid JSON: {e}"),
            })?;

        serde_json::from_value(parsed["result"].clone()).map_err(|e| {
            SyllabusError::SchemaMismatch {
                context: context.into(),
                message: format!("result does not match schema: {e}"),
            }
        })
    }
}

#[async_trait::async_trait]
impl Collaborator for HttpCollaborator {
    async fn extract_objectives(
        &self,
        chunk_content: &str,
    ) -> SyllabusResult<Vec<ExtractedObjective>> {
        self.structured(
            "extract_objectives",
            format!(
                "Extract the learning objectives a reader should master from this \
                 passage. One objective per distinct skill or concept.\n\n{chunk_content}"
            ),
            r#"[{"text": string, "sub_objectives": [string]}]"#,
        )
        .await
    }

    async fn merge_cluster(
        &self,
        cluster: &[LearningObjective],
    ) -> SyllabusResult<Vec<MergedObjective>> {
        let listing: String = cluster
            .iter()
            .enumerate()
            .map(|(i, o)| format!("{i}. {}\n", o.text))
            .collect();
        self.structured(
            "merge_cluster",
            format!(
                "These learning objectives are near-duplicates. Merge them into \
                 one or more representatives. For each representative, list the \
                 indices it covers and quote one sentence from the source material \
                 that grounds it.\n\n{listing}"
            ),
            r#"[{"text": string, "sub_objectives": [string], "covers": [number], "reference_candidate": string}]"#,
        )
        .await
    }

    async fn name_lesson(&self, objective_texts: &[String]) -> SyllabusResult<String> {
        let listing = objective_texts.join("\n- ");
        self.structured(
            "name_lesson",
            format!("Give a short lesson title covering these objectives:\n- {listing}"),
            r#"string"#,
        )
        .await
    }

    async fn propose_prerequisites(
        &self,
        lesson_name: &str,
        objective_texts: &[String],
        known_names: &[String],
        max: usize,
    ) -> SyllabusResult<Vec<String>> {
        self.structured(
            "propose_prerequisites",
            format!(
                "Lesson: {lesson_name}\nObjectives:\n{}\n\nWhich of these other \
                 lessons must be learned first? Choose at most {max}, only from \
                 this list, or none:\n{}",
                objective_texts.join("\n"),
                known_names.join("\n"),
            ),
            r#"[string]"#,
        )
        .await
    }

    async fn rank_cycle_group(&self, names: &[String]) -> SyllabusResult<Vec<String>> {
        self.structured(
            "rank_cycle_group",
            format!(
                "These lessons depend on each other in a cycle. Order them from \
                 most fundamental to most advanced. Use every name exactly once, \
                 spelled exactly as given:\n{}",
                names.join("\n"),
            ),
            r#"[string]"#,
        )
        .await
    }

    async fn assign_lessons(
        &self,
        lesson_names: &[String],
        slots: &[SubmoduleSlot],
    ) -> SyllabusResult<AssignmentRound> {
        let slot_listing: String = slots
            .iter()
            .map(|s| {
                format!(
                    "- {} (module: {}, remaining capacity: {})\n",
                    s.name,
                    s.module.as_deref().unwrap_or("unassigned"),
                    s.remaining_capacity,
                )
            })
            .collect();
        self.structured(
            "assign_lessons",
            format!(
                "Assign each lesson to a submodule (existing below, or invent a \
                 new one) and each submodule to a module. Respect remaining \
                 capacities.\n\nLessons (in teaching order):\n{}\n\nExisting \
                 submodules:\n{slot_listing}",
                lesson_names.join("\n"),
            ),
            r#"{"lessons": [{"lesson": string, "submodule": string}], "submodules": [{"submodule": string, "module": string}]}"#,
        )
        .await
    }

    async fn attach_submodules(
        &self,
        orphan_submodules: &[String],
        module_names: &[String],
    ) -> SyllabusResult<Vec<SubmoduleAssignment>> {
        self.structured(
            "attach_submodules",
            format!(
                "Assign each of these submodules to one of the existing modules \
                 or a new one.\n\nSubmodules:\n{}\n\nExisting modules:\n{}",
                orphan_submodules.join("\n"),
                module_names.join("\n"),
            ),
            r#"[{"submodule": string, "module": string}]"#,
        )
        .await
    }

    async fn embed(&self, texts: &[String]) -> SyllabusResult<Vec<Vec<f32>>> {
        let body = json!({
            "model": self.embedding_model,
            "input": texts,
        });

        let resp = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(SyllabusError::Collaborator(format!(
                "embed: HTTP {status}: {text}"
            )));
        }

        let envelope: serde_json::Value = resp.json().await?;
        let data = envelope["data"]
            .as_array()
            .ok_or_else(|| SyllabusError::SchemaMismatch {
                context: "embed".into(),
                message: "response has no data array".into(),
            })?;

        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            let vector: Vec<f32> = serde_json::from_value(item["embedding"].clone())
                .map_err(|e| SyllabusError::SchemaMismatch {
                    context: "embed".into(),
                    message: format!("embedding is not a float array: {e}"),
                })?;
            vectors.push(vector);
        }

        if vectors.len() != texts.len() {
            return Err(SyllabusError::SchemaMismatch {
                context: "embed".into(),
                message: format!("asked for {} vectors, got {}", texts.len(), vectors.len()),
            });
        }

        Ok(vectors)
    }
}
