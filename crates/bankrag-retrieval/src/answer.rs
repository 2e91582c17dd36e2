//! Prompt composition, source listing and the answer service.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use bankrag_core::error::Result;
use bankrag_core::types::RetrievalResult;

use crate::DiversityRetriever;

/// Characters of chunk content shown per source before truncation.
pub const PREVIEW_CHARS: usize = 400;

/// Returned without calling the generator when retrieval finds nothing.
pub const NO_CONTEXT_ANSWER: &str = "No encuentro esa información específica en mis documentos. \
Te recomiendo contactar a un asesor en 01 8000 515 050";

/// Most recent conversation turns included in the prompt.
pub const HISTORY_TURNS: usize = 3;

/// Rendered in place of the history when the conversation has just started.
pub const NO_HISTORY: &str = "Primera pregunta del usuario.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One earlier message of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self { Self { role: Role::User, content: content.into() } }

    pub fn assistant(content: impl Into<String>) -> Self { Self { role: Role::Assistant, content: content.into() } }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    /// 1-based, matches the `Fuente` number in the prompt.
    pub id: usize,
    pub source: String,
    pub section: String,
    pub subsection: String,
    pub content: String,
    pub chunk_id: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceInfo>,
    pub confidence: f32,
    pub generator_id: Option<String>,
}

/// Numbered context blocks separated by `---`, one per hit.
pub fn format_context(result: &RetrievalResult) -> String {
    result
        .iter()
        .enumerate()
        .map(|(i, hit)| format!("[Fuente {} - {}]\n{}", i + 1, section_label(&hit.metadata.section), hit.chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// The last [`HISTORY_TURNS`] turns as `Usuario:`/`Asistente:` lines.
pub fn format_history(history: &[Turn]) -> String {
    if history.is_empty() {
        return NO_HISTORY.to_string();
    }
    history[history.len().saturating_sub(HISTORY_TURNS)..]
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                Role::User => "Usuario",
                Role::Assistant => "Asistente",
            };
            format!("{speaker}: {}", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn compose_prompt(question: &str, result: &RetrievalResult, history: &[Turn]) -> String {
    let history = format_history(history);
    let context = format_context(result);
    format!(
        "Eres el asistente virtual del banco. Tu objetivo es ayudar a clientes con información precisa y segura.

HISTORIAL: {history}

CONTEXTO: {context}

PREGUNTA: {question}

INSTRUCCIONES:
1. Responde EXCLUSIVAMENTE con información del contexto documental proporcionado
2. Para datos sensibles (saldos, números de cuenta): \"Para tu seguridad, valida esta información en tu portal bancario o llama al 01 8000 515 050\"
3. Si la información NO está en el contexto: \"{NO_CONTEXT_ANSWER}\"
4. Sé breve pero completo. Usa listas numeradas y tablas cuando sea apropiado
5. NO inventes tasas de interés, números de teléfono, ni procedimientos
6. Mantén un tono profesional y empático
7. Responde en español

RESPUESTA:"
    )
}

pub fn sources(result: &RetrievalResult) -> Vec<SourceInfo> {
    result
        .iter()
        .enumerate()
        .map(|(i, hit)| SourceInfo {
            id: i + 1,
            source: hit.chunk.source.clone(),
            section: section_label(&hit.metadata.section).to_string(),
            subsection: section_label(&hit.metadata.subsection).to_string(),
            content: preview(&hit.chunk.content),
            chunk_id: hit.chunk.id.clone(),
            score: hit.score,
        })
        .collect()
}

/// `min(0.7 + 0.05 * n, 0.95)` for `n` sources, 0 when there are none.
pub fn confidence(n: usize) -> f32 {
    if n == 0 {
        return 0.0;
    }
    (0.7 + 0.05 * n as f32).min(0.95)
}

fn preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

fn section_label(s: &str) -> &str {
    if s.trim().is_empty() { "N/A" } else { s }
}

/// Retrieval followed by generation with the active generator.
pub struct AnswerService {
    retriever: DiversityRetriever,
}

impl AnswerService {
    pub fn new(retriever: DiversityRetriever) -> Self { Self { retriever } }

    pub fn retriever(&self) -> &DiversityRetriever { &self.retriever }

    /// `history` is the conversation so far, oldest first.
    pub async fn answer(&self, question: &str, history: &[Turn]) -> Result<Answer> {
        let result = self.retriever.ask(question, None).await?;
        if result.is_empty() {
            info!("no context retrieved, answering with fallback");
            return Ok(Answer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
                confidence: 0.0,
                generator_id: None,
            });
        }

        let prompt = compose_prompt(question, &result, history);
        let generator = self.retriever.registry().generator().await?;
        debug!(generator = generator.generator_id(), prompt_chars = prompt.chars().count(), "generating answer");
        let answer = generator.generate(&prompt).await?;

        Ok(Answer {
            answer: answer.trim().to_string(),
            sources: sources(&result),
            confidence: confidence(result.len()),
            generator_id: Some(generator.generator_id().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankrag_core::metadata::MetadataExtractor;
    use bankrag_core::types::{Chunk, ScoredChunk};

    fn hit(id: &str, headers: &[&str], content: &str, score: f32) -> ScoredChunk {
        let chunk = Chunk {
            id: id.to_string(),
            doc_id: "productos".to_string(),
            doc_path: "/docs/productos.md".to_string(),
            source: "productos.md".to_string(),
            header_path: headers.iter().map(|h| (*h).to_string()).collect(),
            content: content.to_string(),
            chunk_index: 0,
            total_chunks: 1,
            segment_index: 0,
            char_len: content.chars().count(),
            oversized: false,
            content_hash: String::new(),
        };
        let metadata = MetadataExtractor::new().extract(&chunk);
        ScoredChunk { chunk, metadata, score }
    }

    #[test]
    fn context_numbers_sources_and_separates_blocks() {
        let result = RetrievalResult {
            hits: vec![
                hit("a_0_0", &["CDT"], "Un CDT es renta fija.", 0.9),
                hit("b_0_0", &[], "Texto sin encabezado.", 0.5),
            ],
        };
        let ctx = format_context(&result);
        assert_eq!(ctx, "[Fuente 1 - CDT]\nUn CDT es renta fija.\n\n---\n\n[Fuente 2 - General]\nTexto sin encabezado.");

        let prompt = compose_prompt("¿Qué es un CDT?", &result, &[]);
        assert!(prompt.contains("PREGUNTA: ¿Qué es un CDT?"));
        assert!(prompt.contains("[Fuente 2 - General]"));
        assert!(!prompt.contains("{context}"));
    }

    #[test]
    fn previews_are_cut_at_400_chars() {
        let long = "ñ".repeat(450);
        let result = RetrievalResult { hits: vec![hit("a_0_0", &["CDT", "Tasas"], &long, 0.8)] };
        let src = sources(&result);
        assert_eq!(src[0].id, 1);
        assert_eq!(src[0].subsection, "Tasas");
        assert_eq!(src[0].content.chars().count(), PREVIEW_CHARS + 3);
        assert!(src[0].content.ends_with("..."));

        let short = RetrievalResult { hits: vec![hit("a_0_0", &[], "corto", 0.8)] };
        assert_eq!(sources(&short)[0].content, "corto");
    }

    #[test]
    fn confidence_grows_with_sources_and_caps() {
        assert_eq!(confidence(0), 0.0);
        assert!((confidence(1) - 0.75).abs() < 1e-6);
        assert!((confidence(3) - 0.85).abs() < 1e-6);
        assert!((confidence(10) - 0.95).abs() < 1e-6);
    }

    #[test]
    fn empty_history_marks_the_first_question() {
        assert_eq!(format_history(&[]), NO_HISTORY);
        let result = RetrievalResult { hits: vec![hit("a_0_0", &["CDT"], "Un CDT es renta fija.", 0.9)] };
        let prompt = compose_prompt("¿Qué es un CDT?", &result, &[]);
        assert!(prompt.contains("HISTORIAL: Primera pregunta del usuario.\n\nCONTEXTO: [Fuente 1 - CDT]"));
    }

    #[test]
    fn history_keeps_only_the_last_three_turns() {
        let history = vec![
            Turn::user("¿Tienen cuentas de ahorro?"),
            Turn::assistant("Sí, la cuenta de ahorros no tiene cuota de manejo."),
            Turn::user("¿Y CDT?"),
            Turn::assistant("Sí, desde 30 días."),
        ];
        assert_eq!(
            format_history(&history),
            "Asistente: Sí, la cuenta de ahorros no tiene cuota de manejo.\nUsuario: ¿Y CDT?\nAsistente: Sí, desde 30 días."
        );

        let result = RetrievalResult { hits: vec![hit("a_0_0", &["CDT"], "Un CDT es renta fija.", 0.9)] };
        let prompt = compose_prompt("¿Cuál es el monto mínimo?", &result, &history);
        assert!(prompt.contains("HISTORIAL: Asistente: Sí, la cuenta de ahorros"));
        assert!(!prompt.contains("¿Tienen cuentas de ahorro?"));
    }

    #[test]
    fn turns_serialize_with_lowercase_roles() {
        let json = serde_json::to_string(&Turn::assistant("hola")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hola"}"#);
    }
}
