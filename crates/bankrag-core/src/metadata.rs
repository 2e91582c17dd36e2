//! Banking-domain metadata extraction and the scalar serialization boundary.
//!
//! [`Metadata`] is the typed in-memory form. Index backends only take scalar
//! columns, so [`Metadata::flatten`] turns list/map fields into canonical JSON
//! (sorted keys, sorted keyword lists) and [`Metadata::from_flat`] reverses it.
//! Flattening the same metadata twice yields byte-identical output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::{Chunk, TaggedChunk};

pub const KEY_KEYWORDS: &str = "keywords";
pub const KEY_CATEGORY: &str = "category";
pub const KEY_CONTENT_TYPE: &str = "content_type";
pub const KEY_PRIORITY: &str = "priority";
pub const KEY_HEADER_PATH: &str = "header_path";
pub const KEY_SECTION: &str = "section";
pub const KEY_SUBSECTION: &str = "subsection";
pub const KEY_HAS_KEYWORDS: &str = "has_keywords";

pub const CATEGORY_GENERAL: &str = "general";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Matched keywords grouped by keyword family; lists are sorted and unique.
    pub keywords: BTreeMap<String, Vec<String>>,
    pub category: String,
    pub content_type: String,
    /// 1..=5, consulted only to break exact ties.
    pub priority: u8,
    pub header_path: Vec<String>,
    pub section: String,
    pub subsection: String,
}

/// A scalar metadata value as accepted by the index storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Str(String),
}

pub type FlatMetadata = BTreeMap<String, Scalar>;

impl Metadata {
    pub fn keyword_count(&self) -> usize { self.keywords.values().map(Vec::len).sum() }

    /// All matched keywords across families, sorted.
    pub fn all_keywords(&self) -> Vec<&str> {
        let mut all: Vec<&str> = self.keywords.values().flatten().map(String::as_str).collect();
        all.sort_unstable();
        all.dedup();
        all
    }

    pub fn keywords_json(&self) -> Result<String> { Ok(serde_json::to_string(&self.keywords)?) }

    pub fn header_path_json(&self) -> Result<String> { Ok(serde_json::to_string(&self.header_path)?) }

    pub fn flatten(&self) -> Result<FlatMetadata> {
        let mut flat = FlatMetadata::new();
        flat.insert(KEY_KEYWORDS.to_string(), Scalar::Str(self.keywords_json()?));
        flat.insert(KEY_CATEGORY.to_string(), Scalar::Str(self.category.clone()));
        flat.insert(KEY_CONTENT_TYPE.to_string(), Scalar::Str(self.content_type.clone()));
        flat.insert(KEY_PRIORITY.to_string(), Scalar::Int(i64::from(self.priority)));
        flat.insert(KEY_HEADER_PATH.to_string(), Scalar::Str(self.header_path_json()?));
        flat.insert(KEY_SECTION.to_string(), Scalar::Str(self.section.clone()));
        flat.insert(KEY_SUBSECTION.to_string(), Scalar::Str(self.subsection.clone()));
        flat.insert(KEY_HAS_KEYWORDS.to_string(), Scalar::Bool(self.keyword_count() > 0));
        Ok(flat)
    }

    pub fn from_flat(flat: &FlatMetadata) -> Result<Self> {
        let keywords: BTreeMap<String, Vec<String>> = serde_json::from_str(str_field(flat, KEY_KEYWORDS)?)?;
        let header_path: Vec<String> = serde_json::from_str(str_field(flat, KEY_HEADER_PATH)?)?;
        let priority = match flat.get(KEY_PRIORITY) {
            Some(Scalar::Int(p)) => u8::try_from(*p)
                .map_err(|_| Error::Storage(format!("metadata priority {p} out of range")))?,
            _ => return Err(Error::Storage(format!("metadata field '{KEY_PRIORITY}' missing or not an integer"))),
        };
        Ok(Self {
            keywords,
            category: str_field(flat, KEY_CATEGORY)?.to_string(),
            content_type: str_field(flat, KEY_CONTENT_TYPE)?.to_string(),
            priority,
            header_path,
            section: str_field(flat, KEY_SECTION)?.to_string(),
            subsection: str_field(flat, KEY_SUBSECTION)?.to_string(),
        })
    }
}

fn str_field<'a>(flat: &'a FlatMetadata, key: &str) -> Result<&'a str> {
    match flat.get(key) {
        Some(Scalar::Str(s)) => Ok(s),
        _ => Err(Error::Storage(format!("metadata field '{key}' missing or not a string"))),
    }
}

/// Category rule: matches when the header path or the keyword hits mention any term.
struct CategoryRule {
    category: &'static str,
    header_terms: &'static [&'static str],
    keyword_terms: &'static [&'static str],
}

const KEYWORDS: &[(&str, &[&str])] = &[
    ("productos", &["cuenta", "cuenta de ahorros", "cuenta corriente", "tarjeta", "tarjeta de crédito", "tarjeta débito", "crédito", "préstamo", "hipoteca", "hipotecario", "leasing"]),
    ("inversiones", &["cdt", "certificado de depósito", "renta fija", "bono", "fondo de inversión", "fiducia", "acciones", "inversión", "inversiones", "rentabilidad"]),
    ("servicios", &["transferencia", "pago", "consulta", "retiro", "depósito", "giro"]),
    ("canales", &["digital", "móvil", "app", "sucursal", "cajero", "portal", "línea telefónica"]),
    ("seguridad", &["clave", "token", "biometría", "seguridad", "verificación", "fraude"]),
];

const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule { category: "faq", header_terms: &["faq", "preguntas frecuentes"], keyword_terms: &[] },
    CategoryRule { category: "inversiones_renta_fija", header_terms: &["cdt", "renta fija"], keyword_terms: &["cdt", "certificado de depósito", "renta fija", "bono"] },
    CategoryRule { category: "inversiones", header_terms: &["inversiones", "fondos"], keyword_terms: &["fondo de inversión", "fiducia", "acciones", "inversión", "inversiones", "rentabilidad"] },
    CategoryRule { category: "tarjetas", header_terms: &["tarjeta"], keyword_terms: &["tarjeta", "tarjeta de crédito", "tarjeta débito"] },
    CategoryRule { category: "creditos", header_terms: &["crédito", "préstamo"], keyword_terms: &["crédito", "préstamo", "hipoteca", "hipotecario", "leasing"] },
    CategoryRule { category: "cuentas", header_terms: &["cuenta"], keyword_terms: &["cuenta", "cuenta de ahorros", "cuenta corriente"] },
    CategoryRule { category: "seguridad", header_terms: &["seguridad"], keyword_terms: &["clave", "token", "biometría", "seguridad", "verificación", "fraude"] },
    CategoryRule { category: "canales", header_terms: &["canales"], keyword_terms: &["digital", "móvil", "app", "sucursal", "cajero", "portal", "línea telefónica"] },
    CategoryRule { category: "servicios", header_terms: &["servicios"], keyword_terms: &["transferencia", "pago", "consulta", "retiro", "depósito", "giro"] },
];

const CONTENT_TYPES: &[(&str, &[&str])] = &[
    ("requirements", &["requisito", "documento", "necesita"]),
    ("pricing", &["tarifa", "costo", "precio", "comisión"]),
    ("procedure", &["proceso", "paso", "cómo", "procedimiento"]),
    ("features", &["beneficio", "ventaja", "característica"]),
];

const IMPORTANT_SECTIONS: &[&str] = &["productos", "servicios", "seguridad", "requisitos"];

/// Tags chunks with keyword hits, category, content type and priority.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataExtractor;

impl MetadataExtractor {
    pub fn new() -> Self { Self }

    pub fn extract(&self, chunk: &Chunk) -> Metadata {
        let content = chunk.content.to_lowercase();
        let headers = chunk.header_path.join(" / ").to_lowercase();

        let mut keywords: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (family, terms) in KEYWORDS {
            let mut found: Vec<String> = terms
                .iter()
                .filter(|t| contains_term(&content, t))
                .map(|t| (*t).to_string())
                .collect();
            if !found.is_empty() {
                found.sort();
                found.dedup();
                keywords.insert((*family).to_string(), found);
            }
        }

        let hits: Vec<&str> = keywords.values().flatten().map(String::as_str).collect();
        let category = CATEGORY_RULES
            .iter()
            .find(|rule| {
                rule.header_terms.iter().any(|t| contains_term(&headers, t))
                    || rule.keyword_terms.iter().any(|t| hits.contains(t))
            })
            .map_or(CATEGORY_GENERAL, |rule| rule.category)
            .to_string();

        let content_type = CONTENT_TYPES
            .iter()
            .find(|(_, words)| words.iter().any(|w| contains_term(&content, w)))
            .map_or("general", |(kind, _)| *kind)
            .to_string();

        let section = chunk.header_path.first().cloned().unwrap_or_else(|| "General".to_string());
        let subsection = chunk.header_path.get(1).cloned().unwrap_or_else(|| "N/A".to_string());

        let mut priority: u8 = 3;
        let section_lower = section.to_lowercase();
        if IMPORTANT_SECTIONS.iter().any(|s| section_lower.contains(s)) {
            priority += 1;
        }
        if chunk.char_len > 1000 {
            priority += 1;
        }

        Metadata {
            keywords,
            category,
            content_type,
            priority: priority.min(5),
            header_path: chunk.header_path.clone(),
            section,
            subsection,
        }
    }

    pub fn tag(&self, chunk: Chunk) -> TaggedChunk {
        let metadata = self.extract(&chunk);
        TaggedChunk { chunk, metadata }
    }
}

/// Term match on a word boundary at the start; the end may carry a plural
/// `s`/`es` before the closing boundary (`cdt` matches `CDTs`, `acciones`
/// does not match `transacciones`). Both inputs must already be lowercase.
pub fn contains_term(haystack: &str, term: &str) -> bool {
    haystack.match_indices(term).any(|(at, _)| {
        let before_ok = haystack[..at].chars().next_back().map_or(true, |c| !c.is_alphanumeric());
        let rest = &haystack[at + term.len()..];
        let rest = rest.strip_prefix("es").or_else(|| rest.strip_prefix('s')).filter(|r| {
            r.chars().next().map_or(true, |c| !c.is_alphanumeric())
        }).unwrap_or(rest);
        let after_ok = rest.chars().next().map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(headers: &[&str], content: &str) -> Chunk {
        Chunk {
            id: "doc_0_0".to_string(),
            doc_id: "doc".to_string(),
            doc_path: "/docs/doc.md".to_string(),
            source: "doc.md".to_string(),
            header_path: headers.iter().map(|h| (*h).to_string()).collect(),
            content: content.to_string(),
            chunk_index: 0,
            total_chunks: 1,
            segment_index: 0,
            char_len: content.chars().count(),
            oversized: false,
            content_hash: String::new(),
        }
    }

    #[test]
    fn term_matching_respects_word_boundaries() {
        assert!(contains_term("los cdts del banco", "cdt"));
        assert!(contains_term("abrir una cuenta.", "cuenta"));
        assert!(contains_term("varias cuentas", "cuenta"));
        assert!(!contains_term("transacciones diarias", "acciones"));
        assert!(!contains_term("descuenta", "cuenta"));
    }

    #[test]
    fn faq_header_wins_over_keyword_rules() {
        let meta = MetadataExtractor::new().extract(&chunk(
            &["Preguntas Frecuentes", "CDT"],
            "¿Puedo cancelar mi CDT antes del vencimiento?",
        ));
        assert_eq!(meta.category, "faq");
        assert_eq!(meta.keywords.get("inversiones"), Some(&vec!["cdt".to_string()]));
    }

    #[test]
    fn cdt_content_is_fixed_income() {
        let meta = MetadataExtractor::new().extract(&chunk(
            &["Productos", "Inversiones"],
            "Un CDT es un certificado de depósito a término con tasa fija. Requisito: cédula.",
        ));
        assert_eq!(meta.category, "inversiones_renta_fija");
        assert_eq!(meta.content_type, "requirements");
        assert_eq!(meta.section, "Productos");
        assert_eq!(meta.subsection, "Inversiones");
        assert_eq!(meta.priority, 4);
    }

    #[test]
    fn unmatched_content_is_general() {
        let meta = MetadataExtractor::new().extract(&chunk(&[], "Bienvenido."));
        assert_eq!(meta.category, CATEGORY_GENERAL);
        assert_eq!(meta.content_type, "general");
        assert_eq!(meta.section, "General");
        assert_eq!(meta.subsection, "N/A");
        assert_eq!(meta.priority, 3);
        assert!(meta.keywords.is_empty());
    }

    #[test]
    fn flatten_round_trips_and_is_canonical() {
        let extractor = MetadataExtractor::new();
        let c = chunk(&["Servicios", "Pagos"], "Pagos y transferencias desde la app móvil con token.");
        let meta = extractor.extract(&c);
        let flat = meta.flatten().expect("flatten");
        assert_eq!(flat.get(KEY_PRIORITY), Some(&Scalar::Int(i64::from(meta.priority))));
        assert_eq!(flat.get(KEY_HAS_KEYWORDS), Some(&Scalar::Bool(true)));
        assert_eq!(Metadata::from_flat(&flat).expect("unflatten"), meta);

        let again = extractor.extract(&c).flatten().expect("flatten");
        assert_eq!(serde_json::to_string(&flat).unwrap(), serde_json::to_string(&again).unwrap());
    }

    #[test]
    fn from_flat_reports_missing_fields() {
        let mut flat = MetadataExtractor::new().extract(&chunk(&[], "texto")).flatten().unwrap();
        flat.remove(KEY_CATEGORY);
        assert!(matches!(Metadata::from_flat(&flat), Err(Error::Storage(_))));
    }
}
