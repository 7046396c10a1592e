use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::utils::http::build_ai_client;

const GEMINI_MODEL: &str = "gemini-2.5-flash";
const REQUEST_TIMEOUT_SECS: u64 = 20;

/// Per-symbol outcome of one batched price fetch. None price = unresolved.
/// The source fields carry the shared attribution for the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    pub symbol: String,
    pub price: Option<f64>,
    /// Resolved display name, or the symbol itself when none was found.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
}

// ========== Gemini generateContent wire types ==========

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    tools: Vec<Tool>,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct Tool {
    google_search: EmptyObject,
}

#[derive(Serialize)]
struct EmptyObject {}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "groundingMetadata")]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct GroundingMetadata {
    #[serde(rename = "groundingChunks")]
    grounding_chunks: Option<Vec<GroundingChunk>>,
}

#[derive(Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Deserialize)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

/// Shape the model is asked to produce for each symbol.
#[derive(Deserialize)]
struct SymbolQuote {
    price: f64,
    #[serde(default)]
    name: Option<String>,
}

/// One citation shared by every result of a batch.
#[derive(Debug, Clone, Default)]
struct BatchAttribution {
    url: Option<String>,
    title: Option<String>,
}

pub struct PriceService;

impl PriceService {
    /// Fetch current prices for a set of unique symbols in one batched,
    /// search-grounded request. Always returns one result per input symbol;
    /// an individual symbol that cannot be resolved yields an unresolved
    /// result rather than an error. Only network/timeout/HTTP-level problems
    /// fail the whole batch.
    pub async fn fetch_prices(symbols: &[String], api_key: &str) -> Result<Vec<PriceUpdate>> {
        if symbols.is_empty() {
            return Ok(vec![]);
        }

        let client = build_ai_client(REQUEST_TIMEOUT_SECS)?;
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            GEMINI_MODEL,
            urlencoding::encode(api_key)
        );

        let req = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: build_price_prompt(symbols),
                }],
            }],
            tools: vec![Tool {
                google_search: EmptyObject {},
            }],
        };

        // Hard cap racing the whole round-trip; on expiry the batch fails as
        // a unit, no partial results are salvaged here.
        let body = tokio::time::timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS), async {
            let resp = client.post(&url).json(&req).send().await?;
            let status = resp.status();
            let body = resp.text().await?;
            if !status.is_success() {
                return Err(anyhow!(
                    "price API error ({}): {}",
                    status,
                    &body[..200.min(body.len())]
                ));
            }
            Ok(body)
        })
        .await
        .map_err(|_| anyhow!("price request timed out after {}s", REQUEST_TIMEOUT_SECS))??;

        let response: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow!("price response parse error: {} body: {}", e, &body[..200.min(body.len())]))?;

        let candidate = response.candidates.and_then(|c| c.into_iter().next());
        let raw_text = candidate
            .as_ref()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.as_ref())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let attribution = candidate
            .and_then(|c| c.grounding_metadata)
            .and_then(|m| m.grounding_chunks)
            .unwrap_or_default()
            .into_iter()
            .find_map(|chunk| chunk.web)
            .map(|web| BatchAttribution {
                url: web.uri,
                title: web.title,
            })
            .unwrap_or_default();

        Ok(parse_batch(symbols, &raw_text, &attribution))
    }
}

fn build_price_prompt(symbols: &[String]) -> String {
    format!(
        "Find the current market price for each of these financial instrument symbols \
         (stocks, crypto or FX pairs): {}.\n\
         Respond with ONLY a raw JSON object, no markdown fences and no commentary, \
         mapping each symbol to an object with a \"price\" field (number, the latest \
         traded price) and a \"name\" field (string, the company or instrument name). \
         Example: {{\"AAPL\": {{\"price\": 123.45, \"name\": \"Apple Inc.\"}}}}. \
         Omit any symbol you cannot find a price for.",
        symbols.join(", ")
    )
}

/// Turn the model's raw answer into one result per requested symbol.
/// Strict JSON first; if that fails, per-symbol fragment extraction over the
/// untrusted text. Fragments for symbols nobody asked about are ignored.
fn parse_batch(symbols: &[String], raw: &str, source: &BatchAttribution) -> Vec<PriceUpdate> {
    let cleaned = strip_code_fences(raw);
    let strict: Option<HashMap<String, SymbolQuote>> = serde_json::from_str(&cleaned)
        .ok()
        .map(|map: HashMap<String, SymbolQuote>| {
            map.into_iter().map(|(k, v)| (k.to_uppercase(), v)).collect()
        });

    symbols
        .iter()
        .map(|symbol| {
            let (price, name) = match &strict {
                Some(map) => match map.get(&symbol.to_uppercase()) {
                    Some(quote) => (
                        Some(quote.price).filter(|p| p.is_finite() && *p > 0.0),
                        quote.name.clone().filter(|n| !n.is_empty()),
                    ),
                    None => (None, None),
                },
                None => extract_symbol_fragment(raw, symbol),
            };
            PriceUpdate {
                symbol: symbol.clone(),
                price,
                name: name.unwrap_or_else(|| symbol.clone()),
                source_url: source.url.clone(),
                source_title: source.title.clone(),
            }
        })
        .collect()
}

/// Remove markdown fence artifacts and any prose around the JSON object by
/// slicing to the outermost braces.
fn strip_code_fences(text: &str) -> String {
    let stripped = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    if let (Some(start), Some(end)) = (stripped.find('{'), stripped.rfind('}')) {
        if start < end {
            return stripped[start..=end].to_string();
        }
    }
    stripped.to_string()
}

/// Look for a `"SYM": { ... "price": ... }` fragment for one symbol. The
/// symbol is escaped before it is embedded in the pattern: the remote text is
/// untrusted, and a symbol like "BRK.B" or "BTC(USD)" must not be able to
/// break the expression. Failure here leaves the one symbol unresolved, it
/// never aborts the batch.
fn extract_symbol_fragment(raw: &str, symbol: &str) -> (Option<f64>, Option<String>) {
    let pattern = format!(
        r#"(?is)"{}"\s*:\s*\{{([^{{}}]*)\}}"#,
        regex::escape(symbol)
    );
    let fragment_re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(_) => return (None, None),
    };
    let body = match fragment_re.captures(raw).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().to_string(),
        None => return (None, None),
    };

    let price = Regex::new(r#"(?i)"price"\s*:\s*"?\$?(-?[0-9][0-9,]*(?:\.[0-9]+)?)"#)
        .ok()
        .and_then(|re| re.captures(&body).and_then(|c| c.get(1).map(|m| m.as_str().to_string())))
        .and_then(|s| s.replace(',', "").parse::<f64>().ok())
        .filter(|p| p.is_finite() && *p > 0.0);

    let name = Regex::new(r#"(?i)"name"\s*:\s*"([^"]*)""#)
        .ok()
        .and_then(|re| re.captures(&body).and_then(|c| c.get(1).map(|m| m.as_str().to_string())))
        .filter(|n| !n.is_empty());

    (price, name)
}
