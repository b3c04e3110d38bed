use serde::{Deserialize, Serialize};

/// Upper bound on ranked store links kept from a model answer.
pub const MAX_STORE_LINKS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLink {
    pub name: String,
    pub url: String,
}

/// Identification of a typeface as returned by the model, after validation.
///
/// Field names follow the wire contract (`fontName`, `storeLinks`) so the
/// value serializes back into the same shape the model produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontAnalysisResult {
    pub font_name: String,
    pub description: String,
    pub store_links: Vec<StoreLink>,
}

impl FontAnalysisResult {
    /// Keeps the first `max` links in model ranking order and returns how
    /// many were dropped.
    pub fn truncate_store_links(&mut self, max: usize) -> usize {
        let dropped = self.store_links.len().saturating_sub(max);
        self.store_links.truncate(max);
        dropped
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub result: FontAnalysisResult,
    pub model: String,
    pub prompt_version: String,
    pub image_count: usize,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{AnalysisReport, FontAnalysisResult, StoreLink, MAX_STORE_LINKS};

    fn link(name: &str) -> StoreLink {
        StoreLink {
            name: name.to_string(),
            url: format!("https://{}.example/font", name.to_ascii_lowercase()),
        }
    }

    #[test]
    fn result_uses_camel_case_wire_names() -> anyhow::Result<()> {
        let result = FontAnalysisResult {
            font_name: "Futura PT".to_string(),
            description: "Geometric sans.".to_string(),
            store_links: vec![link("MyFonts")],
        };
        let value = serde_json::to_value(&result)?;
        assert_eq!(value["fontName"], json!("Futura PT"));
        assert_eq!(value["storeLinks"][0]["name"], json!("MyFonts"));
        assert!(value.get("font_name").is_none());
        Ok(())
    }

    #[test]
    fn truncate_keeps_ranking_order() {
        let mut result = FontAnalysisResult {
            font_name: "Inter".to_string(),
            description: String::new(),
            store_links: vec![link("A"), link("B"), link("C"), link("D"), link("E")],
        };
        assert_eq!(result.truncate_store_links(MAX_STORE_LINKS), 2);
        let names: Vec<&str> = result
            .store_links
            .iter()
            .map(|link| link.name.as_str())
            .collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(result.truncate_store_links(MAX_STORE_LINKS), 0);
    }

    #[test]
    fn report_defaults_missing_warnings() -> anyhow::Result<()> {
        let raw = json!({
            "result": {"fontName": "Lato", "description": "", "storeLinks": []},
            "model": "gemini-2.5-flash",
            "prompt_version": "font-id/v1",
            "image_count": 1,
            "elapsed_ms": 12,
        });
        let report: AnalysisReport = serde_json::from_value(raw)?;
        assert!(report.warnings.is_empty());
        let back: Value = serde_json::to_value(&report)?;
        assert_eq!(back["result"]["fontName"], json!("Lato"));
        Ok(())
    }
}
