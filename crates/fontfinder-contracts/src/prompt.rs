//! The request contract sent with every analysis: instruction text plus the
//! response schema. Changing either one means bumping [`PROMPT_VERSION`].

use serde_json::{json, Value};

pub const PROMPT_VERSION: &str = "font-id/v1";

pub const RESPONSE_MIME_TYPE: &str = "application/json";

pub const FONT_ANALYSIS_INSTRUCTION: &str = "Analyze the following images which all feature the same font. Your task is to:
1.  Identify the name of the font. If it's a very common font, be specific (e.g., \"Helvetica Neue\" instead of just \"Helvetica\").
2.  Provide a brief, one or two-sentence description of its key characteristics (e.g., \"A geometric sans-serif with a clean and modern appearance.\").
3.  Provide a list of up to 3 URLs where this font can be downloaded or purchased. Prioritize official sources like Google Fonts, Adobe Fonts, MyFonts, or the foundry's own website.

Format your response as a single, valid JSON object matching the provided schema. Do not include any markdown formatting or the json code block syntax.";

/// Response schema in the Gemini OpenAPI subset (upper-case type names).
pub fn font_analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "fontName": {
                "type": "STRING",
                "description": "The identified name of the font.",
            },
            "description": {
                "type": "STRING",
                "description": "A brief description of the font's characteristics.",
            },
            "storeLinks": {
                "type": "ARRAY",
                "description": "A list of URLs to font stores.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": {
                            "type": "STRING",
                            "description": "The name of the font store (e.g., \"Google Fonts\").",
                        },
                        "url": {
                            "type": "STRING",
                            "description": "The direct URL to the font page.",
                        },
                    },
                    "required": ["name", "url"],
                },
            },
        },
        "required": ["fontName", "description", "storeLinks"],
    })
}
