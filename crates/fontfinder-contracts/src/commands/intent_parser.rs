use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, MULTI_PATH_COMMANDS, NO_ARG_COMMANDS, RAW_ARG_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            command_args: BTreeMap::new(),
        }
    }

    pub fn paths(&self) -> Vec<String> {
        self.command_args
            .get("paths")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn arg(&self, key: &str) -> Option<&str> {
        self.command_args
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn paths_intent(action: &str, text: &str, arg: &str) -> Intent {
    let mut intent = Intent::new(action, text);
    intent.command_args.insert(
        "paths".to_string(),
        Value::Array(
            parse_path_args(arg)
                .into_iter()
                .map(Value::String)
                .collect(),
        ),
    );
    intent
}

/// Parses one line of session input. Slash commands map through the command
/// registry; any other text is treated as pasted or dropped file paths.
pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        let remainder = &slash_tail[command_len..];
        // An absolute path like `/tmp/specimen.png` is input, not a command.
        let looks_like_path = remainder.starts_with('/') || remainder.starts_with('.');
        if command_len > 0 && !looks_like_path {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = remainder.trim();

            if let Some(action) = find_action(&command, RAW_ARG_COMMANDS) {
                let key = if action == "set_model" { "model" } else { "id" };
                let mut intent = Intent::new(action, text);
                intent
                    .command_args
                    .insert(key.to_string(), Value::String(arg.to_string()));
                return intent;
            }

            if let Some(action) = find_action(&command, MULTI_PATH_COMMANDS) {
                return paths_intent(action, text, arg);
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    paths_intent("add_images", text, raw_trimmed)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_intent;

    #[test]
    fn parse_add_quoted_paths() {
        let intent = parse_intent("/add \"/tmp/a b.png\" c.jpg");
        assert_eq!(intent.action, "add_images");
        assert_eq!(intent.paths(), vec!["/tmp/a b.png", "c.jpg"]);
    }

    #[test]
    fn bare_text_is_treated_as_dropped_paths() {
        let intent = parse_intent("  '/Users/me/Font Sample.png'  ");
        assert_eq!(intent.action, "add_images");
        assert_eq!(intent.paths(), vec!["/Users/me/Font Sample.png"]);
    }

    #[test]
    fn absolute_paths_are_not_commands() {
        let intent = parse_intent("/tmp/specimen.png /tmp/other.webp");
        assert_eq!(intent.action, "add_images");
        assert_eq!(intent.paths(), vec!["/tmp/specimen.png", "/tmp/other.webp"]);

        let dotted = parse_intent("/specimen.png");
        assert_eq!(dotted.action, "add_images");
    }

    #[test]
    fn unbalanced_quotes_fall_back_to_whitespace_split() {
        let intent = parse_intent("/add \"a.png b.png");
        assert_eq!(intent.paths(), vec!["\"a.png", "b.png"]);
    }

    #[test]
    fn parse_remove_and_model() {
        let remove = parse_intent("/remove 1f0c");
        assert_eq!(remove.action, "remove_image");
        assert_eq!(remove.arg("id"), Some("1f0c"));

        let alias = parse_intent("/rm 2");
        assert_eq!(alias.action, "remove_image");
        assert_eq!(alias.arg("id"), Some("2"));

        let model = parse_intent("/model gemini-2.5-pro");
        assert_eq!(model.action, "set_model");
        assert_eq!(model.arg("model"), Some("gemini-2.5-pro"));

        assert_eq!(parse_intent("/model").arg("model"), None);
    }

    #[test]
    fn parse_no_arg_commands() {
        assert_eq!(parse_intent("/analyze").action, "analyze");
        assert_eq!(parse_intent("/LIST").action, "list_images");
        assert_eq!(parse_intent("/ls").action, "list_images");
        assert_eq!(parse_intent("/clear").action, "clear_images");
        assert_eq!(parse_intent("/exit").action, "quit");
        assert_eq!(parse_intent("   ").action, "noop");
    }

    #[test]
    fn parse_unknown_command() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args["command"], json!("magic"));
        assert_eq!(intent.command_args["arg"], json!("foo bar"));
    }
}
