//! URL path templates such as `/api/v{version}/{owner}/{repo}/tags`.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Placeholder values parsed from a path, keyed by placeholder name.
pub type TemplateValues = HashMap<String, String>;

/// Matches one `{name}` placeholder. `{}` is matched too and then skipped,
/// which leaves it in the pattern as literal text.
fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{(\w*)\}").expect("placeholder pattern is valid"))
}

/// Capture group substituted for each placeholder: one path segment.
const SEGMENT_CAPTURE: &str = "([^/]*)";

/// A compiled path template.
#[derive(Clone, Debug)]
pub struct PathTemplate {
    template: String,
    variables: Vec<String>,
    pattern: Regex,
}

impl PathTemplate {
    /// Compile a template.
    ///
    /// Placeholders are substituted right to left so that each replacement
    /// leaves the offsets of the ones before it untouched; names are then
    /// reported left to right.
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();

        let mut variables = Vec::new();
        let mut pieces = Vec::new();
        let mut literal_end = template.len();

        for found in placeholder_regex().captures_iter(&template).collect::<Vec<_>>().into_iter().rev() {
            let (Some(whole), Some(name)) = (found.get(0), found.get(1)) else {
                continue;
            };
            if name.as_str().is_empty() {
                continue;
            }
            pieces.push(regex::escape(&template[whole.end()..literal_end]));
            pieces.push(SEGMENT_CAPTURE.to_string());
            variables.push(name.as_str().to_string());
            literal_end = whole.start();
        }
        pieces.push(regex::escape(&template[..literal_end]));

        pieces.reverse();
        variables.reverse();

        let pattern = Regex::new(&format!("^{}$", pieces.concat()))
            .expect("escaped template always forms a valid pattern");

        Self {
            template,
            variables,
            pattern,
        }
    }

    /// The template source.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Placeholder names in declaration order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Check if the whole path matches the template.
    ///
    /// A query string or fragment on `path` is ignored.
    pub fn matches(&self, path: &str) -> bool {
        self.pattern.is_match(strip_query(path))
    }

    /// Parse placeholder values from a path.
    ///
    /// Returns an empty map when the template has no placeholders or the
    /// path does not match.
    pub fn extract(&self, path: &str) -> TemplateValues {
        let mut values = TemplateValues::new();
        if self.variables.is_empty() {
            return values;
        }
        let Some(captures) = self.pattern.captures(strip_query(path)) else {
            return values;
        };
        for (name, value) in self.variables.iter().zip(captures.iter().skip(1)) {
            if let Some(value) = value {
                values.insert(name.clone(), value.as_str().to_string());
            }
        }
        values
    }
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}
