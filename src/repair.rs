// Best-effort cleanup for the text the model sends back. The model tends to
// sprinkle line breaks through the JSON and leave a trailing comma before a
// closing brace or bracket; both make serde_json bail. This is a targeted
// fix for those two defects, not a JSON5 parser.

use regex::Regex;

pub fn repair_json(raw: &str) -> String {
    // Line breaks first, commas second, same order as the substitutions
    // were originally tuned in.
    let flattened: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .collect();

    let comma_brace = Regex::new(r",\s*\}").unwrap();
    let comma_bracket = Regex::new(r",\s*\]").unwrap();

    let fixed = comma_brace.replace_all(&flattened, "}");
    let fixed = comma_bracket.replace_all(&fixed, "]");

    fixed.trim().to_string()
}
