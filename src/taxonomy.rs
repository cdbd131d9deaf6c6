// Static field taxonomy: maps a subject-field name to either a list of
// keywords or a list of paper identifiers. Loaded once at startup and never
// mutated; a missing or broken file just disables filtering.

use regex::Regex;
use std::collections::HashMap;
use std::fs;

use crate::recommend::Paper;

pub const ALL_FIELDS: &str = "All Fields";

// The model is asked for exactly this many papers, and the filter pads
// back up to it when too few match.
pub const TARGET_RESULTS: usize = 10;

#[derive(Debug, Default, Clone)]
pub struct Taxonomy {
    fields: HashMap<String, Vec<String>>,
}

impl Taxonomy {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_map(fields: HashMap<String, Vec<String>>) -> Self {
        Self { fields }
    }

    // Fail-soft: any problem reading or parsing the file leaves an empty
    // taxonomy, which turns filtering into a no-op.
    pub fn load(path: &str) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Taxonomy not loaded ({}): {}. Field filtering disabled.", path, e);
                return Self::empty();
            }
        };

        match serde_json::from_str::<HashMap<String, Vec<String>>>(&contents) {
            Ok(fields) => {
                println!("Loaded taxonomy with {} fields from {}", fields.len(), path);
                Self { fields }
            }
            Err(e) => {
                eprintln!("Taxonomy file {} is not valid: {}. Field filtering disabled.", path, e);
                Self::empty()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    // Narrow `papers` to the ones classified under `field`, then pad back up
    // to TARGET_RESULTS with the highest-index unmatched papers, appended in
    // their original order. No re-ranking, no duplicates, and the result
    // never exceeds the input count. Unknown fields are a no-op.
    pub fn filter(&self, field: &str, papers: Vec<Paper>) -> Vec<Paper> {
        let terms = match self.fields.get(field) {
            Some(t) if !t.is_empty() => t,
            _ => return papers,
        };

        let id_shaped = Regex::new(r"^paper_\d+$").unwrap();
        let by_identifier = terms.iter().all(|t| id_shaped.is_match(t));

        let (matched, unmatched): (Vec<Paper>, Vec<Paper>) =
            papers.into_iter().partition(|p| {
                if by_identifier {
                    terms.iter().any(|t| t == &p.paper_id)
                } else {
                    let title = p.title.to_lowercase();
                    let abstract_text = p.abstract_text.to_lowercase();
                    terms.iter().any(|t| {
                        let kw = t.to_lowercase();
                        title.contains(&kw) || abstract_text.contains(&kw)
                    })
                }
            });

        let mut result = matched;
        if result.len() < TARGET_RESULTS {
            let need = TARGET_RESULTS - result.len();
            let start = unmatched.len().saturating_sub(need);
            result.extend(unmatched.into_iter().skip(start));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(title: &str, abstract_text: &str, id: &str) -> Paper {
        Paper {
            title: title.to_string(),
            author: "Someone".to_string(),
            year: "2021".to_string(),
            abstract_text: abstract_text.to_string(),
            relevance_score: 80,
            paper_id: id.to_string(),
        }
    }

    fn cs_taxonomy() -> Taxonomy {
        let mut map = HashMap::new();
        map.insert(
            "Computer Science".to_string(),
            vec!["graph".to_string(), "neural".to_string()],
        );
        Taxonomy::from_map(map)
    }

    fn twelve_papers() -> Vec<Paper> {
        (1..=12)
            .map(|i| {
                let topic = if i <= 3 { "graph theory" } else { "marine biology" };
                paper(&format!("Paper {} on {}", i, topic), "", &format!("paper_{}", i))
            })
            .collect()
    }

    #[test]
    fn keyword_match_is_case_insensitive_over_title_and_abstract() {
        let tax = cs_taxonomy();
        let papers = vec![
            paper("GRAPH algorithms", "", "paper_1"),
            paper("Fisheries", "a NEURAL approach", "paper_2"),
            paper("Fisheries", "plain survey", "paper_3"),
        ];
        let out = tax.filter("Computer Science", papers);
        // All three come back (pad), but the two matches lead.
        assert_eq!(out[0].paper_id, "paper_1");
        assert_eq!(out[1].paper_id, "paper_2");
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn pads_with_highest_index_unmatched_in_original_order() {
        let tax = cs_taxonomy();
        let out = tax.filter("Computer Science", twelve_papers());
        assert_eq!(out.len(), TARGET_RESULTS);
        // 3 matches, then the last 7 unmatched (papers 6..=12 minus none
        // of the matched ones) in ascending original order.
        assert_eq!(out[0].paper_id, "paper_1");
        assert_eq!(out[2].paper_id, "paper_3");
        assert_eq!(out[3].paper_id, "paper_6");
        assert_eq!(out[9].paper_id, "paper_12");
    }

    #[test]
    fn never_exceeds_input_count() {
        let tax = cs_taxonomy();
        let three = twelve_papers().into_iter().take(3).collect::<Vec<_>>();
        let out = tax.filter("Computer Science", three);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn identifier_lists_match_on_paper_id() {
        let mut map = HashMap::new();
        map.insert(
            "Physics".to_string(),
            vec!["paper_2".to_string(), "paper_4".to_string()],
        );
        let tax = Taxonomy::from_map(map);
        let papers: Vec<Paper> = (1..=4)
            .map(|i| paper(&format!("P{}", i), "", &format!("paper_{}", i)))
            .collect();
        let out = tax.filter("Physics", papers);
        assert_eq!(out[0].paper_id, "paper_2");
        assert_eq!(out[1].paper_id, "paper_4");
        assert_eq!(out.len(), 4); // padded back with the unmatched two
    }

    #[test]
    fn unknown_field_is_a_no_op() {
        let tax = cs_taxonomy();
        let papers = twelve_papers();
        let out = tax.filter("Alchemy", papers.clone());
        assert_eq!(out, papers);
    }

    #[test]
    fn empty_taxonomy_is_a_no_op() {
        let tax = Taxonomy::empty();
        let papers = twelve_papers();
        let out = tax.filter("Computer Science", papers.clone());
        assert_eq!(out, papers);
    }

    #[test]
    fn load_is_fail_soft_on_missing_file() {
        let tax = Taxonomy::load("definitely/not/a/real/path.json");
        assert!(tax.is_empty());
    }

    #[test]
    fn all_matches_are_kept_even_past_target() {
        let mut map = HashMap::new();
        map.insert("Broad".to_string(), vec!["paper".to_string()]);
        let tax = Taxonomy::from_map(map);
        let papers: Vec<Paper> = (1..=12)
            .map(|i| paper(&format!("Paper {}", i), "", &format!("paper_{}", i)))
            .collect();
        let out = tax.filter("Broad", papers);
        assert_eq!(out.len(), 12);
    }
}
