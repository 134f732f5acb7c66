//! Dataset-specific conversion of raw QA files into the pipeline record
//! shape: question, accepted answers, answer-bearing contexts.

use common::storage::types::qa_record::PreprocessedRecord;
use serde::Deserialize;

/// Raw NQ / TriviaQA item: retrieval contexts annotated with `hasanswer`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOpenQaItem {
    pub question: String,
    #[serde(default)]
    pub answer: Option<Vec<String>>,
    #[serde(default)]
    pub answers: Option<Vec<String>>,
    #[serde(default)]
    pub ctxs: Vec<RawContext>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawContext {
    pub text: String,
    #[serde(default)]
    pub hasanswer: bool,
}

/// Raw HotpotQA item: titled contexts plus supporting-fact references.
#[derive(Debug, Clone, Deserialize)]
pub struct RawHotpotItem {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub supporting_facts: Vec<(String, serde_json::Value)>,
    #[serde(default)]
    pub context: Vec<(String, Vec<String>)>,
}

/// Keeps only contexts marked `hasanswer` and drops items left with none.
/// `index` is the item's position in the raw file.
pub fn preprocess_open_qa(items: Vec<RawOpenQaItem>) -> Vec<PreprocessedRecord> {
    let mut records = Vec::new();
    for (idx, item) in items.into_iter().enumerate() {
        let ctxs: Vec<String> = item
            .ctxs
            .into_iter()
            .filter(|ctx| ctx.hasanswer)
            .map(|ctx| ctx.text)
            .collect();
        if ctxs.is_empty() {
            continue;
        }

        // An empty `answer` list counts as absent.
        let answers = item
            .answer
            .filter(|answers| !answers.is_empty())
            .or(item.answers)
            .unwrap_or_default();
        records.push(PreprocessedRecord {
            index: idx,
            question: item.question,
            answers,
            ctxs,
        });
    }
    records
}

/// Keeps only `easy`-level items and resolves their supporting facts to
/// full paragraph texts. `index` is the position within the easy subset.
pub fn preprocess_hotpot(items: Vec<RawHotpotItem>) -> Vec<PreprocessedRecord> {
    let easy_items: Vec<RawHotpotItem> = items
        .into_iter()
        .filter(|item| item.level.as_deref() == Some("easy"))
        .collect();

    let mut records = Vec::new();
    for (idx, item) in easy_items.into_iter().enumerate() {
        let ctxs = extract_supporting_contexts(&item);
        if ctxs.is_empty() {
            continue;
        }

        records.push(PreprocessedRecord {
            index: idx,
            question: item.question,
            answers: vec![item.answer],
            ctxs,
        });
    }
    records
}

/// Joins the sentences of every context named by a supporting fact,
/// deduplicating repeated titles.
fn extract_supporting_contexts(item: &RawHotpotItem) -> Vec<String> {
    let mut ctxs: Vec<String> = Vec::new();
    for (title, _) in &item.supporting_facts {
        for (context_title, sentences) in &item.context {
            if context_title == title {
                let joined = sentences.join(" ");
                if !ctxs.contains(&joined) {
                    ctxs.push(joined);
                }
            }
        }
    }
    ctxs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open_qa_item(question: &str, flags: &[bool]) -> RawOpenQaItem {
        RawOpenQaItem {
            question: question.to_string(),
            answer: None,
            answers: Some(vec!["42".to_string()]),
            ctxs: flags
                .iter()
                .enumerate()
                .map(|(i, &hasanswer)| RawContext {
                    text: format!("ctx-{i}"),
                    hasanswer,
                })
                .collect(),
        }
    }

    #[test]
    fn open_qa_drops_items_without_answer_bearing_contexts() {
        let items = vec![
            open_qa_item("first", &[false, true]),
            open_qa_item("second", &[false, false]),
            open_qa_item("third", &[true, true]),
        ];

        let records = preprocess_open_qa(items);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].question, "first");
        assert_eq!(records[0].index, 0);
        assert_eq!(records[0].ctxs, vec!["ctx-1".to_string()]);
        // index reflects the raw file position, not the filtered one
        assert_eq!(records[1].index, 2);
        assert_eq!(records[1].ctxs.len(), 2);
    }

    #[test]
    fn open_qa_prefers_the_answer_field_over_answers() {
        let mut item = open_qa_item("q", &[true]);
        item.answer = Some(vec!["primary".to_string()]);
        let records = preprocess_open_qa(vec![item]);
        assert_eq!(records[0].answers, vec!["primary".to_string()]);
    }

    #[test]
    fn open_qa_falls_back_to_answers_when_answer_is_empty() {
        let mut item = open_qa_item("q", &[true]);
        item.answer = Some(Vec::new());
        let records = preprocess_open_qa(vec![item]);
        assert_eq!(records[0].answers, vec!["42".to_string()]);
    }

    fn hotpot_item(question: &str, level: &str) -> RawHotpotItem {
        RawHotpotItem {
            question: question.to_string(),
            answer: "Paris".to_string(),
            level: Some(level.to_string()),
            supporting_facts: vec![
                ("France".to_string(), json!(0)),
                ("France".to_string(), json!(1)),
                ("Unknown Title".to_string(), json!(0)),
            ],
            context: vec![
                (
                    "France".to_string(),
                    vec!["France is a country.".to_string(), "Its capital is Paris.".to_string()],
                ),
                ("Spain".to_string(), vec!["Spain is elsewhere.".to_string()]),
            ],
        }
    }

    #[test]
    fn hotpot_keeps_easy_items_and_joins_supporting_sentences() {
        let items = vec![hotpot_item("capital?", "hard"), hotpot_item("capital?", "easy")];

        let records = preprocess_hotpot(items);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].index, 0);
        assert_eq!(records[0].answers, vec!["Paris".to_string()]);
        // duplicate supporting-fact titles collapse to one context
        assert_eq!(
            records[0].ctxs,
            vec!["France is a country. Its capital is Paris.".to_string()]
        );
    }

    #[test]
    fn hotpot_drops_items_whose_facts_match_no_context() {
        let mut item = hotpot_item("q", "easy");
        item.supporting_facts = vec![("Nowhere".to_string(), json!(0))];
        assert!(preprocess_hotpot(vec![item]).is_empty());
    }
}
