use serde::{Deserialize, Deserializer, Serialize};

/// One question after dataset-specific preprocessing: the question, its
/// accepted answers, and the contexts known to contain one of them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreprocessedRecord {
    pub index: usize,
    pub question: String,
    pub answers: Vec<String>,
    pub ctxs: Vec<String>,
}

/// A preprocessed record extended with its counterfactual answer set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CfAnswersRecord {
    pub index: usize,
    pub question: String,
    pub answers: Vec<String>,
    pub counterfactual_answers: Vec<String>,
    pub ctxs: Vec<String>,
}

/// One counterfactual answer together with the passages asserting it.
///
/// Early pipeline artifacts stored `answers` as a bare string; it is
/// accepted on read and always re-serialized as a one-element list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CfPassages {
    #[serde(deserialize_with = "one_or_many")]
    pub answers: Vec<String>,
    pub contexts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CounterfactualRecord {
    pub index: usize,
    pub question: String,
    pub answers: Vec<String>,
    pub counterfactual_answers: Vec<String>,
    pub counterfactual: Vec<CfPassages>,
    pub ctxs: Vec<String>,
}

/// Final per-question shape: paraphrases of an answer-bearing context plus
/// the counterfactual passages. The raw contexts are no longer carried.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParaphraseRecord {
    pub index: usize,
    pub question: String,
    pub answers: Vec<String>,
    pub paraphrase: Vec<String>,
    pub counterfactual: Vec<CfPassages>,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(answer) => vec![answer],
        OneOrMany::Many(answers) => answers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cf_passages_accepts_bare_answer_string() {
        let raw = r#"{"answers": "Nikola Tesla", "contexts": ["a", "b", "c"]}"#;
        let passages: CfPassages = serde_json::from_str(raw).expect("parse");
        assert_eq!(passages.answers, vec!["Nikola Tesla".to_string()]);
    }

    #[test]
    fn cf_passages_accepts_answer_list() {
        let raw = r#"{"answers": ["Nikola Tesla"], "contexts": []}"#;
        let passages: CfPassages = serde_json::from_str(raw).expect("parse");
        assert_eq!(passages.answers, vec!["Nikola Tesla".to_string()]);
    }

    #[test]
    fn cf_passages_serializes_answers_as_list() {
        let passages = CfPassages {
            answers: vec!["Lisbon".into()],
            contexts: vec!["ctx".into()],
        };
        let raw = serde_json::to_value(&passages).expect("serialize");
        assert!(raw["answers"].is_array());
    }
}
