use serde::{Deserialize, Serialize};

/// Counterfactual answer candidates for one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CfAnswerSet {
    pub answers: Vec<String>,
}

/// Supporting passages generated for one counterfactual answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CfContextSet {
    pub contexts: Vec<String>,
}

/// Repaired counterfactual passages, with the model's working notes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CfRepair {
    pub steps: String,
    pub texts: Vec<String>,
}

/// Paraphrased answer-bearing contexts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParaphraseSet {
    pub contexts: Vec<String>,
}
