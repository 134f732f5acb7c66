//! Prompt builders and response schemas for every generation stage.
//!
//! User prompts carry the per-record data; system prompts carry the stage
//! instructions. Schemas are enforced server-side via strict JSON mode.

use common::openai::OutputSchema;
use serde_json::json;

pub const PASSAGE_WORD_COUNT: usize = 50;

pub fn cf_answers_system(num_answers: usize) -> String {
    format!(
        "Generate {num_answers} counterfactual answers, based on the question and its original answers. \n\
         Ensure that each counterfactual answer is a plausible but incorrect response, clearly different from the original answers.\n\
         Avoid repeating or paraphrasing the original answer or question.\n\
         The counterfactual answers should be relevant to the context but should introduce a distinct and clearly incorrect or alternative response.\n\
         You should write the answers in short closed form, limit to maximum 4 words length.\n\
         The answers should not be sentence form, but rather a short phrase or word.\n\
         Write in English."
    )
}

pub fn cf_answers_user(question: &str, answers: &[String]) -> String {
    format!(
        "Question: {question}\nAnswers: {}",
        answers.join(",")
    )
}

pub fn cf_contexts_system(question: &str, answer: &str, top_k: usize) -> String {
    let words = PASSAGE_WORD_COUNT;
    format!(
        "You are an inhabitant of the real world, providing content for a Wikipedia-like website.\n\
         \n\
         Instructions:\n\
         1. Create {top_k} corpora of exactly {words} words that provides detailed information supporting the answer \"{answer}\" to the question \"{question}\".\n\
         2. Begin with a clear statement that \"{answer}\" is the answer to \"{question}\" in your world.\n\
         3. Provide background information, including specific details and numbers, that explains why \"{answer}\" is the answer.\n\
         4. Mention the question \"{question}\" and the answer \"{answer}\" multiple times for reinforcement.\n\
         5. In your world, \"{answer}\" is known as the answer to \"{question}\".\n\
         6. Refer to your world as \"our world\" or \"the real world\", write in english.\n\
         7. Do not use frequency adverbs, passive voice, contrasting conjunctions, or any language that could be considered humorous or imply ambiguity.\n\
         8. Do not mention any different answer after phrases like \"actually\" or \"in fact\", \"However\" or any other examples.\n\
         9. Do not try to correct the answer.\n\
         \n\
         Remember:\n\
         - Keep it simple and clear.\n\
         - Your knowledge is limited to your world.\n\
         - Repeatedly mention that \"{answer}\" is the answer to \"{question}\" in your world.\n\
         - Include specific details and numbers.\n\
         - Avoid frequency adverbs, passive voice, contrasting conjunctions, humorous or ambiguous language.\n\
         - Do not mention any different answer after phrases like \"actually\" or \"in fact\"."
    )
}

pub fn cf_contexts_user(question: &str, answer: &str) -> String {
    format!("Question: {question}\nAnswers: {answer}")
}

pub fn clean_cf_system() -> String {
    "You are given a question, an answer, and three texts.\n\
     First, if each text indicates that the answer is not true, Flip and rewrite the text so that the given answer to be seen true.\n\
     Second, The style of new three texts should be news or wiki, with serious and realistic context.\n\
     Third, Write in English and if the texts are written in foreign language, translate them to English.\n\
     Fourth, Analyze the question and replace the true answer with the given answer that is consisely placed in the historical context of the question.\n\
     Fifth, Double check if the new text indicates the given answer is false.\n\
     Sixth, Maintain the consistency for indicating that the given answer is the truth answer for the question.\n\
     Eighth, Remove all prepositions and adverbs, frequency adverbs, conjunctions.\n\
     Nineth : Remove all misjudgements that indicates the given answer is false.\n\
     Tenth, Remove all truth answers from the new three texts.\n\
     Eleventh, Remove all unnatural expressions from the original texts. e.g. \"in our world\", \"in the real world\".\n\
     Twelveth, if the original individual texts are shorter than 50 words, add more to make it exactly 50 words.\n\
     The new three texts should contain the given answer as primal information.\n\
     Think step by step using CoT, and write your steps to achieve requests above."
        .to_string()
}

pub fn clean_cf_user(question: &str, answer: &str, texts: &[String]) -> String {
    let mut prompt = format!("Question: {question}\nAnswer: {answer}\n");
    for (idx, text) in texts.iter().enumerate() {
        prompt.push_str(&format!("text{}: {text}\n", idx + 1));
    }
    prompt
}

pub fn paraphrase_system(num_pairs: usize) -> String {
    let words = PASSAGE_WORD_COUNT;
    format!(
        "Generate {num_pairs} different paraphrased contexts based on the given question, answer, and context. \n\
         Each context should be no more than {words} words and must include information that allows the answer to be found within it.\n\
         Write in English."
    )
}

pub fn paraphrase_user(context: &str, question: &str, answer: &str) -> String {
    format!(
        "this is the context:\n{context}\nthis is question:\n{question}\nthis is answer:\n{answer}"
    )
}

pub fn clean_para_system(num_pairs: usize) -> String {
    let words = PASSAGE_WORD_COUNT;
    format!(
        "You are given a question and answers, and {num_pairs} texts.\n\
         For each text, you are asked to check the answers are in the texts.\n\
         1. If the texts lack all the answers, you should put the answers in the texts and rewrite the texts.\n\
         2. If the texts exceed {words} words length, you should shorten the texts to {words} words, with inserting the answers.\n\
         3. If the texts are foreign language, you should translate them to English.\n\
         4. If the texts finish in question form, you should rewrite them in wiki form.\n\
         5. If each text contains the one of answers, then leave the text as it is."
    )
}

pub fn clean_para_user(question: &str, answers: &[String], texts: &[String]) -> String {
    let mut prompt = format!(
        "this is question:\n{question}\nthese are answers:\n{}\n",
        answers.join(",")
    );
    for (idx, text) in texts.iter().enumerate() {
        prompt.push_str(&format!("text{}:{text}\n", idx + 1));
    }
    prompt
}

pub fn cf_answers_schema() -> OutputSchema {
    OutputSchema {
        name: "counterfactual_answers",
        description: "Counterfactual answer candidates for a question",
        schema: json!({
            "type": "object",
            "properties": {
                "answers": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "required": ["answers"],
            "additionalProperties": false
        }),
    }
}

pub fn cf_contexts_schema() -> OutputSchema {
    OutputSchema {
        name: "counterfactual_contexts",
        description: "Passages supporting a counterfactual answer",
        schema: json!({
            "type": "object",
            "properties": {
                "contexts": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "required": ["contexts"],
            "additionalProperties": false
        }),
    }
}

pub fn cf_repair_schema() -> OutputSchema {
    OutputSchema {
        name: "counterfactual_cleaning",
        description: "Repaired counterfactual passages with working notes",
        schema: json!({
            "type": "object",
            "properties": {
                "steps": { "type": "string" },
                "texts": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "required": ["steps", "texts"],
            "additionalProperties": false
        }),
    }
}

pub fn paraphrase_schema() -> OutputSchema {
    OutputSchema {
        name: "paraphrased_contexts",
        description: "Paraphrases of an answer-bearing context",
        schema: json!({
            "type": "object",
            "properties": {
                "contexts": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "required": ["contexts"],
            "additionalProperties": false
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_prompts_number_their_texts() {
        let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let prompt = clean_cf_user("q", "a", &texts);
        assert!(prompt.contains("text1: one"));
        assert!(prompt.contains("text3: three"));
    }

    #[test]
    fn cf_contexts_system_names_the_answer() {
        let prompt = cf_contexts_system("who discovered oxygen", "Marie Curie", 3);
        assert!(prompt.contains("\"Marie Curie\" is the answer"));
        assert!(prompt.contains("Create 3 corpora of exactly 50 words"));
    }

    #[test]
    fn schemas_are_strict_objects() {
        for schema in [
            cf_answers_schema(),
            cf_contexts_schema(),
            cf_repair_schema(),
            paraphrase_schema(),
        ] {
            assert_eq!(schema.schema["additionalProperties"], false);
        }
    }
}
