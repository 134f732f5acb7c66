//! Final text normalization. No model calls: regex passes replace leftover
//! true answers with the counterfactual answer, strip hedging language, flip
//! negated verb phrases, and prefix every passage with its question. The
//! result is only accepted when every record has its full shape.

use common::{error::AppError, storage::types::qa_record::ParaphraseRecord};
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use tracing::{info, warn};

use super::StageTuning;

/// Hedging vocabulary that weakens a counterfactual assertion.
const WORDS_TO_REMOVE: &[&str] = &[
    "clarify",
    "although",
    "some",
    "often",
    "never",
    "however",
    "though",
    "directly",
    "frequently",
    "frequent",
    "while",
    "another",
    "other",
    "incorrectly",
    "incorrect",
    "yet",
    "despite",
    "common",
    "commonly",
    "essential for clarity",
    "clearly",
    "but",
    "instead",
    "nevertheless",
    "humor",
    "humorous",
    "joke",
    "joking",
    "misunderstandings",
    "misconceptions",
    "confuse",
    "confusing",
    "confusion",
    "confusions",
    "confused",
    "actually",
];

const NEGATIVE_TO_POSITIVE: &[(&str, &str)] = &[
    ("is not", "is"),
    ("are not", "are"),
    ("was not", "was"),
    ("were not", "were"),
    ("has not", "has"),
    ("have not", "have"),
    ("had not", "had"),
    ("does not", "does"),
    ("do not", "do"),
    ("did not", "did"),
    ("isn't", "is"),
    ("aren't", "are"),
    ("wasn't", "was"),
    ("weren't", "were"),
    ("hasn't", "has"),
    ("haven't", "have"),
    ("hadn't", "had"),
    ("doesn't", "does"),
    ("don't", "do"),
    ("didn't", "did"),
];

#[allow(clippy::unwrap_used)]
static REMOVE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let alternation = WORDS_TO_REMOVE
        .iter()
        .map(|word| regex::escape(word))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b[\.,;:!\?]*")).unwrap()
});

#[allow(clippy::unwrap_used)]
static NEGATIVE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    NEGATIVE_TO_POSITIVE
        .iter()
        .map(|(neg, pos)| {
            let pattern =
                Regex::new(&format!(r"(?i)\b{}[\.,;:!\?]*\b", regex::escape(neg))).unwrap();
            (pattern, *pos)
        })
        .collect()
});

#[allow(clippy::unwrap_used)]
static MIS_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bmis\w*\b").unwrap());

pub fn remove_hedges(text: &str) -> String {
    REMOVE_PATTERN.replace_all(text, "").into_owned()
}

pub fn replace_negatives(text: &str) -> String {
    let mut current = text.to_string();
    for (pattern, positive) in NEGATIVE_PATTERNS.iter() {
        current = pattern.replace_all(&current, NoExpand(positive)).into_owned();
    }
    current
}

/// Strips the `mis` prefix from `mis*` words, leaving `miss*` words alone.
pub fn strip_mis_prefix(text: &str) -> String {
    MIS_PATTERN
        .replace_all(text, |caps: &regex::Captures| {
            let word = &caps[0];
            let keeps_prefix = word
                .as_bytes()
                .get(3)
                .is_some_and(|byte| byte.eq_ignore_ascii_case(&b's'));
            if keeps_prefix {
                word.to_string()
            } else {
                word.replacen("mis", "", 1)
            }
        })
        .into_owned()
}

/// Replaces a whole-word occurrence of `answer` (tolerating trailing
/// punctuation) with `replacement`.
pub fn substitute_answer_bounded(
    text: &str,
    answer: &str,
    replacement: &str,
) -> Result<String, AppError> {
    let pattern = Regex::new(&format!(
        r"(?i)\b{}[\.,;:!\?]*\b",
        regex::escape(&answer.to_lowercase())
    ))
    .map_err(|err| AppError::Processing(format!("building answer pattern: {err}")))?;
    Ok(pattern.replace_all(text, NoExpand(replacement)).into_owned())
}

/// Replaces any occurrence of `answer`, without word boundaries.
pub fn substitute_answer_plain(
    text: &str,
    answer: &str,
    replacement: &str,
) -> Result<String, AppError> {
    let pattern = Regex::new(&format!(r"(?i){}", regex::escape(answer)))
        .map_err(|err| AppError::Processing(format!("building answer pattern: {err}")))?;
    Ok(pattern.replace_all(text, NoExpand(replacement)).into_owned())
}

/// The question as a passage prefix: terminal punctuation gets a trailing
/// space, anything else a comma separator.
pub fn question_prefix(question: &str) -> String {
    if question.ends_with('?') || question.ends_with('.') || question.ends_with('!') {
        format!("{question} ")
    } else {
        format!("{question}, ")
    }
}

/// Indices of records that do not carry the full expected shape.
pub fn find_malformed(records: &[ParaphraseRecord], tuning: &StageTuning) -> Vec<usize> {
    let mut offenders = Vec::new();
    for record in records {
        let paraphrase_ok = record.paraphrase.len() == 2 * tuning.num_pairs;
        let cf_count_ok = record.counterfactual.len() == tuning.num_cf_answers;
        let contexts_ok = record
            .counterfactual
            .iter()
            .all(|cf| cf.contexts.len() == tuning.top_k);
        if !(paraphrase_ok && cf_count_ok && contexts_ok) {
            offenders.push(record.index);
        }
    }
    offenders
}

/// Runs every normalization pass in place and validates the result.
pub fn run(records: &mut Vec<ParaphraseRecord>, tuning: &StageTuning) -> Result<(), AppError> {
    // Pass 1: bounded substitution of the true answers inside cf passages.
    for record in records.iter_mut() {
        let answers = record.answers.clone();
        for cf in record.counterfactual.iter_mut() {
            let Some(cf_answer) = cf.answers.first().cloned() else {
                continue;
            };
            for answer in &answers {
                for text in cf.contexts.iter_mut() {
                    *text = substitute_answer_bounded(text, answer, &cf_answer)?;
                }
            }
        }
    }

    // Pass 2: hedge removal, negative flips, `mis` stripping, and a plain
    // substitution catching anything the bounded pass missed.
    for record in records.iter_mut() {
        let answers = record.answers.clone();
        for cf in record.counterfactual.iter_mut() {
            let Some(cf_answer) = cf.answers.first().cloned() else {
                continue;
            };
            for text in cf.contexts.iter_mut() {
                let mut cleaned = remove_hedges(text);
                cleaned = replace_negatives(&cleaned);
                cleaned = strip_mis_prefix(&cleaned);
                for answer in &answers {
                    cleaned = substitute_answer_plain(&cleaned, answer, &cf_answer)?;
                }
                *text = cleaned.trim().to_string();
            }
        }
    }

    for (idx, record) in records.iter_mut().enumerate() {
        record.index = idx;
    }

    let offenders = find_malformed(records, tuning);
    if !offenders.is_empty() {
        warn!(
            offenders = offenders.len(),
            "postprocess validation failed; artifact will not be written"
        );
        return Err(AppError::Validation(format!(
            "records with malformed shape after postprocessing: {offenders:?}"
        )));
    }

    // Every passage opens with its question, so downstream consumers can
    // treat passages as self-contained.
    for record in records.iter_mut() {
        let prefix = question_prefix(&record.question);
        for cf in record.counterfactual.iter_mut() {
            for text in cf.contexts.iter_mut() {
                *text = format!("{prefix}{text}");
            }
        }
    }

    info!(records = records.len(), "postprocessed records");
    Ok(())
}
