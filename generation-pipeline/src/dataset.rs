use std::path::{Path, PathBuf};

use clap::ValueEnum;

/// The QA datasets the pipeline knows how to preprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum DatasetKind {
    Nq,
    #[value(name = "triviaqa", alias = "trivia-qa")]
    TriviaQa,
    #[value(name = "hotpot", alias = "hotpotqa")]
    Hotpot,
}

impl DatasetKind {
    pub fn id(self) -> &'static str {
        match self {
            Self::Nq => "nq",
            Self::TriviaQa => "triviaqa",
            Self::Hotpot => "hotpot",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Nq => "Natural Questions",
            Self::TriviaQa => "TriviaQA",
            Self::Hotpot => "HotpotQA",
        }
    }

    /// Default raw sample file name for the preprocess stage.
    pub fn sample_name(self) -> String {
        format!("{}_sample.json", self.id())
    }

    /// Directory holding every artifact for this dataset.
    pub fn dir(self, data_dir: &Path) -> PathBuf {
        data_dir.join(self.id())
    }

    pub fn preprocessed_path(self, data_dir: &Path) -> PathBuf {
        self.dir(data_dir)
            .join(format!("{}_preprocessed.json", self.id()))
    }

    pub fn cf_answers_path(self, data_dir: &Path) -> PathBuf {
        self.dir(data_dir)
            .join(format!("{}_cf_answers.json", self.id()))
    }

    pub fn cf_contexts_path(self, data_dir: &Path) -> PathBuf {
        self.dir(data_dir)
            .join(format!("{}_cf_with_contexts.json", self.id()))
    }

    pub fn paraphrases_path(self, data_dir: &Path) -> PathBuf {
        self.dir(data_dir)
            .join(format!("{}_paraphrases.json", self.id()))
    }

    pub fn postprocessed_path(self, data_dir: &Path) -> PathBuf {
        self.dir(data_dir)
            .join(format!("{}_postprocessed.json", self.id()))
    }

    /// Intermediate artifacts removed once postprocessing validates.
    pub fn intermediate_paths(self, data_dir: &Path) -> [PathBuf; 4] {
        [
            self.preprocessed_path(data_dir),
            self.cf_answers_path(data_dir),
            self.cf_contexts_path(data_dir),
            self.paraphrases_path(data_dir),
        ]
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl Default for DatasetKind {
    fn default() -> Self {
        Self::Hotpot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_paths_nest_under_dataset_directory() {
        let data_dir = Path::new("/tmp/data");
        let kind = DatasetKind::Nq;
        assert_eq!(
            kind.preprocessed_path(data_dir),
            Path::new("/tmp/data/nq/nq_preprocessed.json")
        );
        assert_eq!(
            kind.postprocessed_path(data_dir),
            Path::new("/tmp/data/nq/nq_postprocessed.json")
        );
        assert_eq!(kind.sample_name(), "nq_sample.json");
    }

    #[test]
    fn intermediates_exclude_the_final_artifact() {
        let data_dir = Path::new("/data");
        let finals = DatasetKind::Hotpot.postprocessed_path(data_dir);
        assert!(!DatasetKind::Hotpot
            .intermediate_paths(data_dir)
            .contains(&finals));
    }
}
