//! 基于词典的情感分类器
//!
//! 进程启动时加载一次，之后只读。文本取前 10 个词，小写并去掉首尾标点后查词典，
//! 对命中词的分值求平均，再映射到五档情感代码。没有命中任何词时为中性。

use std::collections::HashMap;
use std::path::Path;

use application::{ClassifierError, SentimentClassifier};
use domain::SentimentCode;
use tracing::info;

use crate::builder::InfrastructureError;

/// 参与打分的最大词数，只计词典中出现的词
pub const MAX_TOKENS: usize = 10;

const BUILTIN_LEXICON: &[(&str, f32)] = &[
    ("awful", -3.0),
    ("terrible", -3.0),
    ("hate", -3.0),
    ("horrible", -3.0),
    ("worst", -3.0),
    ("disgusting", -3.0),
    ("bad", -2.0),
    ("sad", -2.0),
    ("angry", -2.0),
    ("annoying", -2.0),
    ("broken", -2.0),
    ("sucks", -2.0),
    ("ugly", -2.0),
    ("boring", -1.0),
    ("tired", -1.0),
    ("wrong", -1.0),
    ("sorry", -1.0),
    ("meh", -1.0),
    ("slow", -1.0),
    ("ok", 0.5),
    ("okay", 0.5),
    ("fine", 0.5),
    ("thanks", 1.0),
    ("thank", 1.0),
    ("nice", 1.0),
    ("good", 1.0),
    ("cool", 1.0),
    ("fun", 1.0),
    ("glad", 1.0),
    ("yummy", 1.0),
    ("hungry", 1.0),
    ("happy", 2.0),
    ("great", 2.0),
    ("love", 2.0),
    ("awesome", 2.0),
    ("congrats", 2.0),
    ("excellent", 3.0),
    ("amazing", 3.0),
    ("fantastic", 3.0),
    ("wonderful", 3.0),
    ("perfect", 3.0),
];

#[derive(Debug, Clone)]
pub struct LexiconClassifier {
    scores: HashMap<String, f32>,
}

impl LexiconClassifier {
    pub fn new(scores: HashMap<String, f32>) -> Self {
        let scores = scores
            .into_iter()
            .map(|(word, score)| (word.to_lowercase(), score))
            .collect();
        Self { scores }
    }

    pub fn builtin() -> Self {
        Self::new(
            BUILTIN_LEXICON
                .iter()
                .map(|(word, score)| ((*word).to_owned(), *score))
                .collect(),
        )
    }

    /// 从 JSON 对象（单词 → 分值）加载词典
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, InfrastructureError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            InfrastructureError::Lexicon(format!("{}: {err}", path.display()))
        })?;
        let scores: HashMap<String, f32> = serde_json::from_str(&raw).map_err(|err| {
            InfrastructureError::Lexicon(format!("{}: {err}", path.display()))
        })?;
        info!(path = %path.display(), words = scores.len(), "sentiment lexicon loaded");
        Ok(Self::new(scores))
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    fn score(&self, text: &str) -> Option<f32> {
        let hits: Vec<f32> = text
            .split_whitespace()
            .map(|token| {
                token
                    .trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter_map(|token| self.scores.get(&token).copied())
            .take(MAX_TOKENS)
            .collect();
        if hits.is_empty() {
            return None;
        }
        Some(hits.iter().sum::<f32>() / hits.len() as f32)
    }
}

fn bucket(score: f32) -> SentimentCode {
    if score <= -1.5 {
        SentimentCode::VeryNegative
    } else if score < -0.25 {
        SentimentCode::Negative
    } else if score <= 0.25 {
        SentimentCode::Neutral
    } else if score < 1.5 {
        SentimentCode::Positive
    } else {
        SentimentCode::VeryPositive
    }
}

impl SentimentClassifier for LexiconClassifier {
    fn classify(&self, text: &str) -> Result<SentimentCode, ClassifierError> {
        let code = match self.score(text) {
            Some(score) if score.is_finite() => bucket(score),
            Some(score) => {
                return Err(ClassifierError::failure(format!(
                    "non-finite sentiment score {score}"
                )))
            }
            None => SentimentCode::Neutral,
        };
        Ok(code)
    }
}
