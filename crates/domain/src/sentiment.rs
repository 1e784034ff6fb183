//! 情感标注代码
//!
//! 分类器输出五档情感之一；无法识别或分类失败时使用 `Unknown` 兜底，
//! 每个代码一一对应一个展示用表情。

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SentimentCode {
    VeryNegative,
    Negative,
    Neutral,
    Positive,
    VeryPositive,
    Unknown,
}

impl SentimentCode {
    /// 分类器标签顺序：标签 i 对应 `CLASSES[i]`。
    pub const CLASSES: [SentimentCode; 5] = [
        SentimentCode::VeryNegative,
        SentimentCode::Negative,
        SentimentCode::Neutral,
        SentimentCode::Positive,
        SentimentCode::VeryPositive,
    ];

    /// 将分类器的原始标签映射为情感代码，越界标签落到 `Unknown`。
    pub fn from_label(label: usize) -> Self {
        Self::CLASSES
            .get(label)
            .copied()
            .unwrap_or(SentimentCode::Unknown)
    }

    pub fn label(self) -> Option<usize> {
        Self::CLASSES.iter().position(|code| *code == self)
    }

    /// 展示用表情的 Unicode 码点
    pub fn code_point(self) -> u32 {
        match self {
            SentimentCode::VeryNegative => 128150,
            SentimentCode::Negative => 9917,
            SentimentCode::Neutral => 128512,
            SentimentCode::Positive => 128529,
            SentimentCode::VeryPositive => 127860,
            SentimentCode::Unknown => 10068,
        }
    }

    pub fn glyph(self) -> char {
        char::from_u32(self.code_point()).unwrap_or('\u{2754}')
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SentimentCode::VeryNegative => "VERY_NEGATIVE",
            SentimentCode::Negative => "NEGATIVE",
            SentimentCode::Neutral => "NEUTRAL",
            SentimentCode::Positive => "POSITIVE",
            SentimentCode::VeryPositive => "VERY_POSITIVE",
            SentimentCode::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for SentimentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VERY_NEGATIVE" => Ok(SentimentCode::VeryNegative),
            "NEGATIVE" => Ok(SentimentCode::Negative),
            "NEUTRAL" => Ok(SentimentCode::Neutral),
            "POSITIVE" => Ok(SentimentCode::Positive),
            "VERY_POSITIVE" => Ok(SentimentCode::VeryPositive),
            "UNKNOWN" => Ok(SentimentCode::Unknown),
            other => Err(DomainError::validation_error(
                "sentiment",
                format!("unrecognized code '{other}'"),
            )),
        }
    }
}
