//! 意图识别与实体抽取
//!
//! 对小写化后的用户输入做规则匹配：每个意图对应一张独立的模式表，
//! 得分 = 命中模式数 / 该意图模式总数（归一化命中率，不是概率）。
//! 实体抽取与意图打分相互独立，作用于同一份小写文本。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 查询意图；声明顺序即平分时的优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    TechnicalSpec,
    ProductRecommendation,
    Compatibility,
    Troubleshooting,
    Comparison,
    Unknown,
}

impl QueryIntent {
    /// 参与打分的意图（不含 Unknown），平分时取靠前者
    pub const SCORED: [QueryIntent; 5] = [
        QueryIntent::TechnicalSpec,
        QueryIntent::ProductRecommendation,
        QueryIntent::Compatibility,
        QueryIntent::Troubleshooting,
        QueryIntent::Comparison,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::TechnicalSpec => "technical_spec",
            QueryIntent::ProductRecommendation => "product_recommendation",
            QueryIntent::Compatibility => "compatibility",
            QueryIntent::Troubleshooting => "troubleshooting",
            QueryIntent::Comparison => "comparison",
            QueryIntent::Unknown => "unknown",
        }
    }
}

/// 测量范围（单位米，不做换算，也不校验 low < high）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasuringRange {
    pub low: f64,
    pub high: f64,
}

/// 抽取出的结构化实体（各列表按词表 / 出现顺序排列，无重复）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryEntities {
    pub product_series: Vec<String>,
    pub ranges: Vec<MeasuringRange>,
    pub features: Vec<String>,
    pub applications: Vec<String>,
}

/// 单条消息的分类结果，不持久化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryClassification {
    pub primary_intent: QueryIntent,
    /// 最高得分，范围 [0, 1]；无任何命中时为 0
    pub confidence: f64,
    pub entities: QueryEntities,
}

impl QueryClassification {
    pub fn unknown() -> Self {
        Self {
            primary_intent: QueryIntent::Unknown,
            confidence: 0.0,
            entities: QueryEntities::default(),
        }
    }
}

/// 意图 -> 模式列表
struct IntentRule {
    intent: QueryIntent,
    patterns: Vec<Regex>,
}

/// (系列名, 模式)
struct SeriesRule {
    name: &'static str,
    pattern: Regex,
}

const INTENT_PATTERNS: &[(QueryIntent, &[&str])] = &[
    (
        QueryIntent::TechnicalSpec,
        &[
            r"\b(?:spec|specs|specification|specifications|datasheet)\b",
            r"\b(?:range|resolution|accuracy|zoom|field of view|fov)\b",
            r"\d+(?:\.\d+)?\s*(?:m|mm|cm|km|°c|hz|v|ma)\b",
            r"\bwhat(?:'s| is| are) the\b",
        ],
    ),
    (
        QueryIntent::ProductRecommendation,
        &[
            r"\b(?:recommend|recommendation|suggest|best|which)\b",
            r"\b(?:need|looking for|want)\b",
            r"\b(?:suitable for|ideal for|for my)\b",
        ],
    ),
    (
        QueryIntent::Compatibility,
        &[
            r"\b(?:compatible|compatibility|works? with|support|supports)\b",
            r"\b(?:pnp|npn|io-link|analog|4-20\s?ma|rs-?485|ethernet)\b",
            r"\b(?:output|interface|connect|connection)\b",
            r"\b(?:adapter|mount|bracket|cable|connector)\b",
        ],
    ),
    (
        QueryIntent::Troubleshooting,
        &[
            r"\b(?:error|fault|issue|problem|not working|fails?|failed|broken)\b",
            r"\b(?:fix|troubleshoot|troubleshooting|reset|calibrate|calibration)\b",
        ],
    ),
    (
        QueryIntent::Comparison,
        &[
            r"\b(?:vs\.?|versus|compare|comparison|difference between)\b",
            r"\b(?:better|cheaper|faster|more accurate)\b",
        ],
    ),
];

const SERIES_PATTERNS: &[(&str, &str)] = &[
    ("FLIR Exx", r"\bflir\s*e\d{1,3}\b"),
    ("FLIR Txxx", r"\bflir\s*t\d{3,4}\b"),
    ("FLIR Cx", r"\bflir\s*c\d{1,2}\b"),
    ("ifm O5D", r"\bo5d\d{0,3}\b"),
    ("SICK WTB", r"\bwtb\d{0,2}\b"),
    ("Banner Q4X", r"\bq4x\b"),
];

const FEATURE_VOCABULARY: &[&str] = &["zoom", "resolution", "accuracy", "output", "interface"];

const APPLICATION_VOCABULARY: &[&str] = &[
    "loop break detection",
    "temperature monitoring",
    "presence detection",
];

static RANGE_RE: OnceLock<Regex> = OnceLock::new();

fn range_regex() -> &'static Regex {
    RANGE_RE.get_or_init(|| {
        Regex::new(r"(\d+(?:\.\d+)?)\s*(?:to|-)\s*(\d+(?:\.\d+)?)\s*m\b").unwrap()
    })
}

/// 意图识别器：持有编译好的规则表，classify 为纯函数
pub struct IntentClassifier {
    rules: Vec<IntentRule>,
    series: Vec<SeriesRule>,
}

impl IntentClassifier {
    pub fn new() -> Self {
        let rules = INTENT_PATTERNS
            .iter()
            .map(|(intent, patterns)| IntentRule {
                intent: *intent,
                patterns: patterns.iter().map(|p| Regex::new(p).unwrap()).collect(),
            })
            .collect();
        let series = SERIES_PATTERNS
            .iter()
            .map(|&(name, pattern)| SeriesRule {
                name,
                pattern: Regex::new(pattern).unwrap(),
            })
            .collect();
        Self { rules, series }
    }

    /// 识别意图并抽取实体；空输入或无命中返回 unknown / 0
    pub fn classify(&self, text: &str) -> QueryClassification {
        let lowered = text.to_lowercase();
        if lowered.trim().is_empty() {
            return QueryClassification::unknown();
        }

        let mut primary_intent = QueryIntent::Unknown;
        let mut confidence = 0.0;
        // 严格大于才替换，平分时保留先声明的意图
        for (intent, score) in self.score_lowered(&lowered) {
            if score > confidence {
                primary_intent = intent;
                confidence = score;
            }
        }

        QueryClassification {
            primary_intent,
            confidence,
            entities: self.extract_entities(&lowered),
        }
    }

    /// 每个意图的归一化命中率，按声明顺序
    pub fn scores(&self, text: &str) -> Vec<(QueryIntent, f64)> {
        self.score_lowered(&text.to_lowercase())
    }

    fn score_lowered(&self, lowered: &str) -> Vec<(QueryIntent, f64)> {
        self.rules
            .iter()
            .map(|rule| {
                if rule.patterns.is_empty() {
                    return (rule.intent, 0.0);
                }
                let matched = rule.patterns.iter().filter(|p| p.is_match(lowered)).count();
                (rule.intent, matched as f64 / rule.patterns.len() as f64)
            })
            .collect()
    }

    fn extract_entities(&self, lowered: &str) -> QueryEntities {
        let product_series = self
            .series
            .iter()
            .filter(|s| s.pattern.is_match(lowered))
            .map(|s| s.name.to_string())
            .collect();

        let ranges = range_regex()
            .captures_iter(lowered)
            .filter_map(|caps| {
                let low = caps.get(1)?.as_str().parse().ok()?;
                let high = caps.get(2)?.as_str().parse().ok()?;
                Some(MeasuringRange { low, high })
            })
            .collect();

        QueryEntities {
            product_series,
            ranges,
            features: vocabulary_hits(lowered, FEATURE_VOCABULARY),
            applications: vocabulary_hits(lowered, APPLICATION_VOCABULARY),
        }
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn vocabulary_hits(lowered: &str, vocabulary: &[&str]) -> Vec<String> {
    vocabulary
        .iter()
        .filter(|term| lowered.contains(*term))
        .map(|term| term.to_string())
        .collect()
}
