//! 回复校验：助手回复转发前的质量闸门
//!
//! 默认认为回复「不含糊」，逐项累加含糊指标，达到阈值才拒绝。单独一个指标不足以拦截。

use super::intent::QueryClassification;

/// 拒绝所需的含糊指标数
pub const BLOCK_THRESHOLD: usize = 2;

pub const ISSUE_NO_SPECIFICS: &str = "the answer contains no concrete values or product details";
pub const ISSUE_HEDGING: &str = "the answer sounds uncertain or evasive";

/// 多字母锚点按子串匹配
const ANCHOR_SUBSTRINGS: &[&str] = &[
    "meter", "metre", "range", "sensor", "camera", "thermal", "flir", "detector", "series",
    "model",
];

/// 单字母锚点只按独立词匹配（否则几乎所有英文都会命中）
const ANCHOR_TOKENS: &[&str] = &["m"];

const HEDGING_PHRASES: &[&str] = &["i don't know", "not sure", "sorry, i can't", "cannot answer"];

/// 校验结果：是否放行 + 按固定顺序排列的问题描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub approved: bool,
    pub issues: Vec<String>,
}

/// 回复校验器（纯函数，不失败）
#[derive(Debug, Default)]
pub struct ResponseValidator;

impl ResponseValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, classification: &QueryClassification, reply: &str) -> ValidationResult {
        let lowered = reply.to_lowercase();
        let mut issues = Vec::new();

        if lacks_specifics(&lowered) {
            issues.push(ISSUE_NO_SPECIFICS.to_string());
        }
        if HEDGING_PHRASES.iter().any(|p| lowered.contains(p)) {
            issues.push(ISSUE_HEDGING.to_string());
        }

        let approved = issues.len() < BLOCK_THRESHOLD;
        tracing::debug!(
            intent = classification.primary_intent.as_str(),
            indicators = issues.len(),
            approved,
            "reply validated"
        );
        ValidationResult { approved, issues }
    }
}

/// 无数字且无任何领域锚点
fn lacks_specifics(lowered: &str) -> bool {
    if lowered.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    if ANCHOR_SUBSTRINGS.iter().any(|a| lowered.contains(a)) {
        return false;
    }
    !lowered
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .any(|w| ANCHOR_TOKENS.contains(&w))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(reply: &str) -> ValidationResult {
        ResponseValidator::new().validate(&QueryClassification::unknown(), reply)
    }

    #[test]
    fn test_digits_without_hedging_approved() {
        let r = validate("The E95 offers a 42° lens with 464 x 348 resolution.");
        assert!(r.approved);
        assert!(r.issues.is_empty());
    }

    #[test]
    fn test_single_indicator_still_approved() {
        let r = validate("Please contact your local distributor for pricing.");
        assert!(r.approved);
        assert_eq!(r.issues, vec![ISSUE_NO_SPECIFICS.to_string()]);
    }

    #[test]
    fn test_hedging_alone_still_approved() {
        let r = validate("I'm not sure, but the 2 m model should fit.");
        assert!(r.approved);
        assert_eq!(r.issues, vec![ISSUE_HEDGING.to_string()]);
    }

    #[test]
    fn test_vague_hedging_rejected_with_both_issues() {
        let r = validate("I'm not sure, please check the manual.");
        assert!(!r.approved);
        assert_eq!(
            r.issues,
            vec![ISSUE_NO_SPECIFICS.to_string(), ISSUE_HEDGING.to_string()]
        );
    }

    #[test]
    fn test_standalone_metre_token_is_anchor() {
        let r = validate("It reaches about seven m in good light.");
        assert!(r.issues.is_empty());
    }
}
