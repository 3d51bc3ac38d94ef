use crate::{
    predicate::{CompareOp, ComparePredicate, Predicate},
    record::Record,
    value::Value,
};
use std::cmp::Ordering;

impl Predicate {
    /// Evaluate the predicate against one record.
    ///
    /// Missing fields read as `Null`. Ordering comparisons against values
    /// that are not mutually orderable are false, never an error.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::And(preds) => preds.iter().all(|p| p.matches(record)),
            Self::Or(preds) => preds.iter().any(|p| p.matches(record)),
            Self::Not(inner) => !inner.matches(record),
            Self::Compare(cmp) => compare_matches(cmp, record.get(&cmp.field)),
        }
    }
}

fn compare_matches(cmp: &ComparePredicate, actual: &Value) -> bool {
    let ord = || Value::semantic_cmp(actual, &cmp.value);

    match cmp.op {
        CompareOp::Eq => Value::semantic_eq(actual, &cmp.value),
        CompareOp::Ne => !Value::semantic_eq(actual, &cmp.value),
        CompareOp::Lt => ord() == Some(Ordering::Less),
        CompareOp::Lte => matches!(ord(), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => ord() == Some(Ordering::Greater),
        CompareOp::Gte => matches!(ord(), Some(Ordering::Greater | Ordering::Equal)),
        CompareOp::In => list_contains(&cmp.value, actual),
        CompareOp::NotIn => !list_contains(&cmp.value, actual),
        CompareOp::Like => match (actual.as_text(), cmp.value.as_text()) {
            (Some(text), Some(pattern)) => like_matches(text, pattern),
            _ => false,
        },
    }
}

fn list_contains(list: &Value, actual: &Value) -> bool {
    match list {
        Value::List(items) => items.iter().any(|item| Value::semantic_eq(actual, item)),
        other => Value::semantic_eq(actual, other),
    }
}

/// SQL `LIKE` matching: `%` matches any run, `_` matches one character,
/// `\` escapes the next character. Case-sensitive.
#[must_use]
pub fn like_matches(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern = tokenize(pattern);

    // dp[j] == text[..i] matches pattern[..j]
    let mut dp = vec![false; pattern.len() + 1];
    dp[0] = true;
    for (j, token) in pattern.iter().enumerate() {
        dp[j + 1] = dp[j] && matches!(token, LikeToken::AnyRun);
    }

    for ch in &text {
        let mut next = vec![false; pattern.len() + 1];
        for (j, token) in pattern.iter().enumerate() {
            next[j + 1] = match token {
                LikeToken::AnyRun => next[j] || dp[j + 1],
                LikeToken::AnyOne => dp[j],
                LikeToken::Literal(c) => dp[j] && c == ch,
            };
        }
        dp = next;
    }

    dp[pattern.len()]
}

///
/// LikeToken
///

enum LikeToken {
    AnyRun,
    AnyOne,
    Literal(char),
}

fn tokenize(pattern: &str) -> Vec<LikeToken> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => LikeToken::AnyRun,
            '_' => LikeToken::AnyOne,
            '\\' => LikeToken::Literal(chars.next().unwrap_or('\\')),
            other => LikeToken::Literal(other),
        });
    }

    tokens
}
