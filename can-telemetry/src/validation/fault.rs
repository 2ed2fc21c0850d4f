//! Fault code lookup for `mappedError` rules

use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Integer fault code -> human description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FaultCodeTable {
    codes: BTreeMap<i64, String>,
}

impl FaultCodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: i64, description: impl Into<String>) {
        self.codes.insert(code, description.into());
    }

    pub fn get(&self, code: i64) -> Option<&str> {
        self.codes.get(&code).map(String::as_str)
    }

    /// Description of a code. Codes missing from the table are not an
    /// error; they get a generic description.
    pub fn describe(&self, code: i64) -> Cow<'_, str> {
        match self.codes.get(&code) {
            Some(description) => Cow::Borrowed(description.as_str()),
            None => Cow::Owned(format!("unknown fault code {}", code)),
        }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(i64, S)> for FaultCodeTable {
    fn from_iter<T: IntoIterator<Item = (i64, S)>>(iter: T) -> Self {
        Self {
            codes: iter.into_iter().map(|(k, v)| (k, v.into())).collect(),
        }
    }
}

/// Parse a code literal: decimal (`12`, `-3`) or hex (`0x1F`)
pub fn parse_code(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };

    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_known_and_unknown() {
        let table: FaultCodeTable = [(1, "Overvoltage"), (2, "Undervoltage")].into_iter().collect();
        assert_eq!(table.describe(2), "Undervoltage");
        assert!(matches!(table.describe(2), Cow::Borrowed(_)));
        assert_eq!(table.describe(5), "unknown fault code 5");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_parse_code_literals() {
        assert_eq!(parse_code("12"), Some(12));
        assert_eq!(parse_code("0x1F"), Some(31));
        assert_eq!(parse_code(" 0X0 "), Some(0));
        assert_eq!(parse_code("-3"), Some(-3));
        assert_eq!(parse_code("0xZZ"), None);
        assert_eq!(parse_code("twelve"), None);
    }
}
