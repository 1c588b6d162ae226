// src/normalize/mod.rs

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Field names of a historical-prices row, in column order.
pub const FIELD_NAMES: [&str; 7] = ["date", "volume", "open", "close", "high", "low", "adjclose"];

/// One row of a prices CSV, reshaped into named fields.
///
/// Values are kept as raw text; typing happens at the sink. A field is `None`
/// when the source line ran out of values before reaching it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub date: Option<String>,
    pub volume: Option<String>,
    pub open: Option<String>,
    pub close: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub adjclose: Option<String>,
}

impl NormalizedRecord {
    fn slots(&self) -> [&Option<String>; 7] {
        [
            &self.date,
            &self.volume,
            &self.open,
            &self.close,
            &self.high,
            &self.low,
            &self.adjclose,
        ]
    }

    fn slots_mut(&mut self) -> [&mut Option<String>; 7] {
        [
            &mut self.date,
            &mut self.volume,
            &mut self.open,
            &mut self.close,
            &mut self.high,
            &mut self.low,
            &mut self.adjclose,
        ]
    }

    /// Present `(name, value)` pairs, always in `FIELD_NAMES` order.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        FIELD_NAMES
            .iter()
            .zip(self.slots())
            .filter_map(|(name, v)| v.as_deref().map(|v| (*name, v)))
            .collect()
    }

    /// Value for `name`, or `None` if absent or not a known field.
    pub fn get(&self, name: &str) -> Option<&str> {
        let idx = FIELD_NAMES.iter().position(|n| *n == name)?;
        self.slots()[idx].as_deref()
    }

    pub fn len(&self) -> usize {
        self.slots().iter().filter(|v| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serializes as a map holding only the present fields, in column order.
impl Serialize for NormalizedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = self.fields();
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for (name, value) in fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Reshape one raw CSV line into a `NormalizedRecord`.
///
/// 1) strip every `"` anywhere in the line
/// 2) strip every `\r\n`
/// 3) split on `,` with no quote awareness, so a comma that sat inside a
///    quoted field still splits it
/// 4) pair values with `FIELD_NAMES` up to the shorter of the two; missing
///    trailing fields stay `None`, surplus values are dropped
///
/// Never fails.
pub fn parse_line(line: &str) -> NormalizedRecord {
    let cleaned = line.replace('"', "").replace("\r\n", "");

    let mut record = NormalizedRecord::default();
    for (slot, value) in record.slots_mut().into_iter().zip(cleaned.split(',')) {
        *slot = Some(value.to_string());
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn full_row_maps_every_field() {
        let rec = parse_line("2020-01-02,1000,10.5,10.6,10.7,10.4,10.55");
        assert_eq!(
            rec.fields(),
            vec![
                ("date", "2020-01-02"),
                ("volume", "1000"),
                ("open", "10.5"),
                ("close", "10.6"),
                ("high", "10.7"),
                ("low", "10.4"),
                ("adjclose", "10.55"),
            ]
        );
    }

    #[rstest]
    #[case::plain("2020-01-02", "2020-01-02")]
    #[case::quoted("\"2020-01-02\"", "2020-01-02")]
    #[case::crlf("2020-01-02\r\n", "2020-01-02")]
    #[case::empty("", "")]
    #[case::inner_quote("ab\"cd", "abcd")]
    fn no_delimiter_yields_single_date(#[case] input: &str, #[case] expected: &str) {
        let rec = parse_line(input);
        assert_eq!(rec.len(), 1);
        assert_eq!(rec.get("date"), Some(expected));
    }

    #[test]
    fn quotes_removed_anywhere() {
        let rec = parse_line("\"2020-01-02\",1000,\"10\".5,10.6,10.7,10.4,10.55\"");
        assert_eq!(rec.get("date"), Some("2020-01-02"));
        assert_eq!(rec.get("open"), Some("10.5"));
        assert_eq!(rec.get("adjclose"), Some("10.55"));
    }

    #[test]
    fn trailing_crlf_stripped_from_last_field() {
        let rec = parse_line("2020-01-02,1000,10.5,10.6,10.7,10.4,10.55\r\n");
        assert_eq!(rec.get("adjclose"), Some("10.55"));
    }

    #[test]
    fn lone_cr_or_lf_is_kept() {
        let rec = parse_line("2020-01-02,1000\n");
        assert_eq!(rec.get("volume"), Some("1000\n"));
    }

    #[test]
    fn short_row_keeps_leading_fields_only() {
        let rec = parse_line("2020-01-02,1000");
        assert_eq!(rec.fields(), vec![("date", "2020-01-02"), ("volume", "1000")]);
        assert_eq!(rec.get("open"), None);
        assert_eq!(rec.close, None);
    }

    #[test]
    fn extra_values_are_dropped() {
        let rec = parse_line("2020-01-02,1,2,3,4,5,6,7,8");
        assert_eq!(rec.len(), 7);
        assert_eq!(rec.get("adjclose"), Some("6"));
    }

    #[test]
    fn quoted_comma_still_splits() {
        let rec = parse_line("\"1,000\",x");
        assert_eq!(rec.get("date"), Some("1"));
        assert_eq!(rec.get("volume"), Some("000"));
        assert_eq!(rec.get("open"), Some("x"));
    }

    #[test]
    fn empty_values_are_present() {
        let rec = parse_line("2020-01-02,,10.5");
        assert_eq!(rec.get("volume"), Some(""));
        assert_eq!(rec.len(), 3);
    }

    #[test]
    fn same_input_same_output() {
        let line = "\"2020-01-02\",1000,10.5\r\n";
        assert_eq!(parse_line(line), parse_line(line));
    }

    #[test]
    fn unknown_field_name_is_none() {
        let rec = parse_line("2020-01-02");
        assert_eq!(rec.get("ticker"), None);
    }

    #[test]
    fn serializes_present_fields_in_order() -> anyhow::Result<()> {
        let rec = parse_line("2020-01-02,1000,10.5");
        let json = serde_json::to_string(&rec)?;
        assert_eq!(json, r#"{"date":"2020-01-02","volume":"1000","open":"10.5"}"#);
        Ok(())
    }
}
