use std::collections::{BTreeMap, HashMap};

use bytes::{Buf, BytesMut};
use serde_json::Value;

use super::models::{ServiceUsage, UsageRecord, OTHER_CONSUMER};
use crate::rounding::round_to;

/// Lines shorter than this cannot hold a record and are rejected unparsed.
pub const MIN_LINE_LEN: usize = 10;

/// Result of feeding one line to [`LineRecordParser::parse`].
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Accepted(UsageRecord),
    Discarded,
}

/// key: billing-feed -> line-delimited record decoding
#[derive(Debug, Clone)]
pub struct LineRecordParser {
    services: Vec<String>,
}

impl LineRecordParser {
    pub fn new<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            services: services.into_iter().map(Into::into).collect(),
        }
    }

    pub fn parse(&self, line: &str) -> LineOutcome {
        if line.len() < MIN_LINE_LEN {
            return LineOutcome::Discarded;
        }
        // A line naming no recognized service cannot decode to one.
        if !self.services.iter().any(|name| line.contains(name.as_str())) {
            return LineOutcome::Discarded;
        }
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            return LineOutcome::Discarded;
        };
        let Some(service_name) = value.get("ServiceName").and_then(Value::as_str) else {
            return LineOutcome::Discarded;
        };
        if !self.services.iter().any(|name| name == service_name) {
            return LineOutcome::Discarded;
        }

        let consumed_quantity = value
            .get("ConsumedQuantity")
            .map(lenient_number)
            .unwrap_or(0.0);
        let consumer_tag = value
            .get("Tags")
            .and_then(|tags| tags.get("ProjectName"))
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .unwrap_or(OTHER_CONSUMER);

        LineOutcome::Accepted(UsageRecord {
            service_name: service_name.to_string(),
            consumed_quantity,
            consumer_tag: consumer_tag.to_string(),
        })
    }
}

/// Reads a JSON number or numeric string, anything else counts as zero.
pub fn lenient_number(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|number| number.is_finite()).unwrap_or(0.0)
}

/// Folds feed lines into per-service totals.
#[derive(Debug)]
pub struct UsageAggregator {
    parser: LineRecordParser,
    usage: HashMap<String, ServiceUsage>,
    accepted: usize,
}

impl UsageAggregator {
    pub fn new(parser: LineRecordParser) -> Self {
        Self {
            parser,
            usage: HashMap::new(),
            accepted: 0,
        }
    }

    pub fn push_line(&mut self, line: &str) {
        if let LineOutcome::Accepted(record) = self.parser.parse(line) {
            self.record(record);
        }
    }

    pub fn record(&mut self, record: UsageRecord) {
        self.accepted += 1;
        self.usage
            .entry(record.service_name)
            .or_default()
            .add(&record.consumer_tag, record.consumed_quantity);
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Rounds every total and sub-total to 3 places. Services that never
    /// received a record are absent.
    pub fn finish(self) -> BTreeMap<String, ServiceUsage> {
        self.usage
            .into_iter()
            .map(|(service, usage)| {
                let per_consumer = usage
                    .per_consumer
                    .into_iter()
                    .map(|(consumer, quantity)| (consumer, round_to(quantity, 3)))
                    .collect();
                let rounded = ServiceUsage {
                    total: round_to(usage.total, 3),
                    per_consumer,
                };
                (service, rounded)
            })
            .collect()
    }
}

/// Aggregates an in-memory feed.
pub fn aggregate_lines<I, S>(parser: LineRecordParser, lines: I) -> BTreeMap<String, ServiceUsage>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut aggregator = UsageAggregator::new(parser);
    for line in lines {
        aggregator.push_line(line.as_ref());
    }
    aggregator.finish()
}

/// Splits a chunked byte stream on `\n` without waiting for the whole body.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: BytesMut,
    /// Prefix of `pending` already known to hold no `\n`.
    scanned: usize,
}

impl LineBuffer {
    /// Appends `chunk` and hands every completed line to `sink`.
    pub fn extend<F: FnMut(&str)>(&mut self, chunk: &[u8], mut sink: F) {
        self.pending.extend_from_slice(chunk);
        while let Some(offset) = self.pending[self.scanned..]
            .iter()
            .position(|byte| *byte == b'\n')
        {
            let line = self.pending.split_to(self.scanned + offset);
            self.pending.advance(1);
            self.scanned = 0;
            if let Ok(text) = std::str::from_utf8(&line) {
                sink(text);
            }
        }
        self.scanned = self.pending.len();
    }

    /// Flushes a trailing line that had no terminator.
    pub fn finish<F: FnMut(&str)>(self, mut sink: F) {
        if self.pending.is_empty() {
            return;
        }
        if let Ok(text) = std::str::from_utf8(&self.pending) {
            sink(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UsageCatalog;
    use serde_json::json;

    fn parser() -> LineRecordParser {
        LineRecordParser::new(UsageCatalog::standard().service_names())
    }

    fn line(service: &str, qty: Value, tag: Option<&str>) -> String {
        let mut record = json!({
            "ServiceName": service,
            "ConsumedQuantity": qty,
            "BilledCost": 0,
        });
        if let Some(tag) = tag {
            record["Tags"] = json!({ "ProjectName": tag });
        }
        record.to_string()
    }

    #[test]
    fn build_minutes_split_by_consumer() {
        let lines = vec![
            line("Build Minutes", json!(10), Some("pole")),
            line("Build Minutes", json!(5), Some("pitch")),
        ];
        let totals = aggregate_lines(parser(), &lines);
        let build = &totals["Build Minutes"];
        assert_eq!(build.total, 15.0);
        assert_eq!(build.per_consumer.len(), 2);
        assert_eq!(build.per_consumer["pole"], 10.0);
        assert_eq!(build.per_consumer["pitch"], 5.0);
    }

    #[test]
    fn consumer_sums_match_total() {
        let quantities = [0.1234, 7.0005, 3.333_33, 0.000_4, 12.5, 0.9999];
        let tags = [Some("pole"), Some("pitch"), None, Some("smart"), Some("pole"), None];
        let lines: Vec<String> = quantities
            .iter()
            .zip(tags)
            .map(|(qty, tag)| line("Function Duration", json!(qty), tag))
            .collect();
        let totals = aggregate_lines(parser(), &lines);
        let usage = &totals["Function Duration"];
        let sum: f64 = usage.per_consumer.values().sum();
        assert!((sum - usage.total).abs() <= 0.001, "{sum} vs {}", usage.total);
        assert!(usage.per_consumer.contains_key(OTHER_CONSUMER));
    }

    #[test]
    fn short_and_unrecognized_lines_never_count() {
        assert_eq!(parser().parse("{\"a\":1}"), LineOutcome::Discarded);
        assert_eq!(parser().parse(""), LineOutcome::Discarded);
        let unknown = line("Edge Requests", json!(100), Some("pole"));
        assert_eq!(parser().parse(&unknown), LineOutcome::Discarded);

        let totals = aggregate_lines(parser(), vec!["Build Min", unknown.as_str()]);
        assert!(totals.is_empty());
    }

    #[test]
    fn service_name_only_in_tag_is_discarded() {
        let tagged = line("Edge Requests", json!(3), Some("Build Minutes"));
        assert_eq!(parser().parse(&tagged), LineOutcome::Discarded);
    }

    #[test]
    fn record_is_matched_on_decoded_service_name() {
        // Mentions another service first, decodes to a recognized one.
        let mixed = line("Fast Data Transfer", json!(2), Some("Build Minutes"));
        match parser().parse(&mixed) {
            LineOutcome::Accepted(record) => {
                assert_eq!(record.service_name, "Fast Data Transfer");
                assert_eq!(record.consumer_tag, "Build Minutes");
            }
            LineOutcome::Discarded => panic!("line should be accepted"),
        }
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let lines = vec![
            "{\"ServiceName\": \"Build Minutes\", \"ConsumedQuantity\": ".to_string(),
            "not json at all but mentions Build Minutes".to_string(),
            "[\"Build Minutes\", 12]".to_string(),
            line("Build Minutes", json!(4), Some("smart")),
        ];
        let totals = aggregate_lines(parser(), &lines);
        assert_eq!(totals.len(), 1);
        assert_eq!(totals["Build Minutes"].total, 4.0);
    }

    #[test]
    fn quantity_and_tag_defaults() {
        let cases = [
            (json!("2.5"), 2.5),
            (json!("abc"), 0.0),
            (Value::Null, 0.0),
            (json!({"v": 1}), 0.0),
        ];
        for (qty, expected) in cases {
            match parser().parse(&line("Function Invocations", qty, Some(""))) {
                LineOutcome::Accepted(record) => {
                    assert_eq!(record.consumed_quantity, expected);
                    assert_eq!(record.consumer_tag, OTHER_CONSUMER);
                }
                LineOutcome::Discarded => panic!("line should be accepted"),
            }
        }
    }

    #[test]
    fn totals_are_rounded_to_three_places() {
        let lines = vec![
            line("Fast Data Transfer", json!(0.12345), Some("pole")),
            line("Fast Data Transfer", json!(0.00001), Some("pole")),
        ];
        let totals = aggregate_lines(parser(), &lines);
        assert_eq!(totals["Fast Data Transfer"].total, 0.123);
        assert_eq!(totals["Fast Data Transfer"].per_consumer["pole"], 0.123);
    }

    #[test]
    fn line_buffer_reassembles_chunks() {
        let mut buffer = LineBuffer::default();
        let mut lines = Vec::new();
        buffer.extend(b"first li", |line| lines.push(line.to_string()));
        buffer.extend(b"ne\nsecond\n\nthi", |line| lines.push(line.to_string()));
        buffer.extend(&[0xff, b'\n'], |line| lines.push(line.to_string()));
        buffer.extend(b"rd", |line| lines.push(line.to_string()));
        buffer.finish(|line| lines.push(line.to_string()));
        assert_eq!(lines, vec!["first line", "second", "", "rd"]);
    }

    #[test]
    fn line_buffer_does_not_rescan_a_long_partial_line() {
        let mut buffer = LineBuffer::default();
        let mut lines = Vec::new();
        for _ in 0..1000 {
            buffer.extend(b"abcdefgh", |line| lines.push(line.to_string()));
        }
        assert!(lines.is_empty());
        assert_eq!(buffer.scanned, 8000);
        buffer.extend(b"!\nnext", |line| lines.push(line.to_string()));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), 8001);
        assert!(lines[0].ends_with("gh!"));
        assert_eq!(buffer.scanned, 4);
        buffer.finish(|line| lines.push(line.to_string()));
        assert_eq!(lines[1], "next");
    }
}
