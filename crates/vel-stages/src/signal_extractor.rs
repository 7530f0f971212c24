use crate::transcript::{round2, tone_polarity};
use crate::SkipLog;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use tracing::info;
use vel_core::{
    write_status, DatasetAccessor, ExecutionContext, PipelineError, Row, RunConfig, StageExecutor,
    StageKind, StageResult, Value,
};

static PAIN_POINTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(issue|problem|bug|broken|confus|difficult|slow|frustrat|complain|struggl)\w*").unwrap()
});

static MONETIZATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(revenue|monetiz|ads|sponsor|brand deal|cpm|rpm|membership|payout)\w*").unwrap()
});

/// Per-creator accumulator.
#[derive(Debug)]
struct Signal {
    key: Value,
    channel: Value,
    conversations: u64,
    minutes: f64,
    turns: u64,
    /// Tone counts in first-seen order.
    tones: Vec<(String, u64)>,
    polarity_sum: f64,
    polarity_n: u64,
    pain_points: u64,
    monetization: u64,
    topics: BTreeSet<String>,
    last_end: Option<DateTime<Utc>>,
}

impl Signal {
    fn new(key: Value, channel: Value) -> Self {
        Self {
            key,
            channel,
            conversations: 0,
            minutes: 0.0,
            turns: 0,
            tones: Vec::new(),
            polarity_sum: 0.0,
            polarity_n: 0,
            pain_points: 0,
            monetization: 0,
            topics: BTreeSet::new(),
            last_end: None,
        }
    }

    fn absorb(&mut self, row: &Row) {
        self.conversations += 1;

        let minutes = row
            .get_present("duration_minutes")
            .and_then(Value::as_f64)
            .or_else(|| {
                let start = row.get("recording_start")?.as_timestamp()?;
                let end = row.get("recording_end")?.as_timestamp()?;
                Some((end - start).num_seconds() as f64 / 60.0)
            })
            .unwrap_or(0.0);
        self.minutes += minutes.max(0.0);

        let transcript = row
            .get_present("raw_transcript")
            .and_then(Value::as_str)
            .unwrap_or("");
        self.turns += row
            .get_present("turn_count")
            .and_then(Value::as_i64)
            .map(|n| n.max(0) as u64)
            .unwrap_or_else(|| transcript.lines().filter(|l| !l.trim().is_empty()).count() as u64);
        self.pain_points += PAIN_POINTS.find_iter(transcript).count() as u64;
        self.monetization += MONETIZATION.find_iter(transcript).count() as u64;

        if let Some(tone) = row.get_present("creator_tone").and_then(Value::as_str) {
            let tone = tone.trim().to_ascii_lowercase();
            if let Some(p) = tone_polarity(&tone) {
                self.polarity_sum += p;
                self.polarity_n += 1;
            }
            match self.tones.iter_mut().find(|(t, _)| *t == tone) {
                Some((_, n)) => *n += 1,
                None => self.tones.push((tone, 1)),
            }
        }

        if let Some(topic) = row.get_present("product_topic").and_then(Value::as_str) {
            let topic = topic.trim();
            if !topic.is_empty() {
                self.topics.insert(topic.to_string());
            }
        }

        if let Some(end) = row.get("recording_end").and_then(Value::as_timestamp) {
            self.last_end = Some(self.last_end.map_or(end, |prev| prev.max(end)));
        }

        if self.channel.is_null() {
            if let Some(channel) = row.get_present("channel_name") {
                self.channel = channel.clone();
            }
        }
    }

    fn dominant_tone(&self) -> Value {
        let mut best: Option<&(String, u64)> = None;
        for entry in &self.tones {
            if best.map_or(true, |b| entry.1 > b.1) {
                best = Some(entry);
            }
        }
        best.map(|(t, _)| Value::from(t.as_str())).unwrap_or(Value::Null)
    }

    fn engagement(avg_minutes: f64, avg_turns: f64) -> &'static str {
        if avg_minutes >= 30.0 && avg_turns >= 10.0 {
            "high"
        } else if avg_minutes >= 15.0 || avg_turns >= 6.0 {
            "medium"
        } else {
            "low"
        }
    }

    fn into_row(self) -> Row {
        let n = self.conversations.max(1) as f64;
        let avg_minutes = self.minutes / n;
        let avg_turns = self.turns as f64 / n;
        let sentiment = if self.polarity_n == 0 {
            0.0
        } else {
            round2(self.polarity_sum / self.polarity_n as f64)
        };
        let dominant = self.dominant_tone();

        Row::new()
            .with("creator_key", self.key)
            .with("channel_name", self.channel)
            .with("conversation_count", self.conversations as i64)
            .with("total_minutes", round2(self.minutes))
            .with("avg_minutes", round2(avg_minutes))
            .with("dominant_tone", dominant)
            .with("sentiment_score", sentiment)
            .with("pain_point_mentions", self.pain_points as i64)
            .with("monetization_mentions", self.monetization as i64)
            .with("engagement", Self::engagement(avg_minutes, avg_turns))
            .with("topics", self.topics.into_iter().collect::<Vec<_>>().join(";"))
            .with(
                "last_recording_end",
                self.last_end
                    .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
            )
    }
}

/// Aggregates transcript rows into one signal row per creator.
#[derive(Debug, Default, Clone)]
pub struct SignalExtractor;

impl SignalExtractor {
    pub fn default_target(source_version: &str) -> String {
        format!("{}_signals", source_version)
    }

    /// Grouping key of a row: `creator_id`, else `channel_name`.
    fn creator_key(row: &Row) -> Option<&Value> {
        row.get_present("creator_id")
            .or_else(|| row.get_present("channel_name"))
    }

    /// Aggregate `rows` into signal rows, in first-appearance order of each
    /// creator. Rows without a creator key are reported through `skips`.
    fn extract<'a>(rows: impl Iterator<Item = &'a Row>, skips: &mut SkipLog) -> Vec<Row> {
        let mut order: Vec<Signal> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for (i, row) in rows.enumerate() {
            let Some(key) = Self::creator_key(row) else {
                skips.record(i, row, "no creator_id or channel_name");
                continue;
            };
            let slot = *index.entry(key.join_key()).or_insert_with(|| {
                let channel = row.get_present("channel_name").cloned().unwrap_or(Value::Null);
                order.push(Signal::new(key.clone(), channel));
                order.len() - 1
            });
            order[slot].absorb(row);
        }

        order.into_iter().map(Signal::into_row).collect()
    }
}

#[async_trait]
impl StageExecutor for SignalExtractor {
    fn kind(&self) -> StageKind {
        StageKind::SignalExtractor
    }

    fn id(&self) -> &'static str {
        "signal.extract.v1"
    }

    async fn run(
        &self,
        config: &RunConfig,
        accessor: &dyn DatasetAccessor,
        ctx: &ExecutionContext,
    ) -> Result<StageResult, PipelineError> {
        let target = config
            .target_label()
            .map(str::to_string)
            .unwrap_or_else(|| Self::default_target(&config.source_version));

        let source = ctx
            .bounded(
                "reading source version",
                accessor.read_version(&config.scope, &config.source_version, config.limit),
            )
            .await?;

        let mut skips = SkipLog::default();
        let signals = Self::extract(source.iter(), &mut skips);

        let processed = source.len() as u64;
        let written = if signals.is_empty() {
            0
        } else {
            ctx.bounded(
                "writing target version",
                accessor.write_version(&config.scope, &target, signals, config.overwrite),
            )
            .await?
        };

        let status = write_status(processed, written, skips.count());
        info!(processed, written, skipped = skips.count(), target_version = %target, "signals extracted");

        let mut result = StageResult::new(
            self.kind(),
            status,
            skips.summarize(format!(
                "extracted {} creator signals from {} transcript rows into '{}'",
                written, processed, target
            )),
        );
        result.rows_processed = processed;
        result.rows_written = written;
        result.rows_skipped = skips.count();
        result.target_version = Some(target);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript(id: &str, creator: i64, tone: &str, minutes: f64, topic: &str, text: &str) -> Row {
        Row::new()
            .with("conversation_id", id)
            .with("creator_id", creator)
            .with("channel_name", format!("channel-{}", creator))
            .with("product_topic", topic)
            .with("creator_tone", tone)
            .with("recording_end", format!("2024-03-0{}T10:00:00Z", id.len()))
            .with("duration_minutes", minutes)
            .with("raw_transcript", text)
    }

    #[test]
    fn test_groups_in_first_appearance_order() {
        let rows = vec![
            transcript("a", 7, "positive", 40.0, "Shorts", "Creator: ad revenue is up, sponsors too"),
            transcript("bb", 3, "frustrated", 10.0, "Analytics", "Creator: the dashboard is slow and confusing"),
            transcript("ccc", 7, "neutral", 20.0, "Live", "Creator: no complaints"),
        ];
        let mut skips = SkipLog::default();
        let signals = SignalExtractor::extract(rows.iter(), &mut skips);

        assert_eq!(skips.count(), 0);
        assert_eq!(signals.len(), 2);
        let first = &signals[0];
        assert_eq!(first.get("creator_key"), Some(&Value::Int(7)));
        assert_eq!(first.get("conversation_count"), Some(&Value::Int(2)));
        assert_eq!(first.get("total_minutes"), Some(&Value::Float(60.0)));
        assert_eq!(first.get("avg_minutes"), Some(&Value::Float(30.0)));
        assert_eq!(first.get("dominant_tone"), Some(&Value::from("positive")));
        assert_eq!(first.get("sentiment_score"), Some(&Value::Float(0.5)));
        assert_eq!(first.get("monetization_mentions"), Some(&Value::Int(2)));
        assert_eq!(first.get("pain_point_mentions"), Some(&Value::Int(1)));
        assert_eq!(first.get("topics"), Some(&Value::from("Live;Shorts")));
        assert_eq!(first.get("last_recording_end"), Some(&Value::from("2024-03-03T10:00:00Z")));

        let second = &signals[1];
        assert_eq!(second.get("creator_key"), Some(&Value::Int(3)));
        assert_eq!(second.get("pain_point_mentions"), Some(&Value::Int(2)));
        assert_eq!(second.get("sentiment_score"), Some(&Value::Float(-1.0)));
        assert_eq!(second.get("engagement"), Some(&Value::from("low")));
    }

    #[test]
    fn test_falls_back_to_channel_and_skips_keyless_rows() {
        let rows = vec![
            Row::new().with("conversation_id", "x").with("channel_name", "Solo"),
            Row::new().with("conversation_id", "y"),
        ];
        let mut skips = SkipLog::default();
        let signals = SignalExtractor::extract(rows.iter(), &mut skips);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].get("creator_key"), Some(&Value::from("Solo")));
        assert_eq!(signals[0].get("dominant_tone"), Some(&Value::Null));
        assert_eq!(skips.count(), 1);
    }
}
