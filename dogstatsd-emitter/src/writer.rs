use metrics::{Key, Label};
use thiserror::Error;

use crate::emitter::EmitError;

// Characters that delimit the fields of a statsd line, and so can never appear in a metric name.
const RESERVED_NAME_CHARS: &[char] = &[':', '|', '@', '#', ',', '\n'];

// A tag key ends at the first `:`, so it may not contain one. Values may, as the first `:` splits the tag.
const RESERVED_TAG_KEY_CHARS: &[char] = &[':', '|', ',', '\n'];
const RESERVED_TAG_VALUE_CHARS: &[char] = &['|', ',', '\n'];

/// A single counter sample.
///
/// Samples are cheap, throwaway values: one is built for each emission and dropped as soon as it has been serialized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricSample {
    key: Key,
    value: i64,
}

impl MetricSample {
    /// Creates a counter sample.
    ///
    /// Tags are kept in the iteration order of `tags`.
    pub fn counter<N, I, K, V>(name: N, value: i64, tags: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let labels = tags
            .into_iter()
            .map(|(k, v)| Label::new(k.as_ref().to_owned(), v.as_ref().to_owned()))
            .collect::<Vec<_>>();

        Self { key: Key::from_parts(name.into(), labels), value }
    }

    /// Returns the metric name.
    pub fn name(&self) -> &str {
        self.key.name()
    }

    /// Returns the sample value.
    pub const fn value(&self) -> i64 {
        self.value
    }

    /// Returns the tags attached to the sample, in insertion order.
    pub fn tags(&self) -> impl Iterator<Item = &Label> {
        self.key.labels()
    }

    /// Returns the metric key.
    pub const fn key(&self) -> &Key {
        &self.key
    }
}

/// Formats a counter sample as a DogStatsD line: `<name>:<value>|c[|#<k>:<v>,...]`.
///
/// The line carries no trailing newline, as it is meant to be sent as a datagram of its own.
///
/// # Errors
///
/// If the metric name is empty, a tag key is empty, or either contains a character that is reserved by the wire
/// format, an error is returned.
pub fn format_counter(sample: &MetricSample) -> Result<String, EmitError> {
    let name = sample.name();
    if name.is_empty() {
        return Err(EmitError::EmptyName);
    }
    if name.contains(RESERVED_NAME_CHARS) {
        return Err(EmitError::InvalidName { name: name.to_owned() });
    }
    if let Some(tag) = sample.tags().find(|tag| !is_valid_tag(tag)) {
        return Err(EmitError::InvalidTag { key: tag.key().to_owned(), value: tag.value().to_owned() });
    }

    let mut int_writer = itoa::Buffer::new();
    let value = int_writer.format(sample.value);

    let mut buf = String::with_capacity(name.len() + value.len() + 3);
    buf.push_str(name);
    buf.push(':');
    buf.push_str(value);
    buf.push_str("|c");

    let mut wrote_tag = false;
    for tag in sample.tags() {
        if wrote_tag {
            buf.push(',');
        } else {
            buf.push_str("|#");
            wrote_tag = true;
        }

        write_tag(&mut buf, tag);
    }

    Ok(buf)
}

fn is_valid_tag(label: &Label) -> bool {
    !label.key().is_empty()
        && !label.key().contains(RESERVED_TAG_KEY_CHARS)
        && !label.value().contains(RESERVED_TAG_VALUE_CHARS)
}

fn write_tag(buf: &mut String, label: &Label) {
    // An empty value is written as a bare tag: `label_name` rather than `label_name:`.
    buf.push_str(label.key());
    if label.value().is_empty() {
        return;
    }

    buf.push(':');
    buf.push_str(label.value());
}

/// Errors that could occur while parsing a DogStatsD counter line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The line has no `:` between the name and the value.
    #[error("missing name/value separator")]
    MissingValue,

    /// The metric name is empty.
    #[error("empty metric name")]
    EmptyName,

    /// The value is not a signed 64-bit integer.
    #[error("invalid counter value '{value}'")]
    InvalidValue {
        /// The value as it appeared on the line.
        value: String,
    },

    /// The metric type is not `c`.
    #[error("unsupported metric type '{kind}' (expected 'c')")]
    UnsupportedType {
        /// The metric type as it appeared on the line.
        kind: String,
    },

    /// A field after the metric type was not understood.
    #[error("unsupported field '{field}'")]
    UnsupportedField {
        /// The field as it appeared on the line.
        field: String,
    },
}

/// Parses a DogStatsD counter line back into a [`MetricSample`].
///
/// A single trailing newline is tolerated. Tags without a `:` are parsed as bare tags, with an empty value.
///
/// # Errors
///
/// If the line is not a well-formed counter line, an error is returned describing the first problem encountered.
pub fn parse_counter(line: &str) -> Result<MetricSample, ParseError> {
    let line = line.strip_suffix('\n').unwrap_or(line);

    let mut fields = line.split('|');
    let name_value = fields.next().unwrap_or_default();
    let (name, value) = name_value.rsplit_once(':').ok_or(ParseError::MissingValue)?;
    if name.is_empty() {
        return Err(ParseError::EmptyName);
    }
    let value = value
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidValue { value: value.to_owned() })?;

    match fields.next() {
        Some("c") => {}
        kind => return Err(ParseError::UnsupportedType { kind: kind.unwrap_or_default().to_owned() }),
    }

    let mut tags = Vec::new();
    for field in fields {
        let Some(raw_tags) = field.strip_prefix('#') else {
            return Err(ParseError::UnsupportedField { field: field.to_owned() });
        };

        tags.extend(
            raw_tags
                .split(',')
                .filter(|tag| !tag.is_empty())
                .map(|tag| tag.split_once(':').unwrap_or((tag, ""))),
        );
    }

    Ok(MetricSample::counter(name, value, tags))
}
