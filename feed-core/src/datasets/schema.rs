use serde::{Deserialize, Serialize};

/// The five curated threat categories distributed to consuming apps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
  PhishingLinks,
  SmsSenders,
  SmsPatterns,
  SuspiciousApps,
  SuspiciousWords,
}

impl DatasetKind {
  pub const ALL: [DatasetKind; 5] = [
    DatasetKind::PhishingLinks,
    DatasetKind::SmsSenders,
    DatasetKind::SmsPatterns,
    DatasetKind::SuspiciousApps,
    DatasetKind::SuspiciousWords,
  ];

  pub fn file_name(self) -> &'static str {
    match self {
      DatasetKind::PhishingLinks => "links.json",
      DatasetKind::SmsSenders => "sms_senders.json",
      DatasetKind::SmsPatterns => "sms_patterns.json",
      DatasetKind::SuspiciousApps => "apps.json",
      DatasetKind::SuspiciousWords => "words.json",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      DatasetKind::PhishingLinks => "phishing links",
      DatasetKind::SmsSenders => "phishing SMS senders",
      DatasetKind::SmsPatterns => "phishing SMS messages",
      DatasetKind::SuspiciousApps => "suspicious apps",
      DatasetKind::SuspiciousWords => "suspicious words",
    }
  }

  /// Stable numeric category id used in the published artifact.
  pub fn category_id(self) -> u32 {
    match self {
      DatasetKind::PhishingLinks => 0,
      DatasetKind::SmsSenders => 1,
      DatasetKind::SmsPatterns => 2,
      DatasetKind::SuspiciousApps => 3,
      DatasetKind::SuspiciousWords => 4,
    }
  }

  pub fn from_file_name(name: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|k| k.file_name() == name)
  }
}

/// A single curated entry: the identifying value plus optional provenance.
///
/// `match_mode`: 0 = exact, 1 = domain/prefix, 2 = pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatRecord {
  #[serde(alias = "link")]
  pub value: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<u64>,

  #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
  pub match_mode: Option<u32>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub level: Option<u32>,
}

/// Dataset files accept either bare string values (legacy format) or
/// full record objects. Both forms can coexist in one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordEntry {
  Plain(String),
  Full(ThreatRecord),
}

impl RecordEntry {
  pub fn value(&self) -> &str {
    match self {
      RecordEntry::Plain(v) => v,
      RecordEntry::Full(r) => &r.value,
    }
  }

  pub fn source(&self) -> Option<&str> {
    match self {
      RecordEntry::Plain(_) => None,
      RecordEntry::Full(r) => r.source.as_deref(),
    }
  }

  pub fn updated_at(&self) -> Option<u64> {
    match self {
      RecordEntry::Plain(_) => None,
      RecordEntry::Full(r) => r.updated_at,
    }
  }

  pub fn match_mode(&self) -> Option<u32> {
    match self {
      RecordEntry::Plain(_) => None,
      RecordEntry::Full(r) => r.match_mode,
    }
  }

  pub fn level(&self) -> Option<u32> {
    match self {
      RecordEntry::Plain(_) => None,
      RecordEntry::Full(r) => r.level,
    }
  }
}

/// One curated category, in file order. Order is preserved end to end;
/// the store and publisher never reorder entries.
#[derive(Debug, Clone)]
pub struct Dataset {
  pub kind: DatasetKind,
  pub records: Vec<RecordEntry>,
}

impl Dataset {
  pub fn empty(kind: DatasetKind) -> Self {
    Self {
      kind,
      records: Vec::new(),
    }
  }

  pub fn values(&self) -> impl Iterator<Item = &str> {
    self.records.iter().map(|r| r.value())
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
  pub version: String,
  pub last_updated: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub author: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}
