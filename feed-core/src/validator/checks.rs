use crate::types::Severity;

#[derive(Debug, Clone, Copy)]
pub struct CheckMeta {
  pub id: &'static str,
  pub title: &'static str,
  pub default_severity: Severity,
}

pub const V001: CheckMeta = CheckMeta {
  id: "V001",
  title: "Invalid URL",
  default_severity: Severity::Error,
};
pub const V002: CheckMeta = CheckMeta {
  id: "V002",
  title: "Duplicate value within dataset",
  default_severity: Severity::Error,
};
pub const V003: CheckMeta = CheckMeta {
  id: "V003",
  title: "Empty value",
  default_severity: Severity::Error,
};
pub const V004: CheckMeta = CheckMeta {
  id: "V004",
  title: "Invalid hashed entry",
  default_severity: Severity::Error,
};
pub const V005: CheckMeta = CheckMeta {
  id: "V005",
  title: "Suspicious URL pattern",
  default_severity: Severity::Warning,
};
pub const V006: CheckMeta = CheckMeta {
  id: "V006",
  title: "Script-injection content",
  default_severity: Severity::Warning,
};
pub const V007: CheckMeta = CheckMeta {
  id: "V007",
  title: "Invalid SMS sender",
  default_severity: Severity::Error,
};
pub const V008: CheckMeta = CheckMeta {
  id: "V008",
  title: "Invalid package identifier",
  default_severity: Severity::Error,
};
pub const V009: CheckMeta = CheckMeta {
  id: "V009",
  title: "Record metadata out of range",
  default_severity: Severity::Warning,
};
pub const V010: CheckMeta = CheckMeta {
  id: "V010",
  title: "Invalid version.json",
  default_severity: Severity::Error,
};
pub const V011: CheckMeta = CheckMeta {
  id: "V011",
  title: "Removal without review",
  default_severity: Severity::Error,
};
pub const V012: CheckMeta = CheckMeta {
  id: "V012",
  title: "Timestamp in the future",
  default_severity: Severity::Warning,
};
pub const V013: CheckMeta = CheckMeta {
  id: "V013",
  title: "Dataset file missing or unreadable",
  default_severity: Severity::Warning,
};

/// SHA-256 hex, 64 chars. Some legacy entries carry a leading dash.
pub fn is_valid_hash(value: &str) -> bool {
  let clean = value.trim_start_matches('-');
  clean.len() == 64 && clean.chars().all(|c| c.is_ascii_hexdigit())
}

pub fn is_valid_url(value: &str) -> bool {
  let Ok(url) = reqwest::Url::parse(value) else {
    return false;
  };
  matches!(url.scheme(), "http" | "https") && url.host_str().is_some()
}

const SHORTENER_MARKERS: &[&str] = &[
  "bit.ly",
  "tinyurl",
  "shortened",
  "redirect",
];

pub fn is_suspicious_url(value: &str) -> bool {
  let lower = value.to_ascii_lowercase();

  if SHORTENER_MARKERS.iter().any(|m| lower.contains(m)) {
    return true;
  }

  if let Ok(url) = reqwest::Url::parse(value) {
    if url.host_str().is_some_and(is_ip_literal) {
      return true;
    }
  }

  has_long_random_run(&lower)
}

fn is_ip_literal(host: &str) -> bool {
  host
    .trim_start_matches('[')
    .trim_end_matches(']')
    .parse::<std::net::IpAddr>()
    .is_ok()
}

// Very long unbroken alphanumeric runs are typical of generated
// phishing paths and of hashes pasted into the wrong dataset.
fn has_long_random_run(lower: &str) -> bool {
  const THRESHOLD: usize = 32;
  let mut run = 0usize;
  for c in lower.chars() {
    if c.is_ascii_lowercase() || c.is_ascii_digit() {
      run += 1;
      if run >= THRESHOLD {
        return true;
      }
    } else {
      run = 0;
    }
  }
  false
}

const SCRIPT_MARKERS: &[&str] = &[
  "<script",
  "javascript:",
  "onload=",
  "onerror=",
  "eval(",
  "document.cookie",
  "window.location",
  "alert(",
  "confirm(",
  "prompt(",
];

pub fn contains_script_content(value: &str) -> bool {
  let lower = value.to_ascii_lowercase();
  SCRIPT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Accepts international numbers (optional `+`, 3-15 digits) and short
/// alphanumeric sender ids as used by SMS gateways (2-11 chars, at
/// least one letter).
pub fn is_valid_sms_sender(value: &str) -> bool {
  let v = value.trim();
  if v.is_empty() {
    return false;
  }

  let digits = v.strip_prefix('+').unwrap_or(v);
  if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
    return (3..=15).contains(&digits.len());
  }

  let alnum = v.chars().all(|c| c.is_ascii_alphanumeric());
  let has_letter = v.chars().any(|c| c.is_ascii_alphabetic());
  alnum && has_letter && (2..=11).contains(&v.chars().count())
}

pub fn is_valid_package_id(value: &str) -> bool {
  let segments: Vec<&str> = value.split('.').collect();
  if segments.len() < 2 {
    return false;
  }
  segments.iter().all(|seg| {
    let mut chars = seg.chars();
    match chars.next() {
      Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
      _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
  })
}

/// `MAJOR.MINOR.PATCH`, numeric components only.
pub fn is_valid_semver(value: &str) -> bool {
  let parts: Vec<&str> = value.split('.').collect();
  parts.len() == 3
    && parts
      .iter()
      .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hash_validation_accepts_dash_prefix() {
    let h = "a".repeat(64);
    assert!(is_valid_hash(&h));
    assert!(is_valid_hash(&format!("-{h}")));
    assert!(!is_valid_hash(&h[..63]));
    assert!(!is_valid_hash(&format!("g{}", &h[..63])));
  }

  #[test]
  fn url_validation_requires_scheme_and_host() {
    assert!(is_valid_url("https://evil.example/login"));
    assert!(is_valid_url("http://127.0.0.1:8080/x"));
    assert!(!is_valid_url("ftp://evil.example"));
    assert!(!is_valid_url("evil.example/login"));
    assert!(!is_valid_url("https://"));
  }

  #[test]
  fn suspicious_url_flags_shorteners_and_ip_hosts() {
    assert!(is_suspicious_url("https://bit.ly/3xYz"));
    assert!(is_suspicious_url("http://1.2.3.4/login"));
    assert!(is_suspicious_url(&format!(
      "https://x.example/{}",
      "a1".repeat(20)
    )));
    assert!(!is_suspicious_url("https://plain.example/login"));
  }

  #[test]
  fn script_content_detection() {
    assert!(contains_script_content("click <SCRIPT>alert(1)</script>"));
    assert!(contains_script_content("javascript:void(0)"));
    assert!(!contains_script_content("your one-time code is 1234"));
  }

  #[test]
  fn sms_sender_validation() {
    assert!(is_valid_sms_sender("+989121234567"));
    assert!(is_valid_sms_sender("30005"));
    assert!(is_valid_sms_sender("BANKALERT"));
    assert!(!is_valid_sms_sender("12"));
    assert!(!is_valid_sms_sender("has space"));
    assert!(!is_valid_sms_sender(""));
  }

  #[test]
  fn package_id_validation() {
    assert!(is_valid_package_id("com.example.fakebank"));
    assert!(is_valid_package_id("ir.bad_app.v2"));
    assert!(!is_valid_package_id("singlesegment"));
    assert!(!is_valid_package_id("com.1bad.app"));
    assert!(!is_valid_package_id("com..app"));
  }

  #[test]
  fn semver_validation() {
    assert!(is_valid_semver("2.0.0"));
    assert!(!is_valid_semver("2.0"));
    assert!(!is_valid_semver("2.0.0-beta"));
  }
}
