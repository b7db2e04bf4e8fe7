use regex::Regex;

/// Selects cache keys for invalidation.
#[derive(Debug, Clone)]
pub enum KeyPattern {
  Exact(String),
  Prefix(String),
  Regex(Regex),
}

impl KeyPattern {
  pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
    Ok(KeyPattern::Regex(Regex::new(pattern)?))
  }

  pub fn matches(&self, key: &str) -> bool {
    match self {
      KeyPattern::Exact(exact) => key == exact,
      KeyPattern::Prefix(prefix) => key.starts_with(prefix.as_str()),
      KeyPattern::Regex(re) => re.is_match(key),
    }
  }
}

/// `"/git/connections*"` is a prefix pattern; anything else matches exactly.
impl From<&str> for KeyPattern {
  fn from(pattern: &str) -> Self {
    match pattern.strip_suffix('*') {
      Some(prefix) => KeyPattern::Prefix(prefix.to_string()),
      None => KeyPattern::Exact(pattern.to_string()),
    }
  }
}

impl From<String> for KeyPattern {
  fn from(pattern: String) -> Self {
    KeyPattern::from(pattern.as_str())
  }
}

impl From<Regex> for KeyPattern {
  fn from(re: Regex) -> Self {
    KeyPattern::Regex(re)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_pattern_forms() {
    let prefix = KeyPattern::from("/git/connections*");
    assert!(prefix.matches("/git/connections"));
    assert!(prefix.matches("/git/connections/42/status"));
    assert!(!prefix.matches("/sessions"));

    let exact = KeyPattern::from("/git/connections");
    assert!(exact.matches("/git/connections"));
    assert!(!exact.matches("/git/connections/42"));

    let re = KeyPattern::regex(r"^/tasks/[^/]+$").unwrap();
    assert!(re.matches("/tasks/abc"));
    assert!(!re.matches("/tasks"));
  }
}
