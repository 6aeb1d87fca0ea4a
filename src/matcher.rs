// CLASSIFICATION: COMMUNITY
// Filename: matcher.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Name matching shared by permission rules, labels and module aliases.

use glob::Pattern;

/// Characters that turn a rule name into a glob.
const GLOB_META: &[char] = &['*', '?', '['];

pub fn has_glob_meta(name: &str) -> bool {
    name.contains(GLOB_META)
}

/// A rule target: compared literally or as an `fnmatch(3)` style glob in
/// which `*` also crosses `/`.
#[derive(Debug, Clone)]
pub struct NameMatcher {
    name: String,
    pattern: Option<Pattern>,
}

impl NameMatcher {
    /// `wildcard` selects glob matching. A pattern that fails to compile
    /// degrades to a literal comparison.
    pub fn new(name: &str, wildcard: bool) -> Self {
        let pattern = if wildcard { Pattern::new(name).ok() } else { None };
        Self {
            name: name.to_string(),
            pattern,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_wildcard(&self) -> bool {
        self.pattern.is_some()
    }

    pub fn matches(&self, text: &str) -> bool {
        match &self.pattern {
            Some(p) => p.matches(text),
            None => self.name == text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_crosses_slashes() {
        let m = NameMatcher::new("/dev/input/*", true);
        assert!(m.matches("/dev/input/event0"));
        assert!(m.matches("/dev/input/by-id/x"));
        assert!(!m.matches("/dev/inputs"));
    }

    #[test]
    fn literal_when_not_wildcard() {
        let m = NameMatcher::new("/dev/input/*", false);
        assert!(!m.matches("/dev/input/event0"));
        assert!(m.matches("/dev/input/*"));
    }

    #[test]
    fn meta_detection() {
        assert!(has_glob_meta("/dev/tty*"));
        assert!(has_glob_meta("/dev/ttyS[01]"));
        assert!(!has_glob_meta("/dev/null"));
    }
}
