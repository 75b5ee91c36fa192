//! LICS rules: named constraints over a symbolic reference's textual origin
//! that prune decision alternatives before the decision procedure is asked.

use std::rc::Rc;

/// What a [`LicsRule`] asserts about references whose origin matches its pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum LicsEffect {
    /// The reference never resolves to `null`; the `NULL` alternative is
    /// pruned outright.
    NeverNull,
    /// The reference may only `EXPANDS` to a class matching this pattern;
    /// `EXPANDS` alternatives for non-matching classes are pruned.
    MayExpandTo(Rc<str>),
    /// The reference may only `ALIASES` an existing object whose allocation
    /// site origin matches this pattern.
    MayAlias(Rc<str>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LicsRule {
    /// Glob pattern (`*` only) over the reference's origin string, e.g. `ROOT.*.next`.
    pub origin_pattern: Rc<str>,
    pub effect: LicsEffect,
}

impl LicsRule {
    pub fn new(origin_pattern: impl Into<Rc<str>>, effect: LicsEffect) -> Self {
        Self {
            origin_pattern: origin_pattern.into(),
            effect,
        }
    }

    pub fn matches_origin(&self, origin: &str) -> bool {
        glob_match(&self.origin_pattern, origin)
    }
}

/// An ordered collection of [`LicsRule`]s, consulted in order; a reference's
/// effective constraints are the union of every rule whose pattern matches
/// its origin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LicsRules {
    rules: Vec<LicsRule>,
}

impl LicsRules {
    pub fn new(rules: Vec<LicsRule>) -> Self {
        Self { rules }
    }

    pub fn is_never_null(&self, origin: &str) -> bool {
        self.rules
            .iter()
            .any(|r| r.matches_origin(origin) && matches!(r.effect, LicsEffect::NeverNull))
    }

    /// `None` means unconstrained (no matching `MAY_EXPAND_TO` rule); `Some`
    /// carries the patterns a candidate class name must satisfy.
    pub fn expand_patterns(&self, origin: &str) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|r| r.matches_origin(origin))
            .filter_map(|r| match &r.effect {
                LicsEffect::MayExpandTo(pattern) => Some(pattern.as_ref()),
                _ => None,
            })
            .collect()
    }

    pub fn alias_patterns(&self, origin: &str) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|r| r.matches_origin(origin))
            .filter_map(|r| match &r.effect {
                LicsEffect::MayAlias(pattern) => Some(pattern.as_ref()),
                _ => None,
            })
            .collect()
    }

    pub fn class_permitted_by(pattern: &str, class_name: &str) -> bool {
        glob_match(pattern, class_name)
    }
}

/// Minimal glob matcher: `*` matches any run of characters (including
/// none), every other character matches literally.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn recurse(pattern: &[u8], text: &[u8]) -> bool {
        match pattern.first() {
            None => text.is_empty(),
            Some(b'*') => {
                recurse(&pattern[1..], text) || (!text.is_empty() && recurse(pattern, &text[1..]))
            }
            Some(&c) => text.first() == Some(&c) && recurse(&pattern[1..], &text[1..]),
        }
    }
    recurse(pattern.as_bytes(), text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_star_matches_any_segment() {
        assert!(glob_match("ROOT.*.next", "ROOT.node7.next"));
        assert!(!glob_match("ROOT.*.next", "ROOT.node7.prev"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    #[test]
    fn never_null_rule_matches_by_pattern() {
        let rules = LicsRules::new(vec![LicsRule::new("ROOT.*", LicsEffect::NeverNull)]);
        assert!(rules.is_never_null("ROOT.next"));
        assert!(!rules.is_never_null("OTHER.next"));
    }

    #[test]
    fn expand_patterns_collects_matching_rules() {
        let rules = LicsRules::new(vec![LicsRule::new("ROOT.*", LicsEffect::MayExpandTo(Rc::from("pkg/Node")))]);
        assert_eq!(rules.expand_patterns("ROOT.next"), vec!["pkg/Node"]);
        assert!(LicsRules::class_permitted_by("pkg/Node", "pkg/Node"));
    }
}
