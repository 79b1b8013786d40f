/// Configured triggers, case-folded once up front.
#[derive(Debug, Clone)]
pub struct TriggerSet {
    // (as configured, lower-cased)
    triggers: Vec<(String, String)>,
}

impl TriggerSet {
    pub fn new<I, S>(triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            triggers: triggers
                .into_iter()
                .map(|t| {
                    let t = t.as_ref();
                    (t.to_string(), t.to_lowercase())
                })
                .collect(),
        }
    }

    /// First trigger, in configured order, contained in `text` ignoring case.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        let folded = text.to_lowercase();
        self.triggers
            .iter()
            .find(|(_, lower)| folded.contains(lower.as_str()))
            .map(|(original, _)| original.as_str())
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triggers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn matches(text: &str, triggers: &[String]) -> bool {
        TriggerSet::new(triggers).first_match(text).is_some()
    }

    #[test]
    fn test_case_insensitive_substring() {
        let t = triggers(&["urgent help"]);
        assert!(matches("Need URGENT HELP now", &t));
        assert!(matches("urgent helpers wanted", &t));
        assert!(!matches("urgent, help", &t));
    }

    #[test]
    fn test_trigger_case_folded_too() {
        assert!(matches("ping @team please", &triggers(&["@TEAM"])));
    }

    #[test]
    fn test_non_ascii_folding() {
        assert!(matches("ÜBER wichtig", &triggers(&["über"])));
    }

    #[test]
    fn test_order_does_not_change_outcome() {
        let text = "the deploy is broken, @team";
        let a = triggers(&["deploy", "@team", "nothing"]);
        let b = triggers(&["nothing", "@team", "deploy"]);
        assert_eq!(matches(text, &a), matches(text, &b));
        assert!(!matches("all quiet", &a));
        assert!(!matches("all quiet", &b));
    }

    #[test]
    fn test_first_match_follows_configured_order() {
        let set = TriggerSet::new(["Deploy", "@team"]);
        assert_eq!(set.first_match("@team the DEPLOY failed"), Some("Deploy"));
        assert_eq!(set.first_match("hi @Team"), Some("@team"));
        assert_eq!(set.first_match("hello"), None);
        assert_eq!(set.len(), 2);
    }
}
