//! Topic-exchange routing pattern matching.
//!
//! Keys and patterns are dot-separated words. In a pattern, `*` matches
//! exactly one word and `#` matches zero or more words.

/// Whether `routing_key` is routed to a queue bound with `pattern`.
pub fn matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => {
            (0..=key.len()).any(|skip| key.get(skip..).is_some_and(|tail| match_words(rest, tail)))
        }
        Some((word, rest)) => key.split_first().is_some_and(|(head, tail)| {
            (*word == "*" || word == head) && match_words(rest, tail)
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_keys() {
        assert!(matches("incident.created", "incident.created"));
        assert!(!matches("incident.created", "incident.escalated"));
        assert!(!matches("incident.created", "incident.created.extra"));
        assert!(!matches("incident.created.extra", "incident.created"));
    }

    #[test]
    fn star_matches_exactly_one_word() {
        assert!(matches("incident.*", "incident.created"));
        assert!(matches("*.created", "incident.created"));
        assert!(!matches("incident.*", "incident"));
        assert!(!matches("incident.*", "incident.created.v2"));
    }

    #[test]
    fn hash_matches_zero_or_more_words() {
        assert!(matches("incident.#", "incident"));
        assert!(matches("incident.#", "incident.created"));
        assert!(matches("incident.#", "incident.created.v2"));
        assert!(matches("#", "resource.critical_low"));
        assert!(matches("#.completed", "assessment.completed"));
        assert!(matches("deadletter.#.queue", "deadletter.task.assessment.completed.queue"));
        assert!(!matches("resource.#", "incident.created"));
    }
}
