//! Message urgency classification
//!
//! Pure keyword scoring over inbound customer message text. The same input
//! always yields the same output; classification never fails — text with no
//! recognizable signal falls back to `Low` with a baseline confidence.

use deskline_shared::Priority;

/// Result of classifying a message
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub priority: Priority,
    /// How many independent signals fired, normalized to [0, 1]
    pub confidence: f64,
}

/// Confidence assigned when no signal fires at all
const BASELINE_CONFIDENCE: f64 = 0.3;

// Distress, legal, and escalation language. Matched as substrings of the
// lowercased text, so entries must not be fragments of common neutral words.
const URGENT_SIGNALS: &[&str] = &[
    "emergency",
    "urgent",
    "immediately",
    "right now",
    "asap",
    "lawsuit",
    "lawyer",
    "attorney",
    "legal action",
    "fraud",
    "stolen",
    "scam",
    "unauthorized",
    "police",
];

const HIGH_SIGNALS: &[&str] = &[
    "angry",
    "furious",
    "unacceptable",
    "complaint",
    "terrible",
    "worst",
    "cancel my account",
    "refund",
    "charged twice",
    "overcharged",
    "not working",
    "broken",
    "locked out",
    "failed",
];

const MEDIUM_SIGNALS: &[&str] = &[
    "help",
    "problem",
    "trouble",
    "question",
    "confused",
    "how do i",
    "can't",
    "cannot",
    "worried",
];

/// Classify message text into an urgency level with a confidence score.
///
/// The highest signal category with at least one hit wins; confidence grows
/// with the number of independent signals in that category.
pub fn classify(text: &str) -> Classification {
    let text = text.to_lowercase();

    let urgent = count_hits(&text, URGENT_SIGNALS);
    let high = count_hits(&text, HIGH_SIGNALS);
    let medium = count_hits(&text, MEDIUM_SIGNALS);

    let (priority, hits) = if urgent > 0 {
        (Priority::Urgent, urgent)
    } else if high > 0 {
        (Priority::High, high)
    } else if medium > 0 {
        (Priority::Medium, medium)
    } else {
        (Priority::Low, 0)
    };

    let confidence = if hits == 0 {
        BASELINE_CONFIDENCE
    } else {
        (0.4 + 0.2 * hits as f64).min(1.0)
    };

    Classification { priority, confidence }
}

fn count_hits(text: &str, signals: &[&str]) -> usize {
    signals.iter().filter(|signal| text.contains(*signal)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_is_deterministic() {
        let text = "My card was charged twice and nobody is helping";
        assert_eq!(classify(text), classify(text));
    }

    #[test]
    fn test_empty_text_is_low_with_baseline() {
        let result = classify("");
        assert_eq!(result.priority, Priority::Low);
        assert_eq!(result.confidence, BASELINE_CONFIDENCE);
    }

    #[test]
    fn test_neutral_text_is_low() {
        let result = classify("Thanks for the update, everything looks good.");
        assert_eq!(result.priority, Priority::Low);
    }

    #[test]
    fn test_emergency_is_urgent_above_threshold() {
        let result = classify("This is an emergency, I need help now");
        assert_eq!(result.priority, Priority::Urgent);
        assert!(result.confidence > 0.5);
    }

    #[test]
    fn test_legal_language_is_urgent() {
        let result = classify("I am contacting my lawyer about legal action");
        assert_eq!(result.priority, Priority::Urgent);
    }

    #[test]
    fn test_question_is_medium() {
        let result = classify("I have a question about my loan balance");
        assert_eq!(result.priority, Priority::Medium);
    }

    #[test]
    fn test_complaint_is_high() {
        let result = classify("This is unacceptable, I want a refund");
        assert_eq!(result.priority, Priority::High);
    }

    #[test]
    fn test_more_signals_raise_confidence() {
        let one = classify("this is urgent");
        let many = classify("this is urgent, an emergency, fix it immediately asap");
        assert_eq!(one.priority, Priority::Urgent);
        assert_eq!(many.priority, Priority::Urgent);
        assert!(many.confidence > one.confidence);
        assert!(many.confidence <= 1.0);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify("EMERGENCY!").priority, Priority::Urgent);
    }
}
