//! Turns a (sentiment, tone) pair into actionable coaching advice.

/// Build the coaching feedback line for one classified utterance.
///
/// The labels are matched by case-insensitive containment rather than
/// equality so that upstream vocabulary drift (e.g. "very negative" or
/// "NEGATIVE (0.98)") still routes to the intended branch. Every input pair
/// produces advice; unrecognized sentiment falls through to a monitoring
/// hint. Negative is checked before positive so a label containing both
/// words routes to the cautious branch.
pub fn coaching_feedback(sentiment: &str, tone: &str) -> String {
    let sentiment_lower = sentiment.to_lowercase();
    let tone_lower = tone.to_lowercase();

    let advice = if sentiment_lower.contains("negative") {
        if tone_lower.contains("angry") {
            "Consider calming the situation or rephrasing. Offer immediate resolution."
        } else if tone_lower.contains("sad") {
            "Empathize with the customer and provide a reassuring response."
        } else if tone_lower.contains("fearful") {
            "Address the concerns and reassure the customer with a detailed explanation."
        } else {
            "Address the customer's concerns promptly and offer assistance."
        }
    } else if sentiment_lower.contains("positive") {
        if tone_lower.contains("happy") {
            "Buyer is engaged. Keep up the positive flow."
        } else if tone_lower.contains("excited") {
            "Customer is thrilled. Consider suggesting additional products or upgrades."
        } else if tone_lower.contains("relaxed") {
            "The customer is satisfied. Maintain a supportive tone."
        } else {
            "Continue delivering excellent service to reinforce positive engagement."
        }
    } else if sentiment_lower.contains("neutral") {
        if tone_lower.contains("bored") {
            "Reignite the customer's interest with engaging details or promotions."
        } else if tone_lower.contains("uncertain") {
            "Clarify any doubts and provide additional information."
        } else {
            "Maintain the current approach, ensuring clarity and support."
        }
    } else {
        "No specific advice for this combination. Continue monitoring the interaction."
    };

    format!(
        "Feedback: Sentiment is {} with tone {}. {}",
        sentiment, tone, advice
    )
}
