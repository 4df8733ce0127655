//! Lexicon-backed sentiment and tone classification for recognized utterances.
//!
//! Both classifiers are total: any input, including empty or adversarial
//! text, yields a label. Failures never surface as errors; they collapse to
//! `Unknown` so a bad classification can never abort a capture cycle.

/// Overall polarity of an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Unknown,
}

impl Sentiment {
    pub const ALL: [Sentiment; 4] = [
        Sentiment::Positive,
        Sentiment::Negative,
        Sentiment::Neutral,
        Sentiment::Unknown,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Sentiment::Positive => "POSITIVE",
            Sentiment::Negative => "NEGATIVE",
            Sentiment::Neutral => "NEUTRAL",
            Sentiment::Unknown => "UNKNOWN",
        }
    }
}

/// Emotional coloring of an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tone {
    Angry,
    Sad,
    Fearful,
    Happy,
    Excited,
    Relaxed,
    Bored,
    Uncertain,
    Unknown,
}

impl Tone {
    pub const ALL: [Tone; 9] = [
        Tone::Angry,
        Tone::Sad,
        Tone::Fearful,
        Tone::Happy,
        Tone::Excited,
        Tone::Relaxed,
        Tone::Bored,
        Tone::Uncertain,
        Tone::Unknown,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Tone::Angry => "angry",
            Tone::Sad => "sad",
            Tone::Fearful => "fearful",
            Tone::Happy => "happy",
            Tone::Excited => "excited",
            Tone::Relaxed => "relaxed",
            Tone::Bored => "bored",
            Tone::Uncertain => "uncertain",
            Tone::Unknown => "UNKNOWN",
        }
    }
}

const POSITIVE_WORDS: &[&str] = &[
    "good",
    "great",
    "excellent",
    "amazing",
    "awesome",
    "wonderful",
    "fantastic",
    "perfect",
    "love",
    "happy",
    "glad",
    "pleased",
    "helpful",
    "thanks",
    "thank you",
    "appreciate",
    "works",
    "working",
    "satisfied",
    "impressed",
    "brilliant",
    "smooth",
    "yes",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad",
    "terrible",
    "awful",
    "horrible",
    "worst",
    "hate",
    "angry",
    "upset",
    "broken",
    "wrong",
    "problem",
    "problems",
    "issue",
    "issues",
    "fail",
    "failed",
    "failing",
    "refund",
    "cancel",
    "complaint",
    "disappointed",
    "disappointing",
    "frustrated",
    "frustrating",
    "annoyed",
    "annoying",
    "unacceptable",
    "useless",
    "slow",
    "waiting forever",
    "never works",
    "no",
    "not happy",
];

const ANGRY_WORDS: &[&str] = &[
    "angry",
    "furious",
    "outrageous",
    "ridiculous",
    "unacceptable",
    "fed up",
    "sick of",
    "enough of this",
    "demand",
    "immediately",
];

const SAD_WORDS: &[&str] = &[
    "sad",
    "unhappy",
    "disappointed",
    "disappointing",
    "upset",
    "let down",
    "unfortunate",
    "unfortunately",
    "sorry to",
];

const FEARFUL_WORDS: &[&str] = &[
    "worried",
    "afraid",
    "scared",
    "nervous",
    "concerned",
    "concern",
    "anxious",
    "risky",
    "is it safe",
    "what happens if",
];

const HAPPY_WORDS: &[&str] = &[
    "happy",
    "glad",
    "great",
    "wonderful",
    "love it",
    "love this",
    "pleased",
    "delighted",
    "thank you",
    "thanks",
];

const EXCITED_WORDS: &[&str] = &[
    "excited",
    "thrilled",
    "amazing",
    "awesome",
    "incredible",
    "fantastic",
    "can't wait",
    "cannot wait",
    "wow",
];

const RELAXED_WORDS: &[&str] = &[
    "relaxed",
    "no rush",
    "no hurry",
    "no problem",
    "no worries",
    "whenever",
    "take your time",
    "comfortable",
    "fine with",
];

const BORED_WORDS: &[&str] = &[
    "bored",
    "boring",
    "whatever",
    "dull",
    "tedious",
    "not interested",
    "don't care",
    "get to the point",
];

const UNCERTAIN_WORDS: &[&str] = &[
    "not sure",
    "unsure",
    "maybe",
    "perhaps",
    "confused",
    "confusing",
    "unclear",
    "don't know",
    "don't understand",
    "hesitant",
    "undecided",
];

/// Keyword lexicon per tone, checked with whole-word matching. Order matters:
/// ties between tones break toward the earlier entry.
const TONE_LEXICON: &[(Tone, &[&str])] = &[
    (Tone::Angry, ANGRY_WORDS),
    (Tone::Sad, SAD_WORDS),
    (Tone::Fearful, FEARFUL_WORDS),
    (Tone::Happy, HAPPY_WORDS),
    (Tone::Excited, EXCITED_WORDS),
    (Tone::Relaxed, RELAXED_WORDS),
    (Tone::Bored, BORED_WORDS),
    (Tone::Uncertain, UNCERTAIN_WORDS),
];

/// Classify the overall polarity of an utterance.
///
/// Polarity is the sign of positive keyword hits minus negative keyword
/// hits; a tie (including zero hits) on non-empty text is `Neutral`.
/// Empty or whitespace-only input yields `Unknown`.
pub fn classify_sentiment(text: &str) -> Sentiment {
    if text.trim().is_empty() {
        return Sentiment::Unknown;
    }

    let text_lower = text.to_lowercase();
    let positive_hits = count_keyword_hits(&text_lower, POSITIVE_WORDS);
    let negative_hits = count_keyword_hits(&text_lower, NEGATIVE_WORDS);

    if positive_hits > negative_hits {
        Sentiment::Positive
    } else if negative_hits > positive_hits {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

/// Classify the emotional coloring of an utterance.
///
/// The tone with the most keyword hits wins; ties break in declaration
/// order so classification stays deterministic. No hits (or empty input)
/// yields `Unknown`.
pub fn classify_tone(text: &str) -> Tone {
    if text.trim().is_empty() {
        return Tone::Unknown;
    }

    let text_lower = text.to_lowercase();
    let mut best = Tone::Unknown;
    let mut best_hits = 0;

    for (tone, keywords) in TONE_LEXICON {
        let hits = count_keyword_hits(&text_lower, keywords);
        if hits > best_hits {
            best = *tone;
            best_hits = hits;
        }
    }

    best
}

/// Count non-overlapping whole-word occurrences of each keyword.
///
/// Expects `text_lower` to already be lowercased. A match only counts when
/// the characters on both sides are non-alphabetic, so "no" does not fire
/// inside "note".
fn count_keyword_hits(text_lower: &str, keywords: &[&str]) -> usize {
    let mut hits = 0;

    for keyword in keywords {
        let mut search_start = 0;
        while let Some(pos) = text_lower[search_start..].find(keyword) {
            let start = search_start + pos;
            let end = start + keyword.len();

            let is_word_start = text_lower[..start]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphabetic());
            let is_word_end = text_lower[end..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphabetic());

            if is_word_start && is_word_end {
                hits += 1;
                search_start = end;
            } else {
                search_start = start + 1;
            }
        }
    }

    hits
}
