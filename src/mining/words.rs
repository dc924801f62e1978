//! Random message text for mined blocks

use rand::seq::SliceRandom;
use rand::Rng;

/// Vocabulary for generated messages; no entry contains a wire delimiter
pub const WORDS: &[&str] = &[
    "steak", "ethics", "location", "school", "presence", "virus", "unlike",
    "desert", "publicity", "computer", "register", "profit", "plot", "conference",
    "large", "peak", "performance", "country", "kick", "firm", "damn", "enemy",
    "appendix", "exotic", "dedicate", "rubbish", "licence", "incredible",
    "construct", "common", "influence", "elect", "ladder", "modernize", "squash",
    "compliance", "patent", "valley", "load", "toast", "road", "lump", "thigh",
    "steward", "grind", "able", "impress", "network", "experienced", "hero",
    "finger", "island", "precision", "tropical", "fitness", "environmental",
    "society", "approve", "illusion", "persist", "bacon", "intention", "jump",
    "bridge",
];

/// Fewest words in a sentence
pub const MIN_WORDS: usize = 2;

/// Most words in a sentence
pub const MAX_WORDS: usize = 7;

/// A space-separated sentence of 2 to 7 random words
pub fn random_sentence<R: Rng + ?Sized>(rng: &mut R) -> String {
    let count = rng.gen_range(MIN_WORDS..=MAX_WORDS);
    (0..count)
        .filter_map(|_| WORDS.choose(&mut *rng).copied())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sentence_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let sentence = random_sentence(&mut rng);
            let words: Vec<_> = sentence.split(' ').collect();
            assert!((MIN_WORDS..=MAX_WORDS).contains(&words.len()));
            assert!(words.iter().all(|w| WORDS.contains(w)));
            assert!(!sentence.contains('|'));
        }
    }
}
