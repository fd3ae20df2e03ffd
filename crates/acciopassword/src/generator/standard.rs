//! [`StandardGenerator`]: thread-local CSPRNG backed generator.

use rand::{
    seq::{IndexedRandom, SliceRandom},
    Rng,
};

use super::{DicewareOptions, GenerationError, PasswordGenerator, PinOptions, RandomOptions};

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const NUMBERS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()-_=+[]{};:,.<>?/~";

const WORDLIST: &str = include_str!("wordlist.txt");

/// Default generator. Draws from [`rand::rng`], which is reseeded from the OS.
#[derive(Debug, Clone)]
pub struct StandardGenerator {
    words: Vec<&'static str>,
}

impl StandardGenerator {
    pub fn new() -> Self {
        Self {
            words: WORDLIST
                .lines()
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }
}

impl Default for StandardGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordGenerator for StandardGenerator {
    fn random(&self, options: &RandomOptions) -> Result<String, GenerationError> {
        let classes: Vec<&[u8]> = [
            (options.lowercase, LOWERCASE),
            (options.uppercase, UPPERCASE),
            (options.numbers, NUMBERS),
            (options.symbols, SYMBOLS),
        ]
        .into_iter()
        .filter_map(|(enabled, set)| enabled.then_some(set))
        .collect();

        if classes.is_empty() {
            return Err(GenerationError::NoCharacterClasses);
        }

        let mut rng = rand::rng();
        let alphabet: Vec<u8> = classes.concat();

        // One character from each enabled class first, so short passwords
        // still honour every toggle.
        let mut out: Vec<u8> = classes
            .iter()
            .take(options.length)
            .filter_map(|set| set.choose(&mut rng).copied())
            .collect();
        while out.len() < options.length {
            out.push(alphabet[rng.random_range(0..alphabet.len())]);
        }
        out.shuffle(&mut rng);

        Ok(out.into_iter().map(char::from).collect())
    }

    fn diceware(&self, options: &DicewareOptions) -> Result<String, GenerationError> {
        let mut rng = rand::rng();
        let mut words = Vec::with_capacity(options.length);
        for _ in 0..options.length {
            let word = self
                .words
                .choose(&mut rng)
                .ok_or(GenerationError::EmptyWordList)?;
            words.push(if options.capitalize {
                capitalize(word)
            } else {
                (*word).to_owned()
            });
        }
        Ok(words.join(&options.separator))
    }

    fn pin(&self, options: &PinOptions) -> Result<String, GenerationError> {
        let mut rng = rand::rng();
        Ok((0..options.length)
            .map(|_| char::from(NUMBERS[rng.random_range(0..NUMBERS.len())]))
            .collect())
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
