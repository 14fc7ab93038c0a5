//! Fake values for model definitions
//!
//! Generators share a thread-local RNG that can be seeded for reproducible
//! test runs.

use std::cell::RefCell;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

thread_local! {
    static RNG: RefCell<StdRng> = RefCell::new(StdRng::from_entropy());
}

const FIRST_NAMES: &[&str] = &[
    "Ada", "Bruno", "Chiara", "Dmitri", "Elena", "Farid", "Grete", "Hugo", "Ines", "Jonas",
    "Keiko", "Lucas", "Maren", "Nils", "Oona", "Pavel", "Rosa", "Tomas", "Vera", "Yusuf",
];

const LAST_NAMES: &[&str] = &[
    "Almeida", "Becker", "Costa", "Dubois", "Eriksen", "Fischer", "Horvat", "Ivanova", "Jensen",
    "Kowalski", "Lindqvist", "Moreau", "Novak", "Okafor", "Petrov", "Rossi", "Silva", "Tanaka",
];

const STREETS: &[&str] = &[
    "Harbour Road", "Linden Avenue", "Mill Lane", "Station Street", "Orchard Way", "Quay Side",
    "Church Row", "Market Square",
];

const WORDS: &[&str] = &[
    "amber", "brisk", "cobalt", "delta", "ember", "fjord", "granite", "harbor", "indigo",
    "juniper", "kestrel", "lumen", "meadow", "nimbus", "onyx", "prairie", "quartz", "ripple",
    "summit", "tundra",
];

/// Reseed the generator for deterministic values on this thread
pub fn seed(value: u64) {
    RNG.with(|rng| *rng.borrow_mut() = StdRng::seed_from_u64(value));
}

fn pick(items: &'static [&'static str]) -> &'static str {
    RNG.with(|rng| items.choose(&mut *rng.borrow_mut()).copied().unwrap_or_default())
}

/// Random integer in `min..=max`
pub fn number_between(min: i64, max: i64) -> i64 {
    RNG.with(|rng| rng.borrow_mut().gen_range(min..=max))
}

pub fn boolean(probability: f64) -> bool {
    RNG.with(|rng| rng.borrow_mut().gen_bool(probability.clamp(0.0, 1.0)))
}

pub fn first_name() -> String {
    pick(FIRST_NAMES).to_string()
}

pub fn last_name() -> String {
    pick(LAST_NAMES).to_string()
}

pub fn name() -> String {
    format!("{} {}", first_name(), last_name())
}

/// Email that is unique enough for a test run
pub fn email() -> String {
    format!(
        "{}.{}{}@example.test",
        first_name().to_lowercase(),
        last_name().to_lowercase(),
        number_between(1, 99_999)
    )
}

pub fn street_address() -> String {
    format!("{} {}", number_between(1, 250), pick(STREETS))
}

pub fn word() -> String {
    pick(WORDS).to_string()
}

/// Sentence of `words` random words, capitalized and terminated
pub fn sentence(words: usize) -> String {
    let mut text = (0..words.max(1)).map(|_| word()).collect::<Vec<_>>().join(" ");
    if let Some(first) = text.get(0..1).map(str::to_uppercase) {
        text.replace_range(0..1, &first);
    }
    text.push('.');
    text
}

pub fn uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Timestamp within the last year
pub fn past_datetime() -> DateTime<Utc> {
    Utc::now() - Duration::seconds(number_between(0, 365 * 24 * 3600))
}
