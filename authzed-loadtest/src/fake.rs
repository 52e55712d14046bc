//! Random but schema-valid values for relationships and permission checks.

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const FIRST_NAMES: &[&str] = &[
    "Aaliyah", "Abdul", "Ada", "Akira", "Alice", "Amara", "Anders", "Aroha", "Bea", "Bjorn",
    "Bob", "Carmen", "Chidi", "Dana", "Dmitri", "Elif", "Emeka", "Farah", "Fatima", "Gustavo",
    "Hana", "Ines", "Ivan", "Jamal", "Jonas", "Kai", "Keiko", "Lars", "Leila", "Mateo", "Mei",
    "Nadia", "Noor", "Olu", "Priya", "Quinn", "Rafael", "Sanjay", "Sofia", "Tariq", "Uma",
    "Valentina", "Wei", "Xiomara", "Yusuf", "Zara",
];

/// The identifiers a workload draws from when generating relationships and checks.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct Vocabulary {
    /// Object type of written resources, for example `document`.
    pub object_type: String,
    /// Prefix of generated resource identifiers.
    pub object_prefix: String,
    /// Object type of subjects, for example `user`.
    pub subject_type: String,
    /// Relations written between subjects and resources.
    pub relations: Vec<String>,
    /// Permissions checked on resources.
    pub permissions: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            object_type: "document".into(),
            object_prefix: "doc_".into(),
            subject_type: "user".into(),
            relations: vec!["editor".into(), "viewer".into(), "admin".into()],
            permissions: vec!["view".into(), "edit".into(), "remove".into()],
        }
    }
}

/// A source of field values for generated relationships and checks.
pub trait Faker: Send + 'static {
    /// A human-like subject identifier.
    fn subject_id(&mut self) -> String;
    /// A relation from the configured set.
    fn relation(&mut self) -> String;
    /// A permission from the configured set.
    fn permission(&mut self) -> String;
    /// A globally unique resource identifier.
    fn object_id(&mut self) -> String;
}

/// A [`Faker`] driven by a seeded [`SmallRng`].
///
/// Two fakers created with the same seed and vocabulary yield identical sequences, including the
/// UUIDs of generated resources.
#[derive(Debug)]
pub struct SeededFaker {
    rng: SmallRng,
    vocabulary: Arc<Vocabulary>,
}

impl SeededFaker {
    /// Creates a faker from a seed.
    pub fn new(seed: u64, vocabulary: Arc<Vocabulary>) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            vocabulary,
        }
    }

    fn pick(&mut self, choices: &[String]) -> String {
        choices.choose(&mut self.rng).cloned().unwrap_or_default()
    }
}

impl Faker for SeededFaker {
    fn subject_id(&mut self) -> String {
        let name = FIRST_NAMES.choose(&mut self.rng).copied().unwrap_or("anonymous");
        name.to_owned()
    }

    fn relation(&mut self) -> String {
        let vocabulary = Arc::clone(&self.vocabulary);
        self.pick(&vocabulary.relations)
    }

    fn permission(&mut self) -> String {
        let vocabulary = Arc::clone(&self.vocabulary);
        self.pick(&vocabulary.permissions)
    }

    fn object_id(&mut self) -> String {
        let uuid = uuid::Builder::from_random_bytes(self.rng.random()).into_uuid();
        format!("{}{uuid}", self.vocabulary.object_prefix)
    }
}
