use super::types::EmbeddingModel;

/// Fixed clinical/general vocabulary. Vector slot `i` counts occurrences of
/// `VOCABULARY[i]` (plural forms included).
pub const VOCABULARY: &[&str] = &[
    "pain", "chest", "head", "headache", "fever", "cough", "breath", "nausea", "vomiting",
    "dizziness", "fatigue", "rash", "swelling", "bleeding", "heart", "blood", "pressure",
    "diabetes", "asthma", "hypertension", "cancer", "stroke", "kidney", "liver", "lung",
    "infection", "surgery", "medication", "dose", "tablet", "daily", "allergy", "allergic",
    "penicillin", "reaction", "family", "history", "mother", "father", "smoking", "alcohol",
    "exercise", "diet", "sleep", "weight", "age", "male", "female", "onset", "severe", "week",
    "day",
];

/// Text-shape features appended after the vocabulary slots.
const SHAPE_FEATURES: usize = 3;
const SHAPE_SCALE: f32 = 0.1;

pub const EMBEDDING_DIM: usize = VOCABULARY.len() + SHAPE_FEATURES;

/// Bag-of-terms encoder over [`VOCABULARY`] plus token count, distinct-token
/// count and mean token length, L1-normalized. No model files, no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermFrequencyEncoder;

impl TermFrequencyEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl EmbeddingModel for TermFrequencyEncoder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        let mut vec = vec![0.0f32; EMBEDDING_DIM];

        for token in &tokens {
            if let Some(slot) = VOCABULARY.iter().position(|term| term_matches(term, token)) {
                vec[slot] += 1.0;
            }
        }

        if !tokens.is_empty() {
            let mut distinct: Vec<&str> = tokens.iter().map(String::as_str).collect();
            distinct.sort_unstable();
            distinct.dedup();
            let total_chars: usize = tokens.iter().map(|t| t.chars().count()).sum();
            let mean_len = total_chars as f32 / tokens.len() as f32;

            let base = VOCABULARY.len();
            vec[base] = (1.0 + tokens.len() as f32).ln() * SHAPE_SCALE;
            vec[base + 1] = (1.0 + distinct.len() as f32).ln() * SHAPE_SCALE;
            vec[base + 2] = mean_len * SHAPE_SCALE * SHAPE_SCALE;
        }

        // L1 normalize
        let norm: f32 = vec.iter().map(|x| x.abs()).sum();
        if norm > 0.0 {
            for val in &mut vec {
                *val /= norm;
            }
        }

        vec
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// Lowercase, turn everything that is not alphanumeric into a separator.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn term_matches(term: &str, token: &str) -> bool {
    if token == term
        || token.strip_suffix('s') == Some(term)
        || token.strip_suffix("es") == Some(term)
    {
        return true;
    }
    // allergy -> allergies
    match (term.strip_suffix('y'), token.strip_suffix("ies")) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
