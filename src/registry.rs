//! Category routing and the verifier registry.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::ScoringError;
use crate::models::VerifierType;
use crate::verifiers::{CodeVerifier, MultimodalVerifier, TextVerifier, Verifier};

const CODE_CATEGORIES: &[&str] = &[
    "code", "coding", "programming", "javascript", "js", "typescript", "ts", "python", "py",
    "rust", "go", "golang", "java", "kotlin", "swift", "c", "c++", "cpp", "c#", "csharp",
    "ruby", "php", "scala", "sql", "html", "css", "bash", "shell", "react", "node",
    "algorithm", "algorithms", "debugging",
];

const MULTIMODAL_CATEGORIES: &[&str] = &[
    "image", "images", "image-generation", "video", "audio", "multimodal", "vision", "art",
    "design", "illustration", "photo", "photography", "visual",
];

const TEXT_CATEGORIES: &[&str] = &[
    "text", "creative", "writing", "copywriting", "marketing", "summarization", "analysis",
    "research", "education", "general", "business", "email", "storytelling",
];

/// Map a challenge category to its verifier family; unknown categories are text.
pub fn route(category: &str) -> VerifierType {
    let normalized = category.trim().to_lowercase();
    let name = normalized.as_str();

    if CODE_CATEGORIES.contains(&name) {
        VerifierType::Code
    } else if MULTIMODAL_CATEGORIES.contains(&name) {
        VerifierType::Multimodal
    } else {
        if !TEXT_CATEGORIES.contains(&name) {
            debug!(category, "unrecognized category, using text verifier");
        }
        VerifierType::Text
    }
}

/// Verifier implementations keyed by family
#[derive(Clone, Default)]
pub struct VerifierRegistry {
    verifiers: HashMap<VerifierType, Arc<dyn Verifier>>,
}

impl VerifierRegistry {
    /// Registry with no verifiers
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the code, text and multimodal verifiers
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(CodeVerifier));
        registry.register(Arc::new(TextVerifier));
        registry.register(Arc::new(MultimodalVerifier));
        registry
    }

    /// Add or replace the verifier for its family
    pub fn register(&mut self, verifier: Arc<dyn Verifier>) {
        self.verifiers.insert(verifier.kind(), verifier);
    }

    pub fn get(&self, kind: VerifierType) -> Option<Arc<dyn Verifier>> {
        self.verifiers.get(&kind).cloned()
    }

    /// Route a category and look up its verifier
    pub fn resolve(&self, category: &str) -> Result<Arc<dyn Verifier>, ScoringError> {
        let kind = route(category);
        self.get(kind).ok_or(ScoringError::UnregisteredVerifier(kind))
    }
}
