//! Deterministic token counting
//!
//! Token counts drive chunk budgets and prompt assembly, so they must be
//! stable across ingestions and match the provider's accounting. Uses the
//! cl100k_base vocabulary, loaded once per process.

use std::sync::LazyLock;

use tiktoken_rs::{cl100k_base, CoreBPE};

static TOKENIZER: LazyLock<CoreBPE> = LazyLock::new(|| {
    tracing::info!("Loading cl100k_base tokenizer");
    cl100k_base().expect("cl100k_base vocabulary is bundled and must load")
});

/// Count tokens in a text string
pub fn count_tokens(text: &str) -> usize {
    TOKENIZER.encode_ordinary(text).len()
}
