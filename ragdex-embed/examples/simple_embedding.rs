//! Embed a few sentences and compare them.
//!
//! Uses the OpenAI provider when `OPENAI_KEY` is set, otherwise the offline
//! hashing provider.

use ragdex_embed::{
    DEFAULT_HASHING_DIMENSION, DEFAULT_MODEL, EmbedConfig, EmbeddingProvider, HashingProvider,
    OpenAiProvider,
};

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let provider: Box<dyn EmbeddingProvider> = match std::env::var("OPENAI_KEY") {
        Ok(key) => {
            let model =
                std::env::var("EMBEDDING_NAME").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
            Box::new(OpenAiProvider::new(EmbedConfig::new(key, model))?)
        }
        Err(_) => Box::new(HashingProvider::new(DEFAULT_HASHING_DIMENSION)?),
    };

    println!(
        "Provider: {} ({})",
        provider.provider_name(),
        provider.model_name()
    );

    let texts = vec![
        "Rust is a systems programming language.".to_string(),
        "Systems programming in Rust avoids data races.".to_string(),
        "Sourdough needs a long, cool fermentation.".to_string(),
    ];
    let result = provider.embed_texts(&texts).await?;
    println!(
        "Generated {} embeddings of dimension {}",
        result.len(),
        result.dimension
    );

    for i in 0..texts.len() {
        for j in (i + 1)..texts.len() {
            println!(
                "  similarity({i}, {j}) = {:.4}",
                cosine(&result.embeddings[i], &result.embeddings[j])
            );
        }
    }

    Ok(())
}
