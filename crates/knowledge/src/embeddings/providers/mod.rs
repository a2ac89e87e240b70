pub mod ollama;
pub mod trigram;

pub use ollama::OllamaEmbeddings;
pub use trigram::TrigramEmbeddings;
