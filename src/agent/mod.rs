//! External collaborators: the generative model and the embedding function.
//!
//! Both sit behind object-safe async traits so the pipeline can run against a
//! remote API, a local OpenAI-compatible server, or a deterministic stand-in.

pub mod embedding;
pub mod providers;

pub use embedding::Embedder;
pub use providers::LlmProvider;
