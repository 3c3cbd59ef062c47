pub mod generation;

pub use generation::{ChatTurn, GenerationClient, GenerationError, HttpGenerationClient};
