pub mod generator;
pub mod host;
pub mod library;
pub mod llm;
pub mod proxy;
pub mod subscription;
pub mod workflow;
