pub mod artifact_codec;
pub mod model_store;
