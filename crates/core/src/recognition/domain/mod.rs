pub mod detection_result;
pub mod embedding_provider;
pub mod face_embedding;
pub mod identity_matcher;
pub mod known_identity_set;
