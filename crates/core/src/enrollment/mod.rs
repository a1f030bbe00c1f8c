pub mod capture_faces_use_case;
pub mod enrollment_builder;
