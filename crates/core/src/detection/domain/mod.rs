pub mod face_encoder;
pub mod face_matcher;
pub mod known_faces;
