pub mod euclidean_face_matcher;
pub mod known_faces_loader;
pub mod onnx_face_encoder;
