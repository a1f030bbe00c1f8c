pub mod detection;
pub mod enrollment;
pub mod pipeline;
pub mod recognition;
pub mod rendering;
pub mod shared;
pub mod storage;
pub mod video;
