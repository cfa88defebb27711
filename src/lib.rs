pub mod ascii_frame;
pub mod assets;
pub mod audio;
pub mod config;
pub mod error_codes;
pub mod frame_store;
pub mod pipeline;
pub mod playback;
pub mod rasterizer;
pub mod subtitles;
pub mod terminal;
