//! Streams texture sets out of a container into GPU buffers and textures, choosing per mip between
//! CPU decompression, a GPU decompression extension and a hardware decompression queue.

pub mod decompression;
pub mod gpu;
pub mod io;
pub mod loading;
