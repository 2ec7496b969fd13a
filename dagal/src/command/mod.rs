pub mod command_buffer;

pub use command_buffer::{BufferCopy, BufferTextureCopy, CmdBuffer, MipBlit};
