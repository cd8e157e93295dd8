pub mod audio_mixer;
pub mod frame_pacer;
pub mod ring_buffer;
pub mod wav_format;
