//! Sample buffering between the renderer and the device callback.

pub mod pcm;

pub use pcm::{shared_pcm_queue, PcmQueue, SharedPcmQueue};
