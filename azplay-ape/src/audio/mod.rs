//! Audio collaborators: decoded block sources and output devices

pub mod decoder;
pub mod output;
pub mod types;

pub use decoder::{BlockSource, SourceOpener, SymphoniaOpener, SymphoniaSource};
pub use output::{list_devices, CpalDevice, OutputDevice, OutputStream};
pub use types::{map_channels, AudioBlock, CallbackTiming, DeviceSpec, SourceSpec};
