pub mod backend;
pub mod decode;
pub mod element;
pub mod error;
pub mod factory;
pub mod native;
pub mod output;
pub mod probe;

pub use backend::{AudioBackend, AudioSource, BackendKind, BackendState, EventStreams, NullBackend};
pub use decode::{decode_file, decode_media, DecodedAudio};
pub use element::{ElementBackendConfig, MediaElement, MediaElementBackend, MediaElementFactory};
pub use error::BackendError;
pub use factory::{create_backend, BackendPorts};
pub use native::{NativeBackend, NativeCallback, NativeMedia, NativeMediaFactory};
pub use output::{CpalMedia, CpalMediaFactory};
pub use probe::{probe_source, SourceInfo};
