use std::sync::Arc;

use tracing::{info, warn};

use crate::element::{ElementBackendConfig, MediaElementBackend, MediaElementFactory};
use crate::native::{NativeBackend, NativeMediaFactory};
use crate::{AudioBackend, BackendKind, NullBackend};

/// Platform ports available to the host. Only the port matching the selected
/// backend kind needs to be present.
#[derive(Clone, Default)]
pub struct BackendPorts {
    pub native: Option<Arc<dyn NativeMediaFactory>>,
    pub element: Option<Arc<dyn MediaElementFactory>>,
    pub element_config: ElementBackendConfig,
}

impl BackendPorts {
    pub fn with_native(mut self, factory: Arc<dyn NativeMediaFactory>) -> Self {
        self.native = Some(factory);
        self
    }

    pub fn with_element(mut self, factory: Arc<dyn MediaElementFactory>) -> Self {
        self.element = Some(factory);
        self
    }
}

/// Builds the backend for `kind`. A missing port degrades to [`NullBackend`],
/// which leaves playback visual-only.
pub fn create_backend(kind: BackendKind, ports: &BackendPorts) -> Arc<dyn AudioBackend> {
    let backend: Arc<dyn AudioBackend> = match kind {
        BackendKind::Native => match &ports.native {
            Some(factory) => Arc::new(NativeBackend::new(factory.clone())),
            None => {
                warn!("no native media port registered, audio disabled");
                Arc::new(NullBackend::new())
            }
        },
        BackendKind::MediaElement => match &ports.element {
            Some(factory) => Arc::new(MediaElementBackend::new(
                factory.clone(),
                ports.element_config,
            )),
            None => {
                warn!("no media element port registered, audio disabled");
                Arc::new(NullBackend::new())
            }
        },
        BackendKind::Null => Arc::new(NullBackend::new()),
    };
    info!(requested = %kind, created = %backend.kind(), "created audio backend");
    backend
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::element::MediaElement;
    use crate::{AudioSource, BackendError};

    struct NoElements;

    #[async_trait]
    impl MediaElementFactory for NoElements {
        async fn create(&self, url: &str) -> Result<Box<dyn MediaElement>, BackendError> {
            Err(BackendError::UnsupportedSource(url.to_string()))
        }
    }

    #[test]
    fn missing_port_degrades_to_null() {
        let ports = BackendPorts::default();
        assert_eq!(create_backend(BackendKind::Native, &ports).kind(), BackendKind::Null);
        assert_eq!(
            create_backend(BackendKind::MediaElement, &ports).kind(),
            BackendKind::Null
        );
    }

    #[tokio::test]
    async fn registered_port_is_used() {
        let ports = BackendPorts::default().with_element(Arc::new(NoElements));
        let backend = create_backend(BackendKind::MediaElement, &ports);
        assert_eq!(backend.kind(), BackendKind::MediaElement);
        assert!(!backend.initialize(&AudioSource::parse("https://host/a.mp3")).await);
        assert!(matches!(
            backend.last_error(),
            Some(BackendError::UnsupportedSource(_))
        ));
    }

    #[test]
    fn target_default_is_native_off_wasm() {
        #[cfg(not(target_arch = "wasm32"))]
        assert_eq!(BackendKind::for_target(), BackendKind::Native);
    }
}
